use tracing_subscriber::{EnvFilter, FmtSubscriber};
use volley_runtime::VolleyRuntime;

const DEFAULT_FILTER: &str = "volley=info,volley_runtime=info,volley_core=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    FmtSubscriber::builder().with_env_filter(filter).init();

    VolleyRuntime::new().with_args().run().await?;
    Ok(())
}
