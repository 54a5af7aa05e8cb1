//! Volley pipeline runtime
//!
//! Wires the queues, the store, the executors and sinks, and the API server together, and shuts
//! them down in pipeline order.
use crate::{
    error::RuntimeError,
    pipeline::DeadLetter,
    queue::{ChannelQueue, Queue},
    server::{server_task, ApiState},
    store::AnyStore,
    Message, ResultSink, RetryPolicy, RunExecutor, Submitter,
};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::fmt::Display;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn, Instrument};
use volley::Runner;

const DEFAULT_PORT: u16 = 4000;
const DEFAULT_DATABASE_URL: &str = "sqlite://volley.db";
const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(version, about = "HTTP load-testing service")]
struct VolleyCli {
    #[arg(short, long, env = "VOLLEY_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// SQLite URL, or `memory` for a store that lives only as long as the process.
    #[arg(long, env = "VOLLEY_DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    #[arg(long, env = "VOLLEY_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Number of intake consumers.
    #[arg(long, env = "VOLLEY_EXECUTORS", default_value_t = 1)]
    executors: usize,

    /// Number of results consumers.
    #[arg(long, env = "VOLLEY_SINKS", default_value_t = 1)]
    sinks: usize,

    #[arg(long, env = "VOLLEY_RETRY_ATTEMPTS", default_value_t = DEFAULT_RETRY_ATTEMPTS)]
    retry_attempts: u32,

    /// Initial retry backoff, e.g. `100ms` or `2s`.
    #[arg(long, env = "VOLLEY_RETRY_DELAY", default_value = "100ms", value_parser = humantime::parse_duration)]
    retry_delay: Duration,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "VOLLEY_METRICS_PORT")]
    metrics_port: Option<u16>,
}

/// Everything [`VolleyRuntime`] needs to start.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeConfig {
    pub port: u16,
    pub database_url: String,
    pub queue_capacity: usize,
    pub executors: usize,
    pub sinks: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            executors: 1,
            sinks: 1,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            metrics_port: None,
        }
    }
}

impl RuntimeConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_delay)
    }
}

impl From<VolleyCli> for RuntimeConfig {
    fn from(cli: VolleyCli) -> Self {
        Self {
            port: cli.port,
            database_url: cli.database_url,
            queue_capacity: cli.queue_capacity,
            executors: cli.executors,
            sinks: cli.sinks,
            retry_attempts: cli.retry_attempts,
            retry_delay: cli.retry_delay,
            metrics_port: cli.metrics_port,
        }
    }
}

/// Default Volley runtime.
///
/// Serves the `/load-test` API, executes submitted runs and persists their results until
/// Ctrl-C is received.
///
/// # Example
///
/// ```no_run
/// use volley_runtime::VolleyRuntime;
///
/// #[tokio::main]
/// async fn main() {
///     VolleyRuntime::new()
///         .with_args()
///         .run()
///         .await
///         .unwrap();
/// }
/// ```
#[derive(Default)]
pub struct VolleyRuntime {
    config: RuntimeConfig,
}

impl VolleyRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the default CLI arguments (and their `VOLLEY_*` environment variables).
    ///
    /// ```ignore
    /// $ volley-server --port 8080 --database-url sqlite://runs.db
    /// $ VOLLEY_DATABASE_URL=memory volley-server --executors 4
    /// ```
    pub fn with_args(mut self) -> Self {
        self.config = VolleyCli::parse().into();
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn database_url(mut self, url: &str) -> Self {
        self.config.database_url = url.to_string();
        self
    }

    /// Runs until Ctrl-C.
    pub async fn run(self) -> Result<(), RuntimeError> {
        self.run_until(ctrl_c()).await
    }

    /// Runs until `shutdown` resolves, then drains every stage in pipeline order.
    #[instrument(name = "volley", skip_all, fields(port = self.config.port))]
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), RuntimeError> {
        let config = self.config;

        if let Some(port) = config.metrics_port {
            install_metrics_exporter(port)?;
        }

        let store = AnyStore::connect(&config.database_url).await?;
        let intake = ChannelQueue::bounded("intake", config.queue_capacity);
        let results = ChannelQueue::bounded("results", config.queue_capacity);
        let dead_letters = ChannelQueue::bounded("dead-letters", config.queue_capacity);
        let runner = Runner::new()?;
        let retry = config.retry_policy();

        let executors: Vec<JoinHandle<()>> = (0..config.executors.max(1))
            .map(|_| {
                let executor = RunExecutor::new(
                    intake.clone(),
                    results.clone(),
                    dead_letters.clone(),
                    runner.clone(),
                    retry.clone(),
                );
                tokio::spawn(async move { executor.run().await }.in_current_span())
            })
            .collect();

        let sinks: Vec<JoinHandle<()>> = (0..config.sinks.max(1))
            .map(|_| {
                let sink = ResultSink::new(
                    results.clone(),
                    dead_letters.clone(),
                    store.clone(),
                    retry.clone(),
                );
                tokio::spawn(async move { sink.run().await }.in_current_span())
            })
            .collect();

        let drain = tokio::spawn(drain_dead_letters(dead_letters.clone()).in_current_span());

        let state = Arc::new(ApiState::new(
            Submitter::new(intake.clone(), retry),
            store.clone(),
        ));
        let server = spawn_or_halt(server_task(config.port, state, shutdown));

        join("API server", vec![server]).await;

        info!("Draining intake queue ({} pending)", intake.len());
        intake.close();
        join("executor", executors).await;

        info!("Draining results queue ({} pending)", results.len());
        results.close();
        join("sink", sinks).await;

        dead_letters.close();
        join("dead-letter drain", vec![drain]).await;

        store.close().await;
        info!("Shutdown complete");
        Ok(())
    }
}

fn install_metrics_exporter(port: u16) -> Result<(), RuntimeError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    info!("Serving Prometheus metrics on {addr}");
    Ok(())
}

/// Logs every dead letter so it can be inspected or replayed by hand.
async fn drain_dead_letters<Q: Queue + Sync>(queue: Q) {
    while let Ok(bytes) = queue.consume().await {
        match Message::<DeadLetter>::from_bytes(&bytes) {
            Ok(letter) => {
                let letter = letter.into_inner();
                warn!(
                    stage = ?letter.stage,
                    test_id = ?letter.test_id,
                    payload = %letter.payload,
                    "Dead letter: {}",
                    letter.reason
                );
            }
            Err(err) => error!("Undecodable dead letter: {err}"),
        }
    }
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, shutting down"),
        Err(err) => {
            error!("Unable to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    }
}

async fn join(name: &str, handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(err) = handle.await {
            error!("{name} task failed: {err}");
        }
    }
}

fn spawn_or_halt<F, R, E>(fut: F) -> JoinHandle<()>
where
    F: Future<Output = Result<R, E>> + Send + 'static,
    E: Display,
{
    tokio::spawn(
        async move {
            if let Err(err) = fut.await {
                error!("Failure in critical service: {err}. Shutting down.");
                std::process::exit(1);
            }
        }
        .in_current_span(),
    )
}
