use crate::{Dispatcher, HttpProbe, ProbeOptions, RunError};
use reqwest::Client;
use std::num::NonZeroUsize;
use time::OffsetDateTime;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};
use volley_core::{RunResult, RunSpec, SpecError};

/// Executes whole runs: validation, dispatch and aggregation.
///
/// Holds one HTTP client so that connection pools are shared across runs.
#[derive(Clone)]
pub struct Runner {
    client: Client,
}

impl Runner {
    pub fn new() -> Result<Self, RunError> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    #[instrument(name = "run", skip_all, fields(run_id = %spec.run_id))]
    pub async fn run(&self, spec: &RunSpec) -> Result<RunResult, RunError> {
        spec.validate()?;
        let concurrency = NonZeroUsize::new(spec.concurrency).ok_or(SpecError::ZeroConcurrency)?;
        let probe = HttpProbe::new(self.client.clone(), ProbeOptions::try_from(spec)?);

        info!(
            "Running {} {} x{} with concurrency {}",
            spec.method, spec.target_url, spec.num_requests, concurrency
        );

        let dispatch = Dispatcher::new(probe, concurrency)
            .run(spec.num_requests)
            .await?;
        let stats = dispatch.stats();

        info!(
            "Run complete in {}: {stats}",
            humantime::format_duration(dispatch.elapsed)
        );

        Ok(RunResult {
            run_id: spec.run_id.clone(),
            target_url: spec.target_url.clone(),
            num_requests: spec.num_requests,
            concurrency: spec.concurrency,
            outcomes: dispatch.outcomes,
            stats,
            completed_at: OffsetDateTime::now_utc(),
        })
    }
}
