use crate::queue::{Queue, QueueError};
use crate::{Message, RetryPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn};
use volley_core::{RunId, RunSpec, SpecError, SubmitRequest};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Invalid load test: {0}")]
    Invalid(#[from] SpecError),

    #[error("Unable to encode load test: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Unable to enqueue load test: {0}")]
    Queue(#[from] QueueError),
}

/// Acknowledgement returned as soon as a run has been enqueued.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub message: String,
    pub test_id: RunId,
}

/// Submission boundary: validates requests and places them on the intake queue.
pub struct Submitter<Q> {
    intake: Q,
    retry: RetryPolicy,
}

impl<Q> Submitter<Q>
where
    Q: Queue + Sync,
{
    pub fn new(intake: Q, retry: RetryPolicy) -> Self {
        Self { intake, retry }
    }

    /// Assigns a fresh run id to `request` and enqueues it. Nothing is enqueued if the request
    /// is invalid.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Ack, SubmitError> {
        let spec = request.into_spec(RunId::generate())?;
        self.enqueue(&spec).await?;

        Ok(Ack {
            message: "Load test scheduled.".to_string(),
            test_id: spec.run_id,
        })
    }

    #[instrument(name = "submit", skip_all, fields(run_id = %spec.run_id))]
    pub async fn enqueue(&self, spec: &RunSpec) -> Result<(), SubmitError> {
        let bytes = Message::new(spec).to_bytes()?;
        self.retry
            .retry("enqueue run", || self.intake.publish(bytes.clone()))
            .await?;

        info!(
            "Enqueued {} x{} on `{}`",
            spec.target_url,
            spec.num_requests,
            self.intake.name()
        );
        Ok(())
    }
}
