use crate::pipeline::{DeadLetter, Disposition, RunState, Stage};
use crate::queue::{dead_letter, Queue};
use crate::store::RunStore;
use crate::{Message, RetryPolicy};
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn};
use volley_core::RunResult;

/// Results consumer: persists every published run into the store.
///
/// Persisting is an upsert keyed by run id, so redelivered results never produce a second record.
pub struct ResultSink<Q, S> {
    results: Q,
    dead_letters: Q,
    store: S,
    retry: RetryPolicy,
}

impl<Q, S> ResultSink<Q, S>
where
    Q: Queue + Sync,
    S: RunStore + Sync,
{
    pub fn new(results: Q, dead_letters: Q, store: S, retry: RetryPolicy) -> Self {
        Self {
            results,
            dead_letters,
            store,
            retry,
        }
    }

    /// Consumes the results queue until it is closed and drained.
    pub async fn run(&self) {
        info!("Sink consuming from `{}`", self.results.name());
        while let Ok(bytes) = self.results.consume().await {
            self.handle(&bytes).await;
        }
        info!("Results queue `{}` closed, sink stopping", self.results.name());
    }

    /// Persists one results message, dead-lettering it if that is impossible.
    pub async fn handle(&self, bytes: &[u8]) -> Disposition {
        let result = match Message::<RunResult>::from_bytes(bytes) {
            Ok(message) => message.into_inner(),
            Err(err) => {
                let letter = DeadLetter::new(Stage::Results, None, err, bytes);
                dead_letter(&self.dead_letters, letter).await;
                return Disposition::DeadLettered(Stage::Results);
            }
        };

        self.persist(result, bytes).await
    }

    #[instrument(name = "persist", skip_all, fields(run_id = %result.run_id))]
    async fn persist(&self, result: RunResult, bytes: &[u8]) -> Disposition {
        let run_id = result.run_id.clone();
        let persisted = self
            .retry
            .retry("persist result", || self.store.upsert(result.clone()))
            .await;

        match persisted {
            Ok(record) => {
                info!("{} (created {})", RunState::Persisted, record.created_at);
                Disposition::Persisted(run_id)
            }
            Err(err) => {
                let letter = DeadLetter::new(Stage::Persist, Some(run_id), err, bytes);
                dead_letter(&self.dead_letters, letter).await;
                Disposition::DeadLettered(Stage::Persist)
            }
        }
    }
}
