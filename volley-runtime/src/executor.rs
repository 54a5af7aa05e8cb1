use crate::pipeline::{DeadLetter, Disposition, RunState, Stage};
use crate::queue::{dead_letter, Queue};
use crate::{Message, RetryPolicy};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::{Mutex, PoisonError};
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn, Instrument};
use volley::{RunError, Runner};
use volley_core::{RunId, RunSpec};

/// How many recently executed run ids each executor remembers for duplicate detection.
const RECENT_RUNS: usize = 1_024;

/// Intake consumer: executes each submitted run and publishes its result.
///
/// Intake delivery is at-least-once, so a run id this executor has recently seen is acknowledged
/// without being executed again. Duplicates that reach different executors are collapsed later by
/// the store's upsert.
pub struct RunExecutor<Q> {
    intake: Q,
    results: Q,
    dead_letters: Q,
    runner: Runner,
    retry: RetryPolicy,
    recent: Mutex<RecentRuns>,
}

impl<Q> RunExecutor<Q>
where
    Q: Queue + Clone + Sync,
{
    pub fn new(intake: Q, results: Q, dead_letters: Q, runner: Runner, retry: RetryPolicy) -> Self {
        Self {
            intake,
            results,
            dead_letters,
            runner,
            retry,
            recent: Mutex::new(RecentRuns::new(RECENT_RUNS)),
        }
    }

    /// Consumes the intake queue until it is closed and drained.
    pub async fn run(&self) {
        info!("Executor consuming from `{}`", self.intake.name());
        while let Ok(bytes) = self.intake.consume().await {
            self.handle(&bytes).await;
        }
        info!("Intake queue `{}` closed, executor stopping", self.intake.name());
    }

    /// Processes one intake message. Never fails: anything that cannot be completed is
    /// dead-lettered.
    pub async fn handle(&self, bytes: &[u8]) -> Disposition {
        let spec = match Message::<RunSpec>::from_bytes(bytes) {
            Ok(message) => message.into_inner(),
            Err(err) => {
                let letter = DeadLetter::new(Stage::Intake, None, err, bytes);
                dead_letter(&self.dead_letters, letter).await;
                return Disposition::DeadLettered(Stage::Intake);
            }
        };

        if !self.remember(&spec.run_id) {
            info!("Run {} already executed here, skipping redelivery", spec.run_id);
            return Disposition::Duplicate(spec.run_id);
        }

        self.execute(spec, bytes).await
    }

    #[instrument(name = "execute", skip_all, fields(run_id = %spec.run_id))]
    async fn execute(&self, spec: RunSpec, bytes: &[u8]) -> Disposition {
        info!("{}", RunState::Submitted);
        info!("{}", RunState::Dispatched);

        let runner = self.runner.clone();
        let run = spec.clone();
        let result = match isolated(async move { runner.run(&run).await }).await {
            Ok(result) => result,
            Err(err) => {
                let letter = DeadLetter::new(Stage::Execute, Some(spec.run_id), err, bytes);
                dead_letter(&self.dead_letters, letter).await;
                return Disposition::DeadLettered(Stage::Execute);
            }
        };
        info!("{}: {}", RunState::Aggregated, result.stats);

        let payload = match Message::new(result).to_bytes() {
            Ok(payload) => payload,
            Err(err) => {
                let letter = DeadLetter::new(Stage::Publish, Some(spec.run_id), err, bytes);
                dead_letter(&self.dead_letters, letter).await;
                return Disposition::DeadLettered(Stage::Publish);
            }
        };

        let published = self
            .retry
            .retry("publish result", || self.results.publish(payload.clone()))
            .await;

        match published {
            Ok(()) => {
                info!("{}", RunState::Published);
                Disposition::Published(spec.run_id)
            }
            Err(err) => {
                let letter = DeadLetter::new(Stage::Publish, Some(spec.run_id), err, &payload);
                dead_letter(&self.dead_letters, letter).await;
                Disposition::DeadLettered(Stage::Publish)
            }
        }
    }

    /// Returns `false` if `run_id` was already seen.
    fn remember(&self, run_id: &RunId) -> bool {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id.clone())
    }
}

/// Runs `fut` on its own task, so that a panic surfaces as [`RunError::Worker`] instead of ending
/// the consumer loop.
async fn isolated<T, F>(fut: F) -> Result<T, RunError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, RunError>> + Send + 'static,
{
    tokio::spawn(fut.in_current_span()).await?
}

/// Bounded set of run ids, evicting the oldest once full.
struct RecentRuns {
    capacity: usize,
    order: VecDeque<RunId>,
    seen: HashSet<RunId>,
}

impl RecentRuns {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    fn insert(&mut self, run_id: RunId) -> bool {
        if self.seen.contains(&run_id) {
            return false;
        }

        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(run_id.clone());
        self.seen.insert(run_id)
    }
}
