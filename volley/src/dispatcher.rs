//! Bounded-concurrency work dispatcher.
mod work_atomics;

use crate::{Probe, RunError};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};
use volley_core::{ProbeOutcome, RunStats};
use work_atomics::WorkAtomics;

/// Issues exactly `total` probes over a fixed pool of concurrent workers.
///
/// Every worker repeatedly claims the next sequence number from a shared atomic counter and
/// probes it, terminating once the counter is exhausted. No sequence is probed twice, none is
/// skipped, and at most `concurrency` probes are ever in flight.
pub struct Dispatcher<P> {
    probe: Arc<P>,
    concurrency: NonZeroUsize,
}

/// Outcomes of a finished dispatch, ordered by sequence, and the wall-clock time it took.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub outcomes: Vec<ProbeOutcome>,
    pub elapsed: Duration,
}

impl Dispatch {
    pub fn stats(&self) -> RunStats {
        RunStats::from_outcomes(&self.outcomes, self.elapsed)
    }
}

impl<P> Dispatcher<P>
where
    P: Probe + Send + Sync + 'static,
{
    pub fn new(probe: P, concurrency: NonZeroUsize) -> Self {
        Self {
            probe: Arc::new(probe),
            concurrency,
        }
    }

    #[instrument(name = "dispatch", skip(self), fields(concurrency = self.concurrency.get()))]
    pub async fn run(&self, total: u64) -> Result<Dispatch, RunError> {
        let atomics = WorkAtomics::new(total);
        let start = Instant::now();

        let workers: Vec<JoinHandle<u64>> = (0..self.lanes(total))
            .map(|lane| {
                let probe = self.probe.clone();
                let atomics = atomics.clone();
                tokio::spawn(work(lane, probe, atomics).in_current_span())
            })
            .collect();

        // NOTE: Every worker is joined before returning, even if one of them failed.
        let mut joined = Ok(());
        for handle in workers {
            if let Err(err) = handle.await {
                error!("Dispatcher worker failed: {err}");
                if joined.is_ok() {
                    joined = Err(err);
                }
            }
        }
        let elapsed = start.elapsed();
        joined?;

        let outcomes = atomics.collect();
        debug!(
            "Dispatched {} probes in {}",
            outcomes.len(),
            humantime::format_duration(elapsed)
        );

        Ok(Dispatch { outcomes, elapsed })
    }

    /// Workers beyond `total` would find the counter exhausted on their first claim, so they are
    /// never spawned.
    fn lanes(&self, total: u64) -> usize {
        usize::try_from(total).map_or(self.concurrency.get(), |total| {
            total.min(self.concurrency.get())
        })
    }
}

async fn work<P: Probe>(lane: usize, probe: Arc<P>, atomics: WorkAtomics) -> u64 {
    let mut issued = 0;
    while let Some(sequence) = atomics.claim() {
        let outcome = probe.probe(sequence).await;
        atomics.record(outcome);
        issued += 1;
    }
    trace!("Worker {lane} finished after {issued} probes");
    issued
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use volley_core::Classification;

    /// Sleeps for `delay` and tracks how many probes are in flight at once.
    struct MockProbe {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        seen: Mutex<Vec<u64>>,
    }

    impl MockProbe {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                seen: Mutex::new(vec![]),
            }
        }
    }

    impl Probe for MockProbe {
        async fn probe(&self, sequence: u64) -> ProbeOutcome {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            self.seen.lock().unwrap().push(sequence);

            tokio::time::sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            ProbeOutcome {
                sequence,
                classification: Classification::Success(200),
                elapsed_ms: self.delay.as_secs_f64() * 1_000.,
                time_to_first_byte_ms: Some(0.),
                time_to_last_byte_ms: Some(0.),
            }
        }
    }

    struct PanickingProbe;

    impl Probe for PanickingProbe {
        async fn probe(&self, sequence: u64) -> ProbeOutcome {
            panic!("probe {sequence} exploded");
        }
    }

    fn dispatcher(delay: Duration, concurrency: usize) -> Dispatcher<MockProbe> {
        Dispatcher::new(
            MockProbe::new(delay),
            NonZeroUsize::new(concurrency).unwrap(),
        )
    }

    fn assert_exact_sequences(dispatch: &Dispatch, total: u64) {
        let sequences: Vec<u64> = dispatch.outcomes.iter().map(|o| o.sequence).collect();
        assert_eq!(sequences, (1..=total).collect::<Vec<_>>());
    }

    #[tracing_test::traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(10_000)]
    async fn exact_count_under_parallelism() {
        for (total, concurrency) in [(0, 1), (1, 1), (7, 3), (100, 8), (250, 32), (5, 5)] {
            let dispatcher = dispatcher(Duration::from_millis(1), concurrency);
            let dispatch = dispatcher.run(total).await.unwrap();

            assert_eq!(dispatch.outcomes.len() as u64, total);
            assert_exact_sequences(&dispatch, total);

            let seen = dispatcher.probe.seen.lock().unwrap();
            let unique: HashSet<_> = seen.iter().collect();
            assert_eq!(seen.len() as u64, total);
            assert_eq!(unique.len() as u64, total);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(10_000)]
    async fn never_exceeds_concurrency() {
        let dispatcher = dispatcher(Duration::from_millis(5), 4);
        dispatcher.run(40).await.unwrap();

        let peak = dispatcher.probe.peak.load(Ordering::SeqCst);
        assert!(peak <= 4, "peak concurrency was {peak}");
        assert!(peak >= 1);
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn more_workers_than_work() {
        let dispatcher = dispatcher(Duration::from_millis(1), 10);
        let dispatch = dispatcher.run(1).await.unwrap();

        assert_exact_sequences(&dispatch, 1);
        assert_eq!(dispatcher.probe.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn huge_concurrency_spawns_only_needed_lanes() {
        let probe = MockProbe::new(Duration::from_millis(1));
        let dispatcher = Dispatcher::new(probe, NonZeroUsize::MAX);
        assert_eq!(dispatcher.lanes(3), 3);
        assert_eq!(dispatcher.lanes(0), 0);

        let dispatch = dispatcher.run(3).await.unwrap();
        assert_exact_sequences(&dispatch, 3);
        assert_eq!(dispatcher.probe.seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn lanes_capped_by_concurrency() {
        let dispatcher = dispatcher(Duration::from_millis(1), 4);
        assert_eq!(dispatcher.lanes(1), 1);
        assert_eq!(dispatcher.lanes(4), 4);
        assert_eq!(dispatcher.lanes(u64::MAX), 4);
    }

    #[tokio::test]
    async fn empty_run() {
        let dispatch = dispatcher(Duration::from_millis(1), 4).run(0).await.unwrap();
        assert!(dispatch.outcomes.is_empty());

        let stats = dispatch.stats();
        assert_eq!(stats.success_count, 0);
        assert_eq!(stats.failed_count, 0);
        assert_eq!(stats.requests_per_second, 0.);
    }

    #[tokio::test(start_paused = true)]
    async fn wall_clock_covers_all_lanes() {
        // 10 probes of 100ms over 2 lanes take five rounds.
        let dispatch = dispatcher(Duration::from_millis(100), 2)
            .run(10)
            .await
            .unwrap();

        assert!(dispatch.elapsed >= Duration::from_millis(500));
        assert!(dispatch.elapsed < Duration::from_millis(600));

        let stats = dispatch.stats();
        assert_eq!(stats.success_count, 10);
        assert!(stats.requests_per_second > 16. && stats.requests_per_second <= 20.);
    }

    #[tokio::test]
    async fn worker_panic_is_reported() {
        let dispatcher = Dispatcher::new(PanickingProbe, NonZeroUsize::new(2).unwrap());
        let res = dispatcher.run(3).await;
        assert!(matches!(res, Err(RunError::Worker(_))));
    }
}
