use metrics_util::AtomicBucket;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use volley_core::ProbeOutcome;

/// State shared by every worker of a single dispatch.
///
/// The claim counter is the only shared mutable state; outcomes go into a lock-free bucket that
/// is drained once all workers have joined.
#[derive(Clone)]
pub(crate) struct WorkAtomics {
    next: Arc<AtomicU64>,
    total: u64,
    outcomes: Arc<AtomicBucket<ProbeOutcome>>,
}

impl WorkAtomics {
    pub fn new(total: u64) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(0)),
            total,
            outcomes: Arc::new(AtomicBucket::new()),
        }
    }

    /// Claims the next unit of work, returning its 1-based sequence number, or `None` once all
    /// `total` units have been handed out.
    pub fn claim(&self) -> Option<u64> {
        let claimed = self.next.fetch_add(1, Ordering::Relaxed);
        (claimed < self.total).then_some(claimed + 1)
    }

    pub fn record(&self, outcome: ProbeOutcome) {
        self.outcomes.push(outcome);
    }

    /// Drains every recorded outcome, ordered by sequence.
    pub fn collect(&self) -> Vec<ProbeOutcome> {
        let mut outcomes = Vec::with_capacity(self.total as usize);
        self.outcomes
            .clear_with(|batch| outcomes.extend_from_slice(batch));
        outcomes.sort_by_key(|o| o.sequence);
        outcomes
    }
}
