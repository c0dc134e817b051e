use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Live counters for a batch run.
///
/// [`super::BatchRunner`] updates these while datasets run; callers can snapshot them at any time.
#[derive(Debug, Default)]
pub struct BatchMetrics {
    datasets_started: AtomicU64,
    datasets_succeeded: AtomicU64,
    datasets_skipped: AtomicU64,
    datasets_failed: AtomicU64,
    artifacts_written: AtomicU64,
    bytes_written: AtomicU64,
    elapsed_ns: AtomicU64,

    active_datasets: AtomicUsize,
    max_active_datasets: AtomicUsize,
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin_run(&self) {
        for counter in [
            &self.datasets_started,
            &self.datasets_succeeded,
            &self.datasets_skipped,
            &self.datasets_failed,
            &self.artifacts_written,
            &self.bytes_written,
            &self.elapsed_ns,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
        self.active_datasets.store(0, Ordering::SeqCst);
        self.max_active_datasets.store(0, Ordering::SeqCst);
    }

    pub(crate) fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    pub(crate) fn on_dataset_start(&self) {
        let _ = self.datasets_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_datasets.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_datasets, now);
    }

    pub(crate) fn on_dataset_end(&self, outcome: DatasetEnd) {
        let counter = match outcome {
            DatasetEnd::Succeeded { artifacts, bytes } => {
                let _ = self.artifacts_written.fetch_add(artifacts, Ordering::SeqCst);
                let _ = self.bytes_written.fetch_add(bytes, Ordering::SeqCst);
                &self.datasets_succeeded
            }
            DatasetEnd::Skipped => &self.datasets_skipped,
            DatasetEnd::Failed => &self.datasets_failed,
        };
        let _ = counter.fetch_add(1, Ordering::SeqCst);
        let _ = self.active_datasets.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> BatchMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        BatchMetricsSnapshot {
            datasets_started: self.datasets_started.load(Ordering::SeqCst),
            datasets_succeeded: self.datasets_succeeded.load(Ordering::SeqCst),
            datasets_skipped: self.datasets_skipped.load(Ordering::SeqCst),
            datasets_failed: self.datasets_failed.load(Ordering::SeqCst),
            artifacts_written: self.artifacts_written.load(Ordering::SeqCst),
            bytes_written: self.bytes_written.load(Ordering::SeqCst),
            max_active_datasets: self.max_active_datasets.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
        }
    }
}

/// How one dataset's run ended.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DatasetEnd {
    Succeeded { artifacts: u64, bytes: u64 },
    Skipped,
    Failed,
}

/// Point-in-time copy of [`BatchMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchMetricsSnapshot {
    pub datasets_started: u64,
    pub datasets_succeeded: u64,
    pub datasets_skipped: u64,
    pub datasets_failed: u64,
    pub artifacts_written: u64,
    pub bytes_written: u64,
    pub max_active_datasets: usize,
    pub elapsed: Option<Duration>,
}

fn update_max_usize(max: &AtomicUsize, candidate: usize) {
    let mut cur = max.load(Ordering::SeqCst);
    while candidate > cur {
        match max.compare_exchange(cur, candidate, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => break,
            Err(actual) => cur = actual,
        }
    }
}
