//! Three brute-force sum jobs on a three-worker pool.
//!
//! Run with `cargo run --example sums`.

use std::sync::atomic::{AtomicU64, Ordering};

use threadmill::{Job, JobCore, JobManager, ManagerEvent};
use tracing_subscriber::EnvFilter;

struct SumJob {
    core: JobCore,
    max: u64,
    sum: AtomicU64,
}

impl SumJob {
    fn new(max: u64) -> Self {
        Self {
            core: JobCore::named(format!("sum-{max}")),
            max,
            sum: AtomicU64::new(0),
        }
    }
}

impl Job for SumJob {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn run(&self) {
        let mut sum = 0;
        for i in 1..=self.max {
            sum += i;
        }
        self.sum.store(sum, Ordering::Release);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let manager = JobManager::new(3);
    let jobs: Vec<_> = [100, 200, 300]
        .into_iter()
        .map(|max| manager.append_job(SumJob::new(max)))
        .collect();

    let events = manager.subscribe();
    manager.start();
    for event in events.iter() {
        if matches!(
            event,
            ManagerEvent::Completed | ManagerEvent::Stopped | ManagerEvent::Error(_)
        ) {
            break;
        }
    }

    for job in &jobs {
        println!(
            "{}: {}",
            job.core().name(),
            job.sum.load(Ordering::Acquire)
        );
    }
}
