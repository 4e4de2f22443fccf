use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::job::{Job, JobCore};

/// A job that runs an owned list of sub-jobs in order on one worker.
///
/// Useful for composing serial phases inside an otherwise parallel
/// schedule: the queue is itself a [`Job`] and is appended to a
/// [`JobManager`](crate::JobManager) like any other. Sub-jobs execute in
/// appending order; the first sub-job that reports a non-zero error code
/// aborts the iteration and the code is propagated to the queue itself.
/// Cancelling the queue stops the iteration after the current sub-job.
pub struct SerialQueue {
    core: JobCore,
    jobs: Mutex<Vec<Arc<dyn Job>>>,
    // Index of the sub-job being run: -1 before the first, job_count after
    // the last.
    current: AtomicI64,
}

impl SerialQueue {
    pub fn new() -> Self {
        Self::named(String::new())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            core: JobCore::named(name),
            jobs: Mutex::new(Vec::new()),
            current: AtomicI64::new(-1),
        }
    }

    /// Appends a sub-job, returning a typed handle to it.
    pub fn append<J>(&self, job: J) -> Arc<J>
    where
        J: Job + 'static,
    {
        let job = Arc::new(job);
        self.jobs.lock().unwrap().push(job.clone());
        job
    }

    /// Removes all sub-jobs.
    pub fn clear(&self) {
        self.current.store(-1, Ordering::Release);
        self.jobs.lock().unwrap().clear();
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

impl Default for SerialQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Job for SerialQueue {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn run(&self) {
        let mut index: i64 = 0;
        loop {
            self.current.store(index, Ordering::Release);
            let job = {
                let jobs = self.jobs.lock().unwrap();
                jobs.get(index as usize).cloned()
            };
            let Some(job) = job else {
                break;
            };
            if self.core.is_cancelled() || self.core.error_code() != 0 {
                return;
            }
            job.run();
            let code = job.core().error_code();
            if code > 0 {
                tracing::warn!(
                    queue = %self.core.id(),
                    sub_job = %job.core().id(),
                    code,
                    "sub-job failed, aborting the queue"
                );
                self.core.report_error(code);
            }
            index += 1;
        }
    }

    fn progress(&self) -> u8 {
        let current = self.current.load(Ordering::Acquire);
        if current < 0 {
            return 0;
        }
        let jobs = self.jobs.lock().unwrap();
        let count = jobs.len() as i64;
        if current >= count {
            return 100;
        }
        let done = 100 * current as u64 + jobs[current as usize].progress() as u64;
        (done / count as u64) as u8
    }
}
