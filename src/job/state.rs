use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::job::Job;

/// Shared bookkeeping state embedded by every [`Job`] implementation.
///
/// The scheduler talks to jobs exclusively through this state and the
/// trait methods: the cancel flag is polled by the body, the error code
/// carries failure out of `run`, and the finished flag is what dependency
/// checks observe. All flags are atomics so the body can read them from
/// the worker thread while the manager mutates them under its own lock.
pub struct JobCore {
    id: Uuid,
    name: Mutex<String>,
    cancelled: AtomicBool,
    error: AtomicI32,
    finished: AtomicBool,
    spawned: AtomicBool,
    dependencies: Mutex<Vec<Arc<dyn Job>>>,
    created_at: DateTime<Utc>,
    completed_at: Mutex<Option<DateTime<Utc>>>,
}

impl JobCore {
    /// Creates state for an unnamed job.
    pub fn new() -> Self {
        Self::named(String::new())
    }

    /// Creates state with a display name, useful when debugging runs.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: Mutex::new(name.into()),
            cancelled: AtomicBool::new(false),
            error: AtomicI32::new(0),
            finished: AtomicBool::new(false),
            spawned: AtomicBool::new(false),
            dependencies: Mutex::new(Vec::new()),
            created_at: Utc::now(),
            completed_at: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> String {
        self.name.lock().unwrap().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.lock().unwrap() = name.into();
    }

    /// True once cancellation was requested. Bodies must poll this and
    /// return promptly when it is set.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Sets the cancel flag. Safe to call from any thread.
    pub fn request_stop(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Error code reported by the body; zero means success.
    pub fn error_code(&self) -> i32 {
        self.error.load(Ordering::Acquire)
    }

    pub fn is_error(&self) -> bool {
        self.error_code() != 0
    }

    /// Records a failure. Called from inside the body; a positive code
    /// marks the job as failed when it terminates.
    pub fn report_error(&self, code: i32) {
        self.error.store(code, Ordering::Release);
    }

    /// True only after a successful, non-cancelled run was finalized.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// True if this job was produced by another job's spawning hook
    /// rather than submitted by the caller.
    pub fn is_spawned(&self) -> bool {
        self.spawned.load(Ordering::Acquire)
    }

    pub(crate) fn mark_spawned(&self) {
        self.spawned.store(true, Ordering::Release);
    }

    /// Registers a job that must reach the finished state before this
    /// one may start. Dependencies point backward in submission order;
    /// the graph is acyclic by construction.
    pub fn add_dependency(&self, job: Arc<dyn Job>) {
        self.dependencies.lock().unwrap().push(job);
    }

    /// Number of dependencies not yet observed finished.
    pub fn dependency_count(&self) -> usize {
        self.dependencies.lock().unwrap().len()
    }

    /// Prunes finished dependencies from the head of the list and
    /// reports whether the list emptied. A dependency that terminated
    /// with an error or was cancelled never finishes and blocks this
    /// job forever.
    pub fn dependencies_ready(&self) -> bool {
        let mut dependencies = self.dependencies.lock().unwrap();
        while dependencies
            .first()
            .is_some_and(|dep| dep.core().is_finished())
        {
            dependencies.remove(0);
        }
        dependencies.is_empty()
    }

    /// Clears the cancel flag and error code before a run.
    pub(crate) fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
        self.error.store(0, Ordering::Release);
    }

    /// Stamps the completion time and promotes the finished flag if the
    /// run succeeded. Invoked from [`Job::cleanup`].
    pub fn finalize(&self) {
        *self.completed_at.lock().unwrap() = Some(Utc::now());
        if self.error_code() == 0 && !self.is_cancelled() {
            self.finished.store(true, Ordering::Release);
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time the job terminated, in any of the three terminal states.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        *self.completed_at.lock().unwrap()
    }
}

impl Default for JobCore {
    fn default() -> Self {
        Self::new()
    }
}
