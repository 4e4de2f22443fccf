//! The scheduler: worker pool, dispatch queue, and run state machine.
//!
//! [`JobManager`] owns the job table, the FIFO waiting queue, and a
//! fixed pool of [`Worker`](worker::Worker) threads. Dispatch is driven
//! by two triggers — `start` and each worker's completion — and both
//! route through a single critical section on the manager mutex. Job
//! bodies run outside that lock, so long-running work never blocks
//! dispatch.

pub mod worker;

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};

use crate::config::ManagerConfig;
use crate::error::ErrorKind;
use crate::event::{EventHub, ManagerEvent};
use crate::job::Job;
use worker::Worker;

/// Run state of a [`JobManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Jobs are being processed.
    Running,
    /// The last run terminated with every job accounted for.
    Finished,
    /// The last run was stopped from outside.
    Stopped,
    /// The last run ended in a terminal error.
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Running => write!(f, "running"),
            Status::Finished => write!(f, "finished"),
            Status::Stopped => write!(f, "stopped"),
            Status::Error => write!(f, "error"),
        }
    }
}

/// Executes appended jobs across a fixed pool of worker threads.
///
/// Jobs are appended with [`append_job`](JobManager::append_job) and
/// processed once [`start`](JobManager::start) is called, each on its
/// own worker thread. When more jobs are queued than workers exist, a
/// worker that finishes its job is immediately assigned the next queued
/// job whose preconditions hold. Lifecycle events — completion, per-job
/// completion, terminal errors, stop, progress — are delivered to every
/// channel obtained from [`subscribe`](JobManager::subscribe).
///
/// The manager takes shared ownership of every appended job (and of
/// every job spawned by a finished job); jobs are released by
/// [`clear`](JobManager::clear) or when the manager is dropped.
///
/// ```
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use threadmill::{Job, JobCore, JobManager};
///
/// struct SumJob {
///     core: JobCore,
///     max: u64,
///     sum: AtomicU64,
/// }
///
/// impl Job for SumJob {
///     fn core(&self) -> &JobCore {
///         &self.core
///     }
///
///     fn run(&self) {
///         let mut sum = 0;
///         for i in 1..=self.max {
///             sum += i;
///         }
///         self.sum.store(sum, Ordering::Release);
///     }
/// }
///
/// let manager = JobManager::new(3);
/// let job = manager.append_job(SumJob {
///     core: JobCore::new(),
///     max: 100,
///     sum: AtomicU64::new(0),
/// });
/// manager.start();
/// while manager.is_running() {
///     std::thread::sleep(std::time::Duration::from_millis(1));
/// }
/// assert_eq!(job.sum.load(Ordering::Acquire), 5050);
/// ```
#[derive(Clone)]
pub struct JobManager {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    state: Mutex<ManagerState>,
    events: EventHub<ManagerEvent>,
}

struct ManagerState {
    jobs: Vec<Arc<dyn Job>>,
    waiting: VecDeque<usize>,
    workers: Vec<Worker>,
    idle: VecDeque<usize>,
    started: usize,
    running: usize,
    finished: usize,
    errors: usize,
    allowed_errors: i32,
    stop: bool,
    report_job_finish: bool,
    status: Status,
    last_error: ErrorKind,
    progress_interval: Duration,
    // Keep-alive handle for the progress ticker thread; dropping it ends
    // the thread.
    ticker: Option<Sender<()>>,
}

impl JobManager {
    /// Creates a manager with the given number of worker threads.
    /// Zero threads means one per available CPU.
    pub fn new(threads: usize) -> Self {
        Self::with_config(ManagerConfig::default().with_thread_count(threads))
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(ManagerState {
                jobs: Vec::new(),
                waiting: VecDeque::new(),
                workers: Vec::new(),
                idle: VecDeque::new(),
                started: 0,
                running: 0,
                finished: 0,
                errors: 0,
                allowed_errors: config.allowed_errors,
                stop: false,
                report_job_finish: config.report_job_finish,
                status: Status::Finished,
                last_error: ErrorKind::NoError,
                progress_interval: Duration::from_millis(config.progress_interval_ms),
                ticker: None,
            }),
            events: EventHub::new(),
        });
        let manager = JobManager { shared };
        manager.set_thread_count(config.thread_count);
        manager
    }

    /// Subscribes to lifecycle events. Every subscriber receives every
    /// event; terminal events arrive at most once per run.
    pub fn subscribe(&self) -> Receiver<ManagerEvent> {
        self.shared.events.subscribe()
    }

    /// Appends a job to the table and the waiting queue, returning a
    /// typed handle to it. Safe to call while a run is in progress; the
    /// job is picked up on the next dispatch tick.
    pub fn append_job<J>(&self, job: J) -> Arc<J>
    where
        J: Job + 'static,
    {
        let job = Arc::new(job);
        let mut state = self.shared.state.lock().unwrap();
        state.append(job.clone());
        job
    }

    /// Shared handle to the job at the given table index.
    pub fn job(&self, index: usize) -> Option<Arc<dyn Job>> {
        self.shared.state.lock().unwrap().jobs.get(index).cloned()
    }

    /// Releases all jobs and resets the counters. Ignored while running.
    pub fn clear(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if state.status == Status::Running {
            tracing::warn!("clear() ignored while the manager is running");
            return;
        }
        state.jobs.clear();
        state.waiting.clear();
        state.started = 0;
        state.running = 0;
        state.finished = 0;
        state.errors = 0;
        state.stop = false;
        state.last_error = ErrorKind::NoError;
    }

    /// Replaces the worker pool. Ignored while running. Zero means one
    /// worker per available CPU.
    pub fn set_thread_count(&self, threads: usize) {
        let mut state = self.shared.state.lock().unwrap();
        if state.status == Status::Running {
            tracing::warn!("set_thread_count() ignored while the manager is running");
            return;
        }
        let threads = if threads == 0 { num_cpus::get() } else { threads };
        state.workers.clear();
        state.idle.clear();
        for id in 0..threads {
            state.workers.push(Worker::spawn(id, Arc::downgrade(&self.shared)));
            state.idle.push_back(id);
        }
    }

    /// Adds workers to the pool. Valid at any time; during a run each
    /// new worker is immediately offered a waiting job.
    pub fn add_threads(&self, threads: usize) {
        let mut state = self.shared.state.lock().unwrap();
        for _ in 0..threads {
            let id = state.workers.len();
            state.workers.push(Worker::spawn(id, Arc::downgrade(&self.shared)));
            state.idle.push_back(id);
            if state.status == Status::Running {
                state.start_next();
            }
        }
    }

    /// Sets the error budget. Negative disables the cap.
    pub fn set_allowed_errors(&self, allowed: i32) {
        self.shared.state.lock().unwrap().allowed_errors = allowed;
    }

    pub fn allowed_errors(&self) -> i32 {
        self.shared.state.lock().unwrap().allowed_errors
    }

    /// Sets the periodic progress interval. Zero disables progress
    /// reporting. Takes effect at the next `start`.
    pub fn set_progress_interval(&self, interval_ms: u64) {
        self.shared.state.lock().unwrap().progress_interval =
            Duration::from_millis(interval_ms);
    }

    /// When enabled, a per-job completion event is emitted for every
    /// job that terminates.
    pub fn set_report_job_finish(&self, report: bool) {
        self.shared.state.lock().unwrap().report_job_finish = report;
    }

    /// Starts processing the queued jobs.
    ///
    /// Returns false if a run is already in progress. An empty table
    /// finishes immediately and emits the completion event.
    pub fn start(&self) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if state.status == Status::Running {
            tracing::warn!("cannot start the manager while it is already running");
            return false;
        }
        state.status = Status::Running;
        state.started = 0;
        state.running = 0;
        state.finished = 0;
        state.errors = 0;
        state.stop = false;
        state.last_error = ErrorKind::NoError;

        if state.jobs.is_empty() {
            state.status = Status::Finished;
            drop(state);
            tracing::debug!("no jobs queued, finishing immediately");
            self.shared.events.emit(ManagerEvent::Completed);
            return true;
        }

        tracing::info!(
            jobs = state.jobs.len(),
            threads = state.workers.len(),
            "starting job processing"
        );
        let burst = state.workers.len().min(state.jobs.len());
        for _ in 0..burst {
            state.start_next();
        }
        // A queue that is unsatisfiable from the outset surfaces its
        // terminal error here rather than waiting for a completion tick
        // that would never come.
        let mut events = Vec::new();
        state.handle_error(&mut events);
        if state.status == Status::Running && !state.progress_interval.is_zero() {
            self.spawn_ticker(&mut state);
        }
        drop(state);
        for event in events {
            self.shared.events.emit(event);
        }
        true
    }

    /// Requests a cooperative stop: the cancel flag of every running
    /// job is set and no further jobs are dispatched. The manager
    /// transitions to Stopped once all running jobs have terminated, or
    /// immediately when nothing is running.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock().unwrap();
        tracing::info!(running = state.running, "stop requested");
        state.stop = true;
        for worker in &state.workers {
            if let Some(index) = worker.job_index() {
                state.jobs[index].stop();
            }
        }
        if state.running == 0 && state.status != Status::Stopped {
            state.status = Status::Stopped;
            state.ticker = None;
            drop(state);
            self.shared.events.emit(ManagerEvent::Stopped);
        }
    }

    /// Total number of jobs in the table, spawned jobs included.
    pub fn job_count(&self) -> usize {
        self.shared.state.lock().unwrap().jobs.len()
    }

    /// Number of jobs that have terminated in the current run.
    pub fn finished_count(&self) -> usize {
        self.shared.state.lock().unwrap().finished
    }

    /// Size of the worker pool.
    pub fn thread_count(&self) -> usize {
        self.shared.state.lock().unwrap().workers.len()
    }

    /// Number of workers currently executing a job.
    pub fn thread_running_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .unwrap()
            .workers
            .iter()
            .filter(|worker| worker.is_running())
            .count()
    }

    pub fn status(&self) -> Status {
        self.shared.state.lock().unwrap().status
    }

    /// Kind of the last terminal error, `NoError` if none occurred.
    pub fn last_error(&self) -> ErrorKind {
        self.shared.state.lock().unwrap().last_error
    }

    pub fn is_running(&self) -> bool {
        self.status() == Status::Running
    }

    pub fn is_idle(&self) -> bool {
        !self.is_running()
    }

    /// True if the last run terminated with every job accounted for.
    pub fn is_finished(&self) -> bool {
        self.status() == Status::Finished
    }

    /// True if a stop was requested and not yet cleared by `clear` or a
    /// new `start`.
    pub fn is_stopped(&self) -> bool {
        self.shared.state.lock().unwrap().stop
    }

    fn spawn_ticker(&self, state: &mut ManagerState) {
        let (tx, rx) = unbounded::<()>();
        state.ticker = Some(tx);
        let interval = state.progress_interval;
        let weak = Arc::downgrade(&self.shared);
        std::thread::spawn(move || loop {
            match rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => break,
            }
            let Some(shared) = weak.upgrade() else {
                break;
            };
            // Compute under the lock, emit outside of it.
            let percent = {
                let state = shared.state.lock().unwrap();
                if state.status != Status::Running {
                    break;
                }
                state.progress_percent()
            };
            shared.events.emit(ManagerEvent::Progress(percent));
        });
    }
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Shared {
    /// Completion handler invoked from a worker thread after its job's
    /// body returned. Performs the bookkeeping for the terminated job,
    /// then keeps the pool saturated.
    pub(crate) fn job_terminated(shared: &Arc<Shared>, worker_id: usize) {
        let mut state = shared.state.lock().unwrap();
        let Some(index) = state.workers[worker_id].complete() else {
            tracing::error!(worker = worker_id, "completion from an unassigned worker");
            debug_assert!(false, "completion from an unassigned worker");
            return;
        };
        state.finished += 1;
        state.running -= 1;

        let job = state.jobs[index].clone();
        while let Some(child) = job.next_spawned_job() {
            child.core().mark_spawned();
            let child: Arc<dyn Job> = Arc::from(child);
            tracing::debug!(
                parent = %job.core().id(),
                child = %child.core().id(),
                "spawned job appended"
            );
            state.append(child);
        }
        job.cleanup();
        state.idle.push_back(worker_id);
        if job.core().is_error() {
            state.errors += 1;
            tracing::warn!(
                job = %job.core().id(),
                name = %job.core().name(),
                code = job.core().error_code(),
                "job terminated with an error"
            );
        }
        // The per-job event goes out before any dispatch effect of this
        // tick so subscribers observe finishes in dependency order.
        if state.report_job_finish {
            shared.events.emit(ManagerEvent::JobCompleted(job.clone()));
        }

        let mut events = Vec::new();
        let slots = state.waiting.len().min(state.idle.len()).max(1);
        for _ in 0..slots {
            state.check_next(&mut events);
        }
        let completed = state.status == Status::Finished;
        drop(state);

        for event in events {
            shared.events.emit(event);
        }
        if completed {
            shared.events.emit(ManagerEvent::Completed);
        }
    }
}

impl ManagerState {
    fn append(&mut self, job: Arc<dyn Job>) {
        tracing::trace!(job = %job.core().id(), index = self.jobs.len(), "job appended");
        self.waiting.push_back(self.jobs.len());
        self.jobs.push(job);
    }

    fn progress_percent(&self) -> u8 {
        if self.jobs.is_empty() {
            0
        } else {
            (100 * self.finished / self.jobs.len()) as u8
        }
    }

    /// One dispatch step: enforce the error budget and the stop flag,
    /// start the next runnable job, or conclude the run.
    fn check_next(&mut self, events: &mut Vec<ManagerEvent>) {
        if self.allowed_errors >= 0 && self.errors > self.allowed_errors as usize {
            self.last_error = ErrorKind::TooManyErrors;
        }
        if self.handle_error(events) {
            return;
        }
        if self.stop {
            if self.running == 0 && self.status == Status::Running {
                self.status = Status::Stopped;
                self.ticker = None;
                events.push(ManagerEvent::Stopped);
            }
            return;
        }
        if self.finished < self.jobs.len() {
            self.start_next();
            self.handle_error(events);
        } else if self.status == Status::Running {
            if !self.progress_interval.is_zero() {
                events.push(ManagerEvent::Progress(100));
            }
            self.ticker = None;
            self.status = Status::Finished;
        }
    }

    /// Reports whether a terminal error is pending. The transition and
    /// its event fire once, after the last running job drained.
    fn handle_error(&mut self, events: &mut Vec<ManagerEvent>) -> bool {
        if self.last_error == ErrorKind::NoError {
            return false;
        }
        if self.running == 0 && self.status == Status::Running {
            self.status = Status::Error;
            self.ticker = None;
            events.push(ManagerEvent::Error(self.last_error));
        }
        true
    }

    /// Assigns the first runnable waiting job to an idle worker. Jobs
    /// that are not ready rotate to the tail of the waiting queue, so
    /// submission order is preferred but blocked jobs do not starve the
    /// rest. If nothing can start while nothing is running, the
    /// dependency graph cannot make progress and the run is doomed.
    fn start_next(&mut self) {
        let Some(worker_id) = self.idle.pop_front() else {
            return;
        };
        if self.started < self.jobs.len() {
            for _ in 0..self.waiting.len() {
                let Some(index) = self.waiting.pop_front() else {
                    break;
                };
                if self.jobs[index].can_start() {
                    let job = self.jobs[index].clone();
                    tracing::debug!(
                        job = %job.core().id(),
                        index,
                        worker = worker_id,
                        "job assigned"
                    );
                    self.workers[worker_id].assign(index, job);
                    self.started += 1;
                    self.running += 1;
                    return;
                }
                self.waiting.push_back(index);
            }
            if self.running == 0 {
                tracing::warn!(
                    unstarted = self.waiting.len(),
                    "could not find a job to start"
                );
                self.last_error = ErrorKind::NoJobReady;
            }
        }
        self.idle.push_back(worker_id);
    }
}
