//! Sequencing of job batches too large to materialize at once.
//!
//! A [`SessionManager`] runs N disjoint job sets ("sessions") through a
//! single internal [`JobManager`]: each session is populated, run to
//! quiescence, then cleared before the next one starts. The caller
//! supplies a [`SessionSource`] that knows how many sessions exist and
//! how to populate each one.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::config::{ManagerConfig, SessionConfig};
use crate::error::ErrorKind;
use crate::event::{EventHub, ManagerEvent, SessionEvent};
use crate::job::Job;
use crate::manager::JobManager;

/// Supplies the sessions a [`SessionManager`] runs.
pub trait SessionSource: Send + 'static {
    /// Total number of sessions.
    fn session_count(&self) -> usize;

    /// Populates the manager with the jobs of the given session. Called
    /// once per session, after the previous session was cleared.
    fn init_session(&mut self, index: usize, manager: &JobManager);

    /// Error budget for the given session. Negative disables the cap.
    fn allowed_errors(&self, index: usize) -> i32 {
        let _ = index;
        0
    }
}

/// Run state of a [`SessionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// A session's jobs are being processed.
    Running,
    /// Between sessions: the previous session finished, the next one is
    /// not started yet.
    Paused,
    /// All sessions finished.
    Finished,
    /// Processing was stopped from outside.
    Stopped,
    /// A session ended in a terminal error.
    Error,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Finished => write!(f, "finished"),
            SessionStatus::Stopped => write!(f, "stopped"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

/// Runs the sessions of a [`SessionSource`] one after another.
///
/// Completion of one session triggers initialization and start of the
/// next, after an optional inter-session delay. Aggregate progress and
/// per-session completion are reported through
/// [`subscribe`](SessionManager::subscribe).
pub struct SessionManager<S: SessionSource> {
    shared: Arc<SessionShared<S>>,
    // Keep-alive handle for the control thread; dropping it ends the
    // thread.
    _control: Sender<()>,
}

struct SessionShared<S> {
    source: Mutex<S>,
    manager: JobManager,
    state: Mutex<SessionState>,
    events: EventHub<SessionEvent>,
    delay: Duration,
}

struct SessionState {
    status: SessionStatus,
    session_index: usize,
    session_count: usize,
    finished_jobs: usize,
}

impl<S: SessionSource> SessionManager<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, SessionConfig::default())
    }

    pub fn with_config(source: S, config: SessionConfig) -> Self {
        let manager = JobManager::with_config(
            ManagerConfig::default()
                .with_thread_count(config.thread_count)
                .with_progress_interval_ms(config.progress_interval_ms)
                .with_report_job_finish(true),
        );
        let inner_events = manager.subscribe();
        let shared = Arc::new(SessionShared {
            source: Mutex::new(source),
            manager,
            state: Mutex::new(SessionState {
                status: SessionStatus::Finished,
                session_index: 0,
                session_count: 0,
                finished_jobs: 0,
            }),
            events: EventHub::new(),
            delay: Duration::from_millis(config.session_delay_ms),
        });
        let (control_tx, control_rx) = unbounded::<()>();
        let weak = Arc::downgrade(&shared);
        thread::spawn(move || control_loop(weak, inner_events, control_rx));
        SessionManager {
            shared,
            _control: control_tx,
        }
    }

    /// Subscribes to session lifecycle events.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Starts executing session 0.
    ///
    /// Returns false when already running, when the source has no
    /// sessions, or when the first session could not be started.
    pub fn start(&self) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if matches!(state.status, SessionStatus::Running | SessionStatus::Paused) {
            tracing::warn!("cannot start the session manager while it is already running");
            return false;
        }
        let count = self.shared.source.lock().unwrap().session_count();
        if count == 0 {
            tracing::warn!("no sessions to process");
            state.status = SessionStatus::Finished;
            drop(state);
            self.shared.events.emit(SessionEvent::Completed);
            return true;
        }
        state.session_index = 0;
        state.session_count = count;
        state.finished_jobs = 0;
        state.status = SessionStatus::Paused;
        drop(state);
        tracing::info!(sessions = count, "starting session processing");
        SessionShared::start_next_session(&self.shared)
    }

    /// Stops the current session, or transitions directly to Stopped
    /// when nothing is running.
    pub fn stop(&self) {
        if self.shared.manager.is_running() {
            self.shared.manager.stop();
        } else {
            SessionShared::enter_stopped(&self.shared);
        }
    }

    /// Appends a job to the session currently being processed.
    pub fn append_job<J>(&self, job: J) -> Arc<J>
    where
        J: Job + 'static,
    {
        self.shared.manager.append_job(job)
    }

    /// Adds workers to the internal manager's pool. Valid at any time.
    pub fn add_threads(&self, threads: usize) {
        self.shared.manager.add_threads(threads);
    }

    pub fn thread_running_count(&self) -> usize {
        self.shared.manager.thread_running_count()
    }

    /// Index of the session being processed. Equals the session count
    /// after every session finished.
    pub fn current_session(&self) -> usize {
        self.shared.state.lock().unwrap().session_index
    }

    /// Total number of jobs that terminated, across all sessions.
    pub fn finished_jobs(&self) -> usize {
        self.shared.state.lock().unwrap().finished_jobs
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.state.lock().unwrap().status
    }

    /// True while sessions are processed or the controller is between
    /// two sessions.
    pub fn is_running(&self) -> bool {
        matches!(
            self.status(),
            SessionStatus::Running | SessionStatus::Paused
        )
    }

    /// True if every session finished successfully.
    pub fn is_finished(&self) -> bool {
        self.status() == SessionStatus::Finished
    }
}

impl<S: SessionSource> SessionShared<S> {
    /// Clears the internal manager, lets the source populate the next
    /// session, and starts it. Reports whether the session started.
    fn start_next_session(shared: &Arc<Self>) -> bool {
        // A stop requested between sessions lands here: the inner
        // manager still carries its stop flag until cleared.
        if shared.manager.is_stopped() {
            Self::enter_stopped(shared);
            return false;
        }
        shared.manager.clear();
        let index = shared.state.lock().unwrap().session_index;
        {
            let mut source = shared.source.lock().unwrap();
            shared.manager.set_allowed_errors(source.allowed_errors(index));
            source.init_session(index, &shared.manager);
        }
        tracing::debug!(session = index, jobs = shared.manager.job_count(), "session initialized");
        shared.state.lock().unwrap().status = SessionStatus::Running;
        if !shared.manager.start() {
            shared.state.lock().unwrap().status = SessionStatus::Error;
            tracing::error!(session = index, "session could not be started");
            shared.events.emit(SessionEvent::Error {
                session: index,
                kind: ErrorKind::CouldNotStart,
            });
            return false;
        }
        true
    }

    /// Reacts to one event of the internal job manager.
    fn handle_manager_event(shared: &Arc<Self>, event: ManagerEvent) {
        match event {
            ManagerEvent::JobCompleted(_) => {
                shared.state.lock().unwrap().finished_jobs += 1;
            }
            ManagerEvent::Completed => Self::handle_session_finished(shared),
            ManagerEvent::Error(kind) => {
                let mut state = shared.state.lock().unwrap();
                state.status = SessionStatus::Error;
                let session = state.session_index;
                drop(state);
                tracing::error!(session, %kind, "session failed");
                shared.events.emit(SessionEvent::Error { session, kind });
            }
            ManagerEvent::Stopped => Self::enter_stopped(shared),
            ManagerEvent::Progress(percent) => {
                let state = shared.state.lock().unwrap();
                if state.session_count == 0 {
                    return;
                }
                let total =
                    (100 * state.session_index + percent as usize) / state.session_count;
                drop(state);
                shared.events.emit(SessionEvent::Progress(total as u8));
            }
        }
    }

    fn handle_session_finished(shared: &Arc<Self>) {
        let mut state = shared.state.lock().unwrap();
        if state.status != SessionStatus::Running {
            // A completion can only arrive while a session runs; anything
            // else means the controller lost track of its own state.
            state.status = SessionStatus::Error;
            let session = state.session_index;
            drop(state);
            tracing::error!(session, "session completed outside of a running state");
            shared.events.emit(SessionEvent::Error {
                session,
                kind: ErrorKind::ImplementationError,
            });
            return;
        }
        state.status = SessionStatus::Paused;
        let session = state.session_index;
        state.session_index += 1;
        let more = state.session_index < state.session_count;
        drop(state);

        tracing::info!(session, "session finished");
        shared.events.emit(SessionEvent::SessionCompleted(session));
        if more {
            if !shared.delay.is_zero() {
                thread::sleep(shared.delay);
            }
            Self::start_next_session(shared);
        } else {
            shared.state.lock().unwrap().status = SessionStatus::Finished;
            tracing::info!("all sessions finished");
            shared.events.emit(SessionEvent::Completed);
        }
    }

    fn enter_stopped(shared: &Arc<Self>) {
        let mut state = shared.state.lock().unwrap();
        if state.status == SessionStatus::Stopped {
            return;
        }
        state.status = SessionStatus::Stopped;
        let session = state.session_index;
        drop(state);
        tracing::info!(session, "session processing stopped");
        shared.events.emit(SessionEvent::Stopped(session));
    }
}

/// Pumps the internal manager's events until the session manager is
/// dropped.
fn control_loop<S: SessionSource>(
    shared: Weak<SessionShared<S>>,
    inner_events: Receiver<ManagerEvent>,
    shutdown: Receiver<()>,
) {
    loop {
        crossbeam_channel::select! {
            recv(inner_events) -> msg => {
                let Ok(event) = msg else {
                    break;
                };
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                SessionShared::handle_manager_event(&shared, event);
            }
            recv(shutdown) -> _ => {
                // Only ever disconnects.
                break;
            }
        }
    }
}
