use std::fmt;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::ErrorKind;
use crate::job::Job;

/// Lifecycle events emitted by a [`JobManager`](crate::JobManager).
///
/// At most one of `Completed`, `Stopped` and `Error` is emitted per run.
#[derive(Clone)]
pub enum ManagerEvent {
    /// Every job in the table terminated and the error budget held.
    Completed,
    /// A single job terminated. Only emitted when per-job reporting is
    /// enabled, and always before any dispatch effect of the same tick.
    JobCompleted(Arc<dyn Job>),
    /// The run ended in a terminal error.
    Error(ErrorKind),
    /// The run was stopped from outside and all running jobs drained.
    Stopped,
    /// Percentage of terminated jobs, 0..=100.
    Progress(u8),
}

impl fmt::Debug for ManagerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerEvent::Completed => f.write_str("Completed"),
            ManagerEvent::JobCompleted(job) => {
                f.debug_tuple("JobCompleted").field(&job.core().id()).finish()
            }
            ManagerEvent::Error(kind) => f.debug_tuple("Error").field(kind).finish(),
            ManagerEvent::Stopped => f.write_str("Stopped"),
            ManagerEvent::Progress(percent) => f.debug_tuple("Progress").field(percent).finish(),
        }
    }
}

/// Lifecycle events emitted by a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// All sessions finished.
    Completed,
    /// One session ran to quiescence; carries the session index.
    SessionCompleted(usize),
    /// A session ended in a terminal error.
    Error { session: usize, kind: ErrorKind },
    /// Processing was stopped during the given session.
    Stopped(usize),
    /// Aggregate progress across all sessions, 0..=100.
    Progress(u8),
}

/// Fans events out to every subscriber channel.
///
/// Subscribers that dropped their receiver are pruned on the next emit.
pub(crate) struct EventHub<E> {
    senders: Mutex<Vec<Sender<E>>>,
}

impl<E: Clone> EventHub<E> {
    pub(crate) fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = unbounded();
        self.senders.lock().unwrap().push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: E) {
        self.senders
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
