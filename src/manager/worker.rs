use std::sync::{Arc, Weak};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::job::Job;
use crate::manager::Shared;

/// One assignment handed to a worker: a job and its table index.
pub(crate) struct Assignment {
    index: usize,
    job: Arc<dyn Job>,
}

/// A single reusable OS thread that executes one job at a time.
///
/// The thread blocks on its assignment channel and exits when the
/// channel disconnects, which happens when the manager drops this
/// handle. The index of the job currently bound to the worker lives
/// here so the manager can map a completion back to a table slot; it is
/// only touched under the manager lock.
pub(crate) struct Worker {
    id: usize,
    tx: Sender<Assignment>,
    current: Option<usize>,
}

impl Worker {
    pub(crate) fn spawn(id: usize, shared: Weak<Shared>) -> Self {
        let (tx, rx) = unbounded();
        thread::spawn(move || run_loop(id, rx, shared));
        Worker {
            id,
            tx,
            current: None,
        }
    }

    /// Binds a job to this worker and hands it to the worker thread.
    /// The worker must be idle.
    pub(crate) fn assign(&mut self, index: usize, job: Arc<dyn Job>) {
        debug_assert!(self.current.is_none(), "worker {} is busy", self.id);
        self.current = Some(index);
        self.tx.send(Assignment { index, job }).unwrap();
    }

    /// Table index of the job currently bound, if any.
    pub(crate) fn job_index(&self) -> Option<usize> {
        self.current
    }

    /// Unbinds the completed job, returning its table index.
    pub(crate) fn complete(&mut self) -> Option<usize> {
        self.current.take()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.current.is_some()
    }
}

/// The worker wrapper around each job body: reset the cancel flag and
/// error code, run, then notify the manager exactly once. The weak
/// back-reference keeps a dropped manager from outliving its pool.
fn run_loop(id: usize, rx: Receiver<Assignment>, shared: Weak<Shared>) {
    tracing::trace!(worker = id, "worker thread started");
    while let Ok(Assignment { index, job }) = rx.recv() {
        tracing::trace!(worker = id, job = index, "running job");
        job.core().reset();
        job.run();
        let Some(shared) = shared.upgrade() else {
            break;
        };
        Shared::job_terminated(&shared, id);
    }
    tracing::trace!(worker = id, "worker thread exiting");
}
