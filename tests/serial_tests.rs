use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use threadmill::{ErrorKind, Job, JobCore, JobManager, SerialQueue};

/// Appends its sequence number to a shared trace when run.
struct RecordJob {
    core: JobCore,
    seq: usize,
    trace: Arc<Mutex<Vec<usize>>>,
}

impl Job for RecordJob {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn run(&self) {
        self.trace.lock().unwrap().push(self.seq);
    }
}

/// Fails with the given code without doing any work.
struct FailJob {
    core: JobCore,
    code: i32,
}

impl Job for FailJob {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn run(&self) {
        self.core.report_error(self.code);
    }
}

/// Announces that it entered its body, then blocks on the gate channel.
struct GateJob {
    core: JobCore,
    entered: Sender<()>,
    gate: Receiver<()>,
}

impl Job for GateJob {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn run(&self) {
        let _ = self.entered.send(());
        let _ = self.gate.recv();
    }
}

fn wait_until_idle(manager: &JobManager, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while manager.is_running() {
        assert!(Instant::now() < deadline, "manager did not go idle in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn sub_jobs_run_in_appending_order() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let queue = SerialQueue::new();
    for seq in 0..50 {
        queue.append(RecordJob {
            core: JobCore::new(),
            seq,
            trace: trace.clone(),
        });
    }
    assert_eq!(queue.job_count(), 50);

    let manager = JobManager::new(2);
    let queue = manager.append_job(queue);
    assert!(manager.start());
    wait_until_idle(&manager, Duration::from_secs(10));

    assert!(manager.is_finished());
    assert!(queue.core().is_finished());
    assert_eq!(queue.progress(), 100);
    let trace = trace.lock().unwrap();
    assert_eq!(*trace, (0..50).collect::<Vec<_>>());
}

#[test]
fn first_error_aborts_the_queue() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let queue = SerialQueue::new();
    queue.append(RecordJob {
        core: JobCore::new(),
        seq: 0,
        trace: trace.clone(),
    });
    queue.append(FailJob {
        core: JobCore::new(),
        code: 7,
    });
    queue.append(RecordJob {
        core: JobCore::new(),
        seq: 2,
        trace: trace.clone(),
    });

    let manager = JobManager::new(1);
    let queue = manager.append_job(queue);
    assert!(manager.start());
    wait_until_idle(&manager, Duration::from_secs(10));

    // The failing sub-job's code propagates to the queue, and with the
    // default zero error budget the run ends in a terminal error.
    assert_eq!(queue.core().error_code(), 7);
    assert!(!queue.core().is_finished());
    assert!(!manager.is_finished());
    assert_eq!(manager.last_error(), ErrorKind::TooManyErrors);
    assert_eq!(*trace.lock().unwrap(), vec![0]);
}

#[test]
fn stop_skips_the_remaining_sub_jobs() {
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
    let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
    let trace = Arc::new(Mutex::new(Vec::new()));
    let queue = SerialQueue::new();
    queue.append(GateJob {
        core: JobCore::new(),
        entered: entered_tx,
        gate: gate_rx,
    });
    queue.append(RecordJob {
        core: JobCore::new(),
        seq: 1,
        trace: trace.clone(),
    });

    let manager = JobManager::new(1);
    let queue = manager.append_job(queue);
    assert!(manager.start());
    // Only stop once the queue is inside its first sub-job, so the stop
    // request cannot be erased by the pre-run flag reset.
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("queue never entered its body");
    manager.stop();
    gate_tx.send(()).unwrap();
    wait_until_idle(&manager, Duration::from_secs(10));

    assert!(queue.core().is_cancelled());
    assert!(!queue.core().is_finished());
    assert!(!manager.is_finished());
    assert!(trace.lock().unwrap().is_empty(), "sub-job ran after the stop");
}

#[test]
fn progress_tracks_the_current_sub_job() {
    let queue = SerialQueue::new();
    assert_eq!(queue.progress(), 0);

    let trace = Arc::new(Mutex::new(Vec::new()));
    for seq in 0..4 {
        queue.append(RecordJob {
            core: JobCore::new(),
            seq,
            trace: trace.clone(),
        });
    }
    // Not started yet.
    assert_eq!(queue.progress(), 0);

    queue.run();
    assert_eq!(queue.progress(), 100);
}

#[test]
fn cleared_queue_reports_no_progress() {
    let queue = SerialQueue::new();
    queue.append(FailJob {
        core: JobCore::new(),
        code: 1,
    });
    queue.clear();
    assert_eq!(queue.job_count(), 0);
    assert_eq!(queue.progress(), 0);
}
