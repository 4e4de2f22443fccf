use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use threadmill::{
    ErrorKind, Job, JobCore, JobManager, SessionConfig, SessionEvent, SessionManager,
    SessionSource, SessionStatus,
};

struct TrivialJob {
    core: JobCore,
}

impl TrivialJob {
    fn new() -> Self {
        Self {
            core: JobCore::new(),
        }
    }
}

impl Job for TrivialJob {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn run(&self) {}
}

struct FailJob {
    core: JobCore,
}

impl Job for FailJob {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn run(&self) {
        self.core.report_error(1);
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

/// Populates each session with a fixed number of trivial jobs.
struct CountSource {
    counts: Vec<usize>,
}

impl SessionSource for CountSource {
    fn session_count(&self) -> usize {
        self.counts.len()
    }

    fn init_session(&mut self, index: usize, manager: &JobManager) {
        for _ in 0..self.counts[index] {
            manager.append_job(TrivialJob::new());
        }
    }
}

/// Session 0 succeeds, session 1 fails every job.
struct FailingSecondSource;

impl SessionSource for FailingSecondSource {
    fn session_count(&self) -> usize {
        3
    }

    fn init_session(&mut self, index: usize, manager: &JobManager) {
        for _ in 0..10 {
            if index == 1 {
                manager.append_job(FailJob {
                    core: JobCore::new(),
                });
            } else {
                manager.append_job(TrivialJob::new());
            }
        }
    }
}

/// Every job fails, but each session allows it.
struct TolerantSource;

impl SessionSource for TolerantSource {
    fn session_count(&self) -> usize {
        2
    }

    fn init_session(&mut self, _index: usize, manager: &JobManager) {
        for _ in 0..5 {
            manager.append_job(FailJob {
                core: JobCore::new(),
            });
        }
    }

    fn allowed_errors(&self, _index: usize) -> i32 {
        -1
    }
}

struct GateSource {
    entered: Sender<()>,
    gate: Receiver<()>,
}

impl SessionSource for GateSource {
    fn session_count(&self) -> usize {
        2
    }

    fn init_session(&mut self, _index: usize, manager: &JobManager) {
        for _ in 0..2 {
            manager.append_job(GateJob {
                core: JobCore::new(),
                entered: self.entered.clone(),
                gate: self.gate.clone(),
            });
        }
    }
}

/// Receives session events until the terminal one.
fn collect_run(events: &Receiver<SessionEvent>, timeout: Duration) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = events
            .recv_timeout(timeout)
            .expect("no terminal session event before the timeout");
        let terminal = matches!(
            event,
            SessionEvent::Completed | SessionEvent::Stopped(_) | SessionEvent::Error { .. }
        );
        seen.push(event);
        if terminal {
            return seen;
        }
    }
}

#[test]
fn three_sessions_run_back_to_back() {
    let sessions = SessionManager::with_config(
        CountSource {
            counts: vec![50, 100, 200],
        },
        SessionConfig::default().with_thread_count(4),
    );
    let events = sessions.subscribe();

    assert!(sessions.start());
    let run = collect_run(&events, Duration::from_secs(30));

    assert!(sessions.is_finished());
    assert_eq!(sessions.current_session(), 3);
    assert_eq!(sessions.finished_jobs(), 350);

    let completed: Vec<_> = run
        .iter()
        .filter_map(|event| match event {
            SessionEvent::SessionCompleted(index) => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![0, 1, 2]);
    assert!(matches!(run.last(), Some(SessionEvent::Completed)));
}

#[test]
fn a_finished_session_manager_can_run_again() {
    let sessions = SessionManager::new(CountSource {
        counts: vec![10, 20],
    });
    let events = sessions.subscribe();

    assert!(sessions.start());
    collect_run(&events, Duration::from_secs(30));
    assert_eq!(sessions.finished_jobs(), 30);

    assert!(sessions.start());
    collect_run(&events, Duration::from_secs(30));
    assert!(sessions.is_finished());
    assert_eq!(sessions.current_session(), 2);
    assert_eq!(sessions.finished_jobs(), 30);
}

#[test]
fn a_failing_session_aborts_the_sequence() {
    let sessions = SessionManager::new(FailingSecondSource);
    let events = sessions.subscribe();

    assert!(sessions.start());
    let run = collect_run(&events, Duration::from_secs(30));

    assert!(!sessions.is_finished());
    assert_eq!(sessions.status(), SessionStatus::Error);
    assert!(matches!(
        run.last(),
        Some(SessionEvent::Error {
            session: 1,
            kind: ErrorKind::TooManyErrors,
        })
    ));
}

#[test]
fn per_session_error_budget_is_honored() {
    let sessions = SessionManager::new(TolerantSource);
    let events = sessions.subscribe();

    assert!(sessions.start());
    let run = collect_run(&events, Duration::from_secs(30));

    assert!(sessions.is_finished());
    assert_eq!(sessions.current_session(), 2);
    // All jobs terminated, none successfully, and the run still completed.
    assert_eq!(sessions.finished_jobs(), 10);
    assert!(matches!(run.last(), Some(SessionEvent::Completed)));
}

#[test]
fn empty_source_completes_immediately() {
    let sessions = SessionManager::new(CountSource { counts: Vec::new() });
    let events = sessions.subscribe();

    assert!(sessions.start());
    assert!(sessions.is_finished());
    assert!(matches!(
        events.recv_timeout(Duration::from_secs(1)),
        Ok(SessionEvent::Completed)
    ));
}

#[test]
fn stop_interrupts_the_current_session() {
    let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
    let sessions = SessionManager::with_config(
        GateSource {
            entered: entered_tx,
            gate: gate_rx,
        },
        SessionConfig::default().with_thread_count(2),
    );
    let events = sessions.subscribe();

    assert!(sessions.start());
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("no job entered its body");
    sessions.stop();
    gate_tx.send(()).unwrap();
    gate_tx.send(()).unwrap();
    let run = collect_run(&events, Duration::from_secs(30));

    assert!(!sessions.is_finished());
    assert_eq!(sessions.status(), SessionStatus::Stopped);
    assert!(matches!(run.last(), Some(SessionEvent::Stopped(0))));
}

#[test]
fn start_while_running_is_refused() {
    let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
    let sessions = SessionManager::with_config(
        GateSource {
            entered: entered_tx,
            gate: gate_rx,
        },
        SessionConfig::default().with_thread_count(2),
    );
    let events = sessions.subscribe();

    assert!(sessions.start());
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("no job entered its body");
    assert!(!sessions.start());

    for _ in 0..4 {
        gate_tx.send(()).unwrap();
    }
    let run = collect_run(&events, Duration::from_secs(30));
    assert!(matches!(run.last(), Some(SessionEvent::Completed)));
    assert!(sessions.is_finished());
}
