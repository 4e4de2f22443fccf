use serde::{Deserialize, Serialize};

/// Configuration for a [`JobManager`](crate::JobManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Number of worker threads. Zero means one per available CPU.
    pub thread_count: usize,
    /// Number of jobs allowed to fail before the run is aborted with
    /// `TooManyErrors`. Negative disables the cap.
    pub allowed_errors: i32,
    /// Interval between periodic progress events, in milliseconds.
    /// Zero disables progress reporting.
    pub progress_interval_ms: u64,
    /// Emit a per-job completion event for every job that terminates.
    pub report_job_finish: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            thread_count: 0,
            allowed_errors: 0,
            progress_interval_ms: 0,
            report_job_finish: false,
        }
    }
}

impl ManagerConfig {
    pub fn with_thread_count(mut self, threads: usize) -> Self {
        self.thread_count = threads;
        self
    }

    pub fn with_allowed_errors(mut self, allowed: i32) -> Self {
        self.allowed_errors = allowed;
        self
    }

    pub fn with_progress_interval_ms(mut self, interval_ms: u64) -> Self {
        self.progress_interval_ms = interval_ms;
        self
    }

    pub fn with_report_job_finish(mut self, report: bool) -> Self {
        self.report_job_finish = report;
        self
    }
}

/// Configuration for a [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Worker threads for the internal job manager. Zero means one per CPU.
    pub thread_count: usize,
    /// Pause between one session finishing and the next one starting,
    /// in milliseconds.
    pub session_delay_ms: u64,
    /// Progress interval forwarded to the internal job manager.
    pub progress_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            thread_count: 0,
            session_delay_ms: 0,
            progress_interval_ms: 0,
        }
    }
}

impl SessionConfig {
    pub fn with_thread_count(mut self, threads: usize) -> Self {
        self.thread_count = threads;
        self
    }

    pub fn with_session_delay_ms(mut self, delay_ms: u64) -> Self {
        self.session_delay_ms = delay_ms;
        self
    }

    pub fn with_progress_interval_ms(mut self, interval_ms: u64) -> Self {
        self.progress_interval_ms = interval_ms;
        self
    }
}
