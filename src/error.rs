use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Job error codes at or above this value are reserved for callers.
/// Everything below belongs to the scheduler itself.
pub const USER_ERROR_BASE: i32 = 1000;

/// Terminal failure kinds reported by [`JobManager`](crate::JobManager)
/// and [`SessionManager`](crate::SessionManager).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No error occurred.
    #[error("no error")]
    NoError,

    /// The number of failed jobs exceeded the allowed error budget.
    #[error("number of failed jobs exceeds the allowed error budget")]
    TooManyErrors,

    /// The waiting queue is not empty, but no queued job can start and
    /// nothing is running. The dependency graph cannot make progress.
    #[error("no queued job is ready to start")]
    NoJobReady,

    /// The session controller could not start its job manager.
    #[error("job processing could not be started")]
    CouldNotStart,

    /// An impossible state transition was observed. If this is ever
    /// emitted, please file a bug report.
    #[error("internal state fault")]
    ImplementationError,

    /// Caller-defined error. Codes start at [`USER_ERROR_BASE`].
    #[error("user defined error {0}")]
    User(i32),
}

impl ErrorKind {
    /// Stable numeric code for logs and persisted run reports.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::NoError => 0,
            ErrorKind::TooManyErrors => 1,
            ErrorKind::NoJobReady => 2,
            ErrorKind::CouldNotStart => 3,
            ErrorKind::ImplementationError => 900,
            ErrorKind::User(code) => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorKind::NoError.code(), 0);
        assert_eq!(ErrorKind::ImplementationError.code(), 900);
        assert_eq!(ErrorKind::User(USER_ERROR_BASE).code(), 1000);
    }

    #[test]
    fn display_names_the_failure() {
        assert_eq!(
            ErrorKind::NoJobReady.to_string(),
            "no queued job is ready to start"
        );
    }
}
