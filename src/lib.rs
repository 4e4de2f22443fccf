//! A thread-pool job scheduling core.
//!
//! `threadmill` executes user-defined units of work across a fixed pool
//! of worker threads, honoring inter-job dependencies and dynamically
//! spawned child jobs, enforcing an error budget, and reporting
//! aggregate lifecycle events. It targets coarse-grained CPU-bound
//! tasks: work meaningful enough to amortize per-job bookkeeping, not
//! millions of sub-millisecond items.
//!
//! The pieces:
//!
//! - [`Job`] / [`JobCore`]: the work contract and its bookkeeping state.
//! - [`JobManager`]: the scheduler — worker pool, waiting queue,
//!   dependency-aware dispatch, error budget, cooperative stop.
//! - [`SerialQueue`]: a job that runs sub-jobs sequentially on one
//!   worker, for composing serial phases inside a parallel schedule.
//! - [`SessionManager`] / [`SessionSource`]: sequences batches of jobs
//!   too large to materialize at once.
//!
//! Jobs are in-memory and in-process; cancellation is cooperative. This
//! is not a work-stealing scheduler and not an async runtime.

pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod manager;
pub mod session;

pub use config::{ManagerConfig, SessionConfig};
pub use error::{ErrorKind, USER_ERROR_BASE};
pub use event::{ManagerEvent, SessionEvent};
pub use job::{Job, JobCore, SerialQueue};
pub use manager::{JobManager, Status};
pub use session::{SessionManager, SessionSource, SessionStatus};
