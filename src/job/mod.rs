//! The job contract and its building blocks.
//!
//! - [`Job`]: the trait the scheduler invokes — body, progress hint,
//!   start precondition, spawning hook, finalizer, cancellation.
//! - [`JobCore`]: the bookkeeping state every job embeds — identity,
//!   cancel flag, error code, terminal flags, dependency list.
//! - [`SerialQueue`]: a job that runs a list of sub-jobs sequentially
//!   within a single worker.

pub mod contract;
pub mod serial;
pub mod state;

pub use contract::Job;
pub use serial::SerialQueue;
pub use state::JobCore;
