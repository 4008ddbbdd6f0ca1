//! # stfarm-core
//!
//! Core types shared by the stfarm runtime and the task farm built on it.
//!
//! This crate holds no scheduling logic. It defines the vocabulary the
//! other crates speak:
//!
//! - `id` - logical thread handles and task ids
//! - `state` - logical thread state, socket status, I/O interest
//! - `error` - numeric error codes, `StError` and the runtime error enum
//! - `kprint` - leveled stderr logging with per-logical-thread prefix
//! - `env` - environment variable helpers used by the config layers

pub mod id;
pub mod state;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::{TaskId, ThreadHandle};
pub use state::{Interest, SocketStatus, ThreadState};
pub use error::{RuntimeError, RuntimeResult, StError, StResult};
pub use env::{env_get, env_get_bool, env_get_opt};

/// Constants for stack layout and runtime limits
pub mod constants {
    /// Default usable stack size per logical thread (256 KB)
    pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

    /// Smallest stack the runtime will hand out
    pub const MIN_STACK_SIZE: usize = 16 * 1024;

    /// Guard page size below every stack
    pub const GUARD_SIZE: usize = 4096;

    /// Default cap on live logical threads
    pub const DEFAULT_MAX_THREADS: usize = 65536;

    /// Default number of readiness events fetched per poll
    pub const DEFAULT_MAX_EVENTS: usize = 1024;
}
