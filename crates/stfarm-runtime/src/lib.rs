//! # stfarm-runtime
//!
//! Cooperative runtime for stfarm: many stackful logical threads
//! multiplexed on one OS thread, switching only when a thread blocks on
//! a descriptor, sleeps, yields or finishes.
//!
//! This crate provides:
//! - Context switching (architecture-specific assembly)
//! - Guarded mmap stacks
//! - Readiness backends (epoll, poll)
//! - Sleep queue and the run loop
//! - Blocking-style socket I/O on top of `wait_fd`
//!
//! ```ignore
//! use stfarm_runtime::{init, spawn, join_all, RuntimeConfig};
//!
//! init(RuntimeConfig::from_env())?;
//! spawn(|| {
//!     stfarm_runtime::sleep_us(1000);
//! })?;
//! join_all()?;
//! ```

pub mod config;
pub mod arch;
pub mod stack;
pub mod event;
pub mod timer;
pub mod scheduler;
pub mod io;

// Re-exports
pub use config::{EventSys, RuntimeConfig};
pub use event::EventBackend;
pub use scheduler::{
    attach_fd, current, forget_fd, init, is_initialized, join_all, live_threads, pending_timers,
    set_log_tag, sleep, sleep_us, spawn, wait_fd, yield_now,
};

cfg_if::cfg_if! {
    if #[cfg(not(target_os = "linux"))] {
        compile_error!("stfarm-runtime needs Linux (epoll, MAP_STACK)");
    }
}
