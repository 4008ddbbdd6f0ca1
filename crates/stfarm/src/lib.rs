//! # stfarm - task farm for cooperative load clients
//!
//! Runs many network client tasks on one OS thread. Each task gets its
//! own logical thread from `stfarm-runtime`; socket calls park only that
//! thread, so thousands of clients fit in one process without locks.
//!
//! ## Quick Start
//!
//! ```ignore
//! use stfarm::{Farm, Socket, StContext, Task, TaskId, ERROR_SUCCESS};
//!
//! struct Hello { id: TaskId, ctx: StContext }
//!
//! impl Task for Hello {
//!     fn id(&self) -> TaskId { self.id }
//!     fn process(&mut self) -> i32 {
//!         let mut sock = Socket::new(&self.ctx);
//!         if let Err(e) = sock.connect("127.0.0.1", 1935) {
//!             return e.code();
//!         }
//!         match sock.write_all(b"hello") {
//!             Ok(()) => ERROR_SUCCESS,
//!             Err(e) => e.code(),
//!         }
//!     }
//! }
//!
//! fn main() {
//!     let farm = Farm::initialize(5.0).expect("runtime");
//!     for _ in 0..100 {
//!         let ctx = farm.context().clone();
//!         farm.spawn(Box::new(Hello { id: TaskId::next(), ctx })).expect("spawn");
//!     }
//!     farm.wait_all();
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Task implementations                     │
//! │                  process() -> ERROR_* code                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌─────────────┐
//!    │  Socket   │─────▶│ Statistic │      │  Identity   │
//!    │           │─────────────────────────▶│  Registry   │
//!    └───────────┘      └───────────┘      └─────────────┘
//!          │
//!          ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │                     stfarm-runtime                      │
//!    │       logical threads, epoll/poll, sleep queue          │
//!    └─────────────────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod farm;
pub mod socket;
pub mod statistic;
pub mod task;
pub mod utility;

pub use context::IdentityRegistry;
pub use farm::{Farm, StContext};
pub use socket::Socket;
pub use statistic::{throughput_mbps, StatSnapshot, Statistic};
pub use task::Task;
pub use utility::{build_random_mtime, current_time_ms, dns_resolve, init_random};

pub use stfarm_core::error::{self, StError, StResult, ERROR_SUCCESS};
pub use stfarm_core::{SocketStatus, TaskId, ThreadHandle};
pub use stfarm_runtime::{sleep, sleep_us, yield_now, EventSys, RuntimeConfig};
