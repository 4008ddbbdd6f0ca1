//! Logical thread state, socket status and I/O interest

use core::fmt;

/// State of a logical thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// In the run queue
    Ready = 0,

    /// Currently executing (exactly one per runtime)
    Running = 1,

    /// Parked on a descriptor or a sleep deadline
    Blocked = 2,

    /// Entry function returned, stack awaiting reclaim
    Finished = 3,
}

impl ThreadState {
    #[inline]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, ThreadState::Ready)
    }

    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, ThreadState::Finished)
    }
}

/// Connection status of a socket
///
/// Legal transitions: `Init -> Connected -> Disconnected` and
/// `Init -> Disconnected`. Leaving `Disconnected` requires `close` then
/// `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStatus {
    Init,
    Connected,
    Disconnected,
}

impl fmt::Display for SocketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketStatus::Init => write!(f, "init"),
            SocketStatus::Connected => write!(f, "connected"),
            SocketStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Readiness a logical thread waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}
