//! Error types and numeric error codes
//!
//! Farm-level operations report a numeric code (`ERROR_*`) plus the OS
//! errno that caused it, so log lines can carry both. The runtime speaks
//! [`RuntimeError`], which converts into an [`StError`] once the caller
//! decides which farm-level code applies.

use core::fmt;
use nix::errno::Errno;

pub const ERROR_SUCCESS: i32 = 0;

// Socket layer
pub const ERROR_SOCKET: i32 = 100;
pub const ERROR_OPEN_SOCKET: i32 = 101;
pub const ERROR_CONNECT: i32 = 102;
pub const ERROR_READ: i32 = 103;
pub const ERROR_SEND: i32 = 104;
pub const ERROR_CLOSE: i32 = 105;
pub const ERROR_DNS_RESOLVE: i32 = 106;

// Runtime layer
pub const ERROR_ST_INITIALIZE: i32 = 200;
pub const ERROR_ST_THREAD_CREATE: i32 = 201;
pub const ERROR_ST_THREAD_JOIN: i32 = 202;

// Task layer
pub const ERROR_TASK_PANIC: i32 = 300;

/// Short name for a code, used in log lines
pub fn code_name(code: i32) -> &'static str {
    match code {
        ERROR_SUCCESS => "success",
        ERROR_SOCKET => "socket",
        ERROR_OPEN_SOCKET => "open-socket",
        ERROR_CONNECT => "connect",
        ERROR_READ => "read",
        ERROR_SEND => "send",
        ERROR_CLOSE => "close",
        ERROR_DNS_RESOLVE => "dns-resolve",
        ERROR_ST_INITIALIZE => "st-initialize",
        ERROR_ST_THREAD_CREATE => "st-thread-create",
        ERROR_ST_THREAD_JOIN => "st-thread-join",
        ERROR_TASK_PANIC => "task-panic",
        _ => "unknown",
    }
}

/// Result type for farm-level operations
pub type StResult<T> = Result<T, StError>;

/// A farm-level failure: numeric code plus the errno behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StError {
    code: i32,
    errno: Option<Errno>,
}

impl StError {
    pub const fn new(code: i32) -> Self {
        Self { code, errno: None }
    }

    pub const fn with_errno(code: i32, errno: Errno) -> Self {
        Self { code, errno: Some(errno) }
    }

    /// Build from a runtime failure, keeping its errno.
    pub fn from_runtime(code: i32, err: &RuntimeError) -> Self {
        Self { code, errno: Some(err.errno()) }
    }

    #[inline]
    pub const fn code(&self) -> i32 {
        self.code
    }

    #[inline]
    pub const fn errno(&self) -> Option<Errno> {
        self.errno
    }
}

impl fmt::Display for StError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errno {
            Some(e) => write!(f, "{} error (ret={}, errno={})", code_name(self.code), self.code, e),
            None => write!(f, "{} error (ret={})", code_name(self.code), self.code),
        }
    }
}

impl std::error::Error for StError {}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised by the cooperative runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// No runtime on this OS thread
    NotInitialized,

    /// `init` called twice on the same OS thread
    AlreadyInitialized,

    /// Configuration rejected by `validate`
    InvalidConfig(&'static str),

    /// The readiness backend could not be created
    BackendInit(Errno),

    /// Arming a descriptor in the readiness backend failed
    Register(Errno),

    /// Waiting on the readiness backend failed
    Poll(Errno),

    /// Stack mapping failed
    StackAllocation(Errno),

    /// Live thread limit reached
    NoSlotsAvailable,

    /// A wait deadline expired before the descriptor became ready
    Timeout,
}

impl RuntimeError {
    /// Closest errno for this failure
    pub fn errno(&self) -> Errno {
        match self {
            RuntimeError::NotInitialized => Errno::EINVAL,
            RuntimeError::AlreadyInitialized => Errno::EBUSY,
            RuntimeError::InvalidConfig(_) => Errno::EINVAL,
            RuntimeError::BackendInit(e)
            | RuntimeError::Register(e)
            | RuntimeError::Poll(e)
            | RuntimeError::StackAllocation(e) => *e,
            RuntimeError::NoSlotsAvailable => Errno::EAGAIN,
            RuntimeError::Timeout => Errno::ETIME,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::NotInitialized => write!(f, "runtime not initialized"),
            RuntimeError::AlreadyInitialized => write!(f, "runtime already initialized"),
            RuntimeError::InvalidConfig(why) => write!(f, "invalid runtime config: {}", why),
            RuntimeError::BackendInit(e) => write!(f, "event backend init failed: {}", e),
            RuntimeError::Register(e) => write!(f, "event backend register failed: {}", e),
            RuntimeError::Poll(e) => write!(f, "event backend wait failed: {}", e),
            RuntimeError::StackAllocation(e) => write!(f, "stack allocation failed: {}", e),
            RuntimeError::NoSlotsAvailable => write!(f, "no logical thread slots available"),
            RuntimeError::Timeout => write!(f, "wait timed out"),
        }
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = StError::new(ERROR_CONNECT);
        assert_eq!(e.to_string(), "connect error (ret=102)");

        let e = StError::with_errno(ERROR_READ, Errno::ECONNRESET);
        assert!(e.to_string().starts_with("read error (ret=103, errno="));
    }

    #[test]
    fn test_from_runtime_keeps_errno() {
        let e = StError::from_runtime(ERROR_ST_THREAD_CREATE, &RuntimeError::NoSlotsAvailable);
        assert_eq!(e.code(), ERROR_ST_THREAD_CREATE);
        assert_eq!(e.errno(), Some(Errno::EAGAIN));

        let e = StError::from_runtime(ERROR_READ, &RuntimeError::Timeout);
        assert_eq!(e.errno(), Some(Errno::ETIME));
    }

    #[test]
    fn test_code_names() {
        assert_eq!(code_name(ERROR_SUCCESS), "success");
        assert_eq!(code_name(ERROR_ST_INITIALIZE), "st-initialize");
        assert_eq!(code_name(ERROR_ST_THREAD_JOIN), "st-thread-join");
        assert_eq!(code_name(-1), "unknown");
    }
}
