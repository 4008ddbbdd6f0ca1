//! Identifier types
//!
//! Two id spaces live side by side:
//!
//! - [`ThreadHandle`] names a logical thread inside the scheduler. Handles
//!   are never reused for the lifetime of a runtime.
//! - [`TaskId`] names a unit of work. Ids come from one process-wide
//!   counter starting at 1; `0` means "no task".

use core::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Opaque handle of a logical thread
///
/// The primordial thread (the one that initialized the runtime) is
/// always [`ThreadHandle::PRIMORDIAL`]. Spawned threads count up from 1.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ThreadHandle(u64);

impl ThreadHandle {
    /// Sentinel for "not running inside the runtime"
    pub const NONE: ThreadHandle = ThreadHandle(u64::MAX);

    /// The thread that called `init`
    pub const PRIMORDIAL: ThreadHandle = ThreadHandle(0);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        ThreadHandle(raw)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u64::MAX
    }

    #[inline]
    pub const fn is_primordial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "ThreadHandle(NONE)")
        } else {
            write!(f, "ThreadHandle({})", self.0)
        }
    }
}

impl fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Default for ThreadHandle {
    fn default() -> Self {
        ThreadHandle::NONE
    }
}

static NEXT_TASK_ID: AtomicU32 = AtomicU32::new(1);

/// Task identifier, unique per process
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct TaskId(u32);

impl TaskId {
    /// No task registered
    pub const NONE: TaskId = TaskId(0);

    /// Take the next id from the process-wide counter.
    pub fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn new(raw: u32) -> Self {
        TaskId(raw)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TaskId {
    #[inline]
    fn from(raw: u32) -> Self {
        TaskId(raw)
    }
}
