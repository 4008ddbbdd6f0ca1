//! Runtime configuration
//!
//! Library defaults with `STF_*` environment overrides, plus builder
//! setters for programmatic control.
//!
//! ```rust,ignore
//! use stfarm_runtime::config::{EventSys, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_env()
//!     .event_sys(EventSys::Poll)
//!     .stack_size(128 * 1024);
//! ```

use std::fmt;
use std::str::FromStr;

use stfarm_core::constants::{
    DEFAULT_MAX_EVENTS, DEFAULT_MAX_THREADS, DEFAULT_STACK_SIZE, MIN_STACK_SIZE,
};
use stfarm_core::env::{env_get, env_get_bool};

/// Readiness notification backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSys {
    /// Linux epoll, one-shot arming
    Epoll,
    /// Portable poll(2), rebuilt on every wait
    Poll,
}

impl FromStr for EventSys {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "epoll" | "alt" => Ok(EventSys::Epoll),
            "poll" | "default" => Ok(EventSys::Poll),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EventSys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSys::Epoll => write!(f, "epoll"),
            EventSys::Poll => write!(f, "poll"),
        }
    }
}

/// Runtime configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Usable stack bytes per logical thread (a guard page is added below)
    pub stack_size: usize,
    /// Readiness backend
    pub event_sys: EventSys,
    /// Events fetched per backend wait
    pub max_events: usize,
    /// Cap on live logical threads, primordial excluded
    pub max_threads: usize,
    /// Log every switch and wake at debug level
    pub debug_logging: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Library defaults with environment overrides.
    ///
    /// - `STF_STACK_SIZE` - usable stack bytes per logical thread
    /// - `STF_EVENT_SYS` - `epoll` or `poll`
    /// - `STF_MAX_EVENTS` - events fetched per wait
    /// - `STF_MAX_THREADS` - live thread cap
    /// - `STF_DEBUG` - scheduler debug logging (0/1)
    pub fn from_env() -> Self {
        let defaults = Self::new();
        Self {
            stack_size: env_get("STF_STACK_SIZE", defaults.stack_size),
            event_sys: env_get("STF_EVENT_SYS", defaults.event_sys),
            max_events: env_get("STF_MAX_EVENTS", defaults.max_events),
            max_threads: env_get("STF_MAX_THREADS", defaults.max_threads),
            debug_logging: env_get_bool("STF_DEBUG", defaults.debug_logging),
        }
    }

    /// Library defaults only, no environment lookup.
    pub fn new() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            event_sys: EventSys::Epoll,
            max_events: DEFAULT_MAX_EVENTS,
            max_threads: DEFAULT_MAX_THREADS,
            debug_logging: cfg!(feature = "debug-logging"),
        }
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn event_sys(mut self, sys: EventSys) -> Self {
        self.event_sys = sys;
        self
    }

    pub fn max_events(mut self, n: usize) -> Self {
        self.max_events = n;
        self
    }

    pub fn max_threads(mut self, n: usize) -> Self {
        self.max_threads = n;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err("stack_size below minimum");
        }
        if self.max_events == 0 {
            return Err("max_events must be at least 1");
        }
        if self.max_threads == 0 {
            return Err("max_threads must be at least 1");
        }
        Ok(())
    }
}
