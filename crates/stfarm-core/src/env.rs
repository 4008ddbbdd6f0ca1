//! Environment variable utilities
//!
//! Every tunable in stfarm has a compiled-in default and an `STF_*`
//! environment override read through these helpers.
//!
//! ```ignore
//! use stfarm_core::env::{env_get, env_get_bool};
//!
//! let stack: usize = env_get("STF_STACK_SIZE", 256 * 1024);
//! let debug = env_get_bool("STF_DEBUG", false);
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, falling back to `default` when unset or malformed
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Boolean flag: "1", "true", "yes", "on" (any case) are true
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` only when the variable is set and parses
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
