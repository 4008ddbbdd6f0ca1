//! Clock, jitter and name resolution helpers

use std::cell::RefCell;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stfarm_core::error::{StError, StResult, ERROR_DNS_RESOLVE};
use stfarm_core::{kerror, kinfo, kwarn};

thread_local! {
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::from_entropy());
}

/// Wall clock in milliseconds since the Unix epoch.
pub fn current_time_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => {
            kwarn!("system clock before epoch: {}", e);
            0
        }
    }
}

/// Reseed the jitter source from the wall clock.
pub fn init_random() {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0);
    RNG.with(|rng| *rng.borrow_mut() = StdRng::seed_from_u64(seed));
}

/// Pause length in ms around `sleep_seconds`.
///
/// 80% of the target plus a random share of up to 40% more, so a crowd
/// of clients drifts apart instead of firing in lockstep. A non-positive
/// target falls back to exactly `default_seconds`.
pub fn build_random_mtime(sleep_seconds: f64, default_seconds: f64) -> u64 {
    if sleep_seconds <= 0.0 {
        return (default_seconds * 1000.0).max(0.0) as u64;
    }
    let base = (sleep_seconds * 1000.0 * 0.8) as u64;
    let spread = (sleep_seconds * 1000.0 * 0.4) as u64;
    if spread == 0 {
        return base;
    }
    base + RNG.with(|rng| rng.borrow_mut().gen_range(0..spread))
}

/// Resolve `host` to a dotted-decimal IPv4 address.
///
/// A dotted-decimal `host` is returned as is. Anything else goes through
/// the system resolver, which blocks the whole OS thread (and so every
/// logical thread) until it answers.
pub fn dns_resolve(host: &str) -> StResult<String> {
    if host.parse::<Ipv4Addr>().is_ok() {
        kinfo!("dns resolve {} to {}", host, host);
        return Ok(host.to_string());
    }

    let addrs = (host, 0u16).to_socket_addrs().map_err(|e| {
        kerror!("dns resolve host {} error: {}", host, e);
        StError::new(ERROR_DNS_RESOLVE)
    })?;

    for addr in addrs {
        if let SocketAddr::V4(v4) = addr {
            let ip = v4.ip().to_string();
            kinfo!("dns resolve host {} to {}", host, ip);
            return Ok(ip);
        }
    }

    kerror!("dns resolve host {}: no ipv4 address", host);
    Err(StError::new(ERROR_DNS_RESOLVE))
}

/// Parse a dotted-decimal address, the form [`dns_resolve`] returns.
pub(crate) fn parse_ipv4(ip: &str) -> Option<Ipv4Addr> {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => Some(v4),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_mtime_default() {
        assert_eq!(build_random_mtime(0.0, 3.0), 3000);
        assert_eq!(build_random_mtime(-1.0, 0.5), 500);
    }

    #[test]
    fn test_random_mtime_range() {
        init_random();
        for _ in 0..1000 {
            let ms = build_random_mtime(10.0, 1.0);
            assert!((8000..12000).contains(&ms), "ms={ms}");
        }
    }

    #[test]
    fn test_random_mtime_tiny_target() {
        // 0.4 * 1ms rounds to no spread
        assert_eq!(build_random_mtime(0.001, 1.0), 0);
    }

    #[test]
    fn test_dns_passthrough() {
        assert_eq!(dns_resolve("192.168.1.10").unwrap(), "192.168.1.10");
    }

    #[test]
    fn test_dns_localhost() {
        let ip = dns_resolve("localhost").unwrap();
        assert!(parse_ipv4(&ip).is_some());
    }

    #[test]
    fn test_dns_failure_code() {
        let err = dns_resolve("no-such-host.invalid").unwrap_err();
        assert_eq!(err.code(), ERROR_DNS_RESOLVE);
    }

    #[test]
    fn test_current_time_moves_forward() {
        let a = current_time_ms();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(current_time_ms() > a);
    }
}
