//! Readiness notification backends
//!
//! The scheduler asks a backend one question: "which of the descriptors
//! I armed became ready before this deadline?". Arming is one-shot: a
//! descriptor reported ready is disarmed until a logical thread waits on
//! it again, so an unread socket cannot spin the scheduler.
//!
//! ```text
//!              Scheduler::poll_io()
//!                     │
//!                     ▼
//!           ┌───────────────────┐
//!           │ dyn EventBackend  │
//!           └───────────────────┘
//!                ▼         ▼
//!          EpollBackend  PollBackend
//! ```

mod epoll;
mod poll;

pub use epoll::EpollBackend;
pub use poll::PollBackend;

use std::os::unix::io::RawFd;
use std::time::Duration;

use stfarm_core::error::RuntimeResult;
use stfarm_core::state::Interest;

use crate::config::EventSys;

/// A readiness source the scheduler can block on
pub trait EventBackend {
    /// Arm `fd` for a single notification of `interest`.
    ///
    /// Re-arming an already armed descriptor replaces its interest.
    fn arm(&mut self, fd: RawFd, interest: Interest) -> RuntimeResult<()>;

    /// Forget `fd` entirely (it is about to be closed).
    fn disarm(&mut self, fd: RawFd);

    /// Block until at least one armed descriptor is ready or `timeout`
    /// passes (`None` = no limit). Ready descriptors are appended to
    /// `ready`. An interrupted wait returns `Ok` with nothing appended.
    fn wait(&mut self, timeout: Option<Duration>, ready: &mut Vec<RawFd>) -> RuntimeResult<()>;

    /// Number of armed descriptors
    fn armed(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Build the backend selected by `sys`.
pub fn create_backend(sys: EventSys, max_events: usize) -> RuntimeResult<Box<dyn EventBackend>> {
    match sys {
        EventSys::Epoll => Ok(Box::new(EpollBackend::new(max_events)?)),
        EventSys::Poll => Ok(Box::new(PollBackend::new())),
    }
}

/// Milliseconds for epoll_wait/poll, rounded up so a sub-millisecond
/// deadline does not degrade into a busy loop. `-1` means infinite.
pub(crate) fn timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(d) => {
            let ms = d.as_micros().div_ceil(1000);
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_timeout_ms_rounding() {
        assert_eq!(timeout_ms(None), -1);
        assert_eq!(timeout_ms(Some(Duration::ZERO)), 0);
        assert_eq!(timeout_ms(Some(Duration::from_micros(200))), 1);
        assert_eq!(timeout_ms(Some(Duration::from_millis(25))), 25);
        assert_eq!(timeout_ms(Some(Duration::from_secs(u64::MAX))), libc::c_int::MAX);
    }

    fn check_backend(mut backend: Box<dyn EventBackend>) {
        let (mut a, b) = UnixStream::pair().unwrap();
        let fd = b.as_raw_fd();

        backend.arm(fd, Interest::Readable).unwrap();
        assert_eq!(backend.armed(), 1);

        let mut ready = Vec::new();
        backend.wait(Some(Duration::from_millis(10)), &mut ready).unwrap();
        assert!(ready.is_empty(), "{}: nothing written yet", backend.name());

        a.write_all(b"x").unwrap();
        backend.wait(Some(Duration::from_secs(1)), &mut ready).unwrap();
        assert_eq!(ready, vec![fd], "{}", backend.name());

        // one-shot: still readable, but not re-reported until re-armed
        ready.clear();
        backend.wait(Some(Duration::from_millis(10)), &mut ready).unwrap();
        assert!(ready.is_empty(), "{}: one-shot", backend.name());

        backend.arm(fd, Interest::Readable).unwrap();
        backend.wait(Some(Duration::from_secs(1)), &mut ready).unwrap();
        assert_eq!(ready, vec![fd]);

        backend.disarm(fd);
        backend.disarm(fd);
    }

    #[test]
    fn test_epoll_backend_one_shot() {
        check_backend(create_backend(EventSys::Epoll, 16).unwrap());
    }

    #[test]
    fn test_poll_backend_one_shot() {
        check_backend(create_backend(EventSys::Poll, 16).unwrap());
    }

    #[test]
    fn test_writable_interest() {
        for sys in [EventSys::Epoll, EventSys::Poll] {
            let mut backend = create_backend(sys, 16).unwrap();
            let (a, _b) = UnixStream::pair().unwrap();
            backend.arm(a.as_raw_fd(), Interest::Writable).unwrap();
            let mut ready = Vec::new();
            backend.wait(Some(Duration::from_secs(1)), &mut ready).unwrap();
            assert_eq!(ready, vec![a.as_raw_fd()], "{sys}");
        }
    }
}
