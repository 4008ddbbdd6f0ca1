//! epoll backend with `EPOLLONESHOT` arming

use std::collections::HashSet;
use std::os::unix::io::RawFd;
use std::time::Duration;

use nix::errno::Errno;
use stfarm_core::error::{RuntimeError, RuntimeResult};
use stfarm_core::state::Interest;

use super::{timeout_ms, EventBackend};

pub struct EpollBackend {
    epfd: RawFd,
    /// Descriptors currently known to the epoll set
    registered: HashSet<RawFd>,
    events: Vec<libc::epoll_event>,
}

impl EpollBackend {
    pub fn new(max_events: usize) -> RuntimeResult<Self> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(RuntimeError::BackendInit(Errno::last()));
        }
        Ok(Self {
            epfd,
            registered: HashSet::new(),
            events: vec![libc::epoll_event { events: 0, u64: 0 }; max_events.max(1)],
        })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, flags: u32) -> Result<(), Errno> {
        let mut ev = libc::epoll_event {
            events: flags,
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut ev) };
        if ret < 0 {
            Err(Errno::last())
        } else {
            Ok(())
        }
    }
}

impl EventBackend for EpollBackend {
    fn arm(&mut self, fd: RawFd, interest: Interest) -> RuntimeResult<()> {
        let flags = libc::EPOLLONESHOT as u32
            | match interest {
                Interest::Readable => (libc::EPOLLIN | libc::EPOLLRDHUP) as u32,
                Interest::Writable => libc::EPOLLOUT as u32,
            };

        let first = if self.registered.contains(&fd) {
            libc::EPOLL_CTL_MOD
        } else {
            libc::EPOLL_CTL_ADD
        };

        let result = match self.ctl(first, fd, flags) {
            // our bookkeeping drifted from the kernel's; trust the kernel
            Err(Errno::EEXIST) => self.ctl(libc::EPOLL_CTL_MOD, fd, flags),
            Err(Errno::ENOENT) => self.ctl(libc::EPOLL_CTL_ADD, fd, flags),
            other => other,
        };

        result.map_err(RuntimeError::Register)?;
        self.registered.insert(fd);
        Ok(())
    }

    fn disarm(&mut self, fd: RawFd) {
        if self.registered.remove(&fd) {
            let _ = self.ctl(libc::EPOLL_CTL_DEL, fd, 0);
        }
    }

    fn wait(&mut self, timeout: Option<Duration>, ready: &mut Vec<RawFd>) -> RuntimeResult<()> {
        let n = unsafe {
            libc::epoll_wait(
                self.epfd,
                self.events.as_mut_ptr(),
                self.events.len() as libc::c_int,
                timeout_ms(timeout),
            )
        };
        if n < 0 {
            return match Errno::last() {
                Errno::EINTR => Ok(()),
                e => Err(RuntimeError::Poll(e)),
            };
        }

        for ev in &self.events[..n as usize] {
            let data = ev.u64;
            ready.push(data as RawFd);
        }
        Ok(())
    }

    fn armed(&self) -> usize {
        self.registered.len()
    }

    fn name(&self) -> &'static str {
        "epoll"
    }
}

impl Drop for EpollBackend {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}
