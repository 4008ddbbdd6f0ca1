//! poll(2) backend
//!
//! Rebuilds the pollfd array on every wait. Slower than epoll with many
//! descriptors but available everywhere; selected with
//! `STF_EVENT_SYS=poll`.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::Duration;

use nix::errno::Errno;
use stfarm_core::error::{RuntimeError, RuntimeResult};
use stfarm_core::state::Interest;

use super::{timeout_ms, EventBackend};

#[derive(Default)]
pub struct PollBackend {
    armed: HashMap<RawFd, Interest>,
    fds: Vec<libc::pollfd>,
}

impl PollBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventBackend for PollBackend {
    fn arm(&mut self, fd: RawFd, interest: Interest) -> RuntimeResult<()> {
        if fd < 0 {
            return Err(RuntimeError::Register(Errno::EBADF));
        }
        self.armed.insert(fd, interest);
        Ok(())
    }

    fn disarm(&mut self, fd: RawFd) {
        self.armed.remove(&fd);
    }

    fn wait(&mut self, timeout: Option<Duration>, ready: &mut Vec<RawFd>) -> RuntimeResult<()> {
        self.fds.clear();
        for (&fd, interest) in &self.armed {
            let events = match interest {
                Interest::Readable => libc::POLLIN,
                Interest::Writable => libc::POLLOUT,
            };
            self.fds.push(libc::pollfd { fd, events, revents: 0 });
        }

        let n = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms(timeout),
            )
        };
        if n < 0 {
            return match Errno::last() {
                Errno::EINTR => Ok(()),
                e => Err(RuntimeError::Poll(e)),
            };
        }

        for pfd in &self.fds {
            if pfd.revents != 0 {
                ready.push(pfd.fd);
                self.armed.remove(&pfd.fd);
            }
        }
        Ok(())
    }

    fn armed(&self) -> usize {
        self.armed.len()
    }

    fn name(&self) -> &'static str {
        "poll"
    }
}
