//! TCP client socket for farm tasks
//!
//! Calls look blocking but only park the calling logical thread; the
//! other tasks keep running while it waits. Byte counts of successful
//! reads and writes go to the farm [`Statistic`](crate::statistic::Statistic),
//! attributed to the caller's task id.
//!
//! ```text
//!   Init ──connect ok──▶ Connected ──read/write fails or close──▶ Disconnected
//!     │                                                               ▲
//!     └────────────────connect fails or close─────────────────────────┘
//! ```
//!
//! `connect` on any state starts over from a fresh descriptor.

use std::net::SocketAddrV4;
use std::os::unix::io::RawFd;
use std::time::Duration;

use nix::errno::Errno;
use stfarm_core::error::{
    StError, StResult, ERROR_CLOSE, ERROR_CONNECT, ERROR_OPEN_SOCKET, ERROR_READ, ERROR_SEND,
    ERROR_SOCKET,
};
use stfarm_core::state::SocketStatus;
use stfarm_core::{kerror, kinfo, kwarn};
use stfarm_runtime::{io, scheduler};

use crate::farm::StContext;
use crate::utility::parse_ipv4;

pub struct Socket {
    fd: Option<RawFd>,
    status: SocketStatus,
    ctx: StContext,
    timeout: Option<Duration>,
}

/// An expired deadline reads as "try again"
fn normalize(errno: Errno) -> Errno {
    match errno {
        Errno::ETIME | Errno::ETIMEDOUT => Errno::EAGAIN,
        e => e,
    }
}

impl Socket {
    pub fn new(ctx: &StContext) -> Self {
        Self {
            fd: None,
            status: SocketStatus::Init,
            ctx: ctx.clone(),
            timeout: ctx.io_timeout,
        }
    }

    pub fn status(&self) -> SocketStatus {
        self.status
    }

    pub fn fd(&self) -> Option<RawFd> {
        self.fd
    }

    /// Deadline for each connect, read and write; `None` waits forever.
    pub fn set_io_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Connect to `ip:port`, replacing any previous connection.
    ///
    /// `ip` must be dotted-decimal; resolve names with
    /// [`dns_resolve`](crate::utility::dns_resolve) first.
    pub fn connect(&mut self, ip: &str, port: u16) -> StResult<()> {
        if let Err(e) = self.close() {
            kwarn!("close before reconnect failed: {}", e);
        }

        let fd = unsafe {
            libc::socket(
                libc::AF_INET,
                libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                0,
            )
        };
        if fd < 0 {
            let err = StError::with_errno(ERROR_SOCKET, Errno::last());
            kerror!("create socket error. {}", err);
            self.status = SocketStatus::Disconnected;
            return Err(err);
        }
        // owned from here on: close() releases it on every failure path
        self.fd = Some(fd);

        let reuse: libc::c_int = 1;
        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &reuse as *const _ as *const libc::c_void,
                std::mem::size_of_val(&reuse) as libc::socklen_t,
            )
        };
        if ret < 0 {
            return self.fail(StError::with_errno(ERROR_SOCKET, Errno::last()), "setsockopt reuse-addr");
        }

        if let Err(e) = scheduler::attach_fd(fd) {
            return self.fail(StError::from_runtime(ERROR_OPEN_SOCKET, &e), "attach socket");
        }
        kinfo!("create socket({}) success", fd);

        let Some(addr) = parse_ipv4(ip) else {
            return self.fail(StError::with_errno(ERROR_CONNECT, Errno::EINVAL), "parse server address");
        };
        if let Err(e) = io::connect(fd, &SocketAddrV4::new(addr, port), self.timeout) {
            let err = StError::with_errno(ERROR_CONNECT, normalize(e));
            kerror!("connect to server({}:{}) error. {}", ip, port, err);
            self.release();
            return Err(err);
        }

        kinfo!("connect to server {} at port {} success", ip, port);
        self.status = SocketStatus::Connected;
        Ok(())
    }

    fn fail(&mut self, err: StError, what: &str) -> StResult<()> {
        kerror!("{} failed. {}", what, err);
        self.release();
        Err(err)
    }

    /// Close after a failed setup step, keeping the setup error.
    fn release(&mut self) {
        if let Err(e) = self.close() {
            kwarn!("release after failure: {}", e);
        }
    }

    fn require_fd(&self, code: i32) -> StResult<RawFd> {
        self.fd.ok_or(StError::with_errno(code, Errno::EBADF))
    }

    /// Read into `buf`. End of stream and errors both disconnect.
    pub fn read(&mut self, buf: &mut [u8]) -> StResult<usize> {
        let fd = self.require_fd(ERROR_READ)?;
        let result = match io::read(fd, buf, self.timeout) {
            Ok(0) => Err(Errno::ECONNRESET),
            other => other,
        };
        match result {
            Ok(n) => {
                self.ctx.statistic.on_read(self.ctx.identity.get_id(), n);
                Ok(n)
            }
            Err(e) => {
                self.status = SocketStatus::Disconnected;
                Err(StError::with_errno(ERROR_READ, normalize(e)))
            }
        }
    }

    /// Write from `buf`, returning how much was sent.
    pub fn write(&mut self, buf: &[u8]) -> StResult<usize> {
        let fd = self.require_fd(ERROR_SEND)?;
        let result = match io::write(fd, buf, self.timeout) {
            Ok(0) => Err(Errno::EPIPE),
            other => other,
        };
        match result {
            Ok(n) => {
                self.ctx.statistic.on_write(self.ctx.identity.get_id(), n);
                Ok(n)
            }
            Err(e) => {
                self.status = SocketStatus::Disconnected;
                Err(StError::with_errno(ERROR_SEND, normalize(e)))
            }
        }
    }

    /// Write all of `buf`.
    pub fn write_all(&mut self, mut buf: &[u8]) -> StResult<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Release the descriptor. A no-op on a socket that holds none.
    pub fn close(&mut self) -> StResult<()> {
        let Some(fd) = self.fd.take() else {
            return Ok(());
        };
        self.status = SocketStatus::Disconnected;

        scheduler::forget_fd(fd);
        if unsafe { libc::close(fd) } != 0 {
            return Err(StError::with_errno(ERROR_CLOSE, Errno::last()));
        }
        Ok(())
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            kwarn!("close on drop failed: {}", e);
        }
    }
}
