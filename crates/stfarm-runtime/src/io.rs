//! Blocking-style socket I/O for logical threads
//!
//! Each call issues the non-blocking syscall and, on `EAGAIN`, parks the
//! calling logical thread on the descriptor until it is ready, then
//! retries. To the caller it reads like ordinary blocking code:
//!
//! ```ignore
//! io::connect(fd, &"127.0.0.1:8080".parse()?, None)?;
//! io::write(fd, b"hello", None)?;
//! let n = io::read(fd, &mut buf, Some(Duration::from_secs(5)))?;
//! ```
//!
//! Errors are plain errnos. An expired `timeout` surfaces as `ETIME`.
//! Descriptors must have been passed through
//! [`attach_fd`](crate::scheduler::attach_fd).

use std::net::SocketAddrV4;
use std::os::unix::io::RawFd;
use std::time::Duration;

use nix::errno::Errno;
use stfarm_core::error::RuntimeError;
use stfarm_core::state::Interest;

use crate::scheduler::wait_fd;

fn park(fd: RawFd, interest: Interest, timeout: Option<Duration>) -> Result<(), Errno> {
    wait_fd(fd, interest, timeout).map_err(|e| match e {
        RuntimeError::Timeout => Errno::ETIME,
        other => other.errno(),
    })
}

fn sockaddr_in(addr: &SocketAddrV4) -> libc::sockaddr_in {
    let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_port = addr.port().to_be();
    sin.sin_addr.s_addr = u32::from(*addr.ip()).to_be();
    sin
}

/// Connect `fd` to `addr`, parking until the handshake settles.
pub fn connect(fd: RawFd, addr: &SocketAddrV4, timeout: Option<Duration>) -> Result<(), Errno> {
    let sin = sockaddr_in(addr);
    let ret = unsafe {
        libc::connect(
            fd,
            &sin as *const _ as *const libc::sockaddr,
            std::mem::size_of_val(&sin) as libc::socklen_t,
        )
    };
    if ret == 0 {
        return Ok(());
    }
    match Errno::last() {
        // an interrupted connect keeps going in the background
        Errno::EINPROGRESS | Errno::EINTR => {}
        e => return Err(e),
    }

    park(fd, Interest::Writable, timeout)?;

    let mut err: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut err as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if ret < 0 {
        return Err(Errno::last());
    }
    if err != 0 {
        return Err(Errno::from_raw(err));
    }
    Ok(())
}

/// Read at least one byte, or `Ok(0)` at end of stream.
pub fn read(fd: RawFd, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, Errno> {
    loop {
        let n = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
        if n >= 0 {
            return Ok(n as usize);
        }
        match Errno::last() {
            Errno::EINTR => continue,
            Errno::EAGAIN => park(fd, Interest::Readable, timeout)?,
            e => return Err(e),
        }
    }
}

/// Write at least one byte of `buf`; returns how many were sent.
pub fn write(fd: RawFd, buf: &[u8], timeout: Option<Duration>) -> Result<usize, Errno> {
    if buf.is_empty() {
        return Ok(0);
    }
    loop {
        let n = unsafe {
            libc::send(
                fd,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                libc::MSG_NOSIGNAL,
            )
        };
        if n >= 0 {
            return Ok(n as usize);
        }
        match Errno::last() {
            Errno::EINTR => continue,
            Errno::EAGAIN => park(fd, Interest::Writable, timeout)?,
            e => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::scheduler::{attach_fd, init, join_all, pending_timers, spawn, yield_now};
    use std::cell::Cell;
    use std::cell::RefCell;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::rc::Rc;

    fn tcp_socket() -> RawFd {
        let fd = unsafe {
            libc::socket(
                libc::AF_INET,
                libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                0,
            )
        };
        assert!(fd >= 0);
        fd
    }

    #[test]
    fn test_sockaddr_in_byte_order() {
        let sin = sockaddr_in(&"127.0.0.1:8080".parse().unwrap());
        assert_eq!(sin.sin_family, libc::AF_INET as libc::sa_family_t);
        assert_eq!(u16::from_be(sin.sin_port), 8080);
        assert_eq!(u32::from_be(sin.sin_addr.s_addr), 0x7f00_0001);
    }

    #[test]
    fn test_connect_and_write() {
        init(RuntimeConfig::new()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = match listener.local_addr().unwrap() {
            std::net::SocketAddr::V4(a) => a,
            _ => unreachable!(),
        };

        let fd = tcp_socket();
        let result = Rc::new(RefCell::new(None));
        {
            let result = result.clone();
            spawn(move || {
                let r = connect(fd, &addr, None).and_then(|_| write(fd, b"hello", None));
                *result.borrow_mut() = Some(r);
            })
            .unwrap();
        }
        join_all().unwrap();
        assert_eq!(result.borrow_mut().take(), Some(Ok(5)));

        let (mut peer, _) = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        unsafe { libc::close(fd) };
    }

    #[test]
    fn test_connect_refused() {
        init(RuntimeConfig::new()).unwrap();
        // grab a free port, then close it
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            match l.local_addr().unwrap() {
                std::net::SocketAddr::V4(a) => a,
                _ => unreachable!(),
            }
        };

        let fd = tcp_socket();
        let result = Rc::new(RefCell::new(None));
        {
            let result = result.clone();
            spawn(move || *result.borrow_mut() = Some(connect(fd, &addr, None))).unwrap();
        }
        join_all().unwrap();
        assert_eq!(result.borrow_mut().take(), Some(Err(Errno::ECONNREFUSED)));
        unsafe { libc::close(fd) };
    }

    #[test]
    fn test_read_parks_until_data() {
        init(RuntimeConfig::new()).unwrap();
        let (mut tx, rx) = UnixStream::pair().unwrap();
        let fd = rx.as_raw_fd();
        attach_fd(fd).unwrap();

        let got = Rc::new(RefCell::new(Vec::new()));
        {
            let got = got.clone();
            spawn(move || {
                let mut buf = [0u8; 16];
                let n = read(fd, &mut buf, None).unwrap_or(0);
                got.borrow_mut().extend_from_slice(&buf[..n]);
            })
            .unwrap();
        }
        spawn(move || {
            crate::scheduler::sleep(Duration::from_millis(10));
            let _ = tx.write_all(b"data");
        })
        .unwrap();

        join_all().unwrap();
        assert_eq!(&*got.borrow(), b"data");
    }

    #[test]
    fn test_read_timeout_is_etime() {
        init(RuntimeConfig::new()).unwrap();
        let (_tx, rx) = UnixStream::pair().unwrap();
        let fd = rx.as_raw_fd();
        attach_fd(fd).unwrap();

        let result = Rc::new(RefCell::new(None));
        {
            let result = result.clone();
            spawn(move || {
                let mut buf = [0u8; 4];
                *result.borrow_mut() = Some(read(fd, &mut buf, Some(Duration::from_millis(10))));
            })
            .unwrap();
        }
        join_all().unwrap();
        assert_eq!(result.borrow_mut().take(), Some(Err(Errno::ETIME)));
    }

    #[test]
    fn test_reads_woken_by_data_leave_no_timers_behind() {
        const ROUNDS: usize = 10_000;
        init(RuntimeConfig::new()).unwrap();
        let (mut tx, rx) = UnixStream::pair().unwrap();
        let fd = rx.as_raw_fd();
        attach_fd(fd).unwrap();

        let total = Rc::new(Cell::new(0usize));
        {
            let total = total.clone();
            spawn(move || {
                let mut buf = [0u8; 64];
                while total.get() < ROUNDS {
                    match read(fd, &mut buf, Some(Duration::from_secs(3600))) {
                        Ok(n) if n > 0 => total.set(total.get() + n),
                        _ => break,
                    }
                }
            })
            .unwrap();
        }
        let peak = Rc::new(Cell::new(0usize));
        {
            let peak = peak.clone();
            spawn(move || {
                for _ in 0..ROUNDS {
                    if tx.write_all(b"x").is_err() {
                        break;
                    }
                    yield_now();
                    peak.set(peak.get().max(pending_timers()));
                }
            })
            .unwrap();
        }

        join_all().unwrap();
        assert_eq!(total.get(), ROUNDS);
        assert!(peak.get() < 100, "peak={}", peak.get());
        assert!(pending_timers() < 100, "pending={}", pending_timers());
    }
}
