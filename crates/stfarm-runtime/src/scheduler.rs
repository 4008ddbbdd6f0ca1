//! Single-OS-thread scheduler
//!
//! One [`Scheduler`] lives in a thread-local of the OS thread that called
//! [`init`]. That thread becomes the primordial logical thread; every
//! [`spawn`] adds another logical thread with its own mmap'd stack. Only
//! one logical thread runs at a time and it keeps running until it
//! blocks, yields or finishes.
//!
//! The scheduler state sits in a `RefCell`. A borrow is never held across
//! a context switch or across user code: each step borrows, computes
//! register pointers, releases, and only then switches.
//!
//! ```text
//!   spawn ──▶ Ready ──▶ Running ──▶ Finished ──▶ reaped by next thread
//!               ▲          │
//!               │          ▼
//!               └──── Blocked (fd wait, sleep, join)
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::os::unix::io::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use nix::sys::signal::{self, SigHandler, Signal};
use stfarm_core::error::{RuntimeError, RuntimeResult};
use stfarm_core::id::ThreadHandle;
use stfarm_core::kprint;
use stfarm_core::state::{Interest, ThreadState};
use stfarm_core::{kdebug, kerror, ktrace, kwarn};

use crate::arch::{init_context, switch_context, SavedRegs};
use crate::config::RuntimeConfig;
use crate::event::{create_backend, EventBackend};
use crate::stack::Stack;
use crate::timer::SleepQueue;

thread_local! {
    static SCHEDULER: RefCell<Option<Scheduler>> = const { RefCell::new(None) };
}

/// Run `f` against this OS thread's scheduler.
fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> RuntimeResult<R> {
    SCHEDULER
        .try_with(|cell| {
            let mut guard = cell.borrow_mut();
            guard.as_mut().map(f).ok_or(RuntimeError::NotInitialized)
        })
        .unwrap_or(Err(RuntimeError::NotInitialized))
}

/// A logical thread
struct GThread {
    handle: ThreadHandle,
    state: ThreadState,
    regs: SavedRegs,
    /// `None` for the primordial thread, which runs on the OS stack
    stack: Option<Stack>,
    entry: Option<Box<dyn FnOnce()>>,
    /// Bumped on every wake; registrations made under an older token are stale
    token: u64,
    /// Last wake came from a deadline rather than readiness
    timed_out: bool,
    /// The current wait has an entry in the sleep queue
    timer_armed: bool,
    /// Printed as `[tN]` while this thread runs; defaults to the handle
    log_tag: u64,
}

impl GThread {
    fn new(handle: ThreadHandle, state: ThreadState) -> Self {
        Self {
            handle,
            state,
            regs: SavedRegs::default(),
            stack: None,
            entry: None,
            token: 0,
            timed_out: false,
            timer_armed: false,
            log_tag: handle.as_u64(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Waiter {
    handle: ThreadHandle,
    token: u64,
}

#[derive(Debug, Clone, Copy)]
struct IdleWaiter {
    waiter: Waiter,
    /// Wake once `live` drops to this
    target: usize,
}

enum Step {
    /// The caller is the next thread to run
    Stay,
    Switch {
        from: *mut SavedRegs,
        to: *const SavedRegs,
    },
    /// Nothing runnable; wait on the backend for at most this long
    Idle(Option<Duration>),
}

pub struct Scheduler {
    config: RuntimeConfig,
    threads: HashMap<ThreadHandle, Box<GThread>>,
    run_queue: VecDeque<ThreadHandle>,
    current: ThreadHandle,
    next_handle: u64,
    /// Spawned threads not yet finished
    live: usize,
    backend: Box<dyn EventBackend>,
    sleepers: SleepQueue,
    fd_waiters: HashMap<RawFd, Waiter>,
    idle_waiter: Option<IdleWaiter>,
    ready_fds: Vec<RawFd>,
    finished: Vec<ThreadHandle>,
}

impl Scheduler {
    fn new(config: RuntimeConfig, backend: Box<dyn EventBackend>) -> Self {
        let mut threads = HashMap::new();
        threads.insert(
            ThreadHandle::PRIMORDIAL,
            Box::new(GThread::new(ThreadHandle::PRIMORDIAL, ThreadState::Running)),
        );
        Self {
            config,
            threads,
            run_queue: VecDeque::new(),
            current: ThreadHandle::PRIMORDIAL,
            next_handle: 1,
            live: 0,
            backend,
            sleepers: SleepQueue::new(),
            fd_waiters: HashMap::new(),
            idle_waiter: None,
            ready_fds: Vec::new(),
            finished: Vec::new(),
        }
    }

    fn current_mut(&mut self) -> &mut GThread {
        // the current thread is removed only after another thread runs
        self.threads
            .get_mut(&self.current)
            .expect("current thread missing from table")
    }

    fn spawn(&mut self, entry: Box<dyn FnOnce()>) -> RuntimeResult<ThreadHandle> {
        if self.live >= self.config.max_threads {
            return Err(RuntimeError::NoSlotsAvailable);
        }
        let stack = Stack::new(self.config.stack_size)?;

        let handle = ThreadHandle::new(self.next_handle);
        self.next_handle += 1;

        let mut thread = Box::new(GThread::new(handle, ThreadState::Ready));
        unsafe {
            init_context(
                &mut thread.regs,
                stack.top(),
                thread_entry as usize,
                handle.as_u64() as usize,
            );
        }
        thread.stack = Some(stack);
        thread.entry = Some(entry);

        self.threads.insert(handle, thread);
        self.run_queue.push_back(handle);
        self.live += 1;

        if self.config.debug_logging {
            kdebug!("spawned {} (live={})", handle, self.live);
        }
        Ok(handle)
    }

    /// Make `handle` runnable if it is still blocked under `token`.
    ///
    /// Returns `false` for a stale registration.
    fn wake(&mut self, handle: ThreadHandle, token: u64, timed_out: bool) -> bool {
        let Some(thread) = self.threads.get_mut(&handle) else {
            return false;
        };
        if thread.state != ThreadState::Blocked || thread.token != token {
            return false;
        }
        thread.state = ThreadState::Ready;
        thread.token = thread.token.wrapping_add(1);
        thread.timed_out = timed_out;
        let left_timer = std::mem::take(&mut thread.timer_armed) && !timed_out;
        self.run_queue.push_back(handle);

        if self.config.debug_logging {
            kdebug!("wake {} (timeout={})", handle, timed_out);
        }

        if left_timer {
            self.sleepers.mark_stale();
            if self.sleepers.needs_compaction() {
                self.compact_sleepers();
            }
        }
        true
    }

    /// Drop sleep entries whose wait already ended.
    fn compact_sleepers(&mut self) {
        let before = self.sleepers.len();
        let threads = &self.threads;
        self.sleepers.retain(|e| {
            threads
                .get(&e.handle)
                .is_some_and(|t| t.state == ThreadState::Blocked && t.token == e.token)
        });
        if self.config.debug_logging {
            kdebug!(
                "swept {} stale timers, {} left",
                before - self.sleepers.len(),
                self.sleepers.len()
            );
        }
    }

    /// Mark the current thread blocked and return the token wakers must present.
    fn block_current(&mut self) -> Waiter {
        let handle = self.current;
        let thread = self.current_mut();
        thread.state = ThreadState::Blocked;
        thread.timed_out = false;
        thread.timer_armed = false;
        Waiter {
            handle,
            token: thread.token,
        }
    }

    fn block_until(&mut self, deadline: Instant) {
        let w = self.block_current();
        self.sleepers.push(deadline, w.handle, w.token);
        self.current_mut().timer_armed = true;
    }

    fn block_on_fd(
        &mut self,
        fd: RawFd,
        interest: Interest,
        timeout: Option<Duration>,
    ) -> RuntimeResult<()> {
        self.backend.arm(fd, interest)?;
        let w = self.block_current();
        if let Some(prev) = self.fd_waiters.insert(fd, w) {
            if prev.handle != w.handle {
                kwarn!("fd {} already awaited by {}, replacing", fd, prev.handle);
            }
        }
        if let Some(timeout) = timeout {
            self.sleepers.push(Instant::now() + timeout, w.handle, w.token);
            self.current_mut().timer_armed = true;
        }
        Ok(())
    }

    /// Returns `false` when there is nothing to wait for.
    fn block_until_idle(&mut self) -> bool {
        let target = if self.current.is_primordial() { 0 } else { 1 };
        if self.live <= target {
            return false;
        }
        let waiter = self.block_current();
        self.idle_waiter = Some(IdleWaiter { waiter, target });
        true
    }

    fn yield_current(&mut self) -> RuntimeResult<()> {
        // let I/O that is already ready get its turn
        self.poll_events(Some(Duration::ZERO))?;
        let handle = self.current;
        self.current_mut().state = ThreadState::Ready;
        self.run_queue.push_back(handle);
        Ok(())
    }

    fn finish_current(&mut self) {
        let handle = self.current;
        self.current_mut().state = ThreadState::Finished;
        self.live = self.live.saturating_sub(1);
        self.finished.push(handle);

        if let Some(idle) = self.idle_waiter {
            if self.live <= idle.target {
                self.idle_waiter = None;
                self.wake(idle.waiter.handle, idle.waiter.token, false);
            }
        }
    }

    fn take_timed_out(&mut self) -> bool {
        std::mem::take(&mut self.current_mut().timed_out)
    }

    /// Drop the fd registration left behind by a wait that timed out.
    fn cancel_fd_wait(&mut self, fd: RawFd) {
        let handle = self.current;
        if matches!(self.fd_waiters.get(&fd), Some(w) if w.handle == handle) {
            self.fd_waiters.remove(&fd);
        }
    }

    fn forget_fd(&mut self, fd: RawFd) {
        if let Some(w) = self.fd_waiters.remove(&fd) {
            self.wake(w.handle, w.token, false);
        }
        self.backend.disarm(fd);
    }

    fn poll_events(&mut self, timeout: Option<Duration>) -> RuntimeResult<()> {
        let mut ready = std::mem::take(&mut self.ready_fds);
        ready.clear();
        let result = self.backend.wait(timeout, &mut ready);

        for fd in ready.drain(..) {
            if let Some(w) = self.fd_waiters.remove(&fd) {
                self.wake(w.handle, w.token, false);
            }
        }
        self.ready_fds = ready;

        let now = Instant::now();
        while let Some(entry) = self.sleepers.pop_expired(now) {
            if !self.wake(entry.handle, entry.token, true) {
                self.sleepers.unmark_stale();
            }
        }
        result
    }

    fn next_step(&mut self) -> Step {
        let current = self.current;
        while let Some(next) = self.run_queue.pop_front() {
            let Some(thread) = self.threads.get_mut(&next) else {
                continue;
            };
            if thread.state != ThreadState::Ready {
                continue;
            }
            thread.state = ThreadState::Running;
            if next == current {
                return Step::Stay;
            }

            let to = &thread.regs as *const SavedRegs;
            let tag = thread.log_tag;
            let from = &mut self.current_mut().regs as *mut SavedRegs;
            self.current = next;
            kprint::set_thread_tag(tag);

            if self.config.debug_logging {
                ktrace!("switch {} -> {}", current, next);
            }
            return Step::Switch { from, to };
        }

        let timeout = self.sleepers.time_until_next(Instant::now());
        if timeout.is_none() && self.fd_waiters.is_empty() {
            kwarn!(
                "no runnable thread and nothing to wait for ({} fds armed on {}); blocking forever",
                self.backend.armed(),
                self.backend.name()
            );
        }
        Step::Idle(timeout)
    }

    /// Remove finished threads other than the one running now.
    fn take_finished(&mut self) -> Vec<Box<GThread>> {
        let current = self.current;
        let debug = self.config.debug_logging;
        let mut dead = Vec::new();
        self.finished.retain(|handle| {
            if *handle == current {
                return true;
            }
            if let Some(thread) = self.threads.remove(handle) {
                if debug {
                    ktrace!("reap {}", thread.handle);
                }
                dead.push(thread);
            }
            false
        });
        dead
    }
}

/// Give the CPU away until the current thread is picked again.
///
/// The caller has already set its own state (queued Ready, Blocked with a
/// waker registered, or Finished).
fn switch_out() -> RuntimeResult<()> {
    loop {
        match with_scheduler(|s| s.next_step())? {
            Step::Stay => break,
            Step::Switch { from, to } => {
                // both contexts live in boxed GThreads that stay put until reaped
                unsafe { switch_context(from, to) };
                break;
            }
            Step::Idle(timeout) => with_scheduler(|s| s.poll_events(timeout))??,
        }
    }
    reap();
    Ok(())
}

/// Free stacks of threads that finished before the current one resumed.
fn reap() {
    let dead = with_scheduler(|s| s.take_finished()).unwrap_or_default();
    // dropped outside the borrow: unmaps stacks
    drop(dead);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

/// First Rust frame of every spawned thread.
extern "C" fn thread_entry(arg: usize) -> ! {
    let handle = ThreadHandle::new(arg as u64);
    reap();

    let entry = with_scheduler(|s| s.threads.get_mut(&handle).and_then(|t| t.entry.take()))
        .ok()
        .flatten();

    if let Some(f) = entry {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
            kerror!("thread {} panicked: {}", handle, panic_message(payload.as_ref()));
        }
    }

    let _ = with_scheduler(|s| s.finish_current());
    if let Err(e) = switch_out() {
        kerror!("thread {} could not switch out: {}", handle, e);
    }
    // a finished thread is never queued again
    std::process::abort();
}

// ============================================================================
// Public API
// ============================================================================

/// Start the scheduler on this OS thread.
///
/// The caller becomes the primordial logical thread. `SIGPIPE` is ignored
/// process-wide so a peer reset shows up as `EPIPE` instead of killing
/// the process.
pub fn init(config: RuntimeConfig) -> RuntimeResult<()> {
    config.validate().map_err(RuntimeError::InvalidConfig)?;

    SCHEDULER
        .try_with(|cell| {
            let mut guard = cell.borrow_mut();
            if guard.is_some() {
                return Err(RuntimeError::AlreadyInitialized);
            }

            // Safety: installs SIG_IGN, no handler code runs
            if let Err(e) = unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigIgn) } {
                kwarn!("could not ignore SIGPIPE: {}", e);
            }

            let backend = create_backend(config.event_sys, config.max_events)?;
            kdebug!(
                "runtime up: backend={} stack={} max_threads={}",
                backend.name(),
                config.stack_size,
                config.max_threads
            );
            *guard = Some(Scheduler::new(config, backend));
            kprint::set_thread_tag(ThreadHandle::PRIMORDIAL.as_u64());
            Ok(())
        })
        .unwrap_or(Err(RuntimeError::NotInitialized))
}

pub fn is_initialized() -> bool {
    with_scheduler(|_| ()).is_ok()
}

/// Create a logical thread running `f`. It is queued, not started.
pub fn spawn<F>(f: F) -> RuntimeResult<ThreadHandle>
where
    F: FnOnce() + 'static,
{
    with_scheduler(|s| s.spawn(Box::new(f)))?
}

/// Handle of the running logical thread; `NONE` without a runtime.
pub fn current() -> ThreadHandle {
    with_scheduler(|s| s.current).unwrap_or(ThreadHandle::NONE)
}

/// Spawned threads that have not finished
pub fn live_threads() -> usize {
    with_scheduler(|s| s.live).unwrap_or(0)
}

/// Let every other runnable thread go first.
pub fn yield_now() {
    if with_scheduler(|s| s.yield_current()).and_then(|r| r).is_ok() {
        if let Err(e) = switch_out() {
            kerror!("yield failed: {}", e);
        }
    }
}

/// Suspend the current logical thread for `duration`.
///
/// Falls back to `std::thread::sleep` when no runtime is running here.
pub fn sleep(duration: Duration) {
    if duration.is_zero() {
        yield_now();
        return;
    }
    let deadline = Instant::now() + duration;
    if with_scheduler(|s| s.block_until(deadline)).is_err() {
        std::thread::sleep(duration);
        return;
    }
    if let Err(e) = switch_out() {
        kerror!("sleep failed: {}", e);
    }
}

/// Label log lines of the running logical thread with `tag` instead of
/// its handle. Kept across switches until the thread finishes.
pub fn set_log_tag(tag: u64) {
    if with_scheduler(|s| s.current_mut().log_tag = tag).is_ok() {
        kprint::set_thread_tag(tag);
    }
}

/// Timed waits still queued, stale ones included
pub fn pending_timers() -> usize {
    with_scheduler(|s| s.sleepers.len()).unwrap_or(0)
}

pub fn sleep_us(micros: u64) {
    sleep(Duration::from_micros(micros));
}

/// Park until `fd` is ready for `interest`.
///
/// Returns [`RuntimeError::Timeout`] if `timeout` passes first. One
/// logical thread may wait on a given descriptor at a time.
pub fn wait_fd(fd: RawFd, interest: Interest, timeout: Option<Duration>) -> RuntimeResult<()> {
    with_scheduler(|s| s.block_on_fd(fd, interest, timeout))??;
    switch_out()?;

    if with_scheduler(|s| s.take_timed_out())? {
        with_scheduler(|s| s.cancel_fd_wait(fd))?;
        return Err(RuntimeError::Timeout);
    }
    Ok(())
}

/// Put `fd` in non-blocking mode for use with [`wait_fd`].
pub fn attach_fd(fd: RawFd) -> RuntimeResult<()> {
    if !is_initialized() {
        return Err(RuntimeError::NotInitialized);
    }
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(RuntimeError::Register(nix::errno::Errno::last()));
    }
    if flags & libc::O_NONBLOCK == 0 {
        let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if ret < 0 {
            return Err(RuntimeError::Register(nix::errno::Errno::last()));
        }
    }
    Ok(())
}

/// Drop every registration of `fd`; call before closing it.
///
/// A thread still parked on `fd` is woken and sees the error from its
/// next syscall.
pub fn forget_fd(fd: RawFd) {
    let _ = with_scheduler(|s| s.forget_fd(fd));
}

/// Park until every spawned thread has finished.
///
/// From a spawned thread this waits until the caller is the last one.
pub fn join_all() -> RuntimeResult<()> {
    if with_scheduler(|s| s.block_until_idle())? {
        switch_out()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventSys;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn init_default() {
        init(RuntimeConfig::new()).unwrap();
    }

    #[test]
    fn test_not_initialized() {
        assert!(!is_initialized());
        assert_eq!(spawn(|| {}).unwrap_err(), RuntimeError::NotInitialized);
        assert_eq!(current(), ThreadHandle::NONE);
        assert_eq!(live_threads(), 0);
        assert_eq!(attach_fd(0).unwrap_err(), RuntimeError::NotInitialized);
        // falls back to an OS sleep
        sleep(Duration::from_millis(1));
    }

    #[test]
    fn test_double_init() {
        init_default();
        assert_eq!(
            init(RuntimeConfig::new()).unwrap_err(),
            RuntimeError::AlreadyInitialized
        );
    }

    #[test]
    fn test_invalid_config() {
        let err = init(RuntimeConfig::new().max_events(0)).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidConfig(_)));
        assert!(!is_initialized());
    }

    #[test]
    fn test_spawn_runs_in_fifo_order() {
        init_default();
        assert!(current().is_primordial());

        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            spawn(move || order.borrow_mut().push(i)).unwrap();
        }
        // queued, not started
        assert!(order.borrow().is_empty());
        assert_eq!(live_threads(), 3);

        join_all().unwrap();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert_eq!(live_threads(), 0);
    }

    #[test]
    fn test_yield_interleaves() {
        init_default();
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ['a', 'b'] {
            let log = log.clone();
            spawn(move || {
                for i in 0..3 {
                    log.borrow_mut().push(format!("{name}{i}"));
                    yield_now();
                }
            })
            .unwrap();
        }
        join_all().unwrap();
        assert_eq!(*log.borrow(), vec!["a0", "b0", "a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn test_current_is_distinct_per_thread() {
        init_default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..4 {
            let seen = seen.clone();
            spawn(move || {
                let me = current();
                sleep(Duration::from_millis(2));
                seen.borrow_mut().push((me, current()));
            })
            .unwrap();
        }
        join_all().unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 4);
        for (before, after) in seen.iter() {
            assert_eq!(before, after);
            assert!(!before.is_primordial());
        }
        let mut handles: Vec<_> = seen.iter().map(|(h, _)| *h).collect();
        handles.sort();
        handles.dedup();
        assert_eq!(handles.len(), 4);
    }

    #[test]
    fn test_sleep_orders_wakeups() {
        init_default();
        let order = Rc::new(RefCell::new(Vec::new()));
        for ms in [30u64, 10, 20] {
            let order = order.clone();
            spawn(move || {
                sleep(Duration::from_millis(ms));
                order.borrow_mut().push(ms);
            })
            .unwrap();
        }
        let start = Instant::now();
        join_all().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(*order.borrow(), vec![10, 20, 30]);
    }

    #[test]
    fn test_panic_is_contained() {
        init_default();
        let after = Rc::new(Cell::new(false));
        spawn(|| panic!("boom")).unwrap();
        {
            let after = after.clone();
            spawn(move || after.set(true)).unwrap();
        }
        join_all().unwrap();
        assert!(after.get());
        assert_eq!(live_threads(), 0);
    }

    #[test]
    fn test_thread_limit() {
        init(RuntimeConfig::new().max_threads(2)).unwrap();
        spawn(|| {}).unwrap();
        spawn(|| {}).unwrap();
        assert_eq!(spawn(|| {}).unwrap_err(), RuntimeError::NoSlotsAvailable);
        join_all().unwrap();
        // slots come back once threads finish
        spawn(|| {}).unwrap();
        join_all().unwrap();
    }

    #[test]
    fn test_many_threads_reaped() {
        init_default();
        let count = Rc::new(Cell::new(0));
        for _ in 0..200 {
            let count = count.clone();
            spawn(move || {
                yield_now();
                count.set(count.get() + 1);
            })
            .unwrap();
        }
        join_all().unwrap();
        assert_eq!(count.get(), 200);
        let remaining = with_scheduler(|s| s.threads.len()).unwrap();
        // primordial plus at most the last finisher awaiting reap
        assert!(remaining <= 2, "remaining={remaining}");
    }

    #[test]
    fn test_nested_spawn() {
        init_default();
        let hits = Rc::new(Cell::new(0));
        {
            let hits = hits.clone();
            spawn(move || {
                let inner = hits.clone();
                spawn(move || inner.set(inner.get() + 1)).unwrap();
                hits.set(hits.get() + 1);
            })
            .unwrap();
        }
        join_all().unwrap();
        assert_eq!(hits.get(), 2);
    }

    fn check_wait_fd(sys: EventSys) {
        use std::io::Write;
        use std::os::unix::io::AsRawFd;
        use std::os::unix::net::UnixStream;

        init(RuntimeConfig::new().event_sys(sys)).unwrap();

        let (mut tx, rx) = UnixStream::pair().unwrap();
        let fd = rx.as_raw_fd();
        attach_fd(fd).unwrap();

        let result = Rc::new(RefCell::new(None));
        {
            let result = result.clone();
            spawn(move || {
                let first = wait_fd(fd, Interest::Readable, Some(Duration::from_millis(20)));
                let second = wait_fd(fd, Interest::Readable, Some(Duration::from_secs(5)));
                *result.borrow_mut() = Some((first, second));
            })
            .unwrap();
        }
        spawn(move || {
            sleep(Duration::from_millis(50));
            tx.write_all(b"ping").unwrap();
        })
        .unwrap();

        join_all().unwrap();
        let (first, second) = result.borrow_mut().take().unwrap();
        assert_eq!(first, Err(RuntimeError::Timeout));
        assert_eq!(second, Ok(()));
    }

    #[test]
    fn test_wait_fd_epoll() {
        check_wait_fd(EventSys::Epoll);
    }

    #[test]
    fn test_wait_fd_poll() {
        check_wait_fd(EventSys::Poll);
    }

    #[test]
    fn test_log_tag_follows_thread_across_switches() {
        init_default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in [7u64, 9] {
            let seen = seen.clone();
            spawn(move || {
                let default_tag = kprint::thread_tag();
                set_log_tag(tag);
                yield_now();
                sleep(Duration::from_millis(1));
                seen.borrow_mut().push((default_tag, kprint::thread_tag()));
            })
            .unwrap();
        }
        join_all().unwrap();

        assert_eq!(*seen.borrow(), vec![(Some(1), Some(7)), (Some(2), Some(9))]);
        // back on the primordial thread
        assert_eq!(kprint::thread_tag(), Some(0));
    }

    #[test]
    fn test_early_wakes_do_not_grow_sleep_queue() {
        use std::io::{Read, Write};
        use std::os::unix::io::AsRawFd;
        use std::os::unix::net::UnixStream;

        init_default();
        let (mut tx, mut rx) = UnixStream::pair().unwrap();
        let fd = rx.as_raw_fd();
        attach_fd(fd).unwrap();

        let woken = Rc::new(Cell::new(0));
        {
            let woken = woken.clone();
            spawn(move || {
                let mut byte = [0u8; 1];
                for _ in 0..1000 {
                    if wait_fd(fd, Interest::Readable, Some(Duration::from_secs(3600))).is_err() {
                        break;
                    }
                    let _ = rx.read(&mut byte);
                    woken.set(woken.get() + 1);
                }
            })
            .unwrap();
        }
        spawn(move || {
            for _ in 0..1000 {
                let _ = tx.write_all(b"x");
                yield_now();
            }
        })
        .unwrap();

        join_all().unwrap();
        assert_eq!(woken.get(), 1000);
        assert!(pending_timers() < 100, "pending={}", pending_timers());
    }
}
