//! Farm-wide counters and the report loop
//!
//! Every logical thread bumps the same [`Statistic`] through an `Rc`.
//! Counters are `Cell`s: all threads share one OS thread and no update
//! spans a suspension point, so plain loads and stores are race-free.

use std::cell::Cell;
use std::fmt;
use std::time::{Duration, Instant};

use stfarm_core::id::TaskId;
use stfarm_core::kreport;
use stfarm_runtime::scheduler;

/// Throughput in Mbit/s over `elapsed_ms` (`bytes * 8 / elapsed_ms / 1000`).
/// Zero when no time has passed.
pub fn throughput_mbps(bytes: u64, elapsed_ms: u64) -> f64 {
    if elapsed_ms == 0 {
        return 0.0;
    }
    bytes as f64 * 8.0 / elapsed_ms as f64 / 1000.0
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatSnapshot {
    pub elapsed_ms: u64,
    /// Logical threads inside a task entry point
    pub threads: i64,
    /// Tasks started and not yet ended or failed
    pub alive: i64,
    pub nread: u64,
    pub nwrite: u64,
    pub tasks: u64,
    pub err_tasks: u64,
    pub sub_tasks: u64,
    pub err_sub_tasks: u64,
}

impl StatSnapshot {
    pub fn read_mbps(&self) -> f64 {
        throughput_mbps(self.nread, self.elapsed_ms)
    }

    pub fn write_mbps(&self) -> f64 {
        throughput_mbps(self.nwrite, self.elapsed_ms)
    }
}

impl fmt::Display for StatSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "threads:{} alive:{} duration:{:.0} nread:{:.2} nwrite:{:.2} \
             tasks:{} etasks:{} stasks:{} estasks:{}",
            self.threads,
            self.alive,
            self.elapsed_ms as f64 / 1000.0,
            self.read_mbps(),
            self.write_mbps(),
            self.tasks,
            self.err_tasks,
            self.sub_tasks,
            self.err_sub_tasks,
        )
    }
}

/// Counters shared by every task in the farm.
///
/// The `id` and `label` arguments of the hooks are accepted for future
/// per-task breakdowns; the totals ignore them.
#[derive(Debug)]
pub struct Statistic {
    start: Instant,
    threads: Cell<i64>,
    alive: Cell<i64>,
    nread: Cell<u64>,
    nwrite: Cell<u64>,
    tasks: Cell<u64>,
    err_tasks: Cell<u64>,
    sub_tasks: Cell<u64>,
    err_sub_tasks: Cell<u64>,
    reports: Cell<u64>,
}

impl Default for Statistic {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn bump(cell: &Cell<u64>, n: u64) {
    cell.set(cell.get().wrapping_add(n));
}

#[inline]
fn adjust(cell: &Cell<i64>, delta: i64) {
    cell.set(cell.get() + delta);
}

impl Statistic {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            threads: Cell::new(0),
            alive: Cell::new(0),
            nread: Cell::new(0),
            nwrite: Cell::new(0),
            tasks: Cell::new(0),
            err_tasks: Cell::new(0),
            sub_tasks: Cell::new(0),
            err_sub_tasks: Cell::new(0),
            reports: Cell::new(0),
        }
    }

    pub fn on_read(&self, _id: TaskId, n: usize) {
        bump(&self.nread, n as u64);
    }

    pub fn on_write(&self, _id: TaskId, n: usize) {
        bump(&self.nwrite, n as u64);
    }

    pub fn on_thread_run(&self, _id: TaskId) {
        adjust(&self.threads, 1);
    }

    pub fn on_thread_quit(&self, _id: TaskId) {
        adjust(&self.threads, -1);
    }

    pub fn on_task_start(&self, _id: TaskId, _label: &str) {
        adjust(&self.alive, 1);
        bump(&self.tasks, 1);
    }

    pub fn on_task_error(&self, _id: TaskId) {
        adjust(&self.alive, -1);
        bump(&self.err_tasks, 1);
    }

    pub fn on_task_end(&self, _id: TaskId) {
        adjust(&self.alive, -1);
    }

    pub fn on_sub_task_start(&self, _id: TaskId, _label: &str) {
        bump(&self.sub_tasks, 1);
    }

    pub fn on_sub_task_error(&self, _id: TaskId) {
        bump(&self.err_sub_tasks, 1);
    }

    pub fn on_sub_task_end(&self, _id: TaskId) {}

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            elapsed_ms: self.elapsed_ms(),
            threads: self.threads.get(),
            alive: self.alive.get(),
            nread: self.nread.get(),
            nwrite: self.nwrite.get(),
            tasks: self.tasks.get(),
            err_tasks: self.err_tasks.get(),
            sub_tasks: self.sub_tasks.get(),
            err_sub_tasks: self.err_sub_tasks.get(),
        }
    }

    /// Emit one report line for the current counters.
    pub fn report(&self) {
        bump(&self.reports, 1);
        kreport!("{}", self.snapshot());
    }

    /// Report lines emitted so far
    pub fn reports(&self) -> u64 {
        self.reports.get()
    }

    /// Report every `interval_ms` forever, sleeping on the runtime in
    /// between so the farm's tasks keep running.
    pub fn do_report(&self, interval_ms: f64) -> ! {
        let interval = Duration::from_secs_f64(interval_ms.max(0.0) / 1000.0);
        loop {
            self.report();
            scheduler::sleep(interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use stfarm_runtime::RuntimeConfig;

    const ID: TaskId = TaskId::new(1);

    #[test]
    fn test_throughput() {
        assert_eq!(throughput_mbps(125_000, 0), 0.0);
        assert_eq!(throughput_mbps(125_000, 1000), 1.0);
        assert_eq!(throughput_mbps(0, 1000), 0.0);
        assert!((throughput_mbps(250_000, 1000) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_thread_gauge_round_trips() {
        let stat = Statistic::new();
        for _ in 0..5 {
            stat.on_thread_run(ID);
        }
        assert_eq!(stat.snapshot().threads, 5);
        for _ in 0..5 {
            stat.on_thread_quit(ID);
        }
        assert_eq!(stat.snapshot().threads, 0);
    }

    #[test]
    fn test_byte_counters_sum() {
        let stat = Statistic::new();
        let writes = [100usize, 1, 4096, 0];
        for n in writes {
            stat.on_write(ID, n);
        }
        stat.on_read(ID, 10);
        stat.on_read(TaskId::new(99), 32);
        let snap = stat.snapshot();
        assert_eq!(snap.nwrite, writes.iter().sum::<usize>() as u64);
        assert_eq!(snap.nread, 42);
    }

    #[test]
    fn test_task_counters() {
        let stat = Statistic::new();
        stat.on_task_start(ID, "http://a/1.ts");
        stat.on_task_start(ID, "http://a/2.ts");
        stat.on_task_start(ID, "http://a/3.ts");
        stat.on_task_error(ID);
        stat.on_task_end(ID);
        stat.on_sub_task_start(ID, "seg");
        stat.on_sub_task_start(ID, "seg");
        stat.on_sub_task_error(ID);
        stat.on_sub_task_end(ID);

        let snap = stat.snapshot();
        assert_eq!(snap.tasks, 3);
        assert_eq!(snap.alive, 1);
        assert_eq!(snap.err_tasks, 1);
        assert_eq!(snap.sub_tasks, 2);
        assert_eq!(snap.err_sub_tasks, 1);
    }

    #[test]
    fn test_report_line_format() {
        let snap = StatSnapshot {
            elapsed_ms: 1000,
            threads: 2,
            alive: 1,
            nread: 125_000,
            nwrite: 250_000,
            tasks: 3,
            err_tasks: 1,
            sub_tasks: 4,
            err_sub_tasks: 0,
        };
        assert_eq!(
            snap.to_string(),
            "threads:2 alive:1 duration:1 nread:1.00 nwrite:2.00 tasks:3 etasks:1 stasks:4 estasks:0"
        );
        let idle = StatSnapshot::default();
        assert!(idle.to_string().contains("nread:0.00 nwrite:0.00"));
    }

    #[test]
    fn test_report_loop_runs_beside_worker() {
        scheduler::init(RuntimeConfig::new()).unwrap();
        let stat = Rc::new(Statistic::new());
        let done = Rc::new(Cell::new(false));

        {
            let stat = stat.clone();
            scheduler::spawn(move || {
                stat.do_report(5.0);
            })
            .unwrap();
        }
        {
            let stat = stat.clone();
            let done = done.clone();
            scheduler::spawn(move || {
                for _ in 0..4 {
                    stat.on_write(ID, 10);
                    scheduler::sleep(Duration::from_millis(5));
                }
                done.set(true);
            })
            .unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while !done.get() && Instant::now() < deadline {
            scheduler::sleep(Duration::from_millis(1));
        }

        assert!(done.get(), "worker starved by the report loop");
        assert_eq!(stat.snapshot().nwrite, 40);
        assert!(stat.reports() >= 2, "reports={}", stat.reports());
        // the report thread is still parked in its sleep
        assert_eq!(scheduler::live_threads(), 1);
    }
}
