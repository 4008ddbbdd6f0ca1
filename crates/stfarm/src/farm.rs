//! The task farm
//!
//! ```text
//!   Farm::initialize ──▶ runtime up, shared StContext built
//!   Farm::spawn(task) ──▶ one logical thread per task:
//!         set_id ─▶ on_thread_run ─▶ task.process() ─▶ on_thread_quit ─▶ drop
//!   Farm::wait_all ──▶ launcher becomes the report loop
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;

use stfarm_core::env::env_get_opt;
use stfarm_core::error::{
    StError, StResult, ERROR_ST_INITIALIZE, ERROR_ST_THREAD_CREATE, ERROR_ST_THREAD_JOIN,
    ERROR_SUCCESS, ERROR_TASK_PANIC,
};
use stfarm_core::{kerror, kinfo, ktrace, kwarn};
use stfarm_runtime::{scheduler, RuntimeConfig};

use crate::context::IdentityRegistry;
use crate::statistic::Statistic;
use crate::task::Task;
use crate::utility;

/// Handles every task and socket in the farm shares
#[derive(Debug, Clone)]
pub struct StContext {
    pub statistic: Rc<Statistic>,
    pub identity: Rc<IdentityRegistry>,
    /// Deadline applied to new sockets; `None` waits forever
    pub io_timeout: Option<Duration>,
}

impl StContext {
    /// Fresh counters and registry; the I/O timeout comes from
    /// `STF_IO_TIMEOUT_MS` (unset or 0 = no timeout).
    pub fn new() -> Self {
        let io_timeout = env_get_opt::<u64>("STF_IO_TIMEOUT_MS")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);
        Self {
            statistic: Rc::new(Statistic::new()),
            identity: Rc::new(IdentityRegistry::new()),
            io_timeout,
        }
    }
}

impl Default for StContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs tasks on logical threads of the calling OS thread.
#[derive(Debug)]
pub struct Farm {
    report_seconds: f64,
    ctx: StContext,
}

impl Farm {
    /// Start the runtime (config from `STF_*` variables) on this OS thread.
    ///
    /// `report_seconds` is the report interval used by [`Farm::wait_all`];
    /// zero or less disables reporting.
    pub fn initialize(report_seconds: f64) -> StResult<Farm> {
        Self::initialize_with(report_seconds, RuntimeConfig::from_env())
    }

    pub fn initialize_with(report_seconds: f64, config: RuntimeConfig) -> StResult<Farm> {
        let event_sys = config.event_sys;
        if let Err(e) = scheduler::init(config) {
            let err = StError::from_runtime(ERROR_ST_INITIALIZE, &e);
            kerror!("runtime init with {} failed: {}. {}", event_sys, e, err);
            return Err(err);
        }
        utility::init_random();
        kinfo!("farm initialized, event system {}", event_sys);

        Ok(Farm {
            report_seconds,
            ctx: StContext::new(),
        })
    }

    /// Shared handles for building sockets inside tasks
    pub fn context(&self) -> &StContext {
        &self.ctx
    }

    pub fn report_seconds(&self) -> f64 {
        self.report_seconds
    }

    /// Queue `task` on a new logical thread. It starts once the caller
    /// blocks, sleeps or waits.
    pub fn spawn(&self, task: Box<dyn Task>) -> StResult<()> {
        let id = task.id();
        let ctx = self.ctx.clone();

        if let Err(e) = scheduler::spawn(move || run_task(ctx, task)) {
            let err = StError::from_runtime(ERROR_ST_THREAD_CREATE, &e);
            kerror!("create thread for task #{} failed: {}. {}", id, e, err);
            return Err(err);
        }

        ktrace!("create thread for task #{} success", id);
        Ok(())
    }

    /// Turn the calling thread into the report loop. Never returns.
    ///
    /// With reporting disabled the caller just parks, leaving the OS
    /// thread to the tasks.
    pub fn wait_all(&self) -> ! {
        if self.report_seconds > 0.0 {
            self.ctx.statistic.do_report(self.report_seconds * 1000.0);
        }
        loop {
            scheduler::sleep(Duration::from_secs(3600));
        }
    }

    /// Park until every spawned task has finished.
    pub fn wait_idle(&self) -> StResult<()> {
        scheduler::join_all().map_err(|e| {
            let err = StError::from_runtime(ERROR_ST_THREAD_JOIN, &e);
            kerror!("wait for farm threads failed: {}. {}", e, err);
            err
        })
    }
}

/// Body of every farm thread.
fn run_task(ctx: StContext, mut task: Box<dyn Task>) {
    let id = task.id();
    ctx.identity.set_id(id);
    ctx.statistic.on_thread_run(id);

    let ret = match panic::catch_unwind(AssertUnwindSafe(|| task.process())) {
        Ok(ret) => ret,
        Err(_) => {
            kerror!("task #{} panicked", id);
            ERROR_TASK_PANIC
        }
    };

    ctx.statistic.on_thread_quit(id);

    if ret != ERROR_SUCCESS {
        kwarn!("st task #{} terminate with ret={}", id, ret);
    } else {
        ktrace!("st task #{} terminate with ret={}", id, ret);
    }

    drop(task);
    ctx.identity.clear();
}
