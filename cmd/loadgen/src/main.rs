//! TCP load generator
//!
//! Spawns `clients` tasks on the stfarm task farm. Each one connects to
//! the target, then sends `payload` bytes `requests` times (0 = forever),
//! pausing a jittered `interval` between sends. With `echo` set to 1 it
//! also waits for the same number of bytes back.
//!
//! Usage:
//!     cargo build --release -p loadgen
//!     ./target/release/loadgen [host] [port] [clients] [payload] [requests] [interval_s] [report_s] [echo]
//!
//! Test with:
//!     # Echo server in another terminal:
//!     ncat -l -k -e /bin/cat 9999
//!     ./target/release/loadgen 127.0.0.1 9999 500 1024 0 1.0 5 1
//!
//! Environment:
//!     STF_EVENT_SYS=poll      use poll(2) instead of epoll
//!     STF_IO_TIMEOUT_MS=5000  per-operation socket deadline
//!     STF_LOG_LEVEL=trace     per-task lifecycle logs

use stfarm::{
    build_random_mtime, dns_resolve, sleep, Farm, Socket, StContext, StError, Task, TaskId,
    ERROR_SUCCESS,
};
use stfarm_core::{kerror, kinfo, ktrace};

use std::time::Duration;

#[derive(Debug, Clone)]
struct Options {
    host: String,
    port: u16,
    clients: usize,
    payload: usize,
    /// 0 = run until killed
    requests: u64,
    interval_seconds: f64,
    report_seconds: f64,
    echo: bool,
}

impl Options {
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let arg = |i: usize| args.get(i).map(String::as_str);
        Self {
            host: arg(1).unwrap_or("127.0.0.1").to_string(),
            port: arg(2).and_then(|s| s.parse().ok()).unwrap_or(9999),
            clients: arg(3).and_then(|s| s.parse().ok()).unwrap_or(100),
            payload: arg(4).and_then(|s| s.parse().ok()).unwrap_or(1024),
            requests: arg(5).and_then(|s| s.parse().ok()).unwrap_or(0),
            interval_seconds: arg(6).and_then(|s| s.parse().ok()).unwrap_or(1.0),
            report_seconds: arg(7).and_then(|s| s.parse().ok()).unwrap_or(5.0),
            echo: matches!(arg(8), Some("1" | "true" | "yes")),
        }
    }
}

/// One simulated client
struct LoadTask {
    id: TaskId,
    opts: Options,
    ctx: StContext,
}

impl LoadTask {
    fn new(opts: Options, ctx: StContext) -> Self {
        Self {
            id: TaskId::next(),
            opts,
            ctx,
        }
    }

    fn label(&self) -> String {
        format!("tcp://{}:{}", self.opts.host, self.opts.port)
    }

    /// Send one payload and optionally drain the echo.
    fn exchange(&self, sock: &mut Socket, buf: &mut [u8]) -> Result<(), StError> {
        sock.write_all(buf)?;
        if self.opts.echo {
            let mut got = 0;
            while got < buf.len() {
                got += sock.read(&mut buf[got..])?;
            }
        }
        Ok(())
    }

    fn run(&mut self) -> Result<(), StError> {
        let stat = self.ctx.statistic.clone();
        let ip = dns_resolve(&self.opts.host)?;

        let mut sock = Socket::new(&self.ctx);
        sock.connect(&ip, self.opts.port)?;

        let mut buf = vec![b'x'; self.opts.payload.max(1)];
        let mut sent = 0u64;
        while self.opts.requests == 0 || sent < self.opts.requests {
            stat.on_sub_task_start(self.id, "payload");
            if let Err(e) = self.exchange(&mut sock, &mut buf) {
                stat.on_sub_task_error(self.id);
                return Err(e);
            }
            stat.on_sub_task_end(self.id);
            sent += 1;

            let pause = build_random_mtime(self.opts.interval_seconds, 0.0);
            ktrace!("task #{} sent {} payloads, pause {}ms", self.id, sent, pause);
            sleep(Duration::from_millis(pause));
        }

        sock.close()
    }
}

impl Task for LoadTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn process(&mut self) -> i32 {
        let stat = self.ctx.statistic.clone();
        stat.on_task_start(self.id, &self.label());

        match self.run() {
            Ok(()) => {
                stat.on_task_end(self.id);
                ERROR_SUCCESS
            }
            Err(e) => {
                stat.on_task_error(self.id);
                kerror!("task #{} failed: {}", self.id, e);
                e.code()
            }
        }
    }
}

fn main() {
    let opts = Options::from_args();
    kinfo!(
        "loadgen: {} clients -> {}:{}, payload={} requests={} interval={}s echo={}",
        opts.clients,
        opts.host,
        opts.port,
        opts.payload,
        opts.requests,
        opts.interval_seconds,
        opts.echo
    );

    let farm = match Farm::initialize(opts.report_seconds) {
        Ok(farm) => farm,
        Err(e) => {
            kerror!("farm initialize failed: {}", e);
            std::process::exit(1);
        }
    };

    for _ in 0..opts.clients {
        let task = LoadTask::new(opts.clone(), farm.context().clone());
        if let Err(e) = farm.spawn(Box::new(task)) {
            kerror!("spawn failed: {}", e);
            std::process::exit(1);
        }
    }

    if opts.requests > 0 && opts.report_seconds <= 0.0 {
        // bounded run without reports: exit once every client is done
        if let Err(e) = farm.wait_idle() {
            kerror!("wait failed: {}", e);
            std::process::exit(1);
        }
        kinfo!("done: {}", farm.context().statistic.snapshot());
        return;
    }

    farm.wait_all();
}
