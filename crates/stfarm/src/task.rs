//! Units of work run by the farm

use stfarm_core::id::TaskId;

/// One workload, run to completion on its own logical thread.
///
/// Implementors take their id from [`TaskId::next`] when constructed.
/// The farm owns the task once spawned and drops it after `process`
/// returns; a task never runs twice.
///
/// ```ignore
/// struct Ping { id: TaskId, ctx: StContext }
///
/// impl Task for Ping {
///     fn id(&self) -> TaskId { self.id }
///     fn process(&mut self) -> i32 {
///         let mut sock = Socket::new(&self.ctx);
///         match sock.connect("127.0.0.1", 8080) {
///             Ok(()) => ERROR_SUCCESS,
///             Err(e) => e.code(),
///         }
///     }
/// }
/// ```
pub trait Task {
    fn id(&self) -> TaskId;

    /// Run the workload. Returns `ERROR_SUCCESS` or an `ERROR_*` code;
    /// a nonzero status is only logged.
    fn process(&mut self) -> i32;
}
