//! Per-logical-thread task identity
//!
//! OS thread-locals are useless here: every logical thread shares one OS
//! thread. The registry keys on the runtime's [`ThreadHandle`] instead, so
//! each logical thread sees only the id it registered. Registering an id
//! also makes it the `[tN]` tag of that thread's log lines.

use std::cell::RefCell;
use std::collections::HashMap;

use stfarm_core::id::{TaskId, ThreadHandle};
use stfarm_runtime::scheduler;

#[derive(Debug, Default)]
pub struct IdentityRegistry {
    cache: RefCell<HashMap<ThreadHandle, TaskId>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `id` to the calling logical thread.
    pub fn set_id(&self, id: TaskId) {
        self.cache.borrow_mut().insert(scheduler::current(), id);
        scheduler::set_log_tag(u64::from(id.as_u32()));
    }

    /// Id of the calling logical thread, `TaskId::NONE` if unset.
    pub fn get_id(&self) -> TaskId {
        self.cache
            .borrow()
            .get(&scheduler::current())
            .copied()
            .unwrap_or_default()
    }

    /// Drop the calling thread's entry; its handle may be reused.
    pub fn clear(&self) {
        let handle = scheduler::current();
        self.cache.borrow_mut().remove(&handle);
        scheduler::set_log_tag(handle.as_u64());
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }
}
