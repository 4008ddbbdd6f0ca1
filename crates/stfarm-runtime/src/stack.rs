//! Logical thread stacks
//!
//! Each stack is its own anonymous mapping with a `PROT_NONE` guard page
//! at the low end, so an overflow faults instead of scribbling over a
//! neighbour. Dropping the [`Stack`] unmaps it.

use nix::errno::Errno;
use stfarm_core::constants::GUARD_SIZE;
use stfarm_core::error::{RuntimeError, RuntimeResult};

fn page_size() -> usize {
    let ps = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if ps <= 0 {
        4096
    } else {
        ps as usize
    }
}

/// An mmap'd stack owned by one logical thread
pub struct Stack {
    base: *mut u8,
    total_size: usize,
}

impl Stack {
    /// Map `usable` bytes (rounded up to pages) plus a guard page.
    pub fn new(usable: usize) -> RuntimeResult<Self> {
        let page = page_size();
        let guard = GUARD_SIZE.max(page);
        let usable = usable.div_ceil(page) * page;
        let total_size = usable + guard;

        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                total_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE | libc::MAP_STACK,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(RuntimeError::StackAllocation(Errno::last()));
        }

        // Stack grows down: guard at the lowest address
        let ret = unsafe { libc::mprotect(base, guard, libc::PROT_NONE) };
        if ret != 0 {
            let errno = Errno::last();
            unsafe { libc::munmap(base, total_size) };
            return Err(RuntimeError::StackAllocation(errno));
        }

        Ok(Self {
            base: base as *mut u8,
            total_size,
        })
    }

    /// One past the highest usable byte
    #[inline]
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.add(self.total_size) }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.total_size
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.total_size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_is_writable_below_top() {
        let stack = Stack::new(64 * 1024).unwrap();
        assert!(stack.size() >= 64 * 1024 + GUARD_SIZE);
        unsafe {
            let p = stack.top().sub(8) as *mut u64;
            p.write(0xdead_beef);
            assert_eq!(p.read(), 0xdead_beef);
        }
    }

    #[test]
    fn test_stack_rounds_to_pages() {
        let stack = Stack::new(10_000).unwrap();
        assert_eq!(stack.size() % page_size(), 0);
    }
}
