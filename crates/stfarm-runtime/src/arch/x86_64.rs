//! x86_64 context switching (System V AMD64)

use std::arch::naked_asm;

/// Callee-saved registers of a suspended logical thread.
///
/// Field offsets are hard-coded in [`switch_context`].
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SavedRegs {
    pub rsp: u64, // 0x00
    pub rip: u64, // 0x08
    pub rbx: u64, // 0x10
    pub rbp: u64, // 0x18
    pub r12: u64, // 0x20
    pub r13: u64, // 0x28
    pub r14: u64, // 0x30
    pub r15: u64, // 0x38
}

/// Prepare `regs` so that switching to it runs `entry_fn(entry_arg)` on
/// the stack ending at `stack_top`.
///
/// # Safety
///
/// `stack_top` must be the upper end of a mapped, writable stack that
/// outlives the logical thread. `entry_fn` must never return.
#[inline]
pub unsafe fn init_context(
    regs: &mut SavedRegs,
    stack_top: *mut u8,
    entry_fn: usize,
    entry_arg: usize,
) {
    // 16-byte aligned before the trampoline's `call`, so the callee sees
    // the usual rsp % 16 == 8 at entry.
    let aligned_sp = (stack_top as usize) & !0xF;

    *regs = SavedRegs {
        rsp: aligned_sp as u64,
        rip: thread_entry_trampoline as usize as u64,
        rbx: 0,
        rbp: 0,
        r12: entry_fn as u64,
        r13: entry_arg as u64,
        r14: 0,
        r15: 0,
    };
}

/// First code a new logical thread executes.
#[unsafe(naked)]
unsafe extern "C" fn thread_entry_trampoline() {
    naked_asm!(
        "mov rdi, r13",
        "call r12",
        // entry_fn diverges
        "ud2",
    );
}

/// Save the current registers into `from` and resume `to`.
///
/// Returns when some other thread switches back into `from`.
///
/// # Safety
///
/// Both pointers must be valid; `to` must hold a context produced by
/// [`init_context`] or by an earlier `switch_context`.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(_from: *mut SavedRegs, _to: *const SavedRegs) {
    naked_asm!(
        // save into `from` (rdi)
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 1f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        // load from `to` (rsi)
        "mov rsp, [rsi + 0x00]",
        "mov rax, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        "jmp rax",
        // resume point of a saved context
        "1:",
        "ret",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_context_aligns_stack() {
        let mut regs = SavedRegs::default();
        let fake_top = 0x7000_0000_1237usize as *mut u8;
        unsafe { init_context(&mut regs, fake_top, 0x1000, 42) };
        assert_eq!(regs.rsp % 16, 0);
        assert!(regs.rsp <= fake_top as u64);
        assert_eq!(regs.r12, 0x1000);
        assert_eq!(regs.r13, 42);
        assert_eq!(regs.rip, thread_entry_trampoline as usize as u64);
    }
}
