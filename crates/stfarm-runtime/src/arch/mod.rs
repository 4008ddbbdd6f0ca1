//! Architecture-specific context switching
//!
//! Saves and restores the callee-saved register set when one logical
//! thread hands the CPU to another.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub mod x86_64;
        pub use self::x86_64::{init_context, switch_context, SavedRegs};
    } else {
        compile_error!("stfarm-runtime supports x86_64 only");
    }
}
