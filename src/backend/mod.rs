//! Virtualization backend abstraction.
//!
//! This module defines the register-access capability every backend must
//! provide, and the platform probes used to select one. The backend owns
//! vCPU creation, execution, and teardown; dosvm only reads and writes
//! register state through this trait while the vCPU is stopped at a trap.

use crate::error::Result;
use crate::regs::{Reg, VcpuId};

#[cfg(all(target_os = "macos", target_arch = "x86_64"))]
pub mod hvf;

pub mod soft;

/// Register read/write capability of a virtualization backend.
///
/// Both operations require that `vcpu` refers to a live virtual CPU that is
/// currently stopped at a trap; mutating register state while the vCPU runs
/// is undefined by every backend this crate targets.
pub trait VcpuRegisters {
    /// Read the full 64-bit value of `reg` on the given vCPU.
    ///
    /// No observable side effect on guest state.
    fn read_register(&self, vcpu: VcpuId, reg: Reg) -> Result<u64>;

    /// Write `value` into `reg` on the given vCPU.
    fn write_register(&self, vcpu: VcpuId, reg: Reg, value: u64) -> Result<()>;
}

/// Check if a hardware virtualization backend is available on this platform.
pub fn is_available() -> bool {
    #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
    {
        hvf::is_available()
    }

    #[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
    {
        false
    }
}

/// Get the name of the hardware backend for this platform.
pub fn name() -> Option<&'static str> {
    #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
    {
        Some("hvf")
    }

    #[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
    {
        None
    }
}
