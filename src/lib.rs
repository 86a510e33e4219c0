//! # dosvm
//!
//! A DOS real-mode kernel emulation substrate for hardware virtualization.
//!
//! The host owns the virtualization primitives (vCPU creation, memory
//! mapping, the run primitive); dosvm owns everything between a software
//! interrupt trap and the decision to resume or terminate: register access
//! with explicit fault semantics, the kernel handle lifecycle, interrupt
//! dispatch, and the exit-status contract.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dosvm::backend::soft::SoftVcpus;
//! use dosvm::{DosKernel, GuestMemory, Reg, RegisterAccess, Result, VcpuId};
//!
//! fn main() -> Result<()> {
//!     let cpus = SoftVcpus::with_vcpu(VcpuId::new(0));
//!     let regs = RegisterAccess::new(cpus, VcpuId::new(0));
//!     let memory = GuestMemory::alloc(1024 * 1024)?;
//!     let mut kernel =
//!         DosKernel::new(memory, regs, vec!["prog.com".into()])?;
//!
//!     // INT 21h AH=02h: print the character in DL.
//!     kernel.regs().write(Reg::Rax, 0x0200)?;
//!     kernel.regs().write(Reg::Rdx, u64::from(b'!'))?;
//!     let result = kernel.dispatch(0x21)?;
//!     assert!(result.continues());
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Support
//!
//! - **macOS (Intel)**: Hypervisor.framework register access, plus the C
//!   ABI adapter in [`ffi`]
//! - **Everywhere**: the software register file in [`backend::soft`]

pub mod backend;
pub mod debug;
mod error;
mod kernel;
mod memory;
mod regs;
pub mod runloop;
mod vcpu;

#[cfg(all(target_os = "macos", target_arch = "x86_64"))]
pub mod ffi;

// Re-exports
pub use backend::VcpuRegisters;
pub use error::{Error, Result};
pub use kernel::{DispatchResult, DosKernel, PSP_COMMAND_TAIL};
pub use memory::{linear, GuestMemory};
pub use regs::{Reg, VcpuId};
pub use runloop::{run_to_exit, TrapEvent, TrapSource};
pub use vcpu::{FaultPolicy, RegisterAccess};

/// Check if the current platform supports hardware virtualization.
///
/// Returns `true` if the hypervisor is available and can be used.
pub fn is_supported() -> bool {
    backend::is_available()
}

/// Get the name of the hypervisor backend for the current platform.
///
/// Returns `None` if no backend is available.
pub fn backend_name() -> Option<&'static str> {
    backend::name()
}
