//! Error types for dosvm.

use thiserror::Error;

use crate::regs::{Reg, VcpuId};

/// Result type alias using dosvm's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a DOS emulation session.
#[derive(Error, Debug)]
pub enum Error {
    // Platform/hypervisor errors
    #[error("hypervisor not available on this platform")]
    HypervisorNotAvailable,

    #[error("vCPU {0} is not live")]
    VcpuNotLive(VcpuId),

    #[error("register {reg} access failed on vCPU {vcpu}: {detail}")]
    RegisterAccess {
        vcpu: VcpuId,
        reg: Reg,
        detail: String,
    },

    // Guest memory errors
    #[error("invalid guest address: {0:#x}")]
    InvalidGuestAddress(u64),

    #[error("invalid guest memory size: {0} bytes")]
    InvalidMemorySize(usize),

    // Run loop errors
    #[error("unhandled trap from virtual CPU: {0:#x}")]
    UnknownTrap(u64),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Platform-specific errors
    #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
    #[error("Hypervisor.framework error: {0:#x}")]
    HvfError(i32),
}
