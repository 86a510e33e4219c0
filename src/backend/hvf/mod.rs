//! macOS Hypervisor.framework backend.
//!
//! Register access for vCPUs created through Apple's Hypervisor.framework
//! on Intel Macs. The host process owns vCPU creation, the VMCS setup, and
//! the run loop; this backend only translates `Reg` selectors to
//! `hv_x86_reg_t` codes and performs the register calls.

pub mod bindings;

use crate::error::{Error, Result};
use crate::regs::{Reg, VcpuId};

use super::VcpuRegisters;
use bindings::x86_reg;

/// Check if Hypervisor.framework is available.
pub fn is_available() -> bool {
    // Creating and immediately destroying a VM context is a lightweight
    // availability probe.
    unsafe {
        let result = bindings::hv_vm_create(bindings::HV_VM_DEFAULT);
        if result == bindings::HV_SUCCESS {
            bindings::hv_vm_destroy();
            true
        } else {
            false
        }
    }
}

/// Register access through Hypervisor.framework.
///
/// Stateless: the framework keys all register operations off the vCPU id,
/// so one value of this type serves any number of vCPUs.
#[derive(Debug, Clone, Copy, Default)]
pub struct HvfRegisters;

impl HvfRegisters {
    pub fn new() -> Self {
        Self
    }
}

fn reg_code(reg: Reg) -> bindings::hv_x86_reg_t {
    match reg {
        Reg::Rip => x86_reg::HV_X86_RIP,
        Reg::Rflags => x86_reg::HV_X86_RFLAGS,
        Reg::Rax => x86_reg::HV_X86_RAX,
        Reg::Rcx => x86_reg::HV_X86_RCX,
        Reg::Rdx => x86_reg::HV_X86_RDX,
        Reg::Rbx => x86_reg::HV_X86_RBX,
        Reg::Rsi => x86_reg::HV_X86_RSI,
        Reg::Rdi => x86_reg::HV_X86_RDI,
        Reg::Rsp => x86_reg::HV_X86_RSP,
        Reg::Rbp => x86_reg::HV_X86_RBP,
        Reg::R8 => x86_reg::HV_X86_R8,
        Reg::R9 => x86_reg::HV_X86_R9,
        Reg::R10 => x86_reg::HV_X86_R10,
        Reg::R11 => x86_reg::HV_X86_R11,
        Reg::R12 => x86_reg::HV_X86_R12,
        Reg::R13 => x86_reg::HV_X86_R13,
        Reg::R14 => x86_reg::HV_X86_R14,
        Reg::R15 => x86_reg::HV_X86_R15,
        Reg::Cs => x86_reg::HV_X86_CS,
        Reg::Ss => x86_reg::HV_X86_SS,
        Reg::Ds => x86_reg::HV_X86_DS,
        Reg::Es => x86_reg::HV_X86_ES,
        Reg::Fs => x86_reg::HV_X86_FS,
        Reg::Gs => x86_reg::HV_X86_GS,
    }
}

impl VcpuRegisters for HvfRegisters {
    fn read_register(&self, vcpu: VcpuId, reg: Reg) -> Result<u64> {
        let mut value: u64 = 0;
        let ret = unsafe {
            bindings::hv_vcpu_read_register(vcpu.raw(), reg_code(reg), &mut value)
        };
        if bindings::hv_succeeded(ret) {
            Ok(value)
        } else {
            Err(Error::RegisterAccess {
                vcpu,
                reg,
                detail: bindings::hv_return_string(ret).to_string(),
            })
        }
    }

    fn write_register(&self, vcpu: VcpuId, reg: Reg, value: u64) -> Result<()> {
        let ret = unsafe {
            bindings::hv_vcpu_write_register(vcpu.raw(), reg_code(reg), value)
        };
        if bindings::hv_succeeded(ret) {
            Ok(())
        } else {
            Err(Error::RegisterAccess {
                vcpu,
                reg,
                detail: bindings::hv_return_string(ret).to_string(),
            })
        }
    }
}
