//! Raw FFI bindings to Hypervisor.framework.
//!
//! These are low-level bindings to the subset of Apple's
//! Hypervisor.framework that dosvm uses: VM availability probing and vCPU
//! register access. Prefer the safe wrapper in the parent module.
//!
//! ## References
//!
//! - https://developer.apple.com/documentation/hypervisor

#![allow(non_camel_case_types)]
#![allow(dead_code)]

// Link against Hypervisor.framework
#[link(name = "Hypervisor", kind = "framework")]
extern "C" {
    // VM Management
    pub fn hv_vm_create(flags: hv_vm_options_t) -> hv_return_t;
    pub fn hv_vm_destroy() -> hv_return_t;

    // vCPU register access (x86_64)
    pub fn hv_vcpu_read_register(
        vcpu: hv_vcpuid_t,
        reg: hv_x86_reg_t,
        value: *mut u64,
    ) -> hv_return_t;

    pub fn hv_vcpu_write_register(
        vcpu: hv_vcpuid_t,
        reg: hv_x86_reg_t,
        value: u64,
    ) -> hv_return_t;
}

// Basic types
pub type hv_return_t = i32;
pub type hv_vm_options_t = u64;
pub type hv_vcpuid_t = u32;
pub type hv_x86_reg_t = u32;

// Return codes
pub const HV_SUCCESS: hv_return_t = 0;
pub const HV_ERROR: hv_return_t = 0xfae94001_u32 as i32;
pub const HV_BUSY: hv_return_t = 0xfae94002_u32 as i32;
pub const HV_BAD_ARGUMENT: hv_return_t = 0xfae94003_u32 as i32;
pub const HV_NO_RESOURCES: hv_return_t = 0xfae94005_u32 as i32;
pub const HV_NO_DEVICE: hv_return_t = 0xfae94006_u32 as i32;
pub const HV_DENIED: hv_return_t = 0xfae94007_u32 as i32;
pub const HV_UNSUPPORTED: hv_return_t = 0xfae9400f_u32 as i32;

// VM options
pub const HV_VM_DEFAULT: hv_vm_options_t = 0;

// x86_64 registers
pub mod x86_reg {
    use super::hv_x86_reg_t;

    pub const HV_X86_RIP: hv_x86_reg_t = 0;
    pub const HV_X86_RFLAGS: hv_x86_reg_t = 1;
    pub const HV_X86_RAX: hv_x86_reg_t = 2;
    pub const HV_X86_RCX: hv_x86_reg_t = 3;
    pub const HV_X86_RDX: hv_x86_reg_t = 4;
    pub const HV_X86_RBX: hv_x86_reg_t = 5;
    pub const HV_X86_RSI: hv_x86_reg_t = 6;
    pub const HV_X86_RDI: hv_x86_reg_t = 7;
    pub const HV_X86_RSP: hv_x86_reg_t = 8;
    pub const HV_X86_RBP: hv_x86_reg_t = 9;
    pub const HV_X86_R8: hv_x86_reg_t = 10;
    pub const HV_X86_R9: hv_x86_reg_t = 11;
    pub const HV_X86_R10: hv_x86_reg_t = 12;
    pub const HV_X86_R11: hv_x86_reg_t = 13;
    pub const HV_X86_R12: hv_x86_reg_t = 14;
    pub const HV_X86_R13: hv_x86_reg_t = 15;
    pub const HV_X86_R14: hv_x86_reg_t = 16;
    pub const HV_X86_R15: hv_x86_reg_t = 17;
    pub const HV_X86_CS: hv_x86_reg_t = 18;
    pub const HV_X86_SS: hv_x86_reg_t = 19;
    pub const HV_X86_DS: hv_x86_reg_t = 20;
    pub const HV_X86_ES: hv_x86_reg_t = 21;
    pub const HV_X86_FS: hv_x86_reg_t = 22;
    pub const HV_X86_GS: hv_x86_reg_t = 23;
}

/// Convert an HVF return code to a human-readable string.
pub fn hv_return_string(code: hv_return_t) -> &'static str {
    match code {
        HV_SUCCESS => "Success",
        HV_ERROR => "Error",
        HV_BUSY => "Busy",
        HV_BAD_ARGUMENT => "Bad argument",
        HV_NO_RESOURCES => "No resources",
        HV_NO_DEVICE => "No device",
        HV_DENIED => "Denied (missing entitlement?)",
        HV_UNSUPPORTED => "Unsupported",
        _ => "Unknown error",
    }
}

/// Check if an HVF return code indicates success.
#[inline]
pub fn hv_succeeded(code: hv_return_t) -> bool {
    code == HV_SUCCESS
}

/// Convert an HVF return code to a Result.
pub fn hv_result(code: hv_return_t) -> crate::error::Result<()> {
    if hv_succeeded(code) {
        Ok(())
    } else {
        Err(crate::error::Error::HvfError(code))
    }
}
