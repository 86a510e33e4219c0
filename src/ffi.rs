//! C ABI adapter over [`DosKernel`].
//!
//! Opaque-handle entry points for host loops written against the C
//! interface: construct, dispatch, query exit status, destroy. The handle
//! wraps a [`DosKernel`] bound to the Hypervisor.framework backend with the
//! legacy abort-on-fault policy, so register failures terminate the process
//! exactly as the original emulator did.
//!
//! Contract: every handle returned by [`dosvm_kernel_new`] must be released
//! exactly once with [`dosvm_kernel_free`], and no entry point may be
//! called with a freed handle.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uchar};

use crate::backend::hvf::HvfRegisters;
use crate::kernel::{DispatchResult, DosKernel};
use crate::memory::GuestMemory;
use crate::regs::VcpuId;
use crate::vcpu::{FaultPolicy, RegisterAccess};

/// Exit-status sentinel meaning "the session has not terminated yet".
///
/// DOS exit codes are 0..=255, so -1 is never a real status.
pub const DOSVM_EXIT_PENDING: c_int = -1;

/// Dispatch return value for a null handle.
///
/// Out of band: every legitimate dispatch outcome is a
/// [`DispatchResult`] contract value in 0..=4.
pub const DOSVM_DISPATCH_BAD_HANDLE: c_int = -1;

/// Opaque kernel handle.
pub struct DosKernelHandle {
    kernel: DosKernel<HvfRegisters>,
}

/// Create a DOS emulation session.
///
/// `memory` must point to `size` bytes of guest memory that stay valid and
/// unmoved until [`dosvm_kernel_free`]; the buffer is aliased, not copied.
/// `vcpu` is the Hypervisor.framework vCPU id. `argv` carries `argc`
/// NUL-terminated strings, program name first. Returns null on invalid
/// arguments or construction failure.
///
/// # Safety
///
/// Pointer and lifetime requirements above; `argv` must hold `argc` valid
/// C strings.
#[no_mangle]
pub unsafe extern "C" fn dosvm_kernel_new(
    memory: *mut c_uchar,
    size: usize,
    vcpu: u32,
    argc: c_int,
    argv: *const *const c_char,
) -> *mut DosKernelHandle {
    if memory.is_null() || argc < 0 || (argc > 0 && argv.is_null()) {
        return std::ptr::null_mut();
    }

    let mut args = Vec::with_capacity(argc as usize);
    for i in 0..argc as usize {
        let arg = *argv.add(i);
        if arg.is_null() {
            return std::ptr::null_mut();
        }
        args.push(CStr::from_ptr(arg).to_string_lossy().into_owned());
    }

    let guest = match GuestMemory::from_raw(memory, size) {
        Ok(guest) => guest,
        Err(_) => return std::ptr::null_mut(),
    };
    let regs = RegisterAccess::with_policy(
        HvfRegisters::new(),
        VcpuId::new(vcpu),
        FaultPolicy::Abort,
    );

    match DosKernel::new(guest, regs, args) {
        Ok(kernel) => Box::into_raw(Box::new(DosKernelHandle { kernel })),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Destroy a session and release everything it owns.
///
/// The backend-owned memory buffer and vCPU are untouched. Passing null is
/// a no-op; passing a handle twice is undefined behavior.
///
/// # Safety
///
/// `handle` must be a pointer returned by [`dosvm_kernel_new`] that has not
/// been freed.
#[no_mangle]
pub unsafe extern "C" fn dosvm_kernel_free(handle: *mut DosKernelHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Forward one trapped software interrupt.
///
/// Returns the [`DispatchResult`] contract value (0=handled, 1=stop,
/// 2=unhandled, 3=unsupported, 4=no-return); guest pointer faults during
/// service emulation come back as unhandled, like any other emulation
/// outcome. A null handle returns [`DOSVM_DISPATCH_BAD_HANDLE`]. Host
/// console I/O failures report as unhandled.
///
/// # Safety
///
/// `handle` must be a live handle from [`dosvm_kernel_new`], or null.
#[no_mangle]
pub unsafe extern "C" fn dosvm_kernel_dispatch(
    handle: *mut DosKernelHandle,
    vector: u8,
) -> c_int {
    let Some(handle) = handle.as_mut() else {
        return DOSVM_DISPATCH_BAD_HANDLE;
    };
    match handle.kernel.dispatch(vector) {
        Ok(result) => result.as_raw(),
        Err(err) => {
            eprintln!("dosvm: dispatch failed: {err}");
            DispatchResult::Unhandled.as_raw()
        }
    }
}

/// Query the terminal status of the emulated process.
///
/// Returns [`DOSVM_EXIT_PENDING`] until a dispatch has signaled
/// termination; afterwards the status is stable across repeated calls.
///
/// # Safety
///
/// `handle` must be a live handle from [`dosvm_kernel_new`].
#[no_mangle]
pub unsafe extern "C" fn dosvm_kernel_exit_status(
    handle: *const DosKernelHandle,
) -> c_int {
    match handle.as_ref() {
        Some(handle) => handle.kernel.exit_status().unwrap_or(DOSVM_EXIT_PENDING),
        None => DOSVM_EXIT_PENDING,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle_dispatch_is_out_of_band() {
        let ret = unsafe { dosvm_kernel_dispatch(std::ptr::null_mut(), 0x21) };
        assert_eq!(ret, DOSVM_DISPATCH_BAD_HANDLE);
        for result in [
            DispatchResult::Handled,
            DispatchResult::Stop,
            DispatchResult::Unhandled,
            DispatchResult::Unsupported,
            DispatchResult::NoReturn,
        ] {
            assert_ne!(ret, result.as_raw());
        }
    }

    #[test]
    fn test_null_handle_exit_status_is_pending() {
        let status = unsafe { dosvm_kernel_exit_status(std::ptr::null()) };
        assert_eq!(status, DOSVM_EXIT_PENDING);
    }

    #[test]
    fn test_null_memory_rejected() {
        let handle = unsafe {
            dosvm_kernel_new(std::ptr::null_mut(), 0, 0, 0, std::ptr::null())
        };
        assert!(handle.is_null());
    }
}
