//! Register Access Unit.
//!
//! [`RegisterAccess`] binds a backend, a vCPU id, and a fault policy into
//! the one object the kernel uses to inspect and mutate guest register
//! state while the vCPU is stopped at a trap. All sub-width accessors go
//! through full 64-bit reads and read-modify-write stores so untouched
//! bits are always preserved.

use std::process;

use crate::backend::VcpuRegisters;
use crate::debug_regs;
use crate::error::Result;
use crate::regs::{Reg, VcpuId};

/// RFLAGS carry flag.
const RFLAGS_CF: u64 = 1;

/// What to do when the backend reports a register access failure.
///
/// A failed register read or write means the virtualization layer has
/// diverged from host expectations; there is no meaningful local recovery.
/// The choice is only whether the process dies on the spot or the caller
/// gets to log and die on its own terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Surface the failure as an `Err` to the caller.
    #[default]
    Propagate,
    /// Abort the process immediately, matching the legacy emulator.
    Abort,
}

/// Register access for one virtual CPU.
pub struct RegisterAccess<B> {
    backend: B,
    vcpu: VcpuId,
    policy: FaultPolicy,
}

impl<B: VcpuRegisters> RegisterAccess<B> {
    /// Bind a backend to one vCPU with the default (propagating) policy.
    pub fn new(backend: B, vcpu: VcpuId) -> Self {
        Self::with_policy(backend, vcpu, FaultPolicy::default())
    }

    /// Bind a backend to one vCPU with an explicit fault policy.
    pub fn with_policy(backend: B, vcpu: VcpuId, policy: FaultPolicy) -> Self {
        Self {
            backend,
            vcpu,
            policy,
        }
    }

    /// The vCPU this unit operates on.
    pub fn vcpu(&self) -> VcpuId {
        self.vcpu
    }

    /// The active fault policy.
    pub fn policy(&self) -> FaultPolicy {
        self.policy
    }

    fn apply<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => match self.policy {
                FaultPolicy::Propagate => Err(err),
                FaultPolicy::Abort => {
                    eprintln!("dosvm: fatal register access failure: {err}");
                    process::abort();
                }
            },
        }
    }

    /// Read the full 64-bit value of `reg`.
    pub fn read(&self, reg: Reg) -> Result<u64> {
        let value = self.apply(self.backend.read_register(self.vcpu, reg))?;
        debug_regs!("vcpu {}: read {} = {:#x}", self.vcpu, reg, value);
        Ok(value)
    }

    /// Write the full 64-bit `value` into `reg`.
    ///
    /// Must only be called while the vCPU is stopped at a trap.
    pub fn write(&self, reg: Reg, value: u64) -> Result<()> {
        debug_regs!("vcpu {}: write {} = {:#x}", self.vcpu, reg, value);
        self.apply(self.backend.write_register(self.vcpu, reg, value))
    }

    /// Read the low 16 bits of `reg` (AX, DX, ... in real-mode terms).
    pub fn read_u16(&self, reg: Reg) -> Result<u16> {
        Ok(self.read(reg)? as u16)
    }

    /// Write the low 16 bits of `reg`, preserving the upper 48.
    pub fn write_u16(&self, reg: Reg, value: u16) -> Result<()> {
        let current = self.read(reg)?;
        self.write(reg, (current & !0xffff) | u64::from(value))
    }

    /// Read the low byte of `reg` (AL, DL, ...).
    pub fn read_u8_lo(&self, reg: Reg) -> Result<u8> {
        Ok(self.read(reg)? as u8)
    }

    /// Read the second byte of `reg` (AH, DH, ...).
    pub fn read_u8_hi(&self, reg: Reg) -> Result<u8> {
        Ok((self.read(reg)? >> 8) as u8)
    }

    /// Write the low byte of `reg`, preserving all other bits.
    pub fn write_u8_lo(&self, reg: Reg, value: u8) -> Result<()> {
        let current = self.read(reg)?;
        self.write(reg, (current & !0xff) | u64::from(value))
    }

    /// Write the second byte of `reg`, preserving all other bits.
    pub fn write_u8_hi(&self, reg: Reg, value: u8) -> Result<()> {
        let current = self.read(reg)?;
        self.write(reg, (current & !0xff00) | (u64::from(value) << 8))
    }

    /// Set or clear the carry flag in RFLAGS.
    ///
    /// DOS services report success/failure through CF.
    pub fn set_carry(&self, carry: bool) -> Result<()> {
        let flags = self.read(Reg::Rflags)?;
        let flags = if carry {
            flags | RFLAGS_CF
        } else {
            flags & !RFLAGS_CF
        };
        self.write(Reg::Rflags, flags)
    }

    /// Whether the carry flag is set.
    pub fn carry(&self) -> Result<bool> {
        Ok(self.read(Reg::Rflags)? & RFLAGS_CF != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::soft::SoftVcpus;

    fn access() -> (SoftVcpus, RegisterAccess<SoftVcpus>) {
        let cpus = SoftVcpus::with_vcpu(VcpuId::new(0));
        let regs = RegisterAccess::new(cpus.clone(), VcpuId::new(0));
        (cpus, regs)
    }

    #[test]
    fn test_full_width_round_trip() {
        let (_, regs) = access();
        for reg in Reg::ALL {
            regs.write(reg, u64::MAX).unwrap();
            assert_eq!(regs.read(reg).unwrap(), u64::MAX);
            regs.write(reg, 0x0123_4567_89ab_cdef).unwrap();
            assert_eq!(regs.read(reg).unwrap(), 0x0123_4567_89ab_cdef);
        }
    }

    #[test]
    fn test_u16_write_preserves_upper_bits() {
        let (_, regs) = access();
        regs.write(Reg::Rax, 0xffff_ffff_ffff_ffff).unwrap();
        regs.write_u16(Reg::Rax, 0x1234).unwrap();
        assert_eq!(regs.read(Reg::Rax).unwrap(), 0xffff_ffff_ffff_1234);
        assert_eq!(regs.read_u16(Reg::Rax).unwrap(), 0x1234);
    }

    #[test]
    fn test_byte_accessors() {
        let (_, regs) = access();
        regs.write(Reg::Rdx, 0xaaaa_aaaa_aaaa_aaaa).unwrap();
        regs.write_u8_lo(Reg::Rdx, 0x11).unwrap();
        regs.write_u8_hi(Reg::Rdx, 0x22).unwrap();
        assert_eq!(regs.read(Reg::Rdx).unwrap(), 0xaaaa_aaaa_aaaa_2211);
        assert_eq!(regs.read_u8_lo(Reg::Rdx).unwrap(), 0x11);
        assert_eq!(regs.read_u8_hi(Reg::Rdx).unwrap(), 0x22);
    }

    #[test]
    fn test_carry_flag() {
        let (_, regs) = access();
        regs.write(Reg::Rflags, 0x2).unwrap();
        regs.set_carry(true).unwrap();
        assert!(regs.carry().unwrap());
        assert_eq!(regs.read(Reg::Rflags).unwrap(), 0x3);
        regs.set_carry(false).unwrap();
        assert!(!regs.carry().unwrap());
        assert_eq!(regs.read(Reg::Rflags).unwrap(), 0x2);
    }

    #[test]
    fn test_propagate_policy_surfaces_backend_failure() {
        let (cpus, regs) = access();
        cpus.remove_vcpu(VcpuId::new(0));
        assert!(regs.read(Reg::Rax).is_err());
        assert!(regs.write(Reg::Rax, 1).is_err());
    }

    #[test]
    fn test_policy_selection() {
        let cpus = SoftVcpus::with_vcpu(VcpuId::new(0));
        let regs =
            RegisterAccess::with_policy(cpus, VcpuId::new(0), FaultPolicy::Abort);
        assert_eq!(regs.policy(), FaultPolicy::Abort);
        assert_eq!(regs.vcpu(), VcpuId::new(0));
        // A healthy vCPU never hits the abort path.
        regs.write(Reg::Rax, 5).unwrap();
        assert_eq!(regs.read(Reg::Rax).unwrap(), 5);
    }
}
