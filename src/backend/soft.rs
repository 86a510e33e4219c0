//! Software register file backend.
//!
//! A plain in-memory register file implementing [`VcpuRegisters`]. Used by
//! the test suite and by hosts without hardware virtualization support.
//! Unlike a hardware backend it lets callers tear a vCPU down explicitly,
//! which makes the stale-vcpu failure path observable in tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::regs::{Reg, VcpuId};

use super::VcpuRegisters;

/// A software-emulated set of vCPU register files.
///
/// Cheap to clone; clones share the same register state.
#[derive(Debug, Clone, Default)]
pub struct SoftVcpus {
    cpus: Arc<Mutex<HashMap<VcpuId, [u64; Reg::COUNT]>>>,
}

impl SoftVcpus {
    /// Create an empty register-file set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set with a single live vCPU.
    pub fn with_vcpu(id: VcpuId) -> Self {
        let cpus = Self::new();
        cpus.add_vcpu(id);
        cpus
    }

    /// Bring a vCPU online with all registers zeroed.
    pub fn add_vcpu(&self, id: VcpuId) {
        self.cpus.lock().unwrap().insert(id, [0; Reg::COUNT]);
    }

    /// Tear a vCPU down. Any later register access on it fails.
    pub fn remove_vcpu(&self, id: VcpuId) {
        self.cpus.lock().unwrap().remove(&id);
    }

    /// Whether the given vCPU is live.
    pub fn is_live(&self, id: VcpuId) -> bool {
        self.cpus.lock().unwrap().contains_key(&id)
    }
}

impl VcpuRegisters for SoftVcpus {
    fn read_register(&self, vcpu: VcpuId, reg: Reg) -> Result<u64> {
        let cpus = self.cpus.lock().unwrap();
        let file = cpus.get(&vcpu).ok_or(Error::VcpuNotLive(vcpu))?;
        Ok(file[reg.index()])
    }

    fn write_register(&self, vcpu: VcpuId, reg: Reg, value: u64) -> Result<()> {
        let mut cpus = self.cpus.lock().unwrap();
        let file = cpus.get_mut(&vcpu).ok_or(Error::VcpuNotLive(vcpu))?;
        file[reg.index()] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_round_trip() {
        let cpus = SoftVcpus::with_vcpu(VcpuId::new(0));
        for (i, reg) in Reg::ALL.iter().enumerate() {
            let value = 0xdead_beef_0000_0000 | i as u64;
            cpus.write_register(VcpuId::new(0), *reg, value).unwrap();
            assert_eq!(cpus.read_register(VcpuId::new(0), *reg).unwrap(), value);
        }
    }

    #[test]
    fn test_registers_start_zeroed() {
        let cpus = SoftVcpus::with_vcpu(VcpuId::new(1));
        assert_eq!(cpus.read_register(VcpuId::new(1), Reg::Rax).unwrap(), 0);
    }

    #[test]
    fn test_torn_down_vcpu_fails() {
        let cpus = SoftVcpus::with_vcpu(VcpuId::new(0));
        cpus.remove_vcpu(VcpuId::new(0));
        assert!(!cpus.is_live(VcpuId::new(0)));
        assert!(matches!(
            cpus.read_register(VcpuId::new(0), Reg::Rax),
            Err(Error::VcpuNotLive(_))
        ));
        assert!(matches!(
            cpus.write_register(VcpuId::new(0), Reg::Rax, 1),
            Err(Error::VcpuNotLive(_))
        ));
    }

    #[test]
    fn test_clones_share_state() {
        let cpus = SoftVcpus::with_vcpu(VcpuId::new(0));
        let other = cpus.clone();
        cpus.write_register(VcpuId::new(0), Reg::Rbx, 42).unwrap();
        assert_eq!(other.read_register(VcpuId::new(0), Reg::Rbx).unwrap(), 42);
    }
}
