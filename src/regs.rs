//! Architectural register selectors and vCPU identifiers.
//!
//! `Reg` names one guest register; each backend maps it to its own register
//! code. `VcpuId` is the backend-issued token identifying one virtual CPU.
//! Both are pure value types with no ownership implications.

use std::fmt;

/// Identifier for one architectural register of the virtual CPU.
///
/// Covers the registers a real-mode DOS session touches: instruction
/// pointer, flags, the sixteen general-purpose registers, and the six
/// segment registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Rip,
    Rflags,
    Rax,
    Rcx,
    Rdx,
    Rbx,
    Rsi,
    Rdi,
    Rsp,
    Rbp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Cs,
    Ss,
    Ds,
    Es,
    Fs,
    Gs,
}

impl Reg {
    /// Number of distinct register selectors.
    pub const COUNT: usize = 24;

    /// All selectors, in declaration order.
    pub const ALL: [Reg; Reg::COUNT] = [
        Reg::Rip,
        Reg::Rflags,
        Reg::Rax,
        Reg::Rcx,
        Reg::Rdx,
        Reg::Rbx,
        Reg::Rsi,
        Reg::Rdi,
        Reg::Rsp,
        Reg::Rbp,
        Reg::R8,
        Reg::R9,
        Reg::R10,
        Reg::R11,
        Reg::R12,
        Reg::R13,
        Reg::R14,
        Reg::R15,
        Reg::Cs,
        Reg::Ss,
        Reg::Ds,
        Reg::Es,
        Reg::Fs,
        Reg::Gs,
    ];

    /// Dense index of this selector, suitable for array-backed register files.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Reg::Rip => "rip",
            Reg::Rflags => "rflags",
            Reg::Rax => "rax",
            Reg::Rcx => "rcx",
            Reg::Rdx => "rdx",
            Reg::Rbx => "rbx",
            Reg::Rsi => "rsi",
            Reg::Rdi => "rdi",
            Reg::Rsp => "rsp",
            Reg::Rbp => "rbp",
            Reg::R8 => "r8",
            Reg::R9 => "r9",
            Reg::R10 => "r10",
            Reg::R11 => "r11",
            Reg::R12 => "r12",
            Reg::R13 => "r13",
            Reg::R14 => "r14",
            Reg::R15 => "r15",
            Reg::Cs => "cs",
            Reg::Ss => "ss",
            Reg::Ds => "ds",
            Reg::Es => "es",
            Reg::Fs => "fs",
            Reg::Gs => "gs",
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque token identifying one virtual CPU inside the backend.
///
/// Issued by the backend before kernel construction; dosvm only uses it as
/// a lookup key for register operations and never creates or destroys the
/// vCPU it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VcpuId(u32);

impl VcpuId {
    /// Wrap a raw backend vCPU identifier.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw backend identifier.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for VcpuId {
    fn from(raw: u32) -> Self {
        Self::new(raw)
    }
}

impl fmt::Display for VcpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_dense_and_unique() {
        for (i, reg) in Reg::ALL.iter().enumerate() {
            assert_eq!(reg.index(), i);
        }
        assert_eq!(Reg::ALL.len(), Reg::COUNT);
    }

    #[test]
    fn test_display() {
        assert_eq!(Reg::Rax.to_string(), "rax");
        assert_eq!(Reg::Gs.to_string(), "gs");
        assert_eq!(VcpuId::new(3).to_string(), "3");
    }

    #[test]
    fn test_vcpu_id_round_trip() {
        let id = VcpuId::from(7u32);
        assert_eq!(id.raw(), 7);
    }
}
