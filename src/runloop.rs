//! Host-side trap/dispatch loop.
//!
//! Generalizes the VMEXIT loop every host drives around a [`DosKernel`]:
//! resume the vCPU, classify the trap, forward software interrupts to the
//! kernel, and apply the [`DispatchResult`] contract until the session
//! terminates.

use crate::backend::VcpuRegisters;
use crate::error::{Error, Result};
use crate::kernel::{DispatchResult, DosKernel};
use crate::regs::Reg;

/// Size of the `INT imm8` instruction, skipped after a handled service.
const INT_IMM8_LEN: u64 = 2;

/// One trap taken by the virtual CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapEvent {
    /// A software interrupt with the given vector.
    SoftwareInterrupt(u8),
    /// The guest executed HLT.
    Halt,
    /// Host interrupt; nothing to do, resume the guest.
    Irq,
    /// A trap this layer does not understand (raw backend reason code).
    Unknown(u64),
}

/// Source of trap events: resumes the vCPU until its next trap.
///
/// Implemented by the host over its virtualization backend's run
/// primitive; the loop below never touches that primitive directly.
pub trait TrapSource {
    fn run(&mut self) -> Result<TrapEvent>;
}

/// Drive the session to termination and return the guest's exit status.
///
/// Dispatches software interrupts strictly in the order they trap, once
/// each. `Handled` advances RIP past the interrupt instruction before
/// resuming; `NoReturn` resumes as-is; everything else ends the loop. A
/// guest that halts without reporting a status exits with 0.
pub fn run_to_exit<B, S>(kernel: &mut DosKernel<B>, source: &mut S) -> Result<i32>
where
    B: VcpuRegisters,
    S: TrapSource,
{
    loop {
        match source.run()? {
            TrapEvent::SoftwareInterrupt(vector) => match kernel.dispatch(vector)? {
                DispatchResult::Handled => {
                    let rip = kernel.regs().read(Reg::Rip)?;
                    kernel.regs().write(Reg::Rip, rip + INT_IMM8_LEN)?;
                }
                DispatchResult::NoReturn => {}
                DispatchResult::Stop
                | DispatchResult::Unhandled
                | DispatchResult::Unsupported => break,
            },
            TrapEvent::Halt => break,
            TrapEvent::Irq => {}
            TrapEvent::Unknown(reason) => return Err(Error::UnknownTrap(reason)),
        }
    }
    Ok(kernel.exit_status().unwrap_or(0))
}
