//! DOS kernel emulation handle.
//!
//! [`DosKernel`] is the unit of lifecycle: it binds the guest memory image,
//! one vCPU's register access, and the emulated process arguments for the
//! duration of a session. The host virtualization loop calls
//! [`DosKernel::dispatch`] once per trapped software interrupt, in trap
//! order, and reads [`DosKernel::exit_status`] after a dispatch signals
//! termination. Construction and release are paired by ownership; there is
//! no way to reach a dropped handle.

use std::io::{self, Write};

use crate::backend::VcpuRegisters;
use crate::debug_dispatch;
use crate::error::{Error, Result};
use crate::memory::{linear, GuestMemory};
use crate::regs::Reg;
use crate::vcpu::RegisterAccess;

/// PSP offset of the DOS command tail (count byte, bytes, CR).
pub const PSP_COMMAND_TAIL: u64 = 0x80;

/// Maximum command tail length in bytes, excluding count byte and CR.
const COMMAND_TAIL_MAX: usize = 126;

/// Smallest usable image: one Program Segment Prefix.
const MIN_MEMORY: usize = 0x100;

/// DOS version reported by INT 21h AH=30h (5.0).
const DOS_VERSION: u16 = 0x0005;

/// Continuation signal returned by [`DosKernel::dispatch`].
///
/// The discriminants are the session's external contract with the host run
/// loop (and the C ABI); use [`DispatchResult::continues`] instead of
/// matching on raw values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum DispatchResult {
    /// Service emulated; resume the guest past the `INT imm8` instruction.
    Handled = 0,
    /// The guest terminated; the exit status is now available.
    Stop = 1,
    /// Known vector, unknown service function. The session cannot continue.
    Unhandled = 2,
    /// Interrupt vector this kernel does not emulate at all.
    Unsupported = 3,
    /// Service emulated and the kernel already redirected the program
    /// counter; resume without adjusting RIP.
    NoReturn = 4,
}

impl DispatchResult {
    /// Whether the host loop should resume the virtual CPU.
    pub fn continues(self) -> bool {
        matches!(self, DispatchResult::Handled | DispatchResult::NoReturn)
    }

    /// The raw contract value, for the C ABI.
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// One DOS emulation session bound to a single vCPU.
pub struct DosKernel<B> {
    regs: RegisterAccess<B>,
    memory: GuestMemory,
    args: Vec<String>,
    exit_status: Option<i32>,
    console: Box<dyn Write + Send>,
}

impl<B: VcpuRegisters> DosKernel<B> {
    /// Create a session writing console output to stdout.
    ///
    /// `args` is argv-style: program name first, then the parameters
    /// visible to the emulated process. The command tail is written into
    /// the PSP at construction.
    pub fn new(
        memory: GuestMemory,
        regs: RegisterAccess<B>,
        args: Vec<String>,
    ) -> Result<Self> {
        Self::with_console(memory, regs, args, Box::new(io::stdout()))
    }

    /// Create a session with an explicit console sink.
    pub fn with_console(
        memory: GuestMemory,
        regs: RegisterAccess<B>,
        args: Vec<String>,
        console: Box<dyn Write + Send>,
    ) -> Result<Self> {
        if memory.len() < MIN_MEMORY {
            return Err(Error::InvalidMemorySize(memory.len()));
        }
        let kernel = Self {
            regs,
            memory,
            args,
            exit_status: None,
            console,
        };
        kernel.write_command_tail()?;
        Ok(kernel)
    }

    /// Register access for this session's vCPU.
    pub fn regs(&self) -> &RegisterAccess<B> {
        &self.regs
    }

    /// The guest memory image.
    pub fn memory(&self) -> &GuestMemory {
        &self.memory
    }

    /// The emulated process arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Terminal status of the emulated process.
    ///
    /// `None` until a dispatch has signaled termination; afterwards the
    /// status is stable across repeated queries. The first termination
    /// wins if the guest somehow terminates twice.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    /// Forward one trapped software interrupt to the emulation.
    ///
    /// Must be called once per trap, in trap order, while the vCPU is
    /// stopped. Emulation-level outcomes — including a guest passing a bad
    /// pointer to a service — are reported through the returned
    /// [`DispatchResult`], never as errors; `Err` is reserved for register
    /// access failures (per the unit's
    /// [`FaultPolicy`](crate::FaultPolicy)) and host I/O failures on the
    /// console sink.
    pub fn dispatch(&mut self, vector: u8) -> Result<DispatchResult> {
        debug_dispatch!("dispatch: int {:#04x}", vector);
        let result = match vector {
            0x10 => self.int10(),
            0x20 => self.terminate(0),
            0x21 => self.int21(),
            _ => {
                debug_dispatch!("dispatch: unsupported vector {:#04x}", vector);
                Ok(DispatchResult::Unsupported)
            }
        };
        // A bad guest pointer is the guest's fault, not a session error.
        match result {
            Err(Error::InvalidGuestAddress(addr)) => {
                debug_dispatch!("dispatch: guest pointer fault at {:#x}", addr);
                Ok(DispatchResult::Unhandled)
            }
            other => other,
        }
    }

    fn terminate(&mut self, status: i32) -> Result<DispatchResult> {
        if self.exit_status.is_none() {
            self.exit_status = Some(status);
        }
        Ok(DispatchResult::Stop)
    }

    fn putc(&mut self, byte: u8) -> Result<()> {
        self.console.write_all(&[byte])?;
        self.console.flush()?;
        Ok(())
    }

    /// BIOS video services.
    fn int10(&mut self) -> Result<DispatchResult> {
        let func = self.regs.read_u8_hi(Reg::Rax)?;
        match func {
            // Teletype output
            0x0e => {
                let ch = self.regs.read_u8_lo(Reg::Rax)?;
                self.putc(ch)?;
                Ok(DispatchResult::Handled)
            }
            _ => {
                debug_dispatch!("int 10h: unknown function {:#04x}", func);
                Ok(DispatchResult::Unhandled)
            }
        }
    }

    /// DOS services.
    fn int21(&mut self) -> Result<DispatchResult> {
        let func = self.regs.read_u8_hi(Reg::Rax)?;
        match func {
            // Terminate program
            0x00 => self.terminate(0),
            // Character output
            0x02 => {
                let ch = self.regs.read_u8_lo(Reg::Rdx)?;
                self.putc(ch)?;
                self.regs.write_u8_lo(Reg::Rax, ch)?;
                Ok(DispatchResult::Handled)
            }
            // Direct console output; DL=FFh requests input, which this
            // kernel does not implement.
            0x06 => {
                let ch = self.regs.read_u8_lo(Reg::Rdx)?;
                if ch == 0xff {
                    debug_dispatch!("int 21h: direct console input not implemented");
                    return Ok(DispatchResult::Unhandled);
                }
                self.putc(ch)?;
                self.regs.write_u8_lo(Reg::Rax, ch)?;
                Ok(DispatchResult::Handled)
            }
            // Display $-terminated string at DS:DX
            0x09 => {
                let ds = self.regs.read_u16(Reg::Ds)?;
                let dx = self.regs.read_u16(Reg::Rdx)?;
                // Cap at one real-mode segment.
                let text = self
                    .memory
                    .read_until(linear(ds, dx), b'$', u16::MAX as usize)?;
                self.console.write_all(&text)?;
                self.console.flush()?;
                self.regs.write_u8_lo(Reg::Rax, b'$')?;
                Ok(DispatchResult::Handled)
            }
            // Get DOS version
            0x30 => {
                self.regs.write_u16(Reg::Rax, DOS_VERSION)?;
                self.regs.write_u16(Reg::Rbx, 0)?;
                self.regs.write_u16(Reg::Rcx, 0)?;
                Ok(DispatchResult::Handled)
            }
            // Write to handle
            0x40 => self.write_to_handle(),
            // Terminate with exit status in AL
            0x4c => {
                let status = self.regs.read_u8_lo(Reg::Rax)?;
                self.terminate(i32::from(status))
            }
            _ => {
                debug_dispatch!("int 21h: unknown function {:#04x}", func);
                Ok(DispatchResult::Unhandled)
            }
        }
    }

    fn write_to_handle(&mut self) -> Result<DispatchResult> {
        const STDOUT: u16 = 1;
        const STDERR: u16 = 2;
        const ERR_INVALID_HANDLE: u16 = 6;

        let handle = self.regs.read_u16(Reg::Rbx)?;
        let count = self.regs.read_u16(Reg::Rcx)?;
        match handle {
            STDOUT | STDERR => {
                let ds = self.regs.read_u16(Reg::Ds)?;
                let dx = self.regs.read_u16(Reg::Rdx)?;
                let mut buf = vec![0u8; usize::from(count)];
                self.memory.read_bytes(linear(ds, dx), &mut buf)?;
                if handle == STDERR {
                    let mut err = io::stderr();
                    err.write_all(&buf)?;
                    err.flush()?;
                } else {
                    self.console.write_all(&buf)?;
                    self.console.flush()?;
                }
                self.regs.write_u16(Reg::Rax, count)?;
                self.regs.set_carry(false)?;
            }
            _ => {
                self.regs.write_u16(Reg::Rax, ERR_INVALID_HANDLE)?;
                self.regs.set_carry(true)?;
            }
        }
        Ok(DispatchResult::Handled)
    }

    /// Place the DOS command tail into the PSP.
    fn write_command_tail(&self) -> Result<()> {
        let mut tail = self
            .args
            .iter()
            .skip(1)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
            .into_bytes();
        tail.truncate(COMMAND_TAIL_MAX);
        self.memory.write_u8(PSP_COMMAND_TAIL, tail.len() as u8)?;
        self.memory.write_bytes(PSP_COMMAND_TAIL + 1, &tail)?;
        self.memory
            .write_u8(PSP_COMMAND_TAIL + 1 + tail.len() as u64, 0x0d)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::soft::SoftVcpus;
    use crate::regs::VcpuId;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn session(args: &[&str]) -> (SoftVcpus, DosKernel<SoftVcpus>, SharedBuf) {
        let cpus = SoftVcpus::with_vcpu(VcpuId::new(0));
        let regs = RegisterAccess::new(cpus.clone(), VcpuId::new(0));
        let memory = GuestMemory::alloc(64 * 1024).unwrap();
        let console = SharedBuf::default();
        let kernel = DosKernel::with_console(
            memory,
            regs,
            args.iter().map(|s| s.to_string()).collect(),
            Box::new(console.clone()),
        )
        .unwrap();
        (cpus, kernel, console)
    }

    #[test]
    fn test_command_tail_written_at_psp() {
        let (_, kernel, _) = session(&["prog.com", "one", "two"]);
        let mem = kernel.memory();
        assert_eq!(mem.read_u8(PSP_COMMAND_TAIL).unwrap(), 7);
        let mut tail = [0u8; 7];
        mem.read_bytes(PSP_COMMAND_TAIL + 1, &mut tail).unwrap();
        assert_eq!(&tail, b"one two");
        assert_eq!(mem.read_u8(PSP_COMMAND_TAIL + 8).unwrap(), 0x0d);
    }

    #[test]
    fn test_empty_command_tail() {
        let (_, kernel, _) = session(&["prog.com"]);
        let mem = kernel.memory();
        assert_eq!(mem.read_u8(PSP_COMMAND_TAIL).unwrap(), 0);
        assert_eq!(mem.read_u8(PSP_COMMAND_TAIL + 1).unwrap(), 0x0d);
    }

    #[test]
    fn test_memory_below_psp_size_rejected() {
        let cpus = SoftVcpus::with_vcpu(VcpuId::new(0));
        let regs = RegisterAccess::new(cpus, VcpuId::new(0));
        let memory = GuestMemory::alloc(0x80).unwrap();
        assert!(matches!(
            DosKernel::new(memory, regs, vec!["prog.com".into()]),
            Err(Error::InvalidMemorySize(0x80))
        ));
    }

    #[test]
    fn test_character_output() {
        let (_, mut kernel, console) = session(&["prog.com"]);
        kernel.regs().write(Reg::Rax, 0x0200).unwrap();
        kernel.regs().write(Reg::Rdx, u64::from(b'A')).unwrap();
        assert_eq!(kernel.dispatch(0x21).unwrap(), DispatchResult::Handled);
        assert_eq!(console.contents(), b"A");
        // AL mirrors the written character.
        assert_eq!(kernel.regs().read_u8_lo(Reg::Rax).unwrap(), b'A');
    }

    #[test]
    fn test_string_output() {
        let (_, mut kernel, console) = session(&["prog.com"]);
        kernel.memory().write_bytes(0x200, b"hi there$").unwrap();
        kernel.regs().write(Reg::Rax, 0x0900).unwrap();
        kernel.regs().write(Reg::Ds, 0).unwrap();
        kernel.regs().write(Reg::Rdx, 0x200).unwrap();
        assert_eq!(kernel.dispatch(0x21).unwrap(), DispatchResult::Handled);
        assert_eq!(console.contents(), b"hi there");
    }

    #[test]
    fn test_teletype_output() {
        let (_, mut kernel, console) = session(&["prog.com"]);
        kernel.regs().write(Reg::Rax, 0x0e00 | u64::from(b'x')).unwrap();
        assert_eq!(kernel.dispatch(0x10).unwrap(), DispatchResult::Handled);
        assert_eq!(console.contents(), b"x");
    }

    #[test]
    fn test_write_to_stdout_handle() {
        let (_, mut kernel, console) = session(&["prog.com"]);
        kernel.memory().write_bytes(0x300, b"data").unwrap();
        kernel.regs().write(Reg::Rax, 0x4000).unwrap();
        kernel.regs().write(Reg::Rbx, 1).unwrap();
        kernel.regs().write(Reg::Rcx, 4).unwrap();
        kernel.regs().write(Reg::Ds, 0).unwrap();
        kernel.regs().write(Reg::Rdx, 0x300).unwrap();
        assert_eq!(kernel.dispatch(0x21).unwrap(), DispatchResult::Handled);
        assert_eq!(console.contents(), b"data");
        assert_eq!(kernel.regs().read_u16(Reg::Rax).unwrap(), 4);
        assert!(!kernel.regs().carry().unwrap());
    }

    #[test]
    fn test_write_to_invalid_handle_sets_carry() {
        let (_, mut kernel, console) = session(&["prog.com"]);
        kernel.regs().write(Reg::Rax, 0x4000).unwrap();
        kernel.regs().write(Reg::Rbx, 9).unwrap();
        kernel.regs().write(Reg::Rcx, 4).unwrap();
        assert_eq!(kernel.dispatch(0x21).unwrap(), DispatchResult::Handled);
        assert!(console.contents().is_empty());
        assert_eq!(kernel.regs().read_u16(Reg::Rax).unwrap(), 6);
        assert!(kernel.regs().carry().unwrap());
    }

    #[test]
    fn test_out_of_range_guest_pointer_is_unhandled() {
        let (_, mut kernel, console) = session(&["prog.com"]);
        // AH=40h with DS:DX pointing past the end of a 64 KiB image.
        kernel.regs().write(Reg::Rax, 0x4000).unwrap();
        kernel.regs().write(Reg::Rbx, 1).unwrap();
        kernel.regs().write(Reg::Rcx, 4).unwrap();
        kernel.regs().write(Reg::Ds, 0xf000).unwrap();
        kernel.regs().write(Reg::Rdx, 0xffff).unwrap();
        assert_eq!(kernel.dispatch(0x21).unwrap(), DispatchResult::Unhandled);
        assert!(console.contents().is_empty());
        assert_eq!(kernel.exit_status(), None);

        // Same through the $-string arm.
        kernel.regs().write(Reg::Rax, 0x0900).unwrap();
        assert_eq!(kernel.dispatch(0x21).unwrap(), DispatchResult::Unhandled);
    }

    #[test]
    fn test_direct_console_input_form_is_unhandled() {
        let (_, mut kernel, console) = session(&["prog.com"]);
        kernel.regs().write(Reg::Rax, 0x0600).unwrap();
        kernel.regs().write(Reg::Rdx, 0xff).unwrap();
        assert_eq!(kernel.dispatch(0x21).unwrap(), DispatchResult::Unhandled);
        assert!(console.contents().is_empty());
    }

    #[test]
    fn test_get_version() {
        let (_, mut kernel, _) = session(&["prog.com"]);
        kernel.regs().write(Reg::Rax, 0x3000).unwrap();
        assert_eq!(kernel.dispatch(0x21).unwrap(), DispatchResult::Handled);
        assert_eq!(kernel.regs().read_u16(Reg::Rax).unwrap(), 0x0005);
    }

    #[test]
    fn test_exit_status_gating() {
        let (_, mut kernel, _) = session(&["prog.com"]);
        assert_eq!(kernel.exit_status(), None);

        kernel.regs().write(Reg::Rax, 0x4c00 | 42).unwrap();
        assert_eq!(kernel.dispatch(0x21).unwrap(), DispatchResult::Stop);
        assert_eq!(kernel.exit_status(), Some(42));
        // Idempotent read.
        assert_eq!(kernel.exit_status(), Some(42));
        // A second termination does not overwrite the first.
        kernel.regs().write(Reg::Rax, 0x4c00 | 7).unwrap();
        assert_eq!(kernel.dispatch(0x21).unwrap(), DispatchResult::Stop);
        assert_eq!(kernel.exit_status(), Some(42));
    }

    #[test]
    fn test_int20_terminates_with_zero() {
        let (_, mut kernel, _) = session(&["prog.com"]);
        assert_eq!(kernel.dispatch(0x20).unwrap(), DispatchResult::Stop);
        assert_eq!(kernel.exit_status(), Some(0));
    }

    #[test]
    fn test_unknown_function_and_vector() {
        let (_, mut kernel, _) = session(&["prog.com"]);
        kernel.regs().write(Reg::Rax, 0xff00).unwrap();
        assert_eq!(kernel.dispatch(0x21).unwrap(), DispatchResult::Unhandled);
        assert_eq!(kernel.dispatch(0x13).unwrap(), DispatchResult::Unsupported);
        assert_eq!(kernel.exit_status(), None);
    }

    #[test]
    fn test_dispatch_order_is_preserved() {
        let (_, mut kernel, console) = session(&["prog.com"]);
        // INT 10h prints AL, INT 21h AH=02 prints DL; interleaving the two
        // vectors makes the dispatch order observable in the output.
        kernel.regs().write(Reg::Rax, 0x0e00 | u64::from(b'a')).unwrap();
        kernel.regs().write(Reg::Rdx, u64::from(b'b')).unwrap();
        kernel.dispatch(0x10).unwrap();
        kernel.regs().write(Reg::Rax, 0x0200).unwrap();
        kernel.dispatch(0x21).unwrap();
        kernel.regs().write(Reg::Rax, 0x0e00 | u64::from(b'c')).unwrap();
        kernel.dispatch(0x10).unwrap();
        assert_eq!(console.contents(), b"abc");
    }

    #[test]
    fn test_one_mebibyte_service_call_scenario() {
        // Zero-filled 1 MiB image, vcpu 0, args ["dos.img"]: one INT 21h
        // service call continues the session without terminating it.
        let cpus = SoftVcpus::with_vcpu(VcpuId::new(0));
        let regs = RegisterAccess::new(cpus.clone(), VcpuId::new(0));
        let memory = GuestMemory::alloc(1024 * 1024).unwrap();
        let console = SharedBuf::default();
        let mut kernel = DosKernel::with_console(
            memory,
            regs,
            vec!["dos.img".into()],
            Box::new(console.clone()),
        )
        .unwrap();

        kernel.regs().write(Reg::Rax, 0x0200).unwrap();
        kernel.regs().write(Reg::Rdx, u64::from(b'!')).unwrap();
        let result = kernel.dispatch(0x21).unwrap();
        assert!(result.continues());
        assert_eq!(kernel.exit_status(), None);
    }

    #[test]
    fn test_dispatch_result_contract_values() {
        assert_eq!(DispatchResult::Handled.as_raw(), 0);
        assert_eq!(DispatchResult::Stop.as_raw(), 1);
        assert_eq!(DispatchResult::Unhandled.as_raw(), 2);
        assert_eq!(DispatchResult::Unsupported.as_raw(), 3);
        assert_eq!(DispatchResult::NoReturn.as_raw(), 4);
        assert!(DispatchResult::Handled.continues());
        assert!(DispatchResult::NoReturn.continues());
        assert!(!DispatchResult::Stop.continues());
        assert!(!DispatchResult::Unhandled.continues());
        assert!(!DispatchResult::Unsupported.continues());
    }
}
