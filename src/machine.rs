use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::{self, Write};

use thiserror::Error;

use MachineStatus::*;

use crate::isa;
use crate::mem::{addrs, Memory};

pub const NUM_REGS: usize = 8;
/// Register 7 doubles as the stack pointer.
pub const SP: usize = 7;

/// Bits of the flags register, set exclusively by CMP.
pub mod flags {
    pub const EQ: u8 = 0b001;
    pub const GT: u8 = 0b010;
    pub const LT: u8 = 0b100;
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MachineError {
    #[error("invalid instruction {opcode:#04x} at address {addr:#04x}")]
    InvalidInstruction { opcode: u8, addr: u8 },
    #[error("cycle limit of {0} reached")]
    CycleLimitReached(usize),
    #[error("output failed: {0}")]
    OutputFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MachineStatus {
    Idle,
    Running,
    Halted,
    Error(MachineError),
}

/// The LS-8 machine: 256 bytes of RAM, eight 8-bit registers, a program
/// counter, a flags register and a status. All state is owned here and
/// mutated only by the fetch-decode-execute loop.
pub struct Machine {
    mem: Memory,
    reg: [u8; NUM_REGS],
    pc: u8,
    fl: u8,
    status: MachineStatus,
    ncycles: usize,
    cycle_limit: Option<usize>,
    out: Box<dyn Write>,
}

impl Debug for Machine {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Machine")
            .field("status", &self.status)
            .field("pc", &self.pc)
            .field("fl", &self.fl)
            .field("reg", &self.reg)
            .field("ncycles", &self.ncycles)
            .finish()
    }
}

impl Machine {
    /// Builds a machine around a pre-populated memory. Registers start at
    /// zero except the stack pointer, which starts at 0xF4.
    pub fn new(mem: Memory) -> Machine {
        let mut reg = [0; NUM_REGS];
        reg[SP] = addrs::SP_INIT;
        Machine {
            mem,
            reg,
            pc: 0,
            fl: 0,
            status: Idle,
            ncycles: 0,
            cycle_limit: None,
            out: Box::new(io::stdout()),
        }
    }

    /// Redirects PRN/PRA output, e.g. into a buffer for tests.
    pub fn with_output(mut self, out: Box<dyn Write>) -> Machine {
        self.out = out;
        self
    }

    /// Stops with `CycleLimitReached` after `limit` cycles. Off by
    /// default: a malformed program runs forever, as on the real thing.
    pub fn with_cycle_limit(mut self, limit: usize) -> Machine {
        self.cycle_limit = Some(limit);
        self
    }

    pub fn status(&self) -> &MachineStatus {
        &self.status
    }

    pub fn reg_read(&self, r: u8) -> u8 {
        self.reg[(r & 0x07) as usize]
    }

    pub fn reg_write(&mut self, r: u8, val: u8) {
        self.reg[(r & 0x07) as usize] = val;
    }

    pub fn ram_read(&self, addr: u8) -> u8 {
        self.mem[addr]
    }

    pub fn ram_write(&mut self, addr: u8, val: u8) {
        self.mem[addr] = val;
    }

    pub fn pc(&self) -> u8 {
        self.pc
    }

    pub fn set_pc(&mut self, addr: u8) {
        self.pc = addr;
    }

    pub fn advance(&mut self, n: u8) {
        self.pc = self.pc.wrapping_add(n);
    }

    pub fn fl(&self) -> u8 {
        self.fl
    }

    pub fn set_fl(&mut self, fl: u8) {
        self.fl = fl;
    }

    /// Pushes a value: SP moves down, then the value lands at the new SP.
    /// No overflow check; the stack can wrap into the code region.
    pub fn push(&mut self, val: u8) {
        let sp = self.reg[SP].wrapping_sub(1);
        self.reg[SP] = sp;
        self.mem[sp] = val;
    }

    /// Pops the value at SP, then SP moves up. Popping past the initial
    /// stack pointer is not checked.
    pub fn pop(&mut self) -> u8 {
        let sp = self.reg[SP];
        let val = self.mem[sp];
        self.reg[SP] = sp.wrapping_add(1);
        val
    }

    pub fn halt(&mut self) {
        self.status = Halted;
    }

    pub(crate) fn print_dec(&mut self, val: u8) {
        if let Err(e) = writeln!(self.out, "{}", val) {
            self.status = Error(MachineError::OutputFailed(e.to_string()));
        }
    }

    pub(crate) fn print_chr(&mut self, val: u8) {
        if let Err(e) = write!(self.out, "{}", val as char) {
            self.status = Error(MachineError::OutputFailed(e.to_string()));
        }
    }

    /// Runs the fetch-decode-execute loop until the machine halts or a
    /// fatal condition stops it. Fatal conditions surface as `Err`; a
    /// halt, including the silent MOD-by-zero halt, is `Ok`.
    pub fn run(&mut self) -> Result<(), MachineError> {
        self.status = Running;
        while self.status == Running {
            self.cycle();
        }
        let _ = self.out.flush();
        match &self.status {
            Error(e) => Err(e.clone()),
            _ => Ok(()),
        }
    }

    fn cycle(&mut self) {
        log::trace!("{}", self.trace_line());
        let opcode = self.mem[self.pc];
        // Operands are read speculatively, whether the op uses them or not.
        let operand_a = self.mem[self.pc.wrapping_add(1)];
        let operand_b = self.mem[self.pc.wrapping_add(2)];
        let op = match isa::decode(opcode) {
            Some(op) => op,
            None => {
                self.status = Error(MachineError::InvalidInstruction {
                    opcode,
                    addr: self.pc,
                });
                return;
            }
        };
        (op.f)(self, operand_a, operand_b);
        if !op.jumps {
            // Operand count lives in the two high bits of the opcode.
            self.advance(1 + (opcode >> 6));
        }
        self.ncycles += 1;
        if let Some(limit) = self.cycle_limit {
            if self.ncycles >= limit && self.status == Running {
                self.status = Error(MachineError::CycleLimitReached(limit));
            }
        }
    }

    fn trace_line(&self) -> String {
        let mut line = format!(
            "TRACE: {:02X} | {:02X} {:02X} {:02X} |",
            self.pc,
            self.mem[self.pc],
            self.mem[self.pc.wrapping_add(1)],
            self.mem[self.pc.wrapping_add(2)]
        );
        for val in self.reg.iter() {
            line.push_str(&format!(" {:02X}", val));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::isa::opcodes::*;

    #[derive(Clone, Default)]
    struct CaptureBuf(Rc<RefCell<Vec<u8>>>);

    impl CaptureBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    impl Write for CaptureBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn run_image(image: &[u8]) -> (Machine, CaptureBuf, Result<(), MachineError>) {
        let buf = CaptureBuf::default();
        let mut machine =
            Machine::new(Memory::from_image(image)).with_output(Box::new(buf.clone()));
        let result = machine.run();
        (machine, buf, result)
    }

    #[test]
    fn ldi_round_trips() {
        for &(r, v) in &[(0, 8), (3, 0), (6, 255)] {
            let (machine, _, result) = run_image(&[LDI, r, v, HLT]);
            assert_eq!(result, Ok(()));
            assert_eq!(machine.reg_read(r), v);
        }
    }

    #[test]
    fn hlt_stops_the_fetch_loop() {
        let (machine, _, result) = run_image(&[HLT, LDI, 0, 9]);
        assert_eq!(result, Ok(()));
        assert_eq!(*machine.status(), Halted);
        assert_eq!(machine.reg_read(0), 0);
    }

    #[test]
    fn push_then_pop_round_trips_and_restores_sp() {
        let image = &[LDI, 0, 5, PUSH, 0, LDI, 0, 0, POP, 0, HLT];
        let (machine, _, result) = run_image(image);
        assert_eq!(result, Ok(()));
        assert_eq!(machine.reg_read(0), 5);
        assert_eq!(machine.reg_read(SP as u8), crate::mem::addrs::SP_INIT);
    }

    #[test]
    fn push_moves_sp_down_and_stores() {
        let mut machine = Machine::new(Memory::new());
        machine.push(9);
        assert_eq!(machine.reg_read(SP as u8), 0xF3);
        assert_eq!(machine.ram_read(0xF3), 9);
        assert_eq!(machine.pop(), 9);
        assert_eq!(machine.reg_read(SP as u8), 0xF4);
    }

    #[test]
    fn call_returns_to_the_instruction_after_the_call() {
        // 0: LDI R1,7  3: CALL R1  5: HLT  6: NOP  7: LDI R0,99  10: RET
        let image = &[LDI, 1, 7, CALL, 1, HLT, NOP, LDI, 0, 99, RET];
        let (machine, _, result) = run_image(image);
        assert_eq!(result, Ok(()));
        assert_eq!(machine.reg_read(0), 99);
        assert_eq!(*machine.status(), Halted);
        assert_eq!(machine.reg_read(SP as u8), crate::mem::addrs::SP_INIT);
    }

    #[test]
    fn mod_by_zero_halts_with_no_output_and_no_error() {
        let image = &[LDI, 0, 5, LDI, 1, 0, MOD, 0, 1, PRN, 0, HLT];
        let (machine, buf, result) = run_image(image);
        assert_eq!(result, Ok(()));
        assert_eq!(*machine.status(), Halted);
        assert_eq!(buf.contents(), "");
        assert_eq!(machine.reg_read(0), 5);
    }

    #[test]
    fn unknown_opcode_is_a_distinct_error() {
        let (machine, _, result) = run_image(&[0xFF]);
        assert_eq!(
            result,
            Err(MachineError::InvalidInstruction {
                opcode: 0xFF,
                addr: 0,
            })
        );
        assert_eq!(
            *machine.status(),
            Error(MachineError::InvalidInstruction {
                opcode: 0xFF,
                addr: 0,
            })
        );
    }

    #[test]
    fn cycle_limit_stops_a_spinning_program() {
        // JMP R0 with R0 = 3 jumps to itself forever.
        let image = &[LDI, 0, 3, JMP, 0];
        let buf = CaptureBuf::default();
        let mut machine = Machine::new(Memory::from_image(image))
            .with_output(Box::new(buf))
            .with_cycle_limit(50);
        assert_eq!(machine.run(), Err(MachineError::CycleLimitReached(50)));
    }

    #[test]
    fn only_cmp_touches_the_flags() {
        let (machine, _, _) = run_image(&[LDI, 0, 1, LDI, 1, 2, ADD, 0, 1, HLT]);
        assert_eq!(machine.fl(), 0);
        let (machine, _, _) = run_image(&[LDI, 0, 1, LDI, 1, 2, CMP, 0, 1, HLT]);
        assert_eq!(machine.fl(), flags::LT);
    }

    #[test]
    fn prn_writes_decimal_with_newline() {
        let (_, buf, result) = run_image(&[LDI, 0, 72, PRN, 0, HLT]);
        assert_eq!(result, Ok(()));
        assert_eq!(buf.contents(), "72\n");
    }

    #[test]
    fn pra_writes_the_code_point() {
        let (_, buf, result) = run_image(&[LDI, 0, 72, PRA, 0, HLT]);
        assert_eq!(result, Ok(()));
        assert_eq!(buf.contents(), "H");
    }

    #[test]
    fn st_stores_through_a_register_held_address() {
        // R0 holds the address, R1 the value.
        let image = &[LDI, 0, 0x20, LDI, 1, 77, ST, 0, 1, HLT];
        let (machine, _, result) = run_image(image);
        assert_eq!(result, Ok(()));
        assert_eq!(machine.ram_read(0x20), 77);
    }

    #[test]
    fn ld_loads_through_a_register_held_address() {
        // ST 77 at 0x20, then LD it back into R2.
        let image = &[LDI, 0, 0x20, LDI, 1, 77, ST, 0, 1, LD, 2, 0, HLT];
        let (machine, _, result) = run_image(image);
        assert_eq!(result, Ok(()));
        assert_eq!(machine.reg_read(2), 77);
    }

    #[test]
    fn pc_advance_wraps_modulo_256() {
        // LDI R1,254; JMP R1. The LDI at 254 reads its operands from 255
        // and 0, then the advance wraps the pc to 1, which holds HLT.
        let mut image = vec![0; 256];
        image[..5].copy_from_slice(&[LDI, 1, 254, JMP, 1]);
        image[254] = LDI;
        let (machine, _, result) = run_image(&image);
        assert_eq!(result, Ok(()));
        assert_eq!(*machine.status(), Halted);
        assert_eq!(machine.reg_read(0), LDI); // operand_b wrapped to mem[0]
    }
}
