use std::cmp::Ordering;
use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::machine::{flags, Machine};

/// LS-8 opcode values. The two high bits give the operand count and
/// bit 4 marks instructions that set the pc themselves.
pub mod opcodes {
    pub const NOP: u8 = 0x00;
    pub const HLT: u8 = 0x01;
    pub const RET: u8 = 0x11;
    pub const PUSH: u8 = 0x45;
    pub const POP: u8 = 0x46;
    pub const PRN: u8 = 0x47;
    pub const PRA: u8 = 0x48;
    pub const CALL: u8 = 0x50;
    pub const JMP: u8 = 0x54;
    pub const JEQ: u8 = 0x55;
    pub const JNE: u8 = 0x56;
    pub const JGT: u8 = 0x57;
    pub const JLT: u8 = 0x58;
    pub const JLE: u8 = 0x59;
    pub const JGE: u8 = 0x5A;
    pub const NOT: u8 = 0x69;
    pub const LDI: u8 = 0x82;
    pub const LD: u8 = 0x83;
    pub const ST: u8 = 0x84;
    pub const ADD: u8 = 0xA0;
    pub const MUL: u8 = 0xA2;
    pub const MOD: u8 = 0xA4;
    pub const CMP: u8 = 0xA7;
    pub const AND: u8 = 0xA8;
    pub const OR: u8 = 0xAA;
    pub const XOR: u8 = 0xAB;
    pub const SHL: u8 = 0xAC;
    pub const SHR: u8 = 0xAD;
}

pub struct Op {
    pub name: &'static str,
    pub f: fn(&mut Machine, u8, u8),
    /// True when the operation repositions the pc itself; the engine
    /// must not auto-advance after it.
    pub jumps: bool,
}

impl Debug for Op {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Op").field("name", &self.name).finish()
    }
}

/// Looks an opcode up in the dispatch table. Unknown opcodes are a
/// fatal condition for the caller.
pub fn decode(opcode: u8) -> Option<&'static Op> {
    use opcodes::*;
    Some(match opcode {
        NOP => ops::NOP,
        HLT => ops::HLT,
        RET => ops::RET,
        PUSH => ops::PUSH,
        POP => ops::POP,
        PRN => ops::PRN,
        PRA => ops::PRA,
        CALL => ops::CALL,
        JMP => ops::JMP,
        JEQ => ops::JEQ,
        JNE => ops::JNE,
        JGT => ops::JGT,
        JLT => ops::JLT,
        JLE => ops::JLE,
        JGE => ops::JGE,
        NOT => ops::NOT,
        LDI => ops::LDI,
        LD => ops::LD,
        ST => ops::ST,
        ADD => ops::ADD,
        MUL => ops::MUL,
        MOD => ops::MOD,
        CMP => ops::CMP,
        AND => ops::AND,
        OR => ops::OR,
        XOR => ops::XOR,
        SHL => ops::SHL,
        SHR => ops::SHR,
        _ => return None,
    })
}

// --- op functions ---

pub fn nop(_: &mut Machine, _: u8, _: u8) {}

pub fn hlt(m: &mut Machine, _: u8, _: u8) {
    m.halt();
}

pub fn ldi(m: &mut Machine, a: u8, b: u8) {
    m.reg_write(a, b);
}

pub fn ld(m: &mut Machine, a: u8, b: u8) {
    let addr = m.reg_read(b);
    let val = m.ram_read(addr);
    m.reg_write(a, val);
}

pub fn st(m: &mut Machine, a: u8, b: u8) {
    let addr = m.reg_read(a);
    let val = m.reg_read(b);
    m.ram_write(addr, val);
}

pub fn prn(m: &mut Machine, a: u8, _: u8) {
    let val = m.reg_read(a);
    m.print_dec(val);
}

pub fn pra(m: &mut Machine, a: u8, _: u8) {
    let val = m.reg_read(a);
    m.print_chr(val);
}

pub fn push(m: &mut Machine, a: u8, _: u8) {
    let val = m.reg_read(a);
    m.push(val);
}

pub fn pop(m: &mut Machine, a: u8, _: u8) {
    let val = m.pop();
    m.reg_write(a, val);
}

pub fn call(m: &mut Machine, a: u8, _: u8) {
    // The return address is the instruction right after the CALL.
    let ret_addr = m.pc().wrapping_add(2);
    m.push(ret_addr);
    m.set_pc(m.reg_read(a));
}

pub fn ret(m: &mut Machine, _: u8, _: u8) {
    let addr = m.pop();
    m.set_pc(addr);
}

pub fn jmp(m: &mut Machine, a: u8, _: u8) {
    m.set_pc(m.reg_read(a));
}

pub fn jne(m: &mut Machine, a: u8, _: u8) {
    if m.fl() & flags::EQ == 0 {
        m.set_pc(m.reg_read(a));
    } else {
        m.advance(2);
    }
}

macro_rules! cond_jump_funcs {
    ( $($name:ident ($($flag:ident)|+));+; ) => {
        $(
            pub fn $name(m: &mut Machine, a: u8, _: u8) {
                if m.fl() & ($(flags::$flag)|+) != 0 {
                    m.set_pc(m.reg_read(a));
                } else {
                    m.advance(2);
                }
            }
        )+
    }
}

cond_jump_funcs! {
    jeq (EQ);
    jgt (GT);
    jlt (LT);
    jge (GT | EQ);
    jle (LT | EQ);
}

pub fn cmp(m: &mut Machine, a: u8, b: u8) {
    let fl = match m.reg_read(a).cmp(&m.reg_read(b)) {
        Ordering::Equal => flags::EQ,
        Ordering::Greater => flags::GT,
        Ordering::Less => flags::LT,
    };
    m.set_fl(fl);
}

macro_rules! alu_binary_funcs {
    ( $($name:ident ($operator:tt));+; ) => {
        $(
            pub fn $name(m: &mut Machine, a: u8, b: u8) {
                let res = ((m.reg_read(a) as u32) $operator (m.reg_read(b) as u32)) as u8;
                m.reg_write(a, res);
            }
        )+
    }
}

alu_binary_funcs! {
    add ( + );
    mul ( * );
    and ( & );
    or  ( | );
    xor ( ^ );
}

macro_rules! alu_shift_funcs {
    ( $($name:ident ($checked_shift:ident));+; ) => {
        $(
            pub fn $name(m: &mut Machine, a: u8, b: u8) {
                let amount = m.reg_read(b) as u32;
                let res = (m.reg_read(a) as u32).$checked_shift(amount).unwrap_or(0) as u8;
                m.reg_write(a, res);
            }
        )+
    };
}

alu_shift_funcs! {
    shl (checked_shl);
    shr (checked_shr);
}

pub fn not(m: &mut Machine, a: u8, _: u8) {
    let val = m.reg_read(a);
    m.reg_write(a, !val);
}

pub fn rem(m: &mut Machine, a: u8, b: u8) {
    let divisor = m.reg_read(b);
    if divisor == 0 {
        // Defined behavior from the original machine: halt, silently.
        m.halt();
        return;
    }
    let res = m.reg_read(a) % divisor;
    m.reg_write(a, res);
}

pub mod ops {
    use super::Op;

    macro_rules! register_ops {
        ( $($name:ident => $f:ident, jumps: $jumps:expr);+; ) => {
            $(
                pub const $name: &Op = &Op {
                    name: stringify!($name),
                    f: super::$f,
                    jumps: $jumps,
                };
            )+
        }
    }

    register_ops! {
        NOP => nop, jumps: false;
        HLT => hlt, jumps: false;
        RET => ret, jumps: true;
        PUSH => push, jumps: false;
        POP => pop, jumps: false;
        PRN => prn, jumps: false;
        PRA => pra, jumps: false;
        CALL => call, jumps: true;
        JMP => jmp, jumps: true;
        JEQ => jeq, jumps: true;
        JNE => jne, jumps: true;
        JGT => jgt, jumps: true;
        JLT => jlt, jumps: true;
        JLE => jle, jumps: true;
        JGE => jge, jumps: true;
        NOT => not, jumps: false;
        LDI => ldi, jumps: false;
        LD => ld, jumps: false;
        ST => st, jumps: false;
        ADD => add, jumps: false;
        MUL => mul, jumps: false;
        MOD => rem, jumps: false;
        CMP => cmp, jumps: false;
        AND => and, jumps: false;
        OR => or, jumps: false;
        XOR => xor, jumps: false;
        SHL => shl, jumps: false;
        SHR => shr, jumps: false;
    }
}
