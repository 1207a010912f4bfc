//! Cycle-exact emulation of the NMOS 6502 and CMOS 65C12 processors.
//!
//! Each opcode compiles once, at CPU construction, into an immutable program
//! of typed cycle steps reproducing the real chip's bus-access pattern:
//! spurious reads and writes, page-crossing penalties, the indirect-jump
//! page-wrap bug, undocumented NMOS opcodes, and decimal-mode flag artifacts.
//! The execution engine interprets those programs against live state,
//! advances a shared cycle budget through the [`bus::IoBus`] poll hooks, and
//! samples the interrupt lines exactly one cycle before each instruction
//! retires.

pub mod bus;

mod alu;
mod compiler;
mod disasm;
mod dispatch;
mod semantics;

use crate::bus::MemoryMap;
use crate::compiler::InstructionSet;
use bincode::{Decode, Encode};
use emu65_common::num::GetBit;
use std::rc::Rc;
use thiserror::Error;

pub use semantics::{AddrMode, Mnemonic};

pub(crate) const NMI_VECTOR: u16 = 0xFFFA;
pub(crate) const RESET_VECTOR: u16 = 0xFFFC;
pub(crate) const IRQ_VECTOR: u16 = 0xFFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Variant {
    Nmos6502,
    Cmos65C12,
}

/// Context a status-byte read happens in; decides the state of the B flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum StatusReadContext {
    HardwareInterruptHandler,
    Brk,
    PushStack,
}

#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct StatusFlags {
    pub(crate) carry: bool,
    pub(crate) zero: bool,
    pub(crate) interrupt_disable: bool,
    pub(crate) decimal: bool,
    pub(crate) overflow: bool,
    pub(crate) negative: bool,
}

impl StatusFlags {
    /// Power-on state: interrupt-disable set, everything else clear.
    #[must_use]
    pub fn new() -> Self {
        Self {
            carry: false,
            zero: false,
            interrupt_disable: true,
            decimal: false,
            overflow: false,
            negative: false,
        }
    }

    #[must_use]
    pub fn to_byte(self, read_ctx: StatusReadContext) -> u8 {
        // B is set when pushed by BRK/PHP, clear when pushed by a hardware
        // interrupt; bit 5 always reads as 1
        let b_flag = match read_ctx {
            StatusReadContext::Brk | StatusReadContext::PushStack => 0x10,
            StatusReadContext::HardwareInterruptHandler => 0x00,
        };

        (u8::from(self.negative) << 7)
            | (u8::from(self.overflow) << 6)
            | 0x20
            | b_flag
            | (u8::from(self.decimal) << 3)
            | (u8::from(self.interrupt_disable) << 2)
            | (u8::from(self.zero) << 1)
            | u8::from(self.carry)
    }

    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Self {
            negative: byte.bit(7),
            overflow: byte.bit(6),
            decimal: byte.bit(3),
            interrupt_disable: byte.bit(2),
            zero: byte.bit(1),
            carry: byte.bit(0),
        }
    }
}

impl Default for StatusFlags {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct CpuRegisters {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub status: StatusFlags,
}

impl CpuRegisters {
    #[must_use]
    pub fn new() -> Self {
        Self { a: 0, x: 0, y: 0, sp: 0xFD, pc: 0, status: StatusFlags::new() }
    }
}

impl Default for CpuRegisters {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded (mnemonic, addressing mode) pair with no semantic entry. Raised
/// while the instruction set is compiled at construction, never at runtime.
#[derive(Debug, Clone, Error)]
#[error("no semantic entry for {mnemonic} {mode:?}")]
pub struct ConfigurationError {
    pub mnemonic: Mnemonic,
    pub mode: AddrMode,
}

/// An opcode byte with no compiled program, which only exists on the NMOS
/// core. The processor halts with its state preserved for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid opcode ${opcode:02X} at ${pc:04X}")]
pub struct InvalidOpcode {
    pub opcode: u8,
    pub pc: u16,
}

/// One recorded bus access, in execution order. Only collected while the bus
/// log is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusAccess {
    Read(u16, u8),
    Write(u16, u8),
}

#[derive(Debug, Clone)]
pub struct Mos65xx {
    registers: CpuRegisters,
    memory: MemoryMap,
    variant: Variant,
    instructions: Rc<InstructionSet>,
    cycles: i64,
    total_cycles: u64,
    take_int: bool,
    halted: bool,
    fault: Option<InvalidOpcode>,
    bus_log: Option<Vec<BusAccess>>,
}

impl Mos65xx {
    /// Create a CPU with the full instruction set compiled for `variant`.
    /// Load ROM images through [`Mos65xx::memory_mut`] and call
    /// [`Mos65xx::reset`] before executing.
    pub fn new(variant: Variant) -> Result<Self, ConfigurationError> {
        let instructions = Rc::new(InstructionSet::build(variant)?);
        Ok(Self {
            registers: CpuRegisters::new(),
            memory: MemoryMap::new(),
            variant,
            instructions,
            cycles: 0,
            total_cycles: 0,
            take_int: false,
            halted: false,
            fault: None,
            bus_log: None,
        })
    }

    /// Reset the processor: reinitialize registers and flags (interrupt
    /// disable set), restore the power-on bank configuration, fetch the
    /// program counter from the reset vector, and clear a halt.
    pub fn reset(&mut self) {
        self.memory.reset_banking();
        self.registers = CpuRegisters::new();
        let lsb = self.memory.peek(RESET_VECTOR);
        let msb = self.memory.peek(RESET_VECTOR.wrapping_add(1));
        self.registers.pc = u16::from_le_bytes([lsb, msb]);
        self.take_int = false;
        self.halted = false;
        self.fault = None;
        self.cycles = 0;
    }

    /// Execute a single instruction (or interrupt service sequence),
    /// regardless of the remaining cycle budget.
    pub fn step<I: bus::IoBus>(&mut self, io: &mut I) {
        if self.halted {
            return;
        }
        self.step_instruction(io);
    }

    /// Add `cycles` to the budget and run instructions until it is exhausted
    /// or the processor halts. The halted flag is only checked at instruction
    /// boundaries; an in-flight instruction always completes.
    pub fn run_slice<I: bus::IoBus>(&mut self, io: &mut I, cycles: u32) {
        if self.halted {
            return;
        }
        self.cycles += i64::from(cycles);
        while !self.halted && self.cycles > 0 {
            self.step_instruction(io);
        }
    }

    /// Request a stop; takes effect at the next instruction boundary.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    #[inline]
    #[must_use]
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// The fault that halted the processor, if any.
    #[must_use]
    pub fn fault(&self) -> Option<InvalidOpcode> {
        self.fault
    }

    #[inline]
    #[must_use]
    pub fn pc(&self) -> u16 {
        self.registers.pc
    }

    #[must_use]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    #[must_use]
    pub fn registers(&self) -> &CpuRegisters {
        &self.registers
    }

    pub fn set_registers(&mut self, registers: CpuRegisters) {
        self.registers = registers;
    }

    /// Cycles left in the current slice; negative when the last instruction
    /// overran the budget.
    #[must_use]
    pub fn cycles_remaining(&self) -> i64 {
        self.cycles
    }

    /// Cumulative cycle counter since construction.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    #[must_use]
    pub fn memory(&self) -> &MemoryMap {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryMap {
        &mut self.memory
    }

    /// Start recording every bus access. Intended for test harnesses and
    /// debuggers; has a small cost per access while enabled.
    pub fn enable_bus_log(&mut self) {
        self.bus_log = Some(Vec::new());
    }

    /// Take the recorded accesses, leaving the log enabled and empty.
    pub fn take_bus_log(&mut self) -> Vec<BusAccess> {
        self.bus_log.replace(Vec::new()).unwrap_or_default()
    }

    /// Disassemble the instruction at `address` without touching processor
    /// state. Returns the text, the next instruction's address, and a target
    /// address where the operand names one.
    #[must_use]
    pub fn disassemble(&self, address: u16) -> (String, u16, Option<u16>) {
        disasm::disassemble(self.variant, &self.memory, address)
    }
}
