//! The instruction compiler: turns (opcode, variant) into an immutable
//! program of typed cycle steps that the execution engine interprets.
//!
//! Programs are built once when the CPU is constructed and reused for the
//! process lifetime. Cycles with no operation accumulate into a skip counter
//! that is flushed as a single poll step immediately before the next
//! address-exact operation (or at sequence end), so peripherals observe time
//! in the same batches the hardware's bus-idle cycles produce. An instruction
//! whose timing depends on a page crossing compiles to a split program: a
//! common preamble plus two continuations, selected once by the carry test
//! after the preamble has run.

use crate::semantics::{self, AddrMode, BranchCond, EffectKind, SemanticEffect};
use crate::{ConfigurationError, Variant};
use std::collections::BTreeMap;

/// The operand slot and address scratch state threaded through one
/// instruction's steps. The compiler wires each step to the right cell; no
/// step ever addresses CPU state by name at runtime.
#[derive(Debug, Clone, Default)]
pub(crate) struct ExecContext {
    pub operand: u8,
    pub addr: u16,
    pub addr_with_carry: u16,
    pub addr_non_carry: u16,
    pub ptr_lo: u8,
    pub ptr_hi: u8,
    /// Extra idle cycles requested by a semantic effect (CMOS decimal fixup).
    pub extra_poll: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Index {
    X,
    Y,
}

/// Address expression evaluated against the context when a step executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddrExpr {
    /// The resolved effective address.
    Effective,
    /// Indexed address including the carry out of the low byte.
    WithCarry,
    /// Indexed address with the carry dropped (stays in the base page).
    NonCarry,
    /// Successor of the effective address within the same page (the NMOS
    /// indirect-jump pointer bug).
    PointerNextWrapped,
    /// Successor of the effective address with natural 16-bit increment.
    PointerNextLinear,
}

/// Zero-page address expression; always resolves inside page zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ZpExpr {
    Effective,
    /// Effective plus one, wrapping within zero page.
    EffectiveNext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadDst {
    /// Spurious access: the value is thrown away.
    Discard,
    Operand,
    PtrLo,
    PtrHi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushSrc {
    A,
    X,
    Y,
    /// Status byte with the B flag set (BRK, PHP).
    StatusBrk,
    /// Status byte with the B flag clear (hardware interrupt entry).
    StatusIrq,
    PcHi,
    PcLo,
    /// High/low byte of PC minus one (JSR pushes the return address less one).
    PcMinus1Hi,
    PcMinus1Lo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PullDst {
    A,
    X,
    Y,
    Status,
    PtrLo,
    PtrHi,
}

/// Pure computation performed between bus cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Micro {
    /// `addr = fetch byte` (zero-page operand).
    FetchAddrByte,
    /// `addr = (fetch byte + index) & 0xFF`.
    FetchAddrByteIndexed(Index),
    /// `addr = fetch word`, little-endian.
    FetchAddrWord,
    /// `addr = fetch word + X` (CMOS `(abs,X)`).
    FetchAddrWordIndexed(Index),
    /// `operand = fetch byte` (immediate).
    FetchOperand,
    /// Fetch and discard one byte, advancing PC (BRK pad, reserved NOPs).
    FetchDiscard,
    /// Dummy read of the current PC without advancing it.
    ReadPcSpurious,
    LoadOperandA,
    StoreOperandA,
    /// `addr = ptr_lo | ptr_hi << 8`.
    AssemblePointer,
    /// Compute carried and uncarried candidates of `addr + index`.
    IndexEffective(Index),
    /// Undocumented-store quirk: a carried write collapses into zero page.
    CollapseCarried,
    /// Choose the NMI or IRQ vector, acknowledging a pending NMI.
    SelectVector,
    /// Set the interrupt-disable flag (CMOS also clears decimal).
    EnterInterrupt,
    /// `pc = addr`.
    Jump,
    /// `pc = addr + 1` (RTS).
    JumpIncremented,
    /// Apply a semantic effect to the registers and operand slot.
    Apply(semantics::ApplyFn),
}

/// One interpreted step of a compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Consume idle cycles.
    Poll(u32),
    /// Consume idle cycles, naming the address of the upcoming access for
    /// peripherals that snoop bus traffic.
    PollAddr(u32, AddrExpr),
    Read { addr: AddrExpr, dst: ReadDst },
    Write { addr: AddrExpr },
    ReadZp { addr: ZpExpr, dst: ReadDst },
    WriteZp { addr: ZpExpr },
    Push(PushSrc),
    Pull(PullDst),
    Compute(Micro),
    /// Latch pending interrupt-line state; always one cycle before retire.
    CheckInterrupt,
}

#[derive(Debug, Clone)]
pub(crate) enum CompiledInstruction {
    Linear(Vec<Step>),
    /// Page-crossing timing split: the continuation is chosen once, after the
    /// preamble, by comparing the carried and uncarried addresses.
    Split { preamble: Vec<Step>, if_crossed: Vec<Step>, if_not_crossed: Vec<Step> },
    /// Branches are dispatched to the engine's dedicated routine.
    Branch(BranchCond),
}

#[derive(Debug, Clone, Default)]
struct Slot {
    steps: Vec<Step>,
    exact: bool,
    addr: Option<AddrExpr>,
}

/// Cycle-slot builder. Operations land in the slot for the cycle they occupy;
/// `render` walks the slots in order and batches the gaps into poll steps.
struct ProgramBuilder {
    cmos: bool,
    cycle: u32,
    slots: BTreeMap<u32, Slot>,
}

impl ProgramBuilder {
    fn new(cmos: bool) -> Self {
        Self { cmos, cycle: 0, slots: BTreeMap::new() }
    }

    fn slot_entry(&mut self, cycle: u32) -> &mut Slot {
        self.slots.entry(cycle).or_default()
    }

    fn append_at(&mut self, cycle: u32, step: Step, exact: bool, addr: Option<AddrExpr>) {
        let slot = self.slot_entry(cycle);
        slot.steps.push(step);
        slot.exact |= exact;
        if slot.addr.is_none() {
            slot.addr = addr;
        }
    }

    fn prepend_at(&mut self, cycle: u32, step: Step, exact: bool) {
        let slot = self.slot_entry(cycle);
        slot.steps.insert(0, step);
        slot.exact |= exact;
    }

    /// Append a computation to the current cycle's slot.
    fn append(&mut self, micro: Micro) {
        self.append_at(self.cycle, Step::Compute(micro), false, None);
    }

    fn append_step(&mut self, step: Step) {
        self.append_at(self.cycle, step, false, None);
    }

    fn tick(&mut self, cycles: u32) {
        self.cycle += cycles;
    }

    fn read_op(&mut self, addr: AddrExpr, dst: ReadDst) {
        self.cycle += 1;
        self.append_at(self.cycle, Step::Read { addr, dst }, true, Some(addr));
    }

    fn write_op(&mut self, addr: AddrExpr) {
        self.cycle += 1;
        self.append_at(self.cycle, Step::Write { addr }, true, Some(addr));
    }

    fn zp_read_op(&mut self, addr: ZpExpr, dst: ReadDst) {
        self.cycle += 1;
        self.append_at(self.cycle, Step::ReadZp { addr, dst }, false, None);
    }

    fn zp_write_op(&mut self, addr: ZpExpr) {
        self.cycle += 1;
        self.append_at(self.cycle, Step::WriteZp { addr }, true, None);
    }

    fn stack_push_op(&mut self, src: PushSrc) {
        self.cycle += 1;
        self.append_at(self.cycle, Step::Push(src), true, None);
    }

    /// The second access of an absolute/indirect RMW: the NMOS core writes
    /// the unmodified value back, the CMOS core reads the cell again.
    fn spurious_op(&mut self, addr: AddrExpr) {
        if self.cmos {
            self.read_op(addr, ReadDst::Discard);
        } else {
            self.write_op(addr);
        }
    }

    /// Render with the interrupt-sample step prefixed one cycle before the
    /// end, forcing all earlier cycles to be polled before the sample.
    fn render(&mut self, start: u32) -> Vec<Step> {
        if self.cycle < 2 {
            self.cycle = 2;
        }
        self.prepend_at(self.cycle - 1, Step::CheckInterrupt, true);
        self.render_internal(start)
    }

    fn render_internal(&self, start: u32) -> Vec<Step> {
        let mut out = Vec::new();
        let mut skip = 0;
        for i in start..self.cycle {
            let Some(slot) = self.slots.get(&i) else {
                skip += 1;
                continue;
            };
            if skip > 0 && slot.exact {
                out.push(match slot.addr {
                    Some(addr) => Step::PollAddr(skip, addr),
                    None => Step::Poll(skip),
                });
                skip = 0;
            }
            out.extend_from_slice(&slot.steps);
            skip += 1;
        }
        if skip > 0 {
            out.push(match self.slots.get(&self.cycle).and_then(|slot| slot.addr) {
                Some(addr) => Step::PollAddr(skip, addr),
                None => Step::Poll(skip),
            });
        }
        if let Some(slot) = self.slots.get(&self.cycle) {
            out.extend_from_slice(&slot.steps);
        }
        out
    }

    fn split(self) -> SplitBuilder {
        let mut if_crossed = ProgramBuilder::new(self.cmos);
        if_crossed.tick(self.cycle);
        let mut if_not_crossed = ProgramBuilder::new(self.cmos);
        if_not_crossed.tick(self.cycle);
        SplitBuilder { preamble: self, if_crossed, if_not_crossed }
    }
}

/// Builder for split programs; shared operations are mirrored into both
/// continuations, arm-specific ones address an arm directly.
struct SplitBuilder {
    preamble: ProgramBuilder,
    if_crossed: ProgramBuilder,
    if_not_crossed: ProgramBuilder,
}

impl SplitBuilder {
    fn append(&mut self, micro: Micro) {
        self.if_crossed.append(micro);
        self.if_not_crossed.append(micro);
    }

    fn read_op(&mut self, addr: AddrExpr, dst: ReadDst) {
        self.if_crossed.read_op(addr, dst);
        self.if_not_crossed.read_op(addr, dst);
    }

    fn write_op(&mut self, addr: AddrExpr) {
        self.if_crossed.write_op(addr);
        self.if_not_crossed.write_op(addr);
    }

    fn spurious_op(&mut self, addr: AddrExpr) {
        self.if_crossed.spurious_op(addr);
        self.if_not_crossed.spurious_op(addr);
    }

    fn render(mut self) -> CompiledInstruction {
        let start = self.preamble.cycle;
        CompiledInstruction::Split {
            preamble: self.preamble.render_internal(0),
            if_crossed: self.if_crossed.render(start),
            if_not_crossed: self.if_not_crossed.render(start),
        }
    }
}

/// Compile one opcode for the given variant.
///
/// `Ok(None)` means the byte has no instruction at all, which only happens on
/// the NMOS core (the execution engine halts on it). A decoded pair with no
/// semantic entry is a configuration error, surfaced here at build time.
pub(crate) fn compile(
    variant: Variant,
    opcode: u8,
) -> Result<Option<CompiledInstruction>, ConfigurationError> {
    let Some((mnemonic, mode)) = semantics::decode(variant, opcode) else {
        return Ok(match variant {
            Variant::Nmos6502 => None,
            Variant::Cmos65C12 => Some(reserved_nop_program(opcode)),
        });
    };

    let config_error = || ConfigurationError { mnemonic, mode };
    let effect = semantics::lookup(variant, mnemonic, mode).ok_or_else(config_error)?;
    let cmos = variant == Variant::Cmos65C12;

    if mode == AddrMode::Relative {
        return match effect.kind {
            EffectKind::Branch(cond) => Ok(Some(CompiledInstruction::Branch(cond))),
            _ => Err(config_error()),
        };
    }

    let compiled = match mode {
        AddrMode::Implied => compile_implied(cmos, &effect),
        AddrMode::Accumulator => compile_accumulator(cmos, &effect),
        AddrMode::Immediate => compile_immediate(cmos, &effect),
        AddrMode::ZeroPage => compile_zero_page(cmos, &effect, None),
        AddrMode::ZeroPageX => compile_zero_page(cmos, &effect, Some(Index::X)),
        AddrMode::ZeroPageY => compile_zero_page(cmos, &effect, Some(Index::Y)),
        AddrMode::Absolute => compile_absolute(cmos, &effect),
        AddrMode::AbsoluteX => compile_absolute_indexed(cmos, &effect, Index::X),
        AddrMode::AbsoluteY => compile_absolute_indexed(cmos, &effect, Index::Y),
        AddrMode::IndexedIndirect => compile_indexed_indirect(cmos, &effect),
        AddrMode::IndirectIndexed => compile_indirect_indexed(cmos, &effect),
        AddrMode::ZeroPageIndirect => compile_zero_page_indirect(cmos, &effect),
        AddrMode::Indirect => compile_indirect_jump(cmos, &effect),
        AddrMode::AbsoluteIndexedIndirect => compile_indexed_indirect_jump(cmos, &effect),
        AddrMode::Relative => unreachable!("handled above"),
    };

    compiled.map(Some).ok_or_else(config_error)
}

fn apply_fn(effect: &SemanticEffect) -> Option<semantics::ApplyFn> {
    match effect.kind {
        EffectKind::Apply(f) => Some(f),
        _ => None,
    }
}

fn compile_implied(cmos: bool, effect: &SemanticEffect) -> Option<CompiledInstruction> {
    if effect.reads_operand || effect.writes_operand {
        return None;
    }

    if matches!(effect.kind, EffectKind::Break) {
        return Some(brk_program(cmos));
    }

    let mut ig = ProgramBuilder::new(cmos);

    // RTI unstacks before its idle tail
    if matches!(effect.kind, EffectKind::ReturnInterrupt) {
        ig.append_step(Step::Pull(PullDst::Status));
        ig.append_step(Step::Pull(PullDst::PtrLo));
        ig.append_step(Step::Pull(PullDst::PtrHi));
        ig.append(Micro::AssemblePointer);
        ig.append(Micro::Jump);
    }

    ig.tick((1 + effect.extra_cycles).max(2));

    match effect.kind {
        EffectKind::Apply(f) => ig.append(Micro::Apply(f)),
        EffectKind::Push(src) => ig.append_step(Step::Push(src)),
        EffectKind::Pull(dst) => ig.append_step(Step::Pull(dst)),
        EffectKind::Return => {
            ig.append_step(Step::Pull(PullDst::PtrLo));
            ig.append_step(Step::Pull(PullDst::PtrHi));
            ig.append(Micro::AssemblePointer);
            ig.append(Micro::JumpIncremented);
        }
        EffectKind::ReturnInterrupt => {}
        _ => return None,
    }

    Some(CompiledInstruction::Linear(ig.render(0)))
}

fn compile_accumulator(cmos: bool, effect: &SemanticEffect) -> Option<CompiledInstruction> {
    let f = apply_fn(effect)?;
    let mut ig = ProgramBuilder::new(cmos);
    ig.tick(2);
    ig.append(Micro::LoadOperandA);
    ig.append(Micro::Apply(f));
    ig.append(Micro::StoreOperandA);
    Some(CompiledInstruction::Linear(ig.render(0)))
}

fn compile_immediate(cmos: bool, effect: &SemanticEffect) -> Option<CompiledInstruction> {
    let f = apply_fn(effect)?;
    if effect.writes_operand {
        return None;
    }
    let mut ig = ProgramBuilder::new(cmos);
    ig.tick(2);
    ig.append(Micro::FetchOperand);
    ig.append(Micro::Apply(f));
    Some(CompiledInstruction::Linear(ig.render(0)))
}

fn compile_zero_page(
    cmos: bool,
    effect: &SemanticEffect,
    index: Option<Index>,
) -> Option<CompiledInstruction> {
    let f = apply_fn(effect)?;
    let mut ig = ProgramBuilder::new(cmos);

    match index {
        None => {
            ig.tick(2);
            ig.append(Micro::FetchAddrByte);
        }
        Some(index) => {
            ig.tick(3);
            ig.append(Micro::FetchAddrByteIndexed(index));
        }
    }

    if effect.reads_operand {
        ig.zp_read_op(ZpExpr::Effective, ReadDst::Operand);
        if effect.writes_operand {
            // The RMW double-access cycle; zero page can't be hardware, so an
            // idle cycle stands in for the spurious write
            ig.tick(1);
        }
    }
    ig.append(Micro::Apply(f));
    if effect.writes_operand {
        ig.zp_write_op(ZpExpr::Effective);
    }

    Some(CompiledInstruction::Linear(ig.render(0)))
}

fn compile_absolute(cmos: bool, effect: &SemanticEffect) -> Option<CompiledInstruction> {
    let mut ig = ProgramBuilder::new(cmos);
    ig.tick(3 + effect.extra_cycles);
    ig.append(Micro::FetchAddrWord);

    match effect.kind {
        EffectKind::Jump => ig.append(Micro::Jump),
        EffectKind::JumpSub => {
            ig.append_step(Step::Push(PushSrc::PcMinus1Hi));
            ig.append_step(Step::Push(PushSrc::PcMinus1Lo));
            ig.append(Micro::Jump);
        }
        EffectKind::Apply(f) => {
            if effect.reads_operand {
                ig.read_op(AddrExpr::Effective, ReadDst::Operand);
                if effect.writes_operand {
                    ig.spurious_op(AddrExpr::Effective);
                }
            }
            ig.append(Micro::Apply(f));
            if effect.writes_operand {
                ig.write_op(AddrExpr::Effective);
            }
        }
        _ => return None,
    }

    Some(CompiledInstruction::Linear(ig.render(0)))
}

fn compile_absolute_indexed(
    cmos: bool,
    effect: &SemanticEffect,
    index: Index,
) -> Option<CompiledInstruction> {
    let f = apply_fn(effect)?;
    let mut ig = ProgramBuilder::new(cmos);
    ig.append(Micro::FetchAddrWord);
    ig.append(Micro::IndexEffective(index));
    ig.tick(3);

    let mut ig = ig.split();
    if effect.reads_operand && !effect.writes_operand {
        if cmos {
            // The CMOS core re-reads the instruction byte while carrying;
            // model it as an idle cycle
            ig.if_crossed.tick(1);
        } else {
            // The NMOS core reads the uncarried address
            ig.if_crossed.read_op(AddrExpr::NonCarry, ReadDst::Discard);
        }
        ig.read_op(AddrExpr::WithCarry, ReadDst::Operand);
    } else if effect.reads_operand {
        if cmos {
            ig.if_crossed.tick(1);
            // Without a carry the CMOS core still re-reads the cell through
            // the uncarried address, except for the plain shifts and rotates
            if !effect.is_rotate {
                ig.if_not_crossed.read_op(AddrExpr::NonCarry, ReadDst::Operand);
            }
            ig.read_op(AddrExpr::WithCarry, ReadDst::Operand);
            ig.write_op(AddrExpr::WithCarry);
        } else {
            // NMOS RMW always pays a spurious read and then a spurious write
            ig.read_op(AddrExpr::NonCarry, ReadDst::Discard);
            ig.read_op(AddrExpr::WithCarry, ReadDst::Operand);
            ig.spurious_op(AddrExpr::WithCarry);
        }
    } else if effect.writes_operand {
        if cmos {
            ig.if_crossed.tick(1);
            ig.if_not_crossed.read_op(AddrExpr::NonCarry, ReadDst::Discard);
        } else {
            // Pure stores still exhibit a read at the uncarried address
            ig.read_op(AddrExpr::NonCarry, ReadDst::Discard);
            if effect.zp_quirk {
                // A carried write from these undocumented stores lands in
                // zero page
                ig.append(Micro::CollapseCarried);
            }
        }
    }

    ig.append(Micro::Apply(f));
    if effect.writes_operand {
        ig.write_op(AddrExpr::WithCarry);
    }

    Some(ig.render())
}

fn compile_indexed_indirect(cmos: bool, effect: &SemanticEffect) -> Option<CompiledInstruction> {
    let f = apply_fn(effect)?;
    let mut ig = ProgramBuilder::new(cmos);
    // Two cycles plus the spurious read of the unindexed zero-page byte
    ig.tick(3);
    ig.append(Micro::FetchAddrByteIndexed(Index::X));
    ig.zp_read_op(ZpExpr::Effective, ReadDst::PtrLo);
    ig.zp_read_op(ZpExpr::EffectiveNext, ReadDst::PtrHi);
    ig.append(Micro::AssemblePointer);

    if effect.reads_operand {
        ig.read_op(AddrExpr::Effective, ReadDst::Operand);
        if effect.writes_operand {
            ig.spurious_op(AddrExpr::Effective);
        }
    }
    ig.append(Micro::Apply(f));
    if effect.writes_operand {
        ig.write_op(AddrExpr::Effective);
    }

    Some(CompiledInstruction::Linear(ig.render(0)))
}

fn compile_indirect_indexed(cmos: bool, effect: &SemanticEffect) -> Option<CompiledInstruction> {
    let f = apply_fn(effect)?;
    let mut ig = ProgramBuilder::new(cmos);
    ig.tick(2);
    ig.append(Micro::FetchAddrByte);
    ig.zp_read_op(ZpExpr::Effective, ReadDst::PtrLo);
    ig.zp_read_op(ZpExpr::EffectiveNext, ReadDst::PtrHi);
    ig.append(Micro::AssemblePointer);
    ig.append(Micro::IndexEffective(Index::Y));

    if effect.reads_operand && !effect.writes_operand {
        // Only a carried index costs the spurious access
        let mut ig = ig.split();
        if cmos {
            ig.if_crossed.tick(1);
        } else {
            ig.if_crossed.read_op(AddrExpr::NonCarry, ReadDst::Discard);
        }
        ig.read_op(AddrExpr::WithCarry, ReadDst::Operand);
        ig.append(Micro::Apply(f));
        return Some(ig.render());
    }

    if effect.reads_operand {
        ig.read_op(AddrExpr::NonCarry, ReadDst::Discard);
        ig.read_op(AddrExpr::WithCarry, ReadDst::Operand);
        ig.spurious_op(AddrExpr::WithCarry);
    } else if effect.writes_operand {
        ig.read_op(AddrExpr::NonCarry, ReadDst::Discard);
        if effect.zp_quirk {
            ig.append(Micro::CollapseCarried);
        }
    }
    ig.append(Micro::Apply(f));
    if effect.writes_operand {
        ig.write_op(AddrExpr::WithCarry);
    }

    Some(CompiledInstruction::Linear(ig.render(0)))
}

fn compile_zero_page_indirect(cmos: bool, effect: &SemanticEffect) -> Option<CompiledInstruction> {
    let f = apply_fn(effect)?;
    let mut ig = ProgramBuilder::new(cmos);
    ig.tick(2);
    ig.append(Micro::FetchAddrByte);
    ig.zp_read_op(ZpExpr::Effective, ReadDst::PtrLo);
    ig.zp_read_op(ZpExpr::EffectiveNext, ReadDst::PtrHi);
    ig.append(Micro::AssemblePointer);

    if effect.reads_operand {
        ig.read_op(AddrExpr::Effective, ReadDst::Operand);
    }
    ig.append(Micro::Apply(f));
    if effect.writes_operand {
        ig.write_op(AddrExpr::Effective);
    }

    Some(CompiledInstruction::Linear(ig.render(0)))
}

fn compile_indirect_jump(cmos: bool, effect: &SemanticEffect) -> Option<CompiledInstruction> {
    if !matches!(effect.kind, EffectKind::Jump) {
        return None;
    }
    let mut ig = ProgramBuilder::new(cmos);
    // The CMOS core takes an extra cycle and fetches the naturally
    // incremented pointer high byte; the NMOS core wraps within the page
    ig.tick(if cmos { 4 } else { 3 });
    ig.append(Micro::FetchAddrWord);
    ig.read_op(AddrExpr::Effective, ReadDst::PtrLo);
    let next = if cmos { AddrExpr::PointerNextLinear } else { AddrExpr::PointerNextWrapped };
    ig.read_op(next, ReadDst::PtrHi);
    ig.append(Micro::AssemblePointer);
    ig.append(Micro::Jump);
    Some(CompiledInstruction::Linear(ig.render(0)))
}

fn compile_indexed_indirect_jump(
    cmos: bool,
    effect: &SemanticEffect,
) -> Option<CompiledInstruction> {
    if !matches!(effect.kind, EffectKind::Jump) {
        return None;
    }
    let mut ig = ProgramBuilder::new(cmos);
    ig.tick(4);
    ig.append(Micro::FetchAddrWordIndexed(Index::X));
    ig.read_op(AddrExpr::Effective, ReadDst::PtrLo);
    ig.read_op(AddrExpr::PointerNextLinear, ReadDst::PtrHi);
    ig.append(Micro::AssemblePointer);
    ig.append(Micro::Jump);
    Some(CompiledInstruction::Linear(ig.render(0)))
}

fn brk_program(cmos: bool) -> CompiledInstruction {
    let mut ig = ProgramBuilder::new(cmos);
    ig.tick(2);
    ig.append(Micro::FetchDiscard);
    ig.stack_push_op(PushSrc::PcHi);
    ig.stack_push_op(PushSrc::PcLo);
    ig.stack_push_op(PushSrc::StatusBrk);
    ig.append(Micro::SelectVector);
    ig.append(Micro::EnterInterrupt);
    ig.read_op(AddrExpr::Effective, ReadDst::PtrLo);
    ig.read_op(AddrExpr::PointerNextLinear, ReadDst::PtrHi);
    ig.append(Micro::AssemblePointer);
    ig.append(Micro::Jump);
    CompiledInstruction::Linear(ig.render(0))
}

/// The hardware interrupt entry sequence: like BRK, but nothing is fetched
/// (the PC read is spurious) and the status byte is pushed with B clear.
pub(crate) fn interrupt_service_program(variant: Variant) -> CompiledInstruction {
    let mut ig = ProgramBuilder::new(variant == Variant::Cmos65C12);
    ig.tick(2);
    ig.append(Micro::ReadPcSpurious);
    ig.stack_push_op(PushSrc::PcHi);
    ig.stack_push_op(PushSrc::PcLo);
    ig.stack_push_op(PushSrc::StatusIrq);
    ig.append(Micro::SelectVector);
    ig.append(Micro::EnterInterrupt);
    ig.read_op(AddrExpr::Effective, ReadDst::PtrLo);
    ig.read_op(AddrExpr::PointerNextLinear, ReadDst::PtrHi);
    ig.append(Micro::AssemblePointer);
    ig.append(Micro::Jump);
    CompiledInstruction::Linear(ig.render(0))
}

/// CMOS reserved opcodes decode to NOPs of documented byte/cycle lengths.
/// None of them sample the interrupt lines.
fn reserved_nop_program(opcode: u8) -> CompiledInstruction {
    use Micro::{FetchAddrWord, FetchDiscard};
    use Step::{Compute, Poll, PollAddr};

    let steps = match opcode {
        // Two bytes, two cycles
        0x02 | 0x22 | 0x42 | 0x62 | 0x82 | 0xC2 | 0xE2 => {
            vec![Compute(FetchDiscard), Poll(2)]
        }
        // Two bytes, three cycles
        0x44 => vec![Compute(FetchDiscard), Poll(3)],
        // Two bytes, four cycles
        0x54 | 0xD4 | 0xF4 => vec![Compute(FetchDiscard), Poll(4)],
        // Three bytes, eight cycles
        0x5C => vec![Compute(FetchAddrWord), Poll(8)],
        // Three bytes, four cycles, with a visible access at the operand
        0xDC | 0xFC => vec![Compute(FetchAddrWord), PollAddr(4, AddrExpr::Effective)],
        // One byte, one cycle
        _ => vec![Poll(1)],
    };
    CompiledInstruction::Linear(steps)
}

/// The complete compiled instruction set for one processor variant, plus the
/// hardware interrupt service sequence. Built once, immutable afterwards.
#[derive(Debug)]
pub(crate) struct InstructionSet {
    programs: Box<[Option<CompiledInstruction>]>,
    service: CompiledInstruction,
}

impl InstructionSet {
    pub(crate) fn build(variant: Variant) -> Result<Self, ConfigurationError> {
        let mut programs = Vec::with_capacity(256);
        for opcode in 0..=u8::MAX {
            programs.push(compile(variant, opcode)?);
        }
        Ok(Self {
            programs: programs.into_boxed_slice(),
            service: interrupt_service_program(variant),
        })
    }

    pub(crate) fn program(&self, opcode: u8) -> Option<&CompiledInstruction> {
        self.programs[usize::from(opcode)].as_ref()
    }

    pub(crate) fn service(&self) -> &CompiledInstruction {
        &self.service
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polled_cycles(steps: &[Step]) -> u32 {
        steps
            .iter()
            .map(|step| match step {
                Step::Poll(n) | Step::PollAddr(n, _) => *n,
                _ => 0,
            })
            .sum()
    }

    fn cycle_counts(variant: Variant, opcode: u8) -> (u32, u32) {
        match compile(variant, opcode).unwrap().unwrap() {
            CompiledInstruction::Linear(steps) => {
                let cycles = polled_cycles(&steps);
                (cycles, cycles)
            }
            CompiledInstruction::Split { preamble, if_crossed, if_not_crossed } => {
                let base = polled_cycles(&preamble);
                (base + polled_cycles(&if_not_crossed), base + polled_cycles(&if_crossed))
            }
            CompiledInstruction::Branch(_) => panic!("branch programs have no fixed cycle count"),
        }
    }

    #[test]
    fn documented_nmos_cycle_counts() {
        // (opcode, base cycles, cycles with page crossing)
        let expected = [
            (0xA9, 2, 2), // LDA #imm
            (0xA5, 3, 3), // LDA zp
            (0xB5, 4, 4), // LDA zp,X
            (0xAD, 4, 4), // LDA abs
            (0xBD, 4, 5), // LDA abs,X
            (0xB9, 4, 5), // LDA abs,Y
            (0xA1, 6, 6), // LDA (zp,X)
            (0xB1, 5, 6), // LDA (zp),Y
            (0x85, 3, 3), // STA zp
            (0x8D, 4, 4), // STA abs
            (0x9D, 5, 5), // STA abs,X
            (0x99, 5, 5), // STA abs,Y
            (0x91, 6, 6), // STA (zp),Y
            (0xE6, 5, 5), // INC zp
            (0xF6, 6, 6), // INC zp,X
            (0xEE, 6, 6), // INC abs
            (0xFE, 7, 7), // INC abs,X
            (0x4C, 3, 3), // JMP abs
            (0x6C, 5, 5), // JMP (abs)
            (0x20, 6, 6), // JSR
            (0x60, 6, 6), // RTS
            (0x40, 6, 6), // RTI
            (0x48, 3, 3), // PHA
            (0x68, 4, 4), // PLA
            (0x00, 7, 7), // BRK
            (0xEA, 2, 2), // NOP
            (0x0A, 2, 2), // ASL A
            (0x1E, 7, 7), // ASL abs,X
            (0x1F, 7, 7), // SLO abs,X
            (0x13, 8, 8), // SLO (zp),Y
            (0x03, 8, 8), // SLO (zp,X)
        ];
        for (opcode, base, crossed) in expected {
            assert_eq!(
                cycle_counts(Variant::Nmos6502, opcode),
                (base, crossed),
                "opcode {opcode:02X}"
            );
        }
    }

    #[test]
    fn documented_cmos_cycle_counts() {
        let expected = [
            (0xBD, 4, 5), // LDA abs,X
            (0x9D, 5, 5), // STA abs,X
            (0xFE, 7, 7), // INC abs,X
            (0x7E, 6, 7), // ROR abs,X
            (0x6C, 6, 6), // JMP (abs) takes the extra CMOS cycle
            (0x7C, 6, 6), // JMP (abs,X)
            (0xB2, 5, 5), // LDA (zp)
            (0x92, 5, 5), // STA (zp)
            (0x04, 5, 5), // TSB zp
            (0x0C, 6, 6), // TSB abs
            (0x5A, 3, 3), // PHY
            (0x7A, 4, 4), // PLY
            (0x1A, 2, 2), // INC A
        ];
        for (opcode, base, crossed) in expected {
            assert_eq!(
                cycle_counts(Variant::Cmos65C12, opcode),
                (base, crossed),
                "opcode {opcode:02X}"
            );
        }
    }

    #[test]
    fn cmos_reserved_opcodes_compile_to_fixed_nops() {
        let lengths = [
            (0x02_u8, 2_u32),
            (0x22, 2),
            (0x44, 3),
            (0x54, 4),
            (0x5C, 8),
            (0xDC, 4),
            (0xFC, 4),
            (0x03, 1),
            (0xFB, 1),
        ];
        for (opcode, cycles) in lengths {
            let Some(CompiledInstruction::Linear(steps)) =
                compile(Variant::Cmos65C12, opcode).unwrap()
            else {
                panic!("reserved opcode {opcode:02X} should compile to a linear program");
            };
            assert_eq!(polled_cycles(&steps), cycles, "opcode {opcode:02X}");
            assert!(
                !steps.contains(&Step::CheckInterrupt),
                "reserved NOPs don't sample interrupts"
            );
        }
    }

    #[test]
    fn nmos_halt_opcodes_have_no_program() {
        for opcode in [0x02, 0x12, 0x92, 0xF2] {
            assert!(compile(Variant::Nmos6502, opcode).unwrap().is_none());
        }
    }

    #[test]
    fn nmos_indexed_load_reads_uncarried_address_only_when_crossed() {
        let Some(CompiledInstruction::Split { if_crossed, if_not_crossed, .. }) =
            compile(Variant::Nmos6502, 0xBD).unwrap()
        else {
            panic!("LDA abs,X should compile to a split program");
        };

        assert!(if_crossed
            .iter()
            .any(|s| *s == Step::Read { addr: AddrExpr::NonCarry, dst: ReadDst::Discard }));
        assert!(!if_not_crossed
            .iter()
            .any(|s| matches!(s, Step::Read { addr: AddrExpr::NonCarry, .. })));
        // Both continuations read the true address
        for steps in [&if_crossed, &if_not_crossed] {
            assert!(steps
                .iter()
                .any(|s| *s == Step::Read { addr: AddrExpr::WithCarry, dst: ReadDst::Operand }));
        }
    }

    #[test]
    fn cmos_indexed_load_burns_idle_cycle_instead_of_spurious_read() {
        let Some(CompiledInstruction::Split { if_crossed, .. }) =
            compile(Variant::Cmos65C12, 0xBD).unwrap()
        else {
            panic!("LDA abs,X should compile to a split program");
        };
        assert!(!if_crossed.iter().any(|s| matches!(s, Step::Read { addr: AddrExpr::NonCarry, .. })));
    }

    #[test]
    fn nmos_store_always_reads_uncarried_address() {
        let Some(CompiledInstruction::Split { if_crossed, if_not_crossed, .. }) =
            compile(Variant::Nmos6502, 0x9D).unwrap()
        else {
            panic!("STA abs,X should compile to a split program");
        };
        for steps in [&if_crossed, &if_not_crossed] {
            assert!(steps
                .iter()
                .any(|s| *s == Step::Read { addr: AddrExpr::NonCarry, dst: ReadDst::Discard }));
            assert!(steps.iter().any(|s| *s == Step::Write { addr: AddrExpr::WithCarry }));
        }
    }

    #[test]
    fn nmos_rmw_pays_spurious_write_and_cmos_pays_spurious_read() {
        let Some(CompiledInstruction::Split { if_crossed, .. }) =
            compile(Variant::Nmos6502, 0xFE).unwrap()
        else {
            panic!("INC abs,X should compile to a split program");
        };
        // Spurious write of the unmodified value, then the real write
        let writes =
            if_crossed.iter().filter(|s| matches!(s, Step::Write { .. })).count();
        assert_eq!(writes, 2);

        let Some(CompiledInstruction::Split { if_not_crossed, .. }) =
            compile(Variant::Cmos65C12, 0xFE).unwrap()
        else {
            panic!("INC abs,X should compile to a split program");
        };
        assert!(if_not_crossed
            .iter()
            .any(|s| *s == Step::Read { addr: AddrExpr::NonCarry, dst: ReadDst::Operand }));
    }

    #[test]
    fn zp_quirk_stores_collapse_carried_writes() {
        let Some(CompiledInstruction::Split { if_crossed, .. }) =
            compile(Variant::Nmos6502, 0x9E).unwrap()
        else {
            panic!("SHX abs,Y should compile to a split program");
        };
        assert!(if_crossed.contains(&Step::Compute(Micro::CollapseCarried)));

        let Some(CompiledInstruction::Split { if_crossed, .. }) =
            compile(Variant::Nmos6502, 0x9D).unwrap()
        else {
            panic!("STA abs,X should compile to a split program");
        };
        assert!(!if_crossed.contains(&Step::Compute(Micro::CollapseCarried)));
    }

    #[test]
    fn indirect_jump_pointer_wraps_only_on_nmos() {
        let Some(CompiledInstruction::Linear(steps)) = compile(Variant::Nmos6502, 0x6C).unwrap()
        else {
            panic!("JMP (abs) should be linear");
        };
        assert!(steps
            .iter()
            .any(|s| *s == Step::Read { addr: AddrExpr::PointerNextWrapped, dst: ReadDst::PtrHi }));

        let Some(CompiledInstruction::Linear(steps)) = compile(Variant::Cmos65C12, 0x6C).unwrap()
        else {
            panic!("JMP (abs) should be linear");
        };
        assert!(steps
            .iter()
            .any(|s| *s == Step::Read { addr: AddrExpr::PointerNextLinear, dst: ReadDst::PtrHi }));
    }

    #[test]
    fn every_program_samples_interrupts_once_before_retiring() {
        for variant in [Variant::Nmos6502, Variant::Cmos65C12] {
            for opcode in 0..=u8::MAX {
                let Some(program) = compile(variant, opcode).unwrap() else {
                    continue;
                };
                match program {
                    CompiledInstruction::Linear(steps) => {
                        let samples =
                            steps.iter().filter(|s| **s == Step::CheckInterrupt).count();
                        // CMOS reserved NOPs never sample
                        if semantics::decode(variant, opcode).is_some() {
                            assert_eq!(samples, 1, "{variant:?} {opcode:02X}");
                        } else {
                            assert_eq!(samples, 0, "{variant:?} {opcode:02X}");
                        }
                    }
                    CompiledInstruction::Split { preamble, if_crossed, if_not_crossed } => {
                        assert!(!preamble.contains(&Step::CheckInterrupt));
                        for arm in [&if_crossed, &if_not_crossed] {
                            assert_eq!(
                                arm.iter().filter(|s| **s == Step::CheckInterrupt).count(),
                                1,
                                "{variant:?} {opcode:02X}"
                            );
                        }
                    }
                    CompiledInstruction::Branch(_) => {}
                }
            }
        }
    }

    #[test]
    fn split_arms_consume_equal_cycles_for_stores_and_rmw() {
        // Stores and RMW instructions pay the penalty on both paths
        for (variant, opcode) in [
            (Variant::Nmos6502, 0x9D),
            (Variant::Nmos6502, 0xFE),
            (Variant::Cmos65C12, 0x9D),
            (Variant::Cmos65C12, 0xFE),
        ] {
            let (base, crossed) = cycle_counts(variant, opcode);
            assert_eq!(base, crossed, "{variant:?} {opcode:02X}");
        }
    }

    #[test]
    fn service_program_takes_seven_cycles() {
        for variant in [Variant::Nmos6502, Variant::Cmos65C12] {
            let CompiledInstruction::Linear(steps) = interrupt_service_program(variant) else {
                panic!("service program should be linear");
            };
            assert_eq!(polled_cycles(&steps), 7);
            assert!(steps.contains(&Step::Push(PushSrc::StatusIrq)));
        }
    }

    #[test]
    fn instruction_sets_build_for_both_variants() {
        for variant in [Variant::Nmos6502, Variant::Cmos65C12] {
            let set = InstructionSet::build(variant).unwrap();
            assert!(set.program(0xA9).is_some());
        }
    }
}
