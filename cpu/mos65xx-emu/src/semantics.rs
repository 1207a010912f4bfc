//! Opcode decode tables and the mnemonic semantics table.
//!
//! `decode` maps a byte value to (mnemonic, addressing mode) for one
//! processor variant; `lookup` maps (mnemonic, addressing mode) to the
//! register/flag transformation it performs, independent of timing. The
//! instruction compiler combines the two.

use crate::alu;
use crate::compiler::{ExecContext, PullDst, PushSrc};
use crate::{CpuRegisters, Variant};
use emu65_common::num::GetBit;
use std::fmt;

/// Magic constant ORed into the accumulator by the unstable LAX immediate
/// opcode. The value is borrowed from another machine's documented behavior;
/// what the real target hardware does is unverified.
const LAX_MAGIC: u8 = 0xFF;

/// Magic constant for LXA and ANE, same caveat as [`LAX_MAGIC`].
const LXA_MAGIC: u8 = 0xEE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Adc,
    Anc,
    And,
    Ane,
    Arr,
    Asl,
    Asr,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Bra,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dcp,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Isb,
    Jmp,
    Jsr,
    Las,
    Lax,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Lxa,
    Nop,
    Ora,
    Pha,
    Php,
    Phx,
    Phy,
    Pla,
    Plp,
    Plx,
    Ply,
    Rla,
    Rol,
    Ror,
    Rra,
    Rti,
    Rts,
    Sax,
    Sbc,
    Sbx,
    Sec,
    Sed,
    Sei,
    Sha,
    Shs,
    Shx,
    Shy,
    Slo,
    Sre,
    Sta,
    Stx,
    Sty,
    Stz,
    Tax,
    Tay,
    Trb,
    Tsb,
    Tsx,
    Txa,
    Txs,
    Tya,
}

impl Mnemonic {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Adc => "ADC",
            Self::Anc => "ANC",
            Self::And => "AND",
            Self::Ane => "ANE",
            Self::Arr => "ARR",
            Self::Asl => "ASL",
            Self::Asr => "ASR",
            Self::Bcc => "BCC",
            Self::Bcs => "BCS",
            Self::Beq => "BEQ",
            Self::Bit => "BIT",
            Self::Bmi => "BMI",
            Self::Bne => "BNE",
            Self::Bpl => "BPL",
            Self::Bra => "BRA",
            Self::Brk => "BRK",
            Self::Bvc => "BVC",
            Self::Bvs => "BVS",
            Self::Clc => "CLC",
            Self::Cld => "CLD",
            Self::Cli => "CLI",
            Self::Clv => "CLV",
            Self::Cmp => "CMP",
            Self::Cpx => "CPX",
            Self::Cpy => "CPY",
            Self::Dcp => "DCP",
            Self::Dec => "DEC",
            Self::Dex => "DEX",
            Self::Dey => "DEY",
            Self::Eor => "EOR",
            Self::Inc => "INC",
            Self::Inx => "INX",
            Self::Iny => "INY",
            Self::Isb => "ISB",
            Self::Jmp => "JMP",
            Self::Jsr => "JSR",
            Self::Las => "LAS",
            Self::Lax => "LAX",
            Self::Lda => "LDA",
            Self::Ldx => "LDX",
            Self::Ldy => "LDY",
            Self::Lsr => "LSR",
            Self::Lxa => "LXA",
            Self::Nop => "NOP",
            Self::Ora => "ORA",
            Self::Pha => "PHA",
            Self::Php => "PHP",
            Self::Phx => "PHX",
            Self::Phy => "PHY",
            Self::Pla => "PLA",
            Self::Plp => "PLP",
            Self::Plx => "PLX",
            Self::Ply => "PLY",
            Self::Rla => "RLA",
            Self::Rol => "ROL",
            Self::Ror => "ROR",
            Self::Rra => "RRA",
            Self::Rti => "RTI",
            Self::Rts => "RTS",
            Self::Sax => "SAX",
            Self::Sbc => "SBC",
            Self::Sbx => "SBX",
            Self::Sec => "SEC",
            Self::Sed => "SED",
            Self::Sei => "SEI",
            Self::Sha => "SHA",
            Self::Shs => "SHS",
            Self::Shx => "SHX",
            Self::Shy => "SHY",
            Self::Slo => "SLO",
            Self::Sre => "SRE",
            Self::Sta => "STA",
            Self::Stx => "STX",
            Self::Sty => "STY",
            Self::Stz => "STZ",
            Self::Tax => "TAX",
            Self::Tay => "TAY",
            Self::Trb => "TRB",
            Self::Tsb => "TSB",
            Self::Tsx => "TSX",
            Self::Txa => "TXA",
            Self::Txs => "TXS",
            Self::Tya => "TYA",
        }
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    Implied,
    Accumulator,
    Immediate,
    Relative,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    /// `(zp,X)`
    IndexedIndirect,
    /// `(zp),Y`
    IndirectIndexed,
    /// `(zp)` — CMOS only
    ZeroPageIndirect,
    /// `(abs)`
    Indirect,
    /// `(abs,X)` — CMOS only
    AbsoluteIndexedIndirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BranchCond {
    CarryClear,
    CarrySet,
    NotZero,
    Zero,
    NotNegative,
    Negative,
    OverflowClear,
    OverflowSet,
    Always,
}

pub(crate) type ApplyFn = fn(&mut CpuRegisters, &mut ExecContext);

/// What a mnemonic does, separated from how its addressing mode times it.
#[derive(Debug, Clone, Copy)]
pub(crate) enum EffectKind {
    /// Pure register/flag transform over the operand slot.
    Apply(ApplyFn),
    Push(PushSrc),
    Pull(PullDst),
    /// JMP: load PC from the resolved address.
    Jump,
    /// JSR: push return-address-minus-one, then jump.
    JumpSub,
    /// RTS
    Return,
    /// RTI
    ReturnInterrupt,
    /// BRK
    Break,
    Branch(BranchCond),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SemanticEffect {
    pub kind: EffectKind,
    /// The addressing mode must read the operand before the effect runs.
    pub reads_operand: bool,
    /// The addressing mode must write the operand back afterwards.
    pub writes_operand: bool,
    /// Shift/rotate read-modify-write; selects the CMOS re-read workaround.
    pub is_rotate: bool,
    /// Extra cycles for implied forms beyond the minimum two.
    pub extra_cycles: u32,
    /// Undocumented store whose carried write collapses into zero page.
    pub zp_quirk: bool,
}

impl SemanticEffect {
    fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            reads_operand: false,
            writes_operand: false,
            is_rotate: false,
            extra_cycles: 0,
            zp_quirk: false,
        }
    }

    fn implied(f: ApplyFn) -> Self {
        Self::new(EffectKind::Apply(f))
    }

    fn read(f: ApplyFn) -> Self {
        Self { reads_operand: true, ..Self::new(EffectKind::Apply(f)) }
    }

    fn write(f: ApplyFn) -> Self {
        Self { writes_operand: true, ..Self::new(EffectKind::Apply(f)) }
    }

    fn modify(f: ApplyFn) -> Self {
        Self { reads_operand: true, writes_operand: true, ..Self::new(EffectKind::Apply(f)) }
    }

    fn rotate(f: ApplyFn) -> Self {
        Self { is_rotate: true, ..Self::modify(f) }
    }

    fn extra(self, extra_cycles: u32) -> Self {
        Self { extra_cycles, ..self }
    }

    fn quirk(self) -> Self {
        Self { zp_quirk: true, ..self }
    }
}

/// Decode one opcode byte for the given variant. `None` means the byte has no
/// instruction: a halting opcode on NMOS, a reserved fixed-length NOP on CMOS
/// (the compiler builds those directly).
pub(crate) fn decode(variant: Variant, opcode: u8) -> Option<(Mnemonic, AddrMode)> {
    match variant {
        Variant::Nmos6502 => decode_nmos(opcode),
        Variant::Cmos65C12 => decode_cmos(opcode),
    }
}

fn decode_nmos(opcode: u8) -> Option<(Mnemonic, AddrMode)> {
    use AddrMode::*;
    use Mnemonic::*;

    match opcode {
        0x00 => Some((Brk, Implied)),
        0x01 => Some((Ora, IndexedIndirect)),
        0x03 => Some((Slo, IndexedIndirect)),
        0x04 | 0x44 | 0x64 => Some((Nop, ZeroPage)),
        0x05 => Some((Ora, ZeroPage)),
        0x06 => Some((Asl, ZeroPage)),
        0x07 => Some((Slo, ZeroPage)),
        0x08 => Some((Php, Implied)),
        0x09 => Some((Ora, Immediate)),
        0x0A => Some((Asl, Accumulator)),
        0x0B | 0x2B => Some((Anc, Immediate)),
        0x0C => Some((Nop, Absolute)),
        0x0D => Some((Ora, Absolute)),
        0x0E => Some((Asl, Absolute)),
        0x0F => Some((Slo, Absolute)),
        0x10 => Some((Bpl, Relative)),
        0x11 => Some((Ora, IndirectIndexed)),
        0x13 => Some((Slo, IndirectIndexed)),
        0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => Some((Nop, ZeroPageX)),
        0x15 => Some((Ora, ZeroPageX)),
        0x16 => Some((Asl, ZeroPageX)),
        0x17 => Some((Slo, ZeroPageX)),
        0x18 => Some((Clc, Implied)),
        0x19 => Some((Ora, AbsoluteY)),
        0x1A | 0x3A | 0x5A | 0x7A | 0xDA | 0xEA | 0xFA => Some((Nop, Implied)),
        0x1B => Some((Slo, AbsoluteY)),
        0x1C | 0x3C | 0x5C | 0x7C | 0xDC | 0xFC => Some((Nop, AbsoluteX)),
        0x1D => Some((Ora, AbsoluteX)),
        0x1E => Some((Asl, AbsoluteX)),
        0x1F => Some((Slo, AbsoluteX)),
        0x20 => Some((Jsr, Absolute)),
        0x21 => Some((And, IndexedIndirect)),
        0x23 => Some((Rla, IndexedIndirect)),
        0x24 => Some((Bit, ZeroPage)),
        0x25 => Some((And, ZeroPage)),
        0x26 => Some((Rol, ZeroPage)),
        0x27 => Some((Rla, ZeroPage)),
        0x28 => Some((Plp, Implied)),
        0x29 => Some((And, Immediate)),
        0x2A => Some((Rol, Accumulator)),
        0x2C => Some((Bit, Absolute)),
        0x2D => Some((And, Absolute)),
        0x2E => Some((Rol, Absolute)),
        0x2F => Some((Rla, Absolute)),
        0x30 => Some((Bmi, Relative)),
        0x31 => Some((And, IndirectIndexed)),
        0x33 => Some((Rla, IndirectIndexed)),
        0x35 => Some((And, ZeroPageX)),
        0x36 => Some((Rol, ZeroPageX)),
        0x37 => Some((Rla, ZeroPageX)),
        0x38 => Some((Sec, Implied)),
        0x39 => Some((And, AbsoluteY)),
        0x3B => Some((Rla, AbsoluteY)),
        0x3D => Some((And, AbsoluteX)),
        0x3E => Some((Rol, AbsoluteX)),
        0x3F => Some((Rla, AbsoluteX)),
        0x40 => Some((Rti, Implied)),
        0x41 => Some((Eor, IndexedIndirect)),
        0x43 => Some((Sre, IndexedIndirect)),
        0x45 => Some((Eor, ZeroPage)),
        0x46 => Some((Lsr, ZeroPage)),
        0x47 => Some((Sre, ZeroPage)),
        0x48 => Some((Pha, Implied)),
        0x49 => Some((Eor, Immediate)),
        0x4A => Some((Lsr, Accumulator)),
        0x4B => Some((Asr, Immediate)),
        0x4C => Some((Jmp, Absolute)),
        0x4D => Some((Eor, Absolute)),
        0x4E => Some((Lsr, Absolute)),
        0x4F => Some((Sre, Absolute)),
        0x50 => Some((Bvc, Relative)),
        0x51 => Some((Eor, IndirectIndexed)),
        0x53 => Some((Sre, IndirectIndexed)),
        0x55 => Some((Eor, ZeroPageX)),
        0x56 => Some((Lsr, ZeroPageX)),
        0x57 => Some((Sre, ZeroPageX)),
        0x58 => Some((Cli, Implied)),
        0x59 => Some((Eor, AbsoluteY)),
        0x5B => Some((Sre, AbsoluteY)),
        0x5D => Some((Eor, AbsoluteX)),
        0x5E => Some((Lsr, AbsoluteX)),
        0x5F => Some((Sre, AbsoluteX)),
        0x60 => Some((Rts, Implied)),
        0x61 => Some((Adc, IndexedIndirect)),
        0x63 => Some((Rra, IndexedIndirect)),
        0x65 => Some((Adc, ZeroPage)),
        0x66 => Some((Ror, ZeroPage)),
        0x67 => Some((Rra, ZeroPage)),
        0x68 => Some((Pla, Implied)),
        0x69 => Some((Adc, Immediate)),
        0x6A => Some((Ror, Accumulator)),
        0x6B => Some((Arr, Immediate)),
        0x6C => Some((Jmp, Indirect)),
        0x6D => Some((Adc, Absolute)),
        0x6E => Some((Ror, Absolute)),
        0x6F => Some((Rra, Absolute)),
        0x70 => Some((Bvs, Relative)),
        0x71 => Some((Adc, IndirectIndexed)),
        0x73 => Some((Rra, IndirectIndexed)),
        0x75 => Some((Adc, ZeroPageX)),
        0x76 => Some((Ror, ZeroPageX)),
        0x77 => Some((Rra, ZeroPageX)),
        0x78 => Some((Sei, Implied)),
        0x79 => Some((Adc, AbsoluteY)),
        0x7B => Some((Rra, AbsoluteY)),
        0x7D => Some((Adc, AbsoluteX)),
        0x7E => Some((Ror, AbsoluteX)),
        0x7F => Some((Rra, AbsoluteX)),
        0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => Some((Nop, Immediate)),
        0x81 => Some((Sta, IndexedIndirect)),
        0x83 => Some((Sax, IndexedIndirect)),
        0x84 => Some((Sty, ZeroPage)),
        0x85 => Some((Sta, ZeroPage)),
        0x86 => Some((Stx, ZeroPage)),
        0x87 => Some((Sax, ZeroPage)),
        0x88 => Some((Dey, Implied)),
        0x8A => Some((Txa, Implied)),
        0x8B => Some((Ane, Immediate)),
        0x8C => Some((Sty, Absolute)),
        0x8D => Some((Sta, Absolute)),
        0x8E => Some((Stx, Absolute)),
        0x8F => Some((Sax, Absolute)),
        0x90 => Some((Bcc, Relative)),
        0x91 => Some((Sta, IndirectIndexed)),
        0x93 => Some((Sha, IndirectIndexed)),
        0x94 => Some((Sty, ZeroPageX)),
        0x95 => Some((Sta, ZeroPageX)),
        0x96 => Some((Stx, ZeroPageY)),
        0x97 => Some((Sax, ZeroPageY)),
        0x98 => Some((Tya, Implied)),
        0x99 => Some((Sta, AbsoluteY)),
        0x9A => Some((Txs, Implied)),
        0x9B => Some((Shs, AbsoluteY)),
        0x9C => Some((Shy, AbsoluteX)),
        0x9D => Some((Sta, AbsoluteX)),
        0x9E => Some((Shx, AbsoluteY)),
        0x9F => Some((Sha, AbsoluteY)),
        0xA0 => Some((Ldy, Immediate)),
        0xA1 => Some((Lda, IndexedIndirect)),
        0xA2 => Some((Ldx, Immediate)),
        0xA3 => Some((Lax, IndexedIndirect)),
        0xA4 => Some((Ldy, ZeroPage)),
        0xA5 => Some((Lda, ZeroPage)),
        0xA6 => Some((Ldx, ZeroPage)),
        0xA7 => Some((Lax, ZeroPage)),
        0xA8 => Some((Tay, Implied)),
        0xA9 => Some((Lda, Immediate)),
        0xAA => Some((Tax, Implied)),
        0xAB => Some((Lxa, Immediate)),
        0xAC => Some((Ldy, Absolute)),
        0xAD => Some((Lda, Absolute)),
        0xAE => Some((Ldx, Absolute)),
        0xAF => Some((Lax, Absolute)),
        0xB0 => Some((Bcs, Relative)),
        0xB1 => Some((Lda, IndirectIndexed)),
        0xB3 => Some((Lax, IndirectIndexed)),
        0xB4 => Some((Ldy, ZeroPageX)),
        0xB5 => Some((Lda, ZeroPageX)),
        0xB6 => Some((Ldx, ZeroPageY)),
        0xB7 => Some((Lax, ZeroPageY)),
        0xB8 => Some((Clv, Implied)),
        0xB9 => Some((Lda, AbsoluteY)),
        0xBA => Some((Tsx, Implied)),
        0xBB => Some((Las, AbsoluteY)),
        0xBC => Some((Ldy, AbsoluteX)),
        0xBD => Some((Lda, AbsoluteX)),
        0xBE => Some((Ldx, AbsoluteY)),
        0xBF => Some((Lax, AbsoluteY)),
        0xC0 => Some((Cpy, Immediate)),
        0xC1 => Some((Cmp, IndexedIndirect)),
        0xC3 => Some((Dcp, IndexedIndirect)),
        0xC4 => Some((Cpy, ZeroPage)),
        0xC5 => Some((Cmp, ZeroPage)),
        0xC6 => Some((Dec, ZeroPage)),
        0xC7 => Some((Dcp, ZeroPage)),
        0xC8 => Some((Iny, Implied)),
        0xC9 => Some((Cmp, Immediate)),
        0xCA => Some((Dex, Implied)),
        0xCB => Some((Sbx, Immediate)),
        0xCC => Some((Cpy, Absolute)),
        0xCD => Some((Cmp, Absolute)),
        0xCE => Some((Dec, Absolute)),
        0xCF => Some((Dcp, Absolute)),
        0xD0 => Some((Bne, Relative)),
        0xD1 => Some((Cmp, IndirectIndexed)),
        0xD3 => Some((Dcp, IndirectIndexed)),
        0xD5 => Some((Cmp, ZeroPageX)),
        0xD6 => Some((Dec, ZeroPageX)),
        0xD7 => Some((Dcp, ZeroPageX)),
        0xD8 => Some((Cld, Implied)),
        0xD9 => Some((Cmp, AbsoluteY)),
        0xDB => Some((Dcp, AbsoluteY)),
        0xDD => Some((Cmp, AbsoluteX)),
        0xDE => Some((Dec, AbsoluteX)),
        0xDF => Some((Dcp, AbsoluteX)),
        0xE0 => Some((Cpx, Immediate)),
        0xE1 => Some((Sbc, IndexedIndirect)),
        0xE3 => Some((Isb, IndexedIndirect)),
        0xE4 => Some((Cpx, ZeroPage)),
        0xE5 => Some((Sbc, ZeroPage)),
        0xE6 => Some((Inc, ZeroPage)),
        0xE7 => Some((Isb, ZeroPage)),
        0xE8 => Some((Inx, Implied)),
        0xE9 | 0xEB => Some((Sbc, Immediate)),
        0xEC => Some((Cpx, Absolute)),
        0xED => Some((Sbc, Absolute)),
        0xEE => Some((Inc, Absolute)),
        0xEF => Some((Isb, Absolute)),
        0xF0 => Some((Beq, Relative)),
        0xF1 => Some((Sbc, IndirectIndexed)),
        0xF3 => Some((Isb, IndirectIndexed)),
        0xF5 => Some((Sbc, ZeroPageX)),
        0xF6 => Some((Inc, ZeroPageX)),
        0xF7 => Some((Isb, ZeroPageX)),
        0xF8 => Some((Sed, Implied)),
        0xF9 => Some((Sbc, AbsoluteY)),
        0xFB => Some((Isb, AbsoluteY)),
        0xFD => Some((Sbc, AbsoluteX)),
        0xFE => Some((Inc, AbsoluteX)),
        0xFF => Some((Isb, AbsoluteX)),
        // Executing any of these halts the processor until reset
        0x02 | 0x12 | 0x22 | 0x32 | 0x42 | 0x52 | 0x62 | 0x72 | 0x92 | 0xB2 | 0xD2 | 0xF2 => None,
    }
}

fn decode_cmos(opcode: u8) -> Option<(Mnemonic, AddrMode)> {
    use AddrMode::*;
    use Mnemonic::*;

    match opcode {
        0x00 => Some((Brk, Implied)),
        0x01 => Some((Ora, IndexedIndirect)),
        0x04 => Some((Tsb, ZeroPage)),
        0x05 => Some((Ora, ZeroPage)),
        0x06 => Some((Asl, ZeroPage)),
        0x08 => Some((Php, Implied)),
        0x09 => Some((Ora, Immediate)),
        0x0A => Some((Asl, Accumulator)),
        0x0C => Some((Tsb, Absolute)),
        0x0D => Some((Ora, Absolute)),
        0x0E => Some((Asl, Absolute)),
        0x10 => Some((Bpl, Relative)),
        0x11 => Some((Ora, IndirectIndexed)),
        0x12 => Some((Ora, ZeroPageIndirect)),
        0x14 => Some((Trb, ZeroPage)),
        0x15 => Some((Ora, ZeroPageX)),
        0x16 => Some((Asl, ZeroPageX)),
        0x18 => Some((Clc, Implied)),
        0x19 => Some((Ora, AbsoluteY)),
        0x1A => Some((Inc, Accumulator)),
        0x1C => Some((Trb, Absolute)),
        0x1D => Some((Ora, AbsoluteX)),
        0x1E => Some((Asl, AbsoluteX)),
        0x20 => Some((Jsr, Absolute)),
        0x21 => Some((And, IndexedIndirect)),
        0x24 => Some((Bit, ZeroPage)),
        0x25 => Some((And, ZeroPage)),
        0x26 => Some((Rol, ZeroPage)),
        0x28 => Some((Plp, Implied)),
        0x29 => Some((And, Immediate)),
        0x2A => Some((Rol, Accumulator)),
        0x2C => Some((Bit, Absolute)),
        0x2D => Some((And, Absolute)),
        0x2E => Some((Rol, Absolute)),
        0x30 => Some((Bmi, Relative)),
        0x31 => Some((And, IndirectIndexed)),
        0x32 => Some((And, ZeroPageIndirect)),
        0x34 => Some((Bit, ZeroPageX)),
        0x35 => Some((And, ZeroPageX)),
        0x36 => Some((Rol, ZeroPageX)),
        0x38 => Some((Sec, Implied)),
        0x39 => Some((And, AbsoluteY)),
        0x3A => Some((Dec, Accumulator)),
        0x3C => Some((Bit, AbsoluteX)),
        0x3D => Some((And, AbsoluteX)),
        0x3E => Some((Rol, AbsoluteX)),
        0x40 => Some((Rti, Implied)),
        0x41 => Some((Eor, IndexedIndirect)),
        0x45 => Some((Eor, ZeroPage)),
        0x46 => Some((Lsr, ZeroPage)),
        0x48 => Some((Pha, Implied)),
        0x49 => Some((Eor, Immediate)),
        0x4A => Some((Lsr, Accumulator)),
        0x4C => Some((Jmp, Absolute)),
        0x4D => Some((Eor, Absolute)),
        0x4E => Some((Lsr, Absolute)),
        0x50 => Some((Bvc, Relative)),
        0x51 => Some((Eor, IndirectIndexed)),
        0x52 => Some((Eor, ZeroPageIndirect)),
        0x55 => Some((Eor, ZeroPageX)),
        0x56 => Some((Lsr, ZeroPageX)),
        0x58 => Some((Cli, Implied)),
        0x59 => Some((Eor, AbsoluteY)),
        0x5A => Some((Phy, Implied)),
        0x5D => Some((Eor, AbsoluteX)),
        0x5E => Some((Lsr, AbsoluteX)),
        0x60 => Some((Rts, Implied)),
        0x61 => Some((Adc, IndexedIndirect)),
        0x64 => Some((Stz, ZeroPage)),
        0x65 => Some((Adc, ZeroPage)),
        0x66 => Some((Ror, ZeroPage)),
        0x68 => Some((Pla, Implied)),
        0x69 => Some((Adc, Immediate)),
        0x6A => Some((Ror, Accumulator)),
        0x6C => Some((Jmp, Indirect)),
        0x6D => Some((Adc, Absolute)),
        0x6E => Some((Ror, Absolute)),
        0x70 => Some((Bvs, Relative)),
        0x71 => Some((Adc, IndirectIndexed)),
        0x72 => Some((Adc, ZeroPageIndirect)),
        0x74 => Some((Stz, ZeroPageX)),
        0x75 => Some((Adc, ZeroPageX)),
        0x76 => Some((Ror, ZeroPageX)),
        0x78 => Some((Sei, Implied)),
        0x79 => Some((Adc, AbsoluteY)),
        0x7A => Some((Ply, Implied)),
        0x7C => Some((Jmp, AbsoluteIndexedIndirect)),
        0x7D => Some((Adc, AbsoluteX)),
        0x7E => Some((Ror, AbsoluteX)),
        0x80 => Some((Bra, Relative)),
        0x81 => Some((Sta, IndexedIndirect)),
        0x84 => Some((Sty, ZeroPage)),
        0x85 => Some((Sta, ZeroPage)),
        0x86 => Some((Stx, ZeroPage)),
        0x88 => Some((Dey, Implied)),
        0x89 => Some((Bit, Immediate)),
        0x8A => Some((Txa, Implied)),
        0x8C => Some((Sty, Absolute)),
        0x8D => Some((Sta, Absolute)),
        0x8E => Some((Stx, Absolute)),
        0x90 => Some((Bcc, Relative)),
        0x91 => Some((Sta, IndirectIndexed)),
        0x92 => Some((Sta, ZeroPageIndirect)),
        0x94 => Some((Sty, ZeroPageX)),
        0x95 => Some((Sta, ZeroPageX)),
        0x96 => Some((Stx, ZeroPageY)),
        0x98 => Some((Tya, Implied)),
        0x99 => Some((Sta, AbsoluteY)),
        0x9A => Some((Txs, Implied)),
        0x9C => Some((Stz, Absolute)),
        0x9D => Some((Sta, AbsoluteX)),
        0x9E => Some((Stz, AbsoluteX)),
        0xA0 => Some((Ldy, Immediate)),
        0xA1 => Some((Lda, IndexedIndirect)),
        0xA2 => Some((Ldx, Immediate)),
        0xA4 => Some((Ldy, ZeroPage)),
        0xA5 => Some((Lda, ZeroPage)),
        0xA6 => Some((Ldx, ZeroPage)),
        0xA8 => Some((Tay, Implied)),
        0xA9 => Some((Lda, Immediate)),
        0xAA => Some((Tax, Implied)),
        0xAC => Some((Ldy, Absolute)),
        0xAD => Some((Lda, Absolute)),
        0xAE => Some((Ldx, Absolute)),
        0xB0 => Some((Bcs, Relative)),
        0xB1 => Some((Lda, IndirectIndexed)),
        0xB2 => Some((Lda, ZeroPageIndirect)),
        0xB4 => Some((Ldy, ZeroPageX)),
        0xB5 => Some((Lda, ZeroPageX)),
        0xB6 => Some((Ldx, ZeroPageY)),
        0xB8 => Some((Clv, Implied)),
        0xB9 => Some((Lda, AbsoluteY)),
        0xBA => Some((Tsx, Implied)),
        0xBC => Some((Ldy, AbsoluteX)),
        0xBD => Some((Lda, AbsoluteX)),
        0xBE => Some((Ldx, AbsoluteY)),
        0xC0 => Some((Cpy, Immediate)),
        0xC1 => Some((Cmp, IndexedIndirect)),
        0xC4 => Some((Cpy, ZeroPage)),
        0xC5 => Some((Cmp, ZeroPage)),
        0xC6 => Some((Dec, ZeroPage)),
        0xC8 => Some((Iny, Implied)),
        0xC9 => Some((Cmp, Immediate)),
        0xCA => Some((Dex, Implied)),
        0xCC => Some((Cpy, Absolute)),
        0xCD => Some((Cmp, Absolute)),
        0xCE => Some((Dec, Absolute)),
        0xD0 => Some((Bne, Relative)),
        0xD1 => Some((Cmp, IndirectIndexed)),
        0xD2 => Some((Cmp, ZeroPageIndirect)),
        0xD5 => Some((Cmp, ZeroPageX)),
        0xD6 => Some((Dec, ZeroPageX)),
        0xD8 => Some((Cld, Implied)),
        0xD9 => Some((Cmp, AbsoluteY)),
        0xDA => Some((Phx, Implied)),
        0xDD => Some((Cmp, AbsoluteX)),
        0xDE => Some((Dec, AbsoluteX)),
        0xE0 => Some((Cpx, Immediate)),
        0xE1 => Some((Sbc, IndexedIndirect)),
        0xE4 => Some((Cpx, ZeroPage)),
        0xE5 => Some((Sbc, ZeroPage)),
        0xE6 => Some((Inc, ZeroPage)),
        0xE8 => Some((Inx, Implied)),
        0xE9 => Some((Sbc, Immediate)),
        0xEA => Some((Nop, Implied)),
        0xEC => Some((Cpx, Absolute)),
        0xED => Some((Sbc, Absolute)),
        0xEE => Some((Inc, Absolute)),
        0xF0 => Some((Beq, Relative)),
        0xF1 => Some((Sbc, IndirectIndexed)),
        0xF2 => Some((Sbc, ZeroPageIndirect)),
        0xF5 => Some((Sbc, ZeroPageX)),
        0xF6 => Some((Inc, ZeroPageX)),
        0xF8 => Some((Sed, Implied)),
        0xF9 => Some((Sbc, AbsoluteY)),
        0xFA => Some((Plx, Implied)),
        0xFD => Some((Sbc, AbsoluteX)),
        0xFE => Some((Inc, AbsoluteX)),
        _ => None,
    }
}

/// Look up what a mnemonic does. `None` here for a decoded opcode is a
/// configuration error surfaced when the instruction set is compiled.
pub(crate) fn lookup(
    variant: Variant,
    mnemonic: Mnemonic,
    mode: AddrMode,
) -> Option<SemanticEffect> {
    use Mnemonic::*;

    let effect = match mnemonic {
        Nop if mode == AddrMode::Implied => SemanticEffect::implied(nop),
        Nop => SemanticEffect::read(nop),
        Brk => SemanticEffect::new(EffectKind::Break),

        Clc => SemanticEffect::implied(clc),
        Sec => SemanticEffect::implied(sec),
        Cld => SemanticEffect::implied(cld),
        Sed => SemanticEffect::implied(sed),
        Cli => SemanticEffect::implied(cli),
        Sei => SemanticEffect::implied(sei),
        Clv => SemanticEffect::implied(clv),

        Lda => SemanticEffect::read(lda),
        Ldx => SemanticEffect::read(ldx),
        Ldy => SemanticEffect::read(ldy),
        Sta => SemanticEffect::write(sta),
        Stx => SemanticEffect::write(stx),
        Sty => SemanticEffect::write(sty),
        Stz => SemanticEffect::write(stz),

        Inc => SemanticEffect::modify(inc),
        Dec => SemanticEffect::modify(dec),
        Inx => SemanticEffect::implied(inx),
        Iny => SemanticEffect::implied(iny),
        Dex => SemanticEffect::implied(dex),
        Dey => SemanticEffect::implied(dey),

        Adc => match variant {
            Variant::Nmos6502 => SemanticEffect::read(adc_nmos),
            Variant::Cmos65C12 => SemanticEffect::read(adc_cmos),
        },
        Sbc => match variant {
            Variant::Nmos6502 => SemanticEffect::read(sbc_nmos),
            Variant::Cmos65C12 => SemanticEffect::read(sbc_cmos),
        },

        Bit if mode == AddrMode::Immediate => SemanticEffect::read(bit_immediate),
        Bit => SemanticEffect::read(bit),

        Asl => SemanticEffect::rotate(asl),
        Lsr => SemanticEffect::rotate(lsr),
        Rol => SemanticEffect::rotate(rol),
        Ror => SemanticEffect::rotate(ror),

        And => SemanticEffect::read(and),
        Eor => SemanticEffect::read(eor),
        Ora => SemanticEffect::read(ora),
        Cmp => SemanticEffect::read(cmp),
        Cpx => SemanticEffect::read(cpx),
        Cpy => SemanticEffect::read(cpy),

        Txa => SemanticEffect::implied(txa),
        Tax => SemanticEffect::implied(tax),
        Txs => SemanticEffect::implied(txs),
        Tsx => SemanticEffect::implied(tsx),
        Tya => SemanticEffect::implied(tya),
        Tay => SemanticEffect::implied(tay),

        Bcc => SemanticEffect::new(EffectKind::Branch(BranchCond::CarryClear)),
        Bcs => SemanticEffect::new(EffectKind::Branch(BranchCond::CarrySet)),
        Bne => SemanticEffect::new(EffectKind::Branch(BranchCond::NotZero)),
        Beq => SemanticEffect::new(EffectKind::Branch(BranchCond::Zero)),
        Bpl => SemanticEffect::new(EffectKind::Branch(BranchCond::NotNegative)),
        Bmi => SemanticEffect::new(EffectKind::Branch(BranchCond::Negative)),
        Bvc => SemanticEffect::new(EffectKind::Branch(BranchCond::OverflowClear)),
        Bvs => SemanticEffect::new(EffectKind::Branch(BranchCond::OverflowSet)),
        Bra => SemanticEffect::new(EffectKind::Branch(BranchCond::Always)),

        Pha => SemanticEffect::new(EffectKind::Push(PushSrc::A)).extra(2),
        Php => SemanticEffect::new(EffectKind::Push(PushSrc::StatusBrk)).extra(2),
        Phx => SemanticEffect::new(EffectKind::Push(PushSrc::X)).extra(2),
        Phy => SemanticEffect::new(EffectKind::Push(PushSrc::Y)).extra(2),
        Pla => SemanticEffect::new(EffectKind::Pull(PullDst::A)).extra(3),
        Plp => SemanticEffect::new(EffectKind::Pull(PullDst::Status)).extra(3),
        Plx => SemanticEffect::new(EffectKind::Pull(PullDst::X)).extra(3),
        Ply => SemanticEffect::new(EffectKind::Pull(PullDst::Y)).extra(3),

        Rts => SemanticEffect::new(EffectKind::Return).extra(5),
        Rti => SemanticEffect::new(EffectKind::ReturnInterrupt).extra(5),
        Jsr => SemanticEffect::new(EffectKind::JumpSub).extra(3),
        Jmp => SemanticEffect::new(EffectKind::Jump),

        Tsb => SemanticEffect::modify(tsb),
        Trb => SemanticEffect::modify(trb),

        Sax => SemanticEffect::write(sax),
        Asr => SemanticEffect::read(asr),
        Slo => SemanticEffect::modify(slo),
        Sre => SemanticEffect::modify(sre),
        Rla => SemanticEffect::modify(rla),
        Rra => SemanticEffect::modify(rra),
        Dcp => SemanticEffect::modify(dcp),
        Isb => SemanticEffect::modify(isb),
        Anc => SemanticEffect::read(anc),
        Ane => SemanticEffect::read(ane),
        Arr => SemanticEffect::read(arr),
        Lax => SemanticEffect::read(lax),
        Lxa => SemanticEffect::read(lxa),
        Sbx => SemanticEffect::read(sbx),
        Las => SemanticEffect::read(las),
        Shx => SemanticEffect::write(shx).quirk(),
        Shy => SemanticEffect::write(shy).quirk(),
        Sha => SemanticEffect::write(sha).quirk(),
        Shs => SemanticEffect::write(shs).quirk(),
    };

    // A store through the immediate form has nowhere to write
    if effect.writes_operand && mode == AddrMode::Immediate {
        return None;
    }

    Some(effect)
}

fn nop(_registers: &mut CpuRegisters, _ctx: &mut ExecContext) {}

fn clc(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.status.carry = false;
}

fn sec(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.status.carry = true;
}

fn cld(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.status.decimal = false;
}

fn sed(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.status.decimal = true;
}

fn cli(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.status.interrupt_disable = false;
}

fn sei(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.status.interrupt_disable = true;
}

fn clv(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.status.overflow = false;
}

fn lda(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    registers.a = alu::set_zn(&mut registers.status, ctx.operand);
}

fn ldx(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    registers.x = alu::set_zn(&mut registers.status, ctx.operand);
}

fn ldy(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    registers.y = alu::set_zn(&mut registers.status, ctx.operand);
}

fn sta(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = registers.a;
}

fn stx(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = registers.x;
}

fn sty(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = registers.y;
}

fn stz(_registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = 0;
}

fn inc(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = alu::set_zn(&mut registers.status, ctx.operand.wrapping_add(1));
}

fn dec(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = alu::set_zn(&mut registers.status, ctx.operand.wrapping_sub(1));
}

fn inx(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.x = alu::set_zn(&mut registers.status, registers.x.wrapping_add(1));
}

fn iny(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.y = alu::set_zn(&mut registers.status, registers.y.wrapping_add(1));
}

fn dex(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.x = alu::set_zn(&mut registers.status, registers.x.wrapping_sub(1));
}

fn dey(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.y = alu::set_zn(&mut registers.status, registers.y.wrapping_sub(1));
}

fn adc_nmos(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.extra_poll += alu::add_with_carry(registers, ctx.operand, false);
}

fn adc_cmos(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.extra_poll += alu::add_with_carry(registers, ctx.operand, true);
}

fn sbc_nmos(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.extra_poll += alu::subtract_with_carry(registers, ctx.operand, false);
}

fn sbc_cmos(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.extra_poll += alu::subtract_with_carry(registers, ctx.operand, true);
}

fn bit(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    registers.status.zero = registers.a & ctx.operand == 0;
    registers.status.overflow = ctx.operand.bit(6);
    registers.status.negative = ctx.operand.bit(7);
}

// BIT #imm leaves V and N untouched
fn bit_immediate(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    registers.status.zero = registers.a & ctx.operand == 0;
}

fn asl(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = alu::shift_left(&mut registers.status, ctx.operand);
}

fn lsr(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = alu::shift_right(&mut registers.status, ctx.operand);
}

fn rol(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = alu::rotate_left(&mut registers.status, ctx.operand);
}

fn ror(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = alu::rotate_right(&mut registers.status, ctx.operand);
}

fn and(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    registers.a = alu::set_zn(&mut registers.status, registers.a & ctx.operand);
}

fn eor(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    registers.a = alu::set_zn(&mut registers.status, registers.a ^ ctx.operand);
}

fn ora(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    registers.a = alu::set_zn(&mut registers.status, registers.a | ctx.operand);
}

fn cmp(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    alu::compare(&mut registers.status, registers.a, ctx.operand);
}

fn cpx(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    alu::compare(&mut registers.status, registers.x, ctx.operand);
}

fn cpy(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    alu::compare(&mut registers.status, registers.y, ctx.operand);
}

fn txa(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.a = alu::set_zn(&mut registers.status, registers.x);
}

fn tax(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.x = alu::set_zn(&mut registers.status, registers.a);
}

// TXS is the one transfer that does not touch the flags
fn txs(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.sp = registers.x;
}

fn tsx(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.x = alu::set_zn(&mut registers.status, registers.sp);
}

fn tya(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.a = alu::set_zn(&mut registers.status, registers.y);
}

fn tay(registers: &mut CpuRegisters, _ctx: &mut ExecContext) {
    registers.y = alu::set_zn(&mut registers.status, registers.a);
}

fn tsb(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    registers.status.zero = ctx.operand & registers.a == 0;
    ctx.operand |= registers.a;
}

fn trb(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    registers.status.zero = ctx.operand & registers.a == 0;
    ctx.operand &= !registers.a;
}

fn sax(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = registers.a & registers.x;
}

fn asr(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    registers.a = alu::shift_right(&mut registers.status, ctx.operand & registers.a);
}

fn slo(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = alu::shift_left(&mut registers.status, ctx.operand);
    registers.a = alu::set_zn(&mut registers.status, registers.a | ctx.operand);
}

fn sre(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = alu::shift_right(&mut registers.status, ctx.operand);
    registers.a = alu::set_zn(&mut registers.status, registers.a ^ ctx.operand);
}

fn rla(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = alu::rotate_left(&mut registers.status, ctx.operand);
    registers.a = alu::set_zn(&mut registers.status, registers.a & ctx.operand);
}

// Rotate-then-add always takes the NMOS decimal flag path
fn rra(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = alu::rotate_right(&mut registers.status, ctx.operand);
    ctx.extra_poll += alu::add_with_carry(registers, ctx.operand, false);
}

fn dcp(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = alu::set_zn(&mut registers.status, ctx.operand.wrapping_sub(1));
    alu::compare(&mut registers.status, registers.a, ctx.operand);
}

fn isb(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = ctx.operand.wrapping_add(1);
    ctx.extra_poll += alu::subtract_with_carry(registers, ctx.operand, false);
}

fn anc(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    registers.a = alu::set_zn(&mut registers.status, registers.a & ctx.operand);
    registers.status.carry = registers.status.negative;
}

fn ane(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    registers.a =
        alu::set_zn(&mut registers.status, (registers.a | LXA_MAGIC) & ctx.operand & registers.x);
}

fn arr(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    // The accumulator ends up as (A & operand) rotated right, but the flags
    // are set as if an ADC had happened in between
    let and_value = registers.a & ctx.operand;
    registers.a = (and_value >> 1) | (u8::from(registers.status.carry) << 7);
    alu::set_zn(&mut registers.status, registers.a);
    registers.status.overflow = registers.a.bit(6) ^ registers.a.bit(5);
    registers.status.carry = registers.a.bit(6);
}

fn lax(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    let value = alu::set_zn(&mut registers.status, (registers.a | LAX_MAGIC) & ctx.operand);
    registers.a = value;
    registers.x = value;
}

fn lxa(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    let value = alu::set_zn(&mut registers.status, (registers.a | LXA_MAGIC) & ctx.operand);
    registers.a = value;
    registers.x = value;
}

fn sbx(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    let ax = registers.a & registers.x;
    registers.status.carry = ax >= ctx.operand;
    registers.x = alu::set_zn(&mut registers.status, ax.wrapping_sub(ctx.operand));
}

fn las(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    let value = alu::set_zn(&mut registers.status, registers.sp & ctx.operand);
    registers.a = value;
    registers.x = value;
    registers.sp = value;
}

fn shx(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = registers.x & ((ctx.addr >> 8) as u8).wrapping_add(1);
}

fn shy(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = registers.y & ((ctx.addr >> 8) as u8).wrapping_add(1);
}

fn sha(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    ctx.operand = registers.a & registers.x & ((ctx.addr >> 8) as u8).wrapping_add(1);
}

fn shs(registers: &mut CpuRegisters, ctx: &mut ExecContext) {
    registers.sp = registers.a & registers.x;
    ctx.operand = registers.a & registers.x & ((ctx.addr >> 8) as u8).wrapping_add(1);
}
