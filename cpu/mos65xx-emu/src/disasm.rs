//! One-instruction disassembly for diagnostics. Shares the decode tables with
//! the compiler but none of the timing logic, and never mutates processor
//! state (all memory access goes through side-effect-free peeks).

use crate::Variant;
use crate::bus::MemoryMap;
use crate::semantics::{self, AddrMode};

/// Decode the instruction at `address` into text. Returns the text, the
/// address of the next instruction, and the target address for control
/// transfers and absolute operands.
pub(crate) fn disassemble(
    variant: Variant,
    memory: &MemoryMap,
    address: u16,
) -> (String, u16, Option<u16>) {
    let opcode = memory.peek(address);
    let Some((mnemonic, mode)) = semantics::decode(variant, opcode) else {
        return ("???".into(), address.wrapping_add(1), None);
    };

    let name = mnemonic.name();
    let operand_byte = memory.peek(address.wrapping_add(1));
    let operand_word = u16::from_le_bytes([operand_byte, memory.peek(address.wrapping_add(2))]);

    match mode {
        AddrMode::Implied => (name.into(), address.wrapping_add(1), None),
        AddrMode::Accumulator => (format!("{name} A"), address.wrapping_add(1), None),
        AddrMode::Immediate => {
            (format!("{name} #${operand_byte:02X}"), address.wrapping_add(2), None)
        }
        AddrMode::Relative => {
            let target = address.wrapping_add(2).wrapping_add_signed((operand_byte as i8).into());
            (format!("{name} ${target:04X}"), address.wrapping_add(2), Some(target))
        }
        AddrMode::ZeroPage => {
            (format!("{name} ${operand_byte:02X}"), address.wrapping_add(2), None)
        }
        AddrMode::ZeroPageX => {
            (format!("{name} ${operand_byte:02X},X"), address.wrapping_add(2), None)
        }
        AddrMode::ZeroPageY => {
            (format!("{name} ${operand_byte:02X},Y"), address.wrapping_add(2), None)
        }
        AddrMode::Absolute => {
            (format!("{name} ${operand_word:04X}"), address.wrapping_add(3), Some(operand_word))
        }
        AddrMode::AbsoluteX => {
            (format!("{name} ${operand_word:04X},X"), address.wrapping_add(3), Some(operand_word))
        }
        AddrMode::AbsoluteY => {
            (format!("{name} ${operand_word:04X},Y"), address.wrapping_add(3), Some(operand_word))
        }
        AddrMode::IndexedIndirect => {
            (format!("{name} (${operand_byte:02X},X)"), address.wrapping_add(2), None)
        }
        AddrMode::IndirectIndexed => {
            (format!("{name} (${operand_byte:02X}),Y"), address.wrapping_add(2), None)
        }
        AddrMode::ZeroPageIndirect => {
            let pointer = u16::from(operand_byte);
            let target = u16::from_le_bytes([
                memory.peek(pointer),
                memory.peek(u16::from(operand_byte.wrapping_add(1))),
            ]);
            (format!("{name} (${operand_byte:02X})"), address.wrapping_add(2), Some(target))
        }
        AddrMode::Indirect => {
            let target = u16::from_le_bytes([
                memory.peek(operand_word),
                memory.peek(operand_word.wrapping_add(1)),
            ]);
            (format!("{name} (${operand_word:04X})"), address.wrapping_add(3), Some(target))
        }
        AddrMode::AbsoluteIndexedIndirect => {
            let target = u16::from_le_bytes([
                memory.peek(operand_word),
                memory.peek(operand_word.wrapping_add(1)),
            ]);
            (format!("{name} (${operand_word:04X},X)"), address.wrapping_add(3), Some(target))
        }
    }
}
