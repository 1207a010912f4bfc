//! The memory map owned by the CPU and the interfaces it exposes to the rest
//! of the machine.
//!
//! Every address in `$0000-$FFFF` resolves through a per-page table into one
//! flat backing store holding RAM, the sideways ROM slots, and the OS ROM.
//! Two page tables exist; which one is live is driven by the bank-select line,
//! re-sampled from the program counter region at each instruction fetch so a
//! shadow RAM overlay can track the executing code. Addresses inside the fixed
//! hardware window (`$FC00-$FEFF`) are not mapped at all and are forwarded to
//! the attached peripherals through [`IoBus`].

use bincode::{Decode, Encode};
use thiserror::Error;

/// Interface the CPU uses to talk to everything that is not flat memory:
/// peripheral registers inside the hardware window, the interrupt lines, and
/// the shared notion of time.
///
/// `poll_time` is invoked on every batch of cycles the CPU consumes, so an
/// external scheduler or peripheral can stay synchronized.
/// `poll_time_at_address` is the same hook for spans that end in a bus access,
/// carrying the address for peripherals that snoop bus traffic.
pub trait IoBus {
    fn hw_read(&mut self, address: u16) -> u8;

    fn hw_write(&mut self, address: u16, value: u8);

    /// Level-sensitive maskable interrupt line state.
    fn irq(&self) -> bool;

    /// Non-maskable interrupt line state. Bypasses the interrupt-disable flag.
    fn nmi(&self) -> bool;

    fn acknowledge_nmi(&mut self);

    fn poll_time(&mut self, cycles: u32);

    fn poll_time_at_address(&mut self, cycles: u32, address: u16) {
        let _ = address;
        self.poll_time(cycles);
    }
}

/// Wired-OR interrupt line state, one bit per peripheral.
///
/// Peripherals assert and deassert their own bit; the CPU only ever observes
/// the OR of the mask at its interrupt sampling point.
#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
pub struct InterruptLines {
    mask: u8,
    nmi: bool,
}

impl InterruptLines {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assert(&mut self, bit: u8) {
        self.mask |= bit;
    }

    pub fn deassert(&mut self, bit: u8) {
        self.mask &= !bit;
    }

    #[must_use]
    pub fn irq(&self) -> bool {
        self.mask != 0
    }

    pub fn assert_nmi(&mut self) {
        self.nmi = true;
    }

    pub fn clear_nmi(&mut self) {
        self.nmi = false;
    }

    #[must_use]
    pub fn nmi(&self) -> bool {
        self.nmi
    }
}

pub const HW_WINDOW_START: u16 = 0xFC00;
pub const HW_WINDOW_END: u16 = 0xFF00;

#[must_use]
pub fn in_hardware_window(address: u16) -> bool {
    (HW_WINDOW_START..HW_WINDOW_END).contains(&address)
}

const RAM_SIZE: usize = 128 * 1024;
const ROM_SLOT_SIZE: usize = 16 * 1024;
const ROM_SLOTS: usize = 16;
const ROM_OFFSET: usize = RAM_SIZE;
const OS_OFFSET: usize = ROM_OFFSET + ROM_SLOTS * ROM_SLOT_SIZE;
const BACKING_SIZE: usize = OS_OFFSET + ROM_SLOT_SIZE;

const SHADOW_OFFSET: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum PageStatus {
    Unmapped,
    Ram,
    ReadOnly,
}

#[derive(Debug, Error)]
#[error("ROM image is {actual} bytes, expected {expected}")]
pub struct RomImageError {
    expected: usize,
    actual: usize,
}

/// Per-page address translation over one flat backing store.
///
/// Offsets are stored pre-biased so that `backing[offset + address]` lands on
/// the right cell without subtracting the page base first; wrapping arithmetic
/// makes the bias safe for regions mapped below their bus address.
#[derive(Debug, Clone, Encode, Decode)]
pub struct MemoryMap {
    backing: Vec<u8>,
    status: [[PageStatus; 256]; 2],
    offsets: [[usize; 256]; 2],
    bank_select: [u8; 16],
    active: usize,
    romsel: u8,
}

impl MemoryMap {
    #[must_use]
    pub fn new() -> Self {
        let mut map = Self {
            backing: vec![0; BACKING_SIZE],
            status: [[PageStatus::Unmapped; 256]; 2],
            offsets: [[0; 256]; 2],
            bank_select: [0; 16],
            active: 0,
            romsel: 0,
        };
        map.reset_banking();
        map
    }

    /// Restore the power-on bank configuration: main RAM below `$8000` with
    /// the shadow overlay on the second map from `$3000`, the selected
    /// sideways ROM slot at `$8000-$BFFF`, the OS ROM above `$C000`, and the
    /// hardware window pages unmapped.
    pub fn reset_banking(&mut self) {
        self.bank_select = [0; 16];
        self.active = 0;

        for page in 0x00..0x80 {
            for map in 0..2 {
                self.status[map][page] = PageStatus::Ram;
                self.offsets[map][page] = 0;
            }
        }
        for page in 0x30..0x80 {
            self.offsets[1][page] = SHADOW_OFFSET;
        }

        for page in 0xC0..0x100 {
            for map in 0..2 {
                self.status[map][page] = PageStatus::ReadOnly;
                self.offsets[map][page] = OS_OFFSET.wrapping_sub(0xC000);
            }
        }

        for page in 0xFC..0xFF {
            for map in 0..2 {
                self.status[map][page] = PageStatus::Unmapped;
            }
        }

        self.select_rom_bank(self.romsel);
    }

    /// Map one of the 16 sideways ROM slots into `$8000-$BFFF`.
    pub fn select_rom_bank(&mut self, bank: u8) {
        self.romsel = bank & 0x0F;
        let offset =
            (ROM_OFFSET + usize::from(self.romsel) * ROM_SLOT_SIZE).wrapping_sub(0x8000);
        for page in 0x80..0xC0 {
            for map in 0..2 {
                self.status[map][page] = PageStatus::ReadOnly;
                self.offsets[map][page] = offset;
            }
        }
    }

    #[must_use]
    pub fn rom_bank(&self) -> u8 {
        self.romsel
    }

    /// Route a 4 KiB program-counter region to the given page table. The live
    /// table is re-sampled from the PC at each instruction fetch.
    pub fn set_region_bank(&mut self, region: usize, bank: u8) {
        self.bank_select[region & 0xF] = bank & 1;
    }

    pub(crate) fn select_bank_for_pc(&mut self, pc: u16) {
        self.active = usize::from(self.bank_select[usize::from(pc >> 12)]);
    }

    /// Flatten the entire address space into writable RAM, hardware window
    /// included. Used by processor-level test harnesses that need arbitrary
    /// addresses to behave as memory.
    pub fn map_flat_ram(&mut self) {
        for page in 0..256 {
            for map in 0..2 {
                self.status[map][page] = PageStatus::Ram;
                self.offsets[map][page] = 0;
            }
        }
        self.bank_select = [0; 16];
        self.active = 0;
    }

    /// `None` means the page is unmapped and the access belongs to the
    /// hardware window (or floats, if outside it).
    #[must_use]
    pub fn read(&self, address: u16) -> Option<u8> {
        let page = usize::from(address >> 8);
        match self.status[self.active][page] {
            PageStatus::Unmapped => None,
            PageStatus::Ram | PageStatus::ReadOnly => {
                let offset = self.offsets[self.active][page];
                Some(self.backing[offset.wrapping_add(usize::from(address))])
            }
        }
    }

    /// Returns false if the address did not accept the write (ROM or
    /// unmapped); the caller decides whether it belongs to the hardware
    /// window.
    pub fn write(&mut self, address: u16, value: u8) -> bool {
        let page = usize::from(address >> 8);
        if self.status[self.active][page] != PageStatus::Ram {
            return false;
        }
        let offset = self.offsets[self.active][page];
        self.backing[offset.wrapping_add(usize::from(address))] = value;
        true
    }

    /// Zero page and the stack are always main RAM on both maps, so those
    /// accesses skip the page lookup and can never touch hardware.
    #[must_use]
    pub fn read_zp_stack(&self, address: u16) -> u8 {
        debug_assert!(address < 0x200);
        self.backing[usize::from(address)]
    }

    pub fn write_zp_stack(&mut self, address: u16, value: u8) {
        debug_assert!(address < 0x200);
        self.backing[usize::from(address)] = value;
    }

    /// Side-effect-free read for diagnostics; unmapped addresses read as the
    /// floating-bus value.
    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        self.read(address).unwrap_or(0xFF)
    }

    pub fn load_os_rom(&mut self, data: &[u8]) -> Result<(), RomImageError> {
        if data.len() != ROM_SLOT_SIZE {
            return Err(RomImageError { expected: ROM_SLOT_SIZE, actual: data.len() });
        }
        self.backing[OS_OFFSET..OS_OFFSET + ROM_SLOT_SIZE].copy_from_slice(data);
        Ok(())
    }

    pub fn load_sideways_rom(&mut self, slot: u8, data: &[u8]) -> Result<(), RomImageError> {
        if data.len() != ROM_SLOT_SIZE {
            return Err(RomImageError { expected: ROM_SLOT_SIZE, actual: data.len() });
        }
        let offset = ROM_OFFSET + usize::from(slot & 0x0F) * ROM_SLOT_SIZE;
        self.backing[offset..offset + ROM_SLOT_SIZE].copy_from_slice(data);
        Ok(())
    }
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os_rom_with_vector(vector: u16) -> Vec<u8> {
        let mut rom = vec![0; ROM_SLOT_SIZE];
        rom[0x3FFC] = vector as u8;
        rom[0x3FFD] = (vector >> 8) as u8;
        rom
    }

    #[test]
    fn ram_read_write() {
        let mut map = MemoryMap::new();
        assert!(map.write(0x1234, 0xAB));
        assert_eq!(map.read(0x1234), Some(0xAB));
    }

    #[test]
    fn rom_rejects_writes() {
        let mut map = MemoryMap::new();
        map.load_os_rom(&os_rom_with_vector(0xC000)).unwrap();
        assert!(!map.write(0xFFFC, 0x00));
        assert_eq!(map.read(0xFFFC), Some(0x00));
    }

    #[test]
    fn os_rom_visible_at_top_of_memory() {
        let mut map = MemoryMap::new();
        map.load_os_rom(&os_rom_with_vector(0xD9CD)).unwrap();
        assert_eq!(map.read(0xFFFC), Some(0xCD));
        assert_eq!(map.read(0xFFFD), Some(0xD9));
    }

    #[test]
    fn hardware_window_pages_are_unmapped() {
        let map = MemoryMap::new();
        assert_eq!(map.read(0xFC00), None);
        assert_eq!(map.read(0xFE4D), None);
        assert!(in_hardware_window(0xFE4D));
        assert!(!in_hardware_window(0xFF00));
        // Page $FF is the OS ROM, not hardware
        assert!(map.read(0xFF00).is_some());
    }

    #[test]
    fn sideways_rom_banking() {
        let mut map = MemoryMap::new();
        let mut rom_a = vec![0; ROM_SLOT_SIZE];
        rom_a[0] = 0x11;
        let mut rom_b = vec![0; ROM_SLOT_SIZE];
        rom_b[0] = 0x22;
        map.load_sideways_rom(0, &rom_a).unwrap();
        map.load_sideways_rom(5, &rom_b).unwrap();

        map.select_rom_bank(0);
        assert_eq!(map.read(0x8000), Some(0x11));
        map.select_rom_bank(5);
        assert_eq!(map.read(0x8000), Some(0x22));
    }

    #[test]
    fn shadow_bank_overlays_ram() {
        let mut map = MemoryMap::new();
        map.write(0x3000, 0x55);

        map.set_region_bank(0x3, 1);
        map.select_bank_for_pc(0x3000);
        // Shadow map sees a different physical cell
        assert_eq!(map.read(0x3000), Some(0x00));
        map.write(0x3000, 0x66);

        map.select_bank_for_pc(0x0000);
        assert_eq!(map.read(0x3000), Some(0x55));
    }

    #[test]
    fn zp_stack_fast_path() {
        let mut map = MemoryMap::new();
        map.write_zp_stack(0x00FE, 0x42);
        map.write_zp_stack(0x01FF, 0x24);
        assert_eq!(map.read(0x00FE), Some(0x42));
        assert_eq!(map.read_zp_stack(0x01FF), 0x24);
    }

    #[test]
    fn rom_image_size_is_validated() {
        let mut map = MemoryMap::new();
        assert!(map.load_os_rom(&[0; 100]).is_err());
    }
}
