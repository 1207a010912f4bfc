//! The execution engine: opcode fetch, compiled-program interpretation, the
//! dedicated branch routine, and interrupt servicing.
//!
//! Bus operations within one instruction happen in the exact order their
//! program declares. Interrupt-line changes are only observed at the single
//! `CheckInterrupt` step one cycle before the instruction retires, and a
//! latched interrupt is serviced at the next instruction boundary.

use crate::alu;
use crate::bus::{IoBus, in_hardware_window};
use crate::compiler::{
    AddrExpr, CompiledInstruction, ExecContext, Index, Micro, PullDst, PushSrc, ReadDst, Step,
    ZpExpr,
};
use crate::semantics::BranchCond;
use crate::{
    BusAccess, IRQ_VECTOR, InvalidOpcode, Mos65xx, NMI_VECTOR, StatusFlags, StatusReadContext,
    Variant,
};
use emu65_common::num::U16Ext;
use std::rc::Rc;

fn eval_addr(ctx: &ExecContext, expr: AddrExpr) -> u16 {
    match expr {
        AddrExpr::Effective => ctx.addr,
        AddrExpr::WithCarry => ctx.addr_with_carry,
        AddrExpr::NonCarry => ctx.addr_non_carry,
        AddrExpr::PointerNextWrapped => {
            (ctx.addr & 0xFF00) | u16::from(ctx.addr.lsb().wrapping_add(1))
        }
        AddrExpr::PointerNextLinear => ctx.addr.wrapping_add(1),
    }
}

fn eval_zp(ctx: &ExecContext, expr: ZpExpr) -> u16 {
    match expr {
        ZpExpr::Effective => ctx.addr,
        ZpExpr::EffectiveNext => u16::from(ctx.addr.lsb().wrapping_add(1)),
    }
}

fn branch_taken(cond: BranchCond, status: &StatusFlags) -> bool {
    match cond {
        BranchCond::CarryClear => !status.carry,
        BranchCond::CarrySet => status.carry,
        BranchCond::NotZero => !status.zero,
        BranchCond::Zero => status.zero,
        BranchCond::NotNegative => !status.negative,
        BranchCond::Negative => status.negative,
        BranchCond::OverflowClear => !status.overflow,
        BranchCond::OverflowSet => status.overflow,
        BranchCond::Always => true,
    }
}

impl Mos65xx {
    /// Read one byte through the full memory map, forwarding hardware-window
    /// addresses to the peripheral bus. This is the same path instruction
    /// execution uses, so DMA-capable peripherals see identical behavior.
    pub fn read_bus<I: IoBus>(&mut self, io: &mut I, address: u16) -> u8 {
        self.read_mem(io, address)
    }

    /// Write one byte through the full memory map, forwarding hardware-window
    /// addresses to the peripheral bus.
    pub fn write_bus<I: IoBus>(&mut self, io: &mut I, address: u16, value: u8) {
        self.write_mem(io, address, value);
    }

    pub(crate) fn step_instruction<I: IoBus>(&mut self, io: &mut I) {
        self.memory.select_bank_for_pc(self.registers.pc);

        let instructions = Rc::clone(&self.instructions);
        if self.take_int {
            self.take_int = false;
            self.run_program(io, instructions.service());
            return;
        }

        let opcode = self.read_mem(io, self.registers.pc);
        self.registers.pc = self.registers.pc.wrapping_add(1);
        if let Some(program) = instructions.program(opcode) {
            self.run_program(io, program);
        } else {
            // Step back onto the faulting byte and stay halted until reset
            self.registers.pc = self.registers.pc.wrapping_sub(1);
            self.halted = true;
            self.fault = Some(InvalidOpcode { opcode, pc: self.registers.pc });
            log::error!("invalid opcode ${opcode:02X} at ${:04X}, halting", self.registers.pc);
            self.poll_time(io, 1);
        }
    }

    fn run_program<I: IoBus>(&mut self, io: &mut I, program: &CompiledInstruction) {
        let mut ctx = ExecContext::default();
        match program {
            CompiledInstruction::Linear(steps) => self.run_steps(io, steps, &mut ctx),
            CompiledInstruction::Split { preamble, if_crossed, if_not_crossed } => {
                self.run_steps(io, preamble, &mut ctx);
                // The split is decided exactly once, after the common prefix
                if ctx.addr_with_carry != ctx.addr_non_carry {
                    self.run_steps(io, if_crossed, &mut ctx);
                } else {
                    self.run_steps(io, if_not_crossed, &mut ctx);
                }
            }
            CompiledInstruction::Branch(cond) => self.run_branch(io, *cond),
        }
    }

    fn run_steps<I: IoBus>(&mut self, io: &mut I, steps: &[Step], ctx: &mut ExecContext) {
        for &step in steps {
            match step {
                Step::Poll(cycles) => self.poll_time(io, cycles),
                Step::PollAddr(cycles, expr) => {
                    let address = eval_addr(ctx, expr);
                    self.poll_time_at_address(io, cycles, address);
                }
                Step::Read { addr, dst } => {
                    let value = self.read_mem(io, eval_addr(ctx, addr));
                    store_read(ctx, dst, value);
                }
                Step::Write { addr } => {
                    self.write_mem(io, eval_addr(ctx, addr), ctx.operand);
                }
                Step::ReadZp { addr, dst } => {
                    let value = self.read_zp(eval_zp(ctx, addr));
                    store_read(ctx, dst, value);
                }
                Step::WriteZp { addr } => {
                    self.write_zp(eval_zp(ctx, addr), ctx.operand);
                }
                Step::Push(src) => {
                    let value = match src {
                        PushSrc::A => self.registers.a,
                        PushSrc::X => self.registers.x,
                        PushSrc::Y => self.registers.y,
                        PushSrc::StatusBrk => {
                            self.registers.status.to_byte(StatusReadContext::Brk)
                        }
                        PushSrc::StatusIrq => self
                            .registers
                            .status
                            .to_byte(StatusReadContext::HardwareInterruptHandler),
                        PushSrc::PcHi => self.registers.pc.msb(),
                        PushSrc::PcLo => self.registers.pc.lsb(),
                        PushSrc::PcMinus1Hi => self.registers.pc.wrapping_sub(1).msb(),
                        PushSrc::PcMinus1Lo => self.registers.pc.wrapping_sub(1).lsb(),
                    };
                    self.push_byte(value);
                }
                Step::Pull(dst) => {
                    let value = self.pull_byte();
                    match dst {
                        PullDst::A => {
                            self.registers.a = alu::set_zn(&mut self.registers.status, value);
                        }
                        PullDst::X => {
                            self.registers.x = alu::set_zn(&mut self.registers.status, value);
                        }
                        PullDst::Y => {
                            self.registers.y = alu::set_zn(&mut self.registers.status, value);
                        }
                        PullDst::Status => self.registers.status = StatusFlags::from_byte(value),
                        PullDst::PtrLo => ctx.ptr_lo = value,
                        PullDst::PtrHi => ctx.ptr_hi = value,
                    }
                }
                Step::Compute(micro) => self.run_micro(io, micro, ctx),
                Step::CheckInterrupt => self.check_interrupts(io),
            }
        }
    }

    fn run_micro<I: IoBus>(&mut self, io: &mut I, micro: Micro, ctx: &mut ExecContext) {
        match micro {
            Micro::FetchAddrByte => ctx.addr = self.fetch_byte(io).into(),
            Micro::FetchAddrByteIndexed(index) => {
                let base = self.fetch_byte(io);
                ctx.addr = base.wrapping_add(self.index_value(index)).into();
            }
            Micro::FetchAddrWord => ctx.addr = self.fetch_word(io),
            Micro::FetchAddrWordIndexed(index) => {
                let index = u16::from(self.index_value(index));
                ctx.addr = self.fetch_word(io).wrapping_add(index);
            }
            Micro::FetchOperand => ctx.operand = self.fetch_byte(io),
            Micro::FetchDiscard => {
                self.fetch_byte(io);
            }
            Micro::ReadPcSpurious => {
                self.read_mem(io, self.registers.pc);
            }
            Micro::LoadOperandA => ctx.operand = self.registers.a,
            Micro::StoreOperandA => self.registers.a = ctx.operand,
            Micro::AssemblePointer => ctx.addr = u16::from_le_bytes([ctx.ptr_lo, ctx.ptr_hi]),
            Micro::IndexEffective(index) => {
                ctx.addr_with_carry =
                    ctx.addr.wrapping_add(u16::from(self.index_value(index)));
                ctx.addr_non_carry = (ctx.addr & 0xFF00) | (ctx.addr_with_carry & 0x00FF);
            }
            Micro::CollapseCarried => {
                if ctx.addr_with_carry != ctx.addr_non_carry {
                    ctx.addr_with_carry &= 0x00FF;
                }
            }
            Micro::SelectVector => {
                if io.nmi() {
                    io.acknowledge_nmi();
                    ctx.addr = NMI_VECTOR;
                } else {
                    ctx.addr = IRQ_VECTOR;
                }
            }
            Micro::EnterInterrupt => {
                self.registers.status.interrupt_disable = true;
                if self.variant == Variant::Cmos65C12 {
                    self.registers.status.decimal = false;
                }
            }
            Micro::Jump => self.registers.pc = ctx.addr,
            Micro::JumpIncremented => self.registers.pc = ctx.addr.wrapping_add(1),
            Micro::Apply(f) => {
                f(&mut self.registers, ctx);
                if ctx.extra_poll > 0 {
                    let extra = std::mem::take(&mut ctx.extra_poll);
                    self.poll_time(io, extra);
                }
            }
        }
    }

    /// Branch timing depends on a runtime page-wrap test, so branches run as
    /// a dedicated routine instead of a compiled program: flat two cycles if
    /// not taken, three if taken, four if the target crosses a page.
    fn run_branch<I: IoBus>(&mut self, io: &mut I, cond: BranchCond) {
        let taken = branch_taken(cond, &self.registers.status);
        let offset = self.fetch_byte(io) as i8;

        if !taken {
            self.poll_time(io, 2);
            self.check_interrupts(io);
            return;
        }

        let pc = self.registers.pc;
        let new_pc = pc.wrapping_add_signed(i16::from(offset));
        let cycles = if pc & 0xFF00 == new_pc & 0xFF00 { 3 } else { 4 };
        self.registers.pc = new_pc;
        self.poll_time(io, cycles - 1);
        self.check_interrupts(io);
        self.poll_time(io, 1);
    }

    fn check_interrupts<I: IoBus>(&mut self, io: &mut I) {
        self.take_int |=
            io.nmi() || (!self.registers.status.interrupt_disable && io.irq());
    }

    fn index_value(&self, index: Index) -> u8 {
        match index {
            Index::X => self.registers.x,
            Index::Y => self.registers.y,
        }
    }

    fn poll_time<I: IoBus>(&mut self, io: &mut I, cycles: u32) {
        self.cycles -= i64::from(cycles);
        self.total_cycles += u64::from(cycles);
        io.poll_time(cycles);
    }

    fn poll_time_at_address<I: IoBus>(&mut self, io: &mut I, cycles: u32, address: u16) {
        self.cycles -= i64::from(cycles);
        self.total_cycles += u64::from(cycles);
        io.poll_time_at_address(cycles, address);
    }

    fn read_mem<I: IoBus>(&mut self, io: &mut I, address: u16) -> u8 {
        let value = match self.memory.read(address) {
            Some(value) => value,
            None if in_hardware_window(address) => io.hw_read(address),
            None => {
                // The real bus floats rather than trapping
                log::warn!("read of unmapped address ${address:04X}");
                0xFF
            }
        };
        if let Some(bus_log) = &mut self.bus_log {
            bus_log.push(BusAccess::Read(address, value));
        }
        value
    }

    fn write_mem<I: IoBus>(&mut self, io: &mut I, address: u16, value: u8) {
        if let Some(bus_log) = &mut self.bus_log {
            bus_log.push(BusAccess::Write(address, value));
        }
        if !self.memory.write(address, value) && in_hardware_window(address) {
            io.hw_write(address, value);
        }
    }

    fn read_zp(&mut self, address: u16) -> u8 {
        let value = self.memory.read_zp_stack(address);
        if let Some(bus_log) = &mut self.bus_log {
            bus_log.push(BusAccess::Read(address, value));
        }
        value
    }

    fn write_zp(&mut self, address: u16, value: u8) {
        if let Some(bus_log) = &mut self.bus_log {
            bus_log.push(BusAccess::Write(address, value));
        }
        self.memory.write_zp_stack(address, value);
    }

    fn fetch_byte<I: IoBus>(&mut self, io: &mut I) -> u8 {
        let value = self.read_mem(io, self.registers.pc);
        self.registers.pc = self.registers.pc.wrapping_add(1);
        value
    }

    fn fetch_word<I: IoBus>(&mut self, io: &mut I) -> u16 {
        let lsb = self.fetch_byte(io);
        let msb = self.fetch_byte(io);
        u16::from_le_bytes([lsb, msb])
    }

    fn push_byte(&mut self, value: u8) {
        let address = 0x0100 | u16::from(self.registers.sp);
        self.write_zp(address, value);
        self.registers.sp = self.registers.sp.wrapping_sub(1);
    }

    fn pull_byte(&mut self) -> u8 {
        self.registers.sp = self.registers.sp.wrapping_add(1);
        self.read_zp(0x0100 | u16::from(self.registers.sp))
    }
}

fn store_read(ctx: &mut ExecContext, dst: ReadDst, value: u8) {
    match dst {
        ReadDst::Discard => {}
        ReadDst::Operand => ctx.operand = value,
        ReadDst::PtrLo => ctx.ptr_lo = value,
        ReadDst::PtrHi => ctx.ptr_hi = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InterruptLines;

    const ROM_SIZE: usize = 16 * 1024;
    const CODE_BASE: u16 = 0x0200;

    struct TestIo {
        lines: InterruptLines,
        polled: u32,
        poll_addresses: Vec<u16>,
        hw_writes: Vec<(u16, u8)>,
        assert_irq_once_running: bool,
    }

    impl TestIo {
        fn new() -> Self {
            Self {
                lines: InterruptLines::new(),
                polled: 0,
                poll_addresses: Vec::new(),
                hw_writes: Vec::new(),
                assert_irq_once_running: false,
            }
        }
    }

    impl IoBus for TestIo {
        fn hw_read(&mut self, _address: u16) -> u8 {
            0xFE
        }

        fn hw_write(&mut self, address: u16, value: u8) {
            self.hw_writes.push((address, value));
        }

        fn irq(&self) -> bool {
            self.lines.irq()
        }

        fn nmi(&self) -> bool {
            self.lines.nmi()
        }

        fn acknowledge_nmi(&mut self) {
            self.lines.clear_nmi();
        }

        fn poll_time(&mut self, cycles: u32) {
            self.polled += cycles;
            if self.assert_irq_once_running {
                self.lines.assert(0x01);
            }
        }

        fn poll_time_at_address(&mut self, cycles: u32, address: u16) {
            self.poll_addresses.push(address);
            self.poll_time(cycles);
        }
    }

    fn os_rom(reset: u16, irq: u16, nmi: u16) -> Vec<u8> {
        let mut rom = vec![0; ROM_SIZE];
        rom[0x3FFA] = nmi as u8;
        rom[0x3FFB] = (nmi >> 8) as u8;
        rom[0x3FFC] = reset as u8;
        rom[0x3FFD] = (reset >> 8) as u8;
        rom[0x3FFE] = irq as u8;
        rom[0x3FFF] = (irq >> 8) as u8;
        rom
    }

    fn cpu_with_program(variant: Variant, program: &[u8]) -> Mos65xx {
        let mut cpu = Mos65xx::new(variant).unwrap();
        cpu.memory_mut().load_os_rom(&os_rom(CODE_BASE, 0x0380, 0x03C0)).unwrap();
        cpu.reset();
        for (i, &byte) in program.iter().enumerate() {
            cpu.memory_mut().write(CODE_BASE + i as u16, byte);
        }
        cpu
    }

    #[test]
    fn reset_fetches_pc_from_vector() {
        let cpu = cpu_with_program(Variant::Nmos6502, &[]);
        assert_eq!(cpu.pc(), CODE_BASE);
        assert!(!cpu.halted());
    }

    #[test]
    fn adc_immediate_end_to_end() {
        // ADC #$03 with A=5 and all flags clear
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0x69, 0x03]);
        let mut registers = cpu.registers().clone();
        registers.a = 0x05;
        registers.status = StatusFlags::from_byte(0x00);
        cpu.set_registers(registers);

        let mut io = TestIo::new();
        cpu.step(&mut io);

        let registers = cpu.registers();
        assert_eq!(registers.a, 0x08);
        assert_eq!(registers.status.to_byte(StatusReadContext::Brk) & 0xC3, 0x00);
        assert_eq!(io.polled, 2);
        assert_eq!(cpu.total_cycles(), 2);
        assert_eq!(cpu.pc(), CODE_BASE + 2);
    }

    #[test]
    fn adc_absolute_is_four_cycles_with_one_operand_read() {
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0x6D, 0x00, 0x30]);
        cpu.memory_mut().write(0x3000, 0x07);
        cpu.enable_bus_log();

        let mut io = TestIo::new();
        cpu.step(&mut io);

        assert_eq!(cpu.registers().a, 0x07);
        assert_eq!(io.polled, 4);
        let accesses = cpu.take_bus_log();
        assert_eq!(
            accesses,
            vec![
                BusAccess::Read(0x0200, 0x6D),
                BusAccess::Read(0x0201, 0x00),
                BusAccess::Read(0x0202, 0x30),
                BusAccess::Read(0x3000, 0x07),
            ]
        );
    }

    #[test]
    fn jsr_pushes_return_address_minus_one_high_byte_first() {
        // JSR $0300
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0x20, 0x00, 0x03]);
        let sp = cpu.registers().sp;

        let mut io = TestIo::new();
        cpu.step(&mut io);

        assert_eq!(cpu.pc(), 0x0300);
        assert_eq!(io.polled, 6);
        let stack_hi = 0x0100 | u16::from(sp);
        let stack_lo = 0x0100 | u16::from(sp.wrapping_sub(1));
        assert_eq!(cpu.memory().read(stack_hi), Some(0x02));
        assert_eq!(cpu.memory().read(stack_lo), Some(0x02));
        assert_eq!(cpu.registers().sp, sp.wrapping_sub(2));
    }

    #[test]
    fn rts_returns_past_the_pushed_address() {
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0x20, 0x00, 0x03]);
        cpu.memory_mut().write(0x0300, 0x60); // RTS

        let mut io = TestIo::new();
        cpu.step(&mut io);
        cpu.step(&mut io);

        assert_eq!(cpu.pc(), CODE_BASE + 3);
        assert_eq!(io.polled, 12);
    }

    #[test]
    fn brk_vectors_through_irq_vector_with_b_flag_set() {
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0x00]);
        let sp = cpu.registers().sp;

        let mut io = TestIo::new();
        cpu.step(&mut io);

        assert_eq!(cpu.pc(), 0x0380);
        assert_eq!(io.polled, 7);
        assert!(cpu.registers().status.interrupt_disable);
        // Return address skips the pad byte
        assert_eq!(cpu.memory().read(0x0100 | u16::from(sp)), Some(0x02));
        assert_eq!(cpu.memory().read(0x0100 | u16::from(sp.wrapping_sub(1))), Some(0x02));
        let pushed_status =
            cpu.memory().read(0x0100 | u16::from(sp.wrapping_sub(2))).unwrap();
        assert_eq!(pushed_status & 0x10, 0x10);
    }

    #[test]
    fn invalid_opcode_halts_nmos_core_until_reset() {
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0x02]);

        let mut io = TestIo::new();
        cpu.step(&mut io);

        assert!(cpu.halted());
        assert_eq!(cpu.pc(), CODE_BASE);
        let fault = cpu.fault().unwrap();
        assert_eq!(fault.opcode, 0x02);
        assert_eq!(fault.pc, CODE_BASE);
        assert_eq!(io.polled, 1);

        // Terminal until an explicit reset
        cpu.step(&mut io);
        assert!(cpu.halted());
        assert_eq!(io.polled, 1);

        cpu.reset();
        assert!(!cpu.halted());
        assert!(cpu.fault().is_none());
    }

    #[test]
    fn irq_asserted_mid_instruction_waits_for_retirement() {
        // LDA $3000 runs with the IRQ line asserting during its first polled
        // span; the instruction must complete before the service routine runs
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0xAD, 0x00, 0x30, 0xEA]);
        let mut registers = cpu.registers().clone();
        registers.status.interrupt_disable = false;
        cpu.set_registers(registers);

        let mut io = TestIo::new();
        io.assert_irq_once_running = true;
        cpu.step(&mut io);

        // The load retired normally
        assert_eq!(cpu.pc(), CODE_BASE + 3);
        assert_eq!(io.polled, 4);

        // The next boundary services the interrupt: 7 cycles, PC pushed,
        // handler address loaded
        let sp = cpu.registers().sp;
        cpu.step(&mut io);
        assert_eq!(cpu.pc(), 0x0380);
        assert_eq!(io.polled, 4 + 7);
        assert!(cpu.registers().status.interrupt_disable);
        let pushed_status =
            cpu.memory().read(0x0100 | u16::from(sp.wrapping_add(1))).unwrap();
        assert_eq!(pushed_status & 0x10, 0x00);
        let pushed_lo = cpu.memory().read(0x0100 | u16::from(sp.wrapping_add(2))).unwrap();
        let pushed_hi = cpu.memory().read(0x0100 | u16::from(sp.wrapping_add(3))).unwrap();
        assert_eq!(u16::from_le_bytes([pushed_lo, pushed_hi]), CODE_BASE + 3);
    }

    #[test]
    fn nmi_bypasses_interrupt_disable() {
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0xEA, 0xEA]);
        assert!(cpu.registers().status.interrupt_disable);

        let mut io = TestIo::new();
        io.lines.assert_nmi();
        cpu.step(&mut io);
        cpu.step(&mut io);

        assert_eq!(cpu.pc(), 0x03C0);
        // The NMI line was acknowledged during vector selection
        assert!(!io.lines.nmi());
    }

    #[test]
    fn indexed_load_page_crossing_costs_the_spurious_read_on_nmos() {
        // LDA $30FF,X with X=2
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0xBD, 0xFF, 0x30]);
        let mut registers = cpu.registers().clone();
        registers.x = 0x02;
        cpu.set_registers(registers);
        cpu.memory_mut().write(0x3101, 0x55);
        cpu.memory_mut().write(0x30FF, 0xAA);
        cpu.enable_bus_log();

        let mut io = TestIo::new();
        cpu.step(&mut io);

        assert_eq!(cpu.registers().a, 0x55);
        assert_eq!(io.polled, 5);
        let accesses = cpu.take_bus_log();
        // Spurious read at the uncarried address, then the true read
        assert_eq!(&accesses[3..], &[
            BusAccess::Read(0x3001, 0x00),
            BusAccess::Read(0x3101, 0x55),
        ]);
    }

    #[test]
    fn indexed_load_without_crossing_is_four_cycles() {
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0xBD, 0x00, 0x30]);
        let mut registers = cpu.registers().clone();
        registers.x = 0x01;
        cpu.set_registers(registers);
        cpu.memory_mut().write(0x3001, 0x77);
        cpu.enable_bus_log();

        let mut io = TestIo::new();
        cpu.step(&mut io);

        assert_eq!(cpu.registers().a, 0x77);
        assert_eq!(io.polled, 4);
        assert_eq!(cpu.take_bus_log().len(), 4);
    }

    #[test]
    fn cmos_indexed_load_crossing_burns_idle_instead_of_spurious_read() {
        let mut cpu = cpu_with_program(Variant::Cmos65C12, &[0xBD, 0xFF, 0x30]);
        let mut registers = cpu.registers().clone();
        registers.x = 0x02;
        cpu.set_registers(registers);
        cpu.memory_mut().write(0x3101, 0x55);
        cpu.enable_bus_log();

        let mut io = TestIo::new();
        cpu.step(&mut io);

        assert_eq!(cpu.registers().a, 0x55);
        assert_eq!(io.polled, 5);
        // No spurious access: 3 fetches plus the true read
        assert_eq!(cpu.take_bus_log().len(), 4);
    }

    #[test]
    fn nmos_rmw_touches_the_cell_twice() {
        // INC $30FF,X with X=2, page crossing
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0xFE, 0xFF, 0x30]);
        let mut registers = cpu.registers().clone();
        registers.x = 0x02;
        cpu.set_registers(registers);
        cpu.memory_mut().write(0x3101, 0x41);
        cpu.enable_bus_log();

        let mut io = TestIo::new();
        cpu.step(&mut io);

        assert_eq!(cpu.memory().read(0x3101), Some(0x42));
        assert_eq!(io.polled, 7);
        let accesses = cpu.take_bus_log();
        assert_eq!(&accesses[3..], &[
            BusAccess::Read(0x3001, 0x00),
            BusAccess::Read(0x3101, 0x41),
            BusAccess::Write(0x3101, 0x41),
            BusAccess::Write(0x3101, 0x42),
        ]);
    }

    #[test]
    fn unofficial_store_collapses_carried_write_into_zero_page() {
        // SHX $30FF,Y with Y=2: the carried target $3101 collapses to $0001
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0x9E, 0xFF, 0x30]);
        let mut registers = cpu.registers().clone();
        registers.x = 0x37;
        registers.y = 0x02;
        cpu.set_registers(registers);

        let mut io = TestIo::new();
        cpu.step(&mut io);

        let expected = 0x37 & 0x31;
        assert_eq!(cpu.memory().read(0x0001), Some(expected));
        assert_eq!(cpu.memory().read(0x3101), Some(0x00));
    }

    #[test]
    fn cmos_reserved_opcodes_consume_documented_bytes_and_cycles() {
        let mut cpu = cpu_with_program(Variant::Cmos65C12, &[0x5C, 0x12, 0x34]);
        let mut io = TestIo::new();
        cpu.step(&mut io);
        assert_eq!(cpu.pc(), CODE_BASE + 3);
        assert_eq!(io.polled, 8);

        let mut cpu = cpu_with_program(Variant::Cmos65C12, &[0x03, 0xEA]);
        let mut io = TestIo::new();
        cpu.step(&mut io);
        assert_eq!(cpu.pc(), CODE_BASE + 1);
        assert_eq!(io.polled, 1);

        // $DC advertises the fetched operand address to bus snoopers
        let mut cpu = cpu_with_program(Variant::Cmos65C12, &[0xDC, 0x34, 0x12]);
        let mut io = TestIo::new();
        cpu.step(&mut io);
        assert_eq!(cpu.pc(), CODE_BASE + 3);
        assert_eq!(io.polled, 4);
        assert!(io.poll_addresses.contains(&0x1234));
    }

    #[test]
    fn branch_timing_depends_on_outcome_and_page() {
        // BEQ not taken: 2 cycles
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0xF0, 0x10]);
        let mut io = TestIo::new();
        cpu.step(&mut io);
        assert_eq!(io.polled, 2);
        assert_eq!(cpu.pc(), CODE_BASE + 2);

        // BNE taken within the page: 3 cycles
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0xD0, 0x10]);
        let mut io = TestIo::new();
        cpu.step(&mut io);
        assert_eq!(io.polled, 3);
        assert_eq!(cpu.pc(), CODE_BASE + 0x12);

        // BNE taken across a page: 4 cycles
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0xD0, 0x7F]);
        let mut registers = cpu.registers().clone();
        registers.pc = 0x02F0;
        cpu.set_registers(registers);
        cpu.memory_mut().write(0x02F0, 0xD0);
        cpu.memory_mut().write(0x02F1, 0x7F);
        let mut io = TestIo::new();
        cpu.step(&mut io);
        assert_eq!(io.polled, 4);
        assert_eq!(cpu.pc(), 0x0371);
    }

    #[test]
    fn cmos_bra_always_branches() {
        let mut cpu = cpu_with_program(Variant::Cmos65C12, &[0x80, 0x06]);
        let mut io = TestIo::new();
        cpu.step(&mut io);
        assert_eq!(cpu.pc(), CODE_BASE + 8);
        assert_eq!(io.polled, 3);
    }

    #[test]
    fn cmos_decimal_adc_costs_an_extra_cycle() {
        // SED; ADC #$05
        let mut cpu = cpu_with_program(Variant::Cmos65C12, &[0xF8, 0x69, 0x05]);
        let mut registers = cpu.registers().clone();
        registers.a = 0x09;
        cpu.set_registers(registers);

        let mut io = TestIo::new();
        cpu.step(&mut io);
        assert_eq!(io.polled, 2);
        cpu.step(&mut io);
        assert_eq!(io.polled, 2 + 3);
        assert_eq!(cpu.registers().a, 0x14);
    }

    #[test]
    fn nmos_decimal_adc_stays_at_base_cycle_count() {
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0xF8, 0x69, 0x05]);
        let mut registers = cpu.registers().clone();
        registers.a = 0x09;
        cpu.set_registers(registers);

        let mut io = TestIo::new();
        cpu.step(&mut io);
        cpu.step(&mut io);
        assert_eq!(io.polled, 2 + 2);
        assert_eq!(cpu.registers().a, 0x14);
    }

    #[test]
    fn hardware_window_accesses_are_forwarded() {
        // STA $FE40; LDA $FE40
        let mut cpu =
            cpu_with_program(Variant::Nmos6502, &[0x8D, 0x40, 0xFE, 0xAD, 0x40, 0xFE]);
        let mut registers = cpu.registers().clone();
        registers.a = 0x5A;
        cpu.set_registers(registers);

        let mut io = TestIo::new();
        cpu.step(&mut io);
        assert_eq!(io.hw_writes, vec![(0xFE40, 0x5A)]);

        cpu.step(&mut io);
        assert_eq!(cpu.registers().a, 0xFE);
    }

    #[test]
    fn indirect_jump_reproduces_nmos_page_wrap_bug() {
        // JMP ($30FF): pointer high byte comes from $3000, not $3100
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0x6C, 0xFF, 0x30]);
        cpu.memory_mut().write(0x30FF, 0x34);
        cpu.memory_mut().write(0x3100, 0x99);
        cpu.memory_mut().write(0x3000, 0x12);

        let mut io = TestIo::new();
        cpu.step(&mut io);
        assert_eq!(cpu.pc(), 0x1234);
        assert_eq!(io.polled, 5);

        let mut cpu = cpu_with_program(Variant::Cmos65C12, &[0x6C, 0xFF, 0x30]);
        cpu.memory_mut().write(0x30FF, 0x34);
        cpu.memory_mut().write(0x3100, 0x12);
        cpu.memory_mut().write(0x3000, 0x99);

        let mut io = TestIo::new();
        cpu.step(&mut io);
        assert_eq!(cpu.pc(), 0x1234);
        assert_eq!(io.polled, 6);
    }

    #[test]
    fn run_slice_consumes_the_cycle_allowance() {
        // A NOP loop: each iteration is 2 cycles
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0xEA; 64]);
        let mut io = TestIo::new();
        cpu.run_slice(&mut io, 20);

        assert_eq!(io.polled, 20);
        assert_eq!(cpu.pc(), CODE_BASE + 10);
        assert!(cpu.cycles_remaining() <= 0);
    }

    #[test]
    fn halt_takes_effect_at_instruction_boundary() {
        let mut cpu = cpu_with_program(Variant::Nmos6502, &[0xEA; 8]);
        let mut io = TestIo::new();
        cpu.step(&mut io);
        cpu.halt();
        cpu.run_slice(&mut io, 100);
        assert_eq!(io.polled, 2);
    }
}
