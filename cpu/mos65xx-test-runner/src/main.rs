//! Runs SingleStepTests-style JSON processor tests against the CPU core: one
//! file per opcode, each test giving an initial machine state, a final state,
//! and the per-cycle bus activity.
//!
//! The emulation batches idle cycles instead of emitting one bus access per
//! cycle, so the comparison checks final state, total cycle count, and that
//! the accesses the core did make appear in the expected order.

use clap::Parser;
use env_logger::Env;
use mos65xx_emu::bus::IoBus;
use mos65xx_emu::{BusAccess, CpuRegisters, Mos65xx, StatusFlags, StatusReadContext, Variant};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

struct NullIo;

impl IoBus for NullIo {
    fn hw_read(&mut self, _address: u16) -> u8 {
        0xFF
    }

    fn hw_write(&mut self, _address: u16, _value: u8) {}

    fn irq(&self) -> bool {
        false
    }

    fn nmi(&self) -> bool {
        false
    }

    fn acknowledge_nmi(&mut self) {}

    fn poll_time(&mut self, _cycles: u32) {}
}

#[derive(Debug, Clone, Deserialize)]
struct SystemState {
    pc: u16,
    s: u8,
    a: u8,
    x: u8,
    y: u8,
    p: u8,
    ram: Vec<(u16, u8)>,
}

#[derive(Debug, Clone, Deserialize)]
struct Cycle(u16, u8, String);

impl Cycle {
    fn to_bus_access(&self) -> BusAccess {
        match self.2.as_str() {
            "read" => BusAccess::Read(self.0, self.1),
            "write" => BusAccess::Write(self.0, self.1),
            _ => panic!("Invalid bus cycle type, expected read/write: {}", self.2),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TestDescription {
    name: String,
    initial: SystemState,
    #[serde(rename = "final")]
    final_: SystemState,
    cycles: Vec<Cycle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum VariantArg {
    Nmos,
    Cmos,
}

#[derive(Debug, Parser)]
struct Args {
    /// Directory containing JSON tests
    #[arg(long, short = 'd')]
    dir_path: String,

    /// Processor variant to test
    #[arg(long, value_enum, default_value = "nmos")]
    variant: VariantArg,
}

fn new_cpu(variant: Variant) -> anyhow::Result<Mos65xx> {
    let mut cpu = Mos65xx::new(variant)?;
    cpu.memory_mut().map_flat_ram();
    cpu.enable_bus_log();
    Ok(cpu)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let variant = match args.variant {
        VariantArg::Nmos => Variant::Nmos6502,
        VariantArg::Cmos => Variant::Cmos65C12,
    };

    let mut cpu = new_cpu(variant)?;
    let mut io = NullIo;
    let mut dirty_addresses: Vec<u16> = Vec::new();

    for opcode in 0x00..=0xFF {
        let file_path = Path::new(&args.dir_path).join(format!("{opcode:02x}.json"));
        if !file_path.exists() {
            log::info!("No tests for opcode {opcode:02X}, skipping");
            continue;
        }
        let tests: Vec<TestDescription> =
            serde_json::from_reader(BufReader::new(File::open(&file_path)?))?;

        let mut failures = 0;
        let test_count = tests.len();
        for test in tests {
            for &address in &dirty_addresses {
                cpu.memory_mut().write(address, 0);
            }
            dirty_addresses.clear();

            for &(address, value) in &test.initial.ram {
                cpu.memory_mut().write(address, value);
                dirty_addresses.push(address);
            }

            cpu.set_registers(CpuRegisters {
                a: test.initial.a,
                x: test.initial.x,
                y: test.initial.y,
                sp: test.initial.s,
                pc: test.initial.pc,
                status: StatusFlags::from_byte(test.initial.p),
            });

            cpu.take_bus_log();
            let start_cycles = cpu.total_cycles();
            cpu.step(&mut io);

            if cpu.halted() {
                // Halting opcodes aren't worth testing; replace the frozen CPU
                log::debug!("Opcode {opcode:02X} halted the core in '{}'", test.name);
                cpu = new_cpu(variant)?;
                continue;
            }

            let accesses = cpu.take_bus_log();
            for access in &accesses {
                let (BusAccess::Read(address, _) | BusAccess::Write(address, _)) = access;
                dirty_addresses.push(*address);
            }

            let elapsed = cpu.total_cycles() - start_cycles;
            if check_state(&cpu, &accesses, elapsed, &test.final_, &test.cycles) {
                failures += 1;
                log::debug!("Above failures in '{}'", test.name);
            }

            for &(address, _) in &test.final_.ram {
                dirty_addresses.push(address);
            }
        }

        if failures != 0 {
            log::error!("Failed {failures} out of {test_count} tests for opcode {opcode:02X}");
        }
    }

    Ok(())
}

fn check_state(
    cpu: &Mos65xx,
    accesses: &[BusAccess],
    elapsed: u64,
    final_state: &SystemState,
    cycles: &[Cycle],
) -> bool {
    let mut errors = false;

    for &(address, expected_value) in &final_state.ram {
        let actual_value = cpu.memory().peek(address);
        if expected_value != actual_value {
            errors = true;
            log::debug!(
                "RAM[{address:04X}]: expected={expected_value:02X}, actual={actual_value:02X}"
            );
        }
    }

    let registers = cpu.registers();
    errors |= check_register("A", final_state.a, registers.a);
    errors |= check_register("X", final_state.x, registers.x);
    errors |= check_register("Y", final_state.y, registers.y);
    errors |= check_register("S", final_state.s, registers.sp);
    errors |= check_register(
        "P",
        final_state.p | 0x10,
        registers.status.to_byte(StatusReadContext::Brk) | 0x10,
    );

    if final_state.pc != registers.pc {
        log::debug!("PC: expected={:04X} actual={:04X}", final_state.pc, registers.pc);
        errors = true;
    }

    if elapsed != cycles.len() as u64 {
        log::debug!("Cycle count does not match: expected={}, actual={elapsed}", cycles.len());
        errors = true;
    }

    // Idle cycles carry no bus access here, so the recorded accesses must
    // appear as an in-order subsequence of the expected cycle list
    let mut expected = cycles.iter().map(Cycle::to_bus_access);
    for &access in accesses {
        if !expected.any(|candidate| candidate == access) {
            log::debug!("Bus access out of order or unexpected: {access:?}");
            log::debug!("  Expected cycles: {cycles:?}");
            log::debug!("  Actual accesses: {accesses:?}");
            errors = true;
            break;
        }
    }

    errors
}

fn check_register(name: &str, expected: u8, actual: u8) -> bool {
    if expected != actual {
        log::debug!("{name}: expected={expected:02X}, actual={actual:02X}");
        true
    } else {
        false
    }
}
