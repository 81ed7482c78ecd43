// The simulator core: owns the CPU, bus, and telemetry log, and exposes
// the host-facing step/run/breakpoint/load-image contract. A thin owner
// that wires a freshly-built CPU to a freshly-built bus and drives the
// run loop, with the PP5021C's richer stop-reason and breakpoint model.

use crate::config::Configuration;
use crate::cpu::{Cpu, ExceptionKind, StepOutcome};
use crate::devices::disk::{self, DiskImage};
use crate::error::{SimError, SimResult};
use crate::memory::Bus;
use crate::telemetry::{Event, TelemetryLog};
use log::error;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Normal,
    ExceptionEntered(ExceptionKind),
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    CycleLimit,
    Breakpoint,
    Halted,
    NoCpu,
    ExecutionError,
}

#[derive(Debug, Clone, Copy)]
pub struct RunResult {
    pub cycles: u64,
    pub instructions: u64,
    pub stop_reason: StopReason,
}

pub struct Simulator {
    cpu: Cpu,
    bus: Bus,
    telemetry: TelemetryLog,
    breakpoints: HashSet<u32>,
    rom_loaded: bool,
    cycles: u64,
    instructions: u64,
}

impl Simulator {
    pub fn new(config: &Configuration) -> SimResult<Self> {
        config.validate()?;
        let mut bus = Bus::new(config.sdram_bytes)?;
        bus.set_strict(config.strict_bus);

        if let Some(path) = &config.boot_rom_path {
            let bytes = std::fs::read(path).map_err(|source| SimError::DiskImage { path: path.display().to_string(), source })?;
            bus.load_rom(&bytes)?;
        }

        let disk = Self::build_disk(config)?;
        if let Some(disk) = disk {
            bus.ata.attach_disk(disk);
        }

        let mut cpu = Cpu::new();
        cpu.set_halt_on_undefined(config.halt_on_undefined);

        let mut telemetry = TelemetryLog::new(crate::telemetry::DEFAULT_CAPACITY);
        telemetry.note_boot();

        Ok(Simulator {
            cpu,
            bus,
            telemetry,
            breakpoints: HashSet::new(),
            rom_loaded: config.boot_rom_path.is_some(),
            cycles: 0,
            instructions: 0,
        })
    }

    fn build_disk(config: &Configuration) -> SimResult<Option<DiskImage>> {
        if let Some(root) = &config.projection_root {
            let sectors = config.memory_disk_sectors.unwrap_or(65536);
            return Ok(Some(disk::project_directory(root, sectors)?));
        }
        if let Some(path) = &config.disk_image_path {
            return Ok(Some(DiskImage::open_file(path)?));
        }
        if let Some(sectors) = config.memory_disk_sectors {
            return Ok(Some(DiskImage::in_memory(sectors)));
        }
        Ok(None)
    }

    pub fn load_rom(&mut self, bytes: &[u8]) -> SimResult<()> {
        self.bus.load_rom(bytes)?;
        self.rom_loaded = true;
        Ok(())
    }

    pub fn load_sdram(&mut self, offset: usize, bytes: &[u8]) {
        self.bus.load_sdram(offset, bytes);
    }

    pub fn load_iram(&mut self, offset: usize, bytes: &[u8]) {
        self.bus.load_iram(offset, bytes);
    }

    pub fn reset_cpu(&mut self) {
        self.cpu.reset();
        self.cycles = 0;
        self.instructions = 0;
    }

    pub fn set_pc(&mut self, addr: u32) {
        self.cpu.registers.pc = addr;
    }

    pub fn get_reg(&self, n: usize) -> u32 {
        self.cpu.registers.get(n)
    }

    pub fn set_reg(&mut self, n: usize, value: u32) {
        self.cpu.registers.set(n, value);
    }

    pub fn add_breakpoint(&mut self, addr: u32) {
        self.breakpoints.insert(addr);
    }

    pub fn remove_breakpoint(&mut self, addr: u32) {
        self.breakpoints.remove(&addr);
    }

    pub fn read_framebuffer(&self) -> &[u8] {
        self.bus.framebuffer()
    }

    /// Reads a 32-bit word through the bus, for watch expressions and other
    /// debugger conveniences; subject to the same region semantics as a CPU
    /// load (unmapped-fallback or strict-mode fault tracking).
    pub fn read_word(&mut self, addr: u32) -> u32 {
        self.bus.read32(addr)
    }

    pub fn record_event(&mut self, event: Event) {
        self.telemetry.record(event);
    }

    pub fn telemetry(&self) -> &TelemetryLog {
        &self.telemetry
    }

    pub fn get_cycles(&self) -> u64 {
        self.cycles
    }

    pub fn get_instructions(&self) -> u64 {
        self.instructions
    }

    pub fn is_running(&self) -> bool {
        !self.cpu.is_halted()
    }

    pub fn registers(&self) -> &crate::cpu::registers::Registers {
        &self.cpu.registers
    }

    /// Executes exactly one CPU step. Errors only on simulator-level misuse;
    /// bus faults and decoder faults surface as a `StepResult` exception
    /// entry, the way real hardware would just vector into a handler.
    pub fn step(&mut self) -> SimResult<StepResult> {
        if !self.rom_loaded {
            return Err(SimError::NoImageLoaded);
        }
        self.bus.tick_timers();
        let outcome = self.cpu.step(&mut self.bus);
        self.cycles += 1;
        let result = match outcome {
            StepOutcome::Normal => {
                self.instructions += 1;
                StepResult::Normal
            }
            StepOutcome::ExceptionEntered(kind) => StepResult::ExceptionEntered(kind),
            StepOutcome::Halted => StepResult::Halted,
        };
        Ok(result)
    }

    /// Runs until `max_cycles` steps have executed, a breakpoint is hit
    /// before fetch, the CPU halts, or no ROM is loaded. A hit breakpoint
    /// stops the run without executing the instruction at that address.
    pub fn run(&mut self, max_cycles: u64) -> RunResult {
        if !self.rom_loaded {
            return RunResult { cycles: 0, instructions: 0, stop_reason: StopReason::NoCpu };
        }

        let start_cycles = self.cycles;
        let start_instructions = self.instructions;

        for _ in 0..max_cycles {
            if self.breakpoints.contains(&self.cpu.registers.pc) {
                return RunResult {
                    cycles: self.cycles - start_cycles,
                    instructions: self.instructions - start_instructions,
                    stop_reason: StopReason::Breakpoint,
                };
            }

            match self.step() {
                Ok(StepResult::Halted) => {
                    return RunResult {
                        cycles: self.cycles - start_cycles,
                        instructions: self.instructions - start_instructions,
                        stop_reason: StopReason::Halted,
                    };
                }
                Ok(_) => {}
                Err(err) => {
                    error!("simulator run stopped: {}", err);
                    return RunResult {
                        cycles: self.cycles - start_cycles,
                        instructions: self.instructions - start_instructions,
                        stop_reason: StopReason::ExecutionError,
                    };
                }
            }
        }

        RunResult {
            cycles: self.cycles - start_cycles,
            instructions: self.instructions - start_instructions,
            stop_reason: StopReason::CycleLimit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator_with_sdram() -> Simulator {
        let config = Configuration::new(1024 * 1024);
        Simulator::new(&config).expect("valid configuration")
    }

    #[test]
    fn arm_add_scenario() {
        let mut sim = simulator_with_sdram();
        let program: [u8; 12] = [
            0x2a, 0x00, 0xa0, 0xe3, // MOV R0,#42
            0x64, 0x10, 0xa0, 0xe3, // MOV R1,#100
            0x01, 0x20, 0x80, 0xe0, // ADD R2,R0,R1
        ];
        sim.load_rom(&program).unwrap();
        sim.set_pc(0);
        for _ in 0..3 {
            sim.step().unwrap();
        }
        assert_eq!(sim.get_reg(0), 42);
        assert_eq!(sim.get_reg(1), 100);
        assert_eq!(sim.get_reg(2), 142);
    }

    #[test]
    fn breakpoint_scenario() {
        let mut sim = simulator_with_sdram();
        let program: [u8; 16] = [
            0x00, 0x00, 0xa0, 0xe3, // MOV R0,#0
            0x02, 0x00, 0xa0, 0xe3, // MOV R0,#2
            0x03, 0x00, 0xa0, 0xe3, // MOV R0,#3
            0x04, 0x00, 0xa0, 0xe3, // MOV R0,#4
        ];
        sim.load_rom(&program).unwrap();
        sim.set_pc(0);
        sim.add_breakpoint(0x08);
        let result = sim.run(100);
        assert_eq!(result.stop_reason, StopReason::Breakpoint);
        assert_eq!(sim.get_reg(15), 0x08);
        assert_eq!(sim.get_reg(0), 2);
    }

    #[test]
    fn step_without_rom_is_an_api_misuse_error() {
        let mut sim = simulator_with_sdram();
        assert!(matches!(sim.step(), Err(SimError::NoImageLoaded)));
    }
}
