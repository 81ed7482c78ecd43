// The CPU core: register file, exception dispatch, and the fetch/decode/
// execute loop. `step` drives one fetch/decode/execute cycle across ARM's
// dual ARM/Thumb instruction streams and the full seven-mode exception
// model.

pub mod arm;
pub mod exceptions;
pub mod registers;
pub mod thumb;

use crate::fields::PsrBit;
use crate::memory::Bus;
use exceptions::{enter, Exception};
use log::debug;
use registers::Registers;

/// What happened during one `Cpu::step` call, for the simulator's run loop
/// and `RunResult::stop_reason` to interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Normal,
    ExceptionEntered(ExceptionKind),
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Undefined,
    Swi,
    PrefetchAbort,
    DataAbort,
    Irq,
    Fiq,
}

pub struct Cpu {
    pub registers: Registers,
    halt_on_undefined: bool,
    halted: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Cpu { registers: Registers::new(), halt_on_undefined: false, halted: false }
    }

    pub fn reset(&mut self) {
        self.registers = Registers::new();
        self.halted = false;
    }

    pub fn set_halt_on_undefined(&mut self, halt: bool) {
        self.halt_on_undefined = halt;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn request_halt(&mut self) {
        self.halted = true;
    }

    /// Reads `R15` the way an executing instruction's operand fetch sees it:
    /// PC plus the pipeline lead, +8 in ARM state, +4 in
    /// Thumb state. `registers.pc` itself always holds the address of the
    /// instruction about to be fetched.
    pub fn operand_pc(&self) -> u32 {
        let lead = if self.registers.is_thumb() { 4 } else { 8 };
        self.registers.pc.wrapping_add(lead)
    }

    /// Runs one step: consults the interrupt controller before fetch (FIQ
    /// first), then fetches, decodes and executes one instruction.
    pub fn step(&mut self, bus: &mut Bus) -> StepOutcome {
        if self.halted {
            return StepOutcome::Halted;
        }

        if bus.interrupt_ctrl.has_pending_fiq() && !self.registers.flag(PsrBit::F) {
            self.take_exception(Exception::Fiq);
            return StepOutcome::ExceptionEntered(ExceptionKind::Fiq);
        }
        if bus.interrupt_ctrl.has_pending_irq() && !self.registers.flag(PsrBit::I) {
            self.take_exception(Exception::Irq);
            return StepOutcome::ExceptionEntered(ExceptionKind::Irq);
        }

        let outcome = if self.registers.is_thumb() {
            thumb::step(&mut self.registers, bus)
        } else {
            arm::step(&mut self.registers, bus)
        };

        match outcome {
            Ok(()) => StepOutcome::Normal,
            Err(Exception::Undefined) => {
                self.take_exception(Exception::Undefined);
                if self.halt_on_undefined {
                    self.halted = true;
                    StepOutcome::Halted
                } else {
                    StepOutcome::ExceptionEntered(ExceptionKind::Undefined)
                }
            }
            Err(Exception::Swi) => {
                self.take_exception(Exception::Swi);
                StepOutcome::ExceptionEntered(ExceptionKind::Swi)
            }
            Err(Exception::DataAbort) => {
                self.take_exception(Exception::DataAbort);
                StepOutcome::ExceptionEntered(ExceptionKind::DataAbort)
            }
            Err(Exception::PrefetchAbort) => {
                self.take_exception(Exception::PrefetchAbort);
                StepOutcome::ExceptionEntered(ExceptionKind::PrefetchAbort)
            }
            Err(Exception::Reset) | Err(Exception::Irq) | Err(Exception::Fiq) => {
                unreachable!("instruction execution never raises Reset/Irq/Fiq directly")
            }
        }
    }

    /// `enter` expects a pipeline-consistent PC (the trapping instruction's
    /// address plus the pipeline lead), matching `return_offset`'s
    /// calibration. For an exception raised after fetch (SWI, Undefined)
    /// `registers.pc` has already been advanced past the trapping
    /// instruction once; add one more instruction width to reach the
    /// pipeline view. IRQ/FIQ are raised before fetch, where `registers.pc`
    /// is already pipeline-consistent as-is.
    fn take_exception(&mut self, exception: Exception) {
        let pc_at_fetch = match exception {
            Exception::Swi | Exception::Undefined => {
                let width = if self.registers.is_thumb() { 2 } else { 4 };
                self.registers.pc.wrapping_add(width)
            }
            _ => self.registers.pc,
        };
        let entry = enter(exception, self.registers.cpsr(), pc_at_fetch);
        debug!("exception {:?}: mode {} -> {}, pc {:#010x} -> {:#010x}", exception, self.registers.mode(), entry.new_mode, self.registers.pc, entry.new_pc);
        self.registers.set_cpsr(entry.new_cpsr);
        self.registers.set_spsr(entry.new_spsr);
        self.registers.set(14, entry.new_lr);
        self.registers.pc = entry.new_pc;
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Mode;
    use crate::memory::Bus;

    #[test]
    fn swi_entry_then_movs_pc_lr_returns_past_the_swi() {
        let mut cpu = Cpu::new();
        let mut bus = Bus::new(0x1000).unwrap();
        cpu.registers.set_cpsr(Mode::User.bits());
        cpu.registers.pc = 0x100;
        bus.write32(0x100, 0xef00_0000); // SWI #0
        bus.write32(0x08, 0xe1b0_f00e); // MOVS PC, LR

        let outcome = cpu.step(&mut bus);
        assert_eq!(outcome, StepOutcome::ExceptionEntered(ExceptionKind::Swi));
        assert_eq!(cpu.registers.pc, 0x08);
        assert_eq!(cpu.registers.mode(), Mode::Supervisor);
        // LR points past the SWI instruction, not at it - otherwise MOVS
        // PC,LR would loop on the SWI forever.
        assert_eq!(cpu.registers.get(14), 0x104);

        let outcome = cpu.step(&mut bus);
        assert_eq!(outcome, StepOutcome::Normal);
        assert_eq!(cpu.registers.mode(), Mode::User);
        assert_eq!(cpu.registers.pc, 0x104);
    }
}
