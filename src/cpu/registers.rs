// The banked-register file. R0-R7 and R15 are shared across all modes; R8-R12
// have a FIQ-private bank; R13-R14 bank per privileged mode (User and System
// share one). Registers save on mode-switch-out and load on mode-switch-in,
// generalized to all seven ARM modes.

use crate::fields::{get_bit, set_bit, Mode, PsrBit};

const NUM_BANKS: usize = 6; // usr/sys, fiq, irq, svc, abt, und

#[derive(Clone)]
pub struct Registers {
    r0_7: [u32; 8],
    r8_12: [u32; 5],
    r8_12_fiq: [u32; 5],
    r13: u32,
    r14: u32,
    r13_bank: [u32; NUM_BANKS],
    r14_bank: [u32; NUM_BANKS],
    pub pc: u32,
    cpsr: u32,
    spsr_bank: [u32; NUM_BANKS],
    mode: Mode,
}

impl Registers {
    pub fn new() -> Self {
        let mut cpsr = Mode::Supervisor.bits();
        cpsr = set_bit(cpsr, PsrBit::I as u32, true);
        cpsr = set_bit(cpsr, PsrBit::F as u32, true);
        Registers {
            r0_7: [0; 8],
            r8_12: [0; 5],
            r8_12_fiq: [0; 5],
            r13: 0,
            r14: 0,
            r13_bank: [0; NUM_BANKS],
            r14_bank: [0; NUM_BANKS],
            pc: 0,
            cpsr,
            spsr_bank: [0; NUM_BANKS],
            mode: Mode::Supervisor,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn cpsr(&self) -> u32 {
        self.cpsr
    }

    /// Setting CPSR with a changed mode field re-banks the register file;
    /// every other bit is a plain assignment.
    pub fn set_cpsr(&mut self, value: u32) {
        let new_mode = Mode::from_bits(value).unwrap_or(self.mode);
        self.cpsr = value;
        if new_mode != self.mode {
            self.switch_mode(new_mode);
        }
    }

    pub fn flag(&self, bit: PsrBit) -> bool {
        get_bit(self.cpsr, bit as u32)
    }

    pub fn set_flag(&mut self, bit: PsrBit, value: bool) {
        self.cpsr = set_bit(self.cpsr, bit as u32, value);
    }

    pub fn is_thumb(&self) -> bool {
        self.flag(PsrBit::T)
    }

    pub fn spsr(&self) -> u32 {
        self.spsr_bank[self.mode.bank_index()]
    }

    pub fn set_spsr(&mut self, value: u32) {
        if self.mode.has_spsr() {
            self.spsr_bank[self.mode.bank_index()] = value;
        }
    }

    /// Saves the outgoing mode's banked registers and loads the incoming
    /// mode's bank. The outgoing mode's values persist until it is next
    /// activated (tested in `tests::mode_banking_round_trips`).
    pub fn switch_mode(&mut self, new_mode: Mode) {
        if new_mode == self.mode {
            return;
        }
        let old_index = self.mode.bank_index();
        let new_index = new_mode.bank_index();
        self.r13_bank[old_index] = self.r13;
        self.r14_bank[old_index] = self.r14;
        self.r13 = self.r13_bank[new_index];
        self.r14 = self.r14_bank[new_index];
        // r8-r12 need no save/restore step: get()/set() already dispatch to
        // r8_12 or r8_12_fiq based on the active mode, so both banks are
        // always holding their own latest values.
        self.mode = new_mode;
    }

    /// Reads register `n` as the currently-executing instruction sees it.
    /// Does NOT apply the pipeline offset for R15 — callers that need
    /// "PC as an operand" add that separately (see `Cpu::operand_pc`).
    pub fn get(&self, n: usize) -> u32 {
        match n {
            0..=7 => self.r0_7[n],
            8..=12 => {
                if self.mode == Mode::Fiq {
                    self.r8_12_fiq[n - 8]
                } else {
                    self.r8_12[n - 8]
                }
            }
            13 => self.r13,
            14 => self.r14,
            15 => self.pc,
            _ => panic!("invalid register number {}", n),
        }
    }

    pub fn set(&mut self, n: usize, value: u32) {
        match n {
            0..=7 => self.r0_7[n] = value,
            8..=12 => {
                if self.mode == Mode::Fiq {
                    self.r8_12_fiq[n - 8] = value;
                } else {
                    self.r8_12[n - 8] = value;
                }
            }
            13 => self.r13 = value,
            14 => self.r14 = value,
            15 => self.pc = value,
            _ => panic!("invalid register number {}", n),
        }
    }

    /// The *other* bank's view of a register, used by `LDM/STM ^` (user-bank
    /// transfer) which must bypass the currently active FIQ bank.
    pub fn get_user(&self, n: usize) -> u32 {
        match n {
            0..=7 => self.r0_7[n],
            8..=12 => self.r8_12[n - 8],
            13 => {
                if self.mode == Mode::Fiq {
                    self.r13_bank[Mode::User.bank_index()]
                } else {
                    self.r13
                }
            }
            14 => {
                if self.mode == Mode::Fiq {
                    self.r14_bank[Mode::User.bank_index()]
                } else {
                    self.r14
                }
            }
            15 => self.pc,
            _ => panic!("invalid register number {}", n),
        }
    }

    pub fn set_user(&mut self, n: usize, value: u32) {
        match n {
            0..=7 => self.r0_7[n] = value,
            8..=12 => self.r8_12[n - 8] = value,
            13 => {
                if self.mode == Mode::Fiq {
                    self.r13_bank[Mode::User.bank_index()] = value;
                } else {
                    self.r13 = value;
                }
            }
            14 => {
                if self.mode == Mode::Fiq {
                    self.r14_bank[Mode::User.bank_index()] = value;
                } else {
                    self.r14 = value;
                }
            }
            15 => self.pc = value,
            _ => panic!("invalid register number {}", n),
        }
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_banking_round_trips() {
        let mut regs = Registers::new();
        assert_eq!(regs.mode(), Mode::Supervisor);
        regs.set(13, 0xabcd_0000);
        regs.set(14, 0xdead_0000);

        regs.switch_mode(Mode::Irq);
        assert_eq!(regs.get(13), 0);
        assert_eq!(regs.get(14), 0);
        regs.set(13, 0x1111_0000);
        regs.set(14, 0x2222_0000);

        regs.switch_mode(Mode::Supervisor);
        assert_eq!(regs.get(13), 0xabcd_0000);
        assert_eq!(regs.get(14), 0xdead_0000);

        regs.switch_mode(Mode::Irq);
        assert_eq!(regs.get(13), 0x1111_0000);
        assert_eq!(regs.get(14), 0x2222_0000);
    }

    #[test]
    fn fiq_bank_is_private_to_r8_12() {
        let mut regs = Registers::new();
        regs.set(8, 0x1000);
        regs.switch_mode(Mode::Fiq);
        assert_eq!(regs.get(8), 0);
        regs.set(8, 0x2000);
        regs.switch_mode(Mode::Supervisor);
        assert_eq!(regs.get(8), 0x1000);
        regs.switch_mode(Mode::Fiq);
        assert_eq!(regs.get(8), 0x2000);
    }

    #[test]
    fn set_cpsr_with_new_mode_rebanks() {
        let mut regs = Registers::new();
        regs.set(13, 0x5555_0000);
        let mut cpsr = regs.cpsr();
        cpsr = (cpsr & !0x1f) | Mode::Irq.bits();
        regs.set_cpsr(cpsr);
        assert_eq!(regs.mode(), Mode::Irq);
        assert_eq!(regs.get(13), 0);
    }
}
