// Exception entry/return as a pure function of (old CPSR, exception) ->
// (new CPSR, banked-register writes, PC). The register file applies the
// diff; this module only computes it, which keeps cycle-accounting
// orthogonal to the state transition.

use crate::fields::{set_bit, Mode, PsrBit};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Exception {
    Reset,
    Undefined,
    Swi,
    PrefetchAbort,
    DataAbort,
    Irq,
    Fiq,
}

impl Exception {
    pub fn target_mode(&self) -> Mode {
        match self {
            Exception::Reset => Mode::Supervisor,
            Exception::Undefined => Mode::Undefined,
            Exception::Swi => Mode::Supervisor,
            Exception::PrefetchAbort => Mode::Abort,
            Exception::DataAbort => Mode::Abort,
            Exception::Irq => Mode::Irq,
            Exception::Fiq => Mode::Fiq,
        }
    }

    pub fn vector(&self) -> u32 {
        match self {
            Exception::Reset => 0x00,
            Exception::Undefined => 0x04,
            Exception::Swi => 0x08,
            Exception::PrefetchAbort => 0x0c,
            Exception::DataAbort => 0x10,
            Exception::Irq => 0x18,
            Exception::Fiq => 0x1c,
        }
    }

    /// Offset subtracted from PC (which already carries the pipeline lead)
    /// to compute the return address written to the new mode's LR.
    pub fn return_offset(&self, thumb: bool) -> u32 {
        match self {
            Exception::Reset => 0,
            Exception::Undefined => if thumb { 2 } else { 4 },
            Exception::Swi => if thumb { 2 } else { 4 },
            Exception::PrefetchAbort => 4,
            Exception::DataAbort => 8,
            Exception::Irq => 4,
            Exception::Fiq => 4,
        }
    }

    pub fn sets_fiq_mask(&self) -> bool {
        matches!(self, Exception::Reset | Exception::Fiq)
    }

    /// 3 cycles for every exception entry, acceptable for a
    /// functional (non-cycle-accurate) model.
    pub const ENTRY_CYCLES: u32 = 3;
}

/// The computed effect of taking an exception: what the new CPSR, SPSR, LR
/// and PC become. Applying it is a couple of register-file writes.
pub struct ExceptionEntry {
    pub new_mode: Mode,
    pub new_cpsr: u32,
    pub new_spsr: u32,
    pub new_lr: u32,
    pub new_pc: u32,
}

pub fn enter(exception: Exception, old_cpsr: u32, pc_at_fetch: u32) -> ExceptionEntry {
    let thumb = crate::fields::get_bit(old_cpsr, PsrBit::T as u32);
    let return_address = pc_at_fetch.wrapping_sub(exception.return_offset(thumb));
    let new_mode = exception.target_mode();

    let mut new_cpsr = old_cpsr;
    new_cpsr = (new_cpsr & !0x1f) | new_mode.bits();
    new_cpsr = set_bit(new_cpsr, PsrBit::I as u32, true);
    if exception.sets_fiq_mask() {
        new_cpsr = set_bit(new_cpsr, PsrBit::F as u32, true);
    }
    new_cpsr = set_bit(new_cpsr, PsrBit::T as u32, false);

    ExceptionEntry {
        new_mode,
        new_cpsr,
        new_spsr: old_cpsr,
        new_lr: return_address,
        new_pc: exception.vector(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::get_bit;

    #[test]
    fn irq_entry_from_user_mode() {
        let old_cpsr = Mode::User.bits(); // I and T both clear
        let entry = enter(Exception::Irq, old_cpsr, 0x1000);

        assert_eq!(entry.new_mode, Mode::Irq);
        assert_eq!(entry.new_pc, 0x18);
        assert_eq!(entry.new_lr, 0xffc);
        assert_eq!(entry.new_spsr, old_cpsr);
        assert!(get_bit(entry.new_cpsr, PsrBit::I as u32));
        assert!(!get_bit(entry.new_cpsr, PsrBit::F as u32));
        assert!(!get_bit(entry.new_cpsr, PsrBit::T as u32));
    }

    #[test]
    fn reset_and_fiq_also_set_the_fiq_mask() {
        let old_cpsr = Mode::User.bits();
        for exception in [Exception::Reset, Exception::Fiq] {
            let entry = enter(exception, old_cpsr, 0);
            assert!(get_bit(entry.new_cpsr, PsrBit::F as u32));
        }
        let entry = enter(Exception::Swi, old_cpsr, 0);
        assert!(!get_bit(entry.new_cpsr, PsrBit::F as u32));
    }

    #[test]
    fn thumb_return_offsets_are_halved_for_undef_and_swi() {
        let mut old_cpsr = Mode::User.bits();
        old_cpsr = set_bit(old_cpsr, PsrBit::T as u32, true);
        let entry = enter(Exception::Swi, old_cpsr, 0x100);
        assert_eq!(entry.new_lr, 0xfe);
    }
}
