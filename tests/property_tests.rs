// Property-based coverage for the shifter-operand, flag-computation and
// register-banking invariants that hold universally ("for every mode m...",
// "for every address A and value V..."). Concrete example-based scenarios
// live next to the code they exercise (`cpu::arm::exec::tests`,
// `devices::ata::tests`, etc.); these complement them with randomized
// inputs.

use pp5021c_sim::cpu::registers::Registers;
use pp5021c_sim::fields::{self, Mode, PsrBit, ShiftKind};
use pp5021c_sim::memory::Bus;
use proptest::prelude::*;

const MODES: [Mode; 7] =
    [Mode::User, Mode::Fiq, Mode::Irq, Mode::Supervisor, Mode::Abort, Mode::Undefined, Mode::System];

proptest! {
    #[test]
    fn add_with_flags_carry_matches_u64_reference(a: u32, b: u32, carry_in: bool) {
        let (result, update) = fields::add_with_flags(a, b, carry_in);
        let wide = a as u64 + b as u64 + carry_in as u64;
        prop_assert_eq!(result, wide as u32);
        prop_assert_eq!(update.c, Some(wide > u32::MAX as u64));

        let signed_overflow = {
            let a = a as i32 as i64;
            let b = b as i32 as i64;
            let r = a + b + carry_in as i64;
            !(i32::MIN as i64..=i32::MAX as i64).contains(&r)
        };
        prop_assert_eq!(update.v, Some(signed_overflow));
    }

    #[test]
    fn sub_with_flags_matches_u64_reference(a: u32, b: u32, carry_in: bool) {
        let (result, update) = fields::sub_with_flags(a, b, carry_in);
        let borrow_in = !carry_in as i64;
        let wide = a as i64 - b as i64 - borrow_in;
        prop_assert_eq!(result, wide as u32);
        prop_assert_eq!(update.c, Some(wide >= 0));
    }

    #[test]
    fn lsl_register_amount_matches_reference_shift(value: u32, amount in 0u32..40, carry_in: bool) {
        let shifted = ShiftKind::Lsl.apply_register(value, amount, carry_in);
        let expected = if amount == 0 {
            value
        } else if amount < 32 {
            value << amount
        } else {
            0
        };
        prop_assert_eq!(shifted.value, expected);
    }

    #[test]
    fn ror_register_amount_is_equivalent_to_rotate_right_mod_32(value: u32, amount in 0u32..64, carry_in: bool) {
        let shifted = ShiftKind::Ror.apply_register(value, amount, carry_in);
        if amount == 0 {
            prop_assert_eq!(shifted.value, value);
        } else {
            prop_assert_eq!(shifted.value, value.rotate_right(amount % 32));
        }
    }

    #[test]
    fn mode_banking_round_trips_for_every_mode_pair(
        start in 0usize..7,
        target in 0usize..7,
        r13 in any::<u32>(),
        r14 in any::<u32>(),
    ) {
        let mut regs = Registers::new();
        regs.switch_mode(MODES[start]);
        regs.set(13, r13);
        regs.set(14, r14);

        regs.switch_mode(MODES[target]);
        // User and System share a bank, so switching between them must not
        // clobber the value just written.
        let shares_bank = MODES[start].bank_index() == MODES[target].bank_index();
        if shares_bank {
            prop_assert_eq!(regs.get(13), r13);
            prop_assert_eq!(regs.get(14), r14);
        }

        regs.switch_mode(MODES[start]);
        prop_assert_eq!(regs.get(13), r13);
        prop_assert_eq!(regs.get(14), r14);
    }

    #[test]
    fn sdram_write_read_round_trips(offset in 0u32..1024, value: u32) {
        let mut bus = Bus::new(4096).unwrap();
        let addr = 0x1000_0000 + (offset & !3);
        bus.write32(addr, value);
        prop_assert_eq!(bus.read32(addr), value);
    }
}

#[test]
fn fiq_mode_does_not_share_a_bank_with_any_other_mode() {
    for other in MODES.iter().filter(|m| **m != Mode::Fiq) {
        assert_ne!(Mode::Fiq.bank_index(), other.bank_index());
    }
}

#[test]
fn flag_bit_round_trips_through_a_registers_cpsr() {
    let mut regs = Registers::new();
    for bit in [PsrBit::N, PsrBit::Z, PsrBit::C, PsrBit::V, PsrBit::I, PsrBit::F, PsrBit::T] {
        regs.set_flag(bit, true);
        assert!(regs.flag(bit));
        regs.set_flag(bit, false);
        assert!(!regs.flag(bit));
    }
}
