// Carries out a decoded Thumb format. ALU flag computation reuses the
// same `fields::add_with_flags`/`sub_with_flags`/`FlagUpdate` primitives
// as the ARM executor.

use super::decode::{AddSubOperand, AluOp, HiOp, ImmediateOp, ThumbFormat};
use crate::cpu::exceptions::Exception;
use crate::cpu::registers::Registers;
use crate::fields::{add_with_flags, sub_with_flags, FlagUpdate, PsrBit, ShiftKind};
use crate::memory::Bus;

fn set_logical_flags(registers: &mut Registers, result: u32, carry: Option<bool>) {
    let update = FlagUpdate {
        n: Some(result & 0x8000_0000 != 0),
        z: Some(result == 0),
        c: carry,
        v: None,
    };
    let new_cpsr = update.apply(registers.cpsr());
    registers.set_cpsr(new_cpsr);
}

fn set_arith_flags(registers: &mut Registers, update: FlagUpdate) {
    let new_cpsr = update.apply(registers.cpsr());
    registers.set_cpsr(new_cpsr);
}

pub fn execute(format: ThumbFormat, registers: &mut Registers, bus: &mut Bus, pc: u32) -> Result<(), Exception> {
    match format {
        ThumbFormat::MoveShifted { shift, amount, rs, rd } => {
            let carry_in = registers.flag(PsrBit::C);
            let shifted = shift.apply_immediate(registers.get(rs), amount, carry_in);
            registers.set(rd, shifted.value);
            set_logical_flags(registers, shifted.value, Some(shifted.carry));
            Ok(())
        }
        ThumbFormat::AddSubtract { rd, rs, operand, subtract } => {
            let op1 = registers.get(rs);
            let op2 = match operand {
                AddSubOperand::Register(r) => registers.get(r),
                AddSubOperand::Immediate3(imm) => imm,
            };
            let (result, update) = if subtract { sub_with_flags(op1, op2, true) } else { add_with_flags(op1, op2, false) };
            registers.set(rd, result);
            set_arith_flags(registers, update);
            Ok(())
        }
        ThumbFormat::ImmediateOp { rd, op, imm } => {
            let current = registers.get(rd);
            match op {
                ImmediateOp::Mov => {
                    registers.set(rd, imm);
                    set_logical_flags(registers, imm, None);
                }
                ImmediateOp::Cmp => {
                    let (_, update) = sub_with_flags(current, imm, true);
                    set_arith_flags(registers, update);
                }
                ImmediateOp::Add => {
                    let (result, update) = add_with_flags(current, imm, false);
                    registers.set(rd, result);
                    set_arith_flags(registers, update);
                }
                ImmediateOp::Sub => {
                    let (result, update) = sub_with_flags(current, imm, true);
                    registers.set(rd, result);
                    set_arith_flags(registers, update);
                }
            }
            Ok(())
        }
        ThumbFormat::AluOperation { op, rd, rs } => exec_alu(op, rd, rs, registers),
        ThumbFormat::HiRegisterOp { op, rd, rs } => exec_hi_register(op, rd, rs, registers, pc),
        ThumbFormat::PcRelativeLoad { rd, imm } => {
            let base = (pc.wrapping_add(4)) & !3;
            registers.set(rd, bus.read32(base.wrapping_add(imm)));
            Ok(())
        }
        ThumbFormat::LoadStoreRegisterOffset { load, byte, rd, rb, ro } => {
            let address = registers.get(rb).wrapping_add(registers.get(ro));
            if load {
                let value = if byte { bus.read8(address) } else { bus.read32(address) };
                registers.set(rd, value);
            } else {
                let value = registers.get(rd);
                if byte {
                    bus.write8(address, value & 0xff);
                } else {
                    bus.write32(address, value);
                }
            }
            Ok(())
        }
        ThumbFormat::LoadStoreSignExtended { h, sign_extend, rd, rb, ro } => {
            let address = registers.get(rb).wrapping_add(registers.get(ro));
            if !sign_extend {
                if h {
                    registers.set(rd, bus.read16(address));
                } else {
                    let value = registers.get(rd);
                    bus.write16(address, value & 0xffff);
                }
            } else if h {
                let raw = bus.read16(address);
                registers.set(rd, (raw as u16 as i16 as i32) as u32);
            } else {
                let raw = bus.read8(address);
                registers.set(rd, (raw as u8 as i8 as i32) as u32);
            }
            Ok(())
        }
        ThumbFormat::LoadStoreImmediateOffset { load, byte, rd, rb, imm } => {
            let scaled = if byte { imm } else { imm << 2 };
            let address = registers.get(rb).wrapping_add(scaled);
            if load {
                let value = if byte { bus.read8(address) } else { bus.read32(address) };
                registers.set(rd, value);
            } else {
                let value = registers.get(rd);
                if byte {
                    bus.write8(address, value & 0xff);
                } else {
                    bus.write32(address, value);
                }
            }
            Ok(())
        }
        ThumbFormat::LoadStoreHalfword { load, rd, rb, imm } => {
            let address = registers.get(rb).wrapping_add(imm);
            if load {
                registers.set(rd, bus.read16(address));
            } else {
                let value = registers.get(rd);
                bus.write16(address, value & 0xffff);
            }
            Ok(())
        }
        ThumbFormat::SpRelativeLoadStore { load, rd, imm } => {
            let address = registers.get(13).wrapping_add(imm);
            if load {
                registers.set(rd, bus.read32(address));
            } else {
                bus.write32(address, registers.get(rd));
            }
            Ok(())
        }
        ThumbFormat::LoadAddress { sp, rd, imm } => {
            let base = if sp { registers.get(13) } else { (pc.wrapping_add(4)) & !3 };
            registers.set(rd, base.wrapping_add(imm));
            Ok(())
        }
        ThumbFormat::AddOffsetToSp { imm } => {
            let sp = registers.get(13);
            registers.set(13, (sp as i64 + imm as i64) as u32);
            Ok(())
        }
        ThumbFormat::PushPop { pop, store_lr_or_load_pc, register_list } => {
            exec_push_pop(pop, store_lr_or_load_pc, register_list, registers, bus)
        }
        ThumbFormat::MultipleLoadStore { load, rb, register_list } => {
            let mut address = registers.get(rb);
            for reg in 0..8 {
                if register_list & (1 << reg) == 0 {
                    continue;
                }
                if load {
                    registers.set(reg, bus.read32(address));
                } else {
                    bus.write32(address, registers.get(reg));
                }
                address = address.wrapping_add(4);
            }
            registers.set(rb, address);
            Ok(())
        }
        ThumbFormat::ConditionalBranch { cond, offset } => {
            if cond.evaluate(registers.flag(PsrBit::N), registers.flag(PsrBit::Z), registers.flag(PsrBit::C), registers.flag(PsrBit::V)) {
                registers.pc = (pc.wrapping_add(4) as i64 + offset as i64) as u32;
            }
            Ok(())
        }
        ThumbFormat::SoftwareInterrupt => Err(Exception::Swi),
        ThumbFormat::UnconditionalBranch { offset } => {
            registers.pc = (pc.wrapping_add(4) as i64 + offset as i64) as u32;
            Ok(())
        }
        ThumbFormat::LongBranchLinkHigh { offset } => {
            let target = (pc.wrapping_add(4) as i64 + offset as i64) as u32;
            registers.set(14, target);
            Ok(())
        }
        ThumbFormat::LongBranchLinkLow { offset } => {
            let lr = registers.get(14);
            let next_instruction = pc.wrapping_add(2) | 1;
            registers.pc = lr.wrapping_add(offset as u32);
            registers.set(14, next_instruction);
            Ok(())
        }
    }
}

fn exec_alu(op: AluOp, rd: usize, rs: usize, registers: &mut Registers) -> Result<(), Exception> {
    let op1 = registers.get(rd);
    let op2 = registers.get(rs);
    let carry_in = registers.flag(PsrBit::C);
    match op {
        AluOp::And => {
            let r = op1 & op2;
            registers.set(rd, r);
            set_logical_flags(registers, r, None);
        }
        AluOp::Eor => {
            let r = op1 ^ op2;
            registers.set(rd, r);
            set_logical_flags(registers, r, None);
        }
        AluOp::Lsl => {
            let shifted = ShiftKind::Lsl.apply_register(op1, op2 & 0xff, carry_in);
            registers.set(rd, shifted.value);
            set_logical_flags(registers, shifted.value, Some(shifted.carry));
        }
        AluOp::Lsr => {
            let shifted = ShiftKind::Lsr.apply_register(op1, op2 & 0xff, carry_in);
            registers.set(rd, shifted.value);
            set_logical_flags(registers, shifted.value, Some(shifted.carry));
        }
        AluOp::Asr => {
            let shifted = ShiftKind::Asr.apply_register(op1, op2 & 0xff, carry_in);
            registers.set(rd, shifted.value);
            set_logical_flags(registers, shifted.value, Some(shifted.carry));
        }
        AluOp::Adc => {
            let (result, update) = add_with_flags(op1, op2, carry_in);
            registers.set(rd, result);
            set_arith_flags(registers, update);
        }
        AluOp::Sbc => {
            let (result, update) = sub_with_flags(op1, op2, carry_in);
            registers.set(rd, result);
            set_arith_flags(registers, update);
        }
        AluOp::Ror => {
            let shifted = ShiftKind::Ror.apply_register(op1, op2 & 0xff, carry_in);
            registers.set(rd, shifted.value);
            set_logical_flags(registers, shifted.value, Some(shifted.carry));
        }
        AluOp::Tst => {
            let r = op1 & op2;
            set_logical_flags(registers, r, None);
        }
        AluOp::Neg => {
            let (result, update) = sub_with_flags(0, op2, true);
            registers.set(rd, result);
            set_arith_flags(registers, update);
        }
        AluOp::Cmp => {
            let (_, update) = sub_with_flags(op1, op2, true);
            set_arith_flags(registers, update);
        }
        AluOp::Cmn => {
            let (_, update) = add_with_flags(op1, op2, false);
            set_arith_flags(registers, update);
        }
        AluOp::Orr => {
            let r = op1 | op2;
            registers.set(rd, r);
            set_logical_flags(registers, r, None);
        }
        AluOp::Mul => {
            let r = op1.wrapping_mul(op2);
            registers.set(rd, r);
            set_logical_flags(registers, r, None);
        }
        AluOp::Bic => {
            let r = op1 & !op2;
            registers.set(rd, r);
            set_logical_flags(registers, r, None);
        }
        AluOp::Mvn => {
            let r = !op2;
            registers.set(rd, r);
            set_logical_flags(registers, r, None);
        }
    }
    Ok(())
}

fn exec_hi_register(op: HiOp, rd: usize, rs: usize, registers: &mut Registers, pc: u32) -> Result<(), Exception> {
    let read = |registers: &Registers, n: usize| if n == 15 { pc.wrapping_add(4) & !1 } else { registers.get(n) };
    match op {
        HiOp::Add => {
            let result = read(registers, rd).wrapping_add(read(registers, rs));
            if rd == 15 {
                registers.pc = result & !1;
            } else {
                registers.set(rd, result);
            }
        }
        HiOp::Cmp => {
            let (_, update) = sub_with_flags(read(registers, rd), read(registers, rs), true);
            set_arith_flags(registers, update);
        }
        HiOp::Mov => {
            let value = read(registers, rs);
            if rd == 15 {
                registers.pc = value & !1;
            } else {
                registers.set(rd, value);
            }
        }
        HiOp::Bx => {
            let target = read(registers, rs);
            registers.set_flag(PsrBit::T, target & 1 != 0);
            registers.pc = target & !1;
        }
    }
    Ok(())
}

fn exec_push_pop(pop: bool, store_lr_or_load_pc: bool, register_list: u8, registers: &mut Registers, bus: &mut Bus) -> Result<(), Exception> {
    if pop {
        let mut address = registers.get(13);
        for reg in 0..8 {
            if register_list & (1 << reg) == 0 {
                continue;
            }
            registers.set(reg, bus.read32(address));
            address = address.wrapping_add(4);
        }
        if store_lr_or_load_pc {
            let value = bus.read32(address);
            registers.pc = value & !1;
            address = address.wrapping_add(4);
        }
        registers.set(13, address);
    } else {
        let count = register_list.count_ones() + if store_lr_or_load_pc { 1 } else { 0 };
        let mut address = registers.get(13).wrapping_sub(count * 4);
        registers.set(13, address);
        for reg in 0..8 {
            if register_list & (1 << reg) == 0 {
                continue;
            }
            bus.write32(address, registers.get(reg));
            address = address.wrapping_add(4);
        }
        if store_lr_or_load_pc {
            bus.write32(address, registers.get(14));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> Bus {
        Bus::new(4096).unwrap()
    }

    #[test]
    fn push_pop_round_trip_restores_registers_and_sp() {
        let mut registers = Registers::new();
        registers.set(13, 0x200);
        registers.set(0, 0x1111_1111);
        registers.set(1, 0x2222_2222);
        registers.set(14, 0xdead_beef);
        let mut bus = bus();

        execute(ThumbFormat::PushPop { pop: false, store_lr_or_load_pc: true, register_list: 0b0000_0011 }, &mut registers, &mut bus, 0)
            .unwrap();
        assert_eq!(registers.get(13), 0x200 - 12);

        registers.set(0, 0);
        registers.set(1, 0);
        execute(ThumbFormat::PushPop { pop: true, store_lr_or_load_pc: true, register_list: 0b0000_0011 }, &mut registers, &mut bus, 0)
            .unwrap();
        assert_eq!(registers.get(0), 0x1111_1111);
        assert_eq!(registers.get(1), 0x2222_2222);
        assert_eq!(registers.pc, 0xdead_beee); // low bit masked off
        assert_eq!(registers.get(13), 0x200);
    }

    #[test]
    fn bx_into_arm_mode_clears_the_thumb_bit() {
        let mut registers = Registers::new();
        registers.set_flag(PsrBit::T, true);
        registers.set(1, 0x8000);
        let mut bus = bus();
        execute(ThumbFormat::HiRegisterOp { op: HiOp::Bx, rd: 0, rs: 1 }, &mut registers, &mut bus, 0).unwrap();
        assert_eq!(registers.pc, 0x8000);
        assert!(!registers.flag(PsrBit::T));
    }

    #[test]
    fn alu_and_clears_flags_register_without_carry_change() {
        let mut registers = Registers::new();
        registers.set(0, 0xff);
        registers.set(1, 0x0f);
        registers.set_flag(PsrBit::C, true);
        let mut bus = bus();
        execute(ThumbFormat::AluOperation { op: AluOp::And, rd: 0, rs: 1 }, &mut registers, &mut bus, 0).unwrap();
        assert_eq!(registers.get(0), 0x0f);
        assert!(!registers.flag(PsrBit::Z));
        assert!(registers.flag(PsrBit::C)); // AND doesn't touch carry (None passed through)
    }

    #[test]
    fn conditional_branch_not_taken_leaves_pc_untouched_by_the_executor() {
        let mut registers = Registers::new();
        registers.pc = 0x100;
        let before = registers.pc;
        let mut bus = bus();
        // NE condition, but Z flag set means "taken" is false.
        registers.set_flag(PsrBit::Z, true);
        execute(ThumbFormat::ConditionalBranch { cond: crate::fields::Condition::Ne, offset: 16 }, &mut registers, &mut bus, before)
            .unwrap();
        assert_eq!(registers.pc, before);
    }
}
