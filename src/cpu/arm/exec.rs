// Carries out a decoded ARM instruction. Flag computation reuses
// `fields::add_with_flags`/`sub_with_flags`/`FlagUpdate` so ARM and
// Thumb (cpu/thumb/exec.rs) compute identical results for identical ALU ops.

use super::decode::{DataOp, Instruction, ShifterOperand};
use crate::cpu::exceptions::Exception;
use crate::cpu::registers::Registers;
use crate::fields::{add_with_flags, sub_with_flags, FlagUpdate, PsrBit, Shifted};
use crate::memory::Bus;

fn reg_or_pc(registers: &Registers, n: usize, pc: u32) -> u32 {
    if n == 15 {
        pc.wrapping_add(8)
    } else {
        registers.get(n)
    }
}

fn eval_shifter(operand: ShifterOperand, registers: &Registers, pc: u32) -> Shifted {
    let carry_in = registers.flag(PsrBit::C);
    match operand {
        ShifterOperand::Immediate { rotated, rotate } => {
            let carry = if rotate == 0 { carry_in } else { rotated & 0x8000_0000 != 0 };
            Shifted { value: rotated, carry }
        }
        ShifterOperand::Register { rm, shift, amount_is_register, amount } => {
            let value = reg_or_pc(registers, rm, pc);
            if amount_is_register {
                let amount = registers.get(amount as usize) & 0xff;
                shift.apply_register(value, amount, carry_in)
            } else {
                shift.apply_immediate(value, amount, carry_in)
            }
        }
    }
}

/// Offset magnitude only (addressing computations never care about the
/// shifter's carry-out).
fn eval_offset(operand: ShifterOperand, registers: &Registers, pc: u32) -> u32 {
    eval_shifter(operand, registers, pc).value
}

pub fn execute(instruction: Instruction, registers: &mut Registers, bus: &mut Bus, pc: u32) -> Result<(), Exception> {
    match instruction {
        Instruction::DataProcessing { op, s, rn, rd, operand2 } => {
            exec_data_processing(op, s, rn, rd, operand2, registers, pc)
        }
        Instruction::Multiply { rd, rn, rs, rm, accumulate, s } => {
            let result = registers
                .get(rm)
                .wrapping_mul(registers.get(rs))
                .wrapping_add(if accumulate { registers.get(rn) } else { 0 });
            registers.set(rd, result);
            if s {
                let update = FlagUpdate::logical(result);
                let new_cpsr = update.apply(registers.cpsr());
                registers.set_cpsr(new_cpsr);
            }
            Ok(())
        }
        Instruction::MultiplyLong { rdhi, rdlo, rs, rm, signed, accumulate, s } => {
            let (rm_v, rs_v) = (registers.get(rm), registers.get(rs));
            let product: u64 = if signed {
                ((rm_v as i32 as i64) * (rs_v as i32 as i64)) as u64
            } else {
                (rm_v as u64) * (rs_v as u64)
            };
            let acc = if accumulate { ((registers.get(rdhi) as u64) << 32) | registers.get(rdlo) as u64 } else { 0 };
            let result = product.wrapping_add(acc);
            registers.set(rdlo, result as u32);
            registers.set(rdhi, (result >> 32) as u32);
            if s {
                let n = result & 0x8000_0000_0000_0000 != 0;
                let z = result == 0;
                let update = FlagUpdate { n: Some(n), z: Some(z), c: None, v: None };
                let new_cpsr = update.apply(registers.cpsr());
                registers.set_cpsr(new_cpsr);
            }
            Ok(())
        }
        Instruction::SingleSwap { rn, rd, rm, byte } => {
            let addr = registers.get(rn);
            let loaded = if byte { bus.read8(addr) } else { bus.read32(addr) };
            let store_value = registers.get(rm);
            if byte {
                bus.write8(addr, store_value & 0xff);
            } else {
                bus.write32(addr, store_value);
            }
            registers.set(rd, loaded);
            Ok(())
        }
        Instruction::SingleDataTransfer { rn, rd, offset, load, byte, pre_index, up, writeback } => {
            exec_single_transfer(rn, rd, offset, load, byte, pre_index, up, writeback, registers, bus, pc)
        }
        Instruction::HalfwordTransfer { rn, rd, offset_imm, offset_reg, load, pre_index, up, writeback, signed, half } => {
            exec_halfword_transfer(rn, rd, offset_imm, offset_reg, load, pre_index, up, writeback, signed, half, registers, bus)
        }
        Instruction::BlockTransfer { rn, register_list, load, pre_index, up, writeback, user_bank } => {
            exec_block_transfer(rn, register_list, load, pre_index, up, writeback, user_bank, registers, bus)
        }
        Instruction::Branch { offset, link } => {
            if link {
                registers.set(14, pc.wrapping_add(4));
            }
            registers.pc = pc.wrapping_add(8).wrapping_add(offset as u32);
            Ok(())
        }
        Instruction::BranchExchange { rm } => {
            let target = registers.get(rm);
            registers.set_flag(PsrBit::T, target & 1 != 0);
            registers.pc = target & !1;
            Ok(())
        }
        Instruction::SoftwareInterrupt => Err(Exception::Swi),
        Instruction::Mrs { rd, spsr } => {
            let value = if spsr { registers.spsr() } else { registers.cpsr() };
            registers.set(rd, value);
            Ok(())
        }
        Instruction::MsrRegister { rm, spsr, field_mask } => {
            let value = registers.get(rm);
            apply_msr(registers, value, spsr, field_mask);
            Ok(())
        }
        Instruction::MsrImmediate { rotated, spsr, field_mask } => {
            apply_msr(registers, rotated, spsr, field_mask);
            Ok(())
        }
    }
}

fn apply_msr(registers: &mut Registers, value: u32, spsr: bool, field_mask: u32) {
    if spsr {
        let current = registers.spsr();
        registers.set_spsr((current & !field_mask) | (value & field_mask));
    } else {
        let current = registers.cpsr();
        registers.set_cpsr((current & !field_mask) | (value & field_mask));
    }
}

fn exec_data_processing(
    op: DataOp,
    s: bool,
    rn: usize,
    rd: usize,
    operand2: ShifterOperand,
    registers: &mut Registers,
    pc: u32,
) -> Result<(), Exception> {
    let shifted = eval_shifter(operand2, registers, pc);
    let op1 = reg_or_pc(registers, rn, pc);
    let carry_in = registers.flag(PsrBit::C);

    let (result, update): (u32, FlagUpdate) = match op {
        DataOp::And => (op1 & shifted.value, FlagUpdate::logical_with_carry(op1 & shifted.value, shifted.carry)),
        DataOp::Eor => (op1 ^ shifted.value, FlagUpdate::logical_with_carry(op1 ^ shifted.value, shifted.carry)),
        DataOp::Sub => sub_with_flags(op1, shifted.value, true),
        DataOp::Rsb => sub_with_flags(shifted.value, op1, true),
        DataOp::Add => add_with_flags(op1, shifted.value, false),
        DataOp::Adc => add_with_flags(op1, shifted.value, carry_in),
        DataOp::Sbc => sub_with_flags(op1, shifted.value, carry_in),
        DataOp::Rsc => sub_with_flags(shifted.value, op1, carry_in),
        DataOp::Tst => (op1 & shifted.value, FlagUpdate::logical_with_carry(op1 & shifted.value, shifted.carry)),
        DataOp::Teq => (op1 ^ shifted.value, FlagUpdate::logical_with_carry(op1 ^ shifted.value, shifted.carry)),
        DataOp::Cmp => sub_with_flags(op1, shifted.value, true),
        DataOp::Cmn => add_with_flags(op1, shifted.value, false),
        DataOp::Orr => (op1 | shifted.value, FlagUpdate::logical_with_carry(op1 | shifted.value, shifted.carry)),
        DataOp::Mov => (shifted.value, FlagUpdate::logical_with_carry(shifted.value, shifted.carry)),
        DataOp::Bic => (op1 & !shifted.value, FlagUpdate::logical_with_carry(op1 & !shifted.value, shifted.carry)),
        DataOp::Mvn => (!shifted.value, FlagUpdate::logical_with_carry(!shifted.value, shifted.carry)),
    };

    let is_test = matches!(op, DataOp::Tst | DataOp::Teq | DataOp::Cmp | DataOp::Cmn);
    if !is_test {
        if rd == 15 {
            registers.pc = result;
            if s {
                // Writing PC with S set (in a mode with an SPSR) restores CPSR from SPSR.
                if registers.mode().has_spsr() {
                    let spsr = registers.spsr();
                    registers.set_cpsr(spsr);
                }
            }
            return Ok(());
        }
        registers.set(rd, result);
    }

    if s {
        if rd == 15 {
            // handled above
        } else {
            let new_cpsr = update.apply(registers.cpsr());
            registers.set_cpsr(new_cpsr);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn exec_single_transfer(
    rn: usize,
    rd: usize,
    offset: ShifterOperand,
    load: bool,
    byte: bool,
    pre_index: bool,
    up: bool,
    writeback: bool,
    registers: &mut Registers,
    bus: &mut Bus,
    pc: u32,
) -> Result<(), Exception> {
    let base = if rn == 15 { pc.wrapping_add(8) } else { registers.get(rn) };
    let offset_value = eval_offset(offset, registers, pc);
    let offset_signed = if up { offset_value as i64 } else { -(offset_value as i64) };
    let indexed = (base as i64).wrapping_add(offset_signed) as u32;
    let address = if pre_index { indexed } else { base };

    if load {
        let value = if byte { bus.read8(address) } else { read_word_rotated(bus, address) };
        if rd == 15 {
            registers.pc = value & !1;
        } else {
            registers.set(rd, value);
        }
    } else {
        let value = if rd == 15 { pc.wrapping_add(12) } else { registers.get(rd) };
        if byte {
            bus.write8(address, value & 0xff);
        } else {
            bus.write32(address, value);
        }
    }

    if rn != 15 && (!pre_index || writeback) {
        registers.set(rn, indexed);
    }
    Ok(())
}

/// LDR of a non-word-aligned address rotates the fetched word right by the
/// misalignment (ARM7TDMI-documented behavior), rather than faulting.
fn read_word_rotated(bus: &mut Bus, address: u32) -> u32 {
    let word = bus.read32(address & !3);
    let rotate = (address & 3) * 8;
    word.rotate_right(rotate)
}

#[allow(clippy::too_many_arguments)]
fn exec_halfword_transfer(
    rn: usize,
    rd: usize,
    offset_imm: Option<u32>,
    offset_reg: Option<usize>,
    load: bool,
    pre_index: bool,
    up: bool,
    writeback: bool,
    signed: bool,
    half: bool,
    registers: &mut Registers,
    bus: &mut Bus,
) -> Result<(), Exception> {
    let base = registers.get(rn);
    let offset_value = offset_imm.unwrap_or_else(|| registers.get(offset_reg.unwrap()));
    let offset_signed = if up { offset_value as i64 } else { -(offset_value as i64) };
    let indexed = (base as i64).wrapping_add(offset_signed) as u32;
    let address = if pre_index { indexed } else { base };

    if load {
        let value = if half {
            let raw = bus.read16(address);
            if signed {
                (raw as u16 as i16 as i32) as u32
            } else {
                raw
            }
        } else {
            let raw = bus.read8(address);
            (raw as u8 as i8 as i32) as u32 // LDRSB; unsigned byte load handled by SingleDataTransfer
        };
        registers.set(rd, value);
    } else {
        let value = registers.get(rd);
        bus.write16(address, value & 0xffff);
    }

    if !pre_index || writeback {
        registers.set(rn, indexed);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn exec_block_transfer(
    rn: usize,
    register_list: u16,
    load: bool,
    pre_index: bool,
    up: bool,
    writeback: bool,
    user_bank: bool,
    registers: &mut Registers,
    bus: &mut Bus,
) -> Result<(), Exception> {
    let count = register_list.count_ones().max(1);
    let base = registers.get(rn);
    let new_base = if up { base.wrapping_add(count * 4) } else { base.wrapping_sub(count * 4) };

    // Registers always transfer low-to-high into ascending addresses,
    // regardless of the up/down direction bit - only the base's starting
    // point differs.
    let mut address = match (up, pre_index) {
        (true, true) => base.wrapping_add(4),
        (true, false) => base,
        (false, true) => base.wrapping_sub(count * 4),
        (false, false) => base.wrapping_sub(count * 4).wrapping_add(4),
    };

    for reg in 0..16 {
        if register_list & (1 << reg) == 0 {
            continue;
        }
        if load {
            let value = bus.read32(address);
            if reg == 15 {
                if user_bank {
                    // LDM {...,PC}^: restores CPSR (mode, flags, T bit) from
                    // the current SPSR, the same as the data-processing S-bit
                    // path for MOVS PC,... (see exec_data_processing).
                    if registers.mode().has_spsr() {
                        let spsr = registers.spsr();
                        registers.set_cpsr(spsr);
                    }
                    registers.pc = value;
                } else {
                    registers.pc = value & !1;
                }
            } else if user_bank {
                registers.set_user(reg, value);
            } else {
                registers.set(reg, value);
            }
        } else {
            let value = if user_bank { registers.get_user(reg) } else { registers.get(reg) };
            bus.write32(address, value);
        }
        address = address.wrapping_add(4);
    }

    if writeback {
        registers.set(rn, new_base);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::arm::decode;
    use crate::memory::Bus;

    fn run(words: &[u32], registers: &mut Registers, bus: &mut Bus) {
        for &word in words {
            let instruction = decode::decode(word).expect("decodable");
            execute(instruction, registers, bus, 0).expect("no fault");
        }
    }

    #[test]
    fn data_processing_with_s_clear_leaves_cpsr_unchanged() {
        let mut registers = Registers::new();
        let before = registers.cpsr();
        let mut bus = Bus::new(1024).unwrap();
        run(&[0xe3a0_0001], &mut registers, &mut bus); // MOV R0,#1 (S=0)
        assert_eq!(registers.get(0), 1);
        assert_eq!(registers.cpsr(), before);
    }

    #[test]
    fn cmp_is_a_test_op_and_never_writes_rd() {
        let mut registers = Registers::new();
        registers.set(0, 5);
        let mut bus = Bus::new(1024).unwrap();
        // CMP R0, #5 (opcode 0xa, S implied by the test-op encoding)
        run(&[0xe350_0005], &mut registers, &mut bus);
        assert_eq!(registers.get(0), 5);
        assert!(registers.flag(PsrBit::Z));
    }

    #[test]
    fn store_load_round_trip() {
        // Address 0x40000000 lands in the IRAM region (`memory::region`),
        // not SDRAM - the scenario this is grounded on names "SDRAM" loosely
        // for "plain read-after-write RAM"; the round-trip property holds
        // identically for either backing array.
        let mut registers = Registers::new();
        let mut bus = Bus::new(1024).unwrap();
        let program = [
            0xe3a0_005a, // MOV R0, #0x5a
            0xe3a0_2101, // MOV R2, #0x40000000
            0xe582_0000, // STR R0, [R2]
            0xe592_1000, // LDR R1, [R2]
        ];
        run(&program, &mut registers, &mut bus);
        assert_eq!(registers.get(1), 0x5a);
        assert_eq!(bus.read32(0x4000_0000), 0x5a);
    }

    #[test]
    fn block_transfer_stores_in_ascending_address_order_regardless_of_direction() {
        let mut registers = Registers::new();
        registers.set(0, 0x1111_1111);
        registers.set(1, 0x2222_2222);
        registers.set(13, 0x100); // SP, used as the base
        let mut bus = Bus::new(1024).unwrap();
        // STMDB SP!, {R0,R1} - full descending push, like a Thumb/ARM prologue.
        let instruction = decode::decode(0xe92d_0003).expect("decodable");
        execute(instruction, &mut registers, &mut bus, 0).unwrap();
        assert_eq!(registers.get(13), 0xf8);
        assert_eq!(bus.read32(0xf8), 0x1111_1111);
        assert_eq!(bus.read32(0xfc), 0x2222_2222);
    }

    #[test]
    fn ldm_with_pc_and_s_bit_restores_cpsr_from_spsr() {
        use crate::fields::Mode;
        // Simulate returning from an IRQ handler: SPSR holds the
        // interrupted mode's CPSR.
        let mut registers = Registers::new();
        registers.switch_mode(Mode::Irq);
        registers.set_spsr(Mode::User.bits());
        registers.set(13, 0x200); // SP
        let mut bus = Bus::new(1024).unwrap();
        bus.write32(0x200, 0x4000);

        // LDMFD SP!, {PC}^
        let instruction = decode::decode(0xe8fd_8000).expect("decodable");
        execute(instruction, &mut registers, &mut bus, 0).unwrap();

        assert_eq!(registers.pc, 0x4000);
        assert_eq!(registers.mode(), Mode::User);
        assert_eq!(registers.get(13), 0x204);
    }
}
