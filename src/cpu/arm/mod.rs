// The ARM (32-bit) instruction set: decode.rs classifies a fetched word,
// exec.rs carries out the classified instruction.

pub mod decode;
pub mod exec;

use crate::cpu::exceptions::Exception;
use crate::cpu::registers::Registers;
use crate::memory::Bus;

pub fn step(registers: &mut Registers, bus: &mut Bus) -> Result<(), Exception> {
    let pc = registers.pc;
    let word = bus.read32(pc);
    if bus.take_fault() {
        return Err(Exception::PrefetchAbort);
    }
    registers.pc = pc.wrapping_add(4);

    let cond = decode::condition(word);
    if !cond.evaluate(
        registers.flag(crate::fields::PsrBit::N),
        registers.flag(crate::fields::PsrBit::Z),
        registers.flag(crate::fields::PsrBit::C),
        registers.flag(crate::fields::PsrBit::V),
    ) {
        return Ok(());
    }

    let instruction = decode::decode(word)?;
    exec::execute(instruction, registers, bus, pc)?;
    if bus.take_fault() {
        return Err(Exception::DataAbort);
    }
    Ok(())
}
