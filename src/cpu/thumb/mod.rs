// The Thumb (16-bit) instruction set: decode.rs classifies a fetched
// halfword into one of the 19 documented formats, exec.rs carries it out.
// ALU flag computation is shared with the ARM executor via
// `fields::add_with_flags`/`sub_with_flags` so both instruction streams
// agree on flag semantics.

pub mod decode;
pub mod exec;

use crate::cpu::exceptions::Exception;
use crate::cpu::registers::Registers;
use crate::memory::Bus;

pub fn step(registers: &mut Registers, bus: &mut Bus) -> Result<(), Exception> {
    let pc = registers.pc;
    let halfword = bus.read16(pc) as u16;
    if bus.take_fault() {
        return Err(Exception::PrefetchAbort);
    }
    registers.pc = pc.wrapping_add(2);

    let format = decode::decode(halfword)?;
    exec::execute(format, registers, bus, pc)?;
    if bus.take_fault() {
        return Err(Exception::DataAbort);
    }
    Ok(())
}
