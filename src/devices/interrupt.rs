// Interrupt controller: per-source pending/enable bits and an FIQ-vs-IRQ
// priority map. Offsets below are a PP5021-style register layout; only
// the read-back semantics are fixed, not exact offsets, so this is a
// concrete, self-consistent choice rather than a transcription of a
// datasheet.

use crate::fields::Size;

const STATUS_IRQ: u32 = 0x00; // read: pending & enabled & !priority (IRQ sources)
const STATUS_FIQ: u32 = 0x04; // read: pending & enabled & priority (FIQ sources)
const PENDING: u32 = 0x08; // read: raw pending bits; write: clears the written bits
const ENABLE: u32 = 0x0c; // read/write: per-source enable mask
const PRIORITY: u32 = 0x10; // read/write: 1 = source routed to FIQ, 0 = IRQ

pub struct InterruptController {
    pending: u32,
    enable: u32,
    priority: u32,
}

impl InterruptController {
    pub fn new() -> Self {
        InterruptController { pending: 0, enable: 0, priority: 0 }
    }

    /// A peripheral (timer, ATA, ...) asserts its line by setting its bit.
    pub fn assert(&mut self, source_bit: u32) {
        self.pending |= 1 << source_bit;
    }

    pub fn has_pending_irq(&self) -> bool {
        self.pending & self.enable & !self.priority != 0
    }

    pub fn has_pending_fiq(&self) -> bool {
        self.pending & self.enable & self.priority != 0
    }

    pub fn read(&self, offset: u32, size: Size) -> u32 {
        let word_offset = offset & !3;
        let word = match word_offset {
            STATUS_IRQ => self.pending & self.enable & !self.priority,
            STATUS_FIQ => self.pending & self.enable & self.priority,
            PENDING => self.pending,
            ENABLE => self.enable,
            PRIORITY => self.priority,
            _ => 0,
        };
        narrow(word, offset, size)
    }

    pub fn write(&mut self, offset: u32, size: Size, value: u32) {
        let word_offset = offset & !3;
        match word_offset {
            PENDING => {
                let clear_mask = merge(0, offset, size, value);
                self.pending &= !clear_mask;
            }
            ENABLE => self.enable = merge(self.enable, offset, size, value),
            PRIORITY => self.priority = merge(self.priority, offset, size, value),
            _ => {}
        }
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

fn narrow(word: u32, address: u32, size: Size) -> u32 {
    let shift = (address & 3) * 8;
    (word >> shift) & size.mask()
}

fn merge(word: u32, address: u32, size: Size, value: u32) -> u32 {
    let shift = (address & 3) * 8;
    let mask = size.mask() << shift;
    (word & !mask) | ((value << shift) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_and_enable_raises_irq() {
        let mut ic = InterruptController::new();
        ic.write(ENABLE, Size::Word, 1 << 3);
        assert!(!ic.has_pending_irq());
        ic.assert(3);
        assert!(ic.has_pending_irq());
        assert!(!ic.has_pending_fiq());
    }

    #[test]
    fn priority_routes_to_fiq() {
        let mut ic = InterruptController::new();
        ic.write(ENABLE, Size::Word, 1 << 3);
        ic.write(PRIORITY, Size::Word, 1 << 3);
        ic.assert(3);
        assert!(ic.has_pending_fiq());
        assert!(!ic.has_pending_irq());
    }

    #[test]
    fn clear_offset_clears_pending() {
        let mut ic = InterruptController::new();
        ic.write(ENABLE, Size::Word, 1 << 3);
        ic.assert(3);
        ic.write(PENDING, Size::Word, 1 << 3);
        assert!(!ic.has_pending_irq());
    }
}
