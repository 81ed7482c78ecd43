// Peripherals the memory bus routes to. Most of the address space below
// 0x70000000 is occupied by registers nobody but firmware's bring-up code
// ever reads meaningfully; those get the generic `StubRegisterFile`, a
// fallback stub that keeps a 256-word register array per region to make
// reads return-what-was-written. The handful of peripherals with real
// cross-processor or interrupt-driving semantics — interrupt controller,
// timers, mailbox, ATA — get their own module.

pub mod ata;
pub mod disk;
pub mod interrupt;
pub mod mailbox;
pub mod timer;

use crate::fields::Size;

/// Read-what-you-wrote register file backing peripherals that otherwise
/// have no documented semantics. 256 32-bit words, word-granularity RMW
/// for sub-word accesses, matching the bus's access-width rule for
/// peripheral regions.
pub struct StubRegisterFile {
    words: [u32; 256],
}

impl StubRegisterFile {
    pub fn new() -> Self {
        StubRegisterFile { words: [0; 256] }
    }

    fn index(offset: u32) -> usize {
        ((offset & 0x3ff) / 4) as usize
    }

    pub fn read(&self, offset: u32, size: Size) -> u32 {
        let word = self.words[Self::index(offset)];
        narrow(word, offset, size)
    }

    pub fn write(&mut self, offset: u32, size: Size, value: u32) {
        let idx = Self::index(offset);
        self.words[idx] = merge(self.words[idx], offset, size, value);
    }
}

impl Default for StubRegisterFile {
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

/// Device-Init region: a few offsets return canonical PP5021C
/// identification bytes; everything else falls through to a stub
/// register file.
pub struct DeviceInit {
    stub: StubRegisterFile,
}

const CHIP_VERSION_OFFSET: u32 = 0x00;
const DEVICE_ENABLE_OFFSET: u32 = 0x04;
const READY_STATUS_OFFSET: u32 = 0x08;

const CHIP_VERSION: u32 = 0x0021_0c01; // PP5021C, stepping C
const DEVICE_ENABLE_ALL: u32 = 0xffff_ffff;
const READY_STATUS_BIT: u32 = 1;

impl DeviceInit {
    pub fn new() -> Self {
        DeviceInit { stub: StubRegisterFile::new() }
    }

    pub fn read(&self, offset: u32, size: Size) -> u32 {
        let word_offset = offset & !3;
        let word = match word_offset {
            CHIP_VERSION_OFFSET => CHIP_VERSION,
            DEVICE_ENABLE_OFFSET => DEVICE_ENABLE_ALL,
            READY_STATUS_OFFSET => READY_STATUS_BIT,
            _ => return self.stub.read(offset, size),
        };
        narrow(word, offset, size)
    }

    pub fn write(&mut self, offset: u32, size: Size, value: u32) {
        self.stub.write(offset, size, value);
    }
}

impl Default for DeviceInit {
    fn default() -> Self {
        Self::new()
    }
}
