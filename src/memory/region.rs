// The address-space partition table. Lookup is a linear scan over a
// short, disjoint table - effectively O(1) given the small, fixed number
// of regions - keyed by a region *kind* rather than a trait object, since
// several kinds need bespoke bit-exact behavior (ROM overlay, mailbox
// sticky bits) that a generic Device cannot express without reaching
// back into Bus state.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegionKind {
    BootRom,
    Sdram,
    Lcd,
    Iram,
    ProcessorId,
    Mailbox,
    InterruptCtrl,
    Timers,
    SystemCtrl,
    HwAccel,
    CacheCtrl,
    Dma,
    Gpio,
    DeviceInit,
    Gpo32,
    I2s,
    I2c,
    ClickWheel,
    LcdBridge,
    Ata,
    FlashCtrl,
    Unmapped,
}

pub struct RegionTable {
    sdram_top: u32,
}

impl RegionTable {
    pub fn new(sdram_bytes: u32) -> Self {
        RegionTable { sdram_top: 0x1000_0000 + sdram_bytes }
    }

    pub fn classify(&self, addr: u32) -> RegionKind {
        match addr {
            0x0000_0000..=0x0001_ffff => RegionKind::BootRom,
            a if a >= 0x1000_0000 && a < self.sdram_top => RegionKind::Sdram,
            0x2000_0000..=0x2001_ffff => RegionKind::Lcd,
            0x4000_0000..=0x4001_7fff => RegionKind::Iram,
            0x6000_0000..=0x6000_0fff => RegionKind::ProcessorId,
            0x6000_1000..=0x6000_1fff => RegionKind::Mailbox,
            0x6000_3000..=0x6000_3fff => RegionKind::HwAccel,
            0x6000_4000..=0x6000_41ff => RegionKind::InterruptCtrl,
            0x6000_5000..=0x6000_503f => RegionKind::Timers,
            0x6000_6000..=0x6000_7fff => RegionKind::SystemCtrl,
            0x6000_a000..=0x6000_bfff => RegionKind::Dma,
            0x6000_c000..=0x6000_cfff => RegionKind::CacheCtrl,
            0x6000_d000..=0x6000_d2ff => RegionKind::Gpio,
            0x7000_0000..=0x7000_007f => RegionKind::DeviceInit,
            0x7000_0080..=0x7000_00ff => RegionKind::Gpo32,
            0x7000_0100..=0x7000_017f => RegionKind::I2s,
            0x7000_0180..=0x7000_01ff => RegionKind::I2c,
            0x7000_0200..=0x7000_027f => RegionKind::ClickWheel,
            0x7000_0280..=0x7000_02ff => RegionKind::LcdBridge,
            0xc300_0000..=0xc300_03ff => RegionKind::Ata,
            0xf000_f000..=0xf000_f0ff => RegionKind::FlashCtrl,
            _ => RegionKind::Unmapped,
        }
    }

    /// Encoded-address translation: a top byte of 0x04 lets firmware
    /// reference its image by file offset into SDRAM.
    pub fn translate(addr: u32) -> u32 {
        if addr >> 24 == 0x04 {
            0x1000_0000 + (addr & 0x00ff_ffff)
        } else {
            addr
        }
    }
}
