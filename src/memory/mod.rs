// The routed memory bus: one address space, classified into named regions
// by `RegionTable`, each with its own access semantics. A single
// dispatcher object that owns every addressable device and answers
// `read`/`write`, matching over region kinds rather than scanning a
// linear device-range list, since several PP5021C regions (ROM overlay,
// mailbox sticky bits, processor-ID) need bit-exact behavior a generic
// `Device` trait can't express without reaching back into bus-level
// state such as which processor is driving the bus.

pub mod region;
pub mod rom;

use crate::devices::ata::AtaController;
use crate::devices::interrupt::InterruptController;
use crate::devices::mailbox::Mailbox;
use crate::devices::timer::{TimerSystem, TIMER_SOURCE_BIT};
use crate::devices::{DeviceInit, StubRegisterFile};
use crate::error::{SimError, SimResult};
use crate::fields::Size;
use log::{trace, warn};
use region::{RegionKind, RegionTable};
use rom::Rom;

const IRAM_SIZE: usize = 0x1_8000;
const LCD_SIZE: usize = 0x2_0000;
const CPU_ID: u32 = 0x55;
const COP_ID: u32 = 0xaa;

/// The value returned for unmapped reads in permissive mode, and the value
/// the boot-ROM callback stub resolves to: `BX LR`.
pub const UNMAPPED_FALLBACK: u32 = 0xe12f_ff1e;

pub struct Bus {
    regions: RegionTable,
    rom: Rom,
    sdram: Vec<u8>,
    iram: Vec<u8>,
    lcd: Vec<u8>,
    pub mailbox: Mailbox,
    pub interrupt_ctrl: InterruptController,
    pub timers: TimerSystem,
    pub ata: AtaController,
    device_init: DeviceInit,
    system_ctrl: StubRegisterFile,
    hw_accel: StubRegisterFile,
    cache_ctrl: StubRegisterFile,
    dma: StubRegisterFile,
    gpio: StubRegisterFile,
    flash_ctrl: StubRegisterFile,
    gpo32: StubRegisterFile,
    i2s: StubRegisterFile,
    i2c: StubRegisterFile,
    clickwheel: StubRegisterFile,
    lcd_bridge: StubRegisterFile,
    is_cop_access: bool,
    strict: bool,
    fault: bool,
}

impl Bus {
    pub fn new(sdram_bytes: usize) -> SimResult<Self> {
        Self::with_shim_profile(sdram_bytes, Box::new(rom::DefaultShimProfile::new()))
    }

    /// Builds a bus whose ROM uses the given shim profile instead of the
    /// default trampoline.
    pub fn with_shim_profile(sdram_bytes: usize, shim: Box<dyn rom::RomShimProfile>) -> SimResult<Self> {
        if sdram_bytes % 4 != 0 {
            return Err(SimError::MisalignedSdram(sdram_bytes));
        }
        Ok(Bus {
            regions: RegionTable::new(sdram_bytes as u32),
            rom: Rom::with_shim_profile(shim),
            sdram: vec![0; sdram_bytes],
            iram: vec![0; IRAM_SIZE],
            lcd: vec![0; LCD_SIZE],
            mailbox: Mailbox::new(),
            interrupt_ctrl: InterruptController::new(),
            timers: TimerSystem::new(),
            ata: AtaController::new(),
            device_init: DeviceInit::new(),
            system_ctrl: StubRegisterFile::new(),
            hw_accel: StubRegisterFile::new(),
            cache_ctrl: StubRegisterFile::new(),
            dma: StubRegisterFile::new(),
            gpio: StubRegisterFile::new(),
            flash_ctrl: StubRegisterFile::new(),
            gpo32: StubRegisterFile::new(),
            i2s: StubRegisterFile::new(),
            i2c: StubRegisterFile::new(),
            clickwheel: StubRegisterFile::new(),
            lcd_bridge: StubRegisterFile::new(),
            is_cop_access: false,
            strict: false,
            fault: false,
        })
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Marks whether the COP (rather than the CPU) is currently driving the
    /// bus, consulted by the mailbox and processor-ID regions.
    pub fn set_cop_access(&mut self, is_cop: bool) {
        self.is_cop_access = is_cop;
    }

    pub fn load_rom(&mut self, bytes: &[u8]) -> SimResult<()> {
        const MAX_ROM: usize = 0x2_0000;
        if bytes.len() > MAX_ROM {
            return Err(SimError::RomTooLarge { size: bytes.len(), max: MAX_ROM });
        }
        self.rom.load_image(bytes);
        Ok(())
    }

    pub fn load_sdram(&mut self, offset: usize, bytes: &[u8]) {
        let end = (offset + bytes.len()).min(self.sdram.len());
        if offset < end {
            self.sdram[offset..end].copy_from_slice(&bytes[..end - offset]);
        }
    }

    pub fn load_iram(&mut self, offset: usize, bytes: &[u8]) {
        let end = (offset + bytes.len()).min(self.iram.len());
        if offset < end {
            self.iram[offset..end].copy_from_slice(&bytes[..end - offset]);
        }
    }

    pub fn framebuffer(&self) -> &[u8] {
        &self.lcd
    }

    /// Advances the timer system by one tick, asserting the timer interrupt
    /// source on comparator match.
    pub fn tick_timers(&mut self) {
        if self.timers.tick() {
            self.interrupt_ctrl.assert(TIMER_SOURCE_BIT);
        }
    }

    pub fn read32(&mut self, address: u32) -> u32 {
        self.read(address, Size::Word)
    }

    pub fn read16(&mut self, address: u32) -> u32 {
        self.read(address, Size::Half)
    }

    pub fn read8(&mut self, address: u32) -> u32 {
        self.read(address, Size::Byte)
    }

    pub fn write32(&mut self, address: u32, value: u32) {
        self.write(address, Size::Word, value)
    }

    pub fn write16(&mut self, address: u32, value: u32) {
        self.write(address, Size::Half, value)
    }

    pub fn write8(&mut self, address: u32, value: u32) {
        self.write(address, Size::Byte, value)
    }

    fn read(&mut self, raw_address: u32, size: Size) -> u32 {
        let address = RegionTable::translate(raw_address);
        let kind = self.regions.classify(address);
        trace!("bus read{} {:#010x} ({:?})", size.bytes() * 8, address, kind);
        match kind {
            RegionKind::BootRom => self.rom.read(address, size),
            RegionKind::Sdram => read_ram(&self.sdram, address - 0x1000_0000, size),
            RegionKind::Lcd => read_ram(&self.lcd, address - 0x2000_0000, size),
            RegionKind::Iram => read_ram(&self.iram, address - 0x4000_0000, size),
            RegionKind::ProcessorId => if self.is_cop_access { COP_ID } else { CPU_ID },
            RegionKind::Mailbox => self.mailbox.read(address - 0x6000_1000, size, self.is_cop_access),
            RegionKind::HwAccel => self.hw_accel.read(address - 0x6000_3000, size),
            RegionKind::InterruptCtrl => self.interrupt_ctrl.read(address - 0x6000_4000, size),
            RegionKind::Timers => self.timers.read(address - 0x6000_5000, size),
            RegionKind::SystemCtrl => self.system_ctrl.read(address - 0x6000_6000, size),
            RegionKind::Dma => self.dma.read(address - 0x6000_a000, size),
            RegionKind::CacheCtrl => self.cache_ctrl.read(address - 0x6000_c000, size),
            RegionKind::Gpio => self.gpio.read(address - 0x6000_d000, size),
            RegionKind::DeviceInit => self.device_init.read(address - 0x7000_0000, size),
            RegionKind::Gpo32 => self.gpo32.read(address - 0x7000_0080, size),
            RegionKind::I2s => self.i2s.read(address - 0x7000_0100, size),
            RegionKind::I2c => self.i2c.read(address - 0x7000_0180, size),
            RegionKind::ClickWheel => self.clickwheel.read(address - 0x7000_0200, size),
            RegionKind::LcdBridge => self.lcd_bridge.read(address - 0x7000_0280, size),
            RegionKind::Ata => self.ata.read(address - 0xc300_0000, size),
            RegionKind::FlashCtrl => self.flash_ctrl.read(address - 0xf000_f000, size),
            RegionKind::Unmapped => self.unmapped_read(address),
        }
    }

    fn write(&mut self, raw_address: u32, size: Size, value: u32) {
        let address = RegionTable::translate(raw_address);
        let kind = self.regions.classify(address);
        trace!("bus write{} {:#010x} = {:#x} ({:?})", size.bytes() * 8, address, value, kind);
        match kind {
            RegionKind::BootRom => self.rom.write(address, size, value),
            RegionKind::Sdram => write_ram(&mut self.sdram, address - 0x1000_0000, size, value),
            RegionKind::Lcd => write_ram(&mut self.lcd, address - 0x2000_0000, size, value),
            RegionKind::Iram => write_ram(&mut self.iram, address - 0x4000_0000, size, value),
            RegionKind::ProcessorId => {} // writes ignored
            RegionKind::Mailbox => self.mailbox.write(address - 0x6000_1000, size, value, self.is_cop_access),
            RegionKind::HwAccel => self.hw_accel.write(address - 0x6000_3000, size, value),
            RegionKind::InterruptCtrl => self.interrupt_ctrl.write(address - 0x6000_4000, size, value),
            RegionKind::Timers => self.timers.write(address - 0x6000_5000, size, value),
            RegionKind::SystemCtrl => self.system_ctrl.write(address - 0x6000_6000, size, value),
            RegionKind::Dma => self.dma.write(address - 0x6000_a000, size, value),
            RegionKind::CacheCtrl => self.cache_ctrl.write(address - 0x6000_c000, size, value),
            RegionKind::Gpio => self.gpio.write(address - 0x6000_d000, size, value),
            RegionKind::DeviceInit => self.device_init.write(address - 0x7000_0000, size, value),
            RegionKind::Gpo32 => self.gpo32.write(address - 0x7000_0080, size, value),
            RegionKind::I2s => self.i2s.write(address - 0x7000_0100, size, value),
            RegionKind::I2c => self.i2c.write(address - 0x7000_0180, size, value),
            RegionKind::ClickWheel => self.clickwheel.write(address - 0x7000_0200, size, value),
            RegionKind::LcdBridge => self.lcd_bridge.write(address - 0x7000_0280, size, value),
            RegionKind::Ata => self.ata.write(address - 0xc300_0000, size, value),
            RegionKind::FlashCtrl => self.flash_ctrl.write(address - 0xf000_f000, size, value),
            RegionKind::Unmapped => self.unmapped_write(address),
        }
    }

    fn unmapped_read(&mut self, address: u32) -> u32 {
        if self.strict {
            warn!("unmapped read at {:#010x} (strict mode, aborting)", address);
            self.fault = true;
        } else {
            warn!("unmapped read at {:#010x}, returning fallback", address);
        }
        UNMAPPED_FALLBACK
    }

    fn unmapped_write(&mut self, address: u32) {
        warn!("unmapped write at {:#010x}", address);
        if self.strict {
            self.fault = true;
        }
    }

    /// Whether the CPU should treat an access to `address` as faulting
    /// (Data/Prefetch Abort) rather than returning the benign fallback.
    /// Only meaningful in strict mode; permissive mode never aborts.
    pub fn should_abort(&self, address: u32) -> bool {
        self.strict && self.regions.classify(RegionTable::translate(address)) == RegionKind::Unmapped
    }

    /// Consumes the sticky "a strict-mode access just faulted" flag set by
    /// `unmapped_read`/`unmapped_write`. The CPU polls this once after
    /// fetch and once after execute to decide whether to raise Prefetch-
    /// or Data-Abort, the way real hardware would just vector into a
    /// handler.
    pub fn take_fault(&mut self) -> bool {
        std::mem::replace(&mut self.fault, false)
    }
}

fn read_ram(buf: &[u8], offset: u32, size: Size) -> u32 {
    let offset = offset as usize;
    let bytes = size.bytes() as usize;
    if offset + bytes > buf.len() {
        return 0;
    }
    let mut raw = [0u8; 4];
    raw[..bytes].copy_from_slice(&buf[offset..offset + bytes]);
    u32::from_le_bytes(raw)
}

fn write_ram(buf: &mut [u8], offset: u32, size: Size, value: u32) {
    let offset = offset as usize;
    let bytes = size.bytes() as usize;
    if offset + bytes > buf.len() {
        return;
    }
    let raw = value.to_le_bytes();
    buf[offset..offset + bytes].copy_from_slice(&raw[..bytes]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdram_round_trips_all_widths() {
        let mut bus = Bus::new(0x1000).unwrap();
        bus.write32(0x1000_0000, 0xdead_beef);
        assert_eq!(bus.read32(0x1000_0000), 0xdead_beef);
        assert_eq!(bus.read16(0x1000_0000), 0xbeef);
        assert_eq!(bus.read8(0x1000_0000), 0xef);
    }

    #[test]
    fn encoded_address_translates_into_sdram() {
        let mut bus = Bus::new(0x1000).unwrap();
        bus.write32(0x1000_0010, 0x1234_5678);
        assert_eq!(bus.read32(0x0400_0010), 0x1234_5678);
    }

    #[test]
    fn processor_id_depends_on_cop_flag() {
        let mut bus = Bus::new(0x1000).unwrap();
        assert_eq!(bus.read32(0x6000_0000), CPU_ID);
        bus.set_cop_access(true);
        assert_eq!(bus.read32(0x6000_0000), COP_ID);
    }

    #[test]
    fn unmapped_read_is_benign_in_permissive_mode() {
        let mut bus = Bus::new(0x1000).unwrap();
        assert_eq!(bus.read32(0x9999_0000), UNMAPPED_FALLBACK);
        assert!(!bus.should_abort(0x9999_0000));
    }

    #[test]
    fn strict_mode_flags_unmapped_access_for_abort() {
        let mut bus = Bus::new(0x1000).unwrap();
        bus.set_strict(true);
        assert!(bus.should_abort(0x9999_0000));
    }
}
