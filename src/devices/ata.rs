// ATA/IDE controller: register file plus the command state machine.
// Register offsets below are a PP5021-style compact layout (the real
// PP502x ATA block maps a subset of the classic IDE task file); only
// the command/status behavior is fixed, not the offsets.

use crate::devices::disk::{DiskImage, SECTOR_SIZE};
use crate::fields::Size;
use log::{debug, warn};

const DATA: u32 = 0x00;
const ERROR_FEATURE: u32 = 0x04;
const SECTOR_COUNT: u32 = 0x08;
const LBA_LOW: u32 = 0x0c;
const LBA_MID: u32 = 0x10;
const LBA_HIGH: u32 = 0x14;
const DEVICE_HEAD: u32 = 0x18;
const COMMAND_STATUS: u32 = 0x1c;

const STATUS_ERR: u32 = 0x01;
const STATUS_DRQ: u32 = 0x08;
const STATUS_DRDY: u32 = 0x40;
const STATUS_BSY: u32 = 0x80;

const CMD_IDENTIFY: u32 = 0xec;
const CMD_READ_SECTORS: u32 = 0x20;
const CMD_READ_SECTORS_EXT: u32 = 0x24;
const CMD_WRITE_SECTORS: u32 = 0x30;
const CMD_WRITE_SECTORS_EXT: u32 = 0x34;
const CMD_FLUSH_CACHE: u32 = 0xe7;
const CMD_STANDBY_IMMEDIATE: u32 = 0xe0;

const ERR_ABORT: u32 = 0x04;

#[derive(Default, Clone, Copy)]
struct LbaRegister {
    current: u8,
    previous: u8,
}

impl LbaRegister {
    fn write(&mut self, byte: u8) {
        self.previous = self.current;
        self.current = byte;
    }
}

enum Transfer {
    None,
    Read { buffer: [u8; SECTOR_SIZE], cursor: usize, remaining_sectors: u32, next_lba: u64 },
    Write { buffer: [u8; SECTOR_SIZE], cursor: usize, remaining_sectors: u32, next_lba: u64 },
}

pub struct AtaController {
    status: u32,
    error: u32,
    feature: u8,
    sector_count: u8,
    lba_low: LbaRegister,
    lba_mid: LbaRegister,
    lba_high: LbaRegister,
    device_head: u8,
    transfer: Transfer,
    disk: Option<DiskImage>,
}

impl AtaController {
    pub fn new() -> Self {
        AtaController {
            status: STATUS_DRDY,
            error: 0,
            feature: 0,
            sector_count: 0,
            lba_low: LbaRegister::default(),
            lba_mid: LbaRegister::default(),
            lba_high: LbaRegister::default(),
            device_head: 0,
            transfer: Transfer::None,
            disk: None,
        }
    }

    pub fn attach_disk(&mut self, disk: DiskImage) {
        self.disk = Some(disk);
    }

    fn lba28(&self) -> u64 {
        (self.lba_low.current as u64)
            | ((self.lba_mid.current as u64) << 8)
            | ((self.lba_high.current as u64) << 16)
            | (((self.device_head & 0x0f) as u64) << 24)
    }

    fn lba48(&self) -> u64 {
        (self.lba_low.current as u64)
            | ((self.lba_mid.current as u64) << 8)
            | ((self.lba_high.current as u64) << 16)
            | ((self.lba_low.previous as u64) << 24)
            | ((self.lba_mid.previous as u64) << 32)
            | ((self.lba_high.previous as u64) << 40)
    }

    pub fn read(&mut self, offset: u32, size: Size) -> u32 {
        let word_offset = offset & !3;
        let word = match word_offset {
            DATA => return self.read_data(size),
            ERROR_FEATURE => self.error,
            SECTOR_COUNT => self.sector_count as u32,
            LBA_LOW => self.lba_low.current as u32,
            LBA_MID => self.lba_mid.current as u32,
            LBA_HIGH => self.lba_high.current as u32,
            DEVICE_HEAD => self.device_head as u32,
            COMMAND_STATUS => self.status,
            _ => 0,
        };
        narrow(word, offset, size)
    }

    pub fn write(&mut self, offset: u32, size: Size, value: u32) {
        let word_offset = offset & !3;
        let byte = merge(0, offset, size, value) as u8;
        match word_offset {
            DATA => self.write_data(size, value),
            ERROR_FEATURE => self.feature = byte,
            SECTOR_COUNT => self.sector_count = byte,
            LBA_LOW => self.lba_low.write(byte),
            LBA_MID => self.lba_mid.write(byte),
            LBA_HIGH => self.lba_high.write(byte),
            DEVICE_HEAD => self.device_head = byte,
            COMMAND_STATUS => self.issue_command(byte as u32),
            _ => {}
        }
    }

    fn issue_command(&mut self, command: u32) {
        self.error = 0;
        self.status &= !(STATUS_ERR | STATUS_DRQ);
        debug!("ata: command {:#04x}", command);
        match command {
            CMD_IDENTIFY => self.do_identify(),
            CMD_READ_SECTORS => self.begin_read(self.lba28(), self.sector_count as u32),
            CMD_READ_SECTORS_EXT => self.begin_read(self.lba48(), self.sector_count as u32),
            CMD_WRITE_SECTORS => self.begin_write(self.lba28(), self.sector_count as u32),
            CMD_WRITE_SECTORS_EXT => self.begin_write(self.lba48(), self.sector_count as u32),
            CMD_FLUSH_CACHE => {
                if let Some(disk) = &mut self.disk {
                    disk.flush();
                }
            }
            CMD_STANDBY_IMMEDIATE => {}
            _ => {
                warn!("ata: unsupported command {:#04x}", command);
                self.abort();
            }
        }
    }

    fn abort(&mut self) {
        self.error |= ERR_ABORT;
        self.status |= STATUS_ERR;
        self.status &= !STATUS_DRQ;
        self.transfer = Transfer::None;
    }

    fn do_identify(&mut self) {
        let disk = match &self.disk {
            Some(d) => d,
            None => {
                self.abort();
                return;
            }
        };
        let mut buffer = [0u8; SECTOR_SIZE];
        write_identify_string(&mut buffer, 20, 20, &disk.identify.serial);
        write_identify_string(&mut buffer, 46, 8, &disk.identify.firmware);
        write_identify_string(&mut buffer, 54, 40, &disk.identify.model);
        buffer[98..100].copy_from_slice(&(disk.identify.rotation_rate).to_le_bytes());
        let total = disk.total_sectors();
        buffer[120..124].copy_from_slice(&((total.min(u32::MAX as u64)) as u32).to_le_bytes());
        buffer[200..208].copy_from_slice(&total.to_le_bytes());
        buffer[168] = if disk.identify.lba48_supported { 1 } else { 0 };
        buffer[346] = if disk.identify.trim_supported { 1 } else { 0 };
        self.transfer = Transfer::Read { buffer, cursor: 0, remaining_sectors: 0, next_lba: 0 };
        self.status |= STATUS_DRQ;
    }

    fn begin_read(&mut self, lba: u64, count: u32) {
        let effective_count = if count == 0 { 256 } else { count };
        let disk = match &mut self.disk {
            Some(d) => d,
            None => {
                self.abort();
                return;
            }
        };
        if lba >= disk.total_sectors() {
            self.abort();
            return;
        }
        let mut buffer = [0u8; SECTOR_SIZE];
        if !disk.read_sector(lba, &mut buffer) {
            self.abort();
            return;
        }
        self.transfer = Transfer::Read { buffer, cursor: 0, remaining_sectors: effective_count - 1, next_lba: lba + 1 };
        self.status |= STATUS_DRQ;
    }

    fn begin_write(&mut self, lba: u64, count: u32) {
        let effective_count = if count == 0 { 256 } else { count };
        match &self.disk {
            Some(disk) if lba < disk.total_sectors() => {}
            _ => {
                self.abort();
                return;
            }
        }
        self.transfer =
            Transfer::Write { buffer: [0u8; SECTOR_SIZE], cursor: 0, remaining_sectors: effective_count - 1, next_lba: lba };
        self.status |= STATUS_DRQ;
    }

    fn read_data(&mut self, size: Size) -> u32 {
        let Transfer::Read { buffer, cursor, remaining_sectors, next_lba } = &mut self.transfer else {
            return 0;
        };
        let bytes = size.bytes() as usize;
        if *cursor + bytes > SECTOR_SIZE {
            return 0;
        }
        let mut out = [0u8; 4];
        out[..bytes].copy_from_slice(&buffer[*cursor..*cursor + bytes]);
        *cursor += bytes;
        if *cursor >= SECTOR_SIZE {
            if *remaining_sectors == 0 {
                self.status &= !STATUS_DRQ;
                self.transfer = Transfer::None;
            } else {
                let lba = *next_lba;
                let remaining = *remaining_sectors - 1;
                let mut next_buffer = [0u8; SECTOR_SIZE];
                let ok = self.disk.as_mut().map(|d| d.read_sector(lba, &mut next_buffer)).unwrap_or(false);
                if !ok {
                    self.abort();
                } else {
                    self.transfer =
                        Transfer::Read { buffer: next_buffer, cursor: 0, remaining_sectors: remaining, next_lba: lba + 1 };
                }
            }
        }
        u32::from_le_bytes(out)
    }

    fn write_data(&mut self, size: Size, value: u32) {
        let Transfer::Write { buffer, cursor, remaining_sectors, next_lba } = &mut self.transfer else {
            return;
        };
        let bytes = size.bytes() as usize;
        if *cursor + bytes > SECTOR_SIZE {
            return;
        }
        let data = value.to_le_bytes();
        buffer[*cursor..*cursor + bytes].copy_from_slice(&data[..bytes]);
        *cursor += bytes;
        if *cursor >= SECTOR_SIZE {
            let lba = *next_lba;
            let sector = *buffer;
            let remaining = *remaining_sectors;
            let ok = self.disk.as_mut().map(|d| d.write_sector(lba, &sector)).unwrap_or(false);
            if !ok {
                self.abort();
            } else if remaining == 0 {
                self.status &= !STATUS_DRQ;
                self.transfer = Transfer::None;
            } else {
                self.transfer =
                    Transfer::Write { buffer: [0u8; SECTOR_SIZE], cursor: 0, remaining_sectors: remaining - 1, next_lba: lba + 1 };
            }
        }
    }
}

impl Default for AtaController {
    fn default() -> Self {
        Self::new()
    }
}

fn write_identify_string(buffer: &mut [u8; SECTOR_SIZE], word_offset: usize, len: usize, s: &str) {
    let bytes = s.as_bytes();
    for i in 0..len {
        let c = bytes.get(i).copied().unwrap_or(b' ');
        // ATA IDENTIFY strings are byte-swapped within each 16-bit word.
        if i % 2 == 0 {
            buffer[word_offset + i + 1] = c;
        } else {
            buffer[word_offset + i - 1] = c;
        }
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
    use crate::devices::disk::DiskImage;

    fn write_lba(ata: &mut AtaController, lba: u64, count: u8) {
        ata.write(LBA_LOW, Size::Byte, (lba & 0xff) as u32);
        ata.write(LBA_MID, Size::Byte, ((lba >> 8) & 0xff) as u32);
        ata.write(LBA_HIGH, Size::Byte, ((lba >> 16) & 0xff) as u32);
        ata.write(DEVICE_HEAD, Size::Byte, ((lba >> 24) & 0x0f) as u32);
        ata.write(SECTOR_COUNT, Size::Byte, count as u32);
    }

    #[test]
    fn identify_reports_geometry() {
        let mut ata = AtaController::new();
        ata.attach_disk(DiskImage::in_memory(1000));
        ata.write(COMMAND_STATUS, Size::Byte, CMD_IDENTIFY);
        assert_eq!(ata.read(COMMAND_STATUS, Size::Byte) & STATUS_DRQ, STATUS_DRQ);
    }

    #[test]
    fn write_then_read_sector_round_trips() {
        let mut ata = AtaController::new();
        ata.attach_disk(DiskImage::in_memory(1000));

        write_lba(&mut ata, 5, 1);
        ata.write(COMMAND_STATUS, Size::Byte, CMD_WRITE_SECTORS);
        let mut sector = [0xddu16; SECTOR_SIZE / 2];
        sector[0] = 0xddee; // first byte (LE) = 0xEE, second = 0xDD
        for half in sector.iter() {
            ata.write(DATA, Size::Half, *half as u32);
        }

        write_lba(&mut ata, 5, 1);
        ata.write(COMMAND_STATUS, Size::Byte, CMD_READ_SECTORS);
        let first = ata.read(DATA, Size::Half);
        assert_eq!(first & 0xff, 0xee);
        assert_eq!((first >> 8) & 0xff, 0xdd);
    }

    #[test]
    fn illegal_lba_sets_error_and_clears_drq() {
        let mut ata = AtaController::new();
        ata.attach_disk(DiskImage::in_memory(10));
        write_lba(&mut ata, 999, 1);
        ata.write(COMMAND_STATUS, Size::Byte, CMD_READ_SECTORS);
        let status = ata.read(COMMAND_STATUS, Size::Byte);
        assert_eq!(status & STATUS_ERR, STATUS_ERR);
        assert_eq!(status & STATUS_DRQ, 0);
    }
}
