// Sector-backed disk image: either a read-write file or an in-memory
// byte buffer, both addressed in 512-byte sectors. `project_directory`
// turns a host directory tree into a minimal
// synthetic FAT32 volume so tests and tooling can hand the ATA controller
// a disk without shipping a binary image.

use crate::error::{SimError, SimResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const SECTOR_SIZE: usize = 512;

pub struct IdentifyInfo {
    pub model: String,
    pub serial: String,
    pub firmware: String,
    pub total_sectors: u64,
    pub lba48_supported: bool,
    pub rotation_rate: u16,
    pub trim_supported: bool,
}

impl Default for IdentifyInfo {
    fn default() -> Self {
        IdentifyInfo {
            model: "PP5021C SIM DISK".to_string(),
            serial: "0000000000000000".to_string(),
            firmware: "1.00".to_string(),
            total_sectors: 0,
            lba48_supported: true,
            rotation_rate: 1, // 1 = solid state, per ATA convention
            trim_supported: true,
        }
    }
}

enum Backing {
    Memory(Vec<u8>),
    File(File),
}

pub struct DiskImage {
    backing: Backing,
    total_sectors: u64,
    pub identify: IdentifyInfo,
}

impl DiskImage {
    pub fn in_memory(sectors: u64) -> Self {
        let mut identify = IdentifyInfo::default();
        identify.total_sectors = sectors;
        DiskImage {
            backing: Backing::Memory(vec![0u8; sectors as usize * SECTOR_SIZE]),
            total_sectors: sectors,
            identify,
        }
    }

    pub fn open_file(path: &Path) -> SimResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| SimError::DiskImage { path: path.display().to_string(), source })?;
        let len = file
            .metadata()
            .map_err(|source| SimError::DiskImage { path: path.display().to_string(), source })?
            .len();
        let sectors = len / SECTOR_SIZE as u64;
        let mut identify = IdentifyInfo::default();
        identify.total_sectors = sectors;
        Ok(DiskImage { backing: Backing::File(file), total_sectors: sectors, identify })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let sectors = (bytes.len() / SECTOR_SIZE) as u64;
        let mut identify = IdentifyInfo::default();
        identify.total_sectors = sectors;
        DiskImage { backing: Backing::Memory(bytes), total_sectors: sectors, identify }
    }

    pub fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    pub fn read_sector(&mut self, lba: u64, out: &mut [u8; SECTOR_SIZE]) -> bool {
        if lba >= self.total_sectors {
            return false;
        }
        match &mut self.backing {
            Backing::Memory(buf) => {
                let start = lba as usize * SECTOR_SIZE;
                out.copy_from_slice(&buf[start..start + SECTOR_SIZE]);
            }
            Backing::File(file) => {
                if file.seek(SeekFrom::Start(lba * SECTOR_SIZE as u64)).is_err() {
                    return false;
                }
                if file.read_exact(out).is_err() {
                    return false;
                }
            }
        }
        true
    }

    pub fn write_sector(&mut self, lba: u64, data: &[u8; SECTOR_SIZE]) -> bool {
        if lba >= self.total_sectors {
            return false;
        }
        match &mut self.backing {
            Backing::Memory(buf) => {
                let start = lba as usize * SECTOR_SIZE;
                buf[start..start + SECTOR_SIZE].copy_from_slice(data);
            }
            Backing::File(file) => {
                if file.seek(SeekFrom::Start(lba * SECTOR_SIZE as u64)).is_err() {
                    return false;
                }
                if file.write_all(data).is_err() {
                    return false;
                }
            }
        }
        true
    }

    pub fn flush(&mut self) {
        if let Backing::File(file) = &mut self.backing {
            let _ = file.flush();
        }
    }
}

/// Projects a host directory tree as a minimal FAT32 volume: one boot
/// sector, two FAT copies, and a root directory populated with every file
/// found directly under `root` (subdirectories are recorded as directory
/// entries but their contents are not walked further - enough for tests
/// that hand the simulator a handful of firmware/config files to read back
/// through the ATA path, not a general-purpose mkfs).
pub fn project_directory(root: &Path, sectors: u64) -> SimResult<DiskImage> {
    if !root.is_dir() {
        return Err(SimError::BadProjectionRoot(root.display().to_string()));
    }
    const BYTES_PER_SECTOR: u16 = SECTOR_SIZE as u16;
    const SECTORS_PER_CLUSTER: u8 = 8;
    const RESERVED_SECTORS: u16 = 32;
    const NUM_FATS: u8 = 2;

    let cluster_bytes = SECTORS_PER_CLUSTER as u64 * BYTES_PER_SECTOR as u64;
    let data_sectors = sectors.saturating_sub(RESERVED_SECTORS as u64);
    let total_clusters = data_sectors / SECTORS_PER_CLUSTER as u64;
    let fat_entries = total_clusters + 2;
    let sectors_per_fat = ((fat_entries * 4) + BYTES_PER_SECTOR as u64 - 1) / BYTES_PER_SECTOR as u64;

    let mut image = vec![0u8; (sectors * SECTOR_SIZE as u64) as usize];

    // Boot sector (BPB, FAT32 variant).
    image[0] = 0xeb;
    image[1] = 0x58;
    image[2] = 0x90;
    image[3..11].copy_from_slice(b"MSDOS5.0");
    image[11..13].copy_from_slice(&BYTES_PER_SECTOR.to_le_bytes());
    image[13] = SECTORS_PER_CLUSTER;
    image[14..16].copy_from_slice(&RESERVED_SECTORS.to_le_bytes());
    image[16] = NUM_FATS;
    image[36..40].copy_from_slice(&(sectors_per_fat as u32).to_le_bytes());
    image[44..48].copy_from_slice(&2u32.to_le_bytes()); // root cluster
    image[510] = 0x55;
    image[511] = 0xaa;

    let fat_start = RESERVED_SECTORS as u64 * SECTOR_SIZE as u64;
    let root_cluster_lba = RESERVED_SECTORS as u64 + sectors_per_fat * NUM_FATS as u64;
    let root_start = root_cluster_lba * SECTOR_SIZE as u64;

    let mark_fat_entry = |image: &mut [u8], cluster: u32, value: u32| {
        for fat in 0..NUM_FATS as u64 {
            let offset = fat_start + fat * sectors_per_fat * SECTOR_SIZE as u64 + cluster as u64 * 4;
            if (offset as usize) + 4 <= image.len() {
                image[offset as usize..offset as usize + 4].copy_from_slice(&value.to_le_bytes());
            }
        }
    };
    mark_fat_entry(&mut image, 0, 0x0fff_fff8);
    mark_fat_entry(&mut image, 1, 0x0fff_ffff);
    mark_fat_entry(&mut image, 2, 0x0fff_ffff); // root directory: single cluster, end of chain

    let mut next_free_cluster = 3u32;
    let mut dir_entry_offset = root_start as usize;

    for entry in std::fs::read_dir(root).map_err(SimError::Io)? {
        let entry = entry.map_err(SimError::Io)?;
        let file_type = entry.file_type().map_err(SimError::Io)?;
        let name = entry.file_name();
        let short_name = to_short_name(&name.to_string_lossy());

        if file_type.is_dir() {
            write_dir_entry(&mut image, dir_entry_offset, &short_name, 0x10, next_free_cluster, 0);
            mark_fat_entry(&mut image, next_free_cluster, 0x0fff_ffff);
            next_free_cluster += 1;
            dir_entry_offset += 32;
            continue;
        }

        let mut contents = Vec::new();
        if File::open(entry.path()).and_then(|mut f| f.read_to_end(&mut contents)).is_err() {
            continue;
        }
        let clusters_needed = ((contents.len() as u64).max(1) + cluster_bytes - 1) / cluster_bytes;
        let start_cluster = next_free_cluster;

        for i in 0..clusters_needed {
            let cluster = next_free_cluster;
            let chunk_start = (i * cluster_bytes) as usize;
            let chunk_end = (chunk_start + cluster_bytes as usize).min(contents.len());
            let cluster_lba = root_cluster_lba + 1 + (cluster as u64 - 2) * SECTORS_PER_CLUSTER as u64;
            let cluster_byte_offset = (cluster_lba * SECTOR_SIZE as u64) as usize;
            if chunk_start < contents.len() && cluster_byte_offset + (chunk_end - chunk_start) <= image.len() {
                image[cluster_byte_offset..cluster_byte_offset + (chunk_end - chunk_start)]
                    .copy_from_slice(&contents[chunk_start..chunk_end]);
            }
            let next_value = if i + 1 == clusters_needed { 0x0fff_ffff } else { cluster + 1 };
            mark_fat_entry(&mut image, cluster, next_value);
            next_free_cluster += 1;
        }

        write_dir_entry(&mut image, dir_entry_offset, &short_name, 0x20, start_cluster, contents.len() as u32);
        dir_entry_offset += 32;
    }

    Ok(DiskImage::from_bytes(image))
}

fn to_short_name(name: &str) -> [u8; 11] {
    let mut short = [b' '; 11];
    let (stem, ext) = match name.rfind('.') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => (name, ""),
    };
    for (i, b) in stem.bytes().take(8).enumerate() {
        short[i] = b.to_ascii_uppercase();
    }
    for (i, b) in ext.bytes().take(3).enumerate() {
        short[8 + i] = b.to_ascii_uppercase();
    }
    short
}

fn write_dir_entry(image: &mut [u8], offset: usize, short_name: &[u8; 11], attr: u8, cluster: u32, size: u32) {
    if offset + 32 > image.len() {
        return;
    }
    image[offset..offset + 11].copy_from_slice(short_name);
    image[offset + 11] = attr;
    image[offset + 20..offset + 22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    image[offset + 26..offset + 28].copy_from_slice(&((cluster & 0xffff) as u16).to_le_bytes());
    image[offset + 28..offset + 32].copy_from_slice(&size.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_round_trip() {
        let mut disk = DiskImage::in_memory(16);
        let mut sector = [0xabu8; SECTOR_SIZE];
        sector[0] = 0xee;
        assert!(disk.write_sector(5, &sector));
        let mut out = [0u8; SECTOR_SIZE];
        assert!(disk.read_sector(5, &mut out));
        assert_eq!(out, sector);
    }

    #[test]
    fn out_of_range_sector_fails() {
        let mut disk = DiskImage::in_memory(4);
        let mut out = [0u8; SECTOR_SIZE];
        assert!(!disk.read_sector(4, &mut out));
    }
}
