// Simulator configuration. Built programmatically by an embedder, or
// loaded from a TOML file by the CLI binary via serde.

use crate::error::{SimError, SimResult};
use serde::Deserialize;
use std::path::PathBuf;

/// Fixed by the PP5021C memory map; not configurable, kept as a named
/// constant so callers building a `Configuration` can reference it.
pub const IRAM_BYTES: usize = 0x1_8000;

fn default_sdram_bytes() -> usize {
    32 * 1024 * 1024
}

fn default_halt_on_undefined() -> bool {
    false
}

#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    #[serde(default = "default_sdram_bytes")]
    pub sdram_bytes: usize,
    pub disk_image_path: Option<PathBuf>,
    pub memory_disk_sectors: Option<u64>,
    pub projection_root: Option<PathBuf>,
    pub boot_rom_path: Option<PathBuf>,
    #[serde(default)]
    pub strict_bus: bool,
    #[serde(default = "default_halt_on_undefined")]
    pub halt_on_undefined: bool,
}

impl Configuration {
    pub fn new(sdram_bytes: usize) -> Self {
        Configuration {
            sdram_bytes,
            disk_image_path: None,
            memory_disk_sectors: None,
            projection_root: None,
            boot_rom_path: None,
            strict_bus: false,
            halt_on_undefined: default_halt_on_undefined(),
        }
    }

    pub fn from_toml(text: &str) -> SimResult<Self> {
        toml::from_str(text).map_err(|e| SimError::Config(e.to_string()))
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.sdram_bytes % 4 != 0 {
            return Err(SimError::MisalignedSdram(self.sdram_bytes));
        }
        if let Some(root) = &self.projection_root {
            if !root.is_dir() {
                return Err(SimError::BadProjectionRoot(root.display().to_string()));
            }
        }
        Ok(())
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new(default_sdram_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Configuration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sdram_bytes, 32 * 1024 * 1024);
    }

    #[test]
    fn misaligned_sdram_is_rejected() {
        let config = Configuration::new(7);
        assert!(matches!(config.validate(), Err(SimError::MisalignedSdram(7))));
    }

    #[test]
    fn parses_toml_table() {
        let toml = r#"
            sdram_bytes = 67108864
            memory_disk_sectors = 2000
            strict_bus = true
        "#;
        let config = Configuration::from_toml(toml).expect("valid toml");
        assert_eq!(config.sdram_bytes, 64 * 1024 * 1024);
        assert_eq!(config.memory_disk_sectors, Some(2000));
        assert!(config.strict_bus);
    }
}
