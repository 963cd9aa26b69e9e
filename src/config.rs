//! Machine configuration.
//!
//! Values come from built-in defaults, optionally overridden by a TOML file
//! and then by command-line flags.
//!
//! ```toml
//! mem_base = 0x80000000
//! mem_size = 134217728
//! num_regs = 32
//! trace_limit = 10
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::vm::{PAddr, Word};

pub const DEFAULT_MEM_BASE: PAddr = 0x8000_0000;
pub const DEFAULT_MEM_SIZE: usize = 0x800_0000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// First guest physical address backed by memory.
    pub mem_base: PAddr,
    /// Size of physical memory in bytes.
    pub mem_size: usize,
    /// General purpose register count: 32, or 16 for the embedded variant.
    pub num_regs: usize,
    /// Entry point. Falls back to `mem_base`.
    pub reset_pc: Option<Word>,
    /// Runs shorter than this echo every executed instruction.
    pub trace_limit: u64,
    /// Run to completion without the interactive shell.
    pub batch: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            mem_base: DEFAULT_MEM_BASE,
            mem_size: DEFAULT_MEM_SIZE,
            num_regs: 32,
            reset_pc: None,
            trace_limit: 10,
            batch: false,
        }
    }
}

impl MachineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_regs != 16 && self.num_regs != 32 {
            return Err(ConfigError::RegisterCount(self.num_regs));
        }
        if self.mem_size == 0 {
            return Err(ConfigError::EmptyMemory);
        }
        if self.mem_base as u64 + self.mem_size as u64 > 1 << PAddr::BITS {
            return Err(ConfigError::AddressSpace {
                base: self.mem_base,
                size: self.mem_size,
            });
        }
        Ok(())
    }

    pub fn entry(&self) -> Word {
        self.reset_pc.unwrap_or(self.mem_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = MachineConfig::from_toml_str("num_regs = 16\nmem_size = 4096").unwrap();
        assert_eq!(16, config.num_regs);
        assert_eq!(4096, config.mem_size);
        assert_eq!(DEFAULT_MEM_BASE, config.mem_base);
        assert_eq!(DEFAULT_MEM_BASE, config.entry());
    }

    #[test]
    fn test_rejects_odd_register_count() {
        assert!(matches!(
            MachineConfig::from_toml_str("num_regs = 20"),
            Err(ConfigError::RegisterCount(20))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            MachineConfig::from_toml_str("num_regs = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_memory_past_address_space() {
        assert!(matches!(
            MachineConfig::from_toml_str("mem_base = 0xffff0000\nmem_size = 0x20000"),
            Err(ConfigError::AddressSpace {
                base: 0xffff_0000,
                size: 0x20000
            })
        ));
        // ending exactly at the top is fine
        let config =
            MachineConfig::from_toml_str("mem_base = 0xffff0000\nmem_size = 0x10000").unwrap();
        assert_eq!(0xffff_0000, config.mem_base);
    }
}
