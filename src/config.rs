//! Board configuration loaded from TOML
//!
//! ```toml
//! numbering = "board"
//! model = "raspberry-pi"
//! boot_config_path = "/boot/firmware/config.txt"
//! ```
//!
//! Every field is optional; missing fields take the values of
//! [`BoardConfig::default`].

use crate::error::{BoardError, Result};
use crate::pins::PinNumberingScheme;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Boot configuration locations, tried in order
pub const BOOT_CONFIG_PATHS: &[&str] = &["/boot/firmware/config.txt", "/boot/config.txt"];

/// Which board model to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelSelection {
    /// Probe the known models in order
    #[default]
    Auto,
    RaspberryPi,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Scheme pin arguments are given in unless stated otherwise
    pub numbering: PinNumberingScheme,
    pub model: ModelSelection,
    /// config.txt to read overlays from; `None` tries [`BOOT_CONFIG_PATHS`]
    pub boot_config_path: Option<PathBuf>,
    /// Device-tree model string used to detect a Raspberry Pi
    pub device_tree_model_path: PathBuf,
    pub sysfs_gpio_root: PathBuf,
    pub sysfs_pwm_root: PathBuf,
    /// Where `i2c-N` and `spidevB.C` nodes live
    pub dev_root: PathBuf,
    /// Pin count of the generic board
    pub generic_pin_count: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            numbering: PinNumberingScheme::Logical,
            model: ModelSelection::Auto,
            boot_config_path: None,
            device_tree_model_path: PathBuf::from("/proc/device-tree/model"),
            sysfs_gpio_root: PathBuf::from("/sys/class/gpio"),
            sysfs_pwm_root: PathBuf::from("/sys/class/pwm"),
            dev_root: PathBuf::from("/dev"),
            generic_pin_count: 64,
        }
    }
}

impl BoardConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BoardError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {}", path.display(), e),
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// The boot configuration file to parse, if any exists
    pub fn resolve_boot_config_path(&self) -> Option<PathBuf> {
        match self.boot_config_path {
            Some(ref path) => Some(path.clone()),
            None => BOOT_CONFIG_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|p| p.exists()),
        }
    }
}
