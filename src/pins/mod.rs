//! Pin identities, usages and ownership
//!
//! This module provides the vocabulary shared by the registry, the
//! numbering translator and every handle the board creates.

pub mod numbering;
pub mod registry;

pub use numbering::PinNumberingTranslator;
pub use registry::{PinRecord, PinRegistry, Reservation};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A pin number in some numbering scheme
pub type Pin = i32;

/// Sentinel for "no pin" in overlay and SPI pin arrays
pub const UNASSIGNED_PIN: Pin = -1;

/// The function a pin is (or was last) committed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinUsage {
    #[default]
    Unknown,
    Gpio,
    I2c,
    Spi,
    Pwm,
}

impl fmt::Display for PinUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinUsage::Unknown => write!(f, "Unknown"),
            PinUsage::Gpio => write!(f, "GPIO"),
            PinUsage::I2c => write!(f, "I2C"),
            PinUsage::Spi => write!(f, "SPI"),
            PinUsage::Pwm => write!(f, "PWM"),
        }
    }
}

/// Pin numbering convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinNumberingScheme {
    /// SoC numbering (BCM GPIO numbers on the Raspberry Pi)
    #[default]
    Logical,
    /// Physical header position
    Board,
}

impl fmt::Display for PinNumberingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinNumberingScheme::Logical => write!(f, "logical"),
            PinNumberingScheme::Board => write!(f, "board"),
        }
    }
}

impl std::str::FromStr for PinNumberingScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "logical" | "bcm" | "gpio" => Ok(PinNumberingScheme::Logical),
            "board" | "physical" | "header" => Ok(PinNumberingScheme::Board),
            other => Err(format!("unknown numbering scheme: {}", other)),
        }
    }
}

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a pin owner.
///
/// Tokens are only equal to their own copies, so two callers with otherwise
/// identical state can never release each other's reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerToken(u64);

#[allow(clippy::new_without_default)]
impl OwnerToken {
    /// Allocate a fresh, process-unique token
    pub fn new() -> Self {
        Self(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}
