//! Board models
//!
//! A [`BoardModel`] carries everything board specific: the numbering table,
//! the default pin tables for each bus and the constructors for the GPIO
//! driver and bus transports. The [`Board`](crate::Board) itself is model
//! agnostic. All pins crossing this trait are logical numbers.

pub mod generic;
pub mod raspberry_pi;
pub mod simulated;

pub use generic::GenericBoard;
pub use raspberry_pi::RaspberryPiBoard;
pub use simulated::SimulatedBoard;

pub use crate::gpio::AlternatePinMode;
use crate::bus::{I2cBusTransport, PwmTransport, SpiConnectionSettings, SpiTransport};
use crate::config::{BoardConfig, ModelSelection};
use crate::error::{BoardError, Result};
use crate::gpio::GpioDriver;
use crate::pins::{Pin, PinNumberingTranslator, PinUsage};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Board-specific knowledge consumed by [`Board`](crate::Board)
pub trait BoardModel: Send + Sync {
    /// Short identifier, e.g. `raspberry-pi`
    fn name(&self) -> &str;

    /// Human readable description
    fn description(&self) -> String {
        self.name().to_string()
    }

    fn translator(&self) -> &PinNumberingTranslator;

    /// Build the best GPIO driver for this board
    fn create_gpio_driver(&self) -> Result<Arc<dyn GpioDriver>>;

    /// `[sda, scl]` of a hardwired I2C bus
    fn default_pins_for_i2c(&self, bus_id: u32) -> Result<[Pin; 2]>;

    /// `[miso, mosi, sclk]` plus the chip-select pin if the line has one
    fn default_pins_for_spi(&self, settings: &SpiConnectionSettings) -> Result<Vec<Pin>>;

    fn default_pin_for_pwm(&self, chip: u32, channel: u32) -> Result<Pin>;

    /// Bus used by [`Board::create_or_get_default_i2c_bus`](crate::Board::create_or_get_default_i2c_bus)
    fn default_i2c_bus_id(&self) -> u32 {
        0
    }

    /// Whether `dtoverlay` lines in the boot configuration apply to this board
    fn uses_boot_overlays(&self) -> bool {
        false
    }

    /// Conditional sections of the boot configuration (`[pi4]`, ...) that
    /// select this board
    fn config_filters(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Multiplexer function a pin needs for `usage` on `bus`. `Unknown` means
    /// the board selects nothing when the pin is reserved.
    fn alternate_mode(&self, _pin: Pin, usage: PinUsage, _bus: u32) -> Result<AlternatePinMode> {
        Ok(match usage {
            PinUsage::Gpio => AlternatePinMode::Gpio,
            _ => AlternatePinMode::Unknown,
        })
    }

    fn create_i2c_bus(&self, bus_id: u32, pins: &[Pin]) -> Result<Box<dyn I2cBusTransport>>;

    fn create_spi_device(&self, settings: &SpiConnectionSettings, pins: &[Pin]) -> Result<Box<dyn SpiTransport>>;

    fn create_pwm_channel(
        &self,
        chip: u32,
        channel: u32,
        pin: Pin,
        frequency: u32,
        duty_cycle: f64,
    ) -> Result<Box<dyn PwmTransport>>;
}

type ModelFactory = fn(&BoardConfig) -> Box<dyn BoardModel>;

fn raspberry_pi(config: &BoardConfig) -> Box<dyn BoardModel> {
    Box::new(RaspberryPiBoard::new(config))
}

fn generic(config: &BoardConfig) -> Box<dyn BoardModel> {
    Box::new(GenericBoard::new(config))
}

fn simulated(_config: &BoardConfig) -> Box<dyn BoardModel> {
    Box::new(SimulatedBoard::new())
}

/// Registry of known board models
pub static BOARD_MODELS: Lazy<HashMap<&'static str, ModelFactory>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, ModelFactory> = HashMap::new();
    m.insert("raspberry-pi", raspberry_pi);
    m.insert("rpi", raspberry_pi);
    m.insert("raspberrypi", raspberry_pi);
    m.insert("generic", generic);
    m.insert("default", generic);
    m.insert("simulated", simulated);
    m.insert("sim", simulated);
    m
});

/// Create a model by name or alias
pub fn create_model(name: &str, config: &BoardConfig) -> Option<Box<dyn BoardModel>> {
    BOARD_MODELS
        .get(name.to_lowercase().as_str())
        .map(|factory| factory(config))
}

/// Canonical model names (without aliases)
pub fn model_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = vec!["raspberry-pi", "generic", "simulated"];
    names.sort();
    names
}

/// Pick the model for this machine.
///
/// `Auto` tries the Raspberry Pi first and falls back to the generic board,
/// so this never fails.
pub fn probe_model(config: &BoardConfig) -> Box<dyn BoardModel> {
    match config.model {
        ModelSelection::RaspberryPi => raspberry_pi(config),
        ModelSelection::Generic => generic(config),
        ModelSelection::Auto => {
            if let Some(model) = RaspberryPiBoard::detect(config) {
                log::info!("Detected {}", model.description());
                return Box::new(model);
            }
            log::info!("No specific board detected, using the generic board");
            generic(config)
        }
    }
}

/// Error for a bus or channel a model has no table entry for
pub(crate) fn no_default(what: impl fmt::Display) -> BoardError {
    BoardError::UnsupportedConfiguration(format!("no default pin assignment for {}", what))
}
