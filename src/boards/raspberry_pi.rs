//! Raspberry Pi (40-pin header) board model
//!
//! Default pin tables for the BCM283x/BCM2711 I2C, SPI and PWM blocks and
//! the header-position ↔ BCM GPIO numbering. Power and ground positions of
//! the header have no logical counterpart and are rejected by the translator.

use super::{no_default, AlternatePinMode, BoardModel};
use crate::bus::{I2cBusTransport, PwmTransport, SpiConnectionSettings, SpiTransport};
use crate::config::BoardConfig;
use crate::error::{BoardError, Result};
use crate::gpio::GpioDriver;
use crate::linux::{SysfsGpioDriver, SysfsPwmChannel, UnixI2cBus, UnixSpiDevice};
use crate::pins::{Pin, PinNumberingTranslator, PinUsage};
use once_cell::sync::Lazy;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Number of BCM GPIOs routed to the header
pub const RPI_PIN_COUNT: usize = 28;

/// (BCM GPIO, header position)
const HEADER_TABLE: &[(Pin, Pin)] = &[
    (0, 27),
    (1, 28),
    (2, 3),
    (3, 5),
    (4, 7),
    (5, 29),
    (6, 31),
    (7, 26),
    (8, 24),
    (9, 21),
    (10, 19),
    (11, 23),
    (12, 32),
    (13, 33),
    (14, 8),
    (15, 10),
    (16, 36),
    (17, 11),
    (18, 12),
    (19, 35),
    (20, 38),
    (21, 40),
    (22, 15),
    (23, 16),
    (24, 18),
    (25, 22),
    (26, 37),
    (27, 13),
];

static RPI_TRANSLATOR: Lazy<PinNumberingTranslator> = Lazy::new(|| {
    PinNumberingTranslator::from_pairs(HEADER_TABLE).expect("Raspberry Pi header table is a bijection")
});

/// `[sda, scl]` per bus; bus 2 is not routed on any model
const I2C_PINS: &[(u32, [Pin; 2])] = &[
    (0, [0, 1]),
    (1, [2, 3]),
    (3, [4, 5]),
    (4, [6, 7]),
    (5, [10, 11]),
    (6, [22, 23]),
];

/// (bus, [miso, mosi, sclk], chip selects)
const SPI_PINS: &[(u32, [Pin; 3], &[Pin])] = &[
    (0, [9, 10, 11], &[8, 7]),
    (1, [19, 20, 21], &[18, 17, 16]),
    (3, [1, 2, 3], &[0, 24]),
    (4, [5, 6, 7], &[4, 25]),
    (5, [13, 14, 15], &[12, 26]),
    (6, [19, 20, 21], &[18, 27]),
];

/// PWM0 channels on their default pins; 18/19 work too but need an overlay
const PWM_PINS: &[(u32, u32, Pin)] = &[(0, 0, 12), (0, 1, 13)];

/// Firmware filters per device-tree model string, most specific first
const FIRMWARE_FILTERS: &[(&str, &[&str])] = &[
    ("Compute Module 5", &["pi5", "cm5"]),
    ("Pi 500", &["pi5", "pi500"]),
    ("Pi 5", &["pi5"]),
    ("Compute Module 4", &["pi4", "cm4"]),
    ("Pi 400", &["pi4", "pi400"]),
    ("Pi 4", &["pi4"]),
    ("Pi 3 Model B Plus", &["pi3", "pi3+"]),
    ("Pi 3 Model A Plus", &["pi3", "pi3+"]),
    ("Compute Module 3", &["pi3"]),
    ("Pi 3", &["pi3"]),
    ("Zero 2", &["pi0", "pi02"]),
    ("Zero W", &["pi0", "pi0w"]),
    ("Zero", &["pi0"]),
    ("Pi 2", &["pi2"]),
    ("Compute Module", &["pi1"]),
    ("Pi Model", &["pi1"]),
];

pub struct RaspberryPiBoard {
    model: String,
    gpio_root: PathBuf,
    pwm_root: PathBuf,
    dev_root: PathBuf,
}

impl RaspberryPiBoard {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            model: "Raspberry Pi".to_string(),
            gpio_root: config.sysfs_gpio_root.clone(),
            pwm_root: config.sysfs_pwm_root.clone(),
            dev_root: config.dev_root.clone(),
        }
    }

    /// The board if the device-tree model string names a Raspberry Pi
    pub fn detect(config: &BoardConfig) -> Option<Self> {
        let raw = fs::read_to_string(&config.device_tree_model_path).ok()?;
        let model = raw.trim_end_matches('\0').trim();
        if !model.starts_with("Raspberry Pi") {
            log::debug!("Device-tree model '{}' is not a Raspberry Pi", model);
            return None;
        }
        Some(Self {
            model: model.to_string(),
            ..Self::new(config)
        })
    }
}

impl BoardModel for RaspberryPiBoard {
    fn name(&self) -> &str {
        "raspberry-pi"
    }

    fn description(&self) -> String {
        format!("{} (40-pin header, {} GPIOs)", self.model, RPI_PIN_COUNT)
    }

    fn translator(&self) -> &PinNumberingTranslator {
        &RPI_TRANSLATOR
    }

    fn create_gpio_driver(&self) -> Result<Arc<dyn GpioDriver>> {
        Ok(Arc::new(SysfsGpioDriver::open(&self.gpio_root, RPI_PIN_COUNT)?))
    }

    fn default_pins_for_i2c(&self, bus_id: u32) -> Result<[Pin; 2]> {
        if bus_id == 2 {
            return Err(BoardError::UnsupportedConfiguration(
                "I2C bus 2 does not exist on the Raspberry Pi".into(),
            ));
        }
        I2C_PINS
            .iter()
            .find(|(bus, _)| *bus == bus_id)
            .map(|(_, pins)| *pins)
            .ok_or_else(|| no_default(format_args!("I2C bus {}", bus_id)))
    }

    fn default_pins_for_spi(&self, settings: &SpiConnectionSettings) -> Result<Vec<Pin>> {
        let cs = settings.chip_select_line;
        // Only two hardware chip selects, three on SPI1
        if !(-1..=1).contains(&cs) && !(settings.bus_id == 1 && cs == 2) {
            return Err(BoardError::InvalidArgument(format!(
                "chip select line {} is not available on SPI bus {}",
                cs, settings.bus_id
            )));
        }

        let (_, lines, chip_selects) = SPI_PINS
            .iter()
            .find(|(bus, _, _)| *bus == settings.bus_id)
            .ok_or_else(|| no_default(format_args!("SPI bus {}", settings.bus_id)))?;

        let mut pins = lines.to_vec();
        if cs >= 0 {
            if let Some(pin) = chip_selects.get(cs as usize) {
                pins.push(*pin);
            }
        }
        Ok(pins)
    }

    fn default_pin_for_pwm(&self, chip: u32, channel: u32) -> Result<Pin> {
        PWM_PINS
            .iter()
            .find(|(c, ch, _)| *c == chip && *ch == channel)
            .map(|(_, _, pin)| *pin)
            .ok_or_else(|| no_default(format_args!("PWM chip {} channel {}", chip, channel)))
    }

    fn default_i2c_bus_id(&self) -> u32 {
        1
    }

    fn uses_boot_overlays(&self) -> bool {
        true
    }

    /// Empty until the exact model has been detected
    fn config_filters(&self) -> Vec<&'static str> {
        FIRMWARE_FILTERS
            .iter()
            .find(|(marker, _)| self.model.contains(*marker))
            .map(|(_, filters)| filters.to_vec())
            .unwrap_or_default()
    }

    fn alternate_mode(&self, pin: Pin, usage: PinUsage, bus: u32) -> Result<AlternatePinMode> {
        if pin < 0 || pin as usize >= RPI_PIN_COUNT {
            return Err(BoardError::InvalidPinNumber {
                pin,
                scheme: crate::pins::PinNumberingScheme::Logical,
            });
        }

        let unsupported = || {
            BoardError::UnsupportedConfiguration(format!("pin {} has no {} function", pin, usage))
        };

        use AlternatePinMode::*;
        match usage {
            PinUsage::Gpio => Ok(Gpio),
            PinUsage::Unknown => Err(unsupported()),
            PinUsage::I2c => match pin {
                0..=3 => Ok(Alt0),
                4..=14 | 22 | 23 => Ok(Alt5),
                _ => Err(unsupported()),
            },
            PinUsage::Pwm => match pin {
                12 | 13 => Ok(Alt0),
                18 | 19 => Ok(Alt5),
                _ => Err(unsupported()),
            },
            PinUsage::Spi => match pin {
                // GPIO7 is CE1 of SPI0 or MOSI of SPI4
                7 => Ok(if bus == 0 { Alt0 } else { Alt3 }),
                8..=11 => Ok(Alt0),
                0..=6 | 12..=15 => Ok(Alt3),
                16 | 17 => Ok(Alt4),
                18..=21 => Ok(if bus == 6 { Alt3 } else { Alt4 }),
                24..=27 => Ok(Alt5),
                _ => Err(unsupported()),
            },
        }
    }

    fn create_i2c_bus(&self, bus_id: u32, _pins: &[Pin]) -> Result<Box<dyn I2cBusTransport>> {
        Ok(Box::new(UnixI2cBus::open(&self.dev_root, bus_id)?))
    }

    fn create_spi_device(&self, settings: &SpiConnectionSettings, _pins: &[Pin]) -> Result<Box<dyn SpiTransport>> {
        Ok(Box::new(UnixSpiDevice::open(&self.dev_root, settings)?))
    }

    fn create_pwm_channel(
        &self,
        chip: u32,
        channel: u32,
        _pin: Pin,
        frequency: u32,
        duty_cycle: f64,
    ) -> Result<Box<dyn PwmTransport>> {
        Ok(Box::new(SysfsPwmChannel::open(
            &self.pwm_root,
            chip,
            channel,
            frequency,
            duty_cycle,
        )?))
    }
}
