//! Fallback board for machines no other model recognizes
//!
//! Logical and board numbers coincide. There are no hardwired buses, so I2C,
//! SPI and PWM need explicit pins; the transports are the Linux device nodes.

use super::{no_default, BoardModel};
use crate::bus::{I2cBusTransport, PwmTransport, SpiConnectionSettings, SpiTransport};
use crate::config::BoardConfig;
use crate::error::Result;
use crate::gpio::GpioDriver;
use crate::linux::{SysfsGpioDriver, SysfsPwmChannel, UnixI2cBus, UnixSpiDevice};
use crate::pins::{Pin, PinNumberingTranslator};
use std::path::PathBuf;
use std::sync::Arc;

pub struct GenericBoard {
    translator: PinNumberingTranslator,
    gpio_root: PathBuf,
    pwm_root: PathBuf,
    dev_root: PathBuf,
}

impl GenericBoard {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            translator: PinNumberingTranslator::identity(config.generic_pin_count),
            gpio_root: config.sysfs_gpio_root.clone(),
            pwm_root: config.sysfs_pwm_root.clone(),
            dev_root: config.dev_root.clone(),
        }
    }
}

impl BoardModel for GenericBoard {
    fn name(&self) -> &str {
        "generic"
    }

    fn description(&self) -> String {
        format!("Generic board ({} pins, identity numbering)", self.translator.pin_count())
    }

    fn translator(&self) -> &PinNumberingTranslator {
        &self.translator
    }

    fn create_gpio_driver(&self) -> Result<Arc<dyn GpioDriver>> {
        Ok(Arc::new(SysfsGpioDriver::open(&self.gpio_root, self.translator.pin_count())?))
    }

    fn default_pins_for_i2c(&self, bus_id: u32) -> Result<[Pin; 2]> {
        Err(no_default(format_args!("I2C bus {} on a generic board", bus_id)))
    }

    fn default_pins_for_spi(&self, settings: &SpiConnectionSettings) -> Result<Vec<Pin>> {
        Err(no_default(format_args!("SPI bus {} on a generic board", settings.bus_id)))
    }

    fn default_pin_for_pwm(&self, chip: u32, channel: u32) -> Result<Pin> {
        Err(no_default(format_args!("PWM chip {} channel {} on a generic board", chip, channel)))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoardError;
    use crate::pins::PinNumberingScheme::{Board, Logical};

    #[test]
    fn test_identity_numbering() {
        let config = BoardConfig {
            generic_pin_count: 8,
            ..BoardConfig::default()
        };
        let board = GenericBoard::new(&config);
        let t = board.translator();
        assert_eq!(t.convert(5, Logical, Board).unwrap(), 5);
        assert!(t.convert(8, Board, Logical).is_err());
        assert_eq!(t.pin_count(), 8);
    }

    #[test]
    fn test_no_hardwired_buses() {
        let board = GenericBoard::new(&BoardConfig::default());
        assert!(matches!(board.default_pins_for_i2c(1), Err(BoardError::UnsupportedConfiguration(_))));
        assert!(board.default_pins_for_spi(&SpiConnectionSettings::new(0, 0)).is_err());
        assert!(board.default_pin_for_pwm(0, 0).is_err());
    }

    #[test]
    fn test_gpio_driver_needs_sysfs() {
        let dir = tempfile::tempdir().unwrap();
        let config = BoardConfig {
            sysfs_gpio_root: dir.path().join("missing"),
            ..BoardConfig::default()
        };
        assert!(GenericBoard::new(&config).create_gpio_driver().is_err());
    }
}
