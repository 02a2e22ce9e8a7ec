//! In-memory board for tests and demonstrations
//!
//! Identity numbering over 28 pins unless a translator is supplied. I2C bus 0
//! sits on pins 0/1; SPI bus 0 uses 2/3/4 with CE0 on pin 10. Those pins and
//! the PWM pins 12/13 switch to ALT0 when reserved for their bus. Every SPI
//! device the board builds is recorded with the pins it received.

use super::{no_default, AlternatePinMode, BoardModel};
use crate::bus::sim::{SimulatedI2cBus, SimulatedPwmChannel, SimulatedSpiDevice};
use crate::bus::{I2cBusTransport, PwmTransport, SpiConnectionSettings, SpiTransport};
use crate::error::Result;
use crate::gpio::{GpioDriver, SimulatedGpioDriver};
use crate::pins::{Pin, PinNumberingTranslator, PinUsage};
use std::sync::{Arc, Mutex};

pub const SIMULATED_PIN_COUNT: usize = 28;

/// Record of a simulated SPI device: settings and the logical pins it got
pub type SpiCreation = (SpiConnectionSettings, Vec<Pin>);

pub struct SimulatedBoard {
    translator: PinNumberingTranslator,
    driver: Arc<SimulatedGpioDriver>,
    spi_devices: Arc<Mutex<Vec<SpiCreation>>>,
}

impl SimulatedBoard {
    pub fn new() -> Self {
        Self::with_driver(SimulatedGpioDriver::new(SIMULATED_PIN_COUNT))
    }

    /// Use a pre-configured driver
    pub fn with_driver(driver: SimulatedGpioDriver) -> Self {
        Self {
            translator: PinNumberingTranslator::identity(SIMULATED_PIN_COUNT),
            driver: Arc::new(driver),
            spi_devices: Arc::default(),
        }
    }

    pub fn with_translator(mut self, translator: PinNumberingTranslator) -> Self {
        self.translator = translator;
        self
    }

    /// The driver handed to the board, for inspecting pin state
    pub fn gpio_driver(&self) -> Arc<SimulatedGpioDriver> {
        Arc::clone(&self.driver)
    }

    /// Shared log of SPI devices created so far
    pub fn spi_devices(&self) -> Arc<Mutex<Vec<SpiCreation>>> {
        Arc::clone(&self.spi_devices)
    }
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardModel for SimulatedBoard {
    fn name(&self) -> &str {
        "simulated"
    }

    fn description(&self) -> String {
        format!("Simulated board ({} pins)", self.translator.pin_count())
    }

    fn translator(&self) -> &PinNumberingTranslator {
        &self.translator
    }

    fn create_gpio_driver(&self) -> Result<Arc<dyn GpioDriver>> {
        Ok(self.driver.clone())
    }

    fn default_pins_for_i2c(&self, bus_id: u32) -> Result<[Pin; 2]> {
        match bus_id {
            0 => Ok([0, 1]),
            _ => Err(no_default(format_args!("simulated I2C bus {}", bus_id))),
        }
    }

    fn default_pins_for_spi(&self, settings: &SpiConnectionSettings) -> Result<Vec<Pin>> {
        if settings.bus_id != 0 {
            return Err(no_default(format_args!("simulated SPI bus {}", settings.bus_id)));
        }
        match settings.chip_select_line {
            // CE0 is logical pin 10
            0 | -1 => Ok(vec![2, 3, 4, 10]),
            _ => Ok(vec![2, 3, 4]),
        }
    }

    fn default_pin_for_pwm(&self, chip: u32, channel: u32) -> Result<Pin> {
        match (chip, channel) {
            (0, 0) => Ok(12),
            (0, 1) => Ok(13),
            _ => Err(no_default(format_args!("simulated PWM chip {} channel {}", chip, channel))),
        }
    }

    fn alternate_mode(&self, pin: Pin, usage: PinUsage, _bus: u32) -> Result<AlternatePinMode> {
        Ok(match (usage, pin) {
            (PinUsage::Gpio, _) => AlternatePinMode::Gpio,
            (PinUsage::I2c, 0 | 1) | (PinUsage::Spi, 2 | 3 | 4 | 10) | (PinUsage::Pwm, 12 | 13) => {
                AlternatePinMode::Alt0
            }
            _ => AlternatePinMode::Unknown,
        })
    }

    fn create_i2c_bus(&self, bus_id: u32, pins: &[Pin]) -> Result<Box<dyn I2cBusTransport>> {
        Ok(Box::new(SimulatedI2cBus::new(bus_id, pins)))
    }

    fn create_spi_device(&self, settings: &SpiConnectionSettings, pins: &[Pin]) -> Result<Box<dyn SpiTransport>> {
        self.spi_devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((*settings, pins.to_vec()));
        Ok(Box::new(SimulatedSpiDevice::new(*settings, pins)))
    }

    fn create_pwm_channel(
        &self,
        _chip: u32,
        _channel: u32,
        _pin: Pin,
        frequency: u32,
        duty_cycle: f64,
    ) -> Result<Box<dyn PwmTransport>> {
        let mut channel = SimulatedPwmChannel::default();
        channel.set_frequency(frequency)?;
        channel.set_duty_cycle(duty_cycle)?;
        Ok(Box::new(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SpiConnectionSettings;

    #[test]
    fn test_default_tables() {
        let board = SimulatedBoard::new();
        assert_eq!(board.default_pins_for_i2c(0).unwrap(), [0, 1]);
        assert!(board.default_pins_for_i2c(1).is_err());
        assert_eq!(
            board.default_pins_for_spi(&SpiConnectionSettings::new(0, -1)).unwrap(),
            vec![2, 3, 4, 10]
        );
        assert_eq!(
            board.default_pins_for_spi(&SpiConnectionSettings::new(0, 2)).unwrap(),
            vec![2, 3, 4]
        );
        assert_eq!(board.default_pin_for_pwm(0, 1).unwrap(), 13);
        assert!(!board.uses_boot_overlays());
    }

    #[test]
    fn test_alternate_modes() {
        let board = SimulatedBoard::new();
        assert_eq!(board.alternate_mode(1, PinUsage::I2c, 0).unwrap(), AlternatePinMode::Alt0);
        assert_eq!(board.alternate_mode(10, PinUsage::Spi, 0).unwrap(), AlternatePinMode::Alt0);
        assert_eq!(board.alternate_mode(12, PinUsage::Pwm, 0).unwrap(), AlternatePinMode::Alt0);
        assert_eq!(board.alternate_mode(5, PinUsage::Gpio, 0).unwrap(), AlternatePinMode::Gpio);
        // Pins off the default tables have no known function
        assert_eq!(board.alternate_mode(5, PinUsage::I2c, 0).unwrap(), AlternatePinMode::Unknown);
    }

    #[test]
    fn test_records_spi_devices() {
        let board = SimulatedBoard::new();
        let log = board.spi_devices();
        let settings = SpiConnectionSettings::new(0, 1);
        let mut device = board.create_spi_device(&settings, &[2, 3, 4]).unwrap();
        let mut buf = [0u8; 2];
        device.read(&mut buf).unwrap();
        assert_eq!(buf, [0xF8, 0xF8]);
        assert_eq!(log.lock().unwrap().as_slice(), &[(settings, vec![2, 3, 4])]);
    }

    #[test]
    fn test_shares_driver() {
        let board = SimulatedBoard::new();
        let driver = board.create_gpio_driver().unwrap();
        driver.open_pin(5).unwrap();
        assert!(board.gpio_driver().is_open(5));
    }
}
