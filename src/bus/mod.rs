//! Shared bus handles and the transport boundary
//!
//! The board hands out I2C buses and devices, SPI devices and PWM channels.
//! Each handle owns its pin reservation and wraps a transport object supplied
//! by the board model; this module defines those transport traits and the
//! connection settings callers pass in.

pub mod i2c;
pub mod pwm;
pub mod sim;
pub mod spi;

pub use i2c::{I2cBus, I2cDevice};
pub use pwm::PwmChannel;
pub use spi::SpiDevice;

use crate::error::Result;

/// Where an I2C device lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct I2cConnectionSettings {
    pub bus_id: u32,
    /// 7-bit device address
    pub device_address: u16,
}

impl I2cConnectionSettings {
    pub fn new(bus_id: u32, device_address: u16) -> Self {
        Self {
            bus_id,
            device_address,
        }
    }
}

/// SPI clock polarity/phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpiMode {
    #[default]
    Mode0,
    Mode1,
    Mode2,
    Mode3,
}

impl SpiMode {
    /// CPOL/CPHA bits as used by spidev
    pub fn bits(self) -> u8 {
        match self {
            SpiMode::Mode0 => 0,
            SpiMode::Mode1 => 1,
            SpiMode::Mode2 => 2,
            SpiMode::Mode3 => 3,
        }
    }
}

/// Where and how an SPI device is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpiConnectionSettings {
    pub bus_id: u32,
    /// Hardware chip-select line, `-1` when the device's CS is driven elsewhere
    pub chip_select_line: i32,
    pub mode: SpiMode,
    pub data_bit_length: u8,
    pub clock_frequency: u32,
}

impl SpiConnectionSettings {
    pub fn new(bus_id: u32, chip_select_line: i32) -> Self {
        Self {
            bus_id,
            chip_select_line,
            mode: SpiMode::Mode0,
            data_bit_length: 8,
            clock_frequency: 500_000,
        }
    }

    pub fn with_mode(mut self, mode: SpiMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_clock_frequency(mut self, hz: u32) -> Self {
        self.clock_frequency = hz;
        self
    }
}

/// An I2C controller able to open per-address device channels
pub trait I2cBusTransport: Send {
    fn create_device(&mut self, address: u16) -> Result<Box<dyn I2cDeviceTransport>>;
}

/// Byte transfers to a single I2C address
pub trait I2cDeviceTransport: Send {
    fn read(&mut self, buffer: &mut [u8]) -> Result<()>;
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Write then read without releasing the bus in between.
    /// The default issues two separate transfers.
    fn write_read(&mut self, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.write(write)?;
        self.read(read)
    }
}

/// Byte transfers to one SPI device
pub trait SpiTransport: Send {
    fn read(&mut self, buffer: &mut [u8]) -> Result<()>;
    fn write(&mut self, data: &[u8]) -> Result<()>;
    fn transfer_full_duplex(&mut self, write: &[u8], read: &mut [u8]) -> Result<()>;
}

/// A hardware PWM output
pub trait PwmTransport: Send {
    fn set_frequency(&mut self, hz: u32) -> Result<()>;
    /// `duty` in `0.0..=1.0`
    fn set_duty_cycle(&mut self, duty: f64) -> Result<()>;
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spi_settings_defaults() {
        let settings = SpiConnectionSettings::new(0, 1).with_mode(SpiMode::Mode3);
        assert_eq!(settings.data_bit_length, 8);
        assert_eq!(settings.mode.bits(), 3);
        assert_eq!(settings.clock_frequency, 500_000);
    }
}
