//! In-memory transports used by the simulated board
//!
//! I2C devices read `0xFF`, SPI devices read `0xF8`; writes are recorded so
//! tests can inspect what went over the "wire".

use super::{I2cBusTransport, I2cDeviceTransport, PwmTransport, SpiConnectionSettings, SpiTransport};
use crate::error::{BoardError, Result};
use crate::pins::Pin;
use std::sync::{Arc, Mutex};

/// Byte every simulated I2C read returns
pub const I2C_IDLE_BYTE: u8 = 0xFF;

/// Byte every simulated SPI read returns
pub const SPI_IDLE_BYTE: u8 = 0xF8;

/// Shared log of bytes written through a simulated transport
pub type WriteLog = Arc<Mutex<Vec<u8>>>;

fn append(log: &WriteLog, data: &[u8]) {
    log.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(data);
}

/// Simulated I2C controller
#[derive(Debug)]
pub struct SimulatedI2cBus {
    pub bus_id: u32,
    pub pins: Vec<Pin>,
}

impl SimulatedI2cBus {
    pub fn new(bus_id: u32, pins: &[Pin]) -> Self {
        Self {
            bus_id,
            pins: pins.to_vec(),
        }
    }
}

impl I2cBusTransport for SimulatedI2cBus {
    fn create_device(&mut self, address: u16) -> Result<Box<dyn I2cDeviceTransport>> {
        if address > 0x7F {
            return Err(BoardError::InvalidArgument(format!(
                "{:#x} is not a 7-bit I2C address",
                address
            )));
        }
        Ok(Box::new(SimulatedI2cDevice {
            address,
            written: WriteLog::default(),
        }))
    }
}

/// Simulated I2C device
#[derive(Debug)]
pub struct SimulatedI2cDevice {
    pub address: u16,
    pub written: WriteLog,
}

impl I2cDeviceTransport for SimulatedI2cDevice {
    fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        buffer.fill(I2C_IDLE_BYTE);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        append(&self.written, data);
        Ok(())
    }
}

/// Simulated SPI device; remembers the pins it was created with
#[derive(Debug)]
pub struct SimulatedSpiDevice {
    pub settings: SpiConnectionSettings,
    pub pins: Vec<Pin>,
    pub written: WriteLog,
}

impl SimulatedSpiDevice {
    pub fn new(settings: SpiConnectionSettings, pins: &[Pin]) -> Self {
        Self {
            settings,
            pins: pins.to_vec(),
            written: WriteLog::default(),
        }
    }
}

impl SpiTransport for SimulatedSpiDevice {
    fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        buffer.fill(SPI_IDLE_BYTE);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        append(&self.written, data);
        Ok(())
    }

    fn transfer_full_duplex(&mut self, write: &[u8], read: &mut [u8]) -> Result<()> {
        if write.len() != read.len() {
            return Err(BoardError::InvalidArgument(format!(
                "full-duplex buffers differ in length ({} vs {})",
                write.len(),
                read.len()
            )));
        }
        append(&self.written, write);
        read.fill(SPI_IDLE_BYTE);
        Ok(())
    }
}

/// Last settings applied to a simulated PWM channel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PwmState {
    pub frequency: u32,
    pub duty_cycle: f64,
    pub running: bool,
}

/// Simulated PWM channel
#[derive(Debug, Default)]
pub struct SimulatedPwmChannel {
    pub state: Arc<Mutex<PwmState>>,
}

impl SimulatedPwmChannel {
    fn update(&self, f: impl FnOnce(&mut PwmState)) {
        f(&mut self.state.lock().unwrap_or_else(|e| e.into_inner()));
    }
}

impl PwmTransport for SimulatedPwmChannel {
    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        self.update(|s| s.frequency = hz);
        Ok(())
    }

    fn set_duty_cycle(&mut self, duty: f64) -> Result<()> {
        self.update(|s| s.duty_cycle = duty);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.update(|s| s.running = true);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.update(|s| s.running = false);
        Ok(())
    }
}
