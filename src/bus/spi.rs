//! SPI devices sharing clock and data lines
//!
//! Every device on a bus reserves the same MISO/MOSI/SCLK lines. The board
//! keeps one reservation per (bus id, lines) with a reference count, so the
//! lines stay reserved until the last device on them is gone. A device's own
//! chip-select pin is reserved exclusively under the device's token.

use super::{SpiConnectionSettings, SpiTransport};
use crate::board::BoardInner;
use crate::error::{BoardError, Result};
use crate::pins::{OwnerToken, Pin};
use std::sync::Arc;

/// An SPI device handed out by the board
pub struct SpiDevice {
    board: Arc<BoardInner>,
    settings: SpiConnectionSettings,
    /// Logical `[miso, mosi, sclk, cs?]` as resolved, `-1` for unused lines
    pins: Vec<Pin>,
    lines: Vec<Pin>,
    chip_select: Option<Pin>,
    owner: OwnerToken,
    transport: Option<Box<dyn SpiTransport>>,
}

impl SpiDevice {
    pub(crate) fn new(
        board: Arc<BoardInner>,
        settings: SpiConnectionSettings,
        pins: Vec<Pin>,
        lines: Vec<Pin>,
        chip_select: Option<Pin>,
        owner: OwnerToken,
        transport: Box<dyn SpiTransport>,
    ) -> Self {
        log::debug!(
            "Opened SPI device on bus {} cs {} (pins {:?})",
            settings.bus_id,
            settings.chip_select_line,
            pins
        );
        Self {
            board,
            settings,
            pins,
            lines,
            chip_select,
            owner,
            transport: Some(transport),
        }
    }

    pub fn connection_settings(&self) -> SpiConnectionSettings {
        self.settings
    }

    /// Logical pins of this device, `[miso, mosi, sclk]` plus the chip select
    /// if it has one; `-1` marks an unused line
    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    /// Logical chip-select pin reserved by this device
    pub fn chip_select_pin(&self) -> Option<Pin> {
        self.chip_select
    }

    fn transport(&mut self) -> Result<&mut Box<dyn SpiTransport>> {
        self.transport
            .as_mut()
            .ok_or(BoardError::ObjectDisposed("SpiDevice"))
    }

    pub fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.transport()?.read(buffer)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.transport()?.write(data)
    }

    pub fn transfer_full_duplex(&mut self, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.transport()?.transfer_full_duplex(write, read)
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read(&mut buf)?;
        Ok(buf[0])
    }

    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.write(&[value])
    }

    pub fn is_disposed(&self) -> bool {
        self.transport.is_none()
    }

    /// Drop the transport, release the chip select and give up this
    /// device's share of the bus lines. Idempotent.
    pub fn dispose(&mut self) -> Result<()> {
        let Some(transport) = self.transport.take() else {
            return Ok(());
        };
        drop(transport);
        let result = self.board.close_spi_device(
            self.settings.bus_id,
            &self.lines,
            self.chip_select,
            self.owner,
        );
        log::debug!(
            "Disposed SPI device on bus {} cs {}",
            self.settings.bus_id,
            self.settings.chip_select_line
        );
        result
    }
}

impl Drop for SpiDevice {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            log::warn!("Releasing SPI pins failed: {}", e);
        }
    }
}

impl std::fmt::Debug for SpiDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpiDevice")
            .field("settings", &self.settings)
            .field("pins", &self.pins)
            .field("owner", &self.owner)
            .finish()
    }
}
