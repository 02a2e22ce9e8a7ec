//! Shared I2C buses and the devices on them
//!
//! An [`I2cBus`] is created once per bus id and owns the SDA/SCL reservation.
//! Devices only occupy an address slot: dropping a device frees the slot but
//! leaves the bus (and its pins) alone. Disposing the bus releases the pins,
//! drops the transport and turns every outstanding device into a disposed one.

use super::{I2cBusTransport, I2cConnectionSettings, I2cDeviceTransport};
use crate::board::BoardInner;
use crate::error::{BoardError, Result};
use crate::pins::{OwnerToken, Pin};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

static NEXT_SLOT: AtomicU64 = AtomicU64::new(1);

struct BusState {
    transport: Option<Box<dyn I2cBusTransport>>,
    /// address → slot id of the live device
    devices: HashMap<u16, u64>,
    disposed: bool,
}

pub(crate) struct I2cBusInner {
    bus_id: u32,
    /// Logical SDA/SCL
    pins: Vec<Pin>,
    owner: OwnerToken,
    board: Weak<BoardInner>,
    state: Mutex<BusState>,
}

/// Handle to a shared I2C bus. Clones refer to the same bus.
#[derive(Clone)]
pub struct I2cBus {
    inner: Arc<I2cBusInner>,
}

impl I2cBus {
    /// Wrap a transport whose pins were reserved under `owner`
    pub(crate) fn new(
        bus_id: u32,
        pins: Vec<Pin>,
        owner: OwnerToken,
        board: Weak<BoardInner>,
        transport: Box<dyn I2cBusTransport>,
    ) -> Self {
        log::debug!("Opened I2C bus {} on pins {:?}", bus_id, pins);
        Self {
            inner: Arc::new(I2cBusInner {
                bus_id,
                pins,
                owner,
                board,
                state: Mutex::new(BusState {
                    transport: Some(transport),
                    devices: HashMap::new(),
                    disposed: false,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn bus_id(&self) -> u32 {
        self.inner.bus_id
    }

    /// Logical pins the bus holds
    pub fn pins(&self) -> &[Pin] {
        &self.inner.pins
    }

    /// Token the pins are reserved under
    pub fn owner(&self) -> OwnerToken {
        self.inner.owner
    }

    /// Whether both handles refer to the same bus
    pub fn same_bus(&self, other: &I2cBus) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// Number of live device slots
    pub fn device_count(&self) -> usize {
        self.lock().devices.len()
    }

    /// Open a device at `address`; fails with `AddressInUse` while another
    /// live device holds the address
    pub fn create_device(&self, address: u16) -> Result<I2cDevice> {
        let mut state = self.lock();
        if state.disposed {
            return Err(BoardError::ObjectDisposed("I2cBus"));
        }
        if state.devices.contains_key(&address) {
            return Err(BoardError::AddressInUse {
                bus_id: self.inner.bus_id,
                address,
            });
        }

        let transport = state
            .transport
            .as_mut()
            .ok_or(BoardError::ObjectDisposed("I2cBus"))?
            .create_device(address)?;

        let slot = NEXT_SLOT.fetch_add(1, Ordering::Relaxed);
        state.devices.insert(address, slot);
        log::debug!("I2C bus {}: device at {:#04x} opened", self.inner.bus_id, address);

        Ok(I2cDevice {
            bus: self.clone(),
            settings: I2cConnectionSettings::new(self.inner.bus_id, address),
            slot,
            transport: Some(transport),
        })
    }

    /// Free the slot of `address`. The device handle that held it, if still
    /// around, reports `ObjectDisposed` from then on.
    pub fn remove_device(&self, address: u16) -> Result<()> {
        let mut state = self.lock();
        if state.disposed {
            return Err(BoardError::ObjectDisposed("I2cBus"));
        }
        if state.devices.remove(&address).is_none() {
            return Err(BoardError::InvalidArgument(format!(
                "no device at {:#04x} on I2C bus {}",
                address, self.inner.bus_id
            )));
        }
        log::debug!("I2C bus {}: device at {:#04x} removed", self.inner.bus_id, address);
        Ok(())
    }

    fn slot_is_live(&self, address: u16, slot: u64) -> bool {
        let state = self.lock();
        !state.disposed && state.devices.get(&address) == Some(&slot)
    }

    fn free_slot(&self, address: u16, slot: u64) {
        let mut state = self.lock();
        if state.devices.get(&address) == Some(&slot) {
            state.devices.remove(&address);
        }
    }

    /// Release the pins, drop the transport and unregister from the board.
    /// Idempotent.
    pub fn dispose(&self) -> Result<()> {
        let transport = {
            let mut state = self.lock();
            if state.disposed {
                return Ok(());
            }
            state.disposed = true;
            state.devices.clear();
            state.transport.take()
        };
        drop(transport);

        let result = match self.inner.board.upgrade() {
            Some(board) => board.close_i2c_bus(self),
            None => Ok(()),
        };
        log::debug!("Disposed I2C bus {}", self.inner.bus_id);
        result
    }
}

impl std::fmt::Debug for I2cBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I2cBus")
            .field("bus_id", &self.inner.bus_id)
            .field("pins", &self.inner.pins)
            .field("owner", &self.inner.owner)
            .finish()
    }
}

/// A device on a shared I2C bus
pub struct I2cDevice {
    bus: I2cBus,
    settings: I2cConnectionSettings,
    slot: u64,
    transport: Option<Box<dyn I2cDeviceTransport>>,
}

impl I2cDevice {
    pub fn connection_settings(&self) -> I2cConnectionSettings {
        self.settings
    }

    /// The bus this device lives on
    pub fn bus(&self) -> &I2cBus {
        &self.bus
    }

    fn transport(&mut self) -> Result<&mut Box<dyn I2cDeviceTransport>> {
        if !self.bus.slot_is_live(self.settings.device_address, self.slot) {
            self.transport = None;
        }
        self.transport
            .as_mut()
            .ok_or(BoardError::ObjectDisposed("I2cDevice"))
    }

    pub fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.transport()?.read(buffer)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.transport()?.write(data)
    }

    pub fn write_read(&mut self, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.transport()?.write_read(write, read)
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
        self.transport.is_none() || !self.bus.slot_is_live(self.settings.device_address, self.slot)
    }

    /// Free the address slot; the bus stays open
    pub fn dispose(&mut self) {
        if self.transport.take().is_some() {
            self.bus.free_slot(self.settings.device_address, self.slot);
            log::debug!(
                "I2C bus {}: device at {:#04x} disposed",
                self.settings.bus_id,
                self.settings.device_address
            );
        }
    }
}

impl Drop for I2cDevice {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for I2cDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I2cDevice")
            .field("settings", &self.settings)
            .field("slot", &self.slot)
            .finish()
    }
}
