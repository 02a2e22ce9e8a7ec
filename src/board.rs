//! The board: composition root for pins, buses and controllers
//!
//! A [`Board`] owns one pin registry, the lazily created GPIO driver, the
//! lazily parsed overlay configuration, the I2C buses keyed by bus id and the
//! shared SPI line reservations. All bookkeeping sits behind one mutex; the
//! handles the board returns share that state through an `Arc`.
//!
//! Pin resolution for buses follows a fixed precedence: an explicit pin list
//! (in the board's default numbering), then an overlay directive from the boot
//! configuration, then the model's default table. Everything is converted to
//! logical numbers before it reaches the registry.
//!
//! Pins reserved for I2C, SPI or PWM are switched to the multiplexer function
//! the model names for them. A pin the registry has never seen reports the
//! usage its current hardware function suggests.

use crate::boards::{probe_model, AlternatePinMode, BoardModel};
use crate::bus::{I2cBus, I2cConnectionSettings, I2cDevice, PwmChannel, SpiConnectionSettings, SpiDevice};
use crate::config::BoardConfig;
use crate::error::{BoardError, Result};
use crate::gpio::{GpioController, GpioDriver, NullGpioDriver};
use crate::overlay::OverlayConfig;
use crate::pins::{OwnerToken, Pin, PinNumberingScheme, PinRegistry, PinUsage, UNASSIGNED_PIN};
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Reservation of the MISO/MOSI/SCLK lines of one SPI bus
#[derive(Debug)]
struct SharedLines {
    owner: OwnerToken,
    refs: usize,
}

type SpiLineKey = (u32, Vec<Pin>);

#[derive(Default)]
pub(crate) struct BoardState {
    registry: PinRegistry,
    i2c_buses: BTreeMap<u32, I2cBus>,
    spi_lines: HashMap<SpiLineKey, SharedLines>,
    disposed: bool,
}

impl BoardState {
    /// Take one reference on the lines of `key`, reserving them on first use.
    /// Returns whether this call reserved them.
    fn acquire_spi_lines(&mut self, key: &SpiLineKey) -> Result<bool> {
        if let Some(shared) = self.spi_lines.get_mut(key) {
            shared.refs += 1;
            return Ok(false);
        }
        let owner = OwnerToken::new();
        self.registry.reserve_all(&key.1, PinUsage::Spi, owner)?;
        self.spi_lines.insert(key.clone(), SharedLines { owner, refs: 1 });
        log::debug!("SPI bus {}: lines {:?} reserved ({})", key.0, key.1, owner);
        Ok(true)
    }

    /// Drop one reference; the last one releases the lines
    fn release_spi_lines(&mut self, key: &SpiLineKey) -> Result<()> {
        let Some(shared) = self.spi_lines.get_mut(key) else {
            return Ok(());
        };
        shared.refs -= 1;
        if shared.refs > 0 {
            return Ok(());
        }
        let owner = shared.owner;
        self.spi_lines.remove(key);
        log::debug!("SPI bus {}: lines {:?} released", key.0, key.1);
        self.registry.release_all(&key.1, PinUsage::Spi, owner)
    }
}

pub(crate) struct BoardInner {
    model: Box<dyn BoardModel>,
    config: BoardConfig,
    driver: OnceCell<Arc<dyn GpioDriver>>,
    overlay: OnceCell<OverlayConfig>,
    state: Mutex<BoardState>,
}

impl BoardInner {
    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_live(&self) -> Result<MutexGuard<'_, BoardState>> {
        let state = self.lock();
        if state.disposed {
            return Err(BoardError::ObjectDisposed("Board"));
        }
        Ok(state)
    }

    fn scheme(&self) -> PinNumberingScheme {
        self.config.numbering
    }

    pub(crate) fn to_logical(&self, pin: Pin, scheme: PinNumberingScheme) -> Result<Pin> {
        self.model
            .translator()
            .convert(pin, scheme, PinNumberingScheme::Logical)
    }

    fn from_logical(&self, pin: Pin, scheme: PinNumberingScheme) -> Result<Pin> {
        self.model
            .translator()
            .convert(pin, PinNumberingScheme::Logical, scheme)
    }

    /// Memoized driver; a model that cannot build one gets the no-op driver
    fn driver(&self) -> Arc<dyn GpioDriver> {
        self.driver
            .get_or_init(|| match self.model.create_gpio_driver() {
                Ok(driver) => driver,
                Err(e) => {
                    log::warn!(
                        "No GPIO driver for {} ({}), falling back to a no-op driver",
                        self.model.name(),
                        e
                    );
                    Arc::new(NullGpioDriver)
                }
            })
            .clone()
    }

    fn overlay(&self) -> &OverlayConfig {
        self.overlay.get_or_init(|| {
            if !self.model.uses_boot_overlays() {
                return OverlayConfig::empty();
            }
            let Some(path) = self.config.resolve_boot_config_path() else {
                log::debug!("No boot configuration found, using default pin assignments");
                return OverlayConfig::empty();
            };
            match OverlayConfig::parse(&path) {
                Ok(config) => config.for_board(&self.model.config_filters()),
                Err(e) => {
                    log::warn!("Ignoring boot configuration: {}", e);
                    OverlayConfig::empty()
                }
            }
        })
    }

    pub(crate) fn reserve_pin(&self, pin: Pin, usage: PinUsage, owner: OwnerToken) -> Result<()> {
        self.lock_live()?.registry.reserve_pin(pin, usage, owner)
    }

    /// Route each pin to the function `usage` needs on `bus`. Pins the model
    /// has no function for are left alone.
    fn activate_pin_modes(&self, driver: &dyn GpioDriver, pins: &[Pin], usage: PinUsage, bus: u32) -> Result<()> {
        for &pin in pins {
            let mode = match self.model.alternate_mode(pin, usage, bus) {
                Ok(mode) => mode,
                Err(e) => {
                    log::debug!("Pin {} keeps its function for {}: {}", pin, usage, e);
                    continue;
                }
            };
            if mode != AlternatePinMode::Unknown {
                driver.set_alternate_pin_mode(pin, mode)?;
                log::debug!("Pin {} switched to {} for {}", pin, mode, usage);
            }
        }
        Ok(())
    }

    /// Usage suggested by the function `pin` is currently routed to
    fn hardware_pin_usage(&self, pin: Pin) -> Result<PinUsage> {
        let mode = self.driver().get_alternate_pin_mode(pin)?;
        match mode {
            AlternatePinMode::Unknown => return Ok(PinUsage::Unknown),
            AlternatePinMode::Gpio => return Ok(PinUsage::Gpio),
            _ => {}
        }
        // Several usages can share one ALT mode; the first match wins
        Ok([PinUsage::I2c, PinUsage::Spi, PinUsage::Pwm]
            .into_iter()
            .find(|usage| matches!(self.model.alternate_mode(pin, *usage, 0), Ok(m) if m == mode))
            .unwrap_or(PinUsage::Unknown))
    }

    pub(crate) fn release_pin(&self, pin: Pin, usage: PinUsage, owner: OwnerToken) -> Result<()> {
        self.lock().registry.release_pin(pin, usage, owner)
    }

    pub(crate) fn release_pins(&self, pins: &[Pin], usage: PinUsage, owner: OwnerToken) -> Result<()> {
        self.lock().registry.release_all(pins, usage, owner)
    }

    /// Unregister a disposed bus and give its pins back
    pub(crate) fn close_i2c_bus(&self, bus: &I2cBus) -> Result<()> {
        let mut state = self.lock();
        if state
            .i2c_buses
            .get(&bus.bus_id())
            .is_some_and(|registered| registered.same_bus(bus))
        {
            state.i2c_buses.remove(&bus.bus_id());
        }
        state.registry.release_all(bus.pins(), PinUsage::I2c, bus.owner())
    }

    /// Release a device's chip select and its share of the bus lines
    pub(crate) fn close_spi_device(
        &self,
        bus_id: u32,
        lines: &[Pin],
        chip_select: Option<Pin>,
        owner: OwnerToken,
    ) -> Result<()> {
        let mut state = self.lock();
        let cs_result = match chip_select {
            Some(cs) => state.registry.release_pin(cs, PinUsage::Spi, owner),
            None => Ok(()),
        };
        let lines_result = state.release_spi_lines(&(bus_id, lines.to_vec()));
        cs_result.and(lines_result)
    }
}

/// A single-board computer and the resources it hands out
pub struct Board {
    inner: Arc<BoardInner>,
}

impl Board {
    /// Best board for this machine with the default configuration. Never fails.
    pub fn create() -> Self {
        Self::create_with_config(BoardConfig::default())
    }

    /// Probe the configured model (Raspberry Pi, then generic) and initialize
    /// it. A model whose GPIO driver cannot be created runs on the no-op driver.
    pub fn create_with_config(config: BoardConfig) -> Self {
        let model = probe_model(&config);
        let board = Self::with_config(model, config);
        board.initialize();
        log::info!(
            "Using board {} ({} numbering)",
            board.inner.model.description(),
            board.default_numbering_scheme()
        );
        board
    }

    /// Board for an explicit model
    pub fn new(model: Box<dyn BoardModel>, scheme: PinNumberingScheme) -> Self {
        Self::with_config(
            model,
            BoardConfig {
                numbering: scheme,
                ..BoardConfig::default()
            },
        )
    }

    pub fn with_config(model: Box<dyn BoardModel>, config: BoardConfig) -> Self {
        Self {
            inner: Arc::new(BoardInner {
                model,
                config,
                driver: OnceCell::new(),
                overlay: OnceCell::new(),
                state: Mutex::new(BoardState::default()),
            }),
        }
    }

    /// Use `overlay` instead of reading the boot configuration. Its
    /// conditional sections are evaluated for this board's model. Has no
    /// effect once the configuration has been loaded.
    pub fn with_overlay_config(self, overlay: OverlayConfig) -> Self {
        let overlay = overlay.for_board(&self.inner.model.config_filters());
        if self.inner.overlay.set(overlay).is_err() {
            log::warn!("Overlay configuration already loaded, keeping it");
        }
        self
    }

    /// Resolve the GPIO driver now rather than on first use
    pub fn initialize(&self) {
        let driver = self.inner.driver();
        log::debug!("GPIO driver ready ({} pins)", driver.pin_count());
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.driver.get().is_some()
    }

    pub fn model(&self) -> &dyn BoardModel {
        self.inner.model.as_ref()
    }

    pub fn config(&self) -> &BoardConfig {
        &self.inner.config
    }

    pub fn default_numbering_scheme(&self) -> PinNumberingScheme {
        self.inner.scheme()
    }

    /// Controller in the board's default numbering
    pub fn create_gpio_controller(&self) -> Result<GpioController> {
        self.create_gpio_controller_with_scheme(self.inner.scheme())
    }

    /// Independent controller over the shared driver and registry
    pub fn create_gpio_controller_with_scheme(&self, scheme: PinNumberingScheme) -> Result<GpioController> {
        drop(self.inner.lock_live()?);
        Ok(GpioController::new(
            Arc::clone(&self.inner),
            self.inner.driver(),
            scheme,
        ))
    }

    /// Claim `pin` (default numbering) without opening a handle for it. A
    /// bus usage also routes the pin to its function (looked up for bus 0).
    pub fn reserve_pin(&self, pin: Pin, usage: PinUsage, owner: OwnerToken) -> Result<()> {
        let logical = self.inner.to_logical(pin, self.inner.scheme())?;
        self.inner.reserve_pin(logical, usage, owner)?;
        if usage == PinUsage::Gpio {
            return Ok(());
        }
        let driver = self.inner.driver();
        if let Err(e) = self.inner.activate_pin_modes(driver.as_ref(), &[logical], usage, 0) {
            let _ = self.inner.release_pin(logical, usage, owner);
            return Err(e);
        }
        Ok(())
    }

    pub fn release_pin(&self, pin: Pin, usage: PinUsage, owner: OwnerToken) -> Result<()> {
        let logical = self.inner.to_logical(pin, self.inner.scheme())?;
        self.inner.release_pin(logical, usage, owner)
    }

    /// Last usage `pin` (default numbering) was reserved for. Stays set after
    /// the reservation is released. A pin that was never reserved is judged by
    /// the function the driver reports for it.
    pub fn determine_current_pin_usage(&self, pin: Pin) -> Result<PinUsage> {
        let logical = self.inner.to_logical(pin, self.inner.scheme())?;
        let recorded = self.inner.lock().registry.determine_current_pin_usage(logical);
        if recorded != PinUsage::Unknown {
            return Ok(recorded);
        }
        self.inner.hardware_pin_usage(logical)
    }

    /// Live reservation of `pin` (default numbering), if any
    pub fn current_reservation(&self, pin: Pin) -> Result<Option<(PinUsage, OwnerToken)>> {
        let logical = self.inner.to_logical(pin, self.inner.scheme())?;
        Ok(self.inner.lock().registry.current_reservation(logical))
    }

    /// All live reservations, by logical pin
    pub fn reserved_pins(&self) -> Vec<(Pin, PinUsage, OwnerToken)> {
        self.inner.lock().registry.reserved_pins()
    }

    pub fn convert_pin_number(&self, pin: Pin, from: PinNumberingScheme, to: PinNumberingScheme) -> Result<Pin> {
        self.inner.model.translator().convert(pin, from, to)
    }

    fn to_default_scheme(&self, pins: &[Pin]) -> Result<Vec<Pin>> {
        self.inner
            .model
            .translator()
            .convert_all(pins, PinNumberingScheme::Logical, self.inner.scheme())
    }

    fn from_default_scheme(&self, pins: &[Pin]) -> Result<Vec<Pin>> {
        self.inner
            .model
            .translator()
            .convert_all(pins, self.inner.scheme(), PinNumberingScheme::Logical)
    }

    /// Model's `[sda, scl]` for `bus_id`, in the default numbering
    pub fn default_pin_assignment_for_i2c(&self, bus_id: u32) -> Result<[Pin; 2]> {
        let [sda, scl] = self.inner.model.default_pins_for_i2c(bus_id)?;
        let scheme = self.inner.scheme();
        Ok([
            self.inner.from_logical(sda, scheme)?,
            self.inner.from_logical(scl, scheme)?,
        ])
    }

    /// Model's SPI pins, in the default numbering
    pub fn default_pin_assignment_for_spi(&self, settings: &SpiConnectionSettings) -> Result<Vec<Pin>> {
        let pins = self.inner.model.default_pins_for_spi(settings)?;
        self.to_default_scheme(&pins)
    }

    /// Model's PWM pin, in the default numbering
    pub fn default_pin_assignment_for_pwm(&self, chip: u32, channel: u32) -> Result<Pin> {
        let pin = self.inner.model.default_pin_for_pwm(chip, channel)?;
        self.inner.from_logical(pin, self.inner.scheme())
    }

    /// Multiplexer function `pin` (default numbering) needs for `usage`
    pub fn alternate_mode_for_pin_usage(&self, pin: Pin, usage: PinUsage, bus: u32) -> Result<AlternatePinMode> {
        let logical = self.inner.to_logical(pin, self.inner.scheme())?;
        self.inner.model.alternate_mode(logical, usage, bus)
    }

    /// Boot configuration overlays, parsed on first use
    pub fn overlay_config(&self) -> &OverlayConfig {
        self.inner.overlay()
    }

    fn resolve_i2c_pins(&self, bus_id: u32, pins: Option<&[Pin]>) -> Result<Vec<Pin>> {
        if let Some(pins) = pins {
            if pins.len() != 2 || pins.contains(&UNASSIGNED_PIN) {
                return Err(BoardError::InvalidArgument(format!(
                    "I2C needs exactly two pins, got {:?}",
                    pins
                )));
            }
            return self.from_default_scheme(pins);
        }
        if let Some(pins) = self.inner.overlay().overlay_pin_assignment_for_i2c(bus_id) {
            log::debug!("I2C bus {}: pins {:?} from overlay", bus_id, pins);
            return Ok(pins.to_vec());
        }
        Ok(self.inner.model.default_pins_for_i2c(bus_id)?.to_vec())
    }

    /// The bus registered for `bus_id`, or a new one on `pins` (default
    /// numbering; `None` takes the overlay or model default). An existing
    /// bus is returned unchanged whatever `pins` says.
    pub fn create_or_get_i2c_bus(&self, bus_id: u32, pins: Option<&[Pin]>) -> Result<I2cBus> {
        if let Some(bus) = self.inner.lock_live()?.i2c_buses.get(&bus_id) {
            return Ok(bus.clone());
        }

        let pins = self.resolve_i2c_pins(bus_id, pins)?;
        let driver = self.inner.driver();

        let mut state = self.inner.lock_live()?;
        if let Some(bus) = state.i2c_buses.get(&bus_id) {
            return Ok(bus.clone());
        }

        let owner = OwnerToken::new();
        state.registry.reserve_all(&pins, PinUsage::I2c, owner)?;
        let opened = self
            .inner
            .activate_pin_modes(driver.as_ref(), &pins, PinUsage::I2c, bus_id)
            .and_then(|()| self.inner.model.create_i2c_bus(bus_id, &pins));
        let transport = match opened {
            Ok(transport) => transport,
            Err(e) => {
                let _ = state.registry.release_all(&pins, PinUsage::I2c, owner);
                return Err(e);
            }
        };

        let bus = I2cBus::new(bus_id, pins, owner, Arc::downgrade(&self.inner), transport);
        state.i2c_buses.insert(bus_id, bus.clone());
        Ok(bus)
    }

    /// The model's preferred bus (bus 1 on the Raspberry Pi)
    pub fn create_or_get_default_i2c_bus(&self) -> Result<I2cBus> {
        self.create_or_get_i2c_bus(self.inner.model.default_i2c_bus_id(), None)
    }

    /// Device on the (shared) bus of `settings`
    pub fn create_i2c_device(&self, settings: I2cConnectionSettings) -> Result<I2cDevice> {
        self.create_or_get_i2c_bus(settings.bus_id, None)?
            .create_device(settings.device_address)
    }

    /// Ids of the I2C buses currently open
    pub fn i2c_bus_ids(&self) -> Vec<u32> {
        self.inner.lock().i2c_buses.keys().copied().collect()
    }

    /// SPI device on the overlay or model default pins
    pub fn create_spi_device(&self, settings: SpiConnectionSettings) -> Result<SpiDevice> {
        let pins = match self.inner.overlay().overlay_pin_assignment_for_spi(&settings)? {
            Some(pins) => {
                log::debug!("SPI bus {}: pins {:?} from overlay", settings.bus_id, pins);
                pins
            }
            None => self.inner.model.default_pins_for_spi(&settings)?,
        };
        self.open_spi_device(settings, pins)
    }

    /// SPI device on `[miso, mosi, sclk]` or `[miso, mosi, sclk, cs]` given in
    /// the default numbering; `-1` marks an unused line
    pub fn create_spi_device_with_pins(&self, settings: SpiConnectionSettings, pins: &[Pin]) -> Result<SpiDevice> {
        let pins = self.from_default_scheme(pins)?;
        self.open_spi_device(settings, pins)
    }

    fn open_spi_device(&self, settings: SpiConnectionSettings, pins: Vec<Pin>) -> Result<SpiDevice> {
        if pins.len() != 3 && pins.len() != 4 {
            return Err(BoardError::InvalidArgument(format!(
                "SPI needs three or four pins, got {:?}",
                pins
            )));
        }

        let lines: Vec<Pin> = pins[..3]
            .iter()
            .copied()
            .filter(|p| *p != UNASSIGNED_PIN)
            .collect();
        let chip_select = pins.get(3).copied().filter(|p| *p != UNASSIGNED_PIN);
        let key = (settings.bus_id, lines.clone());
        let owner = OwnerToken::new();
        let driver = self.inner.driver();

        let mut state = self.inner.lock_live()?;
        let fresh_lines = state.acquire_spi_lines(&key)?;

        if let Some(cs) = chip_select {
            if let Err(e) = state.registry.reserve_pin(cs, PinUsage::Spi, owner) {
                let _ = state.release_spi_lines(&key);
                return Err(e);
            }
        }

        // Shared lines were routed by the device that reserved them
        let mut routed = if fresh_lines { lines.clone() } else { Vec::new() };
        routed.extend(chip_select);
        let opened = self
            .inner
            .activate_pin_modes(driver.as_ref(), &routed, PinUsage::Spi, settings.bus_id)
            .and_then(|()| self.inner.model.create_spi_device(&settings, &pins));
        let transport = match opened {
            Ok(transport) => transport,
            Err(e) => {
                if let Some(cs) = chip_select {
                    let _ = state.registry.release_pin(cs, PinUsage::Spi, owner);
                }
                let _ = state.release_spi_lines(&key);
                return Err(e);
            }
        };
        drop(state);

        Ok(SpiDevice::new(
            Arc::clone(&self.inner),
            settings,
            pins,
            lines,
            chip_select,
            owner,
            transport,
        ))
    }

    /// PWM channel on the overlay pin (chip 0) or the model default
    pub fn create_pwm_channel(&self, chip: u32, channel: u32, frequency: u32, duty_cycle: f64) -> Result<PwmChannel> {
        let overlay_pin = match chip {
            0 => self.inner.overlay().overlay_pin_assignment_for_pwm(channel),
            _ => UNASSIGNED_PIN,
        };
        let pin = if overlay_pin != UNASSIGNED_PIN {
            overlay_pin
        } else {
            self.inner.model.default_pin_for_pwm(chip, channel)?
        };
        self.open_pwm_channel(chip, channel, frequency, duty_cycle, pin)
    }

    /// PWM channel routed to `pin` (default numbering)
    pub fn create_pwm_channel_on_pin(
        &self,
        chip: u32,
        channel: u32,
        frequency: u32,
        duty_cycle: f64,
        pin: Pin,
    ) -> Result<PwmChannel> {
        let logical = self.inner.to_logical(pin, self.inner.scheme())?;
        self.open_pwm_channel(chip, channel, frequency, duty_cycle, logical)
    }

    fn open_pwm_channel(&self, chip: u32, channel: u32, frequency: u32, duty_cycle: f64, pin: Pin) -> Result<PwmChannel> {
        if frequency == 0 || !(0.0..=1.0).contains(&duty_cycle) {
            return Err(BoardError::InvalidArgument(format!(
                "invalid PWM settings: {} Hz, duty cycle {}",
                frequency, duty_cycle
            )));
        }

        let owner = OwnerToken::new();
        let driver = self.inner.driver();
        let mut state = self.inner.lock_live()?;
        state.registry.reserve_pin(pin, PinUsage::Pwm, owner)?;
        let opened = self
            .inner
            .activate_pin_modes(driver.as_ref(), &[pin], PinUsage::Pwm, chip)
            .and_then(|()| {
                self.inner
                    .model
                    .create_pwm_channel(chip, channel, pin, frequency, duty_cycle)
            });
        let transport = match opened {
            Ok(transport) => transport,
            Err(e) => {
                let _ = state.registry.release_pin(pin, PinUsage::Pwm, owner);
                return Err(e);
            }
        };
        drop(state);

        Ok(PwmChannel::new(
            Arc::clone(&self.inner),
            chip,
            channel,
            pin,
            owner,
            frequency,
            duty_cycle,
            transport,
        ))
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    /// Dispose every I2C bus still open and refuse new handles. Idempotent.
    pub fn dispose(&self) {
        let buses: Vec<I2cBus> = {
            let mut state = self.inner.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            std::mem::take(&mut state.i2c_buses).into_values().collect()
        };

        for bus in buses {
            if let Err(e) = bus.dispose() {
                log::warn!("Disposing I2C bus {} failed: {}", bus.bus_id(), e);
            }
        }
        log::debug!("Disposed board {}", self.inner.model.name());
    }
}

impl Drop for Board {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("model", &self.inner.model.name())
            .field("numbering", &self.inner.scheme())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boards::simulated::SIMULATED_PIN_COUNT;
    use crate::boards::SimulatedBoard;
    use crate::gpio::{DriverCall, SimulatedGpioDriver};
    use crate::pins::PinNumberingTranslator;

    fn sim_board() -> Board {
        Board::new(Box::new(SimulatedBoard::new()), PinNumberingScheme::Logical)
    }

    /// Logical 1 → board 2, 2 → 4, 4 → 8, 8 → 1, identity elsewhere
    fn remapped_board(scheme: PinNumberingScheme) -> Board {
        let pairs: Vec<(Pin, Pin)> = (0..28)
            .map(|p| match p {
                1 => (1, 2),
                2 => (2, 4),
                4 => (4, 8),
                8 => (8, 1),
                p => (p, p),
            })
            .collect();
        let translator = PinNumberingTranslator::from_pairs(&pairs).unwrap();
        Board::new(Box::new(SimulatedBoard::new().with_translator(translator)), scheme)
    }

    #[test]
    fn test_create_never_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = BoardConfig {
            device_tree_model_path: dir.path().join("model"),
            sysfs_gpio_root: dir.path().join("gpio"),
            boot_config_path: Some(dir.path().join("config.txt")),
            ..BoardConfig::default()
        };
        let board = Board::create_with_config(config);
        assert!(board.is_initialized());
        assert_eq!(board.model().name(), "generic");
        assert_eq!(board.default_numbering_scheme(), PinNumberingScheme::Logical);

        // Degraded to the no-op driver, but still usable
        let mut ctrl = board.create_gpio_controller().unwrap();
        ctrl.open_pin(4).unwrap();
        assert_eq!(ctrl.pin_count(), 0);
        assert!(board.overlay_config().directives.is_empty());
    }

    #[test]
    fn test_reserve_pin_i2c() {
        let board = sim_board();
        let owner = OwnerToken::new();
        board.reserve_pin(1, PinUsage::I2c, owner).unwrap();
        assert!(matches!(
            board.reserve_pin(1, PinUsage::Gpio, owner),
            Err(BoardError::PinAlreadyInUse { .. })
        ));
        assert!(board.reserve_pin(1, PinUsage::I2c, OwnerToken::new()).is_err());
    }

    #[test]
    fn test_reserve_release_pin() {
        let board = sim_board();
        let owner = OwnerToken::new();
        board.reserve_pin(1, PinUsage::I2c, owner).unwrap();
        assert!(matches!(
            board.release_pin(1, PinUsage::Gpio, owner),
            Err(BoardError::UsageMismatch { .. })
        ));
        assert!(matches!(
            board.release_pin(1, PinUsage::I2c, OwnerToken::new()),
            Err(BoardError::OwnerMismatch { .. })
        ));
        assert!(matches!(
            board.release_pin(2, PinUsage::Pwm, owner),
            Err(BoardError::NotReserved { pin: 2 })
        ));
        board.release_pin(1, PinUsage::I2c, owner).unwrap();
        assert_eq!(board.current_reservation(1).unwrap(), None);
    }

    #[test]
    fn test_create_i2c_device_default() {
        let board = sim_board();
        assert_eq!(board.determine_current_pin_usage(0).unwrap(), PinUsage::Unknown);
        let mut device = board.create_i2c_device(I2cConnectionSettings::new(0, 3)).unwrap();
        assert_eq!(device.read_byte().unwrap(), 0xFF);
        assert_eq!(board.determine_current_pin_usage(0).unwrap(), PinUsage::I2c);
        assert_eq!(board.determine_current_pin_usage(1).unwrap(), PinUsage::I2c);
        assert_eq!(board.i2c_bus_ids(), vec![0]);
        assert!(board.create_i2c_device(I2cConnectionSettings::new(1, 3)).is_err());
    }

    #[test]
    fn test_i2c_bus_release_keeps_history() {
        let board = sim_board();
        let bus = board.create_or_get_i2c_bus(0, Some(&[0, 1])).unwrap();
        assert_eq!(board.determine_current_pin_usage(0).unwrap(), PinUsage::I2c);
        bus.dispose().unwrap();

        // History stays, the pins are free again
        assert_eq!(board.determine_current_pin_usage(0).unwrap(), PinUsage::I2c);
        assert_eq!(board.determine_current_pin_usage(1).unwrap(), PinUsage::I2c);
        board.reserve_pin(0, PinUsage::Pwm, OwnerToken::new()).unwrap();
        assert!(board.i2c_bus_ids().is_empty());
    }

    #[test]
    fn test_i2c_bus_board_numbering() {
        let board = remapped_board(PinNumberingScheme::Board);
        let bus = board.create_or_get_i2c_bus(0, Some(&[2, 4])).unwrap();
        assert_eq!(bus.pins(), &[1, 2]);
        let mut device = bus.create_device(3).unwrap();
        assert_eq!(device.read_byte().unwrap(), 0xFF);
        assert_eq!(board.determine_current_pin_usage(2).unwrap(), PinUsage::I2c);
        assert_eq!(board.determine_current_pin_usage(4).unwrap(), PinUsage::I2c);
        assert_eq!(board.determine_current_pin_usage(8).unwrap(), PinUsage::Unknown);
    }

    #[test]
    fn test_create_or_get_returns_same_bus() {
        let board = sim_board();
        let first = board.create_or_get_i2c_bus(0, None).unwrap();
        let second = board.create_or_get_i2c_bus(0, Some(&[5, 6])).unwrap();
        assert!(first.same_bus(&second));
        assert_eq!(second.pins(), &[0, 1]);
        assert_eq!(board.current_reservation(5).unwrap(), None);

        assert!(matches!(
            board.create_or_get_i2c_bus(1, Some(&[5])),
            Err(BoardError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_i2c_bus_rolls_back_on_conflict() {
        let board = sim_board();
        let owner = OwnerToken::new();
        board.reserve_pin(7, PinUsage::Gpio, owner).unwrap();
        assert!(matches!(
            board.create_or_get_i2c_bus(3, Some(&[6, 7])),
            Err(BoardError::PinAlreadyInUse { pin: 7, .. })
        ));
        assert_eq!(board.current_reservation(6).unwrap(), None);
        assert!(board.i2c_bus_ids().is_empty());
    }

    #[test]
    fn test_two_i2c_devices_share_pins() {
        let board = sim_board();
        let mut device1 = board.create_i2c_device(I2cConnectionSettings::new(0, 1)).unwrap();
        let mut device2 = board.create_i2c_device(I2cConnectionSettings::new(0, 2)).unwrap();
        assert_eq!(device1.read_byte().unwrap(), 0xFF);
        assert_eq!(device2.read_byte().unwrap(), 0xFF);
        assert_eq!(board.determine_current_pin_usage(0).unwrap(), PinUsage::I2c);
        assert_eq!(board.determine_current_pin_usage(1).unwrap(), PinUsage::I2c);
        device1.dispose();

        assert_eq!(device2.read_byte().unwrap(), 0xFF);
        assert!(matches!(device1.read_byte(), Err(BoardError::ObjectDisposed(_))));

        let mut ctrl = board.create_gpio_controller().unwrap();
        assert!(matches!(ctrl.open_pin(0), Err(BoardError::PinAlreadyInUse { .. })));
        device2.dispose();
        // Disposing devices does not close the bus
        assert!(ctrl.open_pin(0).is_err());

        let bus = board.create_or_get_i2c_bus(0, None).unwrap();
        bus.dispose().unwrap();
        ctrl.open_pin(0).unwrap();
    }

    #[test]
    fn test_i2c_address_in_use() {
        let board = sim_board();
        let device = board.create_i2c_device(I2cConnectionSettings::new(0, 0x48)).unwrap();
        assert!(matches!(
            board.create_i2c_device(I2cConnectionSettings::new(0, 0x48)),
            Err(BoardError::AddressInUse { bus_id: 0, address: 0x48 })
        ));
        drop(device);
        board.create_i2c_device(I2cConnectionSettings::new(0, 0x48)).unwrap();
    }

    #[test]
    fn test_create_spi_device_default() {
        let model = SimulatedBoard::new();
        let created = model.spi_devices();
        let board = Board::new(Box::new(model), PinNumberingScheme::Logical);

        let mut device = board.create_spi_device(SpiConnectionSettings::new(0, 0)).unwrap();
        assert_eq!(device.read_byte().unwrap(), 0xF8);
        assert_eq!(device.pins(), &[2, 3, 4, 10]);
        assert_eq!(device.chip_select_pin(), Some(10));
        assert_eq!(created.lock().unwrap()[0].1, vec![2, 3, 4, 10]);
        for pin in [2, 3, 4, 10] {
            assert_eq!(board.determine_current_pin_usage(pin).unwrap(), PinUsage::Spi);
        }
    }

    #[test]
    fn test_two_spi_devices_share_pins() {
        let board = sim_board();
        let mut device1 = board.create_spi_device(SpiConnectionSettings::new(0, 1)).unwrap();
        let mut device2 = board.create_spi_device(SpiConnectionSettings::new(0, 2)).unwrap();
        assert_eq!(device1.read_byte().unwrap(), 0xF8);
        assert_eq!(device2.read_byte().unwrap(), 0xF8);
        assert_eq!(board.determine_current_pin_usage(2).unwrap(), PinUsage::Spi);
        assert_eq!(board.determine_current_pin_usage(3).unwrap(), PinUsage::Spi);
        device1.dispose().unwrap();

        assert_eq!(device2.read_byte().unwrap(), 0xF8);
        assert!(matches!(device1.read_byte(), Err(BoardError::ObjectDisposed(_))));

        let mut ctrl = board.create_gpio_controller().unwrap();
        assert!(ctrl.open_pin(2).is_err());
        device2.dispose().unwrap();
        ctrl.open_pin(2).unwrap();
        ctrl.open_pin(0).unwrap();
    }

    #[test]
    fn test_spi_lines_of_other_bus_conflict() {
        let board = sim_board();
        let _device = board.create_spi_device(SpiConnectionSettings::new(0, 1)).unwrap();
        assert!(matches!(
            board.create_spi_device_with_pins(SpiConnectionSettings::new(1, 0), &[2, 3, 4, 20]),
            Err(BoardError::PinAlreadyInUse { pin: 2, usage: PinUsage::Spi, .. })
        ));
        // The chip select was never taken
        assert_eq!(board.current_reservation(20).unwrap(), None);
    }

    #[test]
    fn test_spi_chip_select_conflict_drops_share() {
        let board = sim_board();
        let owner = OwnerToken::new();
        board.reserve_pin(10, PinUsage::Gpio, owner).unwrap();
        assert!(matches!(
            board.create_spi_device(SpiConnectionSettings::new(0, 0)),
            Err(BoardError::PinAlreadyInUse { pin: 10, .. })
        ));
        for pin in [2, 3, 4] {
            assert_eq!(board.current_reservation(pin).unwrap(), None);
        }
    }

    #[test]
    fn test_spi_without_miso() {
        let board = sim_board();
        let device = board
            .create_spi_device_with_pins(SpiConnectionSettings::new(0, -1), &[-1, 3, 4])
            .unwrap();
        assert_eq!(device.pins(), &[-1, 3, 4]);
        assert_eq!(device.chip_select_pin(), None);
        assert_eq!(board.current_reservation(2).unwrap(), None);
        assert!(board
            .create_spi_device_with_pins(SpiConnectionSettings::new(0, 0), &[2, 3])
            .is_err());
    }

    #[test]
    fn test_spi_device_drop_releases_lines() {
        let board = sim_board();
        {
            let _device = board.create_spi_device(SpiConnectionSettings::new(0, 0)).unwrap();
            assert!(board.current_reservation(2).unwrap().is_some());
        }
        for pin in [2, 3, 4, 10] {
            assert_eq!(board.current_reservation(pin).unwrap(), None);
        }
    }

    #[test]
    fn test_overlay_precedence() {
        let overlay = OverlayConfig::parse_content(
            "dtoverlay=i2c3,pins_2_3\ndtoverlay=spi0-1cs,cs0_pin=20\ndtoverlay=pwm,pin=18,func=2\n",
            "test",
        );
        let model = SimulatedBoard::new();
        let created = model.spi_devices();
        let board = Board::new(Box::new(model), PinNumberingScheme::Logical).with_overlay_config(overlay);

        // Overlay beats the model table
        let bus = board.create_or_get_i2c_bus(3, None).unwrap();
        assert_eq!(bus.pins(), &[2, 3]);
        // No overlay for bus 0: model default
        assert_eq!(board.create_or_get_i2c_bus(0, None).unwrap().pins(), &[0, 1]);
        // Explicit pins beat the overlay
        bus.dispose().unwrap();
        assert_eq!(board.create_or_get_i2c_bus(3, Some(&[6, 7])).unwrap().pins(), &[6, 7]);

        let spi = board.create_spi_device(SpiConnectionSettings::new(0, 0)).unwrap();
        assert_eq!(spi.pins(), &[9, 10, 11, 20]);
        assert_eq!(created.lock().unwrap()[0].1, vec![9, 10, 11, 20]);

        let pwm = board.create_pwm_channel(0, 0, 1000, 0.25).unwrap();
        assert_eq!(pwm.pin(), 18);
        let pwm1 = board.create_pwm_channel(0, 1, 1000, 0.25).unwrap();
        assert_eq!(pwm1.pin(), 13);
    }

    #[test]
    fn test_overlay_section_for_other_board() {
        let overlay = OverlayConfig::parse_content("[pi5]\ndtoverlay=i2c3,pins_6_7\n[all]\n", "test");
        let board = sim_board().with_overlay_config(overlay);

        // The simulated board matches no section and has no table for bus 3
        assert!(matches!(
            board.create_or_get_i2c_bus(3, None),
            Err(BoardError::UnsupportedConfiguration(_))
        ));
        assert!(board.reserved_pins().is_empty());
        assert!(!board.overlay_config().is_i2c_overlay_active());
    }

    #[test]
    fn test_pwm_channel_lifecycle() {
        let board = sim_board();
        let mut pwm = board.create_pwm_channel(0, 0, 400, 0.5).unwrap();
        assert_eq!(pwm.pin(), 12);
        assert_eq!(board.current_reservation(12).unwrap().map(|r| r.0), Some(PinUsage::Pwm));
        pwm.start().unwrap();
        pwm.set_duty_cycle(0.75).unwrap();
        assert!(pwm.is_running());
        assert!(pwm.set_duty_cycle(1.5).is_err());
        assert_eq!(pwm.duty_cycle(), 0.75);

        assert!(matches!(
            board.create_pwm_channel_on_pin(0, 1, 400, 0.5, 12),
            Err(BoardError::PinAlreadyInUse { pin: 12, .. })
        ));
        pwm.dispose().unwrap();
        assert!(matches!(pwm.start(), Err(BoardError::ObjectDisposed("PwmChannel"))));
        assert_eq!(board.determine_current_pin_usage(12).unwrap(), PinUsage::Pwm);
        board.reserve_pin(12, PinUsage::Gpio, OwnerToken::new()).unwrap();
        assert!(board.create_pwm_channel(0, 0, 0, 0.5).is_err());
    }

    #[test]
    fn test_default_assignments_in_board_numbering() {
        let board = remapped_board(PinNumberingScheme::Board);
        assert_eq!(board.default_pin_assignment_for_i2c(0).unwrap(), [0, 2]);
        assert_eq!(
            board
                .default_pin_assignment_for_spi(&SpiConnectionSettings::new(0, 0))
                .unwrap(),
            vec![4, 3, 8, 10]
        );
        assert_eq!(board.default_pin_assignment_for_pwm(0, 1).unwrap(), 13);
        assert!(matches!(
            board.default_pin_assignment_for_i2c(5),
            Err(BoardError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn test_convert_pin_number() {
        let board = remapped_board(PinNumberingScheme::Logical);
        assert_eq!(
            board
                .convert_pin_number(4, PinNumberingScheme::Logical, PinNumberingScheme::Board)
                .unwrap(),
            8
        );
        assert_eq!(
            board
                .convert_pin_number(1, PinNumberingScheme::Board, PinNumberingScheme::Logical)
                .unwrap(),
            8
        );
        assert!(matches!(
            board.convert_pin_number(40, PinNumberingScheme::Board, PinNumberingScheme::Logical),
            Err(BoardError::InvalidPinNumber { pin: 40, scheme: PinNumberingScheme::Board })
        ));
    }

    #[test]
    fn test_dispose_board() {
        let board = sim_board();
        let bus = board.create_or_get_i2c_bus(0, None).unwrap();
        let mut device = bus.create_device(0x20).unwrap();
        board.dispose();
        board.dispose();

        assert!(board.is_disposed());
        assert!(bus.is_disposed());
        assert!(device.read_byte().is_err());
        assert_eq!(board.current_reservation(0).unwrap(), None);
        assert!(matches!(
            board.create_gpio_controller(),
            Err(BoardError::ObjectDisposed("Board"))
        ));
        assert!(matches!(
            board.create_or_get_i2c_bus(0, None),
            Err(BoardError::ObjectDisposed("Board"))
        ));
    }

    #[test]
    fn test_concurrent_open_single_winner() {
        let board = sim_board();
        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        let mut ctrl = board.create_gpio_controller().unwrap();
                        let won = ctrl.open_pin(5).is_ok();
                        // Keep the pin until every thread has tried
                        std::mem::forget(ctrl);
                        won as usize
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_bus_pins_switch_to_alternate_function() {
        use AlternatePinMode::Alt0;
        use DriverCall::SetAlternate;

        let model = SimulatedBoard::new();
        let driver = model.gpio_driver();
        let board = Board::new(Box::new(model), PinNumberingScheme::Logical);

        let _bus = board.create_or_get_i2c_bus(0, None).unwrap();
        let _first = board.create_spi_device(SpiConnectionSettings::new(0, 0)).unwrap();
        let _pwm = board.create_pwm_channel(0, 0, 1000, 0.5).unwrap();
        assert_eq!(
            driver.calls(),
            vec![
                SetAlternate(0, Alt0),
                SetAlternate(1, Alt0),
                SetAlternate(2, Alt0),
                SetAlternate(3, Alt0),
                SetAlternate(4, Alt0),
                SetAlternate(10, Alt0),
                SetAlternate(12, Alt0),
            ]
        );

        // Shared lines are already routed; pin 11 has no SPI function
        let _second = board
            .create_spi_device_with_pins(SpiConnectionSettings::new(0, 1), &[2, 3, 4, 11])
            .unwrap();
        assert_eq!(driver.calls().len(), 7);

        let owner = OwnerToken::new();
        board.reserve_pin(13, PinUsage::Pwm, owner).unwrap();
        board.reserve_pin(5, PinUsage::Gpio, owner).unwrap();
        assert_eq!(driver.calls().last(), Some(&SetAlternate(13, Alt0)));
        assert_eq!(driver.calls().len(), 8);
    }

    #[test]
    fn test_failed_routing_rolls_back() {
        // Driver too small for the chip select on pin 10
        let model = SimulatedBoard::with_driver(SimulatedGpioDriver::new(5));
        let board = Board::new(Box::new(model), PinNumberingScheme::Logical);

        assert!(matches!(
            board.create_spi_device(SpiConnectionSettings::new(0, 0)),
            Err(BoardError::InvalidArgument(_))
        ));
        assert!(board.reserved_pins().is_empty());
    }

    #[test]
    fn test_usage_from_hardware_function() {
        let driver = SimulatedGpioDriver::new(SIMULATED_PIN_COUNT)
            .with_alternate_mode(0, AlternatePinMode::Alt0)
            .with_alternate_mode(5, AlternatePinMode::Gpio)
            .with_alternate_mode(12, AlternatePinMode::Alt0)
            .with_alternate_mode(7, AlternatePinMode::Alt3);
        let board = Board::new(
            Box::new(SimulatedBoard::with_driver(driver)),
            PinNumberingScheme::Logical,
        );

        assert_eq!(board.determine_current_pin_usage(0).unwrap(), PinUsage::I2c);
        assert_eq!(board.determine_current_pin_usage(5).unwrap(), PinUsage::Gpio);
        assert_eq!(board.determine_current_pin_usage(12).unwrap(), PinUsage::Pwm);
        assert_eq!(board.determine_current_pin_usage(7).unwrap(), PinUsage::Unknown);
        assert_eq!(board.determine_current_pin_usage(20).unwrap(), PinUsage::Unknown);

        // Registry history takes precedence over the hardware state
        let owner = OwnerToken::new();
        board.reserve_pin(0, PinUsage::Spi, owner).unwrap();
        board.release_pin(0, PinUsage::Spi, owner).unwrap();
        assert_eq!(board.determine_current_pin_usage(0).unwrap(), PinUsage::Spi);
    }
}
