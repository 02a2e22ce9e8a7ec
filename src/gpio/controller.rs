use super::driver::{GpioDriver, PinMode, PinValue};
use crate::board::BoardInner;
use crate::error::{BoardError, Result};
use crate::pins::{OwnerToken, Pin, PinNumberingScheme, PinUsage};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Handle to a pin opened on a controller.
///
/// Opening the same pin twice on one controller yields equal handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpioPin {
    /// Pin number in the controller's numbering scheme
    pub pin: Pin,
    owner: OwnerToken,
}

/// Reservation-aware GPIO controller
pub struct GpioController {
    board: Arc<BoardInner>,
    driver: Arc<dyn GpioDriver>,
    scheme: PinNumberingScheme,
    owner: OwnerToken,
    /// Open pins: logical number → number the caller used
    open_pins: BTreeMap<Pin, Pin>,
    disposed: bool,
}

impl GpioController {
    pub(crate) fn new(board: Arc<BoardInner>, driver: Arc<dyn GpioDriver>, scheme: PinNumberingScheme) -> Self {
        let owner = OwnerToken::new();
        log::debug!("Created GPIO controller {} ({} numbering)", owner, scheme);
        Self {
            board,
            driver,
            scheme,
            owner,
            open_pins: BTreeMap::new(),
            disposed: false,
        }
    }

    /// Numbering scheme pin arguments are given in
    pub fn numbering_scheme(&self) -> PinNumberingScheme {
        self.scheme
    }

    /// Token this controller reserves pins under
    pub fn owner(&self) -> OwnerToken {
        self.owner
    }

    /// Pin count of the underlying driver
    pub fn pin_count(&self) -> usize {
        self.driver.pin_count()
    }

    fn check_disposed(&self) -> Result<()> {
        if self.disposed {
            return Err(BoardError::ObjectDisposed("GpioController"));
        }
        Ok(())
    }

    fn logical(&self, pin: Pin) -> Result<Pin> {
        self.board.to_logical(pin, self.scheme)
    }

    fn open_logical(&self, pin: Pin) -> Result<Pin> {
        self.check_disposed()?;
        let logical = self.logical(pin)?;
        if self.open_pins.contains_key(&logical) {
            return Ok(logical);
        }
        Err(BoardError::PinNotOpen(pin))
    }

    /// Open `pin`, reserving it for GPIO.
    ///
    /// Returns the existing handle if this controller already has the pin
    /// open; fails with `PinAlreadyInUse` if anything else holds it.
    pub fn open_pin(&mut self, pin: Pin) -> Result<GpioPin> {
        self.check_disposed()?;
        let logical = self.logical(pin)?;
        let handle = GpioPin {
            pin,
            owner: self.owner,
        };

        if self.open_pins.contains_key(&logical) {
            return Ok(handle);
        }

        self.board.reserve_pin(logical, PinUsage::Gpio, self.owner)?;
        if let Err(e) = self.driver.open_pin(logical) {
            let _ = self.board.release_pin(logical, PinUsage::Gpio, self.owner);
            return Err(e);
        }

        self.open_pins.insert(logical, pin);
        Ok(handle)
    }

    /// Open `pin` and put it into `mode`
    pub fn open_pin_with_mode(&mut self, pin: Pin, mode: PinMode) -> Result<GpioPin> {
        let was_open = self.is_pin_open(pin);
        let handle = self.open_pin(pin)?;
        if let Err(e) = self.set_pin_mode(pin, mode) {
            if !was_open {
                let _ = self.close_pin(pin);
            }
            return Err(e);
        }
        Ok(handle)
    }

    /// Close `pin` and give its reservation back
    pub fn close_pin(&mut self, pin: Pin) -> Result<()> {
        let logical = self.open_logical(pin)?;
        self.open_pins.remove(&logical);
        let closed = self.driver.close_pin(logical);
        self.board.release_pin(logical, PinUsage::Gpio, self.owner)?;
        closed
    }

    pub fn is_pin_open(&self, pin: Pin) -> bool {
        self.logical(pin)
            .map(|logical| self.open_pins.contains_key(&logical))
            .unwrap_or(false)
    }

    pub fn is_pin_mode_supported(&self, pin: Pin, mode: PinMode) -> Result<bool> {
        let logical = self.logical(pin)?;
        Ok(self.driver.is_pin_mode_supported(logical, mode))
    }

    pub fn set_pin_mode(&mut self, pin: Pin, mode: PinMode) -> Result<()> {
        let logical = self.open_logical(pin)?;
        if !self.driver.is_pin_mode_supported(logical, mode) {
            return Err(BoardError::UnsupportedConfiguration(format!(
                "pin {} does not support mode {:?}",
                pin, mode
            )));
        }
        self.driver.set_pin_mode(logical, mode)
    }

    pub fn get_pin_mode(&self, pin: Pin) -> Result<PinMode> {
        let logical = self.open_logical(pin)?;
        self.driver.get_pin_mode(logical)
    }

    pub fn read(&self, pin: Pin) -> Result<PinValue> {
        let logical = self.open_logical(pin)?;
        self.driver.read(logical)
    }

    pub fn write(&self, pin: Pin, value: PinValue) -> Result<()> {
        let logical = self.open_logical(pin)?;
        self.driver.write(logical, value)
    }

    /// Pins currently open, as the caller numbered them
    pub fn open_pins(&self) -> Vec<Pin> {
        self.open_pins.values().copied().collect()
    }

    /// Close every open pin. Further calls fail with `ObjectDisposed`.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        let pins: Vec<Pin> = self.open_pins.values().copied().collect();
        for pin in pins {
            if let Err(e) = self.close_pin(pin) {
                log::warn!("Closing pin {} on dispose failed: {}", pin, e);
            }
        }
        self.disposed = true;
        log::debug!("Disposed GPIO controller {}", self.owner);
    }
}

impl Drop for GpioController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for GpioController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpioController")
            .field("owner", &self.owner)
            .field("scheme", &self.scheme)
            .field("open_pins", &self.open_pins)
            .field("disposed", &self.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use crate::boards::SimulatedBoard;
    use crate::gpio::driver::DriverCall;
    use crate::pins::PinNumberingTranslator;

    fn remapped_translator() -> PinNumberingTranslator {
        // logical 1 -> board 2, 2 -> 4, 4 -> 8, 8 -> 1, identity elsewhere
        let pairs: Vec<(Pin, Pin)> = (0..28)
            .map(|p| match p {
                1 => (1, 2),
                2 => (2, 4),
                4 => (4, 8),
                8 => (8, 1),
                p => (p, p),
            })
            .collect();
        PinNumberingTranslator::from_pairs(&pairs).unwrap()
    }

    #[test]
    fn test_open_write_close() {
        let model = SimulatedBoard::new();
        let driver = model.gpio_driver();
        let board = Board::new(Box::new(model), PinNumberingScheme::Logical);

        let mut ctrl = board.create_gpio_controller().unwrap();
        ctrl.open_pin_with_mode(1, PinMode::Output).unwrap();
        ctrl.write(1, PinValue::High).unwrap();
        assert_eq!(ctrl.read(1).unwrap(), PinValue::High);
        assert_eq!(ctrl.get_pin_mode(1).unwrap(), PinMode::Output);
        ctrl.close_pin(1).unwrap();

        assert!(!driver.is_open(1));
        assert_eq!(driver.calls().first(), Some(&DriverCall::Open(1)));
        assert_eq!(driver.calls().last(), Some(&DriverCall::Close(1)));
        assert!(matches!(ctrl.read(1), Err(BoardError::PinNotOpen(1))));
    }

    #[test]
    fn test_open_is_idempotent_per_controller() {
        let board = Board::new(Box::new(SimulatedBoard::new()), PinNumberingScheme::Logical);
        let mut ctrl = board.create_gpio_controller().unwrap();
        let a = ctrl.open_pin(1).unwrap();
        let b = ctrl.open_pin(1).unwrap();
        assert_eq!(a, b);

        let mut other = board.create_gpio_controller().unwrap();
        assert!(matches!(
            other.open_pin(1),
            Err(BoardError::PinAlreadyInUse { pin: 1, usage: PinUsage::Gpio, .. })
        ));
        let c = other.open_pin(2).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_board_numbering() {
        let model = SimulatedBoard::new().with_translator(remapped_translator());
        let driver = model.gpio_driver();
        let board = Board::new(Box::new(model), PinNumberingScheme::Board);

        let mut ctrl = board.create_gpio_controller().unwrap();
        ctrl.open_pin_with_mode(2, PinMode::Output).unwrap();
        ctrl.write(2, PinValue::High).unwrap();
        assert_eq!(ctrl.read(2).unwrap(), PinValue::High);
        assert!(driver.is_open(1));
        assert_eq!(ctrl.open_pins(), vec![2]);
        ctrl.close_pin(2).unwrap();
        assert!(!driver.is_open(1));
    }

    #[test]
    fn test_controller_scheme_differs_from_board() {
        let model = SimulatedBoard::new().with_translator(remapped_translator());
        let driver = model.gpio_driver();
        let board = Board::new(Box::new(model), PinNumberingScheme::Logical);

        let mut ctrl = board
            .create_gpio_controller_with_scheme(PinNumberingScheme::Board)
            .unwrap();
        ctrl.open_pin_with_mode(2, PinMode::Output).unwrap();
        assert!(driver.is_open(1));
        assert_eq!(board.determine_current_pin_usage(1).unwrap(), PinUsage::Gpio);
    }

    #[test]
    fn test_unsupported_mode_closes_pin() {
        let model = SimulatedBoard::with_driver(
            crate::gpio::SimulatedGpioDriver::new(28).without_mode(5, PinMode::InputPullDown),
        );
        let board = Board::new(Box::new(model), PinNumberingScheme::Logical);
        let mut ctrl = board.create_gpio_controller().unwrap();

        assert!(matches!(
            ctrl.open_pin_with_mode(5, PinMode::InputPullDown),
            Err(BoardError::UnsupportedConfiguration(_))
        ));
        assert!(!ctrl.is_pin_open(5));
        // The reservation was given back
        let mut other = board.create_gpio_controller().unwrap();
        other.open_pin(5).unwrap();
    }

    #[test]
    fn test_drop_releases_pins() {
        let board = Board::new(Box::new(SimulatedBoard::new()), PinNumberingScheme::Logical);
        {
            let mut ctrl = board.create_gpio_controller().unwrap();
            ctrl.open_pin(3).unwrap();
            ctrl.open_pin(4).unwrap();
        }
        let mut ctrl = board.create_gpio_controller().unwrap();
        ctrl.open_pin(3).unwrap();
        ctrl.open_pin(4).unwrap();

        ctrl.dispose();
        assert!(matches!(ctrl.open_pin(3), Err(BoardError::ObjectDisposed(_))));
    }

    #[test]
    fn test_invalid_pin_number() {
        let board = Board::new(Box::new(SimulatedBoard::new()), PinNumberingScheme::Logical);
        let mut ctrl = board.create_gpio_controller().unwrap();
        assert!(matches!(ctrl.open_pin(99), Err(BoardError::InvalidPinNumber { pin: 99, .. })));
    }
}
