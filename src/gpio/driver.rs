//! GPIO driver boundary
//!
//! The arbitration layer never toggles pins itself. It forwards to a driver
//! that implements [`GpioDriver`]; all pin numbers a driver sees are logical.

use crate::error::{BoardError, Result};
use crate::pins::Pin;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;

/// Electrical mode of a GPIO pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PinMode {
    #[default]
    Input,
    Output,
    InputPullUp,
    InputPullDown,
}

/// Logic level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PinValue {
    #[default]
    Low,
    High,
}

impl From<bool> for PinValue {
    fn from(value: bool) -> Self {
        if value {
            PinValue::High
        } else {
            PinValue::Low
        }
    }
}

impl From<PinValue> for bool {
    fn from(value: PinValue) -> Self {
        matches!(value, PinValue::High)
    }
}

/// Pin multiplexer function (the ALTn modes on the Pi)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlternatePinMode {
    /// Not known, or nothing to select
    Unknown,
    Gpio,
    Alt0,
    Alt1,
    Alt2,
    Alt3,
    Alt4,
    Alt5,
}

impl fmt::Display for AlternatePinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlternatePinMode::Unknown => write!(f, "-"),
            AlternatePinMode::Gpio => write!(f, "GPIO"),
            AlternatePinMode::Alt0 => write!(f, "ALT0"),
            AlternatePinMode::Alt1 => write!(f, "ALT1"),
            AlternatePinMode::Alt2 => write!(f, "ALT2"),
            AlternatePinMode::Alt3 => write!(f, "ALT3"),
            AlternatePinMode::Alt4 => write!(f, "ALT4"),
            AlternatePinMode::Alt5 => write!(f, "ALT5"),
        }
    }
}

/// Primitive pin operations a board's driver must provide
pub trait GpioDriver: Send + Sync {
    /// Number of logical pins the driver exposes
    fn pin_count(&self) -> usize;
    fn open_pin(&self, pin: Pin) -> Result<()>;
    fn close_pin(&self, pin: Pin) -> Result<()>;
    fn is_pin_mode_supported(&self, pin: Pin, mode: PinMode) -> bool;
    fn set_pin_mode(&self, pin: Pin, mode: PinMode) -> Result<()>;
    fn get_pin_mode(&self, pin: Pin) -> Result<PinMode>;
    fn read(&self, pin: Pin) -> Result<PinValue>;
    fn write(&self, pin: Pin, value: PinValue) -> Result<()>;

    /// Route `pin` to a multiplexer function. Drivers without access to the
    /// pin multiplexer ignore the request.
    fn set_alternate_pin_mode(&self, _pin: Pin, _mode: AlternatePinMode) -> Result<()> {
        Ok(())
    }

    /// Function `pin` is currently routed to, `Unknown` if the driver cannot tell
    fn get_alternate_pin_mode(&self, _pin: Pin) -> Result<AlternatePinMode> {
        Ok(AlternatePinMode::Unknown)
    }
}

/// Driver used when nothing better is available: accepts every call, reads low
#[derive(Debug, Default)]
pub struct NullGpioDriver;

impl GpioDriver for NullGpioDriver {
    fn pin_count(&self) -> usize {
        0
    }

    fn open_pin(&self, _pin: Pin) -> Result<()> {
        Ok(())
    }

    fn close_pin(&self, _pin: Pin) -> Result<()> {
        Ok(())
    }

    fn is_pin_mode_supported(&self, _pin: Pin, _mode: PinMode) -> bool {
        true
    }

    fn set_pin_mode(&self, _pin: Pin, _mode: PinMode) -> Result<()> {
        Ok(())
    }

    fn get_pin_mode(&self, _pin: Pin) -> Result<PinMode> {
        Ok(PinMode::Input)
    }

    fn read(&self, _pin: Pin) -> Result<PinValue> {
        Ok(PinValue::Low)
    }

    fn write(&self, _pin: Pin, _value: PinValue) -> Result<()> {
        Ok(())
    }
}

/// Driver call recorded by [`SimulatedGpioDriver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCall {
    Open(Pin),
    Close(Pin),
    SetMode(Pin, PinMode),
    Write(Pin, PinValue),
    SetAlternate(Pin, AlternatePinMode),
}

#[derive(Debug, Default)]
struct SimulatedState {
    open: BTreeMap<Pin, (PinMode, PinValue)>,
    functions: BTreeMap<Pin, AlternatePinMode>,
    calls: Vec<DriverCall>,
}

/// In-memory driver that keeps pin state and records every mutating call.
/// Output pins read back what was last written.
#[derive(Debug)]
pub struct SimulatedGpioDriver {
    pin_count: usize,
    unsupported: HashMap<Pin, Vec<PinMode>>,
    state: Mutex<SimulatedState>,
}

impl SimulatedGpioDriver {
    pub fn new(pin_count: usize) -> Self {
        Self {
            pin_count,
            unsupported: HashMap::new(),
            state: Mutex::new(SimulatedState::default()),
        }
    }

    /// Mark `mode` as unsupported on `pin`
    pub fn without_mode(mut self, pin: Pin, mode: PinMode) -> Self {
        self.unsupported.entry(pin).or_default().push(mode);
        self
    }

    /// Pretend `pin` was routed to `mode` before the driver was handed out
    pub fn with_alternate_mode(self, pin: Pin, mode: AlternatePinMode) -> Self {
        self.lock().functions.insert(pin, mode);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the driver currently has `pin` open
    pub fn is_open(&self, pin: Pin) -> bool {
        self.lock().open.contains_key(&pin)
    }

    /// Mutating calls seen so far, in order
    pub fn calls(&self) -> Vec<DriverCall> {
        self.lock().calls.clone()
    }

    /// Drive an input pin from the outside
    pub fn set_input(&self, pin: Pin, value: PinValue) {
        if let Some(entry) = self.lock().open.get_mut(&pin) {
            entry.1 = value;
        }
    }

    fn check_range(&self, pin: Pin) -> Result<()> {
        if pin < 0 || pin as usize >= self.pin_count {
            return Err(BoardError::InvalidArgument(format!(
                "pin {} is outside the simulated driver's {} pins",
                pin, self.pin_count
            )));
        }
        Ok(())
    }
}

impl GpioDriver for SimulatedGpioDriver {
    fn pin_count(&self) -> usize {
        self.pin_count
    }

    fn open_pin(&self, pin: Pin) -> Result<()> {
        self.check_range(pin)?;
        let mut state = self.lock();
        state.open.entry(pin).or_default();
        state.calls.push(DriverCall::Open(pin));
        Ok(())
    }

    fn close_pin(&self, pin: Pin) -> Result<()> {
        let mut state = self.lock();
        state.open.remove(&pin);
        state.calls.push(DriverCall::Close(pin));
        Ok(())
    }

    fn is_pin_mode_supported(&self, pin: Pin, mode: PinMode) -> bool {
        self.check_range(pin).is_ok()
            && !self
                .unsupported
                .get(&pin)
                .is_some_and(|modes| modes.contains(&mode))
    }

    fn set_pin_mode(&self, pin: Pin, mode: PinMode) -> Result<()> {
        let mut state = self.lock();
        let entry = state.open.get_mut(&pin).ok_or(BoardError::PinNotOpen(pin))?;
        entry.0 = mode;
        state.calls.push(DriverCall::SetMode(pin, mode));
        Ok(())
    }

    fn get_pin_mode(&self, pin: Pin) -> Result<PinMode> {
        self.lock()
            .open
            .get(&pin)
            .map(|(mode, _)| *mode)
            .ok_or(BoardError::PinNotOpen(pin))
    }

    fn read(&self, pin: Pin) -> Result<PinValue> {
        self.lock()
            .open
            .get(&pin)
            .map(|(_, value)| *value)
            .ok_or(BoardError::PinNotOpen(pin))
    }

    fn write(&self, pin: Pin, value: PinValue) -> Result<()> {
        let mut state = self.lock();
        let entry = state.open.get_mut(&pin).ok_or(BoardError::PinNotOpen(pin))?;
        entry.1 = value;
        state.calls.push(DriverCall::Write(pin, value));
        Ok(())
    }

    fn set_alternate_pin_mode(&self, pin: Pin, mode: AlternatePinMode) -> Result<()> {
        self.check_range(pin)?;
        let mut state = self.lock();
        state.functions.insert(pin, mode);
        state.calls.push(DriverCall::SetAlternate(pin, mode));
        Ok(())
    }

    fn get_alternate_pin_mode(&self, pin: Pin) -> Result<AlternatePinMode> {
        self.check_range(pin)?;
        Ok(self
            .lock()
            .functions
            .get(&pin)
            .copied()
            .unwrap_or(AlternatePinMode::Unknown))
    }
}
