//! GPIO access on top of the board's pin registry
//!
//! A [`GpioController`] wraps the board's memoized driver and routes every
//! open/close through the registry with usage `Gpio` and a token unique to
//! the controller.

pub mod controller;
pub mod driver;

pub use controller::{GpioController, GpioPin};
pub use driver::{AlternatePinMode, DriverCall, GpioDriver, NullGpioDriver, PinMode, PinValue, SimulatedGpioDriver};
