//! Board Arbiter
//!
//! Pin reservation and shared-bus brokering for single-board computers.
//!
//! A [`Board`] is the entry point: it knows the board model (Raspberry Pi,
//! generic Linux board or an in-memory simulation), converts between logical
//! (SoC) and physical header pin numbers, reads `dtoverlay=` lines from the
//! boot configuration and hands out GPIO controllers, I2C buses and devices,
//! SPI devices and PWM channels. Every handle reserves its pins in the board's
//! registry and gives them back when disposed or dropped, so two consumers can
//! never drive the same pin for different purposes.
//!
//! ```no_run
//! use board_arbiter::{Board, I2cConnectionSettings, PinMode, PinValue};
//!
//! let board = Board::create();
//! let mut gpio = board.create_gpio_controller()?;
//! gpio.open_pin_with_mode(17, PinMode::Output)?;
//! gpio.write(17, PinValue::High)?;
//!
//! let mut sensor = board.create_i2c_device(I2cConnectionSettings::new(1, 0x48))?;
//! let id = sensor.read_byte()?;
//! # let _ = id;
//! # Ok::<(), board_arbiter::BoardError>(())
//! ```

pub mod board;
pub mod boards;
pub mod bus;
pub mod config;
pub mod error;
pub mod gpio;
pub mod linux;
pub mod overlay;
pub mod pins;

pub use board::Board;
pub use boards::{AlternatePinMode, BoardModel, GenericBoard, RaspberryPiBoard, SimulatedBoard};
pub use bus::{
    I2cBus, I2cConnectionSettings, I2cDevice, PwmChannel, SpiConnectionSettings, SpiDevice, SpiMode,
};
pub use config::{BoardConfig, ModelSelection};
pub use error::{BoardError, Result};
pub use gpio::{GpioController, GpioDriver, GpioPin, PinMode, PinValue};
pub use overlay::OverlayConfig;
pub use pins::{OwnerToken, Pin, PinNumberingScheme, PinNumberingTranslator, PinUsage, UNASSIGNED_PIN};
