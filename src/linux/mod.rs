//! Linux backends: sysfs GPIO and PWM, i2c-dev and spidev device nodes
//!
//! All roots are configurable so the backends can be pointed at a fake
//! directory tree in tests.

pub mod i2c_dev;
pub mod spidev;
pub mod sysfs_gpio;
pub mod sysfs_pwm;

pub use i2c_dev::UnixI2cBus;
pub use spidev::UnixSpiDevice;
pub use sysfs_gpio::SysfsGpioDriver;
pub use sysfs_pwm::SysfsPwmChannel;

use crate::error::{BoardError, Result};
use std::fs;
use std::path::Path;

/// Write a sysfs attribute, naming the file in the error
pub(crate) fn write_attr(path: &Path, value: &str) -> Result<()> {
    fs::write(path, value).map_err(|e| {
        BoardError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to write {}: {}", path.display(), e),
        ))
    })
}

/// Read a sysfs attribute without its trailing newline
pub(crate) fn read_attr(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path).map_err(|e| {
        BoardError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read {}: {}", path.display(), e),
        ))
    })?;
    Ok(raw.trim().to_string())
}

/// Error for a device node or sysfs directory that does not exist
pub(crate) fn missing(path: &Path) -> BoardError {
    BoardError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{} does not exist", path.display()),
    ))
}
