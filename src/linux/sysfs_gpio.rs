//! GPIO through the legacy `/sys/class/gpio` interface
//!
//! Pins are exported on open and unexported on close. A pin that was already
//! exported is adopted as is and left exported on close. The sysfs interface
//! has no pull resistor control, so only plain input and output are supported.

use super::{missing, read_attr, write_attr};
use crate::error::{BoardError, Result};
use crate::gpio::{GpioDriver, PinMode, PinValue};
use crate::pins::Pin;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct SysfsGpioDriver {
    root: PathBuf,
    pin_count: usize,
    /// Open pins, mapped to whether this driver wrote their export
    open: Mutex<BTreeMap<Pin, bool>>,
}

impl SysfsGpioDriver {
    /// Driver on `root` (normally `/sys/class/gpio`). Fails if the export
    /// file is missing, i.e. the kernel has no sysfs GPIO support.
    pub fn open(root: &Path, pin_count: usize) -> Result<Self> {
        let export = root.join("export");
        if !export.exists() {
            return Err(missing(&export));
        }
        log::debug!("Using sysfs GPIO at {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
            pin_count,
            open: Mutex::new(BTreeMap::new()),
        })
    }

    fn pin_dir(&self, pin: Pin) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    fn check_range(&self, pin: Pin) -> Result<()> {
        if pin < 0 || pin as usize >= self.pin_count {
            return Err(BoardError::InvalidArgument(format!(
                "GPIO {} is outside 0..{}",
                pin, self.pin_count
            )));
        }
        Ok(())
    }

    fn check_open(&self, pin: Pin) -> Result<PathBuf> {
        let open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        if !open.contains_key(&pin) {
            return Err(BoardError::PinNotOpen(pin));
        }
        Ok(self.pin_dir(pin))
    }
}

impl GpioDriver for SysfsGpioDriver {
    fn pin_count(&self) -> usize {
        self.pin_count
    }

    fn open_pin(&self, pin: Pin) -> Result<()> {
        self.check_range(pin)?;
        let mut open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        if open.contains_key(&pin) {
            return Ok(());
        }
        // Already exported by someone else (or a previous run)
        let adopt = self.pin_dir(pin).exists();
        if adopt {
            log::debug!("GPIO {} is already exported, leaving it exported on close", pin);
        } else {
            write_attr(&self.root.join("export"), &pin.to_string())?;
        }
        open.insert(pin, !adopt);
        Ok(())
    }

    fn close_pin(&self, pin: Pin) -> Result<()> {
        let exported_here = self
            .open
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&pin);
        if exported_here == Some(true) {
            write_attr(&self.root.join("unexport"), &pin.to_string())?;
        }
        Ok(())
    }

    fn is_pin_mode_supported(&self, pin: Pin, mode: PinMode) -> bool {
        self.check_range(pin).is_ok() && matches!(mode, PinMode::Input | PinMode::Output)
    }

    fn set_pin_mode(&self, pin: Pin, mode: PinMode) -> Result<()> {
        let dir = self.check_open(pin)?;
        let direction = match mode {
            PinMode::Input => "in",
            PinMode::Output => "out",
            PinMode::InputPullUp | PinMode::InputPullDown => {
                return Err(BoardError::UnsupportedConfiguration(format!(
                    "sysfs GPIO cannot set {:?} on pin {}",
                    mode, pin
                )))
            }
        };
        write_attr(&dir.join("direction"), direction)
    }

    fn get_pin_mode(&self, pin: Pin) -> Result<PinMode> {
        let dir = self.check_open(pin)?;
        match read_attr(&dir.join("direction"))?.as_str() {
            "in" => Ok(PinMode::Input),
            // "high"/"low" are outputs with an initial level
            "out" | "high" | "low" => Ok(PinMode::Output),
            other => Err(BoardError::InvalidArgument(format!(
                "unexpected direction '{}' for GPIO {}",
                other, pin
            ))),
        }
    }

    fn read(&self, pin: Pin) -> Result<PinValue> {
        let dir = self.check_open(pin)?;
        Ok(PinValue::from(read_attr(&dir.join("value"))? != "0"))
    }

    fn write(&self, pin: Pin, value: PinValue) -> Result<()> {
        let dir = self.check_open(pin)?;
        let level = match value {
            PinValue::Low => "0",
            PinValue::High => "1",
        };
        write_attr(&dir.join("value"), level)
    }
}
