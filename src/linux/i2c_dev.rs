//! I2C through `/dev/i2c-N`
//!
//! Each device gets its own file descriptor bound to its address with the
//! `I2C_SLAVE` ioctl, so devices on one bus never race on the target address.

use super::missing;
use crate::bus::{I2cBusTransport, I2cDeviceTransport};
use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
const I2C_SLAVE: libc::c_ulong = 0x0703;

pub struct UnixI2cBus {
    bus_id: u32,
    path: PathBuf,
}

impl UnixI2cBus {
    /// Bus backed by `<dev_root>/i2c-<bus_id>`
    pub fn open(dev_root: &Path, bus_id: u32) -> Result<Self> {
        let path = dev_root.join(format!("i2c-{}", bus_id));
        if !path.exists() {
            return Err(missing(&path));
        }
        Ok(Self { bus_id, path })
    }
}

impl I2cBusTransport for UnixI2cBus {
    fn create_device(&mut self, address: u16) -> Result<Box<dyn I2cDeviceTransport>> {
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        set_target_address(&file, address)?;
        log::debug!("Opened {} for address {:#04x}", self.path.display(), address);
        Ok(Box::new(UnixI2cDevice {
            bus_id: self.bus_id,
            address,
            file,
        }))
    }
}

#[cfg(unix)]
fn set_target_address(file: &File, address: u16) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE as _, address as libc::c_ulong) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_target_address(_file: &File, _address: u16) -> Result<()> {
    Err(crate::error::BoardError::UnsupportedConfiguration(
        "i2c-dev is only available on Linux".into(),
    ))
}

pub struct UnixI2cDevice {
    bus_id: u32,
    address: u16,
    file: File,
}

impl I2cDeviceTransport for UnixI2cDevice {
    fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.file.read_exact(buffer)?;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data)?;
        Ok(())
    }
}

impl std::fmt::Debug for UnixI2cDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixI2cDevice")
            .field("bus_id", &self.bus_id)
            .field("address", &format_args!("{:#04x}", self.address))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoardError;

    #[test]
    fn test_missing_device_node() {
        let dir = tempfile::tempdir().unwrap();
        match UnixI2cBus::open(dir.path(), 1) {
            Err(BoardError::Io(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
                assert!(e.to_string().contains("i2c-1"));
            }
            other => panic!("expected NotFound, got {:?}", other.map(|b| b.bus_id)),
        }
    }

    #[test]
    fn test_regular_file_is_not_an_adapter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("i2c-1"), "").unwrap();
        let mut bus = UnixI2cBus::open(dir.path(), 1).unwrap();
        // The address ioctl fails on anything but an i2c-dev node
        assert!(bus.create_device(0x48).is_err());
    }
}
