//! SPI through `/dev/spidevB.C`
//!
//! Mode, word size and clock are applied once when the device is opened.
//! Reads and writes are half duplex; full duplex uses one `SPI_IOC_MESSAGE`
//! transfer.

use super::missing;
use crate::bus::{SpiConnectionSettings, SpiTransport};
use crate::error::{BoardError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
mod ioctl {
    pub const SPI_IOC_WR_MODE: libc::c_ulong = 0x4001_6b01;
    pub const SPI_IOC_WR_BITS_PER_WORD: libc::c_ulong = 0x4001_6b03;
    pub const SPI_IOC_WR_MAX_SPEED_HZ: libc::c_ulong = 0x4004_6b04;
    /// `SPI_IOC_MESSAGE(1)`
    pub const SPI_IOC_MESSAGE_1: libc::c_ulong = 0x4020_6b00;
    pub const SPI_NO_CS: u8 = 0x40;

    /// `struct spi_ioc_transfer` from `linux/spi/spidev.h`
    #[repr(C)]
    #[derive(Default)]
    pub struct SpiIocTransfer {
        pub tx_buf: u64,
        pub rx_buf: u64,
        pub len: u32,
        pub speed_hz: u32,
        pub delay_usecs: u16,
        pub bits_per_word: u8,
        pub cs_change: u8,
        pub tx_nbits: u8,
        pub rx_nbits: u8,
        pub word_delay_usecs: u8,
        pub pad: u8,
    }
}

/// Device node for `settings`; a device without chip select uses line 0's node
pub fn spidev_path(dev_root: &Path, settings: &SpiConnectionSettings) -> PathBuf {
    dev_root.join(format!(
        "spidev{}.{}",
        settings.bus_id,
        settings.chip_select_line.max(0)
    ))
}

pub struct UnixSpiDevice {
    settings: SpiConnectionSettings,
    file: File,
}

impl UnixSpiDevice {
    pub fn open(dev_root: &Path, settings: &SpiConnectionSettings) -> Result<Self> {
        let path = spidev_path(dev_root, settings);
        if !path.exists() {
            return Err(missing(&path));
        }
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let device = Self {
            settings: *settings,
            file,
        };
        device.configure()?;
        log::debug!(
            "Opened {} ({:?}, {} Hz)",
            path.display(),
            settings.mode,
            settings.clock_frequency
        );
        Ok(device)
    }

    #[cfg(unix)]
    fn configure(&self) -> Result<()> {
        use self::ioctl::*;

        let mut mode = self.settings.mode.bits();
        if self.settings.chip_select_line < 0 {
            mode |= SPI_NO_CS;
        }
        let bits = self.settings.data_bit_length;
        let speed = self.settings.clock_frequency;

        self.ioctl_write(SPI_IOC_WR_MODE, &mode as *const u8 as *const libc::c_void)?;
        self.ioctl_write(SPI_IOC_WR_BITS_PER_WORD, &bits as *const u8 as *const libc::c_void)?;
        self.ioctl_write(SPI_IOC_WR_MAX_SPEED_HZ, &speed as *const u32 as *const libc::c_void)
    }

    #[cfg(not(unix))]
    fn configure(&self) -> Result<()> {
        Err(BoardError::UnsupportedConfiguration(
            "spidev is only available on Linux".into(),
        ))
    }

    #[cfg(unix)]
    fn ioctl_write(&self, request: libc::c_ulong, arg: *const libc::c_void) -> Result<()> {
        use std::os::unix::io::AsRawFd;

        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, arg) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }
}

impl SpiTransport for UnixSpiDevice {
    fn read(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.file.read_exact(buffer)?;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data)?;
        Ok(())
    }

    fn transfer_full_duplex(&mut self, write: &[u8], read: &mut [u8]) -> Result<()> {
        if write.len() != read.len() {
            return Err(BoardError::InvalidArgument(format!(
                "full duplex transfer needs equal lengths, got {} and {}",
                write.len(),
                read.len()
            )));
        }

        #[cfg(unix)]
        {
            use self::ioctl::*;

            let transfer = SpiIocTransfer {
                tx_buf: write.as_ptr() as u64,
                rx_buf: read.as_mut_ptr() as u64,
                len: write.len() as u32,
                speed_hz: self.settings.clock_frequency,
                bits_per_word: self.settings.data_bit_length,
                ..SpiIocTransfer::default()
            };
            self.ioctl_write(
                SPI_IOC_MESSAGE_1,
                &transfer as *const SpiIocTransfer as *const libc::c_void,
            )
        }

        #[cfg(not(unix))]
        {
            Err(BoardError::UnsupportedConfiguration(
                "spidev is only available on Linux".into(),
            ))
        }
    }
}
