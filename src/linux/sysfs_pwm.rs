//! Hardware PWM through `/sys/class/pwm/pwmchipN`
//!
//! Frequency and duty cycle are written as period and duty time in
//! nanoseconds. The channel is unexported when the handle is dropped.

use super::{missing, write_attr};
use crate::bus::PwmTransport;
use crate::error::{BoardError, Result};
use std::path::{Path, PathBuf};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

pub struct SysfsPwmChannel {
    chip_dir: PathBuf,
    channel: u32,
    period_ns: u64,
    duty_cycle: f64,
}

impl SysfsPwmChannel {
    /// Export `channel` of `pwmchip<chip>` under `root` and program it
    pub fn open(root: &Path, chip: u32, channel: u32, frequency: u32, duty_cycle: f64) -> Result<Self> {
        let chip_dir = root.join(format!("pwmchip{}", chip));
        if !chip_dir.exists() {
            return Err(missing(&chip_dir));
        }
        if !chip_dir.join(format!("pwm{}", channel)).exists() {
            write_attr(&chip_dir.join("export"), &channel.to_string())?;
        }

        let mut pwm = Self {
            chip_dir,
            channel,
            period_ns: 0,
            duty_cycle,
        };
        pwm.set_frequency(frequency)?;
        Ok(pwm)
    }

    fn attr(&self, name: &str) -> PathBuf {
        self.chip_dir.join(format!("pwm{}", self.channel)).join(name)
    }

    fn duty_ns(&self) -> u64 {
        (self.period_ns as f64 * self.duty_cycle).round() as u64
    }
}

impl PwmTransport for SysfsPwmChannel {
    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        if hz == 0 {
            return Err(BoardError::InvalidArgument("PWM frequency must be positive".into()));
        }
        // The kernel rejects a period shorter than the current duty time
        write_attr(&self.attr("duty_cycle"), "0")?;
        self.period_ns = NANOS_PER_SECOND / hz as u64;
        write_attr(&self.attr("period"), &self.period_ns.to_string())?;
        write_attr(&self.attr("duty_cycle"), &self.duty_ns().to_string())
    }

    fn set_duty_cycle(&mut self, duty: f64) -> Result<()> {
        self.duty_cycle = duty;
        write_attr(&self.attr("duty_cycle"), &self.duty_ns().to_string())
    }

    fn start(&mut self) -> Result<()> {
        write_attr(&self.attr("enable"), "1")
    }

    fn stop(&mut self) -> Result<()> {
        write_attr(&self.attr("enable"), "0")
    }
}

impl Drop for SysfsPwmChannel {
    fn drop(&mut self) {
        if let Err(e) = write_attr(&self.chip_dir.join("unexport"), &self.channel.to_string()) {
            log::debug!("Unexporting PWM channel {} failed: {}", self.channel, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fake_pwmchip() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pwmchip0/pwm0")).unwrap();
        fs::write(dir.path().join("pwmchip0/export"), "").unwrap();
        dir
    }

    fn read(dir: &tempfile::TempDir, attr: &str) -> String {
        fs::read_to_string(dir.path().join("pwmchip0").join(attr)).unwrap()
    }

    #[test]
    fn test_period_and_duty() {
        let sysfs = fake_pwmchip();
        let mut pwm = SysfsPwmChannel::open(sysfs.path(), 0, 0, 1000, 0.25).unwrap();
        assert_eq!(read(&sysfs, "pwm0/period"), "1000000");
        assert_eq!(read(&sysfs, "pwm0/duty_cycle"), "250000");

        pwm.set_duty_cycle(0.5).unwrap();
        assert_eq!(read(&sysfs, "pwm0/duty_cycle"), "500000");
        pwm.start().unwrap();
        assert_eq!(read(&sysfs, "pwm0/enable"), "1");
        pwm.stop().unwrap();
        assert_eq!(read(&sysfs, "pwm0/enable"), "0");

        drop(pwm);
        assert_eq!(read(&sysfs, "unexport"), "0");
    }

    #[test]
    fn test_missing_chip() {
        let sysfs = fake_pwmchip();
        assert!(matches!(
            SysfsPwmChannel::open(sysfs.path(), 1, 0, 1000, 0.5),
            Err(BoardError::Io(_))
        ));
    }

    #[test]
    fn test_exports_channel() {
        let sysfs = fake_pwmchip();
        // pwm1 is not exported and the fake kernel never creates it
        assert!(SysfsPwmChannel::open(sysfs.path(), 0, 1, 1000, 0.5).is_err());
        assert_eq!(read(&sysfs, "export"), "1");
    }
}
