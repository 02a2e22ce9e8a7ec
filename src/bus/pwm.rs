//! PWM channels bound to a reserved pin

use super::PwmTransport;
use crate::board::BoardInner;
use crate::error::{BoardError, Result};
use crate::pins::{OwnerToken, Pin, PinUsage};
use std::sync::Arc;

/// A hardware PWM output. The pin stays reserved for `Pwm` until the channel
/// is disposed or dropped.
pub struct PwmChannel {
    board: Arc<BoardInner>,
    chip: u32,
    channel: u32,
    /// Logical pin
    pin: Pin,
    owner: OwnerToken,
    frequency: u32,
    duty_cycle: f64,
    running: bool,
    transport: Option<Box<dyn PwmTransport>>,
}

impl PwmChannel {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        board: Arc<BoardInner>,
        chip: u32,
        channel: u32,
        pin: Pin,
        owner: OwnerToken,
        frequency: u32,
        duty_cycle: f64,
        transport: Box<dyn PwmTransport>,
    ) -> Self {
        log::debug!("Opened PWM {}/{} on pin {}", chip, channel, pin);
        Self {
            board,
            chip,
            channel,
            pin,
            owner,
            frequency,
            duty_cycle,
            running: false,
            transport: Some(transport),
        }
    }

    fn transport(&mut self) -> Result<&mut Box<dyn PwmTransport>> {
        self.transport
            .as_mut()
            .ok_or(BoardError::ObjectDisposed("PwmChannel"))
    }

    pub fn chip(&self) -> u32 {
        self.chip
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// Logical pin the channel drives
    pub fn pin(&self) -> Pin {
        self.pin
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn duty_cycle(&self) -> f64 {
        self.duty_cycle
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_frequency(&mut self, hz: u32) -> Result<()> {
        if hz == 0 {
            return Err(BoardError::InvalidArgument("PWM frequency must be non-zero".into()));
        }
        self.transport()?.set_frequency(hz)?;
        self.frequency = hz;
        Ok(())
    }

    /// `duty` in `0.0..=1.0`
    pub fn set_duty_cycle(&mut self, duty: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&duty) {
            return Err(BoardError::InvalidArgument(format!(
                "duty cycle {} is outside 0.0..=1.0",
                duty
            )));
        }
        self.transport()?.set_duty_cycle(duty)?;
        self.duty_cycle = duty;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.transport()?.start()?;
        self.running = true;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.transport()?.stop()?;
        self.running = false;
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.transport.is_none()
    }

    /// Stop the output and release the pin. Idempotent.
    pub fn dispose(&mut self) -> Result<()> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        if self.running {
            if let Err(e) = transport.stop() {
                log::warn!("Stopping PWM {}/{} failed: {}", self.chip, self.channel, e);
            }
            self.running = false;
        }
        drop(transport);
        log::debug!("Disposed PWM {}/{}", self.chip, self.channel);
        self.board.release_pins(&[self.pin], PinUsage::Pwm, self.owner)
    }
}

impl Drop for PwmChannel {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            log::warn!("Releasing PWM pin failed: {}", e);
        }
    }
}

impl std::fmt::Debug for PwmChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PwmChannel")
            .field("chip", &self.chip)
            .field("channel", &self.channel)
            .field("pin", &self.pin)
            .field("frequency", &self.frequency)
            .field("duty_cycle", &self.duty_cycle)
            .field("running", &self.running)
            .finish()
    }
}
