//! Pin ownership ledger
//!
//! Records, per logical pin, the live reservation (usage and owner) and the
//! pin's history: the last non-`Unknown` usage it was ever reserved for.
//! History survives a release and is what [`PinRegistry::determine_current_pin_usage`]
//! reports, so callers can still see what a pin was driven as after it was freed.
//!
//! The registry itself is not synchronized; the board keeps it behind its lock.

use super::{OwnerToken, Pin, PinUsage};
use crate::error::{BoardError, Result};
use std::collections::BTreeMap;

/// Live reservation of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub usage: PinUsage,
    pub owner: OwnerToken,
}

/// Per-pin bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinRecord {
    /// Current reservation, `None` when free
    pub reservation: Option<Reservation>,
    /// History: most recent non-`Unknown` usage, kept across releases
    pub last_usage: PinUsage,
}

/// Ownership ledger keyed by logical pin number
#[derive(Debug, Default)]
pub struct PinRegistry {
    records: BTreeMap<Pin, PinRecord>,
}

impl PinRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `pin` for `usage` on behalf of `owner`
    pub fn reserve_pin(&mut self, pin: Pin, usage: PinUsage, owner: OwnerToken) -> Result<()> {
        if usage == PinUsage::Unknown {
            return Err(BoardError::UnsupportedConfiguration(format!(
                "cannot reserve pin {} for usage {}",
                pin, usage
            )));
        }

        let record = self.records.entry(pin).or_default();
        if let Some(held) = record.reservation {
            return Err(BoardError::PinAlreadyInUse {
                pin,
                usage: held.usage,
                owner: held.owner,
            });
        }

        record.reservation = Some(Reservation { usage, owner });
        record.last_usage = usage;
        log::debug!("Reserved pin {} for {} ({})", pin, usage, owner);
        Ok(())
    }

    /// Release the reservation of `pin`; only the recorded owner may do so
    pub fn release_pin(&mut self, pin: Pin, usage: PinUsage, owner: OwnerToken) -> Result<()> {
        let Some(record) = self.records.get_mut(&pin) else {
            return Err(BoardError::NotReserved { pin });
        };
        let Some(held) = record.reservation else {
            return Err(BoardError::NotReserved { pin });
        };

        if held.usage != usage {
            return Err(BoardError::UsageMismatch {
                pin,
                reserved: held.usage,
                requested: usage,
            });
        }

        if held.owner != owner {
            return Err(BoardError::OwnerMismatch {
                pin,
                owner: held.owner,
                requested: owner,
            });
        }

        record.reservation = None;
        log::debug!("Released pin {} from {} ({})", pin, usage, owner);
        Ok(())
    }

    /// Last usage the pin was reserved for, even if it has been released since
    pub fn determine_current_pin_usage(&self, pin: Pin) -> PinUsage {
        self.records
            .get(&pin)
            .map(|r| r.last_usage)
            .unwrap_or(PinUsage::Unknown)
    }

    /// Live reservation of the pin, if any
    pub fn current_reservation(&self, pin: Pin) -> Option<(PinUsage, OwnerToken)> {
        self.records
            .get(&pin)
            .and_then(|r| r.reservation)
            .map(|held| (held.usage, held.owner))
    }

    /// Full record for a pin (default record for untouched pins)
    pub fn record(&self, pin: Pin) -> PinRecord {
        self.records.get(&pin).copied().unwrap_or_default()
    }

    /// Pins currently reserved, in ascending order
    pub fn reserved_pins(&self) -> Vec<(Pin, PinUsage, OwnerToken)> {
        self.records
            .iter()
            .filter_map(|(pin, r)| r.reservation.map(|held| (*pin, held.usage, held.owner)))
            .collect()
    }

    /// Reserve every pin in `pins`, undoing the ones already taken if any fails
    pub fn reserve_all(&mut self, pins: &[Pin], usage: PinUsage, owner: OwnerToken) -> Result<()> {
        for (i, pin) in pins.iter().enumerate() {
            if let Err(e) = self.reserve_pin(*pin, usage, owner) {
                for taken in &pins[..i] {
                    let _ = self.release_pin(*taken, usage, owner);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Release every pin in `pins`, reporting the first failure after trying all
    pub fn release_all(&mut self, pins: &[Pin], usage: PinUsage, owner: OwnerToken) -> Result<()> {
        let mut first_error = None;
        for pin in pins {
            if let Err(e) = self.release_pin(*pin, usage, owner) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_query() {
        let mut registry = PinRegistry::new();
        let owner = OwnerToken::new();
        assert_eq!(registry.determine_current_pin_usage(1), PinUsage::Unknown);

        registry.reserve_pin(1, PinUsage::I2c, owner).unwrap();
        assert_eq!(registry.determine_current_pin_usage(1), PinUsage::I2c);
        assert_eq!(registry.current_reservation(1), Some((PinUsage::I2c, owner)));
        assert_eq!(
            registry.record(1).reservation,
            Some(Reservation {
                usage: PinUsage::I2c,
                owner
            })
        );
    }

    #[test]
    fn test_conflict_names_the_holder() {
        let mut registry = PinRegistry::new();
        let holder = OwnerToken::new();
        let intruder = OwnerToken::new();
        registry.reserve_pin(5, PinUsage::Spi, holder).unwrap();

        match registry.reserve_pin(5, PinUsage::Gpio, intruder) {
            Err(BoardError::PinAlreadyInUse { owner, .. }) => assert_eq!(owner, holder),
            other => panic!("unexpected result: {:?}", other),
        }
        match registry.release_pin(5, PinUsage::Spi, intruder) {
            Err(BoardError::OwnerMismatch { owner, requested, .. }) => {
                assert_eq!(owner, holder);
                assert_eq!(requested, intruder);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_mutual_exclusion() {
        let mut registry = PinRegistry::new();
        let first = OwnerToken::new();
        let second = OwnerToken::new();
        registry.reserve_pin(7, PinUsage::Gpio, first).unwrap();

        for usage in [PinUsage::Gpio, PinUsage::I2c, PinUsage::Spi, PinUsage::Pwm] {
            let err = registry.reserve_pin(7, usage, second).unwrap_err();
            assert!(matches!(err, BoardError::PinAlreadyInUse { pin: 7, usage: PinUsage::Gpio, .. }));
        }

        // Same owner cannot stack reservations either
        assert!(registry.reserve_pin(7, PinUsage::Gpio, first).is_err());
    }

    #[test]
    fn test_release_errors() {
        let mut registry = PinRegistry::new();
        let owner = OwnerToken::new();
        registry.reserve_pin(1, PinUsage::I2c, owner).unwrap();

        assert!(matches!(
            registry.release_pin(1, PinUsage::Gpio, owner),
            Err(BoardError::UsageMismatch { reserved: PinUsage::I2c, requested: PinUsage::Gpio, .. })
        ));
        assert!(matches!(
            registry.release_pin(1, PinUsage::I2c, OwnerToken::new()),
            Err(BoardError::OwnerMismatch { pin: 1, .. })
        ));
        assert!(matches!(
            registry.release_pin(2, PinUsage::Pwm, owner),
            Err(BoardError::NotReserved { pin: 2 })
        ));

        registry.release_pin(1, PinUsage::I2c, owner).unwrap();
        assert!(matches!(
            registry.release_pin(1, PinUsage::I2c, owner),
            Err(BoardError::NotReserved { pin: 1 })
        ));
    }

    #[test]
    fn test_history_is_sticky() {
        let mut registry = PinRegistry::new();
        let owner = OwnerToken::new();
        registry.reserve_pin(0, PinUsage::I2c, owner).unwrap();
        registry.release_pin(0, PinUsage::I2c, owner).unwrap();

        assert_eq!(registry.determine_current_pin_usage(0), PinUsage::I2c);
        assert_eq!(registry.current_reservation(0), None);

        let other = OwnerToken::new();
        registry.reserve_pin(0, PinUsage::Pwm, other).unwrap();
        assert_eq!(registry.determine_current_pin_usage(0), PinUsage::Pwm);
    }

    #[test]
    fn test_reserve_unknown_rejected() {
        let mut registry = PinRegistry::new();
        assert!(matches!(
            registry.reserve_pin(3, PinUsage::Unknown, OwnerToken::new()),
            Err(BoardError::UnsupportedConfiguration(_))
        ));
        assert_eq!(registry.record(3), PinRecord::default());
    }

    #[test]
    fn test_reserve_all_rolls_back() {
        let mut registry = PinRegistry::new();
        let blocker = OwnerToken::new();
        registry.reserve_pin(3, PinUsage::Gpio, blocker).unwrap();

        let bus = OwnerToken::new();
        assert!(registry.reserve_all(&[1, 2, 3], PinUsage::Spi, bus).is_err());
        assert_eq!(registry.current_reservation(1), None);
        assert_eq!(registry.current_reservation(2), None);
        assert_eq!(registry.reserved_pins(), vec![(3, PinUsage::Gpio, blocker)]);
    }
}
