//! Error types for pin arbitration and bus brokering
//!
//! Every failure in this crate is a precondition violation detected
//! synchronously, so errors are reported to the caller as-is and never retried.

use crate::pins::{OwnerToken, Pin, PinNumberingScheme, PinUsage};
use thiserror::Error;

/// Errors raised by the board, its registry and the handles it hands out
#[derive(Debug, Error)]
pub enum BoardError {
    /// The pin is already reserved for some usage
    #[error("pin {pin} has already been reserved for {usage} by {owner}")]
    PinAlreadyInUse {
        pin: Pin,
        usage: PinUsage,
        owner: OwnerToken,
    },

    /// Release of a pin that holds no reservation
    #[error("cannot release pin {pin}, because it is not reserved")]
    NotReserved { pin: Pin },

    /// Release with a usage other than the one recorded
    #[error("cannot release pin {pin} as {requested}, it is reserved for {reserved}")]
    UsageMismatch {
        pin: Pin,
        reserved: PinUsage,
        requested: PinUsage,
    },

    /// Release by a token that does not own the reservation
    #[error("cannot release pin {pin}, {requested} is not the owner ({owner} is)")]
    OwnerMismatch {
        pin: Pin,
        owner: OwnerToken,
        requested: OwnerToken,
    },

    /// Pin outside the domain of the given numbering scheme
    #[error("pin {pin} is not a valid {scheme} pin on this board")]
    InvalidPinNumber {
        pin: Pin,
        scheme: PinNumberingScheme,
    },

    /// Operation on a controller, bus or device that was disposed
    #[error("{0} has been disposed")]
    ObjectDisposed(&'static str),

    /// The board (or overlay) does not define the requested bus, channel or line
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// A live device already occupies the address on this bus
    #[error("address {address:#04x} on I2C bus {bus_id} is already in use")]
    AddressInUse { bus_id: u32, address: u16 },

    /// GPIO operation on a pin the controller has not opened
    #[error("pin {0} is not open on this controller")]
    PinNotOpen(Pin),

    /// Malformed argument (wrong number of pins, bad settings)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error from a hardware backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid board configuration file
    #[error("invalid board configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BoardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BoardError::NotReserved { pin: 4 };
        assert_eq!(err.to_string(), "cannot release pin 4, because it is not reserved");

        let err = BoardError::AddressInUse { bus_id: 1, address: 0x3c };
        assert_eq!(err.to_string(), "address 0x3c on I2C bus 1 is already in use");

        let err = BoardError::InvalidPinNumber {
            pin: 1,
            scheme: PinNumberingScheme::Board,
        };
        assert!(err.to_string().contains("board"));
    }
}
