//! Pin numbering conversion
//!
//! A translator is a fixed bijection between logical (SoC) pin numbers and
//! board (header position) numbers. Converting logical → board → logical
//! always gives back the original pin; anything outside the table is rejected.

use super::{Pin, PinNumberingScheme};
use crate::error::{BoardError, Result};
use std::collections::BTreeMap;

/// Table-driven Logical ↔ Board bijection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinNumberingTranslator {
    logical_to_board: BTreeMap<Pin, Pin>,
    board_to_logical: BTreeMap<Pin, Pin>,
}

impl PinNumberingTranslator {
    /// Build from `(logical, board)` pairs. Fails if the table is not a bijection.
    pub fn from_pairs(pairs: &[(Pin, Pin)]) -> Result<Self> {
        let mut logical_to_board = BTreeMap::new();
        let mut board_to_logical = BTreeMap::new();

        for &(logical, board) in pairs {
            if logical < 0 || board < 0 {
                return Err(BoardError::InvalidArgument(format!(
                    "negative pin in numbering table: ({}, {})",
                    logical, board
                )));
            }
            if logical_to_board.insert(logical, board).is_some() {
                return Err(BoardError::InvalidArgument(format!(
                    "logical pin {} mapped twice",
                    logical
                )));
            }
            if board_to_logical.insert(board, logical).is_some() {
                return Err(BoardError::InvalidArgument(format!(
                    "board pin {} mapped twice",
                    board
                )));
            }
        }

        Ok(Self {
            logical_to_board,
            board_to_logical,
        })
    }

    /// Identity mapping over `0..pin_count`
    pub fn identity(pin_count: usize) -> Self {
        let map: BTreeMap<Pin, Pin> = (0..pin_count as Pin).map(|p| (p, p)).collect();
        Self {
            logical_to_board: map.clone(),
            board_to_logical: map,
        }
    }

    /// Convert `pin` from one scheme to another
    pub fn convert(&self, pin: Pin, from: PinNumberingScheme, to: PinNumberingScheme) -> Result<Pin> {
        let invalid = || BoardError::InvalidPinNumber { pin, scheme: from };

        match (from, to) {
            (PinNumberingScheme::Logical, PinNumberingScheme::Board) => {
                self.logical_to_board.get(&pin).copied().ok_or_else(invalid)
            }
            (PinNumberingScheme::Board, PinNumberingScheme::Logical) => {
                self.board_to_logical.get(&pin).copied().ok_or_else(invalid)
            }
            (scheme, _) => {
                if self.contains(pin, scheme) {
                    Ok(pin)
                } else {
                    Err(invalid())
                }
            }
        }
    }

    /// Convert a list of pins, keeping `UNASSIGNED_PIN` sentinels as they are
    pub fn convert_all(&self, pins: &[Pin], from: PinNumberingScheme, to: PinNumberingScheme) -> Result<Vec<Pin>> {
        pins.iter()
            .map(|&p| {
                if p == super::UNASSIGNED_PIN {
                    Ok(p)
                } else {
                    self.convert(p, from, to)
                }
            })
            .collect()
    }

    /// Whether `pin` is in the domain of `scheme`
    pub fn contains(&self, pin: Pin, scheme: PinNumberingScheme) -> bool {
        match scheme {
            PinNumberingScheme::Logical => self.logical_to_board.contains_key(&pin),
            PinNumberingScheme::Board => self.board_to_logical.contains_key(&pin),
        }
    }

    /// Number of pins in the table
    pub fn pin_count(&self) -> usize {
        self.logical_to_board.len()
    }

    /// All `(logical, board)` pairs, ordered by logical number
    pub fn pairs(&self) -> impl Iterator<Item = (Pin, Pin)> + '_ {
        self.logical_to_board.iter().map(|(l, b)| (*l, *b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PinNumberingScheme::{Board, Logical};

    #[test]
    fn test_identity_roundtrip() {
        let t = PinNumberingTranslator::identity(8);
        for pin in 0..8 {
            assert_eq!(t.convert(pin, Logical, Logical).unwrap(), pin);
            assert_eq!(t.convert(pin, Logical, Board).unwrap(), pin);
        }
        assert!(t.convert(8, Logical, Logical).is_err());
    }

    #[test]
    fn test_table_is_reversible() {
        let t = PinNumberingTranslator::from_pairs(&[(1, 2), (2, 4), (4, 8), (0, 1)]).unwrap();
        for (logical, _) in t.pairs().collect::<Vec<_>>() {
            let board = t.convert(logical, Logical, Board).unwrap();
            assert_eq!(t.convert(board, Board, Logical).unwrap(), logical);
        }
        assert_eq!(t.convert(2, Board, Logical).unwrap(), 1);
    }

    #[test]
    fn test_out_of_range() {
        let t = PinNumberingTranslator::from_pairs(&[(2, 3)]).unwrap();
        assert!(matches!(
            t.convert(1, Board, Logical),
            Err(BoardError::InvalidPinNumber { pin: 1, scheme: Board })
        ));
        assert!(t.convert(-1, Logical, Board).is_err());
        assert!(t.convert(3, Logical, Logical).is_err());
    }

    #[test]
    fn test_rejects_non_bijection() {
        assert!(PinNumberingTranslator::from_pairs(&[(1, 2), (3, 2)]).is_err());
        assert!(PinNumberingTranslator::from_pairs(&[(1, 2), (1, 3)]).is_err());
    }

    #[test]
    fn test_convert_all_keeps_sentinel() {
        let t = PinNumberingTranslator::from_pairs(&[(10, 19), (11, 23)]).unwrap();
        let out = t.convert_all(&[-1, 10, 11], Logical, Board).unwrap();
        assert_eq!(out, vec![-1, 19, 23]);
    }
}
