//! Quadtree address type definitions

use std::fmt;
use thiserror::Error;

/// Deepest quadtree level addressable in a globe package.
pub const MAX_LEVEL: u8 = 24;

/// Address of a node in the geospatial quadtree.
///
/// A qtnode is a base-4 digit string always starting with `'0'` (the root);
/// each following digit selects a quadrant, so a node at level `n` has
/// `n + 1` digits. `"0"` is the root node itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QtNode(String);

impl QtNode {
    /// The root node `"0"`.
    pub fn root() -> Self {
        QtNode("0".to_string())
    }

    /// Validates an externally supplied qtnode string (e.g. from a tile
    /// request URL).
    pub fn parse(s: &str) -> Result<Self, QtNodeError> {
        if s.is_empty() {
            return Err(QtNodeError::Empty);
        }
        if !s.starts_with('0') {
            return Err(QtNodeError::MissingRoot(s.to_string()));
        }
        if s.len() > (MAX_LEVEL as usize) + 1 {
            return Err(QtNodeError::TooDeep(s.to_string()));
        }
        if let Some(bad) = s.chars().find(|c| !('0'..='3').contains(c)) {
            return Err(QtNodeError::InvalidDigit(bad, s.to_string()));
        }
        Ok(QtNode(s.to_string()))
    }

    /// Built by the conversion routines in [`super`]; digits are already
    /// known to be valid.
    pub(crate) fn from_digits(digits: String) -> Self {
        debug_assert!(digits.starts_with('0'));
        debug_assert!(digits.bytes().all(|b| (b'0'..=b'3').contains(&b)));
        QtNode(digits)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quadtree level of this node (root is level 0).
    pub fn level(&self) -> u8 {
        (self.0.len() - 1) as u8
    }
}

impl fmt::Display for QtNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QtNode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors from qtnode validation and tile-coordinate conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QtNodeError {
    /// Qtnode string was empty
    #[error("empty qtnode")]
    Empty,

    /// Qtnode string did not start with the root digit '0'
    #[error("qtnode '{0}' does not start with root digit '0'")]
    MissingRoot(String),

    /// Qtnode string was longer than MAX_LEVEL + 1 digits
    #[error("qtnode '{0}' exceeds maximum level {}", MAX_LEVEL)]
    TooDeep(String),

    /// Qtnode string contained a character outside '0'..'3'
    #[error("invalid digit '{0}' in qtnode '{1}'")]
    InvalidDigit(char, String),

    /// Level was above MAX_LEVEL
    #[error("level {0} exceeds maximum level {}", MAX_LEVEL)]
    InvalidLevel(u8),

    /// Tile coordinate was outside [0, 2^level)
    #[error("tile coordinate ({col}, {row}) out of range at level {level}")]
    CoordinateOutOfRange { col: u32, row: u32, level: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_valid_nodes() {
        for s in ["0", "01", "0213", "0000", "0333"] {
            let node = QtNode::parse(s).unwrap();
            assert_eq!(node.as_str(), s);
        }
    }

    #[test]
    fn test_parse_rejects_missing_root() {
        assert!(matches!(
            QtNode::parse("123"),
            Err(QtNodeError::MissingRoot(_))
        ));
    }

    #[test]
    fn test_parse_rejects_invalid_digit() {
        assert!(matches!(
            QtNode::parse("0124"),
            Err(QtNodeError::InvalidDigit('4', _))
        ));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(QtNode::parse(""), Err(QtNodeError::Empty)));
    }

    #[test]
    fn test_level_is_length_minus_one() {
        assert_eq!(QtNode::root().level(), 0);
        assert_eq!(QtNode::parse("0213").unwrap().level(), 3);
    }
}
