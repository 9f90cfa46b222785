//! Errors raised by the lattice field store

use latticeview_network::GridDimensions;
use thiserror::Error;

/// Errors that can occur when mutating or sampling a [`super::LatticeField`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    /// The caller supplied malformed data or a NaN coordinate
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A sampling position lies outside the lattice
    #[error("Position ({x}, {y}, {z}) is outside lattice {dims}")]
    Range {
        x: f32,
        y: f32,
        z: f32,
        dims: GridDimensions,
    },
}

impl FieldError {
    pub(crate) fn length_mismatch(what: &str, expected: usize, got: usize) -> Self {
        Self::InvalidArgument(format!("{what} has {got} entries, expected {expected}"))
    }
}
