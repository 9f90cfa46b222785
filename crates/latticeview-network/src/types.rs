//! Shared types for lattice snapshot transfer

use serde::{Deserialize, Serialize};

/// Extent of the solver lattice along each axis.
///
/// The handshake carries each axis as a single unsigned byte, so every axis
/// is limited to 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridDimensions {
    pub width: u8,
    pub height: u8,
    pub depth: u8,
}

impl GridDimensions {
    /// Create new grid dimensions
    pub fn new(width: u8, height: u8, depth: u8) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Total number of lattice nodes (`width * height * depth`)
    pub fn node_count(&self) -> usize {
        self.width as usize * self.height as usize * self.depth as usize
    }

    /// Check whether any axis is empty
    pub fn is_empty(&self) -> bool {
        self.node_count() == 0
    }

    /// Flat index of the node at `(x, y, z)`.
    ///
    /// The y term is scaled by `height`, not `width`. Solver output, playback
    /// files and live frames are all laid out with this formula, so it must
    /// not be changed in isolation.
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        let width = self.width as usize;
        let height = self.height as usize;
        x + y * height + z * (width * height)
    }

    /// Axis extents as an array `[width, height, depth]`
    pub fn extents(&self) -> [usize; 3] {
        [
            self.width as usize,
            self.height as usize,
            self.depth as usize,
        ]
    }
}

impl std::fmt::Display for GridDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.depth)
    }
}

/// Parsed header that precedes every frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Status / command id echoed by the solver
    pub status: u8,
    /// Sequence counter, informational only
    pub sequence: u8,
    /// Number of bytes used to encode `declared_len`
    pub size_of_size: u8,
    /// Payload length as declared on the wire (bytes or elements)
    pub declared_len: u64,
}

/// Parsed response to a handshake request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub status: u8,
    pub sequence: u8,
    pub dimensions: GridDimensions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_count() {
        let dims = GridDimensions::new(4, 3, 2);
        assert_eq!(dims.node_count(), 24);
        assert!(!dims.is_empty());
        assert!(GridDimensions::new(4, 0, 2).is_empty());
    }

    #[test]
    fn test_index_formula_uses_height_for_y() {
        let dims = GridDimensions::new(4, 3, 2);
        assert_eq!(dims.index(0, 0, 0), 0);
        assert_eq!(dims.index(1, 0, 0), 1);
        assert_eq!(dims.index(0, 1, 0), 3);
        assert_eq!(dims.index(0, 0, 1), 12);
        assert_eq!(dims.index(3, 2, 1), 3 + 6 + 12);
    }

    #[test]
    fn test_display() {
        assert_eq!(GridDimensions::new(10, 1, 150).to_string(), "10x1x150");
    }
}
