//! D3Q27 velocity set.
//!
//! Twenty-seven discrete directions on the 3D cubic lattice:
//! - 1 rest (0)
//! - 6 face-centered (±x, ±y, ±z)
//! - 12 edge-centered (±x±y, ±x±z, ±y±z)
//! - 8 corner-centered (±x±y±z)
//!
//! Directions after the rest direction come in opposite pairs.

use super::Vec3;
use latticeview_network::GridDimensions;

/// Number of discrete directions per node
pub const DIRECTION_COUNT: usize = 27;

/// D3Q27 discrete velocities: [vx, vy, vz]
pub const DIRECTIONS: [[i32; 3]; DIRECTION_COUNT] = [
    [0, 0, 0], // 0: rest
    [1, 0, 0], // 1-6: face
    [-1, 0, 0],
    [0, 1, 0],
    [0, -1, 0],
    [0, 0, 1],
    [0, 0, -1],
    [1, 1, 0], // 7-18: edge
    [-1, -1, 0],
    [1, -1, 0],
    [-1, 1, 0],
    [1, 0, 1],
    [-1, 0, -1],
    [1, 0, -1],
    [-1, 0, 1],
    [0, 1, 1],
    [0, -1, -1],
    [0, 1, -1],
    [0, -1, 1],
    [1, 1, 1], // 19-26: corner
    [-1, -1, -1],
    [1, 1, -1],
    [-1, -1, 1],
    [1, -1, 1],
    [-1, 1, -1],
    [-1, 1, 1],
    [1, -1, -1],
];

/// Direction `index` as a float vector
pub fn direction(index: usize) -> Vec3 {
    let [x, y, z] = DIRECTIONS[index];
    Vec3::new(x as f32, y as f32, z as f32)
}

/// Index of the direction pointing the other way
pub fn opposite(index: usize) -> usize {
    match index {
        0 => 0,
        i if i % 2 == 1 => i + 1,
        i => i - 1,
    }
}

/// Node whose population streams into `node` along direction `index`.
///
/// Neighbors wrap around periodically at the lattice faces.
pub fn upstream_node(dims: GridDimensions, node: [usize; 3], index: usize) -> [usize; 3] {
    let extents = dims.extents();
    let mut out = [0usize; 3];
    for axis in 0..3 {
        let extent = extents[axis] as i64;
        if extent == 0 {
            continue;
        }
        let coord = node[axis] as i64 - DIRECTIONS[index][axis] as i64;
        out[axis] = coord.rem_euclid(extent) as usize;
    }
    out
}
