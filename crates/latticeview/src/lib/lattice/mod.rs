//! Lattice field data model
//!
//! Grid-indexed density and velocity storage for the current simulation
//! snapshot, the D3Q27 velocity set, and the sampling queries (trilinear
//! interpolation and streamline tracing) built on top of them.

pub mod error;
pub mod store;
pub mod streamline;
pub mod velocity_set;

/// Three-component float vector used for positions and velocities
pub type Vec3 = nalgebra::Vector3<f32>;

pub use error::FieldError;
pub use store::{exp_lerp, grid_position, LatticeField};
pub use streamline::StreamLine;
pub use velocity_set::{direction, opposite, upstream_node, DIRECTIONS, DIRECTION_COUNT};
