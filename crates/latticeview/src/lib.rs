//! Latticeview lattice viewer library
//!
//! This library holds the lattice field data model, playback of recorded
//! simulations, and the scenes that keep a field in sync with a live solver
//! or a recording.

pub mod lib {
    pub mod lattice;
    pub mod playback;
    pub mod scene;
    pub mod settings;
}

pub mod app {
    pub mod cli;
    pub mod surface;
}

// Re-export commonly used types from lib modules
pub use app::surface::LogSurface;
pub use lib::lattice::{self, FieldError, LatticeField, StreamLine, Vec3};
pub use lib::playback::{self, PlaybackSequence};
pub use lib::scene::{self, CombinedScene, NetworkedScene, PlaybackScene, Scene, Surface};
pub use lib::settings::{self, Settings};
