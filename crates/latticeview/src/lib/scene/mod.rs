//! Scenes drive a [`LatticeField`] from one data source and present it
//!
//! A scene is selected at startup and then ticked by the host: `init` once,
//! `load` once, then `update` and `draw` every tick, and finally `close`.
//! Drawing goes through a [`Surface`], the only boundary a renderer needs.

pub mod networked;
pub mod playback;

pub use networked::{CombinedScene, NetworkedScene};
pub use playback::PlaybackScene;

use crate::lib::lattice::{LatticeField, Vec3};
use crate::lib::playback::PlaybackError;
use crate::lib::settings::StreamlineSettings;
use latticeview_network::GridDimensions;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Scene used before init")]
    NotInitialized,
}

/// Per-tick description of the displayed snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSummary {
    pub scene: String,
    /// Scene-specific status line, e.g. connection state or frame position
    pub status: String,
    pub dimensions: GridDimensions,
    pub node_count: usize,
    pub density_range: Option<(f32, f32)>,
    pub mean_intensity: f32,
    pub max_speed: f32,
    pub fluid_nodes: usize,
}

impl FrameSummary {
    /// Summarize the current contents of `field`
    pub fn from_field(scene: &str, status: String, field: &LatticeField) -> Self {
        let node_count = field.node_count();
        let mean_intensity = if node_count == 0 {
            0.0
        } else {
            field.intensities().iter().sum::<f32>() / node_count as f32
        };
        let max_speed = field
            .velocities()
            .iter()
            .map(|v| v.norm())
            .fold(0.0f32, f32::max);

        Self {
            scene: scene.to_string(),
            status,
            dimensions: field.dimensions(),
            node_count,
            density_range: field.density_range(),
            mean_intensity,
            max_speed,
            fluid_nodes: field.changeable().iter().filter(|c| **c).count(),
        }
    }
}

/// Drawing boundary between scenes and whatever presents them
pub trait Surface {
    /// Present the summary of the current snapshot
    fn frame(&mut self, summary: &FrameSummary);

    /// Present one traced streamline
    fn streamline(&mut self, seed: Vec3, points: &[Vec3]);
}

/// Capability set shared by every scene
pub trait Scene {
    /// Human-readable name
    fn name(&self) -> &str;

    /// Set up data sources; called whenever the scene is selected
    fn init(&mut self) -> Result<(), SceneError>;

    /// Load anything needed before the first draw
    fn load(&mut self) -> Result<(), SceneError> {
        Ok(())
    }

    /// Advance by `dt` seconds
    fn update(&mut self, dt: f32) -> Result<(), SceneError>;

    /// Present the current snapshot
    fn draw(&self, surface: &mut dyn Surface);

    /// Release data sources before exit
    fn close(&mut self);

    /// The snapshot this scene maintains
    fn field(&self) -> &LatticeField;
}

/// Draw a field summary and its streamlines
pub fn draw_field(
    scene: &str,
    status: String,
    field: &LatticeField,
    streamlines: &StreamlineSettings,
    surface: &mut dyn Surface,
) {
    surface.frame(&FrameSummary::from_field(scene, status, field));

    for seed in streamline_seeds(field, streamlines) {
        let points = field.compute_streamline(seed, streamlines.steps);
        surface.streamline(seed, &points);
    }
}

/// Configured seeds, or the lattice centre when none are configured
fn streamline_seeds(field: &LatticeField, streamlines: &StreamlineSettings) -> Vec<Vec3> {
    if !streamlines.seeds.is_empty() {
        return streamlines
            .seeds
            .iter()
            .map(|s| Vec3::new(s[0], s[1], s[2]))
            .collect();
    }
    if field.dimensions().is_empty() {
        return Vec::new();
    }

    let [w, h, d] = field.dimensions().extents();
    let centre = |n: usize| ((n - 1) / 2) as f32;
    vec![Vec3::new(centre(w), centre(h), centre(d))]
}
