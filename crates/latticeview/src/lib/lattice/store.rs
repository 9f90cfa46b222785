//! Current lattice snapshot and queries over it

use super::error::FieldError;
use super::streamline::StreamLine;
use super::velocity_set::DIRECTION_COUNT;
use super::Vec3;
use latticeview_network::GridDimensions;
use tracing::{debug, trace};

/// Saturating exponential ease used to map normalized density to intensity
pub fn exp_lerp(t: f32) -> f32 {
    if t > 1.0 {
        1.0
    } else {
        1.0 - 2.0f32.powf(-10.0 * t)
    }
}

/// Holds the current simulation snapshot.
///
/// Every array always has exactly `dimensions().node_count()` entries. Each
/// mutation validates its input completely before touching any storage, so a
/// rejected update leaves the previous snapshot intact.
#[derive(Debug, Clone, Default)]
pub struct LatticeField {
    dims: GridDimensions,
    densities: Vec<f32>,
    intensities: Vec<f32>,
    changeable: Vec<bool>,
    micro_velocities: Option<Vec<Vec<Vec3>>>,
    velocities: Vec<Vec3>,
}

impl LatticeField {
    /// Create an empty field
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zero-filled field of the given size
    pub fn with_dimensions(dims: GridDimensions) -> Self {
        let mut field = Self::new();
        field.resize(dims);
        field
    }

    /// Grid dimensions of the current snapshot
    pub fn dimensions(&self) -> GridDimensions {
        self.dims
    }

    /// Number of nodes in the current snapshot
    pub fn node_count(&self) -> usize {
        self.dims.node_count()
    }

    /// Density per node
    pub fn densities(&self) -> &[f32] {
        &self.densities
    }

    /// Eased, normalized density per node
    pub fn intensities(&self) -> &[f32] {
        &self.intensities
    }

    /// Whether each node is free fluid (`true`) or solid (`false`)
    pub fn changeable(&self) -> &[bool] {
        &self.changeable
    }

    /// The 27 per-direction arrays, when the last update supplied them
    pub fn micro_velocities(&self) -> Option<&[Vec<Vec3>]> {
        self.micro_velocities.as_deref()
    }

    /// Aggregated velocity per node
    pub fn velocities(&self) -> &[Vec3] {
        &self.velocities
    }

    /// Flat index of node `(x, y, z)`
    pub fn index_of(&self, x: usize, y: usize, z: usize) -> usize {
        self.dims.index(x, y, z)
    }

    /// Grid coordinates of a flat index.
    ///
    /// Exact inverse of [`Self::index_of`] when `width == height`.
    pub fn position_of(&self, index: usize) -> [usize; 3] {
        grid_position(self.dims, index)
    }

    /// Minimum and maximum density, if the field is not empty
    pub fn density_range(&self) -> Option<(f32, f32)> {
        density_range(&self.densities)
    }

    /// Replace the density array.
    pub fn set_density(
        &mut self,
        densities: Vec<f32>,
        dims: GridDimensions,
    ) -> Result<(), FieldError> {
        check_len("density array", dims.node_count(), densities.len())?;

        self.resize(dims);
        self.intensities = compute_intensities(&densities);
        self.densities = densities;
        trace!("Density updated for {} nodes", self.densities.len());
        Ok(())
    }

    /// Replace the solid/fluid mask
    pub fn set_changeable(&mut self, mask: Vec<bool>) -> Result<(), FieldError> {
        check_len("changeability mask", self.node_count(), mask.len())?;
        self.changeable = mask;
        Ok(())
    }

    /// Replace velocity storage with 27 per-direction arrays and recompute
    /// the macro velocity as their pointwise sum.
    pub fn set_velocity(
        &mut self,
        micro_velocities: Vec<Vec<Vec3>>,
        dims: GridDimensions,
    ) -> Result<(), FieldError> {
        if micro_velocities.len() != DIRECTION_COUNT {
            return Err(FieldError::InvalidArgument(format!(
                "expected {} direction arrays, got {}",
                DIRECTION_COUNT,
                micro_velocities.len()
            )));
        }
        let node_count = dims.node_count();
        for (direction, array) in micro_velocities.iter().enumerate() {
            check_len(&format!("direction {direction} array"), node_count, array.len())?;
        }

        let mut velocities = vec![Vec3::zeros(); node_count];
        for array in &micro_velocities {
            for (total, v) in velocities.iter_mut().zip(array) {
                *total += v;
            }
        }

        self.resize(dims);
        self.velocities = velocities;
        self.micro_velocities = Some(micro_velocities);
        Ok(())
    }

    /// Replace velocity storage with already aggregated vectors
    pub fn set_macro_velocity(
        &mut self,
        velocities: Vec<Vec3>,
        dims: GridDimensions,
    ) -> Result<(), FieldError> {
        check_len("velocity array", dims.node_count(), velocities.len())?;

        self.resize(dims);
        self.velocities = velocities;
        self.micro_velocities = None;
        Ok(())
    }

    /// Replace velocity and density from `[vx, vy, vz, density]` cells
    pub fn set_combined(
        &mut self,
        cells: &[[f32; 4]],
        dims: GridDimensions,
    ) -> Result<(), FieldError> {
        check_len("cell array", dims.node_count(), cells.len())?;

        let velocities = cells.iter().map(|c| Vec3::new(c[0], c[1], c[2])).collect();
        let densities: Vec<f32> = cells.iter().map(|c| c[3]).collect();

        self.resize(dims);
        self.intensities = compute_intensities(&densities);
        self.densities = densities;
        self.velocities = velocities;
        self.micro_velocities = None;
        Ok(())
    }

    /// Whether `pos` lies inside `[0, w-1] x [0, h-1] x [0, d-1]`
    pub fn contains(&self, pos: &Vec3) -> bool {
        let [w, h, d] = self.dims.extents();
        if w == 0 || h == 0 || d == 0 {
            return false;
        }
        (0.0..=(w - 1) as f32).contains(&pos.x)
            && (0.0..=(h - 1) as f32).contains(&pos.y)
            && (0.0..=(d - 1) as f32).contains(&pos.z)
    }

    /// Macro velocity at node `(x, y, z)`.
    ///
    /// With `height > width` the index formula can point past the stored
    /// arrays; such nodes read as zero velocity.
    pub fn node_velocity(&self, x: usize, y: usize, z: usize) -> Vec3 {
        let index = self.dims.index(x, y, z);
        match self.velocities.get(index) {
            Some(v) => *v,
            None => {
                trace!("Node ({}, {}, {}) maps past storage at {}", x, y, z, index);
                Vec3::zeros()
            }
        }
    }

    /// Trilinearly interpolated macro velocity at a continuous position.
    pub fn velocity_at(&self, pos: &Vec3) -> Result<Vec3, FieldError> {
        if pos.iter().any(|c| c.is_nan()) {
            return Err(FieldError::InvalidArgument(format!(
                "position ({}, {}, {}) has a NaN coordinate",
                pos.x, pos.y, pos.z
            )));
        }
        if !self.contains(pos) {
            return Err(FieldError::Range {
                x: pos.x,
                y: pos.y,
                z: pos.z,
                dims: self.dims,
            });
        }

        let (x0, x1, xd) = split(pos.x);
        let (y0, y1, yd) = split(pos.y);
        let (z0, z1, zd) = split(pos.z);

        let plane = |z: usize| {
            let low_x = lerp(self.node_velocity(x0, y0, z), self.node_velocity(x0, y1, z), yd);
            let high_x = lerp(self.node_velocity(x1, y0, z), self.node_velocity(x1, y1, z), yd);
            lerp(low_x, high_x, xd)
        };

        Ok(lerp(plane(z0), plane(z1), zd))
    }

    /// Trace a streamline from `seed` for at most `steps` points
    pub fn streamline(&self, seed: Vec3, steps: usize) -> StreamLine<'_> {
        StreamLine::new(self, seed, steps)
    }

    /// Collect the streamline from `seed` into a vector
    pub fn compute_streamline(&self, seed: Vec3, steps: usize) -> Vec<Vec3> {
        self.streamline(seed, steps).collect()
    }

    /// Make every array match `dims`, zero-filling when the size changes
    fn resize(&mut self, dims: GridDimensions) {
        if dims == self.dims && self.densities.len() == dims.node_count() {
            return;
        }
        if self.dims != dims {
            debug!("Lattice dimensions changed {} -> {}", self.dims, dims);
        }

        let node_count = dims.node_count();
        self.dims = dims;
        self.densities = vec![0.0; node_count];
        self.intensities = vec![0.0; node_count];
        self.changeable = vec![true; node_count];
        self.velocities = vec![Vec3::zeros(); node_count];
        self.micro_velocities = None;
    }
}

/// Grid coordinates of a flat index under [`GridDimensions::index`]
pub fn grid_position(dims: GridDimensions, index: usize) -> [usize; 3] {
    let height = (dims.height as usize).max(1);
    let plane = (dims.width as usize * dims.height as usize).max(1);
    let rem = index % plane;
    [rem % height, rem / height, index / plane]
}

fn check_len(what: &str, expected: usize, got: usize) -> Result<(), FieldError> {
    if expected != got {
        return Err(FieldError::length_mismatch(what, expected, got));
    }
    Ok(())
}

fn density_range(densities: &[f32]) -> Option<(f32, f32)> {
    densities.iter().fold(None, |range, &d| match range {
        None => Some((d, d)),
        Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
    })
}

/// `t = (d - min) / max`, eased. A zero maximum yields zero intensity.
fn compute_intensities(densities: &[f32]) -> Vec<f32> {
    let Some((min, max)) = density_range(densities) else {
        return Vec::new();
    };
    if max == 0.0 {
        return vec![0.0; densities.len()];
    }
    densities
        .iter()
        .map(|d| exp_lerp((d - min) / max))
        .collect()
}

fn split(coord: f32) -> (usize, usize, f32) {
    let low = coord.floor();
    let high = coord.ceil();
    (low as usize, high as usize, coord - low)
}

fn lerp(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    a * (1.0 - t) + b * t
}
