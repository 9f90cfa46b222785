//! Forward-Euler streamline tracing over the macro-velocity field

use super::store::LatticeField;
use super::Vec3;
use std::iter::FusedIterator;
use tracing::trace;

/// Positions visited by unit-step integration from a seed.
///
/// Each item is the position sampled before advancing. The line ends after
/// `steps` points, when the next position leaves the lattice, or when the
/// local velocity has no usable direction. Once finished it stays finished.
#[derive(Debug, Clone)]
pub struct StreamLine<'a> {
    field: &'a LatticeField,
    position: Vec3,
    remaining: usize,
}

impl<'a> StreamLine<'a> {
    pub(crate) fn new(field: &'a LatticeField, seed: Vec3, steps: usize) -> Self {
        Self {
            field,
            position: seed,
            remaining: steps,
        }
    }

    /// Position that would be sampled next
    pub fn position(&self) -> Vec3 {
        self.position
    }

    fn finish(&mut self) {
        self.remaining = 0;
    }
}

impl Iterator for StreamLine<'_> {
    type Item = Vec3;

    fn next(&mut self) -> Option<Vec3> {
        if self.remaining == 0 {
            return None;
        }

        let current = self.position;
        let velocity = match self.field.velocity_at(&current) {
            Ok(v) => v,
            Err(e) => {
                trace!("Streamline stopped: {}", e);
                self.finish();
                return None;
            }
        };

        self.remaining -= 1;
        let norm = velocity.norm();
        if norm == 0.0 || !norm.is_finite() {
            self.finish();
        } else {
            self.position = current + velocity / norm;
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl FusedIterator for StreamLine<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use latticeview_network::GridDimensions;
    use proptest::prelude::*;

    fn uniform_field(n: u8, velocity: Vec3) -> LatticeField {
        let dims = GridDimensions::new(n, n, n);
        let mut field = LatticeField::new();
        field
            .set_macro_velocity(vec![velocity; dims.node_count()], dims)
            .unwrap();
        field
    }

    #[test]
    fn test_uniform_flow_walks_unit_steps() {
        let field = uniform_field(8, Vec3::new(3.0, 0.0, 0.0));
        let line = field.compute_streamline(Vec3::new(0.0, 1.0, 1.0), 5);
        assert_eq!(line.len(), 5);
        for (i, p) in line.iter().enumerate() {
            assert!((p - Vec3::new(i as f32, 1.0, 1.0)).norm() < 1e-6);
        }
    }

    #[test]
    fn test_stops_at_lattice_edge() {
        let field = uniform_field(4, Vec3::new(1.0, 0.0, 0.0));
        // x = 0, 1, 2, 3 are inside; x = 4 is not
        let line = field.compute_streamline(Vec3::zeros(), 100);
        assert_eq!(line.len(), 4);
        assert_eq!(line[3], Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_seed_outside_gives_empty_line() {
        let field = uniform_field(4, Vec3::x());
        assert!(field.compute_streamline(Vec3::new(-1.0, 0.0, 0.0), 10).is_empty());
        assert!(field.compute_streamline(Vec3::new(f32::NAN, 0.0, 0.0), 10).is_empty());
    }

    #[test]
    fn test_zero_velocity_ends_after_current_point() {
        let field = uniform_field(4, Vec3::zeros());
        let line = field.compute_streamline(Vec3::new(1.0, 1.0, 1.0), 10);
        assert_eq!(line, vec![Vec3::new(1.0, 1.0, 1.0)]);
    }

    #[test]
    fn test_iterator_is_fused() {
        let field = uniform_field(2, Vec3::x());
        let mut line = field.streamline(Vec3::zeros(), 10);
        assert!(line.next().is_some());
        assert!(line.next().is_some());
        assert!(line.next().is_none());
        assert!(line.next().is_none());
    }

    #[test]
    fn test_zero_steps() {
        let field = uniform_field(2, Vec3::x());
        assert!(field.compute_streamline(Vec3::zeros(), 0).is_empty());
    }

    proptest! {
        #[test]
        fn prop_streamline_never_exceeds_step_count(
            vx in -2.0f32..2.0,
            vy in -2.0f32..2.0,
            vz in -2.0f32..2.0,
            sx in -1.0f32..6.0,
            sy in -1.0f32..6.0,
            sz in -1.0f32..6.0,
            steps in 0usize..40,
        ) {
            let field = uniform_field(5, Vec3::new(vx, vy, vz));
            let seed = Vec3::new(sx, sy, sz);
            let line = field.compute_streamline(seed, steps);

            prop_assert!(line.len() <= steps);
            if !field.contains(&seed) {
                prop_assert!(line.is_empty());
            }
            for p in &line {
                prop_assert!(field.contains(p));
            }
        }
    }
}
