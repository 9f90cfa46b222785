//! Playback of pregenerated simulation recordings
//!
//! A [`PlaybackSequence`] owns every frame of a recording and a cursor into
//! them. Each cursor move that lands on a different frame installs that frame
//! into the [`LatticeField`] it is given.

pub mod parser;

pub use parser::{
    load, parse_str, FrameVelocities, PlaybackError, PlaybackFrame, RecordFormat, Recording,
};

use crate::lib::lattice::{grid_position, upstream_node, LatticeField, Vec3, DIRECTION_COUNT};
use latticeview_network::GridDimensions;
use std::path::Path;
use tracing::{debug, info};

/// Seconds each frame stays on screen during auto-advance
pub const DEFAULT_FRAME_INTERVAL: f32 = 0.05;

/// Cursor over the frames of a recording
#[derive(Debug, Clone)]
pub struct PlaybackSequence {
    dimensions: GridDimensions,
    frames: Vec<PlaybackFrame>,
    /// Current frame index
    current_frame: usize,
    /// Whether timed auto-advance is active
    is_playing: bool,
    /// Seconds between auto-advanced frames
    frame_interval: f32,
    /// Time accumulated towards the next frame
    frame_timer: f32,
    /// Wrap to the first frame after the last
    looping: bool,
}

/// Details of one node in the current frame
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInspection {
    pub index: usize,
    pub position: [usize; 3],
    pub density: f32,
    /// Per-direction contributions, when the recording carries them
    pub micro_velocities: Option<Vec<Vec3>>,
    /// Sum of the contribution magnitudes
    pub magnitude_sum: f32,
    /// Neighbour each direction streams in from
    pub upstream: Vec<[usize; 3]>,
}

impl PlaybackSequence {
    /// Build a sequence from a parsed recording
    pub fn new(recording: Recording) -> Result<Self, PlaybackError> {
        if recording.frames.is_empty() {
            return Err(PlaybackError::NoFrames);
        }
        Ok(Self {
            dimensions: recording.dimensions,
            frames: recording.frames,
            current_frame: 0,
            is_playing: false,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            frame_timer: 0.0,
            looping: true,
        })
    }

    /// Load and parse a recording file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PlaybackError> {
        let sequence = Self::new(load(path)?)?;
        info!(
            "Opened recording with {} frames ({})",
            sequence.frame_count(),
            sequence.dimensions
        );
        Ok(sequence)
    }

    pub fn with_frame_interval(mut self, seconds: f32) -> Self {
        self.frame_interval = seconds.max(0.001);
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.dimensions
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn frame(&self, index: usize) -> Option<&PlaybackFrame> {
        self.frames.get(index)
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Toggle timed auto-advance
    pub fn toggle_playback(&mut self) {
        self.is_playing = !self.is_playing;
        self.frame_timer = 0.0;
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.is_playing = playing;
        self.frame_timer = 0.0;
    }

    /// Install the current frame into `field`
    pub fn apply_current(&self, field: &mut LatticeField) -> Result<(), PlaybackError> {
        self.frames[self.current_frame].apply(field, self.dimensions)?;
        Ok(())
    }

    /// Move to the next frame, stopping at the last one
    pub fn next_frame(&mut self, field: &mut LatticeField) -> Result<bool, PlaybackError> {
        if self.current_frame + 1 < self.frame_count() {
            self.select(self.current_frame + 1, field)
        } else {
            Ok(false)
        }
    }

    /// Move to the previous frame, stopping at the first one
    pub fn previous_frame(&mut self, field: &mut LatticeField) -> Result<bool, PlaybackError> {
        if self.current_frame > 0 {
            self.select(self.current_frame - 1, field)
        } else {
            Ok(false)
        }
    }

    /// Jump to a specific frame; out-of-range indices are ignored
    pub fn jump_to_frame(
        &mut self,
        frame: usize,
        field: &mut LatticeField,
    ) -> Result<bool, PlaybackError> {
        if frame < self.frame_count() {
            self.select(frame, field)
        } else {
            Ok(false)
        }
    }

    /// Jump to `fraction` of the way through the recording.
    ///
    /// `1.0` selects the last frame.
    pub fn jump_to_fraction(
        &mut self,
        fraction: f32,
        field: &mut LatticeField,
    ) -> Result<bool, PlaybackError> {
        let last = self.frame_count() - 1;
        let frame = if fraction >= 1.0 {
            last
        } else {
            ((self.frame_count() as f32 * fraction.max(0.0)) as usize).min(last)
        };
        self.select(frame, field)
    }

    pub fn first(&mut self, field: &mut LatticeField) -> Result<bool, PlaybackError> {
        self.select(0, field)
    }

    pub fn last(&mut self, field: &mut LatticeField) -> Result<bool, PlaybackError> {
        self.select(self.frame_count() - 1, field)
    }

    /// Accumulate `dt` seconds of auto-advance.
    ///
    /// At most one frame is advanced per call. Returns whether the frame
    /// changed.
    pub fn advance(&mut self, dt: f32, field: &mut LatticeField) -> Result<bool, PlaybackError> {
        if !self.is_playing {
            return Ok(false);
        }

        self.frame_timer += dt;
        if self.frame_timer <= self.frame_interval {
            return Ok(false);
        }
        self.frame_timer -= self.frame_interval;

        let next = self.current_frame + 1;
        if next < self.frame_count() {
            self.select(next, field)
        } else if self.looping {
            self.select(0, field)
        } else {
            self.is_playing = false;
            debug!("Playback reached the last frame");
            Ok(false)
        }
    }

    /// Inspect one node of the current frame
    pub fn inspect_node(&self, index: usize) -> Option<NodeInspection> {
        let frame = &self.frames[self.current_frame];
        let density = *frame.densities.get(index)?;
        let micro_velocities = frame.node_micro_velocities(index);
        let magnitude_sum = match &micro_velocities {
            Some(micro) => micro.iter().map(|v| v.norm()).sum(),
            None => match &frame.velocities {
                FrameVelocities::Macro(velocities) => velocities[index].norm(),
                FrameVelocities::Micro(_) => 0.0,
            },
        };

        let position = grid_position(self.dimensions, index);
        let upstream = (0..DIRECTION_COUNT)
            .map(|d| upstream_node(self.dimensions, position, d))
            .collect();

        Some(NodeInspection {
            index,
            position,
            density,
            micro_velocities,
            magnitude_sum,
            upstream,
        })
    }

    fn select(&mut self, frame: usize, field: &mut LatticeField) -> Result<bool, PlaybackError> {
        if frame == self.current_frame {
            return Ok(false);
        }
        self.frames[frame].apply(field, self.dimensions)?;
        self.current_frame = frame;
        debug!("Playback frame {}/{}", frame + 1, self.frame_count());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One-node recording whose density equals the frame number
    fn sequence(frames: usize) -> PlaybackSequence {
        let mut content = String::from("1 1 1\n");
        for i in 0..frames {
            content.push_str(&format!("{}.0 1 0 0\n", i));
        }
        PlaybackSequence::new(parse_str(&content).unwrap()).unwrap()
    }

    fn loaded(frames: usize) -> (PlaybackSequence, LatticeField) {
        let seq = sequence(frames);
        let mut field = LatticeField::new();
        seq.apply_current(&mut field).unwrap();
        (seq, field)
    }

    #[test]
    fn test_empty_recording_is_rejected() {
        let recording = parse_str("1 1 1\n").unwrap();
        assert!(matches!(
            PlaybackSequence::new(recording),
            Err(PlaybackError::NoFrames)
        ));
    }

    #[test]
    fn test_step_forward_and_back() {
        let (mut seq, mut field) = loaded(3);
        assert_eq!(field.densities(), &[0.0]);

        assert!(seq.next_frame(&mut field).unwrap());
        assert!(seq.next_frame(&mut field).unwrap());
        assert!(!seq.next_frame(&mut field).unwrap());
        assert_eq!(seq.current_frame(), 2);
        assert_eq!(field.densities(), &[2.0]);

        assert!(seq.previous_frame(&mut field).unwrap());
        assert_eq!(field.densities(), &[1.0]);
        assert!(seq.first(&mut field).unwrap());
        assert!(!seq.previous_frame(&mut field).unwrap());
    }

    #[test]
    fn test_jumps() {
        let (mut seq, mut field) = loaded(20);
        assert!(seq.jump_to_fraction(0.5, &mut field).unwrap());
        assert_eq!(seq.current_frame(), 10);
        assert!(seq.jump_to_fraction(1.0, &mut field).unwrap());
        assert_eq!(seq.current_frame(), 19);
        assert!(seq.jump_to_fraction(0.1, &mut field).unwrap());
        assert_eq!(seq.current_frame(), 2);
        assert_eq!(field.densities(), &[2.0]);

        assert!(!seq.jump_to_frame(20, &mut field).unwrap());
        assert!(seq.jump_to_frame(7, &mut field).unwrap());
        assert!(seq.last(&mut field).unwrap());
        assert_eq!(seq.current_frame(), 19);
    }

    #[test]
    fn test_auto_advance_loops() {
        let (mut seq, mut field) = loaded(2);
        assert!(!seq.advance(1.0, &mut field).unwrap());

        seq.toggle_playback();
        assert!(!seq.advance(0.03, &mut field).unwrap());
        assert!(seq.advance(0.03, &mut field).unwrap());
        assert_eq!(seq.current_frame(), 1);
        assert!(seq.advance(0.06, &mut field).unwrap());
        assert_eq!(seq.current_frame(), 0);
        assert_eq!(field.densities(), &[0.0]);
    }

    #[test]
    fn test_auto_advance_without_looping_stops() {
        let mut seq = sequence(2).with_looping(false);
        let mut field = LatticeField::new();
        seq.set_playing(true);
        assert!(seq.advance(0.1, &mut field).unwrap());
        assert!(!seq.advance(0.1, &mut field).unwrap());
        assert!(!seq.is_playing());
        assert_eq!(seq.current_frame(), 1);
    }

    #[test]
    fn test_inspect_node() {
        let mut line = String::new();
        for node in 0..8 {
            line.push_str(&format!("1 {} ", node));
            line.push_str(&vec!["0.5"; DIRECTION_COUNT].join(" "));
            line.push(' ');
        }
        let recording = parse_str(&format!("2 2 2\n{}\n", line)).unwrap();
        let seq = PlaybackSequence::new(recording).unwrap();

        let node = seq.inspect_node(7).unwrap();
        assert_eq!(node.position, [1, 1, 1]);
        assert_eq!(node.density, 7.0);
        assert_eq!(node.micro_velocities.as_ref().map(|m| m.len()), Some(27));
        assert_eq!(node.upstream[0], [1, 1, 1]);
        assert_eq!(node.upstream[1], [0, 1, 1]);
        assert!(node.magnitude_sum > 0.0);
        assert!(seq.inspect_node(8).is_none());
    }
}
