//! Scene that replays a pregenerated recording

use super::{draw_field, Scene, SceneError, Surface};
use crate::lib::lattice::LatticeField;
use crate::lib::playback::{NodeInspection, PlaybackSequence};
use crate::lib::settings::{PlaybackSettings, StreamlineSettings};
use std::path::PathBuf;
use tracing::info;

/// Replays a recording file into a [`LatticeField`]
pub struct PlaybackScene {
    path: PathBuf,
    playback: PlaybackSettings,
    streamlines: StreamlineSettings,
    field: LatticeField,
    sequence: Option<PlaybackSequence>,
}

impl PlaybackScene {
    pub fn new(
        path: impl Into<PathBuf>,
        playback: PlaybackSettings,
        streamlines: StreamlineSettings,
    ) -> Self {
        Self {
            path: path.into(),
            playback,
            streamlines,
            field: LatticeField::new(),
            sequence: None,
        }
    }

    /// The loaded sequence, for cursor control by the host
    pub fn sequence(&self) -> Option<&PlaybackSequence> {
        self.sequence.as_ref()
    }

    /// Run `f` with the sequence cursor and the field it drives
    pub fn with_cursor<R>(
        &mut self,
        f: impl FnOnce(&mut PlaybackSequence, &mut LatticeField) -> R,
    ) -> Result<R, SceneError> {
        let sequence = self.sequence.as_mut().ok_or(SceneError::NotInitialized)?;
        Ok(f(sequence, &mut self.field))
    }

    /// Inspect one node of the current frame
    pub fn inspect_node(&self, index: usize) -> Option<NodeInspection> {
        self.sequence.as_ref()?.inspect_node(index)
    }
}

impl Scene for PlaybackScene {
    fn name(&self) -> &str {
        "Read Premade File"
    }

    fn init(&mut self) -> Result<(), SceneError> {
        let mut sequence = PlaybackSequence::open(&self.path)?
            .with_frame_interval(self.playback.frame_interval)
            .with_looping(self.playback.loop_enabled);
        sequence.set_playing(self.playback.autoplay);
        sequence.apply_current(&mut self.field)?;

        info!(
            "Playing {:?}: {} frames of {}",
            self.path,
            sequence.frame_count(),
            sequence.dimensions()
        );
        self.sequence = Some(sequence);
        Ok(())
    }

    fn update(&mut self, dt: f32) -> Result<(), SceneError> {
        let sequence = self.sequence.as_mut().ok_or(SceneError::NotInitialized)?;
        sequence.advance(dt, &mut self.field)?;
        Ok(())
    }

    fn draw(&self, surface: &mut dyn Surface) {
        let status = match &self.sequence {
            Some(sequence) => format!(
                "frame {}/{}{}",
                sequence.current_frame() + 1,
                sequence.frame_count(),
                if sequence.is_playing() { ", playing" } else { "" }
            ),
            None => String::from("not loaded"),
        };
        draw_field(self.name(), status, &self.field, &self.streamlines, surface);
    }

    fn close(&mut self) {
        self.sequence = None;
    }

    fn field(&self) -> &LatticeField {
        &self.field
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::scene::tests::RecordingSurface;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn recording(frames: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "2 1 1").unwrap();
        for i in 0..frames {
            writeln!(file, "{i} 1 0 0 {i} 0 1 0").unwrap();
        }
        file
    }

    #[test]
    fn test_missing_file() {
        let mut scene = PlaybackScene::new(
            "/nonexistent/recording.txt",
            PlaybackSettings::default(),
            StreamlineSettings::default(),
        );
        assert!(matches!(scene.init(), Err(SceneError::Playback(_))));
        assert!(matches!(scene.update(0.1), Err(SceneError::NotInitialized)));
    }

    #[test]
    fn test_autoplay_advances() {
        let file = recording(3);
        let mut scene = PlaybackScene::new(
            file.path(),
            PlaybackSettings::default(),
            StreamlineSettings::default(),
        );
        scene.init().unwrap();
        assert_eq!(scene.field().densities(), &[0.0, 0.0]);

        scene.update(0.06).unwrap();
        assert_eq!(scene.field().densities(), &[1.0, 1.0]);

        let mut surface = RecordingSurface::default();
        scene.draw(&mut surface);
        assert_eq!(surface.frames[0].status, "frame 2/3, playing");
    }

    #[test]
    fn test_manual_cursor() {
        let file = recording(5);
        let settings = PlaybackSettings {
            autoplay: false,
            ..PlaybackSettings::default()
        };
        let mut scene = PlaybackScene::new(file.path(), settings, StreamlineSettings::default());
        scene.init().unwrap();

        scene.update(1.0).unwrap();
        assert_eq!(scene.sequence().map(|s| s.current_frame()), Some(0));

        let moved = scene
            .with_cursor(|seq, field| seq.last(field))
            .unwrap()
            .unwrap();
        assert!(moved);
        assert_eq!(scene.field().densities(), &[4.0, 4.0]);
        assert_eq!(scene.inspect_node(1).map(|n| n.density), Some(4.0));

        scene.close();
        assert!(scene.sequence().is_none());
    }
}
