//! Text surface used by the command-line viewer

use crate::lib::lattice::Vec3;
use crate::lib::scene::{FrameSummary, Surface};
use serde::Serialize;
use std::io::{self, Write};
use tracing::{debug, info, warn};

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record<'a> {
    Frame(&'a FrameSummary),
    Streamline {
        seed: [f32; 3],
        points: usize,
        end: Option<[f32; 3]>,
    },
}

/// Reports drawn frames through `tracing`, or as JSON lines on a writer
pub struct LogSurface<W: Write = io::Stdout> {
    json: Option<W>,
}

impl LogSurface {
    /// Log frame summaries at `info`
    pub fn logging() -> Self {
        Self { json: None }
    }

    /// Print one JSON object per record on stdout
    pub fn json_stdout() -> Self {
        Self::json(io::stdout())
    }
}

impl<W: Write> LogSurface<W> {
    /// Write one JSON object per record to `out`
    pub fn json(out: W) -> Self {
        Self { json: Some(out) }
    }

    /// Give back the JSON writer, if any
    pub fn into_inner(self) -> Option<W> {
        self.json
    }

    fn emit(&mut self, record: &Record<'_>) {
        let Some(out) = self.json.as_mut() else {
            return;
        };
        let result = serde_json::to_writer(&mut *out, record)
            .map_err(io::Error::from)
            .and_then(|_| writeln!(out));
        if let Err(e) = result {
            warn!("Failed to write frame record: {}", e);
        }
    }
}

impl<W: Write> Surface for LogSurface<W> {
    fn frame(&mut self, summary: &FrameSummary) {
        if self.json.is_some() {
            self.emit(&Record::Frame(summary));
            return;
        }

        match summary.density_range {
            Some((min, max)) => info!(
                "[{}] {} | grid {} | density {:.4}..{:.4} | mean intensity {:.3} | max speed {:.4}",
                summary.scene,
                summary.status,
                summary.dimensions,
                min,
                max,
                summary.mean_intensity,
                summary.max_speed
            ),
            None => info!("[{}] {} | no data", summary.scene, summary.status),
        }
    }

    fn streamline(&mut self, seed: Vec3, points: &[Vec3]) {
        let end = points.last().map(|p| [p.x, p.y, p.z]);
        if self.json.is_some() {
            self.emit(&Record::Streamline {
                seed: [seed.x, seed.y, seed.z],
                points: points.len(),
                end,
            });
            return;
        }
        debug!(
            "Streamline from ({:.2}, {:.2}, {:.2}): {} points, ends at {:?}",
            seed.x,
            seed.y,
            seed.z,
            points.len(),
            end
        );
    }
}
