//! Parser for pregenerated simulation recordings
//!
//! A recording is plain text. The first line holds `width height depth`.
//! Every following non-empty line is one frame made of `node_count` groups:
//!
//! - full format, 29 values per node: `changeable density w0 .. w26`, where
//!   each weight scales the matching D3Q27 direction
//! - compact format, 4 values per node: `density vx vy vz`
//!
//! The format is chosen from the first frame line. A frame may also be split
//! over several lines as long as it ends on a line boundary.

use crate::lib::lattice::{direction, FieldError, LatticeField, Vec3, DIRECTION_COUNT};
use latticeview_network::GridDimensions;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Values per node in the full format
pub const FULL_NODE_VALUES: usize = 2 + DIRECTION_COUNT;

/// Values per node in the compact format
pub const COMPACT_NODE_VALUES: usize = 4;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Recording has no dimension line")]
    MissingHeader,

    #[error("Line {line}: invalid number '{token}'")]
    InvalidNumber { line: usize, token: String },

    #[error("Line {line}: {got} values do not form whole nodes of {expected} values")]
    RowLength {
        line: usize,
        expected: usize,
        got: usize,
    },

    #[error("Recording contains no frames")]
    NoFrames,

    #[error("Field rejected frame: {0}")]
    Field(#[from] FieldError),
}

/// Layout of the per-node values in a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// Changeability, density and 27 direction weights
    Full,
    /// Density and an aggregated velocity
    Compact,
}

impl RecordFormat {
    /// Number of values per node
    pub fn node_values(self) -> usize {
        match self {
            Self::Full => FULL_NODE_VALUES,
            Self::Compact => COMPACT_NODE_VALUES,
        }
    }

    fn detect(tokens: usize, node_count: usize) -> Option<Self> {
        [Self::Full, Self::Compact].into_iter().find(|format| {
            let per_node = format.node_values();
            tokens == per_node || tokens == per_node * node_count
        })
    }
}

/// Velocity data carried by one frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameVelocities {
    /// 27 per-direction arrays, each `node_count` long
    Micro(Vec<Vec<Vec3>>),
    /// One aggregated vector per node
    Macro(Vec<Vec3>),
}

/// One recorded snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackFrame {
    pub changeable: Vec<bool>,
    pub densities: Vec<f32>,
    pub velocities: FrameVelocities,
}

impl PlaybackFrame {
    /// Install this frame into `field`
    pub fn apply(&self, field: &mut LatticeField, dims: GridDimensions) -> Result<(), FieldError> {
        field.set_density(self.densities.clone(), dims)?;
        field.set_changeable(self.changeable.clone())?;
        match &self.velocities {
            FrameVelocities::Micro(micro) => field.set_velocity(micro.clone(), dims),
            FrameVelocities::Macro(velocities) => {
                field.set_macro_velocity(velocities.clone(), dims)
            }
        }
    }

    /// Micro-velocity contributions of one node, if the frame has them
    pub fn node_micro_velocities(&self, index: usize) -> Option<Vec<Vec3>> {
        match &self.velocities {
            FrameVelocities::Micro(micro) => micro.iter().map(|a| a.get(index).copied()).collect(),
            FrameVelocities::Macro(_) => None,
        }
    }
}

/// A parsed recording
#[derive(Debug, Clone)]
pub struct Recording {
    pub dimensions: GridDimensions,
    pub format: RecordFormat,
    pub frames: Vec<PlaybackFrame>,
}

/// Read and parse a recording from disk
pub fn load(path: impl AsRef<Path>) -> Result<Recording, PlaybackError> {
    let path = path.as_ref();
    info!("Loading recording from {:?}", path);
    let content = fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parse a recording held in memory
pub fn parse_str(content: &str) -> Result<Recording, PlaybackError> {
    let mut lines = content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let (header_line, header) = lines.next().ok_or(PlaybackError::MissingHeader)?;
    let dimensions = parse_dimensions(header_line, header)?;
    let node_count = dimensions.node_count();

    let mut format = None;
    let mut frames = Vec::new();
    let mut pending: Vec<f32> = Vec::new();

    for (line_no, line) in lines {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        let record_format = *format.get_or_insert_with(|| {
            RecordFormat::detect(tokens.len(), node_count).unwrap_or(RecordFormat::Full)
        });
        let per_node = record_format.node_values();
        let frame_values = per_node * node_count;

        for token in &tokens {
            pending.push(parse_number(line_no, token)?);
        }

        if pending.len() % per_node != 0 || pending.len() > frame_values {
            return Err(PlaybackError::RowLength {
                line: line_no,
                expected: per_node,
                got: tokens.len(),
            });
        }
        if pending.len() == frame_values {
            frames.push(build_frame(record_format, &pending, node_count));
            pending.clear();
        }
    }

    if !pending.is_empty() {
        return Err(PlaybackError::RowLength {
            line: content.lines().count(),
            expected: format.map_or(FULL_NODE_VALUES, RecordFormat::node_values) * node_count,
            got: pending.len(),
        });
    }

    let format = format.unwrap_or(RecordFormat::Full);
    debug!(
        "Parsed {} {:?} frames of {} nodes ({})",
        frames.len(),
        format,
        node_count,
        dimensions
    );

    Ok(Recording {
        dimensions,
        format,
        frames,
    })
}

fn parse_dimensions(line_no: usize, line: &str) -> Result<GridDimensions, PlaybackError> {
    let values: Vec<u8> = line
        .split_whitespace()
        .map(|token| {
            token.parse::<u8>().map_err(|_| PlaybackError::InvalidNumber {
                line: line_no,
                token: token.to_string(),
            })
        })
        .collect::<Result<_, _>>()?;

    match values[..] {
        [width, height, depth] => Ok(GridDimensions::new(width, height, depth)),
        _ => Err(PlaybackError::RowLength {
            line: line_no,
            expected: 3,
            got: values.len(),
        }),
    }
}

fn parse_number(line: usize, token: &str) -> Result<f32, PlaybackError> {
    token.parse::<f32>().map_err(|_| PlaybackError::InvalidNumber {
        line,
        token: token.to_string(),
    })
}

fn build_frame(format: RecordFormat, values: &[f32], node_count: usize) -> PlaybackFrame {
    let per_node = format.node_values();
    let nodes = values.chunks_exact(per_node);

    match format {
        RecordFormat::Full => {
            let mut changeable = Vec::with_capacity(node_count);
            let mut densities = Vec::with_capacity(node_count);
            let mut micro = vec![Vec::with_capacity(node_count); DIRECTION_COUNT];
            for node in nodes {
                changeable.push(node[0] != 0.0);
                densities.push(node[1]);
                for (d, weight) in node[2..].iter().enumerate() {
                    micro[d].push(direction(d) * *weight);
                }
            }
            PlaybackFrame {
                changeable,
                densities,
                velocities: FrameVelocities::Micro(micro),
            }
        }
        RecordFormat::Compact => {
            let densities = nodes.clone().map(|n| n[0]).collect();
            let velocities = nodes.map(|n| Vec3::new(n[1], n[2], n[3])).collect();
            PlaybackFrame {
                changeable: vec![true; node_count],
                densities,
                velocities: FrameVelocities::Macro(velocities),
            }
        }
    }
}
