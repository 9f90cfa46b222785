use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "latticeview")]
#[command(about = "A viewer for D3Q27 lattice fluid simulations", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub mode: Mode,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit one JSON line per drawn frame instead of log output
    #[arg(long, global = true)]
    pub json: bool,

    /// Stop after this many ticks (runs until interrupted otherwise)
    #[arg(long, global = true, value_name = "N")]
    pub ticks: Option<u64>,

    /// Tick rate in Hz
    #[arg(long, global = true, default_value = "20")]
    pub rate: f32,

    /// Directory holding latticeview.toml (defaults to the working directory,
    /// or the recording's directory in play mode)
    #[arg(long, global = true, value_name = "DIR")]
    pub config: Option<PathBuf>,

    /// Streamline seed as x,y,z in lattice coordinates (repeatable)
    #[arg(long, global = true, value_name = "X,Y,Z", value_parser = parse_seed)]
    pub seed: Vec<[f32; 3]>,

    /// Maximum points per streamline
    #[arg(long, global = true)]
    pub steps: Option<usize>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Mode {
    /// Poll a running solver on separate velocity and density ports
    Live {
        /// Velocity port
        #[arg(long)]
        velocity_port: Option<u16>,

        /// Density port
        #[arg(long)]
        density_port: Option<u16>,

        /// Velocity element layout: 'vec3' or 'vec4'
        #[arg(long, value_name = "LAYOUT")]
        layout: Option<String>,
    },

    /// Poll a running solver on a single Vec4 port
    Combined {
        /// Combined port
        #[arg(long, short = 'p')]
        port: Option<u16>,
    },

    /// Replay a pregenerated recording
    Play {
        /// Path to the recording
        path: PathBuf,

        /// Seconds per frame
        #[arg(long)]
        interval: Option<f32>,

        /// Stop at the last frame instead of looping
        #[arg(long)]
        no_loop: bool,
    },
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }
}

fn parse_seed(value: &str) -> Result<[f32; 3], String> {
    let parts: Vec<f32> = value
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("'{p}': {e}")))
        .collect::<Result<_, _>>()?;
    match parts[..] {
        [x, y, z] => Ok([x, y, z]),
        _ => Err(format!("expected x,y,z but got '{value}'")),
    }
}
