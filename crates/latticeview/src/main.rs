use latticeview::app::cli::{Args, Mode};
use latticeview::lib::settings::{resolve_settings_dir, Settings, VelocityLayout};
use latticeview::{CombinedScene, LogSurface, NetworkedScene, PlaybackScene, Scene};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse command line arguments
    let args = Args::parse_args();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_settings(&args)?;
    let mut scene = build_scene(&args, settings)?;

    info!("Starting scene '{}'", scene.name());
    scene.init()?;
    scene.load()?;

    let mut surface = if args.json {
        LogSurface::json_stdout()
    } else {
        LogSurface::logging()
    };

    let tick = Duration::from_secs_f32(1.0 / args.rate.max(0.1));
    let mut last = Instant::now();
    let mut ticks = 0u64;

    while args.ticks.map_or(true, |limit| ticks < limit) {
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f32();
        last = now;

        scene.update(dt)?;
        scene.draw(&mut surface);
        ticks += 1;

        if let Some(rest) = tick.checked_sub(now.elapsed()) {
            thread::sleep(rest);
        }
    }

    scene.close();
    info!("Stopped after {} ticks", ticks);
    Ok(())
}

fn load_settings(args: &Args) -> Result<Settings, Box<dyn std::error::Error>> {
    let dir = match (&args.config, &args.mode) {
        (Some(dir), _) => Some(dir.clone()),
        (None, Mode::Play { path, .. }) => resolve_settings_dir(path),
        (None, _) => Some(PathBuf::from(".")),
    };

    let mut settings = match dir {
        Some(dir) => Settings::load_or_default(&dir)?,
        None => Settings::default(),
    };

    if !args.seed.is_empty() {
        settings.streamline.seeds = args.seed.clone();
    }
    if let Some(steps) = args.steps {
        settings.streamline.steps = steps;
    }
    Ok(settings)
}

fn build_scene(
    args: &Args,
    mut settings: Settings,
) -> Result<Box<dyn Scene>, Box<dyn std::error::Error>> {
    let scene: Box<dyn Scene> = match &args.mode {
        Mode::Live {
            velocity_port,
            density_port,
            layout,
        } => {
            if let Some(port) = velocity_port {
                settings.network.velocity_port = *port;
            }
            if let Some(port) = density_port {
                settings.network.density_port = *port;
            }
            if let Some(layout) = layout {
                settings.network.velocity_layout = match layout.as_str() {
                    "vec3" => VelocityLayout::Vec3,
                    "vec4" => VelocityLayout::Vec4,
                    other => return Err(format!("Unknown velocity layout '{other}'").into()),
                };
            }
            info!(
                "Polling velocity on port {} and density on port {}",
                settings.network.velocity_port, settings.network.density_port
            );
            Box::new(NetworkedScene::new(settings.network, settings.streamline))
        }
        Mode::Combined { port } => {
            if let Some(port) = port {
                settings.network.combined_port = *port;
            }
            info!("Polling combined stream on port {}", settings.network.combined_port);
            Box::new(CombinedScene::new(settings.network, settings.streamline))
        }
        Mode::Play {
            path,
            interval,
            no_loop,
        } => {
            if let Some(interval) = interval {
                settings.playback.frame_interval = *interval;
            }
            if *no_loop {
                settings.playback.loop_enabled = false;
            }
            Box::new(PlaybackScene::new(
                path.clone(),
                settings.playback,
                settings.streamline,
            ))
        }
    };
    Ok(scene)
}
