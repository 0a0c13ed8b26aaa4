//! # Tether CLI
//!
//! Command-line runner for the Tether joint solver.
//!
//! ## Commands
//! - `run` - Simulate a JSON scene and optionally write its trajectory
//! - `demo` - Simulate one of the built-in scenes
//! - `validate` - Check that a scene parses and builds

pub mod demos;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tether_core::math::Real;
use tether_physics::{BodyState, BuiltScene, SceneDef};

pub use demos::Demo;

/// Tether joint solver CLI
#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Simulate a scene file
    Run {
        /// Scene file (JSON)
        scene: PathBuf,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Simulate a built-in scene
    Demo {
        #[arg(value_enum)]
        name: Demo,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Check that a scene file parses and builds
    Validate {
        /// Scene file (JSON)
        scene: PathBuf,
    },
}

/// How long to run and what to record
#[derive(Debug, Clone, Args)]
pub struct RunOptions {
    /// Simulated duration in seconds
    #[arg(short, long, default_value_t = 5.0)]
    pub seconds: Real,

    /// Wall-clock time fed to the driver per frame
    #[arg(short, long, default_value_t = 1.0 / 60.0)]
    pub frame_time: Real,

    /// Write the trajectory as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Record every Nth frame
    #[arg(short, long, default_value_t = 1)]
    pub every: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            seconds: 5.0,
            frame_time: 1.0 / 60.0,
            output: None,
            every: 1,
        }
    }
}

/// Recorded body states over a run
#[derive(Debug, Serialize)]
pub struct Trajectory {
    pub scene: Option<String>,
    pub step: Real,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Serialize)]
pub struct Frame {
    pub time: Real,
    pub steps: u64,
    /// Fraction of a step still pending; renderers blend toward the next state by it
    pub interpolation: Real,
    pub bodies: Vec<BodyState>,
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match cli.command {
        Commands::Run { scene, options } => {
            let scene = load_scene(&scene)?;
            run_and_report(&scene, &options)?;
        }

        Commands::Demo { name, options } => {
            log::info!("Running demo '{}'...", name.name());
            run_and_report(&name.scene(), &options)?;
        }

        Commands::Validate { scene } => {
            let def = load_scene(&scene)?;
            let built = def
                .build()
                .with_context(|| format!("scene {} does not build", scene.display()))?;
            log::info!(
                "{} is valid: {} bodies, {} joints",
                scene.display(),
                built.simulation.space().body_count(),
                built.simulation.space().joint_count()
            );
        }
    }

    Ok(())
}

/// Read and parse a scene file
pub fn load_scene(path: &Path) -> Result<SceneDef> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read scene {}", path.display()))?;
    SceneDef::from_json(&json).with_context(|| format!("failed to parse scene {}", path.display()))
}

/// Build a scene and simulate it, recording every `options.every` frames
pub fn simulate(scene: &SceneDef, options: &RunOptions) -> Result<(BuiltScene, Trajectory)> {
    if !(options.seconds.is_finite() && options.seconds >= 0.0) {
        bail!("--seconds must be non-negative, got {}", options.seconds);
    }
    if !(options.frame_time.is_finite() && options.frame_time > 0.0) {
        bail!("--frame-time must be positive, got {}", options.frame_time);
    }
    if options.every == 0 {
        bail!("--every must be at least 1");
    }

    let mut built = scene.build()?;
    let frames = (options.seconds / options.frame_time).round() as usize;
    let mut trajectory = Trajectory {
        scene: scene.name.clone(),
        step: built.simulation.step_size(),
        frames: Vec::with_capacity(frames / options.every + 1),
    };
    trajectory.frames.push(record(&built));

    for frame in 1..=frames {
        built.simulation.update(options.frame_time);
        if frame % options.every == 0 {
            trajectory.frames.push(record(&built));
        }
    }

    Ok((built, trajectory))
}

fn record(built: &BuiltScene) -> Frame {
    Frame {
        time: built.simulation.elapsed(),
        steps: built.simulation.step_count(),
        interpolation: built.simulation.interpolation(),
        bodies: built.snapshot(),
    }
}

fn run_and_report(scene: &SceneDef, options: &RunOptions) -> Result<()> {
    let (built, trajectory) = simulate(scene, options)?;
    let space = built.simulation.space();

    log::info!(
        "Simulated {:.3}s in {} steps",
        built.simulation.elapsed(),
        built.simulation.step_count()
    );
    log::info!(
        "  Joints: {}, kinetic energy: {:.6}",
        space.joint_count(),
        space.kinetic_energy()
    );
    for state in built.snapshot() {
        log::info!(
            "  {}: position ({:.4}, {:.4}), angle {:.4}",
            state.name,
            state.position.x,
            state.position.y,
            state.angle
        );
    }

    if let Some(output) = &options.output {
        let json = serde_json::to_string_pretty(&trajectory)?;
        fs::write(output, json)
            .with_context(|| format!("failed to write trajectory {}", output.display()))?;
        log::info!(
            "Wrote {} frames to {}",
            trajectory.frames.len(),
            output.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PENDULUM: &str = include_str!("../../../scenes/pendulum.json");
    const CHAIN: &str = include_str!("../../../scenes/chain.json");

    #[test]
    fn test_cli_parse() {
        let cli = Cli::parse_from(["tether", "validate", "scene.json"]);
        assert!(matches!(cli.command, Commands::Validate { .. }));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from([
            "tether", "-v", "run", "scene.json", "-s", "2", "-f", "0.02", "-o", "out.json", "-e",
            "10",
        ]);
        assert!(cli.verbose);
        if let Commands::Run { scene, options } = cli.command {
            assert_eq!(scene, PathBuf::from("scene.json"));
            assert_eq!(options.seconds, 2.0);
            assert_eq!(options.frame_time, 0.02);
            assert_eq!(options.output, Some(PathBuf::from("out.json")));
            assert_eq!(options.every, 10);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_demo_command() {
        let cli = Cli::parse_from(["tether", "demo", "chain"]);
        if let Commands::Demo { name, options } = cli.command {
            assert_eq!(name, Demo::Chain);
            assert_eq!(options.every, 1);
        } else {
            panic!("Expected Demo command");
        }
        assert!(Cli::try_parse_from(["tether", "demo", "rocket"]).is_err());
    }

    #[test]
    fn test_bundled_scenes_build() {
        for json in [PENDULUM, CHAIN] {
            let scene = SceneDef::from_json(json).unwrap();
            assert!(scene.build().is_ok());
        }
    }

    #[test]
    fn test_simulate_records_frames() {
        let scene = SceneDef::from_json(PENDULUM).unwrap();
        let options = RunOptions {
            seconds: 1.0,
            every: 10,
            ..Default::default()
        };
        let (built, trajectory) = simulate(&scene, &options).unwrap();

        assert_eq!(built.simulation.step_count(), 60);
        assert_eq!(trajectory.frames.len(), 7);
        assert_eq!(trajectory.frames[0].steps, 0);
        assert_eq!(trajectory.frames[6].steps, 60);
        assert_eq!(trajectory.frames[6].bodies.len(), 2);

        assert!(trajectory.frames.iter().all(|f| f.interpolation == 0.0));

        let json = serde_json::to_string(&trajectory).unwrap();
        assert!(json.contains("\"frames\""));
        assert!(json.contains("\"interpolation\""));
    }

    #[test]
    fn test_simulate_rejects_bad_options() {
        let scene = Demo::Pendulum.scene();
        let options = RunOptions {
            every: 0,
            ..Default::default()
        };
        assert!(simulate(&scene, &options).is_err());

        let options = RunOptions {
            frame_time: 0.0,
            ..Default::default()
        };
        assert!(simulate(&scene, &options).is_err());
    }
}
