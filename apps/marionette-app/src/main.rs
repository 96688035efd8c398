//! Marionette IK command-line driver.
//!
//! Provides three modes of operation:
//! - `run`: Drive a rig headless with a synthetic waveform and print residuals
//! - `dump-config`: Print the stock humanoid rig as TOML
//! - `info`: Print crate versions and solver defaults

use std::path::PathBuf;

use bevy::log::{Level, LogPlugin};
use bevy::prelude::*;
use clap::{Parser, Subcommand};
use nalgebra::Vector3;

use marionette_core::prelude::*;
use marionette_core::presets;
use marionette_ik::{
    ChainReport, IkRig, IkTargetSource, MarionetteIkPlugin, TargetSource, WaveformTargets,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Jacobian IK for articulated skeletons.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the humanoid skeleton headless and print per-chain residuals.
    Run {
        /// Rig configuration (TOML) over the humanoid skeleton's bone names.
        /// Defaults to the humanoid preset.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of frames to run.
        #[arg(short, long, default_value_t = 300)]
        frames: u32,

        /// Override the solve method (transpose, pseudoinverse, damped).
        #[arg(short, long)]
        method: Option<SolveMethod>,

        /// Override the sub-iteration count per chain per frame.
        #[arg(short = 'k', long)]
        sub_iterations: Option<u32>,

        /// Log at debug level.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the humanoid preset as TOML.
    DumpConfig,

    /// Print crate information.
    Info,
}

// ---------------------------------------------------------------------------
// Oscillator
// ---------------------------------------------------------------------------

/// Number of bytes in one synthetic analyser frame.
const WAVEFORM_LEN: usize = 32;

/// Synthetic time-domain signal standing in for an audio analyser.
struct Oscillator {
    waveform: WaveformTargets,
    frame: u32,
}

impl Oscillator {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn samples(&self) -> [u8; WAVEFORM_LEN] {
        let t = self.frame as f32 * 0.05;
        std::array::from_fn(|i| {
            let phase = t + i as f32 * 0.4;
            (100.0 + 30.0 * phase.sin()).round() as u8
        })
    }
}

impl TargetSource for Oscillator {
    fn targets(&mut self) -> Vec<(&str, Vector3<f32>)> {
        let samples = self.samples();
        self.frame += 1;
        self.waveform.push_samples(&samples);
        self.waveform.targets()
    }
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("error: {context}: {err}");
    std::process::exit(1);
}

fn run(
    config: Option<PathBuf>,
    frames: u32,
    method: Option<SolveMethod>,
    sub_iterations: Option<u32>,
    verbose: bool,
) {
    let mut rig_config = match config {
        Some(path) => RigConfig::from_file(&path)
            .unwrap_or_else(|e| fail(&format!("loading {}", path.display()), e)),
        None => presets::humanoid_rig(),
    };
    if let Some(method) = method {
        rig_config.ik.method = method;
    }
    if let Some(k) = sub_iterations {
        rig_config.ik.sub_iterations = k;
    }

    let skeleton = presets::humanoid_skeleton().unwrap_or_else(|e| fail("building skeleton", e));
    let rig = IkRig::from_config(skeleton, &rig_config).unwrap_or_else(|e| fail("loading rig", e));
    let waveform = WaveformTargets::from_rig(&rig).unwrap_or_else(|e| fail("waveform", e));

    let mut app = App::new();
    app.add_plugins(LogPlugin {
        level: if verbose { Level::DEBUG } else { Level::INFO },
        ..default()
    });
    app.add_plugins((MarionetteCorePlugin, MarionetteIkPlugin));
    app.insert_resource(rig);
    app.insert_resource(IkTargetSource::new(Oscillator { waveform, frame: 0 }));
    app.finish();
    app.cleanup();

    let report_every = (frames / 10).max(1);
    for frame in 1..=frames {
        app.update();
        if frame % report_every == 0 || frame == frames {
            let rig = app.world().resource::<IkRig>();
            let worst = rig
                .reports()
                .iter()
                .map(ChainReport::residual_norm)
                .fold(0.0_f32, f32::max);
            println!("frame {frame:>5}: worst residual={worst:.4}");
        }
    }

    let rig = app.world().resource::<IkRig>();
    println!("\nmethod={} K={}", rig.config().method, rig.config().sub_iterations);
    for ((name, residual), report) in rig.residuals().zip(rig.reports()) {
        println!(
            "  {name:<12} residual=({:+.4}, {:+.4}, {:+.4}) |r|={:.4} rejected={}{}",
            residual.x,
            residual.y,
            residual.z,
            report.residual_norm(),
            report.rejected_deltas,
            if report.skipped { " (skipped)" } else { "" }
        );
    }
}

fn dump_config() {
    match toml::to_string_pretty(&presets::humanoid_rig()) {
        Ok(text) => print!("{text}"),
        Err(e) => fail("serializing preset", e),
    }
}

fn run_info() {
    let ik = IkConfig::default();
    println!("marionette v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("crates:");
    println!("  marionette-core {}", env!("CARGO_PKG_VERSION"));
    println!("  marionette-ik   {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("solver defaults:");
    println!("  method         {}", ik.method);
    println!("  damping        {}", ik.damping);
    println!("  step_gain      {}", ik.step_gain);
    println!("  sub_iterations {}", ik.sub_iterations);
    println!();
    let methods: Vec<_> = SolveMethod::ALL.iter().map(|m| m.as_str()).collect();
    println!("methods: {}", methods.join(", "));
    println!("edition: 2024");
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            config,
            frames,
            method,
            sub_iterations,
            verbose,
        }) => run(config, frames, method, sub_iterations, verbose),
        Some(Commands::DumpConfig) => dump_config(),
        Some(Commands::Info) => run_info(),
        None => {
            // Default: run the humanoid preset with defaults
            run(None, 300, None, None, false);
        }
    }
}
