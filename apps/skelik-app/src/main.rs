//! skelik IK command-line driver.
//!
//! Provides three modes of operation:
//! - `pose`: Print the rest pose of a skeleton
//! - `solve`: Move effector targets and run a single solve
//! - `animate`: Run a headless frame loop with targets circling their rest positions

use std::f32::consts::TAU;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use bevy::prelude::*;
use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::Vector3;
use serde::Serialize;
use tracing::info;

use skelik_core::config::{IkConfig, SolverConfig};
use skelik_core::error::{ConfigError, SkelikError};
use skelik_core::types::{JointId, RigId};
use skelik_ik::{
    IkContext, IkJoint, IkRigMap, IkSolverConfig, JacobianTransposeSolver, SkelikIkPlugin, SolveReport,
};
use skelik_skeleton::{Skeleton, presets};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Jacobian-transpose inverse kinematics for articulated skeletons.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// TOML file with `[solver]` and `[skeleton]` tables. Overrides `--preset`.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Built-in skeleton to use when no config file is given.
    #[arg(short, long, global = true, value_enum, default_value_t = Preset::Humanoid)]
    preset: Preset,

    /// Override the solver's iteration budget.
    #[arg(long, global = true)]
    max_iterations: Option<u32>,

    /// Override the solver's convergence cutoff.
    #[arg(long, global = true)]
    cutoff: Option<f32>,

    /// Print poses and solve results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    /// Two unit links along +X with the tip as effector.
    Arm,
    /// Full body with hand and foot effectors.
    Humanoid,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every joint's rest position in traversal order.
    Pose,

    /// Set effector targets and run one solve.
    Solve {
        /// Effector target as NAME=X,Y,Z. Repeatable.
        #[arg(short, long = "target", value_parser = parse_target)]
        targets: Vec<(String, Vector3<f32>)>,
    },

    /// Run a headless frame loop, moving every effector target around a circle.
    Animate {
        /// Number of frames to run.
        #[arg(short, long, default_value_t = 60)]
        frames: u32,

        /// Circle radius in world units.
        #[arg(short, long, default_value_t = 0.1)]
        radius: f32,
    },
}

fn parse_target(arg: &str) -> Result<(String, Vector3<f32>), String> {
    let (name, coords) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=X,Y,Z, got `{arg}`"))?;
    let values = coords
        .split(',')
        .map(|c| c.trim().parse::<f32>().map_err(|e| format!("bad coordinate `{c}`: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        &[x, y, z] => Ok((name.to_string(), Vector3::new(x, y, z))),
        _ => Err(format!("expected three coordinates, got {}", values.len())),
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn load(cli: &Cli) -> Result<(Skeleton, SolverConfig), SkelikError> {
    let (skeleton, mut solver) = match &cli.config {
        Some(path) => {
            let config = IkConfig::from_file(path)?;
            info!(path = %path.display(), "loaded config");
            (Skeleton::from_config(&config.skeleton)?, config.solver)
        }
        None => {
            let skeleton = match cli.preset {
                Preset::Arm => presets::two_link_arm(),
                Preset::Humanoid => presets::humanoid(),
            };
            (skeleton, SolverConfig::default())
        }
    };

    if let Some(max_iterations) = cli.max_iterations {
        solver.max_iterations = max_iterations;
    }
    if let Some(cutoff) = cli.cutoff {
        solver.cutoff = cutoff;
    }
    solver.validate()?;
    Ok((skeleton, solver))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct JointPose {
    name: String,
    effector: bool,
    position: [f32; 3],
    angles: [f32; 3],
}

#[derive(Serialize)]
struct SolveSummary {
    outcome: String,
    iterations: u32,
    max_error: f32,
}

impl From<SolveReport> for SolveSummary {
    fn from(report: SolveReport) -> Self {
        Self {
            outcome: report.outcome.to_string(),
            iterations: report.iterations,
            max_error: report.max_error,
        }
    }
}

#[derive(Serialize)]
struct PoseReport {
    skeleton: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    solve: Option<SolveSummary>,
    joints: Vec<JointPose>,
}

impl PoseReport {
    fn capture(skeleton: &Skeleton, report: Option<SolveReport>) -> Self {
        let joints = skeleton
            .traverse()
            .map(|id| {
                let joint = &skeleton[id];
                JointPose {
                    name: joint.name().map_or_else(|| id.to_string(), str::to_string),
                    effector: joint.is_effector(),
                    position: joint.world_position().into(),
                    angles: joint.angles.into(),
                }
            })
            .collect();
        Self {
            skeleton: skeleton.name().to_string(),
            solve: report.map(SolveSummary::from),
            joints,
        }
    }

    fn print(&self, json: bool) -> Result<(), SkelikError> {
        self.write(&mut std::io::stdout().lock(), json)
    }

    fn write(&self, out: &mut impl Write, json: bool) -> Result<(), SkelikError> {
        if json {
            serde_json::to_writer_pretty(&mut *out, self).map_err(std::io::Error::from)?;
            writeln!(out)?;
            return Ok(());
        }

        if let Some(solve) = &self.solve {
            writeln!(
                out,
                "{}: {} iterations, max error {:.5}",
                solve.outcome, solve.iterations, solve.max_error
            )?;
        }
        for joint in &self.joints {
            let [x, y, z] = joint.position;
            let marker = if joint.effector { " *" } else { "" };
            writeln!(out, "{}: ({x:.4}, {y:.4}, {z:.4}){marker}", joint.name)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn run_pose(skeleton: Skeleton, json: bool) -> Result<(), SkelikError> {
    let ctx = IkContext::new(skeleton)?;
    info!(
        skeleton = ctx.skeleton().name(),
        joints = ctx.num_joints(),
        effectors = ctx.num_effectors(),
        "rest pose"
    );
    PoseReport::capture(ctx.skeleton(), None).print(json)
}

fn run_solve(
    skeleton: Skeleton,
    solver: SolverConfig,
    targets: &[(String, Vector3<f32>)],
    json: bool,
) -> Result<(), SkelikError> {
    let mut ctx = IkContext::new(skeleton)?;
    for (name, target) in targets {
        let effector = ctx.skeleton().find(name).ok_or_else(|| ConfigError::InvalidValue {
            field: "target".into(),
            message: format!("no joint named `{name}`"),
        })?;
        ctx.set_target(effector, *target)?;
    }

    let report = JacobianTransposeSolver::new(solver).solve(&mut ctx)?;
    PoseReport::capture(ctx.skeleton(), Some(report)).print(json)
}

fn run_animate(
    skeleton: Skeleton,
    solver: SolverConfig,
    frames: u32,
    radius: f32,
    json: bool,
) -> Result<(), SkelikError> {
    let rig = RigId(0);
    let ctx = IkContext::new(skeleton)?;
    let effectors: Vec<(JointId, Vector3<f32>)> = ctx
        .effectors()
        .iter()
        .map(|&id| ctx.target(id).map(|rest| (id, rest)))
        .collect::<Result<_, _>>()?;
    let joints = ctx.joints().to_vec();

    let mut app = App::new();
    app.add_plugins(SkelikIkPlugin);
    app.insert_resource(IkSolverConfig(solver));
    app.finish();
    app.cleanup();

    app.world_mut().resource_mut::<IkRigMap>().insert(rig, ctx);
    for joint in joints {
        app.world_mut().spawn((IkJoint { rig, joint }, Transform::default()));
    }

    #[allow(clippy::cast_precision_loss)]
    let spacing = TAU / effectors.len().max(1) as f32;
    for frame in 0..frames {
        #[allow(clippy::cast_precision_loss)]
        let phase = TAU * frame as f32 / frames as f32;
        {
            let mut rigs = app.world_mut().resource_mut::<IkRigMap>();
            for (slot, &(effector, rest)) in effectors.iter().enumerate() {
                #[allow(clippy::cast_precision_loss)]
                let angle = phase + spacing * slot as f32;
                let target = rest + Vector3::new(angle.cos(), angle.sin(), 0.0) * radius;
                rigs.set_target(rig, effector, target)?;
            }
        }

        app.update();

        let rigs = app.world().resource::<IkRigMap>();
        match rigs.get(rig).and_then(|entry| entry.last_report) {
            Some(report) if !json => println!(
                "frame {frame}: {} after {} iterations, max error {:.5}",
                report.outcome, report.iterations, report.max_error
            ),
            _ => {}
        }
    }

    let rigs = app.world().resource::<IkRigMap>();
    let Some(entry) = rigs.get(rig) else {
        return Ok(());
    };
    if !json {
        println!();
    }
    PoseReport::capture(entry.context.skeleton(), entry.last_report).print(json)
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = load(&cli).and_then(|(skeleton, solver)| match cli.command {
        Some(Commands::Pose) | None => run_pose(skeleton, cli.json),
        Some(Commands::Solve { ref targets }) => run_solve(skeleton, solver, targets, cli.json),
        Some(Commands::Animate { frames, radius }) => {
            run_animate(skeleton, solver, frames, radius, cli.json)
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
