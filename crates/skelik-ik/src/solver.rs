//! Jacobian-transpose IK solver with an optimal step length.
//!
//! Each iteration:
//!
//! 1. stack the effector errors `e` (target - position)
//! 2. stop if the largest per-effector error is within the cutoff
//! 3. build the Jacobian `J` by finite differences
//! 4. `d = J^T e`, `f = J d`
//! 5. `alpha = (f . e) / (f . f)`; scale `d` by `alpha`
//! 6. add `d` to every free joint axis (wrapped, then clamped to limits)
//! 7. rerun FK
//!
//! `alpha` minimizes `|e - alpha * f|`, so under the linear model each step
//! is the best move along the transpose direction.

use std::fmt;

use nalgebra::Vector3;
use tracing::{debug, trace, warn};

use skelik_core::config::SolverConfig;
use skelik_core::error::IkError;
use skelik_core::types::Axis;
use skelik_skeleton::Skeleton;

use crate::context::IkContext;
use crate::jacobian::build_jacobian;

/// Why a solve stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolveOutcome {
    /// Every effector is within the cutoff of its target.
    Converged,
    /// The step direction vanished (`J J^T e == 0`) or the step length was
    /// not finite. The pose is left as it was before the failed step.
    Stalled,
    /// The iteration budget ran out.
    Exhausted,
}

impl fmt::Display for SolveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::Stalled => write!(f, "stalled"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Result of an IK solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    /// Number of angle updates applied.
    pub iterations: u32,
    pub outcome: SolveOutcome,
    /// Largest effector error after the last FK pass.
    pub max_error: f32,
}

impl SolveReport {
    pub fn converged(&self) -> bool {
        self.outcome == SolveOutcome::Converged
    }
}

/// Jacobian-transpose IK solver.
#[derive(Debug, Clone, Default)]
pub struct JacobianTransposeSolver {
    config: SolverConfig,
}

impl JacobianTransposeSolver {
    /// Create a new solver with the given configuration.
    pub const fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Create a solver with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(SolverConfig::default())
    }

    pub const fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Move the context's joints towards their targets.
    ///
    /// Starts from the current joint angles (FK is rerun first, so angle
    /// edits made since the last solve are honored). Fails only on
    /// precondition violations; unreachable targets and degenerate poses
    /// are reported through [`SolveReport::outcome`].
    ///
    /// # Errors
    ///
    /// [`IkError::StaleContext`] if the skeleton changed structurally since
    /// the context was last (re)initialized.
    pub fn solve(&self, ctx: &mut IkContext) -> Result<SolveReport, IkError> {
        ctx.ensure_current()?;
        ctx.skeleton.update_world();

        let mut iterations = 0;
        while iterations < self.config.max_iterations {
            let max_error = ctx.stack_errors();
            if max_error <= self.config.cutoff {
                return Ok(self.finish(iterations, SolveOutcome::Converged, max_error));
            }

            build_jacobian(
                &mut ctx.skeleton,
                &ctx.effectors,
                self.config.perturbation,
                &mut ctx.jacobian,
            );
            ctx.jacobian.tr_mul_to(&ctx.errors, &mut ctx.delta_angles);
            ctx.jacobian.mul_to(&ctx.delta_angles, &mut ctx.expected);

            let denominator = ctx.expected.dot(&ctx.expected);
            let alpha = ctx.expected.dot(&ctx.errors) / denominator;
            if denominator <= 0.0 || !alpha.is_finite() {
                debug!(iterations, denominator, alpha, "IK step degenerate");
                return Ok(self.finish(iterations, SolveOutcome::Stalled, max_error));
            }
            trace!(iteration = iterations, max_error, alpha, "IK step");

            ctx.delta_angles *= alpha;
            for (index, &id) in ctx.joints.iter().enumerate() {
                let joint = &mut ctx.skeleton[id];
                for axis in Axis::ALL {
                    joint.apply_angle_delta(axis, ctx.delta_angles[3 * index + axis.index()]);
                }
            }
            ctx.skeleton.update_world();
            iterations += 1;
        }

        let max_error = ctx.stack_errors();
        Ok(self.finish(iterations, SolveOutcome::Exhausted, max_error))
    }

    fn finish(&self, iterations: u32, outcome: SolveOutcome, max_error: f32) -> SolveReport {
        debug!(
            iterations,
            %outcome,
            max_error,
            cutoff = self.config.cutoff,
            "IK solve finished"
        );
        SolveReport {
            iterations,
            outcome,
            max_error,
        }
    }
}

/// Convenience: solve one skeleton in a single call (for scripted use).
///
/// `targets` pairs effector names with world-space goals; unknown names are
/// skipped with a warning. Returns the posed skeleton and the solve report.
///
/// # Errors
///
/// [`IkError::MissingRoot`] for a rootless skeleton, or
/// [`IkError::NotAnEffector`] when a named joint is not an effector.
pub fn solve_skeleton(
    skeleton: Skeleton,
    targets: &[(&str, Vector3<f32>)],
    config: SolverConfig,
) -> Result<(Skeleton, SolveReport), IkError> {
    let mut context = IkContext::new(skeleton)?;
    for &(name, target) in targets {
        let Some(effector) = context.skeleton().find(name) else {
            warn!(name, "no joint with this name; target ignored");
            continue;
        };
        context.set_target(effector, target)?;
    }
    let report = JacobianTransposeSolver::new(config).solve(&mut context)?;
    Ok((context.into_skeleton(), report))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use skelik_skeleton::{AxisLimit, presets};

    use super::*;

    fn arm_context() -> (IkContext, skelik_core::types::JointId) {
        let ctx = IkContext::new(presets::two_link_arm()).unwrap();
        let hand = ctx.skeleton().find("hand").unwrap();
        (ctx, hand)
    }

    #[test]
    fn target_at_rest_needs_no_iterations() {
        let (mut ctx, hand) = arm_context();
        ctx.set_target(hand, Vector3::new(2.0, 0.0, 0.0)).unwrap();
        let before = ctx.skeleton()[hand].angles;

        let report = JacobianTransposeSolver::with_defaults().solve(&mut ctx).unwrap();
        assert_eq!(report.iterations, 0);
        assert_eq!(report.outcome, SolveOutcome::Converged);
        assert_eq!(ctx.skeleton()[hand].angles, before);
    }

    #[test]
    fn reachable_target_converges() {
        let (mut ctx, hand) = arm_context();
        let goal = Vector3::new(1.0, 1.0, 0.0);
        ctx.set_target(hand, goal).unwrap();

        let solver = JacobianTransposeSolver::new(SolverConfig {
            cutoff: 0.01,
            max_iterations: 100,
            perturbation: 0.5,
        });
        let report = solver.solve(&mut ctx).unwrap();

        assert!(report.converged(), "{report:?}");
        assert!(report.iterations <= 50, "took {} iterations", report.iterations);
        assert!((ctx.skeleton()[hand].world_position() - goal).norm() <= 0.01);
        assert_relative_eq!(report.max_error, ctx.max_error());
    }

    #[test]
    fn unreachable_target_exhausts_budget() {
        let (mut ctx, hand) = arm_context();
        ctx.set_target(hand, Vector3::new(0.0, 0.0, 3.0)).unwrap();

        let report = JacobianTransposeSolver::with_defaults().solve(&mut ctx).unwrap();
        assert_eq!(report.iterations, 100);
        assert_eq!(report.outcome, SolveOutcome::Exhausted);
        // Best the arm can do is reach straight up: |(0,0,2) - (0,0,3)| = 1.
        assert!((report.max_error - 1.0).abs() < 0.05, "max_error = {}", report.max_error);
    }

    #[test]
    fn single_iteration_budget() {
        let (mut ctx, hand) = arm_context();
        ctx.set_target(hand, Vector3::new(1.0, 1.0, 0.0)).unwrap();
        let solver = JacobianTransposeSolver::new(SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        });
        let report = solver.solve(&mut ctx).unwrap();
        assert_eq!(report.iterations, 1);
        assert!(report.max_error < 2.0_f32.sqrt());
    }

    #[test]
    fn static_root_only_moves_free_joint() {
        let mut sk = presets::two_link_arm();
        let shoulder = sk.find("shoulder").unwrap();
        let hand = sk.find("hand").unwrap();
        sk.set_static(shoulder, true).unwrap();
        let mut ctx = IkContext::new(sk).unwrap();
        ctx.set_target(hand, Vector3::new(1.0, 1.0, 0.0)).unwrap();

        let report = JacobianTransposeSolver::with_defaults().solve(&mut ctx).unwrap();
        assert_eq!(ctx.skeleton()[shoulder].angles, Vector3::zeros());
        assert!(report.converged(), "{report:?}");
        assert_relative_eq!(ctx.skeleton()[hand].angles.z, 90.0, epsilon = 1.0);
    }

    #[test]
    fn fully_static_chain_stalls() {
        let mut sk = presets::two_link_arm();
        let shoulder = sk.find("shoulder").unwrap();
        let hand = sk.find("hand").unwrap();
        sk.set_static(shoulder, true).unwrap();
        sk.set_static(hand, true).unwrap();
        let mut ctx = IkContext::new(sk).unwrap();
        ctx.set_target(hand, Vector3::new(0.0, 2.0, 0.0)).unwrap();

        let report = JacobianTransposeSolver::with_defaults().solve(&mut ctx).unwrap();
        assert_eq!(report.outcome, SolveOutcome::Stalled);
        assert_eq!(report.iterations, 0);
        assert_relative_eq!(report.max_error, 8.0_f32.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn limits_hold_during_solve() {
        let mut sk = presets::two_link_arm();
        let shoulder = sk.find("shoulder").unwrap();
        let hand = sk.find("hand").unwrap();
        sk[shoulder].limits[Axis::Z.index()] = Some(AxisLimit::new(-10.0, 10.0));
        let mut ctx = IkContext::new(sk).unwrap();
        ctx.set_target(hand, Vector3::new(0.0, 2.0, 0.0)).unwrap();

        JacobianTransposeSolver::with_defaults().solve(&mut ctx).unwrap();
        let z = ctx.skeleton()[shoulder].angles.z;
        assert!((-10.0..=10.0).contains(&z), "shoulder z = {z}");
    }

    #[test]
    fn angles_stay_in_canonical_range() {
        let (mut ctx, hand) = arm_context();
        ctx.set_target(hand, Vector3::new(-1.5, -0.5, 0.7)).unwrap();
        JacobianTransposeSolver::with_defaults().solve(&mut ctx).unwrap();
        for (_, joint) in ctx.skeleton().iter() {
            for angle in joint.angles.iter() {
                assert!((-180.0..=180.0).contains(angle), "angle {angle} out of range");
            }
        }
    }

    #[test]
    fn stale_context_is_rejected() {
        let (mut ctx, _) = arm_context();
        let shoulder = ctx.skeleton().find("shoulder").unwrap();
        ctx.skeleton_mut().set_effector(shoulder, true).unwrap();
        let err = JacobianTransposeSolver::with_defaults().solve(&mut ctx).unwrap_err();
        assert!(matches!(err, IkError::StaleContext { .. }));
    }

    #[test]
    fn skeleton_without_effectors_converges_immediately() {
        let mut sk = Skeleton::new("bare");
        sk.add_root(skelik_skeleton::Joint::new("only").with_offset(Vector3::x()));
        let mut ctx = IkContext::new(sk).unwrap();
        let report = JacobianTransposeSolver::with_defaults().solve(&mut ctx).unwrap();
        assert_eq!(report.iterations, 0);
        assert!(report.converged());
    }

    #[test]
    fn outcome_display() {
        assert_eq!(SolveOutcome::Converged.to_string(), "converged");
        assert_eq!(SolveOutcome::Stalled.to_string(), "stalled");
        assert_eq!(SolveOutcome::Exhausted.to_string(), "exhausted");
    }

    #[test]
    fn solve_skeleton_convenience() {
        let (skeleton, report) = solve_skeleton(
            presets::two_link_arm(),
            &[("hand", Vector3::new(1.0, 1.0, 0.0)), ("nobody", Vector3::zeros())],
            SolverConfig::default(),
        )
        .unwrap();
        assert!(report.converged(), "{report:?}");
        let hand = skeleton.find("hand").unwrap();
        assert!((skeleton[hand].world_position() - Vector3::new(1.0, 1.0, 0.0)).norm() < 0.01);
    }

    #[test]
    fn solve_skeleton_rejects_non_effector_target() {
        let err = solve_skeleton(
            presets::two_link_arm(),
            &[("shoulder", Vector3::zeros())],
            SolverConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IkError::NotAnEffector(_)));
    }
}
