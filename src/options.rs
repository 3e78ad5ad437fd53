//! Solver configuration.
//!
//! All tunables live on [`SolverOptions`], a plain typed struct with
//! documented defaults. The many boolean mode flags are folded into a single
//! [`Mode`] descriptor computed once at solve entry; every hot-path branch
//! keys off the descriptor, never off raw options.

use derive_more::{Display, Error};
use faer::Col;
use problemo::Problem;
use serde::{Deserialize, Serialize};

use crate::ocp::{Discretization, OptimalControlProblem};
use crate::{E, I};

/// Backward-pass regularization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegularizationType {
    /// Shift the control Hessian: `Quu + rho * I`.
    #[default]
    Control,
    /// Shift through the dynamics: `Quu + rho * fdu^T fdu` (and the matching
    /// `Qux` correction).
    State,
}

/// Outer-loop penalty update scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyUpdateType {
    /// Scale every penalty by the same factor each outer iteration.
    #[default]
    Uniform,
    /// Scale each constraint's penalty by the fast or slow factor depending
    /// on how much its violation shrank since the previous outer iteration.
    Individual,
}

/// Options controlling the augmented Lagrangian iLQR solver.
///
/// Every field has a default; construct with `SolverOptions::default()` and
/// override what the problem needs. Deserializes from partial documents via
/// `#[serde(default)]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Cost-decrease threshold for inner convergence once constraints are
    /// satisfied.
    pub cost_tolerance: E,
    /// Cost-decrease threshold for inner convergence on intermediate outer
    /// iterations.
    pub cost_intermediate_tolerance: E,
    /// Gradient threshold for inner convergence once constraints are
    /// satisfied.
    pub gradient_tolerance: E,
    /// Gradient threshold for inner convergence on intermediate outer
    /// iterations.
    pub gradient_intermediate_tolerance: E,
    /// Maximum constraint violation for outer convergence.
    pub constraint_tolerance: E,
    /// Inner (iLQR) iteration cap per outer iteration.
    pub iterations: I,
    /// Outer (augmented Lagrangian) iteration cap.
    pub iterations_outerloop: I,
    /// Maximum number of step-size backtracks per forward pass.
    pub iterations_linesearch: I,
    /// Consecutive rejected forward passes tolerated before the inner loop is
    /// abandoned to the outer update.
    pub consecutive_failure_limit: I,

    /// Initial penalty weight.
    pub penalty_initial: E,
    /// Penalty weight cap.
    pub penalty_max: E,
    /// Fast penalty scaling factor (gamma).
    pub penalty_scaling: E,
    /// Slow penalty scaling factor used by the individual scheme when a
    /// constraint is improving.
    pub penalty_scaling_no: E,
    /// Sufficient-decrease ratio for the individual penalty scheme.
    pub constraint_decrease_ratio: E,
    /// Lower clamp for Lagrange multipliers.
    pub dual_min: E,
    /// Upper clamp for Lagrange multipliers.
    pub dual_max: E,
    /// Use the second-order (active-set KKT) multiplier update instead of the
    /// first-order one.
    pub use_second_order_dual_update: bool,

    /// Initial backward-pass regularization.
    pub bp_reg_initial: E,
    /// Multiplicative regularization rate (phi).
    pub bp_reg_increase_factor: E,
    /// Smallest nonzero regularization.
    pub bp_reg_min: E,
    /// Regularization cap; hitting it abandons the current step.
    pub bp_reg_max: E,
    /// Regularization scheme.
    pub bp_reg_type: RegularizationType,

    /// Penalty update scheme.
    pub outer_loop_update: PenaltyUpdateType,
    /// Carry the cost-to-go Hessian as a Cholesky factor in the backward
    /// pass.
    pub square_root: bool,
    /// Augment the control with a sqrt(dt) input and solve for the time steps.
    pub minimum_time: bool,
    /// After an infeasible-start solve, re-solve the original problem from
    /// the stripped trajectory to project onto the feasible manifold.
    pub resolve_feasible: bool,

    /// Lower acceptance bound on the actual/expected cost-reduction ratio.
    pub line_search_lower_bound: E,
    /// Upper acceptance bound on the actual/expected cost-reduction ratio.
    pub line_search_upper_bound: E,
    /// Step-size backtracking factor (beta).
    pub line_search_decrease_factor: E,
    /// Candidate rollout diverges if any state norm exceeds this.
    pub max_state_value: E,
    /// Candidate rollout diverges if any control norm exceeds this.
    pub max_control_value: E,

    /// Smallest admissible time step in minimum-time mode.
    pub min_time_step: E,
    /// Largest admissible time step in minimum-time mode.
    pub max_time_step: E,
    /// Cost weight on the time-step control in minimum-time mode.
    pub min_time_regularization: E,
    /// Cost weight on the slack controls in infeasible-start mode; also
    /// scales their initial penalty.
    pub infeasible_regularization: E,

    /// Print a convergence summary at the end of the solve.
    pub verbose: bool,
    /// Observability metadata for embedding drivers; the core only forwards
    /// it through the iteration record.
    pub live_plotting: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            cost_tolerance: 1e-4,
            cost_intermediate_tolerance: 1e-3,
            gradient_tolerance: 1e-5,
            gradient_intermediate_tolerance: 1e-5,
            constraint_tolerance: 1e-3,
            iterations: 500,
            iterations_outerloop: 50,
            iterations_linesearch: 20,
            consecutive_failure_limit: 5,

            penalty_initial: 1.0,
            penalty_max: 1e8,
            penalty_scaling: 10.0,
            penalty_scaling_no: 1.0,
            constraint_decrease_ratio: 0.25,
            dual_min: -1e8,
            dual_max: 1e8,
            use_second_order_dual_update: false,

            bp_reg_initial: 0.0,
            bp_reg_increase_factor: 1.6,
            bp_reg_min: 1e-8,
            bp_reg_max: 1e8,
            bp_reg_type: RegularizationType::default(),

            outer_loop_update: PenaltyUpdateType::default(),
            square_root: false,
            minimum_time: false,
            resolve_feasible: true,

            line_search_lower_bound: 1e-8,
            line_search_upper_bound: 10.0,
            line_search_decrease_factor: 0.5,
            max_state_value: 1e8,
            max_control_value: 1e8,

            min_time_step: 1e-3,
            max_time_step: 1.0,
            min_time_regularization: 1.0,
            infeasible_regularization: 1.0,

            verbose: false,
            live_plotting: false,
        }
    }
}

/// Configuration errors reported before the solve loop starts.
#[derive(Debug, Display, Error, PartialEq)]
pub enum ConfigError {
    #[display("Horizon must have at least two knot points")]
    Horizon,

    #[display("State or control dimension must be positive")]
    Dimension,

    #[display("Time step must be positive")]
    TimeStep,

    #[display("Cost matrices do not match the problem dimensions")]
    CostDimensions,

    #[display("Bound vectors do not match the problem dimensions")]
    BoundDimensions,

    #[display("User constraint Jacobians do not match the problem dimensions")]
    ConstraintDimensions,

    #[display("First-order-hold models are not supported by this recursion")]
    UnsupportedDiscretization,

    #[display("Minimum-time mode requires a time-step Jacobian on the dynamics model")]
    MissingTimeStepJacobian,

    #[display("Minimum-time step bounds are out of order")]
    TimeStepBounds,

    #[display("Penalty bounds are out of order or non-positive")]
    PenaltyBounds,

    #[display("Regularization bounds are out of order")]
    RegularizationBounds,

    #[display("Line search acceptance bounds are out of order")]
    LineSearchBounds,

    #[display("Initial trajectory does not match the problem dimensions")]
    InitialTrajectory,
}

/// Solver-mode descriptor, computed once at solve entry.
///
/// `mm` is the full augmented control dimension: the nominal `m`, plus one
/// sqrt(dt) input in minimum-time mode, plus `n` slack inputs in
/// infeasible-start mode. `m_bar` excludes the slacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub constrained: bool,
    pub minimum_time: bool,
    pub infeasible: bool,
    pub square_root: bool,
    pub discretization: Discretization,
    pub bp_reg: RegularizationType,
    pub outer_update: PenaltyUpdateType,
    pub n: I,
    pub m: I,
    pub m_bar: I,
    pub mm: I,
}

impl Mode {
    /// Validates the problem/options pair and derives the mode descriptor.
    ///
    /// All configuration errors surface here, before any allocation or
    /// iteration.
    pub fn build(
        ocp: &OptimalControlProblem,
        options: &SolverOptions,
        infeasible: bool,
    ) -> Result<Self, Problem> {
        let n = ocp.state_dim();
        let m = ocp.control_dim();

        if ocp.horizon() < 2 {
            return Err(ConfigError::Horizon)?;
        }
        if n == 0 || m == 0 {
            return Err(ConfigError::Dimension)?;
        }
        if !(ocp.time_step() > 0.0) {
            return Err(ConfigError::TimeStep)?;
        }
        if ocp.dynamics().discretization() == Discretization::Foh {
            return Err(ConfigError::UnsupportedDiscretization)?;
        }

        let cost = ocp.cost();
        if cost.state_hessian().nrows() != n
            || cost.state_hessian().ncols() != n
            || cost.control_hessian().nrows() != m
            || cost.control_hessian().ncols() != m
            || cost.terminal_hessian().nrows() != n
            || cost.terminal_hessian().ncols() != n
            || cost.goal().nrows() != n
        {
            return Err(ConfigError::CostDimensions)?;
        }
        if let Some(h) = cost.cross_term() {
            if h.nrows() != m || h.ncols() != n {
                return Err(ConfigError::CostDimensions)?;
            }
        }

        for bound in [ocp.control_lower(), ocp.control_upper()].into_iter().flatten() {
            if bound.nrows() != m {
                return Err(ConfigError::BoundDimensions)?;
            }
        }
        for bound in [ocp.state_lower(), ocp.state_upper()].into_iter().flatten() {
            if bound.nrows() != n {
                return Err(ConfigError::BoundDimensions)?;
            }
        }
        if ocp.initial_state().nrows() != n {
            return Err(ConfigError::InitialTrajectory)?;
        }

        if let Some(user) = ocp.user_constraint() {
            let probe_u = Col::zeros(m);
            let rows = user.inequality_count() + user.equality_count();
            let c = user.evaluate(ocp.initial_state(), &probe_u);
            let jx = user.state_jacobian(ocp.initial_state(), &probe_u);
            let ju = user.control_jacobian(ocp.initial_state(), &probe_u);
            if c.nrows() != rows
                || jx.nrows() != rows
                || jx.ncols() != n
                || ju.nrows() != rows
                || ju.ncols() != m
            {
                return Err(ConfigError::ConstraintDimensions)?;
            }
        }

        if options.minimum_time {
            if ocp.dynamics().has_time_step_jacobian() {
                if !(options.min_time_step > 0.0 && options.min_time_step <= options.max_time_step)
                {
                    return Err(ConfigError::TimeStepBounds)?;
                }
            } else {
                return Err(ConfigError::MissingTimeStepJacobian)?;
            }
        }
        if !(options.penalty_initial > 0.0 && options.penalty_initial <= options.penalty_max) {
            return Err(ConfigError::PenaltyBounds)?;
        }
        if !(options.bp_reg_min > 0.0 && options.bp_reg_min <= options.bp_reg_max) {
            return Err(ConfigError::RegularizationBounds)?;
        }
        if !(options.line_search_lower_bound < options.line_search_upper_bound) {
            return Err(ConfigError::LineSearchBounds)?;
        }

        let m_bar = if options.minimum_time { m + 1 } else { m };
        let mm = if infeasible { m_bar + n } else { m_bar };
        let constrained = ocp.is_constrained() || options.minimum_time || infeasible;

        Ok(Self {
            constrained,
            minimum_time: options.minimum_time,
            infeasible,
            square_root: options.square_root,
            discretization: ocp.dynamics().discretization(),
            bp_reg: options.bp_reg_type,
            outer_update: options.outer_loop_update,
            n,
            m,
            m_bar,
            mm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = SolverOptions::default();
        assert_eq!(options.cost_tolerance, 1e-4);
        assert_eq!(options.penalty_scaling, 10.0);
        assert_eq!(options.bp_reg_increase_factor, 1.6);
        assert_eq!(options.bp_reg_type, RegularizationType::Control);
        assert_eq!(options.outer_loop_update, PenaltyUpdateType::Uniform);
        assert!(options.resolve_feasible);
    }

    #[test]
    fn deserializes_partial_documents() {
        let options: SolverOptions =
            serde_json::from_str(r#"{"iterations": 25, "bp_reg_type": "state"}"#).unwrap();
        assert_eq!(options.iterations, 25);
        assert_eq!(options.bp_reg_type, RegularizationType::State);
        assert_eq!(options.cost_tolerance, 1e-4);
    }
}
