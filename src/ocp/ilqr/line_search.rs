//! Forward pass: regularized rollout with a backtracking line search.
//!
//! The candidate trajectory is rolled out under the affine policy at step
//! `alpha`, clamped into the control box, and accepted or rejected by
//! comparing the actual cost reduction against the reduction the backward
//! pass predicted. Rejections halve the step; a non-finite or diverging
//! rollout counts as a rejection.

use crate::linalg::vector_ops::{head, infinity_norm, is_col_finite, segment};
use crate::ocp::OptimalControlProblem;
use crate::options::SolverOptions;
use crate::E;

use super::constraints::{self, ConstraintLayout};
use super::trajectory::TrajectoryStore;

/// Outcome of a forward pass.
pub(crate) enum ForwardPass {
    /// The candidate trajectories hold an accepted iterate; promote them.
    Accepted { cost: E, alpha: E },
    /// The backward pass predicted no descent at the attempted step; the
    /// iterate is unusable and the regularization must grow.
    NoDescent,
    /// Every attempted step was rejected.
    Exhausted,
}

pub(crate) fn forward_pass(
    store: &mut TrajectoryStore,
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
    options: &SolverOptions,
    dv: (E, E),
    j_prev: E,
) -> ForwardPass {
    let mut alpha: E = 1.0;

    for _ in 0..options.iterations_linesearch {
        let expected = alpha * dv.0 + alpha * alpha * dv.1;
        if expected >= 0.0 {
            return ForwardPass::NoDescent;
        }

        if !rollout(store, ocp, layout, options, alpha) {
            alpha *= options.line_search_decrease_factor;
            continue;
        }

        let j_new = constraints::total_cost(store, ocp, layout, options, true);
        if !j_new.is_finite() {
            alpha *= options.line_search_decrease_factor;
            continue;
        }

        let z = (j_prev - j_new) / (-expected);
        if z >= options.line_search_lower_bound && z <= options.line_search_upper_bound {
            return ForwardPass::Accepted { cost: j_new, alpha };
        }
        alpha *= options.line_search_decrease_factor;
    }

    ForwardPass::Exhausted
}

/// Rolls the candidate trajectory out under `u = U + K dx + alpha d`.
/// Returns `false` if any state or control goes non-finite or leaves the
/// trust region.
pub(crate) fn rollout(
    store: &mut TrajectoryStore,
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
    options: &SolverOptions,
    alpha: E,
) -> bool {
    store.X_new[0] = store.X[0].clone();

    for k in 0..store.stages() {
        let dx = &store.X_new[k] - &store.X[k];
        let mut u = &store.U[k] + &store.K[k] * &dx + alpha * &store.d[k];
        layout.clamp_controls(&mut u);

        if !is_col_finite(u.as_ref()) || infinity_norm(u.as_ref()) > options.max_control_value {
            return false;
        }

        let dt_k = if store.minimum_time {
            let tau = u[store.m_bar - 1];
            tau * tau
        } else {
            ocp.time_step()
        };
        let u_nom = head(&u, store.m);
        let mut x_next = ocp.dynamics().evaluate(&store.X_new[k], &u_nom, dt_k);
        if store.infeasible {
            x_next += segment(&u, store.m_bar, store.n);
        }

        if !is_col_finite(x_next.as_ref()) || infinity_norm(x_next.as_ref()) > options.max_state_value
        {
            return false;
        }

        store.U_new[k] = u;
        store.X_new[k + 1] = x_next;
    }

    true
}

/// Simulates the committed controls forward from the initial state, writing
/// the states in place. Used once at solve entry.
pub(crate) fn initial_rollout(
    store: &mut TrajectoryStore,
    ocp: &OptimalControlProblem,
    options: &SolverOptions,
) -> bool {
    store.X[0] = ocp.initial_state().clone();

    for k in 0..store.stages() {
        let dt_k = store.time_step(k, ocp.time_step());
        let u_nom = head(&store.U[k], store.m);
        let mut x_next = ocp.dynamics().evaluate(&store.X[k], &u_nom, dt_k);
        if store.infeasible {
            x_next += segment(&store.U[k], store.m_bar, store.n);
        }

        if !is_col_finite(x_next.as_ref())
            || infinity_norm(x_next.as_ref()) > options.max_state_value
        {
            return false;
        }
        store.X[k + 1] = x_next;
    }

    true
}
