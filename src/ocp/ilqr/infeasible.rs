//! Infeasible-start reformulation.
//!
//! Augmenting the control with one slack input per state component turns the
//! dynamics into `x' = f(x, u, dt) + s`, which can reproduce an arbitrary
//! state trajectory exactly: `s_k = X0[k+1] - f(X0[k], U0[k], dt)`. The
//! slacks carry equality constraints `s = 0`, so the augmented Lagrangian
//! drives the trajectory back onto the dynamically feasible manifold.

use faer::Col;

use crate::E;
use crate::linalg::vector_ops::{head, infinity_norm, segment};
use crate::ocp::OptimalControlProblem;

use super::trajectory::TrajectoryStore;

/// Slack inputs that make the augmented dynamics reproduce `states` exactly
/// under `controls`.
pub(crate) fn slack_controls(
    ocp: &OptimalControlProblem,
    states: &[Col<E>],
    controls: &[Col<E>],
) -> Vec<Col<E>> {
    let dt = ocp.time_step();
    (0..controls.len())
        .map(|k| {
            let u_nom = head(&controls[k], ocp.control_dim());
            &states[k + 1] - ocp.dynamics().evaluate(&states[k], &u_nom, dt)
        })
        .collect()
}

/// Largest slack-input magnitude over the trajectory.
pub(crate) fn slack_norm(store: &TrajectoryStore) -> E {
    let mut worst: E = 0.0;
    for k in 0..store.stages() {
        let slack = segment(&store.U[k], store.m_bar, store.n);
        worst = E::max(worst, infinity_norm(slack.as_ref()));
    }
    worst
}

/// Controls with the slack tail removed, keeping any sqrt(dt) input.
pub(crate) fn stripped_controls(store: &TrajectoryStore) -> Vec<Col<E>> {
    store.U.iter().map(|u| head(u, store.m_bar)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocp::{DynamicsModel, QuadraticCost};
    use faer::Mat;

    fn problem() -> OptimalControlProblem {
        let dynamics = DynamicsModel::new(
            2,
            1,
            |x, u, dt| Col::from_fn(2, |i| if i == 0 { x[0] + dt * x[1] } else { x[1] + dt * u[0] }),
            |_x, _u, dt| Mat::from_fn(2, 2, |i, j| [[1.0, dt], [0.0, 1.0]][i][j]),
            |_x, _u, dt| Mat::from_fn(2, 1, |i, _| if i == 0 { 0.0 } else { dt }),
        );
        let cost = QuadraticCost::new(
            Mat::<E>::identity(2, 2),
            Mat::<E>::identity(1, 1),
            Mat::<E>::identity(2, 2),
            Col::zeros(2),
        );
        OptimalControlProblem::new(dynamics, cost, Col::from_fn(2, |_| 1.0), 4, 0.1)
    }

    #[test]
    fn slacks_reproduce_the_supplied_states() {
        let ocp = problem();
        // A state trajectory the dynamics cannot produce on their own.
        let states: Vec<Col<f64>> = (0..4).map(|k| Col::from_fn(2, |i| (k + i) as f64)).collect();
        let controls = vec![Col::zeros(1); 3];

        let slacks = slack_controls(&ocp, &states, &controls);
        for k in 0..3 {
            let propagated =
                ocp.dynamics().evaluate(&states[k], &controls[k], 0.1) + &slacks[k];
            assert!((&propagated - &states[k + 1]).norm_l2() < 1e-14);
        }
    }

    #[test]
    fn slacks_vanish_on_a_feasible_trajectory() {
        let ocp = problem();
        let controls = vec![Col::from_fn(1, |_| 0.5); 3];
        let mut states = vec![ocp.initial_state().clone()];
        for k in 0..3 {
            let next = ocp.dynamics().evaluate(&states[k], &controls[k], 0.1);
            states.push(next);
        }

        let slacks = slack_controls(&ocp, &states, &controls);
        for slack in slacks {
            assert!(slack.norm_l2() < 1e-14);
        }
    }
}
