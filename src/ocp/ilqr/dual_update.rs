//! Lagrange multiplier updates for the outer loop.
//!
//! The first-order update is the classical clamped ascent step
//! `lambda <- clamp(lambda + mu .* c)` with a non-negativity projection on
//! the inequality rows. The optional second-order update solves a reduced
//! KKT system over the active rows of one stage at a time and falls back to
//! the first-order step when the system is not positive definite.

use faer::Mat;

use crate::linalg::cholesky::DenseCholesky;
use crate::ocp::OptimalControlProblem;
use crate::options::SolverOptions;
use crate::{E, I};

use super::constraints::{self, ConstraintLayout};
use super::trajectory::TrajectoryStore;

pub(crate) fn update_duals(
    store: &mut TrajectoryStore,
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
    options: &SolverOptions,
) {
    if options.use_second_order_dual_update {
        second_order_update(store, ocp, layout, options);
    } else {
        first_order_update(store, layout, options);
    }
}

fn clamp(value: E, lo: E, hi: E) -> E {
    E::min(E::max(value, lo), hi)
}

pub(crate) fn first_order_update(
    store: &mut TrajectoryStore,
    layout: &ConstraintLayout,
    options: &SolverOptions,
) {
    for k in 0..store.stages() {
        for i in 0..layout.p {
            let stepped = store.lambda[k][i] + store.mu[k][i] * store.C[k][i];
            let mut lam = clamp(stepped, options.dual_min, options.dual_max);
            if i < layout.p_ineq {
                lam = E::max(lam, 0.0);
            }
            store.lambda[k][i] = lam;
        }
    }
    for i in 0..layout.p_term {
        let stepped = store.lambda_term[i] + store.mu_term[i] * store.C_term[i];
        store.lambda_term[i] = clamp(stepped, options.dual_min, options.dual_max);
    }
}

/// Second-order update on the active rows of each stage:
/// solves `(A H^-1 A^T + Imu^-1) delta = c` with `A` the active constraint
/// Jacobian and `H` the augmented stage Hessian, then steps
/// `lambda <- lambda + delta` with the usual clamp and projection.
fn second_order_update(
    store: &mut TrajectoryStore,
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
    options: &SolverOptions,
) {
    let mut chol = DenseCholesky::new();

    for k in 0..store.stages() {
        let active: Vec<I> = (0..layout.p)
            .filter(|&i| i >= layout.p_ineq || store.C[k][i] > 0.0 || store.lambda[k][i] > 0.0)
            .collect();
        if active.is_empty() {
            continue;
        }

        let (lxx, luu, _lux, _lx, _lu) =
            constraints::al_expansion(store, ocp, layout, options, k);

        // H = blkdiag(lxx, luu); A = active rows of [Cx Cu].
        let dim = layout.n + layout.mm;
        let mut hess = Mat::zeros(dim, dim);
        for i in 0..layout.n {
            for j in 0..layout.n {
                hess[(i, j)] = lxx[(i, j)];
            }
        }
        for i in 0..layout.mm {
            for j in 0..layout.mm {
                hess[(layout.n + i, layout.n + j)] = luu[(i, j)];
            }
        }
        let jac = Mat::from_fn(active.len(), dim, |row, col| {
            let i = active[row];
            if col < layout.n {
                store.Cx[k][(i, col)]
            } else {
                store.Cu[k][(i, col - layout.n)]
            }
        });

        if chol.factorize(hess.as_ref()).is_err() {
            stage_first_order(store, layout, options, k);
            continue;
        }
        let hinv_at = chol.solve(jac.transpose()).unwrap();

        let mut kkt = &jac * &hinv_at;
        for (row, &i) in active.iter().enumerate() {
            kkt[(row, row)] += 1.0 / store.mu[k][i];
        }
        if chol.factorize(kkt.as_ref()).is_err() {
            stage_first_order(store, layout, options, k);
            continue;
        }

        let residual = Mat::from_fn(active.len(), 1, |row, _| store.C[k][active[row]]);
        let delta = chol.solve(residual.as_ref()).unwrap();

        for (row, &i) in active.iter().enumerate() {
            let mut lam = clamp(
                store.lambda[k][i] + delta[(row, 0)],
                options.dual_min,
                options.dual_max,
            );
            if i < layout.p_ineq {
                lam = E::max(lam, 0.0);
            }
            store.lambda[k][i] = lam;
        }
        // Inactive inequality multipliers decay by the first-order rule so a
        // row leaving the active set releases its multiplier.
        for i in 0..layout.p_ineq {
            if !active.contains(&i) {
                let stepped = store.lambda[k][i] + store.mu[k][i] * store.C[k][i];
                store.lambda[k][i] = E::max(clamp(stepped, options.dual_min, options.dual_max), 0.0);
            }
        }
    }

    for i in 0..layout.p_term {
        let stepped = store.lambda_term[i] + store.mu_term[i] * store.C_term[i];
        store.lambda_term[i] = clamp(stepped, options.dual_min, options.dual_max);
    }
}

fn stage_first_order(
    store: &mut TrajectoryStore,
    layout: &ConstraintLayout,
    options: &SolverOptions,
    k: I,
) {
    for i in 0..layout.p {
        let stepped = store.lambda[k][i] + store.mu[k][i] * store.C[k][i];
        let mut lam = clamp(stepped, options.dual_min, options.dual_max);
        if i < layout.p_ineq {
            lam = E::max(lam, 0.0);
        }
        store.lambda[k][i] = lam;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocp::Discretization;
    use crate::options::{Mode, PenaltyUpdateType, RegularizationType};

    fn store_with(p: I, p_term: I) -> (TrajectoryStore, SolverOptions) {
        let options = SolverOptions::default();
        let mode = Mode {
            constrained: true,
            minimum_time: false,
            infeasible: false,
            square_root: false,
            discretization: Discretization::Zoh,
            bp_reg: RegularizationType::Control,
            outer_update: PenaltyUpdateType::Uniform,
            n: 2,
            m: 1,
            m_bar: 1,
            mm: 1,
        };
        (TrajectoryStore::new(&mode, p, p_term, 3, 0.1, &options), options)
    }

    fn simple_layout(p_ineq: I, p_eq: I, p_term: I) -> ConstraintLayout {
        ConstraintLayout {
            n: 2,
            m: 1,
            m_bar: 1,
            mm: 1,
            n_user_ineq: p_ineq,
            n_user_eq: p_eq,
            control_upper: Vec::new(),
            control_lower: Vec::new(),
            state_upper: Vec::new(),
            state_lower: Vec::new(),
            off_control_upper: p_ineq,
            off_control_lower: p_ineq,
            off_state_upper: p_ineq,
            off_state_lower: p_ineq,
            off_user_eq: p_ineq,
            min_time_row: None,
            slack_offset: None,
            p: p_ineq + p_eq,
            p_ineq,
            p_eq,
            p_term,
        }
    }

    #[test]
    fn first_order_projects_inequality_multipliers() {
        let (mut store, options) = store_with(2, 2);
        let layout = simple_layout(1, 1, 2);

        store.C[0][0] = -3.0; // satisfied inequality drives lambda negative
        store.C[0][1] = 0.5; // violated equality
        store.lambda[0][0] = 1.0;
        first_order_update(&mut store, &layout, &options);

        assert_eq!(store.lambda[0][0], 0.0);
        assert_eq!(store.lambda[0][1], 0.5 * options.penalty_initial);
    }

    #[test]
    fn first_order_clamps_to_dual_box() {
        let (mut store, mut options) = store_with(1, 0);
        options.dual_max = 10.0;
        let layout = simple_layout(0, 1, 0);

        store.lambda[0][0] = 9.0;
        store.mu[0][0] = 100.0;
        store.C[0][0] = 1.0;
        first_order_update(&mut store, &layout, &options);
        assert_eq!(store.lambda[0][0], 10.0);
    }

    #[test]
    fn terminal_multipliers_follow_residual_sign() {
        let (mut store, options) = store_with(0, 2);
        let layout = simple_layout(0, 0, 2);

        store.C_term[0] = -0.25;
        store.C_term[1] = 0.75;
        first_order_update(&mut store, &layout, &options);
        assert_eq!(store.lambda_term[0], -0.25 * options.penalty_initial);
        assert_eq!(store.lambda_term[1], 0.75 * options.penalty_initial);
    }
}
