//! Riccati-style backward recursion.
//!
//! Computes the affine policy `du = K dx + alpha d` and the quadratic
//! cost-to-go `(S, s)` from the terminal boundary down to the first stage,
//! together with the expected-reduction pair `(dv1, dv2)`. Positive
//! definiteness of the regularized control Hessian is established by a
//! Cholesky attempt; a failed attempt bumps the regularization and restarts
//! the whole pass. The value backup always uses the unregularized expansion.

use faer::{Col, Mat};

use crate::linalg::cholesky::DenseCholesky;
use crate::linalg::vector_ops::{dot, symmetrize};
use crate::ocp::OptimalControlProblem;
use crate::options::{Mode, RegularizationType, SolverOptions};
use crate::{E, I};

use super::constraints::{self, ConstraintLayout};
use super::trajectory::TrajectoryStore;

/// Outcome of a backward pass.
pub(crate) enum BackwardPass {
    /// The recursion reached the first stage; gains and cost-to-go are valid.
    Success {
        /// Expected cost reduction at unit step: `(sum d^T Qu, sum 1/2 d^T Quu d)`.
        dv: (E, E),
        /// Number of indefinite-Hessian restarts absorbed along the way.
        indefinite_restarts: I,
    },
    /// The regularization saturated while the control Hessian was still
    /// indefinite; the current step must be abandoned.
    RegularizationLimit,
}

pub(crate) fn backward_pass(
    store: &mut TrajectoryStore,
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
    options: &SolverOptions,
    mode: &Mode,
) -> BackwardPass {
    if mode.square_root {
        square_root_pass(store, ocp, layout, options, mode)
    } else {
        standard_pass(store, ocp, layout, options, mode)
    }
}

fn standard_pass(
    store: &mut TrajectoryStore,
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
    options: &SolverOptions,
    mode: &Mode,
) -> BackwardPass {
    let last = store.n_knots - 1;
    let mut chol = DenseCholesky::new();
    let mut restarts = 0;

    'restart: loop {
        let (s_mat, s_vec) = constraints::terminal_boundary(store, ocp);
        store.S[last] = s_mat;
        store.s[last] = s_vec;

        let mut dv = (0.0, 0.0);

        for k in (0..last).rev() {
            let (lxx, luu, lux, lx, lu) = constraints::al_expansion(store, ocp, layout, options, k);
            let fdx = &store.fdx[k];
            let fdu = &store.fdu[k];

            let qx = &lx + fdx.transpose() * &store.s[k + 1];
            let qu = &lu + fdu.transpose() * &store.s[k + 1];
            let qxx = &lxx + fdx.transpose() * &store.S[k + 1] * fdx;
            let quu = &luu + fdu.transpose() * &store.S[k + 1] * fdu;
            let qux = &lux + fdu.transpose() * &store.S[k + 1] * fdx;

            let rho = store.reg.rho;
            let (quu_reg, qux_reg) = match mode.bp_reg {
                RegularizationType::Control => {
                    let mut shifted = quu.clone();
                    for i in 0..layout.mm {
                        shifted[(i, i)] += rho;
                    }
                    (shifted, qux.clone())
                }
                RegularizationType::State => (
                    &quu + rho * (fdu.transpose() * fdu),
                    &qux + rho * (fdu.transpose() * fdx),
                ),
            };

            if chol.factorize(quu_reg.as_ref()).is_err() {
                restarts += 1;
                if store.reg.increase(options) {
                    return BackwardPass::RegularizationLimit;
                }
                continue 'restart;
            }

            gains_from_factorization(store, layout, &chol, &qu, &qux_reg, k);
            value_backup(store, &qx, &qu, &qxx, &quu, &qux, k, &mut dv);
        }

        store.reg.decrease(options);
        return BackwardPass::Success {
            dv,
            indefinite_restarts: restarts,
        };
    }
}

/// Square-root variant: the cost-to-go Hessian is carried as a lower
/// Cholesky factor and the action-value Hessians are assembled from
/// `W = L^T fd*` products. Algebraically identical to the standard pass.
fn square_root_pass(
    store: &mut TrajectoryStore,
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
    options: &SolverOptions,
    mode: &Mode,
) -> BackwardPass {
    let last = store.n_knots - 1;
    let mut chol = DenseCholesky::new();
    let mut restarts = 0;

    'restart: loop {
        let (s_mat, s_vec) = constraints::terminal_boundary(store, ocp);
        store.S[last] = s_mat;
        store.s[last] = s_vec;
        match cost_to_go_factor(&mut chol, &store.S[last], options) {
            Some(factor) => store.Su[last] = factor,
            None => {
                restarts += 1;
                if store.reg.increase(options) {
                    return BackwardPass::RegularizationLimit;
                }
                continue 'restart;
            }
        }

        let mut dv = (0.0, 0.0);

        for k in (0..last).rev() {
            let (lxx, luu, lux, lx, lu) = constraints::al_expansion(store, ocp, layout, options, k);
            let fdx = &store.fdx[k];
            let fdu = &store.fdu[k];

            let wx = store.Su[k + 1].transpose() * fdx;
            let wu = store.Su[k + 1].transpose() * fdu;

            let qx = &lx + fdx.transpose() * &store.s[k + 1];
            let qu = &lu + fdu.transpose() * &store.s[k + 1];
            let qxx = &lxx + wx.transpose() * &wx;
            let quu = &luu + wu.transpose() * &wu;
            let qux = &lux + wu.transpose() * &wx;

            let rho = store.reg.rho;
            let (quu_reg, qux_reg) = match mode.bp_reg {
                RegularizationType::Control => {
                    let mut shifted = quu.clone();
                    for i in 0..layout.mm {
                        shifted[(i, i)] += rho;
                    }
                    (shifted, qux.clone())
                }
                RegularizationType::State => (
                    &quu + rho * (fdu.transpose() * fdu),
                    &qux + rho * (fdu.transpose() * fdx),
                ),
            };

            if chol.factorize(quu_reg.as_ref()).is_err() {
                restarts += 1;
                if store.reg.increase(options) {
                    return BackwardPass::RegularizationLimit;
                }
                continue 'restart;
            }

            gains_from_factorization(store, layout, &chol, &qu, &qux_reg, k);
            value_backup(store, &qx, &qu, &qxx, &quu, &qux, k, &mut dv);

            match cost_to_go_factor(&mut chol, &store.S[k], options) {
                Some(factor) => store.Su[k] = factor,
                None => {
                    restarts += 1;
                    if store.reg.increase(options) {
                        return BackwardPass::RegularizationLimit;
                    }
                    continue 'restart;
                }
            }
        }

        store.reg.decrease(options);
        return BackwardPass::Success {
            dv,
            indefinite_restarts: restarts,
        };
    }
}

/// Solves for the feedforward `d` and feedback `K` in one factorized solve
/// over the stacked right-hand side `[Qu | Qux]`.
fn gains_from_factorization(
    store: &mut TrajectoryStore,
    layout: &ConstraintLayout,
    chol: &DenseCholesky,
    qu: &Col<E>,
    qux_reg: &Mat<E>,
    k: I,
) {
    let mut rhs = Mat::zeros(layout.mm, 1 + layout.n);
    for i in 0..layout.mm {
        rhs[(i, 0)] = qu[i];
        for j in 0..layout.n {
            rhs[(i, 1 + j)] = qux_reg[(i, j)];
        }
    }
    let sol = chol.solve(rhs.as_ref()).unwrap();
    for i in 0..layout.mm {
        store.d[k][i] = -sol[(i, 0)];
        for j in 0..layout.n {
            store.K[k][(i, j)] = -sol[(i, 1 + j)];
        }
    }
}

/// Backs up the quadratic value function through the affine policy using the
/// unregularized expansion, and accumulates the expected reduction.
#[allow(clippy::too_many_arguments)]
fn value_backup(
    store: &mut TrajectoryStore,
    qx: &Col<E>,
    qu: &Col<E>,
    qxx: &Mat<E>,
    quu: &Mat<E>,
    qux: &Mat<E>,
    k: I,
    dv: &mut (E, E),
) {
    let gain = &store.K[k];
    let d = &store.d[k];
    let quu_d = quu * d;

    store.s[k] = qx + gain.transpose() * &quu_d + gain.transpose() * qu + qux.transpose() * d;

    let mut s_mat =
        qxx + gain.transpose() * quu * gain + gain.transpose() * qux + qux.transpose() * gain;
    symmetrize(&mut s_mat);
    store.S[k] = s_mat;

    dv.0 += dot(d.as_ref(), qu.as_ref());
    dv.1 += 0.5 * dot(d.as_ref(), quu_d.as_ref());
}

/// Lower Cholesky factor of a cost-to-go Hessian, retrying once with a
/// minimal diagonal shift to absorb semidefinite boundaries.
fn cost_to_go_factor(
    chol: &mut DenseCholesky,
    s_mat: &Mat<E>,
    options: &SolverOptions,
) -> Option<Mat<E>> {
    if chol.factorize(s_mat.as_ref()).is_ok() {
        return chol.factor().ok();
    }
    let n = s_mat.nrows();
    let mut shifted = s_mat.clone();
    for i in 0..n {
        shifted[(i, i)] += options.bp_reg_min;
    }
    if chol.factorize(shifted.as_ref()).is_ok() {
        return chol.factor().ok();
    }
    None
}
