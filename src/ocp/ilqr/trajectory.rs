//! Per-knot solver state.
//!
//! All mutable state of a solve lives here, allocated once at dimensions
//! fixed by the mode descriptor. Components borrow the store mutably with
//! non-overlapping roles; candidate trajectories are separate allocations
//! promoted by swap on line-search acceptance, so `X`/`X_new` never alias.

use std::mem;

use faer::{Col, Mat};

use crate::options::{Mode, SolverOptions};
use crate::{E, I};

use super::regularization::Regularization;

#[allow(non_snake_case)]
pub struct TrajectoryStore {
    /// Number of knot points.
    pub(crate) n_knots: I,
    /// State dimension.
    pub(crate) n: I,
    /// Nominal control dimension.
    pub(crate) m: I,
    /// Control dimension including the sqrt(dt) input, excluding slacks.
    pub(crate) m_bar: I,
    /// Full augmented control dimension.
    pub(crate) mm: I,
    /// Stage constraint rows.
    pub(crate) p: I,
    /// Terminal constraint rows.
    pub(crate) p_term: I,
    pub(crate) minimum_time: bool,
    pub(crate) infeasible: bool,

    /// States, one per knot.
    pub(crate) X: Vec<Col<E>>,
    /// Controls (possibly augmented), one per stage.
    pub(crate) U: Vec<Col<E>>,
    /// Candidate states produced by the line search.
    pub(crate) X_new: Vec<Col<E>>,
    /// Candidate controls produced by the line search.
    pub(crate) U_new: Vec<Col<E>>,

    /// Feedback gains, one per stage.
    pub(crate) K: Vec<Mat<E>>,
    /// Feedforward terms, one per stage.
    pub(crate) d: Vec<Col<E>>,
    /// Cost-to-go Hessians, one per knot.
    pub(crate) S: Vec<Mat<E>>,
    /// Cost-to-go gradients, one per knot.
    pub(crate) s: Vec<Col<E>>,
    /// Upper Cholesky factors of the cost-to-go Hessians (square-root mode
    /// only; empty otherwise).
    pub(crate) Su: Vec<Mat<E>>,

    /// Stage constraint residuals.
    pub(crate) C: Vec<Col<E>>,
    /// Stage constraint residuals at the previous outer iteration.
    pub(crate) C_prev: Vec<Col<E>>,
    /// Stage constraint state Jacobians.
    pub(crate) Cx: Vec<Mat<E>>,
    /// Stage constraint control Jacobians.
    pub(crate) Cu: Vec<Mat<E>>,
    /// Terminal constraint residual.
    pub(crate) C_term: Col<E>,
    /// Terminal constraint residual at the previous outer iteration.
    pub(crate) C_term_prev: Col<E>,

    /// Stage Lagrange multipliers.
    pub(crate) lambda: Vec<Col<E>>,
    /// Terminal Lagrange multipliers.
    pub(crate) lambda_term: Col<E>,
    /// Stage penalty weights.
    pub(crate) mu: Vec<Col<E>>,
    /// Terminal penalty weights.
    pub(crate) mu_term: Col<E>,
    /// Active penalty diagonal: penalty weight on equality rows and active
    /// inequality rows, zero elsewhere.
    pub(crate) Imu: Vec<Col<E>>,
    pub(crate) Imu_term: Col<E>,

    /// Discrete dynamics state Jacobians.
    pub(crate) fdx: Vec<Mat<E>>,
    /// Discrete dynamics control Jacobians (augmented width).
    pub(crate) fdu: Vec<Mat<E>>,

    pub(crate) reg: Regularization,
}

impl TrajectoryStore {
    pub fn new(mode: &Mode, p: I, p_term: I, n_knots: I, base_dt: E, options: &SolverOptions) -> Self {
        let (n, m, m_bar, mm) = (mode.n, mode.m, mode.m_bar, mode.mm);
        let stages = n_knots - 1;

        let mut control = Col::zeros(mm);
        if mode.minimum_time {
            control[m_bar - 1] = base_dt.sqrt();
        }

        Self {
            n_knots,
            n,
            m,
            m_bar,
            mm,
            p,
            p_term,
            minimum_time: mode.minimum_time,
            infeasible: mode.infeasible,

            X: vec![Col::zeros(n); n_knots],
            U: vec![control.clone(); stages],
            X_new: vec![Col::zeros(n); n_knots],
            U_new: vec![control; stages],

            K: vec![Mat::zeros(mm, n); stages],
            d: vec![Col::zeros(mm); stages],
            S: vec![Mat::zeros(n, n); n_knots],
            s: vec![Col::zeros(n); n_knots],
            Su: if mode.square_root {
                vec![Mat::zeros(n, n); n_knots]
            } else {
                Vec::new()
            },

            C: vec![Col::zeros(p); stages],
            C_prev: vec![Col::zeros(p); stages],
            Cx: vec![Mat::zeros(p, n); stages],
            Cu: vec![Mat::zeros(p, mm); stages],
            C_term: Col::zeros(p_term),
            C_term_prev: Col::zeros(p_term),

            lambda: vec![Col::zeros(p); stages],
            lambda_term: Col::zeros(p_term),
            mu: vec![Col::from_fn(p, |_| options.penalty_initial); stages],
            mu_term: Col::from_fn(p_term, |_| options.penalty_initial),
            Imu: vec![Col::zeros(p); stages],
            Imu_term: Col::zeros(p_term),

            fdx: vec![Mat::zeros(n, n); stages],
            fdu: vec![Mat::zeros(n, mm); stages],

            reg: Regularization::new(options.bp_reg_initial),
        }
    }

    /// Number of stages (knots owning a control).
    pub fn stages(&self) -> I {
        self.n_knots - 1
    }

    /// Per-stage time step: the square of the sqrt(dt) control in
    /// minimum-time mode, the nominal step otherwise.
    pub fn time_step(&self, k: I, base_dt: E) -> E {
        if self.minimum_time {
            let tau = self.U[k][self.m_bar - 1];
            tau * tau
        } else {
            base_dt
        }
    }

    /// Commits the candidate trajectories by swapping them into place.
    pub fn promote(&mut self) {
        mem::swap(&mut self.X, &mut self.X_new);
        mem::swap(&mut self.U, &mut self.U_new);
    }

    /// Copies the current constraint values into the previous-iteration
    /// buffers used by the per-constraint penalty update.
    pub fn snapshot_constraints(&mut self) {
        for k in 0..self.stages() {
            self.C_prev[k] = self.C[k].clone();
        }
        self.C_term_prev = self.C_term.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocp::Discretization;
    use crate::options::{PenaltyUpdateType, RegularizationType};

    fn test_mode() -> Mode {
        Mode {
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
        }
    }

    #[test]
    fn promote_swaps_without_aliasing() {
        let options = SolverOptions::default();
        let mut store = TrajectoryStore::new(&test_mode(), 1, 2, 3, 0.1, &options);

        store.X_new[0][0] = 7.0;
        store.U_new[0][0] = -3.0;
        store.promote();

        assert_eq!(store.X[0][0], 7.0);
        assert_eq!(store.U[0][0], -3.0);
        assert_eq!(store.X_new[0][0], 0.0);

        store.X_new[0][0] = 1.0;
        assert_eq!(store.X[0][0], 7.0);
    }

    #[test]
    fn penalties_start_at_initial_value() {
        let mut options = SolverOptions::default();
        options.penalty_initial = 2.5;
        let store = TrajectoryStore::new(&test_mode(), 3, 2, 4, 0.1, &options);
        for k in 0..store.stages() {
            for i in 0..3 {
                assert_eq!(store.mu[k][i], 2.5);
            }
        }
        assert_eq!(store.mu_term[1], 2.5);
    }

    #[test]
    fn minimum_time_seeds_sqrt_dt_control() {
        let options = SolverOptions::default();
        let mut mode = test_mode();
        mode.minimum_time = true;
        mode.m_bar = 2;
        mode.mm = 2;
        let store = TrajectoryStore::new(&mode, 1, 0, 3, 0.25, &options);
        assert_eq!(store.U[0][1], 0.5);
        assert_eq!(store.time_step(0, 0.25), 0.25);
    }
}
