//! Stacked constraint assembly and the augmented Lagrangian cost.
//!
//! Every stage carries one residual vector `c` with a fixed row order:
//! user inequalities, control upper bounds, control lower bounds, state upper
//! bounds, state lower bounds, user equalities, the minimum-time coupling
//! row, and the infeasible-slack rows. Bounds contribute one row per finite
//! bound entry, so `c` never carries infinities. The augmented Lagrangian
//! stage cost `l + lambda^T c + 1/2 c^T Imu c` replaces the raw stage cost in
//! every downstream expansion; second derivatives of `c` are dropped
//! (Gauss-Newton).

use faer::{Col, Mat};

use crate::linalg::vector_ops::head;
use crate::ocp::OptimalControlProblem;
use crate::options::{Mode, SolverOptions};
use crate::{E, I};

use super::trajectory::TrajectoryStore;

/// One finite bound entry: the component it constrains and its value.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BoundRow {
    pub index: I,
    pub bound: E,
}

/// Row bookkeeping for the stacked stage constraint vector.
pub(crate) struct ConstraintLayout {
    pub n: I,
    pub m: I,
    pub m_bar: I,
    pub mm: I,

    pub n_user_ineq: I,
    pub n_user_eq: I,
    pub control_upper: Vec<BoundRow>,
    pub control_lower: Vec<BoundRow>,
    pub state_upper: Vec<BoundRow>,
    pub state_lower: Vec<BoundRow>,

    pub off_control_upper: I,
    pub off_control_lower: I,
    pub off_state_upper: I,
    pub off_state_lower: I,
    pub off_user_eq: I,
    pub min_time_row: Option<I>,
    pub slack_offset: Option<I>,

    pub p: I,
    pub p_ineq: I,
    pub p_eq: I,
    pub p_term: I,
}

impl ConstraintLayout {
    pub fn new(ocp: &OptimalControlProblem, mode: &Mode, options: &SolverOptions) -> Self {
        let (n, m, m_bar, mm) = (mode.n, mode.m, mode.m_bar, mode.mm);

        let (n_user_ineq, n_user_eq) = match ocp.user_constraint() {
            Some(user) => (user.inequality_count(), user.equality_count()),
            None => (0, 0),
        };

        // Effective control bounds over the m_bar components: the user's
        // bounds on the nominal controls plus the time-step box on tau.
        let mut control_upper = Vec::new();
        let mut control_lower = Vec::new();
        if let Some(u_max) = ocp.control_upper() {
            for i in 0..m {
                if u_max[i].is_finite() {
                    control_upper.push(BoundRow {
                        index: i,
                        bound: u_max[i],
                    });
                }
            }
        }
        if let Some(u_min) = ocp.control_lower() {
            for i in 0..m {
                if u_min[i].is_finite() {
                    control_lower.push(BoundRow {
                        index: i,
                        bound: u_min[i],
                    });
                }
            }
        }
        if mode.minimum_time {
            control_upper.push(BoundRow {
                index: m_bar - 1,
                bound: options.max_time_step.sqrt(),
            });
            control_lower.push(BoundRow {
                index: m_bar - 1,
                bound: options.min_time_step.sqrt(),
            });
        }

        let mut state_upper = Vec::new();
        let mut state_lower = Vec::new();
        if let Some(x_max) = ocp.state_upper() {
            for i in 0..n {
                if x_max[i].is_finite() {
                    state_upper.push(BoundRow {
                        index: i,
                        bound: x_max[i],
                    });
                }
            }
        }
        if let Some(x_min) = ocp.state_lower() {
            for i in 0..n {
                if x_min[i].is_finite() {
                    state_lower.push(BoundRow {
                        index: i,
                        bound: x_min[i],
                    });
                }
            }
        }

        let off_control_upper = n_user_ineq;
        let off_control_lower = off_control_upper + control_upper.len();
        let off_state_upper = off_control_lower + control_lower.len();
        let off_state_lower = off_state_upper + state_upper.len();
        let p_ineq = off_state_lower + state_lower.len();

        let off_user_eq = p_ineq;
        let mut next = off_user_eq + n_user_eq;
        let min_time_row = if mode.minimum_time {
            let row = next;
            next += 1;
            Some(row)
        } else {
            None
        };
        let slack_offset = if mode.infeasible {
            let row = next;
            next += n;
            Some(row)
        } else {
            None
        };

        let p = next;
        let p_eq = p - p_ineq;
        let p_term = if ocp.has_goal_constraint() { n } else { 0 };

        Self {
            n,
            m,
            m_bar,
            mm,
            n_user_ineq,
            n_user_eq,
            control_upper,
            control_lower,
            state_upper,
            state_lower,
            off_control_upper,
            off_control_lower,
            off_state_upper,
            off_state_lower,
            off_user_eq,
            min_time_row,
            slack_offset,
            p,
            p_ineq,
            p_eq,
            p_term,
        }
    }

    /// Clamps the bounded control components of `u` into their box. Slacks
    /// are never bounded and pass through untouched.
    pub fn clamp_controls(&self, u: &mut Col<E>) {
        for row in &self.control_upper {
            if u[row.index] > row.bound {
                u[row.index] = row.bound;
            }
        }
        for row in &self.control_lower {
            if u[row.index] < row.bound {
                u[row.index] = row.bound;
            }
        }
    }
}

/// Evaluates the stacked stage residual at `(x, u)` into `out`.
///
/// `tau_prev` is the sqrt(dt) control of the previous stage; the coupling row
/// is identically zero at the first stage so `p` stays uniform.
pub(crate) fn stage_residual(
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
    x: &Col<E>,
    u: &Col<E>,
    tau_prev: Option<E>,
    out: &mut Col<E>,
) {
    if layout.n_user_ineq + layout.n_user_eq > 0 {
        let user = ocp.user_constraint().expect("layout carries user rows");
        let u_nom = head(u, layout.m);
        let c_user = user.evaluate(x, &u_nom);
        for i in 0..layout.n_user_ineq {
            out[i] = c_user[i];
        }
        for i in 0..layout.n_user_eq {
            out[layout.off_user_eq + i] = c_user[layout.n_user_ineq + i];
        }
    }

    for (offset, row) in layout
        .control_upper
        .iter()
        .enumerate()
        .map(|(i, r)| (layout.off_control_upper + i, r))
    {
        out[offset] = u[row.index] - row.bound;
    }
    for (offset, row) in layout
        .control_lower
        .iter()
        .enumerate()
        .map(|(i, r)| (layout.off_control_lower + i, r))
    {
        out[offset] = row.bound - u[row.index];
    }
    for (offset, row) in layout
        .state_upper
        .iter()
        .enumerate()
        .map(|(i, r)| (layout.off_state_upper + i, r))
    {
        out[offset] = x[row.index] - row.bound;
    }
    for (offset, row) in layout
        .state_lower
        .iter()
        .enumerate()
        .map(|(i, r)| (layout.off_state_lower + i, r))
    {
        out[offset] = row.bound - x[row.index];
    }

    if let Some(row) = layout.min_time_row {
        out[row] = match tau_prev {
            Some(tau_prev) => u[layout.m_bar - 1] - tau_prev,
            None => 0.0,
        };
    }
    if let Some(offset) = layout.slack_offset {
        for i in 0..layout.n {
            out[offset + i] = u[layout.m_bar + i];
        }
    }
}

/// Assembles the stage constraint Jacobians at `(x, u)`.
///
/// Bound and slack rows are signed unit rows; the minimum-time coupling row
/// treats the previous stage's tau as a constant.
pub(crate) fn stage_jacobians(
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
    x: &Col<E>,
    u: &Col<E>,
    first_stage: bool,
    cx: &mut Mat<E>,
    cu: &mut Mat<E>,
) {
    cx.as_mut().fill(0.0);
    cu.as_mut().fill(0.0);

    if layout.n_user_ineq + layout.n_user_eq > 0 {
        let user = ocp.user_constraint().expect("layout carries user rows");
        let u_nom = head(u, layout.m);
        let jx = user.state_jacobian(x, &u_nom);
        let ju = user.control_jacobian(x, &u_nom);
        for (local, row) in (0..layout.n_user_ineq)
            .map(|i| (i, i))
            .chain((0..layout.n_user_eq).map(|i| (layout.n_user_ineq + i, layout.off_user_eq + i)))
        {
            for j in 0..layout.n {
                cx[(row, j)] = jx[(local, j)];
            }
            for j in 0..layout.m {
                cu[(row, j)] = ju[(local, j)];
            }
        }
    }

    for (i, row) in layout.control_upper.iter().enumerate() {
        cu[(layout.off_control_upper + i, row.index)] = 1.0;
    }
    for (i, row) in layout.control_lower.iter().enumerate() {
        cu[(layout.off_control_lower + i, row.index)] = -1.0;
    }
    for (i, row) in layout.state_upper.iter().enumerate() {
        cx[(layout.off_state_upper + i, row.index)] = 1.0;
    }
    for (i, row) in layout.state_lower.iter().enumerate() {
        cx[(layout.off_state_lower + i, row.index)] = -1.0;
    }

    if let Some(row) = layout.min_time_row {
        if !first_stage {
            cu[(row, layout.m_bar - 1)] = 1.0;
        }
    }
    if let Some(offset) = layout.slack_offset {
        for i in 0..layout.n {
            cu[(offset + i, layout.m_bar + i)] = 1.0;
        }
    }
}

/// Re-evaluates every stage residual and the terminal residual at the
/// committed trajectory.
pub(crate) fn update_residuals(
    store: &mut TrajectoryStore,
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
) {
    let stages = store.stages();
    let minimum_time = store.minimum_time;
    let m_bar = store.m_bar;
    let TrajectoryStore { X, U, C, .. } = store;
    for k in 0..stages {
        let tau_prev = (minimum_time && k > 0).then(|| U[k - 1][m_bar - 1]);
        stage_residual(ocp, layout, &X[k], &U[k], tau_prev, &mut C[k]);
    }
    if layout.p_term > 0 {
        store.C_term = &store.X[store.n_knots - 1] - ocp.cost().goal();
    }
}

/// Re-assembles every stage constraint Jacobian at the committed trajectory.
/// The terminal Jacobian is the identity and is never materialized.
pub(crate) fn update_jacobians(
    store: &mut TrajectoryStore,
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
) {
    let stages = store.stages();
    let TrajectoryStore { X, U, Cx, Cu, .. } = store;
    for k in 0..stages {
        stage_jacobians(ocp, layout, &X[k], &U[k], k == 0, &mut Cx[k], &mut Cu[k]);
    }
}

/// Rebuilds the active-penalty diagonal. An inequality row is active iff its
/// residual is violated or its multiplier is positive; equality rows are
/// always active.
pub(crate) fn update_active_set(store: &mut TrajectoryStore, layout: &ConstraintLayout) {
    for k in 0..store.stages() {
        for i in 0..layout.p {
            let active = i >= layout.p_ineq || store.C[k][i] > 0.0 || store.lambda[k][i] > 0.0;
            store.Imu[k][i] = if active { store.mu[k][i] } else { 0.0 };
        }
    }
    for i in 0..layout.p_term {
        store.Imu_term[i] = store.mu_term[i];
    }
}

/// Augmented Lagrangian contribution of one stage residual, with the active
/// set determined on the fly from `(c, lambda)`.
pub(crate) fn al_stage_cost(c: &Col<E>, lambda: &Col<E>, mu: &Col<E>, p_ineq: I) -> E {
    let mut cost = 0.0;
    for i in 0..c.nrows() {
        let active = i >= p_ineq || c[i] > 0.0 || lambda[i] > 0.0;
        cost += lambda[i] * c[i];
        if active {
            cost += 0.5 * mu[i] * c[i] * c[i];
        }
    }
    cost
}

/// Objective contribution of one stage, including the time and slack costs
/// of the augmented control components.
pub(crate) fn stage_objective(
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
    options: &SolverOptions,
    x: &Col<E>,
    u: &Col<E>,
) -> E {
    let u_nom = head(u, layout.m);
    let mut cost = ocp.cost().stage(x, &u_nom);
    if layout.min_time_row.is_some() {
        let tau = u[layout.m_bar - 1];
        cost += options.min_time_regularization * tau * tau;
    }
    if layout.slack_offset.is_some() {
        for i in 0..layout.n {
            let s = u[layout.m_bar + i];
            cost += 0.5 * options.infeasible_regularization * s * s;
        }
    }
    cost
}

/// Total objective of a trajectory, without the augmented Lagrangian terms.
pub(crate) fn objective_cost(
    store: &TrajectoryStore,
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
    options: &SolverOptions,
) -> E {
    let mut cost = 0.0;
    for k in 0..store.stages() {
        cost += stage_objective(ocp, layout, options, &store.X[k], &store.U[k]);
    }
    cost + ocp.cost().terminal(&store.X[store.n_knots - 1])
}

/// Total augmented cost of the committed (`candidate = false`) or candidate
/// (`candidate = true`) trajectory, with multipliers and penalties taken from
/// the store.
pub(crate) fn total_cost(
    store: &TrajectoryStore,
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
    options: &SolverOptions,
    candidate: bool,
) -> E {
    let (xs, us) = if candidate {
        (&store.X_new, &store.U_new)
    } else {
        (&store.X, &store.U)
    };

    let mut scratch = Col::zeros(layout.p);
    let mut cost = 0.0;
    for k in 0..store.stages() {
        cost += stage_objective(ocp, layout, options, &xs[k], &us[k]);
        if layout.p > 0 {
            let tau_prev = (store.minimum_time && k > 0).then(|| us[k - 1][store.m_bar - 1]);
            stage_residual(ocp, layout, &xs[k], &us[k], tau_prev, &mut scratch);
            cost += al_stage_cost(&scratch, &store.lambda[k], &store.mu[k], layout.p_ineq);
        }
    }

    let x_term = &xs[store.n_knots - 1];
    cost += ocp.cost().terminal(x_term);
    if layout.p_term > 0 {
        let c_term = x_term - ocp.cost().goal();
        // Terminal rows are equalities and always active.
        cost += al_stage_cost(&c_term, &store.lambda_term, &store.mu_term, 0);
    }
    cost
}

/// Quadratic expansion of the augmented stage cost at the committed knot
/// `(X[k], U[k])`, in augmented control dimensions.
///
/// Returns `(lxx, luu, lux, lx, lu)`. The constraint contribution is the
/// Gauss-Newton chain rule through the stored Jacobians and active set.
#[allow(clippy::type_complexity)]
pub(crate) fn al_expansion(
    store: &TrajectoryStore,
    ocp: &OptimalControlProblem,
    layout: &ConstraintLayout,
    options: &SolverOptions,
    k: I,
) -> (Mat<E>, Mat<E>, Mat<E>, Col<E>, Col<E>) {
    let x = &store.X[k];
    let u = &store.U[k];
    let u_nom = head(u, layout.m);
    let cost = ocp.cost();

    let mut lxx = cost.state_hessian().clone();
    let mut lx = cost.state_gradient(x, &u_nom);

    let mut luu = Mat::zeros(layout.mm, layout.mm);
    let mut lu = Col::zeros(layout.mm);
    let mut lux = Mat::zeros(layout.mm, layout.n);

    let r = cost.control_hessian();
    let gu = cost.control_gradient(x, &u_nom);
    for i in 0..layout.m {
        lu[i] = gu[i];
        for j in 0..layout.m {
            luu[(i, j)] = r[(i, j)];
        }
    }
    if let Some(h) = cost.cross_term() {
        for i in 0..layout.m {
            for j in 0..layout.n {
                lux[(i, j)] = h[(i, j)];
            }
        }
    }
    if layout.min_time_row.is_some() {
        let tau_index = layout.m_bar - 1;
        lu[tau_index] = 2.0 * options.min_time_regularization * u[tau_index];
        luu[(tau_index, tau_index)] = 2.0 * options.min_time_regularization;
    }
    if layout.slack_offset.is_some() {
        for i in 0..layout.n {
            let slack_index = layout.m_bar + i;
            lu[slack_index] = options.infeasible_regularization * u[slack_index];
            luu[(slack_index, slack_index)] = options.infeasible_regularization;
        }
    }

    if layout.p > 0 {
        let c = &store.C[k];
        let cx = &store.Cx[k];
        let cu = &store.Cu[k];
        let imu = &store.Imu[k];

        // lambda + Imu * c, and the row-scaled Jacobians Imu * Cx, Imu * Cu.
        let lam_c = Col::from_fn(layout.p, |i| store.lambda[k][i] + imu[i] * c[i]);
        let imu_cx = Mat::from_fn(layout.p, layout.n, |i, j| imu[i] * cx[(i, j)]);
        let imu_cu = Mat::from_fn(layout.p, layout.mm, |i, j| imu[i] * cu[(i, j)]);

        lx += cx.transpose() * &lam_c;
        lu += cu.transpose() * &lam_c;
        lxx += cx.transpose() * &imu_cx;
        luu += cu.transpose() * &imu_cu;
        lux += cu.transpose() * &imu_cx;
    }

    (lxx, luu, lux, lx, lu)
}

/// Boundary condition of the backward pass: the terminal cost expansion plus
/// the terminal constraint augmentation (the terminal Jacobian is the
/// identity).
pub(crate) fn terminal_boundary(
    store: &TrajectoryStore,
    ocp: &OptimalControlProblem,
) -> (Mat<E>, Col<E>) {
    let x_term = &store.X[store.n_knots - 1];
    let cost = ocp.cost();

    let mut s_mat = cost.terminal_hessian().clone();
    let mut s_vec = cost.terminal_gradient(x_term);

    for i in 0..store.p_term {
        s_mat[(i, i)] += store.Imu_term[i];
        s_vec[i] += store.lambda_term[i] + store.Imu_term[i] * store.C_term[i];
    }

    (s_mat, s_vec)
}

/// Maximum constraint violation over the trajectory: positive part of
/// inequality rows, magnitude of equality and terminal rows.
pub(crate) fn max_violation(store: &TrajectoryStore, layout: &ConstraintLayout) -> E {
    let mut v: E = 0.0;
    for k in 0..store.stages() {
        for i in 0..layout.p {
            let vi = if i < layout.p_ineq {
                E::max(store.C[k][i], 0.0)
            } else {
                store.C[k][i].abs()
            };
            v = E::max(v, vi);
        }
    }
    for i in 0..layout.p_term {
        v = E::max(v, store.C_term[i].abs());
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocp::{DynamicsModel, QuadraticCost, UserConstraint};
    use faer::Mat;

    fn double_integrator_problem() -> OptimalControlProblem {
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
        OptimalControlProblem::new(dynamics, cost, Col::from_fn(2, |_| 1.0), 11, 0.1)
    }

    fn bounded_problem() -> OptimalControlProblem {
        double_integrator_problem()
            .with_control_bounds(Col::from_fn(1, |_| -2.0), Col::from_fn(1, |_| 2.0))
            .with_state_bounds(
                Col::from_fn(2, |i| if i == 0 { -10.0 } else { E::NEG_INFINITY }),
                Col::from_fn(2, |_| E::INFINITY),
            )
            .with_user_constraint(UserConstraint::new(
                1,
                1,
                |x, u| Col::from_fn(2, |i| if i == 0 { x[0] - 5.0 } else { u[0] - 1.0 }),
                |_x, _u| Mat::from_fn(2, 2, |i, j| if i == 0 && j == 0 { 1.0 } else { 0.0 }),
                |_x, _u| Mat::from_fn(2, 1, |i, _| if i == 1 { 1.0 } else { 0.0 }),
            ))
            .with_goal_constraint()
    }

    fn bounded_layout(ocp: &OptimalControlProblem) -> ConstraintLayout {
        let options = SolverOptions::default();
        let mode = Mode::build(ocp, &options, false).unwrap();
        ConstraintLayout::new(ocp, &mode, &options)
    }

    #[test]
    fn layout_orders_rows_and_skips_infinite_bounds() {
        let ocp = bounded_problem();
        let layout = bounded_layout(&ocp);

        // 1 user ineq, 1 control upper, 1 control lower, 1 finite state lower.
        assert_eq!(layout.n_user_ineq, 1);
        assert_eq!(layout.off_control_upper, 1);
        assert_eq!(layout.off_control_lower, 2);
        assert_eq!(layout.state_upper.len(), 0);
        assert_eq!(layout.state_lower.len(), 1);
        assert_eq!(layout.p_ineq, 4);
        assert_eq!(layout.n_user_eq, 1);
        assert_eq!(layout.p, 5);
        assert_eq!(layout.p_term, 2);
    }

    #[test]
    fn residual_signs_match_bound_convention() {
        let ocp = bounded_problem();
        let layout = bounded_layout(&ocp);

        let x = Col::from_fn(2, |i| if i == 0 { -11.0 } else { 0.0 });
        let u = Col::from_fn(1, |_| 3.0);
        let mut c = Col::zeros(layout.p);
        stage_residual(&ocp, &layout, &x, &u, None, &mut c);

        assert_eq!(c[0], -16.0); // user: x0 - 5
        assert_eq!(c[1], 1.0); // u - u_max
        assert_eq!(c[2], -5.0); // u_min - u
        assert_eq!(c[3], 1.0); // x_min - x0
        assert_eq!(c[4], 2.0); // user equality: u - 1
    }

    #[test]
    fn jacobians_are_signed_unit_rows() {
        let ocp = bounded_problem();
        let layout = bounded_layout(&ocp);

        let x = Col::zeros(2);
        let u = Col::zeros(1);
        let mut cx = Mat::zeros(layout.p, 2);
        let mut cu = Mat::zeros(layout.p, 1);
        stage_jacobians(&ocp, &layout, &x, &u, false, &mut cx, &mut cu);

        assert_eq!(cu[(1, 0)], 1.0);
        assert_eq!(cu[(2, 0)], -1.0);
        assert_eq!(cx[(3, 0)], -1.0);
        assert_eq!(cx[(0, 0)], 1.0); // user inequality row
        assert_eq!(cu[(4, 0)], 1.0); // user equality row
    }

    #[test]
    fn active_set_follows_violation_and_multiplier() {
        let ocp = bounded_problem();
        let layout = bounded_layout(&ocp);
        let options = SolverOptions::default();
        let mode = Mode::build(&ocp, &options, false).unwrap();
        let mut store = TrajectoryStore::new(&mode, layout.p, layout.p_term, 11, 0.1, &options);

        store.C[0][1] = 0.5; // violated inequality
        store.C[0][2] = -0.5; // satisfied inequality
        store.lambda[0][3] = 1.0; // satisfied but multiplier positive
        update_active_set(&mut store, &layout);

        assert_eq!(store.Imu[0][1], options.penalty_initial);
        assert_eq!(store.Imu[0][2], 0.0);
        assert_eq!(store.Imu[0][3], options.penalty_initial);
        // Equality row always active.
        assert_eq!(store.Imu[0][4], options.penalty_initial);
        assert_eq!(store.Imu_term[0], options.penalty_initial);
    }

    #[test]
    fn al_cost_ignores_inactive_inequalities() {
        let c = Col::from_fn(2, |i| if i == 0 { -1.0 } else { 2.0 });
        let lambda = Col::zeros(2);
        let mu = Col::from_fn(2, |_| 10.0);

        // Row 0 inactive (satisfied, zero multiplier): only row 1 penalized.
        assert_eq!(al_stage_cost(&c, &lambda, &mu, 2), 0.5 * 10.0 * 4.0);
        // As equalities both rows are penalized.
        assert_eq!(al_stage_cost(&c, &lambda, &mu, 0), 0.5 * 10.0 * 5.0);
    }

    #[test]
    fn clamp_only_touches_bounded_components() {
        let ocp = bounded_problem();
        let layout = bounded_layout(&ocp);
        let mut u = Col::from_fn(1, |_| 5.0);
        layout.clamp_controls(&mut u);
        assert_eq!(u[0], 2.0);
        u[0] = -7.0;
        layout.clamp_controls(&mut u);
        assert_eq!(u[0], -2.0);
    }
}
