//! Optimal control problem definition.
//!
//! A problem is a discrete-time dynamics oracle, a quadratic cost, an initial
//! state, and optional path constraints over a fixed horizon:
//!
//! ```text
//!   min   sum_k l(x_k, u_k) + l_f(x_N)
//!   s.t.  x_{k+1} = f(x_k, u_k, dt)
//!         u_min <= u_k <= u_max
//!         x_min <= x_k <= x_max
//!         c_user(x_k, u_k) {<=, =} 0
//!         x_N = x_f                    (optional goal constraint)
//! ```
//!
//! Dynamics and user constraints are supplied as callable oracles with their
//! Jacobians; the solver never differentiates anything itself.

pub mod ilqr;

use faer::{Col, Mat};
use problemo::Problem;

use crate::options::SolverOptions;
use crate::{E, I, Solver};

/// Discretization carried by a dynamics model.
///
/// The solver consumes the zero-order-hold Jacobian pair; a first-order-hold
/// model additionally exposes the next-control Jacobian and a midpoint-state
/// accessor through [`DynamicsModel::next_control_jacobian`] and
/// [`DynamicsModel::midpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Discretization {
    /// Zero-order hold: the control is constant over each step.
    #[default]
    Zoh,
    /// First-order hold: the control is interpolated between knot points.
    Foh,
}

type DynamicsEval = Box<dyn Fn(&Col<E>, &Col<E>, E) -> Col<E>>;
type DynamicsJacobian = Box<dyn Fn(&Col<E>, &Col<E>, E) -> Mat<E>>;
type TimeStepJacobian = Box<dyn Fn(&Col<E>, &Col<E>, E) -> Col<E>>;

/// Discrete dynamics oracle.
///
/// Evaluates `x' = f(x, u, dt)` and its Jacobians at a point. All closures
/// are pure; the solver may call them in any order and any number of times.
pub struct DynamicsModel {
    /// State dimension.
    n: I,
    /// Control dimension.
    m: I,
    /// Discrete dynamics `f(x, u, dt) -> x'`.
    f: DynamicsEval,
    /// State Jacobian `df/dx`.
    fx: DynamicsJacobian,
    /// Control Jacobian `df/du`.
    fu: DynamicsJacobian,
    /// Next-control Jacobian `df/du_{k+1}` (first-order hold only).
    fv: Option<DynamicsJacobian>,
    /// Midpoint-state accessor (first-order hold only).
    xm: Option<DynamicsEval>,
    /// Time-step Jacobian `df/ddt` (required for minimum-time solves).
    fdt: Option<TimeStepJacobian>,
    discretization: Discretization,
}

impl DynamicsModel {
    /// Creates a zero-order-hold dynamics model from its component functions.
    pub fn new(
        n: I,
        m: I,
        f: impl Fn(&Col<E>, &Col<E>, E) -> Col<E> + 'static,
        fx: impl Fn(&Col<E>, &Col<E>, E) -> Mat<E> + 'static,
        fu: impl Fn(&Col<E>, &Col<E>, E) -> Mat<E> + 'static,
    ) -> Self {
        Self {
            n,
            m,
            f: Box::new(f),
            fx: Box::new(fx),
            fu: Box::new(fu),
            fv: None,
            xm: None,
            fdt: None,
            discretization: Discretization::Zoh,
        }
    }

    /// Attaches the time-step Jacobian `df/ddt`, enabling minimum-time
    /// solves.
    pub fn with_time_step_jacobian(
        mut self,
        fdt: impl Fn(&Col<E>, &Col<E>, E) -> Col<E> + 'static,
    ) -> Self {
        self.fdt = Some(Box::new(fdt));
        self
    }

    /// Marks the model as first-order hold and attaches the next-control
    /// Jacobian and midpoint accessor.
    pub fn with_first_order_hold(
        mut self,
        fv: impl Fn(&Col<E>, &Col<E>, E) -> Mat<E> + 'static,
        xm: impl Fn(&Col<E>, &Col<E>, E) -> Col<E> + 'static,
    ) -> Self {
        self.fv = Some(Box::new(fv));
        self.xm = Some(Box::new(xm));
        self.discretization = Discretization::Foh;
        self
    }

    pub fn state_dim(&self) -> I {
        self.n
    }

    pub fn control_dim(&self) -> I {
        self.m
    }

    pub fn discretization(&self) -> Discretization {
        self.discretization
    }

    pub fn has_time_step_jacobian(&self) -> bool {
        self.fdt.is_some()
    }

    pub fn evaluate(&self, x: &Col<E>, u: &Col<E>, dt: E) -> Col<E> {
        (self.f)(x, u, dt)
    }

    pub fn state_jacobian(&self, x: &Col<E>, u: &Col<E>, dt: E) -> Mat<E> {
        (self.fx)(x, u, dt)
    }

    pub fn control_jacobian(&self, x: &Col<E>, u: &Col<E>, dt: E) -> Mat<E> {
        (self.fu)(x, u, dt)
    }

    pub fn next_control_jacobian(&self, x: &Col<E>, u: &Col<E>, dt: E) -> Option<Mat<E>> {
        self.fv.as_ref().map(|fv| (fv)(x, u, dt))
    }

    pub fn midpoint(&self, x: &Col<E>, u: &Col<E>, dt: E) -> Option<Col<E>> {
        self.xm.as_ref().map(|xm| (xm)(x, u, dt))
    }

    pub fn time_step_jacobian(&self, x: &Col<E>, u: &Col<E>, dt: E) -> Option<Col<E>> {
        self.fdt.as_ref().map(|fdt| (fdt)(x, u, dt))
    }
}

/// Quadratic stage and terminal cost
/// `l(x, u) = 1/2 (x - x_f)^T Q (x - x_f) + 1/2 u^T R u [+ u^T H (x - x_f)]`,
/// `l_f(x) = 1/2 (x - x_f)^T Qf (x - x_f)`.
#[allow(non_snake_case)]
pub struct QuadraticCost {
    Q: Mat<E>,
    R: Mat<E>,
    Qf: Mat<E>,
    xf: Col<E>,
    H: Option<Mat<E>>,
}

#[allow(non_snake_case)]
impl QuadraticCost {
    pub fn new(Q: Mat<E>, R: Mat<E>, Qf: Mat<E>, xf: Col<E>) -> Self {
        Self {
            Q,
            R,
            Qf,
            xf,
            H: None,
        }
    }

    /// Adds the cross term `u^T H (x - x_f)` with `H` of shape `m x n`.
    pub fn with_cross_term(mut self, H: Mat<E>) -> Self {
        self.H = Some(H);
        self
    }

    pub fn stage(&self, x: &Col<E>, u: &Col<E>) -> E {
        let dx = x - &self.xf;
        let mut cost = 0.5 * (dx.transpose() * &self.Q * &dx) + 0.5 * (u.transpose() * &self.R * u);
        if let Some(H) = &self.H {
            cost += u.transpose() * H * &dx;
        }
        cost
    }

    pub fn terminal(&self, x: &Col<E>) -> E {
        let dx = x - &self.xf;
        0.5 * (dx.transpose() * &self.Qf * &dx)
    }

    /// Stage-cost gradient with respect to the state.
    pub fn state_gradient(&self, x: &Col<E>, u: &Col<E>) -> Col<E> {
        let dx = x - &self.xf;
        let mut g = &self.Q * &dx;
        if let Some(H) = &self.H {
            g += H.transpose() * u;
        }
        g
    }

    /// Stage-cost gradient with respect to the control.
    pub fn control_gradient(&self, x: &Col<E>, u: &Col<E>) -> Col<E> {
        let mut g = &self.R * u;
        if let Some(H) = &self.H {
            g += H * &(x - &self.xf);
        }
        g
    }

    pub fn terminal_gradient(&self, x: &Col<E>) -> Col<E> {
        &self.Qf * &(x - &self.xf)
    }

    pub fn state_hessian(&self) -> &Mat<E> {
        &self.Q
    }

    pub fn control_hessian(&self) -> &Mat<E> {
        &self.R
    }

    pub fn terminal_hessian(&self) -> &Mat<E> {
        &self.Qf
    }

    pub fn cross_term(&self) -> Option<&Mat<E>> {
        self.H.as_ref()
    }

    pub fn goal(&self) -> &Col<E> {
        &self.xf
    }
}

type ConstraintEval = Box<dyn Fn(&Col<E>, &Col<E>) -> Col<E>>;
type ConstraintJacobian = Box<dyn Fn(&Col<E>, &Col<E>) -> Mat<E>>;

/// User-supplied path constraint oracle `c(x, u)` with Jacobians.
///
/// The first `p_ineq` rows are inequalities (`c <= 0`), the remaining `p_eq`
/// rows are equalities (`c = 0`). Jacobians are with respect to the nominal
/// state and control dimensions.
pub struct UserConstraint {
    p_ineq: I,
    p_eq: I,
    c: ConstraintEval,
    cx: ConstraintJacobian,
    cu: ConstraintJacobian,
}

impl UserConstraint {
    pub fn new(
        p_ineq: I,
        p_eq: I,
        c: impl Fn(&Col<E>, &Col<E>) -> Col<E> + 'static,
        cx: impl Fn(&Col<E>, &Col<E>) -> Mat<E> + 'static,
        cu: impl Fn(&Col<E>, &Col<E>) -> Mat<E> + 'static,
    ) -> Self {
        Self {
            p_ineq,
            p_eq,
            c: Box::new(c),
            cx: Box::new(cx),
            cu: Box::new(cu),
        }
    }

    pub fn inequality_count(&self) -> I {
        self.p_ineq
    }

    pub fn equality_count(&self) -> I {
        self.p_eq
    }

    pub fn evaluate(&self, x: &Col<E>, u: &Col<E>) -> Col<E> {
        (self.c)(x, u)
    }

    pub fn state_jacobian(&self, x: &Col<E>, u: &Col<E>) -> Mat<E> {
        (self.cx)(x, u)
    }

    pub fn control_jacobian(&self, x: &Col<E>, u: &Col<E>) -> Mat<E> {
        (self.cu)(x, u)
    }
}

/// A discrete-time optimal control problem over a fixed horizon.
pub struct OptimalControlProblem {
    dynamics: DynamicsModel,
    cost: QuadraticCost,
    x0: Col<E>,
    n_knots: I,
    dt: E,
    u_min: Option<Col<E>>,
    u_max: Option<Col<E>>,
    x_min: Option<Col<E>>,
    x_max: Option<Col<E>>,
    goal_constraint: bool,
    user_constraint: Option<UserConstraint>,
}

impl OptimalControlProblem {
    /// Creates an unconstrained problem; add constraints with the builder
    /// methods.
    pub fn new(dynamics: DynamicsModel, cost: QuadraticCost, x0: Col<E>, n_knots: I, dt: E) -> Self {
        Self {
            dynamics,
            cost,
            x0,
            n_knots,
            dt,
            u_min: None,
            u_max: None,
            x_min: None,
            x_max: None,
            goal_constraint: false,
            user_constraint: None,
        }
    }

    pub fn with_control_bounds(mut self, u_min: Col<E>, u_max: Col<E>) -> Self {
        self.u_min = Some(u_min);
        self.u_max = Some(u_max);
        self
    }

    pub fn with_state_bounds(mut self, x_min: Col<E>, x_max: Col<E>) -> Self {
        self.x_min = Some(x_min);
        self.x_max = Some(x_max);
        self
    }

    /// Enforces `x_N = x_f` as a terminal equality constraint.
    pub fn with_goal_constraint(mut self) -> Self {
        self.goal_constraint = true;
        self
    }

    pub fn with_user_constraint(mut self, constraint: UserConstraint) -> Self {
        self.user_constraint = Some(constraint);
        self
    }

    pub fn state_dim(&self) -> I {
        self.dynamics.state_dim()
    }

    pub fn control_dim(&self) -> I {
        self.dynamics.control_dim()
    }

    pub fn horizon(&self) -> I {
        self.n_knots
    }

    pub fn time_step(&self) -> E {
        self.dt
    }

    pub fn dynamics(&self) -> &DynamicsModel {
        &self.dynamics
    }

    pub fn cost(&self) -> &QuadraticCost {
        &self.cost
    }

    pub fn initial_state(&self) -> &Col<E> {
        &self.x0
    }

    pub fn control_lower(&self) -> Option<&Col<E>> {
        self.u_min.as_ref()
    }

    pub fn control_upper(&self) -> Option<&Col<E>> {
        self.u_max.as_ref()
    }

    pub fn state_lower(&self) -> Option<&Col<E>> {
        self.x_min.as_ref()
    }

    pub fn state_upper(&self) -> Option<&Col<E>> {
        self.x_max.as_ref()
    }

    pub fn has_goal_constraint(&self) -> bool {
        self.goal_constraint
    }

    pub fn user_constraint(&self) -> Option<&UserConstraint> {
        self.user_constraint.as_ref()
    }

    /// Whether the problem itself carries any constraint (bounds, goal, or
    /// user rows). Solver modes may add more on top.
    pub fn is_constrained(&self) -> bool {
        self.goal_constraint
            || self.u_min.is_some()
            || self.u_max.is_some()
            || self.x_min.is_some()
            || self.x_max.is_some()
            || self.user_constraint.is_some()
    }
}

/// Trait for solvers that operate on an [`OptimalControlProblem`].
pub trait OCPSolver<'a>: Solver {
    /// Creates a new solver instance for the given problem and options.
    ///
    /// Configuration errors (dimension mismatches, unsupported discretization)
    /// are reported here, before the solve loop starts.
    fn new(ocp: &'a OptimalControlProblem, options: &SolverOptions) -> Result<Self, Problem>
    where
        Self: Sized;
}
