//! # Augmented Lagrangian iterative LQR
//!
//! This module implements a constrained trajectory optimization solver: an
//! iterative Linear-Quadratic Regulator inner loop wrapped in an augmented
//! Lagrangian outer loop, for problems of the form
//!
//! ```text
//!   min   sum_k l(x_k, u_k) + l_f(x_N)
//!   s.t.  x_{k+1} = f(x_k, u_k, dt)
//!         c_I(x_k, u_k) <= 0,  c_E(x_k, u_k) = 0
//! ```
//!
//! ## Acknowledgment
//!
//! The algorithmic design follows the unconstrained iLQR of Tassa et al.
//! (regularization schedule and line-search acceptance) and the augmented
//! Lagrangian treatment of constraints described in:
//!
//! > Y. Tassa, T. Erez and E. Todorov, "Synthesis and Stabilization of
//! > Complex Behaviors through Online Trajectory Optimization", *IROS*, 2012.
//!
//! > T. A. Howell, B. E. Jackson and Z. Manchester, "ALTRO: A Fast Solver for
//! > Constrained Trajectory Optimization", *IROS*, 2019.
//!
//! This is an independent implementation; only the published mathematical
//! formulations are used.

pub(crate) mod backward_pass;
pub(crate) mod constraints;
pub(crate) mod dual_update;
pub(crate) mod infeasible;
pub(crate) mod line_search;
pub(crate) mod penalty_update;
pub(crate) mod regularization;
pub(crate) mod trajectory;

use std::mem;
use std::time::Instant;

use derive_more::{Display, Error};
use faer::Col;
use problemo::Problem;

use crate::linalg::vector_ops::head;
use crate::ocp::{OCPSolver, OptimalControlProblem};
use crate::options::{ConfigError, Mode, SolverOptions};
use crate::stats::{IterationRecord, SolverStats};
use crate::{E, I, Solver, SolverHooks, Status};

use backward_pass::BackwardPass;
use constraints::ConstraintLayout;
use line_search::ForwardPass;
use penalty_update::{PenaltyScheme, PenaltyUpdater};
use trajectory::TrajectoryStore;

#[derive(Debug, Display, Error, PartialEq)]
pub enum SolveError {
    #[display("Initial rollout diverged even with zero controls")]
    DivergentInitialRollout,
}

/// Outcome of one inner (iLQR) loop.
enum InnerLoop {
    /// Cost decrease or gradient dropped below the active tolerance.
    Converged,
    /// The iteration cap or the consecutive-failure limit was hit.
    Exhausted,
    /// The backward-pass regularization saturated.
    RegularizationLimit,
    /// A hook asked the solve to stop.
    External(Status),
}

/// Constrained trajectory optimization by augmented Lagrangian iLQR.
///
/// One instance owns all per-solve state. Construct with
/// [`IterativeLQR::new`], optionally seed a control or state trajectory, then
/// call [`Solver::solve`]. The trajectory, statistics, and final violation
/// are available through accessors afterwards.
pub struct IterativeLQR<'a> {
    ocp: &'a OptimalControlProblem,
    pub(crate) options: SolverOptions,
    pub(crate) mode: Mode,
    pub(crate) layout: ConstraintLayout,
    pub(crate) store: TrajectoryStore,
    penalty: PenaltyUpdater,
    stats: SolverStats,
}

impl<'a> IterativeLQR<'a> {
    pub fn new(ocp: &'a OptimalControlProblem, options: &SolverOptions) -> Result<Self, Problem> {
        let setup_timer = Instant::now();

        let mode = Mode::build(ocp, options, false)?;
        let layout = ConstraintLayout::new(ocp, &mode, options);
        let store = TrajectoryStore::new(
            &mode,
            layout.p,
            layout.p_term,
            ocp.horizon(),
            ocp.time_step(),
            options,
        );

        let mut stats = SolverStats::default();
        stats.setup_time = setup_timer.elapsed().as_secs_f64();

        Ok(Self {
            ocp,
            options: options.clone(),
            mode,
            layout,
            store,
            penalty: PenaltyUpdater::from_options(options),
            stats,
        })
    }

    /// Seeds the nominal controls. Accepts columns of the nominal control
    /// dimension, or of the sqrt(dt)-augmented dimension in minimum-time
    /// mode.
    pub fn set_initial_controls(&mut self, controls: &[Col<E>]) -> Result<(), Problem> {
        if controls.len() != self.store.stages() {
            return Err(ConfigError::InitialTrajectory)?;
        }
        for u in controls {
            if u.nrows() != self.mode.m && u.nrows() != self.mode.m_bar {
                return Err(ConfigError::InitialTrajectory)?;
            }
        }
        self.seed_controls(controls);
        Ok(())
    }

    /// Supplies an initial state trajectory with a control guess, switching
    /// the solve into the infeasible-start mode: the control vector gains
    /// one slack input per state component, chosen so the augmented dynamics
    /// reproduce `states` exactly, and the slacks are constrained to zero.
    pub fn set_initial_state_trajectory(
        &mut self,
        states: &[Col<E>],
        controls: &[Col<E>],
    ) -> Result<(), Problem> {
        if states.len() != self.ocp.horizon() || controls.len() != self.ocp.horizon() - 1 {
            return Err(ConfigError::InitialTrajectory)?;
        }
        for x in states {
            if x.nrows() != self.mode.n {
                return Err(ConfigError::InitialTrajectory)?;
            }
        }
        for u in controls {
            if u.nrows() != self.mode.m {
                return Err(ConfigError::InitialTrajectory)?;
            }
        }

        self.mode = Mode::build(self.ocp, &self.options, true)?;
        self.layout = ConstraintLayout::new(self.ocp, &self.mode, &self.options);
        self.store = TrajectoryStore::new(
            &self.mode,
            self.layout.p,
            self.layout.p_term,
            self.ocp.horizon(),
            self.ocp.time_step(),
            &self.options,
        );

        let slacks = infeasible::slack_controls(self.ocp, states, controls);
        for k in 0..self.store.stages() {
            for i in 0..self.mode.m {
                self.store.U[k][i] = controls[k][i];
            }
            for i in 0..self.mode.n {
                self.store.U[k][self.mode.m_bar + i] = slacks[k][i];
            }
            self.store.X[k] = states[k].clone();
        }
        self.store.X[self.ocp.horizon() - 1] = states[self.ocp.horizon() - 1].clone();

        if let Some(offset) = self.layout.slack_offset {
            let initial = self.options.penalty_initial * self.options.infeasible_regularization;
            for k in 0..self.store.stages() {
                for i in 0..self.mode.n {
                    self.store.mu[k][offset + i] = initial;
                }
            }
        }
        Ok(())
    }

    /// States and nominal controls of the current trajectory.
    pub fn trajectory(&self) -> (Vec<Col<E>>, Vec<Col<E>>) {
        let xs = self.store.X.clone();
        let us = self.store.U.iter().map(|u| head(u, self.mode.m)).collect();
        (xs, us)
    }

    /// Per-stage time steps; varies only in minimum-time mode.
    pub fn time_steps(&self) -> Vec<E> {
        (0..self.store.stages())
            .map(|k| self.store.time_step(k, self.ocp.time_step()))
            .collect()
    }

    /// Objective of the current trajectory, without augmented Lagrangian
    /// terms.
    pub fn cost(&self) -> E {
        constraints::objective_cost(&self.store, self.ocp, &self.layout, &self.options)
    }

    /// Maximum constraint violation of the current trajectory.
    pub fn max_violation(&self) -> E {
        constraints::max_violation(&self.store, &self.layout)
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    fn seed_controls(&mut self, controls: &[Col<E>]) {
        for (k, u) in controls.iter().enumerate() {
            for i in 0..u.nrows().min(self.mode.m_bar) {
                self.store.U[k][i] = u[i];
            }
        }
    }

    /// Initial rollout with a one-shot fallback to zero controls.
    fn prepare(&mut self) -> Result<(), Problem> {
        if !line_search::initial_rollout(&mut self.store, self.ocp, &self.options) {
            for u in &mut self.store.U {
                for i in 0..self.mode.m {
                    u[i] = 0.0;
                }
                if self.mode.infeasible {
                    for i in 0..self.mode.n {
                        u[self.mode.m_bar + i] = 0.0;
                    }
                }
            }
            if !line_search::initial_rollout(&mut self.store, self.ocp, &self.options) {
                return Err(SolveError::DivergentInitialRollout)?;
            }
        }
        constraints::update_residuals(&mut self.store, self.ocp, &self.layout);
        constraints::update_active_set(&mut self.store, &self.layout);
        Ok(())
    }

    /// Runs the setup phase (initial rollout, residuals, active set) without
    /// entering the solve loop.
    #[cfg(test)]
    pub(crate) fn prepare_for_test(&mut self) {
        self.prepare().unwrap();
    }

    pub(crate) fn update_dynamics_jacobians(&mut self) {
        let dynamics = self.ocp.dynamics();
        for k in 0..self.store.stages() {
            let dt_k = self.store.time_step(k, self.ocp.time_step());
            let u_nom = head(&self.store.U[k], self.mode.m);
            let x = &self.store.X[k];

            self.store.fdx[k] = dynamics.state_jacobian(x, &u_nom, dt_k);

            let fu = dynamics.control_jacobian(x, &u_nom, dt_k);
            let fdu = &mut self.store.fdu[k];
            fdu.as_mut().fill(0.0);
            for i in 0..self.mode.n {
                for j in 0..self.mode.m {
                    fdu[(i, j)] = fu[(i, j)];
                }
            }
            if self.mode.minimum_time {
                let tau = self.store.U[k][self.mode.m_bar - 1];
                let fdt = dynamics.time_step_jacobian(x, &u_nom, dt_k).unwrap();
                for i in 0..self.mode.n {
                    fdu[(i, self.mode.m_bar - 1)] = 2.0 * tau * fdt[i];
                }
            }
            if self.mode.infeasible {
                for i in 0..self.mode.n {
                    fdu[(i, self.mode.m_bar + i)] = 1.0;
                }
            }
        }
    }

    /// Mean over stages of the worst normalized feedforward component
    /// (Todorov's gradient surrogate).
    pub(crate) fn gradient(&self) -> E {
        let mut total = 0.0;
        for k in 0..self.store.stages() {
            let mut worst: E = 0.0;
            for i in 0..self.mode.mm {
                worst = E::max(
                    worst,
                    self.store.d[k][i].abs() / (self.store.U[k][i].abs() + 1.0),
                );
            }
            total += worst;
        }
        total / self.store.stages() as E
    }

    fn solve_inner(
        &mut self,
        hooks: &mut SolverHooks,
        outer_iteration: I,
        cost_tolerance: E,
        gradient_tolerance: E,
        j: &mut E,
    ) -> InnerLoop {
        let mut failures = 0;

        for _ in 0..self.options.iterations {
            self.update_dynamics_jacobians();
            constraints::update_jacobians(&mut self.store, self.ocp, &self.layout);
            constraints::update_active_set(&mut self.store, &self.layout);

            let dv = match backward_pass::backward_pass(
                &mut self.store,
                self.ocp,
                &self.layout,
                &self.options,
                &self.mode,
            ) {
                BackwardPass::Success { dv, .. } => dv,
                BackwardPass::RegularizationLimit => return InnerLoop::RegularizationLimit,
            };

            let outcome = line_search::forward_pass(
                &mut self.store,
                self.ocp,
                &self.layout,
                &self.options,
                dv,
                *j,
            );
            self.stats.iterations += 1;

            match outcome {
                ForwardPass::Accepted { cost, alpha } => {
                    self.store.promote();
                    self.store.reg.decrease(&self.options);
                    constraints::update_residuals(&mut self.store, self.ocp, &self.layout);
                    constraints::update_active_set(&mut self.store, &self.layout);

                    let c_max = constraints::max_violation(&self.store, &self.layout);
                    let gradient = self.gradient();
                    let dj = *j - cost;
                    *j = cost;
                    self.stats.record(cost, c_max);

                    let record = IterationRecord {
                        iteration: self.stats.iterations,
                        outer_iteration,
                        cost,
                        c_max,
                        gradient,
                        alpha,
                        rho: self.store.reg.rho,
                        live_plotting: self.options.live_plotting,
                    };
                    hooks.callback.call(&record);
                    if let Some(status) = hooks.terminator.terminate(&record) {
                        return InnerLoop::External(status);
                    }

                    failures = 0;
                    if dj.abs() < cost_tolerance || gradient < gradient_tolerance {
                        return InnerLoop::Converged;
                    }
                }
                ForwardPass::NoDescent | ForwardPass::Exhausted => {
                    failures += 1;
                    if self.store.reg.increase(&self.options) {
                        return InnerLoop::RegularizationLimit;
                    }
                    if failures >= self.options.consecutive_failure_limit {
                        return InnerLoop::Exhausted;
                    }
                }
            }
        }

        InnerLoop::Exhausted
    }

    fn solve_outer(&mut self, hooks: &mut SolverHooks) -> Result<Status, Problem> {
        let mut j = constraints::total_cost(&self.store, self.ocp, &self.layout, &self.options, false);
        self.stats
            .record(j, constraints::max_violation(&self.store, &self.layout));

        let mut regularization_limited = false;
        let mut last_strict = false;

        for outer in 0..self.options.iterations_outerloop {
            let strict = !self.mode.constrained
                || constraints::max_violation(&self.store, &self.layout)
                    < self.options.constraint_tolerance;
            last_strict = strict;
            let (cost_tolerance, gradient_tolerance) = if strict {
                (self.options.cost_tolerance, self.options.gradient_tolerance)
            } else {
                (
                    self.options.cost_intermediate_tolerance,
                    self.options.gradient_intermediate_tolerance,
                )
            };

            let inner = self.solve_inner(hooks, outer, cost_tolerance, gradient_tolerance, &mut j);
            self.stats.major_iterations += 1;

            let converged = match &inner {
                InnerLoop::External(status) => return Ok(*status),
                InnerLoop::Converged => true,
                // A line search that cannot improve a stationary iterate is
                // gradient convergence; the cost is unchanged by rejections.
                InnerLoop::Exhausted => self.gradient() < gradient_tolerance,
                InnerLoop::RegularizationLimit => {
                    regularization_limited = true;
                    false
                }
            };

            if self.mode.constrained {
                dual_update::update_duals(&mut self.store, self.ocp, &self.layout, &self.options);
                self.penalty
                    .update(&mut self.store, &self.layout, &self.options);
                self.store.snapshot_constraints();
            }

            let c_max = constraints::max_violation(&self.store, &self.layout);
            if converged && strict && c_max < self.options.constraint_tolerance {
                return Ok(Status::Optimal);
            }
            if inner_made_no_progress(&inner) && !self.mode.constrained {
                break;
            }
        }

        if regularization_limited {
            println!("Backward-pass regularization saturated; returning best iterate.");
            return Ok(Status::RegularizationLimit);
        }
        println!("Reached maximum iterations without convergence.");
        if last_strict {
            Ok(Status::MaxIterations)
        } else {
            Ok(Status::MaxOuterIterations)
        }
    }

    fn solve_infeasible(&mut self, hooks: &mut SolverHooks) -> Result<Status, Problem> {
        let phase_timer = Instant::now();
        self.prepare()?;
        let phase_status = self.solve_outer(hooks)?;
        self.stats.runtime = phase_timer.elapsed().as_secs_f64();

        let external = matches!(phase_status, Status::Interrupted | Status::TimeLimit);
        if !self.options.resolve_feasible || external {
            return Ok(phase_status);
        }

        // Strip the slacks and project onto the feasible manifold with one
        // backward/forward pass of the original problem, tracking the
        // slack-free trajectory with the time-varying LQR policy.
        let stripped = infeasible::stripped_controls(&self.store);
        let mut projection = IterativeLQR::new(self.ocp, &self.options)?;
        projection.seed_controls(&stripped);
        projection.prepare()?;
        projection.projection_pass();

        let IterativeLQR {
            mode,
            layout,
            store,
            stats,
            ..
        } = projection;
        let mut merged = stats;
        merged.absorb_infeasible(mem::take(&mut self.stats));
        self.stats = merged;
        self.mode = mode;
        self.layout = layout;
        self.store = store;

        Ok(phase_status)
    }

    /// One backward/forward pass against the current (stripped) trajectory,
    /// committed only if the line search accepts.
    fn projection_pass(&mut self) {
        self.update_dynamics_jacobians();
        constraints::update_jacobians(&mut self.store, self.ocp, &self.layout);
        constraints::update_active_set(&mut self.store, &self.layout);

        let j = constraints::total_cost(&self.store, self.ocp, &self.layout, &self.options, false);
        let dv = match backward_pass::backward_pass(
            &mut self.store,
            self.ocp,
            &self.layout,
            &self.options,
            &self.mode,
        ) {
            BackwardPass::Success { dv, .. } => dv,
            BackwardPass::RegularizationLimit => return,
        };

        let outcome =
            line_search::forward_pass(&mut self.store, self.ocp, &self.layout, &self.options, dv, j);
        self.stats.iterations += 1;
        if let ForwardPass::Accepted { cost, .. } = outcome {
            self.store.promote();
            constraints::update_residuals(&mut self.store, self.ocp, &self.layout);
            constraints::update_active_set(&mut self.store, &self.layout);
            self.stats
                .record(cost, constraints::max_violation(&self.store, &self.layout));
        }
    }
}

fn inner_made_no_progress(inner: &InnerLoop) -> bool {
    matches!(inner, InnerLoop::Exhausted | InnerLoop::RegularizationLimit)
}

impl Solver for IterativeLQR<'_> {
    fn solve(&mut self, hooks: &mut SolverHooks) -> Result<Status, Problem> {
        let timer = Instant::now();
        hooks.callback.initialize();
        hooks.terminator.initialize();

        let status = if self.mode.infeasible {
            self.solve_infeasible(hooks)?
        } else {
            self.prepare()?;
            self.solve_outer(hooks)?
        };

        self.stats.runtime = timer.elapsed().as_secs_f64();
        if self.options.verbose {
            println!(
                "Finished in {} iterations ({} outer) with status: {:?}",
                self.stats.iterations, self.stats.major_iterations, status
            );
        }
        Ok(status)
    }
}

impl<'a> OCPSolver<'a> for IterativeLQR<'a> {
    fn new(ocp: &'a OptimalControlProblem, options: &SolverOptions) -> Result<Self, Problem> {
        IterativeLQR::new(ocp, options)
    }
}
