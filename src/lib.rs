use problemo::Problem;

pub type E = f64;
pub type I = usize;

pub mod callback;
pub mod linalg;
pub mod ocp;
pub mod options;
pub mod stats;
pub mod terminators;


/// Status codes for the trajectory optimization solver.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Status {
    #[default]
    /// The solver is still running.
    InProgress,
    /// A locally optimal trajectory was found.
    Optimal,
    /// The inner loop reached its iteration limit on the final outer iteration.
    MaxIterations,
    /// The outer loop reached its iteration limit before the constraints were
    /// satisfied.
    MaxOuterIterations,
    /// The backward-pass regularization saturated and no further progress was
    /// possible.
    RegularizationLimit,
    /// The solver was interrupted (e.g., by user or signal).
    Interrupted,
    /// The solver stopped due to a time limit.
    TimeLimit,
}

/// Trait for iterative trajectory optimization solvers.
///
/// Provides a standard interface for algorithms that proceed by repeated
/// iteration over a candidate trajectory until convergence or a limit.
pub trait Solver {
    /// Run the solver until convergence, a limit, or a hook-requested stop.
    fn solve(&mut self, hooks: &mut SolverHooks) -> Result<Status, Problem>;
}

/// Per-iteration hooks observed by a [`Solver`].
///
/// The callback sees every committed iterate; the terminator may stop the
/// solve early. Observers only ever see fully committed iterates, never
/// candidates from a rejected line search.
pub struct SolverHooks {
    pub callback: Box<dyn callback::Callback>,
    pub terminator: Box<dyn terminators::Terminator>,
}

impl Default for SolverHooks {
    fn default() -> Self {
        Self {
            callback: Box::new(callback::NoOpCallback {}),
            terminator: Box::new(terminators::MultipleTerminators::new(Vec::new())),
        }
    }
}
