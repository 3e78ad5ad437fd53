//! Solve statistics and the per-iteration record handed to hooks.

use serde::Serialize;

use crate::{E, I};

/// Snapshot of a committed solver iterate, handed to callbacks and
/// terminators after every accepted or rejected inner iteration.
#[derive(Debug, Clone, Copy)]
pub struct IterationRecord {
    /// Inner iteration counter (cumulative across outer iterations).
    pub iteration: I,
    /// Outer (augmented Lagrangian) iteration counter.
    pub outer_iteration: I,
    /// Total augmented cost of the current trajectory.
    pub cost: E,
    /// Maximum constraint violation of the current trajectory.
    pub c_max: E,
    /// Feedforward gradient estimate of the most recent backward pass.
    pub gradient: E,
    /// Step size of the most recent forward pass (zero if it was rejected).
    pub alpha: E,
    /// Current backward-pass regularization.
    pub rho: E,
    /// Whether the embedding driver asked for live plotting.
    pub live_plotting: bool,
}

/// Statistics dictionary returned by a solve.
///
/// Serializes to the flat key set expected by drivers; when an
/// infeasible-start phase preceded the reported solve, its statistics are
/// merged under keys suffixed with `(infeasible)`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SolverStats {
    /// Total inner iterations.
    pub iterations: I,
    /// Total outer iterations.
    #[serde(rename = "major iterations")]
    pub major_iterations: I,
    /// Wall-clock solve time in seconds.
    pub runtime: E,
    /// Wall-clock setup time in seconds (allocation and validation).
    pub setup_time: E,
    /// Cost of every committed iterate, in order.
    pub cost: Vec<E>,
    /// Maximum constraint violation of every committed iterate, in order.
    pub c_max: Vec<E>,

    #[serde(rename = "iterations (infeasible)", skip_serializing_if = "Option::is_none")]
    pub iterations_infeasible: Option<I>,
    #[serde(rename = "major iterations (infeasible)", skip_serializing_if = "Option::is_none")]
    pub major_iterations_infeasible: Option<I>,
    #[serde(rename = "runtime (infeasible)", skip_serializing_if = "Option::is_none")]
    pub runtime_infeasible: Option<E>,
    #[serde(rename = "cost (infeasible)", skip_serializing_if = "Option::is_none")]
    pub cost_infeasible: Option<Vec<E>>,
    #[serde(rename = "c_max (infeasible)", skip_serializing_if = "Option::is_none")]
    pub c_max_infeasible: Option<Vec<E>>,
}

impl SolverStats {
    /// Records one committed iterate.
    pub(crate) fn record(&mut self, cost: E, c_max: E) {
        self.cost.push(cost);
        self.c_max.push(c_max);
    }

    /// Merges the statistics of a completed slack-augmented phase under the
    /// `(infeasible)` keys, keeping `self` as the feasibility-projection
    /// phase.
    pub(crate) fn absorb_infeasible(&mut self, phase: SolverStats) {
        self.setup_time += phase.setup_time;
        self.iterations_infeasible = Some(phase.iterations);
        self.major_iterations_infeasible = Some(phase.major_iterations);
        self.runtime_infeasible = Some(phase.runtime);
        self.cost_infeasible = Some(phase.cost);
        self.c_max_infeasible = Some(phase.c_max);
    }
}
