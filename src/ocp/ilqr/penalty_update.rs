//! Penalty weight updates for the outer loop.
//!
//! Two schemes, selected once at solve entry and dispatched statically:
//! [`UniformPenalty`] scales everything by the fast factor, and
//! [`IndividualPenalty`] scales each constraint by the fast or slow factor
//! depending on how much its violation shrank since the last outer
//! iteration. Penalties are element-wise non-decreasing and capped at
//! `penalty_max`.

use enum_dispatch::enum_dispatch;

use crate::E;
use crate::options::{PenaltyUpdateType, SolverOptions};

use super::constraints::ConstraintLayout;
use super::trajectory::TrajectoryStore;

#[enum_dispatch]
pub(crate) trait PenaltyScheme {
    /// Updates every stage and terminal penalty in place.
    fn update(
        &self,
        store: &mut TrajectoryStore,
        layout: &ConstraintLayout,
        options: &SolverOptions,
    );
}

#[enum_dispatch(PenaltyScheme)]
pub(crate) enum PenaltyUpdater {
    Uniform(UniformPenalty),
    Individual(IndividualPenalty),
}

impl PenaltyUpdater {
    pub fn from_options(options: &SolverOptions) -> Self {
        match options.outer_loop_update {
            PenaltyUpdateType::Uniform => UniformPenalty {}.into(),
            PenaltyUpdateType::Individual => IndividualPenalty {}.into(),
        }
    }
}

/// `mu <- min(penalty_max, penalty_scaling * mu)` for every constraint.
pub(crate) struct UniformPenalty {}

impl PenaltyScheme for UniformPenalty {
    fn update(
        &self,
        store: &mut TrajectoryStore,
        layout: &ConstraintLayout,
        options: &SolverOptions,
    ) {
        let _ = layout;
        let gamma = options.penalty_scaling;
        for k in 0..store.stages() {
            for i in 0..store.p {
                store.mu[k][i] = E::min(options.penalty_max, gamma * store.mu[k][i]);
            }
        }
        for i in 0..store.p_term {
            store.mu_term[i] = E::min(options.penalty_max, gamma * store.mu_term[i]);
        }
    }
}

/// Per-constraint update: a constraint whose violation dropped to
/// `constraint_decrease_ratio` of its previous value gets the slow factor,
/// everything else the fast one.
pub(crate) struct IndividualPenalty {}

impl IndividualPenalty {
    fn violation(c: E, inequality: bool) -> E {
        if inequality { E::max(c, 0.0) } else { c.abs() }
    }
}

impl PenaltyScheme for IndividualPenalty {
    fn update(
        &self,
        store: &mut TrajectoryStore,
        layout: &ConstraintLayout,
        options: &SolverOptions,
    ) {
        let gamma = options.penalty_scaling;
        let gamma_no = options.penalty_scaling_no;
        let ratio = options.constraint_decrease_ratio;

        for k in 0..store.stages() {
            for i in 0..store.p {
                let inequality = i < layout.p_ineq;
                let v = Self::violation(store.C[k][i], inequality);
                let v_prev = Self::violation(store.C_prev[k][i], inequality);
                let factor = if v <= ratio * v_prev { gamma_no } else { gamma };
                store.mu[k][i] = E::min(options.penalty_max, factor * store.mu[k][i]);
            }
        }
        for i in 0..store.p_term {
            let v = store.C_term[i].abs();
            let v_prev = store.C_term_prev[i].abs();
            let factor = if v <= ratio * v_prev { gamma_no } else { gamma };
            store.mu_term[i] = E::min(options.penalty_max, factor * store.mu_term[i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocp::Discretization;
    use crate::options::{Mode, RegularizationType};

    fn store_and_layout(p_ineq: usize, p_eq: usize) -> (TrajectoryStore, ConstraintLayout) {
        let options = SolverOptions::default();
        let mode = Mode {
            constrained: true,
            minimum_time: false,
            infeasible: false,
            square_root: false,
            discretization: Discretization::Zoh,
            bp_reg: RegularizationType::Control,
            outer_update: PenaltyUpdateType::Uniform,
            n: 1,
            m: 1,
            m_bar: 1,
            mm: 1,
        };
        let p = p_ineq + p_eq;
        let store = TrajectoryStore::new(&mode, p, 1, 3, 0.1, &options);
        let layout = ConstraintLayout {
            n: 1,
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
            p,
            p_ineq,
            p_eq,
            p_term: 1,
        };
        (store, layout)
    }

    #[test]
    fn uniform_update_scales_and_caps() {
        let (mut store, layout) = store_and_layout(1, 1);
        let mut options = SolverOptions::default();
        options.penalty_max = 50.0;

        let updater = PenaltyUpdater::from_options(&options);
        updater.update(&mut store, &layout, &options);
        assert_eq!(store.mu[0][0], 10.0);
        updater.update(&mut store, &layout, &options);
        assert_eq!(store.mu[0][1], 50.0); // capped below gamma^2
        assert_eq!(store.mu_term[0], 50.0);
    }

    #[test]
    fn uniform_update_is_monotone() {
        let (mut store, layout) = store_and_layout(1, 1);
        let options = SolverOptions::default();
        let updater = PenaltyUpdater::from_options(&options);

        let mut prev = store.mu[0][0];
        for _ in 0..12 {
            updater.update(&mut store, &layout, &options);
            assert!(store.mu[0][0] >= prev);
            assert!(store.mu[0][0] <= options.penalty_max);
            prev = store.mu[0][0];
        }
    }

    #[test]
    fn individual_update_distinguishes_improving_rows() {
        let (mut store, layout) = store_and_layout(0, 2);
        let mut options = SolverOptions::default();
        options.outer_loop_update = PenaltyUpdateType::Individual;

        store.C_prev[0][0] = 1.0;
        store.C[0][0] = 0.1; // improved well below the ratio: slow factor
        store.C_prev[0][1] = 1.0;
        store.C[0][1] = 0.9; // stagnated: fast factor

        let updater = PenaltyUpdater::from_options(&options);
        updater.update(&mut store, &layout, &options);
        assert_eq!(store.mu[0][0], options.penalty_scaling_no);
        assert_eq!(store.mu[0][1], options.penalty_scaling);
    }

    #[test]
    fn individual_update_uses_positive_part_for_inequalities() {
        let (mut store, layout) = store_and_layout(1, 0);
        let mut options = SolverOptions::default();
        options.outer_loop_update = PenaltyUpdateType::Individual;

        store.C_prev[0][0] = -2.0; // was satisfied
        store.C[0][0] = -5.0; // still satisfied: violation 0 <= ratio * 0
        let updater = PenaltyUpdater::from_options(&options);
        updater.update(&mut store, &layout, &options);
        assert_eq!(store.mu[0][0], options.penalty_scaling_no);
    }
}
