use crate::E;
use crate::options::SolverOptions;

/// Two-parameter regularization schedule (Tassa): `rho` is the value in use,
/// `drho` the current multiplicative rate. Fast increase after a failure,
/// fast decrease after success, with hysteresis around `bp_reg_min`.
#[derive(Debug, Clone, Copy)]
pub struct Regularization {
    pub rho: E,
    pub drho: E,
}

impl Regularization {
    pub fn new(initial: E) -> Self {
        Self {
            rho: initial,
            drho: 1.0,
        }
    }

    /// Increases the regularization. Returns `true` when the schedule has
    /// saturated at `bp_reg_max`.
    pub fn increase(&mut self, options: &SolverOptions) -> bool {
        let phi = options.bp_reg_increase_factor;
        self.drho = E::max(self.drho * phi, phi);
        self.rho = E::max(self.rho * self.drho, options.bp_reg_min);
        if self.rho >= options.bp_reg_max {
            self.rho = options.bp_reg_max;
            return true;
        }
        false
    }

    /// Decreases the regularization, dropping to exactly zero once below
    /// `bp_reg_min`.
    pub fn decrease(&mut self, options: &SolverOptions) {
        let phi = options.bp_reg_increase_factor;
        self.drho = E::min(self.drho / phi, 1.0 / phi);
        let next = self.rho * self.drho;
        self.rho = if next >= options.bp_reg_min { next } else { 0.0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increase_is_monotone_and_saturates() {
        let options = SolverOptions::default();
        let mut reg = Regularization::new(0.0);

        let mut prev = reg.rho;
        let mut overflow = false;
        for _ in 0..200 {
            overflow = reg.increase(&options);
            assert!(reg.rho >= prev);
            prev = reg.rho;
            if overflow {
                break;
            }
        }
        assert!(overflow);
        assert_eq!(reg.rho, options.bp_reg_max);
    }

    #[test]
    fn decrease_drops_to_zero_below_minimum() {
        let options = SolverOptions::default();
        let mut reg = Regularization::new(0.0);
        reg.increase(&options);
        assert_eq!(reg.rho, options.bp_reg_min);

        reg.decrease(&options);
        assert_eq!(reg.rho, 0.0);
    }

    #[test]
    fn decrease_after_growth_steps_down_gradually() {
        let options = SolverOptions::default();
        let mut reg = Regularization::new(0.0);
        for _ in 0..10 {
            reg.increase(&options);
        }
        let high = reg.rho;
        reg.decrease(&options);
        assert!(reg.rho < high);
        assert!(reg.rho > 0.0);
    }
}
