use crate::stats::IterationRecord;

/// Hook invoked once per committed solver iteration for logging, monitoring,
/// or live plotting.
pub trait Callback {
    /// Called once before the first iteration.
    fn initialize(&mut self) {}

    /// Called after each committed iteration with the current iterate.
    fn call(&mut self, record: &IterationRecord);
}

/// A callback that does nothing. Use when no per-iteration output is needed.
pub struct NoOpCallback {}

impl Callback for NoOpCallback {
    fn call(&mut self, _record: &IterationRecord) {
        // Do nothing
    }
}

/// Prints a fixed-width convergence row to stdout each iteration.
pub struct ConvergenceOutput {}

impl Callback for ConvergenceOutput {
    fn initialize(&mut self) {
        println!(
            "| {:>5} | {:>5} | {:<12} | {:<9} | {:<9} | {:<9} | {:<9} |",
            "outer", "iter", "cost", "c_max", "grad", "alpha", "rho"
        );
    }

    fn call(&mut self, record: &IterationRecord) {
        let txt = format!(
            "| {:5} | {:5} | {:<12.6e} | {:<9.2e} | {:<9.2e} | {:<9.2e} | {:<9.2e} |",
            record.outer_iteration,
            record.iteration,
            record.cost,
            record.c_max,
            record.gradient,
            record.alpha,
            record.rho,
        );
        println!("{}", txt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convergence_output_formats_every_field() {
        let record = IterationRecord {
            iteration: 3,
            outer_iteration: 1,
            cost: 12.5,
            c_max: 1e-3,
            gradient: 2e-4,
            alpha: 0.5,
            rho: 0.0,
            live_plotting: false,
        };
        let mut callback = ConvergenceOutput {};
        callback.initialize();
        callback.call(&record);
    }
}
