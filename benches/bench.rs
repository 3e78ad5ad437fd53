use faer::{Col, Mat};
use glider::ocp::ilqr::IterativeLQR;
use glider::ocp::{DynamicsModel, OptimalControlProblem, QuadraticCost};
use glider::options::SolverOptions;
use glider::{Solver, SolverHooks};

fn main() {
    divan::main();
}

fn double_integrator(n_knots: usize) -> OptimalControlProblem {
    let dynamics = DynamicsModel::new(
        2,
        1,
        |x, u, dt| Col::from_fn(2, |i| if i == 0 { x[0] + dt * x[1] } else { x[1] + dt * u[0] }),
        |_x, _u, dt| Mat::from_fn(2, 2, |i, j| [[1.0, dt], [0.0, 1.0]][i][j]),
        |_x, _u, dt| Mat::from_fn(2, 1, |i, _| if i == 0 { 0.0 } else { dt }),
    );
    let cost = QuadraticCost::new(
        Mat::identity(2, 2),
        Mat::identity(1, 1),
        100.0 * Mat::identity(2, 2),
        Col::zeros(2),
    );
    let x0 = Col::from_fn(2, |i| if i == 0 { 1.0 } else { 0.0 });
    OptimalControlProblem::new(dynamics, cost, x0, n_knots, 0.1)
}

#[divan::bench(args = [51, 201])]
fn unconstrained_solve(bencher: divan::Bencher, n_knots: usize) {
    let ocp = double_integrator(n_knots);
    let options = SolverOptions::default();

    bencher.bench_local(|| {
        let mut solver = IterativeLQR::new(&ocp, &options).unwrap();
        let mut hooks = SolverHooks::default();
        solver.solve(&mut hooks).unwrap()
    });
}

#[divan::bench(args = [51, 201])]
fn control_bounded_solve(bencher: divan::Bencher, n_knots: usize) {
    let ocp = double_integrator(n_knots)
        .with_control_bounds(Col::from_fn(1, |_| -0.4), Col::from_fn(1, |_| 0.4))
        .with_goal_constraint();
    let options = SolverOptions::default();

    bencher.bench_local(|| {
        let mut solver = IterativeLQR::new(&ocp, &options).unwrap();
        let mut hooks = SolverHooks::default();
        solver.solve(&mut hooks).unwrap()
    });
}
