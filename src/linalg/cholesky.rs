//! # Dense Cholesky factorization for symmetric positive-definite systems
//!
//! Every linear system in the solver core is a small dense symmetric matrix
//! (a regularized control Hessian or an active-set KKT block), so this module
//! wraps Faer's dense LLT behind a factorize/solve split. The factorization
//! attempt doubles as the positive-definiteness check: a failed attempt is
//! the signal that drives the regularization schedule, not a hard error.
//!
//! ## Example Usage
//! ```
//! use faer::Mat;
//! use glider::linalg::cholesky::DenseCholesky;
//!
//! let mat = Mat::<f64>::from_fn(2, 2, |i, j| if i == j { 2.0 } else { -1.0 });
//! let mut solver = DenseCholesky::new();
//! solver.factorize(mat.as_ref()).unwrap();
//! let b = Mat::from_fn(2, 1, |i, _| i as f64);
//! let x = solver.solve(b.as_ref()).unwrap();
//! ```

use derive_more::{Display, Error};
use faer::linalg::solvers::Llt;
use faer::prelude::*;
use faer::{Mat, MatRef, Side};

use crate::E;

#[derive(Debug, Display, Error, PartialEq)]
pub enum LinearSolverError {
    #[display("Matrix is not positive definite")]
    NotPositiveDefinite,

    #[display("Uninitialized error")]
    Uninitialized,
}

/// Dense LLT solver with an explicit factorize/solve split.
///
/// The factorization is `None` until [`factorize`](Self::factorize) succeeds;
/// a non-positive-definite input leaves any previous factorization intact so
/// the caller can retry with a shifted matrix.
pub struct DenseCholesky {
    llt: Option<Llt<E>>,
}

impl DenseCholesky {
    pub fn new() -> Self {
        Self { llt: None }
    }

    /// Attempts the LLT factorization of a symmetric matrix, reading the
    /// lower triangle. Fails iff the matrix is not positive definite.
    pub fn factorize(&mut self, mat: MatRef<'_, E>) -> Result<(), LinearSolverError> {
        match mat.llt(Side::Lower) {
            Ok(llt) => {
                self.llt = Some(llt);
                Ok(())
            }
            Err(_) => Err(LinearSolverError::NotPositiveDefinite),
        }
    }

    /// Solves `A x = b` for every column of `b` using the stored
    /// factorization.
    pub fn solve(&self, rhs: MatRef<'_, E>) -> Result<Mat<E>, LinearSolverError> {
        let llt = self.llt.as_ref().ok_or(LinearSolverError::Uninitialized)?;
        Ok(llt.solve(rhs))
    }

    /// Returns the lower Cholesky factor `L` with `A = L L^T`.
    pub fn factor(&self) -> Result<Mat<E>, LinearSolverError> {
        let llt = self.llt.as_ref().ok_or(LinearSolverError::Uninitialized)?;
        Ok(llt.L().to_owned())
    }
}

impl Default for DenseCholesky {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spd_tridiagonal(n: usize) -> Mat<E> {
        Mat::from_fn(n, n, |i, j| {
            if i == j {
                2.0
            } else if i.abs_diff(j) == 1 {
                -1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn solves_spd_system() {
        let mat = spd_tridiagonal(4);
        let mut solver = DenseCholesky::new();
        solver.factorize(mat.as_ref()).unwrap();

        let b = Mat::from_fn(4, 2, |i, j| (i + j) as E);
        let x = solver.solve(b.as_ref()).unwrap();
        assert!((&mat * &x - &b).norm_l2() < 1e-12);
    }

    #[test]
    fn rejects_indefinite_matrix() {
        let mut mat = spd_tridiagonal(3);
        mat[(1, 1)] = -5.0;
        let mut solver = DenseCholesky::new();
        assert_eq!(
            solver.factorize(mat.as_ref()),
            Err(LinearSolverError::NotPositiveDefinite)
        );
        assert_eq!(
            solver.solve(mat.as_ref()).unwrap_err(),
            LinearSolverError::Uninitialized
        );
    }

    #[test]
    fn factor_reconstructs_matrix() {
        let mat = spd_tridiagonal(5);
        let mut solver = DenseCholesky::new();
        solver.factorize(mat.as_ref()).unwrap();

        let l = solver.factor().unwrap();
        let lt = l.transpose().to_owned();
        assert!((&l * &lt - &mat).norm_l2() < 1e-12);
    }
}
