use faer::{Col, ColRef, Mat, unzip, zip};

use crate::E;

pub(crate) fn dot<'a>(x1: ColRef<'a, E>, x2: ColRef<'a, E>) -> E {
    let mut out = 0.0;
    zip!(x1, x2).for_each(|unzip!(x1, x2)| out += *x1 * *x2);
    out
}

/// Copies `len` entries of `x` starting at `start` into a fresh column.
pub(crate) fn segment(x: &Col<E>, start: usize, len: usize) -> Col<E> {
    Col::from_fn(len, |i| x[start + i])
}

pub(crate) fn head(x: &Col<E>, len: usize) -> Col<E> {
    segment(x, 0, len)
}

pub(crate) fn is_col_finite(x: ColRef<'_, E>) -> bool {
    let mut res = true;
    zip!(x).for_each(|unzip!(x)| {
        if !x.is_finite() {
            res = false
        }
    });
    res
}

pub(crate) fn infinity_norm(x: ColRef<'_, E>) -> E {
    let mut out = 0.0;
    zip!(x).for_each(|unzip!(x)| out = E::max(out, x.abs()));
    out
}

/// Replaces `mat` by its symmetric part `(mat + mat^T) / 2`.
pub(crate) fn symmetrize(mat: &mut Mat<E>) {
    let n = mat.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (mat[(i, j)] + mat[(j, i)]);
            mat[(i, j)] = avg;
            mat[(j, i)] = avg;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot() {
        let x1 = Col::from_fn(3, |i| (i + 1) as E);
        let x2 = Col::from_fn(3, |i| (i as E) - 1.0);
        assert_eq!(dot(x1.as_ref(), x2.as_ref()), -1.0 + 0.0 + 3.0);
    }

    #[test]
    fn test_segment() {
        let x = Col::from_fn(5, |i| i as E);
        let seg = segment(&x, 1, 3);
        assert_eq!(seg.nrows(), 3);
        assert_eq!(seg[0], 1.0);
        assert_eq!(seg[2], 3.0);
        assert_eq!(head(&x, 2)[1], 1.0);
    }

    #[test]
    fn test_is_col_finite() {
        let x = Col::from_fn(3, |i| i as E);
        assert!(is_col_finite(x.as_ref()));
        let mut y = x.clone();
        y[1] = E::NAN;
        assert!(!is_col_finite(y.as_ref()));
        y[1] = E::INFINITY;
        assert!(!is_col_finite(y.as_ref()));
    }

    #[test]
    fn test_infinity_norm() {
        let x = Col::from_fn(3, |i| -(i as E) * 2.0);
        assert_eq!(infinity_norm(x.as_ref()), 4.0);
    }

    #[test]
    fn test_symmetrize() {
        let mut mat = Mat::from_fn(3, 3, |i, j| (3 * i + j) as E);
        symmetrize(&mut mat);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(mat[(i, j)], mat[(j, i)]);
            }
        }
        assert_eq!(mat[(0, 1)], 2.0);
    }
}
