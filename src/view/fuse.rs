//! Axis-fusion analysis for the GEMM path.
//!
//! A group of axes can be collapsed into one contiguous axis when each
//! stride chains into the next (`d[i+1] == s[i] * d[i]`). A view whose open
//! and contracted groups both fuse, with a unit leading stride where its
//! matrix role demands one, can be handed to GEMM as a 2-D matrix.

use super::{StridedView, gather};
use crate::types::Scalar;

/// The position a view occupies in a GEMM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixRole {
    /// The output matrix.
    Destination,
    /// A source read under a conjugation flag (transposed orientation).
    ConjugatedSource,
    /// A source read as-is.
    PlainSource,
}

/// Decides whether a group of axes fuses into one contiguous axis.
///
/// Returns `(fusable, total_size, leading_stride)`. Size-0 axes fuse
/// trivially; size-1 axes are skipped.
pub fn canfuse(sizes: &[usize], strides: &[isize]) -> (bool, usize, isize) {
    debug_assert_eq!(sizes.len(), strides.len());
    if sizes.contains(&0) {
        return (true, 0, 1);
    }
    let mut total = 1usize;
    let mut leading = 1isize;
    let mut last: Option<(usize, isize)> = None;
    for (&s, &d) in sizes.iter().zip(strides.iter()) {
        if s == 1 {
            continue;
        }
        match last {
            None => {
                total = s;
                leading = d;
            }
            Some((ps, pd)) => {
                if d != ps as isize * pd {
                    return (false, 0, 0);
                }
                total *= s;
            }
        }
        last = Some((s, d));
    }
    (true, total, leading)
}

/// Whether a view can enter a GEMM call in the given role, with `p1` and
/// `p2` as its row and column axis groups.
pub fn is_blas_contractable<T: Scalar>(
    view: &StridedView<'_, T>,
    p1: &[usize],
    p2: &[usize],
    role: MatrixRole,
) -> bool {
    if !T::BLAS {
        return false;
    }
    let (ok1, _, lead1) = canfuse(&gather(view.sizes(), p1), &gather(view.strides(), p1));
    let (ok2, _, lead2) = canfuse(&gather(view.sizes(), p2), &gather(view.strides(), p2));
    if !ok1 || !ok2 {
        return false;
    }
    match role {
        MatrixRole::Destination => view.op() == super::ElemOp::Identity && lead1 == 1,
        MatrixRole::ConjugatedSource => lead2 == 1,
        MatrixRole::PlainSource => lead1 == 1 || lead2 == 1,
    }
}

/// Fuses two axis groups into matrix dimensions `(rows, cols)` with their
/// leading strides. Returns `None` when either group does not fuse.
pub fn fuse2d(
    sizes: &[usize],
    strides: &[isize],
    p1: &[usize],
    p2: &[usize],
) -> Option<(usize, usize, isize, isize)> {
    let (ok1, rows, rs) = canfuse(&gather(sizes, p1), &gather(strides, p1));
    let (ok2, cols, cs) = canfuse(&gather(sizes, p2), &gather(strides, p2));
    if !ok1 || !ok2 {
        return None;
    }
    Some((rows, cols, rs, cs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::Tensor;

    #[test]
    fn test_canfuse_contiguous() {
        let (ok, total, lead) = canfuse(&[2, 3, 4], &[1, 2, 6]);
        assert!(ok);
        assert_eq!(total, 24);
        assert_eq!(lead, 1);
    }

    #[test]
    fn test_canfuse_skips_unit_axes() {
        let (ok, total, lead) = canfuse(&[2, 1, 4], &[1, 99, 2]);
        assert!(ok);
        assert_eq!(total, 8);
        assert_eq!(lead, 1);
    }

    #[test]
    fn test_canfuse_rejects_gaps() {
        let (ok, _, _) = canfuse(&[2, 3], &[1, 4]);
        assert!(!ok);
    }

    #[test]
    fn test_canfuse_zero_axis() {
        let (ok, total, _) = canfuse(&[2, 0], &[1, 2]);
        assert!(ok);
        assert_eq!(total, 0);
    }

    #[test]
    fn test_empty_group_fuses_to_unit() {
        let (ok, total, lead) = canfuse(&[], &[]);
        assert!(ok);
        assert_eq!(total, 1);
        assert_eq!(lead, 1);
    }

    #[test]
    fn test_blas_contractable_dense_matrix() {
        let t = Tensor::<f64>::zeros(&[4, 5]);
        let v = t.view();
        assert!(is_blas_contractable(&v, &[0], &[1], MatrixRole::Destination));
        assert!(is_blas_contractable(&v, &[0], &[1], MatrixRole::PlainSource));
        // Transposed orientation: rows have stride 4.
        let vt = t.view().permutedims(&[1, 0]).unwrap();
        assert!(!is_blas_contractable(&vt, &[0], &[1], MatrixRole::Destination));
        assert!(is_blas_contractable(&vt, &[0], &[1], MatrixRole::ConjugatedSource));
        assert!(is_blas_contractable(&vt, &[0], &[1], MatrixRole::PlainSource));
    }

    #[test]
    fn test_integer_elements_never_blas() {
        let t = Tensor::<i64>::zeros(&[4, 5]);
        assert!(!is_blas_contractable(&t.view(), &[0], &[1], MatrixRole::PlainSource));
    }
}
