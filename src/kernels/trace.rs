//! Partial-trace kernel.

use smallvec::SmallVec;

use super::reduce_pairwise;
use crate::error::{TensorOpsError, TensorOpsResult};
use crate::index::is_permutation;
use crate::types::{Conj, Scalar};
use crate::view::{ElemOp, Shape, StridedView, Strides, Tensor, col_major_strides, gather};

/// `C ← β·C + α·partial_trace(op(A))`.
///
/// Axis pairs `(cind1[k], cind2[k])` of `A` are traced; the remaining axes
/// are selected into `C` by `(left..., right...)`. The traced pair is
/// walked by a single synthetic axis whose stride is the sum of the two
/// axis strides, which steps along the diagonal.
#[allow(clippy::too_many_arguments)]
pub fn trace<T: Scalar>(
    alpha: T,
    a: &Tensor<T>,
    conja: Conj,
    beta: T,
    c: &mut Tensor<T>,
    left: &[usize],
    right: &[usize],
    cind1: &[usize],
    cind2: &[usize],
) -> TensorOpsResult<()> {
    let mut free = SmallVec::<[usize; 8]>::from_slice(left);
    free.extend_from_slice(right);
    if cind1.len() != cind2.len() {
        return Err(TensorOpsError::indices(format!(
            "trace pairs differ in length: {} vs {}",
            cind1.len(),
            cind2.len()
        )));
    }
    let mut all = free.clone();
    all.extend_from_slice(cind1);
    all.extend_from_slice(cind2);
    if !is_permutation(&all, a.rank()) {
        return Err(TensorOpsError::indices(format!(
            "trace selections {:?} are not a permutation of 0..{}",
            all,
            a.rank()
        )));
    }
    if c.rank() != free.len() {
        return Err(TensorOpsError::indices(format!(
            "trace destination has rank {}, free selections cover {}",
            c.rank(),
            free.len()
        )));
    }
    for (i, &p) in free.iter().enumerate() {
        if c.size(i) != a.size(p) {
            return Err(TensorOpsError::dimensions(format!(
                "trace axis {} of destination has size {}, source axis {} has size {}",
                i,
                c.size(i),
                p,
                a.size(p)
            )));
        }
    }
    for (&p1, &p2) in cind1.iter().zip(cind2.iter()) {
        if a.size(p1) != a.size(p2) {
            return Err(TensorOpsError::dimensions(format!(
                "traced axes {} and {} have sizes {} and {}",
                p1,
                p2,
                a.size(p1),
                a.size(p2)
            )));
        }
    }

    let strides_a = col_major_strides(a.sizes());
    let mut sizes: Shape = Shape::from_slice(c.sizes());
    sizes.extend(gather(a.sizes(), cind1).into_iter());
    let mut strides: Strides = gather(&strides_a, &free);
    for (&p1, &p2) in cind1.iter().zip(cind2.iter()) {
        strides.push(strides_a[p1] + strides_a[p2]);
    }
    let op = if conja.conjugates() {
        ElemOp::Conj
    } else {
        ElemOp::Identity
    };
    let diagonal = StridedView::from_parts(a.as_slice(), &sizes, &strides, 0, op);
    reduce_pairwise(alpha, &diagonal, None, beta, &mut c.view_mut());
    Ok(())
}
