//! Permute-and-accumulate kernel.

use smallvec::SmallVec;

use crate::error::{TensorOpsError, TensorOpsResult};
use crate::index::is_permutation;
use crate::types::{Conj, Scalar};
use crate::view::{ElemOp, Tensor, axpby};

/// `C ← β·C + α·op(A)` with the axes of `A` permuted so that axis `i` of
/// `C` is axis `(left..., right...)[i]` of `A`.
///
/// The concatenated selections must be a permutation of `A`'s axes and the
/// selected sizes must match `C`.
pub fn add<T: Scalar>(
    alpha: T,
    a: &Tensor<T>,
    conja: Conj,
    beta: T,
    c: &mut Tensor<T>,
    left: &[usize],
    right: &[usize],
) -> TensorOpsResult<()> {
    let mut perm = SmallVec::<[usize; 8]>::from_slice(left);
    perm.extend_from_slice(right);
    if !is_permutation(&perm, a.rank()) {
        return Err(TensorOpsError::indices(format!(
            "add selections {:?} are not a permutation of 0..{}",
            perm,
            a.rank()
        )));
    }
    if c.rank() != perm.len() {
        return Err(TensorOpsError::indices(format!(
            "add destination has rank {}, selections cover {}",
            c.rank(),
            perm.len()
        )));
    }
    for (i, &p) in perm.iter().enumerate() {
        if c.size(i) != a.size(p) {
            return Err(TensorOpsError::dimensions(format!(
                "add axis {} of destination has size {}, source axis {} has size {}",
                i,
                c.size(i),
                p,
                a.size(p)
            )));
        }
    }

    let op = if conja.conjugates() {
        ElemOp::Conj
    } else {
        ElemOp::Identity
    };
    let permuted = a.view().with_op(op).permutedims(&perm)?;
    axpby(alpha, &permuted, beta, &mut c.view_mut())
}
