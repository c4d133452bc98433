//! The primitive kernels: permute-accumulate, partial trace, and pairwise
//! contraction.

mod add;
mod contract;
mod trace;

pub use add::add;
pub use contract::{ContractSites, contract};
pub use trace::trace;

use num_traits::One;

use crate::types::Scalar;
use crate::view::{Shape, StridedView, StridedViewMut, for_each_index};

/// Reduces the trailing axes of one or two equally shaped sources into a
/// destination holding the leading axes:
/// `dst ← β·dst + α·Σ a` or `dst ← β·dst + α·Σ a·b`.
///
/// The sources' leading sizes must equal the destination's sizes; with
/// `β == 0` the destination's prior contents are ignored, and zero-size
/// reduction axes leave `β·dst`.
pub(crate) fn reduce_pairwise<T: Scalar>(
    alpha: T,
    a: &StridedView<'_, T>,
    b: Option<&StridedView<'_, T>>,
    beta: T,
    dst: &mut StridedViewMut<'_, T>,
) {
    debug_assert_eq!(&a.sizes()[..dst.rank()], dst.sizes());
    dst.scale(beta);
    let nopen = dst.rank();
    let shape = Shape::from_slice(a.sizes());
    if alpha == T::one() {
        for_each_index(&shape, |idx| {
            let term = match b {
                Some(bv) => a.load(idx) * bv.load(idx),
                None => a.load(idx),
            };
            let updated = dst.load(&idx[..nopen]) + term;
            dst.store(&idx[..nopen], updated);
        });
    } else {
        for_each_index(&shape, |idx| {
            let term = match b {
                Some(bv) => alpha * a.load(idx) * bv.load(idx),
                None => alpha * a.load(idx),
            };
            let updated = dst.load(&idx[..nopen]) + term;
            dst.store(&idx[..nopen], updated);
        });
    }
}
