//! Shape derivation and destination allocation.
//!
//! Given reference operands and axis selections, these helpers produce the
//! shape descriptor of a destination and allocate it, optionally through
//! the temporary cache.

use crate::cache;
use crate::config::{self, SiteTag};
use crate::types::Scalar;
use crate::view::{Shape, Tensor, gather};

/// Shape of a destination whose axes are the `left` then `right` axes of
/// `a`.
pub fn similar_structure<T: Scalar>(left: &[usize], right: &[usize], a: &Tensor<T>) -> Shape {
    let mut shape = gather(a.sizes(), left);
    shape.extend(gather(a.sizes(), right).into_iter());
    shape
}

/// Shape of a destination drawn from two operands: the `poa` axes of `a`
/// and `pob` axes of `b` are concatenated, then re-selected by `left` and
/// `right`.
pub fn similar_structure2<T: Scalar>(
    poa: &[usize],
    pob: &[usize],
    left: &[usize],
    right: &[usize],
    a: &Tensor<T>,
    b: &Tensor<T>,
) -> Shape {
    let mut pool = gather(a.sizes(), poa);
    pool.extend(gather(b.sizes(), pob).into_iter());
    let mut shape = gather(&pool, left);
    shape.extend(gather(&pool, right).into_iter());
    shape
}

/// Allocates a destination with the selected axes of `a`.
pub fn similar_from_indices<T: Scalar>(left: &[usize], right: &[usize], a: &Tensor<T>) -> Tensor<T> {
    Tensor::zeros(&similar_structure(left, right, a))
}

/// Allocates a destination drawn from two operands; see
/// [`similar_structure2`].
pub fn similar_from_indices2<T: Scalar>(
    poa: &[usize],
    pob: &[usize],
    left: &[usize],
    right: &[usize],
    a: &Tensor<T>,
    b: &Tensor<T>,
) -> Tensor<T> {
    Tensor::zeros(&similar_structure2(poa, pob, left, right, a, b))
}

/// Like [`similar_from_indices`], but reuses a cached tensor for this call
/// site when caching is enabled and the shapes agree.
pub fn cached_similar_from_indices<T: Scalar>(
    site: SiteTag,
    left: &[usize],
    right: &[usize],
    a: &Tensor<T>,
) -> Tensor<T> {
    let shape = similar_structure(left, right, a);
    alloc_cached(site, &shape)
}

/// Like [`similar_from_indices2`], but through the cache.
pub fn cached_similar_from_indices2<T: Scalar>(
    site: SiteTag,
    poa: &[usize],
    pob: &[usize],
    left: &[usize],
    right: &[usize],
    a: &Tensor<T>,
    b: &Tensor<T>,
) -> Tensor<T> {
    let shape = similar_structure2(poa, pob, left, right, a, b);
    alloc_cached(site, &shape)
}

fn alloc_cached<T: Scalar>(site: SiteTag, shape: &Shape) -> Tensor<T> {
    if config::cache_enabled() {
        if let Some(tensor) = cache::take_cached(site, shape) {
            return tensor;
        }
    }
    Tensor::zeros(shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similar_structure_selects_axes() {
        let a = Tensor::<f64>::zeros(&[2, 3, 4]);
        assert_eq!(similar_structure(&[2], &[0], &a).as_slice(), &[4, 2]);
    }

    #[test]
    fn test_similar_structure2_concatenates_then_selects() {
        let a = Tensor::<f64>::zeros(&[2, 3]);
        let b = Tensor::<f64>::zeros(&[5, 7]);
        // Pool is (a[0], b[1]) = (2, 7); re-selected reversed.
        let shape = similar_structure2(&[0], &[1], &[1], &[0], &a, &b);
        assert_eq!(shape.as_slice(), &[7, 2]);
    }

    #[test]
    fn test_cached_allocation_reuses_shape_matched_entry() {
        cache::flush_cache();
        config::enable_cache();
        let a = Tensor::<f64>::zeros(&[2, 3]);
        let site = SiteTag::fresh();
        let t = cached_similar_from_indices(site, &[0, 1], &[], &a);
        assert_eq!(t.sizes(), &[2, 3]);
        cache::store_cached(site, t);
        let again = cached_similar_from_indices::<f64>(site, &[0, 1], &[], &a);
        assert_eq!(again.sizes(), &[2, 3]);
        assert_eq!(cache::cache_size(), 0);
    }
}
