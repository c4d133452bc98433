//! Thread-local cache of scratch tensors.
//!
//! Entries are keyed by call-site tag and element type; the thread is the
//! task, so concurrent tasks never share scratch memory. An entry whose
//! stored shape no longer matches the request is discarded and replaced by
//! a fresh allocation.

use core::any::{Any, TypeId};
use std::cell::RefCell;

use hashbrown::HashMap;

use crate::config::SiteTag;
use crate::types::Scalar;
use crate::view::Tensor;

thread_local! {
    static CACHE: RefCell<HashMap<(SiteTag, TypeId), Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Removes and returns the cached tensor for a site, if present with the
/// requested shape. A shape mismatch discards the stale entry.
pub fn take_cached<T: Scalar>(site: SiteTag, sizes: &[usize]) -> Option<Tensor<T>> {
    CACHE.with(|cache| {
        let entry = cache.borrow_mut().remove(&(site, TypeId::of::<T>()))?;
        let tensor = entry.downcast::<Tensor<T>>().ok()?;
        if tensor.sizes() == sizes {
            Some(*tensor)
        } else {
            None
        }
    })
}

/// Stores a tensor for later reuse by the same call site.
pub fn store_cached<T: Scalar>(site: SiteTag, tensor: Tensor<T>) {
    CACHE.with(|cache| {
        cache
            .borrow_mut()
            .insert((site, TypeId::of::<T>()), Box::new(tensor));
    });
}

/// Number of tensors currently cached on this thread.
pub fn cache_size() -> usize {
    CACHE.with(|cache| cache.borrow().len())
}

/// Drops every cached tensor on this thread.
pub fn flush_cache() {
    CACHE.with(|cache| cache.borrow_mut().clear());
}
