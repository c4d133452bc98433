//! Process-wide execution toggles.
//!
//! The GEMM path and the temporary cache can be switched on and off for the
//! whole process. Toggling mid-evaluation is not supported: kernels read the
//! flags once on entry, and compiled programs bake the caching decision in
//! at compile time.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static BLAS_ENABLED: AtomicBool = AtomicBool::new(true);
static CACHE_ENABLED: AtomicBool = AtomicBool::new(true);
static SITE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Enables the GEMM path for eligible element types.
pub fn enable_blas() {
    BLAS_ENABLED.store(true, Ordering::Relaxed);
}

/// Disables the GEMM path; every contraction takes the native strided path.
pub fn disable_blas() {
    BLAS_ENABLED.store(false, Ordering::Relaxed);
}

/// Returns whether the GEMM path is currently enabled.
#[inline]
pub fn blas_enabled() -> bool {
    BLAS_ENABLED.load(Ordering::Relaxed)
}

/// Enables the temporary cache for newly compiled programs and kernel calls
/// that carry site tags.
pub fn enable_cache() {
    CACHE_ENABLED.store(true, Ordering::Relaxed);
}

/// Disables the temporary cache; temporaries are always freshly allocated.
pub fn disable_cache() {
    CACHE_ENABLED.store(false, Ordering::Relaxed);
}

/// Returns whether the temporary cache is currently enabled.
#[inline]
pub fn cache_enabled() -> bool {
    CACHE_ENABLED.load(Ordering::Relaxed)
}

/// A stable tag identifying one temporary-allocating call site in compiled
/// code. Distinct call sites always receive distinct tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SiteTag(pub u64);

impl SiteTag {
    /// Returns a tag distinct from every tag handed out before.
    pub fn fresh() -> Self {
        SiteTag(SITE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}
