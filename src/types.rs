//! Element types and the GEMM binding.

use core::fmt::Debug;

use matrixmultiply::CGemmOption;
use num_complex::{Complex32, Complex64};
use num_traits::NumAssign;

/// A conjugation flag attached to a tensor operand.
///
/// `Plain` is the identity; `Conjugate` applies elementwise complex
/// conjugation; `Adjoint` applies the elementwise adjoint, which equals
/// `Conjugate` for numeric scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Conj {
    Plain,
    Conjugate,
    Adjoint,
}

impl Conj {
    /// Whether elements read through this flag are conjugated.
    #[inline]
    pub fn conjugates(self) -> bool {
        !matches!(self, Conj::Plain)
    }
}

/// An element type the kernels can operate on.
///
/// The GEMM path is only taken for implementors with `BLAS == true`; every
/// other type always uses the native strided reduction.
pub trait Scalar: Copy + PartialEq + Debug + NumAssign + Send + Sync + 'static {
    /// Whether the GEMM path supports this element type.
    const BLAS: bool = false;

    /// Complex conjugate; the identity for real types.
    fn conj(self) -> Self;

    /// Converts a literal appearing in a compiled program.
    fn from_f64(value: f64) -> Self;

    /// Fused `C ← α·op(A)·op(B) + β·C` over 2-D strided buffers, where the
    /// matrices are `(m, k)`, `(k, n)`, and `(m, n)` with the given
    /// row/column strides.
    ///
    /// # Safety
    ///
    /// The pointers must address buffers valid for every element reachable
    /// through the given dimensions and strides, `c` must not alias `a` or
    /// `b`, and `Self::BLAS` must be true.
    #[allow(clippy::too_many_arguments)]
    unsafe fn gemm(
        m: usize,
        k: usize,
        n: usize,
        alpha: Self,
        a: *const Self,
        rsa: isize,
        csa: isize,
        conja: bool,
        b: *const Self,
        rsb: isize,
        csb: isize,
        conjb: bool,
        beta: Self,
        c: *mut Self,
        rsc: isize,
        csc: isize,
    ) {
        let _ = (
            m, k, n, alpha, a, rsa, csa, conja, b, rsb, csb, conjb, beta, c, rsc, csc,
        );
        unreachable!("gemm invoked for an element type without GEMM support");
    }
}

impl Scalar for f32 {
    const BLAS: bool = true;

    #[inline]
    fn conj(self) -> Self {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    unsafe fn gemm(
        m: usize,
        k: usize,
        n: usize,
        alpha: Self,
        a: *const Self,
        rsa: isize,
        csa: isize,
        _conja: bool,
        b: *const Self,
        rsb: isize,
        csb: isize,
        _conjb: bool,
        beta: Self,
        c: *mut Self,
        rsc: isize,
        csc: isize,
    ) {
        unsafe {
            matrixmultiply::sgemm(m, k, n, alpha, a, rsa, csa, b, rsb, csb, beta, c, rsc, csc);
        }
    }
}

impl Scalar for f64 {
    const BLAS: bool = true;

    #[inline]
    fn conj(self) -> Self {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    unsafe fn gemm(
        m: usize,
        k: usize,
        n: usize,
        alpha: Self,
        a: *const Self,
        rsa: isize,
        csa: isize,
        _conja: bool,
        b: *const Self,
        rsb: isize,
        csb: isize,
        _conjb: bool,
        beta: Self,
        c: *mut Self,
        rsc: isize,
        csc: isize,
    ) {
        unsafe {
            matrixmultiply::dgemm(m, k, n, alpha, a, rsa, csa, b, rsb, csb, beta, c, rsc, csc);
        }
    }
}

impl Scalar for Complex32 {
    const BLAS: bool = true;

    #[inline]
    fn conj(self) -> Self {
        Complex32::conj(&self)
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        Complex32::new(value as f32, 0.0)
    }

    unsafe fn gemm(
        m: usize,
        k: usize,
        n: usize,
        alpha: Self,
        a: *const Self,
        rsa: isize,
        csa: isize,
        conja: bool,
        b: *const Self,
        rsb: isize,
        csb: isize,
        conjb: bool,
        beta: Self,
        c: *mut Self,
        rsc: isize,
        csc: isize,
    ) {
        // `Complex32` is layout-compatible with matrixmultiply's `[f32; 2]`.
        unsafe {
            matrixmultiply::cgemm(
                cgemm_flag(conja),
                cgemm_flag(conjb),
                m,
                k,
                n,
                [alpha.re, alpha.im],
                a.cast(),
                rsa,
                csa,
                b.cast(),
                rsb,
                csb,
                [beta.re, beta.im],
                c.cast(),
                rsc,
                csc,
            );
        }
    }
}

impl Scalar for Complex64 {
    const BLAS: bool = true;

    #[inline]
    fn conj(self) -> Self {
        Complex64::conj(&self)
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        Complex64::new(value, 0.0)
    }

    unsafe fn gemm(
        m: usize,
        k: usize,
        n: usize,
        alpha: Self,
        a: *const Self,
        rsa: isize,
        csa: isize,
        conja: bool,
        b: *const Self,
        rsb: isize,
        csb: isize,
        conjb: bool,
        beta: Self,
        c: *mut Self,
        rsc: isize,
        csc: isize,
    ) {
        unsafe {
            matrixmultiply::zgemm(
                cgemm_flag(conja),
                cgemm_flag(conjb),
                m,
                k,
                n,
                [alpha.re, alpha.im],
                a.cast(),
                rsa,
                csa,
                b.cast(),
                rsb,
                csb,
                [beta.re, beta.im],
                c.cast(),
                rsc,
                csc,
            );
        }
    }
}

fn cgemm_flag(conj: bool) -> CGemmOption {
    if conj {
        CGemmOption::Conjugate
    } else {
        CGemmOption::Standard
    }
}

impl Scalar for i32 {
    #[inline]
    fn conj(self) -> Self {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as i32
    }
}

impl Scalar for i64 {
    #[inline]
    fn conj(self) -> Self {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as i64
    }
}
