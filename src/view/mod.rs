//! Dense column-major tensors and strided views over them.
//!
//! A view is a descriptor (sizes, strides, offset, elementwise op) over a
//! borrowed buffer. Kernels never walk raw buffers directly: they build
//! permuted, reshaped, or broadcast views and traverse those.

pub mod fuse;

use num_traits::{One, Zero};
use smallvec::SmallVec;

use crate::error::{TensorOpsError, TensorOpsResult};
use crate::index::is_permutation;
use crate::types::Scalar;

/// Axis sizes of a tensor or view.
pub type Shape = SmallVec<[usize; 8]>;
/// Axis strides, in elements.
pub type Strides = SmallVec<[isize; 8]>;

/// The elementwise op a view applies on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemOp {
    Identity,
    Conj,
}

/// Column-major strides for a dense shape (axis 0 is fastest).
pub fn col_major_strides(sizes: &[usize]) -> Strides {
    let mut strides = Strides::with_capacity(sizes.len());
    let mut step = 1isize;
    for &s in sizes {
        strides.push(step);
        step *= s as isize;
    }
    strides
}

/// Gathers `src[i]` for each `i` in `idx`.
pub(crate) fn gather<I: Copy>(src: &[I], idx: &[usize]) -> SmallVec<[I; 8]> {
    idx.iter().map(|&i| src[i]).collect()
}

/// Visits every multi-index of `shape` in column-major order.
pub(crate) fn for_each_index(shape: &[usize], mut f: impl FnMut(&[usize])) {
    if shape.iter().any(|&s| s == 0) {
        return;
    }
    let mut idx: SmallVec<[usize; 8]> = SmallVec::from_elem(0, shape.len());
    loop {
        f(&idx);
        let mut axis = 0;
        loop {
            if axis == shape.len() {
                return;
            }
            idx[axis] += 1;
            if idx[axis] < shape[axis] {
                break;
            }
            idx[axis] = 0;
            axis += 1;
        }
    }
}

#[inline]
fn element_offset(offset: usize, strides: &[isize], idx: &[usize]) -> usize {
    let mut off = offset as isize;
    for (&i, &s) in idx.iter().zip(strides.iter()) {
        off += i as isize * s;
    }
    off as usize
}

/// An owned dense tensor with column-major storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    sizes: Shape,
    data: Vec<T>,
}

impl<T: Scalar> Tensor<T> {
    /// Allocates a zero-filled tensor.
    pub fn zeros(sizes: &[usize]) -> Self {
        let len = sizes.iter().product();
        Self {
            sizes: Shape::from_slice(sizes),
            data: vec![T::zero(); len],
        }
    }

    /// Builds a tensor from a column-major data vector.
    pub fn from_vec(sizes: &[usize], data: Vec<T>) -> TensorOpsResult<Self> {
        let len: usize = sizes.iter().product();
        if data.len() != len {
            return Err(TensorOpsError::dimensions(format!(
                "shape {:?} holds {} elements, got {}",
                sizes,
                len,
                data.len()
            )));
        }
        Ok(Self {
            sizes: Shape::from_slice(sizes),
            data,
        })
    }

    /// Builds a tensor by evaluating `f` at every multi-index.
    pub fn from_fn(sizes: &[usize], mut f: impl FnMut(&[usize]) -> T) -> Self {
        let mut out = Self::zeros(sizes);
        let strides = col_major_strides(sizes);
        for_each_index(sizes, |idx| {
            let off = element_offset(0, &strides, idx);
            out.data[off] = f(idx);
        });
        out
    }

    /// Number of axes.
    #[inline]
    pub fn rank(&self) -> usize {
        self.sizes.len()
    }

    /// Axis sizes.
    #[inline]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Size of one axis.
    #[inline]
    pub fn size(&self, axis: usize) -> usize {
        self.sizes[axis]
    }

    /// Total number of elements.
    #[inline]
    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    /// Reads the element at a multi-index.
    pub fn get(&self, idx: &[usize]) -> T {
        let strides = col_major_strides(&self.sizes);
        self.data[element_offset(0, &strides, idx)]
    }

    /// Writes the element at a multi-index.
    pub fn set(&mut self, idx: &[usize], value: T) {
        let strides = col_major_strides(&self.sizes);
        let off = element_offset(0, &strides, idx);
        self.data[off] = value;
    }

    /// The underlying column-major storage.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The underlying column-major storage, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// A read view over the whole tensor.
    pub fn view(&self) -> StridedView<'_, T> {
        StridedView {
            data: &self.data,
            sizes: self.sizes.clone(),
            strides: col_major_strides(&self.sizes),
            offset: 0,
            op: ElemOp::Identity,
        }
    }

    /// A write view over the whole tensor.
    pub fn view_mut(&mut self) -> StridedViewMut<'_, T> {
        let strides = col_major_strides(&self.sizes);
        StridedViewMut {
            sizes: self.sizes.clone(),
            strides,
            offset: 0,
            data: &mut self.data,
        }
    }
}

/// A read-only strided view.
#[derive(Debug, Clone)]
pub struct StridedView<'a, T> {
    data: &'a [T],
    sizes: Shape,
    strides: Strides,
    offset: usize,
    op: ElemOp,
}

impl<'a, T: Scalar> StridedView<'a, T> {
    /// Builds a view from raw layout components.
    ///
    /// Every element reachable through `sizes`/`strides`/`offset` must lie
    /// inside `data`; reads are bounds-checked, so a bad layout panics
    /// rather than reading out of bounds.
    pub fn from_parts(
        data: &'a [T],
        sizes: &[usize],
        strides: &[isize],
        offset: usize,
        op: ElemOp,
    ) -> Self {
        Self {
            data,
            sizes: Shape::from_slice(sizes),
            strides: Strides::from_slice(strides),
            offset,
            op,
        }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.sizes.len()
    }

    #[inline]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn op(&self) -> ElemOp {
        self.op
    }

    #[inline]
    pub fn num_elements(&self) -> usize {
        self.sizes.iter().product()
    }

    /// Returns the view with the elementwise op replaced.
    pub fn with_op(mut self, op: ElemOp) -> Self {
        self.op = op;
        self
    }

    /// Reads one element, applying the elementwise op.
    #[inline]
    pub fn load(&self, idx: &[usize]) -> T {
        let value = self.data[element_offset(self.offset, &self.strides, idx)];
        match self.op {
            ElemOp::Identity => value,
            ElemOp::Conj => value.conj(),
        }
    }

    /// Returns a view with axes reordered so that axis `k` of the result is
    /// axis `perm[k]` of `self`.
    pub fn permutedims(&self, perm: &[usize]) -> TensorOpsResult<Self> {
        if !is_permutation(perm, self.rank()) {
            return Err(TensorOpsError::indices(format!(
                "{:?} is not a permutation of 0..{}",
                perm,
                self.rank()
            )));
        }
        Ok(Self {
            data: self.data,
            sizes: gather(&self.sizes, perm),
            strides: gather(&self.strides, perm),
            offset: self.offset,
            op: self.op,
        })
    }

    /// Reshapes into `new_sizes`, succeeding only when each target axis is
    /// a fusable group of source axes.
    pub fn sreshape(&self, new_sizes: &[usize]) -> TensorOpsResult<Self> {
        let strides = reshape_strides(&self.sizes, &self.strides, new_sizes)?;
        Ok(Self {
            data: self.data,
            sizes: Shape::from_slice(new_sizes),
            strides,
            offset: self.offset,
            op: self.op,
        })
    }

    /// Inserts broadcast axes (stride 0) of the given sizes at `pos`.
    pub fn insert_broadcast_axes(&self, pos: usize, sizes: &[usize]) -> Self {
        let mut new_sizes = self.sizes.clone();
        let mut new_strides = self.strides.clone();
        for (k, &s) in sizes.iter().enumerate() {
            new_sizes.insert(pos + k, s);
            new_strides.insert(pos + k, 0);
        }
        Self {
            data: self.data,
            sizes: new_sizes,
            strides: new_strides,
            offset: self.offset,
            op: self.op,
        }
    }
}

/// A mutable strided view; the destination side of every kernel.
#[derive(Debug)]
pub struct StridedViewMut<'a, T> {
    data: &'a mut [T],
    sizes: Shape,
    strides: Strides,
    offset: usize,
}

impl<'a, T: Scalar> StridedViewMut<'a, T> {
    #[inline]
    pub fn rank(&self) -> usize {
        self.sizes.len()
    }

    #[inline]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    #[inline]
    pub fn num_elements(&self) -> usize {
        self.sizes.iter().product()
    }

    /// Reads one element.
    #[inline]
    pub fn load(&self, idx: &[usize]) -> T {
        self.data[element_offset(self.offset, &self.strides, idx)]
    }

    /// Writes one element.
    #[inline]
    pub fn store(&mut self, idx: &[usize], value: T) {
        let off = element_offset(self.offset, &self.strides, idx);
        self.data[off] = value;
    }

    /// Reorders axes; see [`StridedView::permutedims`].
    pub fn permutedims(self, perm: &[usize]) -> TensorOpsResult<Self> {
        if !is_permutation(perm, self.sizes.len()) {
            return Err(TensorOpsError::indices(format!(
                "{:?} is not a permutation of 0..{}",
                perm,
                self.sizes.len()
            )));
        }
        let sizes = gather(&self.sizes, perm);
        let strides = gather(&self.strides, perm);
        Ok(Self {
            data: self.data,
            sizes,
            strides,
            offset: self.offset,
        })
    }

    /// Scales every element by `beta`; `beta == 0` overwrites with zeros.
    pub fn scale(&mut self, beta: T) {
        if beta == T::one() {
            return;
        }
        let sizes = self.sizes.clone();
        let strides = self.strides.clone();
        let offset = self.offset;
        if beta == T::zero() {
            for_each_index(&sizes, |idx| {
                self.data[element_offset(offset, &strides, idx)] = T::zero();
            });
        } else {
            for_each_index(&sizes, |idx| {
                let off = element_offset(offset, &strides, idx);
                self.data[off] *= beta;
            });
        }
    }
}

/// `y ← β·y + α·x` over equally shaped views.
///
/// With `β == 0` the destination's prior contents are ignored entirely.
pub fn axpby<T: Scalar>(
    alpha: T,
    x: &StridedView<'_, T>,
    beta: T,
    y: &mut StridedViewMut<'_, T>,
) -> TensorOpsResult<()> {
    if x.sizes() != y.sizes() {
        return Err(TensorOpsError::dimensions(format!(
            "axpby shapes differ: {:?} vs {:?}",
            x.sizes(),
            y.sizes()
        )));
    }
    let sizes = Shape::from_slice(x.sizes());
    if beta == T::zero() {
        for_each_index(&sizes, |idx| {
            y.store(idx, alpha * x.load(idx));
        });
    } else if beta == T::one() {
        for_each_index(&sizes, |idx| {
            let updated = y.load(idx) + alpha * x.load(idx);
            y.store(idx, updated);
        });
    } else {
        for_each_index(&sizes, |idx| {
            let updated = beta * y.load(idx) + alpha * x.load(idx);
            y.store(idx, updated);
        });
    }
    Ok(())
}

fn reshape_strides(
    sizes: &[usize],
    strides: &[isize],
    new_sizes: &[usize],
) -> TensorOpsResult<Strides> {
    let old_len: usize = sizes.iter().product();
    let new_len: usize = new_sizes.iter().product();
    if old_len != new_len {
        return Err(TensorOpsError::dimensions(format!(
            "cannot reshape {:?} into {:?}",
            sizes, new_sizes
        )));
    }
    if new_len == 0 {
        return Ok(col_major_strides(new_sizes));
    }

    let mut out = Strides::with_capacity(new_sizes.len());
    let mut cursor = 0;
    for &target in new_sizes {
        if target == 1 {
            out.push(1);
            continue;
        }
        while cursor < sizes.len() && sizes[cursor] == 1 {
            cursor += 1;
        }
        let start = cursor;
        let mut prod = 1usize;
        while prod < target && cursor < sizes.len() {
            if sizes[cursor] != 1 {
                prod *= sizes[cursor];
            }
            cursor += 1;
        }
        if prod != target {
            return Err(TensorOpsError::dimensions(format!(
                "axis group of {:?} does not multiply out to {}",
                sizes, target
            )));
        }
        let group: SmallVec<[usize; 8]> = (start..cursor).collect();
        let (fusable, _, lead) = fuse::canfuse(&gather(sizes, &group), &gather(strides, &group));
        if !fusable {
            return Err(TensorOpsError::dimensions(format!(
                "axes {:?} of shape {:?} are not contiguous and cannot be fused",
                group, sizes
            )));
        }
        out.push(lead);
    }
    if sizes[cursor..].iter().any(|&s| s != 1) {
        return Err(TensorOpsError::dimensions(format!(
            "cannot reshape {:?} into {:?}",
            sizes, new_sizes
        )));
    }
    Ok(out)
}
