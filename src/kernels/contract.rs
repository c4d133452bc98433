//! Pairwise-contraction kernel.
//!
//! `contract` validates the index arithmetic, then dispatches: eligible
//! element types go through GEMM, preparing permuted copies of any operand
//! that is not directly usable as a 2-D matrix; everything else reduces
//! natively over broadcast-padded strided views.

use num_traits::{One, Zero};
use smallvec::SmallVec;

use super::{add, reduce_pairwise};
use crate::cache;
use crate::config::{self, SiteTag};
use crate::error::{TensorOpsError, TensorOpsResult};
use crate::index::is_permutation;
use crate::structure::{cached_similar_from_indices, similar_from_indices};
use crate::types::{Conj, Scalar};
use crate::view::fuse::{MatrixRole, fuse2d, is_blas_contractable};
use crate::view::{ElemOp, Shape, Tensor, col_major_strides, gather};

type Axes = SmallVec<[usize; 8]>;

/// Call-site tags for the three temporaries a contraction may materialize.
#[derive(Debug, Clone, Copy)]
pub struct ContractSites {
    pub a: SiteTag,
    pub b: SiteTag,
    pub c: SiteTag,
}

impl ContractSites {
    /// Tags for a contraction site, one per potential temporary.
    pub fn fresh() -> Self {
        Self {
            a: SiteTag::fresh(),
            b: SiteTag::fresh(),
            c: SiteTag::fresh(),
        }
    }

    fn swapped(self) -> Self {
        Self {
            a: self.b,
            b: self.a,
            c: self.c,
        }
    }
}

/// `C ← β·C + α·contract(opA(A), opB(B))`.
///
/// Axes `cinda` of `A` are contracted against `cindb` of `B`; the open axes
/// `(oinda..., oindb...)` are permuted into `C` so that axis `i` of `C` is
/// open axis `ind_c_in_oab[i]`. With `sites` provided, temporaries the
/// GEMM path materializes go through the call-site cache.
#[allow(clippy::too_many_arguments)]
pub fn contract<T: Scalar>(
    alpha: T,
    a: &Tensor<T>,
    conja: Conj,
    b: &Tensor<T>,
    conjb: Conj,
    beta: T,
    c: &mut Tensor<T>,
    oinda: &[usize],
    cinda: &[usize],
    oindb: &[usize],
    cindb: &[usize],
    ind_c_in_oab: &[usize],
    sites: Option<ContractSites>,
) -> TensorOpsResult<()> {
    validate(a, b, c, oinda, cinda, oindb, cindb, ind_c_in_oab)?;

    if c.num_elements() == 0 {
        return Ok(());
    }
    let contracted_len: usize = gather(a.sizes(), cinda).iter().product();
    if contracted_len == 0 {
        c.view_mut().scale(beta);
        return Ok(());
    }

    if T::BLAS && config::blas_enabled() {
        let (swap, sites) = choose_orientation(a, conja, b, conjb, c, oinda, cinda, oindb, cindb, ind_c_in_oab, sites);
        if swap {
            let remapped = remap_swapped(ind_c_in_oab, oinda.len(), oindb.len());
            blas_contract(
                alpha, b, conjb, a, conja, beta, c, oindb, cindb, oinda, cinda, &remapped, sites,
            )
        } else {
            blas_contract(
                alpha, a, conja, b, conjb, beta, c, oinda, cinda, oindb, cindb, ind_c_in_oab, sites,
            )
        }
    } else {
        native_contract(
            alpha, a, conja, b, conjb, beta, c, oinda, cinda, oindb, cindb, ind_c_in_oab,
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn validate<T: Scalar>(
    a: &Tensor<T>,
    b: &Tensor<T>,
    c: &Tensor<T>,
    oinda: &[usize],
    cinda: &[usize],
    oindb: &[usize],
    cindb: &[usize],
    ind_c_in_oab: &[usize],
) -> TensorOpsResult<()> {
    if cinda.len() != cindb.len() {
        return Err(TensorOpsError::indices(format!(
            "contracted selections differ in length: {} vs {}",
            cinda.len(),
            cindb.len()
        )));
    }
    let mut pa = Axes::from_slice(oinda);
    pa.extend_from_slice(cinda);
    if !is_permutation(&pa, a.rank()) {
        return Err(TensorOpsError::indices(format!(
            "selections {:?} are not a permutation of 0..{}",
            pa,
            a.rank()
        )));
    }
    let mut pb = Axes::from_slice(oindb);
    pb.extend_from_slice(cindb);
    if !is_permutation(&pb, b.rank()) {
        return Err(TensorOpsError::indices(format!(
            "selections {:?} are not a permutation of 0..{}",
            pb,
            b.rank()
        )));
    }
    if !is_permutation(ind_c_in_oab, c.rank()) || c.rank() != oinda.len() + oindb.len() {
        return Err(TensorOpsError::indices(format!(
            "output selection {:?} is not a permutation of the {} open axes",
            ind_c_in_oab,
            oinda.len() + oindb.len()
        )));
    }
    for (&pa, &pb) in cinda.iter().zip(cindb.iter()) {
        if a.size(pa) != b.size(pb) {
            return Err(TensorOpsError::dimensions(format!(
                "contracted axes {} and {} have sizes {} and {}",
                pa,
                pb,
                a.size(pa),
                b.size(pb)
            )));
        }
    }
    let mut oab = gather(a.sizes(), oinda);
    oab.extend(gather(b.sizes(), oindb).into_iter());
    for (i, &j) in ind_c_in_oab.iter().enumerate() {
        if c.size(i) != oab[j] {
            return Err(TensorOpsError::dimensions(format!(
                "output axis {} has size {}, open axis {} has size {}",
                i,
                c.size(i),
                j,
                oab[j]
            )));
        }
    }
    Ok(())
}

/// Splits the inverse of `ind_c_in_oab` into the destination positions of
/// the `A`-open and `B`-open axes.
fn destination_split(ind_c_in_oab: &[usize], na: usize) -> (Axes, Axes) {
    let mut inverse = Axes::from_elem(0, ind_c_in_oab.len());
    for (i, &j) in ind_c_in_oab.iter().enumerate() {
        inverse[j] = i;
    }
    let oind_a_in_c = Axes::from_slice(&inverse[..na]);
    let oind_b_in_c = Axes::from_slice(&inverse[na..]);
    (oind_a_in_c, oind_b_in_c)
}

fn source_role(conj: Conj) -> MatrixRole {
    if conj.conjugates() {
        MatrixRole::ConjugatedSource
    } else {
        MatrixRole::PlainSource
    }
}

fn source_op(conj: Conj) -> ElemOp {
    if conj.conjugates() {
        ElemOp::Conj
    } else {
        ElemOp::Identity
    }
}

/// Estimates the memory cost of both operand orderings and picks the
/// cheaper; the cost of an operand is its length if it would need a
/// prepared copy, zero if it is usable in place.
#[allow(clippy::too_many_arguments)]
fn choose_orientation<T: Scalar>(
    a: &Tensor<T>,
    conja: Conj,
    b: &Tensor<T>,
    conjb: Conj,
    c: &Tensor<T>,
    oinda: &[usize],
    cinda: &[usize],
    oindb: &[usize],
    cindb: &[usize],
    ind_c_in_oab: &[usize],
    sites: Option<ContractSites>,
) -> (bool, Option<ContractSites>) {
    let va = a.view().with_op(source_op(conja));
    let vb = b.view().with_op(source_op(conjb));
    let vc = c.view();
    let (oind_a_in_c, oind_b_in_c) = destination_split(ind_c_in_oab, oinda.len());

    let cost = |direct: bool, len: usize| if direct { 0 } else { len };
    let cost_ab = cost(
        is_blas_contractable(&va, oinda, cinda, source_role(conja)),
        a.num_elements(),
    ) + cost(
        is_blas_contractable(&vb, cindb, oindb, source_role(conjb)),
        b.num_elements(),
    ) + cost(
        is_blas_contractable(&vc, &oind_a_in_c, &oind_b_in_c, MatrixRole::Destination),
        c.num_elements(),
    );
    let cost_ba = cost(
        is_blas_contractable(&vb, oindb, cindb, source_role(conjb)),
        b.num_elements(),
    ) + cost(
        is_blas_contractable(&va, cinda, oinda, source_role(conja)),
        a.num_elements(),
    ) + cost(
        is_blas_contractable(&vc, &oind_b_in_c, &oind_a_in_c, MatrixRole::Destination),
        c.num_elements(),
    );

    if cost_ba < cost_ab {
        (true, sites.map(ContractSites::swapped))
    } else {
        (false, sites)
    }
}

/// Remaps the output selection after swapping the operand order.
fn remap_swapped(ind_c_in_oab: &[usize], na: usize, nb: usize) -> Axes {
    ind_c_in_oab
        .iter()
        .map(|&j| if j < na { j + nb } else { j - na })
        .collect()
}

/// One prepared GEMM operand: either the original tensor used in place or
/// a permuted temporary.
struct Prepared<T: Scalar> {
    temp: Option<(Tensor<T>, Option<SiteTag>)>,
    rows: usize,
    cols: usize,
    rs: isize,
    cs: isize,
    conj: bool,
}

impl<T: Scalar> Prepared<T> {
    fn release(self) {
        if let Some((tensor, Some(site))) = self.temp {
            cache::store_cached(site, tensor);
        }
    }
}

/// Prepares a source operand as a `(p1-product, p2-product)` matrix,
/// copying through `add` when it is not directly contractable.
fn prepare_source<T: Scalar>(
    operand: &Tensor<T>,
    conj: Conj,
    p1: &[usize],
    p2: &[usize],
    site: Option<SiteTag>,
) -> TensorOpsResult<Prepared<T>> {
    let view = operand.view().with_op(source_op(conj));
    if is_blas_contractable(&view, p1, p2, source_role(conj)) {
        let strides = col_major_strides(operand.sizes());
        let (rows, cols, rs, cs) = fuse2d(operand.sizes(), &strides, p1, p2)
            .expect("contractable operand must fuse");
        return Ok(Prepared {
            temp: None,
            rows,
            cols,
            rs,
            cs,
            conj: conj.conjugates(),
        });
    }

    let use_cache = site.is_some() && config::cache_enabled();
    let mut temp = match (use_cache, site) {
        (true, Some(site)) => cached_similar_from_indices(site, p1, p2, operand),
        _ => similar_from_indices(p1, p2, operand),
    };
    add(T::one(), operand, conj, T::zero(), &mut temp, p1, p2)?;
    let rows: usize = gather(operand.sizes(), p1).iter().product();
    let cols: usize = gather(operand.sizes(), p2).iter().product();
    Ok(Prepared {
        temp: Some((temp, if use_cache { site } else { None })),
        rows,
        cols,
        rs: 1,
        cs: rows as isize,
        conj: false,
    })
}

#[allow(clippy::too_many_arguments)]
fn blas_contract<T: Scalar>(
    alpha: T,
    a: &Tensor<T>,
    conja: Conj,
    b: &Tensor<T>,
    conjb: Conj,
    beta: T,
    c: &mut Tensor<T>,
    oinda: &[usize],
    cinda: &[usize],
    oindb: &[usize],
    cindb: &[usize],
    ind_c_in_oab: &[usize],
    sites: Option<ContractSites>,
) -> TensorOpsResult<()> {
    let (oind_a_in_c, oind_b_in_c) = destination_split(ind_c_in_oab, oinda.len());

    let pa = prepare_source(a, conja, oinda, cinda, sites.map(|s| s.a))?;
    let pb = prepare_source(b, conjb, cindb, oindb, sites.map(|s| s.b))?;
    let (m, k) = (pa.rows, pa.cols);
    let n = pb.cols;

    let a_ptr: *const T = match &pa.temp {
        Some((t, _)) => t.as_slice().as_ptr(),
        None => a.as_slice().as_ptr(),
    };
    let b_ptr: *const T = match &pb.temp {
        Some((t, _)) => t.as_slice().as_ptr(),
        None => b.as_slice().as_ptr(),
    };

    let c_strides = col_major_strides(c.sizes());
    let direct =
        is_blas_contractable(&c.view(), &oind_a_in_c, &oind_b_in_c, MatrixRole::Destination);
    if direct {
        let (rows, cols, rsc, csc) = fuse2d(c.sizes(), &c_strides, &oind_a_in_c, &oind_b_in_c)
            .expect("contractable destination must fuse");
        debug_assert_eq!((rows, cols), (m, n));
        unsafe {
            T::gemm(
                m,
                k,
                n,
                alpha,
                a_ptr,
                pa.rs,
                pa.cs,
                pa.conj,
                b_ptr,
                pb.rs,
                pb.cs,
                pb.conj,
                beta,
                c.as_mut_slice().as_mut_ptr(),
                rsc,
                csc,
            );
        }
        pa.release();
        pb.release();
        return Ok(());
    }

    // Multiply into a temporary laid out in open-axis order, then permute
    // and accumulate into the real destination.
    let oab_shape: Shape = {
        let mut s = gather(a.sizes(), oinda);
        s.extend(gather(b.sizes(), oindb).into_iter());
        s
    };
    let use_cache = sites.is_some() && config::cache_enabled();
    let mut temp = match (use_cache, sites) {
        (true, Some(s)) => {
            cache::take_cached(s.c, &oab_shape).unwrap_or_else(|| Tensor::zeros(&oab_shape))
        }
        _ => Tensor::zeros(&oab_shape),
    };
    unsafe {
        T::gemm(
            m,
            k,
            n,
            T::one(),
            a_ptr,
            pa.rs,
            pa.cs,
            pa.conj,
            b_ptr,
            pb.rs,
            pb.cs,
            pb.conj,
            T::zero(),
            temp.as_mut_slice().as_mut_ptr(),
            1,
            m as isize,
        );
    }
    pa.release();
    pb.release();
    add(alpha, &temp, Conj::Plain, beta, c, ind_c_in_oab, &[])?;
    if let (true, Some(s)) = (use_cache, sites) {
        cache::store_cached(s.c, temp);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn native_contract<T: Scalar>(
    alpha: T,
    a: &Tensor<T>,
    conja: Conj,
    b: &Tensor<T>,
    conjb: Conj,
    beta: T,
    c: &mut Tensor<T>,
    oinda: &[usize],
    cinda: &[usize],
    oindb: &[usize],
    cindb: &[usize],
    ind_c_in_oab: &[usize],
) -> TensorOpsResult<()> {
    let na = oinda.len();
    let open_a = gather(a.sizes(), oinda);
    let open_b = gather(b.sizes(), oindb);

    let mut pa = Axes::from_slice(oinda);
    pa.extend_from_slice(cinda);
    let va = a
        .view()
        .with_op(source_op(conja))
        .permutedims(&pa)?
        .insert_broadcast_axes(na, &open_b);

    let mut pb = Axes::from_slice(oindb);
    pb.extend_from_slice(cindb);
    let vb = b
        .view()
        .with_op(source_op(conjb))
        .permutedims(&pb)?
        .insert_broadcast_axes(0, &open_a);

    let mut inverse = Axes::from_elem(0, ind_c_in_oab.len());
    for (i, &j) in ind_c_in_oab.iter().enumerate() {
        inverse[j] = i;
    }
    let mut dst = c.view_mut().permutedims(&inverse)?;
    reduce_pairwise(alpha, &va, Some(&vb), beta, &mut dst);
    Ok(())
}
