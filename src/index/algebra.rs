//! Pure functions over label sequences.
//!
//! These compute the axis selections and permutations the kernels consume.
//! Each function validates its tuple-permutation postcondition and fails
//! with `InvalidIndices` when the labels do not line up.

use smallvec::SmallVec;

use super::label::Label;
use crate::error::{TensorOpsError, TensorOpsResult};

/// Axis positions into an operand.
pub type Axes = SmallVec<[usize; 8]>;

/// Checks that `p` is a permutation of `0..n`.
pub fn is_permutation(p: &[usize], n: usize) -> bool {
    if p.len() != n {
        return false;
    }
    let mut seen = SmallVec::<[bool; 8]>::from_elem(false, n);
    for &i in p {
        if i >= n || seen[i] {
            return false;
        }
        seen[i] = true;
    }
    true
}

/// Returns `a` with the first occurrence of each element of `b` removed.
///
/// Assumes `b ⊆ a` with multiplicity; order-preserving.
pub fn setdiff(a: &[Label], b: &[Label]) -> Vec<Label> {
    let mut remaining: Vec<&Label> = b.iter().collect();
    let mut out = Vec::with_capacity(a.len().saturating_sub(b.len()));
    for label in a {
        if let Some(pos) = remaining.iter().position(|r| *r == label) {
            remaining.swap_remove(pos);
        } else {
            out.push(label.clone());
        }
    }
    out
}

/// Deduplicates a sequence in which every element appears exactly twice,
/// preserving first-occurrence order.
pub fn unique_pairs(src: &[Label]) -> Vec<Label> {
    let mut out: Vec<Label> = Vec::with_capacity(src.len() / 2);
    for label in src {
        if !out.contains(label) {
            out.push(label.clone());
        }
    }
    out
}

/// Returns the permutation `p` with `ia[p[k]] == ic[k]`.
///
/// `ia` and `ic` must be equal as multisets.
pub fn add_permutation(ia: &[Label], ic: &[Label]) -> TensorOpsResult<Axes> {
    if ia.len() != ic.len() {
        return Err(TensorOpsError::indices(format!(
            "rank mismatch between source indices ({}) and destination indices ({})",
            ia.len(),
            ic.len()
        )));
    }
    let mut perm = Axes::new();
    for label in ic {
        // Repeated labels pick successive occurrences.
        let pos = ia
            .iter()
            .enumerate()
            .position(|(i, l)| l == label && !perm.contains(&i));
        match pos {
            Some(i) => perm.push(i),
            None => {
                return Err(TensorOpsError::indices(format!(
                    "index {} has no matching source axis",
                    label
                )));
            }
        }
    }
    if !is_permutation(&perm, ia.len()) {
        return Err(TensorOpsError::indices(format!(
            "indices [{}] are not a permutation of [{}]",
            display_labels(ic),
            display_labels(ia)
        )));
    }
    Ok(perm)
}

/// Computes the layout of a partial trace.
///
/// Returns `(ind_c_in_a, cind1, cind2)`: the positions in `ia` of each free
/// label of `ic`, and the first/second occurrence positions of each traced
/// label. The concatenation of the three lists must be a permutation of
/// `0..ia.len()`.
pub fn trace_layout(ia: &[Label], ic: &[Label]) -> TensorOpsResult<(Axes, Axes, Axes)> {
    let mut ind_c_in_a = Axes::new();
    for label in ic {
        match ia.iter().position(|l| l == label) {
            Some(i) => ind_c_in_a.push(i),
            None => {
                return Err(TensorOpsError::indices(format!(
                    "free index {} does not appear in the traced operand",
                    label
                )));
            }
        }
    }

    let traced = unique_pairs(&setdiff(ia, ic));
    let mut cind1 = Axes::new();
    let mut cind2 = Axes::new();
    for label in &traced {
        let positions: SmallVec<[usize; 2]> = ia
            .iter()
            .enumerate()
            .filter_map(|(i, l)| (l == label).then_some(i))
            .collect();
        if positions.len() != 2 {
            return Err(TensorOpsError::indices(format!(
                "traced index {} appears {} times, expected exactly 2",
                label,
                positions.len()
            )));
        }
        cind1.push(positions[0]);
        cind2.push(positions[1]);
    }

    let mut all = ind_c_in_a.clone();
    all.extend(cind1.iter().copied());
    all.extend(cind2.iter().copied());
    if !is_permutation(&all, ia.len()) {
        return Err(TensorOpsError::indices(format!(
            "trace selections over [{}] do not cover every axis exactly once",
            display_labels(ia)
        )));
    }
    Ok((ind_c_in_a, cind1, cind2))
}

/// Computes the layout of a pairwise contraction.
///
/// Returns `(oind_a, cind_a, oind_b, cind_b, ind_c_in_oab)`: open and
/// contracted axis positions in `a` and `b`, and for each label of `ic` its
/// position in the concatenation `(open_a..., open_b...)`.
pub fn contract_layout(
    ia: &[Label],
    ib: &[Label],
    ic: &[Label],
) -> TensorOpsResult<(Axes, Axes, Axes, Axes, Axes)> {
    for label in ia {
        let total = count(ia, label) + count(ib, label) + count(ic, label);
        if total > 2 {
            return Err(TensorOpsError::indices(format!(
                "index {} appears {} times across a contraction, maximum is 2",
                label, total
            )));
        }
    }

    let mut oind_a = Axes::new();
    let mut cind_a = Axes::new();
    let mut open_labels: Vec<&Label> = Vec::new();
    for (i, label) in ia.iter().enumerate() {
        if ib.contains(label) {
            cind_a.push(i);
        } else {
            oind_a.push(i);
            open_labels.push(label);
        }
    }

    let mut oind_b = Axes::new();
    let mut cind_b = Axes::new();
    for label in ia.iter().filter(|l| ib.contains(l)) {
        match ib.iter().position(|l| l == label) {
            Some(i) => cind_b.push(i),
            None => unreachable!(),
        }
    }
    for (i, label) in ib.iter().enumerate() {
        if !ia.contains(label) {
            oind_b.push(i);
            open_labels.push(label);
        }
    }

    let mut ind_c_in_oab = Axes::new();
    for label in ic {
        match open_labels.iter().position(|l| *l == label) {
            Some(i) => ind_c_in_oab.push(i),
            None => {
                return Err(TensorOpsError::indices(format!(
                    "output index {} is not an open index of the contraction",
                    label
                )));
            }
        }
    }
    if !is_permutation(&ind_c_in_oab, open_labels.len()) {
        return Err(TensorOpsError::indices(format!(
            "output indices [{}] are not a permutation of the open indices",
            display_labels(ic)
        )));
    }
    Ok((oind_a, cind_a, oind_b, cind_b, ind_c_in_oab))
}

fn count(labels: &[Label], label: &Label) -> usize {
    labels.iter().filter(|l| *l == label).count()
}

fn display_labels(labels: &[Label]) -> String {
    labels
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idents(names: &[&str]) -> Vec<Label> {
        names.iter().map(|n| Label::ident(*n)).collect()
    }

    #[test]
    fn test_setdiff_removes_first_occurrences() {
        let a = idents(&["i", "j", "i", "k"]);
        let b = idents(&["i", "k"]);
        assert_eq!(setdiff(&a, &b), idents(&["j", "i"]));
    }

    #[test]
    fn test_unique_pairs() {
        let src = idents(&["i", "j", "i", "j"]);
        assert_eq!(unique_pairs(&src), idents(&["i", "j"]));
    }

    #[test]
    fn test_add_permutation() {
        let ia = idents(&["i", "j", "k"]);
        let ic = idents(&["k", "i", "j"]);
        let perm = add_permutation(&ia, &ic).unwrap();
        assert_eq!(perm.as_slice(), &[2, 0, 1]);
    }

    #[test]
    fn test_add_permutation_rejects_mismatch() {
        let ia = idents(&["i", "j"]);
        let ic = idents(&["i", "x"]);
        assert!(add_permutation(&ia, &ic).is_err());
    }

    #[test]
    fn test_trace_layout() {
        // A[a,b,b,c] traced to C[a,c]
        let ia = idents(&["a", "b", "b", "c"]);
        let ic = idents(&["a", "c"]);
        let (free, cind1, cind2) = trace_layout(&ia, &ic).unwrap();
        assert_eq!(free.as_slice(), &[0, 3]);
        assert_eq!(cind1.as_slice(), &[1]);
        assert_eq!(cind2.as_slice(), &[2]);
    }

    #[test]
    fn test_contract_layout_matmul() {
        let ia = idents(&["i", "j"]);
        let ib = idents(&["j", "k"]);
        let ic = idents(&["i", "k"]);
        let (oa, ca, ob, cb, ind_c) = contract_layout(&ia, &ib, &ic).unwrap();
        assert_eq!(oa.as_slice(), &[0]);
        assert_eq!(ca.as_slice(), &[1]);
        assert_eq!(ob.as_slice(), &[1]);
        assert_eq!(cb.as_slice(), &[0]);
        assert_eq!(ind_c.as_slice(), &[0, 1]);
    }

    #[test]
    fn test_contract_layout_rejects_triple_index() {
        let ia = idents(&["i", "j"]);
        let ib = idents(&["j", "k"]);
        let ic = idents(&["i", "j"]);
        assert!(contract_layout(&ia, &ib, &ic).is_err());
    }
}
