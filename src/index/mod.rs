//! Symbolic index labels and the tuple algebra over them.

mod algebra;
mod label;

pub use algebra::{
    Axes, add_permutation, contract_layout, is_permutation, setdiff, trace_layout, unique_pairs,
};
pub use label::{IndexList, Label, PRIME_SUFFIX};
