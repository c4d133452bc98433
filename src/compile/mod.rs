//! The index-notation compiler.
//!
//! Pipeline: parse (or accept a tree), normalize primes, expand
//! conjugation, complete the positional-integer convention, extract tensor
//! objects, sort the contraction tree, instantiate kernel calls, then
//! flatten, strip line nodes, and resolve primitive names. The result is
//! again a tree: a program of namespaced primitive calls the interpreter
//! in [`crate::execute`] runs against named tensors.

pub mod ast;
pub mod classify;
pub mod decompose;
pub mod instantiate;
pub mod parser;
pub mod postprocess;
pub mod preprocess;
pub mod tree;

pub use ast::{AssignOp, Expr};
pub use parser::parse;
pub use tree::{ContractionTree, TreeBuilder};

use crate::error::TensorOpsResult;

/// Compiles a parsed expression into a program of primitive-kernel calls.
pub fn compile(e: &Expr) -> TensorOpsResult<Expr> {
    compile_with(e, tree::build_tree)
}

/// Compiles with a caller-supplied contraction-tree builder.
pub fn compile_with(e: &Expr, builder: TreeBuilder) -> TensorOpsResult<Expr> {
    let e = preprocess::normalize_indices(e);
    let e = preprocess::expand_conj(&e);
    let e = preprocess::complete_ncon(&e)?;
    let e = preprocess::extract_tensor_objects(&e);
    let e = instantiate::instantiate_with(&e, builder);
    let e = postprocess::flatten(&e);
    let e = postprocess::remove_line_nodes(&e);
    Ok(postprocess::resolve_primitives(&e))
}

/// Parses and compiles source text.
pub fn compile_str(src: &str) -> TensorOpsResult<Expr> {
    compile(&parser::parse(src)?)
}
