//! # TensorOps
//!
//! Labeled tensor contractions over dense column-major arrays.
//!
//! ## Features
//!
//! - Primitive kernels `add`, `trace`, and `contract` with full index
//!   validation and scaled accumulation
//! - A GEMM path with axis fusion, operand preparation, and a role-swap
//!   cost heuristic, plus a native strided fallback for every element type
//! - An index-notation compiler turning `D[a,d] := A[a,b] * B[b,c] * C[c,d]`
//!   into a program of kernel calls, and an interpreter to run it
//! - A call-site-keyed, thread-local cache for temporaries
//!
//! ## Example
//!
//! ```ignore
//! use tensorops::{Environment, Tensor, evaluate_str};
//!
//! let mut env = Environment::<f64>::new();
//! env.insert_tensor("A", Tensor::from_fn(&[2, 3], |ix| (ix[0] + ix[1]) as f64));
//! env.insert_tensor("B", Tensor::from_fn(&[3, 4], |ix| (ix[0] * ix[1]) as f64));
//!
//! let c = evaluate_str("C[i,k] := A[i,j] * B[j,k]", &mut env)?;
//! ```

pub mod cache;
pub mod compile;
pub mod config;
pub mod error;
pub mod execute;
pub mod index;
pub mod kernels;
pub mod structure;
pub mod types;
pub mod view;

pub use cache::flush_cache;
pub use compile::{AssignOp, Expr, compile, compile_str, parse};
pub use config::{SiteTag, disable_blas, disable_cache, enable_blas, enable_cache};
pub use error::{TensorOpsError, TensorOpsResult};
pub use execute::{Environment, Value, evaluate, evaluate_str};
pub use kernels::{ContractSites, add, contract, trace};
pub use structure::{
    cached_similar_from_indices, cached_similar_from_indices2, similar_from_indices,
    similar_from_indices2, similar_structure, similar_structure2,
};
pub use types::{Conj, Scalar};
pub use view::{StridedView, StridedViewMut, Tensor};
