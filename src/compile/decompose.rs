//! Decomposition of tensor-shaped expressions into their parts.

use super::ast::Expr;
use super::classify::{is_general_tensor, is_scalar_expr};
use crate::error::{TensorOpsError, TensorOpsResult};
use crate::index::{IndexList, Label};

/// Converts an index expression into a label, folding primes textually.
pub fn expr_to_label(e: &Expr) -> TensorOpsResult<Label> {
    match e {
        Expr::Ident(name) => Ok(Label::Ident(name.clone())),
        Expr::Int(v) => Ok(Label::Int(*v)),
        Expr::Neg(inner) => match &**inner {
            Expr::Int(v) => Ok(Label::Int(-v)),
            _ => Err(TensorOpsError::expression(format!(
                "'{}' is not a valid index",
                e
            ))),
        },
        Expr::Prime(inner) => Ok(expr_to_label(inner)?.primed()),
        _ => Err(TensorOpsError::expression(format!(
            "'{}' is not a valid index",
            e
        ))),
    }
}

/// Splits a subscripted form into its object and index rows.
pub fn decompose_tensor(e: &Expr) -> TensorOpsResult<(Expr, IndexList, IndexList)> {
    match e {
        Expr::Tensor { obj, left, right } => {
            let left = left
                .iter()
                .map(expr_to_label)
                .collect::<TensorOpsResult<IndexList>>()?;
            let right = right
                .iter()
                .map(expr_to_label)
                .collect::<TensorOpsResult<IndexList>>()?;
            Ok(((**obj).clone(), left, right))
        }
        _ => Err(TensorOpsError::expression(format!(
            "'{}' is not a tensor",
            e
        ))),
    }
}

/// A general tensor reduced to object, index rows, scalar factor, and
/// conjugation flag.
#[derive(Debug, Clone)]
pub struct GeneralTensor {
    pub obj: Expr,
    pub left: IndexList,
    pub right: IndexList,
    pub alpha: Expr,
    pub conj: bool,
}

impl GeneralTensor {
    /// All labels in `(left..., right...)` order.
    pub fn labels(&self) -> IndexList {
        self.left.concat(&self.right)
    }
}

/// Walks sign, conjugation, prime, and scalar-factor wrappers down to the
/// underlying tensor.
///
/// `adjoint` and `transpose` wrappers are only accepted directly over a
/// factor-free tensor; with an accumulated scalar factor they are not a
/// recognized shape.
pub fn decompose_general_tensor(e: &Expr) -> TensorOpsResult<GeneralTensor> {
    match e {
        Expr::Tensor { .. } => {
            let (obj, left, right) = decompose_tensor(e)?;
            Ok(GeneralTensor {
                obj,
                left,
                right,
                alpha: Expr::one(),
                conj: false,
            })
        }
        Expr::Neg(inner) => {
            let mut g = decompose_general_tensor(inner)?;
            g.alpha = negate_scalar(g.alpha);
            Ok(g)
        }
        Expr::Call { func, args } if func == "conj" && args.len() == 1 => {
            let mut g = decompose_general_tensor(&args[0])?;
            g.conj = !g.conj;
            g.alpha = conjugate_scalar(g.alpha);
            Ok(g)
        }
        Expr::Prime(inner) => {
            let mut g = decompose_general_tensor(inner)?;
            if !g.alpha.is_one() {
                return Err(TensorOpsError::expression(format!(
                    "'{}' mixes an adjoint wrapper with scalar factors",
                    e
                )));
            }
            g.conj = !g.conj;
            Ok(g)
        }
        Expr::Call { func, args }
            if (func == "adjoint" || func == "transpose") && args.len() == 1 =>
        {
            let mut g = decompose_general_tensor(&args[0])?;
            if !g.alpha.is_one() {
                return Err(TensorOpsError::expression(format!(
                    "'{}' mixes an adjoint wrapper with scalar factors",
                    e
                )));
            }
            if func == "adjoint" {
                g.conj = !g.conj;
            }
            Ok(g)
        }
        Expr::Mul(factors) => {
            let mut tensor = None;
            let mut alpha = Expr::one();
            for factor in factors {
                if is_general_tensor(factor) && tensor.is_none() {
                    tensor = Some(decompose_general_tensor(factor)?);
                } else if is_scalar_expr(factor) {
                    alpha = multiply_scalars(alpha, factor.clone());
                } else {
                    return Err(TensorOpsError::expression(format!(
                        "'{}' is not a general tensor",
                        e
                    )));
                }
            }
            match tensor {
                Some(mut g) => {
                    g.alpha = multiply_scalars(g.alpha, alpha);
                    Ok(g)
                }
                None => Err(TensorOpsError::expression(format!(
                    "'{}' has no tensor factor",
                    e
                ))),
            }
        }
        Expr::Div(num, den) => {
            if !is_scalar_expr(den) {
                return Err(TensorOpsError::expression(format!(
                    "'{}' divides by a non-scalar",
                    e
                )));
            }
            let mut g = decompose_general_tensor(num)?;
            g.alpha = Expr::Div(Box::new(g.alpha), Box::new((**den).clone()));
            Ok(g)
        }
        _ => Err(TensorOpsError::expression(format!(
            "'{}' is not a general tensor",
            e
        ))),
    }
}

/// `a * b` with literal-one factors dropped.
pub(crate) fn multiply_scalars(a: Expr, b: Expr) -> Expr {
    if a.is_one() {
        b
    } else if b.is_one() {
        a
    } else {
        match a {
            Expr::Mul(mut factors) => {
                factors.push(b);
                Expr::Mul(factors)
            }
            other => Expr::Mul(vec![other, b]),
        }
    }
}

/// `-a` with double negation folded.
pub(crate) fn negate_scalar(a: Expr) -> Expr {
    match a {
        Expr::Neg(inner) => *inner,
        Expr::Int(v) => Expr::Int(-v),
        Expr::Float(v) => Expr::Float(-v),
        other => Expr::Neg(Box::new(other)),
    }
}

/// `conj(a)`; real literals pass through unchanged.
pub(crate) fn conjugate_scalar(a: Expr) -> Expr {
    match a {
        Expr::Int(_) | Expr::Float(_) => a,
        Expr::Neg(inner) => negate_scalar(conjugate_scalar(*inner)),
        Expr::Call { func, mut args } if func == "conj" && args.len() == 1 => args.remove(0),
        other => Expr::call("conj", vec![other]),
    }
}
