//! Predicates identifying the recognized expression shapes.

use super::ast::Expr;

/// Conjugation-style wrappers accepted around tensor expressions.
pub(crate) fn is_conjugation(func: &str) -> bool {
    matches!(func, "conj" | "adjoint" | "transpose")
}

/// A plain name, a small integer (possibly negated), or a primed form of
/// one of those.
pub fn is_index(e: &Expr) -> bool {
    match e {
        Expr::Ident(_) | Expr::Int(_) => true,
        Expr::Neg(inner) => matches!(**inner, Expr::Int(_)),
        Expr::Prime(inner) => is_index(inner),
        _ => false,
    }
}

/// A subscripted form `obj[...]` with its indices split into a left row
/// and an optional right row.
pub fn is_tensor(e: &Expr) -> bool {
    match e {
        Expr::Tensor { left, right, .. } => {
            left.iter().all(is_index) && right.iter().all(is_index)
        }
        _ => false,
    }
}

/// A tensor optionally wrapped in sign, conjugation, primes, and scalar
/// factors.
pub fn is_general_tensor(e: &Expr) -> bool {
    match e {
        _ if is_tensor(e) => true,
        Expr::Neg(inner) | Expr::Prime(inner) => is_general_tensor(inner),
        Expr::Call { func, args } if is_conjugation(func) && args.len() == 1 => {
            is_general_tensor(&args[0])
        }
        Expr::Mul(factors) => {
            factors.iter().filter(|f| is_general_tensor(f)).count() == 1
                && factors
                    .iter()
                    .all(|f| is_general_tensor(f) || is_scalar_expr(f))
        }
        Expr::Div(num, den) => is_general_tensor(num) && is_scalar_expr(den),
        _ => false,
    }
}

/// A numeric literal, a plain name, or an expression none of whose leaves
/// is a subscripted form. `scalar(...)` is the explicit escape over a
/// tensor expression.
pub fn is_scalar_expr(e: &Expr) -> bool {
    match e {
        Expr::Int(_) | Expr::Float(_) | Expr::Ident(_) => true,
        Expr::Call { func, args } if func == "scalar" && args.len() == 1 => {
            is_tensor_expr(&args[0])
        }
        Expr::Call { args, .. } => args.iter().all(is_scalar_expr),
        Expr::Neg(inner) | Expr::Prime(inner) => is_scalar_expr(inner),
        Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Div(a, b) => {
            is_scalar_expr(a) && is_scalar_expr(b)
        }
        Expr::Mul(factors) => factors.iter().all(is_scalar_expr),
        _ => false,
    }
}

/// A general tensor, a sum or difference of tensor expressions, a product
/// with at least one tensor factor, a scalar-divided tensor expression, or
/// a conjugation of one.
pub fn is_tensor_expr(e: &Expr) -> bool {
    if is_general_tensor(e) {
        return true;
    }
    match e {
        Expr::Add(a, b) | Expr::Sub(a, b) => is_tensor_expr(a) && is_tensor_expr(b),
        Expr::Mul(factors) => {
            factors.iter().any(is_tensor_expr)
                && factors
                    .iter()
                    .all(|f| is_tensor_expr(f) || is_scalar_expr(f))
        }
        Expr::Div(num, den) => is_tensor_expr(num) && is_scalar_expr(den),
        Expr::Call { func, args } if is_conjugation(func) && args.len() == 1 => {
            is_tensor_expr(&args[0])
        }
        Expr::Neg(inner) => is_tensor_expr(inner),
        _ => false,
    }
}

/// A product with two or more tensor-expression factors.
pub fn is_contraction(e: &Expr) -> bool {
    match e {
        Expr::Mul(factors) => factors.iter().filter(|f| is_tensor_expr(f)).count() >= 2,
        _ => false,
    }
}
