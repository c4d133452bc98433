//! Interpreter for compiled programs.
//!
//! A compiled program is a flat block of namespaced primitive calls and
//! environment assignments. The interpreter executes them in order against
//! an environment of named tensors and scalars, and returns the value of
//! the last user-visible assignment.

use hashbrown::HashMap;
use num_traits::{One, Zero};

use crate::compile::{AssignOp, Expr, compile_str};
use crate::config::SiteTag;
use crate::error::{TensorOpsError, TensorOpsResult};
use crate::kernels::{ContractSites, add, contract, trace};
use crate::structure::{
    cached_similar_from_indices, cached_similar_from_indices2, similar_from_indices,
    similar_from_indices2,
};
use crate::types::{Conj, Scalar};
use crate::view::Tensor;

/// A value bound in an environment.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<T: Scalar> {
    Tensor(Tensor<T>),
    Scalar(T),
}

impl<T: Scalar> Value<T> {
    /// The tensor inside, if this is one.
    pub fn as_tensor(&self) -> Option<&Tensor<T>> {
        match self {
            Value::Tensor(t) => Some(t),
            Value::Scalar(_) => None,
        }
    }

    /// The scalar inside, if this is one.
    pub fn as_scalar(&self) -> Option<T> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Tensor(_) => None,
        }
    }
}

/// Named tensors and scalars a program runs against.
#[derive(Debug, Default)]
pub struct Environment<T: Scalar> {
    vars: HashMap<String, Value<T>>,
}

impl<T: Scalar> Environment<T> {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn insert_tensor(&mut self, name: impl Into<String>, tensor: Tensor<T>) {
        self.vars.insert(name.into(), Value::Tensor(tensor));
    }

    pub fn insert_scalar(&mut self, name: impl Into<String>, value: T) {
        self.vars.insert(name.into(), Value::Scalar(value));
    }

    pub fn get(&self, name: &str) -> Option<&Value<T>> {
        self.vars.get(name)
    }

    /// The tensor bound to `name`.
    pub fn tensor(&self, name: &str) -> TensorOpsResult<&Tensor<T>> {
        match self.vars.get(name) {
            Some(Value::Tensor(t)) => Ok(t),
            Some(Value::Scalar(_)) => Err(TensorOpsError::expression(format!(
                "'{}' is bound to a scalar, expected a tensor",
                name
            ))),
            None => Err(TensorOpsError::expression(format!(
                "unknown identifier '{}'",
                name
            ))),
        }
    }

    fn take_tensor(&mut self, name: &str) -> TensorOpsResult<Tensor<T>> {
        match self.vars.remove(name) {
            Some(Value::Tensor(t)) => Ok(t),
            Some(other) => {
                self.vars.insert(name.to_string(), other);
                Err(TensorOpsError::expression(format!(
                    "'{}' is bound to a scalar, expected a tensor",
                    name
                )))
            }
            None => Err(TensorOpsError::expression(format!(
                "unknown identifier '{}'",
                name
            ))),
        }
    }
}

/// Compiles and runs source text; see [`evaluate`].
pub fn evaluate_str<T: Scalar>(
    src: &str,
    env: &mut Environment<T>,
) -> TensorOpsResult<Option<Value<T>>> {
    let program = compile_str(src)?;
    evaluate(&program, env)
}

/// Runs a compiled program, returning the value of the last user-visible
/// assignment (generated identifiers do not count).
pub fn evaluate<T: Scalar>(
    program: &Expr,
    env: &mut Environment<T>,
) -> TensorOpsResult<Option<Value<T>>> {
    let mut last: Option<String> = None;
    for stmt in program.statements() {
        statement(stmt, env, &mut last)?;
    }
    Ok(last.and_then(|name| env.get(&name).cloned()))
}

fn statement<T: Scalar>(
    stmt: &Expr,
    env: &mut Environment<T>,
    last: &mut Option<String>,
) -> TensorOpsResult<()> {
    match stmt {
        Expr::Line(_) => Ok(()),
        Expr::Opaque(bindings) => {
            for binding in bindings {
                statement(binding, env, last)?;
            }
            Ok(())
        }
        Expr::Assign { op, lhs, rhs } => {
            let name = match &**lhs {
                Expr::Ident(name) => name.clone(),
                other => {
                    return Err(TensorOpsError::expression(format!(
                        "cannot assign to '{}'",
                        other
                    )));
                }
            };
            let value = match &**rhs {
                Expr::Call { func, args }
                    if func == "tensorops.similar_from_indices"
                        || func == "tensorops.cached_similar_from_indices" =>
                {
                    Value::Tensor(allocate(func, args, env)?)
                }
                Expr::Call { func, args } if func == "tensorops.scalar" => {
                    if args.len() != 1 {
                        return Err(TensorOpsError::expression("scalar takes one argument"));
                    }
                    let src = env.tensor(ident_name(&args[0])?)?;
                    if src.rank() != 0 {
                        return Err(TensorOpsError::dimensions(format!(
                            "scalar extraction from a rank-{} tensor",
                            src.rank()
                        )));
                    }
                    Value::Scalar(src.get(&[]))
                }
                Expr::Ident(src) => match env.get(src) {
                    Some(value) => value.clone(),
                    None => {
                        return Err(TensorOpsError::expression(format!(
                            "unknown identifier '{}'",
                            src
                        )));
                    }
                },
                other => Value::Scalar(eval_scalar(other, env)?),
            };
            let value = match (op, env.get(&name)) {
                (AssignOp::AddAssign, Some(Value::Scalar(prev))) => match value {
                    Value::Scalar(v) => Value::Scalar(*prev + v),
                    tensor => tensor,
                },
                (AssignOp::SubAssign, Some(Value::Scalar(prev))) => match value {
                    Value::Scalar(v) => Value::Scalar(*prev - v),
                    tensor => tensor,
                },
                _ => value,
            };
            env.vars.insert(name.clone(), value);
            if !name.starts_with("__") {
                *last = Some(name);
            }
            Ok(())
        }
        Expr::Call { func, args } => match func.as_str() {
            "tensorops.add" => run_add(args, env),
            "tensorops.trace" => run_trace(args, env),
            "tensorops.contract" => run_contract(args, env),
            "tensorops.index_error" => match args.first() {
                Some(Expr::Str(message)) => Err(TensorOpsError::expression(message.clone())),
                _ => Err(TensorOpsError::expression("malformed program")),
            },
            other => Err(TensorOpsError::expression(format!(
                "unknown primitive '{}'",
                other
            ))),
        },
        other => Err(TensorOpsError::expression(format!(
            "statement '{}' is not executable",
            other
        ))),
    }
}

fn allocate<T: Scalar>(
    func: &str,
    args: &[Expr],
    env: &Environment<T>,
) -> TensorOpsResult<Tensor<T>> {
    let cached = func == "tensorops.cached_similar_from_indices";
    let (site, rest) = if cached {
        let site = match args.first() {
            Some(Expr::Int(tag)) => SiteTag(*tag as u64),
            _ => return Err(TensorOpsError::expression("missing cache site tag")),
        };
        (Some(site), &args[1..])
    } else {
        (None, args)
    };
    match rest {
        [left, right, a] => {
            let left = axes_of(left)?;
            let right = axes_of(right)?;
            let a = env.tensor(ident_name(a)?)?;
            Ok(match site {
                Some(site) => cached_similar_from_indices(site, &left, &right, a),
                None => similar_from_indices(&left, &right, a),
            })
        }
        [poa, pob, left, right, a, b] => {
            let poa = axes_of(poa)?;
            let pob = axes_of(pob)?;
            let left = axes_of(left)?;
            let right = axes_of(right)?;
            let a = env.tensor(ident_name(a)?)?;
            let b = env.tensor(ident_name(b)?)?;
            Ok(match site {
                Some(site) => {
                    cached_similar_from_indices2(site, &poa, &pob, &left, &right, a, b)
                }
                None => similar_from_indices2(&poa, &pob, &left, &right, a, b),
            })
        }
        _ => Err(TensorOpsError::expression(
            "malformed allocation in compiled program",
        )),
    }
}

fn run_add<T: Scalar>(args: &[Expr], env: &mut Environment<T>) -> TensorOpsResult<()> {
    let [alpha, a, flag, beta, c, left, right] = args else {
        return Err(TensorOpsError::expression("malformed add call"));
    };
    let alpha = eval_scalar(alpha, env)?;
    let beta = eval_scalar(beta, env)?;
    let conja = flag_of(flag)?;
    let a_name = ident_name(a)?;
    let c_name = ident_name(c)?;
    if a_name == c_name {
        return Err(TensorOpsError::expression(format!(
            "destination '{}' aliases a source operand",
            c_name
        )));
    }
    let left = axes_of(left)?;
    let right = axes_of(right)?;
    let mut dst = env.take_tensor(c_name)?;
    let result = env
        .tensor(a_name)
        .and_then(|src| add(alpha, src, conja, beta, &mut dst, &left, &right));
    env.insert_tensor(c_name, dst);
    result
}

fn run_trace<T: Scalar>(args: &[Expr], env: &mut Environment<T>) -> TensorOpsResult<()> {
    let [alpha, a, flag, beta, c, left, right, cind1, cind2] = args else {
        return Err(TensorOpsError::expression("malformed trace call"));
    };
    let alpha = eval_scalar(alpha, env)?;
    let beta = eval_scalar(beta, env)?;
    let conja = flag_of(flag)?;
    let a_name = ident_name(a)?;
    let c_name = ident_name(c)?;
    if a_name == c_name {
        return Err(TensorOpsError::expression(format!(
            "destination '{}' aliases a source operand",
            c_name
        )));
    }
    let left = axes_of(left)?;
    let right = axes_of(right)?;
    let cind1 = axes_of(cind1)?;
    let cind2 = axes_of(cind2)?;
    let mut dst = env.take_tensor(c_name)?;
    let result = env.tensor(a_name).and_then(|src| {
        trace(
            alpha, src, conja, beta, &mut dst, &left, &right, &cind1, &cind2,
        )
    });
    env.insert_tensor(c_name, dst);
    result
}

fn run_contract<T: Scalar>(args: &[Expr], env: &mut Environment<T>) -> TensorOpsResult<()> {
    let [
        alpha,
        a,
        flaga,
        b,
        flagb,
        beta,
        c,
        oinda,
        cinda,
        oindb,
        cindb,
        indc,
        sites,
    ] = args
    else {
        return Err(TensorOpsError::expression("malformed contract call"));
    };
    let alpha = eval_scalar(alpha, env)?;
    let beta = eval_scalar(beta, env)?;
    let conja = flag_of(flaga)?;
    let conjb = flag_of(flagb)?;
    let a_name = ident_name(a)?;
    let b_name = ident_name(b)?;
    let c_name = ident_name(c)?;
    if a_name == c_name || b_name == c_name {
        return Err(TensorOpsError::expression(format!(
            "destination '{}' aliases a source operand",
            c_name
        )));
    }
    let oinda = axes_of(oinda)?;
    let cinda = axes_of(cinda)?;
    let oindb = axes_of(oindb)?;
    let cindb = axes_of(cindb)?;
    let indc = axes_of(indc)?;
    let sites = sites_of(sites)?;
    let mut dst = env.take_tensor(c_name)?;
    let result = env.tensor(a_name).and_then(|src_a| {
        env.tensor(b_name).and_then(|src_b| {
            contract(
                alpha, src_a, conja, src_b, conjb, beta, &mut dst, &oinda, &cinda, &oindb,
                &cindb, &indc, sites,
            )
        })
    });
    env.insert_tensor(c_name, dst);
    result
}

fn eval_scalar<T: Scalar>(e: &Expr, env: &Environment<T>) -> TensorOpsResult<T> {
    match e {
        Expr::Int(v) => Ok(T::from_f64(*v as f64)),
        Expr::Float(v) => Ok(T::from_f64(*v)),
        Expr::Ident(name) => match env.get(name) {
            Some(Value::Scalar(v)) => Ok(*v),
            Some(Value::Tensor(_)) => Err(TensorOpsError::expression(format!(
                "'{}' is bound to a tensor, expected a scalar",
                name
            ))),
            None => Err(TensorOpsError::expression(format!(
                "unknown identifier '{}'",
                name
            ))),
        },
        Expr::Neg(inner) => Ok(T::zero() - eval_scalar(inner, env)?),
        Expr::Prime(inner) => Ok(eval_scalar(inner, env)?.conj()),
        Expr::Call { func, args }
            if (func == "conj" || func == "adjoint") && args.len() == 1 =>
        {
            Ok(eval_scalar(&args[0], env)?.conj())
        }
        Expr::Call { func, args } if func == "tensorops.scalar" && args.len() == 1 => {
            let src = env.tensor(ident_name(&args[0])?)?;
            if src.rank() != 0 {
                return Err(TensorOpsError::dimensions(format!(
                    "scalar extraction from a rank-{} tensor",
                    src.rank()
                )));
            }
            Ok(src.get(&[]))
        }
        Expr::Mul(factors) => {
            let mut product = T::one();
            for factor in factors {
                product = product * eval_scalar(factor, env)?;
            }
            Ok(product)
        }
        Expr::Div(num, den) => Ok(eval_scalar(num, env)? / eval_scalar(den, env)?),
        Expr::Add(a, b) => Ok(eval_scalar(a, env)? + eval_scalar(b, env)?),
        Expr::Sub(a, b) => Ok(eval_scalar(a, env)? - eval_scalar(b, env)?),
        other => Err(TensorOpsError::expression(format!(
            "'{}' is not a scalar expression",
            other
        ))),
    }
}

fn ident_name(e: &Expr) -> TensorOpsResult<&str> {
    match e {
        Expr::Ident(name) => Ok(name),
        other => Err(TensorOpsError::expression(format!(
            "expected an identifier, got '{}'",
            other
        ))),
    }
}

fn axes_of(e: &Expr) -> TensorOpsResult<Vec<usize>> {
    match e {
        Expr::Tuple(items) => items
            .iter()
            .map(|item| match item {
                Expr::Int(v) if *v >= 0 => Ok(*v as usize),
                other => Err(TensorOpsError::expression(format!(
                    "expected an axis position, got '{}'",
                    other
                ))),
            })
            .collect(),
        other => Err(TensorOpsError::expression(format!(
            "expected a tuple of axis positions, got '{}'",
            other
        ))),
    }
}

fn flag_of(e: &Expr) -> TensorOpsResult<Conj> {
    match e {
        Expr::Ident(name) => match name.as_str() {
            "plain" => Ok(Conj::Plain),
            "conj" => Ok(Conj::Conjugate),
            "adjoint" => Ok(Conj::Adjoint),
            other => Err(TensorOpsError::flag(other)),
        },
        other => Err(TensorOpsError::flag(other.to_string())),
    }
}

fn sites_of(e: &Expr) -> TensorOpsResult<Option<ContractSites>> {
    match e {
        Expr::Tuple(items) if items.is_empty() => Ok(None),
        Expr::Tuple(items) if items.len() == 3 => {
            let mut tags = [0u64; 3];
            for (slot, item) in tags.iter_mut().zip(items.iter()) {
                match item {
                    Expr::Int(v) => *slot = *v as u64,
                    other => {
                        return Err(TensorOpsError::expression(format!(
                            "expected a site tag, got '{}'",
                            other
                        )));
                    }
                }
            }
            Ok(Some(ContractSites {
                a: SiteTag(tags[0]),
                b: SiteTag(tags[1]),
                c: SiteTag(tags[2]),
            }))
        }
        other => Err(TensorOpsError::expression(format!(
            "expected site tags, got '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with_matrices() -> Environment<f64> {
        let mut env = Environment::new();
        env.insert_tensor(
            "A",
            Tensor::from_fn(&[2, 3], |ix| (ix[0] * 3 + ix[1]) as f64),
        );
        env.insert_tensor(
            "B",
            Tensor::from_fn(&[3, 4], |ix| (ix[0] * 4 + ix[1] + 1) as f64),
        );
        env
    }

    #[test]
    fn test_evaluate_matmul() {
        let mut env = env_with_matrices();
        let result = evaluate_str("C[i,k] := A[i,j] * B[j,k]", &mut env).unwrap();
        let c = result.unwrap();
        let c = c.as_tensor().unwrap();
        let a = env.tensor("A").unwrap();
        let b = env.tensor("B").unwrap();
        for i in 0..2 {
            for k in 0..4 {
                let expected: f64 = (0..3).map(|j| a.get(&[i, j]) * b.get(&[j, k])).sum();
                assert_eq!(c.get(&[i, k]), expected);
            }
        }
    }

    #[test]
    fn test_evaluate_binds_result_in_env() {
        let mut env = env_with_matrices();
        evaluate_str("C[i,k] := A[i,j] * B[j,k]", &mut env).unwrap();
        assert!(env.tensor("C").is_ok());
    }

    #[test]
    fn test_evaluate_scalar_result() {
        let mut env = Environment::<f64>::new();
        env.insert_tensor("u", Tensor::from_fn(&[3], |ix| (ix[0] + 1) as f64));
        env.insert_tensor("v", Tensor::from_fn(&[3], |ix| (ix[0] + 1) as f64));
        let result = evaluate_str("s = u[i] * v[i]", &mut env).unwrap();
        assert_eq!(result.unwrap().as_scalar().unwrap(), 1.0 + 4.0 + 9.0);
    }

    #[test]
    fn test_scalar_prefactor_from_environment() {
        let mut env = Environment::<f64>::new();
        env.insert_tensor("A", Tensor::from_fn(&[2], |ix| ix[0] as f64));
        env.insert_scalar("x", 10.0);
        let result = evaluate_str("C[i] := x * A[i]", &mut env).unwrap();
        let c = result.unwrap();
        assert_eq!(c.as_tensor().unwrap().get(&[1]), 10.0);
    }

    #[test]
    fn test_accumulating_assignment() {
        let mut env = Environment::<f64>::new();
        env.insert_tensor("A", Tensor::from_fn(&[2], |ix| (ix[0] + 1) as f64));
        env.insert_tensor("C", Tensor::from_fn(&[2], |_| 100.0));
        evaluate_str("C[i] += 2 * A[i]", &mut env).unwrap();
        assert_eq!(env.tensor("C").unwrap().get(&[0]), 102.0);
        evaluate_str("C[i] -= A[i]", &mut env).unwrap();
        assert_eq!(env.tensor("C").unwrap().get(&[0]), 101.0);
    }

    #[test]
    fn test_index_error_surfaces_at_run_time() {
        let mut env = env_with_matrices();
        let program = compile_str("C[i,q] := A[i,j] * B[j,k]").unwrap();
        let err = evaluate(&program, &mut env).unwrap_err();
        assert!(matches!(err, TensorOpsError::InvalidExpression { .. }));
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        let err = flag_of(&Expr::ident("hermitian")).unwrap_err();
        assert!(matches!(err, TensorOpsError::UnknownFlag { .. }));
    }
}
