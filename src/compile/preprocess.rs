//! Preprocessing passes over parsed expressions.
//!
//! Applied in order: prime normalization, conjugation expansion,
//! positional-integer completion, and tensor-object extraction. None of
//! them descends into opaque blocks.

use hashbrown::HashMap;

use super::ast::{AssignOp, Expr};
use super::decompose::expr_to_label;
use crate::error::{TensorOpsError, TensorOpsResult};
use crate::index::Label;

/// Rewrites every primed index into a textual-suffixed atom and folds
/// negated integer labels. Stable under repeated application.
pub fn normalize_indices(e: &Expr) -> Expr {
    match e {
        Expr::Tensor { obj, left, right } => Expr::Tensor {
            obj: Box::new(normalize_indices(obj)),
            left: left.iter().map(normalize_index).collect(),
            right: right.iter().map(normalize_index).collect(),
        },
        Expr::Opaque(_) => e.clone(),
        _ => map_children(e, normalize_indices),
    }
}

fn normalize_index(e: &Expr) -> Expr {
    match e {
        Expr::Prime(inner) => {
            let normalized = normalize_index(inner);
            match expr_to_label(&Expr::Prime(Box::new(normalized.clone()))) {
                Ok(Label::Ident(name)) => Expr::Ident(name),
                Ok(Label::Int(v)) => Expr::Int(v),
                Err(_) => Expr::Prime(Box::new(normalized)),
            }
        }
        Expr::Neg(inner) => match &**inner {
            Expr::Int(v) => Expr::Int(-v),
            _ => e.clone(),
        },
        _ => e.clone(),
    }
}

/// Pushes `conj(...)` inward until it attaches to tensor and scalar
/// leaves; double conjugation cancels.
pub fn expand_conj(e: &Expr) -> Expr {
    match e {
        Expr::Call { func, args } if func == "conj" && args.len() == 1 => push_conj(&args[0]),
        Expr::Opaque(_) => e.clone(),
        _ => map_children(e, expand_conj),
    }
}

fn push_conj(e: &Expr) -> Expr {
    match e {
        Expr::Add(a, b) => Expr::Add(Box::new(push_conj(a)), Box::new(push_conj(b))),
        Expr::Sub(a, b) => Expr::Sub(Box::new(push_conj(a)), Box::new(push_conj(b))),
        Expr::Mul(factors) => Expr::Mul(factors.iter().map(push_conj).collect()),
        Expr::Div(a, b) => Expr::Div(Box::new(push_conj(a)), Box::new(push_conj(b))),
        Expr::Neg(inner) => Expr::Neg(Box::new(push_conj(inner))),
        Expr::Call { func, args } if func == "conj" && args.len() == 1 => expand_conj(&args[0]),
        Expr::Int(_) | Expr::Float(_) => e.clone(),
        _ => Expr::call("conj", vec![expand_conj(e)]),
    }
}

/// Completes and validates the positional-integer convention.
///
/// When every index of an assignment is an integer, contracted labels must
/// be positive and occur exactly twice on the right-hand side, free labels
/// negative and unique. A left-hand side written with empty brackets is
/// completed with the free labels in descending order (`-1` first).
pub fn complete_ncon(e: &Expr) -> TensorOpsResult<Expr> {
    match e {
        Expr::Block(stmts) => Ok(Expr::Block(
            stmts
                .iter()
                .map(complete_ncon)
                .collect::<TensorOpsResult<Vec<_>>>()?,
        )),
        Expr::Assign { op, lhs, rhs } => {
            if !uses_integer_convention(rhs) {
                return Ok(e.clone());
            }
            let mut counts: HashMap<i64, usize> = HashMap::new();
            collect_integer_labels(rhs, &mut counts)?;
            for (&label, &count) in counts.iter() {
                if label > 0 && count != 2 {
                    return Err(TensorOpsError::indices(format!(
                        "contracted label {} appears {} times, expected exactly 2",
                        label, count
                    )));
                }
                if label < 0 && count != 1 {
                    return Err(TensorOpsError::indices(format!(
                        "free label {} appears {} times, expected exactly 1",
                        label, count
                    )));
                }
                if label == 0 {
                    return Err(TensorOpsError::indices(
                        "label 0 is not valid in the positional convention",
                    ));
                }
            }
            let lhs = match &**lhs {
                Expr::Tensor { obj, left, right }
                    if left.is_empty() && right.is_empty() && !counts.is_empty() =>
                {
                    let mut free: Vec<i64> =
                        counts.keys().copied().filter(|&l| l < 0).collect();
                    free.sort_unstable_by(|a, b| b.cmp(a));
                    Expr::Tensor {
                        obj: obj.clone(),
                        left: free.into_iter().map(Expr::Int).collect(),
                        right: right.clone(),
                    }
                }
                other => other.clone(),
            };
            Ok(Expr::Assign {
                op: *op,
                lhs: Box::new(lhs),
                rhs: rhs.clone(),
            })
        }
        _ => Ok(e.clone()),
    }
}

fn uses_integer_convention(e: &Expr) -> bool {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    let mut all_int = true;
    visit_tensors(e, &mut |left, right| {
        for idx in left.iter().chain(right.iter()) {
            match expr_to_label(idx) {
                Ok(Label::Int(v)) => *counts.entry(v).or_insert(0) += 1,
                _ => all_int = false,
            }
        }
    });
    if !all_int || counts.is_empty() {
        return false;
    }
    // Integer labels may also be ordinary names; only a consistent mix of
    // pair-contracted positives and unique negatives is the convention.
    counts.keys().any(|&l| l < 0)
        || counts
            .iter()
            .all(|(&label, &count)| label > 0 && count == 2)
}

fn collect_integer_labels(e: &Expr, counts: &mut HashMap<i64, usize>) -> TensorOpsResult<()> {
    let mut result = Ok(());
    visit_tensors(e, &mut |left, right| {
        for idx in left.iter().chain(right.iter()) {
            match expr_to_label(idx) {
                Ok(Label::Int(v)) => *counts.entry(v).or_insert(0) += 1,
                _ => {
                    if result.is_ok() {
                        result = Err(TensorOpsError::indices(format!(
                            "index '{}' mixes the positional convention with names",
                            idx
                        )));
                    }
                }
            }
        }
    });
    result
}

fn visit_tensors(e: &Expr, f: &mut impl FnMut(&[Expr], &[Expr])) {
    match e {
        Expr::Tensor { obj, left, right } => {
            f(left, right);
            visit_tensors(obj, f);
        }
        Expr::Opaque(_) => {}
        _ => for_each_child(e, |child| visit_tensors(child, f)),
    }
}

/// Replaces every distinct tensor object by a generated identifier, bound
/// in an opaque preamble; objects redefined by the program are rebound to
/// their user names in an opaque postamble.
pub fn extract_tensor_objects(e: &Expr) -> Expr {
    // Objects whose first appearance is as the destination of `:=` do not
    // exist yet; they are created by the definition itself and only the
    // postamble rebinding applies to them.
    let mut seen: Vec<Expr> = Vec::new();
    let mut defined_first: Vec<Expr> = Vec::new();
    for stmt in e.statements() {
        if let Expr::Assign { op: AssignOp::Define, lhs, .. } = stmt {
            if let Expr::Tensor { obj, .. } = &**lhs {
                if !seen.contains(obj) && !defined_first.contains(obj) {
                    defined_first.push((**obj).clone());
                }
            }
        }
        collect_objects(stmt, &mut seen);
    }

    let mut extractor = Extractor {
        bindings: Vec::new(),
    };
    let statements: Vec<Expr> = e
        .statements()
        .iter()
        .map(|stmt| extractor.rewrite(stmt))
        .collect();

    let preamble: Vec<Expr> = extractor
        .bindings
        .iter()
        .filter(|(obj, _)| !defined_first.contains(obj))
        .map(|(obj, name)| Expr::Assign {
            op: AssignOp::Assign,
            lhs: Box::new(Expr::ident(name.clone())),
            rhs: Box::new(obj.clone()),
        })
        .collect();

    // Rebind every assignment destination, so mutations through the
    // generated identifiers become visible under the user names.
    let mut postamble = Vec::new();
    for stmt in e.statements() {
        if let Expr::Assign { lhs, .. } = stmt {
            if let Expr::Tensor { obj, .. } = &**lhs {
                if let Some((_, name)) = extractor
                    .bindings
                    .iter()
                    .find(|(bound, _)| bound == &**obj)
                {
                    let rebind = Expr::Assign {
                        op: AssignOp::Assign,
                        lhs: Box::new((**obj).clone()),
                        rhs: Box::new(Expr::ident(name.clone())),
                    };
                    if !postamble.contains(&rebind) {
                        postamble.push(rebind);
                    }
                }
            }
        }
    }

    let mut out = Vec::with_capacity(statements.len() + 2);
    out.push(Expr::Opaque(preamble));
    out.extend(statements);
    out.push(Expr::Opaque(postamble));
    Expr::Block(out)
}

fn collect_objects(e: &Expr, seen: &mut Vec<Expr>) {
    if let Expr::Tensor { obj, .. } = e {
        if !seen.contains(obj) {
            seen.push((**obj).clone());
        }
    }
    for_each_child(e, |child| collect_objects(child, seen));
}

struct Extractor {
    bindings: Vec<(Expr, String)>,
}

impl Extractor {
    fn rewrite(&mut self, e: &Expr) -> Expr {
        match e {
            Expr::Tensor { obj, left, right } => {
                let name = self.name_for(obj);
                Expr::Tensor {
                    obj: Box::new(Expr::ident(name)),
                    left: left.clone(),
                    right: right.clone(),
                }
            }
            Expr::Opaque(_) => e.clone(),
            _ => map_children(e, |child| self.rewrite(child)),
        }
    }

    fn name_for(&mut self, obj: &Expr) -> String {
        if let Some((_, name)) = self.bindings.iter().find(|(bound, _)| bound == obj) {
            return name.clone();
        }
        let name = format!("__t{}", self.bindings.len());
        self.bindings.push((obj.clone(), name.clone()));
        name
    }
}

/// Rebuilds a node with every child mapped; opaque blocks pass through
/// untouched at the call sites above.
fn map_children(e: &Expr, mut f: impl FnMut(&Expr) -> Expr) -> Expr {
    match e {
        Expr::Ident(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Line(_) => e.clone(),
        Expr::Prime(inner) => Expr::Prime(Box::new(f(inner))),
        Expr::Tensor { obj, left, right } => Expr::Tensor {
            obj: Box::new(f(obj)),
            left: left.iter().map(&mut f).collect(),
            right: right.iter().map(&mut f).collect(),
        },
        Expr::Call { func, args } => Expr::Call {
            func: func.clone(),
            args: args.iter().map(&mut f).collect(),
        },
        Expr::Neg(inner) => Expr::Neg(Box::new(f(inner))),
        Expr::Add(a, b) => Expr::Add(Box::new(f(a)), Box::new(f(b))),
        Expr::Sub(a, b) => Expr::Sub(Box::new(f(a)), Box::new(f(b))),
        Expr::Mul(factors) => Expr::Mul(factors.iter().map(&mut f).collect()),
        Expr::Div(a, b) => Expr::Div(Box::new(f(a)), Box::new(f(b))),
        Expr::Tuple(items) => Expr::Tuple(items.iter().map(&mut f).collect()),
        Expr::Assign { op, lhs, rhs } => Expr::Assign {
            op: *op,
            lhs: Box::new(f(lhs)),
            rhs: Box::new(f(rhs)),
        },
        Expr::Block(stmts) => Expr::Block(stmts.iter().map(&mut f).collect()),
        Expr::Opaque(stmts) => Expr::Opaque(stmts.clone()),
    }
}

fn for_each_child(e: &Expr, mut f: impl FnMut(&Expr)) {
    match e {
        Expr::Ident(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Line(_) => {}
        Expr::Prime(inner) | Expr::Neg(inner) => f(inner),
        Expr::Tensor { obj, left, right } => {
            f(obj);
            left.iter().for_each(&mut f);
            right.iter().for_each(&mut f);
        }
        Expr::Call { args, .. } => args.iter().for_each(&mut f),
        Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Div(a, b) => {
            f(a);
            f(b);
        }
        Expr::Mul(factors) => factors.iter().for_each(&mut f),
        Expr::Tuple(items) => items.iter().for_each(&mut f),
        Expr::Assign { lhs, rhs, .. } => {
            f(lhs);
            f(rhs);
        }
        Expr::Block(stmts) => stmts.iter().for_each(&mut f),
        Expr::Opaque(_) => {}
    }
}
