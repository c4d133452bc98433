//! Instantiation of assignments into primitive-kernel calls.
//!
//! Each tensor assignment is classified, its right-hand side decomposed
//! two operands at a time along the contraction tree, and a sequence of
//! `similar_from_indices`/`add`/`trace`/`contract` calls emitted with the
//! permutation tuples computed here at compile time. A statement that
//! cannot be classified compiles to an `index_error` construct that raises
//! when executed, so the rest of the program still compiles.

use super::ast::{AssignOp, Expr};
use super::classify::{is_general_tensor, is_scalar_expr, is_tensor, is_tensor_expr};
use super::decompose::{
    decompose_general_tensor, decompose_tensor, multiply_scalars, negate_scalar,
};
use super::tree::{ContractionTree, TreeBuilder, build_tree};
use crate::config::{self, SiteTag};
use crate::error::{TensorOpsError, TensorOpsResult};
use crate::index::{IndexList, Label, add_permutation, contract_layout, trace_layout};

/// Rewrites a preprocessed program into kernel calls, using the default
/// contraction-tree builder.
pub fn instantiate(program: &Expr) -> Expr {
    instantiate_with(program, build_tree)
}

/// Rewrites a preprocessed program with a caller-supplied tree builder.
pub fn instantiate_with(program: &Expr, builder: TreeBuilder) -> Expr {
    let mut ctx = Instantiator {
        builder,
        tmp_counter: 0,
    };
    let statements = program
        .statements()
        .iter()
        .map(|stmt| match stmt {
            Expr::Opaque(_) | Expr::Line(_) => stmt.clone(),
            _ => match ctx.statement(stmt) {
                Ok(stmts) => Expr::Block(stmts),
                Err(err) => Expr::call("index_error", vec![Expr::Str(err.to_string())]),
            },
        })
        .collect();
    Expr::Block(statements)
}

struct Instantiator {
    builder: TreeBuilder,
    tmp_counter: usize,
}

/// One contraction operand: an object reference with its axis labels and
/// any scalar factor and conjugation not yet applied.
#[derive(Debug, Clone)]
struct Operand {
    obj: Expr,
    labels: IndexList,
    alpha: Expr,
    conj: bool,
}

impl Instantiator {
    fn statement(&mut self, stmt: &Expr) -> TensorOpsResult<Vec<Expr>> {
        match stmt {
            Expr::Assign { op, lhs, rhs } if is_tensor(lhs) => {
                self.tensor_assignment(*op, lhs, rhs)
            }
            Expr::Assign { op, lhs, rhs }
                if matches!(**lhs, Expr::Ident(_)) && is_tensor_expr(rhs) =>
            {
                self.scalar_assignment(*op, lhs, rhs)
            }
            Expr::Assign { lhs, rhs, .. }
                if matches!(**lhs, Expr::Ident(_)) && is_scalar_expr(rhs) =>
            {
                Ok(vec![stmt.clone()])
            }
            _ => Err(TensorOpsError::expression(format!(
                "statement '{}' is not a recognized assignment",
                stmt
            ))),
        }
    }

    /// `obj[left; right] op= tensor-expression`.
    fn tensor_assignment(
        &mut self,
        op: AssignOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> TensorOpsResult<Vec<Expr>> {
        let (obj_c, left_c, right_c) = decompose_tensor(lhs)?;
        let ic = left_c.concat(&right_c);
        if !ic.all_unique() {
            return Err(TensorOpsError::indices(format!(
                "destination indices [{}] are not unique",
                ic
            )));
        }
        let free = free_labels(rhs)?;
        if free.len() != ic.len()
            || free.iter().any(|l| !ic.contains(l))
            || ic.iter().any(|l| !free.contains(l))
        {
            return Err(TensorOpsError::indices(format!(
                "destination indices [{}] do not match the free indices of the right-hand side",
                ic
            )));
        }

        let mut out = Vec::new();
        self.assignment(op, &obj_c, &left_c, &right_c, rhs, Expr::one(), &mut out)?;
        Ok(out)
    }

    /// `name op= tensor-expression` with no free indices: the result is
    /// computed into a rank-0 temporary and extracted with `scalar`.
    fn scalar_assignment(
        &mut self,
        op: AssignOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> TensorOpsResult<Vec<Expr>> {
        let free = free_labels(rhs)?;
        if !free.is_empty() {
            return Err(TensorOpsError::indices(format!(
                "scalar destination '{}' against free indices on the right-hand side",
                lhs
            )));
        }
        let name = self.fresh_tmp();
        let empty = IndexList::new();
        let mut out = Vec::new();
        self.assignment(
            AssignOp::Define,
            &Expr::ident(name.clone()),
            &empty,
            &empty,
            rhs,
            Expr::one(),
            &mut out,
        )?;
        out.push(Expr::Assign {
            op,
            lhs: Box::new(lhs.clone()),
            rhs: Box::new(Expr::call("scalar", vec![Expr::ident(name)])),
        });
        Ok(out)
    }

    /// Emits one assignment; sums recurse term by term, with the first
    /// term keeping the assignment kind and later terms accumulating.
    #[allow(clippy::too_many_arguments)]
    fn assignment(
        &mut self,
        op: AssignOp,
        obj_c: &Expr,
        left_c: &IndexList,
        right_c: &IndexList,
        rhs: &Expr,
        alpha: Expr,
        out: &mut Vec<Expr>,
    ) -> TensorOpsResult<()> {
        match rhs {
            Expr::Add(a, b) => {
                self.assignment(op, obj_c, left_c, right_c, a, alpha.clone(), out)?;
                self.assignment(follow_add(op), obj_c, left_c, right_c, b, alpha, out)
            }
            Expr::Sub(a, b) => {
                self.assignment(op, obj_c, left_c, right_c, a, alpha.clone(), out)?;
                self.assignment(follow_sub(op), obj_c, left_c, right_c, b, alpha, out)
            }
            _ => {
                let (rhs_alpha, factors) = split_product(rhs)?;
                let alpha = multiply_scalars(alpha, rhs_alpha);
                match factors.len() {
                    0 => Err(TensorOpsError::expression(
                        "right-hand side has no tensor factor",
                    )),
                    1 => self.unary(op, obj_c, left_c, right_c, &factors[0], alpha, out),
                    _ => self.nary(op, obj_c, left_c, right_c, &factors, alpha, out),
                }
            }
        }
    }

    /// A lone factor: `trace` when it carries a repeated index, `add`
    /// otherwise.
    #[allow(clippy::too_many_arguments)]
    fn unary(
        &mut self,
        op: AssignOp,
        obj_c: &Expr,
        left_c: &IndexList,
        right_c: &IndexList,
        factor: &Expr,
        alpha: Expr,
        out: &mut Vec<Expr>,
    ) -> TensorOpsResult<()> {
        let g = decompose_general_tensor(factor)?;
        let ia = g.labels();
        let ic = left_c.concat(right_c);
        let alpha = apply_sign(op, multiply_scalars(alpha, g.alpha));
        let beta = beta_of(op);
        let flag = flag_expr(g.conj);

        if ia.all_unique() {
            let perm = add_permutation(ia.as_slice(), ic.as_slice())?;
            let (sel_left, sel_right) = perm.split_at(left_c.len());
            if op == AssignOp::Define {
                out.push(define_stmt(
                    obj_c,
                    Expr::call(
                        "similar_from_indices",
                        vec![tuple(sel_left), tuple(sel_right), g.obj.clone()],
                    ),
                ));
            }
            out.push(Expr::call(
                "add",
                vec![
                    alpha,
                    g.obj,
                    flag,
                    beta,
                    obj_c.clone(),
                    tuple(sel_left),
                    tuple(sel_right),
                ],
            ));
        } else {
            let (ind_c_in_a, cind1, cind2) = trace_layout(ia.as_slice(), ic.as_slice())?;
            let (sel_left, sel_right) = ind_c_in_a.split_at(left_c.len());
            if op == AssignOp::Define {
                out.push(define_stmt(
                    obj_c,
                    Expr::call(
                        "similar_from_indices",
                        vec![tuple(sel_left), tuple(sel_right), g.obj.clone()],
                    ),
                ));
            }
            out.push(Expr::call(
                "trace",
                vec![
                    alpha,
                    g.obj,
                    flag,
                    beta,
                    obj_c.clone(),
                    tuple(sel_left),
                    tuple(sel_right),
                    tuple(&cind1),
                    tuple(&cind2),
                ],
            ));
        }
        Ok(())
    }

    /// A product of two or more tensor factors: build the contraction
    /// tree, materialize intermediate factors, and contract pairwise.
    #[allow(clippy::too_many_arguments)]
    fn nary(
        &mut self,
        op: AssignOp,
        obj_c: &Expr,
        left_c: &IndexList,
        right_c: &IndexList,
        factors: &[Expr],
        alpha: Expr,
        out: &mut Vec<Expr>,
    ) -> TensorOpsResult<()> {
        let mut operands = Vec::with_capacity(factors.len());
        for factor in factors {
            operands.push(self.operand(factor, out)?);
        }
        let labels: Vec<Vec<Label>> = operands
            .iter()
            .map(|o| o.labels.iter().cloned().collect())
            .collect();
        let tree = (self.builder)(&labels);
        self.tree_contract(&tree, &operands, Some((op, obj_c, left_c, right_c, alpha)), out)?;
        Ok(())
    }

    /// Emits the contraction for one tree node, returning the operand
    /// describing its result.
    fn tree_contract(
        &mut self,
        tree: &ContractionTree,
        operands: &[Operand],
        dst: Option<(AssignOp, &Expr, &IndexList, &IndexList, Expr)>,
        out: &mut Vec<Expr>,
    ) -> TensorOpsResult<Operand> {
        let (left, right) = match tree {
            ContractionTree::Leaf(i) => {
                debug_assert!(dst.is_none(), "a lone factor is not a contraction");
                return Ok(operands[*i].clone());
            }
            ContractionTree::Node(left, right) => (left, right),
        };
        let le = self.tree_contract(left, operands, None, out)?;
        let re = self.tree_contract(right, operands, None, out)?;
        let pair_alpha = multiply_scalars(le.alpha.clone(), re.alpha.clone());
        let sites = contract_sites();

        match dst {
            Some((op, obj_c, left_c, right_c, alpha)) => {
                let ic = left_c.concat(right_c);
                let (oa, ca, ob, cb, indc) =
                    contract_layout(le.labels.as_slice(), re.labels.as_slice(), ic.as_slice())?;
                let alpha = apply_sign(op, multiply_scalars(alpha, pair_alpha));
                if op == AssignOp::Define {
                    let (sel_left, sel_right) = indc.split_at(left_c.len());
                    out.push(define_stmt(
                        obj_c,
                        Expr::call(
                            "similar_from_indices",
                            vec![
                                tuple(&oa),
                                tuple(&ob),
                                tuple(sel_left),
                                tuple(sel_right),
                                le.obj.clone(),
                                re.obj.clone(),
                            ],
                        ),
                    ));
                }
                out.push(Expr::call(
                    "contract",
                    vec![
                        alpha,
                        le.obj.clone(),
                        flag_expr(le.conj),
                        re.obj.clone(),
                        flag_expr(re.conj),
                        beta_of(op),
                        obj_c.clone(),
                        tuple(&oa),
                        tuple(&ca),
                        tuple(&ob),
                        tuple(&cb),
                        tuple(&indc),
                        sites,
                    ],
                ));
                Ok(Operand {
                    obj: obj_c.clone(),
                    labels: ic,
                    alpha: Expr::one(),
                    conj: false,
                })
            }
            None => {
                let ic = open_labels(&le.labels, &re.labels);
                let (oa, ca, ob, cb, indc) =
                    contract_layout(le.labels.as_slice(), re.labels.as_slice(), ic.as_slice())?;
                let name = self.fresh_tmp();
                let positions: Vec<usize> = (0..ic.len()).collect();
                out.push(define_stmt(
                    &Expr::ident(name.clone()),
                    alloc_call(
                        "similar_from_indices",
                        vec![
                            tuple(&oa),
                            tuple(&ob),
                            tuple(&positions),
                            tuple(&[]),
                            le.obj.clone(),
                            re.obj.clone(),
                        ],
                    ),
                ));
                out.push(Expr::call(
                    "contract",
                    vec![
                        pair_alpha,
                        le.obj.clone(),
                        flag_expr(le.conj),
                        re.obj.clone(),
                        flag_expr(re.conj),
                        Expr::Int(0),
                        Expr::ident(name.clone()),
                        tuple(&oa),
                        tuple(&ca),
                        tuple(&ob),
                        tuple(&cb),
                        tuple(&indc),
                        sites,
                    ],
                ));
                Ok(Operand {
                    obj: Expr::ident(name),
                    labels: ic,
                    alpha: Expr::one(),
                    conj: false,
                })
            }
        }
    }

    /// Resolves one product factor into an operand, materializing traces
    /// into temporaries.
    fn operand(&mut self, factor: &Expr, out: &mut Vec<Expr>) -> TensorOpsResult<Operand> {
        let g = decompose_general_tensor(factor)?;
        let ia = g.labels();
        if ia.all_unique() {
            return Ok(Operand {
                obj: g.obj,
                labels: ia,
                alpha: g.alpha,
                conj: g.conj,
            });
        }

        let free: IndexList = ia
            .iter()
            .filter(|l| ia.count(l) == 1)
            .cloned()
            .collect();
        let (ind_c_in_a, cind1, cind2) = trace_layout(ia.as_slice(), free.as_slice())?;
        let name = self.fresh_tmp();
        out.push(define_stmt(
            &Expr::ident(name.clone()),
            alloc_call(
                "similar_from_indices",
                vec![tuple(&ind_c_in_a), tuple(&[]), g.obj.clone()],
            ),
        ));
        out.push(Expr::call(
            "trace",
            vec![
                g.alpha,
                g.obj,
                flag_expr(g.conj),
                Expr::Int(0),
                Expr::ident(name.clone()),
                tuple(&ind_c_in_a),
                tuple(&[]),
                tuple(&cind1),
                tuple(&cind2),
            ],
        ));
        Ok(Operand {
            obj: Expr::ident(name),
            labels: free,
            alpha: Expr::one(),
            conj: false,
        })
    }

    fn fresh_tmp(&mut self) -> String {
        let name = format!("__w{}", self.tmp_counter);
        self.tmp_counter += 1;
        name
    }
}

/// Splits a product into its scalar factor and flat tensor-factor list.
fn split_product(e: &Expr) -> TensorOpsResult<(Expr, Vec<Expr>)> {
    match e {
        Expr::Mul(parts) => {
            let mut alpha = Expr::one();
            let mut factors = Vec::new();
            for part in parts {
                if is_scalar_expr(part) {
                    alpha = multiply_scalars(alpha, part.clone());
                } else if is_general_tensor(part) {
                    factors.push(part.clone());
                } else if is_tensor_expr(part) {
                    let (inner_alpha, inner_factors) = split_product(part)?;
                    alpha = multiply_scalars(alpha, inner_alpha);
                    factors.extend(inner_factors);
                } else {
                    return Err(TensorOpsError::expression(format!(
                        "'{}' is neither a scalar nor a tensor factor",
                        part
                    )));
                }
            }
            Ok((alpha, factors))
        }
        Expr::Neg(inner) => {
            let (alpha, factors) = split_product(inner)?;
            Ok((negate_scalar(alpha), factors))
        }
        Expr::Div(num, den) if is_scalar_expr(den) => {
            let (alpha, factors) = split_product(num)?;
            Ok((
                Expr::Div(Box::new(alpha), Box::new((**den).clone())),
                factors,
            ))
        }
        _ if is_general_tensor(e) => Ok((Expr::one(), vec![e.clone()])),
        _ => Err(TensorOpsError::expression(format!(
            "'{}' is not a tensor product",
            e
        ))),
    }
}

/// Free labels of a tensor expression: those occurring exactly once across
/// its factors. A label occurring more than twice is rejected.
fn free_labels(e: &Expr) -> TensorOpsResult<IndexList> {
    match e {
        Expr::Add(a, b) | Expr::Sub(a, b) => {
            let fa = free_labels(a)?;
            let fb = free_labels(b)?;
            if fa.len() != fb.len() || fa.iter().any(|l| !fb.contains(l)) {
                return Err(TensorOpsError::indices(format!(
                    "summands carry different free indices: [{}] vs [{}]",
                    fa, fb
                )));
            }
            Ok(fa)
        }
        Expr::Neg(inner) => free_labels(inner),
        Expr::Div(num, _) => free_labels(num),
        _ => {
            let mut all = IndexList::new();
            collect_factor_labels(e, &mut all)?;
            for label in all.iter() {
                if all.count(label) > 2 {
                    return Err(TensorOpsError::indices(format!(
                        "index {} appears more than twice across a contraction",
                        label
                    )));
                }
            }
            Ok(all
                .iter()
                .filter(|l| all.count(l) == 1)
                .cloned()
                .collect())
        }
    }
}

fn collect_factor_labels(e: &Expr, acc: &mut IndexList) -> TensorOpsResult<()> {
    if is_general_tensor(e) {
        let g = decompose_general_tensor(e)?;
        for label in g.labels().iter() {
            acc.push(label.clone());
        }
        return Ok(());
    }
    match e {
        Expr::Mul(parts) => {
            for part in parts {
                if is_scalar_expr(part) {
                    continue;
                }
                collect_factor_labels(part, acc)?;
            }
            Ok(())
        }
        Expr::Neg(inner) => collect_factor_labels(inner, acc),
        Expr::Div(num, _) => collect_factor_labels(num, acc),
        _ => Err(TensorOpsError::expression(format!(
            "'{}' is not a tensor expression",
            e
        ))),
    }
}

/// Open labels of a pairwise contraction, in `(a..., b...)` order.
fn open_labels(ia: &IndexList, ib: &IndexList) -> IndexList {
    ia.iter()
        .filter(|l| !ib.contains(l))
        .chain(ib.iter().filter(|l| !ia.contains(l)))
        .cloned()
        .collect()
}

fn beta_of(op: AssignOp) -> Expr {
    match op {
        AssignOp::Assign | AssignOp::Define => Expr::Int(0),
        AssignOp::AddAssign | AssignOp::SubAssign => Expr::Int(1),
    }
}

/// `-=` subtracts by negating the scalar factor while keeping `β = 1`.
fn apply_sign(op: AssignOp, alpha: Expr) -> Expr {
    match op {
        AssignOp::SubAssign => negate_scalar(alpha),
        _ => alpha,
    }
}

fn follow_add(op: AssignOp) -> AssignOp {
    match op {
        AssignOp::SubAssign => AssignOp::SubAssign,
        _ => AssignOp::AddAssign,
    }
}

fn follow_sub(op: AssignOp) -> AssignOp {
    match op {
        AssignOp::SubAssign => AssignOp::AddAssign,
        _ => AssignOp::SubAssign,
    }
}

fn flag_expr(conj: bool) -> Expr {
    Expr::ident(if conj { "conj" } else { "plain" })
}

fn tuple(positions: &[usize]) -> Expr {
    Expr::Tuple(positions.iter().map(|&i| Expr::Int(i as i64)).collect())
}

fn define_stmt(lhs: &Expr, rhs: Expr) -> Expr {
    Expr::Assign {
        op: AssignOp::Define,
        lhs: Box::new(lhs.clone()),
        rhs: Box::new(rhs),
    }
}

/// Temporaries route through the cache when it is enabled at compile time.
fn alloc_call(name: &str, args: Vec<Expr>) -> Expr {
    if config::cache_enabled() {
        let mut cached_args = vec![Expr::Int(SiteTag::fresh().0 as i64)];
        cached_args.extend(args);
        Expr::call("cached_similar_from_indices", cached_args)
    } else {
        Expr::call(name, args)
    }
}

/// The site-tag tuple for a contract call, empty when caching is off.
fn contract_sites() -> Expr {
    if config::cache_enabled() {
        Expr::Tuple(vec![
            Expr::Int(SiteTag::fresh().0 as i64),
            Expr::Int(SiteTag::fresh().0 as i64),
            Expr::Int(SiteTag::fresh().0 as i64),
        ])
    } else {
        Expr::Tuple(Vec::new())
    }
}
