//! Contraction-tree construction for n-ary products.
//!
//! The default builder is the left fold `[[[1,2],3],...]`. Products written
//! in the positional-integer convention instead contract label pairs in
//! ascending label order. The builder is pluggable: the instantiator takes
//! any function with the builder signature.

use super::ast::Expr;
use crate::index::Label;

/// A binary parenthesization of an n-ary product; leaves are positions
/// into the factor list.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ContractionTree {
    Leaf(usize),
    Node(Box<ContractionTree>, Box<ContractionTree>),
}

/// Signature of a pluggable tree builder: one free-label list per factor.
pub type TreeBuilder = fn(&[Vec<Label>]) -> ContractionTree;

/// The left-fold tree over `n` factors.
fn leftfold(n: usize) -> ContractionTree {
    let mut tree = ContractionTree::Leaf(0);
    for i in 1..n {
        tree = ContractionTree::Node(Box::new(tree), Box::new(ContractionTree::Leaf(i)));
    }
    tree
}

/// Default builder: a left fold, with the positional-integer escape path.
pub fn build_tree(factor_labels: &[Vec<Label>]) -> ContractionTree {
    if factor_labels.len() > 1 && uses_integer_labels(factor_labels) {
        ncon_tree(factor_labels)
    } else {
        leftfold(factor_labels.len())
    }
}

fn uses_integer_labels(factor_labels: &[Vec<Label>]) -> bool {
    let mut any = false;
    for labels in factor_labels {
        for label in labels {
            match label {
                Label::Int(v) if *v > 0 => any = true,
                Label::Int(_) => {}
                Label::Ident(_) => return false,
            }
        }
    }
    any
}

/// Builds the tree implied by the positional convention: the pair sharing
/// the smallest positive label contracts first, and so on; disconnected
/// remainders fold left.
fn ncon_tree(factor_labels: &[Vec<Label>]) -> ContractionTree {
    let mut nodes: Vec<(ContractionTree, Vec<i64>)> = factor_labels
        .iter()
        .enumerate()
        .map(|(i, labels)| {
            let positive: Vec<i64> = labels.iter().filter_map(|l| l.as_int()).filter(|&v| v > 0).collect();
            (ContractionTree::Leaf(i), positive)
        })
        .collect();

    let mut all_labels: Vec<i64> = nodes.iter().flat_map(|(_, p)| p.iter().copied()).collect();
    all_labels.sort_unstable();
    all_labels.dedup();

    for label in all_labels {
        let holders: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter_map(|(i, (_, p))| p.contains(&label).then_some(i))
            .collect();
        if holders.len() != 2 {
            // Within one factor the label is a trace, already handled.
            continue;
        }
        let (i, j) = (holders[0], holders[1]);
        let (right_tree, right_labels) = nodes.remove(j);
        let (left_tree, mut left_labels) = nodes.remove(i);
        left_labels.extend(right_labels);
        left_labels.retain(|&l| l != label);
        nodes.push((
            ContractionTree::Node(Box::new(left_tree), Box::new(right_tree)),
            left_labels,
        ));
    }

    let mut remaining = nodes.into_iter().map(|(t, _)| t);
    let mut tree = remaining.next().expect("at least one factor");
    for next in remaining {
        tree = ContractionTree::Node(Box::new(tree), Box::new(next));
    }
    tree
}

/// Substitutes factor expressions for leaves, producing a fully
/// parenthesized binary product.
pub fn sort_contraction(factors: &[Expr], tree: &ContractionTree) -> Expr {
    match tree {
        ContractionTree::Leaf(i) => factors[*i].clone(),
        ContractionTree::Node(left, right) => Expr::Mul(vec![
            sort_contraction(factors, left),
            sort_contraction(factors, right),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(names: &[&str]) -> Vec<Label> {
        names.iter().map(|n| Label::ident(*n)).collect()
    }

    #[test]
    fn test_leftfold_tree() {
        let labels = vec![named(&["a", "b"]), named(&["b", "c"]), named(&["c", "d"])];
        let tree = build_tree(&labels);
        assert_eq!(
            tree,
            ContractionTree::Node(
                Box::new(ContractionTree::Node(
                    Box::new(ContractionTree::Leaf(0)),
                    Box::new(ContractionTree::Leaf(1)),
                )),
                Box::new(ContractionTree::Leaf(2)),
            )
        );
    }

    #[test]
    fn test_ncon_tree_orders_by_label() {
        // Label 1 joins factors 1 and 2; label 2 then joins the result
        // with factor 0.
        let labels = vec![
            vec![Label::Int(-1), Label::Int(2)],
            vec![Label::Int(2), Label::Int(1)],
            vec![Label::Int(1), Label::Int(-2)],
        ];
        let tree = build_tree(&labels);
        assert_eq!(
            tree,
            ContractionTree::Node(
                Box::new(ContractionTree::Leaf(0)),
                Box::new(ContractionTree::Node(
                    Box::new(ContractionTree::Leaf(1)),
                    Box::new(ContractionTree::Leaf(2)),
                )),
            )
        );
    }

    #[test]
    fn test_sorter_nests_binary_products() {
        let factors = vec![Expr::ident("A"), Expr::ident("B"), Expr::ident("C")];
        let sorted = sort_contraction(&factors, &build_tree(&[named(&["i"]), named(&["i"]), named(&[])]));
        assert_eq!(format!("{}", sorted), "((A * B) * C)");
    }
}
