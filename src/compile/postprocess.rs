//! Cleanup passes over instantiated programs.

use super::ast::Expr;

/// The primitive names an emitted program may reference.
const PRIMITIVES: &[&str] = &[
    "similar_from_indices",
    "cached_similar_from_indices",
    "add",
    "trace",
    "contract",
    "scalar",
    "index_error",
];

/// The namespace prefix resolution attaches to primitive names.
pub const NAMESPACE: &str = "tensorops.";

/// Hoists nested blocks so every statement sits at the top level of the
/// program. Opaque blocks pass through unopened.
pub fn flatten(e: &Expr) -> Expr {
    let mut statements = Vec::new();
    flatten_into(e, &mut statements);
    Expr::Block(statements)
}

fn flatten_into(e: &Expr, out: &mut Vec<Expr>) {
    match e {
        Expr::Block(stmts) => {
            for stmt in stmts {
                flatten_into(stmt, out);
            }
        }
        _ => out.push(e.clone()),
    }
}

/// Strips source-line annotations.
pub fn remove_line_nodes(e: &Expr) -> Expr {
    match e {
        Expr::Block(stmts) => Expr::Block(
            stmts
                .iter()
                .filter(|s| !matches!(s, Expr::Line(_)))
                .map(remove_line_nodes)
                .collect(),
        ),
        _ => e.clone(),
    }
}

/// Resolves the primitive names to the library namespace.
pub fn resolve_primitives(e: &Expr) -> Expr {
    match e {
        Expr::Call { func, args } => {
            let resolved_args = args.iter().map(resolve_primitives).collect();
            let func = if PRIMITIVES.contains(&func.as_str()) {
                format!("{}{}", NAMESPACE, func)
            } else {
                func.clone()
            };
            Expr::Call {
                func,
                args: resolved_args,
            }
        }
        Expr::Assign { op, lhs, rhs } => Expr::Assign {
            op: *op,
            lhs: lhs.clone(),
            rhs: Box::new(resolve_primitives(rhs)),
        },
        Expr::Block(stmts) => Expr::Block(stmts.iter().map(resolve_primitives).collect()),
        Expr::Opaque(_) => e.clone(),
        _ => e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::ast::AssignOp;

    #[test]
    fn test_flatten_hoists_nested_blocks() {
        let e = Expr::Block(vec![
            Expr::Block(vec![Expr::Int(1), Expr::Int(2)]),
            Expr::Int(3),
        ]);
        match flatten(&e) {
            Expr::Block(stmts) => assert_eq!(stmts.len(), 3),
            other => panic!("expected block, got {}", other),
        }
    }

    #[test]
    fn test_flatten_keeps_opaque_closed() {
        let e = Expr::Block(vec![Expr::Opaque(vec![Expr::Int(1), Expr::Int(2)])]);
        match flatten(&e) {
            Expr::Block(stmts) => {
                assert_eq!(stmts.len(), 1);
                assert!(matches!(stmts[0], Expr::Opaque(_)));
            }
            other => panic!("expected block, got {}", other),
        }
    }

    #[test]
    fn test_remove_line_nodes() {
        let e = Expr::Block(vec![Expr::Line(1), Expr::Int(5), Expr::Line(2)]);
        match remove_line_nodes(&e) {
            Expr::Block(stmts) => assert_eq!(stmts, vec![Expr::Int(5)]),
            other => panic!("expected block, got {}", other),
        }
    }

    #[test]
    fn test_resolution_renames_primitives_only() {
        let e = Expr::Block(vec![
            Expr::call("add", vec![Expr::Int(1)]),
            Expr::Assign {
                op: AssignOp::Define,
                lhs: Box::new(Expr::ident("t")),
                rhs: Box::new(Expr::call("similar_from_indices", vec![])),
            },
            Expr::call("helper", vec![]),
        ]);
        let text = format!("{}", resolve_primitives(&e));
        assert!(text.contains("tensorops.add"));
        assert!(text.contains("tensorops.similar_from_indices"));
        assert!(!text.contains("tensorops.helper"));
    }
}
