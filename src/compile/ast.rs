//! Syntax-tree node schema for index-notation expressions.
//!
//! Compilation is a tree-to-tree rewrite: the front end parses source text
//! into this schema, the passes transform it, and the emitted program is
//! again a tree whose calls name the primitive kernels. The schema is
//! serializable so compiled programs can be persisted and replayed.

use core::fmt;

/// The assignment kinds recognized at statement level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AssignOp {
    /// `=`: overwrite an existing destination.
    Assign,
    /// `:=`: allocate a fresh destination.
    Define,
    /// `+=`: accumulate into an existing destination.
    AddAssign,
    /// `-=`: subtract into an existing destination.
    SubAssign,
}

/// A node of the expression tree.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    /// A plain name.
    Ident(String),
    /// An integer literal.
    Int(i64),
    /// A floating-point literal.
    Float(f64),
    /// A string literal (only produced by the compiler, for diagnostics).
    Str(String),
    /// A postfix prime mark: an index prime or an adjoint, by position.
    Prime(Box<Expr>),
    /// A subscripted tensor `obj[left...; right...]`.
    Tensor {
        obj: Box<Expr>,
        left: Vec<Expr>,
        right: Vec<Expr>,
    },
    /// A function call.
    Call { func: String, args: Vec<Expr> },
    /// Unary minus.
    Neg(Box<Expr>),
    /// Binary sum.
    Add(Box<Expr>, Box<Expr>),
    /// Binary difference.
    Sub(Box<Expr>, Box<Expr>),
    /// An n-ary product.
    Mul(Vec<Expr>),
    /// A quotient.
    Div(Box<Expr>, Box<Expr>),
    /// A tuple of constants in an emitted kernel call.
    Tuple(Vec<Expr>),
    /// An assignment or definition statement.
    Assign {
        op: AssignOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// A sequence of statements.
    Block(Vec<Expr>),
    /// A preamble/postamble block later passes must not descend into.
    Opaque(Vec<Expr>),
    /// A source-line annotation.
    Line(u32),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn call(func: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            func: func.into(),
            args,
        }
    }

    /// The literal `1`.
    pub fn one() -> Self {
        Expr::Int(1)
    }

    /// Whether this is the literal `1`.
    pub fn is_one(&self) -> bool {
        matches!(self, Expr::Int(1))
    }

    /// Statements of a block, or the expression itself as a singleton.
    pub fn statements(&self) -> &[Expr] {
        match self {
            Expr::Block(stmts) => stmts,
            _ => core::slice::from_ref(self),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(name) => write!(f, "{}", name),
            Expr::Int(v) => write!(f, "{}", v),
            Expr::Float(v) => write!(f, "{}", v),
            Expr::Str(s) => write!(f, "{:?}", s),
            Expr::Prime(inner) => write!(f, "{}'", inner),
            Expr::Tensor { obj, left, right } => {
                write!(f, "{}[", obj)?;
                write_list(f, left)?;
                if !right.is_empty() {
                    write!(f, ";")?;
                    write_list(f, right)?;
                }
                write!(f, "]")
            }
            Expr::Call { func, args } => {
                write!(f, "{}(", func)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Neg(inner) => write!(f, "-{}", inner),
            Expr::Add(a, b) => write!(f, "({} + {})", a, b),
            Expr::Sub(a, b) => write!(f, "({} - {})", a, b),
            Expr::Mul(factors) => {
                write!(f, "(")?;
                for (i, factor) in factors.iter().enumerate() {
                    if i > 0 {
                        write!(f, " * ")?;
                    }
                    write!(f, "{}", factor)?;
                }
                write!(f, ")")
            }
            Expr::Div(a, b) => write!(f, "({} / {})", a, b),
            Expr::Tuple(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            Expr::Assign { op, lhs, rhs } => {
                let symbol = match op {
                    AssignOp::Assign => "=",
                    AssignOp::Define => ":=",
                    AssignOp::AddAssign => "+=",
                    AssignOp::SubAssign => "-=",
                };
                write!(f, "{} {} {}", lhs, symbol, rhs)
            }
            Expr::Block(stmts) => {
                for stmt in stmts {
                    writeln!(f, "{}", stmt)?;
                }
                Ok(())
            }
            Expr::Opaque(stmts) => {
                write!(f, "opaque {{ ")?;
                for stmt in stmts {
                    write!(f, "{}; ", stmt)?;
                }
                write!(f, "}}")
            }
            Expr::Line(n) => write!(f, "# line {}", n),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}
