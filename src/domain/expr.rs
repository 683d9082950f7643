//! Expression tree data structures.
//!
//! The tree is a closed set of node kinds. Anything the parser cannot map onto
//! one of these variants (attribute access, assignment, lambdas, calls on
//! arbitrary callees) is rejected before evaluation can ever see it.

use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Literal,
    List,
    Tuple,
    Map,
    Identifier,
    Unary,
    Binary,
    Compare,
    BoolOp,
    Conditional,
    Call,
    Subscript,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Literal => "Literal",
            NodeKind::List => "List",
            NodeKind::Tuple => "Tuple",
            NodeKind::Map => "Map",
            NodeKind::Identifier => "Identifier",
            NodeKind::Unary => "Unary",
            NodeKind::Binary => "Binary",
            NodeKind::Compare => "Compare",
            NodeKind::BoolOp => "BoolOp",
            NodeKind::Conditional => "Conditional",
            NodeKind::Call => "Call",
            NodeKind::Subscript => "Subscript",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Invert,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Identifier(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a < b <= c`: one left operand followed by (op, operand) pairs.
    Compare {
        left: Box<Expr>,
        comparisons: Vec<(CompareOp, Expr)>,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
}

impl Expr {
    pub fn kind(&self) -> NodeKind {
        match self {
            Expr::Literal(_) => NodeKind::Literal,
            Expr::List(_) => NodeKind::List,
            Expr::Tuple(_) => NodeKind::Tuple,
            Expr::Map(_) => NodeKind::Map,
            Expr::Identifier(_) => NodeKind::Identifier,
            Expr::Unary { .. } => NodeKind::Unary,
            Expr::Binary { .. } => NodeKind::Binary,
            Expr::Compare { .. } => NodeKind::Compare,
            Expr::BoolOp { .. } => NodeKind::BoolOp,
            Expr::Conditional { .. } => NodeKind::Conditional,
            Expr::Call { .. } => NodeKind::Call,
            Expr::Subscript { .. } => NodeKind::Subscript,
        }
    }

    /// Visit every node, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Literal(_) | Expr::Identifier(_) => {}
            Expr::List(items) | Expr::Tuple(items) => {
                items.iter().for_each(|e| e.walk(visit));
            }
            Expr::Map(entries) => {
                for (k, v) in entries {
                    k.walk(visit);
                    v.walk(visit);
                }
            }
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Compare { left, comparisons } => {
                left.walk(visit);
                comparisons.iter().for_each(|(_, e)| e.walk(visit));
            }
            Expr::BoolOp { values, .. } => values.iter().for_each(|e| e.walk(visit)),
            Expr::Conditional {
                test,
                body,
                orelse,
            } => {
                test.walk(visit);
                body.walk(visit);
                orelse.walk(visit);
            }
            Expr::Call { args, kwargs, .. } => {
                args.iter().for_each(|e| e.walk(visit));
                kwargs.iter().for_each(|(_, e)| e.walk(visit));
            }
            Expr::Subscript { value, index } => {
                value.walk(visit);
                index.walk(visit);
            }
        }
    }

    /// Every identifier referenced, in sorted order.
    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.walk(&mut |e| {
            if let Expr::Identifier(name) = e {
                names.insert(name.clone());
            }
        });
        names
    }

    /// Every function name called, in sorted order.
    pub fn function_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.walk(&mut |e| {
            if let Expr::Call { name, .. } = e {
                names.insert(name.clone());
            }
        });
        names
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Invert => "~",
            UnaryOp::Not => "not ",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtE => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtE => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        };
        write!(f, "{}", s)
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Fully parenthesized canonical rendering; re-parsing it yields the same tree.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Literal::Number(n)) => write!(f, "{}", n),
            Expr::Literal(Literal::String(s)) => write!(f, "{:?}", s),
            Expr::Literal(Literal::Bool(b)) => write!(f, "{}", b),
            Expr::Literal(Literal::Null) => write!(f, "null"),
            Expr::List(items) => {
                write!(f, "[")?;
                write_joined(f, items)?;
                write!(f, "]")
            }
            Expr::Tuple(items) => {
                write!(f, "(")?;
                write_joined(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Expr::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Expr::Identifier(name) => write!(f, "{}", name),
            Expr::Unary { op, operand } => write!(f, "({}{})", op, operand),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Compare { left, comparisons } => {
                write!(f, "({}", left)?;
                for (op, operand) in comparisons {
                    write!(f, " {} {}", op, operand)?;
                }
                write!(f, ")")
            }
            Expr::BoolOp { op, values } => {
                let sep = match op {
                    BoolOp::And => " and ",
                    BoolOp::Or => " or ",
                };
                write!(f, "(")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", sep)?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
            Expr::Conditional {
                test,
                body,
                orelse,
            } => write!(f, "({} if {} else {})", body, test, orelse),
            Expr::Call { name, args, kwargs } => {
                write!(f, "{}(", name)?;
                write_joined(f, args)?;
                for (i, (k, v)) in kwargs.iter().enumerate() {
                    if i > 0 || !args.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                write!(f, ")")
            }
            Expr::Subscript { value, index } => write!(f, "{}[{}]", value, index),
        }
    }
}
