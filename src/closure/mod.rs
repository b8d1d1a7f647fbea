//! Closure front-end.
//!
//! Closures are written as explicit syntax trees with a small builder DSL
//! and translated into IR fragments by [`ClosureParser`]:
//!
//! ```
//! use queryshape::closure::{lambda, Syntax};
//!
//! // |x| x.price > 100 and x.name.startswith("Len")
//! let filter = lambda(["x"], |[x]| {
//!     x.attr("price")
//!         .gt(100)
//!         .and(x.attr("name").method("startswith", ["Len"]))
//! });
//! assert_eq!(filter.params(), ["x"]);
//! ```
//!
//! The node set mirrors an ordinary expression grammar: attribute access,
//! comparisons (chainable), boolean operators, arithmetic, calls, slices,
//! conditionals and list/tuple/dict literals for projections.

mod parser;

use std::collections::BTreeMap;

use crate::query::{Expr, Literal};

pub use parser::ClosureParser;

// =============================================================================
// Syntax Tree
// =============================================================================

/// Comparison operators, including the identity forms used for null checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    USub,
}

/// Subscript forms. Only slices translate; indexing is rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum Subscript {
    Index(Box<Syntax>),
    Slice {
        lower: Option<Box<Syntax>>,
        upper: Option<Box<Syntax>>,
        step: Option<Box<Syntax>>,
    },
}

/// A closure body node.
#[derive(Debug, Clone, PartialEq)]
pub enum Syntax {
    /// A lambda parameter.
    Param(String),
    /// A free name: a named parameter or a function name in call position.
    Name(String),
    Attribute {
        value: Box<Syntax>,
        attr: String,
    },
    Constant(Literal),
    /// `left op0 c0 op1 c1 ...`
    Compare {
        left: Box<Syntax>,
        comparators: Vec<(CmpOp, Syntax)>,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<Syntax>,
    },
    BinOp {
        op: BinOp,
        left: Box<Syntax>,
        right: Box<Syntax>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Syntax>,
    },
    /// Free call when `func` is a [`Syntax::Name`], method call when it is
    /// an attribute.
    Call {
        func: Box<Syntax>,
        args: Vec<Syntax>,
        keywords: Vec<(String, Syntax)>,
    },
    Subscript {
        value: Box<Syntax>,
        slice: Subscript,
    },
    /// `body if test else orelse`
    IfExp {
        test: Box<Syntax>,
        body: Box<Syntax>,
        orelse: Box<Syntax>,
    },
    List(Vec<Syntax>),
    Tuple(Vec<Syntax>),
    Dict(Vec<(Syntax, Syntax)>),
    Lambda(Box<Lambda>),
}

/// A closure: parameter names plus body.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    params: Vec<String>,
    body: Syntax,
}

impl Lambda {
    pub fn new(params: Vec<String>, body: Syntax) -> Self {
        Self { params, body }
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn body(&self) -> &Syntax {
        &self.body
    }

    pub(crate) fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p == name)
    }
}

/// Build a lambda whose body is produced from its parameter nodes.
pub fn lambda<const N: usize>(params: [&str; N], body: impl FnOnce([Syntax; N]) -> Syntax) -> Lambda {
    let names: Vec<String> = params.iter().map(|p| p.to_string()).collect();
    let body = body(params.map(Syntax::param));
    Lambda::new(names, body)
}

/// Named-parameter substitution table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, Expr>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Expr>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.0.get(name)
    }
}

// =============================================================================
// Builder DSL
// =============================================================================

impl Syntax {
    pub fn param(name: &str) -> Syntax {
        Syntax::Param(name.to_string())
    }

    pub fn name(name: &str) -> Syntax {
        Syntax::Name(name.to_string())
    }

    pub fn none() -> Syntax {
        Syntax::Constant(Literal::Null)
    }

    /// Free function call: `count(x.id)`.
    pub fn call<I, S>(name: &str, args: I) -> Syntax
    where
        I: IntoIterator<Item = S>,
        S: Into<Syntax>,
    {
        Syntax::Call {
            func: Box::new(Syntax::name(name)),
            args: args.into_iter().map(Into::into).collect(),
            keywords: Vec::new(),
        }
    }

    /// Keyword call, the projection shape `dict(total=sum(x.price))`.
    pub fn call_kw<I>(name: &str, keywords: I) -> Syntax
    where
        I: IntoIterator<Item = (&'static str, Syntax)>,
    {
        Syntax::Call {
            func: Box::new(Syntax::name(name)),
            args: Vec::new(),
            keywords: keywords
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    pub fn list(items: impl IntoIterator<Item = Syntax>) -> Syntax {
        Syntax::List(items.into_iter().collect())
    }

    pub fn tuple(items: impl IntoIterator<Item = Syntax>) -> Syntax {
        Syntax::Tuple(items.into_iter().collect())
    }

    pub fn dict<I>(entries: I) -> Syntax
    where
        I: IntoIterator<Item = (&'static str, Syntax)>,
    {
        Syntax::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (Syntax::from(k), v))
                .collect(),
        )
    }

    pub fn attr(&self, name: &str) -> Syntax {
        Syntax::Attribute {
            value: Box::new(self.clone()),
            attr: name.to_string(),
        }
    }

    /// Method call on this node: `x.name.upper()`.
    pub fn method<I, S>(&self, name: &str, args: I) -> Syntax
    where
        I: IntoIterator<Item = S>,
        S: Into<Syntax>,
    {
        Syntax::Call {
            func: Box::new(self.attr(name)),
            args: args.into_iter().map(Into::into).collect(),
            keywords: Vec::new(),
        }
    }

    /// `self[lower:upper]`
    pub fn slice(self, lower: Option<i64>, upper: Option<i64>) -> Syntax {
        Syntax::Subscript {
            value: Box::new(self),
            slice: Subscript::Slice {
                lower: lower.map(|n| Box::new(Syntax::from(n))),
                upper: upper.map(|n| Box::new(Syntax::from(n))),
                step: None,
            },
        }
    }

    pub fn index(self, index: impl Into<Syntax>) -> Syntax {
        Syntax::Subscript {
            value: Box::new(self),
            slice: Subscript::Index(Box::new(index.into())),
        }
    }

    /// `self if test else orelse`
    pub fn if_else(self, test: Syntax, orelse: impl Into<Syntax>) -> Syntax {
        Syntax::IfExp {
            test: Box::new(test),
            body: Box::new(self),
            orelse: Box::new(orelse.into()),
        }
    }

    fn compare(self, op: CmpOp, other: Syntax) -> Syntax {
        Syntax::Compare {
            left: Box::new(self),
            comparators: vec![(op, other)],
        }
    }

    pub fn eq(self, other: impl Into<Syntax>) -> Syntax {
        self.compare(CmpOp::Eq, other.into())
    }

    pub fn ne(self, other: impl Into<Syntax>) -> Syntax {
        self.compare(CmpOp::NotEq, other.into())
    }

    pub fn lt(self, other: impl Into<Syntax>) -> Syntax {
        self.compare(CmpOp::Lt, other.into())
    }

    pub fn le(self, other: impl Into<Syntax>) -> Syntax {
        self.compare(CmpOp::LtE, other.into())
    }

    pub fn gt(self, other: impl Into<Syntax>) -> Syntax {
        self.compare(CmpOp::Gt, other.into())
    }

    pub fn ge(self, other: impl Into<Syntax>) -> Syntax {
        self.compare(CmpOp::GtE, other.into())
    }

    pub fn is(self, other: impl Into<Syntax>) -> Syntax {
        self.compare(CmpOp::Is, other.into())
    }

    pub fn is_not(self, other: impl Into<Syntax>) -> Syntax {
        self.compare(CmpOp::IsNot, other.into())
    }

    /// Extend a comparison chain: `low.le(x).chain(CmpOp::LtE, high)` is
    /// `low <= x <= high`.
    pub fn chain(self, op: CmpOp, other: impl Into<Syntax>) -> Syntax {
        match self {
            Syntax::Compare {
                left,
                mut comparators,
            } => {
                comparators.push((op, other.into()));
                Syntax::Compare { left, comparators }
            }
            single => single.compare(op, other.into()),
        }
    }

    fn bool_op(self, op: BoolOp, other: Syntax) -> Syntax {
        match self {
            Syntax::BoolOp {
                op: current,
                mut values,
            } if current == op => {
                values.push(other);
                Syntax::BoolOp { op, values }
            }
            first => Syntax::BoolOp {
                op,
                values: vec![first, other],
            },
        }
    }

    pub fn and(self, other: Syntax) -> Syntax {
        self.bool_op(BoolOp::And, other)
    }

    pub fn or(self, other: Syntax) -> Syntax {
        self.bool_op(BoolOp::Or, other)
    }

    pub fn not(self) -> Syntax {
        Syntax::UnaryOp {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }

    pub fn neg(self) -> Syntax {
        Syntax::UnaryOp {
            op: UnaryOp::USub,
            operand: Box::new(self),
        }
    }

    fn bin_op(self, op: BinOp, other: Syntax) -> Syntax {
        Syntax::BinOp {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn add(self, other: impl Into<Syntax>) -> Syntax {
        self.bin_op(BinOp::Add, other.into())
    }

    pub fn sub(self, other: impl Into<Syntax>) -> Syntax {
        self.bin_op(BinOp::Sub, other.into())
    }

    pub fn mul(self, other: impl Into<Syntax>) -> Syntax {
        self.bin_op(BinOp::Mult, other.into())
    }

    pub fn div(self, other: impl Into<Syntax>) -> Syntax {
        self.bin_op(BinOp::Div, other.into())
    }

    pub fn modulo(self, other: impl Into<Syntax>) -> Syntax {
        self.bin_op(BinOp::Mod, other.into())
    }
}

impl From<Literal> for Syntax {
    fn from(lit: Literal) -> Self {
        Syntax::Constant(lit)
    }
}

impl From<i64> for Syntax {
    fn from(n: i64) -> Self {
        Syntax::Constant(Literal::Int(n))
    }
}

impl From<i32> for Syntax {
    fn from(n: i32) -> Self {
        Syntax::Constant(Literal::Int(n as i64))
    }
}

impl From<f64> for Syntax {
    fn from(f: f64) -> Self {
        Syntax::Constant(Literal::Double(f))
    }
}

impl From<bool> for Syntax {
    fn from(b: bool) -> Self {
        Syntax::Constant(Literal::Bool(b))
    }
}

impl From<&str> for Syntax {
    fn from(s: &str) -> Self {
        Syntax::Constant(Literal::String(s.to_string()))
    }
}

impl From<String> for Syntax {
    fn from(s: String) -> Self {
        Syntax::Constant(Literal::String(s))
    }
}

impl From<Lambda> for Syntax {
    fn from(lambda: Lambda) -> Self {
        Syntax::Lambda(Box::new(lambda))
    }
}
