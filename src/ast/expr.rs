//! Expression AST nodes.

use std::fmt;

use crate::ast::stmt::Stmt;
use crate::span::Span;

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Integer literal: 42
    IntLiteral(i64),
    /// Float literal: 3.14
    FloatLiteral(f64),
    /// String literal: "hello"
    StringLiteral(String),
    /// Boolean literal: true, false
    BoolLiteral(bool),

    /// Variable reference: foo
    Identifier(String),

    /// Array literal: [1, 2, 3]
    Array(Vec<Expr>),
    /// Hash literal: {"a": 1}
    Hash(Vec<(Expr, Expr)>),
    /// Function literal: fn(a, b) { ... }
    Function { parameters: Vec<String>, body: Vec<Stmt> },

    /// Prefix operation: !a, -a
    Prefix { operator: String, right: Box<Expr> },
    /// Infix operation, including `=`, `.` and `::`
    Infix {
        left: Box<Expr>,
        operator: String,
        right: Box<Expr>,
    },

    /// Conditional: if (c) { ... } else { ... }
    If {
        condition: Box<Expr>,
        consequence: Vec<Stmt>,
        alternative: Option<Vec<Stmt>>,
    },
    /// Condition-controlled loop: loop (c) { ... }
    Loop { condition: Box<Expr>, body: Vec<Stmt> },

    /// Function call: f(a, b)
    Call { function: Box<Expr>, arguments: Vec<Expr> },
    /// Index or slice: a[i], a[lo:hi], a[lo:hi:step]
    Index(IndexExpr),
}

/// The operands of an index expression.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexExpr {
    pub left: Box<Expr>,
    pub index: Option<Box<Expr>>,
    pub upper: Option<Box<Expr>>,
    pub step: Option<Box<Expr>>,
    /// A `:` followed the lower bound
    pub has_upper: bool,
    /// A second `:` followed the upper bound
    pub has_step: bool,
}

/// Arithmetic and comparison operators understood by values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Subtract,
            "*" => BinaryOp::Multiply,
            "/" => BinaryOp::Divide,
            "%" => BinaryOp::Modulo,
            "==" => BinaryOp::Equal,
            "!=" => BinaryOp::NotEqual,
            "<" => BinaryOp::Less,
            "<=" => BinaryOp::LessEqual,
            ">" => BinaryOp::Greater,
            ">=" => BinaryOp::GreaterEqual,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ===== Constructors =====
//
// Trees built in code carry a default span.

impl Expr {
    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::IntLiteral(value), Span::default())
    }

    pub fn float(value: f64) -> Self {
        Self::new(ExprKind::FloatLiteral(value), Span::default())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ExprKind::StringLiteral(value.into()), Span::default())
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ExprKind::BoolLiteral(value), Span::default())
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Identifier(name.into()), Span::default())
    }

    pub fn array(elements: Vec<Expr>) -> Self {
        Self::new(ExprKind::Array(elements), Span::default())
    }

    pub fn hash(pairs: Vec<(Expr, Expr)>) -> Self {
        Self::new(ExprKind::Hash(pairs), Span::default())
    }

    pub fn function(parameters: &[&str], body: Vec<Stmt>) -> Self {
        let parameters = parameters.iter().map(|p| p.to_string()).collect();
        Self::new(ExprKind::Function { parameters, body }, Span::default())
    }

    pub fn prefix(operator: impl Into<String>, right: Expr) -> Self {
        Self::new(
            ExprKind::Prefix {
                operator: operator.into(),
                right: Box::new(right),
            },
            Span::default(),
        )
    }

    pub fn infix(left: Expr, operator: impl Into<String>, right: Expr) -> Self {
        Self::new(
            ExprKind::Infix {
                left: Box::new(left),
                operator: operator.into(),
                right: Box::new(right),
            },
            Span::default(),
        )
    }

    /// `target = value`
    pub fn assign(target: Expr, value: Expr) -> Self {
        Self::infix(target, "=", value)
    }

    /// `object.name`
    pub fn member(object: Expr, name: &str) -> Self {
        Self::infix(object, ".", Expr::string(name))
    }

    /// `scope::name`
    pub fn resolve(scope: Expr, name: &str) -> Self {
        Self::infix(scope, "::", Expr::string(name))
    }

    pub fn if_(condition: Expr, consequence: Vec<Stmt>, alternative: Option<Vec<Stmt>>) -> Self {
        Self::new(
            ExprKind::If {
                condition: Box::new(condition),
                consequence,
                alternative,
            },
            Span::default(),
        )
    }

    pub fn loop_(condition: Expr, body: Vec<Stmt>) -> Self {
        Self::new(
            ExprKind::Loop {
                condition: Box::new(condition),
                body,
            },
            Span::default(),
        )
    }

    pub fn call(function: Expr, arguments: Vec<Expr>) -> Self {
        Self::new(
            ExprKind::Call {
                function: Box::new(function),
                arguments,
            },
            Span::default(),
        )
    }

    /// `left[index]`
    pub fn index(left: Expr, index: Expr) -> Self {
        Self::new(
            ExprKind::Index(IndexExpr {
                left: Box::new(left),
                index: Some(Box::new(index)),
                upper: None,
                step: None,
                has_upper: false,
                has_step: false,
            }),
            Span::default(),
        )
    }

    /// `left[index:upper:step]` with any bound omitted.
    pub fn slice(
        left: Expr,
        index: Option<Expr>,
        upper: Option<Expr>,
        step: Option<Expr>,
    ) -> Self {
        let has_step = step.is_some();
        Self::new(
            ExprKind::Index(IndexExpr {
                left: Box::new(left),
                index: index.map(Box::new),
                upper: upper.map(Box::new),
                step: step.map(Box::new),
                has_upper: true,
                has_step,
            }),
            Span::default(),
        )
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

// Source rendering. Hash literal keys are ordered by this text.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::IntLiteral(n) => write!(f, "{}", n),
            ExprKind::FloatLiteral(n) => write!(f, "{}", n),
            ExprKind::StringLiteral(s) => write!(f, "{}", s),
            ExprKind::BoolLiteral(b) => write!(f, "{}", b),
            ExprKind::Identifier(name) => write!(f, "{}", name),
            ExprKind::Array(elements) => {
                write!(f, "[")?;
                write_list(f, elements)?;
                write!(f, "]")
            }
            ExprKind::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}:{}", key, value)?;
                }
                write!(f, "}}")
            }
            ExprKind::Function { parameters, body } => {
                write!(f, "fn({}) ", parameters.join(", "))?;
                write_block(f, body)
            }
            ExprKind::Prefix { operator, right } => write!(f, "({}{})", operator, right),
            ExprKind::Infix {
                left,
                operator,
                right,
            } => match operator.as_str() {
                "." | "::" => write!(f, "{}{}{}", left, operator, right),
                _ => write!(f, "({} {} {})", left, operator, right),
            },
            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if{} ", condition)?;
                write_block(f, consequence)?;
                if let Some(alternative) = alternative {
                    write!(f, " else ")?;
                    write_block(f, alternative)?;
                }
                Ok(())
            }
            ExprKind::Loop { condition, body } => {
                write!(f, "loop{} ", condition)?;
                write_block(f, body)
            }
            ExprKind::Call {
                function,
                arguments,
            } => {
                write!(f, "{}(", function)?;
                write_list(f, arguments)?;
                write!(f, ")")
            }
            ExprKind::Index(index) => {
                write!(f, "({}[", index.left)?;
                if let Some(lower) = &index.index {
                    write!(f, "{}", lower)?;
                }
                if index.has_upper {
                    write!(f, ":")?;
                    if let Some(upper) = &index.upper {
                        write!(f, "{}", upper)?;
                    }
                }
                if index.has_step {
                    write!(f, ":")?;
                    if let Some(step) = &index.step {
                        write!(f, "{}", step)?;
                    }
                }
                write!(f, "])")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

pub(crate) fn write_block(f: &mut fmt::Formatter<'_>, statements: &[Stmt]) -> fmt::Result {
    write!(f, "{{ ")?;
    for stmt in statements {
        write!(f, "{} ", stmt)?;
    }
    write!(f, "}}")
}
