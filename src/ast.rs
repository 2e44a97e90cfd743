use std::fmt;
use std::rc::Rc;

use crate::ctx::Symbol;

/// Root of the AST: an ordered sequence of statements.
///
/// Its `Display` output is the canonical source reconstruction used by
/// tests and the REPL; every node below contributes its own fragment.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Stmt {
    /// `let <name> = <value>;`.  The value is absent only when its parse
    /// failed; the parser's error list carries the diagnostic and callers
    /// do not evaluate such a program.
    Let(Symbol, Option<Expr>),
    /// `return <value>;`, value absent under the same conditions as `Let`.
    Return(Option<Expr>),
    /// A bare expression in statement position.
    Expr(Expr),
}

/// A `{ ... }` statement sequence, the body form required by `if` arms and
/// function literals.
#[derive(Debug, PartialEq, Clone)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Identifier(Symbol),
    /// An integer literal keeps its lexeme so printing reproduces the
    /// source text even when it differs from the decimal form of `value`.
    Integer { value: i64, literal: String },
    Str(String),
    Boolean(bool),
    Prefix(PrefixOp, Box<Expr>),
    Infix(Box<Expr>, InfixOp, Box<Expr>),
    If {
        condition: Box<Expr>,
        consequence: Block,
        alternative: Option<Block>,
    },
    /// A function literal.  Parameter list and body sit behind `Rc` so a
    /// `Function` value shares them with the AST instead of deep-cloning
    /// at every evaluation of the literal.
    Function {
        parameters: Rc<Vec<Symbol>>,
        body: Rc<Block>,
    },
    Call {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PrefixOp {
    Not,
    Neg,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Less,
    Greater,
    Equal,
    NotEqual,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Let(name, value) => {
                write!(f, "let {} = ", name)?;
                if let Some(value) = value {
                    write!(f, "{}", value)?;
                }
                write!(f, ";")
            }
            Stmt::Return(value) => {
                write!(f, "return ")?;
                if let Some(value) = value {
                    write!(f, "{}", value)?;
                }
                write!(f, ";")
            }
            Stmt::Expr(expr) => write!(f, "{}", expr),
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Identifier(name) => write!(f, "{}", name),
            Expr::Integer { literal, .. } => write!(f, "{}", literal),
            Expr::Str(value) => write!(f, "{}", value),
            Expr::Boolean(value) => write!(f, "{}", value),
            Expr::Prefix(op, right) => write!(f, "({}{})", op, right),
            Expr::Infix(left, op, right) => write!(f, "({} {} {})", left, op, right),
            Expr::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if{} {}", condition, consequence)?;
                if let Some(alternative) = alternative {
                    write!(f, "else {}", alternative)?;
                }
                Ok(())
            }
            Expr::Function { parameters, body } => {
                write!(f, "fn({}) {}", join(parameters.iter()), body)
            }
            Expr::Call {
                function,
                arguments,
            } => write!(f, "{}({})", function, join(arguments.iter())),
        }
    }
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixOp::Not => write!(f, "!"),
            PrefixOp::Neg => write!(f, "-"),
        }
    }
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfixOp::Add => write!(f, "+"),
            InfixOp::Sub => write!(f, "-"),
            InfixOp::Mul => write!(f, "*"),
            InfixOp::Div => write!(f, "/"),
            InfixOp::Less => write!(f, "<"),
            InfixOp::Greater => write!(f, ">"),
            InfixOp::Equal => write!(f, "=="),
            InfixOp::NotEqual => write!(f, "!="),
        }
    }
}

pub(crate) fn join<T: fmt::Display>(items: impl Iterator<Item = T>) -> String {
    items
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
