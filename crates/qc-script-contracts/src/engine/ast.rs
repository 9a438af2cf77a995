//! # Syntax Tree
//!
//! Immutable program representation shared by every call of a contract.

use std::collections::BTreeMap;

/// A compiled contract program.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    /// Top-level functions by name.
    pub functions: BTreeMap<String, Function>,
    /// Top-level bindings in declaration order. Re-evaluated on every call.
    pub globals: Vec<Binding>,
}

/// A `let`/`const` binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    /// Bound name.
    pub name: String,
    /// Initializer, `null` when absent.
    pub init: Option<Expr>,
    /// Declared with `const`.
    pub constant: bool,
}

/// A function declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    /// Function name.
    pub name: String,
    /// Parameter names.
    pub params: Vec<String>,
    /// Body statements.
    pub body: Vec<Stmt>,
}

/// Statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
    /// `let`/`const` declaration.
    Let(Binding),
    /// Assignment to a variable, member or index.
    Assign {
        /// Target place.
        target: Place,
        /// `=`, `+=` or `-=`.
        op: AssignOp,
        /// Right-hand side.
        value: Expr,
    },
    /// `if`/`else`.
    If {
        /// Condition.
        cond: Expr,
        /// Taken when truthy.
        then: Vec<Stmt>,
        /// Taken when falsy.
        otherwise: Vec<Stmt>,
    },
    /// `while` loop.
    While {
        /// Condition.
        cond: Expr,
        /// Loop body.
        body: Vec<Stmt>,
    },
    /// Nested block.
    Block(Vec<Stmt>),
    /// `break`.
    Break,
    /// `continue`.
    Continue,
    /// `return`.
    Return(Option<Expr>),
    /// `throw`.
    Throw(Expr),
    /// Expression evaluated for effect.
    Expr(Expr),
}

/// Assignable place: a variable followed by member/index accessors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Place {
    /// Root variable.
    pub root: String,
    /// Accessors applied to the root.
    pub path: Vec<Accessor>,
}

/// A step into a map or list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Accessor {
    /// `.name`
    Member(String),
    /// `[expr]`
    Index(Expr),
}

/// Assignment operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Set,
    /// `+=`
    Add,
    /// `-=`
    Sub,
}

/// Expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    /// `null`
    Null,
    /// `true`/`false`
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// String literal.
    Str(String),
    /// Variable reference.
    Ident(String),
    /// `[a, b]`
    List(Vec<Expr>),
    /// `{k: v}`
    Map(Vec<(String, Expr)>),
    /// `a.b`
    Member(Box<Expr>, String),
    /// `a[b]`
    Index(Box<Expr>, Box<Expr>),
    /// `name(args)`
    Call(String, Vec<Expr>),
    /// Prefix operator.
    Unary(UnaryOp, Box<Expr>),
    /// Strict binary operator.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Short-circuit operator.
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
}

/// Prefix operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
}

/// Binary operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Short-circuit operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
}
