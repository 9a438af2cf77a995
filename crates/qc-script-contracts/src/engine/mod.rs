//! # Reference Script Engine
//!
//! A small, deterministic, JavaScript-flavoured contract language.
//!
//! | Component | Location | Purpose |
//! |-----------|----------|---------|
//! | Tokenizer | `engine/tokenizer.rs` | Source to tokens, rejects floats |
//! | Parser | `engine/parser.rs` | Tokens to [`ast::Program`], bounded nesting |
//! | Interpreter | `engine/interpreter.rs` | Metered evaluation |
//! | Built-ins | `engine/builtins.rs` | `len`, `str`, `int`, `keys`, ... |
//!
//! The execution core only sees this engine through the
//! [`ScriptEngine`]/[`Executable`] traits.

pub mod ast;
pub mod builtins;
pub mod interpreter;
pub mod parser;
pub mod tokenizer;

use crate::domain::entities::{EntryPoint, EntryPointSet};
use crate::domain::invariants::limits;
use crate::domain::value_objects::Value;
use crate::errors::{CompileError, ContractError};
use crate::ports::outbound::{Executable, HostApi, ScriptEngine};
use ast::{Accessor, Expr, Program, Stmt};
use interpreter::Interpreter;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Engine name recorded in code records.
pub const ENGINE_NAME: &str = "miniscript";

/// The reference engine.
#[derive(Clone, Copy, Debug)]
pub struct MiniScriptEngine {
    max_parse_depth: usize,
}

impl MiniScriptEngine {
    /// Creates an engine with the default nesting limit.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_parse_depth: limits::MAX_PARSE_DEPTH,
        }
    }

    /// Overrides the parser nesting limit.
    #[must_use]
    pub const fn with_max_parse_depth(mut self, depth: usize) -> Self {
        self.max_parse_depth = depth;
        self
    }
}

impl Default for MiniScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine for MiniScriptEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn compile(&self, source: &str) -> Result<Arc<dyn Executable>, CompileError> {
        let program = parser::parse(source, self.max_parse_depth)?;
        Ok(Arc::new(CompiledScript::new(program)))
    }
}

/// A parsed program plus its static facts.
#[derive(Debug)]
pub struct CompiledScript {
    program: Program,
    entry_points: EntryPointSet,
    free_names: BTreeSet<String>,
}

impl CompiledScript {
    /// Analyses a parsed program.
    #[must_use]
    pub fn new(program: Program) -> Self {
        let entry_points = EntryPointSet::from_names(program.functions.keys().map(String::as_str));
        let free_names = free_names(&program);
        Self {
            program,
            entry_points,
            free_names,
        }
    }

    /// The parsed program.
    #[must_use]
    pub const fn program(&self) -> &Program {
        &self.program
    }
}

impl Executable for CompiledScript {
    fn entry_points(&self) -> EntryPointSet {
        self.entry_points
    }

    fn referenced_globals(&self) -> BTreeSet<String> {
        self.free_names.clone()
    }

    fn call(
        &self,
        entry: EntryPoint,
        args: Vec<Value>,
        host: &mut dyn HostApi,
    ) -> Result<Value, ContractError> {
        Interpreter::new(&self.program, host).run(entry.name(), args)
    }
}

// =============================================================================
// FREE NAME ANALYSIS
// =============================================================================

/// Names used as variables or callees that the program never declares.
///
/// Declarations anywhere in the program count, so a local that shadows a
/// forbidden name is never reported.
fn free_names(program: &Program) -> BTreeSet<String> {
    let mut declared: BTreeSet<String> = program.functions.keys().cloned().collect();
    let mut used = BTreeSet::new();

    for binding in &program.globals {
        declared.insert(binding.name.clone());
        if let Some(init) = &binding.init {
            collect_expr(init, &mut used);
        }
    }
    for function in program.functions.values() {
        declared.extend(function.params.iter().cloned());
        collect_stmts(&function.body, &mut declared, &mut used);
    }

    used.retain(|name| !declared.contains(name));
    used
}

fn collect_stmts(stmts: &[Stmt], declared: &mut BTreeSet<String>, used: &mut BTreeSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Let(binding) => {
                declared.insert(binding.name.clone());
                if let Some(init) = &binding.init {
                    collect_expr(init, used);
                }
            }
            Stmt::Assign { target, value, .. } => {
                used.insert(target.root.clone());
                for accessor in &target.path {
                    if let Accessor::Index(expr) = accessor {
                        collect_expr(expr, used);
                    }
                }
                collect_expr(value, used);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                collect_expr(cond, used);
                collect_stmts(then, declared, used);
                collect_stmts(otherwise, declared, used);
            }
            Stmt::While { cond, body } => {
                collect_expr(cond, used);
                collect_stmts(body, declared, used);
            }
            Stmt::Block(body) => collect_stmts(body, declared, used),
            Stmt::Return(Some(expr)) | Stmt::Throw(expr) | Stmt::Expr(expr) => {
                collect_expr(expr, used);
            }
            Stmt::Return(None) | Stmt::Break | Stmt::Continue => {}
        }
    }
}

fn collect_expr(expr: &Expr, used: &mut BTreeSet<String>) {
    match expr {
        Expr::Null | Expr::Bool(_) | Expr::Int(_) | Expr::Str(_) => {}
        Expr::Ident(name) => {
            used.insert(name.clone());
        }
        Expr::List(items) => items.iter().for_each(|item| collect_expr(item, used)),
        Expr::Map(entries) => entries.iter().for_each(|(_, item)| collect_expr(item, used)),
        Expr::Member(base, _) | Expr::Unary(_, base) => collect_expr(base, used),
        Expr::Index(a, b) | Expr::Binary(_, a, b) | Expr::Logical(_, a, b) => {
            collect_expr(a, used);
            collect_expr(b, used);
        }
        Expr::Call(name, args) => {
            used.insert(name.clone());
            args.iter().for_each(|arg| collect_expr(arg, used));
        }
    }
}
