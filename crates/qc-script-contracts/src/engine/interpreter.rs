//! # Interpreter
//!
//! Metered tree-walking evaluator.
//!
//! Every statement and expression costs one step, every constructed string,
//! list or map is charged to memory, and every function frame is charged to
//! call depth. Reading a variable copies it and costs steps in proportion to
//! its size; member and index chains on a variable are walked in place so
//! only the result is copied. Statement and expression evaluation is charged
//! to the meter's nesting ceiling, which bounds host stack use.
//!
//! Arithmetic is checked `i64`; there is no floating point and no source of
//! nondeterminism.

use crate::domain::value_objects::Value;
use crate::engine::ast::{
    Accessor, AssignOp, BinaryOp, Expr, Function, LogicalOp, Place, Program, Stmt, UnaryOp,
};
use crate::engine::builtins::{call_builtin, is_builtin};
use crate::errors::ContractError;
use crate::ports::outbound::HostApi;
use std::borrow::Cow;
use std::collections::BTreeMap;

#[derive(Debug)]
struct Slot {
    value: Value,
    constant: bool,
}

type Scope = BTreeMap<String, Slot>;

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// One link of a `a.b[c]` chain, outermost first.
enum Link<'p> {
    Member(&'p str),
    Index(&'p Expr),
}

/// Start of a member/index chain.
enum Root<'p> {
    Variable(&'p str),
    Value(Value),
}

/// A resolved accessor on a read or assignment path.
enum Key {
    Name(String),
    Value(Value),
}

impl Key {
    fn map_key(&self) -> Result<String, ContractError> {
        match self {
            Self::Name(name) => Ok(name.clone()),
            Self::Value(Value::Str(s)) => Ok(s.clone()),
            Self::Value(Value::Int(i)) => Ok(i.to_string()),
            Self::Value(other) => Err(ContractError::script(format!(
                "cannot use {} as a map key",
                other.type_name()
            ))),
        }
    }
}

/// Evaluates one entry point call over a shared program.
pub struct Interpreter<'p, 'h> {
    program: &'p Program,
    host: &'h mut dyn HostApi,
    globals: Scope,
    frames: Vec<Vec<Scope>>,
}

impl<'p, 'h> Interpreter<'p, 'h> {
    /// Creates a fresh interpreter. No state is carried between instances.
    pub fn new(program: &'p Program, host: &'h mut dyn HostApi) -> Self {
        Self {
            program,
            host,
            globals: Scope::new(),
            frames: Vec::new(),
        }
    }

    /// Evaluates top-level bindings, then calls `name` with `args`.
    pub fn run(mut self, name: &str, args: Vec<Value>) -> Result<Value, ContractError> {
        let program = self.program;
        for binding in &program.globals {
            self.charge_step()?;
            let value = match &binding.init {
                Some(init) => self.eval(init)?,
                None => Value::Null,
            };
            self.globals.insert(
                binding.name.clone(),
                Slot {
                    value,
                    constant: binding.constant,
                },
            );
        }

        let function = program
            .functions
            .get(name)
            .ok_or_else(|| undefined_function(name))?;
        self.call_function(function, args)
    }

    // -------------------------------------------------------------------------
    // metering
    // -------------------------------------------------------------------------

    fn charge_step(&mut self) -> Result<(), ContractError> {
        self.host.meter().charge_steps(1)
    }

    fn charge_copy(&mut self, bytes: u64) -> Result<(), ContractError> {
        self.host.meter().charge_copy(bytes)
    }

    fn charge_alloc(&mut self, value: &Value) -> Result<(), ContractError> {
        match value {
            Value::Str(_) | Value::List(_) | Value::Map(_) => {
                self.host.meter().charge_memory(value.approx_size())
            }
            _ => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // functions and scopes
    // -------------------------------------------------------------------------

    fn call_function(
        &mut self,
        function: &'p Function,
        args: Vec<Value>,
    ) -> Result<Value, ContractError> {
        self.host.meter().enter_frame()?;

        let mut args = args.into_iter();
        let scope: Scope = function
            .params
            .iter()
            .map(|param| {
                let value = args.next().unwrap_or(Value::Null);
                (
                    param.clone(),
                    Slot {
                        value,
                        constant: false,
                    },
                )
            })
            .collect();

        self.frames.push(vec![scope]);
        let flow = self.exec_stmts(&function.body);
        self.frames.pop();
        self.host.meter().exit_frame();

        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::Null),
        }
    }

    fn scopes_mut(&mut self) -> Option<&mut Vec<Scope>> {
        self.frames.last_mut()
    }

    fn declare(&mut self, name: &str, value: Value, constant: bool) {
        let slot = Slot { value, constant };
        match self.scopes_mut().and_then(|scopes| scopes.last_mut()) {
            Some(scope) => {
                scope.insert(name.to_string(), slot);
            }
            None => {
                self.globals.insert(name.to_string(), slot);
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<&Slot> {
        self.frames
            .last()
            .and_then(|scopes| scopes.iter().rev().find_map(|scope| scope.get(name)))
            .or_else(|| self.globals.get(name))
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Slot> {
        if let Some(scopes) = self.frames.last_mut() {
            if let Some(scope) = scopes.iter_mut().rev().find(|scope| scope.contains_key(name)) {
                return scope.get_mut(name);
            }
        }
        self.globals.get_mut(name)
    }

    // -------------------------------------------------------------------------
    // statements
    // -------------------------------------------------------------------------

    fn exec_block(&mut self, stmts: &'p [Stmt]) -> Result<Flow, ContractError> {
        if let Some(scopes) = self.scopes_mut() {
            scopes.push(Scope::new());
        }
        let flow = self.exec_stmts(stmts);
        if let Some(scopes) = self.scopes_mut() {
            scopes.pop();
        }
        flow
    }

    fn exec_stmts(&mut self, stmts: &'p [Stmt]) -> Result<Flow, ContractError> {
        for stmt in stmts {
            match self.exec(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &'p Stmt) -> Result<Flow, ContractError> {
        self.host.meter().enter_nesting()?;
        let flow = self.exec_stmt(stmt);
        self.host.meter().exit_nesting();
        flow
    }

    fn exec_stmt(&mut self, stmt: &'p Stmt) -> Result<Flow, ContractError> {
        self.charge_step()?;
        match stmt {
            Stmt::Let(binding) => {
                let value = match &binding.init {
                    Some(init) => self.eval(init)?,
                    None => Value::Null,
                };
                self.declare(&binding.name, value, binding.constant);
                Ok(Flow::Normal)
            }
            Stmt::Assign { target, op, value } => {
                self.assign(target, *op, value)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.exec_block(then)
                } else {
                    self.exec_block(otherwise)
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.is_truthy() {
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Block(stmts) => self.exec_block(stmts),
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Throw(expr) => {
                let value = self.eval(expr)?;
                Err(ContractError::script(format!("uncaught exception: {value}")))
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn assign(&mut self, target: &'p Place, op: AssignOp, value: &'p Expr) -> Result<(), ContractError> {
        let mut keys = Vec::with_capacity(target.path.len());
        for accessor in &target.path {
            keys.push(match accessor {
                Accessor::Member(name) => Key::Name(name.clone()),
                Accessor::Index(expr) => Key::Value(self.eval(expr)?),
            });
        }
        let rhs = self.eval(value)?;

        let new_value = match op {
            AssignOp::Set => rhs,
            AssignOp::Add | AssignOp::Sub => {
                let (current, scanned) = {
                    let slot = self.lookup(&target.root).ok_or_else(|| undefined(&target.root))?;
                    read_path(&slot.value, &keys)?
                };
                self.charge_copy(current.approx_size() + scanned)?;
                let bin = if op == AssignOp::Add {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                let combined = binary(bin, current, rhs)?;
                self.charge_alloc(&combined)?;
                combined
            }
        };

        let slot = self
            .lookup_mut(&target.root)
            .ok_or_else(|| undefined(&target.root))?;
        if keys.is_empty() && slot.constant {
            return Err(ContractError::script(format!(
                "assignment to constant `{}`",
                target.root
            )));
        }
        write_path(&mut slot.value, &keys, new_value)
    }

    // -------------------------------------------------------------------------
    // expressions
    // -------------------------------------------------------------------------

    fn eval(&mut self, expr: &'p Expr) -> Result<Value, ContractError> {
        self.host.meter().enter_nesting()?;
        let value = self.eval_expr(expr);
        self.host.meter().exit_nesting();
        value
    }

    fn eval_expr(&mut self, expr: &'p Expr) -> Result<Value, ContractError> {
        self.charge_step()?;
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Str(s) => {
                let value = Value::Str(s.clone());
                self.charge_alloc(&value)?;
                Ok(value)
            }
            Expr::Ident(name) => self.copy_variable(name),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                let value = Value::List(values);
                self.charge_alloc(&value)?;
                Ok(value)
            }
            Expr::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, item) in entries {
                    let value = self.eval(item)?;
                    map.insert(key.clone(), value);
                }
                let value = Value::Map(map);
                self.charge_alloc(&value)?;
                Ok(value)
            }
            Expr::Member(..) | Expr::Index(..) => self.read_chain(expr),
            Expr::Call(name, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                self.call(name, values)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => match value {
                        Value::Int(i) => i
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| ContractError::script("integer overflow")),
                        other => Err(ContractError::script(format!(
                            "cannot negate {}",
                            other.type_name()
                        ))),
                    },
                }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                let value = binary(*op, left, right)?;
                self.charge_alloc(&value)?;
                Ok(value)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left)?;
                match (op, left.is_truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(right),
                }
            }
        }
    }

    fn copy_variable(&mut self, name: &str) -> Result<Value, ContractError> {
        let size = self
            .lookup(name)
            .map(|slot| slot.value.approx_size())
            .ok_or_else(|| undefined(name))?;
        self.charge_copy(size)?;
        Ok(self
            .lookup(name)
            .map(|slot| slot.value.clone())
            .unwrap_or_default())
    }

    /// Evaluates a member/index chain left to right. A variable root is read
    /// in place after the index expressions run, so only the result is
    /// copied.
    fn read_chain(&mut self, expr: &'p Expr) -> Result<Value, ContractError> {
        let mut links = Vec::new();
        let mut cursor = expr;
        loop {
            match cursor {
                Expr::Member(base, name) => {
                    links.push(Link::Member(name.as_str()));
                    cursor = base.as_ref();
                }
                Expr::Index(base, index) => {
                    links.push(Link::Index(index.as_ref()));
                    cursor = base.as_ref();
                }
                _ => break,
            }
        }

        let root = match cursor {
            Expr::Ident(name) => Root::Variable(name.as_str()),
            other => Root::Value(self.eval(other)?),
        };

        let mut keys = Vec::with_capacity(links.len());
        for link in links.into_iter().rev() {
            keys.push(match link {
                Link::Member(name) => Key::Name(name.to_string()),
                Link::Index(index) => Key::Value(self.eval(index)?),
            });
        }

        let (value, scanned) = match &root {
            Root::Variable(name) => {
                let slot = self.lookup(name).ok_or_else(|| undefined(name))?;
                read_path(&slot.value, &keys)?
            }
            Root::Value(base) => read_path(base, &keys)?,
        };
        self.charge_copy(value.approx_size() + scanned)?;
        Ok(value)
    }

    /// Resolution order: script function, built-in, host binding.
    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ContractError> {
        let program = self.program;
        if let Some(function) = program.functions.get(name) {
            return self.call_function(function, args);
        }
        if is_builtin(name) {
            let value = call_builtin(name, args).unwrap_or_else(|| Err(undefined_function(name)))?;
            self.charge_alloc(&value)?;
            return Ok(value);
        }
        if self.host.has_binding(name) {
            return self.host.call_binding(name, args);
        }
        Err(undefined_function(name))
    }
}

fn undefined_function(name: &str) -> ContractError {
    ContractError::script(format!("undefined function `{name}`"))
}

fn undefined(name: &str) -> ContractError {
    ContractError::script(format!("undefined variable `{name}`"))
}

fn member<'v>(base: &'v Value, name: &str) -> Result<Cow<'v, Value>, ContractError> {
    match (base, name) {
        (Value::Map(map), _) => Ok(map.get(name).map_or(Cow::Owned(Value::Null), Cow::Borrowed)),
        (Value::Str(s), "length") => Ok(Cow::Owned(Value::Int(
            i64::try_from(s.chars().count()).unwrap_or(i64::MAX),
        ))),
        (Value::List(items), "length") => Ok(Cow::Owned(Value::Int(
            i64::try_from(items.len()).unwrap_or(i64::MAX),
        ))),
        (other, _) => Err(ContractError::script(format!(
            "cannot read property `{name}` of {}",
            other.type_name()
        ))),
    }
}

fn index_value<'v>(base: &'v Value, index: &Value) -> Result<Cow<'v, Value>, ContractError> {
    let found = match (base, index) {
        (Value::List(items), Value::Int(i)) => usize::try_from(*i).ok().and_then(|i| items.get(i)),
        (Value::Map(map), Value::Str(key)) => map.get(key),
        (Value::Map(map), Value::Int(i)) => map.get(&i.to_string()),
        (Value::Str(s), Value::Int(i)) => {
            return Ok(Cow::Owned(
                usize::try_from(*i)
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::Str(c.to_string()))
                    .unwrap_or_default(),
            ));
        }
        (b, i) => {
            return Err(ContractError::script(format!(
                "cannot index {} with {}",
                b.type_name(),
                i.type_name()
            )));
        }
    };
    Ok(found.map_or(Cow::Owned(Value::Null), Cow::Borrowed))
}

/// Walks `keys` from `root` without copying intermediate values.
///
/// Returns the copied result and the string bytes scanned along the way.
fn read_path(root: &Value, keys: &[Key]) -> Result<(Value, u64), ContractError> {
    let mut current = root;
    let mut scanned = 0u64;
    for (at, key) in keys.iter().enumerate() {
        if let Value::Str(s) = current {
            scanned = scanned.saturating_add(s.len() as u64);
        }
        let next = match key {
            Key::Name(name) => member(current, name)?,
            Key::Value(index) => index_value(current, index)?,
        };
        match next {
            Cow::Borrowed(value) => current = value,
            // computed results are scalars
            Cow::Owned(value) => {
                let (value, more) = read_path(&value, &keys[at + 1..])?;
                return Ok((value, scanned.saturating_add(more)));
            }
        }
    }
    Ok((current.clone(), scanned))
}

fn write_path(target: &mut Value, keys: &[Key], value: Value) -> Result<(), ContractError> {
    let Some((first, rest)) = keys.split_first() else {
        *target = value;
        return Ok(());
    };
    match target {
        Value::Map(map) => {
            let key = first.map_key()?;
            if rest.is_empty() {
                map.insert(key, value);
                Ok(())
            } else {
                let child = map.get_mut(&key).ok_or_else(|| {
                    ContractError::script(format!("cannot set property of missing key `{key}`"))
                })?;
                write_path(child, rest, value)
            }
        }
        Value::List(items) => {
            let Key::Value(Value::Int(i)) = first else {
                return Err(ContractError::script("list index must be an int"));
            };
            let len = items.len();
            let slot = usize::try_from(*i)
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| {
                    ContractError::script(format!("list index {i} out of bounds for length {len}"))
                })?;
            write_path(slot, rest, value)
        }
        other => Err(ContractError::script(format!(
            "cannot set property on {}",
            other.type_name()
        ))),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ContractError> {
    use BinaryOp as B;
    let overflow = || ContractError::script("integer overflow");

    match (op, left, right) {
        (B::Eq, l, r) => Ok(Value::Bool(l == r)),
        (B::NotEq, l, r) => Ok(Value::Bool(l != r)),

        (B::Add, Value::Int(a), Value::Int(b)) => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        (B::Add, l @ Value::Str(_), r) | (B::Add, l, r @ Value::Str(_)) => {
            Ok(Value::Str(format!("{l}{r}")))
        }
        (B::Sub, Value::Int(a), Value::Int(b)) => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        (B::Mul, Value::Int(a), Value::Int(b)) => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        (B::Div | B::Rem, Value::Int(_), Value::Int(0)) => {
            Err(ContractError::script("division by zero"))
        }
        (B::Div, Value::Int(a), Value::Int(b)) => a.checked_div(b).map(Value::Int).ok_or_else(overflow),
        (B::Rem, Value::Int(a), Value::Int(b)) => a.checked_rem(b).map(Value::Int).ok_or_else(overflow),

        (B::Lt, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a < b)),
        (B::LtEq, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a <= b)),
        (B::Gt, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a > b)),
        (B::GtEq, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a >= b)),
        (B::Lt, Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a < b)),
        (B::LtEq, Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a <= b)),
        (B::Gt, Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a > b)),
        (B::GtEq, Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a >= b)),

        (op, l, r) => Err(ContractError::script(format!(
            "unsupported operands for {op:?}: {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parser::parse;
    use crate::sandbox::meter::{Budget, Resource, ResourceMeter};

    struct TestHost {
        meter: ResourceMeter,
        calls: Vec<(String, Vec<Value>)>,
    }

    impl TestHost {
        fn new(budget: Budget) -> Self {
            Self {
                meter: ResourceMeter::new(budget, 1),
                calls: Vec::new(),
            }
        }
    }

    impl HostApi for TestHost {
        fn meter(&mut self) -> &mut ResourceMeter {
            &mut self.meter
        }

        fn has_binding(&self, name: &str) -> bool {
            name == "Echo"
        }

        fn call_binding(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ContractError> {
            self.calls.push((name.to_string(), args.clone()));
            Ok(args.into_iter().next().unwrap_or_default())
        }
    }

    fn run(source: &str, entry: &str, args: Vec<Value>) -> Result<Value, ContractError> {
        let program = parse(source, 64).unwrap();
        let mut host = TestHost::new(Budget::new(100_000, 1 << 20, 32));
        Interpreter::new(&program, &mut host).run(entry, args)
    }

    #[test]
    fn test_arithmetic_and_control_flow() {
        let source = r#"
            function sum(n) {
                let total = 0;
                let i = 0;
                while (true) {
                    i += 1;
                    if (i > n) { break; }
                    if (i % 2 == 0) { continue; }
                    total = total + i;
                }
                return total;
            }
        "#;
        assert_eq!(run(source, "sum", vec![Value::Int(9)]).unwrap(), Value::Int(25));
    }

    #[test]
    fn test_maps_lists_and_paths() {
        let source = r#"
            function f(args) {
                let m = {balances: {}, log: [0, 0]};
                m.balances[args.who] = 100;
                m.balances[args.who] -= 30;
                m.log[1] = "x";
                return [m.balances.A, m.log, len(m.log), m.missing];
            }
        "#;
        let args = Value::map([("who", Value::from("A"))]);
        assert_eq!(
            run(source, "f", vec![args]).unwrap(),
            Value::List(vec![
                Value::Int(70),
                Value::List(vec![Value::Int(0), Value::from("x")]),
                Value::Int(2),
                Value::Null,
            ])
        );
    }

    #[test]
    fn test_globals_and_constants() {
        let source = r#"
            const PREFIX = "bal.";
            let hits = 1;
            function f(who) { hits += 1; return PREFIX + who + hits; }
            function g() { PREFIX = "x"; }
        "#;
        assert_eq!(
            run(source, "f", vec![Value::from("A")]).unwrap(),
            Value::from("bal.A2")
        );
        let err = run(source, "g", vec![]).unwrap_err();
        assert_eq!(err, ContractError::script("assignment to constant `PREFIX`"));
    }

    #[test]
    fn test_short_circuit_returns_operand() {
        let source = r#"function f(a) { return a.name || "anon"; }"#;
        assert_eq!(
            run(source, "f", vec![Value::map::<&str, _>([])]).unwrap(),
            Value::from("anon")
        );
    }

    #[test]
    fn test_script_faults() {
        let cases = [
            ("function f() { return 1 / 0; }", "division by zero"),
            ("function f() { throw \"bad\"; }", "uncaught exception: bad"),
            ("function f() { return nope; }", "undefined variable `nope`"),
            ("function f() { return nope(); }", "undefined function `nope`"),
            ("function f() { return 9223372036854775807 + 1; }", "integer overflow"),
            ("function f() { return 1 < \"a\"; }", "unsupported operands for Lt: int and string"),
        ];
        for (source, message) in cases {
            assert_eq!(
                run(source, "f", vec![]).unwrap_err(),
                ContractError::script(message),
                "{source}"
            );
        }
    }

    #[test]
    fn test_host_binding_fallback() {
        let program = parse("function f() { return Echo(7); }", 64).unwrap();
        let mut host = TestHost::new(Budget::default());
        let value = Interpreter::new(&program, &mut host).run("f", vec![]).unwrap();
        assert_eq!(value, Value::Int(7));
        assert_eq!(host.calls, vec![("Echo".to_string(), vec![Value::Int(7)])]);
    }

    #[test]
    fn test_infinite_loop_exhausts_steps() {
        let program = parse("function f() { while (true) {} }", 64).unwrap();
        let mut host = TestHost::new(Budget::new(500, 1 << 20, 8));
        let err = Interpreter::new(&program, &mut host).run("f", vec![]).unwrap_err();
        assert!(matches!(
            err,
            ContractError::ResourceExhausted {
                resource: Resource::Steps,
                limit: 500,
                ..
            }
        ));
    }

    #[test]
    fn test_unbounded_recursion_exhausts_depth() {
        let program = parse("function f(n) { return f(n + 1); }", 64).unwrap();
        let mut host = TestHost::new(Budget::new(100_000, 1 << 20, 16));
        let err = Interpreter::new(&program, &mut host)
            .run("f", vec![Value::Int(0)])
            .unwrap_err();
        assert!(matches!(
            err,
            ContractError::ResourceExhausted {
                resource: Resource::CallDepth,
                used: 17,
                limit: 16
            }
        ));
    }

    #[test]
    fn test_string_growth_exhausts_memory() {
        let program = parse(
            r#"function f() { let s = "x"; while (true) { s = s + s; } }"#,
            64,
        )
        .unwrap();
        let mut host = TestHost::new(Budget::new(1_000_000, 4096, 8));
        let err = Interpreter::new(&program, &mut host).run("f", vec![]).unwrap_err();
        assert!(matches!(
            err,
            ContractError::ResourceExhausted {
                resource: Resource::Memory,
                ..
            }
        ));
    }

    fn run_with(source: &str, budget: Budget, args: Vec<Value>) -> Result<Value, ContractError> {
        let program = parse(source, 64).unwrap();
        let mut host = TestHost::new(budget);
        Interpreter::new(&program, &mut host).run("f", args)
    }

    #[test]
    fn test_deepest_nesting_in_every_frame_is_bounded() {
        // 60 parenthesised levels per frame, recursing up to the call depth
        let nested = format!("{}f(n + 1){}", "1 + (".repeat(60), ")".repeat(60));
        let source = format!("function f(n) {{ if (n > 60) {{ return 0; }} return {nested}; }}");

        let outcome = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || run_with(&source, Budget::new(1_000_000, 1 << 20, 64), vec![Value::Int(0)]))
            .unwrap()
            .join()
            .unwrap();
        assert!(matches!(
            outcome,
            Err(ContractError::ResourceExhausted {
                resource: Resource::Nesting,
                ..
            })
        ));
    }

    #[test]
    fn test_moderate_recursion_fits_nesting_ceiling() {
        let source = "function f(n) { if (n == 0) { return 0; } return 1 + f(n - 1); }";
        assert_eq!(
            run_with(source, Budget::new(1_000_000, 1 << 20, 64), vec![Value::Int(60)]).unwrap(),
            Value::Int(60)
        );
    }

    const COPY_LOOP: &str = r#"
        function f(n) {
            let s = "xxxxxxxxxxxxxxxx";
            let i = 0;
            while (i < 12) { s = s + s; i += 1; }
            let m = {big: s, small: 1};
            let k = 0;
            while (k < n) { COPY; k += 1; }
            return k;
        }
    "#;

    #[test]
    fn test_copying_large_values_costs_steps() {
        let budget = Budget::new(50_000, 1 << 20, 8);

        // 64 KiB copied 100 times
        let copy = COPY_LOOP.replace("COPY", "let t = s");
        let err = run_with(&copy, budget, vec![Value::Int(100)]).unwrap_err();
        assert!(matches!(
            err,
            ContractError::ResourceExhausted {
                resource: Resource::Steps,
                ..
            }
        ));

        let scalar = COPY_LOOP.replace("COPY", "let t = k");
        assert_eq!(run_with(&scalar, budget, vec![Value::Int(100)]).unwrap(), Value::Int(100));

        // members of a variable are read in place
        let member = COPY_LOOP.replace("COPY", "let t = m.small");
        assert_eq!(run_with(&member, budget, vec![Value::Int(100)]).unwrap(), Value::Int(100));
    }

    #[test]
    fn test_chain_reads_nested_values() {
        let source = r#"
            function f(args) {
                let m = {a: {b: [10, {c: "hey"}]}};
                return [m.a.b[1].c, m.a.b[1].c.length, m.a.b[0], m.a.b[7], m.a["b"].length, args[1]];
            }
        "#;
        let args = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            run_with(source, Budget::default(), vec![args]).unwrap(),
            Value::List(vec![
                Value::from("hey"),
                Value::Int(3),
                Value::Int(10),
                Value::Null,
                Value::Int(2),
                Value::Int(2),
            ])
        );
    }
}
