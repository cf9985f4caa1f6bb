//! Tree-walking evaluator for lowered modules.
//!
//! Declarations from `extern` packages have no bodies. The calls into the
//! STM runtime (`kotlinx.stm`) are served by an in-memory stub that keeps
//! the delegate cells and records every runtime call in [Interpreter::log].
//! Default property accessors read and write the backing field.

use crate::ir::BinOp;
use crate::ir::Call;
use crate::ir::Const;
use crate::ir::DeclId;
use crate::ir::DeclKind;
use crate::ir::ExprId;
use crate::ir::ExprKind;
use crate::ir::Module;
use crate::ir::Origin;
use crate::stm::names;
use anyhow::Result;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::rc::Rc;
use tracing::debug;

#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    pub class: DeclId,
    pub fields: HashMap<DeclId, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Closure {
    pub function: DeclId,
    captured: HashMap<DeclId, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Unit,
    Int(i64),
    Bool(bool),
    Str(String),
    Null,
    Object(Rc<RefCell<Object>>),
    /// Handle returned by the STM search functions.
    Stm,
    Context,
    /// Index into the delegate cells of the runtime stub.
    Delegate(usize),
    Closure(Rc<Closure>),
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Unit => write!(f, "Unit"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Null => write!(f, "null"),
            Value::Object(o) => write!(f, "object#{}", o.borrow().class.0),
            Value::Stm => write!(f, "stm"),
            Value::Context => write!(f, "ctx"),
            Value::Delegate(index) => write!(f, "delegate#{index}"),
            Value::Closure(c) => write!(f, "closure#{}", c.function.0),
        }
    }
}

/// Reason for leaving an expression early.
enum Unwind {
    /// Unwinding towards the function `target`.
    Return { target: DeclId, value: Value },
    Error(anyhow::Error),
}

impl From<anyhow::Error> for Unwind {
    fn from(err: anyhow::Error) -> Self {
        Unwind::Error(err)
    }
}

type Eval = std::result::Result<Value, Unwind>;

type Env = HashMap<DeclId, Value>;

pub struct Interpreter<'a> {
    module: &'a Module,
    cells: Vec<Value>,
    log: Vec<String>,
}

impl<'a> Interpreter<'a> {
    pub fn new(module: &'a Module) -> Self {
        Interpreter {
            module,
            cells: vec![],
            log: vec![],
        }
    }
    /// Runtime calls in the order they happened, such as `wrap` or `getVar`.
    pub fn log(&self) -> &[String] {
        &self.log
    }
    /// Create an instance of `package.class` and run its field initializers
    /// in declaration order.
    pub fn instantiate(&mut self, package: &str, class: &str) -> Result<Value> {
        let Some(class) = self.module.find_class(package, class) else {
            return Err(anyhow::anyhow!("Unknown class {package}.{class}"));
        };
        let object = Rc::new(RefCell::new(Object {
            class,
            fields: HashMap::new(),
        }));
        let value = Value::Object(object);
        self.initialize(class, &value)?;
        Ok(value)
    }
    fn initialize(&mut self, class: DeclId, object: &Value) -> Result<()> {
        for superclass in self.module.superclasses(class) {
            self.initialize(superclass, object)?;
        }
        let Some(this) = self.module.class(class).map(|c| c.this_receiver) else {
            return Ok(());
        };
        for member in self.module.members(class) {
            let field = match &self.module.decl(member).kind {
                DeclKind::Field(_) => Some(member),
                DeclKind::Property(property) => property.backing_field,
                _ => None,
            };
            let Some(field) = field else {
                continue;
            };
            let initializer = self.module.field(field).and_then(|f| f.initializer);
            let value = match initializer {
                Some(initializer) => {
                    let mut env = Env::new();
                    env.insert(this, object.clone());
                    self.eval_value(initializer, &mut env)?
                }
                None => Value::Null,
            };
            if let Value::Object(o) = object {
                o.borrow_mut().fields.insert(field, value);
            }
        }
        Ok(())
    }
    /// Call the member function `name` of `receiver` that takes `args.len()`
    /// value arguments.
    pub fn call_method(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> Result<Value> {
        let Value::Object(object) = receiver else {
            return Err(anyhow::anyhow!("Cannot call {name} on {receiver}"));
        };
        let class = object.borrow().class;
        let Some(function) = self.find_method(class, name, args.len()) else {
            return Err(anyhow::anyhow!(
                "No method {name} with {} arguments in {}",
                args.len(),
                self.module.fq_name(class)
            ));
        };
        self.invoke(function, Some(receiver.clone()), None, args, &Env::new())
    }
    /// Call the top-level function `package.name` that takes `args.len()`
    /// value arguments.
    pub fn call_function(&mut self, package: &str, name: &str, args: Vec<Value>) -> Result<Value> {
        let function = self
            .module
            .find_functions(package, name)
            .into_iter()
            .map(|f| self.module.resolve(f))
            .find(|f| self.arity(*f) == Some(args.len()));
        let Some(function) = function else {
            return Err(anyhow::anyhow!(
                "No function {package}.{name} with {} arguments",
                args.len()
            ));
        };
        self.invoke(function, None, None, args, &Env::new())
    }
    fn arity(&self, function: DeclId) -> Option<usize> {
        self.module.function(function).map(|f| f.value_parameters.len())
    }
    fn find_method(&self, class: DeclId, name: &str, arity: usize) -> Option<DeclId> {
        self.module
            .find_member_functions(class, name)
            .into_iter()
            .map(|f| self.module.resolve(f))
            .find(|f| self.arity(*f) == Some(arity))
    }
    /// Follow fake overrides to the declaration with the body.
    fn implementation(&self, function: DeclId) -> DeclId {
        let mut current = self.module.resolve(function);
        while let Some(f) = self.module.function(current) {
            let fake = self.module.decl(current).origin == Origin::FakeOverride && f.body.is_none();
            match f.overridden.first() {
                Some(base) if fake => current = self.module.resolve(*base),
                _ => break,
            }
        }
        current
    }
    fn invoke(
        &mut self,
        function: DeclId,
        dispatch_receiver: Option<Value>,
        extension_receiver: Option<Value>,
        args: Vec<Value>,
        captured: &Env,
    ) -> Result<Value> {
        let function = self.implementation(function);
        if self.module.is_external(function) {
            return self.runtime_call(function, dispatch_receiver, args);
        }
        let Some(f) = self.module.function(function).cloned() else {
            return Err(anyhow::anyhow!("{} is not a function", self.module.fq_name(function)));
        };
        if let Some(accessor) = f.accessor {
            return self.default_accessor(accessor.property, dispatch_receiver, args);
        }
        let Some(body) = f.body else {
            return Err(anyhow::anyhow!("Function {} has no body", self.module.fq_name(function)));
        };
        if f.value_parameters.len() != args.len() {
            return Err(anyhow::anyhow!(
                "Function {} expects {} arguments, got {}",
                self.module.fq_name(function),
                f.value_parameters.len(),
                args.len()
            ));
        }
        let mut env = captured.clone();
        if let (Some(parameter), Some(value)) = (f.dispatch_receiver, dispatch_receiver) {
            env.insert(parameter, value);
        }
        if let (Some(parameter), Some(value)) = (f.extension_receiver, extension_receiver) {
            env.insert(parameter, value);
        }
        for (parameter, value) in f.value_parameters.iter().zip(args) {
            env.insert(*parameter, value);
        }
        match self.exec_block(&body, &mut env) {
            Ok(_) => Ok(Value::Unit),
            Err(Unwind::Return { target, value }) if target == function => Ok(value),
            Err(Unwind::Return { target, .. }) => Err(anyhow::anyhow!(
                "Return to {} escaped from {}",
                self.module.fq_name(target),
                self.module.fq_name(function)
            )),
            Err(Unwind::Error(err)) => Err(err),
        }
    }
    fn call_closure(&mut self, closure: &Value, receiver: Value) -> Result<Value> {
        let Value::Closure(closure) = closure else {
            return Err(anyhow::anyhow!("Expected a closure, got {closure}"));
        };
        let closure = closure.clone();
        self.invoke(closure.function, None, Some(receiver), vec![], &closure.captured)
    }
    fn default_accessor(&mut self, property: DeclId, receiver: Option<Value>, args: Vec<Value>) -> Result<Value> {
        let field = self.module.property(property).and_then(|p| p.backing_field);
        let (Some(field), Some(Value::Object(object))) = (field, receiver) else {
            return Err(anyhow::anyhow!(
                "Cannot access property {}",
                self.module.fq_name(property)
            ));
        };
        match args.into_iter().next() {
            Some(value) => {
                object.borrow_mut().fields.insert(field, value);
                Ok(Value::Unit)
            }
            None => Ok(object.borrow().fields.get(&field).cloned().unwrap_or(Value::Null)),
        }
    }
    fn delegate_index(&self, delegate: Option<&Value>) -> Result<usize> {
        match delegate {
            Some(Value::Delegate(index)) if *index < self.cells.len() => Ok(*index),
            other => Err(anyhow::anyhow!("Expected a delegate, got {other:?}")),
        }
    }
    fn argument(args: &[Value], index: usize) -> Value {
        args.get(index).cloned().unwrap_or(Value::Null)
    }
    /// In-memory stand-in for the STM runtime.
    fn runtime_call(&mut self, function: DeclId, receiver: Option<Value>, args: Vec<Value>) -> Result<Value> {
        let fq_name = self.module.fq_name(function);
        let name = self.module.name_of(function).to_string();
        let stm_method = format!("{}.{}.", names::STM_PACKAGE, names::STM_INTERFACE);
        debug!("Runtime call {fq_name}");
        self.log.push(name.clone());
        if let Some(method) = fq_name.strip_prefix(&stm_method) {
            if receiver != Some(Value::Stm) {
                return Err(anyhow::anyhow!("{fq_name} called on {receiver:?}"));
            }
            return match method {
                names::WRAP => {
                    self.cells.push(Self::argument(&args, 0));
                    Ok(Value::Delegate(self.cells.len() - 1))
                }
                names::GET_VAR => {
                    let index = self.delegate_index(args.get(1))?;
                    Ok(self.cells[index].clone())
                }
                names::SET_VAR => {
                    let index = self.delegate_index(args.get(1))?;
                    self.cells[index] = Self::argument(&args, 2);
                    Ok(Value::Unit)
                }
                names::RUN_ATOMICALLY => {
                    let context = match Self::argument(&args, 0) {
                        Value::Null => Value::Context,
                        context => context,
                    };
                    self.call_closure(&Self::argument(&args, 1), context)
                }
                names::GET_CONTEXT => Ok(Value::Context),
                _ => Err(anyhow::anyhow!("Unknown runtime method {fq_name}")),
            };
        }
        if fq_name == names::run_atomically_fq_name() {
            let block = args.last().cloned().unwrap_or(Value::Null);
            return self.call_closure(&block, Value::Context);
        }
        let search = [names::JAVA_STM_SEARCH, names::JS_STM_SEARCH, names::NATIVE_STM_SEARCH];
        let base = name.strip_suffix(names::DEFAULT_SUFFIX).unwrap_or(&name);
        if search.contains(&base) {
            return Ok(Value::Stm);
        }
        Err(anyhow::anyhow!("No stub for runtime function {fq_name}"))
    }
    fn exec_block(&mut self, body: &[ExprId], env: &mut Env) -> Eval {
        let mut last = Value::Unit;
        for statement in body {
            last = self.eval(*statement, env)?;
        }
        Ok(last)
    }
    /// Evaluate an expression that must not return.
    fn eval_value(&mut self, expr: ExprId, env: &mut Env) -> Result<Value> {
        match self.eval(expr, env) {
            Ok(value) => Ok(value),
            Err(Unwind::Return { target, .. }) => Err(anyhow::anyhow!(
                "Unexpected return to {} in initializer",
                self.module.fq_name(target)
            )),
            Err(Unwind::Error(err)) => Err(err),
        }
    }
    fn eval(&mut self, expr: ExprId, env: &mut Env) -> Eval {
        let kind = self.module.expr(expr).kind.clone();
        let value = match kind {
            ExprKind::Const(c) => match c {
                Const::Int(i) => Value::Int(i),
                Const::Boolean(b) => Value::Bool(b),
                Const::String(s) => Value::Str(s),
                Const::Null => Value::Null,
            },
            ExprKind::GetValue(decl) => match env.get(&decl) {
                Some(value) => value.clone(),
                None => {
                    let msg = format!("Unbound value {}", self.module.fq_name(decl));
                    return Err(anyhow::anyhow!(msg).into());
                }
            },
            ExprKind::GetField { receiver, field } => {
                let receiver = match receiver {
                    Some(receiver) => self.eval(receiver, env)?,
                    None => Value::Null,
                };
                let Value::Object(object) = receiver else {
                    let msg = format!("Cannot read field {} of {receiver}", self.module.name_of(field));
                    return Err(anyhow::anyhow!(msg).into());
                };
                let value = object.borrow().fields.get(&field).cloned();
                value.unwrap_or(Value::Null)
            }
            ExprKind::SetField {
                receiver,
                field,
                value,
            } => {
                let receiver = match receiver {
                    Some(receiver) => self.eval(receiver, env)?,
                    None => Value::Null,
                };
                let value = self.eval(value, env)?;
                let Value::Object(object) = receiver else {
                    let msg = format!("Cannot write field {} of {receiver}", self.module.name_of(field));
                    return Err(anyhow::anyhow!(msg).into());
                };
                object.borrow_mut().fields.insert(field, value);
                Value::Unit
            }
            ExprKind::Call(call) => {
                let dispatch_receiver = match call.dispatch_receiver {
                    Some(receiver) => Some(self.eval(receiver, env)?),
                    None => None,
                };
                let extension_receiver = match call.extension_receiver {
                    Some(receiver) => Some(self.eval(receiver, env)?),
                    None => None,
                };
                let mut args = vec![];
                for argument in call.arguments.iter() {
                    args.push(self.eval(*argument, env)?);
                }
                let callee = self.dispatch_target(&call, dispatch_receiver.as_ref(), args.len());
                self.invoke(callee, dispatch_receiver, extension_receiver, args, &Env::new())?
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, env)?;
                let rhs = self.eval(rhs, env)?;
                Self::binary(op, lhs, rhs)?
            }
            ExprKind::Return { target, value } => {
                let value = match value {
                    Some(value) => self.eval(value, env)?,
                    None => Value::Unit,
                };
                return Err(Unwind::Return { target, value });
            }
            ExprKind::FunctionExpr(function) => Value::Closure(Rc::new(Closure {
                function,
                captured: env.clone(),
            })),
            ExprKind::Variable(variable) => {
                let initializer = match &self.module.decl(variable).kind {
                    DeclKind::Variable(v) => v.initializer,
                    _ => return Err(anyhow::anyhow!("Expected a variable").into()),
                };
                let value = self.eval(initializer, env)?;
                env.insert(variable, value);
                Value::Unit
            }
            ExprKind::If {
                condition,
                then,
                els,
            } => match self.eval(condition, env)? {
                Value::Bool(true) => return self.exec_block(&then, env),
                Value::Bool(false) => return self.exec_block(&els, env),
                other => {
                    let msg = format!("Expected a boolean condition, got {other}");
                    return Err(anyhow::anyhow!(msg).into());
                }
            },
        };
        Ok(value)
    }
    /// Virtual dispatch on the runtime class of the receiver, unless the call
    /// is qualified with `super`.
    fn dispatch_target(&self, call: &Call, receiver: Option<&Value>, arity: usize) -> DeclId {
        let callee = self.module.resolve(call.callee);
        if call.super_qualifier.is_some() {
            return callee;
        }
        let Some(Value::Object(object)) = receiver else {
            return callee;
        };
        let is_accessor = self
            .module
            .function(callee)
            .is_some_and(|f| f.accessor.is_some());
        if is_accessor {
            return callee;
        }
        let class = object.borrow().class;
        let name = self.module.name_of(callee);
        self.find_method(class, name, arity).unwrap_or(callee)
    }
    fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value> {
        match (op, lhs, rhs) {
            (BinOp::Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (BinOp::Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
            (BinOp::Mul, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
            (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (BinOp::Eq, a, b) => Ok(Value::Bool(a == b)),
            (op, a, b) => Err(anyhow::anyhow!("Cannot apply {} to {a} and {b}", op.symbol())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use indoc::indoc;

    #[test]
    fn test_unlowered_counter() {
        let src = indoc! {"
        module @counter target jvm {
          package demo {
            class Counter {
              var n: Int = 40
              fun inc(): Unit {
                this.n = this.n + 1
              }
              fun get(): Int {
                return this.n
              }
            }
            fun twice(x: Int): Int {
              val y: Int = x * 2
              if (y == 4) {
                return 0
              }
              return y
            }
          }
        }"};
        let module = Parser::parse(src).unwrap();
        let mut interp = Interpreter::new(&module);
        let counter = interp.instantiate("demo", "Counter").unwrap();
        interp.call_method(&counter, "inc", vec![]).unwrap();
        interp.call_method(&counter, "inc", vec![]).unwrap();
        let n = interp.call_method(&counter, "get", vec![]).unwrap();
        assert_eq!(n, Value::Int(42));
        assert!(interp.log().is_empty());

        let y = interp.call_function("demo", "twice", vec![Value::Int(3)]).unwrap();
        assert_eq!(y, Value::Int(6));
        let y = interp.call_function("demo", "twice", vec![Value::Int(2)]).unwrap();
        assert_eq!(y, Value::Int(0));
        assert!(interp.call_function("demo", "twice", vec![]).is_err());
    }
}
