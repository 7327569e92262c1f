//! Runtime values.
//!
//! Values are interpreter-local (`Rc`-based) and never leave the thread that
//! runs the script. Anything that must cross to the controller is converted
//! to plain data first (`VariableView`, `PublicationEntry`).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;

use cad_types::Shape;
use script_lang::ast::FunctionDef;
use script_lang::CompiledUnit;

use crate::error::{ErrorKind, Interrupt};
use crate::interp::Interpreter;

/// A mutable name → value mapping (globals, locals, module namespaces).
pub type Scope = Rc<RefCell<IndexMap<String, Value>>>;

pub fn new_scope() -> Scope {
    Rc::new(RefCell::new(IndexMap::new()))
}

/// Nesting beyond this renders as `...`.
const REPR_DEPTH: usize = 6;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<IndexMap<String, Value>>>),
    Shape(Shape),
    Function(Rc<Closure>),
    Builtin(Builtin),
    Method(Rc<Method>),
    Module(Rc<Module>),
    Error(Rc<ErrorValue>),
}

/// A user function together with the unit and globals it was defined in.
pub struct Closure {
    pub def: Arc<FunctionDef>,
    pub unit: CompiledUnit,
    pub globals: Scope,
    /// Evaluated default values, aligned with `def.params`.
    pub defaults: Vec<Option<Value>>,
}

/// A method looked up on a receiver, waiting to be called.
pub struct Method {
    pub receiver: Value,
    pub name: &'static str,
}

pub struct Module {
    pub name: String,
    pub globals: Scope,
}

/// A raised or constructed error, as seen by `except ... as e`.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    pub kind: ErrorKind,
    pub message: String,
}

/// Positional and keyword arguments of a call.
#[derive(Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl Args {
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            keywords: Vec::new(),
        }
    }
}

pub type BuiltinFn = fn(&mut Interpreter, Args) -> Result<Value, Interrupt>;

/// A native function.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn dict(entries: IndexMap<String, Value>) -> Self {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Shape(s) => s.kind.name(),
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin",
            Value::Method(_) => "method",
            Value::Module(_) => "module",
            Value::Error(e) => e.kind.name(),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Dict(entries) => !entries.borrow().is_empty(),
            _ => true,
        }
    }

    /// Numeric view for arithmetic; bools count as integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_shape(&self) -> Option<Shape> {
        match self {
            Value::Shape(s) => Some(*s),
            _ => None,
        }
    }

    /// Same object: shapes by handle, containers and callables by pointer,
    /// scalars by value.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Shape(a), Value::Shape(b)) => a.handle == b.handle,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }

    /// `==` semantics.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map(|w| v.equals(w)).unwrap_or(false))
            }
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::None, Value::None) => true,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => self.identical(other),
            },
        }
    }

    /// `str(value)`.
    pub fn display(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Error(e) => e.message.clone(),
            _ => self.repr(),
        }
    }

    /// `repr(value)`-style rendering used by the console and Variables pane.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, 0);
        out
    }

    fn write_repr(&self, out: &mut String, depth: usize) {
        use std::fmt::Write;

        if depth > REPR_DEPTH {
            out.push_str("...");
            return;
        }
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(n) => {
                let _ = write!(out, "{n}");
            }
            Value::Float(x) => out.push_str(&format_float(*x)),
            Value::Str(s) => {
                let _ = write!(out, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"));
            }
            Value::List(items) => {
                out.push('[');
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out, depth + 1);
                }
                out.push(']');
            }
            Value::Dict(entries) => {
                out.push('{');
                for (i, (k, v)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "'{k}': ");
                    v.write_repr(out, depth + 1);
                }
                out.push('}');
            }
            Value::Shape(s) => {
                let _ = write!(out, "<{} {}>", s.kind.name(), s.handle);
            }
            Value::Function(c) => {
                let _ = write!(out, "<function {}>", c.def.name);
            }
            Value::Builtin(b) => {
                let _ = write!(out, "<built-in function {}>", b.name);
            }
            Value::Method(m) => {
                let _ = write!(out, "<method {} of {}>", m.name, m.receiver.type_name());
            }
            Value::Module(m) => {
                let _ = write!(out, "<module '{}'>", m.name);
            }
            Value::Error(e) => {
                let _ = write!(out, "{}('{}')", e.kind.name(), e.message);
            }
        }
    }
}

/// Floats always show a decimal point or exponent.
pub fn format_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{x}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_matches_script_literals() {
        let v = Value::list(vec![
            Value::Int(1),
            Value::Float(2.0),
            Value::str("it's"),
            Value::None,
            Value::Bool(true),
        ]);
        assert_eq!(v.repr(), "[1, 2.0, 'it\\'s', None, True]");
        assert_eq!(Value::str("plain").display(), "plain");
    }

    #[test]
    fn self_referencing_list_repr_terminates() {
        let items = Rc::new(RefCell::new(Vec::new()));
        let v = Value::List(items.clone());
        items.borrow_mut().push(v.clone());
        assert!(v.repr().contains("..."));
        items.borrow_mut().clear();
    }

    #[test]
    fn numbers_compare_across_types() {
        assert!(Value::Int(2).equals(&Value::Float(2.0)));
        assert!(!Value::Int(2).identical(&Value::Float(2.0)));
        assert!(Value::Bool(true).equals(&Value::Int(1)));
    }

    #[test]
    fn containers_are_identical_only_by_pointer() {
        let a = Value::list(vec![Value::Int(1)]);
        let b = Value::list(vec![Value::Int(1)]);
        assert!(a.equals(&b));
        assert!(!a.identical(&b));
        assert!(a.identical(&a.clone()));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::str("").truthy());
        assert!(Value::list(vec![Value::None]).truthy());
        assert!(!Value::Float(0.0).truthy());
        assert!(!Value::None.truthy());
    }
}
