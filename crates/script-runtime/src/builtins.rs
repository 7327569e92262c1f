//! Native functions, methods and built-in modules available to scripts.

use std::f64::consts;
use std::rc::Rc;

use cad_types::Shape;
use shape_kernel::{BooleanOp, KernelError};

use crate::error::{raise, ErrorKind, Interrupt, ScriptError};
use crate::interp::Interpreter;
use crate::value::*;

/// Largest list `range()` will build.
const RANGE_LIMIT: i64 = 10_000_000;

static BUILTINS: &[Builtin] = &[
    Builtin { name: "print", func: print },
    Builtin { name: "range", func: range },
    Builtin { name: "len", func: len },
    Builtin { name: "str", func: to_str },
    Builtin { name: "int", func: to_int },
    Builtin { name: "float", func: to_float },
    Builtin { name: "abs", func: abs },
    Builtin { name: "min", func: min },
    Builtin { name: "max", func: max },
    Builtin { name: "round", func: round },
    Builtin { name: "type_name", func: type_name },
    Builtin { name: "box", func: make_box },
    Builtin { name: "cylinder", func: make_cylinder },
    Builtin { name: "sphere", func: make_sphere },
    Builtin { name: "point", func: make_point },
    Builtin { name: "compound", func: make_compound },
    Builtin { name: "NameError", func: construct_error::<0> },
    Builtin { name: "TypeError", func: construct_error::<1> },
    Builtin { name: "ValueError", func: construct_error::<2> },
    Builtin { name: "ZeroDivisionError", func: construct_error::<3> },
    Builtin { name: "IndexError", func: construct_error::<4> },
    Builtin { name: "KeyError", func: construct_error::<5> },
    Builtin { name: "AttributeError", func: construct_error::<6> },
    Builtin { name: "ImportError", func: construct_error::<7> },
    Builtin { name: "SyntaxError", func: construct_error::<8> },
    Builtin { name: "KernelError", func: construct_error::<9> },
    Builtin { name: "RuntimeError", func: construct_error::<10> },
];

/// Names bound into the `cad` module.
const KERNEL_FUNCTIONS: [&str; 5] = ["box", "cylinder", "sphere", "point", "compound"];

const SHAPE_METHODS: &[&str] = &["translate", "union", "cut", "intersect", "is_empty"];
const LIST_METHODS: &[&str] = &["append"];
const DICT_METHODS: &[&str] = &["get", "keys"];

pub fn lookup(name: &str) -> Option<Builtin> {
    BUILTINS.iter().find(|b| b.name == name).copied()
}

/// The kernel module injected as `cad` and importable as `import cad`.
pub fn kernel_module() -> Module {
    let globals = new_scope();
    {
        let mut g = globals.borrow_mut();
        for name in KERNEL_FUNCTIONS {
            if let Some(b) = lookup(name) {
                g.insert(name.to_string(), Value::Builtin(b));
            }
        }
    }
    Module {
        name: "cad".to_string(),
        globals,
    }
}

fn math_module() -> Module {
    let globals = new_scope();
    {
        let mut g = globals.borrow_mut();
        g.insert("pi".to_string(), Value::Float(consts::PI));
        g.insert("e".to_string(), Value::Float(consts::E));
        let functions: [(&'static str, BuiltinFn); 7] = [
            ("sqrt", math_sqrt),
            ("sin", math_sin),
            ("cos", math_cos),
            ("tan", math_tan),
            ("atan2", math_atan2),
            ("radians", math_radians),
            ("degrees", math_degrees),
        ];
        for (name, func) in functions {
            g.insert(name.to_string(), Value::Builtin(Builtin { name, func }));
        }
    }
    Module {
        name: "math".to_string(),
        globals,
    }
}

/// Modules provided natively rather than read from the search path.
pub fn builtin_module(name: &str) -> Option<Module> {
    match name {
        "cad" => Some(kernel_module()),
        "math" => Some(math_module()),
        _ => None,
    }
}

// ── Argument helpers ────────────────────────────────────────────────────

/// Bind positional and keyword arguments to `names`. The first `required`
/// slots are guaranteed to be filled on success.
pub(crate) fn bind<const N: usize>(
    fname: &str,
    names: [&str; N],
    required: usize,
    args: Args,
) -> Result<[Option<Value>; N], Interrupt> {
    if args.positional.len() > N {
        return raise(
            ErrorKind::TypeError,
            format!(
                "{fname}() takes at most {N} arguments ({} given)",
                args.positional.len()
            ),
        );
    }
    let mut slots: [Option<Value>; N] = std::array::from_fn(|_| None);
    for (i, v) in args.positional.into_iter().enumerate() {
        slots[i] = Some(v);
    }
    for (key, value) in args.keywords {
        match names.iter().position(|n| *n == key) {
            Some(i) if slots[i].is_some() => {
                return raise(
                    ErrorKind::TypeError,
                    format!("{fname}() got multiple values for argument '{key}'"),
                )
            }
            Some(i) => slots[i] = Some(value),
            None => {
                return raise(
                    ErrorKind::TypeError,
                    format!("{fname}() got an unexpected keyword argument '{key}'"),
                )
            }
        }
    }
    for (slot, name) in slots.iter().zip(names).take(required) {
        if slot.is_none() {
            return raise(
                ErrorKind::TypeError,
                format!("{fname}() missing required argument '{name}'"),
            );
        }
    }
    Ok(slots)
}

/// A slot `bind` has already checked.
fn filled(slot: Option<Value>) -> Value {
    slot.unwrap_or(Value::None)
}

fn no_keywords(fname: &str, args: &Args) -> Result<(), Interrupt> {
    match args.keywords.first() {
        Some((key, _)) => raise(
            ErrorKind::TypeError,
            format!("{fname}() got an unexpected keyword argument '{key}'"),
        ),
        None => Ok(()),
    }
}

pub(crate) fn number(fname: &str, param: &str, value: &Value) -> Result<f64, Interrupt> {
    value.as_f64().ok_or_else(|| {
        Interrupt::Error(ScriptError::new(
            ErrorKind::TypeError,
            format!(
                "{fname}() argument '{param}' must be a number, not {}",
                value.type_name()
            ),
        ))
    })
}

fn shape_arg(fname: &str, value: &Value) -> Result<Shape, Interrupt> {
    value.as_shape().ok_or_else(|| {
        Interrupt::Error(ScriptError::new(
            ErrorKind::TypeError,
            format!("{fname}() expects a shape, not {}", value.type_name()),
        ))
    })
}

/// Shapes of a list argument, in order.
pub(crate) fn shape_list(fname: &str, value: &Value) -> Result<Vec<Shape>, Interrupt> {
    match value {
        Value::List(items) => items.borrow().iter().map(|v| shape_arg(fname, v)).collect(),
        other => raise(
            ErrorKind::TypeError,
            format!("{fname}() expects a list of shapes, not {}", other.type_name()),
        ),
    }
}

pub(crate) fn kernel_error(e: KernelError) -> Interrupt {
    Interrupt::Error(ScriptError::new(ErrorKind::KernelError, e.to_string()))
}

// ── General builtins ────────────────────────────────────────────────────

fn print(interp: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    no_keywords("print", &args)?;
    let line = args
        .positional
        .iter()
        .map(Value::display)
        .collect::<Vec<_>>()
        .join(" ");
    interp.emit_log(&line);
    Ok(Value::None)
}

fn int_arg(fname: &str, value: &Value) -> Result<i64, Interrupt> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Bool(b) => Ok(*b as i64),
        other => raise(
            ErrorKind::TypeError,
            format!("{fname}() expects integers, not {}", other.type_name()),
        ),
    }
}

fn range(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    no_keywords("range", &args)?;
    let ints = args
        .positional
        .iter()
        .map(|v| int_arg("range", v))
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return raise(
                ErrorKind::TypeError,
                format!("range() expects 1 to 3 arguments, got {}", ints.len()),
            )
        }
    };
    range_values(start, stop, step).map(Value::list)
}

fn range_values(start: i64, stop: i64, step: i64) -> Result<Vec<Value>, Interrupt> {
    if step == 0 {
        return raise(ErrorKind::ValueError, "range() arg 3 must not be zero");
    }
    // Widened so that spans across the whole i64 domain cannot overflow.
    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let span = if step > 0 { stop - start } else { start - stop }.max(0);
    let count = (span + step.abs() - 1) / step.abs();
    if count > i128::from(RANGE_LIMIT) {
        return raise(ErrorKind::ValueError, "range() too large");
    }
    // Every element lies between start and stop, so it fits back into i64.
    (0..count)
        .map(|i| {
            i64::try_from(start + i * step)
                .map(Value::Int)
                .or_else(|_| raise(ErrorKind::ValueError, "integer overflow"))
        })
        .collect()
}

fn len(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [value] = bind("len", ["obj"], 1, args)?;
    let n = match filled(value) {
        Value::List(items) => items.borrow().len(),
        Value::Dict(entries) => entries.borrow().len(),
        Value::Str(s) => s.chars().count(),
        other => {
            return raise(
                ErrorKind::TypeError,
                format!("object of type '{}' has no len()", other.type_name()),
            )
        }
    };
    Ok(Value::Int(n as i64))
}

fn to_str(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [value] = bind("str", ["obj"], 0, args)?;
    Ok(match value {
        Some(v) => Value::str(&v.display()),
        None => Value::str(""),
    })
}

fn to_int(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [value] = bind("int", ["x"], 1, args)?;
    match filled(value) {
        Value::Int(n) => Ok(Value::Int(n)),
        Value::Bool(b) => Ok(Value::Int(b as i64)),
        Value::Float(x) if x.is_finite() && x.abs() < 9.2e18 => Ok(Value::Int(x.trunc() as i64)),
        Value::Float(x) => raise(
            ErrorKind::ValueError,
            format!("cannot convert float {} to integer", format_float(x)),
        ),
        Value::Str(s) => match s.trim().parse::<i64>() {
            Ok(n) => Ok(Value::Int(n)),
            Err(_) => raise(
                ErrorKind::ValueError,
                format!("invalid literal for int() with base 10: '{s}'"),
            ),
        },
        other => raise(
            ErrorKind::TypeError,
            format!("int() argument must be a string or a number, not {}", other.type_name()),
        ),
    }
}

fn to_float(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [value] = bind("float", ["x"], 1, args)?;
    match filled(value) {
        Value::Str(s) => match s.trim().parse::<f64>() {
            Ok(x) => Ok(Value::Float(x)),
            Err(_) => raise(
                ErrorKind::ValueError,
                format!("could not convert string to float: '{s}'"),
            ),
        },
        other => Ok(Value::Float(number("float", "x", &other)?)),
    }
}

fn abs(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [value] = bind("abs", ["x"], 1, args)?;
    match filled(value) {
        Value::Int(n) => match n.checked_abs() {
            Some(n) => Ok(Value::Int(n)),
            None => raise(ErrorKind::ValueError, "integer overflow"),
        },
        Value::Bool(b) => Ok(Value::Int(b as i64)),
        other => Ok(Value::Float(number("abs", "x", &other)?.abs())),
    }
}

fn extremum(fname: &str, args: Args, want_max: bool) -> Result<Value, Interrupt> {
    no_keywords(fname, &args)?;
    let items = match args.positional.as_slice() {
        [Value::List(items)] => items.borrow().clone(),
        [_] => {
            return raise(
                ErrorKind::TypeError,
                format!("{fname}() expects a list or several arguments"),
            )
        }
        _ => args.positional,
    };
    let mut best: Option<Value> = None;
    for item in items {
        best = Some(match best {
            None => item,
            Some(current) => {
                let replace = match (&item, &current) {
                    (Value::Str(a), Value::Str(b)) => (a > b) == want_max && a != b,
                    _ => {
                        let a = number(fname, "item", &item)?;
                        let b = number(fname, "item", &current)?;
                        if want_max {
                            a > b
                        } else {
                            a < b
                        }
                    }
                };
                if replace {
                    item
                } else {
                    current
                }
            }
        });
    }
    match best {
        Some(v) => Ok(v),
        None => raise(
            ErrorKind::ValueError,
            format!("{fname}() arg is an empty sequence"),
        ),
    }
}

fn min(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    extremum("min", args, false)
}

fn max(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    extremum("max", args, true)
}

/// Round half to even.
fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        r
    }
}

fn round(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [value, digits] = bind("round", ["number", "ndigits"], 1, args)?;
    let value = filled(value);
    match digits {
        None | Some(Value::None) => match value {
            Value::Int(n) => Ok(Value::Int(n)),
            other => {
                let x = round_half_even(number("round", "number", &other)?);
                if x.is_finite() && x.abs() < 9.2e18 {
                    Ok(Value::Int(x as i64))
                } else {
                    raise(ErrorKind::ValueError, "cannot round a non-finite number")
                }
            }
        },
        Some(d) => {
            let d = int_arg("round", &d)?.clamp(-308, 308) as i32;
            let x = number("round", "number", &value)?;
            let scale = 10f64.powi(d);
            Ok(Value::Float(round_half_even(x * scale) / scale))
        }
    }
}

fn type_name(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [value] = bind("type_name", ["obj"], 1, args)?;
    Ok(Value::str(filled(value).type_name()))
}

/// `ValueError("...")` and friends build catchable, raisable error values.
fn construct_error<const KIND: usize>(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let kind = ErrorKind::ALL[KIND];
    let [message] = bind(kind.name(), ["message"], 0, args)?;
    Ok(Value::Error(Rc::new(ErrorValue {
        kind,
        message: message.map(|m| m.display()).unwrap_or_default(),
    })))
}

// ── Kernel builtins ─────────────────────────────────────────────────────

fn make_box(interp: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [w, h, d] = bind("box", ["width", "height", "depth"], 3, args)?;
    let w = number("box", "width", &filled(w))?;
    let h = number("box", "height", &filled(h))?;
    let d = number("box", "depth", &filled(d))?;
    let shape = interp.kernel().lock().make_box(w, h, d).map_err(kernel_error)?;
    Ok(Value::Shape(shape))
}

fn make_cylinder(interp: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [r, h] = bind("cylinder", ["radius", "height"], 2, args)?;
    let r = number("cylinder", "radius", &filled(r))?;
    let h = number("cylinder", "height", &filled(h))?;
    let shape = interp
        .kernel()
        .lock()
        .make_cylinder(r, h)
        .map_err(kernel_error)?;
    Ok(Value::Shape(shape))
}

fn make_sphere(interp: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [r] = bind("sphere", ["radius"], 1, args)?;
    let r = number("sphere", "radius", &filled(r))?;
    let shape = interp.kernel().lock().make_sphere(r).map_err(kernel_error)?;
    Ok(Value::Shape(shape))
}

fn make_point(interp: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [x, y, z] = bind("point", ["x", "y", "z"], 3, args)?;
    let at = [
        number("point", "x", &filled(x))?,
        number("point", "y", &filled(y))?,
        number("point", "z", &filled(z))?,
    ];
    let shape = interp.kernel().lock().make_point(at).map_err(kernel_error)?;
    Ok(Value::Shape(shape))
}

fn make_compound(interp: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [parts] = bind("compound", ["shapes"], 1, args)?;
    let parts = shape_list("compound", &filled(parts))?;
    let shape = interp
        .kernel()
        .lock()
        .make_compound(&parts)
        .map_err(kernel_error)?;
    Ok(Value::Shape(shape))
}

// ── math ────────────────────────────────────────────────────────────────

fn unary_math(fname: &str, args: Args, f: fn(f64) -> f64) -> Result<Value, Interrupt> {
    let [x] = bind(fname, ["x"], 1, args)?;
    Ok(Value::Float(f(number(fname, "x", &filled(x))?)))
}

fn math_sqrt(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [x] = bind("sqrt", ["x"], 1, args)?;
    let x = number("sqrt", "x", &filled(x))?;
    if x < 0.0 {
        return raise(ErrorKind::ValueError, "math domain error");
    }
    Ok(Value::Float(x.sqrt()))
}

fn math_sin(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    unary_math("sin", args, f64::sin)
}

fn math_cos(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    unary_math("cos", args, f64::cos)
}

fn math_tan(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    unary_math("tan", args, f64::tan)
}

fn math_radians(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    unary_math("radians", args, f64::to_radians)
}

fn math_degrees(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    unary_math("degrees", args, f64::to_degrees)
}

fn math_atan2(_: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [y, x] = bind("atan2", ["y", "x"], 2, args)?;
    let y = number("atan2", "y", &filled(y))?;
    let x = number("atan2", "x", &filled(x))?;
    Ok(Value::Float(y.atan2(x)))
}

// ── Methods ─────────────────────────────────────────────────────────────

/// The method `name` on `receiver`, if it has one.
pub fn method_name(receiver: &Value, name: &str) -> Option<&'static str> {
    let table = match receiver {
        Value::Shape(_) => SHAPE_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        _ => return None,
    };
    table.iter().find(|m| **m == name).copied()
}

pub fn call_method(interp: &mut Interpreter, method: &Method, args: Args) -> Result<Value, Interrupt> {
    match (&method.receiver, method.name) {
        (Value::Shape(shape), "translate") => translate(interp, *shape, args),
        (Value::Shape(shape), "union") => boolean(interp, *shape, "union", BooleanOp::Union, args),
        (Value::Shape(shape), "cut") => boolean(interp, *shape, "cut", BooleanOp::Cut, args),
        (Value::Shape(shape), "intersect") => {
            boolean(interp, *shape, "intersect", BooleanOp::Intersect, args)
        }
        (Value::Shape(shape), "is_empty") => {
            bind("is_empty", [], 0, args)?;
            Ok(Value::Bool(interp.kernel().lock().is_empty(shape)))
        }
        (Value::List(items), "append") => {
            let [item] = bind("append", ["item"], 1, args)?;
            items.borrow_mut().push(filled(item));
            Ok(Value::None)
        }
        (Value::Dict(entries), "get") => {
            let [key, default] = bind("get", ["key", "default"], 1, args)?;
            let found = match filled(key) {
                Value::Str(k) => entries.borrow().get(&*k).cloned(),
                _ => None,
            };
            Ok(found.or(default).unwrap_or(Value::None))
        }
        (Value::Dict(entries), "keys") => {
            bind("keys", [], 0, args)?;
            let keys = entries.borrow().keys().map(|k| Value::str(k)).collect();
            Ok(Value::list(keys))
        }
        (receiver, name) => raise(
            ErrorKind::AttributeError,
            format!("'{}' object has no attribute '{name}'", receiver.type_name()),
        ),
    }
}

fn translate(interp: &mut Interpreter, shape: Shape, args: Args) -> Result<Value, Interrupt> {
    // translate(x, y, z) or translate((x, y, z))
    let offset = match args.positional.as_slice() {
        [Value::List(items)] => {
            let items = items.borrow();
            if items.len() != 3 {
                return raise(
                    ErrorKind::ValueError,
                    format!("translate() expects 3 components, got {}", items.len()),
                );
            }
            [
                number("translate", "x", &items[0])?,
                number("translate", "y", &items[1])?,
                number("translate", "z", &items[2])?,
            ]
        }
        _ => {
            let [x, y, z] = bind("translate", ["x", "y", "z"], 3, args)?;
            [
                number("translate", "x", &filled(x))?,
                number("translate", "y", &filled(y))?,
                number("translate", "z", &filled(z))?,
            ]
        }
    };
    let moved = interp
        .kernel()
        .lock()
        .translate(&shape, offset)
        .map_err(kernel_error)?;
    Ok(Value::Shape(moved))
}

fn boolean(
    interp: &mut Interpreter,
    shape: Shape,
    fname: &str,
    op: BooleanOp,
    args: Args,
) -> Result<Value, Interrupt> {
    let [other] = bind(fname, ["other"], 1, args)?;
    let other = shape_arg(fname, &filled(other))?;
    let result = interp
        .kernel()
        .lock()
        .boolean(&shape, &other, op)
        .map_err(kernel_error)?;
    Ok(Value::Shape(result))
}
