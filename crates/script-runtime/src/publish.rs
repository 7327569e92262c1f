//! Publication registry and the `show_object` / `debug` / `log` callbacks.

use indexmap::IndexMap;
use tracing::{debug, warn};

use cad_types::{DisplayOptions, OptionValue, PublicationEntry, PublishableKinds, Shape};

use crate::builtins::{bind, kernel_error, shape_list};
use crate::error::{raise, ErrorKind, Interrupt};
use crate::interp::{is_user_name, Interpreter};
use crate::value::{Args, Value};

/// Named results surfaced by one run, in first-publication order.
///
/// Republishing a name replaces its entry but keeps its position.
#[derive(Debug, Default)]
pub struct PublicationRegistry {
    entries: IndexMap<String, PublicationEntry>,
    explicit: usize,
}

impl PublicationRegistry {
    pub fn publish(&mut self, entry: PublicationEntry) {
        self.explicit += 1;
        debug!(name = %entry.name, handle = %entry.shape.handle, "published");
        self.entries.insert(entry.name.clone(), entry);
    }

    /// Number of publish calls, counting replacements.
    pub fn explicit_count(&self) -> usize {
        self.explicit
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PublicationEntry> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PublicationEntry> {
        self.entries.values()
    }

    /// Drain the registry, resetting it for the next run.
    pub fn take(&mut self) -> Vec<PublicationEntry> {
        self.explicit = 0;
        std::mem::take(&mut self.entries).into_values().collect()
    }
}

/// Implicit discovery: every visible binding holding a publishable shape,
/// in binding order.
pub fn discover<'a>(
    bindings: impl IntoIterator<Item = (&'a String, &'a Value)>,
    kinds: &PublishableKinds,
) -> Vec<PublicationEntry> {
    bindings
        .into_iter()
        .filter(|(name, _)| is_user_name(name))
        .filter_map(|(name, value)| match value {
            Value::Shape(shape) if kinds.contains(shape.kind) => Some(PublicationEntry {
                name: name.clone(),
                shape: *shape,
                options: DisplayOptions::default(),
            }),
            _ => None,
        })
        .collect()
}

/// Name for a publication made without one: the first binding in the
/// calling frame that holds the same object, else a handle-derived name.
pub fn anonymous_name(interp: &Interpreter, object: &Value, shape: &Shape) -> String {
    let bound = interp.current_frame().and_then(|frame| {
        frame
            .bindings()
            .borrow()
            .iter()
            .find(|(name, value)| is_user_name(name) && value.identical(object))
            .map(|(name, _)| name.clone())
    });
    bound.unwrap_or_else(|| format!("obj_{}", shape.handle.0))
}

// ── Script callbacks ────────────────────────────────────────────────────

pub(crate) fn show_object(interp: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [object, name, options] = bind("show_object", ["obj", "name", "options"], 1, args)?;
    let options = match options {
        None | Some(Value::None) => DisplayOptions::default(),
        Some(Value::Dict(entries)) => parse_options(&entries.borrow())?,
        Some(other) => {
            return raise(
                ErrorKind::TypeError,
                format!("show_object() options must be a dict, not {}", other.type_name()),
            )
        }
    };
    publish_value(interp, object.unwrap_or(Value::None), name, options)
}

pub(crate) fn debug(interp: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let [object, name] = bind("debug", ["obj", "name"], 1, args)?;
    publish_value(
        interp,
        object.unwrap_or(Value::None),
        name,
        DisplayOptions::flagged(),
    )
}

pub(crate) fn log(interp: &mut Interpreter, args: Args) -> Result<Value, Interrupt> {
    let text = args
        .positional
        .iter()
        .map(Value::display)
        .collect::<Vec<_>>()
        .join(" ");
    interp.emit_log(&text);
    Ok(Value::None)
}

fn publish_value(
    interp: &mut Interpreter,
    object: Value,
    name: Option<Value>,
    options: DisplayOptions,
) -> Result<Value, Interrupt> {
    let shape = match &object {
        Value::Shape(shape) => *shape,
        Value::List(_) => {
            let parts = shape_list("show_object", &object)?;
            interp
                .kernel()
                .lock()
                .make_compound(&parts)
                .map_err(kernel_error)?
        }
        other => {
            return raise(
                ErrorKind::TypeError,
                format!(
                    "show_object() expects a shape or a list of shapes, not {}",
                    other.type_name()
                ),
            )
        }
    };
    let name = match name {
        Some(Value::Str(s)) => s.to_string(),
        None | Some(Value::None) => anonymous_name(interp, &object, &shape),
        Some(other) => {
            return raise(
                ErrorKind::TypeError,
                format!("publication name must be a string, not {}", other.type_name()),
            )
        }
    };
    interp.publications_mut().publish(PublicationEntry {
        name,
        shape,
        options,
    });
    Ok(Value::None)
}

fn option_value(key: &str, value: &Value) -> Result<OptionValue, Interrupt> {
    match value {
        Value::Str(s) => Ok(OptionValue::Text(s.to_string())),
        Value::List(items) => {
            let numbers = items
                .borrow()
                .iter()
                .map(Value::as_f64)
                .collect::<Option<Vec<_>>>();
            match numbers {
                Some(numbers) => Ok(OptionValue::Numbers(numbers)),
                None => raise(
                    ErrorKind::ValueError,
                    format!("option '{key}' must be a list of numbers"),
                ),
            }
        }
        other => match other.as_f64() {
            Some(n) => Ok(OptionValue::Number(n)),
            None => raise(
                ErrorKind::ValueError,
                format!("option '{key}' has unsupported type {}", other.type_name()),
            ),
        },
    }
}

fn parse_options(entries: &IndexMap<String, Value>) -> Result<DisplayOptions, Interrupt> {
    let pairs = entries
        .iter()
        .map(|(k, v)| option_value(k, v).map(|o| (k.clone(), o)))
        .collect::<Result<Vec<_>, _>>()?;
    match DisplayOptions::parse(pairs) {
        Ok((options, ignored)) => {
            for key in ignored {
                warn!(key = %key, "ignoring unknown display option");
            }
            Ok(options)
        }
        Err(e) => raise(ErrorKind::ValueError, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cad_types::{ShapeHandle, ShapeKind};

    fn entry(name: &str, handle: u64) -> PublicationEntry {
        PublicationEntry {
            name: name.to_string(),
            shape: Shape::new(ShapeHandle(handle), ShapeKind::Solid),
            options: DisplayOptions::default(),
        }
    }

    #[test]
    fn republishing_replaces_in_place() {
        let mut reg = PublicationRegistry::default();
        reg.publish(entry("a", 1));
        reg.publish(entry("b", 2));
        reg.publish(entry("a", 3));

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.explicit_count(), 3);
        let names: Vec<_> = reg.entries().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(reg.get("a").unwrap().shape.handle, ShapeHandle(3));

        let taken = reg.take();
        assert_eq!(taken.len(), 2);
        assert!(reg.is_empty());
        assert_eq!(reg.explicit_count(), 0);
    }

    #[test]
    fn discovery_filters_names_and_kinds() {
        let solid = Value::Shape(Shape::new(ShapeHandle(1), ShapeKind::Solid));
        let point = Value::Shape(Shape::new(ShapeHandle(2), ShapeKind::Vertex));
        let mut bindings = IndexMap::new();
        bindings.insert("part".to_string(), solid.clone());
        bindings.insert("_hidden".to_string(), solid.clone());
        bindings.insert("show_object".to_string(), solid);
        bindings.insert("tip".to_string(), point);
        bindings.insert("count".to_string(), Value::Int(3));

        let found = discover(&bindings, &PublishableKinds::default());
        let names: Vec<_> = found.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["part"]);

        let kinds = PublishableKinds::new([ShapeKind::Solid, ShapeKind::Vertex]);
        assert_eq!(discover(&bindings, &kinds).len(), 2);
    }

    #[test]
    fn option_dict_errors_are_value_errors() {
        let mut entries = IndexMap::new();
        entries.insert("alpha".to_string(), Value::Float(4.0));
        match parse_options(&entries) {
            Err(Interrupt::Error(e)) => assert_eq!(e.kind, ErrorKind::ValueError),
            other => panic!("unexpected {other:?}"),
        }

        let mut entries = IndexMap::new();
        entries.insert("color".to_string(), Value::str("red"));
        entries.insert("glow".to_string(), Value::Bool(true));
        let options = parse_options(&entries).unwrap();
        assert!(options.color.is_some());
    }
}
