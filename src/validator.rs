//! Payload validation against schema views.

use serde_json::{json, Value};

use crate::error::{PathSegment, ValidationError, Violation};
use crate::types::{Operation, Values};
use crate::view::{Check, SchemaSource, SchemaView, Shape};

/// Validate a payload against a view.
///
/// Every violation is collected in one pass: properties in declaration
/// order, then unexpected keys in payload order. On create, absent fields
/// with a default are filled in; absent required fields are reported with
/// the object's path and the `required` rule. Other operations only check
/// the keys that were supplied.
///
/// # Errors
///
/// Returns a `ValidationError` listing every violation found.
pub fn validate(
    view: &SchemaView,
    payload: &Value,
    source: &dyn SchemaSource,
) -> Result<Values, ValidationError> {
    validate_at(view, payload, &[], source)
}

/// Validate a payload that sits at `root` inside an outer document.
///
/// Reported paths start with `root`.
pub fn validate_at(
    view: &SchemaView,
    payload: &Value,
    root: &[PathSegment],
    source: &dyn SchemaSource,
) -> Result<Values, ValidationError> {
    let mut violations = Vec::new();
    let values = validate_object(view, payload, &[], source, &mut violations);

    match ValidationError::from_violations(violations) {
        Some(err) => Err(err.with_root(root.iter().cloned())),
        None => Ok(values),
    }
}

fn validate_object(
    view: &SchemaView,
    value: &Value,
    path: &[PathSegment],
    source: &dyn SchemaSource,
    out: &mut Vec<Violation>,
) -> Values {
    let Some(map) = value.as_object() else {
        out.push(Violation::new(path.to_vec(), "type", json!("object")));
        return Values::new();
    };

    let filling = view.operation() == Operation::Create;
    let mut values = Values::new();

    for property in view.properties() {
        let name = property.name();
        match map.get(name) {
            Some(supplied) => {
                let child = child_path(path, PathSegment::from(name));
                let coerced = if supplied.is_null() && property.spec().nullable {
                    Value::Null
                } else {
                    validate_shape(property.shape(), supplied, &child, source, out)
                };
                values.insert(name.to_string(), coerced);
            }
            None if filling => {
                if let Some(default) = &property.spec().default {
                    values.insert(name.to_string(), default.clone());
                } else if property.spec().required {
                    out.push(Violation::new(
                        path.to_vec(),
                        "required",
                        json!(view.required()),
                    ));
                }
            }
            None => {}
        }
    }

    for key in map.keys() {
        if view.property(key).is_none() {
            out.push(Violation::new(
                child_path(path, PathSegment::from(key.as_str())),
                "additionalProperties",
                Value::Bool(false),
            ));
        }
    }

    values
}

fn validate_shape(
    shape: &Shape,
    value: &Value,
    path: &[PathSegment],
    source: &dyn SchemaSource,
    out: &mut Vec<Violation>,
) -> Value {
    match shape {
        Shape::Leaf(check) => {
            check_value(check, value, path, out);
            value.clone()
        }
        Shape::Nested(view) => Value::Object(validate_object(view, value, path, source, out)),
        Shape::Inline(target) => match source.view(target, Operation::Create) {
            Some(view) => Value::Object(validate_object(&view, value, path, source, out)),
            None => {
                out.push(Violation::new(path.to_vec(), "$ref", json!(target)));
                value.clone()
            }
        },
        Shape::Items { check, items } => {
            check_value(check, value, path, out);
            match value.as_array() {
                Some(arr) => Value::Array(
                    arr.iter()
                        .enumerate()
                        .map(|(i, item)| {
                            let child = child_path(path, PathSegment::Index(i));
                            validate_shape(items, item, &child, source, out)
                        })
                        .collect(),
                ),
                None => value.clone(),
            }
        }
        Shape::Entries { check, values } => {
            check_value(check, value, path, out);
            match value.as_object() {
                Some(map) => Value::Object(
                    map.iter()
                        .map(|(key, entry)| {
                            let child = child_path(path, PathSegment::from(key.as_str()));
                            (key.clone(), validate_shape(values, entry, &child, source, out))
                        })
                        .collect(),
                ),
                None => value.clone(),
            }
        }
    }
}

/// Run a compiled schema and record each error as a violation.
///
/// The rule is the last keyword of the failing schema location; its
/// parameter is the schema value found there.
fn check_value(check: &Check, value: &Value, path: &[PathSegment], out: &mut Vec<Violation>) {
    for error in check.validator().iter_errors(value) {
        let schema_path = error.schema_path.to_string();
        let instance_path = error.instance_path.to_string();

        let rule = schema_path
            .rsplit('/')
            .next()
            .map(unescape_token)
            .unwrap_or_default();
        let param = check
            .schema()
            .pointer(&schema_path)
            .cloned()
            .unwrap_or(Value::Null);

        let mut full = path.to_vec();
        full.extend(pointer_segments(value, &instance_path));
        out.push(Violation::new(full, rule, param));
    }
}

/// Split a JSON Pointer into segments, using the instance to tell array
/// indexes from object keys.
fn pointer_segments(instance: &Value, pointer: &str) -> Vec<PathSegment> {
    let mut current = Some(instance);
    pointer
        .split('/')
        .skip(1)
        .map(|raw| {
            let token = unescape_token(raw);
            let segment = match (current, token.parse::<usize>()) {
                (Some(Value::Array(_)), Ok(index)) => PathSegment::Index(index),
                _ => PathSegment::Key(token),
            };
            current = current.and_then(|v| match &segment {
                PathSegment::Index(index) => v.get(*index),
                PathSegment::Key(key) => v.get(key.as_str()),
            });
            segment
        })
        .collect()
}

// Unescape JSON Pointer encoding (~1 = /, ~0 = ~)
fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn child_path(path: &[PathSegment], segment: PathSegment) -> Vec<PathSegment> {
    let mut child = Vec::with_capacity(path.len() + 1);
    child.extend_from_slice(path);
    child.push(segment);
    child
}
