//! Schema views - the reduced schema one operation works with.
//!
//! A view keeps the fields whose io admits the operation, in declaration
//! order, and never accepts keys outside that set. Each property carries a
//! compiled JSON Schema check for its value, or, for nested objects, inline
//! references and arrays of those, the sub-shape to walk.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::DefinitionError;
use crate::field::{object_schema, FieldSet, FieldSpec, FieldType, RenderContext, SELF_REFERENCE};
use crate::types::{Operation, Values};

/// Looks up the view another resource exposes for an operation.
///
/// Inline fields validate against the target's create view and render
/// through its read view.
pub trait SchemaSource {
    fn view(&self, resource: &str, operation: Operation) -> Option<Arc<SchemaView>>;
}

/// Compiled JSON Schema for a value, with the schema kept for rule lookup.
pub struct Check {
    schema: Value,
    validator: jsonschema::Validator,
}

impl Check {
    fn compile(field: &str, schema: Value) -> Result<Self, DefinitionError> {
        let validator =
            jsonschema::validator_for(&schema).map_err(|e| DefinitionError::InvalidFieldSchema {
                field: field.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { schema, validator })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub(crate) fn validator(&self) -> &jsonschema::Validator {
        &self.validator
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("schema", &self.schema).finish()
    }
}

/// How a property value is validated and projected.
#[derive(Debug)]
pub enum Shape {
    /// Checked in one pass by the compiled schema.
    Leaf(Check),
    /// Object walked field by field.
    Nested(Box<SchemaView>),
    /// Object shaped like the named resource.
    Inline(String),
    /// Array whose items have a structural shape; `check` covers the array
    /// keywords only.
    Items { check: Check, items: Box<Shape> },
    /// Map whose values have a structural shape; `check` covers the object
    /// keywords only.
    Entries { check: Check, values: Box<Shape> },
}

/// One field as seen by a view.
#[derive(Debug)]
pub struct ViewProperty {
    spec: FieldSpec,
    schema: Value,
    shape: Shape,
}

impl ViewProperty {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    /// Rendered JSON Schema of this property.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }
}

/// The reduced schema of one operation.
#[derive(Debug)]
pub struct SchemaView {
    operation: Operation,
    properties: Vec<ViewProperty>,
    required: Vec<String>,
    schema: Value,
}

impl SchemaView {
    /// Derive the view of `fields` for `operation`.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError::InvalidFieldSchema` when a field renders to
    /// a schema that cannot be compiled (e.g. an invalid pattern).
    pub fn derive(
        fields: &FieldSet,
        operation: Operation,
        ctx: &RenderContext,
    ) -> Result<Self, DefinitionError> {
        Self::from_fields(fields.as_slice(), operation, ctx)
    }

    fn from_fields(
        fields: &[FieldSpec],
        operation: Operation,
        ctx: &RenderContext,
    ) -> Result<Self, DefinitionError> {
        let mut properties = Vec::new();
        let mut required = Vec::new();

        for spec in fields.iter().filter(|f| f.is_visible_for(operation)) {
            let schema = spec.schema(operation, ctx);
            let shape = shape_for(&spec.name, &spec.field_type, schema.clone(), operation, ctx)?;
            if operation == Operation::Create && spec.is_required_on_create() {
                required.push(spec.name.clone());
            }
            properties.push(ViewProperty {
                spec: spec.clone(),
                schema,
                shape,
            });
        }

        Ok(Self {
            operation,
            properties,
            required,
            schema: object_schema(fields, operation, ctx),
        })
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn properties(&self) -> &[ViewProperty] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&ViewProperty> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Property names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name())
    }

    /// Fields that must be supplied; only create views require anything.
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// `{"type":"object","additionalProperties":false,"properties":{...}}`.
    pub fn to_json_schema(&self) -> &Value {
        &self.schema
    }

    /// Render stored values through this view.
    ///
    /// Keeps the view's properties in declaration order; properties absent
    /// from `values` stay absent.
    pub fn project(&self, values: &Values, source: &dyn SchemaSource) -> Values {
        let mut output = Map::new();
        for property in &self.properties {
            if let Some(value) = values.get(property.name()) {
                output.insert(
                    property.name().to_string(),
                    project_value(&property.shape, value, source),
                );
            }
        }
        output
    }

    /// Apply validated update `changes` onto stored `values`.
    ///
    /// Nested objects merge key by key, so their non-updatable fields keep
    /// the stored value; every other supplied key replaces the stored one.
    pub fn merge(&self, values: &mut Values, changes: Values) {
        for (name, change) in changes {
            if let (Some(Shape::Nested(view)), Value::Object(inner)) =
                (self.property(&name).map(|p| p.shape()), &change)
            {
                if let Some(Value::Object(stored)) = values.get_mut(&name) {
                    view.merge(stored, inner.clone());
                    continue;
                }
            }
            values.insert(name, change);
        }
    }
}

fn shape_for(
    field: &str,
    field_type: &FieldType,
    schema: Value,
    operation: Operation,
    ctx: &RenderContext,
) -> Result<Shape, DefinitionError> {
    let shape = match field_type {
        FieldType::Nested { fields } => {
            Shape::Nested(Box::new(SchemaView::from_fields(fields, operation, ctx)?))
        }
        FieldType::Inline { resource } => {
            let target = if resource == SELF_REFERENCE {
                ctx.resource.clone()
            } else {
                resource.clone()
            };
            Shape::Inline(target)
        }
        FieldType::Array { items, .. } if items.is_structural() => {
            let item_schema = items.schema(operation, ctx);
            Shape::Items {
                check: Check::compile(field, without_key(schema, "items"))?,
                items: Box::new(shape_for(field, items, item_schema, operation, ctx)?),
            }
        }
        FieldType::Object {
            values: Some(values),
        } if values.is_structural() => {
            let value_schema = values.schema(operation, ctx);
            Shape::Entries {
                check: Check::compile(field, without_key(schema, "additionalProperties"))?,
                values: Box::new(shape_for(field, values, value_schema, operation, ctx)?),
            }
        }
        _ => Shape::Leaf(Check::compile(field, schema)?),
    };
    Ok(shape)
}

fn without_key(schema: Value, key: &str) -> Value {
    match schema {
        Value::Object(mut map) => {
            map.remove(key);
            Value::Object(map)
        }
        other => other,
    }
}

fn project_value(shape: &Shape, value: &Value, source: &dyn SchemaSource) -> Value {
    match (shape, value) {
        (_, Value::Null) => Value::Null,
        (Shape::Nested(view), Value::Object(map)) => Value::Object(view.project(map, source)),
        (Shape::Inline(target), Value::Object(map)) => match source.view(target, Operation::Read) {
            Some(view) => Value::Object(view.project(map, source)),
            None => value.clone(),
        },
        (Shape::Items { items, .. }, Value::Array(arr)) => Value::Array(
            arr.iter()
                .map(|item| project_value(items, item, source))
                .collect(),
        ),
        (Shape::Entries { values, .. }, Value::Object(map)) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), project_value(values, v, source)))
                .collect(),
        ),
        _ => value.clone(),
    }
}
