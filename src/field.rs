//! Field definitions and their JSON Schema rendering.
//!
//! A [`FieldSpec`] describes one named attribute of a resource: its value
//! type, which operations may read or write it, and how absent values are
//! handled. A [`FieldSet`] is the checked, ordered list of fields of one
//! resource (or of one nested object).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::DefinitionError;
use crate::types::{Io, Operation};

/// Name an inline field may use to reference its own resource.
pub const SELF_REFERENCE: &str = "self";

/// The value kind of a field; determines the JSON Schema it renders to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FieldType {
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
        choices: Option<Vec<String>>,
    },
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<i64>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    Boolean,
    Any,
    Array {
        items: Box<FieldType>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        unique: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<u64>,
    },
    /// Free-form map; `values` constrains every entry when set.
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        values: Option<Box<FieldType>>,
    },
    /// Embedded object with its own fields and io rules.
    Nested { fields: Vec<FieldSpec> },
    /// Value shaped like another registered resource's schema.
    Inline { resource: String },
}

impl FieldType {
    pub fn string() -> Self {
        FieldType::String {
            min_length: None,
            max_length: None,
            pattern: None,
            choices: None,
        }
    }

    pub fn integer() -> Self {
        FieldType::Integer {
            minimum: None,
            maximum: None,
        }
    }

    pub fn number() -> Self {
        FieldType::Number {
            minimum: None,
            maximum: None,
        }
    }

    pub fn array(items: FieldType) -> Self {
        FieldType::Array {
            items: Box::new(items),
            unique: false,
            min_items: None,
            max_items: None,
        }
    }

    pub fn nested(fields: Vec<FieldSpec>) -> Self {
        FieldType::Nested { fields }
    }

    pub fn inline(resource: impl Into<String>) -> Self {
        FieldType::Inline {
            resource: resource.into(),
        }
    }

    /// True when values of this type are validated by walking a sub-schema
    /// rather than by a single JSON Schema check.
    pub fn is_structural(&self) -> bool {
        match self {
            FieldType::Nested { .. } | FieldType::Inline { .. } => true,
            FieldType::Array { items, .. } => items.is_structural(),
            _ => false,
        }
    }

    /// Render the JSON Schema of this type for an operation.
    pub fn schema(&self, operation: Operation, ctx: &RenderContext) -> Value {
        match self {
            FieldType::String {
                min_length,
                max_length,
                pattern,
                choices,
            } => {
                let mut schema = type_schema("string");
                insert_opt(&mut schema, "minLength", min_length.map(Value::from));
                insert_opt(&mut schema, "maxLength", max_length.map(Value::from));
                insert_opt(&mut schema, "pattern", pattern.clone().map(Value::from));
                insert_opt(&mut schema, "enum", choices.clone().map(Value::from));
                Value::Object(schema)
            }
            FieldType::Integer { minimum, maximum } => {
                let mut schema = type_schema("integer");
                insert_opt(&mut schema, "minimum", minimum.map(Value::from));
                insert_opt(&mut schema, "maximum", maximum.map(Value::from));
                Value::Object(schema)
            }
            FieldType::Number { minimum, maximum } => {
                let mut schema = type_schema("number");
                insert_opt(&mut schema, "minimum", minimum.map(Value::from));
                insert_opt(&mut schema, "maximum", maximum.map(Value::from));
                Value::Object(schema)
            }
            FieldType::Boolean => Value::Object(type_schema("boolean")),
            FieldType::Any => json!({}),
            FieldType::Array {
                items,
                unique,
                min_items,
                max_items,
            } => {
                let mut schema = type_schema("array");
                schema.insert("items".into(), items.schema(operation, ctx));
                if *unique {
                    schema.insert("uniqueItems".into(), Value::Bool(true));
                }
                insert_opt(&mut schema, "minItems", min_items.map(Value::from));
                insert_opt(&mut schema, "maxItems", max_items.map(Value::from));
                Value::Object(schema)
            }
            FieldType::Object { values } => {
                let mut schema = type_schema("object");
                if let Some(values) = values {
                    schema.insert(
                        "additionalProperties".into(),
                        values.schema(operation, ctx),
                    );
                }
                Value::Object(schema)
            }
            FieldType::Nested { fields } => object_schema(fields, operation, ctx),
            FieldType::Inline { resource } => json!({ "$ref": ctx.reference(resource) }),
        }
    }
}

/// Names needed to render references between resources.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    /// Resource the schema is rendered for.
    pub resource: String,
    /// Route prefix the API is mounted under.
    pub prefix: String,
}

impl RenderContext {
    pub fn new(resource: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            prefix: prefix.into(),
        }
    }

    /// `#` for the rendered resource itself, its schema route otherwise.
    pub fn reference(&self, target: &str) -> String {
        if target == SELF_REFERENCE || target == self.resource {
            "#".to_string()
        } else {
            format!("{}/{}/schema", self.prefix, target)
        }
    }
}

/// A single named field of a schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub io: Io,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
    /// Usable as an alternate unique identifier in lookups.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub natural_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            io: Io::default(),
            default: None,
            required: false,
            nullable: false,
            natural_key: false,
            title: None,
            description: None,
        }
    }

    pub fn io(mut self, io: Io) -> Self {
        self.io = io;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn natural_key(mut self) -> Self {
        self.natural_key = true;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Whether the field takes part in `operation`.
    ///
    /// Create and update test their own write flag independently; read and
    /// enumerate test the read flag.
    pub fn is_visible_for(&self, operation: Operation) -> bool {
        self.io.contains(operation.capability())
    }

    /// Absence on create is an error only when no default fills the gap.
    pub fn is_required_on_create(&self) -> bool {
        self.required && self.default.is_none()
    }

    /// Render this field's JSON Schema for an operation.
    pub fn schema(&self, operation: Operation, ctx: &RenderContext) -> Value {
        let mut schema = self.field_type.schema(operation, ctx);
        if self.nullable {
            schema = make_nullable(schema);
        }
        if let Value::Object(map) = &mut schema {
            insert_opt(map, "default", self.default.clone());
            insert_opt(map, "title", self.title.clone().map(Value::from));
            insert_opt(map, "description", self.description.clone().map(Value::from));
        }
        schema
    }
}

/// Checked, ordered list of fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldSet {
    fields: Vec<FieldSpec>,
}

impl FieldSet {
    /// Check the fields and wrap them.
    ///
    /// # Errors
    ///
    /// Rejects dead fields (empty io), duplicate names and names reserved for
    /// synthetic keys, at any nesting depth.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, DefinitionError> {
        check_fields(&fields)?;
        Ok(Self { fields })
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_slice(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Names of the fields that act as natural keys.
    pub fn natural_keys(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.natural_key)
            .map(|f| f.name.clone())
            .collect()
    }

    /// Resources referenced by inline fields, at any depth.
    pub fn inline_targets(&self) -> Vec<String> {
        let mut targets = Vec::new();
        collect_inline_targets(&self.fields, &mut targets);
        targets
    }
}

fn check_fields(fields: &[FieldSpec]) -> Result<(), DefinitionError> {
    let mut seen = HashSet::new();
    for field in fields {
        if field.name.is_empty() || field.name.starts_with('$') {
            return Err(DefinitionError::ReservedName {
                field: field.name.clone(),
            });
        }
        if field.io.is_empty() {
            return Err(DefinitionError::DeadField {
                field: field.name.clone(),
            });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(DefinitionError::DuplicateField {
                field: field.name.clone(),
            });
        }
        if let Some(nested) = nested_fields(&field.field_type) {
            check_fields(nested)?;
        }
    }
    Ok(())
}

fn nested_fields(field_type: &FieldType) -> Option<&[FieldSpec]> {
    match field_type {
        FieldType::Nested { fields } => Some(fields.as_slice()),
        FieldType::Array { items, .. } => nested_fields(items),
        FieldType::Object {
            values: Some(values),
        } => nested_fields(values),
        _ => None,
    }
}

fn collect_inline_targets(fields: &[FieldSpec], targets: &mut Vec<String>) {
    fn visit(field_type: &FieldType, targets: &mut Vec<String>) {
        match field_type {
            FieldType::Inline { resource } => {
                if !targets.contains(resource) {
                    targets.push(resource.clone());
                }
            }
            FieldType::Nested { fields } => collect_inline_targets(fields, targets),
            FieldType::Array { items, .. } => visit(items, targets),
            FieldType::Object {
                values: Some(values),
            } => visit(values, targets),
            _ => {}
        }
    }

    for field in fields {
        visit(&field.field_type, targets);
    }
}

/// Render `{"type":"object","additionalProperties":false,...}` for the fields
/// visible to `operation`, in declaration order.
///
/// Create schemas list fields that are required and have no default; update
/// schemas never require anything.
pub(crate) fn object_schema(fields: &[FieldSpec], operation: Operation, ctx: &RenderContext) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for field in fields.iter().filter(|f| f.is_visible_for(operation)) {
        properties.insert(field.name.clone(), field.schema(operation, ctx));
        if operation == Operation::Create && field.is_required_on_create() {
            required.push(Value::String(field.name.clone()));
        }
    }

    let mut schema = type_schema("object");
    schema.insert("additionalProperties".into(), Value::Bool(false));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".into(), Value::Array(required));
    }
    Value::Object(schema)
}

/// Allow `null` in addition to what `schema` accepts.
pub fn make_nullable(schema: Value) -> Value {
    let Value::Object(mut map) = schema else {
        return schema;
    };

    if let Some(type_) = map.get_mut("type") {
        match type_ {
            Value::String(t) if t.as_str() != "null" => {
                *type_ = json!([t.clone(), "null"]);
            }
            Value::Array(types) if !types.contains(&json!("null")) => {
                types.push(json!("null"));
            }
            _ => {}
        }
        return Value::Object(map);
    }

    for key in ["oneOf", "anyOf"] {
        if let Some(Value::Array(branches)) = map.get_mut(key) {
            branches.push(json!({ "type": "null" }));
            return Value::Object(map);
        }
    }

    if map.contains_key("$ref") {
        return json!({ "anyOf": [Value::Object(map), { "type": "null" }] });
    }

    // No type constraint: null is already accepted.
    Value::Object(map)
}

fn type_schema(type_: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("type".into(), Value::String(type_.into()));
    map
}

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        map.insert(key.into(), value);
    }
}
