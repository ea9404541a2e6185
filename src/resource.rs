//! Resource definitions and registered resources.
//!
//! A [`ResourceDef`] is the declarative input: a name, meta options and the
//! field table. Registering it produces a [`Resource`], which owns the
//! checked fields and the schema view of every operation, derived once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::engine::ApiConfig;
use crate::error::DefinitionError;
use crate::field::{FieldSet, FieldSpec, RenderContext, SELF_REFERENCE};
use crate::manager::{Item, Sort};
use crate::types::{Io, ItemId, Operation, ID_KEY, TYPE_KEY, URI_KEY};
use crate::view::{SchemaSource, SchemaView};

/// JSON Hyper-Schema dialect of `described_by` documents.
pub const HYPER_SCHEMA: &str = "http://json-schema.org/draft-04/hyper-schema#";

/// Declarative definition of a resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<FieldSpec>,
    /// Default enumeration order when a query sets none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    /// Represent items with `$id` instead of `$uri`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_id: bool,
    /// Add `$type` to item representations.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_type: bool,
}

impl ResourceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            fields: Vec::new(),
            sort: None,
            include_id: false,
            include_type: false,
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn include_id(mut self) -> Self {
        self.include_id = true;
        self
    }

    pub fn include_type(mut self) -> Self {
        self.include_type = true;
        self
    }
}

/// A registered resource: checked fields plus the view of every operation.
#[derive(Debug)]
pub struct Resource {
    def: ResourceDef,
    fields: FieldSet,
    route: String,
    default_per_page: u64,
    max_per_page: u64,
    create: Arc<SchemaView>,
    read: Arc<SchemaView>,
    update: Arc<SchemaView>,
    enumerate: Arc<SchemaView>,
}

impl Resource {
    /// Check a definition and derive its views.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError` for an invalid name, an invalid field table,
    /// a field schema that cannot be compiled or a default sort on a field
    /// that is not readable.
    pub fn new(def: ResourceDef, config: &ApiConfig) -> Result<Self, DefinitionError> {
        if !is_valid_name(&def.name) {
            return Err(DefinitionError::InvalidResourceName {
                name: def.name.clone(),
            });
        }

        let fields = FieldSet::new(def.fields.clone())?;
        let ctx = RenderContext::new(def.name.clone(), config.prefix.clone());
        let derive = |op| SchemaView::derive(&fields, op, &ctx).map(Arc::new);
        let enumerate = derive(Operation::Enumerate)?;

        if let Some(sort) = &def.sort {
            if enumerate.property(&sort.field).is_none() {
                return Err(DefinitionError::InvalidSort {
                    resource: def.name.clone(),
                    field: sort.field.clone(),
                });
            }
        }

        Ok(Self {
            route: format!("{}/{}", config.prefix, def.name),
            default_per_page: config.default_per_page,
            max_per_page: config.max_per_page,
            create: derive(Operation::Create)?,
            read: derive(Operation::Read)?,
            update: derive(Operation::Update)?,
            enumerate,
            fields,
            def,
        })
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn def(&self) -> &ResourceDef {
        &self.def
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// Route of the collection, e.g. `/v1/foo`.
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn default_per_page(&self) -> u64 {
        self.default_per_page
    }

    pub fn max_per_page(&self) -> u64 {
        self.max_per_page
    }

    pub fn view(&self, operation: Operation) -> &Arc<SchemaView> {
        match operation {
            Operation::Create => &self.create,
            Operation::Read => &self.read,
            Operation::Update => &self.update,
            Operation::Enumerate => &self.enumerate,
        }
    }

    pub fn item_uri(&self, id: ItemId) -> String {
        format!("{}/{}", self.route, id)
    }

    /// Representation of a stored item for `operation`'s output.
    ///
    /// Self-reference keys come first, then the readable fields.
    pub fn represent(&self, item: &Item, operation: Operation, source: &dyn SchemaSource) -> Value {
        let view = match operation {
            Operation::Enumerate => &self.enumerate,
            _ => &self.read,
        };

        let mut output = Map::new();
        if self.def.include_id {
            output.insert(ID_KEY.into(), json!(item.id));
        } else {
            output.insert(URI_KEY.into(), json!(self.item_uri(item.id)));
        }
        if self.def.include_type {
            output.insert(TYPE_KEY.into(), json!(self.def.name));
        }
        output.extend(view.project(&item.values, source));
        Value::Object(output)
    }

    /// The `described_by` document: read properties plus one link per route.
    pub fn describe(&self) -> Value {
        let mut properties = Map::new();
        if self.def.include_id {
            properties.insert(ID_KEY.into(), json!({ "type": "integer", "readOnly": true }));
        } else {
            properties.insert(
                URI_KEY.into(),
                json!({
                    "type": "string",
                    "pattern": format!("^{}/[^/]+$", regex::escape(&self.route)),
                    "readOnly": true
                }),
            );
        }
        if self.def.include_type {
            properties.insert(TYPE_KEY.into(), json!({ "type": "string", "readOnly": true }));
        }
        for property in self.read.properties() {
            let mut schema = property.schema().clone();
            if !property.spec().io.contains(Io::CREATE) {
                if let Value::Object(map) = &mut schema {
                    map.insert("readOnly".into(), Value::Bool(true));
                }
            }
            properties.insert(property.name().to_string(), schema);
        }

        let mut doc = Map::new();
        doc.insert("$schema".into(), json!(HYPER_SCHEMA));
        if let Some(title) = &self.def.title {
            doc.insert("title".into(), json!(title));
        }
        if let Some(description) = &self.def.description {
            doc.insert("description".into(), json!(description));
        }
        doc.insert("type".into(), json!("object"));
        doc.insert("properties".into(), Value::Object(properties));
        if !self.create.required().is_empty() {
            doc.insert("required".into(), json!(self.create.required()));
        }
        doc.insert("links".into(), Value::Array(self.links()));
        Value::Object(doc)
    }

    fn links(&self) -> Vec<Value> {
        let item_href = format!("{}/{{id}}", self.route);
        vec![
            json!({ "rel": "self", "href": item_href, "method": "GET" }),
            json!({
                "rel": "instances",
                "href": self.route,
                "method": "GET",
                "schema": self.instances_schema()
            }),
            json!({
                "rel": "create",
                "href": self.route,
                "method": "POST",
                "schema": self.create_schema()
            }),
            json!({
                "rel": "update",
                "href": item_href,
                "method": "PATCH",
                "schema": self.update.to_json_schema()
            }),
            json!({ "rel": "destroy", "href": item_href, "method": "DELETE" }),
            json!({
                "rel": "describedBy",
                "href": format!("{}/schema", self.route),
                "method": "GET"
            }),
        ]
    }

    /// `{"$ref":"#"}` when the create input is exactly the writable part of
    /// the root document, the inlined create schema otherwise.
    fn create_schema(&self) -> Value {
        let same_as_root = self.create.properties().iter().all(|p| {
            self.read
                .property(p.name())
                .is_some_and(|r| r.schema() == p.schema())
        });
        if same_as_root {
            json!({ "$ref": "#" })
        } else {
            self.create.to_json_schema().clone()
        }
    }

    fn instances_schema(&self) -> Value {
        let sortable: Map<String, Value> = self
            .enumerate
            .names()
            .map(|name| (name.to_string(), json!({ "type": "boolean" })))
            .collect();

        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "page": { "type": "integer", "minimum": 1, "default": 1 },
                "per_page": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": self.max_per_page,
                    "default": self.default_per_page
                },
                "sort": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": sortable
                }
            }
        })
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != SELF_REFERENCE
        && name != "schema"
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
