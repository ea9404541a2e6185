//! Declarative CRUD resources from typed field schemas.
//!
//! A resource is a named list of fields. Each field carries a value type and
//! an io set saying which operations may write (`c`reate, `u`pdate) or
//! `r`ead it. From that table the crate derives a reduced JSON Schema per
//! operation, validates payloads against it, hands the filtered values to a
//! pluggable storage [`Manager`], and reports every failure as an
//! [`ApiError`] with a fixed status code and JSON payload.
//!
//! # Example
//!
//! ```
//! use resource_schema::{Api, FieldSpec, FieldType, Io, ResourceDef};
//! use serde_json::json;
//!
//! let mut api = Api::default();
//! api.add_resource(
//!     ResourceDef::new("foo")
//!         .field(FieldSpec::new("name", FieldType::string()))
//!         .field(FieldSpec::new("secret", FieldType::string()).io(Io::CREATE))
//!         .field(FieldSpec::new("slug", FieldType::string()).io(Io::CREATE | Io::READ)),
//! )
//! .unwrap();
//!
//! let created = api
//!     .create("foo", &json!({ "name": "Foo", "secret": "mystery", "slug": "foo" }))
//!     .unwrap();
//! assert_eq!(created, json!({ "$uri": "/foo/1", "name": "Foo", "slug": "foo" }));
//!
//! // `secret` is create-only, so updating it is rejected
//! let err = api
//!     .update("foo", 1, &json!({ "name": "Bar", "secret": "123456" }))
//!     .unwrap_err();
//! assert_eq!(err.status_code(), 400);
//! ```
//!
//! # io Flags
//!
//! | Flags | Create input | Update input | Read / enumerate output |
//! |-------|--------------|--------------|-------------------------|
//! | `cru` (default) | yes | yes | yes |
//! | `cr` | yes | no | yes |
//! | `c` | yes | no | no |
//! | `r` | no | no | yes |
//! | `w` (= `cu`) | yes | yes | no |
//!
//! # Error Payloads
//!
//! | Error | Status | Extra payload keys |
//! |-------|--------|--------------------|
//! | `Validation` | 400 | `errors: [{validationOf, path}]` |
//! | `InvalidJson` | 400 | |
//! | `ItemNotFound` | 404 | `item: {$type, $id}` for id lookups |
//! | `PageNotFound` | 404 | |
//! | `DuplicateKey` | 409 | `data` |
//! | `Internal` | 500 | |

mod engine;
mod error;
mod field;
mod loader;
mod manager;
mod resource;
mod types;
mod validator;
mod view;

pub use engine::{parse_body, Api, ApiConfig};
pub use error::{
    reason_phrase, ApiError, DefinitionError, ManagerError, PathSegment, ValidationError,
    Violation,
};
pub use field::{make_nullable, FieldSet, FieldSpec, FieldType, RenderContext, SELF_REFERENCE};
pub use loader::{
    is_url, load_definition, load_definition_auto, load_definition_str, load_payload,
    ApiDefinition,
};
pub use manager::{Item, Manager, ManagerFactory, MemoryManager, Page, Query, Sort};
pub use resource::{Resource, ResourceDef, HYPER_SCHEMA};
pub use types::{Io, ItemId, Operation, Values, ID_KEY, TYPE_KEY, URI_KEY};
pub use validator::{validate, validate_at};
pub use view::{Check, SchemaSource, SchemaView, Shape, ViewProperty};

#[cfg(feature = "remote")]
pub use loader::load_definition_url;
