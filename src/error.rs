//! Error types for resource definitions, storage managers and API operations.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::types::{ItemId, Values, ID_KEY, TYPE_KEY};

/// Errors while loading or registering resource definitions.
#[derive(Debug, Error)]
pub enum DefinitionError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Definition errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("field \"{field}\" has an empty io set and can never be read or written")]
    DeadField { field: String },

    #[error("duplicate field name \"{field}\"")]
    DuplicateField { field: String },

    #[error("field name \"{field}\" is reserved: names starting with '$' are synthetic")]
    ReservedName { field: String },

    #[error("invalid schema for field \"{field}\": {message}")]
    InvalidFieldSchema { field: String, message: String },

    #[error("invalid resource name \"{name}\"")]
    InvalidResourceName { name: String },

    #[error("resource \"{name}\" is already registered")]
    DuplicateResource { name: String },

    #[error("unknown resource \"{name}\"")]
    UnknownResource { name: String },

    #[error("resource \"{resource}\" sorts by \"{field}\", which is not a readable field")]
    InvalidSort { resource: String, field: String },
}

impl DefinitionError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            DefinitionError::FileNotFound { .. } | DefinitionError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            DefinitionError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// Failures reported by a storage manager.
///
/// The engine translates `NotFound`, `Duplicate` and `PageNotFound` into
/// structured API errors; anything else becomes an internal error.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("item {id} not found")]
    NotFound { id: ItemId },

    #[error("duplicate value for {}", fields.join(", "))]
    Duplicate { fields: Vec<String> },

    #[error("page {page} not found")]
    PageNotFound { page: u64 },

    #[error("{message}")]
    Backend { message: String },
}

/// One segment of a path into a payload: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// A single violated rule, located by its path in the payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub path: Vec<PathSegment>,
    /// Name of the violated rule, e.g. `"required"` or `"minLength"`.
    pub rule: String,
    /// The rule's parameter as declared in the schema.
    pub param: Value,
}

impl Violation {
    pub fn new(path: Vec<PathSegment>, rule: impl Into<String>, param: Value) -> Self {
        Self {
            path,
            rule: rule.into(),
            param,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for (i, segment) in self.path.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", segment)?;
        }
        write!(f, ": violates {} ({})", self.rule, self.param)
    }
}

/// All violations found by one validation call.
///
/// Never empty: a validation that finds nothing returns the coerced values.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("validation failed with {} error(s)", .errors.len())]
pub struct ValidationError {
    root: Vec<PathSegment>,
    errors: Vec<Violation>,
}

impl ValidationError {
    /// Wrap the collected violations, or `None` when there are none.
    pub fn from_violations(errors: Vec<Violation>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self {
                root: Vec::new(),
                errors,
            })
        }
    }

    /// Prefix every reported path with `root`.
    ///
    /// Applied repeatedly, outer roots end up in front of inner ones.
    pub fn with_root(mut self, root: impl IntoIterator<Item = PathSegment>) -> Self {
        let mut prefix: Vec<PathSegment> = root.into_iter().collect();
        prefix.append(&mut self.root);
        self.root = prefix;
        self
    }

    pub fn errors(&self) -> &[Violation] {
        &self.errors
    }

    pub fn root(&self) -> &[PathSegment] {
        &self.root
    }

    /// The full path of a violation, root prefix included.
    pub fn complete_path(&self, violation: &Violation) -> Vec<PathSegment> {
        self.root
            .iter()
            .chain(violation.path.iter())
            .cloned()
            .collect()
    }

    /// Violations with their complete paths, in report order.
    pub fn violations(&self) -> impl Iterator<Item = Violation> + '_ {
        self.errors.iter().map(|v| Violation {
            path: self.complete_path(v),
            rule: v.rule.clone(),
            param: v.param.clone(),
        })
    }
}

/// Every failure an API operation can report, with its wire representation.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{resource} item not found")]
    ItemNotFound {
        resource: String,
        /// Absent for lookups by natural key.
        id: Option<ItemId>,
    },

    #[error("page not found")]
    PageNotFound,

    #[error("duplicate key")]
    DuplicateKey {
        /// Field values the caller attempted to write.
        data: Values,
    },

    #[error("invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ApiError {
    /// HTTP status code for this error kind.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Validation(_) | ApiError::InvalidJson { .. } => 400,
            ApiError::ItemNotFound { .. } | ApiError::PageNotFound => 404,
            ApiError::DuplicateKey { .. } => 409,
            ApiError::Internal { .. } => 500,
        }
    }

    /// Wire payload: `{status, message, ...kind-specific fields}`.
    ///
    /// Reads only state fixed at construction, so it cannot fail.
    pub fn to_payload(&self) -> Value {
        let status = self.status_code();
        let mut payload = json!({
            "status": status,
            "message": reason_phrase(status),
        });

        match self {
            ApiError::Validation(err) => {
                let errors: Vec<Value> = err
                    .violations()
                    .map(|v| {
                        json!({
                            "validationOf": { v.rule: v.param },
                            "path": v.path,
                        })
                    })
                    .collect();
                payload["errors"] = Value::Array(errors);
            }
            ApiError::ItemNotFound {
                resource,
                id: Some(id),
            } => {
                payload["item"] = json!({ TYPE_KEY: resource, ID_KEY: id });
            }
            ApiError::DuplicateKey { data } if !data.is_empty() => {
                payload["data"] = Value::Object(data.clone());
            }
            _ => {}
        }

        payload
    }
}

/// Standard reason phrase for the status codes the error model uses.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        404 => "Not Found",
        409 => "Conflict",
        _ => "Internal Server Error",
    }
}
