//! The resource engine.
//!
//! [`Api`] is the registry of resources. Each operation derives nothing at
//! request time: it picks the cached view, validates the payload against it,
//! delegates to the resource's manager and turns every failure into an
//! [`ApiError`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{ApiError, DefinitionError, ManagerError, PathSegment, ValidationError, Violation};
use crate::field::SELF_REFERENCE;
use crate::manager::{Manager, ManagerFactory, MemoryManager, Query};
use crate::resource::{Resource, ResourceDef};
use crate::types::{ItemId, Operation, Values};
use crate::validator::validate;
use crate::view::{SchemaSource, SchemaView};

/// Settings shared by every resource of an API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Route prefix, e.g. `/v1`. Empty routes resources at `/<name>`.
    pub prefix: String,
    pub default_per_page: u64,
    pub max_per_page: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            default_per_page: 20,
            max_per_page: 100,
        }
    }
}

struct Registered {
    resource: Resource,
    manager: Box<dyn Manager>,
}

/// A set of registered resources and the manager backing each.
pub struct Api {
    config: ApiConfig,
    default_manager: ManagerFactory,
    resources: BTreeMap<String, Registered>,
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("config", &self.config)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Api {
    fn default() -> Self {
        Self::new(ApiConfig::default(), MemoryManager::factory())
    }
}

impl Api {
    /// Create an empty API whose resources get managers from `default_manager`.
    pub fn new(config: ApiConfig, default_manager: ManagerFactory) -> Self {
        Self {
            config,
            default_manager,
            resources: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Register a resource backed by the default manager.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError` when the definition is invalid, the name is
    /// taken, or an inline field targets a resource not registered yet.
    pub fn add_resource(&mut self, def: ResourceDef) -> Result<&Resource, DefinitionError> {
        let manager = (self.default_manager)(&def);
        self.add_resource_with_manager(def, manager)
    }

    /// Register a resource backed by a specific manager.
    ///
    /// # Errors
    ///
    /// Same as [`Api::add_resource`].
    pub fn add_resource_with_manager(
        &mut self,
        def: ResourceDef,
        manager: Box<dyn Manager>,
    ) -> Result<&Resource, DefinitionError> {
        if self.resources.contains_key(&def.name) {
            return Err(DefinitionError::DuplicateResource { name: def.name });
        }

        let resource = Resource::new(def, &self.config)?;
        for target in resource.fields().inline_targets() {
            if target != SELF_REFERENCE
                && target != resource.name()
                && !self.resources.contains_key(&target)
            {
                return Err(DefinitionError::UnknownResource { name: target });
            }
        }

        info!(
            resource = resource.name(),
            route = resource.route(),
            fields = resource.fields().len(),
            "registered resource"
        );

        let name = resource.name().to_string();
        let entry = self
            .resources
            .entry(name)
            .or_insert(Registered { resource, manager });
        Ok(&entry.resource)
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name).map(|r| &r.resource)
    }

    /// Registered resource names, sorted.
    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    fn registered(&self, name: &str) -> Result<&Registered, ApiError> {
        self.resources.get(name).ok_or(ApiError::PageNotFound)
    }

    /// JSON Schema of `resource`'s view for `operation`.
    ///
    /// # Errors
    ///
    /// `ApiError::PageNotFound` for an unknown resource.
    pub fn schema(&self, resource: &str, operation: Operation) -> Result<&Value, ApiError> {
        let registered = self.registered(resource)?;
        Ok(registered.resource.view(operation).to_json_schema())
    }

    /// Validate a payload for `operation` without touching the manager.
    ///
    /// Returns the filtered values: defaults filled on create, unknown keys
    /// rejected.
    ///
    /// # Errors
    ///
    /// `ApiError::Validation` listing every violation, or
    /// `ApiError::PageNotFound` for an unknown resource.
    pub fn validate(
        &self,
        resource: &str,
        operation: Operation,
        payload: &Value,
    ) -> Result<Values, ApiError> {
        let registered = self.registered(resource)?;
        Ok(validate(registered.resource.view(operation), payload, self)?)
    }

    /// Create an item and return its read representation.
    ///
    /// # Errors
    ///
    /// `Validation` for an invalid payload, `DuplicateKey` when a unique
    /// field collides, `Internal` for other manager failures.
    pub fn create(&self, resource: &str, payload: &Value) -> Result<Value, ApiError> {
        debug!(resource, "create");
        let Registered { resource, manager } = self.registered(resource)?;

        let values = validate(resource.view(Operation::Create), payload, self)?;
        let item = manager
            .create(values.clone())
            .map_err(|e| manager_error(resource, e, &values))?;

        Ok(resource.represent(&item, Operation::Read, self))
    }

    /// Read one item by id.
    ///
    /// # Errors
    ///
    /// `ItemNotFound` carrying the id when no such item exists.
    pub fn read(&self, resource: &str, id: ItemId) -> Result<Value, ApiError> {
        debug!(resource, id, "read");
        let Registered { resource, manager } = self.registered(resource)?;

        let item = manager
            .fetch(id)
            .map_err(|e| manager_error(resource, e, &Values::new()))?
            .ok_or_else(|| not_found(resource, Some(id)))?;

        Ok(resource.represent(&item, Operation::Read, self))
    }

    /// Read one item by a natural-key field.
    ///
    /// # Errors
    ///
    /// `ItemNotFound` without an id when no item matches, or when `field` is
    /// not a natural key of the resource.
    pub fn read_by_key(&self, resource: &str, field: &str, value: &Value) -> Result<Value, ApiError> {
        debug!(resource, field, "read by key");
        let Registered { resource, manager } = self.registered(resource)?;

        if !resource.fields().get(field).is_some_and(|f| f.natural_key) {
            return Err(not_found(resource, None));
        }

        let item = manager
            .find_by(field, value)
            .map_err(|e| manager_error(resource, e, &Values::new()))?
            .ok_or_else(|| not_found(resource, None))?;

        Ok(resource.represent(&item, Operation::Read, self))
    }

    /// Apply a partial update to an item.
    ///
    /// Only supplied keys are validated; they replace the stored values of
    /// the same name, except that nested objects merge field by field.
    ///
    /// # Errors
    ///
    /// `ItemNotFound` for a missing item, `Validation` for an invalid or
    /// non-updatable key, `DuplicateKey` on a unique-field collision.
    pub fn update(&self, resource: &str, id: ItemId, payload: &Value) -> Result<Value, ApiError> {
        debug!(resource, id, "update");
        let Registered { resource, manager } = self.registered(resource)?;

        let item = manager
            .fetch(id)
            .map_err(|e| manager_error(resource, e, &Values::new()))?
            .ok_or_else(|| not_found(resource, Some(id)))?;

        let changes = validate(resource.view(Operation::Update), payload, self)?;
        let mut values = item.values;
        resource
            .view(Operation::Update)
            .merge(&mut values, changes.clone());

        let item = manager
            .update(id, values)
            .map_err(|e| manager_error(resource, e, &changes))?;

        Ok(resource.represent(&item, Operation::Read, self))
    }

    /// Delete an item.
    ///
    /// # Errors
    ///
    /// `ItemNotFound` when no such item exists.
    pub fn delete(&self, resource: &str, id: ItemId) -> Result<(), ApiError> {
        debug!(resource, id, "delete");
        let Registered { resource, manager } = self.registered(resource)?;

        let deleted = manager
            .delete(id)
            .map_err(|e| manager_error(resource, e, &Values::new()))?;
        if deleted {
            Ok(())
        } else {
            Err(not_found(resource, Some(id)))
        }
    }

    /// List one page of items.
    ///
    /// Without an explicit sort the resource's default sort applies, then
    /// the manager's natural order.
    ///
    /// # Errors
    ///
    /// `Validation` for an unreadable sort field or out-of-range paging,
    /// `PageNotFound` past the last page.
    pub fn enumerate(&self, resource: &str, query: &Query) -> Result<Vec<Value>, ApiError> {
        debug!(resource, page = query.page, per_page = query.per_page, "enumerate");
        let Registered { resource, manager } = self.registered(resource)?;

        check_query(resource, query)?;
        let mut query = query.clone();
        if query.sort.is_none() {
            query.sort = resource.def().sort.clone();
        }

        let page = manager
            .list(&query)
            .map_err(|e| manager_error(resource, e, &Values::new()))?;

        Ok(page
            .items
            .iter()
            .map(|item| resource.represent(item, Operation::Enumerate, self))
            .collect())
    }

    /// The hyper-schema document of a resource.
    ///
    /// # Errors
    ///
    /// `ApiError::PageNotFound` for an unknown resource.
    pub fn describe(&self, resource: &str) -> Result<Value, ApiError> {
        debug!(resource, "describe");
        Ok(self.registered(resource)?.resource.describe())
    }
}

impl SchemaSource for Api {
    fn view(&self, resource: &str, operation: Operation) -> Option<Arc<SchemaView>> {
        self.resource(resource)
            .map(|r| Arc::clone(r.view(operation)))
    }
}

/// Parse a request body.
///
/// # Errors
///
/// `ApiError::InvalidJson` when the body is not valid JSON.
pub fn parse_body(body: &str) -> Result<Value, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::InvalidJson {
        message: e.to_string(),
    })
}

fn check_query(resource: &Resource, query: &Query) -> Result<(), ValidationError> {
    let mut violations = Vec::new();

    if query.page < 1 {
        violations.push(Violation::new(vec![PathSegment::from("page")], "minimum", json!(1)));
    }
    if query.per_page < 1 {
        violations.push(Violation::new(
            vec![PathSegment::from("per_page")],
            "minimum",
            json!(1),
        ));
    } else if query.per_page > resource.max_per_page() {
        violations.push(Violation::new(
            vec![PathSegment::from("per_page")],
            "maximum",
            json!(resource.max_per_page()),
        ));
    }
    if let Some(sort) = &query.sort {
        let view = resource.view(Operation::Enumerate);
        if view.property(&sort.field).is_none() {
            violations.push(Violation::new(
                vec![PathSegment::from("sort")],
                "enum",
                json!(view.names().collect::<Vec<_>>()),
            ));
        }
    }

    match ValidationError::from_violations(violations) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn not_found(resource: &Resource, id: Option<ItemId>) -> ApiError {
    ApiError::ItemNotFound {
        resource: resource.name().to_string(),
        id,
    }
}

/// The single translation point from manager failures to API errors.
fn manager_error(resource: &Resource, err: ManagerError, attempted: &Values) -> ApiError {
    match err {
        ManagerError::NotFound { id } => not_found(resource, Some(id)),
        ManagerError::PageNotFound { .. } => ApiError::PageNotFound,
        ManagerError::Duplicate { fields } if fields.is_empty() => ApiError::DuplicateKey {
            data: attempted.clone(),
        },
        ManagerError::Duplicate { fields } => ApiError::DuplicateKey {
            data: fields
                .into_iter()
                .filter_map(|f| attempted.get(&f).cloned().map(|v| (f, v)))
                .collect(),
        },
        ManagerError::Backend { message } => {
            warn!(resource = resource.name(), error = %message, "manager failure");
            ApiError::Internal { message }
        }
    }
}
