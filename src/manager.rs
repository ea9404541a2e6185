//! Storage managers.
//!
//! The engine treats a manager as an opaque synchronous backend: it may fail,
//! but ordering, pagination and persistence are its own business.
//! [`MemoryManager`] keeps items in memory and is the default backend.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ManagerError;
use crate::resource::ResourceDef;
use crate::types::{ItemId, Values};

/// A stored item: its id and every stored field value.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub values: Values,
}

/// Ordering requested for an enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Parameters of an enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// `None` leaves the order to the manager (insertion order for
    /// [`MemoryManager`]).
    pub sort: Option<Sort>,
    /// 1-based page number.
    pub page: u64,
    pub per_page: u64,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            sort: None,
            page: 1,
            per_page: 20,
        }
    }
}

impl Query {
    pub fn sorted(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn page(mut self, page: u64, per_page: u64) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }
}

/// One page of an enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

/// Storage backend of one resource.
pub trait Manager: Send + Sync {
    /// Store a new item.
    ///
    /// Fails with `ManagerError::Duplicate` when a unique field collides.
    fn create(&self, values: Values) -> Result<Item, ManagerError>;

    fn fetch(&self, id: ItemId) -> Result<Option<Item>, ManagerError>;

    /// Look an item up by a natural-key field.
    fn find_by(&self, field: &str, value: &Value) -> Result<Option<Item>, ManagerError>;

    /// Replace the stored values of an existing item.
    fn update(&self, id: ItemId, values: Values) -> Result<Item, ManagerError>;

    /// Remove an item; `false` when it did not exist.
    fn delete(&self, id: ItemId) -> Result<bool, ManagerError>;

    /// Enumerate items in a stable order.
    ///
    /// Fails with `ManagerError::PageNotFound` when `query.page` lies past
    /// the last page (page 1 of an empty set is valid).
    fn list(&self, query: &Query) -> Result<Page, ManagerError>;
}

/// Builds the manager of a resource at registration time.
pub type ManagerFactory = Arc<dyn Fn(&ResourceDef) -> Box<dyn Manager> + Send + Sync>;

#[derive(Debug, Default)]
struct MemoryStore {
    items: BTreeMap<ItemId, Values>,
    next_id: ItemId,
}

/// In-memory manager with sequential ids starting at 1.
///
/// Fields listed as unique (natural keys by default) reject duplicate values.
#[derive(Debug, Default)]
pub struct MemoryManager {
    store: RwLock<MemoryStore>,
    unique: Vec<String>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce uniqueness of values stored under `fields`.
    pub fn with_unique(mut self, fields: Vec<String>) -> Self {
        self.unique = fields;
        self
    }

    /// Factory building one manager per resource, unique on its natural keys.
    pub fn factory() -> ManagerFactory {
        Arc::new(|def: &ResourceDef| {
            let unique = def
                .fields
                .iter()
                .filter(|f| f.natural_key)
                .map(|f| f.name.clone())
                .collect();
            Box::new(MemoryManager::new().with_unique(unique)) as Box<dyn Manager>
        })
    }

    fn conflicts(&self, store: &MemoryStore, values: &Values, except: Option<ItemId>) -> Vec<String> {
        self.unique
            .iter()
            .filter(|field| match values.get(field.as_str()) {
                Some(Value::Null) | None => false,
                Some(value) => store
                    .items
                    .iter()
                    .any(|(id, item)| Some(*id) != except && item.get(field.as_str()) == Some(value)),
            })
            .cloned()
            .collect()
    }
}

fn poisoned() -> ManagerError {
    ManagerError::Backend {
        message: "memory store lock poisoned".into(),
    }
}

impl Manager for MemoryManager {
    fn create(&self, values: Values) -> Result<Item, ManagerError> {
        let mut store = self.store.write().map_err(|_| poisoned())?;

        let fields = self.conflicts(&store, &values, None);
        if !fields.is_empty() {
            return Err(ManagerError::Duplicate { fields });
        }

        store.next_id += 1;
        let id = store.next_id;
        store.items.insert(id, values.clone());
        Ok(Item { id, values })
    }

    fn fetch(&self, id: ItemId) -> Result<Option<Item>, ManagerError> {
        let store = self.store.read().map_err(|_| poisoned())?;
        Ok(store.items.get(&id).map(|values| Item {
            id,
            values: values.clone(),
        }))
    }

    fn find_by(&self, field: &str, value: &Value) -> Result<Option<Item>, ManagerError> {
        let store = self.store.read().map_err(|_| poisoned())?;
        Ok(store
            .items
            .iter()
            .find(|(_, values)| values.get(field) == Some(value))
            .map(|(id, values)| Item {
                id: *id,
                values: values.clone(),
            }))
    }

    fn update(&self, id: ItemId, values: Values) -> Result<Item, ManagerError> {
        let mut store = self.store.write().map_err(|_| poisoned())?;
        if !store.items.contains_key(&id) {
            return Err(ManagerError::NotFound { id });
        }

        let fields = self.conflicts(&store, &values, Some(id));
        if !fields.is_empty() {
            return Err(ManagerError::Duplicate { fields });
        }

        store.items.insert(id, values.clone());
        Ok(Item { id, values })
    }

    fn delete(&self, id: ItemId) -> Result<bool, ManagerError> {
        let mut store = self.store.write().map_err(|_| poisoned())?;
        Ok(store.items.remove(&id).is_some())
    }

    fn list(&self, query: &Query) -> Result<Page, ManagerError> {
        let store = self.store.read().map_err(|_| poisoned())?;

        // BTreeMap iteration is id order, i.e. insertion order.
        let mut items: Vec<Item> = store
            .items
            .iter()
            .map(|(id, values)| Item {
                id: *id,
                values: values.clone(),
            })
            .collect();

        if let Some(sort) = &query.sort {
            // sort_by is stable: equal keys keep insertion order.
            items.sort_by(|a, b| {
                let ordering = compare_values(a.values.get(&sort.field), b.values.get(&sort.field));
                if sort.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let total = items.len() as u64;
        let per_page = query.per_page.max(1);
        let start = query.page.saturating_sub(1).saturating_mul(per_page);
        if query.page > 1 && start >= total {
            return Err(ManagerError::PageNotFound { page: query.page });
        }

        let items = items
            .into_iter()
            .skip(usize::try_from(start).unwrap_or(usize::MAX))
            .take(usize::try_from(per_page).unwrap_or(usize::MAX))
            .collect();

        Ok(Page {
            items,
            page: query.page,
            per_page,
            total,
        })
    }
}

/// Total order over optional JSON values used for sorting.
///
/// Missing and `null` sort first, then booleans, numbers, strings; arrays and
/// objects compare equal to each other.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) | Some(Value::Object(_)) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
