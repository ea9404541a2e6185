//! API definition loading from various sources.
//!
//! Handles loading definitions and payloads from files, strings, and HTTP
//! URLs.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{Api, ApiConfig};
use crate::error::DefinitionError;
use crate::manager::{ManagerFactory, MemoryManager};
use crate::resource::ResourceDef;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Declarative description of a whole API.
///
/// ```json
/// {
///   "prefix": "/v1",
///   "resources": [
///     { "name": "foo", "fields": [{ "name": "name", "type": { "kind": "string" } }] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiDefinition {
    #[serde(flatten)]
    pub config: ApiConfig,
    #[serde(default)]
    pub resources: Vec<ResourceDef>,
}

impl ApiDefinition {
    /// Build an API with in-memory managers.
    ///
    /// Resources register in declaration order, so inline targets must be
    /// declared before the resources that embed them.
    ///
    /// # Errors
    ///
    /// Returns the first `DefinitionError` raised while registering.
    pub fn build(self) -> Result<Api, DefinitionError> {
        self.build_with(MemoryManager::factory())
    }

    /// Build an API whose resources get managers from `factory`.
    ///
    /// # Errors
    ///
    /// Returns the first `DefinitionError` raised while registering.
    pub fn build_with(self, factory: ManagerFactory) -> Result<Api, DefinitionError> {
        let mut api = Api::new(self.config, factory);
        for def in self.resources {
            api.add_resource(def)?;
        }
        Ok(api)
    }
}

/// Load a definition from a file path.
///
/// # Errors
///
/// Returns `DefinitionError::FileNotFound` if the file doesn't exist,
/// or `DefinitionError::InvalidJson` if the file isn't a valid definition.
pub fn load_definition(path: &Path) -> Result<ApiDefinition, DefinitionError> {
    let content = read_file(path)?;
    load_definition_str(&content)
}

/// Load a definition from a JSON string.
///
/// # Errors
///
/// Returns `DefinitionError::InvalidJson` if the string isn't a valid
/// definition.
pub fn load_definition_str(content: &str) -> Result<ApiDefinition, DefinitionError> {
    serde_json::from_str(content).map_err(|source| DefinitionError::InvalidJson { source })
}

/// Load a definition from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `DefinitionError::NetworkError` if the request fails or the
/// response isn't a valid definition.
#[cfg(feature = "remote")]
pub fn load_definition_url(url: &str) -> Result<ApiDefinition, DefinitionError> {
    let network = |source| DefinitionError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network)?;

    // Check for HTTP errors before parsing
    client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.json())
        .map_err(network)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a definition from a file path or URL.
///
/// Automatically detects whether the source is a URL or file path.
/// URL loading requires the `remote` feature.
///
/// # Errors
///
/// Returns appropriate errors based on the source type.
pub fn load_definition_auto(source: &str) -> Result<ApiDefinition, DefinitionError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_definition_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(DefinitionError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_definition(Path::new(source))
    }
}

/// Load a JSON payload from a file.
///
/// # Errors
///
/// Returns `DefinitionError::FileNotFound`, `DefinitionError::ReadError`
/// or `DefinitionError::InvalidJson`.
pub fn load_payload(path: &Path) -> Result<Value, DefinitionError> {
    let content = read_file(path)?;
    serde_json::from_str(&content).map_err(|source| DefinitionError::InvalidJson { source })
}

fn read_file(path: &Path) -> Result<String, DefinitionError> {
    if !path.exists() {
        return Err(DefinitionError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    std::fs::read_to_string(path).map_err(|source| DefinitionError::ReadError {
        path: path.to_path_buf(),
        source,
    })
}
