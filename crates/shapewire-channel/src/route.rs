use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use shapewire_schema::Schema;

use crate::error::{ChannelError, Result};

/// Upper bound on routes files read from disk.
const MAX_ROUTES_FILE_SIZE: u64 = 1024 * 1024;

/// A named request/response schema pair. Immutable once created.
#[derive(Debug, Clone)]
pub struct Route {
    name: String,
    request: Arc<Schema>,
    response: Arc<Schema>,
}

impl Route {
    pub fn new(name: impl Into<String>, request: Schema, response: Schema) -> Self {
        Self {
            name: name.into(),
            request: Arc::new(request),
            response: Arc::new(response),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request(&self) -> &Schema {
        &self.request
    }

    pub fn response(&self) -> &Schema {
        &self.response
    }
}

/// Route table keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Routes {
    routes: BTreeMap<String, Route>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route. Fails if the name is taken.
    pub fn insert(&mut self, route: Route) -> Result<()> {
        if self.routes.contains_key(route.name()) {
            return Err(ChannelError::DuplicateRoute(route.name));
        }
        self.routes.insert(route.name.clone(), route);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Route> {
        self.routes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Route names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    /// Parse a routes document:
    ///
    /// ```json
    /// { "users.get": { "request": { "id": "number" }, "response": { "name": "string" } } }
    /// ```
    pub fn from_json_value(document: &Value) -> Result<Self> {
        let entries = document
            .as_object()
            .ok_or_else(|| ChannelError::InvalidRoutes("document must be an object".into()))?;

        let mut routes = Self::new();
        for (name, entry) in entries {
            let schema_at = |key: &str| -> Result<Schema> {
                let value = entry.get(key).ok_or_else(|| {
                    ChannelError::InvalidRoutes(format!("route {name} is missing {key:?}"))
                })?;
                Ok(Schema::parse(value)?)
            };
            routes.insert(Route::new(
                name.clone(),
                schema_at("request")?,
                schema_at("response")?,
            ))?;
        }
        Ok(routes)
    }

    pub fn from_json_str(document: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(document)?;
        Self::from_json_value(&value)
    }

    /// Load a routes document from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let read_err = |source: std::io::Error| ChannelError::Read {
            path: path.to_path_buf(),
            source,
        };
        let metadata = std::fs::metadata(path).map_err(read_err)?;
        if metadata.len() > MAX_ROUTES_FILE_SIZE {
            return Err(ChannelError::InvalidRoutes(format!(
                "{} exceeds {MAX_ROUTES_FILE_SIZE} bytes",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path).map_err(read_err)?;
        Self::from_json_str(&text)
    }
}
