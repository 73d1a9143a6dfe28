use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::LoaderConfig;
use crate::error::{Result, SchemaError};
use crate::schema::Schema;
use crate::token::{ScalarKind, MAP_KEYWORD};

const SCHEMA_FILE_SUFFIX: &str = ".schema.json";
const RESERVED_SIGILS: [char; 6] = ['$', '#', '\'', '"', '`', '.'];

/// A named custom predicate.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Something a `#Name` token checks values against.
pub trait Capability: Send + Sync {
    /// Returns true if `value` is an instance of this capability.
    fn admits(&self, value: &Value) -> bool;
}

impl<F> Capability for F
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    fn admits(&self, value: &Value) -> bool {
        self(value)
    }
}

/// Named custom predicates owned by a validator.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    predicates: HashMap<String, Predicate>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named predicate usable as a bare type token.
    pub fn register<F>(&mut self, name: &str, predicate: F) -> Result<()>
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        validate_type_name(name)?;
        if self.predicates.contains_key(name) {
            return Err(SchemaError::InvalidRegistration {
                name: name.to_string(),
                message: "already registered".to_string(),
            });
        }
        self.predicates.insert(name.to_string(), Arc::new(predicate));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Predicate> {
        self.predicates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.predicates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("predicates", &self.names())
            .finish()
    }
}

fn validate_type_name(name: &str) -> Result<()> {
    let reject = |message: &str| {
        Err(SchemaError::InvalidRegistration {
            name: name.to_string(),
            message: message.to_string(),
        })
    };

    if name.is_empty() {
        return reject("name must not be empty");
    }
    if name.starts_with(RESERVED_SIGILS) {
        return reject("name must not start with a reference or literal sigil");
    }
    if name
        .chars()
        .any(|ch| ch.is_whitespace() || matches!(ch, ',' | '(' | ')' | '[' | ']'))
    {
        return reject("name must not contain whitespace, commas or brackets");
    }
    if ScalarKind::from_name(name).is_some() || name == MAP_KEYWORD || name == "enum" {
        return reject("name collides with a built-in type");
    }
    Ok(())
}

/// Reference table for `$Name` schemas and `#Name` capabilities.
///
/// Names are stored with their sigil, exactly as they appear in type tokens.
#[derive(Clone, Default)]
pub struct References {
    schemas: HashMap<String, Arc<Schema>>,
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl References {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `$Name` record schema. A missing `$` is added.
    pub fn add_schema(&mut self, name: &str, schema: Schema) -> &mut Self {
        self.schemas.insert(with_sigil('$', name), Arc::new(schema));
        self
    }

    /// Parse and add a `$Name` record schema.
    pub fn add_schema_value(&mut self, name: &str, schema: &Value) -> Result<&mut Self> {
        let parsed = Schema::parse(schema)?;
        Ok(self.add_schema(name, parsed))
    }

    /// Add a `#Name` capability. A missing `#` is added.
    pub fn add_capability<C>(&mut self, name: &str, capability: C) -> &mut Self
    where
        C: Capability + 'static,
    {
        self.capabilities
            .insert(with_sigil('#', name), Arc::new(capability));
        self
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name).map(Arc::as_ref)
    }

    pub fn capability(&self, name: &str) -> Option<&dyn Capability> {
        self.capabilities.get(name).map(Arc::as_ref)
    }

    /// `$` names with a registered schema, sorted.
    pub fn schema_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Merge another table into this one. Entries from `other` win.
    pub fn extend(&mut self, other: &References) {
        for (name, schema) in &other.schemas {
            self.schemas.insert(name.clone(), Arc::clone(schema));
        }
        for (name, capability) in &other.capabilities {
            self.capabilities.insert(name.clone(), Arc::clone(capability));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty() && self.capabilities.is_empty()
    }

    /// Load `<Name>.schema.json` files from a directory as `$Name` schemas.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, LoaderConfig::default())
    }

    /// Load schemas from a directory with explicit limits.
    pub fn from_directory_with_config(path: &Path, config: LoaderConfig) -> Result<Self> {
        let mut references = Self::new();
        let mut loaded_schema_count = 0usize;

        let entries = std::fs::read_dir(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;

        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let Some(stem) = file_name.strip_suffix(SCHEMA_FILE_SUFFIX) else {
                continue;
            };
            let entry_path = entry.path();
            let path_metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_type = path_metadata.file_type();

            if file_type.is_symlink() {
                return Err(SchemaError::LoadFailed(format!(
                    "refusing to load schema symlink: {file_name}"
                )));
            }
            if !file_type.is_file() {
                continue;
            }
            if stem.is_empty() || stem.starts_with(RESERVED_SIGILS) {
                return Err(SchemaError::LoadFailed(format!(
                    "unusable schema filename: {file_name}"
                )));
            }

            loaded_schema_count = loaded_schema_count.saturating_add(1);
            if loaded_schema_count > config.max_schemas_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "schema count exceeds configured max ({}): {}",
                    config.max_schemas_from_directory, loaded_schema_count
                )));
            }

            let content = read_limited(&entry_path, config.max_schema_file_size)?;
            let value: Value = serde_json::from_str(&content)?;
            references.add_schema_value(stem, &value)?;
            debug!(name = %with_sigil('$', stem), "loaded reference schema");
        }

        Ok(references)
    }
}

impl fmt::Debug for References {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut capabilities: Vec<&str> = self.capabilities.keys().map(String::as_str).collect();
        capabilities.sort_unstable();
        f.debug_struct("References")
            .field("schemas", &self.schema_names())
            .field("capabilities", &capabilities)
            .finish()
    }
}

pub(crate) fn with_sigil(sigil: char, name: &str) -> String {
    if name.starts_with(sigil) {
        name.to_string()
    } else {
        format!("{sigil}{name}")
    }
}

fn read_limited(path: &Path, max_bytes: usize) -> Result<String> {
    let file = std::fs::File::open(path).map_err(|err| {
        SchemaError::LoadFailed(format!("failed opening schema {}: {err}", path.display()))
    })?;
    let metadata = file
        .metadata()
        .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
    if metadata.len() > max_bytes as u64 {
        return Err(SchemaError::LoadFailed(format!(
            "schema file too large ({} bytes): {}",
            metadata.len(),
            path.display()
        )));
    }

    let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
    let mut content = String::new();
    file.take(read_limit)
        .read_to_string(&mut content)
        .map_err(|err| {
            SchemaError::LoadFailed(format!("failed reading schema {}: {err}", path.display()))
        })?;
    if content.len() > max_bytes {
        return Err(SchemaError::LoadFailed(format!(
            "schema file too large while reading: {}",
            path.display()
        )));
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;

    const NODE_SCHEMA: &str = r#"{
        "name": "string",
        "children": { "type": ["$node"], "optional": true }
    }"#;

    #[test]
    fn register_rejects_bad_names() {
        let mut registry = TypeRegistry::new();
        for name in ["", "$x", "#x", "'x'", ".x", "a b", "a,b", "string", "map", "enum"] {
            assert!(
                matches!(
                    registry.register(name, |_| true),
                    Err(SchemaError::InvalidRegistration { .. })
                ),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = TypeRegistry::new();
        registry.register("uuid", |v| v.is_string()).unwrap();
        assert!(registry.contains("uuid"));
        assert!(matches!(
            registry.register("uuid", |_| true),
            Err(SchemaError::InvalidRegistration { .. })
        ));
        assert_eq!(registry.names(), vec!["uuid"]);
    }

    #[test]
    fn references_store_names_with_sigils() {
        let mut references = References::new();
        references
            .add_schema_value("node", &json!({ "name": "string" }))
            .unwrap();
        references.add_capability("#Even", |v: &Value| {
            v.as_i64().map(|n| n % 2 == 0).unwrap_or(false)
        });

        assert!(references.schema("$node").is_some());
        assert!(references.schema("node").is_none());
        let even = references.capability("#Even").unwrap();
        assert!(even.admits(&json!(4)));
        assert!(!even.admits(&json!(3)));
    }

    #[test]
    fn extend_overrides_entries() {
        let mut base = References::new();
        base.add_schema_value("$a", &json!({ "x": "string" })).unwrap();
        let mut other = References::new();
        other.add_schema_value("$a", &json!({ "y": "number" })).unwrap();
        other.add_schema_value("$b", &json!({})).unwrap();

        base.extend(&other);
        assert_eq!(base.schema_names(), vec!["$a", "$b"]);
        assert!(base.schema("$a").unwrap().field("y").is_some());
    }

    #[test]
    fn from_directory_loads_schema_files() {
        let dir = make_temp_schema_dir("from-directory");
        write_schema(&dir, "node.schema.json", NODE_SCHEMA);
        write_schema(&dir, "ignored.json", NODE_SCHEMA);

        let references = References::from_directory(&dir).unwrap();
        assert_eq!(references.schema_names(), vec!["$node"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn from_directory_rejects_malformed_schema() {
        let dir = make_temp_schema_dir("malformed");
        write_schema(&dir, "bad.schema.json", r#"{"m": {"type": "map"}}"#);

        let result = References::from_directory(&dir);
        assert!(matches!(result, Err(SchemaError::MalformedMap { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn schema_count_limit_is_enforced() {
        let dir = make_temp_schema_dir("count-limit");
        write_schema(&dir, "a.schema.json", NODE_SCHEMA);
        write_schema(&dir, "b.schema.json", NODE_SCHEMA);

        let config = LoaderConfig {
            max_schemas_from_directory: 1,
            ..LoaderConfig::default()
        };
        let result = References::from_directory_with_config(&dir, config);
        assert!(matches!(result, Err(SchemaError::LoadFailed(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn schema_file_size_limit_is_enforced() {
        let dir = make_temp_schema_dir("size-limit");
        write_schema(&dir, "node.schema.json", NODE_SCHEMA);

        let config = LoaderConfig {
            max_schema_file_size: 8,
            ..LoaderConfig::default()
        };
        let result = References::from_directory_with_config(&dir, config);
        assert!(matches!(result, Err(SchemaError::LoadFailed(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_schema_is_rejected() {
        let dir = make_temp_schema_dir("symlink");
        let target = dir.join("target.json");
        std::fs::write(&target, NODE_SCHEMA.as_bytes()).unwrap();
        std::os::unix::fs::symlink(&target, dir.join("node.schema.json")).unwrap();

        let result = References::from_directory(&dir);
        assert!(matches!(result, Err(SchemaError::LoadFailed(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    fn make_temp_schema_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "shapewire-schema-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_schema(dir: &Path, file_name: &str, contents: &str) {
        std::fs::write(dir.join(file_name), contents.as_bytes()).unwrap();
    }
}
