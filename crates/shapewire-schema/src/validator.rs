use std::fmt;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ValidatorConfig;
use crate::error::{Result, SchemaError};
use crate::registry::{References, TypeRegistry};
use crate::render::render_value;
use crate::schema::{FieldSpec, Schema};
use crate::token::TypeToken;

const ROOT_PATH: &str = "$";

/// Why a value did not satisfy its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Location of the offending value, e.g. `$.children[2].name`.
    pub path: String,
    /// Human-readable reason.
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// Result of checking a value against a schema.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(Violation),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Self::Valid => None,
            Self::Invalid(violation) => Some(violation),
        }
    }

    pub fn into_result(self) -> std::result::Result<(), Violation> {
        match self {
            Self::Valid => Ok(()),
            Self::Invalid(violation) => Err(violation),
        }
    }
}

type Outcome = std::result::Result<(), Violation>;

/// Structural type-checker for JSON values.
///
/// A validator owns its custom predicate registry; reference tables are passed
/// per call so one validator can serve many schema sets.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    registry: TypeRegistry,
    config: ValidatorConfig,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self::with_registry(TypeRegistry::new(), config)
    }

    pub fn with_registry(registry: TypeRegistry, config: ValidatorConfig) -> Self {
        Self { registry, config }
    }

    /// Register a named predicate on this validator's registry.
    pub fn register_type<F>(&mut self, name: &str, predicate: F) -> Result<()>
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.registry.register(name, predicate)
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Check `value` against a record schema.
    ///
    /// Mismatches are reported as [`Verdict::Invalid`]. `Err` is returned only
    /// for configuration faults: unresolvable `$`/`#` references and unknown
    /// type names.
    pub fn check(&self, value: &Value, schema: &Schema, references: &References) -> Result<Verdict> {
        let outcome = match value {
            Value::Object(object) => {
                let walk = Walk {
                    registry: &self.registry,
                    config: &self.config,
                    references,
                };
                walk.record(object, schema, ROOT_PATH, 0)?
            }
            other => Err(Violation {
                path: ROOT_PATH.to_string(),
                reason: format!(
                    "expected an object, got {}",
                    render_value(other, self.config.render_limit)
                ),
            }),
        };

        Ok(self.finish(outcome))
    }

    /// Check a single value against a type token.
    pub fn check_token(
        &self,
        value: &Value,
        token: &TypeToken,
        references: &References,
    ) -> Result<Verdict> {
        let walk = Walk {
            registry: &self.registry,
            config: &self.config,
            references,
        };
        let outcome = walk.value(value, token, ROOT_PATH, 0)?;
        Ok(self.finish(outcome))
    }

    fn finish(&self, outcome: Outcome) -> Verdict {
        match outcome {
            Ok(()) => Verdict::Valid,
            Err(violation) => {
                debug!(path = %violation.path, reason = %violation.reason, "value rejected by schema");
                Verdict::Invalid(violation)
            }
        }
    }
}

/// Check `value` with a default validator.
pub fn check(value: &Value, schema: &Schema, references: &References) -> Result<Verdict> {
    Validator::new().check(value, schema, references)
}

struct Walk<'a> {
    registry: &'a TypeRegistry,
    config: &'a ValidatorConfig,
    references: &'a References,
}

impl Walk<'_> {
    fn record(
        &self,
        object: &Map<String, Value>,
        schema: &Schema,
        path: &str,
        depth: usize,
    ) -> Result<Outcome> {
        if depth > self.config.max_depth {
            return Ok(Err(self.too_deep(path)));
        }

        for field in schema.fields() {
            let field_path = format!("{path}.{}", field.name);
            let Some(found) = lookup(object, field) else {
                if field.optional {
                    continue;
                }
                return Ok(Err(Violation {
                    path: field_path,
                    reason: format!("missing property: {}", field.name),
                }));
            };

            let outcome = self.value(found, &field.token, &field_path, depth)?;
            if outcome.is_err() {
                return Ok(outcome);
            }
        }

        if self.config.strict_mode {
            if let Some(extra) = object.keys().find(|key| !schema.declares(key)) {
                return Ok(Err(Violation {
                    path: format!("{path}.{extra}"),
                    reason: format!("unexpected property: {extra}"),
                }));
            }
        }

        Ok(Ok(()))
    }

    fn value(&self, value: &Value, token: &TypeToken, path: &str, depth: usize) -> Result<Outcome> {
        match token {
            TypeToken::Record(schema) => self.nested_record(value, schema, token, path, depth),
            TypeToken::Reference(name) => {
                let schema = self.resolve_schema(name, path)?;
                self.nested_record(value, schema, token, path, depth)
            }
            TypeToken::Map { key, value: entry } => {
                let Some(object) = value.as_object() else {
                    return Ok(Err(self.mismatch(path, token, value)));
                };
                if depth + 1 > self.config.max_depth {
                    return Ok(Err(self.too_deep(path)));
                }
                for (entry_key, entry_value) in object {
                    let entry_path = format!("{path}[{entry_key:?}]");
                    if !key.admits(entry_key) {
                        return Ok(Err(Violation {
                            path: entry_path,
                            reason: format!("key {entry_key:?} is not a {}", key.as_str()),
                        }));
                    }
                    let outcome = self.value(entry_value, entry, &entry_path, depth + 1)?;
                    if outcome.is_err() {
                        return Ok(outcome);
                    }
                }
                Ok(Ok(()))
            }
            TypeToken::ArrayOf(element) => {
                let Some(items) = value.as_array() else {
                    return Ok(Err(self.mismatch(path, token, value)));
                };
                if depth + 1 > self.config.max_depth {
                    return Ok(Err(self.too_deep(path)));
                }
                // Resolve a `$` element type once for the whole array.
                let resolved = match element.as_ref() {
                    TypeToken::Reference(name) => Some(self.resolve_schema(name, path)?),
                    _ => None,
                };
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{path}[{index}]");
                    let outcome = match resolved {
                        Some(schema) => {
                            self.nested_record(item, schema, element, &item_path, depth + 1)?
                        }
                        None => self.value(item, element, &item_path, depth + 1)?,
                    };
                    if outcome.is_err() {
                        return Ok(outcome);
                    }
                }
                Ok(Ok(()))
            }
            TypeToken::Enum(alternatives) => {
                for alternative in alternatives {
                    if self.value(value, alternative, path, depth)?.is_ok() {
                        return Ok(Ok(()));
                    }
                }
                Ok(Err(self.mismatch(path, token, value)))
            }
            leaf => {
                if self.leaf_matches(value, leaf, path)? {
                    Ok(Ok(()))
                } else {
                    Ok(Err(self.mismatch(path, leaf, value)))
                }
            }
        }
    }

    fn nested_record(
        &self,
        value: &Value,
        schema: &Schema,
        token: &TypeToken,
        path: &str,
        depth: usize,
    ) -> Result<Outcome> {
        match value.as_object() {
            Some(object) => self.record(object, schema, path, depth + 1),
            None => Ok(Err(self.mismatch(path, token, value))),
        }
    }

    fn leaf_matches(&self, value: &Value, token: &TypeToken, path: &str) -> Result<bool> {
        match token {
            TypeToken::Scalar(kind) => Ok(kind.matches(value)),
            TypeToken::Literal(literal) => Ok(value.as_str() == Some(literal.as_str())),
            TypeToken::Named(name) => {
                let predicate = self
                    .registry
                    .get(name)
                    .ok_or_else(|| SchemaError::UnknownType {
                        name: name.clone(),
                        path: path.to_string(),
                    })?;
                Ok(predicate(value))
            }
            TypeToken::Capability(name) => {
                let capability = self.references.capability(name).ok_or_else(|| {
                    SchemaError::UnresolvedReference {
                        name: name.clone(),
                        path: path.to_string(),
                    }
                })?;
                Ok(capability.admits(value))
            }
            TypeToken::Enum(_)
            | TypeToken::Reference(_)
            | TypeToken::Map { .. }
            | TypeToken::ArrayOf(_)
            | TypeToken::Record(_) => Ok(false),
        }
    }

    fn resolve_schema(&self, name: &str, path: &str) -> Result<&Schema> {
        self.references
            .schema(name)
            .ok_or_else(|| SchemaError::UnresolvedReference {
                name: name.to_string(),
                path: path.to_string(),
            })
    }

    fn mismatch(&self, path: &str, expected: &TypeToken, actual: &Value) -> Violation {
        Violation {
            path: path.to_string(),
            reason: format!(
                "incorrect type: expected {expected}, got {}",
                render_value(actual, self.config.render_limit)
            ),
        }
    }

    fn too_deep(&self, path: &str) -> Violation {
        Violation {
            path: path.to_string(),
            reason: format!("nesting deeper than {} levels", self.config.max_depth),
        }
    }
}

/// Find the non-null value for `field`, trying the legacy alias after the
/// declared name.
fn lookup<'v>(object: &'v Map<String, Value>, field: &FieldSpec) -> Option<&'v Value> {
    let present = |key: &str| object.get(key).filter(|value| !value.is_null());
    present(&field.name).or_else(|| field.alias.as_deref().and_then(present))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::ValidatorConfig;

    fn schema(value: Value) -> Schema {
        Schema::parse(&value).unwrap()
    }

    fn node_references() -> References {
        let mut references = References::new();
        references
            .add_schema_value(
                "$NODE",
                &json!({
                    "name": "string",
                    "children": { "type": ["$NODE"], "optional": true }
                }),
            )
            .unwrap();
        references
    }

    #[test]
    fn optional_omission_passes_and_required_omission_fails() {
        let user = schema(json!({
            "name": "string",
            "age": { "type": "number", "optional": true },
            "role": "string"
        }));
        let references = References::new();

        let verdict = check(&json!({"name": "ada", "role": "admin"}), &user, &references).unwrap();
        assert!(verdict.is_valid());

        let verdict = check(&json!({"name": "ada", "age": null, "role": "admin"}), &user, &references)
            .unwrap();
        assert!(verdict.is_valid());

        let verdict = check(&json!({"name": "ada"}), &user, &references).unwrap();
        let violation = verdict.violation().unwrap();
        assert_eq!(violation.path, "$.role");
        assert!(violation.reason.contains("missing property: role"));
    }

    #[test]
    fn enum_accepts_any_alternative() {
        let s = schema(json!({ "id": "enum(string, number)" }));
        let references = References::new();

        assert!(check(&json!({"id": "a"}), &s, &references).unwrap().is_valid());
        assert!(check(&json!({"id": 7}), &s, &references).unwrap().is_valid());

        let verdict = check(&json!({"id": true}), &s, &references).unwrap();
        let violation = verdict.violation().unwrap();
        assert!(violation.reason.contains("enum(string, number)"));
        assert!(violation.reason.contains("true"));
    }

    #[test]
    fn literal_matches_exact_string_only() {
        let s = schema(json!({ "status": "'active'" }));
        let references = References::new();

        assert!(check(&json!({"status": "active"}), &s, &references)
            .unwrap()
            .is_valid());
        assert!(!check(&json!({"status": "inactive"}), &s, &references)
            .unwrap()
            .is_valid());
        assert!(!check(&json!({"status": 1}), &s, &references)
            .unwrap()
            .is_valid());
    }

    #[test]
    fn map_checks_keys_and_values() {
        let s = schema(json!({
            "labels": { "type": "map", "keytype": "number", "valuetype": "string" }
        }));
        let references = References::new();

        assert!(check(&json!({"labels": {"1": "a", "2": "b"}}), &s, &references)
            .unwrap()
            .is_valid());

        let verdict = check(&json!({"labels": {"x": "a"}}), &s, &references).unwrap();
        assert!(verdict.violation().unwrap().reason.contains("is not a number"));

        assert!(!check(&json!({"labels": {"1": 5}}), &s, &references)
            .unwrap()
            .is_valid());
        assert!(!check(&json!({"labels": ["a"]}), &s, &references)
            .unwrap()
            .is_valid());
    }

    #[test]
    fn boolean_keyed_map_rejects_other_keys() {
        let s = schema(json!({
            "switches": { "type": "map", "keytype": "boolean", "valuetype": "number" }
        }));
        let references = References::new();

        assert!(check(&json!({"switches": {"True": 1, "FALSE": 0}}), &s, &references)
            .unwrap()
            .is_valid());
        let verdict = check(&json!({"switches": {"yes": 1}}), &s, &references).unwrap();
        let violation = verdict.violation().unwrap();
        assert_eq!(violation.path, "$.switches[\"yes\"]");
        assert!(violation.reason.contains("is not a boolean"), "{}", violation.reason);
        assert!(!check(&json!({"switches": {"1": 1}}), &s, &references)
            .unwrap()
            .is_valid());
    }

    #[test]
    fn string_keyed_map_accepts_any_key() {
        let s = schema(json!({
            "names": { "type": "map", "keytype": "string", "valuetype": "string" }
        }));
        let references = References::new();

        assert!(check(
            &json!({"names": {"": "empty", "1": "one", "true": "yes", "a b": "c"}}),
            &s,
            &references
        )
        .unwrap()
        .is_valid());
        let verdict = check(&json!({"names": {"k": false}}), &s, &references).unwrap();
        assert_eq!(verdict.violation().unwrap().path, "$.names[\"k\"]");
    }

    #[test]
    fn object_type_admits_null_elements_but_not_null_fields() {
        let s = schema(json!({
            "slots": ["object"],
            "extras": { "type": "map", "keytype": "string", "valuetype": "object" },
            "payload": "object"
        }));
        let references = References::new();

        assert!(check(
            &json!({"slots": [{}, null, []], "extras": {"a": null}, "payload": {}}),
            &s,
            &references
        )
        .unwrap()
        .is_valid());
        let verdict = check(
            &json!({"slots": [], "extras": {}, "payload": null}),
            &s,
            &references,
        )
        .unwrap();
        assert!(verdict.violation().unwrap().reason.contains("missing property"));
        assert!(!check(&json!({"slots": ["x"], "extras": {}, "payload": {}}), &s, &references)
            .unwrap()
            .is_valid());
    }

    #[test]
    fn map_values_may_be_records() {
        let s = schema(json!({
            "flags": {
                "type": "map",
                "keytype": "boolean",
                "valuetype": { "note": "string" }
            }
        }));
        let references = References::new();

        assert!(check(
            &json!({"flags": {"TRUE": {"note": "on"}, "false": {"note": "off"}}}),
            &s,
            &references
        )
        .unwrap()
        .is_valid());
        assert!(!check(&json!({"flags": {"true": {}}}), &s, &references)
            .unwrap()
            .is_valid());
    }

    #[test]
    fn self_referential_schema_validates_deep_trees() {
        let references = node_references();
        let root = schema(json!({ "root": "$NODE" }));

        let mut tree = json!({"name": "leaf"});
        for depth in 0..20 {
            tree = json!({"name": format!("level-{depth}"), "children": [tree, {"name": "x"}]});
        }
        let verdict = check(&json!({ "root": tree }), &root, &references).unwrap();
        assert!(verdict.is_valid());

        let broken = json!({
            "root": {
                "name": "a",
                "children": [{ "name": "b", "children": [{ "children": [] }] }]
            }
        });
        let verdict = check(&broken, &root, &references).unwrap();
        let violation = verdict.violation().unwrap();
        assert_eq!(violation.path, "$.root.children[0].children[0].name");
    }

    #[test]
    fn array_of_scalars() {
        let s = schema(json!({ "tags": ["string"] }));
        let references = References::new();

        assert!(check(&json!({"tags": []}), &s, &references).unwrap().is_valid());
        assert!(check(&json!({"tags": ["a", "b"]}), &s, &references)
            .unwrap()
            .is_valid());

        let verdict = check(&json!({"tags": ["a", 2]}), &s, &references).unwrap();
        assert_eq!(verdict.violation().unwrap().path, "$.tags[1]");
        assert!(!check(&json!({"tags": "a"}), &s, &references)
            .unwrap()
            .is_valid());
    }

    #[test]
    fn unresolved_reference_is_fatal() {
        let s = schema(json!({ "child": "$MISSING" }));
        let result = check(&json!({"child": {}}), &s, &References::new());
        assert!(matches!(
            result,
            Err(SchemaError::UnresolvedReference { ref name, .. }) if name == "$MISSING"
        ));

        let s = schema(json!({ "items": ["$MISSING"] }));
        let result = check(&json!({"items": []}), &s, &References::new());
        assert!(matches!(result, Err(SchemaError::UnresolvedReference { .. })));

        let s = schema(json!({ "clock": "#Clock" }));
        let result = check(&json!({"clock": 1}), &s, &References::new());
        assert!(matches!(result, Err(SchemaError::UnresolvedReference { .. })));
    }

    #[test]
    fn capability_tokens_use_reference_table() {
        let mut references = References::new();
        references.add_capability("#Timestamp", |v: &Value| {
            v.as_u64().map(|ts| ts > 1_600_000_000).unwrap_or(false)
        });
        let s = schema(json!({ "at": "#Timestamp" }));

        assert!(check(&json!({"at": 1_700_000_000u64}), &s, &references)
            .unwrap()
            .is_valid());
        assert!(!check(&json!({"at": 5}), &s, &references).unwrap().is_valid());
    }

    #[test]
    fn named_predicates_come_from_the_registry() {
        let mut validator = Validator::new();
        validator
            .register_type("shortString", |v| v.as_str().map(|s| s.len() <= 3).unwrap_or(false))
            .unwrap();
        let s = schema(json!({ "code": "shortString", "alt": "enum(shortString, number)" }));
        let references = References::new();

        assert!(validator
            .check(&json!({"code": "abc", "alt": 2}), &s, &references)
            .unwrap()
            .is_valid());
        assert!(!validator
            .check(&json!({"code": "abcd", "alt": 2}), &s, &references)
            .unwrap()
            .is_valid());

        let unknown = Validator::new().check(&json!({"code": "abc", "alt": 1}), &s, &references);
        assert!(matches!(unknown, Err(SchemaError::UnknownType { .. })));
    }

    #[test]
    fn non_object_top_level_is_a_violation() {
        let s = schema(json!({ "a": "string" }));
        for value in [json!(null), json!([1]), json!("x"), json!(3)] {
            let verdict = check(&value, &s, &References::new()).unwrap();
            assert_eq!(verdict.violation().unwrap().path, "$");
        }
    }

    #[test]
    fn legacy_alias_is_read_before_optionality() {
        let s = schema(json!({ ".nick": "string" }));
        let references = References::new();

        assert!(check(&json!({".nick": "a"}), &s, &references).unwrap().is_valid());
        assert!(check(&json!({"nick": "a"}), &s, &references).unwrap().is_valid());
        assert!(!check(&json!({"nick": 1}), &s, &references).unwrap().is_valid());
        assert!(!check(&json!({}), &s, &references).unwrap().is_valid());
    }

    #[test]
    fn strict_mode_rejects_undeclared_fields() {
        let s = schema(json!({ "a": "string", ".b": { "type": "number", "optional": true } }));
        let strict = Validator::with_config(ValidatorConfig {
            strict_mode: true,
            ..ValidatorConfig::default()
        });
        let references = References::new();

        assert!(strict
            .check(&json!({"a": "x", "b": 1}), &s, &references)
            .unwrap()
            .is_valid());
        let verdict = strict
            .check(&json!({"a": "x", "extra": true}), &s, &references)
            .unwrap();
        assert_eq!(verdict.violation().unwrap().path, "$.extra");
        assert!(check(&json!({"a": "x", "extra": true}), &s, &references)
            .unwrap()
            .is_valid());
    }

    #[test]
    fn depth_limit_turns_runaway_nesting_into_a_violation() {
        let references = node_references();
        let root = schema(json!({ "root": "$NODE" }));
        let shallow = Validator::with_config(ValidatorConfig {
            max_depth: 4,
            ..ValidatorConfig::default()
        });

        let mut tree = json!({"name": "leaf"});
        for _ in 0..6 {
            tree = json!({"name": "n", "children": [tree]});
        }
        let verdict = shallow.check(&json!({ "root": tree }), &root, &references).unwrap();
        assert!(verdict
            .violation()
            .unwrap()
            .reason
            .contains("nesting deeper than 4"));
    }

    #[test]
    fn check_never_mutates_the_value() {
        let references = node_references();
        let root = schema(json!({ "root": "$NODE", "tags": ["string"] }));
        let value = json!({ "root": {"name": "a", "children": [{"name": "b"}]}, "tags": ["x"] });
        let before = value.clone();

        let first = check(&value, &root, &references).unwrap();
        let second = check(&value, &root, &references).unwrap();
        assert_eq!(first, second);
        assert_eq!(value, before);
    }

    #[test]
    fn check_token_checks_single_values() {
        let token = TypeToken::parse("enum('a', 'b')").unwrap();
        let validator = Validator::new();
        let references = References::new();

        assert!(validator
            .check_token(&json!("a"), &token, &references)
            .unwrap()
            .is_valid());
        assert!(!validator
            .check_token(&json!("c"), &token, &references)
            .unwrap()
            .is_valid());
    }

    #[test]
    fn diagnostics_render_bounded_values() {
        let s = schema(json!({ "n": "number" }));
        let verdict = check(&json!({"n": "y".repeat(1000)}), &s, &References::new()).unwrap();
        let reason = &verdict.violation().unwrap().reason;
        assert!(reason.len() < 200);
        assert!(reason.ends_with('…'));
    }
}
