use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};
use crate::token::{json_kind, parse_map_token, parse_token_value, TypeToken, MAP_KEYWORD};

/// A parsed record schema: an ordered list of field specs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

/// One field of a record schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// The field name as written in the schema.
    pub name: String,
    /// Fallback lookup name for legacy `.name` fields (the name without its dot).
    pub alias: Option<String>,
    /// Required type.
    pub token: TypeToken,
    /// Absence (or `null`) is accepted only when set.
    pub optional: bool,
}

impl FieldSpec {
    /// A required field.
    pub fn required(name: impl Into<String>, token: TypeToken) -> Self {
        Self::new(name.into(), token, false)
    }

    /// An optional field.
    pub fn optional(name: impl Into<String>, token: TypeToken) -> Self {
        Self::new(name.into(), token, true)
    }

    fn new(name: String, token: TypeToken, optional: bool) -> Self {
        let alias = name
            .strip_prefix('.')
            .filter(|stripped| !stripped.is_empty())
            .map(str::to_string);
        Self {
            name,
            alias,
            token,
            optional,
        }
    }
}

impl Schema {
    /// Build a schema from already constructed field specs.
    pub fn from_fields(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Parse a record schema from a JSON string.
    pub fn from_json_str(schema_json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(schema_json)?;
        Self::parse(&value)
    }

    /// Parse a record schema from a JSON value.
    ///
    /// The value must be an object mapping field names to field specs.
    pub fn parse(value: &Value) -> Result<Self> {
        Self::parse_at(value, "$")
    }

    pub(crate) fn parse_at(value: &Value, path: &str) -> Result<Self> {
        let object = match value {
            Value::Object(object) => object,
            other => {
                return Err(SchemaError::Malformed {
                    path: path.to_string(),
                    message: format!("a record schema must be an object, found {}", json_kind(other)),
                })
            }
        };

        let mut fields = Vec::with_capacity(object.len());
        for (name, spec) in object {
            let field_path = format!("{path}.{name}");
            fields.push(parse_field(name, spec, &field_path)?);
        }
        Ok(Self { fields })
    }

    /// Field specs in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up a field spec by its schema name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// True if the record declares `key`, either directly or through a legacy alias.
    pub fn declares(&self, key: &str) -> bool {
        self.fields
            .iter()
            .any(|field| field.name == key || field.alias.as_deref() == Some(key))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn parse_field(name: &str, spec: &Value, path: &str) -> Result<FieldSpec> {
    match spec {
        Value::Object(object) => match object.get("type") {
            Some(kind) => parse_spec_object(name, kind, object, path),
            None => Ok(FieldSpec::required(name, parse_token_value(spec, path)?)),
        },
        other => Ok(FieldSpec::required(name, parse_token_value(other, path)?)),
    }
}

fn parse_spec_object(
    name: &str,
    kind: &Value,
    object: &Map<String, Value>,
    path: &str,
) -> Result<FieldSpec> {
    let optional = match object.get("optional") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(optional)) => *optional,
        Some(other) => {
            return Err(SchemaError::Malformed {
                path: path.to_string(),
                message: format!("optional must be a boolean, found {}", json_kind(other)),
            })
        }
    };

    let token = match kind {
        Value::String(keyword) if keyword.trim() == MAP_KEYWORD => {
            parse_map_token(object.get("keytype"), object.get("valuetype"), path)?
        }
        other => parse_token_value(other, path)?,
    };

    Ok(FieldSpec::new(name.to_string(), token, optional))
}
