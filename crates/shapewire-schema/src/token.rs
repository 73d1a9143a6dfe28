use std::fmt;

use serde_json::Value;

use crate::error::{Result, SchemaError};
use crate::schema::Schema;

/// Keyword that introduces a typed-key map field spec.
pub const MAP_KEYWORD: &str = "map";

const ENUM_PREFIX: &str = "enum(";
const QUOTES: [char; 3] = ['\'', '"', '`'];

/// Primitive type names understood without registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    String,
    Number,
    Boolean,
    /// JSON objects, arrays and `null`, as with `typeof`.
    Object,
    /// Accepted in schemas for compatibility; JSON data never carries callables.
    Function,
}

impl ScalarKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            "function" => Some(Self::Function),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Function => "function",
        }
    }

    /// Returns true if `value` has this primitive type.
    ///
    /// Numbers must be finite.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value
                .as_f64()
                .map(|number| !number.is_nan())
                .unwrap_or(false),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object() || value.is_array() || value.is_null(),
            Self::Function => false,
        }
    }
}

/// Key types allowed for `map` field specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Number,
    Boolean,
    String,
}

impl KeyKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "string" => Some(Self::String),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::String => "string",
        }
    }

    /// Returns true if the object key `key` can be read as this key type.
    pub fn admits(self, key: &str) -> bool {
        match self {
            Self::Number => key
                .trim()
                .parse::<f64>()
                .map(|number| number.is_finite())
                .unwrap_or(false),
            Self::Boolean => key.eq_ignore_ascii_case("true") || key.eq_ignore_ascii_case("false"),
            Self::String => true,
        }
    }
}

/// A parsed type token.
///
/// Sigils are resolved once when the schema is loaded; the validator only ever
/// dispatches on these variants.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeToken {
    /// `string`, `number`, `boolean`, `object`, `function`.
    Scalar(ScalarKind),
    /// A custom predicate looked up in the [`crate::TypeRegistry`].
    Named(String),
    /// `'x'`, `"x"` or `` `x` ``: matches exactly the string `x`.
    Literal(String),
    /// `enum(a, b, c)`: matches any alternative.
    Enum(Vec<TypeToken>),
    /// `$Name`: a record schema from the reference table. Stored with the sigil.
    Reference(String),
    /// `#Name`: a capability from the reference table. Stored with the sigil.
    Capability(String),
    /// `map` with typed keys and values.
    Map { key: KeyKind, value: Box<TypeToken> },
    /// `[T]`: an array whose every element satisfies `T`.
    ArrayOf(Box<TypeToken>),
    /// A nested record.
    Record(Schema),
}

impl TypeToken {
    /// Parse a string type token.
    pub fn parse(token: &str) -> Result<Self> {
        parse_token_str(token, "$")
    }

    /// True for tokens that descend into a nested record.
    pub fn is_record_like(&self) -> bool {
        matches!(self, Self::Record(_) | Self::Reference(_))
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => f.write_str(kind.as_str()),
            Self::Named(name) | Self::Reference(name) | Self::Capability(name) => f.write_str(name),
            Self::Literal(literal) => write!(f, "'{literal}'"),
            Self::Enum(alternatives) => {
                f.write_str(ENUM_PREFIX)?;
                for (index, alternative) in alternatives.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{alternative}")?;
                }
                f.write_str(")")
            }
            Self::Map { key, value } => write!(f, "map<{}, {value}>", key.as_str()),
            Self::ArrayOf(element) => write!(f, "[{element}]"),
            Self::Record(_) => f.write_str("record"),
        }
    }
}

pub(crate) fn parse_token_str(raw: &str, path: &str) -> Result<TypeToken> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(malformed(path, "empty type token"));
    }

    if token == MAP_KEYWORD {
        return Err(SchemaError::MalformedMap {
            path: path.to_string(),
            message: "map requires a field spec object with keytype and valuetype".to_string(),
        });
    }

    if let Some(name) = token.strip_prefix('$') {
        if name.is_empty() {
            return Err(malformed(path, "empty schema reference"));
        }
        return Ok(TypeToken::Reference(token.to_string()));
    }

    if let Some(name) = token.strip_prefix('#') {
        if name.is_empty() {
            return Err(malformed(path, "empty capability reference"));
        }
        return Ok(TypeToken::Capability(token.to_string()));
    }

    if let Some(literal) = unquote(token) {
        return Ok(TypeToken::Literal(literal.to_string()));
    }

    if let Some(inner) = token
        .strip_prefix(ENUM_PREFIX)
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let alternatives = split_alternatives(inner)
            .into_iter()
            .map(|alternative| parse_token_str(alternative, path))
            .collect::<Result<Vec<_>>>()?;
        if alternatives.is_empty() {
            return Err(malformed(path, "enum() needs at least one alternative"));
        }
        return Ok(TypeToken::Enum(alternatives));
    }

    if let Some(kind) = ScalarKind::from_name(token) {
        return Ok(TypeToken::Scalar(kind));
    }

    Ok(TypeToken::Named(token.to_string()))
}

/// Parse the type position of a field spec: a string token, a one-element
/// array, or a nested record.
pub(crate) fn parse_token_value(value: &Value, path: &str) -> Result<TypeToken> {
    match value {
        Value::String(token) => parse_token_str(token, path),
        Value::Array(items) => {
            if items.len() != 1 {
                return Err(malformed(
                    path,
                    &format!("array type must have exactly one element, found {}", items.len()),
                ));
            }
            let element = parse_token_value(&items[0], &format!("{path}[]"))?;
            Ok(TypeToken::ArrayOf(Box::new(element)))
        }
        Value::Object(_) => Ok(TypeToken::Record(Schema::parse_at(value, path)?)),
        other => Err(malformed(
            path,
            &format!("expected a type token, found {}", json_kind(other)),
        )),
    }
}

/// Parse the `keytype`/`valuetype` pair of a `map` field spec.
pub(crate) fn parse_map_token(
    keytype: Option<&Value>,
    valuetype: Option<&Value>,
    path: &str,
) -> Result<TypeToken> {
    let map_error = |message: String| SchemaError::MalformedMap {
        path: path.to_string(),
        message,
    };

    let key_name = match keytype {
        Some(Value::String(name)) => name.as_str(),
        Some(other) => {
            return Err(map_error(format!(
                "keytype must be a string, found {}",
                json_kind(other)
            )))
        }
        None => return Err(map_error("missing keytype".to_string())),
    };
    let key = KeyKind::from_name(key_name.trim())
        .ok_or_else(|| map_error(format!("unsupported keytype {key_name:?}")))?;

    let value = match valuetype {
        Some(valuetype) => parse_token_value(valuetype, &format!("{path}{{}}"))?,
        None => return Err(map_error("missing valuetype".to_string())),
    };

    Ok(TypeToken::Map {
        key,
        value: Box::new(value),
    })
}

fn unquote(token: &str) -> Option<&str> {
    let first = token.chars().next()?;
    if token.len() < 2 || !QUOTES.contains(&first) || !token.ends_with(first) {
        return None;
    }
    Some(&token[first.len_utf8()..token.len() - first.len_utf8()])
}

/// Split enum alternatives on top-level commas. Commas inside quotes or nested
/// parentheses/brackets stay with their alternative.
fn split_alternatives(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0usize;

    for (index, ch) in inner.char_indices() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' | '`' => quote = Some(ch),
                '(' | '[' => depth += 1,
                ')' | ']' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    parts.push(inner[start..index].trim());
                    start = index + 1;
                }
                _ => {}
            },
        }
    }

    let tail = inner[start..].trim();
    if !tail.is_empty() || !parts.is_empty() {
        parts.push(tail);
    }
    parts
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn malformed(path: &str, message: &str) -> SchemaError {
    SchemaError::Malformed {
        path: path.to_string(),
        message: message.to_string(),
    }
}
