/// Configuration errors raised while loading schemas or running a check.
///
/// An ordinary mismatch between a value and its schema is never an error; it is
/// reported as [`crate::Verdict::Invalid`].
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The schema file could not be loaded.
    #[error("failed to load schema: {0}")]
    LoadFailed(String),

    /// The schema document is not a valid JSON text.
    #[error("schema is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A field spec could not be parsed.
    #[error("malformed field spec at {path}: {message}")]
    Malformed { path: String, message: String },

    /// A `map` field spec is missing `keytype`/`valuetype` or uses an unsupported key type.
    #[error("malformed map spec at {path}: {message}")]
    MalformedMap { path: String, message: String },

    /// A `$Name` or `#Name` token has no entry in the reference table.
    #[error("could not resolve reference {name} (at {path})")]
    UnresolvedReference { name: String, path: String },

    /// A bare type name is neither a primitive nor a registered predicate.
    #[error("unknown type {name} (at {path})")]
    UnknownType { name: String, path: String },

    /// A custom predicate registration was rejected.
    #[error("invalid type registration {name:?}: {message}")]
    InvalidRegistration { name: String, message: String },
}

/// Failure of one of the duck-typed assertion helpers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssertError {
    /// The value does not have the expected type.
    #[error("invalid parameter: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// The value is not one of the allowed values.
    #[error("invalid parameter: {actual} is not one of the allowed values")]
    NotAllowed { actual: String },

    /// An array element does not have the expected type.
    #[error("invalid parameter at index {index}, expected a {expected}")]
    ElementMismatch { index: usize, expected: String },

    /// Two values were expected to be equal (or different) and were not.
    #[error("invalid parameter: {0}")]
    Comparison(String),

    /// More than one non-empty string was supplied.
    #[error("invalid parameters: only one non empty string supported")]
    MoreThanOne,

    /// The value is not admitted by any of the named capabilities.
    #[error("invalid parameter: {actual} is not an instance of {expected}")]
    NotAnInstance { expected: String, actual: String },

    /// A `#Name` capability is missing from the reference table.
    #[error("unknown capability {0}")]
    UnknownCapability(String),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
