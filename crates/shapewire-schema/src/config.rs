/// Controls how a [`crate::Validator`] walks a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// When true, records reject fields that the schema does not declare.
    pub strict_mode: bool,
    /// Maximum record/array nesting depth before a value is rejected.
    pub max_depth: usize,
    /// Maximum characters of the offending value rendered into a violation.
    pub render_limit: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            max_depth: 64,
            render_limit: 96,
        }
    }
}

/// Limits applied when loading reference schemas from a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Maximum number of schemas loaded from a directory.
    pub max_schemas_from_directory: usize,
    /// Maximum bytes allowed per schema file loaded from a directory.
    pub max_schema_file_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_schemas_from_directory: 256,
            max_schema_file_size: 256 * 1024,
        }
    }
}
