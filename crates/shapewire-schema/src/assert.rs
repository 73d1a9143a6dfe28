//! Duck-typed assertions over JSON values.
//!
//! These are the quick guards used at API edges before a value is worth a full
//! schema check. Type names are the scalar names understood by schemas.

use serde_json::Value;

use crate::error::AssertError;
use crate::registry::{with_sigil, References};
use crate::render::render_value;
use crate::token::{json_kind, ScalarKind};

const RENDER_LIMIT: usize = 48;

/// Assert that `value` has the scalar type `type_name`.
pub fn assert_type_of(value: &Value, type_name: &str) -> Result<(), AssertError> {
    assert_type_of_any(value, &[type_name])
}

/// Assert that `value` has one of the scalar types in `type_names`.
pub fn assert_type_of_any(value: &Value, type_names: &[&str]) -> Result<(), AssertError> {
    let matched = type_names
        .iter()
        .filter_map(|name| ScalarKind::from_name(name))
        .any(|kind| kind.matches(value));
    if matched {
        return Ok(());
    }
    Err(AssertError::TypeMismatch {
        expected: type_names.join(" | "),
        actual: json_kind(value).to_string(),
    })
}

/// Like [`assert_type_of`], but `null` is always accepted.
pub fn assert_null_or_type_of(value: &Value, type_name: &str) -> Result<(), AssertError> {
    if value.is_null() {
        return Ok(());
    }
    assert_type_of(value, type_name)
}

/// Assert that the `#Name` capability admits `value`.
pub fn assert_instance_of(
    value: &Value,
    references: &References,
    capability: &str,
) -> Result<(), AssertError> {
    assert_instance_of_any(value, references, &[capability])
}

/// Assert that at least one of the `#Name` capabilities admits `value`.
///
/// Every name must be registered, even when an earlier one already matched.
pub fn assert_instance_of_any(
    value: &Value,
    references: &References,
    capabilities: &[&str],
) -> Result<(), AssertError> {
    let mut admitted = false;
    for name in capabilities {
        let name = with_sigil('#', name);
        let capability = references
            .capability(&name)
            .ok_or_else(|| AssertError::UnknownCapability(name.clone()))?;
        admitted |= capability.admits(value);
    }
    if admitted {
        return Ok(());
    }
    Err(AssertError::NotAnInstance {
        expected: capabilities.join(" | "),
        actual: render_value(value, RENDER_LIMIT),
    })
}

/// Like [`assert_instance_of`], but `null` is always accepted.
pub fn assert_null_or_instance_of(
    value: &Value,
    references: &References,
    capability: &str,
) -> Result<(), AssertError> {
    if value.is_null() {
        return Ok(());
    }
    assert_instance_of(value, references, capability)
}

/// Assert that `value` equals one of `allowed`.
pub fn assert_enum(value: &Value, allowed: &[Value]) -> Result<(), AssertError> {
    if allowed.contains(value) {
        Ok(())
    } else {
        Err(AssertError::NotAllowed {
            actual: render_value(value, RENDER_LIMIT),
        })
    }
}

/// Assert that `value` is an array.
pub fn assert_array(value: &Value) -> Result<&[Value], AssertError> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| AssertError::TypeMismatch {
            expected: "array".to_string(),
            actual: json_kind(value).to_string(),
        })
}

/// Assert that `value` is an array whose elements all have the scalar type `type_name`.
pub fn assert_array_of_type(value: &Value, type_name: &str) -> Result<(), AssertError> {
    let items = assert_array(value)?;
    let kind = ScalarKind::from_name(type_name);
    for (index, item) in items.iter().enumerate() {
        if !kind.map(|kind| kind.matches(item)).unwrap_or(false) {
            return Err(AssertError::ElementMismatch {
                index,
                expected: type_name.to_string(),
            });
        }
    }
    Ok(())
}

pub fn assert_equal(left: &Value, right: &Value) -> Result<(), AssertError> {
    if left == right {
        Ok(())
    } else {
        Err(AssertError::Comparison(format!(
            "{} != {}",
            render_value(left, RENDER_LIMIT),
            render_value(right, RENDER_LIMIT)
        )))
    }
}

pub fn assert_not_equal(left: &Value, right: &Value) -> Result<(), AssertError> {
    if left != right {
        Ok(())
    } else {
        Err(AssertError::Comparison(format!(
            "both sides are {}",
            render_value(left, RENDER_LIMIT)
        )))
    }
}

/// Assert that every argument is a string and at most one of them is non-empty.
pub fn assert_one_non_empty(values: &[&Value]) -> Result<(), AssertError> {
    let mut seen = false;
    for value in values {
        let text = value.as_str().ok_or_else(|| AssertError::TypeMismatch {
            expected: "string".to_string(),
            actual: json_kind(value).to_string(),
        })?;
        if !text.is_empty() {
            if seen {
                return Err(AssertError::MoreThanOne);
            }
            seen = true;
        }
    }
    Ok(())
}
