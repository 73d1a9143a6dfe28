//! Reference schemas shipped with the crate.

use serde_json::json;

use crate::registry::References;
use crate::schema::{FieldSpec, Schema};
use crate::token::{ScalarKind, TypeToken};

/// Reference name of the element tree schema.
pub const ELEMENT: &str = "$ELEMENT";

/// The serialized element tree: a tag name, `id`/`class` attributes and an
/// optional list of child elements of the same shape.
pub fn element_schema() -> Schema {
    let attributes = Schema::from_fields(vec![
        FieldSpec::required("id", TypeToken::Scalar(ScalarKind::String)),
        FieldSpec::required("class", TypeToken::Scalar(ScalarKind::String)),
    ]);
    Schema::from_fields(vec![
        FieldSpec::required("tagName", TypeToken::Scalar(ScalarKind::String)),
        FieldSpec::required("attributes", TypeToken::Record(attributes)),
        FieldSpec::optional(
            "children",
            TypeToken::ArrayOf(Box::new(TypeToken::Reference(ELEMENT.to_string()))),
        ),
    ])
}

/// A reference table holding [`ELEMENT`].
pub fn element_references() -> References {
    let mut references = References::new();
    references.add_schema(ELEMENT, element_schema());
    references
}

/// An empty element tree node, useful as a template.
pub fn empty_element(tag_name: &str) -> serde_json::Value {
    json!({
        "tagName": tag_name.to_ascii_lowercase(),
        "attributes": { "id": "", "class": "" },
        "children": []
    })
}
