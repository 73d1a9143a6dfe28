//! Structural schema validation for duck-typed JSON payloads.
//!
//! A schema is a record mapping field names to type tokens: primitive names,
//! registered predicates, quoted literals, `enum(..)` alternatives, `$Name`
//! schema references, `#Name` capabilities, typed-key maps, one-element arrays
//! and nested records. Schemas are parsed once into [`TypeToken`] trees and
//! checked with a [`Validator`].
//!
//! Checking never fails on bad data; a mismatch is a [`Verdict::Invalid`].
//! Only configuration faults (unresolvable references, unknown type names)
//! surface as [`SchemaError`].

pub mod assert;
pub mod builtin;
pub mod config;
pub mod error;
pub mod registry;
pub mod render;
pub mod schema;
pub mod token;
pub mod validator;

pub use config::{LoaderConfig, ValidatorConfig};
pub use error::{AssertError, Result, SchemaError};
pub use registry::{Capability, Predicate, References, TypeRegistry};
pub use schema::{FieldSpec, Schema};
pub use token::{KeyKind, ScalarKind, TypeToken};
pub use validator::{check, Validator, Verdict, Violation};
