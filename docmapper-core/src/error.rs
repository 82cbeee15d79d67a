//! Error and result types for schema mapping and query compilation.
//!
//! This module provides the error taxonomy for the mapping core. Use
//! [`MappingResult<T>`] as the return type for fallible operations.
//!
//! Errors fall into three families:
//!
//! - schema construction conflicts (duplicate identifiers, stored-name
//!   collisions, invalid index metadata), fatal to the operation,
//! - path validation failures, fatal to the single resolution call; the
//!   caller may retry with relaxed validation,
//! - codec lookup/conversion failures, fatal, surfaced with the offending
//!   type identity.
//!
//! All errors are synchronous; the core performs no retries. A failed render
//! leaves any partially written document in an undefined state and callers
//! must discard it.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors raised by the mapping core.
#[derive(Error, Debug)]
pub enum MappingError {
    /// Two properties on one entity are flagged as the identifier.
    #[error("duplicate identifier on {entity}: '{first}' and '{second}'")]
    DuplicateIdentifier {
        /// The entity type name.
        entity: &'static str,
        /// The first property claiming the identifier role.
        first: String,
        /// The second property claiming the identifier role.
        second: String,
    },
    /// Two properties alias to the same stored name.
    #[error("stored name '{stored}' on {entity} is claimed by both '{first}' and '{second}'")]
    DuplicateStoredName {
        /// The entity type name.
        entity: &'static str,
        /// The colliding stored (wire) name.
        stored: String,
        /// The first property using the stored name.
        first: String,
        /// The second property using the stored name.
        second: String,
    },
    /// A dotted path segment did not match any property under strict
    /// validation. Callers may retry the resolution with relaxed validation.
    #[error("could not resolve '{segment}' in path '{path}' against {entity}")]
    UnresolvedPath {
        /// The entity model the path was resolved against.
        entity: String,
        /// The full path as given by the caller.
        path: String,
        /// The first segment that failed to resolve.
        segment: String,
    },
    /// No converter is registered for the given value type.
    #[error("no codec registered for type {type_name}")]
    CodecNotFound {
        /// The fully qualified name of the offending type.
        type_name: String,
    },
    /// A registered codec could not decode the wire value into the
    /// requested type.
    #[error("cannot decode {type_name} from a {found} value")]
    DecodeMismatch {
        /// The requested target type.
        type_name: &'static str,
        /// The wire type actually found.
        found: &'static str,
    },
    /// A polymorphic document carries no discriminator value and no default
    /// concrete type is configured.
    #[error("document for {entity} has no '{key}' discriminator and no default subtype")]
    MissingDiscriminator {
        /// The polymorphic entity type name.
        entity: &'static str,
        /// The discriminator key that was expected.
        key: String,
    },
    /// A discriminator value does not map to any registered concrete type.
    #[error("no subtype registered for discriminator '{value}' on {entity}")]
    UnknownDiscriminator {
        /// The polymorphic entity type name.
        entity: &'static str,
        /// The unmatched discriminator value.
        value: String,
    },
    /// A text weight was placed on an index field that is not of type text.
    #[error("weighted index field '{field}' on {entity} must be a text field")]
    WeightOnNonTextField {
        /// The entity type name.
        entity: &'static str,
        /// The offending index field path.
        field: String,
    },
    /// A partial filter expression string could not be parsed.
    #[error("invalid partial filter expression: {0}")]
    PartialFilter(String),
    /// Serialization/deserialization error from the wire format layer.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// An entity value serialized to something other than a document.
    #[error("entity {entity} did not serialize to a document")]
    NotADocument {
        /// The entity type name.
        entity: &'static str,
    },
}

/// A specialized `Result` type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

impl MappingError {
    /// Returns true when the error is a path validation failure that may be
    /// retried with relaxed validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, MappingError::UnresolvedPath { .. })
    }
}

impl From<BsonError> for MappingError {
    fn from(err: BsonError) -> Self {
        MappingError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for MappingError {
    fn from(err: SerdeJsonError) -> Self {
        MappingError::Serialization(err.to_string())
    }
}
