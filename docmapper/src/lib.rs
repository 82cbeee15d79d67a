//! Main docmapper crate providing typed document mapping and query compilation.
//!
//! This crate is the primary entry point for users of the docmapper
//! framework. It re-exports the core types from the sub-crates: declare your
//! entities with serde plus an [`Entity`] descriptor, hand them to a
//! [`Mapper`], and render filters, updates, pipelines, and index
//! declarations into wire documents.
//!
//! # Quick Start
//!
//! ```ignore
//! use docmapper::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub id: bson::Uuid,
//!     pub name: String,
//!     pub logins: i64,
//! }
//!
//! impl Entity for User {
//!     fn descriptor() -> EntityDescriptor {
//!         EntityDescriptor::builder("User")
//!             .collection("users")
//!             .field(FieldDescriptor::new("id").identifier().stored_as("_id"))
//!             .field(FieldDescriptor::new("name"))
//!             .field(FieldDescriptor::new("logins"))
//!             .build()
//!     }
//! }
//!
//! fn main() -> Result<(), MappingError> {
//!     let mapper = Mapper::new();
//!
//!     // Encode an entity into its wire document.
//!     let user = User { id: bson::Uuid::new(), name: "Alice".into(), logins: 0 };
//!     let document = mapper.encode(&user)?;
//!
//!     // Compile a typed filter against the schema.
//!     let ctx = RenderContext::for_entity::<User>(&mapper)?;
//!     let query = render_filters(&[Filter::gte("logins", 10i64)], &ctx)?;
//!
//!     println!("stored: {document}, query: {query}");
//!     Ok(())
//! }
//! ```

pub mod prelude;

// Re-export the wire format so downstream crates need no direct dependency.
pub use bson;

pub use docmapper_core::{
    aggregation, codec, context, descriptor, error, expressions, filter, index, mapper, model,
    path, updates,
};

pub use docmapper_core::{
    descriptor::{Entity, EntityDescriptor, FieldDescriptor},
    error::{MappingError, MappingResult},
    mapper::{Mapper, MapperOptions},
};
