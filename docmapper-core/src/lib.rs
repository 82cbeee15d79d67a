//! A typed object-graph to document-store mapping and query compilation layer.
//!
//! This crate is the core of the docmapper project and provides:
//!
//! - **Schema descriptors** ([`descriptor`]) - Code-first entity and field declarations
//! - **Entity models** ([`model`]) - Flattened, validated runtime schema metadata
//! - **Schema registry** ([`mapper`]) - Build-once model cache, entity encoding and polymorphic decoding
//! - **Path resolution** ([`path`]) - Dotted-path walking with alias translation and strict/relaxed validation
//! - **Codec dispatch** ([`codec`]) - Bidirectional value conversion keyed on runtime type identity
//! - **Render context** ([`context`]) - Schema context threaded through every compilation pass
//! - **Filters** ([`filter`]) - Typed match conditions and their document rendering
//! - **Updates** ([`updates`]) - Typed update operators grouped into update documents
//! - **Expressions** ([`expressions`]) - Aggregation expression trees
//! - **Pipelines** ([`aggregation`]) - Ordered stage compilation with context threading
//! - **Indexes** ([`index`]) - Declarative index and collation metadata conversion
//! - **Error handling** ([`error`]) - Error taxonomy and result alias
//!
//! # Example
//!
//! ```ignore
//! use docmapper_core::descriptor::{Entity, EntityDescriptor, FieldDescriptor};
//! use docmapper_core::mapper::Mapper;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub id: bson::Uuid,
//!     pub name: String,
//! }
//!
//! impl Entity for User {
//!     fn descriptor() -> EntityDescriptor {
//!         EntityDescriptor::builder("User")
//!             .collection("users")
//!             .field(FieldDescriptor::new("id").identifier().stored_as("_id"))
//!             .field(FieldDescriptor::new("name"))
//!             .build()
//!     }
//! }
//!
//! let mapper = Mapper::new();
//! let document = mapper.encode(&User { id: bson::Uuid::new(), name: "Alice".into() })?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmapper_core;

pub mod aggregation;
pub mod codec;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod expressions;
pub mod filter;
pub mod index;
pub mod mapper;
pub mod model;
pub mod path;
pub mod updates;
