//! Convenient re-exports of commonly used types from docmapper.
//!
//! Import this prelude module to quickly access the most frequently used
//! types and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docmapper::prelude::*;
//! ```
//!
//! This provides access to:
//! - Entity descriptors and the schema registry
//! - Filter, update, expression, and pipeline construction
//! - Index and collation metadata
//! - Error types

pub use docmapper_core::{
    aggregation::{Group, Pipeline, Projection, SetWindowFields, SortOrder, Stage, Window},
    codec::{Codec, CodecRegistry, Literal},
    context::RenderContext,
    descriptor::{
        Entity, EntityDescriptor, EntityDescriptorBuilder, FieldDescriptor, IndexedMeta,
        Multiplicity, TextMeta,
    },
    error::{MappingError, MappingResult},
    expressions::{Expression, accumulators, arithmetic, comparison},
    filter::{Filter, render_filters},
    index::{
        Alternate, CaseFirst, Collation, CollationStrength, Index, IndexDirection, IndexField,
        IndexHelper, IndexOptions, IndexSpec, IndexType, MaxVariable,
    },
    mapper::{Mapper, MapperOptions},
    model::{EntityModel, PropertyModel},
    path::{PathTarget, ResolvedPath},
    updates::{UpdateOperator, render_updates},
};
