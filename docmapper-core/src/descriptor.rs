//! Declarative metadata surface consumed by the schema registry.
//!
//! Entities describe themselves through [`EntityDescriptor`] values built
//! with explicit, code-first builders. A descriptor captures everything the
//! registry needs to construct an [`EntityModel`](crate::model::EntityModel):
//! stored-name overrides, the identifier property, nesting, multiplicity,
//! discriminator settings, parent descriptors for flattened inheritance, and
//! index metadata. Descriptors are plain immutable values; no runtime
//! introspection is involved.
//!
//! # Example
//!
//! ```ignore
//! use docmapper_core::descriptor::{Entity, EntityDescriptor, FieldDescriptor};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Hotel {
//!     id: bson::Uuid,
//!     name: String,
//!     address: Address,
//! }
//!
//! impl Entity for Hotel {
//!     fn descriptor() -> EntityDescriptor {
//!         EntityDescriptor::builder("Hotel")
//!             .collection("hotels")
//!             .field(FieldDescriptor::new("id").identifier().stored_as("_id"))
//!             .field(FieldDescriptor::new("name"))
//!             .field(FieldDescriptor::new("address").nested::<Address>())
//!             .build()
//!     }
//! }
//! ```

use serde::{Serialize, de::DeserializeOwned};
use std::any::TypeId;

use crate::index::{Index, IndexDirection, IndexOptions};

/// Core trait for types mapped into the document store.
///
/// An entity is any serde-serializable type that can describe its own
/// schema. The descriptor is consumed once by the
/// [`Mapper`](crate::mapper::Mapper) on first reference and cached as an
/// immutable model afterwards.
pub trait Entity:
    Serialize + DeserializeOwned + Send + Sync + Clone + 'static
{
    /// Returns the declarative schema description for this type.
    fn descriptor() -> EntityDescriptor;
}

/// Discriminator configuration for an entity.
///
/// The key names the stored field carrying the concrete-type tag; the value
/// is the tag written for this entity.
#[derive(Debug, Clone)]
pub struct DiscriminatorSpec {
    pub(crate) key: &'static str,
    pub(crate) value: String,
}

/// Reference to a nested mapped type, carried by a field descriptor.
///
/// Holds the type identity plus a thunk producing the nested descriptor, so
/// nested models can be built lazily through the registry without recursing
/// at descriptor-construction time (which would not terminate for
/// self-referential entities).
#[derive(Debug, Clone, Copy)]
pub struct NestedRef {
    pub(crate) type_id: TypeId,
    pub(crate) descriptor: fn() -> EntityDescriptor,
}

/// Cardinality of a mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// A single value.
    Scalar,
    /// An ordered sequence of values.
    Array,
    /// A string-keyed map of values.
    Map,
}

/// Legacy single-field index annotation.
///
/// Normalized by the index helper into a full [`Index`] so key-document
/// generation has exactly one code path.
#[derive(Debug, Clone)]
pub struct IndexedMeta {
    pub(crate) direction: IndexDirection,
    pub(crate) options: IndexOptions,
}

impl IndexedMeta {
    /// Creates a single-field index annotation with the given direction.
    pub fn new(direction: IndexDirection) -> Self {
        Self { direction, options: IndexOptions::default() }
    }

    /// Attaches index options to this annotation.
    pub fn options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }
}

/// Legacy single-field text index annotation with a search weight.
#[derive(Debug, Clone)]
pub struct TextMeta {
    pub(crate) weight: u32,
    pub(crate) options: IndexOptions,
}

impl TextMeta {
    /// Creates a text index annotation with the given weight.
    pub fn new(weight: u32) -> Self {
        Self { weight, options: IndexOptions::default() }
    }

    /// Attaches index options to this annotation.
    pub fn options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }
}

/// Declarative description of one mapped field.
///
/// Built fluently and consumed by model construction. The declared name must
/// match the serde field name of the entity type.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub(crate) name: &'static str,
    pub(crate) stored_name: Option<&'static str>,
    pub(crate) identifier: bool,
    pub(crate) preserve_null: bool,
    pub(crate) multiplicity: Multiplicity,
    pub(crate) nested: Option<NestedRef>,
    pub(crate) indexed: Option<IndexedMeta>,
    pub(crate) text: Option<TextMeta>,
}

impl FieldDescriptor {
    /// Creates a scalar field descriptor with the given declared name.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            stored_name: None,
            identifier: false,
            preserve_null: false,
            multiplicity: Multiplicity::Scalar,
            nested: None,
            indexed: None,
            text: None,
        }
    }

    /// Overrides the stored (wire) name for this field.
    pub fn stored_as(mut self, stored: &'static str) -> Self {
        self.stored_name = Some(stored);
        self
    }

    /// Marks this field as the entity's identifier property.
    pub fn identifier(mut self) -> Self {
        self.identifier = true;
        self
    }

    /// Keeps explicit nulls on the wire instead of omitting the field.
    pub fn preserve_null(mut self) -> Self {
        self.preserve_null = true;
        self
    }

    /// Declares this field as an ordered sequence.
    pub fn array(mut self) -> Self {
        self.multiplicity = Multiplicity::Array;
        self
    }

    /// Declares this field as a string-keyed map.
    pub fn map(mut self) -> Self {
        self.multiplicity = Multiplicity::Map;
        self
    }

    /// Declares the field's value type (or element type, for containers) as
    /// a nested mapped entity.
    pub fn nested<N: Entity>(mut self) -> Self {
        self.nested = Some(NestedRef {
            type_id: TypeId::of::<N>(),
            descriptor: N::descriptor,
        });
        self
    }

    /// Attaches a legacy single-field index annotation.
    pub fn indexed(mut self, direction: IndexDirection) -> Self {
        self.indexed = Some(IndexedMeta::new(direction));
        self
    }

    /// Attaches a legacy single-field index annotation with options.
    pub fn indexed_with(mut self, meta: IndexedMeta) -> Self {
        self.indexed = Some(meta);
        self
    }

    /// Attaches a text index annotation with the given weight.
    pub fn text(mut self, weight: u32) -> Self {
        self.text = Some(TextMeta::new(weight));
        self
    }

    /// Attaches a text index annotation with options.
    pub fn text_with(mut self, meta: TextMeta) -> Self {
        self.text = Some(meta);
        self
    }
}

/// Declarative description of one mapped entity type.
///
/// Immutable once built. Parent descriptors are flattened into a single
/// ordered property list at model-construction time, with derived
/// declarations shadowing inherited ones.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub(crate) name: &'static str,
    pub(crate) collection: Option<&'static str>,
    pub(crate) discriminator: Option<DiscriminatorSpec>,
    pub(crate) parent: Option<Box<EntityDescriptor>>,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) indexes: Vec<Index>,
}

impl EntityDescriptor {
    /// Creates a builder for an entity with the given type name.
    pub fn builder(name: &'static str) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder {
            descriptor: EntityDescriptor {
                name,
                collection: None,
                discriminator: None,
                parent: None,
                fields: Vec::new(),
                indexes: Vec::new(),
            },
        }
    }
}

/// Fluent builder for [`EntityDescriptor`].
#[derive(Debug, Clone)]
pub struct EntityDescriptorBuilder {
    descriptor: EntityDescriptor,
}

impl EntityDescriptorBuilder {
    /// Sets the collection (table) name. Defaults to the entity type name.
    pub fn collection(mut self, collection: &'static str) -> Self {
        self.descriptor.collection = Some(collection);
        self
    }

    /// Enables discriminator storage with the given key and tag value.
    pub fn discriminator(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.descriptor.discriminator = Some(DiscriminatorSpec { key, value: value.into() });
        self
    }

    /// Sets a parent descriptor whose properties and indexes are inherited.
    ///
    /// Properties redeclared here shadow the inherited ones in place.
    pub fn parent(mut self, parent: EntityDescriptor) -> Self {
        self.descriptor.parent = Some(Box::new(parent));
        self
    }

    /// Appends a field declaration. Order is significant and preserved.
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.descriptor.fields.push(field);
        self
    }

    /// Appends an entity-level index declaration.
    pub fn index(mut self, index: Index) -> Self {
        self.descriptor.indexes.push(index);
        self
    }

    /// Finalizes the descriptor.
    pub fn build(self) -> EntityDescriptor {
        self.descriptor
    }
}
