//! Runtime schema models built from declarative descriptors.
//!
//! An [`EntityModel`] is the registry's flattened, validated view of one
//! mapped type: an ordered property list with inheritance already resolved,
//! the identifier property, discriminator settings, and index metadata.
//! Models are built once per type by the [`Mapper`](crate::mapper::Mapper),
//! never mutated afterwards, and shared behind `Arc`.

use std::collections::HashMap;

use crate::{
    descriptor::{
        DiscriminatorSpec, EntityDescriptor, FieldDescriptor, IndexedMeta, Multiplicity,
        NestedRef, TextMeta,
    },
    error::{MappingError, MappingResult},
    index::Index,
};

/// Schema metadata for one mapped field.
///
/// Owned by its [`EntityModel`]; immutable.
#[derive(Debug, Clone)]
pub struct PropertyModel {
    name: &'static str,
    stored_name: &'static str,
    identifier: bool,
    preserve_null: bool,
    multiplicity: Multiplicity,
    nested: Option<NestedRef>,
    indexed: Option<IndexedMeta>,
    text: Option<TextMeta>,
}

impl PropertyModel {
    fn from_descriptor(field: &FieldDescriptor) -> Self {
        Self {
            name: field.name,
            stored_name: field.stored_name.unwrap_or(field.name),
            identifier: field.identifier,
            preserve_null: field.preserve_null,
            multiplicity: field.multiplicity,
            nested: field.nested,
            indexed: field.indexed.clone(),
            text: field.text.clone(),
        }
    }

    /// The declared (in-language) field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The stored (wire) field name.
    pub fn stored_name(&self) -> &'static str {
        self.stored_name
    }

    /// Whether this property is the entity identifier.
    pub fn is_identifier(&self) -> bool {
        self.identifier
    }

    /// Whether explicit nulls are kept on the wire for this property.
    pub fn preserves_null(&self) -> bool {
        self.preserve_null
    }

    /// The property's cardinality.
    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    /// Reference to the nested mapped type, if any.
    pub fn nested(&self) -> Option<&NestedRef> {
        self.nested.as_ref()
    }

    /// The legacy single-field index annotation, if any.
    pub fn indexed(&self) -> Option<&IndexedMeta> {
        self.indexed.as_ref()
    }

    /// The text index annotation, if any.
    pub fn text(&self) -> Option<&TextMeta> {
        self.text.as_ref()
    }
}

/// Schema metadata for one mapped entity type.
///
/// Identity is the entity's Rust type; the model holds the flattened,
/// validated property list (inheritance resolved, most-derived declarations
/// winning on name collisions), the identifier property, discriminator
/// settings, and declared indexes.
#[derive(Debug, Clone)]
pub struct EntityModel {
    name: &'static str,
    collection: &'static str,
    discriminator: Option<DiscriminatorSpec>,
    properties: Vec<PropertyModel>,
    identifier: Option<usize>,
    indexes: Vec<Index>,
}

impl EntityModel {
    /// Builds a model from a descriptor, flattening the parent chain and
    /// validating identifier and stored-name uniqueness.
    pub(crate) fn build(descriptor: &EntityDescriptor) -> MappingResult<Self> {
        let mut fields: Vec<FieldDescriptor> = Vec::new();
        let mut indexes: Vec<Index> = Vec::new();
        collect(descriptor, &mut fields, &mut indexes);

        let properties: Vec<PropertyModel> =
            fields.iter().map(PropertyModel::from_descriptor).collect();

        let mut stored_seen: HashMap<&'static str, &'static str> = HashMap::new();
        let mut identifier = None;
        for (position, property) in properties.iter().enumerate() {
            if let Some(first) = stored_seen.insert(property.stored_name, property.name) {
                return Err(MappingError::DuplicateStoredName {
                    entity: descriptor.name,
                    stored: property.stored_name.to_string(),
                    first: first.to_string(),
                    second: property.name.to_string(),
                });
            }
            if property.identifier {
                if let Some(existing) = identifier {
                    let first: &PropertyModel = &properties[existing];
                    return Err(MappingError::DuplicateIdentifier {
                        entity: descriptor.name,
                        first: first.name.to_string(),
                        second: property.name.to_string(),
                    });
                }
                identifier = Some(position);
            }
        }

        Ok(Self {
            name: descriptor.name,
            collection: descriptor.collection.unwrap_or(descriptor.name),
            discriminator: descriptor.discriminator.clone(),
            properties,
            identifier,
            indexes,
        })
    }

    /// The entity type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The collection this entity maps to.
    pub fn collection(&self) -> &'static str {
        self.collection
    }

    /// The discriminator configuration, if discriminator storage is enabled.
    pub fn discriminator(&self) -> Option<&DiscriminatorSpec> {
        self.discriminator.as_ref()
    }

    /// The stored key carrying the discriminator tag.
    pub fn discriminator_key(&self) -> Option<&'static str> {
        self.discriminator.as_ref().map(|spec| spec.key)
    }

    /// The discriminator tag value written for this entity.
    pub fn discriminator_value(&self) -> Option<&str> {
        self.discriminator.as_ref().map(|spec| spec.value.as_str())
    }

    /// The ordered, flattened property list.
    pub fn properties(&self) -> &[PropertyModel] {
        &self.properties
    }

    /// Looks up a property by declared name.
    pub fn property(&self, name: &str) -> Option<&PropertyModel> {
        self.properties.iter().find(|property| property.name == name)
    }

    /// Looks up a property by stored (wire) name.
    pub fn property_by_stored_name(&self, stored: &str) -> Option<&PropertyModel> {
        self.properties
            .iter()
            .find(|property| property.stored_name == stored)
    }

    /// The identifier property, if one is declared.
    pub fn identifier(&self) -> Option<&PropertyModel> {
        self.identifier.map(|position| &self.properties[position])
    }

    /// Entity-level index declarations, parent-declared indexes included.
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }
}

/// Flattens the descriptor's parent chain into one ordered field list.
///
/// Parent fields come first; a derived redeclaration replaces the inherited
/// entry in place so parent-relative ordering is stable. Parent-declared
/// indexes are materialized on the concrete entity.
fn collect(
    descriptor: &EntityDescriptor,
    fields: &mut Vec<FieldDescriptor>,
    indexes: &mut Vec<Index>,
) {
    if let Some(parent) = &descriptor.parent {
        collect(parent, fields, indexes);
    }
    for field in &descriptor.fields {
        match fields.iter_mut().find(|existing| existing.name == field.name) {
            Some(existing) => *existing = field.clone(),
            None => fields.push(field.clone()),
        }
    }
    indexes.extend(descriptor.indexes.iter().cloned());
}
