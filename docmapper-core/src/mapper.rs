//! Schema registry: builds, caches, and serves entity models.
//!
//! The [`Mapper`] is the single owner of all mutable state in the core. It
//! is constructed explicitly and handed to callers (no implicit singleton),
//! holds the model cache, the codec registry, and the polymorphic subtype
//! registry, and drives entity encoding and decoding.
//!
//! The model cache supports build-once / read-many access: models are
//! constructed outside the write lock and published atomically, so
//! concurrent first requests for the same type converge on one instance and
//! readers never observe a partially constructed model.
//!
//! # Encoding model
//!
//! Entities serialize through serde first; the mapper then applies a
//! wire-name pass driven by the entity model: declared names are replaced
//! with stored names, null-valued scalar properties are omitted unless
//! marked to preserve nulls, nested models are applied recursively, and the
//! discriminator tag (when configured) is written as the leading key.
//! Decoding reverses the pass before handing the document back to serde.
//!
//! # Polymorphism
//!
//! Polymorphic decode uses an open registry mapping discriminator values to
//! constructor functions: register each concrete type with
//! [`Mapper::register_subtype`]. The base type's serde representation must
//! carry its tag under the same key as the descriptor's discriminator
//! (e.g. an internally tagged enum).

use bson::{Bson, Document};
use parking_lot::RwLock;
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};
use tracing::debug;

use crate::{
    codec::CodecRegistry,
    descriptor::{Entity, EntityDescriptor, Multiplicity},
    error::{MappingError, MappingResult},
    model::{EntityModel, PropertyModel},
};

/// Discriminator key used when a polymorphic entity's descriptor does not
/// name one explicitly.
pub const DEFAULT_DISCRIMINATOR_KEY: &str = "_t";

/// Configuration for a [`Mapper`] instance.
#[derive(Debug, Clone)]
pub struct MapperOptions {
    /// Locale substituted for the collation default-locale sentinel.
    pub default_locale: String,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self { default_locale: "en_US".to_string() }
    }
}

struct SubtypeCtor<E> {
    construct: Box<dyn Fn(&Mapper, Document) -> MappingResult<E> + Send + Sync>,
}

struct SubtypeEntry {
    type_id: TypeId,
    descriptor: fn() -> EntityDescriptor,
    ctor: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct SubtypeSet {
    by_value: HashMap<String, SubtypeEntry>,
    default_value: Option<String>,
}

/// The schema registry.
///
/// Owns the model cache, the codec registry, and the subtype registry.
/// Registration happens during a setup phase through `&mut self`; the
/// mapper is then shared freely (`Send + Sync`).
pub struct Mapper {
    models: RwLock<HashMap<TypeId, Arc<EntityModel>>>,
    codecs: CodecRegistry,
    subtypes: HashMap<TypeId, SubtypeSet>,
    options: MapperOptions,
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Mapper {
    /// Creates a mapper with default options and the standard codec set.
    pub fn new() -> Self {
        Self::with_options(MapperOptions::default())
    }

    /// Creates a mapper with explicit options.
    pub fn with_options(options: MapperOptions) -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            codecs: CodecRegistry::with_defaults(),
            subtypes: HashMap::new(),
            options,
        }
    }

    /// The mapper's configuration.
    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    /// The codec registry used for literal and container encoding.
    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Mutable access to the codec registry, for custom converter setup.
    pub fn codecs_mut(&mut self) -> &mut CodecRegistry {
        &mut self.codecs
    }

    /// Returns the cached model for `E`, building it on first reference.
    ///
    /// Repeated calls return the same shared instance.
    pub fn model<E: Entity>(&self) -> MappingResult<Arc<EntityModel>> {
        self.model_for(TypeId::of::<E>(), E::descriptor)
    }

    pub(crate) fn model_for(
        &self,
        type_id: TypeId,
        descriptor: fn() -> EntityDescriptor,
    ) -> MappingResult<Arc<EntityModel>> {
        if let Some(model) = self.models.read().get(&type_id) {
            return Ok(model.clone());
        }
        // Construct outside the write lock, publish complete. A racing
        // builder loses to whichever entry lands first.
        let built = Arc::new(EntityModel::build(&descriptor())?);
        let mut models = self.models.write();
        let model = models
            .entry(type_id)
            .or_insert_with(|| {
                debug!(entity = built.name(), "built entity model");
                built.clone()
            })
            .clone();
        Ok(model)
    }

    /// Registers a concrete subtype of the polymorphic entity `E` under the
    /// given discriminator value.
    pub fn register_subtype<E, S>(&mut self, value: impl Into<String>)
    where
        E: Entity,
        S: Entity + Into<E>,
    {
        let ctor = SubtypeCtor::<E> {
            construct: Box::new(|mapper, document| {
                Ok(mapper.decode_concrete::<S>(document)?.into())
            }),
        };
        let entry = SubtypeEntry {
            type_id: TypeId::of::<S>(),
            descriptor: S::descriptor,
            ctor: Arc::new(ctor),
        };
        self.subtypes
            .entry(TypeId::of::<E>())
            .or_default()
            .by_value
            .insert(value.into(), entry);
    }

    /// Registers a subtype and makes it the fallback for documents carrying
    /// no discriminator value.
    pub fn register_default_subtype<E, S>(&mut self, value: impl Into<String>)
    where
        E: Entity,
        S: Entity + Into<E>,
    {
        let value = value.into();
        self.register_subtype::<E, S>(value.clone());
        if let Some(set) = self.subtypes.get_mut(&TypeId::of::<E>()) {
            set.default_value = Some(value);
        }
    }

    /// Encodes an entity value into a wire document.
    pub fn encode<E: Entity>(&self, value: &E) -> MappingResult<Document> {
        let model = self.model::<E>()?;
        let serialized = bson::ser::serialize_to_bson(value)?;
        let Bson::Document(mut document) = serialized else {
            return Err(MappingError::NotADocument { entity: model.name() });
        };

        let Some(set) = self.subtypes.get(&TypeId::of::<E>()) else {
            return self.apply_wire_names(&model, document);
        };

        let key = model.discriminator_key().unwrap_or(DEFAULT_DISCRIMINATOR_KEY);
        let tag = document
            .get(key)
            .and_then(Bson::as_str)
            .map(str::to_string)
            .ok_or_else(|| MappingError::MissingDiscriminator {
                entity: model.name(),
                key: key.to_string(),
            })?;
        let entry = set.by_value.get(&tag).ok_or_else(|| MappingError::UnknownDiscriminator {
            entity: model.name(),
            value: tag.clone(),
        })?;
        let sub_model = self.model_for(entry.type_id, entry.descriptor)?;

        document.remove(key);
        let mut out = Document::new();
        out.insert(key, Bson::String(tag));
        for (name, value) in self.apply_wire_names(&sub_model, document)? {
            out.insert(name, value);
        }
        Ok(out)
    }

    /// Decodes a wire document into an entity value, resolving the
    /// discriminator to a registered concrete type when `E` is polymorphic.
    pub fn decode<E: Entity>(&self, document: Document) -> MappingResult<E> {
        let Some(set) = self.subtypes.get(&TypeId::of::<E>()) else {
            return self.decode_concrete::<E>(document);
        };

        let model = self.model::<E>()?;
        let key = model.discriminator_key().unwrap_or(DEFAULT_DISCRIMINATOR_KEY);
        let tag = match document.get(key).and_then(Bson::as_str) {
            Some(value) => value.to_string(),
            None => set.default_value.clone().ok_or_else(|| MappingError::MissingDiscriminator {
                entity: model.name(),
                key: key.to_string(),
            })?,
        };
        let entry = set.by_value.get(&tag).ok_or_else(|| MappingError::UnknownDiscriminator {
            entity: model.name(),
            value: tag.clone(),
        })?;
        let ctor = entry
            .ctor
            .downcast_ref::<SubtypeCtor<E>>()
            .ok_or_else(|| MappingError::Serialization("subtype constructor mismatch".to_string()))?;
        (ctor.construct)(self, document)
    }

    /// Decodes a document as the concrete type `S`, without discriminator
    /// dispatch.
    pub fn decode_concrete<S: Entity>(&self, document: Document) -> MappingResult<S> {
        let model = self.model::<S>()?;
        let unmapped = self.unapply_wire_names(&model, document)?;
        Ok(bson::de::deserialize_from_bson(Bson::Document(unmapped))?)
    }

    /// Rewrites a serde-produced document into wire shape: stored names,
    /// null omission, discriminator first, nested models recursively.
    fn apply_wire_names(&self, model: &EntityModel, mut document: Document) -> MappingResult<Document> {
        let mut out = Document::new();
        if let Some(spec) = model.discriminator() {
            let tag = document
                .remove(spec.key)
                .unwrap_or_else(|| Bson::String(spec.value.clone()));
            out.insert(spec.key, tag);
        }
        for property in model.properties() {
            let Some(value) = document.remove(property.name()) else {
                continue;
            };
            if matches!(value, Bson::Null)
                && !property.preserves_null()
                && property.multiplicity() == Multiplicity::Scalar
            {
                continue;
            }
            out.insert(property.stored_name(), self.encode_property(property, value)?);
        }
        // keys unknown to the model pass through verbatim
        for (name, value) in document {
            out.insert(name, value);
        }
        Ok(out)
    }

    fn encode_property(&self, property: &PropertyModel, value: Bson) -> MappingResult<Bson> {
        let Some(nested) = property.nested() else {
            return Ok(value);
        };
        let nested_model = self.model_for(nested.type_id, nested.descriptor)?;
        match (property.multiplicity(), value) {
            (Multiplicity::Scalar, Bson::Document(doc)) => {
                Ok(Bson::Document(self.apply_wire_names(&nested_model, doc)?))
            }
            (Multiplicity::Array, Bson::Array(items)) => {
                let mut encoded = Vec::with_capacity(items.len());
                for item in items {
                    encoded.push(match item {
                        Bson::Document(doc) => {
                            Bson::Document(self.apply_wire_names(&nested_model, doc)?)
                        }
                        other => other,
                    });
                }
                Ok(Bson::Array(encoded))
            }
            (Multiplicity::Map, Bson::Document(entries)) => {
                let mut encoded = Document::new();
                for (key, item) in entries {
                    let item = match item {
                        Bson::Document(doc) => {
                            Bson::Document(self.apply_wire_names(&nested_model, doc)?)
                        }
                        other => other,
                    };
                    encoded.insert(key, item);
                }
                Ok(Bson::Document(encoded))
            }
            (_, other) => Ok(other),
        }
    }

    /// Reverses [`apply_wire_names`](Self::apply_wire_names): stored names
    /// back to declared names, nested models recursively, unknown keys
    /// (the discriminator tag included) passed through for serde to ignore.
    fn unapply_wire_names(&self, model: &EntityModel, mut document: Document) -> MappingResult<Document> {
        let mut out = Document::new();
        for property in model.properties() {
            let Some(value) = document.remove(property.stored_name()) else {
                continue;
            };
            out.insert(property.name(), self.decode_property(property, value)?);
        }
        for (name, value) in document {
            out.insert(name, value);
        }
        Ok(out)
    }

    fn decode_property(&self, property: &PropertyModel, value: Bson) -> MappingResult<Bson> {
        let Some(nested) = property.nested() else {
            return Ok(value);
        };
        let nested_model = self.model_for(nested.type_id, nested.descriptor)?;
        match (property.multiplicity(), value) {
            (Multiplicity::Scalar, Bson::Document(doc)) => {
                Ok(Bson::Document(self.unapply_wire_names(&nested_model, doc)?))
            }
            (Multiplicity::Array, Bson::Array(items)) => {
                let mut decoded = Vec::with_capacity(items.len());
                for item in items {
                    decoded.push(match item {
                        Bson::Document(doc) => {
                            Bson::Document(self.unapply_wire_names(&nested_model, doc)?)
                        }
                        other => other,
                    });
                }
                Ok(Bson::Array(decoded))
            }
            (Multiplicity::Map, Bson::Document(entries)) => {
                let mut decoded = Document::new();
                for (key, item) in entries {
                    let item = match item {
                        Bson::Document(doc) => {
                            Bson::Document(self.unapply_wire_names(&nested_model, doc)?)
                        }
                        other => other,
                    };
                    decoded.insert(key, item);
                }
                Ok(Bson::Document(decoded))
            }
            (_, other) => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldDescriptor;
    use bson::doc;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Address {
        street: String,
        city: Option<String>,
    }

    impl Entity for Address {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::builder("Address")
                .field(FieldDescriptor::new("street").stored_as("st"))
                .field(FieldDescriptor::new("city"))
                .build()
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Hotel {
        id: i64,
        name: String,
        address: Address,
        tags: Vec<String>,
    }

    impl Entity for Hotel {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::builder("Hotel")
                .collection("hotels")
                .field(FieldDescriptor::new("id").identifier().stored_as("_id"))
                .field(FieldDescriptor::new("name").stored_as("n"))
                .field(FieldDescriptor::new("address").stored_as("addr").nested::<Address>())
                .field(FieldDescriptor::new("tags").array())
                .build()
        }
    }

    fn hotel() -> Hotel {
        Hotel {
            id: 7,
            name: "Fairmont".to_string(),
            address: Address { street: "Main".to_string(), city: None },
            tags: vec!["spa".to_string()],
        }
    }

    #[test]
    fn model_is_idempotent_and_shared() {
        let mapper = Mapper::new();
        let first = mapper.model::<Hotel>().unwrap();
        let second = mapper.model::<Hotel>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.collection(), "hotels");
        assert_eq!(first.identifier().unwrap().name(), "id");
    }

    #[test]
    fn concurrent_first_requests_converge() {
        let mapper = Mapper::new();
        let models: Vec<_> = std::thread::scope(|scope| {
            (0..8)
                .map(|_| scope.spawn(|| mapper.model::<Hotel>().unwrap()))
                .collect::<Vec<_>>()
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });
        for model in &models[1..] {
            assert!(Arc::ptr_eq(&models[0], model));
        }
    }

    #[test]
    fn encode_applies_stored_names_and_omits_nulls() {
        let mapper = Mapper::new();
        let encoded = mapper.encode(&hotel()).unwrap();
        assert_eq!(
            encoded,
            doc! {
                "_id": 7i64,
                "n": "Fairmont",
                "addr": { "st": "Main" },
                "tags": ["spa"],
            }
        );
    }

    #[test]
    fn decode_reverses_the_wire_pass() {
        let mapper = Mapper::new();
        let original = hotel();
        let decoded: Hotel = mapper.decode(mapper.encode(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn preserve_null_keeps_explicit_nulls() {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        struct Sparse {
            always: Option<String>,
        }
        impl Entity for Sparse {
            fn descriptor() -> EntityDescriptor {
                EntityDescriptor::builder("Sparse")
                    .field(FieldDescriptor::new("always").preserve_null())
                    .build()
            }
        }

        let mapper = Mapper::new();
        let encoded = mapper.encode(&Sparse { always: None }).unwrap();
        assert_eq!(encoded, doc! { "always": Bson::Null });
    }
}
