//! Rendering context threaded through query, update, and pipeline
//! compilation.
//!
//! A [`RenderContext`] bundles the three things every render step needs:
//! the [`Mapper`] (for models and codecs), the entity model the current
//! subtree is scoped to (if any), and the validation mode. Stages that
//! reshape documents hand a narrowed context to the stages after them, so
//! path validation stops at the reshaping boundary instead of rejecting
//! computed field names.

use std::sync::Arc;

use bson::Bson;

use crate::{
    codec::Literal,
    descriptor::Multiplicity,
    error::MappingResult,
    mapper::Mapper,
    model::{EntityModel, PropertyModel},
    path::{PathTarget, ResolvedPath},
};

/// Schema context for one render pass.
#[derive(Clone)]
pub struct RenderContext<'a> {
    mapper: &'a Mapper,
    model: Option<Arc<EntityModel>>,
    validate: bool,
}

impl<'a> RenderContext<'a> {
    /// Creates a strict context rooted at the model for `E`.
    pub fn for_entity<E: crate::descriptor::Entity>(mapper: &'a Mapper) -> MappingResult<Self> {
        Ok(Self { mapper, model: Some(mapper.model::<E>()?), validate: true })
    }

    /// Creates a strict context rooted at an already-resolved model.
    pub fn for_model(mapper: &'a Mapper, model: Arc<EntityModel>) -> Self {
        Self { mapper, model: Some(model), validate: true }
    }

    /// Creates a context with no model; paths and field names pass through
    /// verbatim.
    pub fn unmodeled(mapper: &'a Mapper) -> Self {
        Self { mapper, model: None, validate: false }
    }

    /// Disables path validation: unresolved segments render verbatim.
    pub fn relaxed(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Returns a context with the model dropped, for stages downstream of a
    /// document-reshaping boundary.
    pub fn without_model(&self) -> Self {
        Self { mapper: self.mapper, model: None, validate: false }
    }

    /// Returns a context scoped to the element type of an array property,
    /// for subtrees that match against array elements.
    pub fn narrow_to_element(&self, property: &PropertyModel) -> MappingResult<Self> {
        let model = match property.nested() {
            Some(nested) if property.multiplicity() != Multiplicity::Scalar => {
                Some(self.mapper.model_for(nested.type_id, nested.descriptor)?)
            }
            _ => None,
        };
        Ok(Self {
            mapper: self.mapper,
            validate: self.validate && model.is_some(),
            model,
        })
    }

    /// The mapper backing this context.
    pub fn mapper(&self) -> &'a Mapper {
        self.mapper
    }

    /// The entity model in scope, if any.
    pub fn model(&self) -> Option<&Arc<EntityModel>> {
        self.model.as_ref()
    }

    /// Whether strict path validation is in effect.
    pub fn is_strict(&self) -> bool {
        self.validate
    }

    /// Resolves a dotted path against the context's model.
    pub fn resolve(&self, path: &str) -> MappingResult<ResolvedPath> {
        self.path_target().resolve(path)
    }

    /// Resolves a dotted path, returning only the stored-name form.
    pub fn resolve_path(&self, path: &str) -> MappingResult<String> {
        Ok(self.resolve(path)?.into_path())
    }

    /// Resolves a `$`-prefixed field reference, keeping the prefix.
    ///
    /// A name without the prefix resolves as a plain path.
    pub fn resolve_field_ref(&self, name: &str) -> MappingResult<String> {
        match name.strip_prefix('$') {
            Some(path) => Ok(format!("${}", self.resolve_path(path)?)),
            None => self.resolve_path(name),
        }
    }

    /// Encodes a deferred literal through the mapper's codec registry.
    pub fn encode(&self, literal: &Literal) -> MappingResult<Bson> {
        literal.encode_with(self.mapper.codecs())
    }

    fn path_target(&self) -> PathTarget<'a> {
        match &self.model {
            Some(model) => {
                PathTarget::new(self.mapper, model.clone()).validate(self.validate)
            }
            None => PathTarget::unmodeled(self.mapper),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Entity, EntityDescriptor, FieldDescriptor};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Review {
        stars: i32,
    }

    impl Entity for Review {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::builder("Review")
                .field(FieldDescriptor::new("stars").stored_as("s"))
                .build()
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Venue {
        title: String,
        reviews: Vec<Review>,
    }

    impl Entity for Venue {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::builder("Venue")
                .field(FieldDescriptor::new("title").stored_as("t"))
                .field(FieldDescriptor::new("reviews").array().nested::<Review>())
                .build()
        }
    }

    #[test]
    fn field_refs_keep_their_prefix() {
        let mapper = Mapper::new();
        let ctx = RenderContext::for_entity::<Venue>(&mapper).unwrap();
        assert_eq!(ctx.resolve_field_ref("$title").unwrap(), "$t");
        assert_eq!(ctx.resolve_field_ref("title").unwrap(), "t");
    }

    #[test]
    fn narrowing_to_an_array_element_switches_models() {
        let mapper = Mapper::new();
        let ctx = RenderContext::for_entity::<Venue>(&mapper).unwrap();
        let resolved = ctx.resolve("reviews").unwrap();
        let element = ctx.narrow_to_element(resolved.target().unwrap()).unwrap();
        assert_eq!(element.resolve_path("stars").unwrap(), "s");
    }

    #[test]
    fn dropping_the_model_disables_validation() {
        let mapper = Mapper::new();
        let ctx = RenderContext::for_entity::<Venue>(&mapper).unwrap();
        assert!(ctx.resolve_path("made.up").is_err());
        assert_eq!(ctx.without_model().resolve_path("made.up").unwrap(), "made.up");
    }
}
