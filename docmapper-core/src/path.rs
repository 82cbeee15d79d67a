//! Dotted-path resolution against entity models.
//!
//! A [`PathTarget`] walks a dotted path (`"address.city"`) segment by
//! segment through an entity model, translating declared names to stored
//! names and descending into nested models. Resolution is strict by
//! default: a segment matching neither a declared nor a stored name fails
//! with a validation error. With validation disabled the unresolved suffix
//! passes through verbatim, which is how ad-hoc keys and server-side
//! operators reach the wire untouched.
//!
//! Positional segments (`"grades.0.score"`) are accepted under array
//! properties only; operator segments (`"$"`, `"$[]"`) always pass through.
//! A segment following a map property is treated as a literal key.

use std::sync::Arc;

use crate::{
    descriptor::Multiplicity,
    error::{MappingError, MappingResult},
    mapper::Mapper,
    model::{EntityModel, PropertyModel},
};

/// The outcome of resolving one dotted path.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    path: String,
    target: Option<PropertyModel>,
}

impl ResolvedPath {
    /// The stored-name form of the path, ready for the wire.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The property the final resolved segment landed on, when the walk
    /// stayed inside the model.
    pub fn target(&self) -> Option<&PropertyModel> {
        self.target.as_ref()
    }

    /// Consumes the resolution, returning the stored-name path.
    pub fn into_path(self) -> String {
        self.path
    }
}

/// Resolves dotted paths against one entity model.
pub struct PathTarget<'a> {
    mapper: &'a Mapper,
    root: Option<Arc<EntityModel>>,
    validate: bool,
}

impl<'a> PathTarget<'a> {
    /// Creates a strict resolver rooted at the given model.
    pub fn new(mapper: &'a Mapper, root: Arc<EntityModel>) -> Self {
        Self { mapper, root: Some(root), validate: true }
    }

    /// Creates a relaxed resolver: unresolved segments pass through
    /// verbatim instead of failing.
    pub fn relaxed(mapper: &'a Mapper, root: Arc<EntityModel>) -> Self {
        Self { mapper, root: Some(root), validate: false }
    }

    /// Creates a resolver with no model context; every path passes through
    /// verbatim.
    pub fn unmodeled(mapper: &'a Mapper) -> Self {
        Self { mapper, root: None, validate: false }
    }

    /// Overrides strictness on an existing resolver.
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Resolves `path`, translating declared names to stored names.
    ///
    /// Under strict validation the error names the first segment that
    /// failed to resolve; the same call can then be retried relaxed.
    pub fn resolve(&self, path: &str) -> MappingResult<ResolvedPath> {
        let Some(root) = &self.root else {
            return Ok(ResolvedPath { path: path.to_string(), target: None });
        };

        let segments: Vec<&str> = path.split('.').collect();
        let mut out: Vec<String> = Vec::with_capacity(segments.len());
        let mut model: Option<Arc<EntityModel>> = Some(root.clone());
        let mut target: Option<PropertyModel> = None;
        let mut expect_map_key = false;

        let mut index = 0;
        while index < segments.len() {
            let segment = segments[index];
            index += 1;

            if expect_map_key {
                out.push(segment.to_string());
                expect_map_key = false;
                continue;
            }
            if segment.starts_with('$') {
                out.push(segment.to_string());
                continue;
            }
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                let under_array = target
                    .as_ref()
                    .is_some_and(|property| property.multiplicity() == Multiplicity::Array);
                if under_array {
                    out.push(segment.to_string());
                    continue;
                }
                if self.validate {
                    return Err(self.unresolved(root, path, segment));
                }
                Self::pass_through(&mut out, segment, &segments[index..]);
                target = None;
                break;
            }

            let resolved = model.as_ref().and_then(|current| {
                current
                    .property(segment)
                    .or_else(|| current.property_by_stored_name(segment))
                    .cloned()
            });
            match resolved {
                Some(property) => {
                    out.push(property.stored_name().to_string());
                    model = match property.nested() {
                        Some(nested) => {
                            Some(self.mapper.model_for(nested.type_id, nested.descriptor)?)
                        }
                        None => None,
                    };
                    expect_map_key = property.multiplicity() == Multiplicity::Map;
                    target = Some(property);
                }
                None => {
                    if self.validate {
                        return Err(self.unresolved(root, path, segment));
                    }
                    Self::pass_through(&mut out, segment, &segments[index..]);
                    target = None;
                    break;
                }
            }
        }

        Ok(ResolvedPath { path: out.join("."), target })
    }

    fn pass_through(out: &mut Vec<String>, segment: &str, rest: &[&str]) {
        out.push(segment.to_string());
        out.extend(rest.iter().map(|s| s.to_string()));
    }

    fn unresolved(&self, root: &EntityModel, path: &str, segment: &str) -> MappingError {
        MappingError::UnresolvedPath {
            entity: root.name().to_string(),
            path: path.to_string(),
            segment: segment.to_string(),
        }
    }
}
