//! Typed filter trees and their document rendering.
//!
//! A [`Filter`] is a wire-format-free description of a match condition.
//! Filters hold their operand values as deferred [`Literal`]s and only touch
//! the codec registry and path resolution when rendered against a
//! [`RenderContext`]. Rendering a comparison produces the canonical
//! `{path: {"$op": value}}` shape; [`render_filters`] merges operator
//! documents that land on the same field, so `gt` and `lte` on one field
//! become a single range document.
//!
//! # Example
//!
//! ```ignore
//! use docmapper_core::filter::{Filter, render_filters};
//!
//! let filters = [
//!     Filter::gt("price", 100i64),
//!     Filter::lte("price", 500i64),
//!     Filter::exists("discount"),
//! ];
//! let document = render_filters(&filters, &ctx)?;
//! // { "price": { "$gt": 100, "$lte": 500 }, "discount": { "$exists": true } }
//! ```

use std::any::Any;

use bson::{Bson, Document};

use crate::{codec::Literal, context::RenderContext, error::MappingResult};

/// A single match condition over entity fields.
#[derive(Debug)]
pub enum Filter {
    /// All inner filters must match.
    And(Vec<Filter>),
    /// At least one inner filter must match.
    Or(Vec<Filter>),
    /// No inner filter may match.
    Nor(Vec<Filter>),
    /// Negates a field-level condition.
    Not(Box<Filter>),
    /// Field presence test.
    Exists {
        /// The dotted field path.
        field: String,
        /// Whether the field must be present or absent.
        exists: bool,
    },
    /// Binary comparison between a field and a literal value.
    Compare {
        /// The wire operator, `$eq` through `$lte`.
        operator: &'static str,
        /// The dotted field path.
        field: String,
        /// The deferred comparison value.
        value: Literal,
    },
    /// Membership test against a value set.
    In {
        /// The dotted field path.
        field: String,
        /// The deferred candidate values.
        values: Vec<Literal>,
        /// When true, renders as `$nin` instead of `$in`.
        negated: bool,
    },
    /// Matches array fields whose elements satisfy all inner filters.
    ElemMatch {
        /// The dotted path of the array field.
        field: String,
        /// Conditions evaluated against each element.
        filters: Vec<Filter>,
    },
}

impl Filter {
    /// Equality comparison.
    pub fn eq<T: Any + Send + Sync>(field: impl Into<String>, value: T) -> Filter {
        Filter::compare("$eq", field, value)
    }

    /// Inequality comparison.
    pub fn ne<T: Any + Send + Sync>(field: impl Into<String>, value: T) -> Filter {
        Filter::compare("$ne", field, value)
    }

    /// Strictly-greater comparison.
    pub fn gt<T: Any + Send + Sync>(field: impl Into<String>, value: T) -> Filter {
        Filter::compare("$gt", field, value)
    }

    /// Greater-or-equal comparison.
    pub fn gte<T: Any + Send + Sync>(field: impl Into<String>, value: T) -> Filter {
        Filter::compare("$gte", field, value)
    }

    /// Strictly-less comparison.
    pub fn lt<T: Any + Send + Sync>(field: impl Into<String>, value: T) -> Filter {
        Filter::compare("$lt", field, value)
    }

    /// Less-or-equal comparison.
    pub fn lte<T: Any + Send + Sync>(field: impl Into<String>, value: T) -> Filter {
        Filter::compare("$lte", field, value)
    }

    fn compare<T: Any + Send + Sync>(
        operator: &'static str,
        field: impl Into<String>,
        value: T,
    ) -> Filter {
        Filter::Compare { operator, field: field.into(), value: Literal::new(value) }
    }

    /// Membership test.
    pub fn in_<T, I>(field: impl Into<String>, values: I) -> Filter
    where
        T: Any + Send + Sync,
        I: IntoIterator<Item = T>,
    {
        Filter::In {
            field: field.into(),
            values: values.into_iter().map(Literal::new).collect(),
            negated: false,
        }
    }

    /// Negated membership test.
    pub fn nin<T, I>(field: impl Into<String>, values: I) -> Filter
    where
        T: Any + Send + Sync,
        I: IntoIterator<Item = T>,
    {
        Filter::In {
            field: field.into(),
            values: values.into_iter().map(Literal::new).collect(),
            negated: true,
        }
    }

    /// Requires the field to be present.
    pub fn exists(field: impl Into<String>) -> Filter {
        Filter::Exists { field: field.into(), exists: true }
    }

    /// Requires the field to be absent.
    pub fn not_exists(field: impl Into<String>) -> Filter {
        Filter::Exists { field: field.into(), exists: false }
    }

    /// Conjunction of filters.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Filter {
        Filter::And(filters.into_iter().collect())
    }

    /// Disjunction of filters.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Filter {
        Filter::Or(filters.into_iter().collect())
    }

    /// Joint negation of filters.
    pub fn nor(filters: impl IntoIterator<Item = Filter>) -> Filter {
        Filter::Nor(filters.into_iter().collect())
    }

    /// Negates a field-level filter.
    pub fn not(filter: Filter) -> Filter {
        Filter::Not(Box::new(filter))
    }

    /// Array element match.
    pub fn elem_match(
        field: impl Into<String>,
        filters: impl IntoIterator<Item = Filter>,
    ) -> Filter {
        Filter::ElemMatch { field: field.into(), filters: filters.into_iter().collect() }
    }

    /// Renders this filter into its wire document form.
    pub fn render(&self, ctx: &RenderContext<'_>) -> MappingResult<Document> {
        match self {
            Filter::And(filters) => Self::render_logical("$and", filters, ctx),
            Filter::Or(filters) => Self::render_logical("$or", filters, ctx),
            Filter::Nor(filters) => Self::render_logical("$nor", filters, ctx),
            Filter::Not(inner) => {
                let mut out = Document::new();
                for (field, condition) in inner.render(ctx)? {
                    out.insert(field, bson::doc! { "$not": condition });
                }
                Ok(out)
            }
            Filter::Exists { field, exists } => {
                let path = ctx.resolve_path(field)?;
                Ok(bson::doc! { path: { "$exists": *exists } })
            }
            Filter::Compare { operator, field, value } => {
                let path = ctx.resolve_path(field)?;
                let value = ctx.encode(value)?;
                Ok(bson::doc! { path: { *operator: value } })
            }
            Filter::In { field, values, negated } => {
                let path = ctx.resolve_path(field)?;
                let operator = if *negated { "$nin" } else { "$in" };
                let values = values
                    .iter()
                    .map(|value| ctx.encode(value))
                    .collect::<MappingResult<Vec<Bson>>>()?;
                Ok(bson::doc! { path: { operator: values } })
            }
            Filter::ElemMatch { field, filters } => {
                let resolved = ctx.resolve(field)?;
                let element_ctx = match resolved.target() {
                    Some(property) => ctx.narrow_to_element(property)?,
                    None => ctx.without_model(),
                };
                let inner = render_filters(filters, &element_ctx)?;
                Ok(bson::doc! { resolved.into_path(): { "$elemMatch": inner } })
            }
        }
    }

    fn render_logical(
        operator: &'static str,
        filters: &[Filter],
        ctx: &RenderContext<'_>,
    ) -> MappingResult<Document> {
        let rendered = filters
            .iter()
            .map(|filter| filter.render(ctx).map(Bson::Document))
            .collect::<MappingResult<Vec<Bson>>>()?;
        Ok(bson::doc! { operator: rendered })
    }
}

/// Renders a filter list into one document, merging operator documents that
/// target the same field and concatenating repeated logical operators.
pub fn render_filters(filters: &[Filter], ctx: &RenderContext<'_>) -> MappingResult<Document> {
    let mut out = Document::new();
    for filter in filters {
        for (field, condition) in filter.render(ctx)? {
            merge_condition(&mut out, field, condition);
        }
    }
    Ok(out)
}

fn merge_condition(out: &mut Document, field: String, condition: Bson) {
    match out.get_mut(&field) {
        Some(Bson::Document(existing)) if condition.as_document().is_some() => {
            if let Bson::Document(incoming) = condition {
                existing.extend(incoming);
            }
        }
        Some(Bson::Array(existing)) if condition.as_array().is_some() => {
            if let Bson::Array(incoming) = condition {
                existing.extend(incoming);
            }
        }
        Some(slot) => *slot = condition,
        None => {
            out.insert(field, condition);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        descriptor::{Entity, EntityDescriptor, FieldDescriptor},
        mapper::Mapper,
    };
    use bson::doc;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Review {
        stars: i32,
        author: String,
    }

    impl Entity for Review {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::builder("Review")
                .field(FieldDescriptor::new("stars").stored_as("s"))
                .field(FieldDescriptor::new("author"))
                .build()
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Listing {
        price: i64,
        title: String,
        reviews: Vec<Review>,
    }

    impl Entity for Listing {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::builder("Listing")
                .field(FieldDescriptor::new("price").stored_as("p"))
                .field(FieldDescriptor::new("title"))
                .field(FieldDescriptor::new("reviews").array().nested::<Review>())
                .build()
        }
    }

    fn ctx(mapper: &Mapper) -> RenderContext<'_> {
        RenderContext::for_entity::<Listing>(mapper).unwrap()
    }

    #[test]
    fn comparison_renders_resolved_path_and_operator() {
        let mapper = Mapper::new();
        let rendered = Filter::gt("price", 100i64).render(&ctx(&mapper)).unwrap();
        assert_eq!(rendered, doc! { "p": { "$gt": 100i64 } });
    }

    #[test]
    fn range_conditions_merge_on_one_field() {
        let mapper = Mapper::new();
        let filters = [Filter::gt("price", 100i64), Filter::lte("price", 500i64)];
        let rendered = render_filters(&filters, &ctx(&mapper)).unwrap();
        assert_eq!(rendered, doc! { "p": { "$gt": 100i64, "$lte": 500i64 } });
    }

    #[test]
    fn logical_operators_nest() {
        let mapper = Mapper::new();
        let filter = Filter::or([
            Filter::eq("title", "loft".to_string()),
            Filter::lt("price", 50i64),
        ]);
        let rendered = filter.render(&ctx(&mapper)).unwrap();
        assert_eq!(
            rendered,
            doc! { "$or": [ { "title": { "$eq": "loft" } }, { "p": { "$lt": 50i64 } } ] }
        );
    }

    #[test]
    fn membership_encodes_each_value() {
        let mapper = Mapper::new();
        let rendered =
            Filter::in_("price", [10i64, 20i64]).render(&ctx(&mapper)).unwrap();
        assert_eq!(rendered, doc! { "p": { "$in": [10i64, 20i64] } });
    }

    #[test]
    fn not_wraps_the_field_condition() {
        let mapper = Mapper::new();
        let rendered = Filter::not(Filter::gte("price", 9i64)).render(&ctx(&mapper)).unwrap();
        assert_eq!(rendered, doc! { "p": { "$not": { "$gte": 9i64 } } });
    }

    #[test]
    fn elem_match_resolves_against_element_model() {
        let mapper = Mapper::new();
        let filter = Filter::elem_match(
            "reviews",
            [Filter::gte("stars", 4), Filter::eq("author", "kim".to_string())],
        );
        let rendered = filter.render(&ctx(&mapper)).unwrap();
        assert_eq!(
            rendered,
            doc! { "reviews": { "$elemMatch": {
                "s": { "$gte": 4 },
                "author": { "$eq": "kim" },
            } } }
        );
    }

    #[test]
    fn strict_context_rejects_unknown_fields() {
        let mapper = Mapper::new();
        let err = Filter::exists("bogus").render(&ctx(&mapper)).unwrap_err();
        assert!(err.is_validation());
    }
}
