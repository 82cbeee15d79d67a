//! Typed update operators and their document rendering.
//!
//! An [`UpdateOperator`] pairs a wire operator tag (`$set`, `$inc`, ...)
//! with a field path and a deferred operand. [`render_updates`] groups a
//! list of operators into one update document: one sub-document per tag, in
//! first-appearance order, with field paths resolved through the context.
//!
//! Two operators addressing the same path under the same tag cannot both
//! survive in a document; the later one wins and the collision is logged.

use std::any::Any;

use bson::{Bson, Document};
use tracing::warn;

use crate::{codec::Literal, context::RenderContext, error::MappingResult};

enum UpdateValue {
    Literal(Literal),
    Path(String),
    Raw(Bson),
}

/// One update operation against one field.
pub struct UpdateOperator {
    operator: &'static str,
    field: String,
    value: UpdateValue,
}

impl UpdateOperator {
    fn literal<T: Any + Send + Sync>(
        operator: &'static str,
        field: impl Into<String>,
        value: T,
    ) -> Self {
        Self { operator, field: field.into(), value: UpdateValue::Literal(Literal::new(value)) }
    }

    fn raw(operator: &'static str, field: impl Into<String>, value: Bson) -> Self {
        Self { operator, field: field.into(), value: UpdateValue::Raw(value) }
    }

    /// Sets a field to a value.
    pub fn set<T: Any + Send + Sync>(field: impl Into<String>, value: T) -> Self {
        Self::literal("$set", field, value)
    }

    /// Removes a field.
    pub fn unset(field: impl Into<String>) -> Self {
        Self::raw("$unset", field, Bson::String(String::new()))
    }

    /// Adds to a numeric field.
    pub fn inc<T: Any + Send + Sync>(field: impl Into<String>, amount: T) -> Self {
        Self::literal("$inc", field, amount)
    }

    /// Multiplies a numeric field.
    pub fn mul<T: Any + Send + Sync>(field: impl Into<String>, factor: T) -> Self {
        Self::literal("$mul", field, factor)
    }

    /// Lowers a field to the given value if it is currently greater.
    pub fn min<T: Any + Send + Sync>(field: impl Into<String>, value: T) -> Self {
        Self::literal("$min", field, value)
    }

    /// Raises a field to the given value if it is currently smaller.
    pub fn max<T: Any + Send + Sync>(field: impl Into<String>, value: T) -> Self {
        Self::literal("$max", field, value)
    }

    /// Renames a field. Both the source and the target path are resolved
    /// against the model.
    pub fn rename(field: impl Into<String>, to: impl Into<String>) -> Self {
        Self { operator: "$rename", field: field.into(), value: UpdateValue::Path(to.into()) }
    }

    /// Appends a value to an array field.
    pub fn push<T: Any + Send + Sync>(field: impl Into<String>, value: T) -> Self {
        Self::literal("$push", field, value)
    }

    /// Removes matching values from an array field.
    pub fn pull<T: Any + Send + Sync>(field: impl Into<String>, value: T) -> Self {
        Self::literal("$pull", field, value)
    }

    /// Removes the first element of an array field.
    pub fn pop_first(field: impl Into<String>) -> Self {
        Self::raw("$pop", field, Bson::Int32(-1))
    }

    /// Removes the last element of an array field.
    pub fn pop_last(field: impl Into<String>) -> Self {
        Self::raw("$pop", field, Bson::Int32(1))
    }

    /// Appends a value to an array field unless already present.
    pub fn add_to_set<T: Any + Send + Sync>(field: impl Into<String>, value: T) -> Self {
        Self::literal("$addToSet", field, value)
    }

    /// Sets a field to the server's current timestamp.
    pub fn current_date(field: impl Into<String>) -> Self {
        Self::raw("$currentDate", field, Bson::Boolean(true))
    }

    fn render_value(&self, ctx: &RenderContext<'_>) -> MappingResult<Bson> {
        match &self.value {
            UpdateValue::Literal(literal) => ctx.encode(literal),
            UpdateValue::Path(path) => Ok(Bson::String(ctx.resolve_path(path)?)),
            UpdateValue::Raw(value) => Ok(value.clone()),
        }
    }
}

/// Renders a list of update operators into one update document.
///
/// Operator tags appear in first-appearance order; fields within a tag keep
/// their own first-appearance order. A repeated path under one tag is
/// overwritten by the later operator.
pub fn render_updates(
    updates: &[UpdateOperator],
    ctx: &RenderContext<'_>,
) -> MappingResult<Document> {
    let mut groups: Vec<(&'static str, Document)> = Vec::new();
    for update in updates {
        let path = ctx.resolve_path(&update.field)?;
        let value = update.render_value(ctx)?;
        let position = match groups.iter().position(|(tag, _)| *tag == update.operator) {
            Some(position) => position,
            None => {
                groups.push((update.operator, Document::new()));
                groups.len() - 1
            }
        };
        let group = &mut groups[position].1;
        if group.contains_key(&path) {
            warn!(
                operator = update.operator,
                path = path.as_str(),
                "duplicate update path, keeping the later value"
            );
        }
        group.insert(path, value);
    }

    let mut out = Document::new();
    for (tag, group) in groups {
        out.insert(tag, group);
    }
    Ok(out)
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
    struct Account {
        balance: i64,
        nickname: String,
        labels: Vec<String>,
    }

    impl Entity for Account {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::builder("Account")
                .field(FieldDescriptor::new("balance").stored_as("bal"))
                .field(FieldDescriptor::new("nickname"))
                .field(FieldDescriptor::new("labels").array())
                .build()
        }
    }

    fn ctx(mapper: &Mapper) -> RenderContext<'_> {
        RenderContext::for_entity::<Account>(mapper).unwrap()
    }

    #[test]
    fn groups_by_operator_in_first_appearance_order() {
        let mapper = Mapper::new();
        let updates = [
            UpdateOperator::set("nickname", "pat".to_string()),
            UpdateOperator::inc("balance", 5i64),
            UpdateOperator::set("balance", 0i64),
        ];
        let rendered = render_updates(&updates, &ctx(&mapper)).unwrap();
        assert_eq!(
            rendered,
            doc! {
                "$set": { "nickname": "pat", "bal": 0i64 },
                "$inc": { "bal": 5i64 },
            }
        );
        let tags: Vec<_> = rendered.keys().collect();
        assert_eq!(tags, vec!["$set", "$inc"]);
    }

    #[test]
    fn later_duplicate_path_wins() {
        let mapper = Mapper::new();
        let updates = [
            UpdateOperator::set("balance", 1i64),
            UpdateOperator::set("balance", 2i64),
        ];
        let rendered = render_updates(&updates, &ctx(&mapper)).unwrap();
        assert_eq!(rendered, doc! { "$set": { "bal": 2i64 } });
    }

    #[test]
    fn rename_resolves_both_paths() {
        let mapper = Mapper::new();
        let rendered =
            render_updates(&[UpdateOperator::rename("balance", "nickname")], &ctx(&mapper))
                .unwrap();
        assert_eq!(rendered, doc! { "$rename": { "bal": "nickname" } });
    }

    #[test]
    fn array_and_raw_operators_render() {
        let mapper = Mapper::new();
        let updates = [
            UpdateOperator::push("labels", "vip".to_string()),
            UpdateOperator::pop_first("labels"),
            UpdateOperator::unset("nickname"),
            UpdateOperator::current_date("nickname"),
        ];
        let rendered = render_updates(&updates, &ctx(&mapper)).unwrap();
        assert_eq!(
            rendered,
            doc! {
                "$push": { "labels": "vip" },
                "$pop": { "labels": -1 },
                "$unset": { "nickname": "" },
                "$currentDate": { "nickname": true },
            }
        );
    }

    #[test]
    fn unknown_path_fails_under_strict_validation() {
        let mapper = Mapper::new();
        let err =
            render_updates(&[UpdateOperator::set("bogus", 1i32)], &ctx(&mapper)).unwrap_err();
        assert!(err.is_validation());
    }
}
