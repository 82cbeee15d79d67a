//! Aggregation expression trees.
//!
//! An [`Expression`] is a recursive value tree: field references, deferred
//! literals, and named operators over operand lists. Rendering produces the
//! wire shape `{"$op": [operand, ...]}`, collapsing single-operand
//! operators to `{"$op": operand}`. Field references resolve through the
//! active [`RenderContext`] and keep their `$` prefix.
//!
//! Constructor functions are grouped the way the wire operators are:
//! [`comparison`], [`arithmetic`], and [`accumulators`].

use std::any::Any;

use bson::Bson;

use crate::{codec::Literal, context::RenderContext, error::MappingResult};

/// One node of an aggregation expression tree.
#[derive(Debug)]
pub enum Expression {
    /// A `$`-prefixed reference to a document field.
    Field(String),
    /// A constant, encoded through the codec registry at render time.
    Literal(Literal),
    /// A named operator applied to operand expressions.
    Operator {
        /// The wire operator name, including the `$` prefix.
        name: &'static str,
        /// The operand list, order-significant.
        operands: Vec<Expression>,
    },
}

impl Expression {
    /// References a document field. The `$` prefix is optional.
    pub fn field(name: impl Into<String>) -> Expression {
        let name = name.into();
        match name.strip_prefix('$') {
            Some(path) => Expression::Field(path.to_string()),
            None => Expression::Field(name),
        }
    }

    /// Wraps a constant value.
    pub fn literal<T: Any + Send + Sync>(value: T) -> Expression {
        Expression::Literal(Literal::new(value))
    }

    /// Applies a named operator to operands.
    pub fn operator(
        name: &'static str,
        operands: impl IntoIterator<Item = Expression>,
    ) -> Expression {
        Expression::Operator { name, operands: operands.into_iter().collect() }
    }

    /// Renders this expression into its wire value.
    pub fn render(&self, ctx: &RenderContext<'_>) -> MappingResult<Bson> {
        match self {
            Expression::Field(path) => {
                Ok(Bson::String(format!("${}", ctx.resolve_path(path)?)))
            }
            Expression::Literal(literal) => ctx.encode(literal),
            Expression::Operator { name, operands } => {
                let rendered = match operands.as_slice() {
                    [single] => single.render(ctx)?,
                    many => Bson::Array(
                        many.iter()
                            .map(|operand| operand.render(ctx))
                            .collect::<MappingResult<Vec<Bson>>>()?,
                    ),
                };
                Ok(Bson::Document(bson::doc! { *name: rendered }))
            }
        }
    }
}

/// Comparison operators.
pub mod comparison {
    use super::Expression;

    /// Three-way comparison.
    pub fn cmp(left: Expression, right: Expression) -> Expression {
        Expression::operator("$cmp", [left, right])
    }

    /// Equality test.
    pub fn eq(left: Expression, right: Expression) -> Expression {
        Expression::operator("$eq", [left, right])
    }

    /// Inequality test.
    pub fn ne(left: Expression, right: Expression) -> Expression {
        Expression::operator("$ne", [left, right])
    }

    /// Strictly-greater test.
    pub fn gt(left: Expression, right: Expression) -> Expression {
        Expression::operator("$gt", [left, right])
    }

    /// Greater-or-equal test.
    pub fn gte(left: Expression, right: Expression) -> Expression {
        Expression::operator("$gte", [left, right])
    }

    /// Strictly-less test.
    pub fn lt(left: Expression, right: Expression) -> Expression {
        Expression::operator("$lt", [left, right])
    }

    /// Less-or-equal test.
    pub fn lte(left: Expression, right: Expression) -> Expression {
        Expression::operator("$lte", [left, right])
    }
}

/// Arithmetic operators.
pub mod arithmetic {
    use super::Expression;

    /// Sum of the operands.
    pub fn add(operands: impl IntoIterator<Item = Expression>) -> Expression {
        Expression::operator("$add", operands)
    }

    /// Difference of two operands.
    pub fn subtract(left: Expression, right: Expression) -> Expression {
        Expression::operator("$subtract", [left, right])
    }

    /// Product of the operands.
    pub fn multiply(operands: impl IntoIterator<Item = Expression>) -> Expression {
        Expression::operator("$multiply", operands)
    }

    /// Quotient of two operands.
    pub fn divide(left: Expression, right: Expression) -> Expression {
        Expression::operator("$divide", [left, right])
    }

    /// Remainder of two operands.
    pub fn modulo(left: Expression, right: Expression) -> Expression {
        Expression::operator("$mod", [left, right])
    }

    /// Absolute value.
    pub fn abs(operand: Expression) -> Expression {
        Expression::operator("$abs", [operand])
    }
}

/// Accumulator operators for grouping stages.
pub mod accumulators {
    use super::Expression;

    /// Running sum.
    pub fn sum(operand: Expression) -> Expression {
        Expression::operator("$sum", [operand])
    }

    /// Running average.
    pub fn avg(operand: Expression) -> Expression {
        Expression::operator("$avg", [operand])
    }

    /// Running minimum.
    pub fn min(operand: Expression) -> Expression {
        Expression::operator("$min", [operand])
    }

    /// Running maximum.
    pub fn max(operand: Expression) -> Expression {
        Expression::operator("$max", [operand])
    }

    /// First value in group order.
    pub fn first(operand: Expression) -> Expression {
        Expression::operator("$first", [operand])
    }

    /// Last value in group order.
    pub fn last(operand: Expression) -> Expression {
        Expression::operator("$last", [operand])
    }

    /// Collects values into an array.
    pub fn push(operand: Expression) -> Expression {
        Expression::operator("$push", [operand])
    }

    /// Collects distinct values into an array.
    pub fn add_to_set(operand: Expression) -> Expression {
        Expression::operator("$addToSet", [operand])
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
    struct Sale {
        amount: i64,
        quantity: i32,
    }

    impl Entity for Sale {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::builder("Sale")
                .field(FieldDescriptor::new("amount").stored_as("amt"))
                .field(FieldDescriptor::new("quantity").stored_as("qty"))
                .build()
        }
    }

    fn ctx(mapper: &Mapper) -> RenderContext<'_> {
        RenderContext::for_entity::<Sale>(mapper).unwrap()
    }

    #[test]
    fn field_references_resolve_and_keep_prefix() {
        let mapper = Mapper::new();
        let rendered = Expression::field("$amount").render(&ctx(&mapper)).unwrap();
        assert_eq!(rendered, Bson::String("$amt".to_string()));
    }

    #[test]
    fn single_operand_collapses() {
        let mapper = Mapper::new();
        let rendered =
            accumulators::sum(Expression::field("amount")).render(&ctx(&mapper)).unwrap();
        assert_eq!(rendered, Bson::Document(doc! { "$sum": "$amt" }));
    }

    #[test]
    fn operand_lists_render_as_arrays() {
        let mapper = Mapper::new();
        let expression = arithmetic::multiply([
            Expression::field("amount"),
            Expression::field("quantity"),
        ]);
        let rendered = expression.render(&ctx(&mapper)).unwrap();
        assert_eq!(rendered, Bson::Document(doc! { "$multiply": ["$amt", "$qty"] }));
    }

    #[test]
    fn trees_nest() {
        let mapper = Mapper::new();
        let expression = comparison::gt(
            arithmetic::subtract(Expression::field("amount"), Expression::literal(10i64)),
            Expression::literal(0i64),
        );
        let rendered = expression.render(&ctx(&mapper)).unwrap();
        assert_eq!(
            rendered,
            Bson::Document(doc! { "$gt": [ { "$subtract": ["$amt", 10i64] }, 0i64 ] })
        );
    }
}
