//! Aggregation pipeline compilation.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s rendered into wire
//! documents in declaration order, never reordered. Each stage renders
//! against the context produced by the stage before it: stages that reshape
//! the document stream (`$group`, `$project`, `$count`) hand a model-free
//! context downstream, so later stages address computed fields without
//! tripping schema validation, while pass-through stages keep the entity
//! model in scope.
//!
//! # Example
//!
//! ```ignore
//! use docmapper_core::aggregation::{Group, Pipeline, SortOrder, Stage};
//! use docmapper_core::expressions::{accumulators, Expression};
//! use docmapper_core::filter::Filter;
//!
//! let pipeline = Pipeline::new()
//!     .stage(Stage::match_filters([Filter::gte("amount", 10i64)]))
//!     .stage(Stage::Group(
//!         Group::by(Expression::field("region"))
//!             .field("total", accumulators::sum(Expression::field("amount"))),
//!     ))
//!     .stage(Stage::sort([("total", SortOrder::Desc)]));
//! let documents = pipeline.render(&ctx)?;
//! ```

use bson::{Bson, Document};

use crate::{
    context::RenderContext,
    error::MappingResult,
    expressions::Expression,
    filter::{Filter, render_filters},
};

/// Sort direction for `$sort` and `sortBy` specifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending, rendered as `1`.
    Asc,
    /// Descending, rendered as `-1`.
    Desc,
}

impl SortOrder {
    fn render(self) -> Bson {
        match self {
            SortOrder::Asc => Bson::Int32(1),
            SortOrder::Desc => Bson::Int32(-1),
        }
    }
}

/// Builder for a `$group` stage.
#[derive(Debug)]
pub struct Group {
    id: Option<Expression>,
    fields: Vec<(String, Expression)>,
}

impl Group {
    /// Groups by the given key expression.
    pub fn by(id: Expression) -> Self {
        Self { id: Some(id), fields: Vec::new() }
    }

    /// Groups the whole stream into one document (`_id: null`).
    pub fn all() -> Self {
        Self { id: None, fields: Vec::new() }
    }

    /// Adds an accumulated output field.
    pub fn field(mut self, name: impl Into<String>, expression: Expression) -> Self {
        self.fields.push((name.into(), expression));
        self
    }

    fn render(&self, ctx: &RenderContext<'_>) -> MappingResult<Document> {
        let mut out = Document::new();
        let id = match &self.id {
            Some(expression) => expression.render(ctx)?,
            None => Bson::Null,
        };
        out.insert("_id", id);
        for (name, expression) in &self.fields {
            out.insert(name.clone(), expression.render(ctx)?);
        }
        Ok(out)
    }
}

enum ProjectionValue {
    Include,
    Exclude,
    Computed(Expression),
}

/// Builder for a `$project` stage.
pub struct Projection {
    fields: Vec<(String, ProjectionValue)>,
}

impl Default for Projection {
    fn default() -> Self {
        Self::new()
    }
}

impl Projection {
    /// Creates an empty projection.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Includes a modeled field; the path is resolved.
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.fields.push((path.into(), ProjectionValue::Include));
        self
    }

    /// Excludes a modeled field; the path is resolved.
    pub fn exclude(mut self, path: impl Into<String>) -> Self {
        self.fields.push((path.into(), ProjectionValue::Exclude));
        self
    }

    /// Adds a computed field. The output name is kept verbatim; the
    /// expression resolves against the stage's input model.
    pub fn computed(mut self, name: impl Into<String>, expression: Expression) -> Self {
        self.fields.push((name.into(), ProjectionValue::Computed(expression)));
        self
    }

    fn render(&self, ctx: &RenderContext<'_>) -> MappingResult<Document> {
        let mut out = Document::new();
        for (name, value) in &self.fields {
            match value {
                ProjectionValue::Include => {
                    out.insert(ctx.resolve_path(name)?, Bson::Int32(1));
                }
                ProjectionValue::Exclude => {
                    out.insert(ctx.resolve_path(name)?, Bson::Int32(0));
                }
                ProjectionValue::Computed(expression) => {
                    out.insert(name.clone(), expression.render(ctx)?);
                }
            }
        }
        Ok(out)
    }
}

/// Window bounds for a `$setWindowFields` output field.
#[derive(Debug, Clone)]
pub struct Window {
    documents: [Bson; 2],
}

impl Window {
    /// A document-position window, bounds given as `"unbounded"`,
    /// `"current"`, or integer offsets.
    pub fn documents(lower: impl Into<Bson>, upper: impl Into<Bson>) -> Self {
        Self { documents: [lower.into(), upper.into()] }
    }

    fn render(&self) -> Document {
        bson::doc! { "documents": [self.documents[0].clone(), self.documents[1].clone()] }
    }
}

/// Builder for a `$setWindowFields` stage.
pub struct SetWindowFields {
    partition_by: Option<Expression>,
    sort_by: Vec<(String, SortOrder)>,
    outputs: Vec<(String, Expression, Option<Window>)>,
}

impl Default for SetWindowFields {
    fn default() -> Self {
        Self::new()
    }
}

impl SetWindowFields {
    /// Creates an empty window-fields specification.
    pub fn new() -> Self {
        Self { partition_by: None, sort_by: Vec::new(), outputs: Vec::new() }
    }

    /// Partitions the stream by the given expression.
    pub fn partition_by(mut self, expression: Expression) -> Self {
        self.partition_by = Some(expression);
        self
    }

    /// Adds a sort key for in-partition ordering.
    pub fn sort_by(mut self, path: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by.push((path.into(), order));
        self
    }

    /// Adds an output field computed over the given window.
    pub fn output(
        mut self,
        name: impl Into<String>,
        expression: Expression,
        window: Option<Window>,
    ) -> Self {
        self.outputs.push((name.into(), expression, window));
        self
    }

    fn render(&self, ctx: &RenderContext<'_>) -> MappingResult<Document> {
        let mut out = Document::new();
        if let Some(partition) = &self.partition_by {
            out.insert("partitionBy", partition.render(ctx)?);
        }
        if !self.sort_by.is_empty() {
            let mut sort = Document::new();
            for (path, order) in &self.sort_by {
                sort.insert(ctx.resolve_path(path)?, order.render());
            }
            out.insert("sortBy", sort);
        }
        let mut output = Document::new();
        for (name, expression, window) in &self.outputs {
            let mut spec = match expression.render(ctx)? {
                Bson::Document(doc) => doc,
                other => bson::doc! { "$expr": other },
            };
            if let Some(window) = window {
                spec.insert("window", window.render());
            }
            output.insert(name.clone(), spec);
        }
        out.insert("output", output);
        Ok(out)
    }
}

/// One aggregation pipeline stage.
pub enum Stage {
    /// `$match` over the stage's input documents.
    Match(Vec<Filter>),
    /// `$group` aggregation.
    Group(Group),
    /// `$project` reshaping.
    Project(Projection),
    /// `$sort` by resolved paths.
    Sort(Vec<(String, SortOrder)>),
    /// `$limit`.
    Limit(i64),
    /// `$skip`.
    Skip(i64),
    /// `$unwind` of an array field.
    Unwind {
        /// The dotted path of the array field.
        path: String,
        /// Keep documents whose array is null, missing, or empty.
        preserve_null_and_empty: bool,
    },
    /// `$count` into a named output field.
    Count(String),
    /// `$setWindowFields` windowed computation.
    SetWindowFields(SetWindowFields),
}

impl Stage {
    /// A `$match` stage.
    pub fn match_filters(filters: impl IntoIterator<Item = Filter>) -> Stage {
        Stage::Match(filters.into_iter().collect())
    }

    /// A `$sort` stage.
    pub fn sort<P: Into<String>>(keys: impl IntoIterator<Item = (P, SortOrder)>) -> Stage {
        Stage::Sort(keys.into_iter().map(|(path, order)| (path.into(), order)).collect())
    }

    /// A plain `$unwind` stage.
    pub fn unwind(path: impl Into<String>) -> Stage {
        Stage::Unwind { path: path.into(), preserve_null_and_empty: false }
    }

    /// Renders the stage, returning its document and the context for the
    /// stage after it.
    pub fn render<'a>(
        &self,
        ctx: &RenderContext<'a>,
    ) -> MappingResult<(Document, RenderContext<'a>)> {
        match self {
            Stage::Match(filters) => {
                let document = bson::doc! { "$match": render_filters(filters, ctx)? };
                Ok((document, ctx.clone()))
            }
            Stage::Group(group) => {
                let document = bson::doc! { "$group": group.render(ctx)? };
                Ok((document, ctx.without_model()))
            }
            Stage::Project(projection) => {
                let document = bson::doc! { "$project": projection.render(ctx)? };
                Ok((document, ctx.without_model()))
            }
            Stage::Sort(keys) => {
                let mut sort = Document::new();
                for (path, order) in keys {
                    sort.insert(ctx.resolve_path(path)?, order.render());
                }
                Ok((bson::doc! { "$sort": sort }, ctx.clone()))
            }
            Stage::Limit(limit) => Ok((bson::doc! { "$limit": *limit }, ctx.clone())),
            Stage::Skip(skip) => Ok((bson::doc! { "$skip": *skip }, ctx.clone())),
            Stage::Unwind { path, preserve_null_and_empty } => {
                let reference = format!("${}", ctx.resolve_path(path)?);
                let document = if *preserve_null_and_empty {
                    bson::doc! { "$unwind": {
                        "path": reference,
                        "preserveNullAndEmptyArrays": true,
                    } }
                } else {
                    bson::doc! { "$unwind": reference }
                };
                Ok((document, ctx.clone()))
            }
            Stage::Count(name) => {
                Ok((bson::doc! { "$count": name.clone() }, ctx.without_model()))
            }
            Stage::SetWindowFields(fields) => {
                let document = bson::doc! { "$setWindowFields": fields.render(ctx)? };
                Ok((document, ctx.clone()))
            }
        }
    }
}

/// An ordered aggregation pipeline.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Appends a stage. Stage order is the wire order.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// The stages in declaration order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Renders every stage in order, threading each stage's output context
    /// into the next.
    pub fn render(&self, ctx: &RenderContext<'_>) -> MappingResult<Vec<Document>> {
        let mut documents = Vec::with_capacity(self.stages.len());
        let mut current = ctx.clone();
        for stage in &self.stages {
            let (document, next) = stage.render(&current)?;
            documents.push(document);
            current = next;
        }
        Ok(documents)
    }
}
