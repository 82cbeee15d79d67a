//! Declarative index metadata and its conversion to wire documents.
//!
//! Index declarations live on descriptors as [`Index`] values (entity-level
//! compound indexes) or as legacy per-field annotations
//! ([`IndexedMeta`](crate::descriptor::IndexedMeta) /
//! [`TextMeta`](crate::descriptor::TextMeta)). The [`IndexHelper`]
//! normalizes both forms into one shape and converts them into the key and
//! options documents a collection manager hands to the server.
//!
//! Key paths resolve through [`PathTarget`] with the same strict/relaxed
//! split as query rendering; `disable_validation` on the options switches a
//! declaration to verbatim paths. The wildcard path `$**` always passes
//! through untouched.

use std::sync::Arc;

use bson::{Bson, Document};

use crate::{
    error::{MappingError, MappingResult},
    mapper::Mapper,
    model::{EntityModel, PropertyModel},
    path::PathTarget,
};

/// Direction of a legacy single-field index annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexDirection {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// Index key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// Ascending key, rendered as `1`.
    Asc,
    /// Descending key, rendered as `-1`.
    Desc,
    /// Text index key, rendered as `"text"`.
    Text,
    /// Hashed key, rendered as `"hashed"`.
    Hashed,
}

impl IndexType {
    fn render(self) -> Bson {
        match self {
            IndexType::Asc => Bson::Int32(1),
            IndexType::Desc => Bson::Int32(-1),
            IndexType::Text => Bson::String("text".to_string()),
            IndexType::Hashed => Bson::String("hashed".to_string()),
        }
    }
}

impl From<IndexDirection> for IndexType {
    fn from(direction: IndexDirection) -> Self {
        match direction {
            IndexDirection::Asc => IndexType::Asc,
            IndexDirection::Desc => IndexType::Desc,
        }
    }
}

/// One key of an index declaration.
#[derive(Debug, Clone)]
pub struct IndexField {
    path: String,
    index_type: IndexType,
    weight: Option<u32>,
}

impl IndexField {
    /// Creates an index key on the given dotted path.
    pub fn new(path: impl Into<String>, index_type: IndexType) -> Self {
        Self { path: path.into(), index_type, weight: None }
    }

    /// Creates a weighted text-search key. The weight only makes sense on
    /// [`IndexType::Text`] fields; conversion rejects it elsewhere.
    pub fn weighted(path: impl Into<String>, index_type: IndexType, weight: u32) -> Self {
        Self { path: path.into(), index_type, weight: Some(weight) }
    }

    /// The declared dotted path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The key type.
    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    /// The text-search weight, if any.
    pub fn weight(&self) -> Option<u32> {
        self.weight
    }
}

/// Case-first ordering for collations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseFirst {
    /// Uppercase sorts first.
    Upper,
    /// Lowercase sorts first.
    Lower,
    /// No case-based ordering.
    Off,
}

impl CaseFirst {
    fn as_str(self) -> &'static str {
        match self {
            CaseFirst::Upper => "upper",
            CaseFirst::Lower => "lower",
            CaseFirst::Off => "off",
        }
    }
}

/// Comparison strength for collations, rendered as its numeric level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollationStrength {
    /// Base characters only.
    Primary,
    /// Adds diacritics.
    Secondary,
    /// Adds case and variants.
    Tertiary,
    /// Adds punctuation when alternate is shifted.
    Quaternary,
    /// Full tie-breaking on code point.
    Identical,
}

impl CollationStrength {
    fn level(self) -> i32 {
        match self {
            CollationStrength::Primary => 1,
            CollationStrength::Secondary => 2,
            CollationStrength::Tertiary => 3,
            CollationStrength::Quaternary => 4,
            CollationStrength::Identical => 5,
        }
    }
}

/// Handling of ignorable characters such as whitespace and punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alternate {
    /// Ignorable characters are base characters.
    NonIgnorable,
    /// Ignorable characters are dropped below quaternary strength.
    Shifted,
}

impl Alternate {
    fn as_str(self) -> &'static str {
        match self {
            Alternate::NonIgnorable => "non-ignorable",
            Alternate::Shifted => "shifted",
        }
    }
}

/// Which characters count as ignorable when alternate is shifted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxVariable {
    /// Whitespace and punctuation.
    Punct,
    /// Whitespace only.
    Space,
}

impl MaxVariable {
    fn as_str(self) -> &'static str {
        match self {
            MaxVariable::Punct => "punct",
            MaxVariable::Space => "space",
        }
    }
}

/// Collation settings attached to an index declaration.
///
/// The [`DEFAULT_LOCALE`](Collation::DEFAULT_LOCALE) sentinel is replaced
/// with the mapper's configured locale at conversion time, never stored.
#[derive(Debug, Clone, Default)]
pub struct Collation {
    locale: String,
    case_level: Option<bool>,
    case_first: Option<CaseFirst>,
    strength: Option<CollationStrength>,
    numeric_ordering: Option<bool>,
    alternate: Option<Alternate>,
    max_variable: Option<MaxVariable>,
    backwards: Option<bool>,
    normalization: Option<bool>,
}

impl Collation {
    /// Sentinel locale resolved against
    /// [`MapperOptions::default_locale`](crate::mapper::MapperOptions) at
    /// conversion time.
    pub const DEFAULT_LOCALE: &'static str = "$default$";

    /// Creates a collation for an explicit locale.
    pub fn new(locale: impl Into<String>) -> Self {
        Self { locale: locale.into(), ..Self::default() }
    }

    /// Creates a collation deferring the locale to the mapper's options.
    pub fn default_locale() -> Self {
        Self::new(Self::DEFAULT_LOCALE)
    }

    /// Distinguishes base characters by case at secondary strength.
    pub fn case_level(mut self, case_level: bool) -> Self {
        self.case_level = Some(case_level);
        self
    }

    /// Sets the case-first ordering.
    pub fn case_first(mut self, case_first: CaseFirst) -> Self {
        self.case_first = Some(case_first);
        self
    }

    /// Sets the comparison strength.
    pub fn strength(mut self, strength: CollationStrength) -> Self {
        self.strength = Some(strength);
        self
    }

    /// Compares numeric substrings by numeric value.
    pub fn numeric_ordering(mut self, numeric_ordering: bool) -> Self {
        self.numeric_ordering = Some(numeric_ordering);
        self
    }

    /// Sets the ignorable-character handling.
    pub fn alternate(mut self, alternate: Alternate) -> Self {
        self.alternate = Some(alternate);
        self
    }

    /// Sets which characters are ignorable under shifted alternate.
    pub fn max_variable(mut self, max_variable: MaxVariable) -> Self {
        self.max_variable = Some(max_variable);
        self
    }

    /// Compares secondary differences in reverse order.
    pub fn backwards(mut self, backwards: bool) -> Self {
        self.backwards = Some(backwards);
        self
    }

    /// Normalizes text to Unicode NFD before comparison.
    pub fn normalization(mut self, normalization: bool) -> Self {
        self.normalization = Some(normalization);
        self
    }
}

/// Options attached to an index declaration.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    name: Option<String>,
    background: bool,
    unique: bool,
    sparse: bool,
    expire_after_seconds: Option<i64>,
    partial_filter: Option<String>,
    language: Option<String>,
    language_override: Option<String>,
    collation: Option<Collation>,
    disable_validation: bool,
}

impl IndexOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the index instead of letting the server derive a name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds the index in the background.
    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }

    /// Enforces key uniqueness.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Skips documents missing the indexed fields.
    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    /// Expires documents this many seconds after the indexed timestamp.
    pub fn expire_after_seconds(mut self, seconds: i64) -> Self {
        self.expire_after_seconds = Some(seconds);
        self
    }

    /// Restricts the index to documents matching the given filter, supplied
    /// as a JSON object source string.
    pub fn partial_filter(mut self, filter: impl Into<String>) -> Self {
        self.partial_filter = Some(filter.into());
        self
    }

    /// Sets the default language for text indexes.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Names the document field carrying a per-document language override.
    pub fn language_override(mut self, field: impl Into<String>) -> Self {
        self.language_override = Some(field.into());
        self
    }

    /// Attaches collation settings.
    pub fn collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Turns off key-path and weight validation for this declaration;
    /// unresolved paths pass through verbatim.
    pub fn disable_validation(mut self) -> Self {
        self.disable_validation = true;
        self
    }

    /// Whether validation is disabled for this declaration.
    pub fn is_validation_disabled(&self) -> bool {
        self.disable_validation
    }
}

/// A full index declaration: ordered keys plus options.
#[derive(Debug, Clone, Default)]
pub struct Index {
    fields: Vec<IndexField>,
    options: IndexOptions,
}

impl Index {
    /// Creates an empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a key. Key order is the wire order.
    pub fn field(mut self, field: IndexField) -> Self {
        self.fields.push(field);
        self
    }

    /// Attaches options.
    pub fn options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    /// The ordered keys.
    pub fn fields(&self) -> &[IndexField] {
        &self.fields
    }
}

/// A converted index, ready for a `createIndexes` call.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// The key document, paths already resolved.
    pub keys: Document,
    /// The options document.
    pub options: Document,
}

/// Converts declarative index metadata into wire documents.
pub struct IndexHelper<'a> {
    mapper: &'a Mapper,
}

impl<'a> IndexHelper<'a> {
    /// Creates a helper backed by the given mapper.
    pub fn new(mapper: &'a Mapper) -> Self {
        Self { mapper }
    }

    /// Collects and converts every index declared on the entity: compound
    /// declarations first (inherited ones included), then normalized
    /// per-field annotations, in property order.
    pub fn entity_indexes(&self, model: &Arc<EntityModel>) -> MappingResult<Vec<IndexSpec>> {
        let mut declarations: Vec<Index> = model.indexes().to_vec();
        for property in model.properties() {
            if let Some(meta) = property.indexed() {
                declarations.push(Self::convert_indexed(property, meta));
            }
            if let Some(meta) = property.text() {
                declarations.push(Self::convert_text(property, meta));
            }
        }

        declarations
            .iter()
            .map(|index| {
                Ok(IndexSpec {
                    keys: self.calculate_keys(model, index)?,
                    options: self.build_index_options(model, index)?,
                })
            })
            .collect()
    }

    /// Normalizes a legacy single-field annotation into a full declaration.
    pub fn convert_indexed(
        property: &PropertyModel,
        meta: &crate::descriptor::IndexedMeta,
    ) -> Index {
        Index::new()
            .field(IndexField::new(property.name(), meta.direction.into()))
            .options(meta.options.clone())
    }

    /// Normalizes a legacy text annotation into a full declaration.
    pub fn convert_text(property: &PropertyModel, meta: &crate::descriptor::TextMeta) -> Index {
        Index::new()
            .field(IndexField::weighted(property.name(), IndexType::Text, meta.weight))
            .options(meta.options.clone())
    }

    /// Builds the key document for one declaration, resolving each path.
    ///
    /// A weight on a non-text key fails unless validation is disabled. The
    /// wildcard path `$**` passes through verbatim.
    pub fn calculate_keys(
        &self,
        model: &Arc<EntityModel>,
        index: &Index,
    ) -> MappingResult<Document> {
        let mut keys = Document::new();
        for field in index.fields() {
            if field.weight().is_some()
                && field.index_type() != IndexType::Text
                && !index.options.disable_validation
            {
                return Err(MappingError::WeightOnNonTextField {
                    entity: model.name(),
                    field: field.path().to_string(),
                });
            }
            let path = self.find_field(model, &index.options, field.path())?;
            keys.insert(path, field.index_type().render());
        }
        Ok(keys)
    }

    /// Resolves one key path to its stored form.
    ///
    /// Wildcard paths pass through. With validation disabled, unresolved
    /// segments pass through verbatim instead of failing.
    pub fn find_field(
        &self,
        model: &Arc<EntityModel>,
        options: &IndexOptions,
        path: &str,
    ) -> MappingResult<String> {
        if path == "$**" {
            return Ok(path.to_string());
        }
        let target = PathTarget::new(self.mapper, model.clone())
            .validate(!options.disable_validation);
        Ok(target.resolve(path)?.into_path())
    }

    /// Builds the options document for one declaration.
    pub fn build_index_options(
        &self,
        model: &Arc<EntityModel>,
        index: &Index,
    ) -> MappingResult<Document> {
        let options = &index.options;
        let mut out = Document::new();
        if let Some(name) = &options.name {
            out.insert("name", name.clone());
        }
        if options.background {
            out.insert("background", true);
        }
        if options.unique {
            out.insert("unique", true);
        }
        if options.sparse {
            out.insert("sparse", true);
        }
        if let Some(seconds) = options.expire_after_seconds {
            out.insert("expireAfterSeconds", seconds);
        }

        let mut weights = Document::new();
        for field in index.fields() {
            if let Some(weight) = field.weight() {
                let path = self.find_field(model, options, field.path())?;
                weights.insert(path, i64::from(weight));
            }
        }
        if !weights.is_empty() {
            out.insert("weights", weights);
        }

        if let Some(language) = &options.language {
            out.insert("default_language", language.clone());
        }
        if let Some(language_override) = &options.language_override {
            out.insert("language_override", language_override.clone());
        }
        if let Some(filter) = &options.partial_filter {
            out.insert("partialFilterExpression", Self::parse_partial_filter(filter)?);
        }
        if let Some(collation) = &options.collation {
            if let Some(converted) = self.convert_collation(collation) {
                out.insert("collation", converted);
            }
        }
        Ok(out)
    }

    /// Converts collation settings into their wire document.
    ///
    /// An empty locale means "no collation" and yields `None`; the
    /// default-locale sentinel resolves against the mapper's options.
    pub fn convert_collation(&self, collation: &Collation) -> Option<Document> {
        if collation.locale.is_empty() {
            return None;
        }
        let locale = if collation.locale == Collation::DEFAULT_LOCALE {
            self.mapper.options().default_locale.clone()
        } else {
            collation.locale.clone()
        };
        let mut out = Document::new();
        out.insert("locale", locale);
        if let Some(case_level) = collation.case_level {
            out.insert("caseLevel", case_level);
        }
        if let Some(case_first) = collation.case_first {
            out.insert("caseFirst", case_first.as_str());
        }
        if let Some(strength) = collation.strength {
            out.insert("strength", strength.level());
        }
        if let Some(numeric_ordering) = collation.numeric_ordering {
            out.insert("numericOrdering", numeric_ordering);
        }
        if let Some(alternate) = collation.alternate {
            out.insert("alternate", alternate.as_str());
        }
        if let Some(max_variable) = collation.max_variable {
            out.insert("maxVariable", max_variable.as_str());
        }
        if let Some(backwards) = collation.backwards {
            out.insert("backwards", backwards);
        }
        if let Some(normalization) = collation.normalization {
            out.insert("normalization", normalization);
        }
        Some(out)
    }

    fn parse_partial_filter(source: &str) -> MappingResult<Document> {
        let value: serde_json::Value = serde_json::from_str(source)
            .map_err(|err| MappingError::PartialFilter(err.to_string()))?;
        match bson::ser::serialize_to_bson(&value) {
            Ok(Bson::Document(document)) => Ok(document),
            Ok(_) => Err(MappingError::PartialFilter("expected a JSON object".to_string())),
            Err(err) => Err(MappingError::PartialFilter(err.to_string())),
        }
    }
}
