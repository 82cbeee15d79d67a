//! End-to-end conversion of declarative index metadata into wire documents.

use bson::doc;
use docmapper_core::{
    descriptor::{Entity, EntityDescriptor, FieldDescriptor, IndexedMeta, TextMeta},
    error::MappingError,
    index::{
        Alternate, CaseFirst, Collation, CollationStrength, Index, IndexDirection, IndexField,
        IndexHelper, IndexOptions, IndexType, MaxVariable,
    },
    mapper::{Mapper, MapperOptions},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Inner {
    name: String,
}

impl Entity for Inner {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::builder("Inner")
            .field(FieldDescriptor::new("name"))
            .build()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Article {
    headline: String,
    nested: Inner,
    score: i32,
}

impl Entity for Article {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::builder("Article")
            .field(FieldDescriptor::new("headline"))
            .field(FieldDescriptor::new("nested").stored_as("nest").nested::<Inner>())
            .field(FieldDescriptor::new("score"))
            .build()
    }
}

#[test]
fn calculate_keys_resolves_aliases_and_renders_types() {
    let mapper = Mapper::new();
    let model = mapper.model::<Article>().unwrap();
    let helper = IndexHelper::new(&mapper);

    let index = Index::new()
        .field(IndexField::weighted("headline", IndexType::Text, 10))
        .field(IndexField::new("nested", IndexType::Desc));
    let keys = helper.calculate_keys(&model, &index).unwrap();
    assert_eq!(keys, doc! { "headline": "text", "nest": -1 });
}

#[test]
fn weight_on_a_non_text_field_is_rejected() {
    let mapper = Mapper::new();
    let model = mapper.model::<Article>().unwrap();
    let helper = IndexHelper::new(&mapper);

    let index = Index::new().field(IndexField::weighted("nested", IndexType::Desc, 5));
    let err = helper.calculate_keys(&model, &index).unwrap_err();
    assert!(matches!(err, MappingError::WeightOnNonTextField { .. }));

    // the same declaration passes with validation disabled: the weight is
    // ignored by the key document but still lands in the options
    let index = Index::new()
        .field(IndexField::weighted("nested", IndexType::Desc, 5))
        .options(IndexOptions::new().disable_validation());
    let keys = helper.calculate_keys(&model, &index).unwrap();
    assert_eq!(keys, doc! { "nest": -1 });

    let options = helper.build_index_options(&model, &index).unwrap();
    assert_eq!(options.get_document("weights").unwrap(), &doc! { "nest": 5i64 });
}

#[test]
fn wildcard_paths_pass_through() {
    let mapper = Mapper::new();
    let model = mapper.model::<Article>().unwrap();
    let helper = IndexHelper::new(&mapper);

    let index = Index::new().field(IndexField::new("$**", IndexType::Text));
    let keys = helper.calculate_keys(&model, &index).unwrap();
    assert_eq!(keys, doc! { "$**": "text" });
}

#[test]
fn find_field_translates_nested_aliases() {
    let mapper = Mapper::new();
    let model = mapper.model::<Article>().unwrap();
    let helper = IndexHelper::new(&mapper);
    let options = IndexOptions::new();

    assert_eq!(helper.find_field(&model, &options, "nested.name").unwrap(), "nest.name");

    let err = helper.find_field(&model, &options, "bogus.name").unwrap_err();
    assert!(err.is_validation());

    let relaxed = IndexOptions::new().disable_validation();
    assert_eq!(helper.find_field(&model, &relaxed, "bogus.name").unwrap(), "bogus.name");
}

#[test]
fn collation_converts_every_setting() {
    let mapper = Mapper::new();
    let helper = IndexHelper::new(&mapper);

    let collation = Collation::new("en")
        .case_level(true)
        .case_first(CaseFirst::Upper)
        .strength(CollationStrength::Identical)
        .numeric_ordering(true)
        .alternate(Alternate::Shifted)
        .max_variable(MaxVariable::Space)
        .backwards(true)
        .normalization(true);
    assert_eq!(
        helper.convert_collation(&collation).unwrap(),
        doc! {
            "locale": "en",
            "caseLevel": true,
            "caseFirst": "upper",
            "strength": 5,
            "numericOrdering": true,
            "alternate": "shifted",
            "maxVariable": "space",
            "backwards": true,
            "normalization": true,
        }
    );
}

#[test]
fn default_locale_sentinel_resolves_against_mapper_options() {
    let mapper = Mapper::with_options(MapperOptions { default_locale: "fr".to_string() });
    let helper = IndexHelper::new(&mapper);

    let converted = helper.convert_collation(&Collation::default_locale()).unwrap();
    assert_eq!(converted.get_str("locale").unwrap(), "fr");

    // an empty locale means "no collation"
    assert!(helper.convert_collation(&Collation::default()).is_none());
}

#[test]
fn index_options_render_weights_filters_and_languages() {
    let mapper = Mapper::new();
    let model = mapper.model::<Article>().unwrap();
    let helper = IndexHelper::new(&mapper);

    let index = Index::new()
        .field(IndexField::weighted("headline", IndexType::Text, 10))
        .options(
            IndexOptions::new()
                .name("search")
                .background()
                .unique()
                .sparse()
                .expire_after_seconds(3600)
                .language("english")
                .language_override("lang")
                .partial_filter(r#"{"score": {"$gt": 0}}"#)
                .collation(Collation::new("en").strength(CollationStrength::Secondary)),
        );

    let options = helper.build_index_options(&model, &index).unwrap();
    assert_eq!(
        options,
        doc! {
            "name": "search",
            "background": true,
            "unique": true,
            "sparse": true,
            "expireAfterSeconds": 3600i64,
            "weights": { "headline": 10i64 },
            "default_language": "english",
            "language_override": "lang",
            "partialFilterExpression": { "score": { "$gt": 0i64 } },
            "collation": { "locale": "en", "strength": 2 },
        }
    );
}

#[test]
fn malformed_partial_filters_fail() {
    let mapper = Mapper::new();
    let model = mapper.model::<Article>().unwrap();
    let helper = IndexHelper::new(&mapper);

    let index = Index::new()
        .field(IndexField::new("score", IndexType::Asc))
        .options(IndexOptions::new().partial_filter("not json"));
    let err = helper.build_index_options(&model, &index).unwrap_err();
    assert!(matches!(err, MappingError::PartialFilter(_)));
}

#[test]
fn legacy_annotations_normalize_into_full_declarations() {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Tagged {
        label: String,
        body: String,
    }

    impl Entity for Tagged {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::builder("Tagged")
                .field(
                    FieldDescriptor::new("label")
                        .stored_as("l")
                        .indexed_with(IndexedMeta::new(IndexDirection::Desc).options(
                            IndexOptions::new().unique(),
                        )),
                )
                .field(FieldDescriptor::new("body").text_with(TextMeta::new(3)))
                .build()
        }
    }

    let mapper = Mapper::new();
    let model = mapper.model::<Tagged>().unwrap();
    let helper = IndexHelper::new(&mapper);

    let specs = helper.entity_indexes(&model).unwrap();
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].keys, doc! { "l": -1 });
    assert_eq!(specs[0].options, doc! { "unique": true });
    assert_eq!(specs[1].keys, doc! { "body": "text" });
    assert_eq!(specs[1].options, doc! { "weights": { "body": 3i64 } });
}

#[test]
fn parent_declared_indexes_materialize_on_the_concrete_entity() {
    fn base_descriptor() -> EntityDescriptor {
        EntityDescriptor::builder("Base")
            .field(FieldDescriptor::new("created"))
            .index(Index::new().field(IndexField::new("created", IndexType::Desc)))
            .build()
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Concrete {
        created: i64,
        title: String,
    }

    impl Entity for Concrete {
        fn descriptor() -> EntityDescriptor {
            EntityDescriptor::builder("Concrete")
                .parent(base_descriptor())
                .field(FieldDescriptor::new("title"))
                .index(Index::new().field(IndexField::new("title", IndexType::Asc)))
                .build()
        }
    }

    let mapper = Mapper::new();
    let model = mapper.model::<Concrete>().unwrap();
    let helper = IndexHelper::new(&mapper);

    let specs = helper.entity_indexes(&model).unwrap();
    let keys: Vec<_> = specs.iter().map(|spec| spec.keys.clone()).collect();
    assert_eq!(keys, vec![doc! { "created": -1 }, doc! { "title": 1 }]);
}
