use apollo_compiler::ExecutableDocument;
use apollo_compiler::name;
use pretty_assertions::assert_eq;

use super::LegacyCompilerContext;
use super::operation_id;
use super::transform_to_legacy_ir;
use crate::compiler::CompilerContext;
use crate::compiler::CompilerOptions;
use crate::compiler::Condition;
use crate::schema::CompilerSchema;

const ZOO_SCHEMA: &str = r#"
type Query {
  id: ID!
  animal: Animal
}

interface Animal {
  name: String!
}

type Dog implements Animal {
  name: String!
  bark: String!
}

type Cat implements Animal {
  name: String!
  meow: String!
}
"#;

fn compile_with_options(schema_doc: &str, query: &str, options: CompilerOptions) -> CompilerContext {
    let schema = CompilerSchema::parse(schema_doc, "schema.graphql").unwrap();
    let document =
        ExecutableDocument::parse_and_validate(schema.schema(), query, "query.graphql").unwrap();
    CompilerContext::from_document(schema, &document, "query.graphql", options).unwrap()
}

fn lower(schema_doc: &str, query: &str) -> LegacyCompilerContext {
    lower_with_options(schema_doc, query, CompilerOptions::default())
}

fn lower_with_options(
    schema_doc: &str,
    query: &str,
    options: CompilerOptions,
) -> LegacyCompilerContext {
    transform_to_legacy_ir(&compile_with_options(schema_doc, query, options)).unwrap()
}

#[test]
fn flattens_interface_narrowings_into_inline_fragments() {
    let lowered = lower(
        ZOO_SCHEMA,
        r#"
query Zoo {
  id
  animal {
    name
    ... on Dog {
      bark
    }
    ... on Cat {
      meow
    }
  }
}
"#,
    );
    let operation = &lowered.operations["Zoo"];
    let top_level: Vec<_> = operation
        .selections
        .fields
        .iter()
        .map(|field| field.response_name.as_str())
        .collect();
    assert_eq!(top_level, vec!["id", "animal"]);

    let animal = operation.selections.fields[1].selection_set.as_ref().unwrap();
    assert_eq!(
        animal
            .fields
            .iter()
            .map(|field| field.response_name.as_str())
            .collect::<Vec<_>>(),
        vec!["name"]
    );
    assert!(animal.fragment_spreads.is_empty());

    let inline_fragments: Vec<(Vec<&str>, Vec<&str>)> = animal
        .inline_fragments
        .iter()
        .map(|inline_fragment| {
            (
                inline_fragment
                    .possible_types
                    .iter()
                    .map(|ty| ty.as_str())
                    .collect(),
                inline_fragment
                    .fields
                    .iter()
                    .map(|field| field.response_name.as_str())
                    .collect(),
            )
        })
        .collect();
    assert_eq!(
        inline_fragments,
        vec![(vec!["Dog"], vec!["bark"]), (vec!["Cat"], vec!["meow"])]
    );

    let by_type = animal.inline_fragments_by_type();
    assert_eq!(
        by_type.keys().map(|ty| ty.as_str()).collect::<Vec<_>>(),
        vec!["Dog", "Cat"]
    );
    assert_eq!(by_type[&name!("Dog")].type_condition, name!("Dog"));
}

#[test]
fn elides_records_redundant_with_the_default_case() {
    let lowered = lower(
        ZOO_SCHEMA,
        r#"
query Zoo {
  animal {
    ... on Animal {
      name
    }
  }
}
"#,
    );
    let animal = lowered.operations["Zoo"].selections.fields[0]
        .selection_set
        .as_ref()
        .unwrap();
    assert_eq!(
        animal
            .fields
            .iter()
            .map(|field| field.response_name.as_str())
            .collect::<Vec<_>>(),
        vec!["name"]
    );
    assert!(animal.inline_fragments.is_empty());
}

#[test]
fn fans_records_out_per_concrete_type() {
    let schema_doc = r#"
type Query {
  resident: Resident
}

interface Animal {
  name: String!
}

type Dog implements Animal {
  name: String!
}

type Cat implements Animal {
  name: String!
}

type Bird {
  wingspan: Int!
}

union Resident = Dog | Cat | Bird
"#;
    let lowered = lower(
        schema_doc,
        r#"
query Residents {
  resident {
    ... on Animal {
      name
    }
  }
}
"#,
    );
    let resident = lowered.operations["Residents"].selections.fields[0]
        .selection_set
        .as_ref()
        .unwrap();
    assert!(resident.fields.is_empty());

    // One record over {Dog, Cat} becomes one inline fragment per type, each
    // scoped to exactly that type and carrying the same fields.
    let inline_fragments: Vec<(&str, Vec<&str>, Vec<&str>)> = resident
        .inline_fragments
        .iter()
        .map(|inline_fragment| {
            (
                inline_fragment.type_condition.as_str(),
                inline_fragment
                    .possible_types
                    .iter()
                    .map(|ty| ty.as_str())
                    .collect(),
                inline_fragment
                    .fields
                    .iter()
                    .map(|field| field.response_name.as_str())
                    .collect(),
            )
        })
        .collect();
    assert_eq!(
        inline_fragments,
        vec![
            ("Dog", vec!["Dog"], vec!["name"]),
            ("Cat", vec!["Cat"], vec!["name"]),
        ]
    );
}

#[test]
fn narrowing_spreads_attach_to_matching_inline_fragments_only() {
    let lowered = lower(
        ZOO_SCHEMA,
        r#"
query Zoo {
  animal {
    name
    ...DogDetails
  }
}

fragment DogDetails on Dog {
  bark
}
"#,
    );
    let operation = &lowered.operations["Zoo"];
    let animal = operation.selections.fields[0].selection_set.as_ref().unwrap();

    // The spread narrows Animal to Dog: invisible at the parent level,
    // visible (and merged in) under the Dog narrowing.
    assert!(animal.fragment_spreads.is_empty());
    assert_eq!(animal.inline_fragments.len(), 1);
    let dog = &animal.inline_fragments[0];
    assert_eq!(dog.type_condition, name!("Dog"));
    assert_eq!(
        dog.fields
            .iter()
            .map(|field| field.response_name.as_str())
            .collect::<Vec<_>>(),
        vec!["bark"]
    );
    assert_eq!(dog.fragment_spreads, vec![name!("DogDetails")]);

    assert_eq!(operation.fragments_referenced, vec![name!("DogDetails")]);
    assert!(operation.source_with_fragments.contains("fragment DogDetails on Dog"));

    // The fragment itself is lowered too.
    let fragment = &lowered.fragments[&name!("DogDetails")];
    assert_eq!(fragment.type_condition, name!("Dog"));
    assert_eq!(
        fragment
            .possible_types
            .iter()
            .map(|ty| ty.as_str())
            .collect::<Vec<_>>(),
        vec!["Dog"]
    );
    assert_eq!(
        fragment
            .selections
            .fields
            .iter()
            .map(|field| field.response_name.as_str())
            .collect::<Vec<_>>(),
        vec!["bark"]
    );
}

#[test]
fn compatible_spreads_stay_at_the_parent_level() {
    let lowered = lower(
        ZOO_SCHEMA,
        r#"
query Zoo {
  animal {
    name
    ...AnimalDetails
  }
}

fragment AnimalDetails on Animal {
  name
}
"#,
    );
    let animal = lowered.operations["Zoo"].selections.fields[0]
        .selection_set
        .as_ref()
        .unwrap();
    assert_eq!(animal.fragment_spreads, vec![name!("AnimalDetails")]);
    // The fragment's `name` merges into the one already selected.
    assert_eq!(
        animal
            .fields
            .iter()
            .map(|field| field.response_name.as_str())
            .collect::<Vec<_>>(),
        vec!["name"]
    );
    assert!(animal.inline_fragments.is_empty());
}

#[test]
fn merging_spread_fields_can_be_disabled() {
    let options = CompilerOptions {
        merge_in_fields_from_fragment_spreads: false,
        ..Default::default()
    };
    let lowered = lower_with_options(
        ZOO_SCHEMA,
        r#"
query Zoo {
  animal {
    name
    ...DogDetails
  }
}

fragment DogDetails on Dog {
  bark
}
"#,
        options,
    );
    let operation = &lowered.operations["Zoo"];
    let animal = operation.selections.fields[0].selection_set.as_ref().unwrap();

    // Without merging the spread contributes no fields, so the Dog record is
    // empty and dropped; the spread still counts as referenced.
    assert_eq!(
        animal
            .fields
            .iter()
            .map(|field| field.response_name.as_str())
            .collect::<Vec<_>>(),
        vec!["name"]
    );
    assert!(animal.inline_fragments.is_empty());
    assert!(animal.fragment_spreads.is_empty());
    assert_eq!(operation.fragments_referenced, vec![name!("DogDetails")]);
}

#[test]
fn compatible_spreads_contribute_no_fields_without_merging() {
    let options = CompilerOptions {
        merge_in_fields_from_fragment_spreads: false,
        ..Default::default()
    };
    let lowered = lower_with_options(
        ZOO_SCHEMA,
        r#"
query Zoo {
  animal {
    ...AnimalDetails
  }
}

fragment AnimalDetails on Animal {
  name
}
"#,
        options,
    );
    let animal = lowered.operations["Zoo"].selections.fields[0]
        .selection_set
        .as_ref()
        .unwrap();

    // The spread stays visible by name, but its fields are only reachable
    // through the lowered fragment itself.
    assert!(animal.fields.is_empty());
    assert_eq!(animal.fragment_spreads, vec![name!("AnimalDetails")]);
    assert!(animal.inline_fragments.is_empty());
    assert_eq!(
        lowered.fragments[&name!("AnimalDetails")]
            .selections
            .fields
            .iter()
            .map(|field| field.response_name.as_str())
            .collect::<Vec<_>>(),
        vec!["name"]
    );
}

#[test]
fn boolean_conditions_survive_lowering() {
    let lowered = lower(
        ZOO_SCHEMA,
        r#"
query Zoo($withDog: Boolean!, $noBark: Boolean!) {
  animal {
    name
    ... on Dog @include(if: $withDog) {
      bark @skip(if: $noBark)
    }
  }
}
"#,
    );
    let animal = lowered.operations["Zoo"].selections.fields[0]
        .selection_set
        .as_ref()
        .unwrap();
    let dog = &animal.inline_fragments[0];
    let bark = &dog.fields[0];
    assert!(bark.is_conditional);
    // The field's own condition comes first, then the enclosing fragment's.
    assert_eq!(
        bark.conditions,
        Some(vec![
            Condition {
                variable: name!("noBark"),
                inverted: true,
            },
            Condition {
                variable: name!("withDog"),
                inverted: false,
            },
        ])
    );

    let name = &animal.fields[0];
    assert!(!name.is_conditional);
    assert_eq!(name.conditions, None);
}

#[test]
fn spreads_under_boolean_conditions_stay_visible() {
    let lowered = lower(
        ZOO_SCHEMA,
        r#"
query Zoo($flag: Boolean!) {
  animal {
    name
    ...AnimalDetails @include(if: $flag)
  }
}

fragment AnimalDetails on Animal {
  name
}
"#,
    );
    let animal = lowered.operations["Zoo"].selections.fields[0]
        .selection_set
        .as_ref()
        .unwrap();
    assert_eq!(animal.fragment_spreads, vec![name!("AnimalDetails")]);
}

#[test]
fn duplicate_response_keys_merge_unconditionally_when_any_is_unconditional() {
    let lowered = lower(
        ZOO_SCHEMA,
        r#"
query Zoo($flag: Boolean!) {
  id @include(if: $flag)
  id
}
"#,
    );
    let operation = &lowered.operations["Zoo"];
    assert_eq!(operation.selections.fields.len(), 1);
    let id = &operation.selections.fields[0];
    assert!(!id.is_conditional);
    assert_eq!(id.conditions, None);
}

#[test]
fn field_metadata_copies_through() {
    let schema_doc = r#"
type Query {
  "The numeric identifier."
  id: ID! @deprecated(reason: "Use uuid instead.")
  uuid: String!
}
"#;
    let lowered = lower(
        schema_doc,
        r#"
query Ids {
  theId: id
}
"#,
    );
    let field = &lowered.operations["Ids"].selections.fields[0];
    assert_eq!(field.response_name, name!("theId"));
    assert_eq!(field.field_name, name!("id"));
    assert_eq!(field.ty.to_string(), "ID!");
    assert_eq!(field.description.as_deref(), Some("The numeric identifier."));
    assert!(field.is_deprecated);
    assert_eq!(field.deprecation_reason.as_deref(), Some("Use uuid instead."));
    assert!(field.selection_set.is_none());
}

#[test]
fn fragments_referenced_in_depth_first_order() {
    let lowered = lower(
        ZOO_SCHEMA,
        r#"
query Zoo {
  animal {
    ...First
    ...Second
  }
}

fragment First on Animal {
  name
  ...Nested
}

fragment Nested on Animal {
  name
}

fragment Second on Animal {
  name
}
"#,
    );
    let operation = &lowered.operations["Zoo"];
    assert_eq!(
        operation.fragments_referenced,
        vec![name!("First"), name!("Nested"), name!("Second")]
    );
    let first_at = operation.source_with_fragments.find("fragment First").unwrap();
    let nested_at = operation.source_with_fragments.find("fragment Nested").unwrap();
    let second_at = operation.source_with_fragments.find("fragment Second").unwrap();
    assert!(first_at < nested_at && nested_at < second_at);
}

#[test]
fn operation_ids_hash_the_source_with_fragments() {
    let query = r#"
query Zoo {
  animal {
    ...AnimalDetails
  }
}

fragment AnimalDetails on Animal {
  name
}
"#;
    let without_ids = lower(ZOO_SCHEMA, query);
    assert_eq!(without_ids.operations["Zoo"].operation_id, None);

    let options = CompilerOptions {
        generate_operation_ids: true,
        ..Default::default()
    };
    let lowered = lower_with_options(ZOO_SCHEMA, query, options);
    let operation = &lowered.operations["Zoo"];
    let id = operation.operation_id.as_deref().unwrap();
    assert_eq!(id.len(), 64);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(id, operation_id(&operation.source_with_fragments));
}

#[test]
fn lowering_is_deterministic() {
    let context = compile_with_options(
        ZOO_SCHEMA,
        r#"
query Zoo {
  animal {
    name
    ... on Dog {
      bark
    }
    ...CatDetails
  }
}

fragment CatDetails on Cat {
  meow
}
"#,
        CompilerOptions::default(),
    );
    let first = transform_to_legacy_ir(&context).unwrap();
    let second = transform_to_legacy_ir(&context).unwrap();
    assert_eq!(first.operations, second.operations);
    assert_eq!(first.fragments, second.fragments);
}
