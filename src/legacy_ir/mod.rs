//! Lowering the typed compiler IR into the flattened legacy shape.
//!
//! Legacy generators consume a flattened view of each selection set: a plain
//! field list for the default case, one inline fragment per concrete type for
//! every type-specific variation, and the names of the named fragments
//! visible at each level of narrowing. This module rebuilds every operation
//! and fragment of a [`CompilerContext`] into that shape.
//!
//! The output is a freshly allocated immutable tree. It shares nothing with
//! the upstream selection-set objects except immutable leaves (names, type
//! references, argument nodes).

use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::collections::IndexSet;
use itertools::Itertools;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::compiler::CompilerContext;
use crate::compiler::CompilerOptions;
use crate::compiler::Condition;
use crate::compiler::Field;
use crate::compiler::Operation;
use crate::compiler::OperationKind;
use crate::compiler::Selection;
use crate::compiler::SelectionSet;
use crate::compiler::Variable;
use crate::compiler::merge::merged_selection_set;
use crate::compiler::type_case::TypeCase;
use crate::compiler::type_case::covers_all;
use crate::error::LegacyIrError;
use crate::schema::CompilerSchema;

#[cfg(test)]
mod tests;

/// Records with zero fields are dropped from the inline-fragment output.
///
/// This mirrors what the legacy compiler produced and is an output-format
/// compatibility rule, not a logical requirement of the flattening.
const RETAIN_EMPTY_RECORDS: bool = false;

/// The lowered form of a whole [`CompilerContext`], handed to code
/// generators as an immutable snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct LegacyCompilerContext {
    #[serde(skip)]
    pub schema: CompilerSchema,
    pub operations: IndexMap<String, LegacyOperation>,
    pub fragments: IndexMap<Name, LegacyFragment>,
    pub types_used: IndexSet<Name>,
    pub options: CompilerOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyOperation {
    pub file_path: String,
    pub operation_name: String,
    pub operation_kind: OperationKind,
    pub root_type: Name,
    pub variables: Vec<Variable>,
    pub source: String,
    pub selections: FlattenedSelections,
    /// Transitive closure of the named fragments reachable through spreads,
    /// in depth-first first-visit order.
    pub fragments_referenced: Vec<Name>,
    /// The operation source followed by the source of every referenced
    /// fragment, newline-joined.
    pub source_with_fragments: String,
    pub operation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyFragment {
    pub fragment_name: Name,
    pub type_condition: Name,
    pub possible_types: IndexSet<Name>,
    pub source: String,
    pub selections: FlattenedSelections,
}

/// The three outputs of flattening one selection set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlattenedSelections {
    pub fields: Vec<LegacyField>,
    pub fragment_spreads: Vec<Name>,
    pub inline_fragments: Vec<LegacyInlineFragment>,
}

impl FlattenedSelections {
    /// Explicit type-name lookup for the inline fragments, built on demand
    /// after generation.
    pub fn inline_fragments_by_type(&self) -> IndexMap<Name, &LegacyInlineFragment> {
        let mut by_type = IndexMap::default();
        for inline_fragment in &self.inline_fragments {
            by_type
                .entry(inline_fragment.type_condition.clone())
                .or_insert(inline_fragment);
        }
        by_type
    }
}

/// One concrete-type-specific view of a polymorphic selection. Always scoped
/// to a single concrete type: a record spanning N types fans out into N of
/// these.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyInlineFragment {
    pub type_condition: Name,
    pub possible_types: IndexSet<Name>,
    pub fields: Vec<LegacyField>,
    pub fragment_spreads: Vec<Name>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyField {
    pub response_name: Name,
    pub field_name: Name,
    #[serde(serialize_with = "crate::display_helpers::serialize_as_string")]
    pub ty: ast::Type,
    #[serde(skip)]
    pub arguments: Vec<Node<ast::Argument>>,
    pub is_conditional: bool,
    /// Present only when the field has at least one boolean condition:
    /// legacy consumers treat presence itself as "this field is conditional".
    pub conditions: Option<Vec<Condition>>,
    pub description: Option<String>,
    pub is_deprecated: bool,
    pub deprecation_reason: Option<String>,
    pub selection_set: Option<FlattenedSelections>,
}

/// Lower every operation and fragment of `context` into the legacy shape.
///
/// Pure function of the context and its options: no I/O, no mutation of the
/// upstream IR, deterministic output including inline-fragment order.
pub fn transform_to_legacy_ir(
    context: &CompilerContext,
) -> Result<LegacyCompilerContext, LegacyIrError> {
    let mut operations = IndexMap::default();
    for (name, operation) in &context.operations {
        tracing::debug!(operation = name.as_str(), "lowering operation");
        operations.insert(name.clone(), transform_operation(context, operation)?);
    }

    let mut fragments = IndexMap::default();
    for (name, fragment) in &context.fragments {
        tracing::debug!(fragment = name.as_str(), "lowering fragment");
        fragments.insert(
            name.clone(),
            LegacyFragment {
                fragment_name: fragment.fragment_name.clone(),
                type_condition: fragment.type_condition.clone(),
                possible_types: fragment.selection_set.possible_types.clone(),
                source: fragment.source.clone(),
                selections: flatten_selection_set(context, &fragment.selection_set)?,
            },
        );
    }

    Ok(LegacyCompilerContext {
        schema: context.schema.clone(),
        operations,
        fragments,
        types_used: context.types_used.clone(),
        options: context.options.clone(),
    })
}

fn transform_operation(
    context: &CompilerContext,
    operation: &Operation,
) -> Result<LegacyOperation, LegacyIrError> {
    let mut referenced = IndexSet::default();
    collect_fragments_referenced(context, &operation.selection_set, &mut referenced)?;

    let mut source_with_fragments = operation.source.clone();
    for name in &referenced {
        source_with_fragments.push('\n');
        source_with_fragments.push_str(&context.fragment_named(name)?.source);
    }
    let operation_id = context
        .options
        .generate_operation_ids
        .then(|| operation_id(&source_with_fragments));

    Ok(LegacyOperation {
        file_path: operation.file_path.clone(),
        operation_name: operation.operation_name.clone(),
        operation_kind: operation.operation_kind,
        root_type: operation.root_type.clone(),
        variables: operation.variables.clone(),
        source: operation.source.clone(),
        selections: flatten_selection_set(context, &operation.selection_set)?,
        fragments_referenced: referenced.into_iter().collect(),
        source_with_fragments,
        operation_id,
    })
}

/// Flatten one selection set into the legacy triple of fields, fragment
/// spreads, and per-concrete-type inline fragments.
pub fn flatten_selection_set(
    context: &CompilerContext,
    selection_set: &SelectionSet,
) -> Result<FlattenedSelections, LegacyIrError> {
    let type_case = if context.options.merge_in_fields_from_fragment_spreads {
        TypeCase::for_selection_set(&merged_selection_set(context, selection_set)?)
    } else {
        TypeCase::for_selection_set(selection_set)
    };

    let fields = transform_fields(context, &type_case.default)?;

    let mut inline_fragments = Vec::new();
    for record in &type_case.records {
        // A record covering every possible type is redundant with the
        // default case.
        if covers_all(&record.possible_types, &selection_set.possible_types) {
            continue;
        }
        if !RETAIN_EMPTY_RECORDS && record.fields.is_empty() {
            continue;
        }
        let record_fields = transform_fields(context, &record.fields)?;
        for type_name in &record.possible_types {
            let possible_types: IndexSet<Name> = IndexSet::from_iter([type_name.clone()]);
            // Spread visibility is re-evaluated for the single-type
            // narrowing, over the original (unmerged) selections.
            let fragment_spreads =
                dedup_spreads(collect_fragment_spreads(selection_set, &possible_types));
            inline_fragments.push(LegacyInlineFragment {
                type_condition: type_name.clone(),
                possible_types,
                fields: record_fields.clone(),
                fragment_spreads,
            });
        }
    }

    let fragment_spreads = dedup_spreads(collect_fragment_spreads(
        selection_set,
        &selection_set.possible_types,
    ));

    Ok(FlattenedSelections {
        fields,
        fragment_spreads,
        inline_fragments,
    })
}

fn transform_fields(
    context: &CompilerContext,
    fields: &[Arc<Field>],
) -> Result<Vec<LegacyField>, LegacyIrError> {
    fields
        .iter()
        .map(|field| transform_field(context, field))
        .collect()
}

fn transform_field(context: &CompilerContext, field: &Field) -> Result<LegacyField, LegacyIrError> {
    let selection_set = field
        .selection_set
        .as_ref()
        .map(|selection_set| flatten_selection_set(context, selection_set))
        .transpose()?;
    Ok(LegacyField {
        response_name: field.response_name().clone(),
        field_name: field.name.clone(),
        ty: field.ty.clone(),
        arguments: field.arguments.clone(),
        is_conditional: field.is_conditional,
        conditions: (!field.conditions.is_empty()).then(|| field.conditions.clone()),
        description: field.description.clone(),
        is_deprecated: field.is_deprecated,
        deprecation_reason: field.deprecation_reason.clone(),
        selection_set,
    })
}

/// Walk the raw selections of `selection_set` and return every named fragment
/// spread visible under the `possible_types` narrowing, in syntactic order
/// and without deduplication.
///
/// A type-condition wrapper is descended only when the narrowing is a no-op
/// for the types under consideration; a boolean-condition wrapper is always
/// descended, since runtime conditions do not narrow by type.
pub fn collect_fragment_spreads(
    selection_set: &SelectionSet,
    possible_types: &IndexSet<Name>,
) -> Vec<Name> {
    let mut spreads = Vec::new();
    collect_fragment_spreads_into(selection_set, possible_types, &mut spreads);
    spreads
}

fn collect_fragment_spreads_into(
    selection_set: &SelectionSet,
    possible_types: &IndexSet<Name>,
    spreads: &mut Vec<Name>,
) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(_) => {}
            Selection::FragmentSpread(name) => spreads.push(name.clone()),
            Selection::TypeCondition(type_condition) => {
                if possible_types
                    .iter()
                    .all(|ty| type_condition.selection_set.possible_types.contains(ty))
                {
                    collect_fragment_spreads_into(
                        &type_condition.selection_set,
                        possible_types,
                        spreads,
                    );
                }
            }
            Selection::BooleanCondition(boolean_condition) => {
                collect_fragment_spreads_into(
                    &boolean_condition.selection_set,
                    possible_types,
                    spreads,
                );
            }
        }
    }
}

fn dedup_spreads(spreads: Vec<Name>) -> Vec<Name> {
    spreads.into_iter().unique().collect()
}

fn collect_fragments_referenced(
    context: &CompilerContext,
    selection_set: &SelectionSet,
    referenced: &mut IndexSet<Name>,
) -> Result<(), LegacyIrError> {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                if let Some(selection_set) = &field.selection_set {
                    collect_fragments_referenced(context, selection_set, referenced)?;
                }
            }
            Selection::FragmentSpread(name) => {
                if referenced.insert(name.clone()) {
                    let fragment = context.fragment_named(name)?;
                    collect_fragments_referenced(context, &fragment.selection_set, referenced)?;
                }
            }
            Selection::TypeCondition(type_condition) => {
                collect_fragments_referenced(context, &type_condition.selection_set, referenced)?;
            }
            Selection::BooleanCondition(boolean_condition) => {
                collect_fragments_referenced(
                    context,
                    &boolean_condition.selection_set,
                    referenced,
                )?;
            }
        }
    }
    Ok(())
}

/// Deterministic identifier for an operation and its referenced-fragment
/// closure: the lowercase hex SHA-256 of the source-with-fragments text.
pub fn operation_id(source_with_fragments: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_with_fragments);
    hex::encode(hasher.finalize())
}
