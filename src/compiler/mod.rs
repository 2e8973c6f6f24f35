//! The typed, polymorphism-aware compiler IR and its builder.
//!
//! Analogues of the apollo-compiler executable types with these changes:
//! - Selection sets carry the precomputed set of concrete object types they
//!   can resolve to, so downstream passes never consult the schema again.
//! - `@skip`/`@include` directives are resolved into explicit boolean
//!   conditions: fields carry them inline, while inline fragments and
//!   fragment spreads are wrapped in [`Selection::BooleanCondition`] nodes.
//! - A fragment spread whose type condition does not cover every possible
//!   type in scope is wrapped in a [`Selection::TypeCondition`] node for the
//!   fragment's declared type. The legacy fragment-spread collector relies on
//!   this shape to narrow correctly.
//! - Collection types are enclosed in `Arc`s to facilitate cheaper cloning.

use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::collections::IndexSet;
use apollo_compiler::executable;
use apollo_compiler::validation::Valid;
use serde::Serialize;

use crate::error::LegacyIrError;
use crate::schema::CompilerSchema;

pub mod merge;
pub mod type_case;


/// The fully typed IR for one document: every operation and fragment resolved
/// against the schema, ready for lowering.
#[derive(Debug, Clone)]
pub struct CompilerContext {
    pub schema: CompilerSchema,
    pub operations: IndexMap<String, Operation>,
    pub fragments: IndexMap<Name, Arc<Fragment>>,
    pub types_used: IndexSet<Name>,
    pub options: CompilerOptions,
}

/// Options recognized by the compiler and its lowering pass.
///
/// Only `merge_in_fields_from_fragment_spreads` and `generate_operation_ids`
/// are interpreted here; the rest are forwarded to downstream generators.
#[derive(Debug, Clone, Serialize)]
pub struct CompilerOptions {
    pub add_typename: bool,
    pub merge_in_fields_from_fragment_spreads: bool,
    pub passthrough_custom_scalars: bool,
    pub custom_scalars_prefix: Option<String>,
    pub namespace: Option<String>,
    pub generate_operation_ids: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            add_typename: false,
            merge_in_fields_from_fragment_spreads: true,
            passthrough_custom_scalars: false,
            custom_scalars_prefix: None,
            namespace: None,
            generate_operation_ids: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

impl From<ast::OperationType> for OperationKind {
    fn from(value: ast::OperationType) -> Self {
        match value {
            ast::OperationType::Query => Self::Query,
            ast::OperationType::Mutation => Self::Mutation,
            ast::OperationType::Subscription => Self::Subscription,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub file_path: String,
    pub operation_name: String,
    pub operation_kind: OperationKind,
    pub root_type: Name,
    pub variables: Vec<Variable>,
    pub source: String,
    pub selection_set: SelectionSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variable {
    pub name: Name,
    #[serde(serialize_with = "crate::display_helpers::serialize_as_string")]
    pub ty: ast::Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub fragment_name: Name,
    pub type_condition: Name,
    pub source: String,
    pub selection_set: SelectionSet,
}

/// An ordered list of selections plus the concrete object types the list can
/// resolve against at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionSet {
    pub type_name: Name,
    pub possible_types: IndexSet<Name>,
    pub selections: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Selection {
    Field(Arc<Field>),
    FragmentSpread(Name),
    TypeCondition(Arc<TypeConditionSelection>),
    BooleanCondition(Arc<BooleanConditionSelection>),
}

/// A type-scoped sub-selection (`... on Type { ... }`). The inner selection
/// set's possible types are the intersection of the enclosing set's possible
/// types with the condition type's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeConditionSelection {
    pub type_condition: Name,
    pub selection_set: SelectionSet,
}

/// A sub-selection gated by a runtime `@skip`/`@include` condition. Boolean
/// conditions never narrow by type: the inner selection set keeps the
/// enclosing set's possible types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BooleanConditionSelection {
    pub condition: Condition,
    pub selection_set: SelectionSet,
}

/// One `@skip`/`@include` clause. `@include(if: $v)` has `inverted: false`,
/// `@skip(if: $v)` has `inverted: true`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Condition {
    pub variable: Name,
    pub inverted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: Name,
    pub alias: Option<Name>,
    #[serde(serialize_with = "crate::display_helpers::serialize_as_string")]
    pub ty: ast::Type,
    #[serde(skip)]
    pub arguments: Vec<Node<ast::Argument>>,
    pub conditions: Vec<Condition>,
    pub is_conditional: bool,
    pub description: Option<String>,
    pub is_deprecated: bool,
    pub deprecation_reason: Option<String>,
    pub selection_set: Option<SelectionSet>,
}

impl Field {
    /// The key under which this field appears in a response object.
    pub fn response_name(&self) -> &Name {
        self.alias.as_ref().unwrap_or(&self.name)
    }
}

impl CompilerContext {
    /// Compile a validated executable document into the typed IR.
    ///
    /// Every named operation and every fragment of the document is compiled;
    /// an anonymous operation is an error since legacy generators address
    /// operations by name.
    pub fn from_document(
        schema: CompilerSchema,
        document: &Valid<executable::ExecutableDocument>,
        file_path: impl Into<String>,
        options: CompilerOptions,
    ) -> Result<Self, LegacyIrError> {
        if document.operations.anonymous.is_some() {
            return Err(LegacyIrError::AnonymousOperation);
        }
        let file_path = file_path.into();
        let mut builder = Builder {
            schema: &schema,
            document,
            types_used: IndexSet::default(),
        };

        let mut operations = IndexMap::default();
        for (name, operation) in &document.operations.named {
            tracing::trace!(operation = name.as_str(), "compiling operation");
            for variable in &operation.variables {
                builder
                    .types_used
                    .insert(variable.ty.inner_named_type().clone());
            }
            let selection_set = builder.build_selection_set(&operation.selection_set, 0)?;
            operations.insert(
                name.to_string(),
                Operation {
                    file_path: file_path.clone(),
                    operation_name: name.to_string(),
                    operation_kind: operation.operation_type.into(),
                    root_type: operation.selection_set.ty.clone(),
                    variables: operation
                        .variables
                        .iter()
                        .map(|variable| Variable {
                            name: variable.name.clone(),
                            ty: (*variable.ty).clone(),
                        })
                        .collect(),
                    source: operation.serialize().to_string(),
                    selection_set,
                },
            );
        }

        let mut fragments = IndexMap::default();
        for (name, fragment) in &document.fragments {
            tracing::trace!(fragment = name.as_str(), "compiling fragment");
            let selection_set = builder.build_selection_set(&fragment.selection_set, 0)?;
            fragments.insert(
                name.clone(),
                Arc::new(Fragment {
                    fragment_name: name.clone(),
                    type_condition: fragment.selection_set.ty.clone(),
                    source: fragment.serialize().to_string(),
                    selection_set,
                }),
            );
        }

        let types_used = builder.types_used;
        Ok(Self {
            schema,
            operations,
            fragments,
            types_used,
            options,
        })
    }

    pub fn fragment_named(&self, name: &Name) -> Result<&Arc<Fragment>, LegacyIrError> {
        self.fragments
            .get(name)
            .ok_or_else(|| LegacyIrError::UnknownFragment { name: name.clone() })
    }
}

/// Resolved `@skip`/`@include` directives on one selection.
struct ParsedConditions {
    conditions: Vec<Condition>,
    statically_skipped: bool,
}

impl ParsedConditions {
    fn parse(directives: &executable::DirectiveList) -> Self {
        let mut parsed = Self {
            conditions: Vec::new(),
            statically_skipped: false,
        };
        for directive in directives.iter() {
            let inverted = match directive.name.as_str() {
                "skip" => true,
                "include" => false,
                _ => continue,
            };
            match directive
                .specified_argument_by_name("if")
                .map(|value| value.as_ref())
            {
                Some(executable::Value::Boolean(value)) => {
                    // A literal no-op (`@skip(if: false)`, `@include(if: true)`)
                    // produces no condition at all.
                    if *value == inverted {
                        parsed.statically_skipped = true;
                    }
                }
                Some(executable::Value::Variable(variable)) => parsed.conditions.push(Condition {
                    variable: variable.clone(),
                    inverted,
                }),
                _ => {}
            }
        }
        parsed
    }
}

struct Builder<'a> {
    schema: &'a CompilerSchema,
    document: &'a Valid<executable::ExecutableDocument>,
    types_used: IndexSet<Name>,
}

impl Builder<'_> {
    fn build_selection_set(
        &mut self,
        selection_set: &executable::SelectionSet,
        depth: usize,
    ) -> Result<SelectionSet, LegacyIrError> {
        // Far above any legitimate query depth, far below a stack overflow.
        const RECURSION_LIMIT: usize = 512;
        if depth > RECURSION_LIMIT {
            return Err(LegacyIrError::internal(
                "selection processing recursion limit exceeded",
            ));
        }

        let type_name = selection_set.ty.clone();
        let possible_types = self.schema.possible_types(&type_name)?.clone();

        let mut selections = Vec::with_capacity(selection_set.selections.len());
        for selection in &selection_set.selections {
            match selection {
                executable::Selection::Field(field) => {
                    let parsed = ParsedConditions::parse(&field.directives);
                    if parsed.statically_skipped {
                        continue;
                    }
                    selections.push(Selection::Field(Arc::new(
                        self.build_field(field, parsed.conditions, depth)?,
                    )));
                }
                executable::Selection::InlineFragment(inline) => {
                    let parsed = ParsedConditions::parse(&inline.directives);
                    if parsed.statically_skipped {
                        continue;
                    }
                    let inner = self.build_selection_set(&inline.selection_set, depth + 1)?;
                    let inner = narrow_to(inner, &possible_types);
                    let type_condition = inline
                        .type_condition
                        .clone()
                        .unwrap_or_else(|| type_name.clone());
                    let selection = Selection::TypeCondition(Arc::new(TypeConditionSelection {
                        type_condition,
                        selection_set: inner,
                    }));
                    selections.push(wrap_in_boolean_conditions(
                        selection,
                        parsed.conditions,
                        &type_name,
                        &possible_types,
                    ));
                }
                executable::Selection::FragmentSpread(spread) => {
                    let parsed = ParsedConditions::parse(&spread.directives);
                    if parsed.statically_skipped {
                        continue;
                    }
                    let fragment = self
                        .document
                        .fragments
                        .get(&spread.fragment_name)
                        .ok_or_else(|| LegacyIrError::UnknownFragment {
                            name: spread.fragment_name.clone(),
                        })?;
                    let fragment_condition = fragment.selection_set.ty.clone();
                    let fragment_possible_types =
                        self.schema.possible_types(&fragment_condition)?;

                    let mut selection = Selection::FragmentSpread(spread.fragment_name.clone());
                    // A spread that narrows the types in scope is wrapped in a
                    // type condition so that spread collection can tell it is
                    // not visible at the parent level.
                    if !possible_types
                        .iter()
                        .all(|ty| fragment_possible_types.contains(ty))
                    {
                        let narrowed = fragment_possible_types
                            .iter()
                            .filter(|ty| possible_types.contains(*ty))
                            .cloned()
                            .collect();
                        selection = Selection::TypeCondition(Arc::new(TypeConditionSelection {
                            type_condition: fragment_condition.clone(),
                            selection_set: SelectionSet {
                                type_name: fragment_condition,
                                possible_types: narrowed,
                                selections: vec![selection],
                            },
                        }));
                    }
                    selections.push(wrap_in_boolean_conditions(
                        selection,
                        parsed.conditions,
                        &type_name,
                        &possible_types,
                    ));
                }
            }
        }

        Ok(SelectionSet {
            type_name,
            possible_types,
            selections,
        })
    }

    fn build_field(
        &mut self,
        field: &executable::Field,
        conditions: Vec<Condition>,
        depth: usize,
    ) -> Result<Field, LegacyIrError> {
        let ty = field.ty().clone();
        self.types_used.insert(ty.inner_named_type().clone());

        let selection_set = if field.selection_set.selections.is_empty() {
            None
        } else {
            Some(self.build_selection_set(&field.selection_set, depth + 1)?)
        };

        let deprecated = field.definition.directives.get("deprecated");
        let is_conditional = !conditions.is_empty();
        Ok(Field {
            name: field.name.clone(),
            alias: field.alias.clone(),
            ty,
            arguments: field.arguments.clone(),
            conditions,
            is_conditional,
            description: field
                .definition
                .description
                .as_ref()
                .map(|description| description.to_string()),
            is_deprecated: deprecated.is_some(),
            deprecation_reason: deprecated
                .and_then(|directive| directive.specified_argument_by_name("reason"))
                .and_then(|reason| reason.as_str())
                .map(|reason| reason.to_owned()),
            selection_set,
        })
    }
}

/// Restrict a sub-selection's possible types to those of the enclosing set,
/// keeping the sub-selection's own iteration order.
fn narrow_to(mut selection_set: SelectionSet, enclosing: &IndexSet<Name>) -> SelectionSet {
    selection_set.possible_types = selection_set
        .possible_types
        .iter()
        .filter(|ty| enclosing.contains(*ty))
        .cloned()
        .collect();
    selection_set
}

fn wrap_in_boolean_conditions(
    selection: Selection,
    conditions: Vec<Condition>,
    type_name: &Name,
    possible_types: &IndexSet<Name>,
) -> Selection {
    conditions
        .into_iter()
        .rev()
        .fold(selection, |inner, condition| {
            Selection::BooleanCondition(Arc::new(BooleanConditionSelection {
                condition,
                selection_set: SelectionSet {
                    type_name: type_name.clone(),
                    possible_types: possible_types.clone(),
                    selections: vec![inner],
                },
            }))
        })
}
