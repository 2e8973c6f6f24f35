//! Type-case computation: partitioning a selection set's fields into a
//! default group plus per-subtype records.
//!
//! The default group holds fields common to every possible type of the
//! selection set. Each record holds the fields contributed under some type
//! narrowing, tagged with the subset of possible types the narrowing covers.
//! Records are split whenever a later narrowing straddles an earlier one, so
//! a record's type set is always wholly inside or wholly outside any scope
//! that was visited.

use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::collections::IndexSet;

use crate::compiler::Condition;
use crate::compiler::Field;
use crate::compiler::Selection;
use crate::compiler::SelectionSet;

/// The partition of one selection set by possible type.
#[derive(Debug, Clone)]
pub struct TypeCase {
    /// Fields that apply to every possible type.
    pub default: Vec<Arc<Field>>,
    /// Type-specific field groups, in first-breakout order.
    pub records: Vec<TypeRecord>,
}

/// One type-specific field group. `possible_types` is a non-empty subset of
/// the enclosing selection set's possible types.
#[derive(Debug, Clone)]
pub struct TypeRecord {
    pub possible_types: IndexSet<Name>,
    pub fields: Vec<Arc<Field>>,
}

impl TypeCase {
    /// Partition `selection_set`. Fragment spreads contribute nothing here;
    /// when their fields should participate, the caller analyzes the merged
    /// selection set from [`crate::compiler::merge`] instead.
    pub fn for_selection_set(selection_set: &SelectionSet) -> Self {
        let mut collector = Collector {
            full: &selection_set.possible_types,
            default: FieldGroup::default(),
            records: Vec::new(),
        };
        collector.visit(
            &selection_set.selections,
            &selection_set.possible_types,
            &[],
        );
        Self {
            default: collector.default.into_fields(),
            records: collector
                .records
                .into_iter()
                .map(|record| TypeRecord {
                    possible_types: record.types,
                    fields: record.group.into_fields(),
                })
                .collect(),
        }
    }
}

/// Does `candidate` cover every type in `full`?
pub(crate) fn covers_all(candidate: &IndexSet<Name>, full: &IndexSet<Name>) -> bool {
    full.iter().all(|ty| candidate.contains(ty))
}

/// Fields keyed by response name, in first-seen order. Duplicate response
/// keys merge: sub-selections append, and the merged field stays conditional
/// only if every occurrence was conditional.
#[derive(Debug, Clone, Default)]
struct FieldGroup(IndexMap<Name, Arc<Field>>);

impl FieldGroup {
    fn add(&mut self, field: &Arc<Field>, conditions: &[Condition]) {
        let field = with_conditions(field, conditions);
        match self.0.entry(field.response_name().clone()) {
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(field);
            }
            indexmap::map::Entry::Occupied(mut entry) => {
                merge_into(entry.get_mut(), &field);
            }
        }
    }

    fn into_fields(self) -> Vec<Arc<Field>> {
        self.0.into_values().collect()
    }
}

fn with_conditions(field: &Arc<Field>, conditions: &[Condition]) -> Arc<Field> {
    if conditions.is_empty() {
        return Arc::clone(field);
    }
    let mut field = Field::clone(field);
    field.conditions.extend_from_slice(conditions);
    field.is_conditional = true;
    Arc::new(field)
}

fn merge_into(existing: &mut Arc<Field>, incoming: &Arc<Field>) {
    let merged = Arc::make_mut(existing);
    if let (Some(existing_set), Some(incoming_set)) =
        (merged.selection_set.as_mut(), incoming.selection_set.as_ref())
    {
        existing_set
            .selections
            .extend(incoming_set.selections.iter().cloned());
    }
    if !incoming.is_conditional {
        merged.is_conditional = false;
        merged.conditions.clear();
    } else if merged.is_conditional {
        for condition in &incoming.conditions {
            if !merged.conditions.contains(condition) {
                merged.conditions.push(condition.clone());
            }
        }
    }
}

#[derive(Debug, Clone)]
struct RecordBuilder {
    types: IndexSet<Name>,
    group: FieldGroup,
}

struct Collector<'a> {
    full: &'a IndexSet<Name>,
    default: FieldGroup,
    records: Vec<RecordBuilder>,
}

impl Collector<'_> {
    fn visit(&mut self, selections: &[Selection], scope: &IndexSet<Name>, conditions: &[Condition]) {
        if scope.is_empty() {
            return;
        }
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    if covers_all(scope, self.full) {
                        self.default.add(field, conditions);
                    } else {
                        for index in self.record_indices_for(scope) {
                            self.records[index].group.add(field, conditions);
                        }
                    }
                }
                // Spread fields only participate through pre-merging.
                Selection::FragmentSpread(_) => {}
                Selection::TypeCondition(type_condition) => {
                    let narrowed: IndexSet<Name> = scope
                        .iter()
                        .filter(|ty| type_condition.selection_set.possible_types.contains(*ty))
                        .cloned()
                        .collect();
                    if narrowed.is_empty() {
                        continue;
                    }
                    if !covers_all(&narrowed, self.full) {
                        // Break out records for the narrowed types even if no
                        // field follows; a spread-only condition yields an
                        // empty record that the lowering elides by policy.
                        self.record_indices_for(&narrowed);
                    }
                    self.visit(&type_condition.selection_set.selections, &narrowed, conditions);
                }
                Selection::BooleanCondition(boolean_condition) => {
                    let mut nested = conditions.to_vec();
                    nested.push(boolean_condition.condition.clone());
                    self.visit(
                        &boolean_condition.selection_set.selections,
                        scope,
                        &nested,
                    );
                }
            }
        }
    }

    /// Indices of the records that together cover exactly `scope`, splitting
    /// straddling records (the surviving intersection stays in place, the
    /// remainder is appended) and creating a record for still-uncovered types.
    fn record_indices_for(&mut self, scope: &IndexSet<Name>) -> Vec<usize> {
        let mut indices = Vec::new();
        let mut uncovered = scope.clone();
        let mut split_off = Vec::new();
        for (index, record) in self.records.iter_mut().enumerate() {
            let inside: IndexSet<Name> = record
                .types
                .iter()
                .filter(|ty| scope.contains(*ty))
                .cloned()
                .collect();
            if inside.is_empty() {
                continue;
            }
            for ty in &inside {
                uncovered.shift_remove(ty);
            }
            if inside.len() < record.types.len() {
                let outside = record
                    .types
                    .iter()
                    .filter(|ty| !scope.contains(*ty))
                    .cloned()
                    .collect();
                record.types = inside;
                split_off.push(RecordBuilder {
                    types: outside,
                    group: record.group.clone(),
                });
            }
            indices.push(index);
        }
        self.records.extend(split_off);
        if !uncovered.is_empty() {
            self.records.push(RecordBuilder {
                types: uncovered,
                group: FieldGroup::default(),
            });
            indices.push(self.records.len() - 1);
        }
        indices
    }
}
