//! Merging fragment-spread fields into a selection set.
//!
//! When `merge_in_fields_from_fragment_spreads` is on, the flattener analyzes
//! a copy of the selection set in which every fragment spread has been
//! replaced by a type-condition wrapper containing the fragment's own
//! (recursively merged) selections. Fields are left untouched: their
//! sub-selections get the same treatment when the flattener recurses into
//! them.

use std::sync::Arc;

use crate::compiler::CompilerContext;
use crate::compiler::Selection;
use crate::compiler::SelectionSet;
use crate::compiler::TypeConditionSelection;
use crate::error::LegacyIrError;

/// A copy of `selection_set` with every fragment spread replaced by the
/// spread fragment's selections, wrapped in a type condition for the
/// fragment's declared type.
pub fn merged_selection_set(
    context: &CompilerContext,
    selection_set: &SelectionSet,
) -> Result<SelectionSet, LegacyIrError> {
    let mut selections = Vec::with_capacity(selection_set.selections.len());
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(_) => selections.push(selection.clone()),
            Selection::FragmentSpread(name) => {
                let fragment = context.fragment_named(name)?;
                let merged = merged_selection_set(context, &fragment.selection_set)?;
                selections.push(Selection::TypeCondition(Arc::new(TypeConditionSelection {
                    type_condition: fragment.type_condition.clone(),
                    selection_set: merged,
                })));
            }
            Selection::TypeCondition(type_condition) => {
                selections.push(Selection::TypeCondition(Arc::new(TypeConditionSelection {
                    type_condition: type_condition.type_condition.clone(),
                    selection_set: merged_selection_set(
                        context,
                        &type_condition.selection_set,
                    )?,
                })));
            }
            Selection::BooleanCondition(boolean_condition) => {
                selections.push(Selection::BooleanCondition(Arc::new(
                    super::BooleanConditionSelection {
                        condition: boolean_condition.condition.clone(),
                        selection_set: merged_selection_set(
                            context,
                            &boolean_condition.selection_set,
                        )?,
                    },
                )));
            }
        }
    }
    Ok(SelectionSet {
        type_name: selection_set.type_name.clone(),
        possible_types: selection_set.possible_types.clone(),
        selections,
    })
}
