//! GraphQL schema wrapper for the compiler IR.

use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::collections::IndexSet;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;

use crate::error::LegacyIrError;

/// A validated schema plus the possible-concrete-type table derived from it.
///
/// The table is computed once at construction, in schema declaration order:
/// inline-fragment emission order in the legacy output depends on this order
/// being deterministic across calls.
#[derive(Debug, Clone)]
pub struct CompilerSchema {
    schema: Arc<Valid<Schema>>,
    possible_types: Arc<IndexMap<Name, IndexSet<Name>>>,
}

impl CompilerSchema {
    pub fn new(schema: Valid<Schema>) -> Self {
        let mut possible_types: IndexMap<Name, IndexSet<Name>> = IndexMap::default();
        for (name, ty) in &schema.types {
            match ty {
                ExtendedType::Object(_) => {
                    possible_types.insert(name.clone(), IndexSet::from_iter([name.clone()]));
                }
                ExtendedType::Interface(_) => {
                    let implementers = schema
                        .types
                        .iter()
                        .filter_map(|(object_name, object_type)| match object_type {
                            ExtendedType::Object(object)
                                if object.implements_interfaces.contains(name.as_str()) =>
                            {
                                Some(object_name.clone())
                            }
                            _ => None,
                        })
                        .collect();
                    possible_types.insert(name.clone(), implementers);
                }
                ExtendedType::Union(union_) => {
                    let members = union_
                        .members
                        .iter()
                        .map(|member| member.name.clone())
                        .collect();
                    possible_types.insert(name.clone(), members);
                }
                _ => {}
            }
        }
        Self {
            schema: Arc::new(schema),
            possible_types: Arc::new(possible_types),
        }
    }

    pub fn parse(sdl: &str, path: &str) -> Result<Self, LegacyIrError> {
        let schema = Schema::parse_and_validate(sdl, path)?;
        Ok(Self::new(schema))
    }

    pub fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    /// The concrete object types a composite type can resolve to at runtime.
    pub fn possible_types(&self, type_name: &Name) -> Result<&IndexSet<Name>, LegacyIrError> {
        self.possible_types
            .get(type_name)
            .ok_or_else(|| LegacyIrError::UnknownType {
                name: type_name.clone(),
            })
    }

    pub fn is_composite(&self, type_name: &Name) -> bool {
        self.possible_types.contains_key(type_name)
    }
}
