use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{info, warn};

use super::BehaviorDescriptor;

/// Behaviors contributed by one module of the host integration.
#[derive(Debug, Clone)]
pub struct BehaviorCatalog {
    pub module: String,
    pub descriptors: Vec<BehaviorDescriptor>,
}

impl BehaviorCatalog {
    pub fn new(module: impl Into<String>, descriptors: Vec<BehaviorDescriptor>) -> Self {
        Self {
            module: module.into(),
            descriptors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BehaviorLookupError {
    #[error("no behavior named '{name}' is registered")]
    Unknown { name: String },
    #[error("behavior name '{name}' is ambiguous between {candidates:?}; qualify it as module::Name or add a precedence entry")]
    Ambiguous {
        name: String,
        candidates: Vec<String>,
    },
}

#[derive(Debug, Clone)]
enum SimpleEntry {
    Unique(usize),
    Ambiguous(Vec<String>),
}

#[derive(Debug, Clone)]
struct RegisteredBehavior {
    module: String,
    descriptor: BehaviorDescriptor,
}

#[derive(Debug, Clone, Default)]
pub struct BehaviorRegistry {
    behaviors: Vec<RegisteredBehavior>,
    by_qualified: BTreeMap<String, usize>,
    by_simple: BTreeMap<String, SimpleEntry>,
}

impl BehaviorRegistry {
    /// Indexes every catalog. Two behaviors sharing a simple name are settled by the
    /// first of their modules listed in `precedence`; if none is listed the simple name
    /// stays ambiguous and only the qualified forms resolve.
    pub fn build(catalogs: &[BehaviorCatalog], precedence: &[String]) -> Self {
        let mut registry = BehaviorRegistry::default();
        let mut groups = BTreeMap::<String, Vec<usize>>::new();

        for catalog in catalogs {
            for descriptor in &catalog.descriptors {
                let qualified = qualified_name(&catalog.module, descriptor.name);
                if registry.by_qualified.contains_key(&qualified) {
                    warn!(behavior = %qualified, "behavior_duplicate_qualified_name_ignored");
                    continue;
                }
                let index = registry.behaviors.len();
                registry.behaviors.push(RegisteredBehavior {
                    module: catalog.module.clone(),
                    descriptor: descriptor.clone(),
                });
                registry.by_qualified.insert(qualified, index);
                groups
                    .entry(descriptor.name.to_string())
                    .or_default()
                    .push(index);
            }
        }

        for (simple, indices) in groups {
            let entry = match indices.as_slice() {
                [single] => SimpleEntry::Unique(*single),
                _ => registry.settle_collision(&simple, &indices, precedence),
            };
            registry.by_simple.insert(simple, entry);
        }

        info!(
            behavior_count = registry.behaviors.len(),
            catalog_count = catalogs.len(),
            "behavior_registry_built"
        );
        registry
    }

    fn settle_collision(&self, simple: &str, indices: &[usize], precedence: &[String]) -> SimpleEntry {
        let winner = precedence.iter().find_map(|module| {
            indices
                .iter()
                .copied()
                .find(|index| &self.behaviors[*index].module == module)
        });
        match winner {
            Some(index) => {
                info!(
                    behavior = simple,
                    module = %self.behaviors[index].module,
                    "behavior_collision_settled_by_precedence"
                );
                SimpleEntry::Unique(index)
            }
            None => {
                let candidates = indices
                    .iter()
                    .map(|index| self.qualified(*index))
                    .collect::<Vec<_>>();
                warn!(behavior = simple, candidates = ?candidates, "behavior_name_ambiguous");
                SimpleEntry::Ambiguous(candidates)
            }
        }
    }

    fn qualified(&self, index: usize) -> String {
        let registered = &self.behaviors[index];
        qualified_name(&registered.module, registered.descriptor.name)
    }

    /// Case-sensitive lookup first, then a case-insensitive scan. Names containing `::`
    /// are matched against qualified names.
    pub fn lookup(&self, name: &str) -> Result<(&str, &BehaviorDescriptor), BehaviorLookupError> {
        let name = name.trim();
        let index = if name.contains("::") {
            self.by_qualified.get(name).copied().or_else(|| {
                self.by_qualified
                    .iter()
                    .find(|(qualified, _)| qualified.eq_ignore_ascii_case(name))
                    .map(|(_, index)| *index)
            })
        } else {
            let entry = self.by_simple.get(name).or_else(|| {
                self.by_simple
                    .iter()
                    .find(|(simple, _)| simple.eq_ignore_ascii_case(name))
                    .map(|(_, entry)| entry)
            });
            match entry {
                Some(SimpleEntry::Unique(index)) => Some(*index),
                Some(SimpleEntry::Ambiguous(candidates)) => {
                    return Err(BehaviorLookupError::Ambiguous {
                        name: name.to_string(),
                        candidates: candidates.clone(),
                    })
                }
                None => None,
            }
        };

        let index = index.ok_or_else(|| BehaviorLookupError::Unknown {
            name: name.to_string(),
        })?;
        let registered = &self.behaviors[index];
        Ok((registered.module.as_str(), &registered.descriptor))
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }
}

fn qualified_name(module: &str, name: &str) -> String {
    format!("{module}::{name}")
}
