use serde::Serialize;
use tracing::debug;

use crate::scene::{EntityId, SceneGraph};
use crate::spec::{ReferenceHint, StructuredReference};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolveStrategy {
    ChildPath,
    DescendantName,
    GlobalName,
    Tag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub entity: EntityId,
    pub strategy: ResolveStrategy,
}

/// Resolves a symbolic reference, trying child path, descendant name, global name and
/// tag in that order. A global name also matches an entity's authored id. Strategies that need a context entity are skipped without one.
/// `None` means unresolved; the caller decides whether that matters.
pub fn resolve_reference(
    graph: &SceneGraph,
    context: Option<EntityId>,
    hint: &ReferenceHint,
) -> Option<Resolution> {
    let resolved = match hint {
        ReferenceHint::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            resolve_structured(
                graph,
                context,
                &StructuredReference {
                    path: Some(text.to_string()),
                    child_name: Some(text.to_string()),
                    global_name: Some(text.to_string()),
                    tag: Some(text.to_string()),
                },
            )
        }
        ReferenceHint::Structured(structured) => resolve_structured(graph, context, structured),
    };
    debug!(hint = ?hint, resolved = ?resolved, "reference_resolved");
    resolved
}

fn resolve_structured(
    graph: &SceneGraph,
    context: Option<EntityId>,
    reference: &StructuredReference,
) -> Option<Resolution> {
    let attempts: [(ResolveStrategy, Option<&str>); 4] = [
        (ResolveStrategy::ChildPath, reference.path.as_deref()),
        (ResolveStrategy::DescendantName, reference.child_name.as_deref()),
        (ResolveStrategy::GlobalName, reference.global_name.as_deref()),
        (ResolveStrategy::Tag, reference.tag.as_deref()),
    ];
    attempts.into_iter().find_map(|(strategy, key)| {
        let key = key.map(str::trim).filter(|key| !key.is_empty())?;
        let entity = match strategy {
            ResolveStrategy::ChildPath => child_path(graph, context?, key),
            ResolveStrategy::DescendantName => descendant_named(graph, context?, key),
            ResolveStrategy::GlobalName => graph
                .find_by_name(key)
                .or_else(|| graph.find_by_source_id(key)),
            ResolveStrategy::Tag => graph.find_by_tag(key),
        }?;
        Some(Resolution { entity, strategy })
    })
}

/// Walks `a/b/c` from `context`, exact names, first matching child at each step.
fn child_path(graph: &SceneGraph, context: EntityId, path: &str) -> Option<EntityId> {
    let mut segments = path.split('/').filter(|segment| !segment.is_empty()).peekable();
    segments.peek()?;
    segments.try_fold(context, |current, segment| {
        graph
            .children(current)
            .iter()
            .copied()
            .find(|child| graph.get(*child).is_some_and(|entity| entity.name == segment))
    })
}

fn descendant_named(graph: &SceneGraph, context: EntityId, name: &str) -> Option<EntityId> {
    graph.descendants(context).into_iter().find(|id| {
        graph
            .get(*id)
            .is_some_and(|entity| entity.name.eq_ignore_ascii_case(name))
    })
}
