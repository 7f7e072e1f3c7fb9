use tracing::{debug, info, warn};

use crate::math::{Rect, Vec2};
use crate::scene::{Entity, EntityId, SceneGraph};
use crate::spec::BodyKind;

pub const GROUND_MARKER: &str = "Ground";
pub const ALIGN_TOLERANCE: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    pub entity: EntityId,
    pub ground: EntityId,
    pub delta_y: f32,
}

fn ground_entities(graph: &SceneGraph, ground_layer: Option<u32>) -> Vec<EntityId> {
    graph
        .entities()
        .iter()
        .filter(|entity| entity.tag == GROUND_MARKER || Some(entity.layer) == ground_layer)
        .map(|entity| entity.id)
        .collect()
}

fn surface_bounds(graph: &SceneGraph, ground: EntityId) -> Option<Rect> {
    graph
        .world_collider_bounds(ground)
        .or_else(|| graph.world_visual_bounds(ground))
}

fn is_mover(entity: &Entity) -> bool {
    entity.components.visual.is_some()
        && entity
            .components
            .body
            .as_ref()
            .is_some_and(|body| body.kind == BodyKind::Dynamic)
}

/// Drops every dynamic entity with a visual onto the highest ground top edge whose
/// horizontal span contains the entity's center. Ground entities are those tagged
/// `Ground` or on the `Ground` layer; they contribute collider bounds, or visual bounds
/// when they have no collider.
///
/// Ground can itself be dynamic, so surfaces are read live and movers are settled from
/// the lowest up, repeating until a pass moves nothing. Running it again on the result
/// moves nothing. Each returned entry is the net move of one entity.
pub fn align_to_ground(graph: &mut SceneGraph, ground_layer: Option<u32>) -> Vec<Alignment> {
    let grounds = ground_entities(graph, ground_layer);
    let mut movers = graph
        .entities()
        .iter()
        .filter(|entity| is_mover(entity))
        .filter_map(|entity| Some((entity.id, graph.world_visual_bounds(entity.id)?.min.y)))
        .collect::<Vec<_>>();
    movers.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    let movers = movers.into_iter().map(|(id, _)| id).collect::<Vec<_>>();

    let mut aligned: Vec<Alignment> = Vec::new();
    let mut settled = false;
    for pass in 0..=movers.len() {
        let mut moved_this_pass = 0usize;
        for &entity in &movers {
            let Some(step) = settle(graph, &grounds, entity) else {
                continue;
            };
            moved_this_pass += 1;
            match aligned.iter_mut().find(|entry| entry.entity == entity) {
                Some(entry) => {
                    entry.delta_y += step.delta_y;
                    entry.ground = step.ground;
                }
                None => aligned.push(step),
            }
        }
        debug!(pass, moved = moved_this_pass, "ground_alignment_pass");
        if moved_this_pass == 0 {
            settled = true;
            break;
        }
    }
    if !settled {
        warn!(movers = movers.len(), "ground_alignment_unsettled");
    }
    aligned.retain(|entry| entry.delta_y.abs() > ALIGN_TOLERANCE);
    info!(grounds = grounds.len(), moved = aligned.len(), "ground_alignment_done");
    aligned
}

fn settle(graph: &mut SceneGraph, grounds: &[EntityId], entity: EntityId) -> Option<Alignment> {
    let bounds = graph.world_visual_bounds(entity)?;
    let center_x = bounds.center().x;
    let target = grounds
        .iter()
        .filter(|ground| **ground != entity)
        .filter_map(|ground| Some((*ground, surface_bounds(graph, *ground)?)))
        .filter(|(_, surface)| surface.spans_x(center_x))
        .max_by(|a, b| a.1.max.y.total_cmp(&b.1.max.y));
    let Some((ground, surface)) = target else {
        debug!(entity = entity.0, "ground_alignment_no_surface");
        return None;
    };
    let delta_y = surface.max.y - bounds.min.y;
    if delta_y.abs() <= ALIGN_TOLERANCE {
        return None;
    }
    graph.translate_world(entity, Vec2::new(0.0, delta_y));
    debug!(entity = entity.0, ground = ground.0, delta_y, "entity_aligned_to_ground");
    Some(Alignment {
        entity,
        ground,
        delta_y,
    })
}
