use tracing::debug;

use crate::behavior::attach_behaviors;
use crate::context::BuildContext;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::math::{Rect, Vec2, Vec3};
use crate::resolve::resolve_reference;
use crate::scene::{
    Collider, ColliderShape, Color, EntityId, LocalTransform, PhysicsBody, SceneGraph,
    SpriteVisual, DEFAULT_BOX_SIZE, DEFAULT_CIRCLE_RADIUS,
};
use crate::spec::{ColliderKind, ColliderSpec, EntitySpec, RigidbodySpec, SpriteSpec};

/// Builds one entity and everything attached to it. Never fails: faults in any one
/// feature are recorded and the rest of the entity is still built.
pub fn build_entity(ctx: &mut BuildContext<'_>, graph: &mut SceneGraph, spec: &EntitySpec) -> EntityId {
    let name = spec.display_name().trim().to_string();

    // Resolve before spawning so an entity cannot become its own parent.
    let parent = spec
        .parent
        .as_ref()
        .filter(|hint| !is_blank_hint(hint))
        .and_then(|hint| match resolve_reference(graph, None, hint) {
            Some(resolution) => Some(resolution.entity),
            None => {
                ctx.diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticCode::UnknownParent,
                        "parent does not match any earlier entity; placed at scene root",
                    )
                    .subject(name.as_str())
                    .field("parent")
                    .value(format!("{hint:?}")),
                );
                None
            }
        });

    let id = graph.spawn(&name, parent);
    let tag = spec
        .tag
        .as_deref()
        .filter(|tag| !tag.trim().is_empty())
        .map(|tag| ctx.register_tag(tag));
    let layer = spec
        .layer
        .as_deref()
        .filter(|layer| !layer.trim().is_empty())
        .and_then(|layer| ctx.register_layer(layer, &name));
    let visual = spec
        .sprite
        .as_ref()
        .and_then(|sprite| build_visual(ctx, sprite, &name));

    let (body, colliders) = match &spec.physics {
        Some(physics) => (
            physics.rigidbody.as_ref().map(physics_body),
            physics
                .all_colliders()
                .map(|collider| build_collider(collider, visual.as_ref()))
                .collect(),
        ),
        None => (None, Vec::new()),
    };

    if let Some(entity) = graph.get_mut(id) {
        entity.source_id = spec
            .id
            .as_deref()
            .map(str::trim)
            .filter(|source_id| !source_id.is_empty())
            .map(str::to_string);
        entity.transform = LocalTransform {
            position: Vec3::from(spec.transform.position),
            rotation_z_degrees: spec
                .transform
                .rotation
                .map(|rotation| rotation.z_degrees())
                .unwrap_or_default(),
            scale: Vec3::new(
                spec.transform.scale.x,
                spec.transform.scale.y,
                spec.transform.scale.z,
            ),
        };
        if let Some(tag) = tag {
            entity.tag = tag;
        }
        if let Some(layer) = layer {
            entity.layer = layer;
        }
        entity.components.visual = visual;
        entity.components.body = body;
        entity.components.colliders = colliders;
    }

    attach_behaviors(ctx, graph, id, &spec.scripts);
    debug!(entity = %name, id = id.0, parent = ?parent, "entity_built");
    id
}

fn is_blank_hint(hint: &crate::spec::ReferenceHint) -> bool {
    match hint {
        crate::spec::ReferenceHint::Text(text) => text.trim().is_empty(),
        crate::spec::ReferenceHint::Structured(structured) => structured.is_empty(),
    }
}

fn build_visual(ctx: &mut BuildContext<'_>, sprite: &SpriteSpec, subject: &str) -> Option<SpriteVisual> {
    let path = sprite.path.as_deref().filter(|path| !path.trim().is_empty())?;
    let asset = ctx.import_asset(path, subject, "sprite.path")?;
    let pixels_per_unit = sprite
        .pixels_per_unit
        .filter(|ppu| ppu.is_finite() && *ppu > 0.0)
        .unwrap_or(ctx.pixels_per_unit);
    let color = match sprite.color.as_deref() {
        None => Color::WHITE,
        Some(raw) => Color::parse_hex(raw).unwrap_or_else(|| {
            ctx.diagnostics.push(
                Diagnostic::warning(DiagnosticCode::InvalidColor, "expected #RRGGBB or #RRGGBBAA")
                    .subject(subject)
                    .field("sprite.color")
                    .value(raw),
            );
            Color::WHITE
        }),
    };
    let sorting_layer = ctx.register_sorting_layer(sprite.sorting_layer.as_deref().unwrap_or_default());
    let size = Vec2::new(
        asset.pixel_size.0 as f32 / pixels_per_unit,
        asset.pixel_size.1 as f32 / pixels_per_unit,
    );
    Some(SpriteVisual {
        asset_path: asset.canonical_path,
        pixel_size: asset.pixel_size,
        pixels_per_unit,
        sorting_layer,
        order_in_layer: sprite.order_in_layer,
        color,
        local_bounds: Rect::from_center_size(Vec2::ZERO, size),
    })
}

fn physics_body(spec: &RigidbodySpec) -> PhysicsBody {
    let mut body = PhysicsBody {
        kind: spec.body_type,
        gravity_scale: spec.gravity_scale,
        freeze_rotation: spec.freeze_rotation,
        freeze_position_x: false,
        freeze_position_y: false,
    };
    for constraint in &spec.constraints {
        let lowered = constraint.to_ascii_lowercase().replace(['_', ' '], "");
        match lowered.as_str() {
            "freezerotation" | "freezerotationz" => body.freeze_rotation = true,
            "freezepositionx" => body.freeze_position_x = true,
            "freezepositiony" => body.freeze_position_y = true,
            "freezeposition" => {
                body.freeze_position_x = true;
                body.freeze_position_y = true;
            }
            "freezeall" => {
                body.freeze_rotation = true;
                body.freeze_position_x = true;
                body.freeze_position_y = true;
            }
            _ => debug!(constraint = %constraint, "rigidbody_constraint_ignored"),
        }
    }
    body
}

/// Explicit size or radius always wins. Otherwise, with auto-size on, the shape follows
/// the visual's local bounds; with no visual it keeps the engine defaults.
fn build_collider(spec: &ColliderSpec, visual: Option<&SpriteVisual>) -> Collider {
    let measured = visual
        .filter(|_| spec.auto_size)
        .map(|visual| visual.local_bounds);
    let shape = match spec.kind {
        ColliderKind::Box => ColliderShape::Box {
            size: spec
                .size
                .map(Vec2::from)
                .or_else(|| measured.map(|bounds| bounds.size()))
                .unwrap_or(DEFAULT_BOX_SIZE),
        },
        ColliderKind::Circle => ColliderShape::Circle {
            radius: spec
                .radius
                .or_else(|| {
                    measured.map(|bounds| {
                        let half = bounds.half_extents();
                        half.x.min(half.y)
                    })
                })
                .unwrap_or(DEFAULT_CIRCLE_RADIUS),
        },
        ColliderKind::Polygon if !spec.points.is_empty() => ColliderShape::Polygon {
            points: spec.points.iter().copied().map(Vec2::from).collect(),
        },
        ColliderKind::Polygon => ColliderShape::Polygon {
            points: measured
                .unwrap_or_else(|| Rect::from_center_size(Vec2::ZERO, DEFAULT_BOX_SIZE))
                .corners()
                .to_vec(),
        },
    };
    Collider {
        shape,
        offset: Vec2::from(spec.offset),
        is_trigger: spec.is_trigger,
    }
}
