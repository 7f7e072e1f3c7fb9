use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::{BehaviorDescriptor, BehaviorInstance, BindingSource, ComponentKind, FieldKind, FieldValue};
use crate::context::BuildContext;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::math::{Vec2, Vec3};
use crate::registries::LayerTable;
use crate::resolve::resolve_reference;
use crate::scene::{Color, EntityId, SceneGraph};
use crate::spec::{BehaviorBindingSpec, ReferenceHint};

pub const GROUND_LAYER: &str = "Ground";
pub const GROUND_CHECK_NAME: &str = "GroundCheck";
/// Gap between the bottom of the visual and the synthesized ground-check anchor.
pub const GROUND_CHECK_MARGIN: f32 = 0.05;
/// Anchor height used when the entity has no visual to measure.
pub const GROUND_CHECK_FALLBACK_OFFSET: f32 = -0.6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoerceError {
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Unresolved(String),
    #[error("layer '{0}' is not registered")]
    UnknownLayer(String),
}

fn invalid(kind: &str, raw: &Value) -> CoerceError {
    CoerceError::Invalid(format!("cannot convert {raw} to {kind}"))
}

/// Converts one authored parameter into a typed value. Numeric text is parsed with
/// Rust's locale-independent parsers, so `"1.5"` works and `"1,5"` does not.
pub fn coerce_parameter(
    kind: FieldKind,
    raw: &Value,
    graph: &SceneGraph,
    layers: &LayerTable,
    context: Option<EntityId>,
) -> Result<FieldValue, CoerceError> {
    match kind {
        FieldKind::Int => as_int(raw).map(FieldValue::Int).ok_or_else(|| invalid("int", raw)),
        FieldKind::Float => as_float(raw)
            .map(FieldValue::Float)
            .ok_or_else(|| invalid("float", raw)),
        FieldKind::Bool => as_bool(raw).map(FieldValue::Bool).ok_or_else(|| invalid("bool", raw)),
        FieldKind::Text => match raw {
            Value::String(text) => Ok(FieldValue::Text(text.clone())),
            Value::Number(number) => Ok(FieldValue::Text(number.to_string())),
            Value::Bool(flag) => Ok(FieldValue::Text(flag.to_string())),
            _ => Err(invalid("text", raw)),
        },
        FieldKind::Vector2 => as_vector(raw, false)
            .map(|vector| FieldValue::Vector2(vector.xy()))
            .ok_or_else(|| invalid("vector2", raw)),
        FieldKind::Vector3 => as_vector(raw, true)
            .map(FieldValue::Vector3)
            .ok_or_else(|| invalid("vector3", raw)),
        FieldKind::Color => raw
            .as_str()
            .and_then(Color::parse_hex)
            .map(FieldValue::Color)
            .ok_or_else(|| invalid("color", raw)),
        FieldKind::LayerMask => layer_mask(raw, layers).map(FieldValue::LayerMask),
        FieldKind::EntityRef => resolve_entity(raw, graph, context).map(FieldValue::Entity),
        FieldKind::ComponentRef(component) => {
            let entity = resolve_entity(raw, graph, context)?;
            if !has_component(graph, entity, component) {
                let name = graph.get(entity).map(|found| found.name.as_str()).unwrap_or("?");
                return Err(CoerceError::Invalid(format!(
                    "entity '{name}' has no {component:?} component"
                )));
            }
            Ok(FieldValue::Component {
                entity,
                kind: component,
            })
        }
    }
}

fn as_int(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|value| value.fract() == 0.0 && value.abs() < i64::MAX as f64)
                .map(|value| value as i64)
        }),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite() && value.fract() == 0.0)
                    .map(|value| value as i64)
            })
        }
        _ => None,
    }
}

fn as_float(raw: &Value) -> Option<f64> {
    let value = match raw {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}

fn as_bool(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// `{x, y[, z]}` objects or `[x, y[, z]]` arrays. Components may be numeric text.
fn as_vector(raw: &Value, allow_z: bool) -> Option<Vec3> {
    let component = |value: Option<&Value>| -> Option<Option<f32>> {
        match value {
            None | Some(Value::Null) => Some(None),
            Some(value) => as_float(value).map(|parsed| Some(parsed as f32)),
        }
    };
    let (x, y, z) = match raw {
        Value::Object(map) => (
            component(map.get("x"))?,
            component(map.get("y"))?,
            component(map.get("z"))?,
        ),
        Value::Array(items) if (2..=3).contains(&items.len()) => (
            component(items.first())?,
            component(items.get(1))?,
            component(items.get(2))?,
        ),
        _ => return None,
    };
    if z.is_some() && !allow_z {
        return None;
    }
    Some(Vec3::new(x?, y?, z.unwrap_or(0.0)))
}

fn layer_mask(raw: &Value, layers: &LayerTable) -> Result<u32, CoerceError> {
    let named = |name: &str| -> Result<u32, CoerceError> {
        layers
            .mask_for(name.trim())
            .ok_or_else(|| CoerceError::UnknownLayer(name.trim().to_string()))
    };
    match raw {
        Value::Number(number) => number
            .as_u64()
            .and_then(|mask| u32::try_from(mask).ok())
            .ok_or_else(|| invalid("layer mask", raw)),
        Value::String(name) => named(name),
        Value::Array(items) => items.iter().try_fold(0u32, |mask, item| match item {
            Value::String(name) => Ok(mask | named(name)?),
            _ => Err(invalid("layer name", item)),
        }),
        _ => Err(invalid("layer mask", raw)),
    }
}

fn resolve_entity(
    raw: &Value,
    graph: &SceneGraph,
    context: Option<EntityId>,
) -> Result<EntityId, CoerceError> {
    let hint = serde_json::from_value::<ReferenceHint>(raw.clone())
        .map_err(|_| invalid("entity reference", raw))?;
    resolve_reference(graph, context, &hint)
        .map(|resolution| resolution.entity)
        .ok_or_else(|| CoerceError::Unresolved(format!("no entity matches {raw}")))
}

fn has_component(graph: &SceneGraph, entity: EntityId, kind: ComponentKind) -> bool {
    let Some(found) = graph.get(entity) else {
        return false;
    };
    let components = &found.components;
    match kind {
        ComponentKind::Transform => true,
        ComponentKind::Body => components.body.is_some(),
        ComponentKind::Visual => components.visual.is_some(),
        ComponentKind::Collider => !components.colliders.is_empty(),
        ComponentKind::Ui => components.ui.is_some(),
    }
}

/// Attaches each declared behavior to `entity` in order. Every fault is recorded as a
/// diagnostic and skips only the behavior or parameter it concerns.
pub fn attach_behaviors(
    ctx: &mut BuildContext<'_>,
    graph: &mut SceneGraph,
    entity: EntityId,
    bindings: &[BehaviorBindingSpec],
) {
    let subject = graph
        .get(entity)
        .map(|found| found.name.clone())
        .unwrap_or_default();

    for binding in bindings {
        let (module, descriptor) = match ctx.behaviors.lookup(&binding.name) {
            Ok((module, descriptor)) => (module.to_string(), descriptor.clone()),
            Err(error) => {
                let code = match error {
                    super::BehaviorLookupError::Unknown { .. } => DiagnosticCode::UnknownBehavior,
                    super::BehaviorLookupError::Ambiguous { .. } => DiagnosticCode::AmbiguousBehavior,
                };
                ctx.diagnostics.push(
                    Diagnostic::warning(code, error.to_string())
                        .subject(subject.as_str())
                        .value(binding.name.as_str()),
                );
                continue;
            }
        };

        let mut instance = BehaviorInstance::new(&module, &descriptor);
        bind_explicit(ctx, graph, entity, &subject, &descriptor, binding, &mut instance);
        auto_wire(ctx, graph, entity, &descriptor, &mut instance);
        debug!(
            entity = %subject,
            behavior = %instance.qualified_name(),
            bound_fields = instance.fields.len(),
            "behavior_attached"
        );
        if let Some(target) = graph.get_mut(entity) {
            target.components.behaviors.push(instance);
        }
    }
}

fn bind_explicit(
    ctx: &mut BuildContext<'_>,
    graph: &SceneGraph,
    entity: EntityId,
    subject: &str,
    descriptor: &BehaviorDescriptor,
    binding: &BehaviorBindingSpec,
    instance: &mut BehaviorInstance,
) {
    for (param, raw) in &binding.parameters {
        let Some(schema) = descriptor.field(param) else {
            ctx.diagnostics.push(
                Diagnostic::warning(
                    DiagnosticCode::UnknownParameter,
                    format!("behavior '{}' has no field '{param}'", descriptor.name),
                )
                .subject(subject)
                .field(param.as_str())
                .value(raw.to_string()),
            );
            continue;
        };
        if raw.is_null() {
            continue;
        }

        let coerced = coerce_parameter(schema.kind, raw, graph, &ctx.registries.layers, Some(entity));
        let outcome = match coerced {
            Ok(value) => (descriptor.bind)(instance, schema, value)
                .map_err(|message| (DiagnosticCode::CoercionFailed, message)),
            Err(CoerceError::Invalid(message)) => Err((DiagnosticCode::CoercionFailed, message)),
            Err(CoerceError::Unresolved(message)) => {
                Err((DiagnosticCode::UnresolvedReference, message))
            }
            Err(error @ CoerceError::UnknownLayer(_)) => {
                Err((DiagnosticCode::UnknownLayer, error.to_string()))
            }
        };
        if let Err((code, message)) = outcome {
            ctx.diagnostics.push(
                Diagnostic::warning(code, message)
                    .subject(subject)
                    .field(schema.name)
                    .value(raw.to_string()),
            );
        }
    }
}

/// Fills still-unset fields that follow naming conventions. Never touches a field the
/// document already bound.
fn auto_wire(
    ctx: &BuildContext<'_>,
    graph: &mut SceneGraph,
    entity: EntityId,
    descriptor: &BehaviorDescriptor,
    instance: &mut BehaviorInstance,
) {
    for schema in &descriptor.fields {
        if instance.is_set(schema.name) {
            continue;
        }
        let lowered = schema.name.to_ascii_lowercase();
        let wired = match schema.kind {
            FieldKind::LayerMask if lowered.contains("ground") => ctx
                .registries
                .layers
                .mask_for(GROUND_LAYER)
                .map(FieldValue::LayerMask),
            FieldKind::EntityRef if lowered.contains("groundcheck") => {
                Some(FieldValue::Entity(ground_check_anchor(graph, entity)))
            }
            FieldKind::ComponentRef(ComponentKind::Transform) if lowered.contains("groundcheck") => {
                Some(FieldValue::Component {
                    entity: ground_check_anchor(graph, entity),
                    kind: ComponentKind::Transform,
                })
            }
            FieldKind::ComponentRef(ComponentKind::Body)
                if has_component(graph, entity, ComponentKind::Body) =>
            {
                Some(FieldValue::Component {
                    entity,
                    kind: ComponentKind::Body,
                })
            }
            _ => None,
        };
        if let Some(value) = wired {
            debug!(field = schema.name, "behavior_field_auto_wired");
            instance.set(schema.name, value, BindingSource::AutoWired);
        }
    }
}

/// Reuses an existing `GroundCheck` child, otherwise spawns one just below the visual.
fn ground_check_anchor(graph: &mut SceneGraph, entity: EntityId) -> EntityId {
    if let Some(existing) = graph
        .children(entity)
        .iter()
        .copied()
        .find(|child| {
            graph
                .get(*child)
                .is_some_and(|found| found.name.eq_ignore_ascii_case(GROUND_CHECK_NAME))
        })
    {
        return existing;
    }

    let local = graph
        .get(entity)
        .and_then(|found| found.components.visual.as_ref())
        .map(|visual| {
            Vec2::new(
                visual.local_bounds.center().x,
                visual.local_bounds.min.y - GROUND_CHECK_MARGIN,
            )
        })
        .unwrap_or(Vec2::new(0.0, GROUND_CHECK_FALLBACK_OFFSET));
    let anchor = graph.spawn(GROUND_CHECK_NAME, Some(entity));
    if let Some(found) = graph.get_mut(anchor) {
        found.transform.position = Vec3::new(local.x, local.y, 0.0);
    }
    anchor
}
