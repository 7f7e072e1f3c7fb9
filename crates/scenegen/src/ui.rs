use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::behavior::{attach_behaviors, CommandContext, CommandError};
use crate::context::BuildContext;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::registries::UI_LAYER_INDEX;
use crate::math::Vec2;
use crate::scene::{
    CanvasComponent, Color, EntityId, RectTransform, SceneGraph, UiAction, UiComponent, UiRoots,
};
use crate::spec::{GameSpec, SceneEntry, UiElementSpec, UiKind, UiSettingsSpec};

pub const CANVAS_NAME: &str = "Canvas";
pub const EVENT_SYSTEM_NAME: &str = "EventSystem";
pub const DEFAULT_FONT_SIZE: f32 = 24.0;

/// Validated button actions keyed by `(scene index, element index)`.
pub type PreparedActions = BTreeMap<(usize, usize), UiAction>;

/// Checks every `onClick` in the document against the command table before any scene
/// is compiled. Rejected actions are recorded once per element and left out.
pub fn prepare_ui_actions(ctx: &mut BuildContext<'_>, spec: &GameSpec) -> PreparedActions {
    let scene_names = spec
        .scenes
        .iter()
        .filter_map(|entry| match entry {
            SceneEntry::Parsed(scene) => Some(scene.name.clone()),
            SceneEntry::Malformed(_) => None,
        })
        .collect::<Vec<_>>();
    let context = CommandContext {
        scene_names: &scene_names,
    };

    let mut prepared = PreparedActions::new();
    for (scene_index, entry) in spec.scenes.iter().enumerate() {
        let SceneEntry::Parsed(scene) = entry else {
            continue;
        };
        ctx.diagnostics.enter_scene(&scene.name);
        for (element_index, element) in scene.ui.iter().enumerate() {
            let Some(action) = element.on_click.as_ref() else {
                continue;
            };
            match ctx.commands.prepare(action, &context) {
                Ok(action) => {
                    prepared.insert((scene_index, element_index), action);
                }
                Err(error) => {
                    let code = match &error {
                        CommandError::Unknown { .. } => DiagnosticCode::UnknownCommand,
                        CommandError::UnknownParameter { .. } => DiagnosticCode::UnknownParameter,
                        CommandError::Rejected { .. } => DiagnosticCode::UnresolvedReference,
                        CommandError::MissingParameter { .. }
                        | CommandError::InvalidArgument { .. } => DiagnosticCode::CoercionFailed,
                    };
                    ctx.diagnostics.push(
                        Diagnostic::warning(code, error.to_string())
                            .subject(element.display_name())
                            .field("onClick")
                            .value(action.command.as_str()),
                    );
                }
            }
        }
        ctx.diagnostics.leave_scene();
    }
    info!(prepared = prepared.len(), "ui_actions_validated");
    prepared
}

/// Creates the canvas and input-event roots for one scene.
pub fn create_ui_roots(graph: &mut SceneGraph, settings: &UiSettingsSpec) -> UiRoots {
    let canvas = graph.spawn(CANVAS_NAME, None);
    if let Some(entity) = graph.get_mut(canvas) {
        entity.layer = UI_LAYER_INDEX;
        entity.components.canvas = Some(CanvasComponent {
            mode: settings.render_mode,
            reference_resolution: Vec2::from(settings.reference_resolution),
        });
    }
    let event_system = graph.spawn(EVENT_SYSTEM_NAME, None);
    if let Some(entity) = graph.get_mut(event_system) {
        entity.components.event_system = true;
    }
    debug!(canvas = canvas.0, event_system = event_system.0, "ui_roots_created");
    UiRoots {
        canvas,
        event_system,
    }
}

/// Builds one UI element under the canvas.
pub fn build_ui_element(
    ctx: &mut BuildContext<'_>,
    graph: &mut SceneGraph,
    roots: &UiRoots,
    spec: &UiElementSpec,
    action: Option<UiAction>,
) -> EntityId {
    let name = spec.display_name().trim().to_string();
    let color = match spec.color.as_deref() {
        None => Color::WHITE,
        Some(raw) => Color::parse_hex(raw).unwrap_or_else(|| {
            ctx.diagnostics.push(
                Diagnostic::warning(DiagnosticCode::InvalidColor, "expected #RRGGBB or #RRGGBBAA")
                    .subject(name.as_str())
                    .field("color")
                    .value(raw),
            );
            Color::WHITE
        }),
    };
    let sprite = spec
        .sprite
        .as_deref()
        .filter(|path| !path.trim().is_empty())
        .and_then(|path| ctx.import_asset(path, &name, "sprite"))
        .map(|asset| asset.canonical_path);
    let text = match spec.kind {
        UiKind::Text | UiKind::Button => Some(spec.text.clone().unwrap_or_default()),
        UiKind::Image => spec.text.clone(),
    };
    let on_click = match spec.kind {
        UiKind::Button => action,
        _ => {
            if action.is_some() {
                debug!(element = %name, "ui_action_ignored_on_non_button");
            }
            None
        }
    };

    let rect = &spec.rect_transform;
    let id = graph.spawn(&name, Some(roots.canvas));
    if let Some(entity) = graph.get_mut(id) {
        entity.layer = UI_LAYER_INDEX;
        entity.components.ui = Some(UiComponent {
            kind: spec.kind,
            rect: RectTransform {
                anchor_min: Vec2::from(rect.anchor_min),
                anchor_max: Vec2::from(rect.anchor_max),
                pivot: Vec2::from(rect.pivot),
                anchored_position: Vec2::from(rect.anchored_position),
                size_delta: Vec2::from(rect.size_delta),
            },
            text,
            font_size: spec
                .font_size
                .filter(|size| size.is_finite() && *size > 0.0)
                .unwrap_or(DEFAULT_FONT_SIZE),
            color,
            sprite,
            on_click,
        });
    }

    attach_behaviors(ctx, graph, id, &spec.scripts);
    debug!(element = %name, kind = ?spec.kind, "ui_element_built");
    id
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::assets::testing::MemoryAssetStore;
    use crate::behavior::{builtin_catalog, builtin_commands, BehaviorRegistry, FieldValue};
    use crate::registries::ProjectRegistries;
    use crate::spec::parse_game_spec;

    fn context(store: &MemoryAssetStore) -> BuildContext<'_> {
        BuildContext::new(
            ProjectRegistries::default(),
            BehaviorRegistry::build(&[builtin_catalog()], &[]),
            builtin_commands(),
            store,
            100.0,
        )
    }

    fn element(value: serde_json::Value) -> UiElementSpec {
        serde_json::from_value(value).expect("element")
    }

    #[test]
    fn roots_are_created_on_ui_layer() {
        let mut graph = SceneGraph::default();
        let roots = create_ui_roots(&mut graph, &UiSettingsSpec::default());
        let canvas = graph.get(roots.canvas).expect("canvas");
        assert_eq!(canvas.layer, 5);
        assert_eq!(
            canvas.components.canvas.as_ref().expect("canvas").reference_resolution,
            Vec2::new(1920.0, 1080.0)
        );
        assert!(graph.get(roots.event_system).expect("events").components.event_system);
    }

    #[test]
    fn button_keeps_prepared_action_and_text_defaults() {
        let store = MemoryAssetStore::default();
        let mut ctx = context(&store);
        let mut graph = SceneGraph::default();
        let roots = create_ui_roots(&mut graph, &UiSettingsSpec::default());
        let action = UiAction {
            command: "Quit".to_string(),
            args: Vec::new(),
        };
        let id = build_ui_element(
            &mut ctx,
            &mut graph,
            &roots,
            &element(json!({"name": "QuitButton", "type": "button"})),
            Some(action.clone()),
        );
        let built = graph.get(id).expect("button");
        assert_eq!(built.parent, Some(roots.canvas));
        let ui = built.components.ui.as_ref().expect("ui");
        assert_eq!(ui.on_click, Some(action));
        assert_eq!(ui.text.as_deref(), Some(""));
        assert!((ui.font_size - DEFAULT_FONT_SIZE).abs() < f32::EPSILON);
        assert_eq!(ui.rect.size_delta, Vec2::new(160.0, 30.0));
    }

    #[test]
    fn elements_stay_on_ui_layer_when_user_layers_are_full() {
        let store = MemoryAssetStore::default();
        let mut ctx = context(&store);
        for index in 0..24 {
            assert!(ctx.register_layer(&format!("L{index}"), "test").is_some());
        }
        let mut graph = SceneGraph::default();
        let roots = create_ui_roots(&mut graph, &UiSettingsSpec::default());
        let id = build_ui_element(
            &mut ctx,
            &mut graph,
            &roots,
            &element(json!({"name": "Score", "type": "text", "text": "0"})),
            None,
        );
        assert_eq!(graph.get(id).expect("label").layer, UI_LAYER_INDEX);
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn document_actions_are_validated_up_front() {
        let raw = json!({"game": {"scenes": [
            {"name": "Menu", "ui": [
                {"type": "button", "onClick": {"command": "LoadScene", "args": {"scene": "Level1"}}},
                {"type": "button", "onClick": {"command": "Teleport"}},
                {"type": "button", "onClick": {"command": "LoadScene", "args": {"scene": "Nowhere"}}}
            ]},
            {"name": "Level1", "ui": [
                {"type": "button", "onClick": {"command": "SetPaused", "args": {"paused": true}}}
            ]}
        ]}})
        .to_string();
        let parsed = parse_game_spec(&raw).expect("parse");
        let store = MemoryAssetStore::default();
        let mut ctx = context(&store);
        let prepared = prepare_ui_actions(&mut ctx, &parsed.spec);

        assert_eq!(prepared.len(), 2);
        assert_eq!(prepared[&(0, 0)].command, "LoadScene");
        assert_eq!(
            prepared[&(1, 0)].args,
            vec![("paused".to_string(), FieldValue::Bool(true))]
        );
        assert_eq!(ctx.diagnostics.count_code(DiagnosticCode::UnknownCommand), 1);
        assert_eq!(ctx.diagnostics.count_code(DiagnosticCode::UnresolvedReference), 1);
        assert_eq!(ctx.diagnostics.entries()[0].scene.as_deref(), Some("Menu"));
    }
}
