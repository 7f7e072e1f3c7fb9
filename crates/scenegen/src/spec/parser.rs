use std::cell::RefCell;
use std::fmt;

use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use super::types::{GameSpec, MetadataSpec, SceneEntry, SceneParseFault, SettingsSpec, TilesetSpec};

pub const MAX_INPUT_CHARS: usize = 10_000_000;
pub const MAX_CONTAINER_ITEMS: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecParseError {
    #[error("spec input is {chars} characters; the limit is {limit}")]
    Oversized { chars: usize, limit: usize },
    #[error("spec input ends before the document is complete ({location})")]
    Truncated { location: SourceLocation },
    #[error("spec input is not valid JSON at {location}: {message}")]
    Malformed {
        location: SourceLocation,
        message: String,
    },
    #[error("container at '{path}' holds more than {limit} entries")]
    TooManyElements { path: String, limit: usize },
    #[error("'{path}' must be an object, found {found}")]
    NotAnObject { path: String, found: &'static str },
    #[error("missing required section '{section}'")]
    MissingRequiredSection { section: &'static str },
}

/// Non-fatal decode failure of an optional top-level section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionFault {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ParsedSpec {
    pub spec: GameSpec,
    pub section_faults: Vec<SectionFault>,
}

pub fn parse_game_spec(raw: &str) -> Result<ParsedSpec, SpecParseError> {
    if raw.len() > MAX_INPUT_CHARS {
        let chars = raw.chars().count();
        if chars > MAX_INPUT_CHARS {
            return Err(SpecParseError::Oversized {
                chars,
                limit: MAX_INPUT_CHARS,
            });
        }
    }

    let root = parse_bounded_value(raw, MAX_CONTAINER_ITEMS)?;
    let Value::Object(mut root) = root else {
        return Err(SpecParseError::NotAnObject {
            path: "$".to_string(),
            found: json_kind(&root),
        });
    };

    let mut game = match root.remove("game") {
        Some(Value::Object(game)) => game,
        Some(other) => {
            return Err(SpecParseError::NotAnObject {
                path: "game".to_string(),
                found: json_kind(&other),
            })
        }
        // Tolerate documents that put the game fields at the root.
        None => root,
    };

    let scenes = match game.remove("scenes") {
        Some(Value::Array(scenes)) => scenes,
        _ => {
            return Err(SpecParseError::MissingRequiredSection {
                section: "game.scenes",
            })
        }
    };

    let mut section_faults = Vec::new();
    let title = decode_title(&mut game, &mut section_faults);
    let settings = match game.remove("settings") {
        Some(value) => decode_section::<SettingsSpec>(value, "game.settings", &mut section_faults)
            .unwrap_or_default(),
        None => SettingsSpec::default(),
    };
    let tilesets = decode_tilesets(game.remove("tilesets"), "game.tilesets", &mut section_faults);

    let scenes = scenes
        .into_iter()
        .enumerate()
        .map(|(index, value)| decode_scene(index, value))
        .collect::<Vec<_>>();

    info!(
        title = %title,
        scene_count = scenes.len(),
        tileset_count = tilesets.len(),
        section_fault_count = section_faults.len(),
        "spec_parsed"
    );

    Ok(ParsedSpec {
        spec: GameSpec {
            title,
            settings,
            tilesets,
            scenes,
        },
        section_faults,
    })
}

fn decode_title(game: &mut Map<String, Value>, faults: &mut Vec<SectionFault>) -> String {
    let from_metadata = game.remove("metadata").and_then(|value| {
        decode_section::<MetadataSpec>(value, "game.metadata", faults).and_then(|meta| meta.title)
    });
    let direct = match game.remove("title") {
        Some(Value::String(title)) => Some(title),
        _ => None,
    };
    from_metadata
        .or(direct)
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}

fn decode_tilesets(
    value: Option<Value>,
    path: &str,
    faults: &mut Vec<SectionFault>,
) -> Vec<TilesetSpec> {
    let Some(value) = value else {
        return Vec::new();
    };
    let Value::Array(items) = value else {
        faults.push(SectionFault {
            path: path.to_string(),
            message: format!("expected an array, found {}", json_kind(&value)),
        });
        return Vec::new();
    };
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| decode_section(item, &format!("{path}[{index}]"), faults))
        .collect()
}

fn decode_section<T>(value: Value, path: &str, faults: &mut Vec<SectionFault>) -> Option<T>
where
    T: for<'de> Deserialize<'de>,
{
    match serde_path_to_error::deserialize::<_, T>(value) {
        Ok(decoded) => Some(decoded),
        Err(error) => {
            faults.push(SectionFault {
                path: join_path(path, &error.path().to_string()),
                message: error.inner().to_string(),
            });
            None
        }
    }
}

fn decode_scene(index: usize, value: Value) -> SceneEntry {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .unwrap_or_else(|| "<unnamed>".to_string());
    let base_path = format!("game.scenes[{index}]");

    if !value.is_object() {
        return SceneEntry::Malformed(SceneParseFault {
            index,
            name,
            path: base_path,
            message: format!("expected an object, found {}", json_kind(&value)),
        });
    }

    match serde_path_to_error::deserialize::<_, super::types::SceneSpec>(value) {
        Ok(mut scene) => {
            if scene.name.trim().is_empty() {
                scene.name = format!("Scene{}", index + 1);
            }
            debug!(
                scene_index = index,
                scene = %scene.name,
                entity_count = scene.game_objects.len(),
                tilemap_count = scene.tilemaps.len(),
                ui_count = scene.ui.len(),
                "scene_spec_decoded"
            );
            SceneEntry::Parsed(scene)
        }
        Err(error) => SceneEntry::Malformed(SceneParseFault {
            index,
            name,
            path: join_path(&base_path, &error.path().to_string()),
            message: error.inner().to_string(),
        }),
    }
}

fn join_path(base: &str, inner: &str) -> String {
    if inner.is_empty() || inner == "." {
        base.to_string()
    } else if inner.starts_with('[') {
        format!("{base}{inner}")
    } else {
        format!("{base}.{inner}")
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_bounded_value(raw: &str, max_items: usize) -> Result<Value, SpecParseError> {
    let overflow = RefCell::new(None::<String>);
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let result = BoundedValue {
        max_items,
        overflow: &overflow,
        path: "$".to_string(),
    }
    .deserialize(&mut deserializer)
    .and_then(|value| deserializer.end().map(|_| value));

    match result {
        Ok(value) => Ok(value),
        Err(error) => {
            if let Some(path) = overflow.into_inner() {
                return Err(SpecParseError::TooManyElements {
                    path,
                    limit: max_items,
                });
            }
            let location = SourceLocation {
                line: error.line(),
                column: error.column(),
            };
            if error.is_eof() {
                Err(SpecParseError::Truncated { location })
            } else {
                Err(SpecParseError::Malformed {
                    location,
                    message: error.to_string(),
                })
            }
        }
    }
}

/// Builds a `serde_json::Value` while refusing containers larger than the ceiling, so an
/// oversized array is rejected before it is fully materialised.
struct BoundedValue<'a> {
    max_items: usize,
    overflow: &'a RefCell<Option<String>>,
    path: String,
}

impl<'a> BoundedValue<'a> {
    fn child(&self, path: String) -> Self {
        Self {
            max_items: self.max_items,
            overflow: self.overflow,
            path,
        }
    }

    fn record_overflow(&self) {
        let mut slot = self.overflow.borrow_mut();
        if slot.is_none() {
            *slot = Some(self.path.clone());
        }
    }
}

impl<'de, 'a> DeserializeSeed<'de> for BoundedValue<'a> {
    type Value = Value;

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de, 'a> Visitor<'de> for BoundedValue<'a> {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("any JSON value")
    }

    fn visit_bool<E>(self, value: bool) -> Result<Value, E> {
        Ok(Value::Bool(value))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Value, E> {
        Ok(Value::from(value))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Value, E> {
        Ok(Value::from(value))
    }

    fn visit_f64<E>(self, value: f64) -> Result<Value, E> {
        Ok(serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null))
    }

    fn visit_str<E>(self, value: &str) -> Result<Value, E> {
        Ok(Value::String(value.to_string()))
    }

    fn visit_string<E>(self, value: String) -> Result<Value, E> {
        Ok(Value::String(value))
    }

    fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        loop {
            let child = self.child(format!("{}[{}]", self.path, items.len()));
            let Some(item) = seq.next_element_seed(child)? else {
                break;
            };
            if items.len() >= self.max_items {
                self.record_overflow();
                return Err(de::Error::custom("container element ceiling exceeded"));
            }
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut object = Map::new();
        let mut seen = 0usize;
        while let Some(key) = map.next_key::<String>()? {
            if seen >= self.max_items {
                self.record_overflow();
                return Err(de::Error::custom("container member ceiling exceeded"));
            }
            seen += 1;
            let child = self.child(format!("{}.{}", self.path, key));
            let value = map.next_value_seed(child)?;
            object.insert(key, value);
        }
        Ok(Value::Object(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::types::{BodyKind, ColliderKind, TileColliderKind, UiKind};

    fn parse_ok(raw: &str) -> GameSpec {
        parse_game_spec(raw).expect("parse").spec
    }

    fn only_scene(spec: &GameSpec) -> &super::super::types::SceneSpec {
        match &spec.scenes[0] {
            SceneEntry::Parsed(scene) => scene,
            SceneEntry::Malformed(fault) => panic!("scene malformed: {fault}"),
        }
    }

    #[test]
    fn minimal_spec_applies_camera_defaults() {
        let spec = parse_ok(r#"{"game":{"scenes":[{"name":"S"}]}}"#);
        assert_eq!(spec.title, "Untitled");
        let scene = only_scene(&spec);
        assert_eq!(scene.name, "S");
        assert!(scene.camera.orthographic);
        assert!((scene.camera.size - 5.0).abs() < f32::EPSILON);
        assert!((scene.camera.position.z + 10.0).abs() < f32::EPSILON);
    }

    #[test]
    fn non_object_root_is_rejected() {
        let err = parse_game_spec("[1,2,3]").expect_err("err");
        assert!(matches!(err, SpecParseError::NotAnObject { ref path, .. } if path == "$"));
    }

    #[test]
    fn missing_scene_list_is_fatal() {
        let err = parse_game_spec(r#"{"game":{"metadata":{"title":"T"}}}"#).expect_err("err");
        assert_eq!(
            err,
            SpecParseError::MissingRequiredSection {
                section: "game.scenes"
            }
        );
    }

    #[test]
    fn truncated_document_reports_location() {
        let err = parse_game_spec(r#"{"game":{"scenes":[{"name":"S"}"#).expect_err("err");
        let SpecParseError::Truncated { location } = err else {
            panic!("expected truncated, got {err:?}");
        };
        assert_eq!(location.line, 1);
    }

    #[test]
    fn syntax_error_is_malformed_not_truncated() {
        let err = parse_game_spec(r#"{"game": {"scenes": [}]}}"#).expect_err("err");
        assert!(matches!(err, SpecParseError::Malformed { .. }), "{err:?}");
    }

    #[test]
    fn oversized_input_is_rejected_before_parsing() {
        let raw = " ".repeat(MAX_INPUT_CHARS + 1);
        let err = parse_game_spec(&raw).expect_err("err");
        assert!(matches!(err, SpecParseError::Oversized { .. }));
    }

    #[test]
    fn container_ceiling_names_offending_path() {
        let items = vec!["0"; MAX_CONTAINER_ITEMS + 1].join(",");
        let raw = format!(r#"{{"game":{{"scenes":[],"junk":[{items}]}}}}"#);
        let err = parse_game_spec(&raw).expect_err("err");
        assert_eq!(
            err,
            SpecParseError::TooManyElements {
                path: "$.game.junk".to_string(),
                limit: MAX_CONTAINER_ITEMS
            }
        );
    }

    #[test]
    fn container_at_ceiling_is_accepted() {
        let items = vec!["0"; MAX_CONTAINER_ITEMS].join(",");
        let raw = format!(r#"{{"game":{{"scenes":[],"junk":[{items}]}}}}"#);
        assert!(parse_game_spec(&raw).is_ok());
    }

    #[test]
    fn malformed_scene_is_isolated_with_path() {
        let spec = parse_ok(
            r#"{"game":{"scenes":[
                {"name":"Good"},
                {"name":"Bad","gameObjects":[{"name":"A","transform":{"position":{"x":"left"}}}]},
                7
            ]}}"#,
        );
        assert!(matches!(spec.scenes[0], SceneEntry::Parsed(_)));
        let SceneEntry::Malformed(fault) = &spec.scenes[1] else {
            panic!("expected malformed scene");
        };
        assert_eq!(fault.name, "Bad");
        assert!(
            fault.path.starts_with("game.scenes[1].gameObjects[0].transform"),
            "{}",
            fault.path
        );
        assert!(matches!(spec.scenes[2], SceneEntry::Malformed(_)));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let spec = parse_ok(
            r#"{"version":3,"game":{"future":true,"scenes":[{"name":"S","weather":"rain",
                "gameObjects":[{"name":"P","mood":"happy"}]}]}}"#,
        );
        assert_eq!(only_scene(&spec).game_objects.len(), 1);
    }

    #[test]
    fn full_entity_fields_decode() {
        let spec = parse_ok(
            r##"{"game":{"metadata":{"title":"Coin Run"},
              "settings":{"tags":["Coin"],"layers":["Ground"],"sortingLayers":["Background"],"defaultPixelsPerUnit":32},
              "scenes":[{"name":"Main","backgroundColor":"#336699",
                "gameObjects":[{"id":"player","name":"Player","tag":"Player","layer":"Default",
                  "transform":{"position":{"x":1,"y":2},"rotation":{"z":45},"scale":{"x":2}},
                  "sprite":{"path":"asset_library/p.png","pixelsPerUnit":16,"orderInLayer":3},
                  "physics":{"rigidbody":{"bodyType":"Kinematic","gravityScale":0},
                             "colliders":[{"type":"CircleCollider2D","radius":0.4},{"type":"box","autoSize":false}]},
                  "scripts":[{"name":"PlayerController","parameters":{"moveSpeed":5}}]}],
                "tilemaps":[{"name":"Ground","tileset":"terrain","collider":"composite",
                  "grid":{"rows":["AB"],"legend":{"A":"grass","B":null}}}],
                "ui":[{"type":"Button","text":"Play","onClick":{"command":"LoadScene","args":{"scene":"Main"}}}]}]}}"##,
        );
        assert_eq!(spec.title, "Coin Run");
        assert!((spec.settings.pixels_per_unit() - 32.0).abs() < f32::EPSILON);
        let scene = only_scene(&spec);
        let player = &scene.game_objects[0];
        assert_eq!(player.display_name(), "Player");
        assert!((player.transform.scale.x - 2.0).abs() < f32::EPSILON);
        assert!((player.transform.scale.y - 1.0).abs() < f32::EPSILON);
        assert!(
            (player.transform.rotation.expect("rotation").z_degrees() - 45.0).abs() < f32::EPSILON
        );
        let physics = player.physics.as_ref().expect("physics");
        assert_eq!(
            physics.rigidbody.as_ref().expect("body").body_type,
            BodyKind::Kinematic
        );
        assert_eq!(physics.colliders[0].kind, ColliderKind::Circle);
        assert!(!physics.colliders[1].auto_size);
        let tilemap = &scene.tilemaps[0];
        assert_eq!(tilemap.collider, TileColliderKind::Composite);
        assert_eq!(tilemap.grid.legend.get("B"), Some(&None));
        assert_eq!(scene.ui[0].kind, UiKind::Button);
    }

    #[test]
    fn malformed_tileset_is_a_section_fault() {
        let parsed = parse_game_spec(
            r#"{"game":{"tilesets":[{"name":"ok","image":"a.png","tileSize":16},{"name":5}],"scenes":[]}}"#,
        )
        .expect("parse");
        assert_eq!(parsed.spec.tilesets.len(), 1);
        assert_eq!(parsed.section_faults.len(), 1);
        assert!(parsed.section_faults[0].path.starts_with("game.tilesets[1]"));
    }

    #[test]
    fn blank_scene_name_gets_positional_default() {
        let spec = parse_ok(r#"{"game":{"scenes":[{"name":"  "}]}}"#);
        assert_eq!(only_scene(&spec).name, "Scene1");
    }
}
