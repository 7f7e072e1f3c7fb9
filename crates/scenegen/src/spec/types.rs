use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::math::{Vec2, Vec3};

pub const DEFAULT_PIXELS_PER_UNIT: f32 = 100.0;
pub const DEFAULT_CAMERA_SIZE: f32 = 5.0;
pub const DEFAULT_CAMERA_Z: f32 = -10.0;
pub const DEFAULT_EMPTY_CHAR: char = '.';

/// Fully decoded document. Scenes that failed to decode are kept as faults so the
/// compiler can abort them individually.
#[derive(Debug, Clone)]
pub struct GameSpec {
    pub title: String,
    pub settings: SettingsSpec,
    pub tilesets: Vec<TilesetSpec>,
    pub scenes: Vec<SceneEntry>,
}

#[derive(Debug, Clone)]
pub enum SceneEntry {
    Parsed(SceneSpec),
    Malformed(SceneParseFault),
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("scene #{index} ({name}) is malformed at '{path}': {message}")]
pub struct SceneParseFault {
    pub index: usize,
    pub name: String,
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetadataSpec {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsSpec {
    pub tags: Vec<String>,
    pub layers: Vec<String>,
    pub sorting_layers: Vec<String>,
    pub default_pixels_per_unit: Option<f32>,
}

impl SettingsSpec {
    pub fn pixels_per_unit(&self) -> f32 {
        self.default_pixels_per_unit
            .filter(|ppu| ppu.is_finite() && *ppu > 0.0)
            .unwrap_or(DEFAULT_PIXELS_PER_UNIT)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct Vec2Spec {
    pub x: f32,
    pub y: f32,
}

impl From<Vec2Spec> for Vec2 {
    fn from(value: Vec2Spec) -> Self {
        Vec2::new(value.x, value.y)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct Vec3Spec {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vec3Spec> for Vec3 {
    fn from(value: Vec3Spec) -> Self {
        Vec3::new(value.x, value.y, value.z)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ScaleSpec {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for ScaleSpec {
    fn default() -> Self {
        Self {
            x: 1.0,
            y: 1.0,
            z: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum RotationSpec {
    Degrees(f32),
    Euler {
        #[serde(default)]
        z: f32,
    },
}

impl RotationSpec {
    pub fn z_degrees(&self) -> f32 {
        match *self {
            RotationSpec::Degrees(z) | RotationSpec::Euler { z } => z,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraSpec {
    pub orthographic: bool,
    pub size: f32,
    pub position: CameraPositionSpec,
}

impl Default for CameraSpec {
    fn default() -> Self {
        Self {
            orthographic: true,
            size: DEFAULT_CAMERA_SIZE,
            position: CameraPositionSpec::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CameraPositionSpec {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for CameraPositionSpec {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: DEFAULT_CAMERA_Z,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, serde::Serialize)]
#[serde(from = "String")]
pub enum CanvasMode {
    #[default]
    ScreenSpaceOverlay,
    ScreenSpaceCamera,
    WorldSpace,
}

impl From<String> for CanvasMode {
    fn from(value: String) -> Self {
        let lowered = value.to_ascii_lowercase();
        if lowered.contains("camera") {
            CanvasMode::ScreenSpaceCamera
        } else if lowered.contains("world") {
            CanvasMode::WorldSpace
        } else {
            CanvasMode::ScreenSpaceOverlay
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UiSettingsSpec {
    pub render_mode: CanvasMode,
    pub reference_resolution: Vec2Spec,
}

impl Default for UiSettingsSpec {
    fn default() -> Self {
        Self {
            render_mode: CanvasMode::ScreenSpaceOverlay,
            reference_resolution: Vec2Spec {
                x: 1920.0,
                y: 1080.0,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneSpec {
    pub name: String,
    pub camera: CameraSpec,
    pub background_color: Option<String>,
    pub ui_settings: UiSettingsSpec,
    #[serde(alias = "entities")]
    pub game_objects: Vec<EntitySpec>,
    pub tilesets: Vec<TilesetSpec>,
    pub tilemaps: Vec<TilemapSpec>,
    pub ui: Vec<UiElementSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransformSpec {
    pub position: Vec3Spec,
    pub rotation: Option<RotationSpec>,
    pub scale: ScaleSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpriteSpec {
    pub path: Option<String>,
    pub pixels_per_unit: Option<f32>,
    pub sorting_layer: Option<String>,
    #[serde(alias = "order")]
    pub order_in_layer: i32,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, serde::Serialize)]
#[serde(from = "String")]
pub enum BodyKind {
    #[default]
    Dynamic,
    Kinematic,
    Static,
}

impl From<String> for BodyKind {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "kinematic" => BodyKind::Kinematic,
            "static" => BodyKind::Static,
            _ => BodyKind::Dynamic,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RigidbodySpec {
    pub body_type: BodyKind,
    pub gravity_scale: f32,
    pub freeze_rotation: bool,
    pub constraints: Vec<String>,
}

impl Default for RigidbodySpec {
    fn default() -> Self {
        Self {
            body_type: BodyKind::Dynamic,
            gravity_scale: 1.0,
            freeze_rotation: false,
            constraints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, serde::Serialize)]
#[serde(from = "String")]
pub enum ColliderKind {
    #[default]
    Box,
    Circle,
    Polygon,
}

impl From<String> for ColliderKind {
    fn from(value: String) -> Self {
        let lowered = value.to_ascii_lowercase();
        if lowered.contains("circle") {
            ColliderKind::Circle
        } else if lowered.contains("poly") {
            ColliderKind::Polygon
        } else {
            ColliderKind::Box
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColliderSpec {
    #[serde(rename = "type", alias = "kind")]
    pub kind: ColliderKind,
    pub auto_size: bool,
    pub size: Option<Vec2Spec>,
    pub radius: Option<f32>,
    pub offset: Vec2Spec,
    pub is_trigger: bool,
    pub points: Vec<Vec2Spec>,
}

impl Default for ColliderSpec {
    fn default() -> Self {
        Self {
            kind: ColliderKind::Box,
            auto_size: true,
            size: None,
            radius: None,
            offset: Vec2Spec::default(),
            is_trigger: false,
            points: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PhysicsSpec {
    pub rigidbody: Option<RigidbodySpec>,
    pub colliders: Vec<ColliderSpec>,
    pub collider: Option<ColliderSpec>,
}

impl PhysicsSpec {
    pub fn all_colliders(&self) -> impl Iterator<Item = &ColliderSpec> {
        self.collider.iter().chain(self.colliders.iter())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BehaviorBindingSpec {
    pub name: String,
    pub parameters: BTreeMap<String, Value>,
}

/// Symbolic pointer to another entity: either a bare string tried against every
/// strategy, or an object naming which strategies apply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReferenceHint {
    Text(String),
    Structured(StructuredReference),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StructuredReference {
    pub path: Option<String>,
    #[serde(alias = "child")]
    pub child_name: Option<String>,
    #[serde(alias = "name", alias = "global")]
    pub global_name: Option<String>,
    pub tag: Option<String>,
}

impl StructuredReference {
    pub fn is_empty(&self) -> bool {
        self.path.is_none()
            && self.child_name.is_none()
            && self.global_name.is_none()
            && self.tag.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntitySpec {
    pub id: Option<String>,
    pub name: Option<String>,
    pub tag: Option<String>,
    pub layer: Option<String>,
    pub parent: Option<ReferenceHint>,
    pub transform: TransformSpec,
    pub sprite: Option<SpriteSpec>,
    pub physics: Option<PhysicsSpec>,
    #[serde(alias = "behaviors")]
    pub scripts: Vec<BehaviorBindingSpec>,
}

impl EntitySpec {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("GameObject")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TileCellSpec {
    pub name: String,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TilesetSpec {
    pub name: String,
    #[serde(alias = "path", alias = "atlas")]
    pub image: String,
    pub tile_width: Option<u32>,
    pub tile_height: Option<u32>,
    pub tile_size: Option<u32>,
    pub pixels_per_unit: Option<f32>,
    pub filter_mode: Option<String>,
    pub compression: Option<String>,
    pub tiles: Vec<TileCellSpec>,
}

impl TilesetSpec {
    pub fn tile_pixel_size(&self) -> (u32, u32) {
        let fallback = self.tile_size.unwrap_or(0);
        (
            self.tile_width.unwrap_or(fallback),
            self.tile_height.unwrap_or(fallback),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TileGridSpec {
    pub rows: Vec<String>,
    pub legend: BTreeMap<String, Option<String>>,
    pub empty: Option<String>,
}

impl TileGridSpec {
    pub fn empty_char(&self) -> char {
        self.empty
            .as_deref()
            .and_then(|raw| raw.chars().next())
            .unwrap_or(DEFAULT_EMPTY_CHAR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, serde::Serialize)]
#[serde(from = "String")]
pub enum TileColliderKind {
    #[default]
    None,
    Simple,
    Composite,
}

impl From<String> for TileColliderKind {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "simple" | "tilemap" => TileColliderKind::Simple,
            "composite" => TileColliderKind::Composite,
            _ => TileColliderKind::None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TilemapSpec {
    pub name: String,
    pub tileset: String,
    pub origin: Vec2Spec,
    pub cell_size: Option<Vec2Spec>,
    pub grid: TileGridSpec,
    pub collider: TileColliderKind,
    pub sorting_layer: Option<String>,
    #[serde(alias = "order")]
    pub order_in_layer: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, serde::Serialize)]
#[serde(from = "String")]
pub enum UiKind {
    #[default]
    Text,
    Image,
    Button,
}

impl From<String> for UiKind {
    fn from(value: String) -> Self {
        let lowered = value.to_ascii_lowercase();
        if lowered.contains("button") {
            UiKind::Button
        } else if lowered.contains("image") || lowered.contains("panel") {
            UiKind::Image
        } else {
            UiKind::Text
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RectTransformSpec {
    pub anchor_min: Vec2Spec,
    pub anchor_max: Vec2Spec,
    pub pivot: Vec2Spec,
    pub anchored_position: Vec2Spec,
    pub size_delta: Vec2Spec,
}

impl Default for RectTransformSpec {
    fn default() -> Self {
        let center = Vec2Spec { x: 0.5, y: 0.5 };
        Self {
            anchor_min: center,
            anchor_max: center,
            pivot: center,
            anchored_position: Vec2Spec::default(),
            size_delta: Vec2Spec { x: 160.0, y: 30.0 },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UiActionSpec {
    pub command: String,
    pub args: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UiElementSpec {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type", alias = "kind")]
    pub kind: UiKind,
    pub rect_transform: RectTransformSpec,
    pub text: Option<String>,
    pub font_size: Option<f32>,
    pub color: Option<String>,
    pub sprite: Option<String>,
    pub on_click: Option<UiActionSpec>,
    #[serde(alias = "behaviors")]
    pub scripts: Vec<BehaviorBindingSpec>,
}

impl UiElementSpec {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("UIElement")
    }
}
