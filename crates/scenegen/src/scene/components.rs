use serde::Serialize;

use crate::behavior::BehaviorInstance;
use crate::math::{Rect, Vec2, Vec3};
use crate::spec::{BodyKind, CanvasMode, UiKind};
use crate::tilemap::TileLayer;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };

    /// Accepts `RRGGBB` or `RRGGBBAA`, with or without a leading `#`.
    pub fn parse_hex(raw: &str) -> Option<Color> {
        let hex = raw.trim().trim_start_matches('#');
        if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |index: usize| -> Option<f32> {
            let byte = u8::from_str_radix(hex.get(index * 2..index * 2 + 2)?, 16).ok()?;
            Some(f32::from(byte) / 255.0)
        };
        Some(Color {
            r: channel(0)?,
            g: channel(1)?,
            b: channel(2)?,
            a: if hex.len() == 8 { channel(3)? } else { 1.0 },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocalTransform {
    pub position: Vec3,
    pub rotation_z_degrees: f32,
    pub scale: Vec3,
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self {
            position: Vec3::default(),
            rotation_z_degrees: 0.0,
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpriteVisual {
    pub asset_path: String,
    pub pixel_size: (u32, u32),
    pub pixels_per_unit: f32,
    pub sorting_layer: String,
    pub order_in_layer: i32,
    pub color: Color,
    /// Unscaled bounds in the owning entity's local space, pivot at the center.
    pub local_bounds: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhysicsBody {
    pub kind: BodyKind,
    pub gravity_scale: f32,
    pub freeze_rotation: bool,
    pub freeze_position_x: bool,
    pub freeze_position_y: bool,
}

impl PhysicsBody {
    pub fn static_body() -> Self {
        Self {
            kind: BodyKind::Static,
            gravity_scale: 0.0,
            freeze_rotation: true,
            freeze_position_x: false,
            freeze_position_y: false,
        }
    }
}

pub const DEFAULT_BOX_SIZE: Vec2 = Vec2 { x: 1.0, y: 1.0 };
pub const DEFAULT_CIRCLE_RADIUS: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ColliderShape {
    Box { size: Vec2 },
    Circle { radius: f32 },
    Polygon { points: Vec<Vec2> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collider {
    pub shape: ColliderShape,
    pub offset: Vec2,
    pub is_trigger: bool,
}

impl Collider {
    pub fn local_bounds(&self) -> Rect {
        match &self.shape {
            ColliderShape::Box { size } => Rect::from_center_size(self.offset, *size),
            ColliderShape::Circle { radius } => Rect::from_center_size(
                self.offset,
                Vec2::new(radius.abs() * 2.0, radius.abs() * 2.0),
            ),
            ColliderShape::Polygon { points } => {
                let shifted = points
                    .iter()
                    .map(|point| *point + self.offset)
                    .collect::<Vec<_>>();
                Rect::from_points(&shifted).unwrap_or_else(|| Rect::from_center_size(self.offset, Vec2::ZERO))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraComponent {
    pub orthographic: bool,
    pub size: f32,
    pub clear_color: Option<Color>,
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanvasComponent {
    pub mode: CanvasMode,
    pub reference_resolution: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RectTransform {
    pub anchor_min: Vec2,
    pub anchor_max: Vec2,
    pub pivot: Vec2,
    pub anchored_position: Vec2,
    pub size_delta: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiAction {
    pub command: String,
    pub args: Vec<(String, crate::behavior::FieldValue)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiComponent {
    pub kind: UiKind,
    pub rect: RectTransform,
    pub text: Option<String>,
    pub font_size: f32,
    pub color: Color,
    pub sprite: Option<String>,
    pub on_click: Option<UiAction>,
}

/// Host-side data attached to one entity. Absent components stay `None`/empty so the
/// persisted artifact only lists what the document asked for.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Components {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual: Option<SpriteVisual>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<PhysicsBody>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub colliders: Vec<Collider>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub behaviors: Vec<BehaviorInstance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraComponent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas: Option<CanvasComponent>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub event_system: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiComponent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_layer: Option<TileLayer>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_with_and_without_alpha() {
        let rgb = Color::parse_hex("#FF8000").expect("rgb");
        assert!((rgb.r - 1.0).abs() < 1e-6);
        assert!((rgb.g - 128.0 / 255.0).abs() < 1e-6);
        assert!((rgb.a - 1.0).abs() < 1e-6);
        let rgba = Color::parse_hex("00000080").expect("rgba");
        assert!((rgba.a - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn invalid_hex_colors_are_rejected() {
        for raw in ["", "#12345", "#GGGGGG", "red", "#1234567"] {
            assert!(Color::parse_hex(raw).is_none(), "raw={raw}");
        }
    }

    #[test]
    fn circle_bounds_respect_offset() {
        let collider = Collider {
            shape: ColliderShape::Circle { radius: 0.5 },
            offset: Vec2::new(1.0, 0.0),
            is_trigger: false,
        };
        let bounds = collider.local_bounds();
        assert!((bounds.min.x - 0.5).abs() < 1e-6);
        assert!((bounds.max.y - 0.5).abs() < 1e-6);
    }
}
