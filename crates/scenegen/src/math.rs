use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };
    pub const ONE: Vec2 = Vec2 { x: 1.0, y: 1.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn scaled(self, factor: Vec2) -> Self {
        Self::new(self.x * factor.x, self.y * factor.y)
    }

    pub fn rotated_degrees(self, degrees: f32) -> Self {
        if degrees == 0.0 {
            return self;
        }
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn xy(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Axis-aligned rectangle in whatever space its producer works in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn from_center_size(center: Vec2, size: Vec2) -> Self {
        let half = Vec2::new(size.x.abs() * 0.5, size.y.abs() * 0.5);
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn from_points(points: &[Vec2]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut rect = Rect {
            min: *first,
            max: *first,
        };
        for point in rest {
            rect.min.x = rect.min.x.min(point.x);
            rect.min.y = rect.min.y.min(point.y);
            rect.max.x = rect.max.x.max(point.x);
            rect.max.y = rect.max.y.max(point.y);
        }
        Some(rect)
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }

    pub fn half_extents(&self) -> Vec2 {
        let size = self.size();
        Vec2::new(size.x * 0.5, size.y * 0.5)
    }

    pub fn corners(&self) -> [Vec2; 4] {
        [
            self.min,
            Vec2::new(self.max.x, self.min.y),
            self.max,
            Vec2::new(self.min.x, self.max.y),
        ]
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            min: Vec2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Vec2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    pub fn spans_x(&self, x: f32) -> bool {
        x >= self.min.x && x <= self.max.x
    }
}

/// Translation, z-rotation (degrees) and scale, applied scale-first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine2 {
    pub translation: Vec2,
    pub rotation_degrees: f32,
    pub scale: Vec2,
}

impl Default for Affine2 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine2 {
    pub const IDENTITY: Affine2 = Affine2 {
        translation: Vec2::ZERO,
        rotation_degrees: 0.0,
        scale: Vec2::ONE,
    };

    pub fn transform_point(&self, point: Vec2) -> Vec2 {
        self.transform_vector(point) + self.translation
    }

    pub fn transform_vector(&self, vector: Vec2) -> Vec2 {
        vector.scaled(self.scale).rotated_degrees(self.rotation_degrees)
    }

    /// Maps a world-space displacement back into this transform's local space.
    pub fn inverse_transform_vector(&self, vector: Vec2) -> Vec2 {
        let unrotated = vector.rotated_degrees(-self.rotation_degrees);
        Vec2::new(
            safe_div(unrotated.x, self.scale.x),
            safe_div(unrotated.y, self.scale.y),
        )
    }

    /// Composes `self` (parent) with a child local transform. Non-uniform parent scale
    /// combined with child rotation is approximated component-wise, which matches how
    /// lossy scale is reported by most 2D hosts.
    pub fn then_local(&self, local: &Affine2) -> Affine2 {
        Affine2 {
            translation: self.transform_point(local.translation),
            rotation_degrees: self.rotation_degrees + local.rotation_degrees,
            scale: self.scale.scaled(local.scale),
        }
    }

    pub fn transform_rect(&self, rect: &Rect) -> Rect {
        let corners = rect.corners().map(|corner| self.transform_point(corner));
        Rect::from_points(&corners).unwrap_or(*rect)
    }
}

fn safe_div(value: f32, divisor: f32) -> f32 {
    if divisor.abs() <= f32::EPSILON {
        0.0
    } else {
        value / divisor
    }
}
