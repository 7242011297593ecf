//! Small geometric value types.
//!
//! These are schema-atomic: they appear in `defs` but are synchronized and
//! path-hashed as single leaf values, never field by field.

use crate::descriptor::{Describe, FieldDescriptor, TypeDesc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IVec2 {
    pub x: i32,
    pub y: i32,
}

impl IVec2 {
    pub const ZERO: IVec2 = IVec2 { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Component-wise addition, clamped to `[min, max]` on both axes.
    pub fn offset_clamped(self, dx: i32, dy: i32, min: i32, max: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx).clamp(min, max),
            y: self.y.saturating_add(dy).clamp(min, max),
        }
    }

    pub fn manhattan(self, other: IVec2) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IVec3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl IVec3 {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A grid position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position2 {
    pub v: IVec2,
}

impl Position2 {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            v: IVec2::new(x, y),
        }
    }
}

/// Heading in degrees, kept in `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Angle {
    pub degrees: f32,
}

impl Angle {
    pub fn from_degrees(degrees: f32) -> Self {
        Self {
            degrees: degrees.rem_euclid(360.0),
        }
    }

    pub fn radians(self) -> f32 {
        self.degrees.to_radians()
    }
}

impl Describe for IVec2 {
    fn describe() -> TypeDesc {
        TypeDesc::payload("IVec2", || {
            vec![
                FieldDescriptor::new::<i32>("x"),
                FieldDescriptor::new::<i32>("y"),
            ]
        })
    }
}

impl Describe for IVec3 {
    fn describe() -> TypeDesc {
        TypeDesc::payload("IVec3", || {
            vec![
                FieldDescriptor::new::<i32>("x"),
                FieldDescriptor::new::<i32>("y"),
                FieldDescriptor::new::<i32>("z"),
            ]
        })
    }
}

impl Describe for Vec2 {
    fn describe() -> TypeDesc {
        TypeDesc::payload("Vec2", || {
            vec![
                FieldDescriptor::new::<f32>("x"),
                FieldDescriptor::new::<f32>("y"),
            ]
        })
    }
}

impl Describe for Vec3 {
    fn describe() -> TypeDesc {
        TypeDesc::payload("Vec3", || {
            vec![
                FieldDescriptor::new::<f32>("x"),
                FieldDescriptor::new::<f32>("y"),
                FieldDescriptor::new::<f32>("z"),
            ]
        })
    }
}

impl Describe for Position2 {
    fn describe() -> TypeDesc {
        TypeDesc::payload("Position2", || vec![FieldDescriptor::new::<IVec2>("v")])
    }
}

impl Describe for Angle {
    fn describe() -> TypeDesc {
        TypeDesc::payload("Angle", || vec![FieldDescriptor::new::<f32>("degrees")])
    }
}

crate::serde_sync_value!(IVec2, IVec3, Vec2, Vec3, Position2, Angle);
