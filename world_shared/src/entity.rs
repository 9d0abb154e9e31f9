//! Remote entity data model.
//!
//! These are the already-decoded payloads the network layer hands to the
//! client core. Ids are assigned by the authority and stay stable for the
//! whole session.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Authority-assigned entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything needed to build a local character for a newly observed entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterDescriptor {
    pub name: String,
    pub race: u8,
    pub height: f32,
    pub belly: f32,
    pub hair_type: u8,
    pub hair_color: i32,
    pub skin_color: i32,
    pub eye_color: i32,
    pub position: Vec3,
    pub heading: f32,
}

impl CharacterDescriptor {
    /// Descriptor with neutral appearance at `position`.
    pub fn at(name: &str, position: Vec3, heading: f32) -> Self {
        Self {
            name: name.to_string(),
            race: 0,
            height: 0.5,
            belly: 0.5,
            hair_type: 0,
            hair_color: 0,
            skin_color: 0,
            eye_color: 0,
            position,
            heading,
        }
    }
}

/// Latest authoritative transform for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveUpdate {
    pub id: EntityId,
    pub position: Vec3,
    pub heading: f32,
}

bitflags::bitflags! {
    /// Discrete animation state carried alongside velocity.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MotionFlags: u8 {
        const JUMP_TRIGGERED = 1 << 0;
        const IN_WATER = 1 << 1;
        const GROUNDED = 1 << 2;
    }
}

impl Default for MotionFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Latest animation state for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimationUpdate {
    pub id: EntityId,
    pub velocity_x: f32,
    pub velocity_z: f32,
    pub flags: MotionFlags,
}

impl AnimationUpdate {
    pub fn jump_triggered(&self) -> bool {
        self.flags.contains(MotionFlags::JUMP_TRIGGERED)
    }

    pub fn in_water(&self) -> bool {
        self.flags.contains(MotionFlags::IN_WATER)
    }

    pub fn grounded(&self) -> bool {
        self.flags.contains(MotionFlags::GROUNDED)
    }
}
