//! Distance-based visibility policy.
//!
//! Proximity is the squared Euclidean distance between the viewer and a
//! point. It is only ever compared, never displayed, so the square root is
//! skipped and the threshold is squared instead.

use world_shared::math::Vec3;

/// Proximity score between `viewer` and `target`. Monotonic in true distance.
pub fn proximity(viewer: Vec3, target: Vec3) -> f32 {
    viewer.dist_sq(target)
}

/// Radius-based visibility check shared by admission, culling and animation
/// gating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityPolicy {
    radius_sq: f32,
}

impl VisibilityPolicy {
    pub fn new(radius: f32) -> Self {
        let radius = radius.max(0.0);
        Self {
            radius_sq: radius * radius,
        }
    }

    /// Threshold in proximity units.
    pub fn threshold(&self) -> f32 {
        self.radius_sq
    }

    /// Whether a proximity score lies inside the visible set. The boundary is
    /// inclusive.
    pub fn admits(&self, score: f32) -> bool {
        score <= self.radius_sq
    }

    pub fn is_visible(&self, viewer: Vec3, target: Vec3) -> bool {
        self.admits(proximity(viewer, target))
    }
}
