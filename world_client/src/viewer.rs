//! Viewer position source.
//!
//! The local player's transform is written by movement/physics code and only
//! read by the synchronization core.

use parking_lot::RwLock;
use world_shared::math::Vec3;

/// Authoritative local transform used for every distance check.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewer {
    pub position: Vec3,
    pub heading: f32,
}

/// Read-only view of the local player for the core.
pub trait ViewerSource: Send + Sync {
    fn viewer(&self) -> Viewer;

    /// Called once when the session is torn down.
    fn on_world_exit(&self) {}
}

/// Local player state shared between movement code and the core.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPlayer {
    pub viewer: Viewer,
    pub in_water: bool,
    pub on_ground: bool,
}

/// Lock-protected [`LocalPlayer`] implementing [`ViewerSource`].
#[derive(Debug, Default)]
pub struct SharedViewer {
    state: RwLock<LocalPlayer>,
}

impl SharedViewer {
    pub fn new(position: Vec3, heading: f32) -> Self {
        Self {
            state: RwLock::new(LocalPlayer {
                viewer: Viewer { position, heading },
                ..LocalPlayer::default()
            }),
        }
    }

    pub fn set_transform(&self, position: Vec3, heading: f32) {
        self.state.write().viewer = Viewer { position, heading };
    }

    pub fn set_motion(&self, in_water: bool, on_ground: bool) {
        let mut state = self.state.write();
        state.in_water = in_water;
        state.on_ground = on_ground;
    }

    pub fn local_player(&self) -> LocalPlayer {
        *self.state.read()
    }
}

impl ViewerSource for SharedViewer {
    fn viewer(&self) -> Viewer {
        self.state.read().viewer
    }

    fn on_world_exit(&self) {
        self.set_motion(false, false);
    }
}
