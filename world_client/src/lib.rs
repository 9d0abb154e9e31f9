//! `world_client`
//!
//! Client-side world synchronization:
//! - Visibility policy deciding which remote entities exist locally
//! - Entity registry with duplicate-free admission
//! - Concurrent ingestion queues for moves, animations and deletions
//! - The per-frame synchronization tick
//! - Entity lifecycle from placeholder to delayed disposal
//! - A networked runtime wiring all of the above to an authority

pub mod client;
pub mod disposal;
pub mod distance;
pub mod error;
pub mod lifecycle;
pub mod outbound;
pub mod presentation;
pub mod queues;
pub mod registry;
pub mod session;
pub mod tick;
pub mod viewer;

pub use client::WorldClient;
pub use error::SyncError;
pub use session::{SessionSettings, WorldSession};
pub use tick::{TickOutcome, TickReport};
