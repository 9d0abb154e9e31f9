//! `world_shared`
//!
//! Libraries shared by the world client and the authority.
//!
//! Design goals:
//! - Deterministic and modular where practical.
//! - Clear separation of concerns (math, entity model, net, config).
//! - No `unsafe`.

pub mod config;
pub mod entity;
pub mod math;
pub mod net;
