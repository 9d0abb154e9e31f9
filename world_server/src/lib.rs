//! `world_server`
//!
//! A scripted world authority for exercising clients:
//! - World entry handshake over a reliable TCP stream
//! - NPCs that wander and are broadcast to every client each tick
//! - Object info answers, despawns and kicks
//!
//! Clients receive the whole world; all visibility culling is client-side.

pub mod server;

pub use server::AuthorityServer;
