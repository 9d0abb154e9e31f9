//! Authority implementation.
//!
//! A small scripted world authority. It supports:
//! - World entry handshake and per-client player ids
//! - Wandering NPCs driven by a seeded RNG
//! - Broadcasting every entity's move/animation to every client each tick
//! - Answering `ObjectInfoRequest` with `PlayerInformation`
//! - Despawn and kick, announced with `DeleteObject` / `Kick`
//!
//! Interest management is deliberately absent: clients receive updates for
//! the whole world and cull locally.

use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::Context;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};
use world_shared::{
    config::SyncConfig,
    entity::{AnimationUpdate, CharacterDescriptor, EntityId, MotionFlags, MoveUpdate},
    math::Vec3,
    net::{FrameReader, FrameWriter, NetMsg, ReliableConn, ReliableListener, PROTOCOL_VERSION},
};

/// Connected client state.
struct ClientState {
    descriptor: CharacterDescriptor,
    writer: FrameWriter,
    reader_task: JoinHandle<()>,
}

/// Server-driven character.
#[derive(Debug, Clone)]
pub struct Npc {
    pub descriptor: CharacterDescriptor,
    pub velocity: Vec3,
}

/// World authority.
pub struct AuthorityServer {
    pub cfg: SyncConfig,
    /// NPC wander speed in units per second. Zero keeps NPCs still.
    pub wander_speed: f32,

    tcp: ReliableListener,
    clients: BTreeMap<EntityId, ClientState>,
    npcs: BTreeMap<EntityId, Npc>,
    inbox_tx: mpsc::UnboundedSender<(EntityId, NetMsg)>,
    inbox_rx: mpsc::UnboundedReceiver<(EntityId, NetMsg)>,

    next_id: u64,
    tick: u32,
    rng: StdRng,
}

impl AuthorityServer {
    /// Binds the listener at `cfg.server_addr`.
    pub async fn bind(cfg: SyncConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let tcp = ReliableListener::bind(addr).await?;
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        Ok(Self {
            cfg,
            wander_speed: 1.0,
            tcp,
            clients: BTreeMap::new(),
            npcs: BTreeMap::new(),
            inbox_tx,
            inbox_rx,
            next_id: 1,
            tick: 0,
            rng: StdRng::seed_from_u64(0x5EED),
        })
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn client_ids(&self) -> Vec<EntityId> {
        self.clients.keys().copied().collect()
    }

    pub fn npc(&self, id: EntityId) -> Option<&Npc> {
        self.npcs.get(&id)
    }

    /// Reseeds NPC movement.
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn alloc_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Adds an NPC. Clients discover it through its first move broadcast.
    pub fn spawn_npc(&mut self, name: &str, position: Vec3) -> EntityId {
        let id = self.alloc_id();
        let heading = self.rng.gen_range(0.0f32..360.0);
        self.npcs.insert(
            id,
            Npc {
                descriptor: CharacterDescriptor::at(name, position, heading),
                velocity: Vec3::ZERO,
            },
        );
        debug!(%id, name, ?position, "Spawned NPC");
        id
    }

    /// Removes an NPC and tells every client.
    pub async fn despawn(&mut self, id: EntityId) -> anyhow::Result<bool> {
        if self.npcs.remove(&id).is_none() {
            return Ok(false);
        }
        info!(%id, "Despawned NPC");
        self.broadcast(&NetMsg::DeleteObject { id }).await;
        Ok(true)
    }

    /// Forcibly removes a client from the world.
    pub async fn kick(&mut self, id: EntityId, reason: &str) -> anyhow::Result<bool> {
        let Some(mut client) = self.clients.remove(&id) else {
            return Ok(false);
        };
        let _ = client
            .writer
            .send(&NetMsg::Kick {
                reason: reason.to_string(),
            })
            .await;
        client.reader_task.abort();
        info!(%id, reason, "Client kicked");
        self.broadcast(&NetMsg::DeleteObject { id }).await;
        Ok(true)
    }

    /// Accepts exactly one client (handshake included).
    pub async fn accept_one(&mut self) -> anyhow::Result<EntityId> {
        let (conn, peer) = self.tcp.accept().await?;
        self.handle_new_connection(conn, peer).await
    }

    /// Accepts a client with timeout (non-blocking).
    pub async fn try_accept(&mut self, timeout: Duration) -> anyhow::Result<Option<EntityId>> {
        match tokio::time::timeout(timeout, self.tcp.accept()).await {
            Ok(Ok((conn, peer))) => self.handle_new_connection(conn, peer).await.map(Some),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None), // Timeout
        }
    }

    async fn handle_new_connection(
        &mut self,
        mut conn: ReliableConn,
        peer: SocketAddr,
    ) -> anyhow::Result<EntityId> {
        let name = match conn.recv().await? {
            NetMsg::EnterWorld { protocol, name } if protocol == PROTOCOL_VERSION => name,
            NetMsg::EnterWorld { protocol, .. } => {
                conn.send(&NetMsg::Kick {
                    reason: format!("protocol {protocol} unsupported"),
                })
                .await?;
                anyhow::bail!("client {peer} speaks protocol {protocol}");
            }
            other => anyhow::bail!("unexpected handshake msg: {other:?}"),
        };

        let id = self.alloc_id();
        let spawn = Vec3::ZERO;
        conn.send(&NetMsg::EnterWorldAck {
            id,
            position: spawn,
            heading: 0.0,
        })
        .await?;

        let (reader, writer) = conn.into_split();
        let reader_task = tokio::spawn(forward_inbound(id, reader, self.inbox_tx.clone()));
        self.clients.insert(
            id,
            ClientState {
                descriptor: CharacterDescriptor::at(&name, spawn, 0.0),
                writer,
                reader_task,
            },
        );

        info!(%id, %peer, %name, "Client entered world");
        Ok(id)
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = self.cfg.tick_interval();
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step(dt.as_secs_f32()).await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Executes one step: requests, NPC movement, broadcast.
    pub async fn step(&mut self, dt_sec: f32) -> anyhow::Result<()> {
        self.process_inbox().await;
        self.simulate(dt_sec);
        self.broadcast_world().await;
        self.tick += 1;
        Ok(())
    }

    async fn process_inbox(&mut self) {
        while let Ok((from, msg)) = self.inbox_rx.try_recv() {
            match msg {
                NetMsg::LocationUpdate { position, heading } => {
                    if let Some(client) = self.clients.get_mut(&from) {
                        client.descriptor.position = position;
                        client.descriptor.heading = heading;
                    }
                }
                NetMsg::ObjectInfoRequest { id } => {
                    let Some(descriptor) = self.descriptor_of(id) else {
                        debug!(%from, %id, "Info requested for unknown entity");
                        continue;
                    };
                    if let Some(client) = self.clients.get_mut(&from) {
                        let reply = NetMsg::PlayerInformation { id, descriptor };
                        if let Err(e) = client.writer.send(&reply).await {
                            warn!(%from, error = %e, "Failed to answer info request");
                        }
                    }
                }
                NetMsg::ExitWorld => {
                    if let Some(client) = self.clients.remove(&from) {
                        client.reader_task.abort();
                        info!(id = %from, "Client left world");
                        self.broadcast(&NetMsg::DeleteObject { id: from }).await;
                    }
                }
                other => debug!(%from, ?other, "Unexpected client message"),
            }
        }
    }

    fn descriptor_of(&self, id: EntityId) -> Option<CharacterDescriptor> {
        self.npcs
            .get(&id)
            .map(|npc| npc.descriptor.clone())
            .or_else(|| self.clients.get(&id).map(|c| c.descriptor.clone()))
    }

    fn simulate(&mut self, dt_sec: f32) {
        if self.wander_speed <= 0.0 {
            return;
        }
        for npc in self.npcs.values_mut() {
            let vx = self.rng.gen_range(-1.0f32..=1.0) * self.wander_speed;
            let vz = self.rng.gen_range(-1.0f32..=1.0) * self.wander_speed;
            npc.velocity = Vec3::new(vx, 0.0, vz);
            let d = &mut npc.descriptor;
            d.position = d.position.add(Vec3::new(vx * dt_sec, 0.0, vz * dt_sec));
            d.heading = vz.atan2(vx).to_degrees().rem_euclid(360.0);
        }
    }

    async fn broadcast_world(&mut self) {
        let mut updates = Vec::with_capacity(2 * (self.npcs.len() + self.clients.len()));
        for (id, npc) in &self.npcs {
            updates.push(NetMsg::Move(MoveUpdate {
                id: *id,
                position: npc.descriptor.position,
                heading: npc.descriptor.heading,
            }));
            updates.push(NetMsg::Animation(AnimationUpdate {
                id: *id,
                velocity_x: npc.velocity.x,
                velocity_z: npc.velocity.z,
                flags: MotionFlags::GROUNDED,
            }));
        }
        for (id, client) in &self.clients {
            updates.push(NetMsg::Move(MoveUpdate {
                id: *id,
                position: client.descriptor.position,
                heading: client.descriptor.heading,
            }));
        }

        let mut dead = Vec::new();
        for (id, client) in self.clients.iter_mut() {
            for msg in &updates {
                if let Err(e) = client.writer.send(msg).await {
                    warn!(%id, error = %e, "Dropping unreachable client");
                    dead.push(*id);
                    break;
                }
            }
        }
        for id in dead {
            if let Some(client) = self.clients.remove(&id) {
                client.reader_task.abort();
            }
        }
    }

    async fn broadcast(&mut self, msg: &NetMsg) {
        for (id, client) in self.clients.iter_mut() {
            if let Err(e) = client.writer.send(msg).await {
                warn!(%id, error = %e, "Broadcast failed");
            }
        }
    }

    /// Executes a console command.
    pub async fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let parse_id = |s: Option<&&str>| s.and_then(|s| s.parse::<u64>().ok()).map(EntityId);

        match tokens[0] {
            "status" => {
                let mut out = Vec::new();
                out.push(format!("Tick: {}", self.tick));
                out.push(format!("Clients: {}", self.clients.len()));
                for (id, c) in &self.clients {
                    out.push(format!("  {id} {} at {:?}", c.descriptor.name, c.descriptor.position));
                }
                out.push(format!("NPCs: {}", self.npcs.len()));
                Ok(out)
            }
            "spawn" => {
                let x = tokens.get(1).and_then(|s| s.parse().ok()).unwrap_or(0.0);
                let z = tokens.get(2).and_then(|s| s.parse().ok()).unwrap_or(0.0);
                let id = self.spawn_npc("npc", Vec3::new(x, 0.0, z));
                Ok(vec![format!("Spawned {id}")])
            }
            "despawn" => {
                let Some(id) = parse_id(tokens.get(1)) else {
                    return Ok(vec!["Usage: despawn <id>".to_string()]);
                };
                if self.despawn(id).await? {
                    Ok(vec![format!("Despawned {id}")])
                } else {
                    Ok(vec![format!("No NPC {id}")])
                }
            }
            "kick" => {
                let Some(id) = parse_id(tokens.get(1)) else {
                    return Ok(vec!["Usage: kick <id>".to_string()]);
                };
                if self.kick(id, "kicked by operator").await? {
                    Ok(vec![format!("Kicked {id}")])
                } else {
                    Ok(vec![format!("No client {id}")])
                }
            }
            other => Ok(vec![format!("Unknown command: {other}")]),
        }
    }
}

/// Per-client receive task. A closed connection is reported as `ExitWorld`.
async fn forward_inbound(
    id: EntityId,
    mut reader: FrameReader,
    inbox: mpsc::UnboundedSender<(EntityId, NetMsg)>,
) {
    loop {
        match reader.recv().await {
            Ok(msg) => {
                let last = matches!(msg, NetMsg::ExitWorld);
                if inbox.send((id, msg)).is_err() || last {
                    return;
                }
            }
            Err(e) => {
                debug!(%id, error = %e, "Client connection closed");
                let _ = inbox.send((id, NetMsg::ExitWorld));
                return;
            }
        }
    }
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(AuthorityServer, SyncConfig)> {
    let cfg = SyncConfig {
        server_addr: format!("{}:{}", IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        tick_hz,
        ..Default::default()
    };
    let mut server = AuthorityServer::bind(cfg).await?;
    let addr = server.local_addr()?;
    server.cfg.server_addr = addr.to_string();
    let cfg = server.cfg.clone();
    Ok((server, cfg))
}
