//! Networked client runtime.
//!
//! The client maintains:
//! - A receive task that decodes authority messages and feeds the session
//! - A send task draining outbound requests onto the wire
//! - The per-frame loop: synchronization tick, then character creation

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use world_shared::{
    config::SyncConfig,
    entity::EntityId,
    math::Vec3,
    net::{FrameReader, FrameWriter, NetMsg, ReliableConn, PROTOCOL_VERSION},
};

use crate::{
    error::SyncError,
    presentation::{CharacterFactory, EntityHandle},
    session::{SessionSettings, WorldSession},
    tick::TickOutcome,
    viewer::SharedViewer,
};

/// A player inside the world.
pub struct WorldClient<H: EntityHandle> {
    pub player_id: EntityId,
    session: Arc<WorldSession<H>>,
    viewer: Arc<SharedViewer>,
    factory: Arc<dyn CharacterFactory<H>>,
    wire: mpsc::UnboundedSender<NetMsg>,
    reader: JoinHandle<()>,
    writer: JoinHandle<anyhow::Result<()>>,
    frames: u64,
}

impl<H: EntityHandle> WorldClient<H> {
    /// Connects to the authority and enters the world.
    pub async fn connect(
        cfg: &SyncConfig,
        factory: Arc<dyn CharacterFactory<H>>,
    ) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        info!(server = %addr, name = %cfg.player_name, "Entering world");

        let mut conn = ReliableConn::connect(addr).await?;
        conn.send(&NetMsg::EnterWorld {
            protocol: PROTOCOL_VERSION,
            name: cfg.player_name.clone(),
        })
        .await?;

        let (player_id, position, heading) = match conn.recv().await? {
            NetMsg::EnterWorldAck {
                id,
                position,
                heading,
            } => (id, position, heading),
            NetMsg::Kick { reason } => anyhow::bail!("refused by authority: {reason}"),
            other => anyhow::bail!("expected EnterWorldAck, got {other:?}"),
        };
        info!(player = %player_id, ?position, "Entered world");

        let viewer = Arc::new(SharedViewer::new(position, heading));
        let (wire, wire_rx) = mpsc::unbounded_channel();
        let session = Arc::new(WorldSession::new(
            SessionSettings::from(cfg),
            viewer.clone(),
            Arc::new(wire.clone()),
        ));

        let (read_half, write_half) = conn.into_split();
        let reader = tokio::spawn(receive_loop(read_half, session.clone(), player_id));
        let writer = tokio::spawn(send_loop(write_half, wire_rx));

        Ok(Self {
            player_id,
            session,
            viewer,
            factory,
            wire,
            reader,
            writer,
            frames: 0,
        })
    }

    pub fn session(&self) -> &Arc<WorldSession<H>> {
        &self.session
    }

    pub fn viewer(&self) -> &Arc<SharedViewer> {
        &self.viewer
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Moves the local player and reports the new transform.
    pub fn move_local_player(&self, position: Vec3, heading: f32) {
        self.viewer.set_transform(position, heading);
        let _ = self.wire.send(NetMsg::LocationUpdate { position, heading });
    }

    /// One frame: apply queued updates, then build any admitted characters.
    pub async fn frame(&mut self) -> anyhow::Result<TickOutcome> {
        self.frames += 1;
        let outcome = self.session.tick();
        if let TickOutcome::Kicked = outcome {
            self.reader.abort();
            return Ok(outcome);
        }

        for (id, descriptor) in self.session.drain_creations() {
            let name = descriptor.name.clone();
            match self.factory.build(id, descriptor).await {
                Some(handle) => match self.session.materialize_entity(id, handle) {
                    Ok(()) => debug!(%id, %name, "Character created"),
                    Err(SyncError::SessionClosed) => break,
                    Err(e) => debug!(%id, error = %e, "Character discarded"),
                },
                None => warn!(%id, %name, "Character creation failed, entity stays pending"),
            }
        }
        Ok(outcome)
    }

    /// Leaves the world and closes the connection.
    pub async fn exit(self) -> anyhow::Result<()> {
        let _ = self.wire.send(NetMsg::ExitWorld);
        self.session.teardown_all();
        self.reader.abort();
        // The send task stops after writing ExitWorld.
        match self.writer.await {
            Ok(res) => res,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(e).context("join send task"),
        }
    }
}

/// Network thread: decodes authority messages into session calls.
async fn receive_loop<H: EntityHandle>(
    mut reader: FrameReader,
    session: Arc<WorldSession<H>>,
    player_id: EntityId,
) {
    loop {
        let msg = match reader.recv().await {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Connection to authority lost");
                session.request_kick();
                return;
            }
        };
        if !dispatch(&session, player_id, msg) {
            return;
        }
    }
}

/// Routes one message. Returns false once the session should stop reading.
pub fn dispatch<H: EntityHandle>(
    session: &WorldSession<H>,
    player_id: EntityId,
    msg: NetMsg,
) -> bool {
    match msg {
        NetMsg::PlayerInformation { id, .. } if id == player_id => {}
        NetMsg::PlayerInformation { id, descriptor } => {
            if let Err(e) = session.observe_entity(id, descriptor) {
                debug!(%id, error = %e, "Sighting rejected");
            }
        }
        NetMsg::Move(update) if update.id == player_id => {}
        NetMsg::Move(update) => {
            session.enqueue_move(update);
        }
        NetMsg::Animation(update) if update.id == player_id => {}
        NetMsg::Animation(update) => {
            session.enqueue_animation(update);
        }
        NetMsg::DeleteObject { id } => {
            session.request_deletion(id);
        }
        NetMsg::Kick { reason } => {
            info!(%reason, "Kicked by authority");
            session.request_kick();
            return false;
        }
        other => {
            debug!(?other, "Unhandled authority message");
        }
    }
    !session.is_exiting()
}

async fn send_loop(
    mut writer: FrameWriter,
    mut rx: mpsc::UnboundedReceiver<NetMsg>,
) -> anyhow::Result<()> {
    while let Some(msg) = rx.recv().await {
        let last = matches!(msg, NetMsg::ExitWorld);
        writer.send(&msg).await?;
        if last {
            break;
        }
    }
    Ok(())
}
