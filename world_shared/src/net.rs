//! Networking primitives.
//!
//! Goals:
//! - Length-prefixed JSON frames over a single reliable TCP stream.
//! - Message types for world entry, entity replication and client requests.
//! - Split read/write halves so receive and send can run on separate tasks.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};
use tracing::warn;

use crate::{
    entity::{AnimationUpdate, CharacterDescriptor, EntityId, MoveUpdate},
    math::Vec3,
};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Frames above this size are rejected before allocating.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetMsg {
    // ─── World entry ───
    /// Client -> authority: enter the world with a character.
    EnterWorld { protocol: u32, name: String },
    /// Authority -> client: id and spawn transform of the local player.
    EnterWorldAck {
        id: EntityId,
        position: Vec3,
        heading: f32,
    },

    // ─── Entity replication ───
    /// Authority -> client: full descriptor for an entity.
    PlayerInformation {
        id: EntityId,
        descriptor: CharacterDescriptor,
    },
    /// Authority -> client: entity moved.
    Move(MoveUpdate),
    /// Authority -> client: entity animation state changed.
    Animation(AnimationUpdate),
    /// Authority -> client: entity left the world.
    DeleteObject { id: EntityId },

    // ─── Client requests ───
    /// Client -> authority: current local player transform.
    LocationUpdate { position: Vec3, heading: f32 },
    /// Client -> authority: please send `PlayerInformation` for this id.
    ObjectInfoRequest { id: EntityId },

    // ─── Session end ───
    /// Authority -> client: forced removal from the world.
    Kick { reason: String },
    /// Client -> authority: leaving the world.
    ExitWorld,
}

/// JSON payload of a single message, without the length prefix.
pub fn encode_to_bytes(msg: &NetMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<NetMsg> {
    serde_json::from_slice(b).context("deserialize msg")
}

fn encode_frame(msg: &NetMsg) -> anyhow::Result<BytesMut> {
    let payload = encode_to_bytes(msg)?;
    if payload.len() > MAX_FRAME_LEN {
        warn!(len = payload.len(), "Refusing to send oversized frame");
        anyhow::bail!(
            "frame of {} bytes exceeds limit of {MAX_FRAME_LEN}",
            payload.len()
        );
    }
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, msg: &NetMsg) -> anyhow::Result<()> {
    let buf = encode_frame(msg)?;
    w.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> anyhow::Result<NetMsg> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await.context("tcp read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        warn!(len, "Rejecting oversized frame");
        anyhow::bail!("frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}");
    }
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    decode_from_bytes(&payload)
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        write_frame(&mut self.stream, msg).await
    }

    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        read_frame(&mut self.stream).await
    }

    /// Splits into independently owned halves.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (r, w) = self.stream.into_split();
        (FrameReader { half: r }, FrameWriter { half: w })
    }
}

/// Receive half of a [`ReliableConn`].
#[derive(Debug)]
pub struct FrameReader {
    half: OwnedReadHalf,
}

impl FrameReader {
    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        read_frame(&mut self.half).await
    }
}

/// Send half of a [`ReliableConn`].
#[derive(Debug)]
pub struct FrameWriter {
    half: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        write_frame(&mut self.half, msg).await
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
