//! Fire-and-forget requests from the core to the network layer.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;
use world_shared::{entity::EntityId, math::Vec3, net::NetMsg};

/// Requests the tick emits when visibility state changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutboundRequest {
    /// Tell the authority where the local player is.
    SelfLocationBroadcast { position: Vec3, heading: f32 },
    /// Ask the authority for the descriptor of an unseen entity.
    ObjectInfoRequest(EntityId),
}

impl From<OutboundRequest> for NetMsg {
    fn from(req: OutboundRequest) -> Self {
        match req {
            OutboundRequest::SelfLocationBroadcast { position, heading } => {
                NetMsg::LocationUpdate { position, heading }
            }
            OutboundRequest::ObjectInfoRequest(id) => NetMsg::ObjectInfoRequest { id },
        }
    }
}

/// Sink for outbound requests. Must never block.
pub trait Outbound: Send + Sync {
    fn send(&self, request: OutboundRequest);
}

impl Outbound for mpsc::UnboundedSender<NetMsg> {
    fn send(&self, request: OutboundRequest) {
        if mpsc::UnboundedSender::send(self, request.into()).is_err() {
            trace!(?request, "Outbound channel closed, request dropped");
        }
    }
}

/// Keeps every request in memory. Used by headless runs and tests.
#[derive(Debug, Default)]
pub struct RecordingOutbound {
    sent: Mutex<Vec<OutboundRequest>>,
}

impl RecordingOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and clears everything recorded so far.
    pub fn take(&self) -> Vec<OutboundRequest> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl Outbound for RecordingOutbound {
    fn send(&self, request: OutboundRequest) {
        self.sent.lock().push(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_map_to_wire_messages() {
        let msg: NetMsg = OutboundRequest::ObjectInfoRequest(EntityId(5)).into();
        assert_eq!(msg, NetMsg::ObjectInfoRequest { id: EntityId(5) });

        let msg: NetMsg = OutboundRequest::SelfLocationBroadcast {
            position: Vec3::new(1.0, 0.0, 2.0),
            heading: 45.0,
        }
        .into();
        assert_eq!(
            msg,
            NetMsg::LocationUpdate {
                position: Vec3::new(1.0, 0.0, 2.0),
                heading: 45.0,
            }
        );
    }

    #[test]
    fn closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel::<NetMsg>();
        drop(rx);
        Outbound::send(&tx, OutboundRequest::ObjectInfoRequest(EntityId(1)));
    }
}
