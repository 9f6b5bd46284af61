//! Transport collaborator (§6): duplex byte delivery to named peers plus
//! topic subscriptions for overlay membership announcements (Hello /
//! Goodbye). Out of scope per the spec's own framing — this crate ships
//! only so the rest of the workspace has a concrete implementation to
//! integration-test against.

mod in_process;

pub use in_process::{InProcessHub, InProcessTransport};

use async_trait::async_trait;
use bytes::Bytes;

pub type PeerId = String;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("peer {0} is unreachable")]
    PeerUnreachable(PeerId),
    #[error("transport is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Inbound { from: PeerId, bytes: Bytes },
    PeerUp(PeerId),
    PeerDown(PeerId),
}

/// A duplex, peer-addressed byte transport with topic-scoped broadcast,
/// abstracting over whatever actually carries bytes between peers.
#[async_trait]
pub trait Transport: Send + Sync {
    fn id(&self) -> &PeerId;

    /// Unicasts `bytes` to `to`, source-routed at a layer above this trait.
    async fn send(&self, to: &str, bytes: Bytes) -> Result<()>;

    /// Sends `bytes` to every peer currently subscribed to `topic`,
    /// except the local peer.
    async fn broadcast(&self, topic: &str, bytes: Bytes) -> Result<()>;

    async fn subscribe(&self, topic: &str) -> Result<()>;
    async fn unsubscribe(&self, topic: &str) -> Result<()>;

    /// Pulls the next inbound message or peer lifecycle event, or `None`
    /// once the transport has been closed.
    async fn recv(&self) -> Option<TransportEvent>;

    async fn close(&self);
}
