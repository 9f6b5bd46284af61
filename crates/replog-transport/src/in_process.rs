use crate::{Error, PeerId, Result, Transport, TransportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Shared in-memory hub connecting every `InProcessTransport` registered
/// against it; stands in for whatever real network carries bytes between
/// peers in tests and examples.
#[derive(Default)]
pub struct InProcessHub {
    peers: DashMap<PeerId, mpsc::UnboundedSender<TransportEvent>>,
    topics: DashMap<String, DashSet<PeerId>>,
}

impl InProcessHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register(self: &Arc<Self>, id: PeerId) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for existing in self.peers.iter() {
            let _ = existing.value().send(TransportEvent::PeerUp(id.clone()));
            let _ = tx.send(TransportEvent::PeerUp(existing.key().clone()));
        }
        self.peers.insert(id, tx);
        rx
    }

    fn deregister(&self, id: &str) {
        self.peers.remove(id);
        for topic in self.topics.iter() {
            topic.value().remove(id);
        }
        for peer in self.peers.iter() {
            let _ = peer.value().send(TransportEvent::PeerDown(id.to_string()));
        }
    }

    fn send(&self, from: &str, to: &str, bytes: Bytes) -> Result<()> {
        let sender = self
            .peers
            .get(to)
            .ok_or_else(|| Error::PeerUnreachable(to.to_string()))?;
        sender
            .send(TransportEvent::Inbound {
                from: from.to_string(),
                bytes,
            })
            .map_err(|_| Error::PeerUnreachable(to.to_string()))
    }

    fn subscribe(&self, id: &str, topic: &str) {
        self.topics
            .entry(topic.to_string())
            .or_default()
            .insert(id.to_string());
    }

    fn unsubscribe(&self, id: &str, topic: &str) {
        if let Some(members) = self.topics.get(topic) {
            members.remove(id);
        }
    }

    fn broadcast(&self, from: &str, topic: &str, bytes: Bytes) {
        let Some(members) = self.topics.get(topic) else {
            return;
        };
        for member in members.iter() {
            if member.key() == from {
                continue;
            }
            if let Some(sender) = self.peers.get(member.key()) {
                let _ = sender.send(TransportEvent::Inbound {
                    from: from.to_string(),
                    bytes: bytes.clone(),
                });
            }
        }
    }
}

pub struct InProcessTransport {
    hub: Arc<InProcessHub>,
    id: PeerId,
    inbox: Mutex<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl InProcessTransport {
    pub fn new(hub: Arc<InProcessHub>, id: PeerId) -> Self {
        let inbox = hub.register(id.clone());
        tracing::debug!(%id, "transport joined hub");
        InProcessTransport {
            hub,
            id,
            inbox: Mutex::new(inbox),
        }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    fn id(&self) -> &PeerId {
        &self.id
    }

    async fn send(&self, to: &str, bytes: Bytes) -> Result<()> {
        self.hub.send(&self.id, to, bytes)
    }

    async fn broadcast(&self, topic: &str, bytes: Bytes) -> Result<()> {
        self.hub.broadcast(&self.id, topic, bytes);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.hub.subscribe(&self.id, topic);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.hub.unsubscribe(&self.id, topic);
        Ok(())
    }

    async fn recv(&self) -> Option<TransportEvent> {
        self.inbox.lock().await.recv().await
    }

    async fn close(&self) {
        self.hub.deregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn peer_up_is_announced_both_ways() {
        let hub = InProcessHub::new();
        let a = InProcessTransport::new(hub.clone(), "a".into());
        let b = InProcessTransport::new(hub.clone(), "b".into());

        assert_eq!(a.recv().await, Some(TransportEvent::PeerUp("b".into())));
        assert_eq!(b.recv().await, Some(TransportEvent::PeerUp("a".into())));
    }

    #[tokio::test]
    async fn unicast_delivers_to_named_peer_only() {
        let hub = InProcessHub::new();
        let a = InProcessTransport::new(hub.clone(), "a".into());
        let b = InProcessTransport::new(hub.clone(), "b".into());
        let c = InProcessTransport::new(hub.clone(), "c".into());
        let _ = b.recv().await; // drain PeerUp(a)
        let _ = b.recv().await; // drain PeerUp(c)
        let _ = c.recv().await; // drain PeerUp(a)
        let _ = c.recv().await; // drain PeerUp(b)

        a.send("b", Bytes::from_static(b"hi")).await.unwrap();
        let event = b.recv().await.unwrap();
        assert_eq!(
            event,
            TransportEvent::Inbound {
                from: "a".into(),
                bytes: Bytes::from_static(b"hi"),
            }
        );
    }

    #[tokio::test]
    async fn send_to_unknown_peer_errors() {
        let hub = InProcessHub::new();
        let a = InProcessTransport::new(hub, "a".into());
        let err = a.send("ghost", Bytes::from_static(b"hi")).await;
        assert!(matches!(err, Err(Error::PeerUnreachable(_))));
    }

    #[tokio::test]
    async fn broadcast_reaches_only_subscribers() {
        let hub = InProcessHub::new();
        let a = InProcessTransport::new(hub.clone(), "a".into());
        let b = InProcessTransport::new(hub.clone(), "b".into());
        let c = InProcessTransport::new(hub.clone(), "c".into());
        let _ = b.recv().await; // drain PeerUp(a)
        let _ = b.recv().await; // drain PeerUp(c)
        let _ = c.recv().await; // drain PeerUp(a)
        let _ = c.recv().await; // drain PeerUp(b)

        b.subscribe("gossip").await.unwrap();
        a.broadcast("gossip", Bytes::from_static(b"heads"))
            .await
            .unwrap();

        let event = b.recv().await.unwrap();
        assert_eq!(
            event,
            TransportEvent::Inbound {
                from: "a".into(),
                bytes: Bytes::from_static(b"heads"),
            }
        );

        // c never subscribed, so it gets nothing further. Closing it
        // drops its sender out of the hub, which ends its own channel.
        c.close().await;
        assert_eq!(c.recv().await, None);
    }

    #[tokio::test]
    async fn close_announces_peer_down() {
        let hub = InProcessHub::new();
        let a = InProcessTransport::new(hub.clone(), "a".into());
        let b = InProcessTransport::new(hub.clone(), "b".into());
        let _ = b.recv().await; // drain PeerUp(a)

        a.close().await;
        assert_eq!(b.recv().await, Some(TransportEvent::PeerDown("a".into())));
    }
}
