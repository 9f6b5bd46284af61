//! Direct-stream transport (§3, §4.4): a source-routed message overlay
//! layered over the raw [`replog_transport::Transport`] duplex, with three
//! delivery modes (silent, acknowledged, seek), dedup'd store-and-forward
//! relaying, and route learning from ACKs flowing back along the path a
//! message actually took.

mod dedup;

use bytes::Bytes;
use dashmap::DashMap;
use dedup::SeenSet;
use parking_lot::Mutex;
use replog_keys::{KeyKind, Keystore, PublicKey};
use replog_proto::{decode_message, encode_message, DeliveryMode, Header, Message, MessageBody};
use replog_route::RoutingTable;
use replog_transport::{Transport, TransportEvent};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, oneshot};

pub type PeerId = String;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] replog_transport::Error),
    #[error(transparent)]
    Wire(#[from] replog_proto::Error),
    #[error(transparent)]
    Keystore(#[from] replog_keys::Error),
    #[error("no neighbor known that can reach the destination")]
    NoRoute,
    #[error("timed out waiting for an acknowledgement")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Received { from: PeerId, payloads: Vec<Bytes> },
    /// A neighbor announced itself (`hello`) or an existing one dropped out
    /// (`goodbye`, or the transport reporting it gone). Consumers above
    /// this layer (e.g. the shared log's membership tracking) use this to
    /// know when to (re)send their own state to a peer.
    NeighborUp(PeerId),
    NeighborDown(PeerId),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SendOutcome {
    Sent,
    Acked { seen_counter: u32, rtt_ms: u64 },
}

pub struct StreamOptions {
    pub ack_timeout_ms: u64,
    pub message_ttl_ms: u64,
    pub seen_capacity: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions {
            ack_timeout_ms: 5_000,
            message_ttl_ms: 30_000,
            seen_capacity: 4_096,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

struct PendingAck {
    sender: oneshot::Sender<(u32, u64)>,
    sent_at: u64,
}

struct Inner {
    local_id: PeerId,
    transport: Arc<dyn Transport>,
    keystore: Arc<dyn Keystore>,
    signing_key_id: String,
    neighbors: Mutex<BTreeSet<PeerId>>,
    routes: Mutex<RoutingTable>,
    seen: Mutex<SeenSet>,
    pending: DashMap<[u8; 32], PendingAck>,
    forwarded: DashMap<[u8; 32], Vec<(PeerId, u64)>>,
    events: broadcast::Sender<StreamEvent>,
    options: StreamOptions,
}

/// The direct-stream engine for one local peer. Cloning is cheap; all
/// clones share the same background receive loop and routing state.
#[derive(Clone)]
pub struct DirectStream {
    inner: Arc<Inner>,
}

impl DirectStream {
    /// Spawns the background receive loop and returns a handle to it. The
    /// loop runs until the transport's event stream ends.
    pub fn spawn(
        local_id: PeerId,
        transport: Arc<dyn Transport>,
        keystore: Arc<dyn Keystore>,
        signing_key_id: String,
        options: StreamOptions,
    ) -> DirectStream {
        let (events, _) = broadcast::channel(256);
        let inner = Arc::new(Inner {
            local_id,
            transport,
            keystore,
            signing_key_id,
            neighbors: Mutex::new(BTreeSet::new()),
            routes: Mutex::new(RoutingTable::new(options.message_ttl_ms)),
            seen: Mutex::new(SeenSet::new(options.seen_capacity)),
            pending: DashMap::new(),
            forwarded: DashMap::new(),
            events,
            options,
        });
        let run_inner = inner.clone();
        tokio::spawn(async move { Self::run(run_inner).await });
        DirectStream { inner }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.inner.events.subscribe()
    }

    pub fn add_neighbor(&self, peer: PeerId) {
        self.inner.neighbors.lock().insert(peer);
    }

    pub fn remove_neighbor(&self, peer: &str) {
        self.inner.neighbors.lock().remove(peer);
        self.inner.routes.lock().evict_neighbor(peer);
    }

    /// Announces local presence under `topics` to whoever is already
    /// subscribed to them, and subscribes the local transport in turn.
    pub async fn hello(&self, topics: Vec<String>) -> Result<()> {
        for topic in &topics {
            self.inner.transport.subscribe(topic).await?;
        }
        let msg = self.build_message(Vec::new(), MessageBody::Hello { topics: topics.clone() })?;
        let bytes = encode_message(&msg);
        for topic in &topics {
            self.inner.transport.broadcast(topic, bytes.clone()).await?;
        }
        Ok(())
    }

    pub async fn goodbye(&self, topics: Vec<String>) -> Result<()> {
        let msg = self.build_message(Vec::new(), MessageBody::Goodbye { topics: topics.clone() })?;
        let bytes = encode_message(&msg);
        for topic in &topics {
            self.inner.transport.broadcast(topic, bytes.clone()).await?;
            self.inner.transport.unsubscribe(topic).await?;
        }
        Ok(())
    }

    /// Sends `payloads` to `to` under `mode`. `Silent` returns as soon as
    /// the first hop has been dispatched; `Acknowledged` and `Seek` wait
    /// for a matching ACK to travel back, learning (or improving) a route
    /// to `to` along the way.
    pub async fn send(&self, to: PeerId, mode: DeliveryMode, payloads: Vec<Bytes>) -> Result<SendOutcome> {
        let inner = &self.inner;
        let msg = self.build_message(vec![to.clone()], MessageBody::Data { delivery: mode, payloads })?;
        let header_id = msg.header.id;
        let sent_at = now_ms();
        inner.seen.lock().note(msg.dedup_id());

        let waiter = if mode.expects_ack() {
            let (tx, rx) = oneshot::channel();
            inner.pending.insert(header_id, PendingAck { sender: tx, sent_at });
            Some(rx)
        } else {
            None
        };

        dispatch(inner, &to, None, &msg, mode.redundancy().max(1)).await?;

        match waiter {
            None => Ok(SendOutcome::Sent),
            Some(rx) => {
                let timeout = std::time::Duration::from_millis(inner.options.ack_timeout_ms);
                match tokio::time::timeout(timeout, rx).await {
                    Ok(Ok((seen_counter, rtt_ms))) => Ok(SendOutcome::Acked { seen_counter, rtt_ms }),
                    _ => {
                        inner.pending.remove(&header_id);
                        Err(Error::Timeout)
                    }
                }
            }
        }
    }

    fn build_message(&self, to: Vec<PeerId>, body: MessageBody) -> Result<Message> {
        let inner = &self.inner;
        let now = now_ms();
        let mut header = Header::new(rand::random(), now, now + inner.options.message_ttl_ms);
        header.origin = Some(inner.local_id.clone().into_bytes());
        header.to = to;
        sign_header(inner, &mut header)?;
        Ok(Message { header, body })
    }

    async fn run(inner: Arc<Inner>) {
        loop {
            match inner.transport.recv().await {
                Some(TransportEvent::Inbound { from, bytes }) => {
                    if let Err(err) = handle_inbound(&inner, from, bytes).await {
                        tracing::warn!(?err, "dropping malformed inbound message");
                    }
                }
                Some(TransportEvent::PeerDown(peer)) => {
                    let was_neighbor = inner.neighbors.lock().remove(&peer);
                    inner.routes.lock().evict_neighbor(&peer);
                    if was_neighbor {
                        let _ = inner.events.send(StreamEvent::NeighborDown(peer));
                    }
                }
                Some(TransportEvent::PeerUp(_)) => {}
                None => {
                    tracing::debug!("transport closed; direct-stream loop exiting");
                    break;
                }
            }
        }
    }
}

fn sign_header(inner: &Inner, header: &mut Header) -> Result<()> {
    let sig = inner.keystore.sign(&inner.signing_key_id, &header.signable_bytes())?;
    let public = inner.keystore.public_key(&inner.signing_key_id)?;
    header.signatures.push((public.bytes.to_vec(), sig));
    Ok(())
}

fn verify_header(inner: &Inner, header: &Header) -> bool {
    let bytes = header.signable_bytes();
    header.signatures.iter().any(|(key_bytes, sig)| {
        let Ok(key_arr) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
            return false;
        };
        let public = PublicKey { kind: KeyKind::Ed25519, bytes: key_arr };
        matches!(inner.keystore.verify(sig, &public, &bytes), Ok(true))
    })
}

/// Picks up to `redundancy` next hops toward `target`: a direct neighbor
/// link first, then the routing table's fastest known paths, then any
/// other known neighbor as a last-resort flood.
fn next_hops_for(inner: &Inner, target: &str, exclude: Option<&str>, redundancy: u8) -> Vec<PeerId> {
    let neighbors = inner.neighbors.lock();
    let routes = inner.routes.lock();
    let mut out = Vec::new();

    let consider = |candidate: &str, out: &mut Vec<PeerId>| {
        if Some(candidate) == exclude || candidate == inner.local_id {
            return;
        }
        if out.iter().any(|p: &PeerId| p == candidate) {
            return;
        }
        if out.len() < redundancy as usize {
            out.push(candidate.to_string());
        }
    };

    if neighbors.contains(target) {
        consider(target, &mut out);
    }
    for hop in routes.next_hops(target) {
        consider(&hop.via, &mut out);
    }
    for neighbor in neighbors.iter() {
        consider(neighbor, &mut out);
    }
    out
}

/// Sends the already-built `msg` out to up to `redundancy` next hops
/// toward `target`, recording each attempt so a later ACK can be matched
/// back to the neighbor it actually traveled through.
async fn dispatch(
    inner: &Inner,
    target: &str,
    exclude: Option<&str>,
    msg: &Message,
    redundancy: u8,
) -> Result<Vec<PeerId>> {
    let hops = next_hops_for(inner, target, exclude, redundancy);
    if hops.is_empty() {
        return Err(Error::NoRoute);
    }
    let bytes = encode_message(msg);
    let mut sent = Vec::new();
    let now = now_ms();
    for hop in hops {
        match inner.transport.send(&hop, bytes.clone()).await {
            Ok(()) => {
                inner
                    .forwarded
                    .entry(msg.header.id)
                    .or_default()
                    .push((hop.clone(), now));
                sent.push(hop);
            }
            Err(err) => {
                tracing::debug!(%hop, ?err, "hop unreachable, trying next");
            }
        }
    }
    if sent.is_empty() {
        return Err(Error::NoRoute);
    }
    Ok(sent)
}

async fn handle_inbound(inner: &Inner, from: PeerId, bytes: Bytes) -> Result<()> {
    let msg = decode_message(bytes)?;
    if !verify_header(inner, &msg.header) {
        tracing::debug!(%from, "dropping message with invalid signature");
        return Ok(());
    }
    let (first, seen_count) = inner.seen.lock().note(msg.dedup_id());

    match &msg.body {
        MessageBody::Data { delivery, payloads } => {
            let is_target = msg.header.to.iter().any(|t| t == &inner.local_id);
            if first && is_target {
                let _ = inner.events.send(StreamEvent::Received {
                    from: from.clone(),
                    payloads: payloads.clone(),
                });
                if delivery.expects_ack() {
                    send_ack(inner, &from, &msg.header, seen_count).await;
                }
            }
            if first && !is_target {
                relay_data(inner, &from, &msg, *delivery, payloads).await;
            }
        }
        MessageBody::Ack { acked_id, seen_counter } => {
            if first {
                handle_ack(inner, &from, &msg, *acked_id, *seen_counter).await;
            }
        }
        MessageBody::Hello { .. } => {
            let newly_seen = inner.neighbors.lock().insert(from.clone());
            if newly_seen {
                let _ = inner.events.send(StreamEvent::NeighborUp(from));
            }
        }
        MessageBody::Goodbye { .. } => {
            let was_neighbor = inner.neighbors.lock().remove(&from);
            inner.routes.lock().evict_neighbor(&from);
            if was_neighbor {
                let _ = inner.events.send(StreamEvent::NeighborDown(from));
            }
        }
    }
    Ok(())
}

async fn relay_data(inner: &Inner, from: &str, msg: &Message, delivery: DeliveryMode, payloads: &[Bytes]) {
    let Some(target) = msg.header.to.first() else {
        return;
    };
    let forwarded = match delivery {
        DeliveryMode::Seek { redundancy, ttl } => {
            if ttl == 0 {
                return;
            }
            let relayed = Message {
                header: msg.header.clone(),
                body: MessageBody::Data {
                    delivery: DeliveryMode::Seek { redundancy, ttl: ttl - 1 },
                    payloads: payloads.to_vec(),
                },
            };
            dispatch(inner, target, Some(from), &relayed, redundancy).await
        }
        DeliveryMode::Silent { redundancy } | DeliveryMode::Acknowledged { redundancy } => {
            dispatch(inner, target, Some(from), msg, redundancy).await
        }
    };
    if let Err(err) = forwarded {
        tracing::debug!(%target, ?err, "could not relay message toward target");
    }
}

async fn send_ack(inner: &Inner, to_neighbor: &str, data_header: &Header, seen_counter: u32) {
    let Some(origin_bytes) = data_header.origin.clone() else {
        return;
    };
    let Ok(origin) = String::from_utf8(origin_bytes) else {
        return;
    };
    let now = now_ms();
    let mut header = Header::new(rand::random(), now, now + inner.options.message_ttl_ms);
    header.origin = Some(inner.local_id.clone().into_bytes());
    header.to = vec![origin];
    if sign_header(inner, &mut header).is_err() {
        return;
    }
    let ack = Message {
        header,
        body: MessageBody::Ack { acked_id: data_header.id, seen_counter },
    };
    let bytes = encode_message(&ack);
    if let Err(err) = inner.transport.send(to_neighbor, bytes).await {
        tracing::debug!(%to_neighbor, ?err, "failed to send ack to immediate neighbor");
    }
}

async fn handle_ack(inner: &Inner, from: &str, msg: &Message, acked_id: [u8; 32], seen_counter: u32) {
    if let Some(responder_bytes) = &msg.header.origin {
        if let Ok(responder) = String::from_utf8(responder_bytes.clone()) {
            if let Some(attempts) = inner.forwarded.get(&acked_id) {
                if let Some((_, sent_at)) = attempts.iter().find(|(hop, _)| hop == from) {
                    let rtt_ms = now_ms().saturating_sub(*sent_at);
                    inner.routes.lock().learn(responder, from.to_string(), rtt_ms, now_ms());
                }
            }
        }
    }

    if msg.header.to.iter().any(|t| t == &inner.local_id) {
        if let Some((_, pending)) = inner.pending.remove(&acked_id) {
            let rtt_ms = now_ms().saturating_sub(pending.sent_at);
            let _ = pending.sender.send((seen_counter, rtt_ms));
        }
        return;
    }

    let Some(target) = msg.header.to.first() else {
        return;
    };
    if let Err(err) = dispatch(inner, target, Some(from), msg, 1).await {
        tracing::debug!(%target, ?err, "could not relay ack back toward sender");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replog_keys::LocalKeystore;
    use replog_transport::{InProcessHub, InProcessTransport};
    use std::sync::Arc;

    fn keystore_with_identity(id: &str) -> Arc<LocalKeystore> {
        let keystore = Arc::new(LocalKeystore::default());
        keystore.create_key(id, KeyKind::Ed25519).unwrap();
        keystore
    }

    fn spawn_node(hub: &Arc<InProcessHub>, id: &str) -> DirectStream {
        let transport = Arc::new(InProcessTransport::new(hub.clone(), id.to_string()));
        let keystore = keystore_with_identity(id);
        DirectStream::spawn(id.to_string(), transport, keystore, id.to_string(), StreamOptions::default())
    }

    #[tokio::test]
    async fn acknowledged_send_between_direct_neighbors_learns_a_route() {
        let hub = InProcessHub::new();
        let a = spawn_node(&hub, "a");
        let b = spawn_node(&hub, "b");
        a.add_neighbor("b".to_string());
        b.add_neighbor("a".to_string());

        let outcome = a
            .send(
                "b".to_string(),
                DeliveryMode::Acknowledged { redundancy: 1 },
                vec![Bytes::from_static(b"hello")],
            )
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Acked { .. }));

        let route = a.inner.routes.lock().primary("b", now_ms()).cloned();
        assert_eq!(route.unwrap().via, "b");
    }

    #[tokio::test]
    async fn seek_discovers_a_multi_hop_route() {
        // Line topology: a - b - c. a knows only b; a seeks c through b.
        let hub = InProcessHub::new();
        let a = spawn_node(&hub, "a");
        let b = spawn_node(&hub, "b");
        let c = spawn_node(&hub, "c");
        a.add_neighbor("b".to_string());
        b.add_neighbor("a".to_string());
        b.add_neighbor("c".to_string());
        c.add_neighbor("b".to_string());

        let mut events = c.subscribe_events();

        let outcome = a
            .send(
                "c".to_string(),
                DeliveryMode::Seek { redundancy: 1, ttl: 4 },
                vec![Bytes::from_static(b"ping")],
            )
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Acked { .. }));

        let received = events.recv().await.unwrap();
        assert_eq!(
            received,
            StreamEvent::Received { from: "b".to_string(), payloads: vec![Bytes::from_static(b"ping")] }
        );

        let route = a.inner.routes.lock().primary("c", now_ms()).cloned();
        assert_eq!(route.unwrap().via, "b");
    }

    #[tokio::test]
    async fn silent_send_does_not_wait_for_an_ack() {
        let hub = InProcessHub::new();
        let a = spawn_node(&hub, "a");
        let b = spawn_node(&hub, "b");
        a.add_neighbor("b".to_string());
        b.add_neighbor("a".to_string());

        let outcome = a
            .send(
                "b".to_string(),
                DeliveryMode::Silent { redundancy: 1 },
                vec![Bytes::from_static(b"hi")],
            )
            .await
            .unwrap();
        assert_eq!(outcome, SendOutcome::Sent);
    }

    #[tokio::test]
    async fn hello_announces_a_neighbor_to_subscribers() {
        let hub = InProcessHub::new();
        let a = spawn_node(&hub, "a");
        let b = spawn_node(&hub, "b");
        let mut a_events = a.subscribe_events();

        // a subscribes first so it is present to receive b's hello broadcast.
        a.hello(vec!["topic".to_string()]).await.unwrap();
        b.hello(vec!["topic".to_string()]).await.unwrap();

        let event = a_events.recv().await.unwrap();
        assert_eq!(event, StreamEvent::NeighborUp("b".to_string()));
    }

    #[tokio::test]
    async fn goodbye_retracts_a_neighbor() {
        let hub = InProcessHub::new();
        let a = spawn_node(&hub, "a");
        let b = spawn_node(&hub, "b");
        a.hello(vec!["topic".to_string()]).await.unwrap();
        b.hello(vec!["topic".to_string()]).await.unwrap();
        let mut a_events = a.subscribe_events();

        b.goodbye(vec!["topic".to_string()]).await.unwrap();

        let event = a_events.recv().await.unwrap();
        assert_eq!(event, StreamEvent::NeighborDown("b".to_string()));
    }

    #[tokio::test]
    async fn send_without_any_known_neighbor_fails() {
        let hub = InProcessHub::new();
        let a = spawn_node(&hub, "a");
        let _b = spawn_node(&hub, "b");

        let err = a
            .send(
                "b".to_string(),
                DeliveryMode::Silent { redundancy: 1 },
                vec![Bytes::from_static(b"hi")],
            )
            .await;
        assert!(matches!(err, Err(Error::NoRoute)));
    }
}
