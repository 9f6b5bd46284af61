use crate::config::Config;
use crate::control::{self, ControlMessage};
use crate::event::Event;
use crate::role::{Role, RoleRequest};
use crate::{Error, Result};
use replog_blockstore::BlockStore;
use replog_entry::Entry;
use replog_keys::{KeyKind, Keystore, PublicKey};
use replog_log::{AppendOptions, Log, LogOptions};
use replog_proto::{DeliveryMode, Hash};
use replog_ring::{Range, Ring};
use replog_stream::{DirectStream, StreamEvent, StreamOptions};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Assumed average entry size in bytes, used only to derive a `used_memory`
/// signal for the PID controller from `Log::len()` when a test hasn't
/// overridden it with `Command::SetMemoryOverride`. Not claimed to be
/// accurate; see `DESIGN.md`.
const ASSUMED_ENTRY_BYTES: f64 = 256.0;
const REBALANCE_RELATIVE_CHANGE_THRESHOLD: f64 = 0.0001;
const TICK_INTERVAL_MS: u64 = 200;
const ROLE_SEEK_TTL: u8 = 8;

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

pub(crate) fn peer_str(pk: &PublicKey) -> String {
    hex::encode(pk.bytes)
}

fn pubkey_from_peer_str(s: &str) -> Option<PublicKey> {
    let bytes = hex::decode(s).ok()?;
    let arr: [u8; 32] = bytes.try_into().ok()?;
    Some(PublicKey { kind: KeyKind::Ed25519, bytes: arr })
}

#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub len: usize,
    pub role: Role,
    pub peer_count: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicationStatus {
    pub progress: u32,
    pub max: u32,
}

pub(crate) enum Command {
    Append {
        payload: Vec<u8>,
        gid: Option<String>,
        reply: oneshot::Sender<Result<Entry>>,
    },
    SetRole {
        request: RoleRequest,
        reply: oneshot::Sender<Result<()>>,
    },
    Heads {
        reply: oneshot::Sender<Vec<Hash>>,
    },
    GetEntry {
        hash: Hash,
        reply: oneshot::Sender<Option<Entry>>,
    },
    Stats {
        reply: oneshot::Sender<Stats>,
    },
    ReplicationStatus {
        gid: String,
        reply: oneshot::Sender<ReplicationStatus>,
    },
    SetMemoryOverride {
        bytes: Option<f64>,
        reply: oneshot::Sender<()>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// A prune round for every hash belonging to one gid: we asked the gid's
/// current leaders to confirm they hold it, and are waiting for at least
/// `min_replicas` distinct confirmations per hash before removing it
/// locally (§4.5's pruning protocol).
struct PruneWatch {
    gid: String,
    min_replicas: u32,
    requested_at: u64,
    confirmations: HashSet<PublicKey>,
}

/// `Config` minus `pid` (consumed up front into a `PidController`, which
/// owns the tuning state `Config::pid` only describes) and `initial_role`
/// (consumed into the starting `Role`/ring entry before the loop starts).
struct Settings {
    replicas_min: u32,
    #[allow(dead_code)]
    replicas_max: Option<u32>,
    #[allow(dead_code)]
    respond_to_ihave_timeout_ms: u64,
    #[allow(dead_code)]
    wait_for_replicator_timeout_ms: u64,
    wait_for_role_maturity_ms: u64,
    prune_confirmation_timeout_ms: u64,
    auto_dial_retry_ms: u64,
    rebalance_debounce_interval_ms: u64,
    can_replicate: Option<Arc<dyn Fn(&PublicKey, &Role) -> bool + Send + Sync>>,
}

pub(crate) struct Inner {
    identity: PublicKey,
    #[allow(dead_code)]
    block_store: Arc<dyn BlockStore>,
    stream: DirectStream,
    topic: String,
    config: Settings,
    log: Log,
    ring: Ring,
    pid: replog_pid::PidController,
    role: Role,
    joined_at: u64,
    events: broadcast::Sender<Event>,
    gid_min_replicas: HashMap<String, u32>,
    gid_holders: HashMap<String, HashSet<PublicKey>>,
    previous_leaders: HashMap<String, HashSet<PublicKey>>,
    prune_watch: HashMap<Hash, PruneWatch>,
    memory_override: Option<f64>,
    next_rebalance_at: u64,
    next_hello_at: u64,
}

impl Inner {
    pub(crate) async fn spawn(
        identity: PublicKey,
        signing_key_id: String,
        log_id: [u8; 32],
        keystore: Arc<dyn Keystore>,
        block_store: Arc<dyn BlockStore>,
        transport: Arc<dyn replog_transport::Transport>,
        config: Config,
    ) -> (mpsc::Sender<Command>, broadcast::Sender<Event>, CancellationToken) {
        let topic = hex::encode(log_id);
        let local_id = peer_str(&identity);
        let stream = DirectStream::spawn(local_id, transport, keystore.clone(), signing_key_id.clone(), StreamOptions::default());
        if let Err(err) = stream.hello(vec![topic]).await {
            tracing::warn!(?err, "failed to announce presence on open");
        }

        let now = now_ms();
        let Config {
            initial_role,
            replicas_min,
            replicas_max,
            respond_to_ihave_timeout_ms,
            wait_for_replicator_timeout_ms,
            wait_for_role_maturity_ms,
            prune_confirmation_timeout_ms,
            auto_dial_retry_ms,
            rebalance_debounce_interval_ms,
            can_replicate,
            pid: pid_config,
        } = config;
        let role = initial_role.into_role(now);
        let mut ring = Ring::new();
        if !role.is_observer() {
            ring.insert_or_update(Range::new(identity.clone(), role.factor(), now));
        }

        let pid = replog_pid::PidController::new(pid_config);
        let settings = Settings {
            replicas_min,
            replicas_max,
            respond_to_ihave_timeout_ms,
            wait_for_replicator_timeout_ms,
            wait_for_role_maturity_ms,
            prune_confirmation_timeout_ms,
            auto_dial_retry_ms,
            rebalance_debounce_interval_ms,
            can_replicate,
        };

        let log = Log::new(identity.clone(), signing_key_id, keystore, LogOptions::default());

        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (events_tx, _) = broadcast::channel(256);
        let cancel = CancellationToken::new();

        let next_hello_at = now + auto_dial_retry_ms;
        let inner = Inner {
            identity,
            block_store,
            stream,
            topic,
            config: settings,
            log,
            ring,
            pid,
            role,
            joined_at: now,
            events: events_tx.clone(),
            gid_min_replicas: HashMap::new(),
            gid_holders: HashMap::new(),
            previous_leaders: HashMap::new(),
            prune_watch: HashMap::new(),
            memory_override: None,
            next_rebalance_at: now,
            next_hello_at,
        };

        let run_cancel = cancel.clone();
        tokio::spawn(async move { run(inner, commands_rx, run_cancel).await });

        (commands_tx, events_tx, cancel)
    }
}

async fn run(mut inner: Inner, mut commands: mpsc::Receiver<Command>, cancel: CancellationToken) {
    let mut stream_events = inner.stream.subscribe_events();
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(TICK_INTERVAL_MS));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                inner.handle_close_internal().await;
                break;
            }
            cmd = commands.recv() => {
                match cmd {
                    Some(Command::Close { reply }) => {
                        inner.handle_close_internal().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => inner.handle_command(cmd).await,
                    None => {
                        inner.handle_close_internal().await;
                        break;
                    }
                }
            }
            ev = stream_events.recv() => {
                match ev {
                    Ok(event) => inner.handle_stream_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "shared log lagged behind direct-stream events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = ticker.tick() => {
                inner.on_tick().await;
            }
        }
    }
}

impl Inner {
    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Append { payload, gid, reply } => {
                let result = self.do_append(payload, gid).await;
                let _ = reply.send(result);
            }
            Command::SetRole { request, reply } => {
                let result = self.do_set_role(request).await;
                let _ = reply.send(result);
            }
            Command::Heads { reply } => {
                let _ = reply.send(self.log.heads());
            }
            Command::GetEntry { hash, reply } => {
                let _ = reply.send(self.log.get(&hash).cloned());
            }
            Command::Stats { reply } => {
                let _ = reply.send(Stats { len: self.log.len(), role: self.role, peer_count: self.ring.len() });
            }
            Command::ReplicationStatus { gid, reply } => {
                let progress = self.gid_holders.get(&gid).map(|s| s.len() as u32).unwrap_or(0);
                let max = self.gid_min_replicas.get(&gid).copied().unwrap_or(self.config.replicas_min);
                let _ = reply.send(ReplicationStatus { progress, max });
            }
            Command::SetMemoryOverride { bytes, reply } => {
                self.memory_override = bytes;
                let _ = reply.send(());
            }
            Command::Close { .. } => unreachable!("handled by the run loop directly"),
        }
    }

    async fn do_append(&mut self, payload: Vec<u8>, gid: Option<String>) -> Result<Entry> {
        let min_replicas = self.config.replicas_min;
        let opts = AppendOptions { gid, min_replicas, encrypt_for: None };
        let entry = self.log.append(payload, opts)?;
        let effective = min_replicas.max(self.gid_min_replicas.get(&entry.gid).copied().unwrap_or(0));
        self.gid_min_replicas.insert(entry.gid.clone(), effective);
        self.gid_holders.entry(entry.gid.clone()).or_default().insert(self.identity.clone());
        self.disseminate(entry.gid.clone(), vec![entry.clone()]).await;
        Ok(entry)
    }

    async fn do_set_role(&mut self, request: RoleRequest) -> Result<()> {
        let now = now_ms();
        let role = request.into_role(now);
        if let Some(gate) = &self.config.can_replicate {
            if !role.is_observer() && !gate(&self.identity, &role) {
                return Err(Error::PolicyRejected);
            }
        }
        self.role = role;
        if role.is_observer() {
            self.ring.remove(&self.identity);
        } else {
            self.ring.insert_or_update(Range::new(self.identity.clone(), role.factor(), now));
        }
        let _ = self.events.send(Event::RoleChanged(role));
        self.broadcast_role().await;
        self.run_distribution_pass().await;
        Ok(())
    }

    /// Sends `entries` (all sharing `gid`) toward the gid's current
    /// leaders: silently if we are one of them, acknowledged (to confirm
    /// at least one leader stored it) if we are not (§4.5's append path).
    async fn disseminate(&mut self, gid: String, entries: Vec<Entry>) {
        let min_replicas = self.gid_min_replicas.get(&gid).copied().unwrap_or(self.config.replicas_min);
        let leaders = self.ring.leaders_for_gid(&gid, min_replicas.max(1) as usize);
        let am_leader = leaders.contains(&self.identity) && self.is_self_mature(now_ms());
        let msg = ControlMessage::ExchangeHeads { entries };
        let bytes = control::encode(&msg);

        if am_leader {
            for peer in leaders.iter().filter(|p| **p != self.identity) {
                let to = peer_str(peer);
                if let Err(err) = self.stream.send(to, DeliveryMode::Silent { redundancy: 1 }, vec![bytes.clone()]).await {
                    tracing::debug!(?err, gid = %gid, "could not reach a fellow leader");
                }
            }
        } else {
            for peer in &leaders {
                let to = peer_str(peer);
                match self.stream.send(to, DeliveryMode::Acknowledged { redundancy: 1 }, vec![bytes.clone()]).await {
                    Ok(_) => {
                        self.gid_holders.entry(gid.clone()).or_default().insert(peer.clone());
                        break;
                    }
                    Err(err) => tracing::debug!(?err, gid = %gid, "leader unreachable, trying the next"),
                }
            }
        }
    }

    async fn handle_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Received { from, payloads } => {
                for payload in payloads {
                    match control::decode(&payload) {
                        Ok(msg) => self.handle_control_message(msg, &from).await,
                        Err(err) => tracing::debug!(?err, "dropping undecodable control message"),
                    }
                }
            }
            StreamEvent::NeighborUp(peer) => {
                let _ = self.events.send(Event::PeerUp(peer.clone()));
                self.send_role_to(&peer).await;
            }
            StreamEvent::NeighborDown(peer) => {
                let _ = self.events.send(Event::PeerDown(peer.clone()));
                if let Some(pk) = pubkey_from_peer_str(&peer) {
                    self.ring.remove(&pk);
                    self.run_distribution_pass().await;
                }
            }
        }
    }

    async fn handle_control_message(&mut self, msg: ControlMessage, from: &str) {
        match msg {
            ControlMessage::RoleUpdate { peer, role } => {
                let stale = self.ring.get(&peer).map(|r| role.timestamp() < r.timestamp).unwrap_or(false);
                if stale {
                    return;
                }
                if role.is_observer() {
                    self.ring.remove(&peer);
                } else {
                    self.ring.insert_or_update(Range::new(peer, role.factor(), role.timestamp()));
                }
                self.run_distribution_pass().await;
            }
            ControlMessage::ExchangeHeads { entries } => self.handle_exchange_heads(entries).await,
            ControlMessage::RequestIPrune { hashes } => self.handle_request_iprune(hashes, from).await,
            ControlMessage::ResponseIPrune { hashes } => self.handle_response_iprune(hashes, from).await,
        }
    }

    async fn handle_exchange_heads(&mut self, entries: Vec<Entry>) {
        let mut by_gid: HashMap<String, Vec<Entry>> = HashMap::new();
        for entry in entries {
            by_gid.entry(entry.gid.clone()).or_default().push(entry);
        }

        for (gid, group) in by_gid {
            let incoming_max = group.iter().map(|e| e.min_replicas).max().unwrap_or(self.config.replicas_min);
            let existing = self.gid_min_replicas.get(&gid).copied().unwrap_or(0);
            let effective_min_replicas = incoming_max.max(existing);
            self.gid_min_replicas.insert(gid.clone(), effective_min_replicas);

            match self.log.join(group) {
                Ok(report) => {
                    if !report.accepted.is_empty() {
                        let holders = self.gid_holders.entry(gid.clone()).or_default();
                        holders.insert(self.identity.clone());
                        for hash in &report.accepted {
                            if let Some(entry) = self.log.get(hash) {
                                holders.insert(entry.clock.id.clone());
                            }
                        }
                        let _ = self.events.send(Event::HeadsExchanged { gid: gid.clone(), accepted: report.accepted.clone() });
                    }
                    if !report.rejected.is_empty() {
                        tracing::debug!(gid = %gid, rejected = report.rejected.len(), "exchange heads had rejections");
                    }
                }
                Err(err) => tracing::warn!(?err, gid = %gid, "failed to join incoming heads"),
            }

            if !self.is_leader(&gid, effective_min_replicas) {
                let hashes: Vec<Hash> = self.log.values_sorted().into_iter().filter(|e| e.gid == gid).map(|e| e.hash).collect();
                for hash in hashes {
                    self.schedule_prune(hash, gid.clone(), effective_min_replicas);
                }
            }
        }
    }

    async fn handle_request_iprune(&mut self, hashes: Vec<Hash>, from: &str) {
        let mut confirmed = Vec::new();
        for hash in hashes {
            if let Some(entry) = self.log.get(&hash) {
                let min_replicas = self.gid_min_replicas.get(&entry.gid).copied().unwrap_or(self.config.replicas_min);
                if self.is_leader(&entry.gid, min_replicas) {
                    confirmed.push(hash);
                }
            }
        }
        if confirmed.is_empty() {
            return;
        }
        // Reply straight to whoever asked. The requester may already have
        // left the gid's leader set (that's exactly what triggers a prune),
        // so a response can't be found by re-deriving leaders from the ring.
        let msg = ControlMessage::ResponseIPrune { hashes: confirmed };
        let bytes = control::encode(&msg);
        let _ = self.stream.send(from.to_string(), DeliveryMode::Silent { redundancy: 1 }, vec![bytes]).await;
    }

    async fn handle_response_iprune(&mut self, hashes: Vec<Hash>, from: &str) {
        let Some(responder) = pubkey_from_peer_str(from) else {
            tracing::debug!(from, "dropping ResponseIPrune with an unparseable peer id");
            return;
        };
        for hash in hashes {
            let Some(watch) = self.prune_watch.get_mut(&hash) else { continue };
            watch.confirmations.insert(responder.clone());
            if watch.confirmations.len() as u32 >= watch.min_replicas {
                self.finalize_prune(hash);
            }
        }
    }

    fn finalize_prune(&mut self, hash: Hash) {
        self.prune_watch.remove(&hash);
        if self.log.remove(&hash).is_some() {
            let _ = self.events.send(Event::Pruned { hashes: vec![hash] });
        }
    }

    fn schedule_prune(&mut self, hash: Hash, gid: String, min_replicas: u32) {
        self.prune_watch.entry(hash).or_insert_with(|| PruneWatch {
            gid,
            min_replicas,
            requested_at: now_ms(),
            confirmations: HashSet::new(),
        });
    }

    async fn retry_prune_requests(&mut self) {
        let now = now_ms();
        let due: Vec<Hash> = self
            .prune_watch
            .iter()
            .filter(|(_, w)| now.saturating_sub(w.requested_at) >= self.config.prune_confirmation_timeout_ms)
            .map(|(hash, _)| *hash)
            .collect();
        if due.is_empty() {
            return;
        }
        let mut by_gid: HashMap<String, Vec<Hash>> = HashMap::new();
        for hash in &due {
            if let Some(watch) = self.prune_watch.get_mut(hash) {
                watch.requested_at = now;
                by_gid.entry(watch.gid.clone()).or_default().push(*hash);
            }
        }
        for (gid, hashes) in by_gid {
            let min_replicas = self.prune_watch.get(&hashes[0]).map(|w| w.min_replicas).unwrap_or(self.config.replicas_min);
            let leaders = self.ring.leaders_for_gid(&gid, min_replicas.max(1) as usize);
            let msg = ControlMessage::RequestIPrune { hashes };
            let bytes = control::encode(&msg);
            for peer in leaders.iter().filter(|p| **p != self.identity) {
                let _ = self.stream.send(peer_str(peer), DeliveryMode::Silent { redundancy: 1 }, vec![bytes.clone()]).await;
            }
        }
    }

    /// After any ring membership change (a role update arrived, a neighbor
    /// dropped, or our own role changed): recompute leaders per gid we
    /// hold entries for, push heads to newly-added leaders, and schedule
    /// pruning if we dropped out of a gid's leader set (§4.5).
    async fn run_distribution_pass(&mut self) {
        let gids: HashSet<String> = self.log.head_entries().into_iter().map(|e| e.gid.clone()).collect();
        for gid in gids {
            let min_replicas = self.gid_min_replicas.get(&gid).copied().unwrap_or(self.config.replicas_min);
            let leaders: HashSet<PublicKey> = self.ring.leaders_for_gid(&gid, min_replicas.max(1) as usize).into_iter().collect();
            let was_leader = self.previous_leaders.get(&gid).map(|prev| prev.contains(&self.identity)).unwrap_or(false);
            let am_leader = leaders.contains(&self.identity) && self.is_self_mature(now_ms());

            if am_leader {
                let prev = self.previous_leaders.get(&gid).cloned().unwrap_or_default();
                let new_leaders: Vec<PublicKey> = leaders.iter().filter(|p| **p != self.identity && !prev.contains(*p)).cloned().collect();
                if !new_leaders.is_empty() {
                    let entries: Vec<Entry> = self.log.values_sorted().into_iter().filter(|e| e.gid == gid).cloned().collect();
                    let msg = ControlMessage::ExchangeHeads { entries };
                    let bytes = control::encode(&msg);
                    for peer in new_leaders {
                        let _ = self.stream.send(peer_str(&peer), DeliveryMode::Silent { redundancy: 1 }, vec![bytes.clone()]).await;
                    }
                }
            } else if was_leader {
                let hashes: Vec<Hash> = self.log.values_sorted().into_iter().filter(|e| e.gid == gid).map(|e| e.hash).collect();
                for hash in hashes {
                    self.schedule_prune(hash, gid.clone(), min_replicas);
                }
            }

            self.previous_leaders.insert(gid, leaders);
        }
    }

    async fn broadcast_role(&mut self) {
        let msg = ControlMessage::RoleUpdate { peer: self.identity.clone(), role: self.role };
        let bytes = control::encode(&msg);
        let peers: Vec<PublicKey> = self.ring.peers().map(|r| r.peer.clone()).filter(|p| p != &self.identity).collect();
        for peer in peers {
            let _ = self.stream.send(peer_str(&peer), DeliveryMode::Seek { redundancy: 1, ttl: ROLE_SEEK_TTL }, vec![bytes.clone()]).await;
        }
    }

    async fn send_role_to(&mut self, peer: &str) {
        let msg = ControlMessage::RoleUpdate { peer: self.identity.clone(), role: self.role };
        let bytes = control::encode(&msg);
        let _ = self.stream.send(peer.to_string(), DeliveryMode::Seek { redundancy: 1, ttl: ROLE_SEEK_TTL }, vec![bytes]).await;
    }

    /// A newly joined peer only trusts its own leadership once its ring
    /// timestamp has aged past `wait_for_role_maturity_ms`, unless it is
    /// the only peer the ring knows about (nothing to wait on).
    fn is_self_mature(&self, now: u64) -> bool {
        if self.ring.len() <= 1 {
            return true;
        }
        now.saturating_sub(self.joined_at) >= self.config.wait_for_role_maturity_ms
    }

    fn is_leader(&self, gid: &str, min_replicas: u32) -> bool {
        let leaders = self.ring.leaders_for_gid(gid, min_replicas.max(1) as usize);
        leaders.contains(&self.identity) && self.is_self_mature(now_ms())
    }

    async fn on_tick(&mut self) {
        self.retry_announce().await;
        self.retry_prune_requests().await;
        self.maybe_rebalance().await;
    }

    /// Re-announces our presence on the topic every `auto_dial_retry_ms`
    /// (§6), so a peer that subscribed after our last Hello still learns
    /// we're here instead of waiting for us to restart.
    async fn retry_announce(&mut self) {
        let now = now_ms();
        if now < self.next_hello_at {
            return;
        }
        self.next_hello_at = now + self.config.auto_dial_retry_ms;
        if let Err(err) = self.stream.hello(vec![self.topic.clone()]).await {
            tracing::debug!(?err, "periodic re-announce failed");
        }
    }

    async fn maybe_rebalance(&mut self) {
        if !self.role.is_adaptive() {
            return;
        }
        let now = now_ms();
        if now < self.next_rebalance_at {
            return;
        }
        let peer_count = self.ring.len().max(1);
        self.next_rebalance_at = now + self.config.rebalance_debounce_interval_ms * peer_count as u64;

        let used_memory = self.memory_override.unwrap_or_else(|| self.log.len() as f64 * ASSUMED_ENTRY_BYTES);
        let total_participation: f64 = self.ring.peers().map(|r| r.factor).sum();
        let inputs = replog_pid::PidInputs {
            used_memory,
            current_factor: self.role.factor(),
            total_participation,
            peer_count,
        };
        let new_factor = self.pid.tick(inputs);
        let old_factor = self.role.factor();
        let relative_change = if old_factor.abs() > f64::EPSILON {
            ((new_factor - old_factor) / old_factor).abs()
        } else {
            new_factor.abs()
        };
        if relative_change <= REBALANCE_RELATIVE_CHANGE_THRESHOLD {
            return;
        }

        self.role = self.role.with_factor(new_factor, now);
        self.ring.insert_or_update(Range::new(self.identity.clone(), new_factor, now));
        let _ = self.events.send(Event::RoleChanged(self.role));
        self.broadcast_role().await;
        self.run_distribution_pass().await;
    }

    async fn handle_close_internal(&mut self) {
        self.role = Role::Observer;
        self.ring.remove(&self.identity);
        self.broadcast_role().await;
        if let Err(err) = self.stream.goodbye(vec![self.topic.clone()]).await {
            tracing::debug!(?err, "failed to send goodbye on close");
        }
        self.ring = Ring::new();
        self.prune_watch.clear();
    }
}
