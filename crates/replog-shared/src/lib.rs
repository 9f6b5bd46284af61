//! The replication engine (§3, §4.5): ties `replog-log`'s DAG, `replog-ring`'s
//! leader selection, `replog-stream`'s direct-message overlay and
//! `replog-pid`'s adaptive factor controller into one `SharedLog` handle per
//! open log.
//!
//! Mirrors the teacher's `Router`/`Inner` shape (see `crates/gazette`'s
//! dial-state router): every public method is a thin `async fn` that sends
//! a `Command` over an `mpsc` channel and awaits a `oneshot` reply, with a
//! single background task owning all mutable state (ring, gid bookkeeping,
//! the log itself) so no lock is ever held across an await point.

mod config;
mod control;
mod engine;
mod event;
mod role;

pub use config::Config;
pub use engine::{ReplicationStatus, Stats};
pub use event::Event;
pub use role::{Role, RoleRequest};

use engine::{Command, Inner};
use replog_blockstore::BlockStore;
use replog_entry::Entry;
use replog_keys::{Keystore, PublicKey};
use replog_proto::Hash;
use replog_transport::Transport;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Log(#[from] replog_log::Error),
    /// The engine's background task has already stopped. Per §7's policy
    /// for operations against a closed log, callers should treat this as
    /// "no longer our responsibility" rather than a failure to retry.
    #[error("log is closed")]
    Closed,
    /// §6's `canReplicate(pubkey, role) -> bool` admission gate refused
    /// this role change.
    #[error("role change rejected by local policy")]
    PolicyRejected,
}

pub type Result<T> = std::result::Result<T, Error>;

/// The transport-level peer id `SharedLog::open` will derive from
/// `identity`. Callers register their `Transport` implementation under
/// this same id before calling `open`.
pub fn local_peer_id(identity: &PublicKey) -> String {
    engine::peer_str(identity)
}

impl<T> From<mpsc::error::SendError<T>> for Error {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Error::Closed
    }
}

impl From<oneshot::error::RecvError> for Error {
    fn from(_: oneshot::error::RecvError) -> Self {
        Error::Closed
    }
}

/// Handle to one open, replicated log. Cloning is cheap: every clone talks
/// to the same background engine task over the same command channel.
#[derive(Clone)]
pub struct SharedLog {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl SharedLog {
    /// Opens a log identified by `log_id`, spawning the engine's event loop.
    /// `log_id` derives the topic peers subscribe to in order to discover
    /// each other (§6: "topic string derived from the log id"); this crate
    /// hex-encodes it rather than base64-encoding it, matching the rest of
    /// the workspace's choice of encoding (see `DESIGN.md`).
    ///
    /// `transport` must already be registered under the same peer id this
    /// call will derive from `identity` (hex of the public key bytes) —
    /// callers build the transport and the identity together, the way
    /// `replog-stream`'s own tests pair a transport id with the
    /// `DirectStream` that speaks for it.
    pub async fn open(
        identity: PublicKey,
        signing_key_id: impl Into<String>,
        log_id: [u8; 32],
        keystore: Arc<dyn Keystore>,
        block_store: Arc<dyn BlockStore>,
        transport: Arc<dyn Transport>,
        config: Config,
    ) -> SharedLog {
        let (commands, events, cancel) =
            Inner::spawn(identity, signing_key_id.into(), log_id, keystore, block_store, transport, config).await;
        SharedLog { commands, events, cancel }
    }

    pub async fn append(&self, payload: Vec<u8>) -> Result<Entry> {
        self.append_to(payload, None).await
    }

    pub async fn append_to(&self, payload: Vec<u8>, gid: Option<String>) -> Result<Entry> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Append { payload, gid, reply }).await?;
        rx.await?
    }

    pub async fn set_role(&self, request: RoleRequest) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::SetRole { request, reply }).await?;
        rx.await?
    }

    pub async fn heads(&self) -> Result<Vec<Hash>> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Heads { reply }).await?;
        Ok(rx.await?)
    }

    pub async fn get_entry(&self, hash: Hash) -> Result<Option<Entry>> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::GetEntry { hash, reply }).await?;
        Ok(rx.await?)
    }

    pub async fn stats(&self) -> Result<Stats> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Stats { reply }).await?;
        Ok(rx.await?)
    }

    pub async fn replication_status(&self, gid: String) -> Result<ReplicationStatus> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::ReplicationStatus { gid, reply }).await?;
        Ok(rx.await?)
    }

    /// Test hook: overrides the `used_memory` signal fed to the PID
    /// controller instead of the `Log::len() * assumed_entry_size` estimate,
    /// for simulating memory pressure deterministically (§8 scenario 3).
    pub async fn set_simulated_memory_used(&self, bytes: Option<f64>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::SetMemoryOverride { bytes, reply }).await?;
        Ok(rx.await?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Sets role to `Observer`, broadcasts a Goodbye, and tears down ring
    /// state. §5: "pending deletes resolve (not reject)" — a `close` on an
    /// already-closed log is a no-op success, not an error.
    pub async fn close(&self) -> Result<()> {
        self.cancel.cancel();
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Close { reply }).await.is_err() {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }
}
