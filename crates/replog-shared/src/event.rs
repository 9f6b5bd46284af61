use crate::Role;
use replog_proto::Hash;

/// §4.5's ambient event channel. The distilled spec models this as one
/// `tokio::sync::broadcast` channel per event name (`addEventListener`
/// style); this crate instead hands every subscriber the same channel and
/// lets them match on `Event` — one less channel to keep alive per log,
/// same delivery guarantees. See `DESIGN.md` for the tradeoff.
#[derive(Clone, Debug)]
pub enum Event {
    RoleChanged(Role),
    HeadsExchanged { gid: String, accepted: Vec<Hash> },
    Pruned { hashes: Vec<Hash> },
    PeerUp(String),
    PeerDown(String),
}
