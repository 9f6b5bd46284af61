//! Per-neighbor shortest-path routing table learned from ACKs (§3, §4.4).
//!
//! Target identities and neighbor identities are both represented as
//! opaque `PeerId` strings (the transport's own addressing scheme is out
//! of this crate's concern); this crate only tracks, for each target,
//! which directly-connected neighbor currently offers the fastest known
//! path.

pub type PeerId = String;

#[derive(Clone, Debug, PartialEq)]
pub struct NextHop {
    pub via: PeerId,
    pub rtt_ms: u64,
    pub learned_at: u64,
}

#[derive(Default)]
pub struct RoutingTable {
    routes: std::collections::HashMap<PeerId, Vec<NextHop>>,
    ttl_ms: u64,
}

impl RoutingTable {
    pub fn new(ttl_ms: u64) -> Self {
        RoutingTable {
            routes: std::collections::HashMap::new(),
            ttl_ms,
        }
    }

    /// Records that `target` is reachable via `via` with the given RTT,
    /// learned from an ACK arriving at time `now`. Multiple next-hops per
    /// target are retained, sorted by RTT ascending so the primary
    /// (minimum) is always `next_hops(target)[0]`.
    pub fn learn(&mut self, target: PeerId, via: PeerId, rtt_ms: u64, now: u64) {
        let hops = self.routes.entry(target.clone()).or_default();
        if let Some(existing) = hops.iter_mut().find(|h| h.via == via) {
            existing.rtt_ms = rtt_ms;
            existing.learned_at = now;
        } else {
            hops.push(NextHop {
                via,
                rtt_ms,
                learned_at: now,
            });
        }
        hops.sort_by_key(|h| h.rtt_ms);
        tracing::trace!(%target, count = hops.len(), "learned route");
    }

    pub fn next_hops(&self, target: &str) -> &[NextHop] {
        self.routes.get(target).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// The fastest known next-hop for `target`, if any non-expired route exists.
    pub fn primary(&self, target: &str, now: u64) -> Option<&NextHop> {
        self.next_hops(target)
            .iter()
            .find(|h| now.saturating_sub(h.learned_at) < self.ttl_ms)
    }

    pub fn is_reachable(&self, target: &str, now: u64) -> bool {
        self.primary(target, now).is_some()
    }

    /// Drops every route whose next-hop is `neighbor`, as happens on
    /// disconnect or an explicit Goodbye.
    pub fn evict_neighbor(&mut self, neighbor: &str) {
        self.routes.retain(|_, hops| {
            hops.retain(|h| h.via != neighbor);
            !hops.is_empty()
        });
    }

    /// Drops routes that have aged past the TTL.
    pub fn expire(&mut self, now: u64) {
        self.routes.retain(|_, hops| {
            hops.retain(|h| now.saturating_sub(h.learned_at) < self.ttl_ms);
            !hops.is_empty()
        });
    }
}
