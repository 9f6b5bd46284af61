/// A peer's participation in a log's replication (§4.5's role state machine).
///
/// `Observer` holds a factor of zero and never appears in the ring;
/// `Replicator` pins the factor the caller chose; `AdaptiveReplicator`'s
/// factor is rewritten by the PID controller on each rebalance tick.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Role {
    Observer,
    Replicator { factor: f64, timestamp: u64 },
    AdaptiveReplicator { factor: f64, timestamp: u64 },
}

impl Role {
    pub fn factor(&self) -> f64 {
        match self {
            Role::Observer => 0.0,
            Role::Replicator { factor, .. } | Role::AdaptiveReplicator { factor, .. } => *factor,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Role::Observer => 0,
            Role::Replicator { timestamp, .. } | Role::AdaptiveReplicator { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, Role::AdaptiveReplicator { .. })
    }

    pub fn is_observer(&self) -> bool {
        matches!(self, Role::Observer)
    }

    pub fn with_factor(&self, factor: f64, timestamp: u64) -> Role {
        match self {
            Role::Observer => Role::Observer,
            Role::Replicator { .. } => Role::Replicator { factor, timestamp },
            Role::AdaptiveReplicator { .. } => Role::AdaptiveReplicator { factor, timestamp },
        }
    }
}

/// What a caller asks for via `SharedLog::set_role`; the timestamp is
/// stamped by the engine at the moment the request is processed, not by
/// the caller, so role ordering stays monotonic per peer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RoleRequest {
    Observer,
    Replicator { factor: f64 },
    AdaptiveReplicator { factor: f64 },
}

impl RoleRequest {
    pub(crate) fn into_role(self, timestamp: u64) -> Role {
        match self {
            RoleRequest::Observer => Role::Observer,
            RoleRequest::Replicator { factor } => Role::Replicator { factor, timestamp },
            RoleRequest::AdaptiveReplicator { factor } => Role::AdaptiveReplicator { factor, timestamp },
        }
    }
}
