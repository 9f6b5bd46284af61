use crate::role::RoleRequest;
use replog_keys::PublicKey;
use replog_pid::PidConfig;
use std::sync::Arc;

/// Construction-time policy for a `SharedLog` (§5's timeouts table, §6's
/// configuration options).
pub struct Config {
    pub initial_role: RoleRequest,
    pub replicas_min: u32,
    pub replicas_max: Option<u32>,
    pub respond_to_ihave_timeout_ms: u64,
    pub wait_for_replicator_timeout_ms: u64,
    pub wait_for_role_maturity_ms: u64,
    pub prune_confirmation_timeout_ms: u64,
    pub auto_dial_retry_ms: u64,
    pub rebalance_debounce_interval_ms: u64,
    /// Admission gate mirroring §6's `canReplicate(pubkey, role) -> bool`.
    pub can_replicate: Option<Arc<dyn Fn(&PublicKey, &crate::Role) -> bool + Send + Sync>>,
    pub pid: PidConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            initial_role: RoleRequest::AdaptiveReplicator { factor: 1.0 },
            replicas_min: 2,
            replicas_max: None,
            respond_to_ihave_timeout_ms: 10_000,
            wait_for_replicator_timeout_ms: 9_000,
            wait_for_role_maturity_ms: 5_000,
            prune_confirmation_timeout_ms: 10_000,
            auto_dial_retry_ms: 5_000,
            rebalance_debounce_interval_ms: 2_000,
            can_replicate: None,
            pid: PidConfig::default(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder(Config::default())
    }
}

/// Fluent layer over `Config`'s struct-literal construction. Starts from
/// `Config::default()` and overrides one field per call; `build()` unwraps
/// the accumulated value.
pub struct ConfigBuilder(Config);

impl ConfigBuilder {
    pub fn initial_role(mut self, initial_role: RoleRequest) -> Self {
        self.0.initial_role = initial_role;
        self
    }

    pub fn replicas_min(mut self, replicas_min: u32) -> Self {
        self.0.replicas_min = replicas_min;
        self
    }

    pub fn replicas_max(mut self, replicas_max: Option<u32>) -> Self {
        self.0.replicas_max = replicas_max;
        self
    }

    pub fn respond_to_ihave_timeout_ms(mut self, ms: u64) -> Self {
        self.0.respond_to_ihave_timeout_ms = ms;
        self
    }

    pub fn wait_for_replicator_timeout_ms(mut self, ms: u64) -> Self {
        self.0.wait_for_replicator_timeout_ms = ms;
        self
    }

    pub fn wait_for_role_maturity_ms(mut self, ms: u64) -> Self {
        self.0.wait_for_role_maturity_ms = ms;
        self
    }

    pub fn prune_confirmation_timeout_ms(mut self, ms: u64) -> Self {
        self.0.prune_confirmation_timeout_ms = ms;
        self
    }

    pub fn auto_dial_retry_ms(mut self, ms: u64) -> Self {
        self.0.auto_dial_retry_ms = ms;
        self
    }

    pub fn rebalance_debounce_interval_ms(mut self, ms: u64) -> Self {
        self.0.rebalance_debounce_interval_ms = ms;
        self
    }

    /// Admission gate mirroring §6's `canReplicate(pubkey, role) -> bool`.
    pub fn can_replicate(mut self, gate: Arc<dyn Fn(&PublicKey, &crate::Role) -> bool + Send + Sync>) -> Self {
        self.0.can_replicate = Some(gate);
        self
    }

    pub fn pid(mut self, pid: PidConfig) -> Self {
        self.0.pid = pid;
        self
    }

    pub fn build(self) -> Config {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_only_the_fields_it_touches() {
        let config = Config::builder().replicas_min(5).wait_for_role_maturity_ms(0).build();
        assert_eq!(config.replicas_min, 5);
        assert_eq!(config.wait_for_role_maturity_ms, 0);
        // everything untouched still matches the default.
        assert_eq!(config.rebalance_debounce_interval_ms, Config::default().rebalance_debounce_interval_ms);
    }
}
