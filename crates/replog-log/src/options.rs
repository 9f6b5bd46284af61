use replog_entry::Entry;
use replog_keys::PublicKey;
use std::sync::Arc;

/// Construction-time policy for a `Log`.
#[derive(Clone)]
pub struct LogOptions {
    /// Cap on references considered by the power-of-two reference schedule;
    /// the schedule itself only ever needs `ceil(log2(len))` of these.
    pub max_references: usize,
    /// Recycle policy: once exceeded, the oldest entries are cut.
    pub max_len: Option<usize>,
    /// Local admission gate, mirroring §6's `canAppend` for non-append
    /// policy enforcement on `join`.
    pub can_append: Option<Arc<dyn Fn(&Entry) -> bool + Send + Sync>>,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            max_references: 32,
            max_len: None,
            can_append: None,
        }
    }
}

/// Per-append overrides; `gid` defaults to the causal-chain derivation in
/// §4.1, `min_replicas` defaults to the log-wide default (commonly fed from
/// `replog-shared`'s `Config::replicas.min`).
pub struct AppendOptions {
    pub gid: Option<String>,
    pub min_replicas: u32,
    pub encrypt_for: Option<PublicKey>,
}

impl Default for AppendOptions {
    fn default() -> Self {
        AppendOptions {
            gid: None,
            min_replicas: 2,
            encrypt_for: None,
        }
    }
}
