//! DAG of signed, content-addressed entries (§3, §4.2).
//!
//! Heads are derived, never stored directly: an entry is a head iff its
//! hash does not appear in any other present entry's `next` set. That
//! invariant is maintained incrementally by tracking the union of all
//! `next` references ever inserted (`referenced`).

mod append;
mod cut;
mod error;
mod join;
mod options;
mod traverse;

pub use error::{Error, Rejection, Result};
pub use join::JoinReport;
pub use options::{AppendOptions, LogOptions};

use replog_entry::Entry;
use replog_keys::{Keystore, PublicKey};
use replog_proto::Hash;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct Log {
    identity: PublicKey,
    signing_key_id: String,
    box_key_id: Option<String>,
    keystore: Arc<dyn Keystore>,
    options: LogOptions,
    entries: HashMap<Hash, Entry>,
    referenced: HashSet<Hash>,
    /// Entries that arrived in a `join` batch before one of their parents
    /// did. Kept until the parent shows up or a caller gives up on them.
    pending: HashMap<Hash, Entry>,
    clock_time: u64,
}

impl Log {
    pub fn new(
        identity: PublicKey,
        signing_key_id: impl Into<String>,
        keystore: Arc<dyn Keystore>,
        options: LogOptions,
    ) -> Self {
        Log {
            identity,
            signing_key_id: signing_key_id.into(),
            box_key_id: None,
            keystore,
            options,
            entries: HashMap::new(),
            referenced: HashSet::new(),
            pending: HashMap::new(),
            clock_time: 0,
        }
    }

    pub fn with_box_key(mut self, box_key_id: impl Into<String>) -> Self {
        self.box_key_id = Some(box_key_id.into());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clock_time(&self) -> u64 {
        self.clock_time
    }

    pub fn get(&self, hash: &Hash) -> Option<&Entry> {
        self.entries.get(hash)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Entries not referenced as `next` by any other entry currently in
    /// the log, in the log's sort order (Lamport time, then clock id).
    pub fn heads(&self) -> Vec<Hash> {
        let mut heads: Vec<&Entry> = self
            .entries
            .values()
            .filter(|e| !self.referenced.contains(&e.hash))
            .collect();
        heads.sort_by(|a, b| Entry::compare(a, b));
        heads.into_iter().map(|e| e.hash).collect()
    }

    pub fn head_entries(&self) -> Vec<&Entry> {
        self.heads()
            .into_iter()
            .filter_map(|h| self.entries.get(&h))
            .collect()
    }

    /// All entries, in the log's sort order.
    pub fn values_sorted(&self) -> Vec<&Entry> {
        let mut values: Vec<&Entry> = self.entries.values().collect();
        values.sort_by(|a, b| Entry::compare(a, b));
        values
    }

    fn insert_entry(&mut self, entry: Entry) {
        for next in &entry.next {
            self.referenced.insert(*next);
        }
        self.clock_time = self.clock_time.max(entry.clock.time);
        self.entries.insert(entry.hash, entry);
    }

    /// Derives a fresh gid for a root entry: the creator's key hex plus
    /// the clock time it was created at, so two peers minting roots at
    /// the same instant still land on distinct gids.
    fn derive_root_gid(&self, clock_time: u64) -> String {
        format!("{}-{}", hex::encode(self.identity.bytes), clock_time)
    }
}
