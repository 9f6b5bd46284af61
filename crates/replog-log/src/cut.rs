use crate::Log;
use replog_entry::Entry;
use replog_proto::Hash;
use std::collections::HashSet;

impl Log {
    /// Retains the newest `size` entries in sort order and rebuilds the
    /// derived `heads`/`referenced` bookkeeping from what remains (§4.2).
    pub fn cut(&mut self, size: usize) {
        if self.entries.len() <= size {
            return;
        }

        let mut sorted: Vec<&Entry> = self.entries.values().collect();
        sorted.sort_by(|a, b| Entry::compare(a, b));

        let keep: HashSet<Hash> = sorted[sorted.len() - size..].iter().map(|e| e.hash).collect();
        self.entries.retain(|hash, _| keep.contains(hash));

        self.referenced = self
            .entries
            .values()
            .flat_map(|e| e.next.iter().copied())
            .collect();

        self.pending.retain(|_, e| keep.contains(&e.hash) || !e.next.iter().all(|n| keep.contains(n) || self.entries.contains_key(n)));
    }

    /// Removes a single entry by hash, promoting any of its `next`
    /// references to heads if they become unreferenced (§3's Log
    /// invariant). Used by pruning in `replog-shared`.
    pub fn remove(&mut self, hash: &Hash) -> Option<Entry> {
        let removed = self.entries.remove(hash)?;
        self.referenced = self
            .entries
            .values()
            .flat_map(|e| e.next.iter().copied())
            .collect();
        Some(removed)
    }
}
