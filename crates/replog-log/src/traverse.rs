use crate::Log;
use replog_entry::Entry;
use replog_proto::Hash;
use std::collections::{HashSet, VecDeque};

impl Log {
    /// Breadth-first traversal through `next` links starting at `roots`,
    /// visiting entries in the log's sort order at each BFS layer so the
    /// result is deterministic given a fixed comparator (§4.2).
    pub fn traverse(&self, roots: &[Hash], amount: usize, end_hash: Option<Hash>) -> Vec<Hash> {
        let mut visited: HashSet<Hash> = HashSet::new();
        let mut order: Vec<Hash> = Vec::new();
        let mut queue: VecDeque<Hash> = VecDeque::new();

        for root in roots {
            if visited.insert(*root) {
                queue.push_back(*root);
            }
        }

        while let Some(hash) = queue.pop_front() {
            if order.len() >= amount {
                break;
            }
            order.push(hash);
            if Some(hash) == end_hash {
                break;
            }

            let Some(entry) = self.entries.get(&hash) else {
                continue;
            };
            let mut children: Vec<&Hash> = entry.next.iter().filter(|h| !visited.contains(h)).collect();
            children.sort_by(|a, b| match (self.entries.get(a), self.entries.get(b)) {
                (Some(ea), Some(eb)) => Entry::compare(ea, eb),
                _ => a.cmp(b),
            });
            for child in children {
                visited.insert(*child);
                queue.push_back(*child);
            }
        }

        order
    }

    /// Selects up to `self.options.max_references` reference hashes using
    /// a power-of-two distance schedule over a traversal from `heads`: the
    /// k-th reference is the entry at position `min(2^k - 1, len - 1)`,
    /// giving O(log N) references for O(1) amortized membership proofs.
    pub(crate) fn select_references(&self, heads: &[Hash]) -> Vec<Hash> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let chain = self.traverse(heads, self.entries.len(), None);
        if chain.is_empty() {
            return Vec::new();
        }

        let last_index = chain.len() - 1;
        let mut refs = Vec::new();
        let mut seen = HashSet::new();
        let mut k = 0usize;
        loop {
            let distance = (1usize << k).saturating_sub(1);
            let index = distance.min(last_index);
            if seen.insert(index) {
                refs.push(chain[index]);
            }
            if index == last_index || refs.len() >= self.options.max_references {
                break;
            }
            k += 1;
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppendOptions, LogOptions};
    use replog_keys::{KeyKind, LocalKeystore};
    use std::sync::Arc;

    fn new_log() -> Log {
        let ks = Arc::new(LocalKeystore::new());
        let pk = ks.create_key("node", KeyKind::Ed25519).unwrap();
        Log::new(pk, "node", ks, LogOptions::default())
    }

    #[test]
    fn traverse_is_deterministic() {
        let mut log = new_log();
        for i in 0..10 {
            log.append(format!("e{i}").into_bytes(), AppendOptions::default())
                .unwrap();
        }
        let heads = log.heads();
        let a = log.traverse(&heads, 100, None);
        let b = log.traverse(&heads, 100, None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
    }

    #[test]
    fn select_references_grows_logarithmically() {
        let mut log = new_log();
        for i in 0..20 {
            log.append(format!("e{i}").into_bytes(), AppendOptions::default())
                .unwrap();
        }
        let heads = log.heads();
        let refs = log.select_references(&heads);
        // ceil(log2(20)) + 1 distinct positions at most.
        assert!(refs.len() <= 6);
        assert!(!refs.is_empty());
    }
}
