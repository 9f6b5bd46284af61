use crate::{Log, Rejection, Result};
use replog_entry::Entry;
use replog_proto::Hash;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct JoinReport {
    pub accepted: Vec<Hash>,
    pub rejected: Vec<(Hash, Rejection)>,
    pub deferred: Vec<Hash>,
}

impl JoinReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.deferred.is_empty()
    }
}

impl Log {
    /// Computes the set difference against what's locally known, verifies
    /// signatures and the admission policy for each incoming entry,
    /// integrates into the indices in causal order, and recomputes heads
    /// (§4.2). `join` is commutative and idempotent: feeding the same
    /// entries again, or the same batch split differently, converges to
    /// the same accepted set.
    pub fn join(&mut self, incoming: Vec<Entry>) -> Result<JoinReport> {
        let mut candidates: Vec<Entry> = self.pending.drain().map(|(_, e)| e).collect();
        let mut seen: HashSet<Hash> = candidates.iter().map(|e| e.hash).collect();
        for entry in incoming {
            if !self.entries.contains_key(&entry.hash) && seen.insert(entry.hash) {
                candidates.push(entry);
            }
        }
        candidates.sort_by(Entry::compare);

        let candidate_hashes: HashSet<Hash> = candidates.iter().map(|e| e.hash).collect();
        let mut terminal_reject: HashSet<Hash> = HashSet::new();

        let mut report = JoinReport::default();

        for entry in candidates {
            if self.entries.contains_key(&entry.hash) {
                continue;
            }

            if entry.verify(self.keystore.as_ref()).is_err() {
                tracing::debug!(hash = %entry.hash, "dropping entry with invalid signature");
                terminal_reject.insert(entry.hash);
                report.rejected.push((entry.hash, Rejection::SignatureInvalid));
                continue;
            }

            if let Some(gate) = &self.options.can_append {
                if !gate(&entry) {
                    tracing::debug!(hash = %entry.hash, "dropping entry rejected by canAppend policy");
                    terminal_reject.insert(entry.hash);
                    report.rejected.push((entry.hash, Rejection::AccessDenied));
                    continue;
                }
            }

            let mut parents: Vec<&Entry> = Vec::with_capacity(entry.next.len());
            let mut defer = false;
            let mut cascaded_reject: Option<Hash> = None;

            for next in &entry.next {
                if let Some(parent) = self.entries.get(next) {
                    parents.push(parent);
                } else if terminal_reject.contains(next) {
                    cascaded_reject = Some(*next);
                    break;
                } else if candidate_hashes.contains(next) {
                    // Same-batch parent not processed first (tied clocks);
                    // defer and retry on the next `join` call.
                    defer = true;
                    break;
                } else {
                    defer = true;
                    break;
                }
            }

            if let Some(parent_hash) = cascaded_reject {
                terminal_reject.insert(entry.hash);
                report
                    .rejected
                    .push((entry.hash, Rejection::ParentRejected(parent_hash)));
                continue;
            }

            if defer {
                tracing::debug!(hash = %entry.hash, "deferring entry with unresolved parent");
                self.pending.insert(entry.hash, entry);
                report.deferred.push(entry.hash);
                continue;
            }

            let max_parent_time = parents.iter().map(|p| p.clock.time).max().unwrap_or(0);
            if !parents.is_empty() && entry.clock.time <= max_parent_time {
                terminal_reject.insert(entry.hash);
                report
                    .rejected
                    .push((entry.hash, Rejection::ClockNotMonotonic));
                continue;
            }

            let expected_gid = if parents.is_empty() {
                entry.gid.clone()
            } else {
                parents.iter().map(|p| p.gid.clone()).max().unwrap()
            };
            if entry.gid != expected_gid {
                terminal_reject.insert(entry.hash);
                report.rejected.push((
                    entry.hash,
                    Rejection::GidMismatch {
                        expected: expected_gid,
                        found: entry.gid.clone(),
                    },
                ));
                continue;
            }

            let hash = entry.hash;
            self.insert_entry(entry);
            report.accepted.push(hash);
        }

        if let Some(max_len) = self.options.max_len {
            if self.len() > max_len {
                self.cut(max_len);
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppendOptions, LogOptions};
    use replog_keys::{KeyKind, LocalKeystore};
    use std::sync::Arc;

    fn new_log(name: &str) -> Log {
        let ks = Arc::new(LocalKeystore::new());
        let pk = ks.create_key(name, KeyKind::Ed25519).unwrap();
        Log::new(pk, name, ks, LogOptions::default())
    }

    #[test]
    fn join_is_idempotent() {
        let mut a = new_log("a");
        let e1 = a.append(b"hello".to_vec(), AppendOptions::default()).unwrap();

        let mut b = new_log("b");
        let r1 = b.join(vec![e1.clone()]).unwrap();
        assert_eq!(r1.accepted, vec![e1.hash]);

        let r2 = b.join(vec![e1]).unwrap();
        assert!(r2.accepted.is_empty());
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn join_defers_until_parent_arrives() {
        let mut a = new_log("a");
        let e1 = a.append(b"1".to_vec(), AppendOptions::default()).unwrap();
        let e2 = a.append(b"2".to_vec(), AppendOptions::default()).unwrap();

        let mut b = new_log("b");
        let r1 = b.join(vec![e2.clone()]).unwrap();
        assert!(r1.accepted.is_empty());
        assert_eq!(r1.deferred, vec![e2.hash]);
        assert_eq!(b.pending_len(), 1);

        let r2 = b.join(vec![e1.clone()]).unwrap();
        assert!(r2.accepted.contains(&e1.hash));
        assert!(r2.accepted.contains(&e2.hash));
        assert_eq!(b.pending_len(), 0);
        assert_eq!(b.heads(), vec![e2.hash]);
    }

    #[test]
    fn join_rejects_tampered_signature() {
        let mut a = new_log("a");
        let mut e1 = a.append(b"1".to_vec(), AppendOptions::default()).unwrap();
        e1.signatures[0].1[0] ^= 0xff;

        let mut b = new_log("b");
        let report = b.join(vec![e1.clone()]).unwrap();
        assert_eq!(report.rejected, vec![(e1.hash, Rejection::SignatureInvalid)]);
        assert_eq!(b.len(), 0);
    }

    #[test]
    fn join_order_independence() {
        let mut a = new_log("a");
        let e1 = a.append(b"1".to_vec(), AppendOptions::default()).unwrap();
        let e2 = a.append(b"2".to_vec(), AppendOptions::default()).unwrap();
        let e3 = a.append(b"3".to_vec(), AppendOptions::default()).unwrap();

        let mut forward = new_log("forward");
        forward
            .join(vec![e1.clone(), e2.clone(), e3.clone()])
            .unwrap();

        let mut backward = new_log("backward");
        backward
            .join(vec![e3.clone(), e2.clone(), e1.clone()])
            .unwrap();

        assert_eq!(forward.heads(), backward.heads());
        assert_eq!(forward.len(), backward.len());
    }
}
