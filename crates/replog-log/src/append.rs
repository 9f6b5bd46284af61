use crate::{AppendOptions, Error, Log, Result};
use replog_entry::{Clock, Draft, Entry};

impl Log {
    /// Extends the clock, selects references, forms `next` from the
    /// current heads, creates the entry, updates indices, and enforces
    /// the recycle policy (§4.2).
    pub fn append(&mut self, payload: Vec<u8>, opts: AppendOptions) -> Result<Entry> {
        let heads = self.heads();
        let head_entries: Vec<&Entry> = heads.iter().filter_map(|h| self.entries.get(h)).collect();

        let new_time = self.clock_time.max(head_entries.iter().map(|e| e.clock.time).max().unwrap_or(0)) + 1;

        let gid = match opts.gid {
            Some(gid) => gid,
            None => match head_entries.iter().map(|e| e.gid.clone()).max() {
                Some(gid) => gid,
                None => self.derive_root_gid(new_time),
            },
        };

        let refs = self.select_references(&heads);

        let draft = Draft {
            next: heads,
            refs,
            gid,
            min_replicas: opts.min_replicas,
            clock: Clock {
                id: self.identity.clone(),
                time: new_time,
            },
            payload,
            encrypt_for: opts.encrypt_for,
        };

        let entry = Entry::create(
            draft,
            self.keystore.as_ref(),
            &self.signing_key_id,
            self.box_key_id.as_deref(),
        )
        .map_err(Error::Entry)?;

        self.insert_entry(entry.clone());

        if let Some(max_len) = self.options.max_len {
            if self.len() > max_len {
                self.cut(max_len);
            }
        }

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogOptions;
    use replog_keys::{KeyKind, LocalKeystore};
    use std::sync::Arc;

    fn new_log() -> Log {
        let ks = Arc::new(LocalKeystore::new());
        let pk = ks.create_key("node", KeyKind::Ed25519).unwrap();
        Log::new(pk, "node", ks, LogOptions::default())
    }

    #[test]
    fn append_extends_clock_and_heads() {
        let mut log = new_log();
        let e1 = log.append(b"a".to_vec(), AppendOptions::default()).unwrap();
        assert_eq!(e1.clock.time, 1);
        assert_eq!(log.heads(), vec![e1.hash]);

        let e2 = log.append(b"b".to_vec(), AppendOptions::default()).unwrap();
        assert_eq!(e2.clock.time, 2);
        assert_eq!(e2.next, vec![e1.hash]);
        assert_eq!(log.heads(), vec![e2.hash]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn root_gid_is_derived_and_child_inherits_it() {
        let mut log = new_log();
        let root = log.append(b"a".to_vec(), AppendOptions::default()).unwrap();
        let child = log.append(b"b".to_vec(), AppendOptions::default()).unwrap();
        assert_eq!(child.gid, root.gid);
    }

    #[test]
    fn recycle_policy_trims_oldest() {
        let mut log = new_log();
        log.options.max_len = Some(3);
        for i in 0..5 {
            log.append(format!("e{i}").into_bytes(), AppendOptions::default())
                .unwrap();
        }
        assert_eq!(log.len(), 3);
    }
}
