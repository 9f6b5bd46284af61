//! Content-addressed, signed, optionally payload-encrypted DAG entry (§3, §4.1).
//!
//! Identity and clock are kept in the clear. Only the payload may be
//! box-encrypted for a recipient — see the "Open Questions" resolution in
//! `DESIGN.md` for why this crate narrows the spec's "payload, identity,
//! and clock may each be separately encrypted" to payload-only.

mod canonical;
mod sealed;

pub use sealed::Sealed;

use replog_keys::{KeyKind, Keystore, PublicKey};
use replog_proto::Hash;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("entry hash did not match its canonical bytes")]
    HashMismatch,
    #[error("entry could not be decoded: {0}")]
    Undecodable(String),
    #[error(transparent)]
    Keystore(#[from] replog_keys::Error),
    #[error(transparent)]
    Wire(#[from] replog_proto::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The Lamport clock attached to every entry: `(id, time)` where `id` is
/// the creator's public-key bytes.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Clock {
    pub id: PublicKey,
    pub time: u64,
}

impl Clock {
    /// Lamport-ordered comparison with tiebreak on clock id bytes (§4.1).
    pub fn compare(&self, other: &Clock) -> std::cmp::Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.id.bytes.cmp(&other.id.bytes))
    }
}

/// `serde` derives exist so `replog-shared` can ship a whole entry inside
/// an `ExchangeHeads` control message; they have no bearing on the
/// hash-stable wire layout, which is `to_canonical_bytes`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Entry {
    pub hash: Hash,
    pub next: Vec<Hash>,
    pub refs: Vec<Hash>,
    pub gid: String,
    pub min_replicas: u32,
    pub clock: Clock,
    pub payload: Sealed,
    pub signatures: Vec<(PublicKey, Vec<u8>)>,
}

/// Everything needed to build a new entry; `append` in `replog-log` fills
/// in `next`/`refs`/`clock`/`gid` and calls `create`.
pub struct Draft {
    pub next: Vec<Hash>,
    pub refs: Vec<Hash>,
    pub gid: String,
    pub min_replicas: u32,
    pub clock: Clock,
    pub payload: Vec<u8>,
    pub encrypt_for: Option<PublicKey>,
}

impl Entry {
    /// Signs and computes the hash. `keystore`/`signing_key_id` produce the
    /// signature; `sender_box_key_id` is only required when `draft.encrypt_for`
    /// is set.
    pub fn create(
        draft: Draft,
        keystore: &dyn Keystore,
        signing_key_id: &str,
        sender_box_key_id: Option<&str>,
    ) -> Result<Entry> {
        let payload = match draft.encrypt_for {
            Some(recipient) => {
                let box_id = sender_box_key_id
                    .ok_or_else(|| Error::Undecodable("encrypt_for set without a box key".into()))?;
                let ciphertext = keystore.box_encrypt(box_id, &recipient, &draft.payload)?;
                Sealed::Boxed {
                    recipient,
                    ciphertext,
                }
            }
            None => Sealed::Plain(draft.payload),
        };

        let mut entry = Entry {
            hash: Hash::from_bytes([0u8; 34]),
            next: draft.next,
            refs: draft.refs,
            gid: draft.gid,
            min_replicas: draft.min_replicas,
            clock: draft.clock,
            payload,
            signatures: Vec::new(),
        };

        let canonical = canonical::canonical_bytes(&entry);
        entry.hash = Hash::of(&canonical);
        let signature = keystore.sign(signing_key_id, &canonical)?;
        entry.signatures.push((entry.clock.id.clone(), signature));
        Ok(entry)
    }

    /// Recomputes the canonical bytes and checks hash + every signature.
    pub fn verify(&self, keystore: &dyn Keystore) -> Result<()> {
        if self.clock.id.kind != KeyKind::Ed25519 {
            tracing::debug!(gid = %self.gid, "rejecting entry with non-ed25519 clock id");
            return Err(Error::Undecodable("clock id must be an ed25519 key".into()));
        }
        let canonical = canonical::canonical_bytes(self);
        if Hash::of(&canonical) != self.hash {
            tracing::warn!(gid = %self.gid, hash = %self.hash, "entry hash did not match its canonical bytes");
            return Err(Error::HashMismatch);
        }
        if self.signatures.is_empty() {
            tracing::warn!(gid = %self.gid, hash = %self.hash, "rejecting entry with no signatures");
            return Err(Error::SignatureInvalid);
        }
        for (key, sig) in &self.signatures {
            if !keystore.verify(sig, key, &canonical)? {
                tracing::warn!(gid = %self.gid, hash = %self.hash, signer = ?key, "signature verification failed");
                return Err(Error::SignatureInvalid);
            }
        }
        Ok(())
    }

    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        canonical::canonical_bytes(self)
    }

    pub fn compare(a: &Entry, b: &Entry) -> std::cmp::Ordering {
        a.clock.compare(&b.clock)
    }

    /// Opens the payload if it is plain. Boxed payloads need the sender's
    /// box key out of band (e.g. from the Log's peer directory) — use
    /// `open_payload_from` for those.
    pub fn open_payload(&self, _keystore: &dyn Keystore, _recipient_key_id: &str) -> Result<Vec<u8>> {
        match &self.payload {
            Sealed::Plain(bytes) => Ok(bytes.clone()),
            Sealed::Boxed { .. } => Err(Error::Undecodable(
                "payload is boxed; use open_payload_from with the sender's box key".into(),
            )),
        }
    }

    /// Opens a boxed payload given the sender's box public key explicitly.
    pub fn open_payload_from(
        &self,
        keystore: &dyn Keystore,
        recipient_key_id: &str,
        sender_box_key: &PublicKey,
    ) -> Result<Vec<u8>> {
        match &self.payload {
            Sealed::Plain(bytes) => Ok(bytes.clone()),
            Sealed::Boxed { ciphertext, .. } => Ok(keystore.box_decrypt(recipient_key_id, sender_box_key, ciphertext)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replog_keys::LocalKeystore;

    fn setup() -> (LocalKeystore, PublicKey) {
        let ks = LocalKeystore::new();
        let pk = ks.create_key("creator", KeyKind::Ed25519).unwrap();
        (ks, pk)
    }

    #[test]
    fn create_and_verify_round_trips() {
        let (ks, pk) = setup();
        let entry = Entry::create(
            Draft {
                next: vec![],
                refs: vec![],
                gid: "gid-1".into(),
                min_replicas: 2,
                clock: Clock { id: pk, time: 1 },
                payload: b"hello".to_vec(),
                encrypt_for: None,
            },
            &ks,
            "creator",
            None,
        )
        .unwrap();

        assert!(entry.verify(&ks).is_ok());
        assert_eq!(entry.open_payload(&ks, "creator").unwrap(), b"hello");
        assert_eq!(Hash::of(&entry.to_canonical_bytes()), entry.hash);
    }

    #[test]
    fn tampered_entry_fails_verification() {
        let (ks, pk) = setup();
        let mut entry = Entry::create(
            Draft {
                next: vec![],
                refs: vec![],
                gid: "gid-1".into(),
                min_replicas: 2,
                clock: Clock { id: pk, time: 1 },
                payload: b"hello".to_vec(),
                encrypt_for: None,
            },
            &ks,
            "creator",
            None,
        )
        .unwrap();

        entry.payload = Sealed::Plain(b"tampered".to_vec());
        assert!(matches!(entry.verify(&ks), Err(Error::HashMismatch)));
    }

    #[test]
    fn encrypted_payload_round_trips() {
        let ks = LocalKeystore::new();
        let signer = ks.create_key("creator", KeyKind::Ed25519).unwrap();
        let sender_box = ks.create_key("creator-box", KeyKind::X25519).unwrap();
        let recipient_box = ks.create_key("bob-box", KeyKind::X25519).unwrap();

        let entry = Entry::create(
            Draft {
                next: vec![],
                refs: vec![],
                gid: "gid-1".into(),
                min_replicas: 1,
                clock: Clock {
                    id: signer,
                    time: 1,
                },
                payload: b"secret".to_vec(),
                encrypt_for: Some(recipient_box.clone()),
            },
            &ks,
            "creator",
            Some("creator-box"),
        )
        .unwrap();

        assert!(entry.verify(&ks).is_ok());
        let opened = entry
            .open_payload_from(&ks, "bob-box", &sender_box)
            .unwrap();
        assert_eq!(opened, b"secret");
    }

    #[test]
    fn clock_compare_orders_by_time_then_id() {
        let (ks, pk_a) = setup();
        let pk_b = ks.create_key("other", KeyKind::Ed25519).unwrap();

        let earlier = Clock {
            id: pk_a.clone(),
            time: 1,
        };
        let later = Clock {
            id: pk_b,
            time: 2,
        };
        assert_eq!(earlier.compare(&later), std::cmp::Ordering::Less);

        let same_time_a = Clock {
            id: pk_a.clone(),
            time: 5,
        };
        let same_time_b = Clock { id: pk_a, time: 5 };
        assert_eq!(same_time_a.compare(&same_time_b), std::cmp::Ordering::Equal);
    }
}
