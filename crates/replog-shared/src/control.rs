//! Control-plane message bodies carried inside `replog_stream::DirectStream`
//! `Data` payloads.
//!
//! `replog_proto::MessageBody` only frames opaque payload bytes — it has no
//! dedicated variants for `ExchangeHeads`/`RequestIPrune`/`ResponseIPrune`/
//! role updates. Those are app-level concerns, not wire-framing concerns, so
//! this crate serializes them with `serde_json` into a single payload
//! element rather than extending the hash-critical canonical codec that
//! `replog-entry`/`replog-proto` use for content addressing. See
//! `DESIGN.md` for why the two codecs are kept separate.

use replog_entry::Entry;
use replog_keys::PublicKey;
use replog_proto::Hash;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum ControlMessage {
    ExchangeHeads { entries: Vec<Entry> },
    RequestIPrune { hashes: Vec<Hash> },
    ResponseIPrune { hashes: Vec<Hash> },
    RoleUpdate { peer: PublicKey, role: crate::Role },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not encode control message: {0}")]
    Encode(#[from] serde_json::Error),
}

pub fn encode(msg: &ControlMessage) -> bytes::Bytes {
    bytes::Bytes::from(serde_json::to_vec(msg).expect("control messages are always json-encodable"))
}

pub fn decode(bytes: &[u8]) -> Result<ControlMessage, Error> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use replog_keys::KeyKind;

    #[test]
    fn role_update_round_trips() {
        let msg = ControlMessage::RoleUpdate {
            peer: PublicKey { kind: KeyKind::Ed25519, bytes: [9u8; 32] },
            role: crate::Role::Replicator { factor: 0.5, timestamp: 42 },
        };
        let bytes = encode(&msg);
        let decoded = decode(&bytes).unwrap();
        match decoded {
            ControlMessage::RoleUpdate { role, .. } => {
                assert_eq!(role, crate::Role::Replicator { factor: 0.5, timestamp: 42 });
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn prune_hash_lists_round_trip() {
        let msg = ControlMessage::RequestIPrune { hashes: vec![Hash::of(b"a"), Hash::of(b"b")] };
        let bytes = encode(&msg);
        let decoded = decode(&bytes).unwrap();
        match decoded {
            ControlMessage::RequestIPrune { hashes } => assert_eq!(hashes.len(), 2),
            _ => panic!("wrong variant"),
        }
    }
}
