use crate::{Entry, Sealed};
use bytes::BytesMut;
use replog_proto::codec::{put_bytes, put_u64, put_vec};

/// `id_meta‖clock‖payload‖next_refs‖ref_hashes`, hash and signatures
/// excluded entirely (equivalent to zeroing them, simpler to reason about).
pub fn canonical_bytes(entry: &Entry) -> Vec<u8> {
    let mut out = BytesMut::new();

    // id_meta: creator key kind + bytes, gid, min_replicas.
    out.extend_from_slice(&[match entry.clock.id.kind {
        replog_keys::KeyKind::Ed25519 => 0u8,
        replog_keys::KeyKind::X25519 => 1u8,
    }]);
    out.extend_from_slice(&entry.clock.id.bytes);
    put_bytes(&mut out, entry.gid.as_bytes());
    out.extend_from_slice(&entry.min_replicas.to_le_bytes());

    // clock
    put_u64(&mut out, entry.clock.time);

    // payload, maybe encrypted
    match &entry.payload {
        Sealed::Plain(bytes) => {
            out.extend_from_slice(&[0u8]);
            put_bytes(&mut out, bytes);
        }
        Sealed::Boxed {
            recipient,
            ciphertext,
        } => {
            out.extend_from_slice(&[1u8]);
            out.extend_from_slice(&recipient.bytes);
            put_bytes(&mut out, ciphertext);
        }
    }

    // next_refs
    put_vec(&mut out, &entry.next, |o, h| o.extend_from_slice(h.as_bytes()));
    // ref_hashes
    put_vec(&mut out, &entry.refs, |o, h| o.extend_from_slice(h.as_bytes()));

    out.to_vec()
}
