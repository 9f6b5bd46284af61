use crate::codec::{get_bytes, get_option, get_u64, get_vec, put_bytes, put_option, put_u64, put_vec};
use crate::{Decode, Encode, Result};
use bytes::{Bytes, BytesMut};

/// Header carried by every transport message. Signatures cover only this
/// header's `id`/`timestamp`/`expires`/`origin` fields (excluding `to` and
/// `signatures` themselves) and deliberately not the message body, so a
/// relay can mutate body fields that change hop-by-hop (a `Seek`'s `ttl`,
/// an `Ack`'s `seen_counter`) without invalidating the sender's signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub id: [u8; 32],
    pub timestamp: u64,
    pub expires: u64,
    pub origin: Option<Vec<u8>>,
    pub to: Vec<String>,
    pub signatures: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Header {
    pub fn new(id: [u8; 32], timestamp: u64, expires: u64) -> Self {
        Header {
            id,
            timestamp,
            expires,
            origin: None,
            to: Vec::new(),
            signatures: Vec::new(),
        }
    }

    /// Bytes the signature covers: everything except `to` and `signatures`.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut out = BytesMut::new();
        out.extend_from_slice(&self.id);
        put_u64(&mut out, self.timestamp);
        put_u64(&mut out, self.expires);
        put_option(&mut out, &self.origin, |o, v| put_bytes(o, v));
        out.to_vec()
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires
    }
}

impl Encode for Header {
    fn encode(&self, out: &mut BytesMut) {
        out.extend_from_slice(&self.id);
        put_u64(out, self.timestamp);
        put_u64(out, self.expires);
        put_option(out, &self.origin, |o, v| put_bytes(o, v));
        put_vec(out, &self.to, |o, s| put_bytes(o, s.as_bytes()));
        put_vec(out, &self.signatures, |o, (k, s)| {
            put_bytes(o, k);
            put_bytes(o, s);
        });
    }
}

impl Decode for Header {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        use crate::Error;
        if buf.len() < 32 {
            return Err(Error::Underrun { field: "header.id" });
        }
        let mut id = [0u8; 32];
        id.copy_from_slice(&buf.split_to(32));
        let timestamp = get_u64(buf, "header.timestamp")?;
        let expires = get_u64(buf, "header.expires")?;
        let origin = get_option(buf, "header.origin", |b| Ok(get_bytes(b, "header.origin")?.to_vec()))?;
        let to = get_vec(buf, "header.to", |b| {
            let bytes = get_bytes(b, "header.to[]")?;
            String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidUtf8 { field: "header.to[]" })
        })?;
        let signatures = get_vec(buf, "header.signatures", |b| {
            let key = get_bytes(b, "header.signatures[].key")?.to_vec();
            let sig = get_bytes(b, "header.signatures[].sig")?.to_vec();
            Ok((key, sig))
        })?;
        Ok(Header {
            id,
            timestamp,
            expires,
            origin,
            to,
            signatures,
        })
    }
}
