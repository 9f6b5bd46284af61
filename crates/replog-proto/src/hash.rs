use sha2::{Digest, Sha256};
use std::fmt;

/// Multihash-flavored content hash: a one-byte code (`0x12` = sha2-256),
/// a one-byte digest length, then the digest itself. Keeping the multihash
/// envelope (rather than a bare digest) lets a block store key bytes by
/// this type without caring which hash function produced them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 34]);

// `serde`'s built-in array impls stop at 32 elements, short of our 34-byte
// multihash envelope, so this is serialized as a byte sequence by hand.
impl serde::Serialize for Hash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Hash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: Vec<u8> = serde::Deserialize::deserialize(deserializer)?;
        let arr: [u8; 34] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::invalid_length(v.len(), &"34 bytes"))?;
        Ok(Hash(arr))
    }
}

const SHA2_256_CODE: u8 = 0x12;
const DIGEST_LEN: u8 = 32;

impl Hash {
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut buf = [0u8; 34];
        buf[0] = SHA2_256_CODE;
        buf[1] = DIGEST_LEN;
        buf[2..].copy_from_slice(&digest);
        Hash(buf)
    }

    pub fn from_bytes(bytes: [u8; 34]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 34] {
        &self.0
    }

    pub fn digest(&self) -> &[u8] {
        &self.0[2..]
    }

    /// Deterministic map to a point on the unit circle `[0, 1)`, used by
    /// the replication ring to place peers and by leader selection to
    /// probe a gid's point.
    pub fn to_unit_interval(&self) -> f64 {
        let mut acc = [0u8; 8];
        acc.copy_from_slice(&self.0[2..10]);
        let n = u64::from_be_bytes(acc);
        (n as f64) / (u64::MAX as f64 + 1.0)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.digest()))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.digest()))
    }
}

/// Map an arbitrary string (e.g. a gid) to the unit interval the same way
/// a public key's hash is mapped, so leader selection and ring placement
/// use one consistent hash-to-uniform scheme.
pub fn str_to_unit_interval(s: &str) -> f64 {
    Hash::of(s.as_bytes()).to_unit_interval()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable() {
        let a = Hash::of(b"hello");
        let b = Hash::of(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, Hash::of(b"world"));
    }

    #[test]
    fn unit_interval_in_range() {
        for input in ["a", "b", "gid-1", "gid-2", ""] {
            let u = str_to_unit_interval(input);
            assert!((0.0..1.0).contains(&u), "{input} -> {u}");
        }
    }
}
