//! Keystore collaborator (§6): `sign`/`verify`/`create_key`, Ed25519 for
//! identity and signatures, X25519 for box encryption of payload/identity/
//! clock fields. This crate is not mandated by the substrate's spec, which
//! treats the keystore as an external collaborator — it exists so the rest
//! of the workspace has a concrete, testable default to build against.

mod local;

pub use local::LocalKeystore;

use ed25519_dalek::{Signature, SigningKey, VerifyingKey};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown key id {0}")]
    UnknownKey(String),
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("malformed key material: {0}")]
    Malformed(&'static str),
    #[error("box encryption failed")]
    EncryptionFailed,
    #[error("box decryption failed")]
    DecryptionFailed,
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum KeyKind {
    Ed25519,
    X25519,
}

/// A key's public material, as exchanged over the wire. Ed25519 and X25519
/// public keys are both 32 bytes; `kind` disambiguates interpretation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PublicKey {
    pub kind: KeyKind,
    #[serde(with = "serde_bytes_array")]
    pub bytes: [u8; 32],
}

/// `[u8; 32]` has no built-in serde impl; serialize it as a byte sequence
/// rather than pulling in a whole crate for one array size.
mod serde_bytes_array {
    pub fn serialize<S: serde::Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&bytes[..], serializer)
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let vec: Vec<u8> = serde::Deserialize::deserialize(deserializer)?;
        vec.try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::invalid_length(v.len(), &"32 bytes"))
    }
}

impl PublicKey {
    pub fn as_verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.bytes).map_err(|_| Error::Malformed("ed25519 public key"))
    }

    pub fn as_x25519(&self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(self.bytes)
    }
}

/// Trait contract for §6's keystore collaborator.
pub trait Keystore: Send + Sync {
    fn sign(&self, key_id: &str, bytes: &[u8]) -> Result<Vec<u8>>;
    fn verify(&self, sig: &[u8], key: &PublicKey, bytes: &[u8]) -> Result<bool>;
    fn create_key(&self, id: &str, kind: KeyKind) -> Result<PublicKey>;
    fn public_key(&self, id: &str) -> Result<PublicKey>;

    /// X25519 box-encrypt `plaintext` for `recipient`, using this keystore's
    /// identity key as the sender's box key. Ciphertext is
    /// `nonce(12) || sealed`.
    fn box_encrypt(&self, sender_id: &str, recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>>;
    fn box_decrypt(&self, recipient_id: &str, sender: &PublicKey, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

pub(crate) fn signature_from_bytes(bytes: &[u8]) -> Result<Signature> {
    let arr: [u8; 64] = bytes
        .try_into()
        .map_err(|_| Error::Malformed("ed25519 signature"))?;
    Ok(Signature::from_bytes(&arr))
}

pub(crate) fn signing_key_public(key: &SigningKey) -> PublicKey {
    PublicKey {
        kind: KeyKind::Ed25519,
        bytes: key.verifying_key().to_bytes(),
    }
}
