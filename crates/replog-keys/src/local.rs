use crate::{signature_from_bytes, signing_key_public, Error, KeyKind, Keystore, PublicKey, Result};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use dashmap::DashMap;
use ed25519_dalek::{Signer, SigningKey, Verifier};
use x25519_dalek::{PublicKey as XPublicKey, StaticSecret};

enum KeyMaterial {
    Ed25519(SigningKey),
    X25519(StaticSecret),
}

/// In-memory keystore. Not a hardware-backed or disk-persisted
/// implementation — the collaborator contract in §6 allows either; this
/// one exists so the rest of the workspace has something real to sign and
/// verify against in tests.
#[derive(Default)]
pub struct LocalKeystore {
    keys: DashMap<String, KeyMaterial>,
}

impl LocalKeystore {
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
        }
    }
}

impl Keystore for LocalKeystore {
    fn sign(&self, key_id: &str, bytes: &[u8]) -> Result<Vec<u8>> {
        match self.keys.get(key_id).as_deref() {
            Some(KeyMaterial::Ed25519(sk)) => Ok(sk.sign(bytes).to_bytes().to_vec()),
            Some(KeyMaterial::X25519(_)) => Err(Error::Malformed("cannot sign with an x25519 key")),
            None => Err(Error::UnknownKey(key_id.to_string())),
        }
    }

    fn verify(&self, sig: &[u8], key: &PublicKey, bytes: &[u8]) -> Result<bool> {
        if key.kind != KeyKind::Ed25519 {
            return Err(Error::Malformed("verify requires an ed25519 public key"));
        }
        let verifying_key = key.as_verifying_key()?;
        let signature = signature_from_bytes(sig)?;
        Ok(verifying_key.verify(bytes, &signature).is_ok())
    }

    fn create_key(&self, id: &str, kind: KeyKind) -> Result<PublicKey> {
        match kind {
            KeyKind::Ed25519 => {
                let sk = SigningKey::generate(&mut rand::rngs::OsRng);
                let public = signing_key_public(&sk);
                self.keys.insert(id.to_string(), KeyMaterial::Ed25519(sk));
                Ok(public)
            }
            KeyKind::X25519 => {
                let sk = StaticSecret::random_from_rng(rand::rngs::OsRng);
                let public = PublicKey {
                    kind: KeyKind::X25519,
                    bytes: XPublicKey::from(&sk).to_bytes(),
                };
                self.keys.insert(id.to_string(), KeyMaterial::X25519(sk));
                Ok(public)
            }
        }
    }

    fn public_key(&self, id: &str) -> Result<PublicKey> {
        match self.keys.get(id).as_deref() {
            Some(KeyMaterial::Ed25519(sk)) => Ok(signing_key_public(sk)),
            Some(KeyMaterial::X25519(sk)) => Ok(PublicKey {
                kind: KeyKind::X25519,
                bytes: XPublicKey::from(sk).to_bytes(),
            }),
            None => Err(Error::UnknownKey(id.to_string())),
        }
    }

    fn box_encrypt(&self, sender_id: &str, recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
        let shared = match self.keys.get(sender_id).as_deref() {
            Some(KeyMaterial::X25519(sk)) => sk.diffie_hellman(&recipient.as_x25519()),
            Some(KeyMaterial::Ed25519(_)) => {
                return Err(Error::Malformed("box_encrypt requires an x25519 sender key"))
            }
            None => return Err(Error::UnknownKey(sender_id.to_string())),
        };
        let cipher = ChaCha20Poly1305::new_from_slice(shared.as_bytes())
            .map_err(|_| Error::EncryptionFailed)?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| Error::EncryptionFailed)?;
        let mut out = Vec::with_capacity(12 + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn box_decrypt(&self, recipient_id: &str, sender: &PublicKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < 12 {
            return Err(Error::DecryptionFailed);
        }
        let (nonce_bytes, sealed) = ciphertext.split_at(12);
        let shared = match self.keys.get(recipient_id).as_deref() {
            Some(KeyMaterial::X25519(sk)) => sk.diffie_hellman(&sender.as_x25519()),
            Some(KeyMaterial::Ed25519(_)) => {
                return Err(Error::Malformed("box_decrypt requires an x25519 recipient key"))
            }
            None => return Err(Error::UnknownKey(recipient_id.to_string())),
        };
        let cipher = ChaCha20Poly1305::new_from_slice(shared.as_bytes())
            .map_err(|_| Error::DecryptionFailed)?;
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, sealed)
            .map_err(|_| Error::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trips() {
        let ks = LocalKeystore::new();
        let pk = ks.create_key("alice", KeyKind::Ed25519).unwrap();
        let sig = ks.sign("alice", b"hello").unwrap();
        assert!(ks.verify(&sig, &pk, b"hello").unwrap());
        assert!(!ks.verify(&sig, &pk, b"goodbye").unwrap());
    }

    #[test]
    fn box_encrypt_round_trips() {
        let ks = LocalKeystore::new();
        let alice_pk = ks.create_key("alice", KeyKind::X25519).unwrap();
        let bob_pk = ks.create_key("bob", KeyKind::X25519).unwrap();

        let ciphertext = ks.box_encrypt("alice", &bob_pk, b"secret payload").unwrap();
        let plaintext = ks.box_decrypt("bob", &alice_pk, &ciphertext).unwrap();
        assert_eq!(plaintext, b"secret payload");
    }

    #[test]
    fn unknown_key_errors() {
        let ks = LocalKeystore::new();
        assert!(matches!(ks.sign("nope", b"x"), Err(Error::UnknownKey(_))));
    }
}
