use replog_keys::PublicKey;

/// A field that is either plaintext or X25519-box-encrypted for a single
/// recipient. Only the payload field uses this in this crate's model —
/// see `DESIGN.md` for why identity/clock stay in the clear.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Sealed {
    Plain(Vec<u8>),
    Boxed {
        recipient: PublicKey,
        ciphertext: Vec<u8>,
    },
}

impl Sealed {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Sealed::Boxed { .. })
    }
}
