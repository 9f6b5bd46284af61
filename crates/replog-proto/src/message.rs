use crate::codec::{get_bytes, get_vec, put_bytes, put_vec};
use crate::header::Header;
use crate::{Decode, Encode, Error, Result};
use bytes::{Buf, Bytes, BytesMut};

/// Tag byte `0=Silent, 1=Acknowledged, 2=Seek`, followed by a redundancy count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    Silent { redundancy: u8 },
    Acknowledged { redundancy: u8 },
    Seek { redundancy: u8, ttl: u8 },
}

impl DeliveryMode {
    pub fn redundancy(&self) -> u8 {
        match self {
            DeliveryMode::Silent { redundancy }
            | DeliveryMode::Acknowledged { redundancy }
            | DeliveryMode::Seek { redundancy, .. } => *redundancy,
        }
    }

    pub fn expects_ack(&self) -> bool {
        !matches!(self, DeliveryMode::Silent { .. })
    }
}

impl Encode for DeliveryMode {
    fn encode(&self, out: &mut BytesMut) {
        match self {
            DeliveryMode::Silent { redundancy } => {
                out.extend_from_slice(&[0, *redundancy]);
            }
            DeliveryMode::Acknowledged { redundancy } => {
                out.extend_from_slice(&[1, *redundancy]);
            }
            DeliveryMode::Seek { redundancy, ttl } => {
                out.extend_from_slice(&[2, *redundancy, *ttl]);
            }
        }
    }
}

impl Decode for DeliveryMode {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        if buf.remaining() < 1 {
            return Err(Error::Underrun {
                field: "delivery_mode.tag",
            });
        }
        match buf.get_u8() {
            0 => {
                let redundancy = get_u8(buf, "delivery_mode.redundancy")?;
                Ok(DeliveryMode::Silent { redundancy })
            }
            1 => {
                let redundancy = get_u8(buf, "delivery_mode.redundancy")?;
                Ok(DeliveryMode::Acknowledged { redundancy })
            }
            2 => {
                let redundancy = get_u8(buf, "delivery_mode.redundancy")?;
                let ttl = get_u8(buf, "delivery_mode.ttl")?;
                Ok(DeliveryMode::Seek { redundancy, ttl })
            }
            tag => Err(Error::InvalidTag {
                tag,
                what: "delivery_mode",
            }),
        }
    }
}

fn get_u8(buf: &mut Bytes, field: &'static str) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(Error::Underrun { field });
    }
    Ok(buf.get_u8())
}

/// Tagged union of the transport's message kinds. `Entry` bytes are opaque
/// here (the `replog-entry` crate owns entry encoding); this crate only
/// needs to frame them for transit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageBody {
    Data {
        delivery: DeliveryMode,
        payloads: Vec<Bytes>,
    },
    Ack {
        acked_id: [u8; 32],
        seen_counter: u32,
    },
    Hello {
        topics: Vec<String>,
    },
    Goodbye {
        topics: Vec<String>,
    },
}

impl MessageBody {
    pub fn discriminant(&self) -> u8 {
        match self {
            MessageBody::Data { .. } => 0,
            MessageBody::Ack { .. } => 1,
            MessageBody::Hello { .. } => 2,
            MessageBody::Goodbye { .. } => 3,
        }
    }
}

impl Encode for MessageBody {
    fn encode(&self, out: &mut BytesMut) {
        out.extend_from_slice(&[self.discriminant()]);
        match self {
            MessageBody::Data { delivery, payloads } => {
                delivery.encode(out);
                put_vec(out, payloads, |o, p| put_bytes(o, p));
            }
            MessageBody::Ack {
                acked_id,
                seen_counter,
            } => {
                out.extend_from_slice(acked_id);
                out.extend_from_slice(&seen_counter.to_le_bytes());
            }
            MessageBody::Hello { topics } | MessageBody::Goodbye { topics } => {
                put_vec(out, topics, |o, t| put_bytes(o, t.as_bytes()));
            }
        }
    }
}

impl Decode for MessageBody {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        if buf.remaining() < 1 {
            return Err(Error::Underrun { field: "body.tag" });
        }
        match buf.get_u8() {
            0 => {
                let delivery = DeliveryMode::decode(buf)?;
                let payloads = get_vec(buf, "body.data.payloads", |b| get_bytes(b, "payload"))?;
                Ok(MessageBody::Data { delivery, payloads })
            }
            1 => {
                if buf.remaining() < 36 {
                    return Err(Error::Underrun {
                        field: "body.ack",
                    });
                }
                let mut acked_id = [0u8; 32];
                acked_id.copy_from_slice(&buf.split_to(32));
                let seen_counter = buf.get_u32_le();
                Ok(MessageBody::Ack {
                    acked_id,
                    seen_counter,
                })
            }
            2 => {
                let topics = get_vec(buf, "body.hello.topics", |b| {
                    let bytes = get_bytes(b, "topic")?;
                    String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidUtf8 { field: "topic" })
                })?;
                Ok(MessageBody::Hello { topics })
            }
            3 => {
                let topics = get_vec(buf, "body.goodbye.topics", |b| {
                    let bytes = get_bytes(b, "topic")?;
                    String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidUtf8 { field: "topic" })
                })?;
                Ok(MessageBody::Goodbye { topics })
            }
            tag => Err(Error::InvalidTag {
                tag,
                what: "message_body",
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub body: MessageBody,
}

impl Message {
    /// The id used for deduplication: SHA-256 of a one-byte discriminator
    /// plus the header's 32-byte random id.
    pub fn dedup_id(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update([self.body.discriminant()]);
        hasher.update(self.header.id);
        hasher.finalize().into()
    }
}

impl Encode for Message {
    fn encode(&self, out: &mut BytesMut) {
        self.header.encode(out);
        self.body.encode(out);
    }
}

impl Decode for Message {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        let header = Header::decode(buf)?;
        let body = MessageBody::decode(buf)?;
        Ok(Message { header, body })
    }
}

pub fn encode_message(msg: &Message) -> Bytes {
    let mut out = BytesMut::new();
    msg.encode(&mut out);
    out.freeze()
}

pub fn decode_message(mut bytes: Bytes) -> Result<Message> {
    let msg = Message::decode(&mut bytes)?;
    if bytes.has_remaining() {
        return Err(Error::TrailingBytes);
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            id: [7u8; 32],
            timestamp: 1000,
            expires: 2000,
            origin: Some(vec![1, 2, 3]),
            to: vec!["peerA".into(), "peerB".into()],
            signatures: vec![(vec![9, 9], vec![8, 8, 8])],
        }
    }

    #[test]
    fn header_round_trips() {
        let header = sample_header();
        let mut out = BytesMut::new();
        header.encode(&mut out);
        let mut bytes = out.freeze();
        let decoded = Header::decode(&mut bytes).unwrap();
        assert_eq!(header, decoded);
        assert!(!bytes.has_remaining());
    }

    #[test]
    fn data_message_round_trips() {
        let msg = Message {
            header: sample_header(),
            body: MessageBody::Data {
                delivery: DeliveryMode::Seek {
                    redundancy: 3,
                    ttl: 5,
                },
                payloads: vec![Bytes::from_static(b"hello"), Bytes::from_static(b"world")],
            },
        };
        let bytes = encode_message(&msg);
        let decoded = decode_message(bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn ack_message_round_trips() {
        let msg = Message {
            header: sample_header(),
            body: MessageBody::Ack {
                acked_id: [3u8; 32],
                seen_counter: 42,
            },
        };
        let bytes = encode_message(&msg);
        let decoded = decode_message(bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let msg = Message {
            header: sample_header(),
            body: MessageBody::Goodbye {
                topics: vec!["t".into()],
            },
        };
        let mut bytes = encode_message(&msg).to_vec();
        bytes.push(0xff);
        assert!(matches!(
            decode_message(Bytes::from(bytes)),
            Err(Error::TrailingBytes)
        ));
    }
}
