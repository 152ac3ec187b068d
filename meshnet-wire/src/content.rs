use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use meshnet_util::codec::{read_digest_list, read_str, write_digest_list, write_str};
use meshnet_util::Digest;

use crate::error::{WireErrorKind, WireResult};

/// Content byte carried in the fixed header (`content` field, §6.2).
///
/// Determines how `Message::payload` is laid out.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum ContentType {
    Notify = 0,
    Ack = 1,
    Call = 2,
    Cancel = 3,
    Data = 4,
    Publish = 5,
    Subscribe = 6,
    Tunnel = 7,
}

impl ContentType {
    pub fn from_byte(byte: u8) -> WireResult<ContentType> {
        Ok(match byte {
            0 => ContentType::Notify,
            1 => ContentType::Ack,
            2 => ContentType::Call,
            3 => ContentType::Cancel,
            4 => ContentType::Data,
            5 => ContentType::Publish,
            6 => ContentType::Subscribe,
            7 => ContentType::Tunnel,
            other => return Err(WireErrorKind::UnknownContentType { byte: other }.into()),
        })
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Decoded content-specific payload, as laid out in spec §6.2.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    /// `u32 sequence` (0 means unacknowledged) followed by opaque bytes.
    Notify { sequence: u32, payload: Vec<u8> },
    /// Same layout as `Notify`; the sequence being acknowledged.
    Ack { sequence: u32, payload: Vec<u8> },
    /// `digest(32) | u16 tokens`.
    Call { target: Digest, tokens: u16 },
    /// `digest(32)`.
    Cancel { target: Digest },
    /// `digest(32) | bytes`.
    Data { target: Digest, bytes: Vec<u8> },
    /// `utf8 path`.
    Subscribe { path: String },
    /// `utf8 path | digest*`.
    Publish { path: String, digests: Vec<Digest> },
    /// Opaque bytes carrying a nested secure-transport record.
    Tunnel { bytes: Vec<u8> },
}

impl Content {
    pub fn content_type(&self) -> ContentType {
        match self {
            Content::Notify { .. } => ContentType::Notify,
            Content::Ack { .. } => ContentType::Ack,
            Content::Call { .. } => ContentType::Call,
            Content::Cancel { .. } => ContentType::Cancel,
            Content::Data { .. } => ContentType::Data,
            Content::Subscribe { .. } => ContentType::Subscribe,
            Content::Publish { .. } => ContentType::Publish,
            Content::Tunnel { .. } => ContentType::Tunnel,
        }
    }

    pub fn write_bytes<W: Write>(&self, mut writer: W) -> io::Result<()> {
        match self {
            Content::Notify { sequence, payload } | Content::Ack { sequence, payload } => {
                writer.write_u32::<BigEndian>(*sequence)?;
                writer.write_all(payload)
            }
            Content::Call { target, tokens } => {
                writer.write_all(target.as_ref())?;
                writer.write_u16::<BigEndian>(*tokens)
            }
            Content::Cancel { target } => writer.write_all(target.as_ref()),
            Content::Data { target, bytes } => {
                writer.write_all(target.as_ref())?;
                writer.write_all(bytes)
            }
            Content::Subscribe { path } => write_str(writer, path),
            Content::Publish { path, digests } => {
                write_str(&mut writer, path)?;
                write_digest_list(&mut writer, digests)
            }
            Content::Tunnel { bytes } => writer.write_all(bytes),
        }
    }

    pub fn from_bytes(content_type: ContentType, bytes: &[u8]) -> WireResult<Content> {
        let mut reader = bytes;
        Ok(match content_type {
            ContentType::Notify | ContentType::Ack => {
                let sequence = reader
                    .read_u32::<BigEndian>()
                    .map_err(|_| WireErrorKind::Truncated { what: "sequence" })?;
                let mut payload = Vec::new();
                reader.read_to_end(&mut payload)?;
                if content_type == ContentType::Notify {
                    Content::Notify { sequence, payload }
                } else {
                    Content::Ack { sequence, payload }
                }
            }
            ContentType::Call => {
                let target = read_digest(&mut reader)?;
                let tokens = reader
                    .read_u16::<BigEndian>()
                    .map_err(|_| WireErrorKind::Truncated { what: "tokens" })?;
                Content::Call { target, tokens }
            }
            ContentType::Cancel => {
                let target = read_digest(&mut reader)?;
                Content::Cancel { target }
            }
            ContentType::Data => {
                let target = read_digest(&mut reader)?;
                let mut data = Vec::new();
                reader.read_to_end(&mut data)?;
                Content::Data {
                    target,
                    bytes: data,
                }
            }
            ContentType::Subscribe => {
                let path = read_str(&mut reader)?;
                Content::Subscribe { path }
            }
            ContentType::Publish => {
                let path = read_str(&mut reader)?;
                let digests = read_digest_list(&mut reader)?;
                Content::Publish { path, digests }
            }
            ContentType::Tunnel => {
                let mut data = Vec::new();
                reader.read_to_end(&mut data)?;
                Content::Tunnel { bytes: data }
            }
        })
    }
}

fn read_digest(reader: &mut &[u8]) -> WireResult<Digest> {
    let mut buf = [0u8; meshnet_util::DIGEST_LEN];
    reader
        .read_exact(&mut buf)
        .map_err(|_| WireErrorKind::Truncated { what: "digest" })?;
    Ok(Digest::from_array(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_call_round_trip() {
        let content = Content::Call {
            target: Digest::from_bytes(b"block"),
            tokens: 3,
        };
        let mut buf = Vec::new();
        content.write_bytes(&mut buf).unwrap();
        let decoded = Content::from_bytes(ContentType::Call, &buf).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn positive_publish_with_zero_digests() {
        let content = Content::Publish {
            path: "/share/file1".to_owned(),
            digests: vec![],
        };
        let mut buf = Vec::new();
        content.write_bytes(&mut buf).unwrap();
        let decoded = Content::from_bytes(ContentType::Publish, &buf).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn positive_notify_round_trip_with_sequence() {
        let content = Content::Notify {
            sequence: 42,
            payload: b"hi".to_vec(),
        };
        let mut buf = Vec::new();
        content.write_bytes(&mut buf).unwrap();
        let decoded = Content::from_bytes(ContentType::Notify, &buf).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn negative_truncated_call_payload() {
        let err = Content::from_bytes(ContentType::Call, &[0u8; 10]);
        assert!(err.is_err());
    }
}
