use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use meshnet_util::{Identifier, MAX_HOPS};

use crate::content::{Content, ContentType};
use crate::error::{WireErrorKind, WireResult};

/// Dispatch discipline for a message, carried in the header's `type` byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageType {
    /// Deliver to a single next hop taken from the route table.
    Forward = 0,
    /// Flood to every neighbor except the one the message arrived from.
    Broadcast = 1,
    /// Route-discovery probe; neighbors reply so the sender learns a route.
    Lookup = 2,
    /// Carries an opaque datagram for a peer that has no direct transport.
    Tunnel = 3,
}

impl MessageType {
    fn from_byte(byte: u8) -> WireResult<MessageType> {
        Ok(match byte {
            0 => MessageType::Forward,
            1 => MessageType::Broadcast,
            2 => MessageType::Lookup,
            3 => MessageType::Tunnel,
            other => return Err(WireErrorKind::UnknownMessageType { byte: other }.into()),
        })
    }

    fn as_byte(self) -> u8 {
        self as u8
    }
}

/// An overlay message: the fixed header of §6.2 plus its decoded content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub version: u8,
    pub flags: u8,
    pub msg_type: MessageType,
    pub hops: u8,
    pub source: Identifier,
    pub destination: Identifier,
    pub content: Content,
}

const WIRE_VERSION: u8 = 1;

impl Message {
    pub fn new(
        msg_type: MessageType,
        source: Identifier,
        destination: Identifier,
        content: Content,
    ) -> Message {
        Message {
            version: WIRE_VERSION,
            flags: 0,
            msg_type,
            hops: 0,
            source,
            destination,
            content,
        }
    }

    /// True once `hops` has reached the point where the message must be
    /// dropped instead of forwarded further (spec §6: loop prevention).
    pub fn is_expired(&self) -> bool {
        self.hops > MAX_HOPS
    }

    /// Returns a copy of this message with `hops` incremented by one, as
    /// done by every peer that forwards it onward.
    pub fn with_incremented_hops(&self) -> Message {
        let mut next = self.clone();
        next.hops = next.hops.saturating_add(1);
        next
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> WireResult<()> {
        let mut payload = Vec::new();
        self.content.write_bytes(&mut payload)?;
        if payload.len() > u16::MAX as usize {
            return Err(WireErrorKind::PayloadTooLarge { len: payload.len() }.into());
        }

        writer.write_u8(self.version)?;
        writer.write_u8(self.flags)?;
        writer.write_u8(self.msg_type.as_byte())?;
        writer.write_u8(self.content.content_type().as_byte())?;
        writer.write_u8(self.hops)?;
        writer.write_u16::<BigEndian>(payload.len() as u16)?;
        writer.write_all(self.source.as_ref())?;
        writer.write_all(self.destination.as_ref())?;
        writer.write_all(&payload)?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut reader: R) -> WireResult<Message> {
        let version = reader.read_u8()?;
        let flags = reader.read_u8()?;
        let msg_type = MessageType::from_byte(reader.read_u8()?)?;
        let content_type = ContentType::from_byte(reader.read_u8()?)?;
        let hops = reader.read_u8()?;
        let size = reader.read_u16::<BigEndian>()? as usize;

        let mut source_buf = [0u8; meshnet_util::IDENTIFIER_LEN];
        reader.read_exact(&mut source_buf)?;
        let source = Identifier::from_array(source_buf);

        let mut destination_buf = [0u8; meshnet_util::IDENTIFIER_LEN];
        reader.read_exact(&mut destination_buf)?;
        let destination = Identifier::from_array(destination_buf);

        let mut payload = vec![0u8; size];
        reader.read_exact(&mut payload)?;
        let content = Content::from_bytes(content_type, &payload)?;

        Ok(Message {
            version,
            flags,
            msg_type,
            hops,
            source,
            destination,
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshnet_util::Digest;

    fn ids() -> (Identifier, Identifier) {
        let mut alice = [0u8; meshnet_util::IDENTIFIER_LEN];
        alice[0] = 1;
        let mut bob = [0u8; meshnet_util::IDENTIFIER_LEN];
        bob[0] = 2;
        (Identifier::from_array(alice), Identifier::from_array(bob))
    }

    #[test]
    fn positive_forward_round_trip() {
        let (source, destination) = ids();
        let msg = Message::new(
            MessageType::Forward,
            source,
            destination,
            Content::Subscribe {
                path: "/a/b".to_owned(),
            },
        );
        let mut buf = Vec::new();
        msg.write_to(&mut buf).unwrap();
        let decoded = Message::read_from(&buf[..]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn positive_hops_increment() {
        let (source, destination) = ids();
        let msg = Message::new(
            MessageType::Broadcast,
            source,
            destination,
            Content::Cancel {
                target: Digest::from_bytes(b"x"),
            },
        );
        let next = msg.with_incremented_hops();
        assert_eq!(next.hops, 1);
        assert!(!next.is_expired());
    }

    #[test]
    fn positive_message_expires_past_max_hops() {
        let (source, destination) = ids();
        let mut msg = Message::new(
            MessageType::Broadcast,
            source,
            destination,
            Content::Cancel {
                target: Digest::from_bytes(b"x"),
            },
        );
        msg.hops = MAX_HOPS + 1;
        assert!(msg.is_expired());
    }

    #[test]
    fn negative_unknown_message_type_byte() {
        let mut buf = Vec::new();
        buf.push(1); // version
        buf.push(0); // flags
        buf.push(99); // invalid type
        buf.push(ContentType::Cancel.as_byte());
        buf.push(0); // hops
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&[0u8; meshnet_util::IDENTIFIER_LEN]);
        buf.extend_from_slice(&[0u8; meshnet_util::IDENTIFIER_LEN]);
        assert!(Message::read_from(&buf[..]).is_err());
    }
}
