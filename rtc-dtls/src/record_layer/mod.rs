#[cfg(test)]
mod record_layer_test;

use std::fmt;
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use shared::error::{Error, Result};

use crate::content::Content;

pub const RECORD_LAYER_HEADER_SIZE: usize = 13;
pub const MAX_SEQUENCE_NUMBER: u64 = 0x0000_FFFF_FFFF_FFFF;

pub const PROTOCOL_VERSION1_0: ProtocolVersion = ProtocolVersion {
    major: 0xfe,
    minor: 0xff,
};
pub const PROTOCOL_VERSION1_2: ProtocolVersion = ProtocolVersion {
    major: 0xfe,
    minor: 0xfd,
};

/// https://tools.ietf.org/html/rfc4346#section-6.2.1
#[derive(Default, Copy, Clone, PartialEq, Eq, Debug)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
    #[default]
    Invalid,
}

impl From<u8> for ContentType {
    fn from(val: u8) -> Self {
        match val {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Invalid,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ContentType::ChangeCipherSpec => "ChangeCipherSpec",
            ContentType::Alert => "Alert",
            ContentType::Handshake => "Handshake",
            ContentType::ApplicationData => "ApplicationData",
            ContentType::Invalid => "Invalid",
        };
        write!(f, "{s}")
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

/// The DTLS record header: type, version, epoch, 48-bit sequence number
/// and the length of the record body.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct RecordLayerHeader {
    pub content_type: ContentType,
    pub protocol_version: ProtocolVersion,
    pub epoch: u16,
    pub sequence_number: u64, // uint48 on the wire
    pub content_len: u16,
}

impl RecordLayerHeader {
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        if self.sequence_number > MAX_SEQUENCE_NUMBER {
            return Err(Error::ErrSequenceNumberOverflow);
        }

        writer.write_u8(self.content_type as u8)?;
        writer.write_u8(self.protocol_version.major)?;
        writer.write_u8(self.protocol_version.minor)?;
        writer.write_u16::<BigEndian>(self.epoch)?;
        writer.write_u48::<BigEndian>(self.sequence_number)?;
        writer.write_u16::<BigEndian>(self.content_len)?;

        Ok(())
    }

    pub fn unmarshal<R: Read>(reader: &mut R) -> Result<Self> {
        let content_type = reader.read_u8()?.into();
        if content_type == ContentType::Invalid {
            return Err(Error::ErrInvalidContentType);
        }

        let major = reader.read_u8()?;
        let minor = reader.read_u8()?;
        let epoch = reader.read_u16::<BigEndian>()?;
        let sequence_number = reader.read_u48::<BigEndian>()?;

        // DTLS 1.0 record versions show up on a first ClientHello
        let protocol_version = ProtocolVersion { major, minor };
        if protocol_version != PROTOCOL_VERSION1_0 && protocol_version != PROTOCOL_VERSION1_2 {
            return Err(Error::ErrUnsupportedProtocolVersion);
        }
        let content_len = reader.read_u16::<BigEndian>()?;

        Ok(RecordLayerHeader {
            content_type,
            protocol_version,
            epoch,
            sequence_number,
            content_len,
        })
    }
}

/// Note that as with TLS, multiple handshake messages may be placed in
/// the same DTLS record, provided that there is room and that they are
/// part of the same flight.  Thus, there are two acceptable ways to pack
/// two DTLS messages into the same datagram: in the same record or in
/// separate records.
/// https://tools.ietf.org/html/rfc6347#section-4.2.3
pub fn unpack_datagram(buf: &[u8]) -> Result<Vec<&[u8]>> {
    let mut out = vec![];

    let mut offset = 0;
    while buf.len() != offset {
        if buf.len() - offset <= RECORD_LAYER_HEADER_SIZE {
            return Err(Error::ErrBufferTooShort);
        }

        let pkt_len = RECORD_LAYER_HEADER_SIZE
            + ((buf[offset + RECORD_LAYER_HEADER_SIZE - 2] as usize) << 8
                | buf[offset + RECORD_LAYER_HEADER_SIZE - 1] as usize);
        if offset + pkt_len > buf.len() {
            return Err(Error::ErrLengthMismatch);
        }

        out.push(&buf[offset..offset + pkt_len]);
        offset += pkt_len;
    }

    Ok(out)
}

/// Packs whole records into datagrams no larger than `maximum_transmission_unit`
/// where possible. A single record bigger than the MTU gets its own datagram.
pub(crate) fn compact_raw_packets(
    raw_packets: &[Vec<u8>],
    maximum_transmission_unit: usize,
) -> Vec<bytes::BytesMut> {
    let mut combined_raw_packets = vec![];
    let mut current_combined_raw_packet = bytes::BytesMut::new();

    for raw_packet in raw_packets {
        if !current_combined_raw_packet.is_empty()
            && current_combined_raw_packet.len() + raw_packet.len() > maximum_transmission_unit
        {
            combined_raw_packets.push(current_combined_raw_packet);
            current_combined_raw_packet = bytes::BytesMut::new();
        }
        current_combined_raw_packet.extend_from_slice(raw_packet);
    }

    if !current_combined_raw_packet.is_empty() {
        combined_raw_packets.push(current_combined_raw_packet);
    }

    combined_raw_packets
}

/// A plaintext record: header and content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordLayer {
    pub record_layer_header: RecordLayerHeader,
    pub content: Content,
}

impl RecordLayer {
    pub fn new(epoch: u16, content: Content) -> Self {
        RecordLayer {
            record_layer_header: RecordLayerHeader {
                content_type: content.content_type(),
                protocol_version: PROTOCOL_VERSION1_2,
                epoch,
                sequence_number: 0,
                content_len: 0,
            },
            content,
        }
    }

    /// Writes the header with the real content length, then the content.
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut body = vec![];
        self.content.marshal(&mut body)?;

        let header = RecordLayerHeader {
            content_len: body.len() as u16,
            ..self.record_layer_header
        };
        header.marshal(writer)?;
        writer.write_all(&body)?;
        Ok(())
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        let mut reader = raw;
        let record_layer_header = RecordLayerHeader::unmarshal(&mut reader)?;
        if reader.len() != record_layer_header.content_len as usize {
            return Err(Error::ErrLengthMismatch);
        }
        let content = Content::unmarshal(record_layer_header.content_type, &mut reader)?;

        Ok(RecordLayer {
            record_layer_header,
            content,
        })
    }
}
