use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use shared::error::{Error, Result};

use crate::alert::Alert;
use crate::handshake::Handshake;
use crate::record_layer::ContentType;

/// The body of a record, keyed by its content type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    ChangeCipherSpec,
    Alert(Alert),
    Handshake(Handshake),
    ApplicationData(Vec<u8>),
}

impl Content {
    pub fn content_type(&self) -> ContentType {
        match self {
            Content::ChangeCipherSpec => ContentType::ChangeCipherSpec,
            Content::Alert(_) => ContentType::Alert,
            Content::Handshake(_) => ContentType::Handshake,
            Content::ApplicationData(_) => ContentType::ApplicationData,
        }
    }

    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Content::ChangeCipherSpec => writer.write_u8(0x01)?,
            Content::Alert(a) => a.marshal(writer)?,
            Content::Handshake(h) => h.marshal(writer)?,
            Content::ApplicationData(d) => writer.write_all(d)?,
        }
        Ok(())
    }

    pub fn unmarshal<R: Read>(content_type: ContentType, reader: &mut R) -> Result<Self> {
        let content = match content_type {
            ContentType::ChangeCipherSpec => {
                if reader.read_u8()? != 0x01 {
                    return Err(Error::ErrInvalidContentType);
                }
                Content::ChangeCipherSpec
            }
            ContentType::Alert => Content::Alert(Alert::unmarshal(reader)?),
            ContentType::Handshake => Content::Handshake(Handshake::unmarshal(reader)?),
            ContentType::ApplicationData => {
                let mut data = vec![];
                reader.read_to_end(&mut data)?;
                Content::ApplicationData(data)
            }
            ContentType::Invalid => return Err(Error::ErrInvalidContentType),
        };
        Ok(content)
    }
}
