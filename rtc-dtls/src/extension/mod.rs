
pub mod extension_use_srtp;

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use shared::error::{Error, Result};

use crate::curve::NamedCurve;
use crate::signature_hash_algorithm::SignatureHashAlgorithm;
use extension_use_srtp::ExtensionUseSrtp;

pub const ELLIPTIC_CURVE_POINT_FORMAT_UNCOMPRESSED: u8 = 0;

/// https://www.iana.org/assignments/tls-extensiontype-values/tls-extensiontype-values.xhtml
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExtensionValue {
    SupportedEllipticCurves = 10,
    SupportedPointFormats = 11,
    SupportedSignatureAlgorithms = 13,
    UseSrtp = 14,
    UseExtendedMasterSecret = 23,
    RenegotiationInfo = 0xff01,
    Unsupported,
}

impl From<u16> for ExtensionValue {
    fn from(val: u16) -> Self {
        match val {
            10 => ExtensionValue::SupportedEllipticCurves,
            11 => ExtensionValue::SupportedPointFormats,
            13 => ExtensionValue::SupportedSignatureAlgorithms,
            14 => ExtensionValue::UseSrtp,
            23 => ExtensionValue::UseExtendedMasterSecret,
            0xff01 => ExtensionValue::RenegotiationInfo,
            _ => ExtensionValue::Unsupported,
        }
    }
}

/// Hello extensions this endpoint understands. Anything else a peer sends
/// is skipped while parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extension {
    SupportedEllipticCurves(Vec<NamedCurve>),
    SupportedPointFormats(Vec<u8>),
    SupportedSignatureAlgorithms(Vec<SignatureHashAlgorithm>),
    UseSrtp(ExtensionUseSrtp),
    UseExtendedMasterSecret,
    /// Only the empty renegotiated_connection of an initial handshake.
    RenegotiationInfo,
}

impl Extension {
    pub fn extension_value(&self) -> ExtensionValue {
        match self {
            Extension::SupportedEllipticCurves(_) => ExtensionValue::SupportedEllipticCurves,
            Extension::SupportedPointFormats(_) => ExtensionValue::SupportedPointFormats,
            Extension::SupportedSignatureAlgorithms(_) => {
                ExtensionValue::SupportedSignatureAlgorithms
            }
            Extension::UseSrtp(_) => ExtensionValue::UseSrtp,
            Extension::UseExtendedMasterSecret => ExtensionValue::UseExtendedMasterSecret,
            Extension::RenegotiationInfo => ExtensionValue::RenegotiationInfo,
        }
    }

    fn marshal_data<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Extension::SupportedEllipticCurves(curves) => {
                writer.write_u16::<BigEndian>(2 * curves.len() as u16)?;
                for curve in curves {
                    writer.write_u16::<BigEndian>(*curve as u16)?;
                }
            }
            Extension::SupportedPointFormats(formats) => {
                writer.write_u8(formats.len() as u8)?;
                writer.write_all(formats)?;
            }
            Extension::SupportedSignatureAlgorithms(algorithms) => {
                writer.write_u16::<BigEndian>(2 * algorithms.len() as u16)?;
                for algorithm in algorithms {
                    writer.write_u8(algorithm.hash as u8)?;
                    writer.write_u8(algorithm.signature as u8)?;
                }
            }
            Extension::UseSrtp(use_srtp) => use_srtp.marshal(writer)?,
            Extension::UseExtendedMasterSecret => {}
            Extension::RenegotiationInfo => writer.write_u8(0)?,
        }
        Ok(())
    }

    fn unmarshal_data(value: ExtensionValue, data: &[u8]) -> Result<Option<Self>> {
        let mut reader = data;
        let extension = match value {
            ExtensionValue::SupportedEllipticCurves => {
                let len = reader.read_u16::<BigEndian>()? as usize;
                if len % 2 != 0 {
                    return Err(Error::ErrLengthMismatch);
                }
                let mut curves = Vec::with_capacity(len / 2);
                for _ in 0..len / 2 {
                    curves.push(reader.read_u16::<BigEndian>()?.into());
                }
                Extension::SupportedEllipticCurves(curves)
            }
            ExtensionValue::SupportedPointFormats => {
                let len = reader.read_u8()? as usize;
                let mut formats = vec![0u8; len];
                reader.read_exact(&mut formats)?;
                Extension::SupportedPointFormats(formats)
            }
            ExtensionValue::SupportedSignatureAlgorithms => {
                let len = reader.read_u16::<BigEndian>()? as usize;
                if len % 2 != 0 {
                    return Err(Error::ErrLengthMismatch);
                }
                let mut algorithms = Vec::with_capacity(len / 2);
                for _ in 0..len / 2 {
                    let hash = reader.read_u8()?;
                    let signature = reader.read_u8()?;
                    algorithms.push(SignatureHashAlgorithm::from_wire(hash, signature));
                }
                Extension::SupportedSignatureAlgorithms(algorithms)
            }
            ExtensionValue::UseSrtp => {
                Extension::UseSrtp(ExtensionUseSrtp::unmarshal(&mut reader)?)
            }
            ExtensionValue::UseExtendedMasterSecret => Extension::UseExtendedMasterSecret,
            ExtensionValue::RenegotiationInfo => {
                // renegotiation is never accepted, a non-empty binding is fatal
                if reader.read_u8()? != 0 {
                    return Err(Error::ErrLengthMismatch);
                }
                Extension::RenegotiationInfo
            }
            ExtensionValue::Unsupported => return Ok(None),
        };

        if !reader.is_empty() {
            return Err(Error::ErrLengthMismatch);
        }
        Ok(Some(extension))
    }
}

/// Writes the extensions block of a hello message. An empty list writes
/// nothing, the block is optional on the wire.
pub fn marshal_extensions<W: Write>(extensions: &[Extension], writer: &mut W) -> Result<()> {
    if extensions.is_empty() {
        return Ok(());
    }

    let mut block = vec![];
    for extension in extensions {
        let mut data = vec![];
        extension.marshal_data(&mut data)?;

        block.write_u16::<BigEndian>(extension.extension_value() as u16)?;
        block.write_u16::<BigEndian>(data.len() as u16)?;
        block.extend_from_slice(&data);
    }

    writer.write_u16::<BigEndian>(block.len() as u16)?;
    writer.write_all(&block)?;
    Ok(())
}

/// Reads the extensions block at the end of a hello message body.
pub fn unmarshal_extensions(mut reader: &[u8]) -> Result<Vec<Extension>> {
    if reader.is_empty() {
        return Ok(vec![]);
    }

    let block_len = reader.read_u16::<BigEndian>()? as usize;
    if block_len != reader.len() {
        return Err(Error::ErrLengthMismatch);
    }

    let mut extensions = vec![];
    while !reader.is_empty() {
        let value = reader.read_u16::<BigEndian>()?.into();
        let len = reader.read_u16::<BigEndian>()? as usize;
        if len > reader.len() {
            return Err(Error::ErrBufferTooShort);
        }
        let (data, rest) = reader.split_at(len);
        reader = rest;

        if let Some(extension) = Extension::unmarshal_data(value, data)? {
            extensions.push(extension);
        }
    }
    Ok(extensions)
}
