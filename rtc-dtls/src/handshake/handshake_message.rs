use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use shared::error::{Error, Result};

use super::{RANDOM_BYTES_LENGTH, VERIFY_DATA_LENGTH};
use crate::cipher_suite::CipherSuiteId;
use crate::crypto::ELLIPTIC_CURVE_TYPE_NAMED_CURVE;
use crate::curve::NamedCurve;
use crate::extension::{Extension, marshal_extensions, unmarshal_extensions};
use crate::record_layer::ProtocolVersion;
use crate::signature_hash_algorithm::SignatureHashAlgorithm;

pub const COMPRESSION_METHOD_NULL: u8 = 0;
/// ecdsa_sign ClientCertificateType
pub const CLIENT_CERTIFICATE_TYPE_ECDSA_SIGN: u8 = 64;

const MAX_SESSION_ID_LENGTH: usize = 32;

fn read_version<R: Read>(reader: &mut R) -> Result<ProtocolVersion> {
    let major = reader.read_u8()?;
    let minor = reader.read_u8()?;
    Ok(ProtocolVersion { major, minor })
}

fn write_version<W: Write>(writer: &mut W, version: &ProtocolVersion) -> Result<()> {
    writer.write_u8(version.major)?;
    writer.write_u8(version.minor)?;
    Ok(())
}

fn read_random<R: Read>(reader: &mut R) -> Result<[u8; RANDOM_BYTES_LENGTH]> {
    let mut random = [0u8; RANDOM_BYTES_LENGTH];
    reader.read_exact(&mut random)?;
    Ok(random)
}

fn read_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_signature_hash_algorithm<R: Read>(reader: &mut R) -> Result<SignatureHashAlgorithm> {
    let hash = reader.read_u8()?;
    let signature = reader.read_u8()?;
    Ok(SignatureHashAlgorithm::from_wire(hash, signature))
}

fn ensure_consumed(reader: &[u8]) -> Result<()> {
    if reader.is_empty() {
        Ok(())
    } else {
        Err(Error::ErrLengthMismatch)
    }
}

/// ```text
/// struct {
///     ProtocolVersion client_version;
///     Random random;
///     SessionID session_id;
///     opaque cookie<0..2^8-1>;
///     CipherSuite cipher_suites<2..2^16-1>;
///     CompressionMethod compression_methods<1..2^8-1>;
///     Extension extensions<0..2^16-1>;
/// } ClientHello;
/// ```
/// https://tools.ietf.org/html/rfc6347#section-4.2.1
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeMessageClientHello {
    pub version: ProtocolVersion,
    pub random: [u8; RANDOM_BYTES_LENGTH],
    pub session_id: Vec<u8>,
    pub cookie: Vec<u8>,
    pub cipher_suites: Vec<CipherSuiteId>,
    pub compression_methods: Vec<u8>,
    pub extensions: Vec<Extension>,
}

impl HandshakeMessageClientHello {
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        if self.cookie.len() > 255 {
            return Err(Error::ErrCookieTooLong);
        }

        write_version(writer, &self.version)?;
        writer.write_all(&self.random)?;
        writer.write_u8(self.session_id.len() as u8)?;
        writer.write_all(&self.session_id)?;
        writer.write_u8(self.cookie.len() as u8)?;
        writer.write_all(&self.cookie)?;
        writer.write_u16::<BigEndian>(2 * self.cipher_suites.len() as u16)?;
        for cipher_suite in &self.cipher_suites {
            writer.write_u16::<BigEndian>(*cipher_suite as u16)?;
        }
        writer.write_u8(self.compression_methods.len() as u8)?;
        writer.write_all(&self.compression_methods)?;
        marshal_extensions(&self.extensions, writer)
    }

    pub fn unmarshal(mut reader: &[u8]) -> Result<Self> {
        let version = read_version(&mut reader)?;
        let random = read_random(&mut reader)?;

        let session_id_len = reader.read_u8()? as usize;
        if session_id_len > MAX_SESSION_ID_LENGTH {
            return Err(Error::ErrLengthMismatch);
        }
        let session_id = read_vec(&mut reader, session_id_len)?;

        let cookie_len = reader.read_u8()? as usize;
        let cookie = read_vec(&mut reader, cookie_len)?;

        let cipher_suites_len = reader.read_u16::<BigEndian>()? as usize;
        if cipher_suites_len % 2 != 0 {
            return Err(Error::ErrLengthMismatch);
        }
        let mut cipher_suites = Vec::with_capacity(cipher_suites_len / 2);
        for _ in 0..cipher_suites_len / 2 {
            cipher_suites.push(reader.read_u16::<BigEndian>()?.into());
        }

        let compression_methods_len = reader.read_u8()? as usize;
        let compression_methods = read_vec(&mut reader, compression_methods_len)?;

        let extensions = unmarshal_extensions(reader)?;

        Ok(HandshakeMessageClientHello {
            version,
            random,
            session_id,
            cookie,
            cipher_suites,
            compression_methods,
            extensions,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeMessageServerHello {
    pub version: ProtocolVersion,
    pub random: [u8; RANDOM_BYTES_LENGTH],
    pub session_id: Vec<u8>,
    pub cipher_suite: CipherSuiteId,
    pub compression_method: u8,
    pub extensions: Vec<Extension>,
}

impl HandshakeMessageServerHello {
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_version(writer, &self.version)?;
        writer.write_all(&self.random)?;
        writer.write_u8(self.session_id.len() as u8)?;
        writer.write_all(&self.session_id)?;
        writer.write_u16::<BigEndian>(self.cipher_suite as u16)?;
        writer.write_u8(self.compression_method)?;
        marshal_extensions(&self.extensions, writer)
    }

    pub fn unmarshal(mut reader: &[u8]) -> Result<Self> {
        let version = read_version(&mut reader)?;
        let random = read_random(&mut reader)?;

        let session_id_len = reader.read_u8()? as usize;
        if session_id_len > MAX_SESSION_ID_LENGTH {
            return Err(Error::ErrLengthMismatch);
        }
        let session_id = read_vec(&mut reader, session_id_len)?;

        let cipher_suite = reader.read_u16::<BigEndian>()?.into();
        let compression_method = reader.read_u8()?;
        let extensions = unmarshal_extensions(reader)?;

        Ok(HandshakeMessageServerHello {
            version,
            random,
            session_id,
            cipher_suite,
            compression_method,
            extensions,
        })
    }
}

/// Stateless cookie exchange of RFC 6347 section 4.2.1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeMessageHelloVerifyRequest {
    pub version: ProtocolVersion,
    pub cookie: Vec<u8>,
}

impl HandshakeMessageHelloVerifyRequest {
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        if self.cookie.len() > 255 {
            return Err(Error::ErrCookieTooLong);
        }

        write_version(writer, &self.version)?;
        writer.write_u8(self.cookie.len() as u8)?;
        writer.write_all(&self.cookie)?;
        Ok(())
    }

    pub fn unmarshal(mut reader: &[u8]) -> Result<Self> {
        let version = read_version(&mut reader)?;
        let cookie_len = reader.read_u8()? as usize;
        let cookie = read_vec(&mut reader, cookie_len)?;
        ensure_consumed(reader)?;

        Ok(HandshakeMessageHelloVerifyRequest { version, cookie })
    }
}

/// A certificate chain, leaf first. A client asked for a certificate it
/// does not have answers with an empty chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeMessageCertificate {
    pub certificate: Vec<Vec<u8>>,
}

impl HandshakeMessageCertificate {
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        let total: usize = self.certificate.iter().map(|c| 3 + c.len()).sum();
        writer.write_u24::<BigEndian>(total as u32)?;
        for certificate in &self.certificate {
            writer.write_u24::<BigEndian>(certificate.len() as u32)?;
            writer.write_all(certificate)?;
        }
        Ok(())
    }

    pub fn unmarshal(mut reader: &[u8]) -> Result<Self> {
        let total = reader.read_u24::<BigEndian>()? as usize;
        if total != reader.len() {
            return Err(Error::ErrLengthMismatch);
        }

        let mut certificate = vec![];
        while !reader.is_empty() {
            let len = reader.read_u24::<BigEndian>()? as usize;
            certificate.push(read_vec(&mut reader, len)?);
        }

        Ok(HandshakeMessageCertificate { certificate })
    }
}

/// ECDHE parameters signed with the server certificate's key.
/// https://tools.ietf.org/html/rfc4492#section-5.4
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeMessageServerKeyExchange {
    pub named_curve: NamedCurve,
    pub public_key: Vec<u8>,
    pub algorithm: SignatureHashAlgorithm,
    pub signature: Vec<u8>,
}

impl HandshakeMessageServerKeyExchange {
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(ELLIPTIC_CURVE_TYPE_NAMED_CURVE)?;
        writer.write_u16::<BigEndian>(self.named_curve as u16)?;
        writer.write_u8(self.public_key.len() as u8)?;
        writer.write_all(&self.public_key)?;
        writer.write_u8(self.algorithm.hash as u8)?;
        writer.write_u8(self.algorithm.signature as u8)?;
        writer.write_u16::<BigEndian>(self.signature.len() as u16)?;
        writer.write_all(&self.signature)?;
        Ok(())
    }

    pub fn unmarshal(mut reader: &[u8]) -> Result<Self> {
        if reader.read_u8()? != ELLIPTIC_CURVE_TYPE_NAMED_CURVE {
            return Err(Error::ErrInvalidEllipticCurveType);
        }
        let named_curve = reader.read_u16::<BigEndian>()?.into();
        let public_key_len = reader.read_u8()? as usize;
        let public_key = read_vec(&mut reader, public_key_len)?;
        let algorithm = read_signature_hash_algorithm(&mut reader)?;
        let signature_len = reader.read_u16::<BigEndian>()? as usize;
        let signature = read_vec(&mut reader, signature_len)?;
        ensure_consumed(reader)?;

        Ok(HandshakeMessageServerKeyExchange {
            named_curve,
            public_key,
            algorithm,
            signature,
        })
    }
}

/// The certificate_authorities list is always sent empty and ignored on
/// receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeMessageCertificateRequest {
    pub certificate_types: Vec<u8>,
    pub signature_hash_algorithms: Vec<SignatureHashAlgorithm>,
}

impl HandshakeMessageCertificateRequest {
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.certificate_types.len() as u8)?;
        writer.write_all(&self.certificate_types)?;
        writer.write_u16::<BigEndian>(2 * self.signature_hash_algorithms.len() as u16)?;
        for algorithm in &self.signature_hash_algorithms {
            writer.write_u8(algorithm.hash as u8)?;
            writer.write_u8(algorithm.signature as u8)?;
        }
        writer.write_u16::<BigEndian>(0)?;
        Ok(())
    }

    pub fn unmarshal(mut reader: &[u8]) -> Result<Self> {
        let types_len = reader.read_u8()? as usize;
        let certificate_types = read_vec(&mut reader, types_len)?;

        let algorithms_len = reader.read_u16::<BigEndian>()? as usize;
        if algorithms_len % 2 != 0 {
            return Err(Error::ErrLengthMismatch);
        }
        let mut signature_hash_algorithms = Vec::with_capacity(algorithms_len / 2);
        for _ in 0..algorithms_len / 2 {
            signature_hash_algorithms.push(read_signature_hash_algorithm(&mut reader)?);
        }

        let authorities_len = reader.read_u16::<BigEndian>()? as usize;
        read_vec(&mut reader, authorities_len)?;
        ensure_consumed(reader)?;

        Ok(HandshakeMessageCertificateRequest {
            certificate_types,
            signature_hash_algorithms,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeMessageServerHelloDone;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeMessageCertificateVerify {
    pub algorithm: SignatureHashAlgorithm,
    pub signature: Vec<u8>,
}

impl HandshakeMessageCertificateVerify {
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.algorithm.hash as u8)?;
        writer.write_u8(self.algorithm.signature as u8)?;
        writer.write_u16::<BigEndian>(self.signature.len() as u16)?;
        writer.write_all(&self.signature)?;
        Ok(())
    }

    pub fn unmarshal(mut reader: &[u8]) -> Result<Self> {
        let algorithm = read_signature_hash_algorithm(&mut reader)?;
        let signature_len = reader.read_u16::<BigEndian>()? as usize;
        let signature = read_vec(&mut reader, signature_len)?;
        ensure_consumed(reader)?;

        Ok(HandshakeMessageCertificateVerify {
            algorithm,
            signature,
        })
    }
}

/// The client's ephemeral ECDH point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeMessageClientKeyExchange {
    pub public_key: Vec<u8>,
}

impl HandshakeMessageClientKeyExchange {
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.public_key.len() as u8)?;
        writer.write_all(&self.public_key)?;
        Ok(())
    }

    pub fn unmarshal(mut reader: &[u8]) -> Result<Self> {
        let len = reader.read_u8()? as usize;
        let public_key = read_vec(&mut reader, len)?;
        ensure_consumed(reader)?;

        Ok(HandshakeMessageClientKeyExchange { public_key })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeMessageFinished {
    pub verify_data: Vec<u8>,
}

impl HandshakeMessageFinished {
    pub fn marshal<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.verify_data)?;
        Ok(())
    }

    pub fn unmarshal(reader: &[u8]) -> Result<Self> {
        if reader.len() != VERIFY_DATA_LENGTH {
            return Err(Error::ErrLengthMismatch);
        }
        Ok(HandshakeMessageFinished {
            verify_data: reader.to_vec(),
        })
    }
}
