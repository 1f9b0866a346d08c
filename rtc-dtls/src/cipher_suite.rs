use std::fmt;

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, KeyInit, Nonce};
use byteorder::{BigEndian, WriteBytesExt};

use shared::error::{Error, Result};

use crate::prf::EncryptionKeys;
use crate::record_layer::{RECORD_LAYER_HEADER_SIZE, RecordLayerHeader};

/// Cipher suite identifiers seen in hellos.
/// https://www.iana.org/assignments/tls-parameters/tls-parameters.xml#tls-parameters-4
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CipherSuiteId {
    Tls_Ecdhe_Ecdsa_With_Aes_128_Gcm_Sha256 = 0xc02b,
    // signalling value of RFC 5746, never negotiated
    Tls_Empty_Renegotiation_Info_Scsv = 0x00ff,
    Unsupported,
}

impl From<u16> for CipherSuiteId {
    fn from(val: u16) -> Self {
        match val {
            0xc02b => CipherSuiteId::Tls_Ecdhe_Ecdsa_With_Aes_128_Gcm_Sha256,
            0x00ff => CipherSuiteId::Tls_Empty_Renegotiation_Info_Scsv,
            _ => CipherSuiteId::Unsupported,
        }
    }
}

impl fmt::Display for CipherSuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CipherSuiteId::Tls_Ecdhe_Ecdsa_With_Aes_128_Gcm_Sha256 => {
                "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256"
            }
            CipherSuiteId::Tls_Empty_Renegotiation_Info_Scsv => {
                "TLS_EMPTY_RENEGOTIATION_INFO_SCSV"
            }
            CipherSuiteId::Unsupported => "Unsupported",
        };
        write!(f, "{s}")
    }
}

const CRYPTO_GCM_TAG_LENGTH: usize = 16;
const CRYPTO_GCM_NONCE_LENGTH: usize = 12;
const CRYPTO_GCM_EXPLICIT_NONCE_LENGTH: usize = 8;

/// TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 record protection.
/// https://tools.ietf.org/html/rfc5288
pub(crate) struct CryptoGcm {
    local_gcm: Aes128Gcm,
    remote_gcm: Aes128Gcm,
    local_write_iv: Vec<u8>,
    remote_write_iv: Vec<u8>,
}

impl CryptoGcm {
    pub(crate) fn new(keys: &EncryptionKeys, is_client: bool) -> Result<Self> {
        let (local_key, local_iv, remote_key, remote_iv) = if is_client {
            (
                &keys.client_write_key,
                &keys.client_write_iv,
                &keys.server_write_key,
                &keys.server_write_iv,
            )
        } else {
            (
                &keys.server_write_key,
                &keys.server_write_iv,
                &keys.client_write_key,
                &keys.client_write_iv,
            )
        };

        let local_gcm =
            Aes128Gcm::new_from_slice(local_key).map_err(|e| Error::Other(e.to_string()))?;
        let remote_gcm =
            Aes128Gcm::new_from_slice(remote_key).map_err(|e| Error::Other(e.to_string()))?;

        Ok(CryptoGcm {
            local_gcm,
            remote_gcm,
            local_write_iv: local_iv.clone(),
            remote_write_iv: remote_iv.clone(),
        })
    }

    /// Seals `payload` under `header`. The returned record carries the
    /// explicit nonce ahead of the ciphertext and a corrected length.
    pub(crate) fn encrypt(&self, header: &RecordLayerHeader, payload: &[u8]) -> Result<Vec<u8>> {
        let mut explicit_nonce = Vec::with_capacity(CRYPTO_GCM_EXPLICIT_NONCE_LENGTH);
        explicit_nonce.write_u16::<BigEndian>(header.epoch)?;
        explicit_nonce.write_u48::<BigEndian>(header.sequence_number)?;

        let mut nonce = Vec::with_capacity(CRYPTO_GCM_NONCE_LENGTH);
        nonce.extend_from_slice(&self.local_write_iv);
        nonce.extend_from_slice(&explicit_nonce);

        let additional_data = generate_aead_additional_data(header, payload.len())?;
        let encrypted = self
            .local_gcm
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: payload,
                    aad: &additional_data,
                },
            )
            .map_err(|e| Error::Other(e.to_string()))?;

        let record_header = RecordLayerHeader {
            content_len: (explicit_nonce.len() + encrypted.len()) as u16,
            ..*header
        };
        let mut out = Vec::with_capacity(RECORD_LAYER_HEADER_SIZE + record_header.content_len as usize);
        record_header.marshal(&mut out)?;
        out.extend_from_slice(&explicit_nonce);
        out.extend_from_slice(&encrypted);
        Ok(out)
    }

    /// Opens a full record. The result is the record header, with the
    /// plaintext length, followed by the plaintext.
    pub(crate) fn decrypt(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let mut reader = raw;
        let header = RecordLayerHeader::unmarshal(&mut reader)?;

        if raw.len()
            < RECORD_LAYER_HEADER_SIZE + CRYPTO_GCM_EXPLICIT_NONCE_LENGTH + CRYPTO_GCM_TAG_LENGTH
        {
            return Err(Error::ErrDecryptFailed);
        }

        let explicit_nonce = &raw[RECORD_LAYER_HEADER_SIZE
            ..RECORD_LAYER_HEADER_SIZE + CRYPTO_GCM_EXPLICIT_NONCE_LENGTH];
        let ciphertext = &raw[RECORD_LAYER_HEADER_SIZE + CRYPTO_GCM_EXPLICIT_NONCE_LENGTH..];

        let mut nonce = Vec::with_capacity(CRYPTO_GCM_NONCE_LENGTH);
        nonce.extend_from_slice(&self.remote_write_iv);
        nonce.extend_from_slice(explicit_nonce);

        let plaintext_len = ciphertext.len() - CRYPTO_GCM_TAG_LENGTH;
        let additional_data = generate_aead_additional_data(&header, plaintext_len)?;
        let plaintext = self
            .remote_gcm
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: ciphertext,
                    aad: &additional_data,
                },
            )
            .map_err(|_| Error::ErrDecryptFailed)?;

        let plain_header = RecordLayerHeader {
            content_len: plaintext.len() as u16,
            ..header
        };
        let mut out = Vec::with_capacity(RECORD_LAYER_HEADER_SIZE + plaintext.len());
        plain_header.marshal(&mut out)?;
        out.extend_from_slice(&plaintext);
        Ok(out)
    }
}

/// seq_num(epoch + uint48) + type + version + length
fn generate_aead_additional_data(h: &RecordLayerHeader, payload_len: usize) -> Result<Vec<u8>> {
    let mut additional_data = Vec::with_capacity(13);
    additional_data.write_u16::<BigEndian>(h.epoch)?;
    additional_data.write_u48::<BigEndian>(h.sequence_number)?;
    additional_data.write_u8(h.content_type as u8)?;
    additional_data.write_u8(h.protocol_version.major)?;
    additional_data.write_u8(h.protocol_version.minor)?;
    additional_data.write_u16::<BigEndian>(payload_len as u16)?;
    Ok(additional_data)
}
