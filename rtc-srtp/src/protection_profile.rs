use std::fmt;

use serde::{Deserialize, Serialize};

pub const CS_AES_CM_128_HMAC_SHA1_80: &str = "AES_CM_128_HMAC_SHA1_80";
pub const CS_AES_CM_128_HMAC_SHA1_32: &str = "AES_CM_128_HMAC_SHA1_32";

/// Master key length shared by both supported suites.
pub const SRTP_MASTER_KEY_KEY_LEN: usize = 16;
pub const SRTP_MASTER_KEY_SALT_LEN: usize = 14;
/// Length of the concatenated key and salt carried in SDES key params.
pub const SRTP_MASTER_KEY_LEN: usize = SRTP_MASTER_KEY_KEY_LEN + SRTP_MASTER_KEY_SALT_LEN;

/// ProtectionProfile specifies Cipher and AuthTag details, similar to TLS cipher suite
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ProtectionProfile {
    Aes128CmHmacSha1_80 = 0x0001,
    Aes128CmHmacSha1_32 = 0x0002,
}

impl ProtectionProfile {
    pub fn from_cipher_suite_name(name: &str) -> Option<Self> {
        match name {
            CS_AES_CM_128_HMAC_SHA1_80 => Some(ProtectionProfile::Aes128CmHmacSha1_80),
            CS_AES_CM_128_HMAC_SHA1_32 => Some(ProtectionProfile::Aes128CmHmacSha1_32),
            _ => None,
        }
    }

    /// Maps the DTLS `use_srtp` protection profile id.
    pub fn from_dtls_id(id: u16) -> Option<Self> {
        match id {
            0x0001 => Some(ProtectionProfile::Aes128CmHmacSha1_80),
            0x0002 => Some(ProtectionProfile::Aes128CmHmacSha1_32),
            _ => None,
        }
    }

    pub fn dtls_id(&self) -> u16 {
        *self as u16
    }

    pub fn cipher_suite_name(&self) -> &'static str {
        match *self {
            ProtectionProfile::Aes128CmHmacSha1_80 => CS_AES_CM_128_HMAC_SHA1_80,
            ProtectionProfile::Aes128CmHmacSha1_32 => CS_AES_CM_128_HMAC_SHA1_32,
        }
    }

    pub fn key_len(&self) -> usize {
        SRTP_MASTER_KEY_KEY_LEN
    }

    pub fn salt_len(&self) -> usize {
        SRTP_MASTER_KEY_SALT_LEN
    }

    pub fn rtp_auth_tag_len(&self) -> usize {
        match *self {
            ProtectionProfile::Aes128CmHmacSha1_80 => 10,
            ProtectionProfile::Aes128CmHmacSha1_32 => 4,
        }
    }

    /// SRTCP always carries the 80-bit tag (RFC 5764 Section 4.1.2).
    pub fn rtcp_auth_tag_len(&self) -> usize {
        10
    }

    pub fn auth_key_len(&self) -> usize {
        20
    }
}

impl fmt::Display for ProtectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cipher_suite_name())
    }
}
