use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use shared::error::{Error, Result};

use crate::protection_profile::{ProtectionProfile, SRTP_MASTER_KEY_LEN};

const INLINE: &str = "inline:";

/// One `a=crypto` line of an SDES offer or answer.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoParams {
    pub tag: i32,
    pub cipher_suite: String,
    pub key_params: String,
    pub session_params: String,
}

impl CryptoParams {
    pub fn new(tag: i32, cipher_suite: &str, key_params: &str, session_params: &str) -> Self {
        CryptoParams {
            tag,
            cipher_suite: cipher_suite.to_owned(),
            key_params: key_params.to_owned(),
            session_params: session_params.to_owned(),
        }
    }

    /// Same tag and suite. Keys are expected to differ between offer and answer.
    pub fn matches(&self, other: &CryptoParams) -> bool {
        self.tag == other.tag && self.cipher_suite == other.cipher_suite
    }
}

/// Decodes `inline:<base64>` into the concatenated master key and salt.
pub fn parse_key_params(key_params: &str) -> Result<Vec<u8>> {
    let encoded = key_params
        .strip_prefix(INLINE)
        .ok_or_else(|| Error::ErrInvalidKeyParams(key_params.to_owned()))?;

    let key = STANDARD
        .decode(encoded)
        .map_err(|_| Error::ErrInvalidKeyParams(key_params.to_owned()))?;
    if key.len() != SRTP_MASTER_KEY_LEN {
        return Err(Error::ErrInvalidKeyParams(key_params.to_owned()));
    }

    Ok(key)
}

/// Generates SDES params with a fresh random master key and salt.
pub fn create_crypto_params(tag: i32, cipher_suite: &str) -> Result<CryptoParams> {
    if ProtectionProfile::from_cipher_suite_name(cipher_suite).is_none() {
        return Err(Error::ErrUnsupportedCipherSuite(cipher_suite.to_owned()));
    }

    let mut master_key = [0u8; SRTP_MASTER_KEY_LEN];
    rand::rng().fill_bytes(&mut master_key);

    Ok(CryptoParams {
        tag,
        cipher_suite: cipher_suite.to_owned(),
        key_params: format!("{}{}", INLINE, STANDARD.encode(master_key)),
        session_params: String::new(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protection_profile::*;

    #[test]
    fn test_create_crypto_params() -> Result<()> {
        let params = create_crypto_params(1, CS_AES_CM_128_HMAC_SHA1_80)?;
        assert_eq!(params.tag, 1);
        assert_eq!(params.cipher_suite, CS_AES_CM_128_HMAC_SHA1_80);
        assert!(params.key_params.starts_with("inline:"));
        assert_eq!(parse_key_params(&params.key_params)?.len(), 30);

        let other = create_crypto_params(1, CS_AES_CM_128_HMAC_SHA1_80)?;
        assert_ne!(params.key_params, other.key_params);
        assert!(params.matches(&other));
        Ok(())
    }

    #[test]
    fn test_create_crypto_params_unknown_suite() {
        assert_eq!(
            create_crypto_params(1, "AES_CM_256_HMAC_SHA1_80"),
            Err(Error::ErrUnsupportedCipherSuite(
                "AES_CM_256_HMAC_SHA1_80".to_owned()
            ))
        );
    }

    #[test]
    fn test_parse_key_params_rejects_malformed() {
        // Missing prefix.
        assert!(parse_key_params("PS1uQCVeeCFCanVmcjkpPywjNWhcYD0mXXtxaVBR").is_err());
        // Not base64.
        assert!(parse_key_params("inline:!!!!").is_err());
        // 29 bytes.
        assert!(parse_key_params(&format!("inline:{}", STANDARD.encode([7u8; 29]))).is_err());

        let ok = format!("inline:{}", STANDARD.encode([7u8; 30]));
        assert_eq!(parse_key_params(&ok), Ok(vec![7u8; 30]));
    }
}
