use aes::cipher::generic_array::GenericArray;
use aes::cipher::{KeyIvInit, StreamCipher};
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

use shared::error::{Error, Result};

use super::Cipher;
use crate::key_derivation::*;
use crate::protection_profile::ProtectionProfile;

type HmacSha1 = Hmac<Sha1>;
type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

const SRTCP_INDEX_SIZE: usize = 4;
const SRTCP_HEADER_LEN: usize = 8;

pub(crate) struct CipherAesCmHmacSha1 {
    profile: ProtectionProfile,

    srtp_session_key: Vec<u8>,
    srtp_session_salt: Vec<u8>,
    srtp_session_auth: HmacSha1,

    srtcp_session_key: Vec<u8>,
    srtcp_session_salt: Vec<u8>,
    srtcp_session_auth: HmacSha1,
}

impl CipherAesCmHmacSha1 {
    pub fn new(profile: ProtectionProfile, master_key: &[u8], master_salt: &[u8]) -> Result<Self> {
        if master_key.len() != profile.key_len() {
            return Err(Error::ErrShortSrtpMasterKey(
                profile.key_len(),
                master_key.len(),
            ));
        }
        if master_salt.len() != profile.salt_len() {
            return Err(Error::ErrShortSrtpMasterSalt(
                profile.salt_len(),
                master_salt.len(),
            ));
        }

        let srtp_session_key = aes_cm_key_derivation(
            LABEL_SRTP_ENCRYPTION,
            master_key,
            master_salt,
            0,
            master_key.len(),
        )?;
        let srtcp_session_key = aes_cm_key_derivation(
            LABEL_SRTCP_ENCRYPTION,
            master_key,
            master_salt,
            0,
            master_key.len(),
        )?;
        let srtp_session_salt = aes_cm_key_derivation(
            LABEL_SRTP_SALT,
            master_key,
            master_salt,
            0,
            master_salt.len(),
        )?;
        let srtcp_session_salt = aes_cm_key_derivation(
            LABEL_SRTCP_SALT,
            master_key,
            master_salt,
            0,
            master_salt.len(),
        )?;

        let auth_key_len = profile.auth_key_len();
        let srtp_session_auth_tag = aes_cm_key_derivation(
            LABEL_SRTP_AUTHENTICATION_TAG,
            master_key,
            master_salt,
            0,
            auth_key_len,
        )?;
        let srtcp_session_auth_tag = aes_cm_key_derivation(
            LABEL_SRTCP_AUTHENTICATION_TAG,
            master_key,
            master_salt,
            0,
            auth_key_len,
        )?;

        let srtp_session_auth = HmacSha1::new_from_slice(&srtp_session_auth_tag)
            .map_err(|e| Error::Other(e.to_string()))?;
        let srtcp_session_auth = HmacSha1::new_from_slice(&srtcp_session_auth_tag)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(CipherAesCmHmacSha1 {
            profile,
            srtp_session_key,
            srtp_session_salt,
            srtp_session_auth,
            srtcp_session_key,
            srtcp_session_salt,
            srtcp_session_auth,
        })
    }

    /// https://tools.ietf.org/html/rfc3711#section-4.2
    /// In the case of SRTP, M SHALL consist of the Authenticated
    /// Portion of the packet (as specified in Figure 1) concatenated with
    /// the ROC, M = Authenticated Portion || ROC;
    ///
    /// The pre-defined authentication transform for SRTP is HMAC-SHA1
    /// [RFC2104].  With HMAC-SHA1, the SRTP_PREFIX_LENGTH (Figure 3) SHALL
    /// be 0.  For SRTP (respectively SRTCP), the HMAC SHALL be applied to
    /// the session authentication key and M as specified above, i.e.,
    /// HMAC(k_a, M).  The HMAC output SHALL then be truncated to the n_tag
    /// left-most bits.
    fn generate_srtp_auth_tag(&self, buf: &[u8], roc: u32) -> Vec<u8> {
        let mut signer = self.srtp_session_auth.clone();
        signer.update(buf);
        // For SRTP only, we need to hash the rollover counter as well.
        signer.update(&roc.to_be_bytes());
        let code = signer.finalize().into_bytes();
        code[0..self.profile.rtp_auth_tag_len()].to_vec()
    }

    /// https://tools.ietf.org/html/rfc3711#section-4.2
    /// For SRTCP the authenticated portion is the whole packet including
    /// the E flag and SRTCP index.
    fn generate_srtcp_auth_tag(&self, buf: &[u8]) -> Vec<u8> {
        let mut signer = self.srtcp_session_auth.clone();
        signer.update(buf);
        let code = signer.finalize().into_bytes();
        code[0..self.profile.rtcp_auth_tag_len()].to_vec()
    }

    fn apply_keystream(key: &[u8], counter: &[u8; 16], buf: &mut [u8]) {
        let mut stream = Aes128Ctr::new(
            GenericArray::from_slice(key),
            GenericArray::from_slice(counter),
        );
        stream.apply_keystream(buf);
    }
}

impl Cipher for CipherAesCmHmacSha1 {
    fn rtp_auth_tag_len(&self) -> usize {
        self.profile.rtp_auth_tag_len()
    }

    fn rtcp_auth_tag_len(&self) -> usize {
        self.profile.rtcp_auth_tag_len()
    }

    fn get_rtcp_index(&self, input: &[u8]) -> usize {
        let tail_offset = input.len() - (self.rtcp_auth_tag_len() + SRTCP_INDEX_SIZE);
        (BigEndian::read_u32(&input[tail_offset..tail_offset + SRTCP_INDEX_SIZE]) & !(1 << 31))
            as usize
    }

    fn encrypt_rtp(
        &mut self,
        plaintext: &[u8],
        header_len: usize,
        sequence_number: u16,
        ssrc: u32,
        roc: u32,
    ) -> Result<BytesMut> {
        let mut writer = BytesMut::with_capacity(plaintext.len() + self.rtp_auth_tag_len());
        writer.extend_from_slice(plaintext);

        // Encrypt the payload
        let counter = generate_counter(sequence_number, roc, ssrc, &self.srtp_session_salt);
        Self::apply_keystream(&self.srtp_session_key, &counter, &mut writer[header_len..]);

        // Generate the auth tag.
        let auth_tag = self.generate_srtp_auth_tag(&writer, roc);
        writer.extend_from_slice(&auth_tag);

        Ok(writer)
    }

    fn decrypt_rtp(
        &mut self,
        encrypted: &[u8],
        header_len: usize,
        sequence_number: u16,
        ssrc: u32,
        roc: u32,
    ) -> Result<BytesMut> {
        let tag_len = self.rtp_auth_tag_len();
        if encrypted.len() < header_len + tag_len {
            return Err(Error::ErrTooShortRtp);
        }

        // Split the auth tag and the cipher text into two parts.
        let actual_tag = &encrypted[encrypted.len() - tag_len..];
        let cipher_text = &encrypted[..encrypted.len() - tag_len];

        // Generate the auth tag we expect to see from the ciphertext.
        let expected_tag = self.generate_srtp_auth_tag(cipher_text, roc);

        // See if the auth tag actually matches.
        // We use a constant time comparison to prevent timing attacks.
        if actual_tag.ct_eq(&expected_tag).unwrap_u8() != 1 {
            return Err(Error::ErrFailedToVerifyAuthTag);
        }

        let mut writer = BytesMut::with_capacity(cipher_text.len());
        writer.extend_from_slice(cipher_text);

        // Decrypt the ciphertext for the payload.
        let counter = generate_counter(sequence_number, roc, ssrc, &self.srtp_session_salt);
        Self::apply_keystream(&self.srtp_session_key, &counter, &mut writer[header_len..]);

        Ok(writer)
    }

    fn encrypt_rtcp(&mut self, decrypted: &[u8], srtcp_index: usize, ssrc: u32) -> Result<BytesMut> {
        if decrypted.len() < SRTCP_HEADER_LEN {
            return Err(Error::ErrTooShortRtcp);
        }

        let mut writer = BytesMut::with_capacity(
            decrypted.len() + SRTCP_INDEX_SIZE + self.rtcp_auth_tag_len(),
        );
        writer.extend_from_slice(decrypted);

        // Encrypt everything after header
        let counter = generate_counter(
            (srtcp_index & 0xFFFF) as u16,
            (srtcp_index >> 16) as u32,
            ssrc,
            &self.srtcp_session_salt,
        );
        Self::apply_keystream(
            &self.srtcp_session_key,
            &counter,
            &mut writer[SRTCP_HEADER_LEN..],
        );

        // Add SRTCP Index and set Encryption bit
        writer.put_u32(srtcp_index as u32 | (1u32 << 31));

        // Generate the auth tag.
        let auth_tag = self.generate_srtcp_auth_tag(&writer);
        writer.extend_from_slice(&auth_tag);

        Ok(writer)
    }

    fn decrypt_rtcp(&mut self, encrypted: &[u8], srtcp_index: usize, ssrc: u32) -> Result<BytesMut> {
        let tag_len = self.rtcp_auth_tag_len();
        if encrypted.len() < SRTCP_HEADER_LEN + SRTCP_INDEX_SIZE + tag_len {
            return Err(Error::ErrTooShortRtcp);
        }

        let tail_offset = encrypted.len() - (tag_len + SRTCP_INDEX_SIZE);

        let is_encrypted = encrypted[tail_offset] >> 7;
        if is_encrypted == 0 {
            return Ok(BytesMut::from(&encrypted[..tail_offset]));
        }

        // Split the auth tag and the cipher text into two parts.
        let actual_tag = &encrypted[encrypted.len() - tag_len..];
        let expected_tag = self.generate_srtcp_auth_tag(&encrypted[..encrypted.len() - tag_len]);
        if actual_tag.ct_eq(&expected_tag).unwrap_u8() != 1 {
            return Err(Error::ErrFailedToVerifyAuthTag);
        }

        let mut writer = BytesMut::with_capacity(tail_offset);
        writer.extend_from_slice(&encrypted[..tail_offset]);

        let counter = generate_counter(
            (srtcp_index & 0xFFFF) as u16,
            (srtcp_index >> 16) as u32,
            ssrc,
            &self.srtcp_session_salt,
        );
        Self::apply_keystream(
            &self.srtcp_session_key,
            &counter,
            &mut writer[SRTCP_HEADER_LEN..],
        );

        Ok(writer)
    }
}
