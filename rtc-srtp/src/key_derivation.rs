use aes::Aes128;
use aes::cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray};
use byteorder::{BigEndian, ByteOrder};

use shared::error::{Error, Result};

pub const LABEL_SRTP_ENCRYPTION: u8 = 0x00;
pub const LABEL_SRTP_AUTHENTICATION_TAG: u8 = 0x01;
pub const LABEL_SRTP_SALT: u8 = 0x02;
pub const LABEL_SRTCP_ENCRYPTION: u8 = 0x03;
pub const LABEL_SRTCP_AUTHENTICATION_TAG: u8 = 0x04;
pub const LABEL_SRTCP_SALT: u8 = 0x05;

/// AES-CM PRF of RFC 3711 Section 4.3.1 with a key derivation rate of zero.
pub(crate) fn aes_cm_key_derivation(
    label: u8,
    master_key: &[u8],
    master_salt: &[u8],
    index_over_kdr: usize,
    out_len: usize,
) -> Result<Vec<u8>> {
    if index_over_kdr != 0 {
        // 24-bit "index DIV kdr" must be xored to prf input.
        return Err(Error::ErrUnsupportedIndexOverKdr);
    }

    // https://tools.ietf.org/html/rfc3711#appendix-B.3
    // The input block for AES-CM is generated by exclusive-oring the master salt with the
    // concatenation of the encryption key label 0x00 with (index DIV kdr),
    // - index is 'rollover count' and DIV is 'divided by'
    let n_master_key = master_key.len();
    let n_master_salt = master_salt.len();

    let mut prf_in = vec![0u8; n_master_key];
    prf_in[..n_master_salt].copy_from_slice(master_salt);
    prf_in[7] ^= label;

    // The resulting value is then AES encrypted using the master key to get the cipher key.
    let block = Aes128::new_from_slice(master_key)
        .map_err(|_| Error::ErrShortSrtpMasterKey(16, n_master_key))?;

    let mut out = vec![0u8; out_len.div_ceil(n_master_key) * n_master_key];
    for (i, chunk) in out.chunks_mut(n_master_key).enumerate() {
        BigEndian::write_u16(&mut prf_in[n_master_key - 2..], i as u16);
        chunk.copy_from_slice(&prf_in);
        block.encrypt_block(GenericArray::from_mut_slice(chunk));
    }

    out.truncate(out_len);
    Ok(out)
}

/// Builds the AES-CM IV: (salt << 16) XOR (ssrc << 64) XOR (index << 16),
/// where index is (roc << 16) | seq.
pub(crate) fn generate_counter(
    sequence_number: u16,
    rollover_counter: u32,
    ssrc: u32,
    session_salt: &[u8],
) -> [u8; 16] {
    let mut counter = [0u8; 16];

    BigEndian::write_u32(&mut counter[4..8], ssrc);
    BigEndian::write_u32(&mut counter[8..12], rollover_counter);
    BigEndian::write_u32(&mut counter[12..16], (sequence_number as u32) << 16);

    for (c, s) in counter.iter_mut().zip(session_salt) {
        *c ^= *s;
    }

    counter
}
