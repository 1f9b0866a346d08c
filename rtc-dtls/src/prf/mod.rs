
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use shared::error::{Error, Result};

use crate::handshake::VERIFY_DATA_LENGTH;

type HmacSha256 = Hmac<Sha256>;

pub(crate) const PRF_MASTER_SECRET_LABEL: &str = "master secret";
pub(crate) const PRF_EXTENDED_MASTER_SECRET_LABEL: &str = "extended master secret";
pub(crate) const PRF_KEY_EXPANSION_LABEL: &str = "key expansion";
pub(crate) const PRF_VERIFY_DATA_CLIENT_LABEL: &str = "client finished";
pub(crate) const PRF_VERIFY_DATA_SERVER_LABEL: &str = "server finished";

pub(crate) const MASTER_SECRET_LENGTH: usize = 48;
pub(crate) const PRF_KEY_LEN: usize = 16;
pub(crate) const PRF_IV_LEN: usize = 4;

#[derive(PartialEq, Eq, Debug, Clone)]
pub(crate) struct EncryptionKeys {
    pub(crate) client_write_key: Vec<u8>,
    pub(crate) server_write_key: Vec<u8>,
    pub(crate) client_write_iv: Vec<u8>,
    pub(crate) server_write_iv: Vec<u8>,
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| Error::Other(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// P_hash from RFC 5246 section 5 with SHA-256.
///
/// ```text
/// P_hash(secret, seed) = HMAC_hash(secret, A(1) + seed) +
///                        HMAC_hash(secret, A(2) + seed) + ...
/// A(0) = seed
/// A(i) = HMAC_hash(secret, A(i-1))
/// ```
pub(crate) fn prf_p_hash(secret: &[u8], seed: &[u8], requested_length: usize) -> Result<Vec<u8>> {
    let mut last_round = seed.to_vec();
    let mut out = Vec::with_capacity(requested_length + 32);

    while out.len() < requested_length {
        last_round = hmac_sha256(secret, &[&last_round])?;
        out.extend_from_slice(&hmac_sha256(secret, &[&last_round, seed])?);
    }

    out.truncate(requested_length);
    Ok(out)
}

pub(crate) fn prf_master_secret(
    pre_master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
) -> Result<Vec<u8>> {
    let mut seed = PRF_MASTER_SECRET_LABEL.as_bytes().to_vec();
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    prf_p_hash(pre_master_secret, &seed, MASTER_SECRET_LENGTH)
}

/// RFC 7627 master secret, bound to the hash of the handshake transcript
/// through the ClientKeyExchange.
pub(crate) fn prf_extended_master_secret(
    pre_master_secret: &[u8],
    session_hash: &[u8],
) -> Result<Vec<u8>> {
    let mut seed = PRF_EXTENDED_MASTER_SECRET_LABEL.as_bytes().to_vec();
    seed.extend_from_slice(session_hash);
    prf_p_hash(pre_master_secret, &seed, MASTER_SECRET_LENGTH)
}

pub(crate) fn session_hash(handshake_bodies: &[u8]) -> Vec<u8> {
    Sha256::digest(handshake_bodies).to_vec()
}

pub(crate) fn prf_encryption_keys(
    master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
) -> Result<EncryptionKeys> {
    let mut seed = PRF_KEY_EXPANSION_LABEL.as_bytes().to_vec();
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);

    let material = prf_p_hash(master_secret, &seed, 2 * PRF_KEY_LEN + 2 * PRF_IV_LEN)?;
    let (client_write_key, rest) = material.split_at(PRF_KEY_LEN);
    let (server_write_key, rest) = rest.split_at(PRF_KEY_LEN);
    let (client_write_iv, server_write_iv) = rest.split_at(PRF_IV_LEN);

    Ok(EncryptionKeys {
        client_write_key: client_write_key.to_vec(),
        server_write_key: server_write_key.to_vec(),
        client_write_iv: client_write_iv.to_vec(),
        server_write_iv: server_write_iv.to_vec(),
    })
}

fn prf_verify_data(master_secret: &[u8], handshake_bodies: &[u8], label: &str) -> Result<Vec<u8>> {
    let hash = Sha256::digest(handshake_bodies);

    let mut seed = label.as_bytes().to_vec();
    seed.extend_from_slice(&hash);
    prf_p_hash(master_secret, &seed, VERIFY_DATA_LENGTH)
}

pub(crate) fn prf_verify_data_client(
    master_secret: &[u8],
    handshake_bodies: &[u8],
) -> Result<Vec<u8>> {
    prf_verify_data(master_secret, handshake_bodies, PRF_VERIFY_DATA_CLIENT_LABEL)
}

pub(crate) fn prf_verify_data_server(
    master_secret: &[u8],
    handshake_bodies: &[u8],
) -> Result<Vec<u8>> {
    prf_verify_data(master_secret, handshake_bodies, PRF_VERIFY_DATA_SERVER_LABEL)
}

/// RFC 5705 exporter without context.
pub(crate) fn prf_export(
    master_secret: &[u8],
    label: &str,
    client_random: &[u8],
    server_random: &[u8],
    length: usize,
) -> Result<Vec<u8>> {
    let mut seed = label.as_bytes().to_vec();
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    prf_p_hash(master_secret, &seed, length)
}
