use bytes::BytesMut;
use log::trace;

use shared::error::{Error, Result};

use crate::context::Context;
use crate::option::*;
use crate::protection_profile::{ProtectionProfile, SRTP_MASTER_KEY_KEY_LEN, SRTP_MASTER_KEY_LEN};

/// Default anti-replay window in packets for inbound sessions.
pub const DEFAULT_SESSION_SRTP_REPLAY_PROTECTION_WINDOW: usize = 64;
pub const DEFAULT_SESSION_SRTCP_REPLAY_PROTECTION_WINDOW: usize = 64;

/// One direction of an SRTP association: either only protects (send) or
/// only unprotects (receive).
pub struct SrtpSession {
    context: Context,
}

fn split_master_key<'a>(
    cipher_suite: &str,
    key: &'a [u8],
) -> Result<(ProtectionProfile, &'a [u8], &'a [u8])> {
    let profile = ProtectionProfile::from_cipher_suite_name(cipher_suite)
        .ok_or_else(|| Error::ErrUnsupportedCipherSuite(cipher_suite.to_owned()))?;
    if key.len() != SRTP_MASTER_KEY_LEN {
        return Err(Error::ErrShortSrtpMasterKey(SRTP_MASTER_KEY_LEN, key.len()));
    }
    let (master_key, master_salt) = key.split_at(SRTP_MASTER_KEY_KEY_LEN);
    Ok((profile, master_key, master_salt))
}

fn replay_option(window: usize, srtcp: bool) -> ContextOption {
    match (window, srtcp) {
        (0, false) => srtp_no_replay_protection(),
        (0, true) => srtcp_no_replay_protection(),
        (n, false) => srtp_replay_protection(n),
        (n, true) => srtcp_replay_protection(n),
    }
}

impl SrtpSession {
    /// Outbound session from a 30-byte master key||salt.
    pub fn new_send(cipher_suite: &str, key: &[u8]) -> Result<Self> {
        let (profile, master_key, master_salt) = split_master_key(cipher_suite, key)?;
        let context = Context::new(master_key, master_salt, profile, None, None)?;
        trace!("srtp send session created with {}", profile);
        Ok(SrtpSession { context })
    }

    /// Inbound session. A zero window disables replay protection.
    pub fn new_recv(
        cipher_suite: &str,
        key: &[u8],
        srtp_replay_window: usize,
        srtcp_replay_window: usize,
    ) -> Result<Self> {
        let (profile, master_key, master_salt) = split_master_key(cipher_suite, key)?;
        let context = Context::new(
            master_key,
            master_salt,
            profile,
            Some(replay_option(srtp_replay_window, false)),
            Some(replay_option(srtcp_replay_window, true)),
        )?;
        trace!("srtp recv session created with {}", profile);
        Ok(SrtpSession { context })
    }

    pub fn profile(&self) -> ProtectionProfile {
        self.context.profile()
    }

    pub fn protect_rtp(&mut self, packet: &[u8]) -> Result<BytesMut> {
        self.context.encrypt_rtp(packet)
    }

    pub fn protect_rtcp(&mut self, packet: &[u8]) -> Result<BytesMut> {
        self.context.encrypt_rtcp(packet)
    }

    pub fn unprotect_rtp(&mut self, packet: &[u8]) -> Result<BytesMut> {
        self.context.decrypt_rtp(packet)
    }

    pub fn unprotect_rtcp(&mut self, packet: &[u8]) -> Result<BytesMut> {
        self.context.decrypt_rtcp(packet)
    }
}
