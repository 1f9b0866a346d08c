#[cfg(test)]
mod context_test;

pub mod srtcp;
pub mod srtp;

use std::collections::HashMap;

use shared::error::Result;
use shared::replay_detector::ReplayDetector;

use crate::cipher::Cipher;
use crate::cipher::cipher_aes_cm_hmac_sha1::CipherAesCmHmacSha1;
use crate::option::*;
use crate::protection_profile::ProtectionProfile;

/// Encrypt/Decrypt state for a single SRTP SSRC
#[derive(Default)]
pub(crate) struct SrtpSsrcState {
    ssrc: u32,
    index: u64,
    rollover_has_processed: bool,
    replay_detector: Option<Box<dyn ReplayDetector + Send>>,
}

/// Encrypt/Decrypt state for a single SRTCP SSRC
#[derive(Default)]
pub(crate) struct SrtcpSsrcState {
    srtcp_index: usize,
    ssrc: u32,
    replay_detector: Option<Box<dyn ReplayDetector + Send>>,
}

impl SrtpSsrcState {
    /// Estimates the rollover counter for an incoming sequence number,
    /// RFC 3711 Appendix A. Returns (roc, index delta, exhausted).
    pub fn next_rollover_count(&self, sequence_number: u16) -> (u32, i64, bool) {
        let local_roc = (self.index >> 16) as u32;
        let local_seq = self.index as u16;

        let mut guess_roc = local_roc;

        let diff = if self.rollover_has_processed {
            let seq = (sequence_number as i64) - (local_seq as i64);
            // With a zero ROC there is no previous epoch to fall back to.
            if self.index > SEQ_NUM_MEDIAN as u64 {
                if local_seq < SEQ_NUM_MEDIAN {
                    if seq > SEQ_NUM_MEDIAN as i64 {
                        guess_roc = local_roc.wrapping_sub(1);
                        seq - (SEQ_NUM_MAX as i64 + 1)
                    } else {
                        seq
                    }
                } else if local_seq - SEQ_NUM_MEDIAN > sequence_number {
                    guess_roc = local_roc.wrapping_add(1);
                    seq + (SEQ_NUM_MAX as i64 + 1)
                } else {
                    seq
                }
            } else {
                seq
            }
        } else {
            0
        };

        (guess_roc, diff, guess_roc == 0 && local_roc == MAX_ROC)
    }

    /// Commits the estimate once the packet was authenticated.
    pub fn update_rollover_count(&mut self, sequence_number: u16, diff: i64) {
        if !self.rollover_has_processed {
            self.index |= sequence_number as u64;
            self.rollover_has_processed = true;
        } else if diff > 0 {
            self.index = self.index.wrapping_add(diff as u64);
        }
    }
}

/// Context represents a SRTP cryptographic context.
/// Context can only be used for one-way operations.
/// it must either used ONLY for encryption or ONLY for decryption.
pub struct Context {
    cipher: Box<dyn Cipher + Send>,
    profile: ProtectionProfile,

    srtp_ssrc_states: HashMap<u32, SrtpSsrcState>,
    srtcp_ssrc_states: HashMap<u32, SrtcpSsrcState>,

    new_srtp_replay_detector: ContextOption,
    new_srtcp_replay_detector: ContextOption,
}

impl Context {
    /// Creates a new SRTP context. A `None` option disables replay
    /// protection for that direction.
    pub fn new(
        master_key: &[u8],
        master_salt: &[u8],
        profile: ProtectionProfile,
        srtp_ctx_opt: Option<ContextOption>,
        srtcp_ctx_opt: Option<ContextOption>,
    ) -> Result<Context> {
        let cipher: Box<dyn Cipher + Send> =
            Box::new(CipherAesCmHmacSha1::new(profile, master_key, master_salt)?);

        let new_srtp_replay_detector = srtp_ctx_opt.unwrap_or_else(srtp_no_replay_protection);
        let new_srtcp_replay_detector = srtcp_ctx_opt.unwrap_or_else(srtcp_no_replay_protection);

        Ok(Context {
            cipher,
            profile,
            srtp_ssrc_states: HashMap::new(),
            srtcp_ssrc_states: HashMap::new(),
            new_srtp_replay_detector,
            new_srtcp_replay_detector,
        })
    }

    pub fn profile(&self) -> ProtectionProfile {
        self.profile
    }

    pub fn rtp_auth_tag_len(&self) -> usize {
        self.cipher.rtp_auth_tag_len()
    }

    pub fn rtcp_auth_tag_len(&self) -> usize {
        self.cipher.rtcp_auth_tag_len()
    }

    fn get_srtp_ssrc_state(&mut self, ssrc: u32) -> &mut SrtpSsrcState {
        let new_detector = &self.new_srtp_replay_detector;
        self.srtp_ssrc_states
            .entry(ssrc)
            .or_insert_with(|| SrtpSsrcState {
                ssrc,
                replay_detector: Some(new_detector()),
                ..Default::default()
            })
    }

    fn get_srtcp_ssrc_state(&mut self, ssrc: u32) -> &mut SrtcpSsrcState {
        let new_detector = &self.new_srtcp_replay_detector;
        self.srtcp_ssrc_states
            .entry(ssrc)
            .or_insert_with(|| SrtcpSsrcState {
                ssrc,
                replay_detector: Some(new_detector()),
                ..Default::default()
            })
    }

    /// roc returns SRTP rollover counter of specified SSRC.
    pub fn get_roc(&self, ssrc: u32) -> Option<u32> {
        self.srtp_ssrc_states
            .get(&ssrc)
            .map(|s| (s.index >> 16) as u32)
    }

    /// set_roc sets SRTP rollover counter of specified SSRC.
    pub fn set_roc(&mut self, ssrc: u32, roc: u32) {
        let state = self.get_srtp_ssrc_state(ssrc);
        state.index = (roc as u64) << 16;
        state.rollover_has_processed = false;
    }

    /// index returns SRTCP index value of specified SSRC.
    pub fn get_index(&self, ssrc: u32) -> Option<usize> {
        self.srtcp_ssrc_states.get(&ssrc).map(|s| s.srtcp_index)
    }

    /// set_index sets SRTCP index value of specified SSRC.
    pub fn set_index(&mut self, ssrc: u32, index: usize) {
        self.get_srtcp_ssrc_state(ssrc).srtcp_index = index % (MAX_SRTCP_INDEX + 1);
    }
}
