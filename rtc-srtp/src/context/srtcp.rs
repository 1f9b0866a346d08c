use bytes::BytesMut;

use shared::error::{Error, Result};
use shared::util::get_rtcp_ssrc;

use super::Context;
use crate::option::MAX_SRTCP_INDEX;

const SRTCP_INDEX_SIZE: usize = 4;
const RTCP_HEADER_LEN: usize = 8;

impl Context {
    /// decrypt_rtcp decrypts a buffer that contains a RTCP packet
    pub fn decrypt_rtcp(&mut self, encrypted: &[u8]) -> Result<BytesMut> {
        if encrypted.len() < RTCP_HEADER_LEN + SRTCP_INDEX_SIZE + self.cipher.rtcp_auth_tag_len() {
            return Err(Error::ErrTooShortRtcp);
        }

        let index = self.cipher.get_rtcp_index(encrypted);
        let ssrc = get_rtcp_ssrc(encrypted).ok_or(Error::ErrTooShortRtcp)?;

        {
            let state = self.get_srtcp_ssrc_state(ssrc);
            if let Some(replay_detector) = &mut state.replay_detector {
                if !replay_detector.check(index as u64) {
                    return Err(Error::ErrSrtcpSsrcDuplicated(ssrc, index));
                }
            }
        }

        let dst = self.cipher.decrypt_rtcp(encrypted, index, ssrc)?;

        {
            let state = self.get_srtcp_ssrc_state(ssrc);
            if let Some(replay_detector) = &mut state.replay_detector {
                replay_detector.accept();
            }
        }

        Ok(dst)
    }

    /// encrypt_rtcp encrypts everything after the first RTCP header and appends
    /// the E-flag, SRTCP index and auth tag.
    pub fn encrypt_rtcp(&mut self, decrypted: &[u8]) -> Result<BytesMut> {
        if decrypted.len() < RTCP_HEADER_LEN {
            return Err(Error::ErrTooShortRtcp);
        }

        let ssrc = get_rtcp_ssrc(decrypted).ok_or(Error::ErrTooShortRtcp)?;

        let index = {
            let state = self.get_srtcp_ssrc_state(ssrc);
            state.srtcp_index += 1;
            if state.srtcp_index > MAX_SRTCP_INDEX {
                state.srtcp_index = 0;
            }
            state.srtcp_index
        };

        self.cipher.encrypt_rtcp(decrypted, index, ssrc)
    }
}
