use bytes::BytesMut;

use shared::error::{Error, Result};
use shared::util::{get_rtp_header_len, get_rtp_seq_num, get_rtp_ssrc};

use super::Context;

/// RTP header fields the cipher needs.
struct RtpHeaderView {
    header_len: usize,
    sequence_number: u16,
    ssrc: u32,
}

fn parse_rtp_header(buf: &[u8]) -> Result<RtpHeaderView> {
    let header_len = get_rtp_header_len(buf).ok_or(Error::ErrTooShortRtp)?;
    let sequence_number = get_rtp_seq_num(buf).ok_or(Error::ErrTooShortRtp)?;
    let ssrc = get_rtp_ssrc(buf).ok_or(Error::ErrTooShortRtp)?;
    Ok(RtpHeaderView {
        header_len,
        sequence_number,
        ssrc,
    })
}

impl Context {
    /// decrypt_rtp decrypts a RTP packet with an encrypted payload
    pub fn decrypt_rtp(&mut self, encrypted: &[u8]) -> Result<BytesMut> {
        let header = parse_rtp_header(encrypted)?;
        if encrypted.len() < header.header_len + self.cipher.rtp_auth_tag_len() {
            return Err(Error::ErrTooShortRtp);
        }

        let (roc, diff) = {
            let state = self.get_srtp_ssrc_state(header.ssrc);
            let (roc, diff, _) = state.next_rollover_count(header.sequence_number);
            if let Some(replay_detector) = &mut state.replay_detector {
                let index = ((roc as u64) << 16) | header.sequence_number as u64;
                if !replay_detector.check(index) {
                    return Err(Error::ErrSrtpSsrcDuplicated(
                        header.ssrc,
                        header.sequence_number,
                    ));
                }
            }
            (roc, diff)
        };

        let dst = self.cipher.decrypt_rtp(
            encrypted,
            header.header_len,
            header.sequence_number,
            header.ssrc,
            roc,
        )?;

        {
            let state = self.get_srtp_ssrc_state(header.ssrc);
            if let Some(replay_detector) = &mut state.replay_detector {
                replay_detector.accept();
            }
            state.update_rollover_count(header.sequence_number, diff);
        }

        Ok(dst)
    }

    /// encrypt_rtp encrypts the payload of an RTP packet and appends the auth tag.
    pub fn encrypt_rtp(&mut self, plaintext: &[u8]) -> Result<BytesMut> {
        let header = parse_rtp_header(plaintext)?;

        let roc = {
            let state = self.get_srtp_ssrc_state(header.ssrc);
            let (roc, diff, ovf) = state.next_rollover_count(header.sequence_number);
            if ovf {
                // ... when 2^48 SRTP packets or 2^31 SRTCP packets have been secured with the same key
                // (whichever occurs before), the key management MUST be called to provide new master key(s)
                // (previously stored and used keys MUST NOT be used again), or the session MUST be terminated.
                // https://www.rfc-editor.org/rfc/rfc3711#section-9.2
                return Err(Error::ErrExceededMaxPackets);
            }
            state.update_rollover_count(header.sequence_number, diff);
            roc
        };

        self.cipher.encrypt_rtp(
            plaintext,
            header.header_len,
            header.sequence_number,
            header.ssrc,
            roc,
        )
    }
}
