
use std::time::{Duration, Instant};

use bytes::BytesMut;
use log::{debug, error, trace, warn};

use shared::error::{Error, Result};
use shared::util::{get_rtcp_ssrc, get_rtp_seq_num, get_rtp_ssrc};
use shared::{ContentAction, ContentSource};

use crate::crypto_params::{CryptoParams, parse_key_params};
use crate::session::*;
use crate::stat::{SrtpEvent, SrtpMode, SrtpStat};

/// Negotiation state of an [`SrtpFilter`]. The ordering is meaningful:
/// every state from `Active` on has keys installed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SrtpFilterState {
    Init,
    SentOffer,
    ReceivedOffer,
    SentPrAnswerNoCrypto,
    ReceivedPrAnswerNoCrypto,
    Active,
    SentUpdatedOffer,
    ReceivedUpdatedOffer,
    SentPrAnswer,
    ReceivedPrAnswer,
}

/// Keys one DTLS association exported for a transport. Each key is the
/// master key followed by the master salt.
#[derive(Debug, Copy, Clone)]
pub struct DtlsSrtpKeys<'a> {
    pub cipher_suite: &'a str,
    pub send_key: &'a [u8],
    pub recv_key: &'a [u8],
}

/// SrtpFilter negotiates SDES crypto params (or takes DTLS-SRTP keys
/// directly) and protects/unprotects RTP and RTCP with the result.
pub struct SrtpFilter {
    state: SrtpFilterState,
    offer_params: Vec<CryptoParams>,

    send_session: Option<SrtpSession>,
    recv_session: Option<SrtpSession>,
    send_rtcp_session: Option<SrtpSession>,
    recv_rtcp_session: Option<SrtpSession>,

    applied_send_params: CryptoParams,
    applied_recv_params: CryptoParams,

    srtp_replay_window: usize,
    srtcp_replay_window: usize,
    stat: SrtpStat,
}

impl Default for SrtpFilter {
    fn default() -> Self {
        SrtpFilter {
            state: SrtpFilterState::Init,
            offer_params: vec![],
            send_session: None,
            recv_session: None,
            send_rtcp_session: None,
            recv_rtcp_session: None,
            applied_send_params: CryptoParams::default(),
            applied_recv_params: CryptoParams::default(),
            srtp_replay_window: DEFAULT_SESSION_SRTP_REPLAY_PROTECTION_WINDOW,
            srtcp_replay_window: DEFAULT_SESSION_SRTCP_REPLAY_PROTECTION_WINDOW,
            stat: SrtpStat::default(),
        }
    }
}

impl SrtpFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SrtpFilterState {
        self.state
    }

    /// Whether keys are installed and packets can be (un)protected.
    pub fn is_active(&self) -> bool {
        self.state >= SrtpFilterState::Active
    }

    /// Replay windows for receive sessions created from now on. 0 disables
    /// replay protection.
    pub fn set_replay_protection_windows(&mut self, srtp: usize, srtcp: usize) {
        self.srtp_replay_window = srtp;
        self.srtcp_replay_window = srtcp;
    }

    pub fn set_signal_silent_time(&mut self, signal_silent_time: Duration) {
        self.stat.set_signal_silent_time(signal_silent_time);
    }

    /// Dispatches a negotiation step by content action. Updates carry no
    /// crypto change and are accepted as-is.
    pub fn apply(
        &mut self,
        action: ContentAction,
        params: &[CryptoParams],
        source: ContentSource,
    ) -> Result<()> {
        match action {
            ContentAction::Offer => self.set_offer(params, source),
            ContentAction::PrAnswer => self.set_provisional_answer(params, source),
            ContentAction::Answer => self.set_answer(params, source),
            ContentAction::Update => Ok(()),
        }
    }

    pub fn set_offer(&mut self, offer_params: &[CryptoParams], source: ContentSource) -> Result<()> {
        if !self.expect_offer(source) {
            error!("wrong state to update SRTP offer: {:?}", self.state);
            return Err(Error::ErrSrtpUnexpectedOffer);
        }
        self.store_params(offer_params, source);
        Ok(())
    }

    pub fn set_provisional_answer(
        &mut self,
        answer_params: &[CryptoParams],
        source: ContentSource,
    ) -> Result<()> {
        self.do_set_answer(answer_params, source, false)
    }

    pub fn set_answer(&mut self, answer_params: &[CryptoParams], source: ContentSource) -> Result<()> {
        self.do_set_answer(answer_params, source, true)
    }

    /// Installs DTLS-SRTP keys for RTP (and RTCP when no dedicated RTCP
    /// sessions are set later).
    pub fn set_rtp_params(
        &mut self,
        send_cs: &str,
        send_key: &[u8],
        recv_cs: &str,
        recv_key: &[u8],
    ) -> Result<()> {
        if self.is_active() {
            error!("tried to set SRTP params when filter already active");
            return Err(Error::ErrSrtpAlreadyActive);
        }

        self.send_session = Some(SrtpSession::new_send(send_cs, send_key)?);
        self.recv_session = Some(SrtpSession::new_recv(
            recv_cs,
            recv_key,
            self.srtp_replay_window,
            self.srtcp_replay_window,
        )?);
        self.state = SrtpFilterState::Active;

        debug!(
            "SRTP activated with negotiated parameters: send cipher_suite {} recv cipher_suite {}",
            send_cs, recv_cs
        );
        Ok(())
    }

    /// Installs the RTP keys and, when RTCP runs on its own transport, the
    /// RTCP keys in one step. On error the filter is unchanged.
    pub fn set_dtls_params(
        &mut self,
        rtp: DtlsSrtpKeys<'_>,
        rtcp: Option<DtlsSrtpKeys<'_>>,
    ) -> Result<()> {
        if self.is_active() {
            error!("tried to set DTLS-SRTP params when filter already active");
            return Err(Error::ErrSrtpAlreadyActive);
        }

        let (send, recv) = self.dtls_sessions(&rtp)?;
        let rtcp_sessions = rtcp.map(|keys| self.dtls_sessions(&keys)).transpose()?;

        self.send_session = Some(send);
        self.recv_session = Some(recv);
        if let Some((send, recv)) = rtcp_sessions {
            self.send_rtcp_session = Some(send);
            self.recv_rtcp_session = Some(recv);
        }
        self.state = SrtpFilterState::Active;
        debug!(
            "SRTP activated with DTLS keys: cipher_suite {} (rtcp {:?})",
            rtp.cipher_suite,
            rtcp.map(|keys| keys.cipher_suite)
        );
        Ok(())
    }

    fn dtls_sessions(&self, keys: &DtlsSrtpKeys<'_>) -> Result<(SrtpSession, SrtpSession)> {
        let send = SrtpSession::new_send(keys.cipher_suite, keys.send_key)?;
        let recv = SrtpSession::new_recv(
            keys.cipher_suite,
            keys.recv_key,
            self.srtp_replay_window,
            self.srtcp_replay_window,
        )?;
        Ok((send, recv))
    }

    /// Dedicated RTCP sessions for a non-muxed RTCP transport. Can be set
    /// once, after the RTP params.
    pub fn set_rtcp_params(
        &mut self,
        send_cs: &str,
        send_key: &[u8],
        recv_cs: &str,
        recv_key: &[u8],
    ) -> Result<()> {
        if !self.is_active() {
            error!("tried to set SRTCP params before SRTP is active");
            return Err(Error::ErrSrtpNotActive);
        }
        if self.send_rtcp_session.is_some() || self.recv_rtcp_session.is_some() {
            error!("tried to set SRTCP params when filter already active");
            return Err(Error::ErrSrtpAlreadyActive);
        }

        let send = SrtpSession::new_send(send_cs, send_key)?;
        let recv = SrtpSession::new_recv(
            recv_cs,
            recv_key,
            self.srtp_replay_window,
            self.srtcp_replay_window,
        )?;
        self.send_rtcp_session = Some(send);
        self.recv_rtcp_session = Some(recv);
        Ok(())
    }

    pub fn protect_rtp(&mut self, packet: &[u8]) -> Result<BytesMut> {
        if !self.is_active() {
            warn!("failed to protect SRTP packet: SRTP not active");
            return Err(Error::ErrSrtpNotActive);
        }
        let session = self.send_session.as_mut().ok_or(Error::ErrSrtpNotActive)?;
        let result = session.protect_rtp(packet);
        if let Err(err) = &result {
            let ssrc = get_rtp_ssrc(packet).unwrap_or(0);
            let seq = get_rtp_seq_num(packet).unwrap_or(0);
            warn!(
                "failed to protect SRTP packet, seqnum={}, SSRC={}: {}",
                seq, ssrc, err
            );
            self.stat
                .add_result(ssrc, SrtpMode::Protect, err, Instant::now());
        }
        result
    }

    pub fn protect_rtcp(&mut self, packet: &[u8]) -> Result<BytesMut> {
        if !self.is_active() {
            warn!("failed to protect SRTCP packet: SRTP not active");
            return Err(Error::ErrSrtpNotActive);
        }
        let session = match self.send_rtcp_session.as_mut() {
            Some(session) => session,
            None => self.send_session.as_mut().ok_or(Error::ErrSrtpNotActive)?,
        };
        let result = session.protect_rtcp(packet);
        if let Err(err) = &result {
            warn!("failed to protect SRTCP packet: {}", err);
            self.stat.add_result(0, SrtpMode::Protect, err, Instant::now());
        }
        result
    }

    pub fn unprotect_rtp(&mut self, packet: &[u8]) -> Result<BytesMut> {
        if !self.is_active() {
            warn!("failed to unprotect SRTP packet: SRTP not active");
            return Err(Error::ErrSrtpNotActive);
        }
        let session = self.recv_session.as_mut().ok_or(Error::ErrSrtpNotActive)?;
        let result = session.unprotect_rtp(packet);
        if let Err(err) = &result {
            let ssrc = get_rtp_ssrc(packet).unwrap_or(0);
            let seq = get_rtp_seq_num(packet).unwrap_or(0);
            warn!(
                "failed to unprotect SRTP packet, seqnum={}, SSRC={}: {}",
                seq, ssrc, err
            );
            self.stat
                .add_result(ssrc, SrtpMode::Unprotect, err, Instant::now());
        }
        result
    }

    pub fn unprotect_rtcp(&mut self, packet: &[u8]) -> Result<BytesMut> {
        if !self.is_active() {
            warn!("failed to unprotect SRTCP packet: SRTP not active");
            return Err(Error::ErrSrtpNotActive);
        }
        let session = match self.recv_rtcp_session.as_mut() {
            Some(session) => session,
            None => self.recv_session.as_mut().ok_or(Error::ErrSrtpNotActive)?,
        };
        let result = session.unprotect_rtcp(packet);
        if let Err(err) = &result {
            let ssrc = get_rtcp_ssrc(packet).unwrap_or(0);
            warn!("failed to unprotect SRTCP packet, SSRC={}: {}", ssrc, err);
            self.stat
                .add_result(0, SrtpMode::Unprotect, err, Instant::now());
        }
        result
    }

    /// Next throttled error report, if any.
    pub fn poll_event(&mut self) -> Option<SrtpEvent> {
        self.stat.poll_event()
    }

    fn expect_offer(&self, source: ContentSource) -> bool {
        use SrtpFilterState::*;
        match (self.state, source) {
            (Init | Active, _) => true,
            (SentOffer | SentUpdatedOffer, ContentSource::Local) => true,
            (ReceivedOffer | ReceivedUpdatedOffer, ContentSource::Remote) => true,
            _ => false,
        }
    }

    fn expect_answer(&self, source: ContentSource) -> bool {
        use SrtpFilterState::*;
        match (self.state, source) {
            (SentOffer | SentUpdatedOffer, ContentSource::Remote) => true,
            (ReceivedOffer | ReceivedUpdatedOffer, ContentSource::Local) => true,
            (SentPrAnswerNoCrypto | SentPrAnswer, ContentSource::Local) => true,
            (ReceivedPrAnswerNoCrypto | ReceivedPrAnswer, ContentSource::Remote) => true,
            _ => false,
        }
    }

    fn store_params(&mut self, params: &[CryptoParams], source: ContentSource) {
        use SrtpFilterState::*;
        self.offer_params = params.to_vec();
        self.state = match (self.state, source) {
            (Init, ContentSource::Local) => SentOffer,
            (Init, ContentSource::Remote) => ReceivedOffer,
            (Active, ContentSource::Local) => SentUpdatedOffer,
            (Active, ContentSource::Remote) => ReceivedUpdatedOffer,
            (state, _) => state,
        };
    }

    fn do_set_answer(
        &mut self,
        answer_params: &[CryptoParams],
        source: ContentSource,
        is_final: bool,
    ) -> Result<()> {
        use SrtpFilterState::*;

        if !self.expect_answer(source) {
            error!("invalid state for SRTP answer: {:?}", self.state);
            return Err(Error::ErrSrtpUnexpectedAnswer);
        }

        // If the answer doesn't request crypto complete the negotiation of an
        // unencrypted session. Otherwise finalize the parameters and apply them.
        if answer_params.is_empty() {
            if is_final {
                self.reset_params();
            } else {
                self.state = match source {
                    ContentSource::Local => SentPrAnswerNoCrypto,
                    ContentSource::Remote => ReceivedPrAnswerNoCrypto,
                };
            }
            return Ok(());
        }

        let selected = self.negotiate_params(answer_params)?;
        let (send_params, recv_params) = match source {
            ContentSource::Remote => (selected, answer_params[0].clone()),
            ContentSource::Local => (answer_params[0].clone(), selected),
        };
        self.apply_params(&send_params, &recv_params)?;

        if is_final {
            self.offer_params.clear();
            self.state = Active;
        } else {
            self.state = match source {
                ContentSource::Local => SentPrAnswer,
                ContentSource::Remote => ReceivedPrAnswer,
            };
        }
        Ok(())
    }

    fn negotiate_params(&self, answer_params: &[CryptoParams]) -> Result<CryptoParams> {
        // We're processing an accept. We should have exactly one set of params,
        // unless the offer didn't mention crypto, in which case we shouldn't be here.
        if answer_params.len() != 1 || self.offer_params.is_empty() {
            warn!(
                "invalid parameters in SRTP answer: {} answer params, {} offer params",
                answer_params.len(),
                self.offer_params.len()
            );
            return Err(Error::ErrSrtpInvalidAnswer(answer_params.len()));
        }

        // We should find a match between the answer params and the offered params.
        self.offer_params
            .iter()
            .find(|offer| offer.matches(&answer_params[0]))
            .cloned()
            .ok_or_else(|| {
                warn!("invalid parameters in SRTP answer: no matching offered suite");
                Error::ErrSrtpNoMatchingCrypto
            })
    }

    fn apply_params(&mut self, send_params: &CryptoParams, recv_params: &CryptoParams) -> Result<()> {
        if self.applied_send_params == *send_params
            && self.applied_recv_params == *recv_params
            && self.send_session.is_some()
            && self.recv_session.is_some()
        {
            trace!("applying the same SRTP parameters again, no-op");
            return Ok(());
        }

        let send_key = parse_key_params(&send_params.key_params)?;
        let recv_key = parse_key_params(&recv_params.key_params)?;

        let send = SrtpSession::new_send(&send_params.cipher_suite, &send_key)?;
        let recv = SrtpSession::new_recv(
            &recv_params.cipher_suite,
            &recv_key,
            self.srtp_replay_window,
            self.srtcp_replay_window,
        )?;
        self.send_session = Some(send);
        self.recv_session = Some(recv);
        self.applied_send_params = send_params.clone();
        self.applied_recv_params = recv_params.clone();

        debug!(
            "SRTP activated with negotiated parameters: send cipher_suite {} recv cipher_suite {}",
            send_params.cipher_suite, recv_params.cipher_suite
        );
        Ok(())
    }

    fn reset_params(&mut self) {
        self.offer_params.clear();
        self.send_session = None;
        self.recv_session = None;
        self.send_rtcp_session = None;
        self.recv_rtcp_session = None;
        self.applied_send_params = CryptoParams::default();
        self.applied_recv_params = CryptoParams::default();
        self.state = SrtpFilterState::Init;
        debug!("SRTP reset to init state");
    }
}
