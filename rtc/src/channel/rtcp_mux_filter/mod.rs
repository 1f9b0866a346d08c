#[cfg(test)]
mod rtcp_mux_filter_test;

use log::error;
use serde::{Deserialize, Serialize};

use shared::error::{Error, Result};
use shared::{ContentAction, ContentSource};

/// Negotiation state of RTCP multiplexing on the RTP transport.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RtcpMuxState {
    #[default]
    Init,
    SentOffer,
    ReceivedOffer,
    SentPrAnswer,
    ReceivedPrAnswer,
    /// Mux was offered and accepted by a final answer.
    Active,
}

/// Tracks whether RTCP shares the RTP transport, from the a=rtcp-mux offer
/// and answer exchange.
#[derive(Default, Debug, Clone)]
pub struct RtcpMuxFilter {
    state: RtcpMuxState,
    offer_enable: bool,
}

impl RtcpMuxFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RtcpMuxState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            RtcpMuxState::SentPrAnswer | RtcpMuxState::ReceivedPrAnswer | RtcpMuxState::Active
        )
    }

    pub fn apply(&mut self, action: ContentAction, enable: bool, source: ContentSource) -> Result<()> {
        match action {
            ContentAction::Offer => self.set_offer(enable, source),
            ContentAction::PrAnswer => self.set_provisional_answer(enable, source),
            ContentAction::Answer => self.set_answer(enable, source),
            ContentAction::Update => Ok(()),
        }
    }

    pub fn set_offer(&mut self, offer_enable: bool, source: ContentSource) -> Result<()> {
        if !self.expect_offer(offer_enable, source) {
            error!("rtcp mux: invalid state {:?} for offer", self.state);
            return Err(Error::ErrRtcpMuxUnexpectedOffer);
        }
        self.offer_enable = offer_enable;
        self.state = match source {
            ContentSource::Local => RtcpMuxState::SentOffer,
            ContentSource::Remote => RtcpMuxState::ReceivedOffer,
        };
        Ok(())
    }

    pub fn set_provisional_answer(&mut self, answer_enable: bool, source: ContentSource) -> Result<()> {
        if !self.expect_answer(source) {
            error!("rtcp mux: invalid state {:?} for provisional answer", self.state);
            return Err(Error::ErrRtcpMuxUnexpectedAnswer);
        }

        if self.offer_enable {
            if answer_enable {
                self.state = match source {
                    ContentSource::Local => RtcpMuxState::SentPrAnswer,
                    ContentSource::Remote => RtcpMuxState::ReceivedPrAnswer,
                };
            } else {
                // The final answer may still enable mux; go back to the offer.
                self.state = match source {
                    ContentSource::Local => RtcpMuxState::ReceivedOffer,
                    ContentSource::Remote => RtcpMuxState::SentOffer,
                };
            }
        } else if answer_enable {
            error!("rtcp mux: provisional answer enables mux that was not offered");
            return Err(Error::ErrRtcpMuxNotOffered);
        }
        Ok(())
    }

    pub fn set_answer(&mut self, answer_enable: bool, source: ContentSource) -> Result<()> {
        if !self.expect_answer(source) {
            error!("rtcp mux: invalid state {:?} for answer", self.state);
            return Err(Error::ErrRtcpMuxUnexpectedAnswer);
        }

        if self.offer_enable && answer_enable {
            self.state = RtcpMuxState::Active;
        } else if answer_enable {
            error!("rtcp mux: answer enables mux that was not offered");
            return Err(Error::ErrRtcpMuxNotOffered);
        } else {
            self.state = RtcpMuxState::Init;
        }
        Ok(())
    }

    /// Whether `data`, received on the RTP transport, is RTCP. Only
    /// meaningful once mux was offered.
    pub fn demux_rtcp(&self, data: &[u8]) -> bool {
        if !self.offer_enable || self.state < RtcpMuxState::SentOffer {
            return false;
        }
        if data.len() < 2 {
            return false;
        }
        // RTCP packet types 192..=223 with the marker bit folded away.
        let pt = data[1] & 0x7F;
        (64..96).contains(&pt)
    }

    fn expect_offer(&self, offer_enable: bool, source: ContentSource) -> bool {
        match self.state {
            RtcpMuxState::Init => true,
            RtcpMuxState::Active => offer_enable == self.offer_enable,
            RtcpMuxState::SentOffer => source == ContentSource::Local,
            RtcpMuxState::ReceivedOffer => source == ContentSource::Remote,
            _ => false,
        }
    }

    fn expect_answer(&self, source: ContentSource) -> bool {
        matches!(
            (self.state, source),
            (RtcpMuxState::SentOffer, ContentSource::Remote)
                | (RtcpMuxState::ReceivedOffer, ContentSource::Local)
                | (RtcpMuxState::SentPrAnswer, ContentSource::Local)
                | (RtcpMuxState::ReceivedPrAnswer, ContentSource::Remote)
        )
    }
}
