use serde::{Deserialize, Serialize};

use srtp::CryptoParams;

use crate::media::codec::Codec;
use crate::media::stream_params::StreamParams;
use crate::media::{MediaContentDirection, MediaType};

/// Let the media engine pick the send bandwidth.
pub const AUTO_BANDWIDTH: i32 = -1;

/// An RTP header extension and the id it is negotiated with.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpHeaderExtension {
    pub uri: String,
    pub id: u8,
}

impl RtpHeaderExtension {
    pub fn new(uri: &str, id: u8) -> Self {
        RtpHeaderExtension {
            uri: uri.to_owned(),
            id,
        }
    }
}

/// The media section of a session description, as applied to one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaContentDescription {
    pub media_type: MediaType,
    pub codecs: Vec<Codec>,
    pub streams: Vec<StreamParams>,
    pub cryptos: Vec<CryptoParams>,
    pub crypto_required: bool,
    pub rtcp_mux: bool,
    pub rtp_header_extensions: Vec<RtpHeaderExtension>,
    /// Whether `rtp_header_extensions` is meaningful. An unset list leaves
    /// the channel's extensions untouched.
    pub rtp_header_extensions_set: bool,
    pub direction: MediaContentDirection,
    /// Bits per second, or `AUTO_BANDWIDTH`.
    pub bandwidth: i32,
    pub conference_mode: bool,
    /// Audio only.
    pub agc_minus_10db: bool,
}

impl MediaContentDescription {
    pub fn new(media_type: MediaType) -> Self {
        MediaContentDescription {
            media_type,
            codecs: vec![],
            streams: vec![],
            cryptos: vec![],
            crypto_required: false,
            rtcp_mux: false,
            rtp_header_extensions: vec![],
            rtp_header_extensions_set: false,
            direction: MediaContentDirection::SendRecv,
            bandwidth: AUTO_BANDWIDTH,
            conference_mode: false,
            agc_minus_10db: false,
        }
    }

    pub fn has_codecs(&self) -> bool {
        !self.codecs.is_empty()
    }

    pub fn set_rtp_header_extensions(&mut self, extensions: Vec<RtpHeaderExtension>) {
        self.rtp_header_extensions = extensions;
        self.rtp_header_extensions_set = true;
    }

    pub fn add_stream(&mut self, sp: StreamParams) {
        self.streams.push(sp);
    }
}
