
use log::{info, warn};

use shared::util::{RTCP_TYPE_SDES, get_rtcp_ssrc, get_rtcp_type, get_rtp_ssrc};

use crate::media::stream_params::StreamParams;

/// RTCP from this SSRC is not tied to a stream and always accepted.
const SENDER_SSRC_PLACEHOLDER: u32 = 1;

/// Accepts only packets whose SSRC belongs to one of the signaled remote
/// streams. An empty filter is inactive and the channel skips it.
#[derive(Default, Debug, Clone)]
pub struct SsrcFilter {
    streams: Vec<StreamParams>,
}

impl SsrcFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stream(&mut self, stream: StreamParams) -> bool {
        if self.find_stream(stream.first_ssrc()) {
            warn!("ssrc filter: stream with ssrc {} already added", stream.first_ssrc());
            return false;
        }
        self.streams.push(stream);
        true
    }

    /// Removes every stream that carries `ssrc`.
    pub fn remove_stream(&mut self, ssrc: u32) -> bool {
        let before = self.streams.len();
        self.streams.retain(|stream| !stream.has_ssrc(ssrc));
        self.streams.len() != before
    }

    pub fn find_stream(&self, ssrc: u32) -> bool {
        ssrc != 0 && self.streams.iter().any(|stream| stream.has_ssrc(ssrc))
    }

    pub fn is_active(&self) -> bool {
        !self.streams.is_empty()
    }

    pub fn streams(&self) -> &[StreamParams] {
        &self.streams
    }

    pub fn demux_packet(&self, data: &[u8], rtcp: bool) -> bool {
        if !rtcp {
            return self.find_stream(get_rtp_ssrc(data).unwrap_or(0));
        }

        let Some(pl_type) = get_rtcp_type(data) else {
            return false;
        };
        // SDES carries no media SSRC of its own.
        if pl_type == RTCP_TYPE_SDES {
            info!("ssrc filter: accepting SDES packet");
            return true;
        }
        match get_rtcp_ssrc(data) {
            None => false,
            Some(SENDER_SSRC_PLACEHOLDER) => true,
            Some(ssrc) => self.find_stream(ssrc),
        }
    }
}
