//! The media side of a channel.
//!
//! A [`MediaChannel`] is what a media engine (codecs, capture, playout)
//! exposes to a channel. The channel feeds it unprotected RTP/RTCP and
//! receives its outgoing packets through the [`NetworkInterface`] it
//! installs with [`MediaChannel::set_interface`].

pub mod codec;
pub mod content_description;
pub mod data;
pub mod fake;
pub mod stream_params;
pub mod video;

use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use base::Signal;
use shared::error::{Error, Result};

use crate::transport::SocketOption;
use codec::Codec;
use content_description::RtpHeaderExtension;
use data::{ReceivedData, SendDataParams};
use stream_params::StreamParams;
use video::{VideoCapturer, VideoFormat, VideoRenderer};

/// Media option bit: the call is a multi-party conference.
pub const OPT_CONFERENCE: u32 = 0x10000;
/// Media option bit: lower automatic gain control by 10 dB.
pub const OPT_AGC_MINUS_10DB: u32 = 0x8000_0000;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "data")]
    Data,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Data => "data",
        };
        write!(f, "{s}")
    }
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaContentDirection {
    #[serde(rename = "inactive")]
    Inactive,
    #[serde(rename = "sendonly")]
    SendOnly,
    #[serde(rename = "recvonly")]
    RecvOnly,
    #[default]
    #[serde(rename = "sendrecv")]
    SendRecv,
}

impl MediaContentDirection {
    pub fn is_receiving(&self) -> bool {
        matches!(
            self,
            MediaContentDirection::SendRecv | MediaContentDirection::RecvOnly
        )
    }

    pub fn is_sending(&self) -> bool {
        matches!(
            self,
            MediaContentDirection::SendRecv | MediaContentDirection::SendOnly
        )
    }
}

/// Errors a media channel, or the channel on its behalf, reports.
///
/// Voice uses the `Rec*` (send side) and `Play*` (receive side) names, data
/// channels the `Send*` and `Recv*` ones.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaError {
    #[default]
    None,
    Other,
    RecSrtpError,
    RecSrtpAuthFailed,
    PlaySrtpError,
    PlaySrtpAuthFailed,
    PlaySrtpReplay,
    SendSrtpError,
    SendSrtpAuthFailed,
    RecvSrtpError,
    RecvSrtpAuthFailed,
    RecvSrtpReplay,
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaChannelError {
    pub ssrc: u32,
    pub error: MediaError,
}

/// What a voice channel sends.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendFlags {
    #[default]
    Nothing,
    RingbackTone,
    Microphone,
}

impl From<bool> for SendFlags {
    fn from(send: bool) -> Self {
        if send {
            SendFlags::Microphone
        } else {
            SendFlags::Nothing
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketType {
    Rtp,
    Rtcp,
}

/// How a media channel puts packets on the network. Implemented by the
/// channel that owns it.
pub trait NetworkInterface: Send + Sync {
    fn send_packet(&self, packet: &[u8]) -> bool;
    fn send_rtcp(&self, packet: &[u8]) -> bool;
    fn set_option(&self, socket: SocketType, opt: SocketOption, value: i32) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MediaChannelSignals {
    pub media_error: Signal<MediaChannelError>,
    pub data_received: Signal<ReceivedData>,
}

/// The engine side of a voice, video or data channel.
///
/// Kind specific operations default to `ErrUnsupportedMediaKind`.
pub trait MediaChannel: Send + Sync {
    fn media_type(&self) -> MediaType;

    fn set_interface(&self, iface: Option<Weak<dyn NetworkInterface>>);

    fn set_recv_codecs(&self, codecs: &[Codec]) -> Result<()>;
    fn set_send_codecs(&self, codecs: &[Codec]) -> Result<()>;

    fn add_send_stream(&self, sp: &StreamParams) -> Result<()>;
    fn remove_send_stream(&self, ssrc: u32) -> Result<()>;
    fn add_recv_stream(&self, sp: &StreamParams) -> Result<()>;
    fn remove_recv_stream(&self, ssrc: u32) -> Result<()>;

    fn set_recv_rtp_header_extensions(&self, extensions: &[RtpHeaderExtension]) -> Result<()>;
    fn set_send_rtp_header_extensions(&self, extensions: &[RtpHeaderExtension]) -> Result<()>;

    fn set_send(&self, flags: SendFlags) -> Result<()>;

    /// Playout for voice, rendering for video, receiving for data.
    fn set_receive_enabled(&self, enabled: bool) -> Result<()>;

    /// Replaces the `OPT_*` option bits.
    fn set_options(&self, options: u32) -> Result<()>;
    fn options(&self) -> u32;

    fn mute(&self, muted: bool) -> Result<()>;

    /// `bps` is ignored when `autobw` is set.
    fn set_send_bandwidth(&self, autobw: bool, bps: i32) -> Result<()>;

    fn on_packet_received(&self, packet: &[u8]);
    fn on_rtcp_received(&self, packet: &[u8]);

    fn signals(&self) -> &MediaChannelSignals;

    /// The error behind the most recent failed call.
    fn last_media_error(&self) -> MediaChannelError;

    fn set_ringback_tone(&self, _tone: &[u8]) -> Result<()> {
        Err(Error::ErrUnsupportedMediaKind)
    }

    fn play_ringback_tone(&self, _ssrc: u32, _play: bool, _looping: bool) -> Result<()> {
        Err(Error::ErrUnsupportedMediaKind)
    }

    fn press_dtmf(&self, _digit: i32, _playout: bool) -> Result<()> {
        Err(Error::ErrUnsupportedMediaKind)
    }

    fn set_output_scaling(&self, _ssrc: u32, _left: f64, _right: f64) -> Result<()> {
        Err(Error::ErrUnsupportedMediaKind)
    }

    fn set_renderer(&self, _ssrc: u32, _renderer: Option<Arc<dyn VideoRenderer>>) -> Result<()> {
        Err(Error::ErrUnsupportedMediaKind)
    }

    fn set_send_stream_format(&self, _ssrc: u32, _format: &VideoFormat) -> Result<()> {
        Err(Error::ErrUnsupportedMediaKind)
    }

    fn set_capturer(&self, _ssrc: u32, _capturer: Option<Arc<dyn VideoCapturer>>) -> Result<()> {
        Err(Error::ErrUnsupportedMediaKind)
    }

    fn send_intra_frame(&self) -> Result<()> {
        Err(Error::ErrUnsupportedMediaKind)
    }

    fn request_intra_frame(&self) -> Result<()> {
        Err(Error::ErrUnsupportedMediaKind)
    }

    fn send_data(&self, _params: &SendDataParams, _payload: &[u8]) -> Result<()> {
        Err(Error::ErrUnsupportedMediaKind)
    }
}
