//! Media channels and capturers that record what they are asked to do.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use base::sync::lock;
use base::{Signal, SlotId};
use shared::error::{Error, Result};

use crate::media::codec::Codec;
use crate::media::content_description::RtpHeaderExtension;
use crate::media::data::{ReceivedData, SendDataParams};
use crate::media::stream_params::StreamParams;
use crate::media::video::{
    CaptureEvent, CaptureEventFn, ScreenCapturerFactory, ScreencastId, VideoCapturer, VideoFormat,
    VideoRenderer,
};
use crate::media::{
    MediaChannel, MediaChannelError, MediaChannelSignals, MediaType, NetworkInterface,
    SendFlags,
};

/// Calls a `FakeMediaChannel` can be told to fail.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FakeFailure {
    SetSend,
    SetReceive,
    SetRecvCodecs,
    SetSendCodecs,
    SetOptions,
    SetSendBandwidth,
    SetSendStreamFormat,
}

#[derive(Default)]
pub struct FakeMediaState {
    pub recv_codecs: Vec<Codec>,
    pub send_codecs: Vec<Codec>,
    pub send_streams: Vec<StreamParams>,
    pub recv_streams: Vec<StreamParams>,
    pub recv_extensions: Vec<RtpHeaderExtension>,
    pub send_extensions: Vec<RtpHeaderExtension>,
    pub send: SendFlags,
    pub receive_enabled: bool,
    pub options: u32,
    pub muted: bool,
    pub send_bandwidth: Option<(bool, i32)>,
    pub rtp_packets: Vec<Vec<u8>>,
    pub rtcp_packets: Vec<Vec<u8>>,
    pub ringback_tone: Option<Vec<u8>>,
    pub ringback_playing: Option<(u32, bool, bool)>,
    pub dtmf: Vec<(i32, bool)>,
    pub output_scaling: HashMap<u32, (f64, f64)>,
    pub renderers: HashMap<u32, Arc<dyn VideoRenderer>>,
    pub send_formats: HashMap<u32, VideoFormat>,
    pub capturers: HashMap<u32, Arc<dyn VideoCapturer>>,
    pub sent_intra_frames: usize,
    pub requested_intra_frames: usize,
    pub sent_data: Vec<(SendDataParams, Vec<u8>)>,
    pub failures: Vec<FakeFailure>,
    pub last_error: MediaChannelError,
}

/// A `MediaChannel` that keeps every call in a `FakeMediaState`.
pub struct FakeMediaChannel {
    media_type: MediaType,
    iface: Mutex<Option<Weak<dyn NetworkInterface>>>,
    state: Mutex<FakeMediaState>,
    signals: MediaChannelSignals,
}

impl FakeMediaChannel {
    pub fn new(media_type: MediaType) -> Arc<Self> {
        Arc::new(FakeMediaChannel {
            media_type,
            iface: Mutex::new(None),
            state: Mutex::new(FakeMediaState::default()),
            signals: MediaChannelSignals::default(),
        })
    }

    /// Runs `f` over the recorded state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeMediaState) -> R) -> R {
        f(&mut lock(&self.state))
    }

    pub fn has_interface(&self) -> bool {
        lock(&self.iface)
            .as_ref()
            .is_some_and(|iface| iface.strong_count() > 0)
    }

    pub fn fail(&self, failure: FakeFailure, error: MediaChannelError) {
        let mut state = lock(&self.state);
        state.failures.push(failure);
        state.last_error = error;
    }

    /// Sends RTP the way a media engine would, through the installed
    /// network interface.
    pub fn send_rtp(&self, packet: &[u8]) -> bool {
        self.interface().is_some_and(|iface| iface.send_packet(packet))
    }

    pub fn send_rtcp(&self, packet: &[u8]) -> bool {
        self.interface().is_some_and(|iface| iface.send_rtcp(packet))
    }

    /// Emits `data` as if it arrived from the remote side.
    pub fn inject_data(&self, data: ReceivedData) {
        self.signals.data_received.emit(&data);
    }

    /// Emits a media error as the engine would.
    pub fn raise_error(&self, error: MediaChannelError) {
        lock(&self.state).last_error = error;
        self.signals.media_error.emit(&error);
    }

    pub fn rtp_packets(&self) -> Vec<Vec<u8>> {
        lock(&self.state).rtp_packets.clone()
    }

    pub fn rtcp_packets(&self) -> Vec<Vec<u8>> {
        lock(&self.state).rtcp_packets.clone()
    }

    fn interface(&self) -> Option<Arc<dyn NetworkInterface>> {
        lock(&self.iface).as_ref().and_then(Weak::upgrade)
    }

    fn check(&self, failure: FakeFailure) -> Result<()> {
        if lock(&self.state).failures.contains(&failure) {
            Err(Error::ErrMediaChannelFailed)
        } else {
            Ok(())
        }
    }

    fn require(&self, media_type: MediaType) -> Result<()> {
        if self.media_type == media_type {
            Ok(())
        } else {
            Err(Error::ErrUnsupportedMediaKind)
        }
    }
}

impl MediaChannel for FakeMediaChannel {
    fn media_type(&self) -> MediaType {
        self.media_type
    }

    fn set_interface(&self, iface: Option<Weak<dyn NetworkInterface>>) {
        *lock(&self.iface) = iface;
    }

    fn set_recv_codecs(&self, codecs: &[Codec]) -> Result<()> {
        self.check(FakeFailure::SetRecvCodecs)?;
        lock(&self.state).recv_codecs = codecs.to_vec();
        Ok(())
    }

    fn set_send_codecs(&self, codecs: &[Codec]) -> Result<()> {
        self.check(FakeFailure::SetSendCodecs)?;
        lock(&self.state).send_codecs = codecs.to_vec();
        Ok(())
    }

    fn add_send_stream(&self, sp: &StreamParams) -> Result<()> {
        let mut state = lock(&self.state);
        if state.send_streams.iter().any(|s| s.has_ssrc(sp.first_ssrc())) {
            return Err(Error::ErrSsrcAlreadyExists(sp.first_ssrc()));
        }
        state.send_streams.push(sp.clone());
        Ok(())
    }

    fn remove_send_stream(&self, ssrc: u32) -> Result<()> {
        let mut state = lock(&self.state);
        let before = state.send_streams.len();
        state.send_streams.retain(|s| !s.has_ssrc(ssrc));
        if state.send_streams.len() == before {
            return Err(Error::ErrSsrcNotFound(ssrc));
        }
        Ok(())
    }

    fn add_recv_stream(&self, sp: &StreamParams) -> Result<()> {
        let mut state = lock(&self.state);
        if state.recv_streams.iter().any(|s| s.has_ssrc(sp.first_ssrc())) {
            return Err(Error::ErrSsrcAlreadyExists(sp.first_ssrc()));
        }
        state.recv_streams.push(sp.clone());
        Ok(())
    }

    fn remove_recv_stream(&self, ssrc: u32) -> Result<()> {
        let mut state = lock(&self.state);
        let before = state.recv_streams.len();
        state.recv_streams.retain(|s| !s.has_ssrc(ssrc));
        if state.recv_streams.len() == before {
            return Err(Error::ErrSsrcNotFound(ssrc));
        }
        Ok(())
    }

    fn set_recv_rtp_header_extensions(&self, extensions: &[RtpHeaderExtension]) -> Result<()> {
        lock(&self.state).recv_extensions = extensions.to_vec();
        Ok(())
    }

    fn set_send_rtp_header_extensions(&self, extensions: &[RtpHeaderExtension]) -> Result<()> {
        lock(&self.state).send_extensions = extensions.to_vec();
        Ok(())
    }

    fn set_send(&self, flags: SendFlags) -> Result<()> {
        self.check(FakeFailure::SetSend)?;
        lock(&self.state).send = flags;
        Ok(())
    }

    fn set_receive_enabled(&self, enabled: bool) -> Result<()> {
        self.check(FakeFailure::SetReceive)?;
        lock(&self.state).receive_enabled = enabled;
        Ok(())
    }

    fn set_options(&self, options: u32) -> Result<()> {
        self.check(FakeFailure::SetOptions)?;
        lock(&self.state).options = options;
        Ok(())
    }

    fn options(&self) -> u32 {
        lock(&self.state).options
    }

    fn mute(&self, muted: bool) -> Result<()> {
        lock(&self.state).muted = muted;
        Ok(())
    }

    fn set_send_bandwidth(&self, autobw: bool, bps: i32) -> Result<()> {
        self.check(FakeFailure::SetSendBandwidth)?;
        lock(&self.state).send_bandwidth = Some((autobw, bps));
        Ok(())
    }

    fn on_packet_received(&self, packet: &[u8]) {
        lock(&self.state).rtp_packets.push(packet.to_vec());
    }

    fn on_rtcp_received(&self, packet: &[u8]) {
        lock(&self.state).rtcp_packets.push(packet.to_vec());
    }

    fn signals(&self) -> &MediaChannelSignals {
        &self.signals
    }

    fn last_media_error(&self) -> MediaChannelError {
        lock(&self.state).last_error
    }

    fn set_ringback_tone(&self, tone: &[u8]) -> Result<()> {
        self.require(MediaType::Audio)?;
        lock(&self.state).ringback_tone = Some(tone.to_vec());
        Ok(())
    }

    fn play_ringback_tone(&self, ssrc: u32, play: bool, looping: bool) -> Result<()> {
        self.require(MediaType::Audio)?;
        lock(&self.state).ringback_playing = Some((ssrc, play, looping));
        Ok(())
    }

    fn press_dtmf(&self, digit: i32, playout: bool) -> Result<()> {
        self.require(MediaType::Audio)?;
        if !(0..=15).contains(&digit) {
            return Err(Error::ErrMediaChannelFailed);
        }
        lock(&self.state).dtmf.push((digit, playout));
        Ok(())
    }

    fn set_output_scaling(&self, ssrc: u32, left: f64, right: f64) -> Result<()> {
        self.require(MediaType::Audio)?;
        lock(&self.state).output_scaling.insert(ssrc, (left, right));
        Ok(())
    }

    fn set_renderer(&self, ssrc: u32, renderer: Option<Arc<dyn VideoRenderer>>) -> Result<()> {
        self.require(MediaType::Video)?;
        let mut state = lock(&self.state);
        match renderer {
            Some(renderer) => {
                state.renderers.insert(ssrc, renderer);
            }
            None => {
                state.renderers.remove(&ssrc);
            }
        }
        Ok(())
    }

    fn set_send_stream_format(&self, ssrc: u32, format: &VideoFormat) -> Result<()> {
        self.require(MediaType::Video)?;
        self.check(FakeFailure::SetSendStreamFormat)?;
        let mut state = lock(&self.state);
        if !state.send_streams.iter().any(|s| s.has_ssrc(ssrc)) {
            return Err(Error::ErrSsrcNotFound(ssrc));
        }
        state.send_formats.insert(ssrc, *format);
        Ok(())
    }

    fn set_capturer(&self, ssrc: u32, capturer: Option<Arc<dyn VideoCapturer>>) -> Result<()> {
        self.require(MediaType::Video)?;
        let mut state = lock(&self.state);
        match capturer {
            Some(capturer) => {
                state.capturers.insert(ssrc, capturer);
            }
            None => {
                state.capturers.remove(&ssrc);
            }
        }
        Ok(())
    }

    fn send_intra_frame(&self) -> Result<()> {
        self.require(MediaType::Video)?;
        lock(&self.state).sent_intra_frames += 1;
        Ok(())
    }

    fn request_intra_frame(&self) -> Result<()> {
        self.require(MediaType::Video)?;
        lock(&self.state).requested_intra_frames += 1;
        Ok(())
    }

    fn send_data(&self, params: &SendDataParams, payload: &[u8]) -> Result<()> {
        self.require(MediaType::Data)?;
        lock(&self.state)
            .sent_data
            .push((params.clone(), payload.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
struct FakeCapturerState {
    running: bool,
    format: Option<VideoFormat>,
}

/// A capturer whose events are fired by hand.
#[derive(Default)]
pub struct FakeVideoCapturer {
    state: Mutex<FakeCapturerState>,
    capture_event: Signal<CaptureEvent>,
}

impl FakeVideoCapturer {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeVideoCapturer::default())
    }

    pub fn fire(&self, event: CaptureEvent) {
        self.capture_event.emit(&event);
    }

    pub fn listeners(&self) -> usize {
        self.capture_event.len()
    }
}

impl VideoCapturer for FakeVideoCapturer {
    fn start(&self, format: &VideoFormat) -> Result<()> {
        let mut state = lock(&self.state);
        state.running = true;
        state.format = Some(*format);
        Ok(())
    }

    fn stop(&self) {
        lock(&self.state).running = false;
    }

    fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    fn capture_format(&self) -> Option<VideoFormat> {
        lock(&self.state).format
    }

    fn on_capture_event(&self, f: CaptureEventFn) -> SlotId {
        self.capture_event.connect(f)
    }

    fn disconnect(&self, id: SlotId) -> bool {
        self.capture_event.disconnect(id)
    }
}

/// Hands out `FakeVideoCapturer`s and remembers them by screencast id.
#[derive(Default)]
pub struct FakeScreenCapturerFactory {
    capturers: Mutex<HashMap<ScreencastId, Arc<FakeVideoCapturer>>>,
}

impl FakeScreenCapturerFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeScreenCapturerFactory::default())
    }

    pub fn capturer(&self, id: &ScreencastId) -> Option<Arc<FakeVideoCapturer>> {
        lock(&self.capturers).get(id).cloned()
    }
}

impl ScreenCapturerFactory for FakeScreenCapturerFactory {
    fn create_screen_capturer(&self, id: &ScreencastId) -> Option<Arc<dyn VideoCapturer>> {
        let capturer = FakeVideoCapturer::new();
        lock(&self.capturers).insert(*id, Arc::clone(&capturer));
        Some(capturer)
    }
}
