
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, error, info, trace, warn};

use base::message::{HandlerId, MessageHandler, next_handler_id};
use base::sync::lock;
use base::{SlotId, Thread};
use shared::error::{Error, Result};
use shared::util::{get_rtcp_type, get_rtp_seq_num, get_rtp_ssrc, valid_packet};
use shared::{ContentAction, ContentSource};
use srtp::protection_profile::{
    CS_AES_CM_128_HMAC_SHA1_32, CS_AES_CM_128_HMAC_SHA1_80, SRTP_MASTER_KEY_KEY_LEN,
    SRTP_MASTER_KEY_SALT_LEN,
};
use srtp::{DtlsSrtpKeys, SrtpEvent, SrtpFilter};

use crate::channel::rtcp_mux_filter::RtcpMuxFilter;
use crate::channel::ssrc_filter::SsrcFilter;
use crate::channel::video::Screencast;
use crate::channel::{data, video, voice};
use crate::configuration::setting_engine::SettingEngine;
use crate::media::content_description::MediaContentDescription;
use crate::media::data::ReceivedData;
use crate::media::stream_params::{
    StreamParams, get_stream_by_nick_and_name, get_stream_by_ssrc, remove_stream_by_ssrc,
};
use crate::media::video::{NullScreenCapturerFactory, ScreenCapturerFactory, WindowEvent};
use crate::media::{
    MediaChannel, MediaChannelError, MediaContentDirection, MediaType, NetworkInterface,
    SendFlags, SocketType,
};
use crate::session::{Session, SessionError, SessionState};
use crate::transport::{
    PF_NORMAL, PF_SRTP_BYPASS, ReceivedPacket, SignalHandle, SocketOption, TransportChannel,
};

pub(super) const MSG_EARLYMEDIATIMEOUT: u32 = 8;
pub(super) const MSG_SCREENCASTWINDOWEVENT: u32 = 21;
const MSG_RTPPACKET: u32 = 22;
const MSG_RTCPPACKET: u32 = 23;
const MSG_CHANNEL_ERROR: u32 = 24;
const MSG_DATARECEIVED: u32 = 29;
const MSG_FIRSTPACKETRECEIVED: u32 = 35;
const MSG_READPACKET: u32 = 40;
const MSG_WRITABLESTATE: u32 = 41;

pub(crate) const ICE_CANDIDATE_COMPONENT_RTP: u16 = 1;
pub(crate) const ICE_CANDIDATE_COMPONENT_RTCP: u16 = 2;

/// RFC 5764 exporter label for DTLS-SRTP keying material.
const DTLS_SRTP_EXPORTER_LABEL: &str = "EXTRACTOR-dtls_srtp";

struct ExportedSrtpKeys {
    cipher: String,
    send_key: Vec<u8>,
    recv_key: Vec<u8>,
}

impl ExportedSrtpKeys {
    fn as_keys(&self) -> DtlsSrtpKeys<'_> {
        DtlsSrtpKeys {
            cipher_suite: &self.cipher,
            send_key: &self.send_key,
            recv_key: &self.recv_key,
        }
    }
}

pub enum ChannelMessage {
    RtpPacket(Vec<u8>),
    RtcpPacket(Vec<u8>),
    ReadPacket {
        rtcp_transport: bool,
        packet: ReceivedPacket,
    },
    WritableState,
    EarlyMediaTimeout,
    FirstPacketReceived,
    MediaError(MediaChannelError),
    ScreencastWindowEvent(u32, WindowEvent),
    DataReceived(ReceivedData),
}

/// A packet observed on its way through a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketEvent {
    pub rtcp: bool,
    pub data: Vec<u8>,
}

/// Notifications a channel raises.
///
/// Packet events fire on the worker thread, everything else on the
/// signaling thread. Kind specific signals never fire for other kinds.
#[derive(Debug, Default)]
pub struct ChannelSignals {
    pub first_packet_received: base::Signal<()>,
    pub send_packet_pre_crypto: base::Signal<PacketEvent>,
    pub send_packet_post_crypto: base::Signal<PacketEvent>,
    pub recv_packet_pre_crypto: base::Signal<PacketEvent>,
    pub recv_packet_post_crypto: base::Signal<PacketEvent>,
    pub media_error: base::Signal<MediaChannelError>,
    /// Voice: no RTP arrived within the early media timeout.
    pub early_media_timeout: base::Signal<()>,
    /// Video: a screencast's window was closed, minimized or restored.
    pub screencast_window_event: base::Signal<(u32, WindowEvent)>,
    /// Data: a message arrived.
    pub data_received: base::Signal<ReceivedData>,
}

/// State only one kind of channel carries.
pub(super) enum MediaKind {
    Voice {
        received_media: bool,
    },
    Video {
        screencasts: HashMap<u32, Screencast>,
        factory: Arc<dyn ScreenCapturerFactory>,
    },
    Data,
}

pub(super) struct ChannelState {
    pub(super) transport: Option<Arc<dyn TransportChannel>>,
    pub(super) rtcp_transport: Option<Arc<dyn TransportChannel>>,
    transport_slots: Vec<SignalHandle>,
    rtcp_transport_slots: Vec<SignalHandle>,
    media_slots: Vec<SlotId>,
    session_slot: Option<SlotId>,

    pub(super) srtp_filter: SrtpFilter,
    pub(super) rtcp_mux_filter: RtcpMuxFilter,
    pub(super) ssrc_filter: SsrcFilter,

    pub(super) local_streams: Vec<StreamParams>,
    pub(super) remote_streams: Vec<StreamParams>,

    pub(super) enabled: bool,
    pub(super) writable: bool,
    pub(super) was_ever_writable: bool,
    pub(super) muted: bool,
    pub(super) has_received_packet: bool,
    pub(super) dtls_keyed: bool,
    pub(super) crypto_required: bool,
    pub(super) destroyed: bool,

    pub(super) local_direction: MediaContentDirection,
    pub(super) remote_direction: MediaContentDirection,

    pub(super) kind: MediaKind,
}

impl ChannelState {
    fn is_ready_to_receive(&self) -> bool {
        self.enabled && self.local_direction.is_receiving()
    }

    fn is_ready_to_send(&self) -> bool {
        self.enabled
            && self.remote_direction.is_receiving()
            && self.local_direction.is_sending()
            && self.was_ever_writable
    }
}

/// The media type independent part of a channel.
///
/// All state changes run on the worker thread. Public methods called from
/// another thread block on `Thread::send` until the worker has run them.
pub struct BaseChannel {
    id: HandlerId,
    weak_self: Weak<BaseChannel>,
    content_name: String,
    rtcp: bool,
    media_type: MediaType,
    media_channel: Arc<dyn MediaChannel>,
    session: Arc<Session>,
    worker: Thread,
    signaling: Thread,
    setting_engine: SettingEngine,
    state: Mutex<ChannelState>,
    signals: ChannelSignals,
}

impl BaseChannel {
    pub(crate) fn new(
        worker: Thread,
        media_channel: Arc<dyn MediaChannel>,
        session: Arc<Session>,
        content_name: &str,
        rtcp: bool,
        setting_engine: SettingEngine,
    ) -> Arc<Self> {
        let media_type = media_channel.media_type();
        let kind = match media_type {
            MediaType::Audio => MediaKind::Voice {
                received_media: false,
            },
            MediaType::Video => MediaKind::Video {
                screencasts: HashMap::new(),
                factory: Arc::new(NullScreenCapturerFactory),
            },
            MediaType::Data => MediaKind::Data,
        };

        let mut srtp_filter = SrtpFilter::new();
        srtp_filter.set_replay_protection_windows(
            setting_engine.srtp_replay_protection_window(),
            setting_engine.srtcp_replay_protection_window(),
        );
        srtp_filter.set_signal_silent_time(setting_engine.srtp_signal_silent_time());

        let signaling = session.signaling_thread().clone();
        Arc::new_cyclic(|weak_self| BaseChannel {
            id: next_handler_id(),
            weak_self: weak_self.clone(),
            content_name: content_name.to_owned(),
            rtcp,
            media_type,
            media_channel,
            session,
            worker,
            signaling,
            setting_engine,
            state: Mutex::new(ChannelState {
                transport: None,
                rtcp_transport: None,
                transport_slots: vec![],
                rtcp_transport_slots: vec![],
                media_slots: vec![],
                session_slot: None,
                srtp_filter,
                rtcp_mux_filter: RtcpMuxFilter::new(),
                ssrc_filter: SsrcFilter::new(),
                local_streams: vec![],
                remote_streams: vec![],
                enabled: false,
                writable: false,
                was_ever_writable: false,
                muted: false,
                has_received_packet: false,
                dtls_keyed: false,
                crypto_required: false,
                destroyed: false,
                local_direction: MediaContentDirection::Inactive,
                remote_direction: MediaContentDirection::Inactive,
                kind,
            }),
            signals: ChannelSignals::default(),
        })
    }

    /// Creates the transports, hooks up the media channel and the session
    /// and applies whatever the session already negotiated. Must run on the
    /// worker thread.
    pub(crate) fn init(&self) -> Result<()> {
        debug_assert!(self.worker.is_current());

        let (rtp_name, rtcp_name) = match self.media_type {
            MediaType::Audio => ("rtp", "rtcp"),
            MediaType::Video => ("video_rtp", "video_rtcp"),
            MediaType::Data => ("data_rtp", "data_rtcp"),
        };
        // stored before configuring, destroy() releases them on failure
        let transport =
            self.session
                .create_channel(&self.content_name, rtp_name, ICE_CANDIDATE_COMPONENT_RTP)?;
        let transport_slots = self.connect_transport(&transport, false);
        {
            let mut state = self.state();
            state.transport = Some(Arc::clone(&transport));
            state.transport_slots = transport_slots;
        }
        transport.set_srtp_ciphers(&self.srtp_ciphers(false))?;

        if self.rtcp && self.setting_engine.rtcp_enabled() {
            let rtcp_transport = self.session.create_channel(
                &self.content_name,
                rtcp_name,
                ICE_CANDIDATE_COMPONENT_RTCP,
            )?;
            let slots = self.connect_transport(&rtcp_transport, true);
            {
                let mut state = self.state();
                state.rtcp_transport = Some(Arc::clone(&rtcp_transport));
                state.rtcp_transport_slots = slots;
            }
            rtcp_transport.set_srtp_ciphers(&self.srtp_ciphers(true))?;
        }

        let iface: Weak<dyn NetworkInterface> = self.weak_self.clone();
        self.media_channel.set_interface(Some(iface));
        let media_slots = self.connect_media_channel();

        let weak = self.weak_self.clone();
        let session_slot = self
            .session
            .signals()
            .state
            .connect(move |session_state: &SessionState| {
                if let Some(this) = weak.upgrade() {
                    this.on_session_state(*session_state);
                }
            });
        {
            let mut state = self.state();
            state.media_slots = media_slots;
            state.session_slot = Some(session_slot);
        }

        info!(
            "created {} channel for content {} (rtcp: {})",
            self.media_type, self.content_name, self.rtcp
        );
        self.on_session_state(self.session.state());
        self.update_writable_state();
        Ok(())
    }

    /// SRTP cipher suites offered in DTLS by this kind of channel.
    fn srtp_ciphers(&self, rtcp: bool) -> Vec<String> {
        let suites: &[&str] = match (rtcp, self.media_type) {
            (false, MediaType::Audio) => &[CS_AES_CM_128_HMAC_SHA1_32, CS_AES_CM_128_HMAC_SHA1_80],
            _ => &[CS_AES_CM_128_HMAC_SHA1_80],
        };
        suites.iter().map(|s| s.to_string()).collect()
    }

    fn connect_transport(
        &self,
        transport: &Arc<dyn TransportChannel>,
        rtcp_transport: bool,
    ) -> Vec<SignalHandle> {
        let weak = self.weak_self.clone();
        let writable = transport.on_writable_state(Box::new(move |_: &bool| {
            if let Some(this) = weak.upgrade() {
                this.dispatch(MSG_WRITABLESTATE, ChannelMessage::WritableState);
            }
        }));
        let weak = self.weak_self.clone();
        let read = transport.on_read_packet(Box::new(move |packet: &ReceivedPacket| {
            if let Some(this) = weak.upgrade() {
                this.dispatch(
                    MSG_READPACKET,
                    ChannelMessage::ReadPacket {
                        rtcp_transport,
                        packet: packet.clone(),
                    },
                );
            }
        }));
        vec![writable, read]
    }

    fn connect_media_channel(&self) -> Vec<SlotId> {
        let signals = self.media_channel.signals();
        let weak = self.weak_self.clone();
        let error_slot = signals.media_error.connect(move |err: &MediaChannelError| {
            if let Some(this) = weak.upgrade() {
                this.post_media_error(*err);
            }
        });
        let weak = self.weak_self.clone();
        let data_slot = signals.data_received.connect(move |data: &ReceivedData| {
            if let Some(this) = weak.upgrade() {
                this.post_to_signaling(MSG_DATARECEIVED, ChannelMessage::DataReceived(data.clone()));
            }
        });
        vec![error_slot, data_slot]
    }

    /// Tears the channel down on the worker thread: kind specific cleanup,
    /// pending RTCP flushed, queued messages dropped, every connection to
    /// the media channel, session and transports undone.
    pub(crate) fn destroy(&self) {
        debug_assert!(self.worker.is_current());
        if self.state().destroyed {
            return;
        }

        match self.media_type {
            MediaType::Audio => voice::teardown(self),
            MediaType::Video => video::teardown(self),
            MediaType::Data => {}
        }

        self.flush_rtcp_messages();
        self.worker.queue().manager().clear(self.id);
        self.media_channel.set_interface(None);

        let (media_slots, session_slot) = {
            let mut state = self.state();
            state.destroyed = true;
            (
                std::mem::take(&mut state.media_slots),
                state.session_slot.take(),
            )
        };
        let signals = self.media_channel.signals();
        if let [error_slot, data_slot] = media_slots[..] {
            signals.media_error.disconnect(error_slot);
            signals.data_received.disconnect(data_slot);
        }
        if let Some(slot) = session_slot {
            self.session.signals().state.disconnect(slot);
        }

        self.set_rtcp_transport_channel_none();
        let (transport, slots) = {
            let mut state = self.state();
            (
                state.transport.take(),
                std::mem::take(&mut state.transport_slots),
            )
        };
        if let Some(transport) = transport {
            for slot in slots {
                transport.disconnect(slot);
            }
            self.session
                .destroy_channel(&self.content_name, ICE_CANDIDATE_COMPONENT_RTP);
        }
        info!("destroyed {} channel for content {}", self.media_type, self.content_name);
    }

    /// Sends RTCP packets posted from other threads before the transports go.
    fn flush_rtcp_messages(&self) {
        let pending = self.worker.queue().clear(self.id, MSG_RTCPPACKET);
        for message in pending {
            if let Some(ChannelMessage::RtcpPacket(packet)) = message.into_data::<ChannelMessage>() {
                self.send_packet_w(true, &packet);
            }
        }
    }

    pub(super) fn state(&self) -> MutexGuard<'_, ChannelState> {
        lock(&self.state)
    }

    pub(super) fn weak(&self) -> Weak<BaseChannel> {
        self.weak_self.clone()
    }

    pub fn content_name(&self) -> &str {
        &self.content_name
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// Whether the channel was created with a separate RTCP transport.
    pub fn rtcp(&self) -> bool {
        self.rtcp
    }

    pub fn media_channel(&self) -> &Arc<dyn MediaChannel> {
        &self.media_channel
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn worker_thread(&self) -> &Thread {
        &self.worker
    }

    pub fn signaling_thread(&self) -> &Thread {
        &self.signaling
    }

    pub fn setting_engine(&self) -> &SettingEngine {
        &self.setting_engine
    }

    pub fn signals(&self) -> &ChannelSignals {
        &self.signals
    }

    pub fn enabled(&self) -> bool {
        self.state().enabled
    }

    pub fn writable(&self) -> bool {
        self.state().writable
    }

    pub fn was_ever_writable(&self) -> bool {
        self.state().was_ever_writable
    }

    pub fn muted(&self) -> bool {
        self.state().muted
    }

    /// Whether packets are SRTP protected.
    pub fn secure(&self) -> bool {
        self.state().srtp_filter.is_active()
    }

    /// Whether the SRTP keys came from DTLS.
    pub fn secure_dtls(&self) -> bool {
        self.state().dtls_keyed
    }

    pub fn rtcp_mux_active(&self) -> bool {
        self.state().rtcp_mux_filter.is_active()
    }

    pub fn local_streams(&self) -> Vec<StreamParams> {
        self.state().local_streams.clone()
    }

    pub fn remote_streams(&self) -> Vec<StreamParams> {
        self.state().remote_streams.clone()
    }

    pub fn local_direction(&self) -> MediaContentDirection {
        self.state().local_direction
    }

    pub fn remote_direction(&self) -> MediaContentDirection {
        self.state().remote_direction
    }

    pub fn transport_channel(&self) -> Option<Arc<dyn TransportChannel>> {
        self.state().transport.clone()
    }

    pub fn rtcp_transport_channel(&self) -> Option<Arc<dyn TransportChannel>> {
        self.state().rtcp_transport.clone()
    }

    /// Runs `f` on the worker thread and waits for its result.
    pub(super) fn invoke<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BaseChannel) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let Some(this) = self.weak_self.upgrade() else {
            return Err(Error::ErrChannelDestroyed);
        };
        self.worker
            .send(self.id, move || {
                if this.state().destroyed {
                    return Err(Error::ErrChannelDestroyed);
                }
                f(&this)
            })
            .unwrap_or(Err(Error::ErrWorkerThreadGone))
    }

    pub fn enable(&self, enable: bool) -> Result<()> {
        self.invoke(move |this| {
            {
                let mut state = this.state();
                if state.enabled == enable {
                    return Ok(());
                }
                state.enabled = enable;
            }
            info!(
                "{} channel {} {}",
                this.media_type,
                this.content_name,
                if enable { "enabled" } else { "disabled" }
            );
            this.change_state();
            Ok(())
        })
    }

    pub fn mute(&self, muted: bool) -> Result<()> {
        self.invoke(move |this| {
            this.media_channel.mute(muted)?;
            this.state().muted = muted;
            Ok(())
        })
    }

    pub fn set_local_content(
        &self,
        content: &MediaContentDescription,
        action: ContentAction,
    ) -> Result<()> {
        let content = content.clone();
        self.invoke(move |this| this.set_local_content_w(&content, action))
    }

    pub fn set_remote_content(
        &self,
        content: &MediaContentDescription,
        action: ContentAction,
    ) -> Result<()> {
        let content = content.clone();
        self.invoke(move |this| this.set_remote_content_w(&content, action))
    }

    pub fn add_recv_stream(&self, sp: &StreamParams) -> Result<()> {
        let sp = sp.clone();
        self.invoke(move |this| this.add_recv_stream_w(&sp))
    }

    pub fn remove_recv_stream(&self, ssrc: u32) -> Result<()> {
        self.invoke(move |this| this.remove_recv_stream_w(ssrc))
    }

    pub fn set_max_send_bandwidth(&self, max_bandwidth: i32) -> Result<()> {
        self.invoke(move |this| this.media_channel.set_send_bandwidth(true, max_bandwidth))
    }

    pub fn set_channel_options(&self, options: u32) -> Result<()> {
        self.invoke(move |this| this.media_channel.set_options(options))
    }

    fn on_session_state(&self, session_state: SessionState) {
        let (source, action) = match session_state {
            SessionState::SentInitiate => (ContentSource::Local, ContentAction::Offer),
            SessionState::SentPrAccept => (ContentSource::Local, ContentAction::PrAnswer),
            SessionState::SentAccept => (ContentSource::Local, ContentAction::Answer),
            SessionState::ReceivedInitiate => (ContentSource::Remote, ContentAction::Offer),
            SessionState::ReceivedPrAccept => (ContentSource::Remote, ContentAction::PrAnswer),
            SessionState::ReceivedAccept => (ContentSource::Remote, ContentAction::Answer),
            _ => return,
        };

        let description = match source {
            ContentSource::Local => self.session.local_description(),
            ContentSource::Remote => self.session.remote_description(),
        };
        let Some(content) = description.and_then(|desc| {
            desc.get_content_by_name(&self.content_name)
                .filter(|info| info.description.media_type == self.media_type)
                .or_else(|| desc.first_content_by_type(self.media_type))
                .map(|info| info.description.clone())
        }) else {
            return;
        };

        let result = match source {
            ContentSource::Local => self.set_local_content(&content, action),
            ContentSource::Remote => self.set_remote_content(&content, action),
        };
        if let Err(err) = result {
            error!(
                "failure in set {} content with {:?} for {}: {}",
                source, action, self.content_name, err
            );
            self.session.set_error(SessionError::Content);
        }
    }

    fn set_local_content_w(
        &self,
        content: &MediaContentDescription,
        action: ContentAction,
    ) -> Result<()> {
        let mut result = self.set_base_local_content_w(content, action);
        if action != ContentAction::Update || content.has_codecs() {
            merge(&mut result, self.media_channel.set_recv_codecs(&content.codecs));
        }
        match &result {
            Ok(()) => self.change_state(),
            Err(err) => warn!(
                "failed to set local {} description: {}",
                self.media_type, err
            ),
        }
        result
    }

    fn set_remote_content_w(
        &self,
        content: &MediaContentDescription,
        action: ContentAction,
    ) -> Result<()> {
        let result = match self.media_type {
            MediaType::Audio => voice::set_remote_content(self, content, action),
            MediaType::Video => video::set_remote_content(self, content, action),
            MediaType::Data => data::set_remote_content(self, content, action),
        };
        match &result {
            Ok(()) => self.change_state(),
            Err(err) => warn!(
                "failed to set remote {} description: {}",
                self.media_type, err
            ),
        }
        result
    }

    pub(super) fn set_base_local_content_w(
        &self,
        content: &MediaContentDescription,
        action: ContentAction,
    ) -> Result<()> {
        let policy = self.setting_engine.secure_policy();
        self.state().crypto_required = policy.crypto_required(content.crypto_required);

        let mut result = self.update_local_streams_w(&content.streams, action);
        let cryptos = if policy.negotiates_crypto() {
            content.cryptos.as_slice()
        } else {
            &[]
        };
        merge(&mut result, self.set_srtp_w(cryptos, action, ContentSource::Local));
        merge(
            &mut result,
            self.set_rtcp_mux_w(content.rtcp_mux, action, ContentSource::Local),
        );
        if content.rtp_header_extensions_set {
            merge(
                &mut result,
                self.media_channel
                    .set_recv_rtp_header_extensions(&content.rtp_header_extensions),
            );
        }
        self.state().local_direction = content.direction;
        result
    }

    pub(super) fn set_base_remote_content_w(
        &self,
        content: &MediaContentDescription,
        action: ContentAction,
    ) -> Result<()> {
        let policy = self.setting_engine.secure_policy();

        let mut result = self.update_remote_streams_w(&content.streams, action);
        let cryptos = if policy.negotiates_crypto() {
            content.cryptos.as_slice()
        } else {
            &[]
        };
        merge(&mut result, self.set_srtp_w(cryptos, action, ContentSource::Remote));
        merge(
            &mut result,
            self.set_rtcp_mux_w(content.rtcp_mux, action, ContentSource::Remote),
        );
        if content.rtp_header_extensions_set {
            merge(
                &mut result,
                self.media_channel
                    .set_send_rtp_header_extensions(&content.rtp_header_extensions),
            );
        }
        self.state().remote_direction = content.direction;
        result
    }

    fn set_srtp_w(
        &self,
        cryptos: &[srtp::CryptoParams],
        action: ContentAction,
        source: ContentSource,
    ) -> Result<()> {
        let dtls_active = self
            .transport_channel()
            .is_some_and(|transport| transport.is_dtls_active());
        let mut state = self.state();
        match action {
            ContentAction::Offer => state.srtp_filter.set_offer(cryptos, source),
            ContentAction::PrAnswer | ContentAction::Answer if dtls_active => {
                info!("ignoring SDES answer parameters because DTLS-SRTP is in use");
                Ok(())
            }
            ContentAction::PrAnswer => state.srtp_filter.set_provisional_answer(cryptos, source),
            ContentAction::Answer => state.srtp_filter.set_answer(cryptos, source),
            ContentAction::Update => Ok(()),
        }
    }

    fn set_rtcp_mux_w(&self, enable: bool, action: ContentAction, source: ContentSource) -> Result<()> {
        let (result, active) = {
            let mut state = self.state();
            let result = state.rtcp_mux_filter.apply(action, enable, source);
            (result, state.rtcp_mux_filter.is_active())
        };

        if result.is_ok() && active {
            if action == ContentAction::Answer {
                // RTCP now shares the RTP transport.
                self.set_rtcp_transport_channel_none();
            }
            if self
                .transport_channel()
                .is_some_and(|transport| transport.writable())
            {
                self.channel_writable();
            }
        }
        result
    }

    fn set_rtcp_transport_channel_none(&self) {
        let (transport, slots) = {
            let mut state = self.state();
            (
                state.rtcp_transport.take(),
                std::mem::take(&mut state.rtcp_transport_slots),
            )
        };
        if let Some(transport) = transport {
            for slot in slots {
                transport.disconnect(slot);
            }
            debug!("destroying RTCP transport for {}", self.content_name);
            self.session
                .destroy_channel(&self.content_name, ICE_CANDIDATE_COMPONENT_RTCP);
        }
    }

    fn update_local_streams_w(&self, streams: &[StreamParams], action: ContentAction) -> Result<()> {
        if action == ContentAction::Update {
            for stream in streams {
                let existing =
                    get_stream_by_nick_and_name(&self.state().local_streams, &stream.nick, &stream.name)
                        .cloned();
                match existing {
                    None if stream.has_ssrcs() => {
                        self.media_channel.add_send_stream(stream)?;
                        info!("add send ssrc: {}", stream.first_ssrc());
                        self.state().local_streams.push(stream.clone());
                    }
                    Some(existing) if !stream.has_ssrcs() => {
                        self.media_channel.remove_send_stream(existing.first_ssrc())?;
                        remove_stream_by_ssrc(&mut self.state().local_streams, existing.first_ssrc());
                    }
                    _ => warn!("ignore unsupported stream update"),
                }
            }
            return Ok(());
        }

        let current = self.state().local_streams.clone();
        let mut result = Ok(());
        for stream in &current {
            if get_stream_by_ssrc(streams, stream.first_ssrc()).is_none() {
                if let Err(err) = self.media_channel.remove_send_stream(stream.first_ssrc()) {
                    error!("failed to remove send stream with ssrc {}", stream.first_ssrc());
                    merge(&mut result, Err(err));
                }
            }
        }
        for stream in streams {
            if get_stream_by_ssrc(&current, stream.first_ssrc()).is_none() {
                match self.media_channel.add_send_stream(stream) {
                    Ok(()) => info!("add send ssrc: {}", stream.first_ssrc()),
                    Err(err) => {
                        error!("failed to add send stream ssrc: {}", stream.first_ssrc());
                        merge(&mut result, Err(err));
                    }
                }
            }
        }
        self.state().local_streams = streams.to_vec();
        result
    }

    fn update_remote_streams_w(&self, streams: &[StreamParams], action: ContentAction) -> Result<()> {
        if action == ContentAction::Update {
            for stream in streams {
                let existing = get_stream_by_nick_and_name(
                    &self.state().remote_streams,
                    &stream.nick,
                    &stream.name,
                )
                .cloned();
                match existing {
                    None if stream.has_ssrcs() => {
                        self.add_recv_stream_w(stream)?;
                        info!("add remote ssrc: {}", stream.first_ssrc());
                        self.state().remote_streams.push(stream.clone());
                    }
                    Some(existing) if !stream.has_ssrcs() => {
                        self.remove_recv_stream_w(existing.first_ssrc())?;
                        remove_stream_by_ssrc(&mut self.state().remote_streams, existing.first_ssrc());
                    }
                    _ => warn!("ignore unsupported stream update"),
                }
            }
            return Ok(());
        }

        let current = self.state().remote_streams.clone();
        let mut result = Ok(());
        for stream in &current {
            if get_stream_by_ssrc(streams, stream.first_ssrc()).is_none() {
                if let Err(err) = self.remove_recv_stream_w(stream.first_ssrc()) {
                    error!("failed to remove remote ssrc: {}", stream.first_ssrc());
                    merge(&mut result, Err(err));
                }
            }
        }
        for stream in streams {
            if get_stream_by_ssrc(&current, stream.first_ssrc()).is_none() {
                match self.add_recv_stream_w(stream) {
                    Ok(()) => info!("add remote ssrc: {}", stream.first_ssrc()),
                    Err(err) => {
                        error!("failed to add remote stream ssrc: {}", stream.first_ssrc());
                        merge(&mut result, Err(err));
                    }
                }
            }
        }
        self.state().remote_streams = streams.to_vec();
        result
    }

    fn add_recv_stream_w(&self, sp: &StreamParams) -> Result<()> {
        self.media_channel.add_recv_stream(sp)?;
        if self.state().ssrc_filter.add_stream(sp.clone()) {
            Ok(())
        } else {
            Err(Error::ErrSsrcAlreadyExists(sp.first_ssrc()))
        }
    }

    fn remove_recv_stream_w(&self, ssrc: u32) -> Result<()> {
        self.state().ssrc_filter.remove_stream(ssrc);
        self.media_channel.remove_recv_stream(ssrc)
    }

    /// Pushes the enabled/direction/writable state down to the media
    /// channel.
    fn change_state(&self) {
        let (recv, send) = {
            let state = self.state();
            (state.is_ready_to_receive(), state.is_ready_to_send())
        };

        if let Err(err) = self.media_channel.set_receive_enabled(recv) {
            error!("failed to set {} receiving to {}: {}", self.media_type, recv, err);
            if self.media_type == MediaType::Audio {
                self.send_last_media_error();
            }
        }
        if let Err(err) = self.media_channel.set_send(SendFlags::from(send)) {
            error!("failed to set {} sending to {}: {}", self.media_type, send, err);
            if self.media_type == MediaType::Audio {
                self.send_last_media_error();
            }
        }
        debug!(
            "{} channel {}: receive {} send {}",
            self.media_type, self.content_name, recv, send
        );
    }

    fn send_last_media_error(&self) {
        self.post_media_error(self.media_channel.last_media_error());
    }

    pub(super) fn post_media_error(&self, err: MediaChannelError) {
        self.post_to_signaling(MSG_CHANNEL_ERROR, ChannelMessage::MediaError(err));
    }

    pub(super) fn post_to_signaling(&self, id: u32, msg: ChannelMessage) {
        if let Some(this) = self.weak_self.upgrade() {
            self.signaling.queue().post(&this, id, msg);
        }
    }

    fn dispatch(&self, id: u32, msg: ChannelMessage) {
        if self.worker.is_current() {
            self.on_message(id, msg);
        } else if let Some(this) = self.weak_self.upgrade() {
            self.worker.queue().post(&this, id, msg);
        }
    }

    fn update_writable_state(&self) {
        let (transport, rtcp_transport) = {
            let state = self.state();
            (state.transport.clone(), state.rtcp_transport.clone())
        };
        let writable = transport.is_some_and(|t| t.writable())
            && rtcp_transport.is_none_or(|t| t.writable());
        if writable {
            self.channel_writable();
        } else {
            self.channel_not_writable();
        }
    }

    fn channel_writable(&self) {
        let was_ever_writable = {
            let state = self.state();
            if state.writable || state.destroyed {
                return;
            }
            state.was_ever_writable
        };

        if !was_ever_writable {
            if let Err(err) = self.setup_dtls_srtp() {
                error!("DTLS-SRTP setup failed for {}: {}", self.content_name, err);
                self.session.post_error(SessionError::Transport);
                return;
            }
        }

        info!("{} channel {} is writable", self.media_type, self.content_name);
        {
            let mut state = self.state();
            state.was_ever_writable = true;
            state.writable = true;
        }
        self.change_state();
    }

    fn channel_not_writable(&self) {
        {
            let mut state = self.state();
            if !state.writable {
                return;
            }
            state.writable = false;
        }
        info!("{} channel {} is no longer writable", self.media_type, self.content_name);
        self.change_state();
    }

    /// Keys SRTP from the DTLS associations of the RTP transport and, when
    /// present, the RTCP transport. Both are exported before anything is
    /// installed, so a failure leaves the filter inactive.
    fn setup_dtls_srtp(&self) -> Result<()> {
        let Some(rtp) = self.export_dtls_srtp_keys(false)? else {
            return Ok(());
        };
        let rtcp = self.export_dtls_srtp_keys(true)?;

        let mut state = self.state();
        let result = state.srtp_filter.set_dtls_params(
            rtp.as_keys(),
            rtcp.as_ref().map(ExportedSrtpKeys::as_keys),
        );
        match result {
            Ok(()) => {
                state.dtls_keyed = true;
                info!(
                    "DTLS-SRTP keys installed for {} with {} (rtcp: {})",
                    self.content_name,
                    rtp.cipher,
                    rtcp.as_ref().map_or("muxed", |keys| keys.cipher.as_str())
                );
                Ok(())
            }
            Err(err) => {
                warn!("DTLS-SRTP key installation failed: {}", err);
                Err(err)
            }
        }
    }

    /// Exported SRTP keys of one transport, `None` when it runs without DTLS.
    fn export_dtls_srtp_keys(&self, rtcp_channel: bool) -> Result<Option<ExportedSrtpKeys>> {
        let transport = {
            let state = self.state();
            if rtcp_channel {
                state.rtcp_transport.clone()
            } else {
                state.transport.clone()
            }
        };
        let Some(transport) = transport else {
            return Ok(None);
        };
        if !transport.is_dtls_active() {
            return Ok(None);
        }

        let Some(cipher) = transport.get_srtp_cipher() else {
            error!("no DTLS-SRTP selected cipher");
            return Err(Error::ErrNoSrtpProtectionProfile);
        };

        let material = transport.export_keying_material(
            DTLS_SRTP_EXPORTER_LABEL,
            &[],
            false,
            2 * (SRTP_MASTER_KEY_KEY_LEN + SRTP_MASTER_KEY_SALT_LEN),
        )?;

        // client key | server key | client salt | server salt
        let (client_key, rest) = material.split_at(SRTP_MASTER_KEY_KEY_LEN);
        let (server_key, rest) = rest.split_at(SRTP_MASTER_KEY_KEY_LEN);
        let (client_salt, server_salt) = rest.split_at(SRTP_MASTER_KEY_SALT_LEN);
        let client_write_key = [client_key, client_salt].concat();
        let server_write_key = [server_key, server_salt].concat();

        let (send_key, recv_key) = if self.session.initiator() {
            (server_write_key, client_write_key)
        } else {
            (client_write_key, server_write_key)
        };
        Ok(Some(ExportedSrtpKeys {
            cipher,
            send_key,
            recv_key,
        }))
    }

    fn send_packet_impl(&self, rtcp: bool, packet: &[u8]) -> bool {
        if !self.writable() {
            return false;
        }
        if !self.worker.is_current() {
            // Media engines send from their own threads.
            let (id, msg) = if rtcp {
                (MSG_RTCPPACKET, ChannelMessage::RtcpPacket(packet.to_vec()))
            } else {
                (MSG_RTPPACKET, ChannelMessage::RtpPacket(packet.to_vec()))
            };
            if let Some(this) = self.weak_self.upgrade() {
                self.worker.queue().post(&this, id, msg);
            }
            return true;
        }
        self.send_packet_w(rtcp, packet)
    }

    fn send_packet_w(&self, rtcp: bool, packet: &[u8]) -> bool {
        let (transport, secure, crypto_required) = {
            let state = self.state();
            if state.destroyed || !state.writable {
                return false;
            }
            let transport = if !rtcp || state.rtcp_mux_filter.is_active() {
                state.transport.clone()
            } else {
                state.rtcp_transport.clone()
            };
            (
                transport,
                state.srtp_filter.is_active(),
                state.crypto_required,
            )
        };
        let Some(transport) = transport else {
            return false;
        };
        if !transport.writable() {
            return false;
        }

        if !valid_packet(rtcp, packet.len()) {
            error!(
                "dropping outgoing {} {} packet: wrong size={}",
                self.content_name,
                packet_type(rtcp),
                packet.len()
            );
            return false;
        }

        self.emit_packet(&self.signals.send_packet_pre_crypto, rtcp, packet);

        let protected;
        let data: &[u8] = if secure {
            let (result, events) = {
                let mut state = self.state();
                let result = if rtcp {
                    state.srtp_filter.protect_rtcp(packet)
                } else {
                    state.srtp_filter.protect_rtp(packet)
                };
                (result, poll_srtp_events(&mut state.srtp_filter))
            };
            self.report_srtp_events(events);
            match result {
                Ok(buf) => {
                    protected = buf;
                    &protected
                }
                Err(err) => {
                    if rtcp {
                        warn!(
                            "failed to protect {} RTCP packet: size={}, type={:?}: {}",
                            self.content_name,
                            packet.len(),
                            get_rtcp_type(packet),
                            err
                        );
                    } else {
                        warn!(
                            "failed to protect {} RTP packet: size={}, seqnum={:?}, SSRC={:?}: {}",
                            self.content_name,
                            packet.len(),
                            get_rtp_seq_num(packet),
                            get_rtp_ssrc(packet),
                            err
                        );
                    }
                    return false;
                }
            }
        } else if crypto_required {
            error!("can't send outgoing {} packet when SRTP is inactive and crypto is required", packet_type(rtcp));
            return false;
        } else {
            packet
        };

        self.emit_packet(&self.signals.send_packet_post_crypto, rtcp, data);

        let flags = if secure && transport.is_dtls_active() {
            PF_SRTP_BYPASS
        } else {
            PF_NORMAL
        };
        match transport.send_packet(data, flags) {
            Ok(n) => n == data.len(),
            Err(err) => {
                debug!("failed to send {} {} packet: {}", self.content_name, packet_type(rtcp), err);
                false
            }
        }
    }

    fn on_channel_read(&self, rtcp_transport: bool, packet: ReceivedPacket) {
        let rtcp = rtcp_transport || self.state().rtcp_mux_filter.demux_rtcp(&packet.data);
        self.handle_packet(rtcp, &packet.data);

        if !rtcp {
            if let MediaKind::Voice { received_media } = &mut self.state().kind {
                *received_media = true;
            }
        }
    }

    fn handle_packet(&self, rtcp: bool, packet: &[u8]) {
        let first = {
            let mut state = self.state();
            let first = !state.has_received_packet;
            state.has_received_packet = true;
            first
        };
        if first {
            self.post_to_signaling(MSG_FIRSTPACKETRECEIVED, ChannelMessage::FirstPacketReceived);
        }

        if !valid_packet(rtcp, packet.len()) {
            error!(
                "dropping incoming {} {} packet: wrong size={}",
                self.content_name,
                packet_type(rtcp),
                packet.len()
            );
            return;
        }

        let (secure, crypto_required) = {
            let state = self.state();
            if state.ssrc_filter.is_active() && !state.ssrc_filter.demux_packet(packet, rtcp) {
                trace!(
                    "dropping {} {} packet from an unknown SSRC",
                    self.content_name,
                    packet_type(rtcp)
                );
                return;
            }
            (state.srtp_filter.is_active(), state.crypto_required)
        };

        self.emit_packet(&self.signals.recv_packet_post_crypto, rtcp, packet);

        let unprotected;
        let data: &[u8] = if secure {
            let (result, events) = {
                let mut state = self.state();
                let result = if rtcp {
                    state.srtp_filter.unprotect_rtcp(packet)
                } else {
                    state.srtp_filter.unprotect_rtp(packet)
                };
                (result, poll_srtp_events(&mut state.srtp_filter))
            };
            self.report_srtp_events(events);
            match result {
                Ok(buf) => {
                    unprotected = buf;
                    &unprotected
                }
                Err(err) => {
                    if rtcp {
                        warn!(
                            "failed to unprotect {} RTCP packet: size={}, type={:?}: {}",
                            self.content_name,
                            packet.len(),
                            get_rtcp_type(packet),
                            err
                        );
                    } else {
                        warn!(
                            "failed to unprotect {} RTP packet: size={}, seqnum={:?}, SSRC={:?}: {}",
                            self.content_name,
                            packet.len(),
                            get_rtp_seq_num(packet),
                            get_rtp_ssrc(packet),
                            err
                        );
                    }
                    return;
                }
            }
        } else if crypto_required {
            warn!(
                "can't process incoming {} packet when SRTP is inactive and crypto is required",
                packet_type(rtcp)
            );
            return;
        } else {
            packet
        };

        self.emit_packet(&self.signals.recv_packet_pre_crypto, rtcp, data);

        if rtcp {
            self.media_channel.on_rtcp_received(data);
        } else {
            self.media_channel.on_packet_received(data);
        }
    }

    fn emit_packet(&self, signal: &base::Signal<PacketEvent>, rtcp: bool, data: &[u8]) {
        if signal.is_empty() {
            return;
        }
        signal.emit(&PacketEvent {
            rtcp,
            data: data.to_vec(),
        });
    }

    fn report_srtp_events(&self, events: Vec<SrtpEvent>) {
        for event in events {
            match event {
                SrtpEvent::Error { ssrc, mode, error } => {
                    let media_error = match self.media_type {
                        MediaType::Audio => voice::srtp_media_error(mode, error),
                        MediaType::Video => video::srtp_media_error(mode, error),
                        MediaType::Data => data::srtp_media_error(mode, error),
                    };
                    if let Some(error) = media_error {
                        self.post_media_error(MediaChannelError { ssrc, error });
                    }
                }
            }
        }
    }
}

fn poll_srtp_events(filter: &mut SrtpFilter) -> Vec<SrtpEvent> {
    let mut events = vec![];
    while let Some(event) = filter.poll_event() {
        events.push(event);
    }
    events
}

fn packet_type(rtcp: bool) -> &'static str {
    if rtcp { "RTCP" } else { "RTP" }
}

/// Keeps the first failure while letting every step run.
pub(super) fn merge(result: &mut Result<()>, next: Result<()>) {
    if result.is_ok() {
        *result = next;
    }
}

impl fmt::Debug for BaseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseChannel")
            .field("content_name", &self.content_name)
            .field("media_type", &self.media_type)
            .field("rtcp", &self.rtcp)
            .finish()
    }
}

impl NetworkInterface for BaseChannel {
    fn send_packet(&self, packet: &[u8]) -> bool {
        self.send_packet_impl(false, packet)
    }

    fn send_rtcp(&self, packet: &[u8]) -> bool {
        self.send_packet_impl(true, packet)
    }

    fn set_option(&self, socket: SocketType, opt: SocketOption, value: i32) -> Result<()> {
        let transport = {
            let state = self.state();
            match socket {
                SocketType::Rtp => state.transport.clone(),
                SocketType::Rtcp => state.rtcp_transport.clone(),
            }
        };
        match transport {
            Some(transport) => transport.set_option(opt, value),
            None => Err(Error::ErrNoTransportChannel(format!(
                "{} {:?}",
                self.content_name, socket
            ))),
        }
    }
}

impl MessageHandler for BaseChannel {
    type Data = ChannelMessage;

    fn handler_id(&self) -> HandlerId {
        self.id
    }

    fn on_message(&self, _id: u32, data: ChannelMessage) {
        match data {
            ChannelMessage::RtpPacket(packet) => {
                self.send_packet_w(false, &packet);
            }
            ChannelMessage::RtcpPacket(packet) => {
                self.send_packet_w(true, &packet);
            }
            ChannelMessage::ReadPacket {
                rtcp_transport,
                packet,
            } => self.on_channel_read(rtcp_transport, packet),
            ChannelMessage::WritableState => self.update_writable_state(),
            ChannelMessage::EarlyMediaTimeout => voice::handle_early_media_timeout(self),
            ChannelMessage::FirstPacketReceived => self.signals.first_packet_received.emit(&()),
            ChannelMessage::MediaError(err) => self.signals.media_error.emit(&err),
            ChannelMessage::ScreencastWindowEvent(ssrc, event) => {
                self.signals.screencast_window_event.emit(&(ssrc, event))
            }
            ChannelMessage::DataReceived(data) => self.signals.data_received.emit(&data),
        }
    }
}

impl Drop for BaseChannel {
    fn drop(&mut self) {
        self.worker.queue().manager().clear(self.id);
    }
}
