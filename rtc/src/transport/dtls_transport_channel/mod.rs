//! DTLS on top of any [`TransportChannel`].
//!
//! Without a local identity the wrapper is a pass-through. Once an identity
//! and the remote fingerprint are known, the first writable transition of the
//! wrapped channel starts a handshake; the wrapper itself only becomes
//! writable when the handshake completed with a certificate matching the
//! fingerprint. After that, datagrams sent with [`PF_SRTP_BYPASS`] go on the
//! wire untouched and RTP-shaped datagrams from the peer are handed up with
//! the same flag, while everything else travels as DTLS application data.

#[cfg(test)]
mod dtls_transport_channel_test;

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};

use base::message::{HandlerId, MessageHandler, next_handler_id};
use base::sync::lock;
use base::Thread;
use dtls::{
    Certificate, ClientAuthType, ConfigBuilder, DTLSConn, DtlsEvent, SrtpProtectionProfile,
    VerifyPeerCertificateFn,
};
use shared::crypto::KeyingMaterialExporter;
use shared::error::{Error, Result};
use shared::util::{is_dtls_packet, is_rtp_packet};
use srtp::ProtectionProfile;

use crate::configuration::setting_engine::SettingEngine;
use crate::transport::{
    PF_NORMAL, PF_SRTP_BYPASS, ReadPacketFn, ReceivedPacket, SignalHandle, SocketOption,
    TransportChannel, TransportSignals, WritableStateFn,
};

const MSG_DTLS_TIMEOUT: u32 = 1;
const MSG_DTLS_READ_PACKET: u32 = 2;
const MSG_DTLS_WRITABLE_STATE: u32 = 3;

/// Handshake progress of a [`DtlsTransportChannel`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DtlsTransportState {
    /// No local identity; the wrapper passes everything through.
    None,
    /// Local identity set, remote fingerprint unknown.
    Offered,
    /// Remote fingerprint known; the handshake starts once writable.
    Accepted,
    /// Handshake in progress.
    Started,
    /// Handshake completed and the peer certificate verified.
    Open,
    /// Handshake failed or the connection was closed.
    Closed,
}

impl fmt::Display for DtlsTransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            DtlsTransportState::None => "none",
            DtlsTransportState::Offered => "offered",
            DtlsTransportState::Accepted => "accepted",
            DtlsTransportState::Started => "started",
            DtlsTransportState::Open => "open",
            DtlsTransportState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

pub enum DtlsMessage {
    Timeout,
    ReadPacket(ReceivedPacket),
    WritableState(bool),
}

struct DtlsState {
    state: DtlsTransportState,
    local_identity: Option<Certificate>,
    remote_fingerprint: Option<(String, String)>,
    srtp_ciphers: Vec<String>,
    conn: Option<DTLSConn>,
    writable: bool,
    timer: Option<Instant>,
}

/// Work produced while the state lock was held, carried out after it is
/// released.
#[derive(Default)]
struct Outcome {
    datagrams: Vec<BytesMut>,
    application_data: Vec<BytesMut>,
    writable: Option<bool>,
    timer: Option<Option<Instant>>,
}

pub struct DtlsTransportChannel {
    id: HandlerId,
    weak_self: Weak<DtlsTransportChannel>,
    channel: Arc<dyn TransportChannel>,
    thread: Thread,
    is_client: bool,
    flight_interval: Duration,
    max_retransmits: usize,
    state: Mutex<DtlsState>,
    signals: TransportSignals,
    channel_slots: Mutex<Vec<SignalHandle>>,
}

impl DtlsTransportChannel {
    /// Wraps `channel`. The DTLS timers run on `thread`, which should be the
    /// thread `channel` fires its callbacks on. `is_client` picks the DTLS
    /// role once a handshake starts.
    pub fn new(
        channel: Arc<dyn TransportChannel>,
        thread: Thread,
        is_client: bool,
        setting_engine: &SettingEngine,
    ) -> Arc<Self> {
        let this = Arc::new_cyclic(|weak_self| DtlsTransportChannel {
            id: next_handler_id(),
            weak_self: weak_self.clone(),
            channel: Arc::clone(&channel),
            thread,
            is_client,
            flight_interval: setting_engine.dtls_retransmission_interval(),
            max_retransmits: setting_engine.dtls_max_retransmits(),
            state: Mutex::new(DtlsState {
                state: DtlsTransportState::None,
                local_identity: None,
                remote_fingerprint: None,
                srtp_ciphers: vec![],
                conn: None,
                writable: false,
                timer: None,
            }),
            signals: TransportSignals::default(),
            channel_slots: Mutex::new(vec![]),
        });

        let weak = Arc::downgrade(&this);
        let writable_slot = channel.on_writable_state(Box::new(move |writable: &bool| {
            if let Some(this) = weak.upgrade() {
                this.dispatch(MSG_DTLS_WRITABLE_STATE, DtlsMessage::WritableState(*writable));
            }
        }));
        let weak = Arc::downgrade(&this);
        let read_slot = channel.on_read_packet(Box::new(move |packet: &ReceivedPacket| {
            if let Some(this) = weak.upgrade() {
                this.dispatch(MSG_DTLS_READ_PACKET, DtlsMessage::ReadPacket(packet.clone()));
            }
        }));
        lock(&this.channel_slots).extend([writable_slot, read_slot]);

        this
    }

    pub fn state(&self) -> DtlsTransportState {
        lock(&self.state).state
    }

    pub fn is_client(&self) -> bool {
        self.is_client
    }

    /// The wrapped transport.
    pub fn channel(&self) -> &Arc<dyn TransportChannel> {
        &self.channel
    }

    /// DER certificate presented by the peer, once the handshake completed.
    pub fn remote_certificate(&self) -> Option<Vec<u8>> {
        lock(&self.state)
            .conn
            .as_ref()
            .and_then(|conn| conn.peer_certificate().map(|der| der.to_vec()))
    }

    /// Sends a close alert and stops being writable.
    pub fn close(&self) {
        let outcome = {
            let mut state = lock(&self.state);
            let mut outcome = Outcome::default();
            if let Some(conn) = state.conn.as_mut() {
                conn.close();
            }
            drain(&mut state, &mut outcome);
            if state.state != DtlsTransportState::None {
                state.state = DtlsTransportState::Closed;
            }
            set_writable(&mut state, &mut outcome, false);
            outcome.timer = Some(None);
            outcome
        };
        self.complete(outcome);
    }

    fn dispatch(&self, id: u32, msg: DtlsMessage) {
        if self.thread.is_current() {
            self.on_message(id, msg);
        } else if let Some(this) = self.weak_self.upgrade() {
            self.thread.queue().post(&this, id, msg);
        }
    }

    fn on_channel_writable_state(&self, writable: bool) {
        let outcome = {
            let mut state = lock(&self.state);
            let mut outcome = Outcome::default();
            match state.state {
                DtlsTransportState::None => {
                    set_writable(&mut state, &mut outcome, writable);
                }
                DtlsTransportState::Accepted => {
                    if writable {
                        if let Err(err) = self.start_handshake(&mut state, &mut outcome) {
                            error!("dtls {}: failed to start handshake: {}", self, err);
                            state.state = DtlsTransportState::Closed;
                        }
                    }
                }
                DtlsTransportState::Open => {
                    set_writable(&mut state, &mut outcome, writable);
                }
                DtlsTransportState::Offered
                | DtlsTransportState::Started
                | DtlsTransportState::Closed => {}
            }
            outcome
        };
        self.complete(outcome);
    }

    fn on_channel_read_packet(&self, packet: ReceivedPacket) {
        let mut deliver = None;
        let outcome = {
            let mut state = lock(&self.state);
            let mut outcome = Outcome::default();
            match state.state {
                DtlsTransportState::None => deliver = Some(packet),
                _ if is_dtls_packet(&packet.data) => {
                    self.handle_dtls_packet(&mut state, &mut outcome, &packet.data);
                }
                DtlsTransportState::Open if is_rtp_packet(&packet.data) => {
                    deliver = Some(ReceivedPacket {
                        data: packet.data,
                        flags: PF_SRTP_BYPASS,
                    });
                }
                _ if is_rtp_packet(&packet.data) => {
                    debug!(
                        "dtls {}: dropping {} byte RTP packet before the handshake completed",
                        self,
                        packet.data.len()
                    );
                }
                _ => {
                    warn!(
                        "dtls {}: dropping {} byte packet that is neither DTLS nor RTP",
                        self,
                        packet.data.len()
                    );
                }
            }
            outcome
        };
        self.complete(outcome);
        if let Some(packet) = deliver {
            self.signals.read_packet.emit(&packet);
        }
    }

    fn handle_dtls_packet(&self, state: &mut DtlsState, outcome: &mut Outcome, data: &[u8]) {
        if state.state == DtlsTransportState::Accepted {
            // The peer started first.
            if let Err(err) = self.start_handshake(state, outcome) {
                error!("dtls {}: failed to start handshake: {}", self, err);
                state.state = DtlsTransportState::Closed;
                return;
            }
        }

        let Some(conn) = state.conn.as_mut() else {
            debug!("dtls {}: dropping DTLS packet in state {}", self, state.state);
            return;
        };
        if let Err(err) = conn.handle_read(data, Instant::now()) {
            if state.state == DtlsTransportState::Started {
                error!("dtls {}: handshake failed: {}", self, err);
                state.state = DtlsTransportState::Closed;
            } else {
                warn!("dtls {}: failed to read record: {}", self, err);
            }
        }
        drain(state, outcome);
    }

    fn on_timeout(&self) {
        let outcome = {
            let mut state = lock(&self.state);
            let mut outcome = Outcome::default();
            state.timer = None;
            if let Some(conn) = state.conn.as_mut() {
                if let Err(err) = conn.handle_timeout(Instant::now()) {
                    error!("dtls {}: handshake timed out: {}", self, err);
                    state.state = DtlsTransportState::Closed;
                }
            }
            drain(&mut state, &mut outcome);
            outcome
        };
        self.complete(outcome);
    }

    fn start_handshake(&self, state: &mut DtlsState, outcome: &mut Outcome) -> Result<()> {
        let Some(certificate) = state.local_identity.clone() else {
            return Err(Error::ErrNoCertificates);
        };
        let Some((algorithm, digest)) = state.remote_fingerprint.clone() else {
            return Err(Error::ErrInvalidDtlsState);
        };

        let verify: VerifyPeerCertificateFn = Arc::new(move |der: &[u8]| -> Result<()> {
            let actual = dtls::fingerprint(der, &algorithm)?;
            if actual.eq_ignore_ascii_case(&digest) {
                Ok(())
            } else {
                Err(Error::ErrNoMatchingCertificateFingerprint)
            }
        });

        let profiles: Vec<SrtpProtectionProfile> = state
            .srtp_ciphers
            .iter()
            .filter_map(|cs| ProtectionProfile::from_cipher_suite_name(cs))
            .map(|profile| SrtpProtectionProfile::from(profile.dtls_id()))
            .collect();

        let cfg = ConfigBuilder::default()
            .with_certificate(certificate)
            .with_srtp_protection_profiles(profiles)
            .with_flight_interval(self.flight_interval)
            .with_max_retransmits(self.max_retransmits)
            .with_verify_peer_certificate(Some(verify))
            .with_client_auth(ClientAuthType::RequireAnyClientCert)
            .build(self.is_client)?;

        let mut conn = DTLSConn::new(cfg)?;
        conn.start(Instant::now())?;
        info!(
            "dtls {}: starting handshake as {}",
            self,
            if self.is_client { "client" } else { "server" }
        );
        state.conn = Some(conn);
        state.state = DtlsTransportState::Started;
        drain(state, outcome);
        Ok(())
    }

    /// Sends queued datagrams, delivers application data and signals a
    /// writability change. Runs without the state lock.
    fn complete(&self, outcome: Outcome) {
        for datagram in &outcome.datagrams {
            if let Err(err) = self.channel.send_packet(datagram, PF_NORMAL) {
                warn!("dtls {}: failed to send {} bytes: {}", self, datagram.len(), err);
            }
        }

        if let Some(timer) = outcome.timer {
            self.thread.queue().clear(self.id, MSG_DTLS_TIMEOUT);
            if let (Some(deadline), Some(this)) = (timer, self.weak_self.upgrade()) {
                let delay = deadline.saturating_duration_since(Instant::now());
                self.thread
                    .queue()
                    .post_delayed(delay, &this, MSG_DTLS_TIMEOUT, DtlsMessage::Timeout);
            }
        }

        if let Some(writable) = outcome.writable {
            self.signals.writable_state.emit(&writable);
        }

        for data in outcome.application_data {
            let packet = ReceivedPacket {
                data: data.to_vec(),
                flags: PF_NORMAL,
            };
            self.signals.read_packet.emit(&packet);
        }
    }
}

fn set_writable(state: &mut DtlsState, outcome: &mut Outcome, writable: bool) {
    if state.writable != writable {
        state.writable = writable;
        outcome.writable = Some(writable);
    }
}

/// Collects everything the connection produced and applies its events.
fn drain(state: &mut DtlsState, outcome: &mut Outcome) {
    let mut events = vec![];
    let timer = {
        let Some(conn) = state.conn.as_mut() else {
            return;
        };
        while let Some(datagram) = conn.poll_write() {
            outcome.datagrams.push(datagram);
        }
        while let Some(data) = conn.incoming_application_data() {
            outcome.application_data.push(data);
        }
        while let Some(event) = conn.poll_event() {
            events.push(event);
        }
        conn.poll_timeout()
    };

    for event in events {
        match event {
            DtlsEvent::HandshakeCompleted => {
                if state.state == DtlsTransportState::Started {
                    state.state = DtlsTransportState::Open;
                    set_writable(state, outcome, true);
                }
            }
            DtlsEvent::Closed => {
                state.state = DtlsTransportState::Closed;
                set_writable(state, outcome, false);
            }
        }
    }

    if state.timer != timer {
        state.timer = timer;
        outcome.timer = Some(timer);
    }
}

impl fmt::Display for DtlsTransportChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.channel.content_name(),
            self.channel.component()
        )
    }
}

impl MessageHandler for DtlsTransportChannel {
    type Data = DtlsMessage;

    fn handler_id(&self) -> HandlerId {
        self.id
    }

    fn on_message(&self, _id: u32, data: DtlsMessage) {
        match data {
            DtlsMessage::Timeout => self.on_timeout(),
            DtlsMessage::ReadPacket(packet) => self.on_channel_read_packet(packet),
            DtlsMessage::WritableState(writable) => self.on_channel_writable_state(writable),
        }
    }
}

impl TransportChannel for DtlsTransportChannel {
    fn content_name(&self) -> &str {
        self.channel.content_name()
    }

    fn component(&self) -> u16 {
        self.channel.component()
    }

    fn writable(&self) -> bool {
        let state = lock(&self.state);
        if state.state == DtlsTransportState::None {
            drop(state);
            self.channel.writable()
        } else {
            state.writable
        }
    }

    fn send_packet(&self, data: &[u8], flags: u32) -> Result<usize> {
        let outcome = {
            let mut state = lock(&self.state);
            match state.state {
                DtlsTransportState::None => {
                    drop(state);
                    return self.channel.send_packet(data, flags);
                }
                DtlsTransportState::Open => {}
                _ => return Err(Error::ErrTransportNotWritable),
            }

            if flags & PF_SRTP_BYPASS != 0 {
                if !is_rtp_packet(data) {
                    error!("dtls {}: SRTP bypass requested for a non-RTP packet", self);
                    return Err(Error::ErrInvalidRtpHeader);
                }
                drop(state);
                trace!("dtls {}: sending {} bytes SRTP", self, data.len());
                return self.channel.send_packet(data, PF_NORMAL);
            }

            let mut outcome = Outcome::default();
            let Some(conn) = state.conn.as_mut() else {
                return Err(Error::ErrInvalidDtlsState);
            };
            conn.write(data)?;
            drain(&mut state, &mut outcome);
            outcome
        };
        self.complete(outcome);
        Ok(data.len())
    }

    fn set_option(&self, opt: SocketOption, value: i32) -> Result<()> {
        self.channel.set_option(opt, value)
    }

    fn is_dtls_active(&self) -> bool {
        lock(&self.state).state != DtlsTransportState::None
    }

    fn get_srtp_cipher(&self) -> Option<String> {
        let state = lock(&self.state);
        if state.state != DtlsTransportState::Open {
            return None;
        }
        let conn = state.conn.as_ref()?;
        match conn.selected_srtp_protection_profile() {
            SrtpProtectionProfile::Unsupported => None,
            profile => ProtectionProfile::from_dtls_id(profile as u16)
                .map(|p| p.cipher_suite_name().to_owned()),
        }
    }

    fn export_keying_material(
        &self,
        label: &str,
        context: &[u8],
        use_context: bool,
        len: usize,
    ) -> Result<Vec<u8>> {
        let state = lock(&self.state);
        if state.state != DtlsTransportState::Open {
            return Err(Error::ErrDtlsNotActive);
        }
        let Some(conn) = state.conn.as_ref() else {
            return Err(Error::ErrDtlsNotActive);
        };
        let context = if use_context { context } else { &[] };
        conn.export_keying_material(label, context, len)
    }

    fn set_srtp_ciphers(&self, ciphers: &[String]) -> Result<()> {
        let mut state = lock(&self.state);
        match state.state {
            DtlsTransportState::Started
            | DtlsTransportState::Open
            | DtlsTransportState::Closed => {
                if state.srtp_ciphers.as_slice() == ciphers {
                    return Ok(());
                }
                error!("dtls {}: can't change SRTP ciphers once DTLS started", self);
                return Err(Error::ErrInvalidDtlsState);
            }
            _ => {}
        }
        for cs in ciphers {
            if ProtectionProfile::from_cipher_suite_name(cs).is_none() {
                warn!("dtls {}: unsupported SRTP cipher {}", self, cs);
            }
        }
        state.srtp_ciphers = ciphers.to_vec();
        Ok(())
    }

    fn set_local_identity(&self, identity: Option<Certificate>) -> Result<()> {
        let mut state = lock(&self.state);
        if state.state != DtlsTransportState::None {
            let same = match (&state.local_identity, &identity) {
                (Some(current), Some(new)) => current.certificate == new.certificate,
                _ => false,
            };
            if same {
                return Ok(());
            }
            error!("dtls {}: can't change the local identity in state {}", self, state.state);
            return Err(Error::ErrInvalidDtlsState);
        }
        if identity.is_some() {
            state.local_identity = identity;
            state.state = DtlsTransportState::Offered;
        } else {
            info!("dtls {}: not using DTLS", self);
        }
        Ok(())
    }

    fn set_remote_fingerprint(&self, algorithm: &str, digest: &str) -> Result<()> {
        let outcome = {
            let mut state = lock(&self.state);
            let mut outcome = Outcome::default();

            if algorithm.is_empty() {
                // The peer does not do DTLS.
                info!("dtls {}: remote side didn't offer DTLS", self);
                state.state = DtlsTransportState::None;
                state.local_identity = None;
                state.remote_fingerprint = None;
                drop(state);
                return Ok(());
            }

            if let Some((alg, current)) = &state.remote_fingerprint {
                if alg == algorithm && current.eq_ignore_ascii_case(digest) {
                    return Ok(());
                }
            }
            if state.state != DtlsTransportState::Offered {
                error!(
                    "dtls {}: can't set the remote fingerprint in state {}",
                    self, state.state
                );
                return Err(Error::ErrInvalidDtlsState);
            }

            // Rejects unknown digest algorithms up front.
            dtls::fingerprint(&[], algorithm)?;

            state.remote_fingerprint = Some((algorithm.to_owned(), digest.to_owned()));
            state.state = DtlsTransportState::Accepted;

            if self.channel.writable() {
                if let Err(err) = self.start_handshake(&mut state, &mut outcome) {
                    error!("dtls {}: failed to start handshake: {}", self, err);
                    state.state = DtlsTransportState::Closed;
                    return Err(err);
                }
            }
            outcome
        };
        self.complete(outcome);
        Ok(())
    }

    fn on_writable_state(&self, f: WritableStateFn) -> SignalHandle {
        self.signals.connect_writable_state(f)
    }

    fn on_read_packet(&self, f: ReadPacketFn) -> SignalHandle {
        self.signals.connect_read_packet(f)
    }

    fn disconnect(&self, handle: SignalHandle) -> bool {
        self.signals.disconnect(handle)
    }
}

impl Drop for DtlsTransportChannel {
    fn drop(&mut self) {
        for slot in lock(&self.channel_slots).drain(..) {
            self.channel.disconnect(slot);
        }
        self.thread.queue().manager().clear(self.id);
    }
}
