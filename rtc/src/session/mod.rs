//! Sessions own the transports of every content negotiated with one peer.
//!
//! Channels ask their [`Session`] for transport channels by content name and
//! component. The session wraps each in a
//! [`DtlsTransportChannel`], shares it between channels of the same content,
//! and hands it the local identity and the remote fingerprint once known.

#[cfg(test)]
mod session_test;

pub mod description;
pub mod fake;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use base::message::{HandlerId, MessageHandler, next_handler_id};
use base::sync::lock;
use base::{Signal, Thread};
use dtls::Certificate;
use shared::error::Result;

use crate::configuration::setting_engine::SettingEngine;
use crate::transport::TransportChannel;
use crate::transport::dtls_transport_channel::DtlsTransportChannel;
use description::SessionDescription;

const MSG_SESSION_ERROR: u32 = 1;

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Init,
    SentInitiate,
    ReceivedInitiate,
    SentPrAccept,
    ReceivedPrAccept,
    SentAccept,
    ReceivedAccept,
    SentModify,
    ReceivedModify,
    SentReject,
    ReceivedReject,
    SentRedirect,
    SentTerminate,
    ReceivedTerminate,
    InProgress,
    Deinit,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SessionState::Init => "STATE_INIT",
            SessionState::SentInitiate => "STATE_SENTINITIATE",
            SessionState::ReceivedInitiate => "STATE_RECEIVEDINITIATE",
            SessionState::SentPrAccept => "STATE_SENTPRACCEPT",
            SessionState::ReceivedPrAccept => "STATE_RECEIVEDPRACCEPT",
            SessionState::SentAccept => "STATE_SENTACCEPT",
            SessionState::ReceivedAccept => "STATE_RECEIVEDACCEPT",
            SessionState::SentModify => "STATE_SENTMODIFY",
            SessionState::ReceivedModify => "STATE_RECEIVEDMODIFY",
            SessionState::SentReject => "STATE_SENTREJECT",
            SessionState::ReceivedReject => "STATE_RECEIVEDREJECT",
            SessionState::SentRedirect => "STATE_SENTREDIRECT",
            SessionState::SentTerminate => "STATE_SENTTERMINATE",
            SessionState::ReceivedTerminate => "STATE_RECEIVEDTERMINATE",
            SessionState::InProgress => "STATE_INPROGRESS",
            SessionState::Deinit => "STATE_DEINIT",
        };
        write!(f, "{s}")
    }
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionError {
    #[default]
    None,
    /// No response to a request in time.
    Time,
    /// The peer rejected a request.
    Response,
    Network,
    /// A content description could not be applied.
    Content,
    /// A transport failed, e.g. the DTLS-SRTP setup.
    Transport,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SessionError::None => "ERROR_NONE",
            SessionError::Time => "ERROR_TIME",
            SessionError::Response => "ERROR_RESPONSE",
            SessionError::Network => "ERROR_NETWORK",
            SessionError::Content => "ERROR_CONTENT",
            SessionError::Transport => "ERROR_TRANSPORT",
        };
        write!(f, "{s}")
    }
}

/// Creates the raw transport channels a session wraps.
pub trait TransportChannelFactory: Send + Sync {
    fn create_transport_channel(
        &self,
        content_name: &str,
        component: u16,
    ) -> Result<Arc<dyn TransportChannel>>;

    fn destroy_transport_channel(&self, content_name: &str, component: u16);
}

#[derive(Debug, Default)]
pub struct SessionSignals {
    pub state: Signal<SessionState>,
    pub error: Signal<SessionError>,
}

pub enum SessionMessage {
    Error(SessionError),
}

struct TransportProxy {
    channel_name: String,
    channel: Arc<DtlsTransportChannel>,
    refs: usize,
}

#[derive(Default)]
struct SessionInner {
    state: SessionState,
    error: SessionError,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    identity: Option<Certificate>,
    remote_fingerprints: HashMap<String, (String, String)>,
    transports: HashMap<(String, u16), TransportProxy>,
}

pub struct Session {
    id: HandlerId,
    weak_self: Weak<Session>,
    sid: String,
    initiator: bool,
    signaling: Thread,
    worker: Thread,
    setting_engine: SettingEngine,
    factory: Arc<dyn TransportChannelFactory>,
    inner: Mutex<SessionInner>,
    signals: SessionSignals,
}

impl Session {
    pub fn new(
        sid: &str,
        initiator: bool,
        signaling: Thread,
        worker: Thread,
        factory: Arc<dyn TransportChannelFactory>,
        setting_engine: SettingEngine,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Session {
            id: next_handler_id(),
            weak_self: weak_self.clone(),
            sid: sid.to_owned(),
            initiator,
            signaling,
            worker,
            setting_engine,
            factory,
            inner: Mutex::new(SessionInner::default()),
            signals: SessionSignals::default(),
        })
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Whether this side sent the initiate. The initiator is the DTLS client.
    pub fn initiator(&self) -> bool {
        self.initiator
    }

    pub fn signaling_thread(&self) -> &Thread {
        &self.signaling
    }

    pub fn worker_thread(&self) -> &Thread {
        &self.worker
    }

    pub fn setting_engine(&self) -> &SettingEngine {
        &self.setting_engine
    }

    pub fn signals(&self) -> &SessionSignals {
        &self.signals
    }

    pub fn state(&self) -> SessionState {
        lock(&self.inner).state
    }

    pub fn error(&self) -> SessionError {
        lock(&self.inner).error
    }

    /// Moves to `state` and notifies listeners if it changed.
    pub fn set_state(&self, state: SessionState) {
        let changed = {
            let mut inner = lock(&self.inner);
            let changed = inner.state != state;
            inner.state = state;
            changed
        };
        if changed {
            info!("session {}: state {}", self.sid, state);
            self.signals.state.emit(&state);
        }
    }

    pub fn set_error(&self, error: SessionError) {
        let changed = {
            let mut inner = lock(&self.inner);
            let changed = inner.error != error;
            inner.error = error;
            changed
        };
        if changed {
            warn!("session {}: error {}", self.sid, error);
            self.signals.error.emit(&error);
        }
    }

    /// Records `error` later, on the signaling thread.
    pub fn post_error(&self, error: SessionError) {
        if let Some(this) = self.weak_self.upgrade() {
            self.signaling
                .queue()
                .post(&this, MSG_SESSION_ERROR, SessionMessage::Error(error));
        }
    }

    pub fn set_local_description(&self, description: SessionDescription) {
        lock(&self.inner).local_description = Some(description);
    }

    pub fn set_remote_description(&self, description: SessionDescription) {
        lock(&self.inner).remote_description = Some(description);
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        lock(&self.inner).local_description.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        lock(&self.inner).remote_description.clone()
    }

    pub fn identity(&self) -> Option<Certificate> {
        lock(&self.inner).identity.clone()
    }

    /// Sets the certificate every transport of this session uses for DTLS.
    /// Remote fingerprints recorded earlier are applied along with it.
    pub fn set_identity(&self, identity: Option<Certificate>) -> Result<()> {
        let channels: Vec<_> = {
            let mut inner = lock(&self.inner);
            inner.identity = identity.clone();
            inner
                .transports
                .iter()
                .map(|((content_name, _), proxy)| {
                    (
                        Arc::clone(&proxy.channel),
                        inner.remote_fingerprints.get(content_name).cloned(),
                    )
                })
                .collect()
        };
        for (channel, fingerprint) in channels {
            channel.set_local_identity(identity.clone())?;
            if let (true, Some((algorithm, digest))) = (identity.is_some(), fingerprint) {
                channel.set_remote_fingerprint(&algorithm, &digest)?;
            }
        }
        Ok(())
    }

    /// Sets the fingerprint the peer's certificate must match for the
    /// transports of `content_name`.
    pub fn set_remote_fingerprint(
        &self,
        content_name: &str,
        algorithm: &str,
        digest: &str,
    ) -> Result<()> {
        let channels = {
            let mut inner = lock(&self.inner);
            inner.remote_fingerprints.insert(
                content_name.to_owned(),
                (algorithm.to_owned(), digest.to_owned()),
            );
            if inner.identity.is_none() {
                // Applied once the transports get an identity.
                return Ok(());
            }
            snapshot(&inner, |(content, _)| content == content_name)
        };
        for channel in channels {
            channel.set_remote_fingerprint(algorithm, digest)?;
        }
        Ok(())
    }

    /// Returns the transport for `content_name`/`component`, creating it on
    /// first use. Every call must be balanced by `destroy_channel`.
    pub fn create_channel(
        &self,
        content_name: &str,
        channel_name: &str,
        component: u16,
    ) -> Result<Arc<dyn TransportChannel>> {
        let key = (content_name.to_owned(), component);
        let (channel, identity, fingerprint) = {
            let mut inner = lock(&self.inner);
            if let Some(proxy) = inner.transports.get_mut(&key) {
                proxy.refs += 1;
                let channel: Arc<dyn TransportChannel> = proxy.channel.clone();
                return Ok(channel);
            }
            let raw = self.factory.create_transport_channel(content_name, component)?;
            let channel = DtlsTransportChannel::new(
                raw,
                self.worker.clone(),
                self.initiator,
                &self.setting_engine,
            );
            inner.transports.insert(
                key,
                TransportProxy {
                    channel_name: channel_name.to_owned(),
                    channel: Arc::clone(&channel),
                    refs: 1,
                },
            );
            (
                channel,
                inner.identity.clone(),
                inner.remote_fingerprints.get(content_name).cloned(),
            )
        };
        debug!(
            "session {}: created transport {} for {}/{}",
            self.sid, channel_name, content_name, component
        );

        if identity.is_some() {
            channel.set_local_identity(identity)?;
            if let Some((algorithm, digest)) = fingerprint {
                channel.set_remote_fingerprint(&algorithm, &digest)?;
            }
        }
        Ok(channel)
    }

    /// Releases one reference to a transport; the last one closes it.
    pub fn destroy_channel(&self, content_name: &str, component: u16) {
        let key = (content_name.to_owned(), component);
        let removed = {
            let mut inner = lock(&self.inner);
            let Some(proxy) = inner.transports.get_mut(&key) else {
                warn!(
                    "session {}: no transport {}/{} to destroy",
                    self.sid, content_name, component
                );
                return;
            };
            proxy.refs -= 1;
            if proxy.refs > 0 {
                return;
            }
            inner.transports.remove(&key)
        };
        if let Some(proxy) = removed {
            debug!(
                "session {}: destroying transport {} for {}/{}",
                self.sid, proxy.channel_name, content_name, component
            );
            proxy.channel.close();
            self.factory.destroy_transport_channel(content_name, component);
        }
    }

    pub fn transport_channel(
        &self,
        content_name: &str,
        component: u16,
    ) -> Option<Arc<DtlsTransportChannel>> {
        lock(&self.inner)
            .transports
            .get(&(content_name.to_owned(), component))
            .map(|proxy| Arc::clone(&proxy.channel))
    }

    pub fn has_channel(&self, content_name: &str, component: u16) -> bool {
        self.transport_channel(content_name, component).is_some()
    }
}

fn snapshot(
    inner: &SessionInner,
    filter: impl Fn(&(String, u16)) -> bool,
) -> Vec<Arc<DtlsTransportChannel>> {
    inner
        .transports
        .iter()
        .filter(|(key, _)| filter(key))
        .map(|(_, proxy)| Arc::clone(&proxy.channel))
        .collect()
}

impl MessageHandler for Session {
    type Data = SessionMessage;

    fn handler_id(&self) -> HandlerId {
        self.id
    }

    fn on_message(&self, _id: u32, data: SessionMessage) {
        match data {
            SessionMessage::Error(error) => self.set_error(error),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.signaling.queue().manager().clear(self.id);
    }
}
