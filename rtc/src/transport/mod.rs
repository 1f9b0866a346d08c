//! Transport channels.
//!
//! A [`TransportChannel`] is one component (RTP or RTCP) of one content's
//! connection to the remote peer. Channels only see this trait; candidate
//! gathering and connectivity checks live behind it.
//!
//! [`dtls_transport_channel::DtlsTransportChannel`] wraps any transport and
//! adds a DTLS handshake whose keys the media channels export for SRTP.

pub mod candidate;
pub mod dtls_transport_channel;
pub mod fake;
pub mod port;

use std::fmt;

use serde::{Deserialize, Serialize};

use base::{Signal, SlotId};
use dtls::Certificate;
use shared::error::{Error, Result};

/// Flags for `TransportChannel::send_packet` and `ReceivedPacket::flags`.
pub const PF_NORMAL: u32 = 0x00;
/// The payload is already SRTP protected and must go on the wire as-is
/// instead of inside a DTLS record.
pub const PF_SRTP_BYPASS: u32 = 0x01;

/// Socket level options a channel may forward to its transport.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketOption {
    RcvBuf,
    SndBuf,
    Dscp,
    NoDelay,
}

impl fmt::Display for SocketOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            SocketOption::RcvBuf => "rcvbuf",
            SocketOption::SndBuf => "sndbuf",
            SocketOption::Dscp => "dscp",
            SocketOption::NoDelay => "nodelay",
        };
        write!(f, "{s}")
    }
}

/// A datagram delivered by a transport channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPacket {
    pub data: Vec<u8>,
    pub flags: u32,
}

/// Identifies a callback registered on a transport channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SignalHandle {
    WritableState(SlotId),
    ReadPacket(SlotId),
}

pub type WritableStateFn = Box<dyn Fn(&bool) + Send + Sync>;
pub type ReadPacketFn = Box<dyn Fn(&ReceivedPacket) + Send + Sync>;

/// Signals every transport channel implementation exposes.
#[derive(Debug, Default)]
pub struct TransportSignals {
    pub writable_state: Signal<bool>,
    pub read_packet: Signal<ReceivedPacket>,
}

impl TransportSignals {
    pub fn connect_writable_state(&self, f: WritableStateFn) -> SignalHandle {
        SignalHandle::WritableState(self.writable_state.connect(f))
    }

    pub fn connect_read_packet(&self, f: ReadPacketFn) -> SignalHandle {
        SignalHandle::ReadPacket(self.read_packet.connect(f))
    }

    pub fn disconnect(&self, handle: SignalHandle) -> bool {
        match handle {
            SignalHandle::WritableState(id) => self.writable_state.disconnect(id),
            SignalHandle::ReadPacket(id) => self.read_packet.disconnect(id),
        }
    }
}

/// One component of a content's connection to the remote peer.
///
/// Callbacks registered with `on_writable_state` and `on_read_packet` are
/// invoked without any transport lock held, on the thread that drives the
/// transport.
pub trait TransportChannel: Send + Sync {
    fn content_name(&self) -> &str;

    /// 1 for RTP, 2 for RTCP.
    fn component(&self) -> u16;

    fn writable(&self) -> bool;

    /// Sends one datagram and returns how many bytes were accepted.
    fn send_packet(&self, data: &[u8], flags: u32) -> Result<usize>;

    fn set_option(&self, opt: SocketOption, value: i32) -> Result<()>;

    fn is_dtls_active(&self) -> bool {
        false
    }

    /// The SRTP cipher suite negotiated by DTLS, once the handshake is done.
    fn get_srtp_cipher(&self) -> Option<String> {
        None
    }

    /// RFC 5705 keying material from the DTLS association.
    fn export_keying_material(
        &self,
        _label: &str,
        _context: &[u8],
        _use_context: bool,
        _len: usize,
    ) -> Result<Vec<u8>> {
        Err(Error::ErrDtlsNotActive)
    }

    /// SRTP cipher suites offered in the DTLS `use_srtp` extension, in
    /// preference order.
    fn set_srtp_ciphers(&self, _ciphers: &[String]) -> Result<()> {
        Ok(())
    }

    fn set_local_identity(&self, _identity: Option<Certificate>) -> Result<()> {
        Err(Error::ErrDtlsNotActive)
    }

    fn set_remote_fingerprint(&self, _algorithm: &str, _digest: &str) -> Result<()> {
        Err(Error::ErrDtlsNotActive)
    }

    fn on_writable_state(&self, f: WritableStateFn) -> SignalHandle;

    fn on_read_packet(&self, f: ReadPacketFn) -> SignalHandle;

    fn disconnect(&self, handle: SignalHandle) -> bool;
}

impl fmt::Debug for dyn TransportChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportChannel")
            .field("content_name", &self.content_name())
            .field("component", &self.component())
            .field("writable", &self.writable())
            .finish()
    }
}
