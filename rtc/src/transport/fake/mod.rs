//! In-process loopback transports.
//!
//! A pair of [`FakeTransportChannel`]s joined with [`FakeTransportChannel::connect`]
//! delivers every datagram sent on one side to the other side's read signal,
//! on the receiving side's thread.


use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use log::{debug, trace};

use base::message::{HandlerId, MessageHandler, next_handler_id};
use base::sync::lock;
use base::Thread;
use shared::error::{Error, Result};

use crate::session::TransportChannelFactory;
use crate::transport::{
    ReadPacketFn, ReceivedPacket, SignalHandle, SocketOption, TransportChannel, TransportSignals,
    WritableStateFn,
};

const MSG_FAKE_PACKET: u32 = 1;
const MSG_FAKE_WRITABLE: u32 = 2;

pub enum FakeMessage {
    Packet(ReceivedPacket),
    Writable(bool),
}

#[derive(Default)]
struct FakeState {
    writable: bool,
    peer: Option<Weak<FakeTransportChannel>>,
    packets_sent: usize,
    bytes_sent: usize,
    options: HashMap<SocketOption, i32>,
}

/// A transport channel whose peer is another `FakeTransportChannel` in the
/// same process.
pub struct FakeTransportChannel {
    id: HandlerId,
    weak_self: Weak<FakeTransportChannel>,
    content_name: String,
    component: u16,
    thread: Thread,
    state: Mutex<FakeState>,
    signals: TransportSignals,
}

impl FakeTransportChannel {
    /// Creates an unconnected channel whose callbacks fire on `thread`.
    pub fn new(content_name: &str, component: u16, thread: Thread) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| FakeTransportChannel {
            id: next_handler_id(),
            weak_self: weak_self.clone(),
            content_name: content_name.to_owned(),
            component,
            thread,
            state: Mutex::new(FakeState::default()),
            signals: TransportSignals::default(),
        })
    }

    /// Pairs `a` and `b` and makes both writable.
    pub fn connect(a: &Arc<FakeTransportChannel>, b: &Arc<FakeTransportChannel>) {
        lock(&a.state).peer = Some(Arc::downgrade(b));
        lock(&b.state).peer = Some(Arc::downgrade(a));
        a.set_writable(true);
        b.set_writable(true);
    }

    /// Changes writability. The writable-state signal fires later, on this
    /// channel's thread, and only when the value changed.
    pub fn set_writable(&self, writable: bool) {
        let changed = {
            let mut state = lock(&self.state);
            let changed = state.writable != writable;
            state.writable = writable;
            changed
        };
        if !changed {
            return;
        }
        if let Some(this) = self.weak_self.upgrade() {
            self.thread
                .queue()
                .post(&this, MSG_FAKE_WRITABLE, FakeMessage::Writable(writable));
        }
    }

    pub fn packets_sent(&self) -> usize {
        lock(&self.state).packets_sent
    }

    pub fn bytes_sent(&self) -> usize {
        lock(&self.state).bytes_sent
    }

    pub fn option(&self, opt: SocketOption) -> Option<i32> {
        lock(&self.state).options.get(&opt).copied()
    }
}

impl MessageHandler for FakeTransportChannel {
    type Data = FakeMessage;

    fn handler_id(&self) -> HandlerId {
        self.id
    }

    fn on_message(&self, _id: u32, data: FakeMessage) {
        match data {
            FakeMessage::Packet(packet) => {
                trace!(
                    "fake transport {}/{}: received {} bytes",
                    self.content_name,
                    self.component,
                    packet.data.len()
                );
                self.signals.read_packet.emit(&packet);
            }
            FakeMessage::Writable(writable) => {
                debug!(
                    "fake transport {}/{}: writable {}",
                    self.content_name, self.component, writable
                );
                self.signals.writable_state.emit(&writable);
            }
        }
    }
}

impl TransportChannel for FakeTransportChannel {
    fn content_name(&self) -> &str {
        &self.content_name
    }

    fn component(&self) -> u16 {
        self.component
    }

    fn writable(&self) -> bool {
        lock(&self.state).writable
    }

    fn send_packet(&self, data: &[u8], _flags: u32) -> Result<usize> {
        let peer = {
            let mut state = lock(&self.state);
            if !state.writable {
                return Err(Error::ErrTransportNotWritable);
            }
            let Some(peer) = state.peer.as_ref().and_then(Weak::upgrade) else {
                return Err(Error::ErrTransportNoPeer);
            };
            state.packets_sent += 1;
            state.bytes_sent += data.len();
            peer
        };

        let packet = ReceivedPacket {
            data: data.to_vec(),
            flags: 0,
        };
        if !peer
            .thread
            .queue()
            .post(&peer, MSG_FAKE_PACKET, FakeMessage::Packet(packet))
        {
            return Err(Error::ErrTransportNoPeer);
        }
        Ok(data.len())
    }

    fn set_option(&self, opt: SocketOption, value: i32) -> Result<()> {
        lock(&self.state).options.insert(opt, value);
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

impl Drop for FakeTransportChannel {
    fn drop(&mut self) {
        self.thread.queue().manager().clear(self.id);
    }
}

/// Hands out `FakeTransportChannel`s keyed by content name and component.
pub struct FakeTransportFactory {
    thread: Thread,
    channels: Mutex<HashMap<(String, u16), Arc<FakeTransportChannel>>>,
}

impl FakeTransportFactory {
    pub fn new(thread: Thread) -> Self {
        FakeTransportFactory {
            thread,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn channel(&self, content_name: &str, component: u16) -> Option<Arc<FakeTransportChannel>> {
        lock(&self.channels)
            .get(&(content_name.to_owned(), component))
            .cloned()
    }

    /// Connects every channel of `self` to the channel with the same content
    /// name and component in `other`.
    pub fn connect(&self, other: &FakeTransportFactory) {
        let ours: Vec<_> = lock(&self.channels)
            .iter()
            .map(|(key, channel)| (key.clone(), Arc::clone(channel)))
            .collect();
        for ((content_name, component), channel) in ours {
            if let Some(remote) = other.channel(&content_name, component) {
                FakeTransportChannel::connect(&channel, &remote);
            }
        }
    }
}

impl TransportChannelFactory for FakeTransportFactory {
    fn create_transport_channel(
        &self,
        content_name: &str,
        component: u16,
    ) -> Result<Arc<dyn TransportChannel>> {
        let channel = Arc::clone(
            lock(&self.channels)
                .entry((content_name.to_owned(), component))
                .or_insert_with(|| {
                    FakeTransportChannel::new(content_name, component, self.thread.clone())
                }),
        );
        Ok(channel)
    }

    fn destroy_transport_channel(&self, content_name: &str, component: u16) {
        let removed = lock(&self.channels).remove(&(content_name.to_owned(), component));
        if let Some(channel) = removed {
            channel.set_writable(false);
        }
    }
}
