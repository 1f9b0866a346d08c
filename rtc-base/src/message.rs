use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Identity of a message handler, used to match messages in `clear`.
pub type HandlerId = u64;

/// Matches every message id of a handler.
pub const MQID_ANY: u32 = u32::MAX;
/// Id carried by messages posted through `MessageQueue::dispose`.
pub const MQID_DISPOSE: u32 = u32::MAX - 1;

/// Time-sensitive messages dispatched later than this are logged.
pub const MAX_MSG_LATENCY: Duration = Duration::from_millis(150);

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-unique handler id.
pub fn next_handler_id() -> HandlerId {
    NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed)
}

/// A receiver of queued messages.
///
/// Queues only keep a weak reference to the handler: a message whose
/// handler has been dropped is discarded instead of dispatched.
pub trait MessageHandler: Send + Sync + 'static {
    type Data: Send + 'static;

    fn handler_id(&self) -> HandlerId;
    fn on_message(&self, id: u32, data: Self::Data);
}

/// Identity of the message left in place by `MessageQueue::peek`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PeekedMessage {
    pub handler: Option<HandlerId>,
    pub id: u32,
}

impl From<&Message> for PeekedMessage {
    fn from(msg: &Message) -> Self {
        PeekedMessage {
            handler: msg.handler,
            id: msg.id,
        }
    }
}

type Deliver = Box<dyn FnOnce(u32, Box<dyn Any + Send>) + Send>;

/// A unit of work owned by a `MessageQueue` from post until dispatch.
pub struct Message {
    pub handler: Option<HandlerId>,
    pub id: u32,
    pub ts_sensitive: Option<Instant>,
    data: Box<dyn Any + Send>,
    deliver: Option<Deliver>,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("handler", &self.handler)
            .field("id", &self.id)
            .field("ts_sensitive", &self.ts_sensitive)
            .finish()
    }
}

impl Message {
    pub fn new<H: MessageHandler>(handler: &Arc<H>, id: u32, data: H::Data) -> Self {
        let weak: Weak<H> = Arc::downgrade(handler);
        let deliver: Deliver = Box::new(move |id, data| {
            let Some(handler) = weak.upgrade() else {
                return;
            };
            if let Ok(data) = data.downcast::<H::Data>() {
                handler.on_message(id, *data);
            }
        });
        Message {
            handler: Some(handler.handler_id()),
            id,
            ts_sensitive: None,
            data: Box::new(data),
            deliver: Some(deliver),
        }
    }

    pub(crate) fn dispose<T: Send + 'static>(value: T) -> Self {
        Message {
            handler: None,
            id: MQID_DISPOSE,
            ts_sensitive: None,
            data: Box::new(value),
            deliver: None,
        }
    }

    pub(crate) fn time_sensitive(mut self, posted: Instant) -> Self {
        self.ts_sensitive = Some(posted + MAX_MSG_LATENCY);
        self
    }

    pub fn matches(&self, handler: HandlerId, id: u32) -> bool {
        self.handler == Some(handler) && (id == MQID_ANY || id == self.id)
    }

    pub fn is_dispose(&self) -> bool {
        self.handler.is_none()
    }

    /// Recovers the payload of a removed message.
    pub fn into_data<T: 'static>(self) -> Option<T> {
        self.data.downcast::<T>().ok().map(|data| *data)
    }

    /// Hands the payload to its handler. Disposal messages just drop it.
    pub fn dispatch(self) {
        if let Some(deliver) = self.deliver {
            deliver(self.id, self.data);
        }
    }
}
