
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{trace, warn};

use crate::manager::MessageQueueManager;
use crate::message::{HandlerId, MAX_MSG_LATENCY, MQID_ANY, Message, MessageHandler, PeekedMessage};
use crate::socket_server::{EventSocketServer, SocketServer};
use crate::sync::{lock, wait};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

struct DelayedMessage {
    trigger: Instant,
    seq: u64,
    msg: Message,
}

impl PartialEq for DelayedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.trigger == other.trigger && self.seq == other.seq
    }
}

impl Eq for DelayedMessage {}

impl PartialOrd for DelayedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.trigger
            .cmp(&other.trigger)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Completion latch shared between a blocked sender and the queue that
/// runs its closure.
pub(crate) struct SendLatch {
    done: Mutex<bool>,
    cv: Condvar,
    waker: Option<Arc<dyn SocketServer>>,
}

impl SendLatch {
    pub(crate) fn new(waker: Option<Arc<dyn SocketServer>>) -> Arc<Self> {
        Arc::new(SendLatch {
            done: Mutex::new(false),
            cv: Condvar::new(),
            waker,
        })
    }

    pub(crate) fn is_done(&self) -> bool {
        *lock(&self.done)
    }

    pub(crate) fn wait(&self) {
        let mut done = lock(&self.done);
        while !*done {
            done = wait(&self.cv, done);
        }
    }

    fn signal(&self) {
        {
            let mut done = lock(&self.done);
            *done = true;
            self.cv.notify_all();
        }
        if let Some(waker) = &self.waker {
            waker.wake_up();
        }
    }
}

/// A blocking cross-thread call waiting for the target queue to run it.
pub(crate) struct PendingSend {
    pub(crate) handler: HandlerId,
    pub(crate) run: Box<dyn FnOnce() + Send>,
    pub(crate) latch: Arc<SendLatch>,
}

impl PendingSend {
    fn complete(self) {
        (self.run)();
        self.latch.signal();
    }

    /// Releases the sender without running the closure; it observes `None`.
    fn cancel(self) {
        drop(self.run);
        self.latch.signal();
    }
}

#[derive(Default)]
struct QueueState {
    fifo: VecDeque<Message>,
    delayed: BinaryHeap<Reverse<DelayedMessage>>,
    peeked: Option<Message>,
    sends: VecDeque<PendingSend>,
    seq: u64,
    stopped: bool,
}

impl QueueState {
    fn move_ready_delayed(&mut self, now: Instant) {
        while let Some(Reverse(next)) = self.delayed.peek() {
            if next.trigger > now {
                break;
            }
            if let Some(Reverse(ready)) = self.delayed.pop() {
                self.fifo.push_back(ready.msg);
            }
        }
    }

    fn next_trigger(&self) -> Option<Instant> {
        self.delayed.peek().map(|Reverse(d)| d.trigger)
    }
}

pub(crate) struct QueueInner {
    id: u64,
    manager: Arc<MessageQueueManager>,
    ss: Arc<dyn SocketServer>,
    registered: AtomicBool,
    state: Mutex<QueueState>,
}

impl QueueInner {
    /// Removes matching messages and pending sends. Blocked senders are
    /// released; the removed messages are returned for the caller to reuse
    /// or drop.
    pub(crate) fn clear(&self, handler: HandlerId, id: u32) -> Vec<Message> {
        let mut removed = vec![];
        let mut cancelled = vec![];
        {
            let mut state = lock(&self.state);

            if state.peeked.as_ref().is_some_and(|m| m.matches(handler, id)) {
                removed.extend(state.peeked.take());
            }

            let fifo = std::mem::take(&mut state.fifo);
            for msg in fifo {
                if msg.matches(handler, id) {
                    removed.push(msg);
                } else {
                    state.fifo.push_back(msg);
                }
            }

            let delayed = std::mem::take(&mut state.delayed).into_vec();
            for Reverse(d) in delayed {
                if d.msg.matches(handler, id) {
                    removed.push(d.msg);
                } else {
                    state.delayed.push(Reverse(d));
                }
            }

            if id == MQID_ANY {
                let sends = std::mem::take(&mut state.sends);
                for send in sends {
                    if send.handler == handler {
                        cancelled.push(send);
                    } else {
                        state.sends.push_back(send);
                    }
                }
            }
        }

        for send in cancelled {
            send.cancel();
        }
        if !removed.is_empty() {
            trace!(
                "queue {}: cleared {} message(s) of handler {handler}",
                self.id,
                removed.len()
            );
        }
        removed
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        if self.registered.load(AtomicOrdering::Acquire) {
            self.manager.remove(self.id);
        }
        let state = std::mem::take(
            match self.state.get_mut() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            },
        );
        for send in state.sends {
            send.cancel();
        }
        // Undelivered payloads are dropped with `state`.
    }
}

/// A FIFO of messages plus a time-ordered set of delayed messages, drained
/// by a single dispatching thread.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct MessageQueue {
    inner: Arc<QueueInner>,
}

impl MessageQueue {
    pub fn new(manager: Arc<MessageQueueManager>) -> Self {
        Self::with_socket_server(manager, Arc::new(EventSocketServer::new()))
    }

    pub fn with_socket_server(
        manager: Arc<MessageQueueManager>,
        ss: Arc<dyn SocketServer>,
    ) -> Self {
        MessageQueue {
            inner: Arc::new(QueueInner {
                id: NEXT_QUEUE_ID.fetch_add(1, AtomicOrdering::Relaxed),
                manager,
                ss,
                registered: AtomicBool::new(false),
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    pub fn manager(&self) -> &Arc<MessageQueueManager> {
        &self.inner.manager
    }

    pub fn socket_server(&self) -> &Arc<dyn SocketServer> {
        &self.inner.ss
    }

    // Registered lazily, on first post or send.
    fn ensure_registered(&self) {
        if !self.inner.registered.swap(true, AtomicOrdering::AcqRel) {
            self.inner
                .manager
                .add(self.inner.id, Arc::downgrade(&self.inner));
        }
    }

    fn enqueue(&self, msg: Message, delay: Option<Duration>) -> bool {
        self.ensure_registered();
        let rejected = {
            let mut state = lock(&self.inner.state);
            if state.stopped {
                Some(msg)
            } else {
                state.seq += 1;
                match delay {
                    Some(delay) => {
                        let seq = state.seq;
                        state.delayed.push(Reverse(DelayedMessage {
                            trigger: Instant::now() + delay,
                            seq,
                            msg,
                        }));
                    }
                    None => state.fifo.push_back(msg),
                }
                None
            }
        };
        match rejected {
            Some(msg) => {
                trace!("queue {}: stopped, dropping message {}", self.inner.id, msg.id);
                false
            }
            None => {
                self.inner.ss.wake_up();
                true
            }
        }
    }

    /// Queues `data` for `handler.on_message(id, data)` on the dispatching
    /// thread. Returns false (and drops `data`) when the queue is stopped.
    pub fn post<H: MessageHandler>(&self, handler: &Arc<H>, id: u32, data: H::Data) -> bool {
        self.enqueue(Message::new(handler, id, data), None)
    }

    /// Like `post`, but a dispatch later than `MAX_MSG_LATENCY` is logged.
    pub fn post_time_sensitive<H: MessageHandler>(
        &self,
        handler: &Arc<H>,
        id: u32,
        data: H::Data,
    ) -> bool {
        let msg = Message::new(handler, id, data).time_sensitive(Instant::now());
        self.enqueue(msg, None)
    }

    /// Queues a message that is not dispatched before `delay` has elapsed.
    pub fn post_delayed<H: MessageHandler>(
        &self,
        delay: Duration,
        handler: &Arc<H>,
        id: u32,
        data: H::Data,
    ) -> bool {
        self.enqueue(Message::new(handler, id, data), Some(delay))
    }

    /// Drops `value` on the dispatching thread.
    pub fn dispose<T: Send + 'static>(&self, value: T) -> bool {
        self.enqueue(Message::dispose(value), None)
    }

    pub(crate) fn push_send(&self, send: PendingSend) -> std::result::Result<(), PendingSend> {
        self.ensure_registered();
        {
            let mut state = lock(&self.inner.state);
            if state.stopped {
                return Err(send);
            }
            state.sends.push_back(send);
        }
        self.inner.ss.wake_up();
        Ok(())
    }

    /// Runs every pending cross-thread send, in arrival order.
    pub fn receive_sends(&self) {
        loop {
            let next = lock(&self.inner.state).sends.pop_front();
            match next {
                Some(send) => send.complete(),
                None => return,
            }
        }
    }

    /// Returns the next dispatchable message, waiting up to `timeout`
    /// (`None` waits until a message arrives or the queue is stopped).
    pub fn get(&self, timeout: Option<Duration>) -> Option<Message> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            self.receive_sends();

            let wait_for = {
                let mut state = lock(&self.inner.state);
                if let Some(msg) = state.peeked.take() {
                    return Some(msg);
                }

                let now = Instant::now();
                state.move_ready_delayed(now);
                if let Some(msg) = state.fifo.pop_front() {
                    if let Some(ts) = msg.ts_sensitive {
                        if now > ts {
                            warn!(
                                "message {} of handler {:?} dispatched {} ms late",
                                msg.id,
                                msg.handler,
                                (now - ts + MAX_MSG_LATENCY).as_millis()
                            );
                        }
                    }
                    return Some(msg);
                }
                if state.stopped {
                    return None;
                }

                let until = match (state.next_trigger(), deadline) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                match until {
                    Some(until) if until <= now => {
                        if deadline.is_some_and(|d| d <= now) {
                            return None;
                        }
                        Some(Duration::ZERO)
                    }
                    Some(until) => Some(until - now),
                    None => None,
                }
            };

            self.inner.ss.wait(wait_for);
        }
    }

    /// Like `get`, but the message stays queued and is returned again by the
    /// next `get`.
    pub fn peek(&self, timeout: Option<Duration>) -> Option<PeekedMessage> {
        {
            let state = lock(&self.inner.state);
            if let Some(msg) = &state.peeked {
                return Some(PeekedMessage::from(msg));
            }
        }
        let msg = self.get(timeout)?;
        let peeked = PeekedMessage::from(&msg);
        lock(&self.inner.state).peeked = Some(msg);
        Some(peeked)
    }

    /// Removes every queued message of `handler` with the given `id`
    /// (`MQID_ANY` for all). With `MQID_ANY` blocked senders to that handler
    /// are released as well.
    pub fn clear(&self, handler: HandlerId, id: u32) -> Vec<Message> {
        self.inner.clear(handler, id)
    }

    /// Time until the next message is due: zero when one is ready, `None`
    /// when nothing is scheduled.
    pub fn get_delay(&self) -> Option<Duration> {
        let state = lock(&self.inner.state);
        if state.peeked.is_some() || !state.fifo.is_empty() {
            return Some(Duration::ZERO);
        }
        state
            .next_trigger()
            .map(|t| t.saturating_duration_since(Instant::now()))
    }

    pub fn size(&self) -> usize {
        let state = lock(&self.inner.state);
        state.fifo.len() + state.delayed.len() + usize::from(state.peeked.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn stop(&self) {
        lock(&self.inner.state).stopped = true;
        self.inner.ss.wake_up();
    }

    pub fn restart(&self) {
        lock(&self.inner.state).stopped = false;
    }

    pub fn is_stopped(&self) -> bool {
        lock(&self.inner.state).stopped
    }

    /// Releases every blocked sender without running its closure.
    pub(crate) fn cancel_sends(&self) {
        let sends = std::mem::take(&mut lock(&self.inner.state).sends);
        for send in sends {
            send.cancel();
        }
    }

    pub(crate) fn ptr_eq(&self, other: &MessageQueue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
