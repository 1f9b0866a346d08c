
use std::cell::RefCell;
use std::sync::{Arc, Mutex, Weak};
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use log::{debug, warn};

use shared::error::{Error, Result};

use crate::manager::MessageQueueManager;
use crate::message::HandlerId;
use crate::message_queue::{MessageQueue, PendingSend, SendLatch};
use crate::sync::lock;

thread_local! {
    static CURRENT: RefCell<Option<Weak<ThreadInner>>> = const { RefCell::new(None) };
}

struct ThreadInner {
    name: String,
    queue: MessageQueue,
    thread_id: Mutex<Option<ThreadId>>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadInner {
    fn stop_and_join(&self) {
        self.queue.stop();
        self.queue.cancel_sends();
        let handle = lock(&self.join_handle).take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                // Dropped from its own dispatch loop; the loop exits on stop.
                return;
            }
            if handle.join().is_err() {
                warn!("thread {}: dispatch loop panicked", self.name);
            }
        }
    }
}

impl Drop for ThreadInner {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// A `MessageQueue` bound to one OS thread that dispatches its messages.
///
/// Cloning yields another handle to the same thread. The OS thread is
/// stopped and joined when the last handle goes away.
#[derive(Clone)]
pub struct Thread {
    inner: Arc<ThreadInner>,
}

impl Thread {
    pub fn new(name: &str, manager: Arc<MessageQueueManager>) -> Self {
        Thread {
            inner: Arc::new(ThreadInner {
                name: name.to_owned(),
                queue: MessageQueue::new(manager),
                thread_id: Mutex::new(None),
                join_handle: Mutex::new(None),
            }),
        }
    }

    /// Creates a thread and starts its dispatch loop.
    pub fn spawn(name: &str, manager: Arc<MessageQueueManager>) -> Result<Self> {
        let thread = Self::new(name, manager);
        thread.start()?;
        Ok(thread)
    }

    /// Binds the calling OS thread. Its messages are only dispatched from
    /// `process_messages`.
    pub fn wrap_current(name: &str, manager: Arc<MessageQueueManager>) -> Self {
        let thread = Self::new(name, manager);
        *lock(&thread.inner.thread_id) = Some(std::thread::current().id());
        let weak = Arc::downgrade(&thread.inner);
        CURRENT.with(|current| *current.borrow_mut() = Some(weak));
        thread
    }

    /// The `Thread` bound to the calling OS thread, if any.
    pub fn current() -> Option<Thread> {
        CURRENT.with(|current| {
            current
                .borrow()
                .as_ref()
                .and_then(Weak::upgrade)
                .map(|inner| Thread { inner })
        })
    }

    pub fn start(&self) -> Result<()> {
        let mut join_handle = lock(&self.inner.join_handle);
        if join_handle.is_some() {
            return Err(Error::ErrThreadAlreadyStarted);
        }
        self.inner.queue.restart();

        let weak = Arc::downgrade(&self.inner);
        let queue = self.inner.queue.clone();
        let name = self.inner.name.clone();
        let handle = std::thread::Builder::new()
            .name(self.inner.name.clone())
            .spawn(move || {
                CURRENT.with(|current| *current.borrow_mut() = Some(weak));
                debug!("thread {name}: dispatch loop started");
                while let Some(msg) = queue.get(None) {
                    msg.dispatch();
                }
                debug!("thread {name}: dispatch loop stopped");
            })?;
        *lock(&self.inner.thread_id) = Some(handle.thread().id());
        *join_handle = Some(handle);
        Ok(())
    }

    /// Stops the dispatch loop and waits for it to exit. Pending sends are
    /// released with `None`.
    pub fn stop(&self) {
        self.inner.stop_and_join();
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.inner.queue
    }

    pub fn is_current(&self) -> bool {
        *lock(&self.inner.thread_id) == Some(std::thread::current().id())
    }

    pub fn ptr_eq(&self, other: &Thread) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Dispatches messages on the calling thread for up to `timeout`.
    /// Returns false once the queue is stopped.
    pub fn process_messages(&self, timeout: Duration) -> bool {
        let end = Instant::now() + timeout;
        loop {
            let remaining = end.saturating_duration_since(Instant::now());
            match self.inner.queue.get(Some(remaining)) {
                Some(msg) => msg.dispatch(),
                None => return !self.inner.queue.is_stopped(),
            }
            if Instant::now() >= end {
                return !self.inner.queue.is_stopped();
            }
        }
    }

    /// Runs `f` on this thread and returns its result.
    ///
    /// Called on this thread, `f` runs directly. Otherwise the caller blocks
    /// until `f` has run; a caller that is itself a `Thread` keeps running
    /// sends addressed to it meanwhile, so two threads sending to each other
    /// do not deadlock. Returns `None` when this thread is stopped or the
    /// send is removed by `clear(handler)` before it runs.
    pub fn send<R, F>(&self, handler: HandlerId, f: F) -> Option<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return Some(f());
        }

        let source = Thread::current();
        let result: Arc<Mutex<Option<R>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&result);
        let latch = SendLatch::new(source.as_ref().map(|s| Arc::clone(s.queue().socket_server())));
        let send = PendingSend {
            handler,
            run: Box::new(move || {
                let r = f();
                *lock(&slot) = Some(r);
            }),
            latch: Arc::clone(&latch),
        };

        if self.inner.queue.push_send(send).is_err() {
            return None;
        }

        match source {
            Some(source) => {
                while !latch.is_done() {
                    source.queue().receive_sends();
                    if latch.is_done() {
                        break;
                    }
                    source.queue().socket_server().wait(None);
                }
                // The wait may have consumed a wake-up meant for the
                // dispatch loop.
                source.queue().socket_server().wake_up();
            }
            None => latch.wait(),
        }

        lock(&result).take()
    }
}
