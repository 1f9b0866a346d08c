use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::sync::{lock, wait, wait_timeout};

/// The blocking primitive a `MessageQueue` sleeps on between messages.
///
/// A real socket server would multiplex socket readiness here as well. A
/// `wake_up` that happens before `wait` must make the next `wait` return
/// immediately.
pub trait SocketServer: Send + Sync {
    /// Blocks until woken or until `timeout` elapses (`None` waits forever).
    /// Returns true when woken.
    fn wait(&self, timeout: Option<Duration>) -> bool;
    fn wake_up(&self);
}

/// Default socket server backed by an auto-reset event.
#[derive(Default)]
pub struct EventSocketServer {
    signaled: Mutex<bool>,
    cv: Condvar,
}

impl EventSocketServer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SocketServer for EventSocketServer {
    fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut signaled = lock(&self.signaled);
        while !*signaled {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    signaled = wait_timeout(&self.cv, signaled, deadline - now);
                }
                None => signaled = wait(&self.cv, signaled),
            }
        }
        *signaled = false;
        true
    }

    fn wake_up(&self) {
        let mut signaled = lock(&self.signaled);
        *signaled = true;
        self.cv.notify_all();
    }
}
