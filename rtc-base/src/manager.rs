use std::sync::{Arc, Mutex, Weak};

use log::trace;

use crate::message::HandlerId;
use crate::message_queue::QueueInner;
use crate::sync::lock;

/// Registry of live message queues.
///
/// One manager is shared by `Arc` between every queue of an application so
/// that a handler being torn down can purge its messages from all of them.
/// The registry lock is never held while queue locks are taken or user
/// code runs.
#[derive(Default)]
pub struct MessageQueueManager {
    queues: Mutex<Vec<(u64, Weak<QueueInner>)>>,
}

impl MessageQueueManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add(&self, id: u64, queue: Weak<QueueInner>) {
        let mut queues = lock(&self.queues);
        debug_assert!(
            queues.iter().all(|(qid, _)| *qid != id),
            "queue {id} registered twice"
        );
        queues.push((id, queue));
        trace!("message queue {id} registered");
    }

    pub(crate) fn remove(&self, id: u64) {
        let mut queues = lock(&self.queues);
        queues.retain(|(qid, _)| *qid != id);
        trace!("message queue {id} unregistered");
    }

    pub fn len(&self) -> usize {
        lock(&self.queues).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every message and pending send addressed to `handler` from
    /// every live queue. Removed payloads are dropped before returning.
    pub fn clear(&self, handler: HandlerId) {
        let live: Vec<Arc<QueueInner>> = {
            let queues = lock(&self.queues);
            queues.iter().filter_map(|(_, q)| q.upgrade()).collect()
        };
        for queue in live {
            drop(queue.clear(handler, crate::message::MQID_ANY));
        }
    }
}
