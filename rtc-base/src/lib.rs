#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod manager;
pub mod message;
pub mod message_queue;
pub mod signal;
pub mod socket_server;
pub mod thread;

pub mod sync;

pub use manager::MessageQueueManager;
pub use message::{
    HandlerId, MAX_MSG_LATENCY, MQID_ANY, MQID_DISPOSE, Message, MessageHandler, PeekedMessage,
    next_handler_id,
};
pub use message_queue::MessageQueue;
pub use signal::{Signal, SlotId};
pub use socket_server::{EventSocketServer, SocketServer};
pub use thread::Thread;
