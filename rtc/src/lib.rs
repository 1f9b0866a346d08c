//! # RTC - media channels over secure P2P transports
//!
//! This crate carries audio, video and data media between two endpoints over
//! transport channels negotiated by a session. Every channel is driven from a
//! worker [`base::Thread`]: content descriptions, SRTP keys and packets are all
//! applied there, while application-facing notifications are delivered on the
//! signaling thread.
//!
//! ## Layers
//!
//! - [`transport`]: the [`transport::TransportChannel`] abstraction, the
//!   DTLS-wrapping [`transport::dtls_transport_channel::DtlsTransportChannel`]
//!   and loopback fakes for tests.
//! - [`session`]: session state, descriptions and the ref-counted transport
//!   proxies channels are created on.
//! - [`media`]: the [`media::MediaChannel`] abstraction media engines
//!   implement, content descriptions and stream parameters.
//! - [`channel`]: the voice, video and data channel state machines with their
//!   SSRC, RTCP-mux and SRTP filters.
//! - [`channel_manager`]: creates, owns and tears down channels on the worker
//!   thread.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use base::{MessageQueueManager, Thread};
//! use rtc::channel_manager::ChannelManager;
//! use rtc::configuration::setting_engine::SettingEngine;
//! use rtc::media::fake::FakeMediaChannel;
//! use rtc::media::MediaType;
//! use rtc::session::fake::FakeSession;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = MessageQueueManager::new();
//! let worker = Thread::spawn("worker", Arc::clone(&manager))?;
//! let signaling = Thread::spawn("signaling", Arc::clone(&manager))?;
//!
//! let setting_engine = SettingEngine::default();
//! let session = FakeSession::new("sid", true, &signaling, &worker, setting_engine.clone());
//!
//! let channel_manager = ChannelManager::new(worker, signaling, setting_engine);
//! let voice = channel_manager.create_voice_channel(
//!     session.session(),
//!     "audio",
//!     true,
//!     FakeMediaChannel::new(MediaType::Audio),
//! )?;
//! voice.enable(true)?;
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod channel;
pub mod channel_manager;
pub mod configuration;
pub mod media;
pub mod session;
pub mod transport;
