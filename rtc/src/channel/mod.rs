//! Media channels.
//!
//! A channel binds one [`MediaChannel`](crate::media::MediaChannel) to the
//! RTP (and optionally RTCP) transports of one session content. It applies
//! the negotiated content descriptions, demultiplexes and (un)protects
//! packets, and reports media and transport trouble to the application.
//!
//! [`self::base::BaseChannel`] holds the state machine shared by every kind;
//! [`voice::VoiceChannel`], [`video::VideoChannel`] and
//! [`data::DataChannel`] add what only one kind of media needs.

pub mod base;
pub mod data;
pub mod rtcp_mux_filter;
pub mod ssrc_filter;
pub mod video;
pub mod voice;

pub use self::base::{BaseChannel, ChannelSignals, PacketEvent};
pub use data::DataChannel;
pub use video::VideoChannel;
pub use voice::VoiceChannel;
