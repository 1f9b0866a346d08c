#![warn(rust_2018_idioms)]
#![allow(dead_code)]

#[cfg(feature = "crypto")]
pub mod crypto;

#[cfg(feature = "replay")]
pub mod replay_detector;

pub mod error;
pub mod negotiation;
pub mod util;

pub use negotiation::{ContentAction, ContentSource};
