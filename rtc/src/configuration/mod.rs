//! Channel configuration.
//!
//! [`setting_engine::SettingEngine`] carries the knobs that are not part of a
//! negotiated description: replay windows, timers, RTCP enablement and how
//! strictly SRTP is enforced.

pub mod secure_policy;
pub mod setting_engine;
