//! Advanced configuration for channels and their transports.
//!
//! The `SettingEngine` holds everything a channel needs that does not come
//! from a negotiated content description: SRTP/SRTCP replay windows, how
//! often repeated SRTP errors are reported, the early-media timer, DTLS
//! retransmission, whether new channels get a separate RTCP transport and
//! the [`SecurePolicy`].
//!
//! # Examples
//!
//! ```
//! use rtc::configuration::secure_policy::SecurePolicy;
//! use rtc::configuration::setting_engine::SettingEngine;
//! use std::time::Duration;
//!
//! let mut setting_engine = SettingEngine::default();
//! setting_engine.set_srtp_replay_protection_window(256);
//! setting_engine.set_early_media_timeout(Duration::from_millis(500));
//! setting_engine.set_secure_policy(SecurePolicy::Required);
//!
//! assert_eq!(setting_engine.srtp_replay_protection_window(), 256);
//! assert!(setting_engine.rtcp_enabled());
//! ```


use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::configuration::secure_policy::SecurePolicy;

pub(crate) const DEFAULT_REPLAY_PROTECTION_WINDOW: usize = 64;
pub(crate) const DEFAULT_SRTP_SIGNAL_SILENT_TIME: Duration = Duration::from_millis(1000);
pub(crate) const DEFAULT_EARLY_MEDIA_TIMEOUT: Duration = Duration::from_millis(1000);
pub(crate) const DEFAULT_DTLS_RETRANSMISSION_INTERVAL: Duration = Duration::from_secs(1);
pub(crate) const DEFAULT_DTLS_MAX_RETRANSMITS: usize = 7;

/// Replay attack protection window sizes, in packets. 0 disables replay
/// protection for that stream type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayProtection {
    pub srtp: usize,
    pub srtcp: usize,
}

impl Default for ReplayProtection {
    fn default() -> Self {
        ReplayProtection {
            srtp: DEFAULT_REPLAY_PROTECTION_WINDOW,
            srtcp: DEFAULT_REPLAY_PROTECTION_WINDOW,
        }
    }
}

/// Timers used by channels and their DTLS transports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeout {
    /// A repeated SRTP error of the same kind is not re-reported before this
    /// has elapsed.
    pub srtp_signal_silent_time: Duration,

    /// How long a voice channel with early media enabled waits for the first
    /// RTP packet before signalling the timeout.
    pub early_media: Duration,

    /// Initial DTLS flight retransmission interval.
    pub dtls_retransmission_interval: Duration,
}

impl Default for Timeout {
    fn default() -> Self {
        Timeout {
            srtp_signal_silent_time: DEFAULT_SRTP_SIGNAL_SILENT_TIME,
            early_media: DEFAULT_EARLY_MEDIA_TIMEOUT,
            dtls_retransmission_interval: DEFAULT_DTLS_RETRANSMISSION_INTERVAL,
        }
    }
}

/// Configuration shared by the channels a `ChannelManager` creates and the
/// transports their session hands out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingEngine {
    pub(crate) replay_protection: ReplayProtection,
    pub(crate) timeout: Timeout,
    pub(crate) dtls_max_retransmits: usize,
    pub(crate) rtcp_enabled: bool,
    pub(crate) secure_policy: SecurePolicy,
}

impl Default for SettingEngine {
    fn default() -> Self {
        SettingEngine {
            replay_protection: ReplayProtection::default(),
            timeout: Timeout::default(),
            dtls_max_retransmits: DEFAULT_DTLS_MAX_RETRANSMITS,
            rtcp_enabled: true,
            secure_policy: SecurePolicy::default(),
        }
    }
}

impl SettingEngine {
    pub fn set_srtp_replay_protection_window(&mut self, n: usize) {
        self.replay_protection.srtp = n;
    }

    pub fn set_srtcp_replay_protection_window(&mut self, n: usize) {
        self.replay_protection.srtcp = n;
    }

    pub fn srtp_replay_protection_window(&self) -> usize {
        self.replay_protection.srtp
    }

    pub fn srtcp_replay_protection_window(&self) -> usize {
        self.replay_protection.srtcp
    }

    /// Sets the interval during which a repeated SRTP error is swallowed.
    pub fn set_srtp_signal_silent_time(&mut self, t: Duration) {
        self.timeout.srtp_signal_silent_time = t;
    }

    pub fn srtp_signal_silent_time(&self) -> Duration {
        self.timeout.srtp_signal_silent_time
    }

    pub fn set_early_media_timeout(&mut self, t: Duration) {
        self.timeout.early_media = t;
    }

    pub fn early_media_timeout(&self) -> Duration {
        self.timeout.early_media
    }

    /// Sets the initial DTLS flight retransmission interval and how many
    /// times a flight is resent before the handshake fails.
    pub fn set_dtls_retransmission(&mut self, interval: Duration, max_retransmits: usize) {
        self.timeout.dtls_retransmission_interval = interval;
        self.dtls_max_retransmits = max_retransmits;
    }

    pub fn dtls_retransmission_interval(&self) -> Duration {
        self.timeout.dtls_retransmission_interval
    }

    pub fn dtls_max_retransmits(&self) -> usize {
        self.dtls_max_retransmits
    }

    /// Whether channels are created with a separate RTCP transport. Without
    /// one, RTCP only flows once RTCP-mux is negotiated.
    pub fn set_rtcp_enabled(&mut self, enabled: bool) {
        self.rtcp_enabled = enabled;
    }

    pub fn rtcp_enabled(&self) -> bool {
        self.rtcp_enabled
    }

    pub fn set_secure_policy(&mut self, policy: SecurePolicy) {
        self.secure_policy = policy;
    }

    pub fn secure_policy(&self) -> SecurePolicy {
        self.secure_policy
    }
}
