use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use shared::error::Error;

/// Default interval during which a repeated SRTP error is not re-reported.
pub const DEFAULT_SIGNAL_SILENT_TIME: Duration = Duration::from_millis(1000);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SrtpMode {
    Protect,
    Unprotect,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SrtpErrorKind {
    Fail,
    Auth,
    Replay,
}

impl From<&Error> for SrtpErrorKind {
    fn from(err: &Error) -> Self {
        match err {
            Error::ErrFailedToVerifyAuthTag => SrtpErrorKind::Auth,
            Error::ErrSrtpSsrcDuplicated(..) | Error::ErrSrtcpSsrcDuplicated(..) => {
                SrtpErrorKind::Replay
            }
            _ => SrtpErrorKind::Fail,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SrtpEvent {
    Error {
        ssrc: u32,
        mode: SrtpMode,
        error: SrtpErrorKind,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct FailureKey {
    ssrc: u32,
    mode: SrtpMode,
    error: SrtpErrorKind,
}

/// Throttles SRTP error reports: the first failure of a kind is reported
/// right away, repeats are dropped until the silent time has elapsed.
pub(crate) struct SrtpStat {
    failures: HashMap<FailureKey, Instant>,
    signal_silent_time: Duration,
    events: VecDeque<SrtpEvent>,
}

impl Default for SrtpStat {
    fn default() -> Self {
        SrtpStat {
            failures: HashMap::new(),
            signal_silent_time: DEFAULT_SIGNAL_SILENT_TIME,
            events: VecDeque::new(),
        }
    }
}

impl SrtpStat {
    pub(crate) fn set_signal_silent_time(&mut self, signal_silent_time: Duration) {
        self.signal_silent_time = signal_silent_time;
    }

    pub(crate) fn add_result(&mut self, ssrc: u32, mode: SrtpMode, err: &Error, now: Instant) {
        let key = FailureKey {
            ssrc,
            mode,
            error: SrtpErrorKind::from(err),
        };

        let signal = match self.failures.get(&key) {
            Some(last) => now.saturating_duration_since(*last) > self.signal_silent_time,
            None => true,
        };
        if signal {
            self.failures.insert(key, now);
            self.events.push_back(SrtpEvent::Error {
                ssrc,
                mode,
                error: key.error,
            });
        }
    }

    pub(crate) fn poll_event(&mut self) -> Option<SrtpEvent> {
        self.events.pop_front()
    }
}
