
/// Largest window a detector can track.
pub const MAX_REPLAY_WINDOW: usize = 128;

/// ReplayDetector is the interface of sequence replay detector.
///
/// `check` only reports whether a sequence number is acceptable. The caller
/// commits it with `accept` once the packet has been authenticated, so a
/// forged packet can not advance the window.
pub trait ReplayDetector {
    fn check(&mut self, seq: u64) -> bool;
    fn accept(&mut self);
}

/// SlidingWindowDetector tracks the last `window_size` sequence numbers
/// below the highest one seen. `max_seq` bounds the sequence space; numbers
/// above it are rejected.
#[derive(Debug)]
pub struct SlidingWindowDetector {
    accepted: bool,
    seq: u64,
    latest_seq: u64,
    max_seq: u64,
    window_size: usize,
    mask: u128,
}

impl SlidingWindowDetector {
    pub fn new(window_size: usize, max_seq: u64) -> Self {
        SlidingWindowDetector {
            accepted: false,
            seq: 0,
            latest_seq: 0,
            max_seq,
            window_size: window_size.clamp(1, MAX_REPLAY_WINDOW),
            mask: 0,
        }
    }
}

impl ReplayDetector for SlidingWindowDetector {
    fn check(&mut self, seq: u64) -> bool {
        self.accepted = false;

        if seq > self.max_seq {
            // Exceeds upper limit.
            return false;
        }

        if seq <= self.latest_seq {
            let diff = self.latest_seq - seq;
            if diff >= self.window_size as u64 {
                // Too old.
                return false;
            }
            if self.mask & (1u128 << diff) != 0 {
                // The sequence number is duplicated.
                return false;
            }
        }

        self.accepted = true;
        self.seq = seq;
        true
    }

    fn accept(&mut self) {
        if !self.accepted {
            return;
        }

        if self.seq > self.latest_seq {
            let shift = self.seq - self.latest_seq;
            self.mask = if shift >= 128 { 0 } else { self.mask << shift };
            self.latest_seq = self.seq;
        }
        let diff = self.latest_seq - self.seq;
        self.mask |= 1u128 << diff;
        self.accepted = false;
    }
}

/// WrappedSlidingWindowDetector is a sliding window replay detector for a
/// sequence space that wraps around at `max_seq` (the SRTCP index).
#[derive(Debug)]
pub struct WrappedSlidingWindowDetector {
    accepted: bool,
    seq: u64,
    latest_seq: u64,
    max_seq: u64,
    window_size: usize,
    mask: u128,
    init: bool,
}

impl WrappedSlidingWindowDetector {
    pub fn new(window_size: usize, max_seq: u64) -> Self {
        WrappedSlidingWindowDetector {
            accepted: false,
            seq: 0,
            latest_seq: 0,
            max_seq,
            window_size: window_size.clamp(1, MAX_REPLAY_WINDOW),
            mask: 0,
            init: false,
        }
    }

    /// Signed distance from `latest_seq` to `seq`, taking wraparound into account.
    fn distance(&self, seq: u64) -> i64 {
        let range = self.max_seq as i64 + 1;
        let mut diff = self.latest_seq as i64 - seq as i64;
        if diff > range / 2 {
            diff -= range;
        } else if diff <= -range / 2 {
            diff += range;
        }
        diff
    }
}

impl ReplayDetector for WrappedSlidingWindowDetector {
    fn check(&mut self, seq: u64) -> bool {
        self.accepted = false;

        if seq > self.max_seq {
            return false;
        }
        if !self.init {
            self.accepted = true;
            self.seq = seq;
            return true;
        }

        let diff = self.distance(seq);
        if diff >= self.window_size as i64 {
            return false;
        }
        if diff >= 0 && self.mask & (1u128 << diff) != 0 {
            return false;
        }

        self.accepted = true;
        self.seq = seq;
        true
    }

    fn accept(&mut self) {
        if !self.accepted {
            return;
        }

        if !self.init {
            self.init = true;
            self.latest_seq = self.seq;
            self.mask = 1;
            self.accepted = false;
            return;
        }

        let diff = self.distance(self.seq);
        if diff < 0 {
            let shift = (-diff) as u64;
            self.mask = if shift >= 128 { 0 } else { self.mask << shift };
            self.latest_seq = self.seq;
            self.mask |= 1;
        } else {
            self.mask |= 1u128 << diff;
        }
        self.accepted = false;
    }
}

/// NoOpReplayDetector accepts everything. Used when replay protection is
/// switched off in the settings.
#[derive(Debug, Default)]
pub struct NoOpReplayDetector;

impl ReplayDetector for NoOpReplayDetector {
    fn check(&mut self, _: u64) -> bool {
        true
    }
    fn accept(&mut self) {}
}
