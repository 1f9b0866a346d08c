//! Flight state machine (RFC 6347, section 4.2.4).
//!
//! A flight is built in `Preparing` and written in `Sending`. Unless it was
//! the last flight of this side, the machine then parks in `Waiting` under a
//! retransmit timer until the peer's next flight is complete. After the last
//! flight it parks in `Finished`, where a repeated peer flight means ours
//! was lost and is sent again.

use std::fmt;
use std::time::Instant;

use log::{debug, trace};
use shared::error::{Error, Result};

use crate::conn::DTLSConn;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum HandshakeState {
    Errored,
    Preparing,
    Sending,
    Waiting,
    Finished,
}

impl HandshakeState {
    /// States left only on a packet or a timer.
    fn is_parked(self) -> bool {
        matches!(self, HandshakeState::Waiting | HandshakeState::Finished)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            HandshakeState::Errored => "errored",
            HandshakeState::Preparing => "preparing",
            HandshakeState::Sending => "sending",
            HandshakeState::Waiting => "waiting",
            HandshakeState::Finished => "finished",
        };
        write!(f, "{s}")
    }
}

pub(crate) fn srv_cli_str(is_client: bool) -> &'static str {
    if is_client { "client" } else { "server" }
}

impl DTLSConn {
    /// Runs the machine until it parks or completes.
    pub(crate) fn handshake(&mut self, now: Instant) -> Result<()> {
        let role = srv_cli_str(self.state.is_client);
        loop {
            let current = self.current_handshake_state;
            trace!("[handshake:{role}] {} in {current}", self.current_flight);

            if current == HandshakeState::Finished && !self.is_handshake_completed() {
                self.set_handshake_completed();
                debug!("[handshake:{role}] completed");
                return Ok(());
            }

            let next = match current {
                HandshakeState::Preparing => self.prepare_flight()?,
                HandshakeState::Sending => self.send_flight(now),
                HandshakeState::Waiting => self.read_flight()?,
                HandshakeState::Finished => self.answer_repeated_flight(),
                HandshakeState::Errored => return Err(Error::ErrHandshakeTimeout),
            };
            self.current_handshake_state = next;

            if next == current && current.is_parked() {
                return Ok(());
            }
        }
    }

    fn prepare_flight(&mut self) -> Result<HandshakeState> {
        self.flights = None;
        self.current_retransmit_count = 0;
        self.retransmit = self.current_flight.has_retransmit();

        match self
            .current_flight
            .generate(&mut self.state, &mut self.cache, &self.cfg)
        {
            Ok(packets) => {
                // a flight with ChangeCipherSpec carries records of the next epoch
                let epoch = packets
                    .iter()
                    .map(|p| p.record.record_layer_header.epoch)
                    .max();
                if let Some(epoch) = epoch.filter(|&e| e > self.state.local_epoch) {
                    debug!(
                        "[handshake:{}] local epoch {} -> {}",
                        srv_cli_str(self.state.is_client),
                        self.state.local_epoch,
                        epoch
                    );
                    self.state.local_epoch = epoch;
                }
                self.flights = Some(packets);
            }
            Err((alert, err)) => {
                if let Some(alert) = alert {
                    self.notify(alert.alert_level, alert.alert_description);
                }
                if let Some(err) = err {
                    return Err(err);
                }
            }
        }
        Ok(HandshakeState::Sending)
    }

    fn send_flight(&mut self, now: Instant) -> HandshakeState {
        if let Some(packets) = self.flights.clone() {
            self.write_packets(packets);
        }

        if self.current_flight.is_last_send_flight() {
            self.current_retransmit_timer = None;
            return HandshakeState::Finished;
        }
        self.current_retransmit_timer = self
            .retransmit
            .then(|| now + self.cfg.retransmit_interval);
        HandshakeState::Waiting
    }

    fn read_flight(&mut self) -> Result<HandshakeState> {
        if self.handshake_rx.take().is_none() {
            return Ok(HandshakeState::Waiting);
        }

        let role = srv_cli_str(self.state.is_client);
        match self
            .current_flight
            .parse(&mut self.state, &self.cache, &self.cfg)
        {
            Ok(next_flight) => {
                debug!("[handshake:{role}] {} -> {}", self.current_flight, next_flight);
                self.current_retransmit_timer = None;
                // the last receiving flight is reached when parsing stays on it
                let last = next_flight.is_last_recv_flight()
                    && next_flight.to_string() == self.current_flight.to_string();
                self.current_flight = next_flight;
                Ok(if last {
                    HandshakeState::Finished
                } else {
                    HandshakeState::Preparing
                })
            }
            Err((alert, err)) => {
                if alert.is_some() || err.is_some() {
                    debug!(
                        "[handshake:{role}] {} rejected: alert {:?}, err {:?}",
                        self.current_flight, alert, err
                    );
                }
                if let Some(alert) = alert {
                    self.notify(alert.alert_level, alert.alert_description);
                }
                match err {
                    Some(err) => Err(err),
                    // flight not complete yet
                    None => Ok(HandshakeState::Waiting),
                }
            }
        }
    }

    fn answer_repeated_flight(&mut self) -> HandshakeState {
        let repeated = self.handshake_rx.take().is_some();
        if repeated && self.current_flight.is_last_send_flight() {
            debug!(
                "[handshake:{}] peer repeated its flight, resending {}",
                srv_cli_str(self.state.is_client),
                self.current_flight
            );
            HandshakeState::Sending
        } else {
            HandshakeState::Finished
        }
    }

    /// Retransmit timer expiry: resends the pending flight, or fails once
    /// `maximum_retransmit_number` resends went unanswered.
    pub(crate) fn handshake_timeout(&mut self, now: Instant) -> Result<()> {
        if self.current_handshake_state != HandshakeState::Waiting || !self.retransmit {
            return Ok(());
        }

        self.current_retransmit_count += 1;
        debug!(
            "[handshake:{}] {} retransmit {} of {}",
            srv_cli_str(self.state.is_client),
            self.current_flight,
            self.current_retransmit_count,
            self.cfg.maximum_retransmit_number,
        );
        self.current_handshake_state =
            if self.current_retransmit_count > self.cfg.maximum_retransmit_number {
                HandshakeState::Errored
            } else {
                HandshakeState::Sending
            };
        self.handshake(now)
    }
}
