#[cfg(test)]
mod conn_test;

use std::collections::VecDeque;
use std::time::Instant;

use bytes::BytesMut;
use log::*;
use shared::crypto::KeyingMaterialExporter;
use shared::error::*;
use shared::replay_detector::*;

use crate::alert::*;
use crate::config::HandshakeConfig;
use crate::content::*;
use crate::extension::extension_use_srtp::SrtpProtectionProfile;
use crate::flight::flight0::Flight0;
use crate::flight::flight1::Flight1;
use crate::flight::*;
use crate::fragment_buffer::FragmentBuffer;
use crate::handshake::Handshake;
use crate::handshake::handshake_cache::*;
use crate::handshaker::*;
use crate::prf::prf_export;
use crate::record_layer::*;
use crate::state::State;

pub(crate) static INVALID_KEYING_LABELS: &[&str] = &[
    "client finished",
    "server finished",
    "master secret",
    "key expansion",
    "extended master secret",
];

/// Lifecycle notifications surfaced through [`DTLSConn::poll_event`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DtlsEvent {
    HandshakeCompleted,
    Closed,
}

/// A sans-io DTLS connection. Datagrams go in through `handle_read`, come out
/// of `poll_write`; the caller drives time with `handle_timeout`.
pub struct DTLSConn {
    replay_detector: Vec<Box<dyn ReplayDetector + Send>>,
    incoming_decrypted_packets: VecDeque<BytesMut>,
    incoming_encrypted_packets: VecDeque<Vec<u8>>,
    fragment_buffer: FragmentBuffer,
    pub(crate) cache: HandshakeCache, // caching of handshake messages for verifyData generation
    outgoing_packets: VecDeque<Packet>,
    outgoing_compacted_raw_packets: VecDeque<BytesMut>,
    events: VecDeque<DtlsEvent>,

    pub(crate) state: State,

    handshake_completed: bool,
    closed: bool,

    pub(crate) current_handshake_state: HandshakeState,
    pub(crate) current_retransmit_timer: Option<Instant>,
    pub(crate) current_retransmit_count: usize,

    pub(crate) current_flight: Box<dyn Flight + Send + Sync>,
    pub(crate) flights: Option<Vec<Packet>>,
    pub(crate) cfg: HandshakeConfig,
    pub(crate) retransmit: bool,
    pub(crate) handshake_rx: Option<()>,
}

impl DTLSConn {
    pub fn new(cfg: HandshakeConfig) -> Result<Self> {
        let is_client = cfg.is_client;
        let flight = if is_client {
            Box::new(Flight1 {}) as Box<dyn Flight + Send + Sync>
        } else {
            Box::new(Flight0 {}) as Box<dyn Flight + Send + Sync>
        };

        Ok(Self {
            replay_detector: vec![],
            incoming_decrypted_packets: VecDeque::new(),
            incoming_encrypted_packets: VecDeque::new(),
            fragment_buffer: FragmentBuffer::new(),
            cache: HandshakeCache::new(),
            outgoing_packets: VecDeque::new(),
            outgoing_compacted_raw_packets: VecDeque::new(),
            events: VecDeque::new(),

            state: State::new(is_client),

            handshake_completed: false,
            closed: false,

            current_handshake_state: HandshakeState::Preparing,
            current_retransmit_timer: None,
            current_retransmit_count: 0,

            current_flight: flight,
            flights: None,
            cfg,
            retransmit: false,
            handshake_rx: None,
        })
    }

    pub fn is_client(&self) -> bool {
        self.state.is_client
    }

    /// Starts the handshake. A client queues its first flight, a server
    /// starts waiting for one.
    pub fn start(&mut self, now: Instant) -> Result<()> {
        if self.current_handshake_state != HandshakeState::Preparing {
            return Ok(());
        }
        self.run_handshake(now)
    }

    /// Consumes one datagram from the peer.
    pub fn handle_read(&mut self, buf: &[u8], now: Instant) -> Result<()> {
        if self.closed {
            return Err(Error::ErrConnClosed);
        }

        let mut rx_after_completion = false;
        for pkt in unpack_datagram(buf)? {
            let is_handshake = self.handle_incoming_packet(pkt.to_vec(), true)?;
            if is_handshake {
                self.handshake_rx = Some(());
                if self.is_handshake_completed() {
                    rx_after_completion = true;
                } else {
                    self.run_handshake(now)?;
                }
            }
            self.handle_incoming_queued_packets(now)?;
        }

        if rx_after_completion {
            self.run_handshake(now)?;
        }

        Ok(())
    }

    /// Next datagram to put on the wire.
    pub fn poll_write(&mut self) -> Option<BytesMut> {
        if let Err(err) = self.handle_outgoing_packets() {
            warn!(
                "handle_outgoing_packets [{}] with error {}",
                srv_cli_str(self.state.is_client),
                err
            );
        }
        self.outgoing_compacted_raw_packets.pop_front()
    }

    /// Decrypted application data received from the peer.
    pub fn incoming_application_data(&mut self) -> Option<BytesMut> {
        self.incoming_decrypted_packets.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<DtlsEvent> {
        self.events.pop_front()
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        self.current_retransmit_timer
    }

    pub fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        match self.current_retransmit_timer {
            Some(deadline) if deadline <= now => {
                self.current_retransmit_timer = None;
                let result = self.handshake_timeout(now);
                result.or_else(|err| self.fail(err))
            }
            _ => Ok(()),
        }
    }

    // Write writes p to the DTLS connection
    pub fn write(&mut self, p: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::ErrConnClosed);
        }
        if !self.is_handshake_completed() {
            return Err(Error::ErrHandshakeInProgress);
        }

        self.write_packets(vec![Packet {
            record: RecordLayer::new(
                self.state.local_epoch,
                Content::ApplicationData(p.to_vec()),
            ),
            should_encrypt: true,
        }]);

        Ok(())
    }

    // Close closes the connection.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.current_retransmit_timer = None;
            self.notify(AlertLevel::Warning, AlertDescription::CloseNotify);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_handshake_completed(&self) -> bool {
        self.handshake_completed
    }

    pub fn selected_srtp_protection_profile(&self) -> SrtpProtectionProfile {
        self.state.srtp_protection_profile
    }

    /// DER certificate the peer presented, once verified.
    pub fn peer_certificate(&self) -> Option<&[u8]> {
        self.state.peer_certificate.as_deref()
    }

    pub(crate) fn set_handshake_completed(&mut self) {
        self.handshake_completed = true;
        self.events.push_back(DtlsEvent::HandshakeCompleted);
    }

    pub(crate) fn notify(&mut self, level: AlertLevel, desc: AlertDescription) {
        let should_encrypt = self.state.local_epoch > 0 && self.state.is_cipher_suite_initialized();
        self.write_packets(vec![Packet {
            record: RecordLayer::new(
                self.state.local_epoch,
                Content::Alert(Alert {
                    alert_level: level,
                    alert_description: desc,
                }),
            ),
            should_encrypt,
        }]);
    }

    pub(crate) fn write_packets(&mut self, pkts: Vec<Packet>) {
        for pkt in pkts {
            self.outgoing_packets.push_back(pkt);
        }
    }

    fn run_handshake(&mut self, now: Instant) -> Result<()> {
        let result = self.handshake(now);
        result.or_else(|err| self.fail(err))
    }

    fn fail(&mut self, err: Error) -> Result<()> {
        warn!(
            "[handshake:{}] {} failed: {}",
            srv_cli_str(self.state.is_client),
            self.current_flight,
            err
        );
        self.current_handshake_state = HandshakeState::Errored;
        self.current_retransmit_timer = None;
        self.set_closed();
        Err(err)
    }

    fn set_closed(&mut self) {
        if !self.closed {
            self.closed = true;
            self.current_retransmit_timer = None;
            self.events.push_back(DtlsEvent::Closed);
        }
    }

    fn handle_outgoing_packets(&mut self) -> Result<()> {
        let mut raw_packets = vec![];
        while let Some(mut pkt) = self.outgoing_packets.pop_front() {
            let epoch = pkt.record.record_layer_header.epoch;
            pkt.record.record_layer_header.sequence_number =
                self.state.next_sequence_number(epoch);

            let raw = if pkt.should_encrypt {
                let Some(cipher_suite) = &self.state.cipher_suite else {
                    return Err(Error::ErrInvalidDtlsState);
                };
                let mut content = vec![];
                pkt.record.content.marshal(&mut content)?;
                cipher_suite.encrypt(&pkt.record.record_layer_header, &content)?
            } else {
                let mut raw = vec![];
                pkt.record.marshal(&mut raw)?;
                raw
            };
            trace!(
                "[handshake:{}] -> {} (epoch: {}, seq: {})",
                srv_cli_str(self.state.is_client),
                pkt.record.record_layer_header.content_type,
                epoch,
                pkt.record.record_layer_header.sequence_number
            );
            raw_packets.push(raw);
        }

        if !raw_packets.is_empty() {
            self.outgoing_compacted_raw_packets
                .extend(compact_raw_packets(&raw_packets, self.cfg.maximum_transmission_unit));
        }

        Ok(())
    }

    /// Replays records of the next epoch that arrived before the keys or
    /// the ChangeCipherSpec did.
    fn handle_incoming_queued_packets(&mut self, now: Instant) -> Result<()> {
        while self.state.is_cipher_suite_initialized() && !self.incoming_encrypted_packets.is_empty()
        {
            let before = self.incoming_encrypted_packets.len();
            let queued: Vec<Vec<u8>> = self.incoming_encrypted_packets.drain(..).collect();
            for pkt in queued {
                if self.handle_incoming_packet(pkt, true)? {
                    self.handshake_rx = Some(());
                    if !self.is_handshake_completed() {
                        self.run_handshake(now)?;
                    }
                }
            }
            if self.incoming_encrypted_packets.len() >= before {
                break;
            }
        }
        Ok(())
    }

    /// Returns whether the record carried a handshake message.
    fn handle_incoming_packet(&mut self, mut pkt: Vec<u8>, enqueue: bool) -> Result<bool> {
        let mut reader = pkt.as_slice();
        let h = match RecordLayerHeader::unmarshal(&mut reader) {
            Ok(h) => h,
            Err(err) => {
                // Decode error must be silently discarded
                // [RFC6347 Section-4.1.2.7]
                debug!(
                    "{}: discarded broken packet: {}",
                    srv_cli_str(self.state.is_client),
                    err
                );
                return Ok(false);
            }
        };

        // Validate epoch
        let epoch = self.state.remote_epoch;
        if h.epoch > epoch {
            if h.epoch > epoch + 1 {
                debug!(
                    "{}: discarded future packet (epoch: {}, seq: {})",
                    srv_cli_str(self.state.is_client),
                    h.epoch,
                    h.sequence_number,
                );
                return Ok(false);
            }
            if enqueue {
                debug!(
                    "{}: received packet of next epoch, queuing packet",
                    srv_cli_str(self.state.is_client)
                );
                self.incoming_encrypted_packets.push_back(pkt);
            }
            return Ok(false);
        }

        // Anti-replay protection
        while self.replay_detector.len() <= h.epoch as usize {
            self.replay_detector
                .push(Box::new(SlidingWindowDetector::new(
                    self.cfg.replay_protection_window,
                    MAX_SEQUENCE_NUMBER,
                )));
        }

        let ok = self.replay_detector[h.epoch as usize].check(h.sequence_number);
        if !ok {
            debug!(
                "{}: discarded duplicated packet (epoch: {}, seq: {})",
                srv_cli_str(self.state.is_client),
                h.epoch,
                h.sequence_number,
            );
            return Ok(false);
        }

        // Decrypt
        if h.epoch != 0 {
            let Some(cipher_suite) = &self.state.cipher_suite else {
                if enqueue {
                    debug!(
                        "{}: handshake not finished, queuing packet",
                        srv_cli_str(self.state.is_client)
                    );
                    self.incoming_encrypted_packets.push_back(pkt);
                }
                return Ok(false);
            };

            pkt = match cipher_suite.decrypt(&pkt) {
                Ok(pkt) => pkt,
                Err(err) => {
                    debug!(
                        "{}: decrypt failed: {}",
                        srv_cli_str(self.state.is_client),
                        err
                    );
                    return Ok(false);
                }
            };
        }

        let is_handshake = match self.fragment_buffer.push(&pkt) {
            Ok(is_handshake) => is_handshake,
            Err(err) => {
                // Decode error must be silently discarded
                // [RFC6347 Section-4.1.2.7]
                debug!(
                    "{}: defragment failed: {}",
                    srv_cli_str(self.state.is_client),
                    err
                );
                return Ok(false);
            }
        };
        if is_handshake {
            self.replay_detector[h.epoch as usize].accept();
            while let Some((out, epoch)) = self.fragment_buffer.pop() {
                let mut reader = out.as_slice();
                let hs = match Handshake::unmarshal(&mut reader) {
                    Ok(hs) => hs,
                    Err(err) => {
                        debug!(
                            "{}: discarded undecodable handshake message: {}",
                            srv_cli_str(self.state.is_client),
                            err
                        );
                        continue;
                    }
                };
                trace!(
                    "Recv [handshake:{}] -> {} (epoch: {}, seq: {})",
                    srv_cli_str(self.state.is_client),
                    hs.handshake_header.handshake_type,
                    epoch,
                    hs.handshake_header.message_sequence
                );
                self.cache.push(
                    out,
                    epoch,
                    hs.handshake_header.message_sequence,
                    hs.handshake_header.handshake_type,
                    !self.state.is_client,
                );
            }
            return Ok(true);
        }

        let r = match RecordLayer::unmarshal(&pkt) {
            Ok(r) => r,
            Err(err) => {
                debug!(
                    "{}: discarded undecodable record: {}",
                    srv_cli_str(self.state.is_client),
                    err
                );
                return Ok(false);
            }
        };

        match r.content {
            // handshake records went through the fragment buffer
            Content::Handshake(_) => {}
            Content::Alert(a) => {
                debug!("{}: <- {}", srv_cli_str(self.state.is_client), a);
                self.replay_detector[h.epoch as usize].accept();
                if a.alert_description == AlertDescription::CloseNotify && !self.closed {
                    // Respond with a close_notify [RFC5246 Section 7.2.1]
                    self.notify(AlertLevel::Warning, AlertDescription::CloseNotify);
                }
                self.set_closed();
                if a.alert_level == AlertLevel::Fatal {
                    return Err(Error::ErrAlertReceived);
                }
            }
            Content::ChangeCipherSpec => {
                if !self.state.is_cipher_suite_initialized() {
                    if enqueue {
                        debug!(
                            "{}: CipherSuite not initialized, queuing packet",
                            srv_cli_str(self.state.is_client)
                        );
                        self.incoming_encrypted_packets.push_back(pkt);
                    }
                    return Ok(false);
                }

                let new_remote_epoch = h.epoch + 1;
                debug!(
                    "{}: <- ChangeCipherSpec (epoch: {})",
                    srv_cli_str(self.state.is_client),
                    new_remote_epoch
                );

                if epoch + 1 == new_remote_epoch {
                    self.state.remote_epoch = new_remote_epoch;
                    self.replay_detector[h.epoch as usize].accept();
                }
            }
            Content::ApplicationData(data) => {
                if h.epoch == 0 {
                    warn!(
                        "{}: <- Unexpected ApplicationData Message",
                        srv_cli_str(self.state.is_client),
                    );
                    self.notify(AlertLevel::Fatal, AlertDescription::UnexpectedMessage);
                    return Err(Error::ErrApplicationDataEpochZero);
                }

                self.replay_detector[h.epoch as usize].accept();
                self.incoming_decrypted_packets
                    .push_back(BytesMut::from(data.as_slice()));
            }
        };

        Ok(false)
    }
}

impl KeyingMaterialExporter for DTLSConn {
    fn export_keying_material(
        &self,
        label: &str,
        context: &[u8],
        length: usize,
    ) -> Result<Vec<u8>> {
        if !self.is_handshake_completed() {
            return Err(Error::ErrHandshakeInProgress);
        }
        if !context.is_empty() {
            return Err(Error::ErrContextUnsupported);
        }
        if INVALID_KEYING_LABELS.contains(&label) {
            return Err(Error::ErrReservedExportKeyingMaterial);
        }

        prf_export(
            &self.state.master_secret,
            label,
            self.state.client_random(),
            self.state.server_random(),
            length,
        )
    }
}
