pub(crate) mod flight0;
pub(crate) mod flight1;
pub(crate) mod flight2;
pub(crate) mod flight3;
pub(crate) mod flight4;
pub(crate) mod flight5;
pub(crate) mod flight6;

use std::collections::HashMap;
use std::fmt;

use shared::error::Error;

use crate::alert::{Alert, AlertDescription};
use crate::cipher_suite::CipherSuiteId;
use crate::config::{ExtendedMasterSecretType, HandshakeConfig};
use crate::content::Content;
use crate::extension::extension_use_srtp::ExtensionUseSrtp;
use crate::extension::{ELLIPTIC_CURVE_POINT_FORMAT_UNCOMPRESSED, Extension};
use crate::handshake::handshake_cache::{HandshakeCache, HandshakeCachePullRule};
use crate::handshake::{
    COMPRESSION_METHOD_NULL, Handshake, HandshakeMessage, HandshakeMessageClientHello,
    HandshakeType,
};
use crate::record_layer::{PROTOCOL_VERSION1_2, RecordLayer};
use crate::signature_hash_algorithm::SignatureHashAlgorithm;
use crate::state::State;

/// Outcome of a failed flight step: an alert for the peer and an error for
/// the caller. `(None, None)` means the expected messages have not all
/// arrived yet.
pub(crate) type FlightError = (Option<Alert>, Option<Error>);

/// A record queued for transmission. Sequence numbers are assigned, and
/// epoch > 0 records sealed, each time the record goes out.
#[derive(Clone, Debug)]
pub(crate) struct Packet {
    pub(crate) record: RecordLayer,
    pub(crate) should_encrypt: bool,
}

impl Packet {
    pub(crate) fn change_cipher_spec() -> Self {
        Packet {
            record: RecordLayer::new(0, Content::ChangeCipherSpec),
            should_encrypt: false,
        }
    }
}

// Message flights of a full handshake (RFC 6347, section 4.2.4):
//
//   Client                                          Server
//   ------                                          ------
//                                                   Waiting             Flight 0
//
//   ClientHello             -------->                                   Flight 1
//
//                           <-------    HelloVerifyRequest              Flight 2
//
//   ClientHello             -------->                                   Flight 3
//
//                                              ServerHello    \
//                                              Certificate     \
//                                        ServerKeyExchange      Flight 4
//                                      CertificateRequest*     /
//                           <--------      ServerHelloDone    /
//
//   Certificate*                                              \
//   ClientKeyExchange                                          \
//   CertificateVerify*                                          Flight 5
//   [ChangeCipherSpec]                                         /
//   Finished                -------->                         /
//
//                                       [ChangeCipherSpec]    \ Flight 6
//                           <--------             Finished    /
//
// A server configured to skip the cookie exchange goes from Flight 0 to
// Flight 4, and a client accepts a ServerHello while still in Flight 1.
pub(crate) trait Flight: fmt::Display + fmt::Debug {
    fn is_last_send_flight(&self) -> bool {
        false
    }

    fn is_last_recv_flight(&self) -> bool {
        false
    }

    fn has_retransmit(&self) -> bool {
        true
    }

    fn parse(
        &self,
        state: &mut State,
        cache: &HandshakeCache,
        cfg: &HandshakeConfig,
    ) -> Result<Box<dyn Flight + Send + Sync>, FlightError>;

    fn generate(
        &self,
        state: &mut State,
        cache: &mut HandshakeCache,
        cfg: &HandshakeConfig,
    ) -> Result<Vec<Packet>, FlightError>;
}

pub(crate) fn fatal(description: AlertDescription, err: Error) -> FlightError {
    (Some(Alert::fatal(description)), Some(err))
}

pub(crate) fn internal_error(err: Error) -> FlightError {
    fatal(AlertDescription::InternalError, err)
}

/// Numbers a handshake message, records it in the transcript and wraps it
/// in a packet for `epoch`.
pub(crate) fn handshake_packet(
    state: &mut State,
    cache: &mut HandshakeCache,
    epoch: u16,
    message: HandshakeMessage,
) -> Result<Packet, FlightError> {
    let typ = message.handshake_type();
    let message_sequence = state.next_handshake_sequence();
    let handshake = Handshake::new(message, message_sequence);

    let mut raw = vec![];
    handshake.marshal(&mut raw).map_err(internal_error)?;
    cache.push(raw, epoch, message_sequence, typ, state.is_client);

    Ok(Packet {
        record: RecordLayer::new(epoch, Content::Handshake(handshake)),
        should_encrypt: epoch > 0,
    })
}

pub(crate) fn rule(typ: HandshakeType, epoch: u16, is_client: bool) -> HandshakeCachePullRule {
    HandshakeCachePullRule {
        typ,
        epoch,
        is_client,
        optional: false,
    }
}

pub(crate) fn optional(typ: HandshakeType, epoch: u16, is_client: bool) -> HandshakeCachePullRule {
    HandshakeCachePullRule {
        typ,
        epoch,
        is_client,
        optional: true,
    }
}

/// Pulls the next messages of a flight starting at message_seq `start_seq`.
/// `Ok(None)` while the flight is incomplete.
pub(crate) fn pull_flight(
    cache: &HandshakeCache,
    start_seq: u16,
    rules: &[HandshakeCachePullRule],
) -> Result<Option<(u16, HashMap<HandshakeType, HandshakeMessage>)>, FlightError> {
    cache
        .full_pull_map(start_seq, rules)
        .map_err(|err| fatal(AlertDescription::DecodeError, err))
}

/// Handshake transcript through the ClientKeyExchange. This is what the
/// client's CertificateVerify signs and what the extended master secret
/// hashes. Absent optional messages are skipped.
pub(crate) fn transcript_rules() -> Vec<HandshakeCachePullRule> {
    vec![
        rule(HandshakeType::ClientHello, 0, true),
        rule(HandshakeType::ServerHello, 0, false),
        rule(HandshakeType::Certificate, 0, false),
        rule(HandshakeType::ServerKeyExchange, 0, false),
        rule(HandshakeType::CertificateRequest, 0, false),
        rule(HandshakeType::ServerHelloDone, 0, false),
        rule(HandshakeType::Certificate, 0, true),
        rule(HandshakeType::ClientKeyExchange, 0, true),
    ]
}

/// Handshake transcript covered by the client's Finished.
pub(crate) fn client_finished_rules() -> Vec<HandshakeCachePullRule> {
    let mut rules = transcript_rules();
    rules.push(rule(HandshakeType::CertificateVerify, 0, true));
    rules
}

/// Handshake transcript covered by the server's Finished.
pub(crate) fn server_finished_rules() -> Vec<HandshakeCachePullRule> {
    let mut rules = client_finished_rules();
    rules.push(rule(HandshakeType::Finished, 1, true));
    rules
}

/// Runs the user hook over the peer certificate.
pub(crate) fn verify_peer_certificate(
    cfg: &HandshakeConfig,
    certificate: &[u8],
) -> Result<(), FlightError> {
    if let Some(verify_peer_certificate) = &cfg.verify_peer_certificate {
        verify_peer_certificate(certificate)
            .map_err(|err| fatal(AlertDescription::BadCertificate, err))?;
    }
    Ok(())
}

/// The ClientHello of Flight 1 and Flight 3. They differ in the cookie only.
pub(crate) fn client_hello(state: &State, cfg: &HandshakeConfig) -> HandshakeMessage {
    let mut extensions = vec![
        Extension::SupportedEllipticCurves(cfg.local_elliptic_curves.clone()),
        Extension::SupportedPointFormats(vec![ELLIPTIC_CURVE_POINT_FORMAT_UNCOMPRESSED]),
        Extension::SupportedSignatureAlgorithms(vec![SignatureHashAlgorithm::ECDSA_SHA256]),
        Extension::UseSrtp(ExtensionUseSrtp {
            protection_profiles: cfg.local_srtp_protection_profiles.clone(),
            mki: vec![],
        }),
    ];
    if cfg.extended_master_secret != ExtendedMasterSecretType::Disable {
        extensions.push(Extension::UseExtendedMasterSecret);
    }
    extensions.push(Extension::RenegotiationInfo);

    HandshakeMessage::ClientHello(HandshakeMessageClientHello {
        version: PROTOCOL_VERSION1_2,
        random: state.local_random,
        session_id: state.session_id.clone(),
        cookie: state.cookie.clone(),
        cipher_suites: vec![CipherSuiteId::Tls_Ecdhe_Ecdsa_With_Aes_128_Gcm_Sha256],
        compression_methods: vec![COMPRESSION_METHOD_NULL],
        extensions,
    })
}
