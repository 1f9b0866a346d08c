use std::fmt;

use log::debug;
use shared::error::Error;

use super::flight6::Flight6;
use super::*;
use crate::config::ClientAuthType;
use crate::crypto::{value_key_message, verify_signature};
use crate::handshake::{
    CLIENT_CERTIFICATE_TYPE_ECDSA_SIGN, HandshakeMessageCertificate,
    HandshakeMessageCertificateRequest, HandshakeMessageServerHello,
    HandshakeMessageServerHelloDone, HandshakeMessageServerKeyExchange,
};
use crate::handshaker::srv_cli_str;
use crate::prf::{prf_verify_data_client, session_hash};

#[derive(Debug, PartialEq)]
pub(crate) struct Flight4;

impl fmt::Display for Flight4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flight 4")
    }
}

impl Flight for Flight4 {
    fn parse(
        &self,
        state: &mut State,
        cache: &HandshakeCache,
        cfg: &HandshakeConfig,
    ) -> Result<Box<dyn Flight + Send + Sync>, FlightError> {
        // The client's Finished is encrypted, keys come from the messages
        // ahead of it.
        if !state.is_cipher_suite_initialized() {
            init_cipher_suite(state, cache, cfg)?;
        }

        let Some((seq, msgs)) = pull_flight(
            cache,
            state.handshake_recv_sequence,
            &[
                optional(HandshakeType::Certificate, 0, true),
                rule(HandshakeType::ClientKeyExchange, 0, true),
                optional(HandshakeType::CertificateVerify, 0, true),
                rule(HandshakeType::Finished, 1, true),
            ],
        )?
        else {
            return Err((None, None));
        };

        let Some(HandshakeMessage::Finished(finished)) = msgs.get(&HandshakeType::Finished) else {
            return Err(internal_error(Error::ErrHandshakeMessageUnexpected));
        };

        let expected = prf_verify_data_client(
            &state.master_secret,
            &cache.pull_and_merge(&client_finished_rules()),
        )
        .map_err(internal_error)?;
        if expected != finished.verify_data {
            return Err(fatal(
                AlertDescription::DecryptError,
                Error::ErrVerifyDataMismatch,
            ));
        }

        state.handshake_recv_sequence = seq;
        Ok(Box::new(Flight6 {}))
    }

    fn generate(
        &self,
        state: &mut State,
        cache: &mut HandshakeCache,
        cfg: &HandshakeConfig,
    ) -> Result<Vec<Packet>, FlightError> {
        let mut pkts = vec![];

        if state.local_keypair.is_none() {
            let keypair = state
                .named_curve
                .generate_keypair()
                .map_err(internal_error)?;
            state.local_public_key.clone_from(&keypair.public_key);
            state.local_keypair = Some(keypair);
        }

        let mut extensions = vec![];
        if state.secure_renegotiation {
            extensions.push(Extension::RenegotiationInfo);
        }
        if state.extended_master_secret {
            extensions.push(Extension::UseExtendedMasterSecret);
        }
        extensions.push(Extension::UseSrtp(ExtensionUseSrtp {
            protection_profiles: vec![state.srtp_protection_profile],
            mki: vec![],
        }));
        extensions.push(Extension::SupportedPointFormats(vec![
            ELLIPTIC_CURVE_POINT_FORMAT_UNCOMPRESSED,
        ]));

        let server_hello = HandshakeMessage::ServerHello(HandshakeMessageServerHello {
            version: PROTOCOL_VERSION1_2,
            random: state.local_random,
            session_id: state.session_id.clone(),
            cipher_suite: CipherSuiteId::Tls_Ecdhe_Ecdsa_With_Aes_128_Gcm_Sha256,
            compression_method: COMPRESSION_METHOD_NULL,
            extensions,
        });
        pkts.push(handshake_packet(state, cache, 0, server_hello)?);

        let certificate = HandshakeMessage::Certificate(HandshakeMessageCertificate {
            certificate: vec![cfg.local_certificate.certificate.clone()],
        });
        pkts.push(handshake_packet(state, cache, 0, certificate)?);

        let signed = value_key_message(
            state.client_random(),
            state.server_random(),
            &state.local_public_key,
            state.named_curve,
        );
        let signature = cfg
            .local_certificate
            .sign(&signed)
            .map_err(internal_error)?;
        let server_key_exchange =
            HandshakeMessage::ServerKeyExchange(HandshakeMessageServerKeyExchange {
                named_curve: state.named_curve,
                public_key: state.local_public_key.clone(),
                algorithm: SignatureHashAlgorithm::ECDSA_SHA256,
                signature,
            });
        pkts.push(handshake_packet(state, cache, 0, server_key_exchange)?);

        if cfg.client_auth != ClientAuthType::NoClientCert {
            let certificate_request =
                HandshakeMessage::CertificateRequest(HandshakeMessageCertificateRequest {
                    certificate_types: vec![CLIENT_CERTIFICATE_TYPE_ECDSA_SIGN],
                    signature_hash_algorithms: vec![SignatureHashAlgorithm::ECDSA_SHA256],
                });
            pkts.push(handshake_packet(state, cache, 0, certificate_request)?);
        }

        let server_hello_done =
            HandshakeMessage::ServerHelloDone(HandshakeMessageServerHelloDone);
        pkts.push(handshake_packet(state, cache, 0, server_hello_done)?);

        Ok(pkts)
    }
}

/// Checks the client's certificate, runs the key agreement and derives
/// the record keys. Waits while the flight is incomplete.
fn init_cipher_suite(
    state: &mut State,
    cache: &HandshakeCache,
    cfg: &HandshakeConfig,
) -> Result<(), FlightError> {
    let Some((_, msgs)) = pull_flight(
        cache,
        state.handshake_recv_sequence,
        &[
            optional(HandshakeType::Certificate, 0, true),
            rule(HandshakeType::ClientKeyExchange, 0, true),
            optional(HandshakeType::CertificateVerify, 0, true),
        ],
    )?
    else {
        return Err((None, None));
    };

    let Some(HandshakeMessage::ClientKeyExchange(client_key_exchange)) =
        msgs.get(&HandshakeType::ClientKeyExchange)
    else {
        return Err(internal_error(Error::ErrHandshakeMessageUnexpected));
    };

    // an empty chain is how a client declines a CertificateRequest
    let leaf = match msgs.get(&HandshakeType::Certificate) {
        Some(HandshakeMessage::Certificate(c)) => c.certificate.first(),
        _ => None,
    };
    let certificate_verify = match msgs.get(&HandshakeType::CertificateVerify) {
        Some(HandshakeMessage::CertificateVerify(cv)) => Some(cv),
        _ => None,
    };

    match (leaf, certificate_verify) {
        (Some(_), None) => return Err((None, None)),
        (Some(leaf), Some(certificate_verify)) => {
            if certificate_verify.algorithm != SignatureHashAlgorithm::ECDSA_SHA256 {
                return Err(fatal(
                    AlertDescription::InsufficientSecurity,
                    Error::ErrNoAvailableSignatureSchemes,
                ));
            }
            verify_signature(
                &cache.pull_and_merge(&transcript_rules()),
                &certificate_verify.signature,
                leaf,
            )
            .map_err(|err| fatal(AlertDescription::BadCertificate, err))?;
            verify_peer_certificate(cfg, leaf)?;
            state.peer_certificate = Some(leaf.clone());
        }
        (None, Some(_)) => {
            return Err(fatal(
                AlertDescription::UnexpectedMessage,
                Error::ErrCertificateVerifyNoCertificate,
            ));
        }
        (None, None) => {
            if cfg.client_auth == ClientAuthType::RequireAnyClientCert {
                return Err(fatal(
                    AlertDescription::HandshakeFailure,
                    Error::ErrClientCertificateRequired,
                ));
            }
        }
    }

    let Some(keypair) = state.local_keypair.take() else {
        return Err(internal_error(Error::ErrInvalidDtlsState));
    };
    state.pre_master_secret = keypair
        .agree(&client_key_exchange.public_key)
        .map_err(|err| fatal(AlertDescription::IllegalParameter, err))?;

    let hash = session_hash(&cache.pull_and_merge(&transcript_rules()));
    state.init_cipher_suite(&hash).map_err(internal_error)?;
    debug!(
        "[handshake:{}] record keys derived",
        srv_cli_str(state.is_client)
    );
    Ok(())
}
