use std::fmt;

use log::debug;
use shared::error::Error;

use super::flight5::Flight5;
use super::*;
use crate::crypto::{value_key_message, verify_signature};
use crate::handshake::{HandshakeMessageHelloVerifyRequest, HandshakeMessageServerHello};
use crate::handshaker::srv_cli_str;
use crate::record_layer::PROTOCOL_VERSION1_0;

#[derive(Debug, PartialEq)]
pub(crate) struct Flight3;

impl fmt::Display for Flight3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flight 3")
    }
}

/// DTLS 1.2 clients must not assume that the server will use the protocol
/// version specified in HelloVerifyRequest message. RFC 6347 Section 4.2.1
pub(crate) fn check_hello_verify_request(
    hello_verify_request: &HandshakeMessageHelloVerifyRequest,
) -> Result<(), FlightError> {
    if hello_verify_request.version != PROTOCOL_VERSION1_0
        && hello_verify_request.version != PROTOCOL_VERSION1_2
    {
        return Err(fatal(
            AlertDescription::ProtocolVersion,
            Error::ErrUnsupportedProtocolVersion,
        ));
    }
    Ok(())
}

impl Flight for Flight3 {
    fn parse(
        &self,
        state: &mut State,
        cache: &HandshakeCache,
        cfg: &HandshakeConfig,
    ) -> Result<Box<dyn Flight + Send + Sync>, FlightError> {
        // Clients may receive multiple HelloVerifyRequest messages with
        // different cookies and answer each with a new ClientHello.
        if let Some((seq, msgs)) = pull_flight(
            cache,
            state.handshake_recv_sequence,
            &[rule(HandshakeType::HelloVerifyRequest, 0, false)],
        )? {
            if let Some(HandshakeMessage::HelloVerifyRequest(hello_verify_request)) =
                msgs.get(&HandshakeType::HelloVerifyRequest)
            {
                check_hello_verify_request(hello_verify_request)?;
                state.cookie.clone_from(&hello_verify_request.cookie);
                state.handshake_recv_sequence = seq;
                return Ok(Box::new(Flight3 {}));
            }
        }

        let Some((seq, msgs)) = pull_flight(
            cache,
            state.handshake_recv_sequence,
            &[
                rule(HandshakeType::ServerHello, 0, false),
                rule(HandshakeType::Certificate, 0, false),
                rule(HandshakeType::ServerKeyExchange, 0, false),
                optional(HandshakeType::CertificateRequest, 0, false),
                rule(HandshakeType::ServerHelloDone, 0, false),
            ],
        )?
        else {
            return Err((None, None));
        };

        let (
            Some(HandshakeMessage::ServerHello(server_hello)),
            Some(HandshakeMessage::Certificate(certificate)),
            Some(HandshakeMessage::ServerKeyExchange(server_key_exchange)),
        ) = (
            msgs.get(&HandshakeType::ServerHello),
            msgs.get(&HandshakeType::Certificate),
            msgs.get(&HandshakeType::ServerKeyExchange),
        )
        else {
            return Err(internal_error(Error::ErrHandshakeMessageUnexpected));
        };

        handle_server_hello(state, cfg, server_hello)?;

        let Some(leaf) = certificate.certificate.first() else {
            return Err(fatal(
                AlertDescription::BadCertificate,
                Error::ErrInvalidCertificate,
            ));
        };

        if !cfg
            .local_elliptic_curves
            .contains(&server_key_exchange.named_curve)
        {
            return Err(fatal(
                AlertDescription::IllegalParameter,
                Error::ErrInvalidNamedCurve,
            ));
        }
        if server_key_exchange.algorithm != SignatureHashAlgorithm::ECDSA_SHA256 {
            return Err(fatal(
                AlertDescription::InsufficientSecurity,
                Error::ErrNoAvailableSignatureSchemes,
            ));
        }
        let signed = value_key_message(
            state.client_random(),
            state.server_random(),
            &server_key_exchange.public_key,
            server_key_exchange.named_curve,
        );
        verify_signature(&signed, &server_key_exchange.signature, leaf)
            .map_err(|err| fatal(AlertDescription::BadCertificate, err))?;
        verify_peer_certificate(cfg, leaf)?;
        state.peer_certificate = Some(leaf.clone());

        if let Some(HandshakeMessage::CertificateRequest(certificate_request)) =
            msgs.get(&HandshakeType::CertificateRequest)
        {
            if !certificate_request
                .signature_hash_algorithms
                .contains(&SignatureHashAlgorithm::ECDSA_SHA256)
            {
                return Err(fatal(
                    AlertDescription::HandshakeFailure,
                    Error::ErrNoAvailableSignatureSchemes,
                ));
            }
            state.remote_requested_certificate = true;
        }

        state.named_curve = server_key_exchange.named_curve;
        let keypair = state
            .named_curve
            .generate_keypair()
            .map_err(internal_error)?;
        state.local_public_key.clone_from(&keypair.public_key);
        state.pre_master_secret = keypair
            .agree(&server_key_exchange.public_key)
            .map_err(|err| fatal(AlertDescription::IllegalParameter, err))?;

        state.handshake_recv_sequence = seq;
        Ok(Box::new(Flight5 {}))
    }

    fn generate(
        &self,
        state: &mut State,
        cache: &mut HandshakeCache,
        cfg: &HandshakeConfig,
    ) -> Result<Vec<Packet>, FlightError> {
        let hello = client_hello(state, cfg);
        Ok(vec![handshake_packet(state, cache, 0, hello)?])
    }
}

fn handle_server_hello(
    state: &mut State,
    cfg: &HandshakeConfig,
    server_hello: &HandshakeMessageServerHello,
) -> Result<(), FlightError> {
    if server_hello.version != PROTOCOL_VERSION1_2 {
        return Err(fatal(
            AlertDescription::ProtocolVersion,
            Error::ErrUnsupportedProtocolVersion,
        ));
    }
    if server_hello.cipher_suite != CipherSuiteId::Tls_Ecdhe_Ecdsa_With_Aes_128_Gcm_Sha256 {
        return Err(fatal(
            AlertDescription::InsufficientSecurity,
            Error::ErrCipherSuiteNoIntersection,
        ));
    }
    if server_hello.compression_method != COMPRESSION_METHOD_NULL {
        return Err(fatal(
            AlertDescription::IllegalParameter,
            Error::ErrInvalidCompressionMethod,
        ));
    }

    state.remote_random = server_hello.random;

    let mut srtp_protection_profile = None;
    let mut remote_extended_master_secret = false;
    for extension in &server_hello.extensions {
        match extension {
            Extension::UseSrtp(use_srtp) => {
                let profile = match use_srtp.protection_profiles.as_slice() {
                    [profile] if cfg.local_srtp_protection_profiles.contains(profile) => *profile,
                    _ => {
                        return Err(fatal(
                            AlertDescription::IllegalParameter,
                            Error::ErrNoSrtpProtectionProfile,
                        ));
                    }
                };
                srtp_protection_profile = Some(profile);
            }
            Extension::UseExtendedMasterSecret => remote_extended_master_secret = true,
            _ => {}
        }
    }

    if cfg.extended_master_secret == ExtendedMasterSecretType::Require
        && !remote_extended_master_secret
    {
        return Err(fatal(
            AlertDescription::InsufficientSecurity,
            Error::ErrClientRequiredButNoServerEms,
        ));
    }
    state.extended_master_secret = remote_extended_master_secret
        && cfg.extended_master_secret != ExtendedMasterSecretType::Disable;

    let Some(profile) = srtp_protection_profile else {
        return Err(fatal(
            AlertDescription::InsufficientSecurity,
            Error::ErrNoSrtpProtectionProfile,
        ));
    };
    state.srtp_protection_profile = profile;

    debug!(
        "[handshake:{}] use srtp protection profile {}, extended master secret {}",
        srv_cli_str(state.is_client),
        state.srtp_protection_profile,
        state.extended_master_secret
    );
    Ok(())
}
