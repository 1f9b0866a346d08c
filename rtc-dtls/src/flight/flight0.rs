use std::fmt;

use log::debug;
use shared::error::Error;

use super::flight2::Flight2;
use super::flight4::Flight4;
use super::*;
use crate::extension::extension_use_srtp::find_matching_srtp_profile;
use crate::handshaker::srv_cli_str;

#[derive(Debug, PartialEq)]
pub(crate) struct Flight0;

impl fmt::Display for Flight0 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flight 0")
    }
}

impl Flight for Flight0 {
    fn has_retransmit(&self) -> bool {
        false
    }

    fn parse(
        &self,
        state: &mut State,
        cache: &HandshakeCache,
        cfg: &HandshakeConfig,
    ) -> Result<Box<dyn Flight + Send + Sync>, FlightError> {
        let Some((seq, msgs)) =
            pull_flight(cache, 0, &[rule(HandshakeType::ClientHello, 0, true)])?
        else {
            return Err((None, None));
        };
        state.handshake_recv_sequence = seq;

        let Some(HandshakeMessage::ClientHello(client_hello)) =
            msgs.get(&HandshakeType::ClientHello)
        else {
            return Err(internal_error(Error::ErrHandshakeMessageUnexpected));
        };
        negotiate(state, cfg, client_hello)?;

        if state.cookie.is_empty() {
            state.generate_cookie();
        }

        if cfg.insecure_skip_hello_verify {
            Ok(Box::new(Flight4 {}))
        } else {
            Ok(Box::new(Flight2 {}))
        }
    }

    fn generate(
        &self,
        _state: &mut State,
        _cache: &mut HandshakeCache,
        _cfg: &HandshakeConfig,
    ) -> Result<Vec<Packet>, FlightError> {
        Ok(vec![])
    }
}

/// Picks the server's parameters from a ClientHello. Runs again on the
/// ClientHello that carries the cookie, which is the one the transcript
/// covers.
pub(crate) fn negotiate(
    state: &mut State,
    cfg: &HandshakeConfig,
    client_hello: &HandshakeMessageClientHello,
) -> Result<(), FlightError> {
    if client_hello.version != PROTOCOL_VERSION1_2 {
        return Err(fatal(
            AlertDescription::ProtocolVersion,
            Error::ErrUnsupportedProtocolVersion,
        ));
    }

    state.remote_random = client_hello.random;

    if !client_hello
        .cipher_suites
        .contains(&CipherSuiteId::Tls_Ecdhe_Ecdsa_With_Aes_128_Gcm_Sha256)
    {
        return Err(fatal(
            AlertDescription::InsufficientSecurity,
            Error::ErrCipherSuiteNoIntersection,
        ));
    }

    if !client_hello
        .compression_methods
        .contains(&COMPRESSION_METHOD_NULL)
    {
        return Err(fatal(
            AlertDescription::HandshakeFailure,
            Error::ErrInvalidCompressionMethod,
        ));
    }

    state.secure_renegotiation = client_hello
        .cipher_suites
        .contains(&CipherSuiteId::Tls_Empty_Renegotiation_Info_Scsv);

    let mut remote_curves = None;
    let mut remote_signature_algorithms = None;
    let mut remote_srtp_profiles = vec![];
    let mut remote_extended_master_secret = false;
    for extension in &client_hello.extensions {
        match extension {
            Extension::SupportedEllipticCurves(curves) => remote_curves = Some(curves),
            Extension::SupportedSignatureAlgorithms(algorithms) => {
                remote_signature_algorithms = Some(algorithms)
            }
            Extension::UseSrtp(use_srtp) => {
                remote_srtp_profiles.clone_from(&use_srtp.protection_profiles)
            }
            Extension::UseExtendedMasterSecret => remote_extended_master_secret = true,
            Extension::RenegotiationInfo => state.secure_renegotiation = true,
            _ => {}
        }
    }

    // without supported_groups any curve is acceptable
    let named_curve = match remote_curves {
        Some(curves) => cfg
            .local_elliptic_curves
            .iter()
            .find(|c| curves.contains(c))
            .copied(),
        None => cfg.local_elliptic_curves.first().copied(),
    };
    let Some(named_curve) = named_curve else {
        return Err(fatal(
            AlertDescription::HandshakeFailure,
            Error::ErrNoSupportedEllipticCurves,
        ));
    };
    state.named_curve = named_curve;

    if let Some(algorithms) = remote_signature_algorithms {
        if !algorithms.contains(&SignatureHashAlgorithm::ECDSA_SHA256) {
            return Err(fatal(
                AlertDescription::InsufficientSecurity,
                Error::ErrNoAvailableSignatureSchemes,
            ));
        }
    }

    let Some(profile) =
        find_matching_srtp_profile(&remote_srtp_profiles, &cfg.local_srtp_protection_profiles)
    else {
        return Err(fatal(
            AlertDescription::InsufficientSecurity,
            Error::ErrNoSrtpProtectionProfile,
        ));
    };
    state.srtp_protection_profile = profile;

    if cfg.extended_master_secret == ExtendedMasterSecretType::Require
        && !remote_extended_master_secret
    {
        return Err(fatal(
            AlertDescription::InsufficientSecurity,
            Error::ErrServerRequiredButNoClientEms,
        ));
    }
    state.extended_master_secret = remote_extended_master_secret
        && cfg.extended_master_secret != ExtendedMasterSecretType::Disable;

    debug!(
        "[handshake:{}] use curve {}, srtp protection profile {}, extended master secret {}",
        srv_cli_str(state.is_client),
        state.named_curve,
        state.srtp_protection_profile,
        state.extended_master_secret
    );
    Ok(())
}
