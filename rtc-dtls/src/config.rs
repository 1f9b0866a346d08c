use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use shared::error::{Error, Result};

use crate::crypto::Certificate;
use crate::curve::NamedCurve;
use crate::extension::extension_use_srtp::SrtpProtectionProfile;

pub(crate) const DEFAULT_MTU: usize = 1200; // bytes
pub(crate) const DEFAULT_MAX_RETRANSMITS: usize = 7;
pub(crate) const INITIAL_TICKER_INTERVAL: Duration = Duration::from_secs(1);
// Default replay protection window is specified by RFC 6347 Section 4.1.2.6
pub(crate) const DEFAULT_REPLAY_PROTECTION_WINDOW: usize = 64;

/// Policy for the extended master secret extension of RFC 7627.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ExtendedMasterSecretType {
    /// Offer and accept the extension, fall back to the classic master
    /// secret when the peer does not support it.
    #[default]
    Request,
    /// Fail the handshake when the peer does not support it.
    Require,
    /// Never negotiate it.
    Disable,
}

/// Whether a server asks the client for a certificate.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ClientAuthType {
    #[default]
    NoClientCert,
    /// Ask for a certificate but accept an empty answer.
    RequestClientCert,
    /// Fail the handshake unless the client presents a certificate.
    RequireAnyClientCert,
}

/// Called with the peer's DER certificate once it arrives. An error aborts
/// the handshake.
pub type VerifyPeerCertificateFn = Arc<dyn (Fn(&[u8]) -> Result<()>) + Send + Sync>;

/// Options for one DTLS endpoint; `build` fills unset values with defaults.
#[derive(Clone, Default)]
pub struct ConfigBuilder {
    certificate: Option<Certificate>,
    srtp_protection_profiles: Vec<SrtpProtectionProfile>,
    flight_interval: Duration,
    max_retransmits: usize,
    verify_peer_certificate: Option<VerifyPeerCertificateFn>,
    mtu: usize,
    replay_protection_window: usize,
    extended_master_secret: ExtendedMasterSecretType,
    client_auth: ClientAuthType,
    elliptic_curves: Vec<NamedCurve>,
    insecure_skip_hello_verify: bool,
}

impl ConfigBuilder {
    /// certificate is presented to the other side of the connection.
    /// Both roles must set it.
    pub fn with_certificate(mut self, certificate: Certificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    /// srtp_protection_profiles are the supported protection profiles in
    /// preference order. Defaults to both AES-CM profiles, 80-bit first.
    pub fn with_srtp_protection_profiles(
        mut self,
        srtp_protection_profiles: Vec<SrtpProtectionProfile>,
    ) -> Self {
        self.srtp_protection_profiles = srtp_protection_profiles;
        self
    }

    /// Initial retransmit timeout for an unanswered flight. Zero keeps the
    /// one second default.
    pub fn with_flight_interval(mut self, flight_interval: Duration) -> Self {
        self.flight_interval = flight_interval;
        self
    }

    /// max_retransmits bounds how many times a flight is resent before the
    /// handshake fails.
    pub fn with_max_retransmits(mut self, max_retransmits: usize) -> Self {
        self.max_retransmits = max_retransmits;
        self
    }

    pub fn with_verify_peer_certificate(
        mut self,
        verify_peer_certificate: Option<VerifyPeerCertificateFn>,
    ) -> Self {
        self.verify_peer_certificate = verify_peer_certificate;
        self
    }

    /// mtu is the largest datagram a flight is packed into (default is 1200 bytes)
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// replay_protection_window is the size of the replay attack protection window.
    /// Packet with sequence number older than this value compared to the latest
    /// accepted packet will be discarded. (default is 64)
    pub fn with_replay_protection_window(mut self, replay_protection_window: usize) -> Self {
        self.replay_protection_window = replay_protection_window;
        self
    }

    pub fn with_extended_master_secret(
        mut self,
        extended_master_secret: ExtendedMasterSecretType,
    ) -> Self {
        self.extended_master_secret = extended_master_secret;
        self
    }

    /// client_auth decides whether a server sends a CertificateRequest.
    /// Ignored by clients, which always answer a request with their
    /// certificate.
    pub fn with_client_auth(mut self, client_auth: ClientAuthType) -> Self {
        self.client_auth = client_auth;
        self
    }

    /// elliptic_curves are the ECDHE groups in preference order. Defaults to
    /// X25519 then P-256.
    pub fn with_elliptic_curves(mut self, elliptic_curves: Vec<NamedCurve>) -> Self {
        self.elliptic_curves = elliptic_curves;
        self
    }

    /// insecure_skip_hello_verify makes a server answer the first
    /// ClientHello directly instead of sending a HelloVerifyRequest. This
    /// gives up the protection against spoofed source addresses.
    pub fn with_insecure_skip_hello_verify(mut self, insecure_skip_hello_verify: bool) -> Self {
        self.insecure_skip_hello_verify = insecure_skip_hello_verify;
        self
    }

    pub fn build(self, is_client: bool) -> Result<HandshakeConfig> {
        let Some(local_certificate) = self.certificate else {
            return Err(Error::ErrNoCertificates);
        };

        let local_srtp_protection_profiles = if self.srtp_protection_profiles.is_empty() {
            vec![
                SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80,
                SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_32,
            ]
        } else {
            self.srtp_protection_profiles
        };

        let local_elliptic_curves = if self.elliptic_curves.is_empty() {
            vec![NamedCurve::X25519, NamedCurve::P256]
        } else {
            self.elliptic_curves
        };
        if local_elliptic_curves.contains(&NamedCurve::Unsupported) {
            return Err(Error::ErrInvalidNamedCurve);
        }

        let retransmit_interval = if self.flight_interval.is_zero() {
            INITIAL_TICKER_INTERVAL
        } else {
            self.flight_interval
        };

        Ok(HandshakeConfig {
            is_client,
            local_certificate,
            local_srtp_protection_profiles,
            local_elliptic_curves,
            verify_peer_certificate: self.verify_peer_certificate,
            extended_master_secret: self.extended_master_secret,
            client_auth: self.client_auth,
            insecure_skip_hello_verify: self.insecure_skip_hello_verify,
            retransmit_interval,
            maximum_retransmit_number: nonzero_or(self.max_retransmits, DEFAULT_MAX_RETRANSMITS),
            maximum_transmission_unit: nonzero_or(self.mtu, DEFAULT_MTU),
            replay_protection_window: nonzero_or(
                self.replay_protection_window,
                DEFAULT_REPLAY_PROTECTION_WINDOW,
            ),
        })
    }
}

fn nonzero_or(value: usize, default: usize) -> usize {
    if value == 0 { default } else { value }
}

#[derive(Clone)]
pub struct HandshakeConfig {
    pub(crate) is_client: bool,
    pub(crate) local_certificate: Certificate,
    pub(crate) local_srtp_protection_profiles: Vec<SrtpProtectionProfile>,
    pub(crate) local_elliptic_curves: Vec<NamedCurve>,
    pub(crate) verify_peer_certificate: Option<VerifyPeerCertificateFn>,
    pub(crate) extended_master_secret: ExtendedMasterSecretType,
    pub(crate) client_auth: ClientAuthType,
    pub(crate) insecure_skip_hello_verify: bool,
    pub(crate) retransmit_interval: Duration,
    pub(crate) maximum_retransmit_number: usize,
    pub(crate) maximum_transmission_unit: usize,
    pub(crate) replay_protection_window: usize,
}

impl fmt::Debug for HandshakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeConfig")
            .field("is_client", &self.is_client)
            .field(
                "local_srtp_protection_profiles",
                &self.local_srtp_protection_profiles,
            )
            .field("local_elliptic_curves", &self.local_elliptic_curves)
            .field("extended_master_secret", &self.extended_master_secret)
            .field("client_auth", &self.client_auth)
            .field("insecure_skip_hello_verify", &self.insecure_skip_hello_verify)
            .field("retransmit_interval", &self.retransmit_interval)
            .field("maximum_retransmit_number", &self.maximum_retransmit_number)
            .field("maximum_transmission_unit", &self.maximum_transmission_unit)
            .field("replay_protection_window", &self.replay_protection_window)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_config_builder_defaults() -> Result<()> {
        assert_eq!(
            ConfigBuilder::default().build(true).err(),
            Some(Error::ErrNoCertificates)
        );

        let cfg = ConfigBuilder::default()
            .with_certificate(Certificate::generate_self_signed()?)
            .build(false)?;
        assert!(!cfg.is_client);
        assert_eq!(cfg.retransmit_interval, INITIAL_TICKER_INTERVAL);
        assert_eq!(cfg.maximum_retransmit_number, DEFAULT_MAX_RETRANSMITS);
        assert_eq!(cfg.maximum_transmission_unit, DEFAULT_MTU);
        assert_eq!(cfg.replay_protection_window, DEFAULT_REPLAY_PROTECTION_WINDOW);
        assert_eq!(
            cfg.local_srtp_protection_profiles,
            vec![
                SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80,
                SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_32,
            ]
        );
        assert_eq!(
            cfg.local_elliptic_curves,
            vec![NamedCurve::X25519, NamedCurve::P256]
        );
        assert_eq!(cfg.extended_master_secret, ExtendedMasterSecretType::Request);
        assert_eq!(cfg.client_auth, ClientAuthType::NoClientCert);
        assert!(!cfg.insecure_skip_hello_verify);
        Ok(())
    }

    #[test]
    fn test_config_builder_handshake_options() -> Result<()> {
        let certificate = Certificate::generate_self_signed()?;
        let cfg = ConfigBuilder::default()
            .with_certificate(certificate.clone())
            .with_extended_master_secret(ExtendedMasterSecretType::Require)
            .with_client_auth(ClientAuthType::RequireAnyClientCert)
            .with_elliptic_curves(vec![NamedCurve::P384])
            .with_insecure_skip_hello_verify(true)
            .build(false)?;
        assert_eq!(cfg.extended_master_secret, ExtendedMasterSecretType::Require);
        assert_eq!(cfg.client_auth, ClientAuthType::RequireAnyClientCert);
        assert_eq!(cfg.local_elliptic_curves, vec![NamedCurve::P384]);
        assert!(cfg.insecure_skip_hello_verify);

        assert_eq!(
            ConfigBuilder::default()
                .with_certificate(certificate)
                .with_elliptic_curves(vec![NamedCurve::Unsupported])
                .build(true)
                .err(),
            Some(Error::ErrInvalidNamedCurve)
        );
        Ok(())
    }
}
