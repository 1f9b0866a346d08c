#[cfg(test)]
mod crypto_test;

use std::sync::Arc;

use ring::rand::SystemRandom;
use ring::signature::{
    ECDSA_P256_SHA256_ASN1, ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, UnparsedPublicKey,
};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use shared::error::{Error, Result};
use shared::util::math_rand_alpha;

use crate::curve::NamedCurve;

/// ECCurveType named_curve, the only curve type used in ServerKeyExchange.
pub(crate) const ELLIPTIC_CURVE_TYPE_NAMED_CURVE: u8 = 0x03;

/// A self-signed ECDSA P-256 certificate and its signing key.
#[derive(Clone)]
pub struct Certificate {
    pub certificate: Vec<u8>,
    private_key: Arc<EcdsaKeyPair>,
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("certificate", &self.certificate.len())
            .finish()
    }
}

impl Certificate {
    /// Generates a fresh key pair and a self-signed certificate for it with
    /// a random common name.
    pub fn generate_self_signed() -> Result<Self> {
        let key_pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)
            .map_err(|e| Error::Other(e.to_string()))?;
        let params = rcgen::CertificateParams::new(vec![math_rand_alpha(16)])
            .map_err(|e| Error::Other(e.to_string()))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::Other(e.to_string()))?;

        Certificate::from_der(cert.der().to_vec(), &key_pair.serialize_der())
    }

    /// Builds a certificate from its DER encoding and a PKCS#8 ECDSA P-256 key.
    pub fn from_der(certificate: Vec<u8>, pkcs8: &[u8]) -> Result<Self> {
        let private_key =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8, &SystemRandom::new())
                .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Certificate {
            certificate,
            private_key: Arc::new(private_key),
        })
    }

    pub fn fingerprint(&self, algorithm: &str) -> Result<String> {
        fingerprint(&self.certificate, algorithm)
    }

    pub(crate) fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature = self
            .private_key
            .sign(&SystemRandom::new(), message)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(signature.as_ref().to_vec())
    }
}

/// Digest of a DER certificate as lowercase hex octets joined by ':'.
pub fn fingerprint(certificate: &[u8], algorithm: &str) -> Result<String> {
    let hashed = match algorithm {
        "sha-256" => Sha256::digest(certificate).to_vec(),
        "sha-1" => Sha1::digest(certificate).to_vec(),
        _ => return Err(Error::ErrInvalidFingerprintAlgorithm(algorithm.to_owned())),
    };
    let values: Vec<String> = hashed.iter().map(|x| format!("{x:02x}")).collect();
    Ok(values.join(":"))
}

/// The ServerKeyExchange parameters covered by the server's signature:
/// both randoms followed by the ECParameters and the public point.
pub(crate) fn value_key_message(
    client_random: &[u8],
    server_random: &[u8],
    public_key: &[u8],
    named_curve: NamedCurve,
) -> Vec<u8> {
    let mut plaintext = Vec::with_capacity(68 + public_key.len());
    plaintext.extend_from_slice(client_random);
    plaintext.extend_from_slice(server_random);
    plaintext.push(ELLIPTIC_CURVE_TYPE_NAMED_CURVE);
    plaintext.extend_from_slice(&(named_curve as u16).to_be_bytes());
    plaintext.push(public_key.len() as u8);
    plaintext.extend_from_slice(public_key);
    plaintext
}

/// Checks an ASN.1 ECDSA P-256 signature against the key of `certificate`.
pub(crate) fn verify_signature(message: &[u8], signature: &[u8], certificate: &[u8]) -> Result<()> {
    let (_, cert) =
        x509_parser::parse_x509_certificate(certificate).map_err(|_| Error::ErrInvalidCertificate)?;
    let public_key = cert
        .tbs_certificate
        .subject_pki
        .subject_public_key
        .data
        .to_vec();

    UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, public_key)
        .verify(message, signature)
        .map_err(|_| Error::ErrKeySignatureVerifyFailed)
}
