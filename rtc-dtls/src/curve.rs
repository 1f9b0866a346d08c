use std::fmt;

use ring::agreement::{self, EphemeralPrivateKey, UnparsedPublicKey};
use ring::rand::SystemRandom;

use shared::error::{Error, Result};

/// Named groups for ECDHE key agreement.
/// https://www.iana.org/assignments/tls-parameters/tls-parameters.xml#tls-parameters-8
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NamedCurve {
    P256 = 0x0017,
    P384 = 0x0018,
    X25519 = 0x001d,
    Unsupported,
}

impl From<u16> for NamedCurve {
    fn from(val: u16) -> Self {
        match val {
            0x0017 => NamedCurve::P256,
            0x0018 => NamedCurve::P384,
            0x001d => NamedCurve::X25519,
            _ => NamedCurve::Unsupported,
        }
    }
}

impl fmt::Display for NamedCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            NamedCurve::P256 => "P-256",
            NamedCurve::P384 => "P-384",
            NamedCurve::X25519 => "X25519",
            NamedCurve::Unsupported => "Unsupported",
        };
        write!(f, "{s}")
    }
}

impl NamedCurve {
    fn algorithm(&self) -> Option<&'static agreement::Algorithm> {
        match *self {
            NamedCurve::P256 => Some(&agreement::ECDH_P256),
            NamedCurve::P384 => Some(&agreement::ECDH_P384),
            NamedCurve::X25519 => Some(&agreement::X25519),
            NamedCurve::Unsupported => None,
        }
    }

    pub(crate) fn generate_keypair(&self) -> Result<NamedCurveKeypair> {
        let algorithm = self.algorithm().ok_or(Error::ErrInvalidNamedCurve)?;
        let private_key = EphemeralPrivateKey::generate(algorithm, &SystemRandom::new())
            .map_err(|e| Error::Other(e.to_string()))?;
        let public_key = private_key
            .compute_public_key()
            .map_err(|e| Error::Other(e.to_string()))?
            .as_ref()
            .to_vec();

        Ok(NamedCurveKeypair {
            curve: *self,
            public_key,
            private_key,
        })
    }
}

/// An ephemeral ECDHE key. P-256 and P-384 public keys are uncompressed
/// points, X25519 keys are 32 raw bytes.
pub(crate) struct NamedCurveKeypair {
    pub(crate) curve: NamedCurve,
    pub(crate) public_key: Vec<u8>,
    private_key: EphemeralPrivateKey,
}

impl fmt::Debug for NamedCurveKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedCurveKeypair")
            .field("curve", &self.curve)
            .finish()
    }
}

impl NamedCurveKeypair {
    /// Consumes the private key and returns the pre-master secret shared
    /// with the owner of `remote_public_key`.
    pub(crate) fn agree(self, remote_public_key: &[u8]) -> Result<Vec<u8>> {
        let algorithm = self.curve.algorithm().ok_or(Error::ErrInvalidNamedCurve)?;
        agreement::agree_ephemeral(
            self.private_key,
            &UnparsedPublicKey::new(algorithm, remote_public_key),
            |key_material| key_material.to_vec(),
        )
        .map_err(|_| Error::ErrInvalidNamedCurve)
    }
}
