#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod alert;
pub mod cipher_suite;
pub mod config;
pub mod conn;
pub mod content;
pub mod crypto;
pub mod curve;
pub mod extension;
mod flight;
mod fragment_buffer;
pub mod handshake;
mod handshaker;
mod prf;
pub mod record_layer;
pub mod signature_hash_algorithm;
pub mod state;

pub use config::{
    ClientAuthType, ConfigBuilder, ExtendedMasterSecretType, HandshakeConfig,
    VerifyPeerCertificateFn,
};
pub use conn::{DTLSConn, DtlsEvent};
pub use crypto::{Certificate, fingerprint};
pub use curve::NamedCurve;
pub use extension::extension_use_srtp::SrtpProtectionProfile;
