#![warn(rust_2018_idioms)]
#![allow(dead_code)]

mod cipher;
pub mod context;
pub mod crypto_params;
pub mod filter;
mod key_derivation;
pub mod option;
pub mod protection_profile;
pub mod session;
pub mod stat;

pub use crypto_params::{CryptoParams, create_crypto_params, parse_key_params};
pub use session::SrtpSession;
pub use filter::{DtlsSrtpKeys, SrtpFilter, SrtpFilterState};
pub use protection_profile::ProtectionProfile;
pub use stat::{SrtpErrorKind, SrtpEvent, SrtpMode};
