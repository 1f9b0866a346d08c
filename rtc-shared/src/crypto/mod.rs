use crate::error::Result;

/// KeyingMaterialExporter extracts keying material from an established
/// secure association (RFC 5705).
///
/// Channels use it to derive SRTP keys from a finished DTLS handshake
/// without the srtp crate depending on the dtls crate.
pub trait KeyingMaterialExporter {
    fn export_keying_material(&self, label: &str, context: &[u8], length: usize)
    -> Result<Vec<u8>>;
}
