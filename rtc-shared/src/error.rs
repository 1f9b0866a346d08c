#![allow(dead_code)]

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("buffer: too short")]
    ErrBufferTooShort,
    #[error("packet too short")]
    ErrPacketTooShort,
    #[error("packet too big")]
    ErrPacketTooBig,
    #[error("invalid rtp header")]
    ErrInvalidRtpHeader,

    // message queue / thread
    #[error("thread already started")]
    ErrThreadAlreadyStarted,
    #[error("message queue stopped")]
    ErrQueueStopped,

    // srtp
    #[error("srtp: unsupported cipher suite {0}")]
    ErrUnsupportedCipherSuite(String),
    #[error("srtp: master key must be len {0}, got {1}")]
    ErrShortSrtpMasterKey(usize, usize),
    #[error("srtp: master salt must be len {0}, got {1}")]
    ErrShortSrtpMasterSalt(usize, usize),
    #[error("srtp: invalid key params {0}")]
    ErrInvalidKeyParams(String),
    #[error("index_over_kdr > 0 is not supported yet")]
    ErrUnsupportedIndexOverKdr,
    #[error("srtp: packet is too short to be rtp packet")]
    ErrTooShortRtp,
    #[error("srtp: packet is too short to be rtcp packet")]
    ErrTooShortRtcp,
    #[error("srtp: failed to verify auth tag")]
    ErrFailedToVerifyAuthTag,
    #[error("srtp ssrc={0} index={1}: duplicated")]
    ErrSrtpSsrcDuplicated(u32, u16),
    #[error("srtcp ssrc={0} index={1}: duplicated")]
    ErrSrtcpSsrcDuplicated(u32, usize),
    #[error("srtp: exceeded the maximum number of packets")]
    ErrExceededMaxPackets,
    #[error("srtp: filter is not active")]
    ErrSrtpNotActive,
    #[error("srtp: filter is already active")]
    ErrSrtpAlreadyActive,
    #[error("srtp: offer not expected in current state")]
    ErrSrtpUnexpectedOffer,
    #[error("srtp: answer not expected in current state")]
    ErrSrtpUnexpectedAnswer,
    #[error("srtp: expected exactly one crypto answer, got {0}")]
    ErrSrtpInvalidAnswer(usize),
    #[error("srtp: no matching crypto params in offer")]
    ErrSrtpNoMatchingCrypto,

    // rtcp mux
    #[error("rtcp mux: offer not expected in current state")]
    ErrRtcpMuxUnexpectedOffer,
    #[error("rtcp mux: answer not expected in current state")]
    ErrRtcpMuxUnexpectedAnswer,
    #[error("rtcp mux: answer enables rtcp mux that was not offered")]
    ErrRtcpMuxNotOffered,

    // dtls
    #[error("dtls: invalid content type")]
    ErrInvalidContentType,
    #[error("dtls: unsupported protocol version")]
    ErrUnsupportedProtocolVersion,
    #[error("dtls: invalid handshake type")]
    ErrInvalidHandshakeType,
    #[error("dtls: handshake message unexpected in current state")]
    ErrHandshakeMessageUnexpected,
    #[error("dtls: length mismatch")]
    ErrLengthMismatch,
    #[error("dtls: handshake timeout")]
    ErrHandshakeTimeout,
    #[error("dtls: handshake is in progress")]
    ErrHandshakeInProgress,
    #[error("dtls: conn is closed")]
    ErrConnClosed,
    #[error("dtls: invalid certificate")]
    ErrInvalidCertificate,
    #[error("dtls: key signature verification failed")]
    ErrKeySignatureVerifyFailed,
    #[error("dtls: expected and actual verify data does not match")]
    ErrVerifyDataMismatch,
    #[error("dtls: failed to decrypt record")]
    ErrDecryptFailed,
    #[error("dtls: no srtp protection profile negotiated")]
    ErrNoSrtpProtectionProfile,
    #[error("dtls: no certificate fingerprint matches")]
    ErrNoMatchingCertificateFingerprint,
    #[error("dtls: unsupported fingerprint algorithm {0}")]
    ErrInvalidFingerprintAlgorithm(String),
    #[error("dtls: context is not supported for export_keying_material")]
    ErrContextUnsupported,
    #[error("dtls: export_keying_material can not be used with a reserved label")]
    ErrReservedExportKeyingMaterial,
    #[error("dtls: alert received")]
    ErrAlertReceived,
    #[error("dtls: no certificates configured")]
    ErrNoCertificates,
    #[error("dtls: sequence number overflow")]
    ErrSequenceNumberOverflow,
    #[error("dtls: application data with epoch of 0")]
    ErrApplicationDataEpochZero,
    #[error("dtls: handshake message is incomplete")]
    ErrFragmentedHandshake,
    #[error("dtls: fragment buffer overflow, new size {new_size} exceeds {max_size}")]
    ErrFragmentBufferOverflow { new_size: usize, max_size: usize },
    #[error("dtls: client+server cookie does not match")]
    ErrCookieMismatch,
    #[error("dtls: client+server do not support any shared cipher suites")]
    ErrCipherSuiteNoIntersection,
    #[error("dtls: invalid or unknown compression method")]
    ErrInvalidCompressionMethod,
    #[error("dtls: client requested zero or more elliptic curves that are not supported by the server")]
    ErrNoSupportedEllipticCurves,
    #[error("dtls: invalid named curve")]
    ErrInvalidNamedCurve,
    #[error("dtls: connection can not be created, no signature schemes satisfy this config")]
    ErrNoAvailableSignatureSchemes,
    #[error("dtls: client required extended master secret extension, but server does not support it")]
    ErrClientRequiredButNoServerEms,
    #[error("dtls: server requires the extended master secret extension, but the client does not support it")]
    ErrServerRequiredButNoClientEms,
    #[error("dtls: server required client verification, but got none")]
    ErrClientCertificateRequired,
    #[error("dtls: client sent certificate verify but we have no certificate to verify")]
    ErrCertificateVerifyNoCertificate,
    #[error("dtls: buffer is too small")]
    ErrBufferTooSmall,
    #[error("dtls: cookie must not be longer then 255 bytes")]
    ErrCookieTooLong,
    #[error("dtls: invalid or unknown elliptic curve type")]
    ErrInvalidEllipticCurveType,

    // transport
    #[error("transport channel is not writable")]
    ErrTransportNotWritable,
    #[error("transport channel has no peer")]
    ErrTransportNoPeer,
    #[error("transport channel: dtls is not active")]
    ErrDtlsNotActive,
    #[error("transport channel: invalid dtls state for this operation")]
    ErrInvalidDtlsState,
    #[error("transport channel: socket option not supported")]
    ErrUnsupportedSocketOption,
    #[error("no transport channel for content {0}")]
    ErrNoTransportChannel(String),

    // channel / session
    #[error("channel: unsupported for media kind")]
    ErrUnsupportedMediaKind,
    #[error("channel: worker thread is gone")]
    ErrWorkerThreadGone,
    #[error("channel: failed to set {0} content")]
    ErrSetContentFailed(String),
    #[error("channel: destroyed")]
    ErrChannelDestroyed,
    #[error("media channel: ssrc {0} already in use")]
    ErrSsrcAlreadyExists(u32),
    #[error("media channel: ssrc {0} not found")]
    ErrSsrcNotFound(u32),
    #[error("media channel: operation failed")]
    ErrMediaChannelFailed,

    #[error("{0}")]
    Io(#[source] IoError),
    #[error("mutex poison: {0}")]
    PoisonError(String),
    #[error("{0}")]
    Std(#[source] StdError),
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn from_std<T>(error: T) -> Self
    where
        T: std::error::Error + Send + Sync + 'static,
    {
        Error::Std(StdError(Box::new(error)))
    }

    pub fn downcast_ref<T: std::error::Error + 'static>(&self) -> Option<&T> {
        if let Error::Std(s) = self {
            return s.0.downcast_ref();
        }

        None
    }
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}

/// An escape hatch to preserve stack traces when we don't know the error.
///
/// Crates further up the stack produce errors from foreign libraries (ring,
/// x509 parsing, aead). `Error::from_std` keeps the original error around
/// instead of flattening it into a string.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StdError(pub Box<dyn std::error::Error + Send + Sync>);

impl PartialEq for StdError {
    fn eq(&self, _: &Self) -> bool {
        false
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::PoisonError(e.to_string())
    }
}
