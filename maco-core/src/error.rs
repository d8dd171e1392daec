//! Crate-wide error taxonomy. Lower layers (`nfc::port`, `nfc::ntag424::protocol`)
//! have their own narrow error enums that convert into `MacoError` at the
//! boundary, the way `pn532_ext::Error` wraps `pn532::Error` in the teacher.

use alloc::string::String;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MacoError {
    /// The tag left the field (or never was present) while an operation required it.
    #[snafu(display("no tag present"))]
    NoTag,

    /// Tag is not ISO 14443-4 or not NTAG 424.
    #[snafu(display("unsupported tag"))]
    Unsupported,

    /// CMAC verification failed, cloud rejected the authentication, or the
    /// Part-3 rotation check failed.
    #[snafu(display("authentication failed"))]
    Unauthenticated,

    /// PCD-level framing/buffer error.
    #[snafu(display("reader desync"))]
    Desync,

    /// API call made in a state that does not permit it.
    #[snafu(display("wrong state"))]
    WrongState,

    /// An internal invariant was violated.
    #[snafu(display("unexpected state: {message}"))]
    UnexpectedState { message: String },

    /// An explicit bounded wait exhausted.
    #[snafu(display("timed out"))]
    Timeout,

    /// Transport or server-side failure.
    #[snafu(display("cloud error: {message}"))]
    CloudError { message: String },

    /// Cloud or tag returned syntactically invalid data.
    #[snafu(display("malformed response"))]
    MalformedResponse,

    /// A second call of a single-flight RPC was made before the first
    /// resolved (spec §4.7 concurrency contract).
    #[snafu(display("request already in flight"))]
    Unavailable,

    /// Filesystem / lower-level failure with no more specific kind.
    #[snafu(display("unspecified: {message}"))]
    Unspecified { message: String },
}

pub type Result<T> = core::result::Result<T, MacoError>;
