//! Error types for the certificate inspection pipeline.
//!
//! Only the fatal path is modeled here: bad input and a failed leaf fetch.
//! Revocation lookups never produce a `CheckError`; their failures fold into
//! [`RevocationStatus::Unknown`](crate::revocation::RevocationStatus) so the
//! pipeline always reaches a verdict.

use std::fmt;
use std::io;

use thiserror::Error;

/// Error type for failures that abort the inspection.
#[derive(Error, Debug)]
pub enum CheckError {
    /// The target argument could not be understood as host, host:port or URL
    #[error("invalid target '{input}': {reason}")]
    InvalidTarget {
        /// The argument as given on the command line
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// TCP connection to the dial target failed
    #[error("connection failed to {address}: {source}")]
    ConnectionFailed {
        /// The address (host:port) that was dialed
        address: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TLS handshake failed
    #[error("TLS handshake failed: {details}")]
    HandshakeFailed {
        /// Details about why the handshake failed
        details: String,
    },

    /// The peer completed the handshake but the leaf could not be obtained
    #[error("certificate error: {reason}")]
    CertificateError {
        /// Description of what went wrong
        reason: String,
    },

    /// OpenSSL reported an error outside the handshake itself
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
}

impl<S: fmt::Debug> From<openssl::ssl::HandshakeError<S>> for CheckError {
    fn from(e: openssl::ssl::HandshakeError<S>) -> Self {
        Self::HandshakeFailed {
            details: e.to_string(),
        }
    }
}
