//! use selfsign::error::Error;

use std::path::PathBuf;

use thiserror::Error;

/// Represents errors that can occur while acquiring a certificate, signing,
/// installing or erasing key material.
///
/// The first five variants form the taxonomy surfaced to callers. Only
/// [`Error::CertAcquisitionFailed`] and [`Error::Configuration`] abort a run;
/// the others are accumulated into a
/// [`SigningOutcome`](crate::orchestrator::SigningOutcome) as warnings.
#[derive(Debug, Error)]
pub enum Error {
    /// No usable certificate could be obtained. Fatal to the run.
    #[error("Failed to obtain signing certificate: {0}")]
    CertAcquisitionFailed(String),

    /// A single target could not be signed.
    #[error("Failed to sign {}: {reason}", path.display())]
    SigningFailed { path: PathBuf, reason: String },

    /// The certificate could not be placed in any trust store.
    #[error("Failed to install certificate to trust store: {0}")]
    InstallFailed(String),

    /// A key artifact could not be destroyed.
    #[error("Failed to erase {}: {reason}", path.display())]
    EraseFailed { path: PathBuf, reason: String },

    /// Inconsistent caller input, rejected before any work begins.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// Error related to certificate operations.
    #[error("Certificate error: {0}")]
    CertificateError(String),

    /// Error from RSA operations.
    #[error("RSA error: {0}")]
    RsaError(String),

    /// Error from RSA PKCS1 operations.
    #[error("RSA PKCS1 error: {0}")]
    RsaPkcs1Error(String),

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The background signing task panicked or was aborted.
    #[error("Background task error: {0}")]
    BackgroundTask(String),
}

impl Error {
    /// Whether this error stops a run instead of being recorded as a warning.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::CertAcquisitionFailed(_) | Error::Configuration(_) | Error::BackgroundTask(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<der::Error> for Error {
    /// Converts a `der::Error` into an `Error`.
    fn from(err: der::Error) -> Self {
        Error::DecodingError(err.to_string())
    }
}

impl From<rsa::Error> for Error {
    fn from(err: rsa::Error) -> Self {
        Error::RsaError(err.to_string())
    }
}

impl From<rsa::pkcs1::Error> for Error {
    fn from(err: rsa::pkcs1::Error) -> Self {
        Error::RsaPkcs1Error(err.to_string())
    }
}

impl From<pkcs8::Error> for Error {
    fn from(err: pkcs8::Error) -> Self {
        Error::DecodingError(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for Error {
    fn from(err: pkcs8::spki::Error) -> Self {
        Error::EncodingError(err.to_string())
    }
}

impl From<pem::PemError> for Error {
    fn from(err: pem::PemError) -> Self {
        Error::DecodingError(err.to_string())
    }
}
