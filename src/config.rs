use std::path::PathBuf;

use bon::Builder;

use crate::error::{Error, Result};
use crate::store::{AcquireMode, DEFAULT_SUBJECT};

/// What a run does with its targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Sign,
    Status,
    Clear,
}

/// Options gathered by a front end (argument parser or wizard).
///
/// ```rust
/// use selfsign::config::{RunMode, SigningConfig};
///
/// let config = SigningConfig::builder()
///     .patterns(vec!["build/*.exe".to_string()])
///     .subject("Nightly Builds".to_string())
///     .build();
/// assert_eq!(config.mode, RunMode::Sign);
/// ```
#[derive(Debug, Clone, Default, Builder)]
pub struct SigningConfig {
    #[builder(default)]
    pub mode: RunMode,
    /// Files, directories or glob patterns.
    #[builder(default)]
    pub patterns: Vec<String>,
    #[builder(default)]
    pub recursive: bool,
    /// Reusable certificate name; defaults to [`DEFAULT_SUBJECT`].
    pub subject: Option<String>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    /// Use a throwaway certificate that is erased after the run.
    #[builder(default)]
    pub one_time: bool,
}

fn present(path: &Option<PathBuf>) -> Option<PathBuf> {
    path.as_ref().filter(|p| !p.as_os_str().is_empty()).cloned()
}

impl SigningConfig {
    /// Check option consistency and decide how the certificate is obtained.
    /// Runs before any file or store is touched.
    pub fn validate(&self) -> Result<AcquireMode> {
        if self.patterns.iter().all(|p| p.trim().is_empty()) {
            return Err(Error::Configuration("no files specified".to_string()));
        }

        let subject = self.subject.as_deref().filter(|s| !s.is_empty());
        match (present(&self.cert_file), present(&self.key_file)) {
            (Some(cert_file), Some(key_file)) => {
                if subject.is_some() || self.one_time {
                    return Err(Error::Configuration(
                        "a certificate file cannot be combined with a certificate name".to_string(),
                    ));
                }
                Ok(AcquireMode::External {
                    cert_file,
                    key_file,
                })
            }
            (Some(_), None) => Err(Error::Configuration(
                "--cert-file requires --key-file".to_string(),
            )),
            (None, Some(_)) => Err(Error::Configuration(
                "--key-file requires --cert-file".to_string(),
            )),
            (None, None) if self.one_time => {
                if subject.is_some() {
                    return Err(Error::Configuration(
                        "a one-time certificate cannot have a name".to_string(),
                    ));
                }
                Ok(AcquireMode::OneTime)
            }
            (None, None) => Ok(AcquireMode::Named(
                subject.unwrap_or(DEFAULT_SUBJECT).to_string(),
            )),
        }
    }
}
