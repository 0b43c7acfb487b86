//! Destruction of ephemeral key material, in memory and on disk.

use std::fmt;
use std::fs;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rand::RngCore;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::key::KeyPair;
use crate::store::{ONE_TIME_PREFIX, is_ephemeral_subject};

/// Number of random overwrite passes per file.
pub const ERASE_PASSES: usize = 3;

const CHUNK_SIZE: usize = 64 * 1024;

/// A problem encountered while erasing; never aborts the remaining work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EraseWarning {
    /// The file concerned, or `None` for a failure affecting the whole
    /// directory scan.
    pub path: Option<PathBuf>,
    pub reason: String,
}

impl fmt::Display for EraseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}", path.display(), self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EraseReport {
    pub key_zeroized: bool,
    pub erased_files: Vec<PathBuf>,
    pub warnings: Vec<EraseWarning>,
}

impl EraseReport {
    pub fn is_clean(&self) -> bool {
        self.key_zeroized && self.warnings.is_empty()
    }
}

/// Overwrites and unlinks key artifacts in one store directory.
#[derive(Debug, Clone)]
pub struct SecureEraser {
    directory: PathBuf,
    passes: usize,
}

impl SecureEraser {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            passes: ERASE_PASSES,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Zeroize `key`, then overwrite and remove every
    /// `<prefix>-*.key` / `<prefix>-*.crt` file in the store directory.
    ///
    /// `prefix` must be the one-time prefix or a one-time subject derived
    /// from it; anything else is refused so reusable identities survive.
    pub fn erase(&self, key: &mut KeyPair, prefix: &str) -> EraseReport {
        let mut report = EraseReport::default();

        key.zeroize();
        report.key_zeroized = key.private_components().all(|c| c.iter().all(|b| *b == 0));
        if !report.key_zeroized {
            report.warnings.push(EraseWarning {
                path: None,
                reason: "private key components were not cleared".to_string(),
            });
        }

        if prefix != ONE_TIME_PREFIX && !is_ephemeral_subject(prefix) {
            warn!(prefix, "refusing to erase files for a non-ephemeral prefix");
            report.warnings.push(EraseWarning {
                path: None,
                reason: format!("refusing to erase files for non-ephemeral prefix '{prefix}'"),
            });
            return report;
        }

        let pattern = match artifact_pattern(prefix) {
            Ok(pattern) => pattern,
            Err(e) => {
                report.warnings.push(EraseWarning {
                    path: None,
                    reason: e.to_string(),
                });
                return report;
            }
        };

        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
            Err(e) => {
                report.warnings.push(EraseWarning {
                    path: Some(self.directory.clone()),
                    reason: format!("cannot list certificate directory: {e}"),
                });
                return report;
            }
        };

        let mut matches: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| pattern.is_match(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path())
            .collect();
        matches.sort();

        for path in matches {
            match self.erase_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "erased key artifact");
                    report.erased_files.push(path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to erase key artifact");
                    report.warnings.push(EraseWarning {
                        path: Some(path),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            files = report.erased_files.len(),
            warnings = report.warnings.len(),
            "key material erased"
        );
        report
    }

    /// Overwrite `path` with random bytes `passes` times, syncing after each
    /// pass, then unlink it. A file that is already gone counts as erased.
    pub fn erase_file(&self, path: &Path) -> io::Result<()> {
        let mut file = match fs::OpenOptions::new().write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let len = file.metadata()?.len();
        let mut rng = rand::rng();
        let mut buf = vec![0u8; CHUNK_SIZE];

        for _ in 0..self.passes {
            file.seek(SeekFrom::Start(0))?;
            let mut remaining = len;
            while remaining > 0 {
                let n = remaining.min(CHUNK_SIZE as u64) as usize;
                rng.fill_bytes(&mut buf[..n]);
                file.write_all(&buf[..n])?;
                remaining -= n as u64;
            }
            file.flush()?;
            file.sync_all()?;
        }
        drop(file);

        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

fn artifact_pattern(prefix: &str) -> Result<Regex, regex::Error> {
    let stem = if prefix == ONE_TIME_PREFIX {
        format!("{}-.*", regex::escape(prefix))
    } else {
        regex::escape(prefix)
    };
    Regex::new(&format!(r"^{stem}\.(key|crt)$"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::DEFAULT_KEY_BITS;

    #[test]
    fn pattern_is_not_widened() {
        let all = artifact_pattern(ONE_TIME_PREFIX).unwrap();
        assert!(all.is_match("LocalSign-OneTime-a8Zk31Qp.key"));
        assert!(all.is_match("LocalSign-OneTime-a8Zk31Qp.crt"));
        assert!(!all.is_match("LocalSign-SelfSigned.key"));
        assert!(!all.is_match("LocalSign-OneTime-a8Zk31Qp.key.bak"));
        assert!(!all.is_match("xLocalSign-OneTime-a8Zk31Qp.key"));
        assert!(!all.is_match("LocalSign-OneTimeX.key"));
        assert!(all.is_match("LocalSign-OneTime-.key"));
        assert!(all.is_match("LocalSign-OneTime-crashed run.crt"));

        let one = artifact_pattern("LocalSign-OneTime-abc").unwrap();
        assert!(one.is_match("LocalSign-OneTime-abc.key"));
        assert!(!one.is_match("LocalSign-OneTime-abcd.key"));
    }

    #[test]
    fn erases_only_ephemeral_files() {
        let dir = tempfile::tempdir().unwrap();
        let ephemeral = ["LocalSign-OneTime-AAAA1111.key", "LocalSign-OneTime-AAAA1111.crt"];
        let kept = ["LocalSign-SelfSigned.key", "LocalSign-SelfSigned.crt", "notes.txt"];
        for name in ephemeral.iter().chain(kept.iter()) {
            fs::write(dir.path().join(name), b"secret material").unwrap();
        }

        let mut key = KeyPair::generate_rsa(DEFAULT_KEY_BITS).unwrap();
        let report = SecureEraser::new(dir.path()).erase(&mut key, ONE_TIME_PREFIX);

        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.erased_files.len(), 2);
        for name in ephemeral {
            assert!(!dir.path().join(name).exists());
        }
        for name in kept {
            assert!(dir.path().join(name).exists());
        }
        assert!(key.is_erased());
        assert!(key.private_components().all(|c| !c.is_empty() && c.iter().all(|b| *b == 0)));
    }

    #[test]
    fn one_failed_file_does_not_stop_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("LocalSign-OneTime-AAAA1111.key");
        fs::create_dir(&blocked).unwrap();
        let sibling = dir.path().join("LocalSign-OneTime-BBBB2222.key");
        fs::write(&sibling, b"secret material").unwrap();

        let mut key = KeyPair::generate_rsa(DEFAULT_KEY_BITS).unwrap();
        let report = SecureEraser::new(dir.path()).erase(&mut key, ONE_TIME_PREFIX);

        assert!(!report.is_clean());
        assert!(report.key_zeroized);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].path.as_deref(), Some(blocked.as_path()));
        assert_eq!(report.erased_files, vec![sibling.clone()]);
        assert!(!sibling.exists());
        assert!(blocked.is_dir());
    }

    #[test]
    fn refuses_reusable_prefix_but_still_zeroizes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("LocalSign-SelfSigned.key"), b"k").unwrap();

        let mut key = KeyPair::generate_rsa(DEFAULT_KEY_BITS).unwrap();
        let report = SecureEraser::new(dir.path()).erase(&mut key, "LocalSign-SelfSigned");

        assert!(report.key_zeroized);
        assert_eq!(report.warnings.len(), 1);
        assert!(dir.path().join("LocalSign-SelfSigned.key").exists());
    }

    #[test]
    fn missing_directory_and_file_are_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let eraser = SecureEraser::new(dir.path().join("gone"));
        eraser.erase_file(&dir.path().join("gone.key")).unwrap();

        let mut key = KeyPair::generate_rsa(DEFAULT_KEY_BITS).unwrap();
        assert!(eraser.erase(&mut key, ONE_TIME_PREFIX).is_clean());
    }
}
