//! Expansion of command-line file arguments into a target list.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Extensions of files picked up when a directory is given.
pub const EXECUTABLE_EXTENSIONS: &[&str] = &["exe", "dll", "msi", "sys", "com", "ocx", "scr", "cpl"];

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn has_executable_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            EXECUTABLE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Resolve each pattern to files, in argument order, without duplicates.
///
/// * a directory yields its executables (recursively if `recursive`);
/// * a glob yields the regular files it matches;
/// * anything else is taken literally, even if it does not exist, so that
///   signing reports it as not found.
pub fn resolve_targets<S: AsRef<str>>(patterns: &[S], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    let mut push = |path: PathBuf| {
        if seen.insert(path.clone()) {
            targets.push(path);
        }
    };

    for pattern in patterns {
        let pattern = pattern.as_ref();
        if pattern.is_empty() {
            continue;
        }
        let path = Path::new(pattern);

        if path.is_dir() {
            let walker = WalkDir::new(path)
                .min_depth(1)
                .max_depth(if recursive { usize::MAX } else { 1 })
                .sort_by_file_name();
            for entry in walker {
                match entry {
                    Ok(entry) if entry.file_type().is_file() && has_executable_extension(entry.path()) => {
                        push(entry.into_path());
                    }
                    Ok(_) => {}
                    Err(e) => warn!(dir = %path.display(), error = %e, "skipping unreadable entry"),
                }
            }
        } else if is_glob(pattern) {
            let paths = glob::glob(pattern)
                .map_err(|e| Error::Configuration(format!("invalid pattern '{pattern}': {e}")))?;
            let mut matched = 0usize;
            for entry in paths {
                match entry {
                    Ok(p) if p.is_file() => {
                        matched += 1;
                        push(p);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(pattern, error = %e, "skipping unreadable match"),
                }
            }
            if matched == 0 {
                warn!(pattern, "no files match pattern");
            }
        } else {
            if !path.exists() {
                warn!(path = %path.display(), "file not found");
            }
            push(path.to_path_buf());
        }
    }

    debug!(count = targets.len(), "resolved targets");
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"MZ").unwrap();
    }

    #[test]
    fn directory_yields_executables() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.exe"));
        touch(&dir.path().join("b.DLL"));
        touch(&dir.path().join("readme.txt"));
        touch(&dir.path().join("sub").join("c.exe"));
        let arg = dir.path().to_string_lossy().to_string();

        let flat = resolve_targets(&[arg.as_str()], false).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.exe"), dir.path().join("b.DLL")]);

        let deep = resolve_targets(&[arg.as_str()], true).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&dir.path().join("sub").join("c.exe")));
    }

    #[test]
    fn globs_and_literals_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("one.bin"));
        touch(&dir.path().join("two.bin"));
        let glob = dir.path().join("*.bin").to_string_lossy().to_string();
        let literal = dir.path().join("one.bin").to_string_lossy().to_string();
        let missing = dir.path().join("missing.exe").to_string_lossy().to_string();

        let targets = resolve_targets(&[literal.clone(), glob, missing.clone()], false).unwrap();
        assert_eq!(
            targets,
            vec![
                PathBuf::from(&literal),
                dir.path().join("two.bin"),
                PathBuf::from(&missing),
            ]
        );
    }

    #[test]
    fn invalid_glob_is_a_configuration_error() {
        let err = resolve_targets(&["bad[pattern"], false).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
