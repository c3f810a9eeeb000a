//! Filesystem scan for plaintext secret residue.

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{AuditError, Result};
use crate::patterns::PatternSet;
use crate::report::{AuditReport, Violation};

/// Bytes inspected for a NUL when deciding whether a file is binary.
const BINARY_SNIFF_BYTES: usize = 8 * 1024;

/// Walks roots and applies a [`PatternSet`] to names and contents.
pub struct Scanner {
    patterns: PatternSet,
    exclude_dirs: BTreeSet<String>,
    excluded_files: Vec<PathBuf>,
    max_file_bytes: u64,
}

impl Scanner {
    pub fn new(patterns: PatternSet) -> Self {
        Self {
            patterns,
            exclude_dirs: BTreeSet::new(),
            excluded_files: Vec::new(),
            max_file_bytes: 1024 * 1024,
        }
    }

    /// Directory names never descended into.
    pub fn with_exclude_dirs(mut self, dirs: impl IntoIterator<Item = String>) -> Self {
        self.exclude_dirs.extend(dirs);
        self
    }

    /// Files skipped entirely (the envelope and salt artifacts).
    pub fn with_excluded_file(mut self, path: &Path) -> Self {
        self.excluded_files
            .push(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()));
        self
    }

    pub fn with_max_file_bytes(mut self, max: u64) -> Self {
        self.max_file_bytes = max;
        self
    }

    /// Scan every root. Symlinks are not followed; unreadable entries are
    /// logged and skipped.
    pub fn scan(&self, roots: &[PathBuf]) -> Result<AuditReport> {
        let mut report = AuditReport::default();

        for root in roots {
            if !root.exists() {
                return Err(AuditError::RootNotFound(root.clone()));
            }
            debug!(root = %root.display(), "scanning");

            let walker = WalkDir::new(root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| !self.is_excluded_dir(e));

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(error = %e, "skipping unreadable entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() || self.is_excluded_file(entry.path()) {
                    continue;
                }
                self.scan_file(&entry, &mut report);
            }
        }

        report.normalize();
        Ok(report)
    }

    fn is_excluded_dir(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && self
                .exclude_dirs
                .contains(entry.file_name().to_string_lossy().as_ref())
    }

    fn is_excluded_file(&self, path: &Path) -> bool {
        if self.excluded_files.is_empty() {
            return false;
        }
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.excluded_files.contains(&canonical)
    }

    fn scan_file(&self, entry: &DirEntry, report: &mut AuditReport) {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();

        if let Some(pattern) = self.patterns.match_filename(&file_name) {
            report.violations.push(Violation::PlaintextFile {
                path: path.to_path_buf(),
                pattern: pattern.to_string(),
            });
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot stat file");
                return;
            }
        };
        if size > self.max_file_bytes {
            trace!(path = %path.display(), size, "skipping large file");
            return;
        }

        let contents = match read_text(path) {
            Ok(Some(text)) => text,
            Ok(None) => {
                trace!(path = %path.display(), "skipping binary file");
                return;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read file");
                return;
            }
        };

        report.files_scanned += 1;
        for finding in self.patterns.scan_text(&contents) {
            report.violations.push(Violation::SecretAssignment {
                path: path.to_path_buf(),
                line: finding.line,
                name: finding.name,
            });
        }
    }
}

/// File contents as text, or `None` for binary files.
fn read_text(path: &Path) -> std::io::Result<Option<zeroize::Zeroizing<String>>> {
    let mut bytes = Vec::new();
    fs::File::open(path)?.read_to_end(&mut bytes)?;
    let bytes = zeroize::Zeroizing::new(bytes);
    let head = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
    if head.contains(&0) {
        return Ok(None);
    }
    Ok(Some(zeroize::Zeroizing::new(
        String::from_utf8_lossy(&bytes).into_owned(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scanner() -> Scanner {
        Scanner::new(PatternSet::new(&[], &[]).unwrap())
            .with_exclude_dirs([".git".to_string(), "node_modules".to_string()])
    }

    fn write(dir: &Path, rel: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_clean_tree() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/main.rs", b"fn main() {}\n");
        write(dir.path(), ".env.example", b"DB_PASSWORD=<set me>\n");

        let report = scanner().scan(&[dir.path().to_path_buf()]).unwrap();
        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.files_scanned, 2);
    }

    #[test]
    fn test_plaintext_residue_found_in_order() {
        let dir = TempDir::new().unwrap();
        let dotenv = write(dir.path(), ".env", b"DB_PASSWORD=abc123\nLOG_LEVEL=info\n");
        let config = write(dir.path(), "app/config.yaml", b"db:\n  password: hunter2\n");

        let report = scanner().scan(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(
            report.violations,
            vec![
                Violation::PlaintextFile {
                    path: dotenv.clone(),
                    pattern: "dotenv".into(),
                },
                Violation::SecretAssignment {
                    path: dotenv,
                    line: 1,
                    name: "DB_PASSWORD".into(),
                },
                Violation::SecretAssignment {
                    path: config,
                    line: 2,
                    name: "password".into(),
                },
            ]
        );
    }

    #[test]
    fn test_excluded_dirs_and_artifacts() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".git/config", b"token=abcdef\n");
        write(dir.path(), "node_modules/pkg/.env", b"API_KEY=x1\n");
        let envelope = write(dir.path(), "deploy.env", b"00:AA\n");

        let report = scanner()
            .with_excluded_file(&envelope)
            .scan(&[dir.path().to_path_buf()])
            .unwrap();
        assert!(report.is_clean(), "{:?}", report.violations);
    }

    #[test]
    fn test_binary_and_large_files_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "blob.bin", b"\0\0DB_PASSWORD=abc123\n");
        write(dir.path(), "big.txt", format!("API_KEY=xyz789\n{}", "a".repeat(64)).as_bytes());

        let report = scanner()
            .with_max_file_bytes(32)
            .scan(&[dir.path().to_path_buf()])
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.files_scanned, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_not_followed() {
        let outside = TempDir::new().unwrap();
        write(outside.path(), "leak.txt", b"DB_PASSWORD=abc123\n");
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("leak.txt"), dir.path().join("leak.txt"))
            .unwrap();

        let report = scanner().scan(&[dir.path().to_path_buf()]).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            scanner().scan(&[dir.path().join("nope")]),
            Err(AuditError::RootNotFound(_))
        ));
    }

    #[test]
    fn test_scan_is_repeatable() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b/.env.local", b"JWT_SECRET=k\n");
        write(dir.path(), "a/secrets.json", b"{\"api_key\": \"v\"}\n");

        let s = scanner();
        let roots = [dir.path().to_path_buf()];
        assert_eq!(s.scan(&roots).unwrap(), s.scan(&roots).unwrap());
    }
}
