//! Encrypted file-name to digest manifest.
//!
//! On disk the manifest is a text file with one line per tracked file. Each
//! line is independently encrypted under the server's [`FileKey`] and
//! decrypts to `fileName:base64Digest`. Rewrites go through a temp file and
//! an atomic rename, so a crash leaves either the old or the new manifest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info};

use cellar_core::fs::write_atomic;
use cellar_crypto::{decrypt_line, encrypt_line, keyed_digest, FileKey};

use crate::error::{IntegrityError, IntegrityResult};

/// Keyed-digest manifest over the catalog files.
///
/// Files are keyed by their file name, so two tracked files must not share a
/// name across directories. All read-modify-write cycles are serialized by a
/// single lock.
pub struct IntegrityManifest {
    path: PathBuf,
    key: FileKey,
    lock: Mutex<()>,
}

impl IntegrityManifest {
    /// Binds a manifest to `path`. Nothing is read until the first call.
    pub fn new(path: impl Into<PathBuf>, key: FileKey) -> Self {
        Self {
            path: path.into(),
            key,
            lock: Mutex::new(()),
        }
    }

    /// Location of the manifest file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checks the live digest of `file` against its manifest entry.
    ///
    /// A file that does not exist and is not tracked is fine (nothing has been
    /// written yet). An existing file with no manifest, an existing file with
    /// no entry, a digest mismatch, and a tracked file that vanished are all
    /// integrity violations.
    pub fn verify(&self, file: &Path) -> IntegrityResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.verify_locked(file)
    }

    /// Verifies several files under one lock acquisition, stopping at the
    /// first violation.
    pub fn verify_all<P: AsRef<Path>>(&self, files: &[P]) -> IntegrityResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        for file in files {
            self.verify_locked(file.as_ref())?;
        }
        info!(files = files.len(), manifest = %self.path.display(), "Catalog integrity verified");
        Ok(())
    }

    /// Recomputes the digest of `file` and rewrites its entry.
    pub fn update(&self, file: &Path) -> IntegrityResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let name = entry_name(file);
        let digest = keyed_digest(&self.key, &fs::read(file)?)?;

        let mut entries = self.load()?.unwrap_or_default();
        entries.insert(name.clone(), digest);
        self.store(&entries)?;

        debug!(file = %name, "Manifest entry updated");
        Ok(())
    }

    /// Drops the entry for `file`, if any.
    pub fn remove(&self, file: &Path) -> IntegrityResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let name = entry_name(file);
        let Some(mut entries) = self.load()? else {
            return Ok(());
        };
        if entries.remove(&name).is_some() {
            self.store(&entries)?;
            debug!(file = %name, "Manifest entry removed");
        }
        Ok(())
    }

    /// The decrypted table, ordered by file name. Empty if no manifest exists.
    pub fn entries(&self) -> IntegrityResult<BTreeMap<String, String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.unwrap_or_default())
    }

    fn verify_locked(&self, file: &Path) -> IntegrityResult<()> {
        let name = entry_name(file);
        let exists = file.exists();

        let Some(entries) = self.load()? else {
            if exists {
                error!(file = %name, manifest = %self.path.display(), "File present without a manifest");
                return Err(IntegrityError::ManifestMissing {
                    manifest: self.path.clone(),
                    file: name,
                });
            }
            return Ok(());
        };

        match (entries.get(&name), exists) {
            (None, false) => Ok(()),
            (None, true) => {
                error!(file = %name, "File has no manifest entry");
                Err(IntegrityError::EntryMissing { file: name })
            }
            (Some(_), false) => {
                error!(file = %name, "Tracked file was deleted");
                Err(IntegrityError::FileMissing { file: name })
            }
            (Some(expected), true) => {
                let live = keyed_digest(&self.key, &fs::read(file)?)?;
                if &live != expected {
                    error!(file = %name, "Integrity check failed: digest mismatch");
                    return Err(IntegrityError::Tampered { file: name });
                }
                debug!(file = %name, "Integrity check passed");
                Ok(())
            }
        }
    }

    /// `None` when no manifest has been written yet.
    fn load(&self) -> IntegrityResult<Option<BTreeMap<String, String>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)?;

        let mut entries = BTreeMap::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let corrupt = |reason: String| IntegrityError::Corrupt {
                line: idx + 1,
                reason,
            };
            let plain = decrypt_line(&self.key, line).map_err(|e| corrupt(e.to_string()))?;
            // Digests are base64 and never contain ':'.
            let (name, digest) = plain
                .rsplit_once(':')
                .ok_or_else(|| corrupt("missing ':' separator".to_string()))?;
            if name.is_empty() || digest.is_empty() {
                return Err(corrupt("empty file name or digest".to_string()));
            }
            entries.insert(name.to_string(), digest.to_string());
        }
        Ok(Some(entries))
    }

    fn store(&self, entries: &BTreeMap<String, String>) -> IntegrityResult<()> {
        let mut text = String::new();
        for (name, digest) in entries {
            text.push_str(&encrypt_line(&self.key, &format!("{}:{}", name, digest))?);
            text.push('\n');
        }
        write_atomic(&self.path, text.as_bytes())?;
        Ok(())
    }
}

impl std::fmt::Debug for IntegrityManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityManifest")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn entry_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string_lossy().into_owned())
}
