use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{RelayError, Result};
use crate::request::PendingRequest;

use super::{RequestStore, StoredEntry};

/// Directory of `<id>.json` files, one per pending request.
///
/// Every write goes to a temp file in the same directory and is renamed into
/// place, so readers never observe a half-written record.
pub struct FileRequestStore {
    dir: PathBuf,
}

impl FileRequestStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validate that an id can't escape the store directory.
    fn validate_id(id: &str) -> Result<()> {
        if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
            return Err(RelayError::Storage {
                reason: format!(
                    "invalid request id '{}': must be non-empty and not contain '/', '\\', or '..'",
                    id
                ),
            });
        }
        Ok(())
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        Self::validate_id(id)?;
        Ok(self.dir.join(format!("{id}.json")))
    }

    fn read_path(path: &Path, id: &str) -> Result<PendingRequest> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RelayError::RequestNotFound { id: id.to_string() });
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&contents).map_err(|e| RelayError::CorruptRequest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Serialize into a temp file next to the destination, synced to disk.
    fn stage(&self, request: &PendingRequest) -> Result<NamedTempFile> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(request)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }
}

impl RequestStore for FileRequestStore {
    fn create(&self, request: &PendingRequest) -> Result<()> {
        let path = self.path_for(&request.id)?;
        let tmp = self.stage(request)?;
        tmp.persist_noclobber(&path)
            .map_err(|e| RelayError::Storage {
                reason: format!("failed to create {}: {}", path.display(), e.error),
            })?;
        Ok(())
    }

    fn read(&self, id: &str) -> Result<PendingRequest> {
        let path = self.path_for(id)?;
        Self::read_path(&path, id)
    }

    fn update(
        &self,
        id: &str,
        mutator: &mut dyn FnMut(&mut PendingRequest) -> Result<()>,
    ) -> Result<PendingRequest> {
        let path = self.path_for(id)?;
        let mut request = Self::read_path(&path, id)?;
        mutator(&mut request)?;

        let tmp = self.stage(&request)?;
        // The other side may have deleted the file since we read it. Don't
        // resurrect it.
        if !path.exists() {
            return Err(RelayError::RequestNotFound { id: id.to_string() });
        }
        tmp.persist(&path).map_err(|e| RelayError::Storage {
            reason: format!("failed to replace {}: {}", path.display(), e.error),
        })?;
        Ok(request)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn scan(&self) -> Result<Vec<StoredEntry>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(id) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            match Self::read_path(&path, &id) {
                Ok(request) => entries.push(StoredEntry::Request(Box::new(request))),
                // Deleted between read_dir and read.
                Err(RelayError::RequestNotFound { .. }) => {}
                Err(e) => entries.push(StoredEntry::Corrupt {
                    id,
                    reason: e.to_string(),
                }),
            }
        }

        entries.sort_by_key(|entry| match entry {
            StoredEntry::Request(r) => Some(r.created_at),
            StoredEntry::Corrupt { .. } => None,
        });
        Ok(entries)
    }
}
