use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Default backing file name, resolved against the working directory.
pub const DEFAULT_BACKING_FILE: &str = ".last-viewed-pages";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backing_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backing_file: PathBuf::from(DEFAULT_BACKING_FILE),
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read backing file {path:?}")]
    Read { path: PathBuf, source: io::Error },
    #[error("backing file {path:?} does not contain a page table")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode page table")]
    Encode { source: serde_json::Error },
    #[error("failed to write backing file {path:?}")]
    Write { path: PathBuf, source: io::Error },
}

/// Identifier a document is stored under: base filename, no path, no
/// extension. Documents with equal stems in different directories share an
/// entry (last writer wins).
pub fn document_key(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Key to last-read page, backed by a single file holding a JSON list of
/// `[key, page]` pairs. The file is reloaded on every operation and rewritten
/// in full on every save; nothing is cached in memory between calls.
pub struct PageStore {
    path: PathBuf,
}

impl PageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn with_config(config: &Config) -> Self {
        Self::new(config.backing_file.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Looks up the stored page for `key`. A missing, unreadable, or
    /// unparsable backing file reads as an empty table.
    pub fn get_page(&self, key: &str) -> Option<u32> {
        let entries = self.load_or_empty();
        entries
            .into_iter()
            .rev()
            .find(|(stored, _)| stored == key)
            .map(|(_, page)| page)
    }

    /// Replaces or inserts the entry for `key` and rewrites the whole table.
    /// Best-effort: a write failure is logged and the save skipped, leaving
    /// the previous file contents intact.
    pub fn set_page(&self, key: &str, page: u32) {
        if page == 0 {
            debug!(key, "ignoring save of page 0, pages are 1-indexed");
            return;
        }
        let mut entries = self.load_or_empty();
        entries.retain(|(stored, _)| stored != key);
        entries.push((key.to_string(), page));
        if let Err(err) = self.persist(&entries) {
            warn!(?err, key, page, "skipping page save");
        }
    }

    fn load_or_empty(&self) -> Vec<(String, u32)> {
        match self.load() {
            Ok(entries) => entries,
            Err(err) => {
                debug!(?err, "treating backing file as empty");
                Vec::new()
            }
        }
    }

    fn load(&self) -> Result<Vec<(String, u32)>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn persist(&self, entries: &[(String, u32)]) -> Result<(), StoreError> {
        let payload =
            serde_json::to_string(entries).map_err(|source| StoreError::Encode { source })?;
        let tmp = match self.path.file_name() {
            Some(name) => {
                let mut tmp_name = name.to_os_string();
                tmp_name.push(".tmp");
                self.path.with_file_name(tmp_name)
            }
            None => {
                return Err(StoreError::Write {
                    path: self.path.clone(),
                    source: io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
                })
            }
        };
        fs::write(&tmp, payload).map_err(|source| StoreError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
