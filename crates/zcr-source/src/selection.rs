//! Persisted selected-source key.
//!
//! The relay remembers exactly one thing across restarts: the key
//! ([`zcr_schemas::SourceHandle::key`]) of the source it was pointed at.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub trait SelectionStore: Send {
    fn load(&self) -> Result<Option<String>>;
    fn save(&mut self, key: &str) -> Result<()>;
}

/// Keeps the key in memory only. Used when no selection file is configured.
#[derive(Clone, Debug, Default)]
pub struct MemorySelectionStore {
    key: Option<String>,
}

impl MemorySelectionStore {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
        }
    }
}

impl SelectionStore for MemorySelectionStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.key.clone())
    }

    fn save(&mut self, key: &str) -> Result<()> {
        self.key = Some(key.to_string());
        Ok(())
    }
}

/// One key per file, replaced atomically (write temp, then rename).
#[derive(Clone, Debug)]
pub struct FileSelectionStore {
    path: PathBuf,
}

impl FileSelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SelectionStore for FileSelectionStore {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("read selection file failed: {}", self.path.display()))?;
        let key = raw.trim();
        Ok(if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        })
    }

    fn save(&mut self, key: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("create selection dir failed: {}", parent.display())
                })?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, format!("{key}\n"))
            .with_context(|| format!("write selection temp file failed: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace selection file failed: {}", self.path.display()))?;
        Ok(())
    }
}
