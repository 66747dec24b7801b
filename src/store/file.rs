use super::{Backend, StoreError};
use crate::labels::{Label, LabelTable, LanguageCode};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Label table stored as one pretty-printed JSON document.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, e: std::io::Error) -> StoreError {
        StoreError::WriteError {
            location: self.location(),
            reason: e.to_string(),
        }
    }

    /// Write through a sibling temp file and rename it into place, so
    /// readers never observe a half-written table.
    async fn write_atomic(&self, contents: &str) -> Result<(), StoreError> {
        let mut tmp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "labels.json".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        if let Err(e) = tokio::fs::write(&tmp_path, contents).await {
            return Err(self.write_error(e));
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(self.write_error(e));
        }

        debug!("Wrote {} bytes to {}", contents.len(), self.path.display());
        Ok(())
    }

    async fn write_table(&self, table: &LabelTable) -> Result<(), StoreError> {
        let encoded = table.encode().map_err(|e| StoreError::WriteError {
            location: self.location(),
            reason: e.to_string(),
        })?;
        self.write_atomic(&encoded).await
    }
}

impl Backend for FileBackend {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn read(&self) -> Result<Option<LabelTable>, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::StorageUnavailable {
                    location: self.location(),
                    reason: e.to_string(),
                })
            }
        };

        LabelTable::decode(&contents)
            .map(Some)
            .map_err(|e| StoreError::ParseError(e.to_string()))
    }

    /// Copy the seed document verbatim, creating the directory if needed.
    async fn seed(&self, _table: &LabelTable, raw: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::StorageUnavailable {
                    location: self.location(),
                    reason: e.to_string(),
                })?;
        }

        self.write_atomic(raw).await
    }

    async fn write_all(&self, _table: &LabelTable, encoded: &str) -> Result<(), StoreError> {
        self.write_atomic(encoded).await
    }

    async fn insert_label(&self, _label: &Label, table: &LabelTable) -> Result<(), StoreError> {
        self.write_table(table).await
    }

    async fn upsert_translation(
        &self,
        _label: &Label,
        _language: &LanguageCode,
        _translation: &str,
        table: &LabelTable,
    ) -> Result<(), StoreError> {
        self.write_table(table).await
    }
}
