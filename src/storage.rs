//! Filesystem object store holding uploaded recording files
//!
//! Object paths are relative, `<user_id>/<file name>`, and are what the
//! recordings table stores in `file_path`.

use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::constants::generate_suffix;
use crate::error::StoreError;
use crate::models::RecordingType;

#[derive(Debug, Clone)]
pub struct ObjectStorage {
    root: PathBuf,
}

impl ObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an object path onto the filesystem, rejecting anything that escapes the root
    pub fn resolve(&self, object_path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(object_path);
        let well_formed = !object_path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(StoreError::Invalid(format!(
                "invalid object path '{}'",
                object_path
            )));
        }
        Ok(self.root.join(relative))
    }

    /// Write a new object; an existing object with the same path is an error
    pub async fn put(&self, object_path: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.resolve(object_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::Storage(format!("{}: {}", object_path, e)))?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn get(&self, object_path: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(object_path)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("object '{}'", object_path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, object_path: &str) -> Result<bool, StoreError> {
        let path = self.resolve(object_path)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Remove an object; a missing object is not an error
    pub async fn remove(&self, object_path: &str) -> Result<(), StoreError> {
        let path = self.resolve(object_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Object path for a new upload: `<user_id>/<Label>_<dd-mm-yyyy>_<HH-MM-SS>_<suffix>.<ext>`
pub fn object_path_for(user_id: &str, recording_type: RecordingType, now: &DateTime<Utc>) -> String {
    format!(
        "{}/{}_{}_{}_{}.{}",
        user_id,
        recording_type.label(),
        now.format("%d-%m-%Y"),
        now.format("%H-%M-%S"),
        generate_suffix(6),
        recording_type.file_extension()
    )
}
