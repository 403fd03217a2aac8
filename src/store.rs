//! Recording store: evidence metadata in SQLite, files in the object store

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use crate::constants::{generate_local_id, DEFAULT_DOWNLOAD_URL_TTL_SECS};
use crate::error::StoreError;
use crate::models::{Blob, NewRecording, Recording, RecordingPatch};
use crate::queries::{download_tokens, parse_timestamp, recordings};
use crate::realtime::{RealtimeEvent, RealtimeHub};
use crate::storage::{object_path_for, ObjectStorage};

#[async_trait]
pub trait RecordingStore: Send + Sync {
    /// All recordings of the owner, newest first
    async fn list(&self) -> Result<Vec<Recording>, StoreError>;
    /// Upload `blob` (if any) and insert the metadata row.
    /// A failed upload degrades to a metadata-only row without `file_path`.
    async fn create(&self, data: NewRecording, blob: Option<Blob>) -> Result<Recording, StoreError>;
    async fn update(&self, id: &str, patch: RecordingPatch) -> Result<Recording, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    /// Upload a file for an existing recording and point `file_path` at it
    async fn attach_file(&self, id: &str, blob: Blob) -> Result<Recording, StoreError>;
    /// Time-limited URL for a stored object
    async fn download_url(&self, file_path: &str) -> Result<String, StoreError>;
}

pub struct SqliteRecordingStore {
    pool: SqlitePool,
    user_id: String,
    storage: ObjectStorage,
    base_url: String,
    url_ttl: Duration,
    events: Option<RealtimeHub>,
}

impl SqliteRecordingStore {
    pub fn new(
        pool: SqlitePool,
        user_id: impl Into<String>,
        storage: ObjectStorage,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            user_id: user_id.into(),
            storage,
            base_url: base_url.into(),
            url_ttl: Duration::seconds(DEFAULT_DOWNLOAD_URL_TTL_SECS),
            events: None,
        }
    }

    pub fn with_url_ttl(mut self, ttl: Duration) -> Self {
        self.url_ttl = ttl;
        self
    }

    /// Publish `recording_start` events for new recordings
    pub fn with_events(mut self, hub: RealtimeHub) -> Self {
        self.events = Some(hub);
        self
    }

    pub fn url_ttl(&self) -> Duration {
        self.url_ttl
    }

    pub fn storage(&self) -> &ObjectStorage {
        &self.storage
    }

    pub async fn get(&self, id: &str) -> Result<Recording, StoreError> {
        let sql = recordings::select_by_id(&self.user_id, id);
        let row = sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("recording '{}'", id)))?;
        recording_from_row(&row)
    }

    /// Resolve a download token to the object it grants, if still valid
    pub async fn open_download(&self, token: &str) -> Result<(String, Vec<u8>), StoreError> {
        let now_ms = Utc::now().timestamp_millis();
        let sql = download_tokens::select_valid(token, now_ms);
        let file_path = sqlx::query_scalar::<_, String>(&sql)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound("download link expired or unknown".to_string()))?;
        let data = self.storage.get(&file_path).await?;
        Ok((file_path, data))
    }

    async fn upload(&self, object_path: &str, blob: &Blob) -> Result<(), StoreError> {
        log::debug!(
            "Uploading {} ({} bytes, {})",
            object_path,
            blob.len(),
            blob.content_type
        );
        self.storage.put(object_path, &blob.data).await
    }
}

pub(crate) fn recording_from_row(row: &SqliteRow) -> Result<Recording, StoreError> {
    let recording_type: String = row.try_get("type")?;
    let location_data: Option<String> = row.try_get("location_data")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Recording {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        user_id: row.try_get("user_id")?,
        recording_type: recording_type.parse().map_err(StoreError::Database)?,
        file_path: row.try_get("file_path")?,
        location_data: location_data
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()?,
        duration: row.try_get("duration")?,
        size: row.try_get("size")?,
        created_at: parse_timestamp(&created_at).map_err(StoreError::Database)?,
        is_downloaded: row.try_get::<i64, _>("is_downloaded")? != 0,
    })
}

#[async_trait]
impl RecordingStore for SqliteRecordingStore {
    async fn list(&self) -> Result<Vec<Recording>, StoreError> {
        let sql = recordings::select_all_for_user(&self.user_id);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(recording_from_row).collect()
    }

    async fn create(&self, data: NewRecording, blob: Option<Blob>) -> Result<Recording, StoreError> {
        let now = Utc::now();
        let mut file_path = None;
        let mut size = data.size;

        match blob {
            Some(blob) if blob.is_empty() => {
                log::warn!(
                    "Ignoring empty {} upload, saving metadata only",
                    data.recording_type.as_str()
                );
            }
            Some(blob) => {
                let object_path = object_path_for(&self.user_id, data.recording_type, &now);
                match self.upload(&object_path, &blob).await {
                    Ok(()) => {
                        size = Some(blob.len() as i64);
                        file_path = Some(object_path);
                    }
                    Err(e) => {
                        log::warn!("Upload of {} failed, saving metadata only: {}", object_path, e);
                    }
                }
            }
            None => {}
        }

        let recording = Recording {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: data.device_id,
            user_id: self.user_id.clone(),
            recording_type: data.recording_type,
            file_path,
            location_data: data.location_data,
            duration: Some(data.duration.unwrap_or(0)),
            size: Some(size.unwrap_or(0)),
            created_at: now,
            is_downloaded: false,
        };

        if let Err(e) = sqlx::query(&recordings::insert(&recording))
            .execute(&self.pool)
            .await
        {
            if let Some(path) = &recording.file_path {
                let _ = self.storage.remove(path).await;
            }
            return Err(e.into());
        }

        log::info!(
            "Created {} recording {} for device {}",
            recording.recording_type.as_str(),
            recording.id,
            recording.device_id
        );
        if let Some(hub) = &self.events {
            hub.publish(RealtimeEvent::recording_start(
                &recording.device_id,
                &recording.id,
                recording.recording_type,
            ));
        }
        Ok(recording)
    }

    async fn update(&self, id: &str, patch: RecordingPatch) -> Result<Recording, StoreError> {
        if let Some(sql) = recordings::update(&self.user_id, id, &patch) {
            let result = sqlx::query(&sql).execute(&self.pool).await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("recording '{}'", id)));
            }
        }
        self.get(id).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let recording = self.get(id).await?;
        sqlx::query(&recordings::delete(&self.user_id, id))
            .execute(&self.pool)
            .await?;
        if let Some(path) = &recording.file_path {
            if let Err(e) = self.storage.remove(path).await {
                log::warn!("Recording {} deleted but its file {} remains: {}", id, path, e);
            }
        }
        Ok(())
    }

    async fn attach_file(&self, id: &str, blob: Blob) -> Result<Recording, StoreError> {
        if blob.is_empty() {
            return Err(StoreError::Invalid("refusing to store an empty file".to_string()));
        }
        let recording = self.get(id).await?;
        let object_path = object_path_for(&self.user_id, recording.recording_type, &Utc::now());
        self.upload(&object_path, &blob).await?;

        let patch = RecordingPatch {
            file_path: Some(object_path.clone()),
            size: Some(blob.len() as i64),
            ..Default::default()
        };
        match self.update(id, patch).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                let _ = self.storage.remove(&object_path).await;
                Err(e)
            }
        }
    }

    async fn download_url(&self, file_path: &str) -> Result<String, StoreError> {
        if !self.storage.exists(file_path).await? {
            return Err(StoreError::NotFound(format!("object '{}'", file_path)));
        }

        let now = Utc::now();
        sqlx::query(&download_tokens::delete_expired(now.timestamp_millis()))
            .execute(&self.pool)
            .await?;

        let token = generate_local_id("dl");
        let expires_at_ms = (now + self.url_ttl).timestamp_millis();
        sqlx::query(&download_tokens::insert(&token, file_path, expires_at_ms))
            .execute(&self.pool)
            .await?;

        Ok(format!("{}/api/files/{}", self.base_url, token))
    }
}
