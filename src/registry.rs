//! Device registry: CRUD over the devices table plus status heartbeats

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use crate::error::StoreError;
use crate::models::{Device, DevicePatch, DeviceStatus, NewDevice};
use crate::queries::{devices, parse_timestamp};
use crate::realtime::{RealtimeEvent, RealtimeHub};

#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// All devices of the owner, newest first
    async fn list(&self) -> Result<Vec<Device>, StoreError>;
    async fn create(&self, data: NewDevice) -> Result<Device, StoreError>;
    async fn update(&self, id: &str, patch: DevicePatch) -> Result<Device, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    /// Record a heartbeat; going online also stamps `last_seen`
    async fn set_status(&self, id: &str, status: DeviceStatus) -> Result<(), StoreError>;
}

pub struct SqliteDeviceRegistry {
    pool: SqlitePool,
    user_id: String,
    events: Option<RealtimeHub>,
}

impl SqliteDeviceRegistry {
    pub fn new(pool: SqlitePool, user_id: impl Into<String>) -> Self {
        Self {
            pool,
            user_id: user_id.into(),
            events: None,
        }
    }

    /// Publish `device_status` events on status changes
    pub fn with_events(mut self, hub: RealtimeHub) -> Self {
        self.events = Some(hub);
        self
    }

    async fn fetch(&self, id: &str) -> Result<Device, StoreError> {
        let sql = devices::select_by_id(&self.user_id, id);
        let row = sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("device '{}'", id)))?;
        device_from_row(&row)
    }
}

pub(crate) fn device_from_row(row: &SqliteRow) -> Result<Device, StoreError> {
    let device_type: String = row.try_get("type")?;
    let status: String = row.try_get("status")?;
    let last_seen: Option<String> = row.try_get("last_seen")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Device {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        device_type: device_type.parse().map_err(StoreError::Database)?,
        is_third_party: row.try_get::<i64, _>("is_third_party")? != 0,
        third_party_email: row.try_get("third_party_email")?,
        records_password: row.try_get("records_password")?,
        recording_time_limit: row.try_get("recording_time_limit")?,
        status: status.parse().map_err(StoreError::Database)?,
        last_seen: last_seen
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(StoreError::Database)?,
        created_at: parse_timestamp(&created_at).map_err(StoreError::Database)?,
    })
}

#[async_trait]
impl DeviceRegistry for SqliteDeviceRegistry {
    async fn list(&self) -> Result<Vec<Device>, StoreError> {
        let sql = devices::select_all_for_user(&self.user_id);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(device_from_row).collect()
    }

    async fn create(&self, data: NewDevice) -> Result<Device, StoreError> {
        if data.name.trim().is_empty() {
            return Err(StoreError::Invalid("device name must not be empty".to_string()));
        }

        let device = Device {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            name: data.name,
            device_type: data.device_type,
            is_third_party: data.is_third_party,
            third_party_email: data.third_party_email,
            records_password: data.records_password,
            recording_time_limit: data.recording_time_limit,
            status: DeviceStatus::Offline,
            last_seen: None,
            created_at: Utc::now(),
        };

        sqlx::query(&devices::insert(&device))
            .execute(&self.pool)
            .await?;
        log::info!("Registered device '{}' ({})", device.name, device.id);
        Ok(device)
    }

    async fn update(&self, id: &str, patch: DevicePatch) -> Result<Device, StoreError> {
        if let Some(sql) = devices::update(&self.user_id, id, &patch) {
            let result = sqlx::query(&sql).execute(&self.pool).await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("device '{}'", id)));
            }
        }
        self.fetch(id).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(&devices::delete(&self.user_id, id))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("device '{}'", id)));
        }
        log::info!("Removed device {}", id);
        Ok(())
    }

    async fn set_status(&self, id: &str, status: DeviceStatus) -> Result<(), StoreError> {
        let now = Utc::now();
        let last_seen = match status {
            DeviceStatus::Online => Some(&now),
            DeviceStatus::Offline => None,
        };
        let sql = devices::update_status(&self.user_id, id, status, last_seen);
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("device '{}'", id)));
        }

        if let Some(hub) = &self.events {
            hub.publish(RealtimeEvent::device_status(id, status));
        }
        Ok(())
    }
}
