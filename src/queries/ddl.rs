use sea_query::{ColumnDef, Index, SqliteQueryBuilder, Table};

use crate::schema::{Devices, DownloadTokens, Metadata, Recordings, Subscriptions};

/// CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)
pub fn create_metadata_table() -> String {
    Table::create()
        .table(Metadata::Table)
        .if_not_exists()
        .col(ColumnDef::new(Metadata::Key).string().primary_key())
        .col(ColumnDef::new(Metadata::Value).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS devices (
///     id TEXT PRIMARY KEY,
///     user_id TEXT NOT NULL,
///     name TEXT NOT NULL,
///     type TEXT NOT NULL,
///     is_third_party INTEGER NOT NULL DEFAULT 0,
///     third_party_email TEXT,
///     records_password TEXT,
///     recording_time_limit INTEGER,
///     status TEXT NOT NULL DEFAULT 'offline',
///     last_seen TEXT,
///     created_at TEXT NOT NULL
/// )
pub fn create_devices_table() -> String {
    Table::create()
        .table(Devices::Table)
        .if_not_exists()
        .col(ColumnDef::new(Devices::Id).string().primary_key())
        .col(ColumnDef::new(Devices::UserId).string().not_null())
        .col(ColumnDef::new(Devices::Name).string().not_null())
        .col(ColumnDef::new(Devices::Type).string().not_null())
        .col(
            ColumnDef::new(Devices::IsThirdParty)
                .integer()
                .not_null()
                .default(0),
        )
        .col(ColumnDef::new(Devices::ThirdPartyEmail).string())
        .col(ColumnDef::new(Devices::RecordsPassword).string())
        .col(ColumnDef::new(Devices::RecordingTimeLimit).big_integer())
        .col(
            ColumnDef::new(Devices::Status)
                .string()
                .not_null()
                .default("offline"),
        )
        .col(ColumnDef::new(Devices::LastSeen).string())
        .col(ColumnDef::new(Devices::CreatedAt).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS recordings (
///     id TEXT PRIMARY KEY,
///     device_id TEXT NOT NULL,
///     user_id TEXT NOT NULL,
///     type TEXT NOT NULL,
///     file_path TEXT,
///     location_data TEXT,
///     duration INTEGER,
///     size INTEGER,
///     created_at TEXT NOT NULL,
///     is_downloaded INTEGER NOT NULL DEFAULT 0
/// )
///
/// device_id deliberately carries no foreign key: panic recordings may name a
/// placeholder device that was never registered.
pub fn create_recordings_table() -> String {
    Table::create()
        .table(Recordings::Table)
        .if_not_exists()
        .col(ColumnDef::new(Recordings::Id).string().primary_key())
        .col(ColumnDef::new(Recordings::DeviceId).string().not_null())
        .col(ColumnDef::new(Recordings::UserId).string().not_null())
        .col(ColumnDef::new(Recordings::Type).string().not_null())
        .col(ColumnDef::new(Recordings::FilePath).string())
        .col(ColumnDef::new(Recordings::LocationData).text())
        .col(ColumnDef::new(Recordings::Duration).big_integer())
        .col(ColumnDef::new(Recordings::Size).big_integer())
        .col(ColumnDef::new(Recordings::CreatedAt).string().not_null())
        .col(
            ColumnDef::new(Recordings::IsDownloaded)
                .integer()
                .not_null()
                .default(0),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS subscriptions (
///     id TEXT PRIMARY KEY,
///     user_id TEXT NOT NULL UNIQUE,
///     plan_type TEXT NOT NULL,
///     status TEXT NOT NULL,
///     started_at TEXT NOT NULL,
///     expires_at TEXT,
///     created_at TEXT NOT NULL
/// )
pub fn create_subscriptions_table() -> String {
    Table::create()
        .table(Subscriptions::Table)
        .if_not_exists()
        .col(ColumnDef::new(Subscriptions::Id).string().primary_key())
        .col(
            ColumnDef::new(Subscriptions::UserId)
                .string()
                .not_null()
                .unique_key(),
        )
        .col(ColumnDef::new(Subscriptions::PlanType).string().not_null())
        .col(ColumnDef::new(Subscriptions::Status).string().not_null())
        .col(ColumnDef::new(Subscriptions::StartedAt).string().not_null())
        .col(ColumnDef::new(Subscriptions::ExpiresAt).string())
        .col(ColumnDef::new(Subscriptions::CreatedAt).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS download_tokens (
///     token TEXT PRIMARY KEY,
///     file_path TEXT NOT NULL,
///     expires_at_ms INTEGER NOT NULL
/// )
pub fn create_download_tokens_table() -> String {
    Table::create()
        .table(DownloadTokens::Table)
        .if_not_exists()
        .col(ColumnDef::new(DownloadTokens::Token).string().primary_key())
        .col(ColumnDef::new(DownloadTokens::FilePath).string().not_null())
        .col(
            ColumnDef::new(DownloadTokens::ExpiresAtMs)
                .big_integer()
                .not_null(),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_devices_user_created ON devices(user_id, created_at)
pub fn create_devices_user_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_devices_user_created")
        .table(Devices::Table)
        .col(Devices::UserId)
        .col(Devices::CreatedAt)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_recordings_user_created ON recordings(user_id, created_at)
pub fn create_recordings_user_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_recordings_user_created")
        .table(Recordings::Table)
        .col(Recordings::UserId)
        .col(Recordings::CreatedAt)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_recordings_device_id ON recordings(device_id)
pub fn create_recordings_device_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_recordings_device_id")
        .table(Recordings::Table)
        .col(Recordings::DeviceId)
        .to_string(SqliteQueryBuilder)
}

/// Every statement needed for a fresh database, in execution order
pub fn all_statements() -> Vec<String> {
    vec![
        create_metadata_table(),
        create_devices_table(),
        create_recordings_table(),
        create_subscriptions_table(),
        create_download_tokens_table(),
        create_devices_user_index(),
        create_recordings_user_index(),
        create_recordings_device_index(),
    ]
}
