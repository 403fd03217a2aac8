use sea_query::{Asterisk, Expr, Order, Query, SqliteQueryBuilder, UpdateStatement};

use super::format_timestamp;
use crate::models::{Recording, RecordingPatch};
use crate::schema::Recordings;

/// SELECT * FROM recordings WHERE user_id = ? ORDER BY created_at DESC
pub fn select_all_for_user(user_id: &str) -> String {
    Query::select()
        .column(Asterisk)
        .from(Recordings::Table)
        .and_where(Expr::col(Recordings::UserId).eq(user_id))
        .order_by(Recordings::CreatedAt, Order::Desc)
        .to_string(SqliteQueryBuilder)
}

/// SELECT * FROM recordings WHERE user_id = ? AND id = ?
pub fn select_by_id(user_id: &str, id: &str) -> String {
    Query::select()
        .column(Asterisk)
        .from(Recordings::Table)
        .and_where(Expr::col(Recordings::UserId).eq(user_id))
        .and_where(Expr::col(Recordings::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// INSERT INTO recordings (...) VALUES (...)
pub fn insert(recording: &Recording) -> String {
    Query::insert()
        .into_table(Recordings::Table)
        .columns([
            Recordings::Id,
            Recordings::DeviceId,
            Recordings::UserId,
            Recordings::Type,
            Recordings::FilePath,
            Recordings::LocationData,
            Recordings::Duration,
            Recordings::Size,
            Recordings::CreatedAt,
            Recordings::IsDownloaded,
        ])
        .values_panic([
            recording.id.as_str().into(),
            recording.device_id.as_str().into(),
            recording.user_id.as_str().into(),
            recording.recording_type.as_str().into(),
            recording.file_path.clone().into(),
            recording
                .location_data
                .as_ref()
                .map(|v| v.to_string())
                .into(),
            recording.duration.into(),
            recording.size.into(),
            format_timestamp(&recording.created_at).into(),
            (recording.is_downloaded as i32).into(),
        ])
        .to_string(SqliteQueryBuilder)
}

fn scoped_update(user_id: &str, id: &str) -> UpdateStatement {
    Query::update()
        .table(Recordings::Table)
        .and_where(Expr::col(Recordings::UserId).eq(user_id))
        .and_where(Expr::col(Recordings::Id).eq(id))
        .to_owned()
}

/// UPDATE recordings SET <patched columns> WHERE user_id = ? AND id = ?
/// Returns None when the patch carries no changes
pub fn update(user_id: &str, id: &str, patch: &RecordingPatch) -> Option<String> {
    if patch.is_empty() {
        return None;
    }

    let mut query = scoped_update(user_id, id);
    if let Some(file_path) = &patch.file_path {
        query.value(Recordings::FilePath, file_path.as_str());
    }
    if let Some(location_data) = &patch.location_data {
        query.value(Recordings::LocationData, location_data.to_string());
    }
    if let Some(duration) = patch.duration {
        query.value(Recordings::Duration, duration);
    }
    if let Some(size) = patch.size {
        query.value(Recordings::Size, size);
    }
    if let Some(is_downloaded) = patch.is_downloaded {
        query.value(Recordings::IsDownloaded, is_downloaded as i32);
    }
    Some(query.to_string(SqliteQueryBuilder))
}

/// DELETE FROM recordings WHERE user_id = ? AND id = ?
pub fn delete(user_id: &str, id: &str) -> String {
    Query::delete()
        .from_table(Recordings::Table)
        .and_where(Expr::col(Recordings::UserId).eq(user_id))
        .and_where(Expr::col(Recordings::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}
