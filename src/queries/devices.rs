use sea_query::{Asterisk, Expr, Order, Query, SqliteQueryBuilder, UpdateStatement};

use super::format_timestamp;
use crate::models::{Device, DevicePatch, DeviceStatus};
use crate::schema::Devices;
use chrono::{DateTime, Utc};

/// SELECT * FROM devices WHERE user_id = ? ORDER BY created_at DESC
pub fn select_all_for_user(user_id: &str) -> String {
    Query::select()
        .column(Asterisk)
        .from(Devices::Table)
        .and_where(Expr::col(Devices::UserId).eq(user_id))
        .order_by(Devices::CreatedAt, Order::Desc)
        .to_string(SqliteQueryBuilder)
}

/// SELECT * FROM devices WHERE user_id = ? AND id = ?
pub fn select_by_id(user_id: &str, id: &str) -> String {
    Query::select()
        .column(Asterisk)
        .from(Devices::Table)
        .and_where(Expr::col(Devices::UserId).eq(user_id))
        .and_where(Expr::col(Devices::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// INSERT INTO devices (...) VALUES (...)
pub fn insert(device: &Device) -> String {
    Query::insert()
        .into_table(Devices::Table)
        .columns([
            Devices::Id,
            Devices::UserId,
            Devices::Name,
            Devices::Type,
            Devices::IsThirdParty,
            Devices::ThirdPartyEmail,
            Devices::RecordsPassword,
            Devices::RecordingTimeLimit,
            Devices::Status,
            Devices::LastSeen,
            Devices::CreatedAt,
        ])
        .values_panic([
            device.id.as_str().into(),
            device.user_id.as_str().into(),
            device.name.as_str().into(),
            device.device_type.as_str().into(),
            (device.is_third_party as i32).into(),
            device.third_party_email.clone().into(),
            device.records_password.clone().into(),
            device.recording_time_limit.into(),
            device.status.as_str().into(),
            device.last_seen.as_ref().map(format_timestamp).into(),
            format_timestamp(&device.created_at).into(),
        ])
        .to_string(SqliteQueryBuilder)
}

fn scoped_update(user_id: &str, id: &str) -> UpdateStatement {
    Query::update()
        .table(Devices::Table)
        .and_where(Expr::col(Devices::UserId).eq(user_id))
        .and_where(Expr::col(Devices::Id).eq(id))
        .to_owned()
}

/// UPDATE devices SET <patched columns> WHERE user_id = ? AND id = ?
/// Returns None when the patch carries no changes
pub fn update(user_id: &str, id: &str, patch: &DevicePatch) -> Option<String> {
    if patch.is_empty() {
        return None;
    }

    let mut query = scoped_update(user_id, id);
    if let Some(name) = &patch.name {
        query.value(Devices::Name, name.as_str());
    }
    if let Some(device_type) = patch.device_type {
        query.value(Devices::Type, device_type.as_str());
    }
    if let Some(is_third_party) = patch.is_third_party {
        query.value(Devices::IsThirdParty, is_third_party as i32);
    }
    if let Some(email) = &patch.third_party_email {
        query.value(Devices::ThirdPartyEmail, email.as_str());
    }
    if let Some(password) = &patch.records_password {
        query.value(Devices::RecordsPassword, password.as_str());
    }
    if let Some(limit) = patch.recording_time_limit {
        query.value(Devices::RecordingTimeLimit, limit);
    }
    Some(query.to_string(SqliteQueryBuilder))
}

/// UPDATE devices SET status = ?[, last_seen = ?] WHERE user_id = ? AND id = ?
/// last_seen is only stamped when a time is given
pub fn update_status(
    user_id: &str,
    id: &str,
    status: DeviceStatus,
    last_seen: Option<&DateTime<Utc>>,
) -> String {
    let mut query = scoped_update(user_id, id);
    query.value(Devices::Status, status.as_str());
    if let Some(ts) = last_seen {
        query.value(Devices::LastSeen, format_timestamp(ts));
    }
    query.to_string(SqliteQueryBuilder)
}

/// DELETE FROM devices WHERE user_id = ? AND id = ?
pub fn delete(user_id: &str, id: &str) -> String {
    Query::delete()
        .from_table(Devices::Table)
        .and_where(Expr::col(Devices::UserId).eq(user_id))
        .and_where(Expr::col(Devices::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}
