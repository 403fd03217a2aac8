use sea_query::{Expr, Query, SqliteQueryBuilder};

use crate::schema::DownloadTokens;

/// INSERT INTO download_tokens (token, file_path, expires_at_ms) VALUES (?, ?, ?)
pub fn insert(token: &str, file_path: &str, expires_at_ms: i64) -> String {
    Query::insert()
        .into_table(DownloadTokens::Table)
        .columns([
            DownloadTokens::Token,
            DownloadTokens::FilePath,
            DownloadTokens::ExpiresAtMs,
        ])
        .values_panic([token.into(), file_path.into(), expires_at_ms.into()])
        .to_string(SqliteQueryBuilder)
}

/// SELECT file_path FROM download_tokens WHERE token = ? AND expires_at_ms > ?
pub fn select_valid(token: &str, now_ms: i64) -> String {
    Query::select()
        .column(DownloadTokens::FilePath)
        .from(DownloadTokens::Table)
        .and_where(Expr::col(DownloadTokens::Token).eq(token))
        .and_where(Expr::col(DownloadTokens::ExpiresAtMs).gt(now_ms))
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM download_tokens WHERE expires_at_ms <= ?
pub fn delete_expired(now_ms: i64) -> String {
    Query::delete()
        .from_table(DownloadTokens::Table)
        .and_where(Expr::col(DownloadTokens::ExpiresAtMs).lte(now_ms))
        .to_string(SqliteQueryBuilder)
}
