use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;

use crate::constants::EXPECTED_DB_VERSION;
use crate::error::DynError;
use crate::queries::{ddl, metadata};

/// Open a file-based database pool for production use
/// Enables WAL mode and foreign keys, creating the file if needed
pub async fn open_database(db_path: &Path) -> Result<SqlitePool, DynError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            format!("Failed to create database directory '{}': {}", parent.display(), e)
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    log::info!("SQLite database: {}", db_path.display());
    Ok(pool)
}

/// Create tables and indexes, then stamp or verify the schema version
pub async fn init_database_schema(pool: &SqlitePool) -> Result<(), DynError> {
    for statement in ddl::all_statements() {
        sqlx::query(&statement).execute(pool).await?;
    }

    match query_metadata(pool, "version").await? {
        Some(version) if version != EXPECTED_DB_VERSION => {
            return Err(format!(
                "Unsupported database version: '{}'. This application only supports version '{}'",
                version, EXPECTED_DB_VERSION
            )
            .into());
        }
        Some(_) => {}
        None => {
            sqlx::query(&metadata::insert("version", EXPECTED_DB_VERSION))
                .execute(pool)
                .await?;
        }
    }

    Ok(())
}

/// Open the database and make sure its schema is current
pub async fn open_and_init(db_path: &Path) -> Result<SqlitePool, DynError> {
    let pool = open_database(db_path).await?;
    init_database_schema(&pool).await?;
    Ok(pool)
}

/// Query a single metadata value by key
pub async fn query_metadata(pool: &SqlitePool, key: &str) -> Result<Option<String>, DynError> {
    let sql = metadata::select_by_key(key);
    let row = sqlx::query(&sql).fetch_optional(pool).await?;
    Ok(row.map(|row| row.get::<String, _>(0)))
}

/// Update or insert a metadata key-value pair
pub async fn upsert_metadata(pool: &SqlitePool, key: &str, value: &str) -> Result<(), DynError> {
    let sql = metadata::upsert(key, value);
    sqlx::query(&sql).execute(pool).await?;
    Ok(())
}

/// Create a database in a temporary directory for tests
/// Keep the returned guard alive for as long as the pool is used
pub async fn create_test_connection_in_temporary_file(
) -> Result<(SqlitePool, tempfile::TempDir), DynError> {
    let dir = tempfile::tempdir()?;
    let pool = open_database(&dir.path().join("test.sqlite")).await?;
    Ok((pool, dir))
}
