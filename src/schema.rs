use sea_query::Iden;

/// Metadata table - key-value store for database configuration
#[derive(Iden)]
pub enum Metadata {
    Table,
    Key,
    Value,
}

/// Devices table - registered endpoints owned by a user
#[derive(Iden)]
pub enum Devices {
    Table,
    Id,
    UserId,
    Name,
    Type,
    IsThirdParty,
    ThirdPartyEmail,
    RecordsPassword,
    RecordingTimeLimit,
    Status,
    LastSeen,
    CreatedAt,
}

/// Recordings table - evidence artifacts tied to a device
#[derive(Iden)]
pub enum Recordings {
    Table,
    Id,
    DeviceId,
    UserId,
    Type,
    FilePath,
    LocationData,
    Duration,
    Size,
    CreatedAt,
    IsDownloaded,
}

/// Subscriptions table - one plan row per user
#[derive(Iden)]
pub enum Subscriptions {
    Table,
    Id,
    UserId,
    PlanType,
    Status,
    StartedAt,
    ExpiresAt,
    CreatedAt,
}

/// Download tokens - time-limited handles onto stored objects
#[derive(Iden)]
pub enum DownloadTokens {
    Table,
    Token,
    FilePath,
    ExpiresAtMs,
}
