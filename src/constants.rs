use rand::Rng;

/// Expected database schema version
/// All databases must use this version for compatibility
pub const EXPECTED_DB_VERSION: &str = "1";

/// Duration recorded for an automatically triggered panic recording (60 minutes)
pub const PANIC_RECORDING_DURATION_SECS: u64 = 3600;

/// Default interval between connectivity checks while monitoring
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;

/// Default abort timeout for a single reachability request
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2000;

/// Default lifetime of a generated download URL
pub const DEFAULT_DOWNLOAD_URL_TTL_SECS: i64 = 3600;

/// Id of the placeholder device used when no registered device can be resolved
pub const LOCAL_DEVICE_ID: &str = "local-device";

/// Device id used by the capture orchestrator when the registry returns no devices
pub const DEFAULT_DEVICE_ID: &str = "default-device";

/// Reachability targets, tried in order until one answers
pub const DEFAULT_PROBE_URLS: [&str; 3] = [
    "https://www.google.com/favicon.ico",
    "https://www.cloudflare.com/favicon.ico",
    "https://httpbin.org/status/200",
];

/// Generate a short random alphanumeric identifier with the given prefix
/// Used for download tokens and for objects that never reach the database
pub fn generate_local_id(prefix: &str) -> String {
    format!(
        "{}_{}",
        prefix,
        rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(12)
            .map(char::from)
            .collect::<String>()
    )
}

/// Generate a random lowercase suffix for object names
pub fn generate_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(len)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}
