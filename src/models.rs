//! Domain rows and value types shared by the stores, the monitor and the orchestrator

use bytes::Bytes;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Phone,
    Pc,
    Tablet,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Phone => "phone",
            DeviceType::Pc => "pc",
            DeviceType::Tablet => "tablet",
        }
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "phone" => Ok(DeviceType::Phone),
            "pc" => Ok(DeviceType::Pc),
            "tablet" => Ok(DeviceType::Tablet),
            other => Err(format!("Unknown device type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
        }
    }
}

impl FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(DeviceStatus::Online),
            "offline" => Ok(DeviceStatus::Offline),
            other => Err(format!("Unknown device status '{}'", other)),
        }
    }
}

/// A registered endpoint that recordings are attributed to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub is_third_party: bool,
    pub third_party_email: Option<String>,
    pub records_password: Option<String>,
    /// Maximum recording length in minutes
    pub recording_time_limit: Option<i64>,
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// Placeholder used when the registry is empty or unreachable, never persisted
    pub fn local_placeholder(user_id: &str) -> Self {
        Self {
            id: crate::constants::LOCAL_DEVICE_ID.to_string(),
            user_id: user_id.to_string(),
            name: "This device".to_string(),
            device_type: DeviceType::Phone,
            is_third_party: false,
            third_party_email: None,
            records_password: None,
            recording_time_limit: None,
            status: DeviceStatus::Online,
            last_seen: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDevice {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    #[serde(default)]
    pub is_third_party: bool,
    pub third_party_email: Option<String>,
    pub records_password: Option<String>,
    pub recording_time_limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevicePatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub device_type: Option<DeviceType>,
    pub is_third_party: Option<bool>,
    pub third_party_email: Option<String>,
    pub records_password: Option<String>,
    pub recording_time_limit: Option<i64>,
}

impl DevicePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.device_type.is_none()
            && self.is_third_party.is_none()
            && self.third_party_email.is_none()
            && self.records_password.is_none()
            && self.recording_time_limit.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingType {
    Video,
    Audio,
    Location,
    Panic,
}

impl RecordingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingType::Video => "video",
            RecordingType::Audio => "audio",
            RecordingType::Location => "location",
            RecordingType::Panic => "panic",
        }
    }

    /// Prefix used when naming stored objects
    pub fn label(&self) -> &'static str {
        match self {
            RecordingType::Video => "Video",
            RecordingType::Audio => "Audio",
            RecordingType::Location => "Location",
            RecordingType::Panic => "Panic",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            RecordingType::Location => "json",
            _ => "webm",
        }
    }
}

impl FromStr for RecordingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(RecordingType::Video),
            "audio" => Ok(RecordingType::Audio),
            "location" => Ok(RecordingType::Location),
            "panic" => Ok(RecordingType::Panic),
            other => Err(format!("Unknown recording type '{}'", other)),
        }
    }
}

/// A persisted evidence record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub device_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub recording_type: RecordingType,
    pub file_path: Option<String>,
    pub location_data: Option<serde_json::Value>,
    /// Seconds
    pub duration: Option<i64>,
    /// Bytes
    pub size: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub is_downloaded: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRecording {
    pub device_id: String,
    #[serde(rename = "type")]
    pub recording_type: RecordingType,
    pub location_data: Option<serde_json::Value>,
    pub duration: Option<i64>,
    pub size: Option<i64>,
}

impl NewRecording {
    pub fn new(device_id: impl Into<String>, recording_type: RecordingType) -> Self {
        Self {
            device_id: device_id.into(),
            recording_type,
            location_data: None,
            duration: None,
            size: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordingPatch {
    pub file_path: Option<String>,
    pub location_data: Option<serde_json::Value>,
    pub duration: Option<i64>,
    pub size: Option<i64>,
    pub is_downloaded: Option<bool>,
}

impl RecordingPatch {
    pub fn is_empty(&self) -> bool {
        self.file_path.is_none()
            && self.location_data.is_none()
            && self.duration.is_none()
            && self.size.is_none()
            && self.is_downloaded.is_none()
    }
}

/// Binary payload handed to the recording store for upload
#[derive(Debug, Clone)]
pub struct Blob {
    pub data: Bytes,
    pub content_type: String,
}

impl Blob {
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    FreeTrial,
    Monthly,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::FreeTrial => "free_trial",
            PlanType::Monthly => "monthly",
        }
    }
}

impl FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free_trial" => Ok(PlanType::FreeTrial),
            "monthly" => Ok(PlanType::Monthly),
            other => Err(format!("Unknown plan type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "expired" => Ok(SubscriptionStatus::Expired),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            other => Err(format!("Unknown subscription status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan_type: PlanType,
    pub status: SubscriptionStatus,
    pub started_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of network reachability, recomputed on every monitor tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub wifi: bool,
    pub mobile_data: bool,
    /// Set when the platform reports itself offline or no endpoint answered; no radio state is observed
    pub airplane_mode: bool,
    /// Only true after a reachability request succeeded within its timeout
    pub has_internet: bool,
}

impl ConnectionStatus {
    /// Optimistic status assumed before the first check completes
    pub fn assumed_online() -> Self {
        Self {
            wifi: true,
            mobile_data: true,
            airplane_mode: false,
            has_internet: true,
        }
    }

    /// Synthetic status applied when the platform raises an offline event
    pub fn offline() -> Self {
        Self {
            wifi: false,
            mobile_data: false,
            airplane_mode: true,
            has_internet: false,
        }
    }

    /// Status returned when a check could not be completed. Everything is
    /// false, so an unreadable platform state counts as lost connectivity.
    pub fn check_failed() -> Self {
        Self {
            wifi: false,
            mobile_data: false,
            airplane_mode: false,
            has_internet: false,
        }
    }

    /// The panic trigger condition
    pub fn is_connectivity_lost(&self) -> bool {
        self.airplane_mode || (!self.wifi && !self.mobile_data && !self.has_internet)
    }
}
