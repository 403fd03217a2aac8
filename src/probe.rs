//! Connectivity classification: reachability probing plus the platform's network facts

use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::ConnectionStatus;

/// Link type reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    Wifi,
    Cellular,
    Bluetooth,
    Ethernet,
    Other,
}

impl NetworkType {
    /// (wifi, mobile_data) flags for this link type
    pub fn classify(self) -> (bool, bool) {
        match self {
            NetworkType::Wifi => (true, false),
            NetworkType::Cellular | NetworkType::Bluetooth | NetworkType::Ethernet => (false, true),
            NetworkType::Other => (false, false),
        }
    }
}

/// Short-timeout request used to tell real internet access from a merely "up" link
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// True only when some endpoint answered in time; failures are never surfaced
    async fn probe(&self) -> bool;
}

/// What the platform itself claims about the network
pub trait NetworkInfo: Send + Sync {
    fn platform_online(&self) -> io::Result<bool>;
    /// `None` when the link type cannot be determined
    fn network_type(&self) -> io::Result<Option<NetworkType>>;
}

/// HEAD requests against a list of URLs, in order, first answer wins
pub struct HttpProbe {
    client: reqwest::Client,
    urls: Vec<String>,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(urls: Vec<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            urls,
            timeout,
        }
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self) -> bool {
        for url in &self.urls {
            let request = self
                .client
                .head(url)
                .header(reqwest::header::CACHE_CONTROL, "no-cache")
                .timeout(self.timeout);
            match request.send().await {
                // Any HTTP answer proves the endpoint is reachable
                Ok(_) => return true,
                Err(e) => log::debug!("Connectivity probe failed for {}: {}", url, e),
            }
        }
        false
    }
}

/// Reads interface state from sysfs (`/sys/class/net`)
pub struct SystemNetworkInfo {
    root: PathBuf,
}

impl SystemNetworkInfo {
    pub fn new() -> Self {
        Self::with_root("/sys/class/net")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Names of non-loopback interfaces whose operstate is "up", sorted
    fn up_interfaces(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == "lo" {
                continue;
            }
            let operstate = fs::read_to_string(entry.path().join("operstate")).unwrap_or_default();
            if operstate.trim() == "up" {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn interface_type(&self, name: &str) -> NetworkType {
        let dir = self.root.join(name);
        if dir.join("wireless").is_dir() || dir.join("phy80211").is_dir() {
            NetworkType::Wifi
        } else if name.starts_with("wwan") || name.starts_with("rmnet") {
            NetworkType::Cellular
        } else if name.starts_with("bnep") {
            NetworkType::Bluetooth
        } else if name.starts_with("en") || name.starts_with("eth") {
            NetworkType::Ethernet
        } else {
            NetworkType::Other
        }
    }
}

impl Default for SystemNetworkInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkInfo for SystemNetworkInfo {
    fn platform_online(&self) -> io::Result<bool> {
        Ok(!self.up_interfaces()?.is_empty())
    }

    fn network_type(&self) -> io::Result<Option<NetworkType>> {
        let up = self.up_interfaces()?;
        // Prefer a wifi link when several are up
        let types: Vec<NetworkType> = up.iter().map(|name| self.interface_type(name)).collect();
        if types.contains(&NetworkType::Wifi) {
            return Ok(Some(NetworkType::Wifi));
        }
        Ok(types.into_iter().next())
    }
}

/// Classify connectivity. Never fails: a platform query error yields
/// [`ConnectionStatus::check_failed`], which counts as lost connectivity.
pub async fn check_connection_status(
    probe: &dyn ReachabilityProbe,
    net: &dyn NetworkInfo,
) -> ConnectionStatus {
    let platform_online = match net.platform_online() {
        Ok(online) => online,
        Err(e) => {
            log::warn!("Could not read platform online state: {}", e);
            return ConnectionStatus::check_failed();
        }
    };

    let has_internet = probe.probe().await;

    let (mut wifi, mut mobile_data) = match net.network_type() {
        Ok(Some(network_type)) => network_type.classify(),
        Ok(None) => (false, false),
        Err(e) => {
            log::warn!("Could not read network type: {}", e);
            return ConnectionStatus::check_failed();
        }
    };

    // Unknown link type: reachable means wifi, unreachable means neither
    if !wifi && !mobile_data {
        wifi = has_internet;
        mobile_data = false;
    }

    // A platform that claims to be online while nothing answers is treated the
    // same as one that reports itself offline
    let status = ConnectionStatus {
        wifi,
        mobile_data,
        airplane_mode: !platform_online || !has_internet,
        has_internet,
    };
    log::debug!("Connection status: {:?}", status);
    status
}
