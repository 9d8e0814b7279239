//! Device repository contract and implementations.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{NetblockError, Result};

/// Administrative status of a known device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceStatus {
    Online,
    Offline,
    Blocked,
    #[default]
    Unknown,
}

/// A device as persisted by the device store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub mac_address: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub status: DeviceStatus,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DeviceRecord {
    pub fn new(mac_address: impl Into<String>, ip_address: Option<&str>) -> Self {
        Self {
            mac_address: mac_address.into(),
            ip_address: ip_address.map(str::to_string),
            status: DeviceStatus::Unknown,
            is_blocked: false,
            name: None,
        }
    }

    /// A device flagged blocked by both status and flag.
    pub fn blocked(mac_address: impl Into<String>, ip_address: Option<&str>) -> Self {
        Self {
            status: DeviceStatus::Blocked,
            is_blocked: true,
            ..Self::new(mac_address, ip_address)
        }
    }

    /// Either marker counts: `status == Blocked` or `is_blocked`.
    pub fn is_marked_blocked(&self) -> bool {
        self.status == DeviceStatus::Blocked || self.is_blocked
    }
}

/// Source of persisted block decisions.
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// All devices currently marked blocked.
    async fn get_blocked_devices(&self) -> Result<Vec<DeviceRecord>>;
}

/// Repository backed by a JSON array of [`DeviceRecord`]s on disk.
#[derive(Debug, Clone)]
pub struct JsonDeviceRepository {
    path: PathBuf,
}

impl JsonDeviceRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every device in the file, blocked or not.
    pub async fn load_all(&self) -> Result<Vec<DeviceRecord>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            NetblockError::Repository(format!("Failed to read {}: {}", self.path.display(), e))
        })?;

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            NetblockError::Repository(format!("Failed to parse {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl DeviceRepository for JsonDeviceRepository {
    async fn get_blocked_devices(&self) -> Result<Vec<DeviceRecord>> {
        let devices = self.load_all().await?;
        Ok(devices.into_iter().filter(DeviceRecord::is_marked_blocked).collect())
    }
}

/// Repository holding devices in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct InMemoryDeviceRepository {
    devices: RwLock<Vec<DeviceRecord>>,
}

impl InMemoryDeviceRepository {
    pub fn new(devices: Vec<DeviceRecord>) -> Self {
        Self {
            devices: RwLock::new(devices),
        }
    }

    pub fn upsert(&self, device: DeviceRecord) {
        let mut devices = self.devices.write();
        match devices
            .iter_mut()
            .find(|d| d.mac_address.eq_ignore_ascii_case(&device.mac_address))
        {
            Some(existing) => *existing = device,
            None => devices.push(device),
        }
    }
}

#[async_trait]
impl DeviceRepository for InMemoryDeviceRepository {
    async fn get_blocked_devices(&self) -> Result<Vec<DeviceRecord>> {
        Ok(self
            .devices
            .read()
            .iter()
            .filter(|d| d.is_marked_blocked())
            .cloned()
            .collect())
    }
}
