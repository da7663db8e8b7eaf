use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::scan::CodePolicy;

pub const API_BASE_ENV: &str = "KIOSK_API_BASE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub api_base: String,
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8000".into(),
            request_timeout_ms: 5_000,
        }
    }
}

impl BackendConfig {
    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    pub interval_ms: u64,
    /// Minimum box area over frame area for a subject to count as close.
    pub area_threshold: f64,
    /// Consecutive close ticks required before presence is confirmed.
    pub confirm_ticks: u32,
    pub detect_timeout_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            interval_ms: 200,
            area_threshold: 0.06,
            confirm_ticks: 1,
            detect_timeout_ms: 1_000,
        }
    }
}

impl DetectionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    pub dedupe_window_ms: u64,
    pub single_fire: bool,
    pub policy: CodePolicy,
    pub preferred_camera_pattern: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            dedupe_window_ms: 1_500,
            single_fire: true,
            policy: CodePolicy::default(),
            preferred_camera_pattern: "(?i)back|rear".into(),
        }
    }
}

impl ScanConfig {
    pub fn dedupe_window(&self) -> Duration {
        Duration::from_millis(self.dedupe_window_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlowConfig {
    pub presence_redirect_ms: u64,
    pub scan_redirect_ms: u64,
    pub submit_redirect_ms: u64,
    pub thank_you_ms: u64,
    pub station: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            presence_redirect_ms: 3_000,
            scan_redirect_ms: 1_500,
            submit_redirect_ms: 800,
            thank_you_ms: 5_000,
            station: "Register".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelConfig {
    pub path: String,
    pub reconnect_min_ms: u64,
    pub reconnect_max_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            path: "/ws/events".into(),
            reconnect_min_ms: 500,
            reconnect_max_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KioskConfig {
    pub backend: BackendConfig,
    pub detection: DetectionConfig,
    pub scan: ScanConfig,
    pub flow: FlowConfig,
    pub channel: ChannelConfig,
}

impl KioskConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(base) = std::env::var(API_BASE_ENV) {
            if !base.trim().is_empty() {
                self.backend.api_base = base.trim().to_string();
            }
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<KioskConfig>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable config {}: {err}", path.display());
                KioskConfig::default()
            })
        } else {
            KioskConfig::default()
        };
        data.apply_env_overrides();

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn snapshot(&self) -> KioskConfig {
        self.read().clone()
    }

    pub fn update<F>(&self, apply: F) -> Result<KioskConfig>
    where
        F: FnOnce(&mut KioskConfig),
    {
        let mut guard = self.write();
        apply(&mut guard);
        self.persist(&guard)?;
        Ok(guard.clone())
    }

    fn persist(&self, data: &KioskConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, KioskConfig> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, KioskConfig> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
