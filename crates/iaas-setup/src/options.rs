//! Retry and timing policy for resource setup

use crate::error::{IaasError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_DELETE_RETRY_COUNT: u32 = 10;
pub const DEFAULT_DELETE_RETRY_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_PROVISIONING_RETRY_COUNT: u32 = 10;
pub const DEFAULT_PROVISIONING_RETRY_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(20 * 60);
pub const DEFAULT_NIC_UPDATE_WAIT: Duration = Duration::from_secs(5);

const ENV_PREFIX: &str = "SAKURACLOUD_SETUP_";

/// Options for `RetryableSetup` and the builders driving it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupOptions {
    /// Number of re-creations after a copy failure (total attempts = retry_count + 1)
    pub retry_count: u32,

    /// Interval between state polls
    #[serde(with = "duration_ms", rename = "polling_interval_ms")]
    pub polling_interval: Duration,

    /// Upper bound for a single wait phase
    #[serde(with = "duration_ms", rename = "poll_timeout_ms")]
    pub poll_timeout: Duration,

    /// Delete attempts for a resource that failed to copy
    pub delete_retry_count: u32,

    #[serde(with = "duration_ms", rename = "delete_retry_interval_ms")]
    pub delete_retry_interval: Duration,

    /// Attempts of the provision-before-up hook
    pub provisioning_retry_count: u32,

    #[serde(with = "duration_ms", rename = "provisioning_retry_interval_ms")]
    pub provisioning_retry_interval: Duration,

    /// Pause after connecting or disconnecting NICs before further configuration
    #[serde(with = "duration_ms", rename = "nic_update_wait_ms")]
    pub nic_update_wait_duration: Duration,

    /// Boot the resource once it has been built (appliances created powered off)
    pub boot_after_build: bool,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            delete_retry_count: DEFAULT_DELETE_RETRY_COUNT,
            delete_retry_interval: DEFAULT_DELETE_RETRY_INTERVAL,
            provisioning_retry_count: DEFAULT_PROVISIONING_RETRY_COUNT,
            provisioning_retry_interval: DEFAULT_PROVISIONING_RETRY_INTERVAL,
            nic_update_wait_duration: DEFAULT_NIC_UPDATE_WAIT,
            boot_after_build: false,
        }
    }
}

impl SetupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `SAKURACLOUD_SETUP_*` environment variables.
    ///
    /// Recognised: `RETRY_COUNT`, `POLLING_INTERVAL_MS`, `POLL_TIMEOUT_MS`,
    /// `DELETE_RETRY_COUNT`, `DELETE_RETRY_INTERVAL_MS`,
    /// `PROVISIONING_RETRY_COUNT`, `PROVISIONING_RETRY_INTERVAL_MS`,
    /// `NIC_UPDATE_WAIT_MS`, `BOOT_AFTER_BUILD`. Zero or missing values keep
    /// the default.
    pub fn from_env() -> Result<Self> {
        let mut options = Self::default();

        if let Some(v) = env_u32("RETRY_COUNT")? {
            options.retry_count = v;
        }
        if let Some(v) = env_u64("POLLING_INTERVAL_MS")? {
            options.polling_interval = Duration::from_millis(v);
        }
        if let Some(v) = env_u64("POLL_TIMEOUT_MS")? {
            options.poll_timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_u32("DELETE_RETRY_COUNT")? {
            options.delete_retry_count = v;
        }
        if let Some(v) = env_u64("DELETE_RETRY_INTERVAL_MS")? {
            options.delete_retry_interval = Duration::from_millis(v);
        }
        if let Some(v) = env_u32("PROVISIONING_RETRY_COUNT")? {
            options.provisioning_retry_count = v;
        }
        if let Some(v) = env_u64("PROVISIONING_RETRY_INTERVAL_MS")? {
            options.provisioning_retry_interval = Duration::from_millis(v);
        }
        if let Some(v) = env_u64("NIC_UPDATE_WAIT_MS")? {
            options.nic_update_wait_duration = Duration::from_millis(v);
        }
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}BOOT_AFTER_BUILD")) {
            options.boot_after_build = matches!(v.as_str(), "1" | "true" | "yes");
        }

        tracing::debug!("Loaded setup options from environment: {:?}", options);
        Ok(options)
    }

    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_delete_retry(mut self, count: u32, interval: Duration) -> Self {
        self.delete_retry_count = count;
        self.delete_retry_interval = interval;
        self
    }

    pub fn with_provisioning_retry(mut self, count: u32, interval: Duration) -> Self {
        self.provisioning_retry_count = count;
        self.provisioning_retry_interval = interval;
        self
    }

    pub fn with_nic_update_wait(mut self, wait: Duration) -> Self {
        self.nic_update_wait_duration = wait;
        self
    }

    pub fn with_boot_after_build(mut self, boot: bool) -> Self {
        self.boot_after_build = boot;
        self
    }

    /// Total number of create attempts
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    let key = format!("{ENV_PREFIX}{name}");
    match std::env::var(&key) {
        Ok(raw) => {
            let value = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| IaasError::InvalidConfig(format!("{key}={raw}: {e}")))?;
            Ok((value > 0).then_some(value))
        }
        Err(_) => Ok(None),
    }
}

fn env_u32(name: &str) -> Result<Option<u32>> {
    env_u64(name)?
        .map(|v| {
            u32::try_from(v).map_err(|_| {
                IaasError::InvalidConfig(format!("{ENV_PREFIX}{name}={v}: out of range"))
            })
        })
        .transpose()
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
