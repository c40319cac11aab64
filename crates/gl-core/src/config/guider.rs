//! Guider connection and profile file configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs, option_duration_secs};

/// How to reach the guider's event server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiderConfig {
    /// Host running the guider
    pub host: String,

    /// Port of instance 1
    pub base_port: u16,

    /// Guider instance number (1-based)
    pub instance: u16,

    /// Timeout for a single connect attempt
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Timeout for a single request/response exchange
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Upper bound for a whole connect sequence, retries included
    #[serde(with = "option_duration_secs", skip_serializing_if = "Option::is_none")]
    pub connect_deadline: Option<Duration>,

    /// Retry budget for connecting
    pub retry: RetryConfig,
}

impl Default for GuiderConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            base_port: gl_protocol::BASE_PORT,
            instance: 1,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            connect_deadline: Some(Duration::from_secs(60)),
            retry: RetryConfig::default(),
        }
    }
}

impl GuiderConfig {
    /// Port of the configured instance
    pub fn port(&self) -> u16 {
        self.base_port
            .saturating_add(self.instance.max(1))
            .saturating_sub(1)
    }

    /// `host:port` of the configured instance
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port())
    }
}

/// Linear retry budget: attempt `n` that fails sleeps `delay * n`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Base delay between attempts
    #[serde(with = "duration_millis", rename = "delay_ms")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Location of the guider's profile file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub path: PathBuf,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            path: dirs::home_dir().unwrap_or_default().join(".PHDGuidingV2"),
        }
    }
}
