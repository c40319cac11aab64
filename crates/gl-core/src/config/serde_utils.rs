//! Shared serialization/deserialization utilities for configuration
//!
//! Durations are written as plain integers, which reads better in TOML
//! than serde's default `{ secs, nanos }` table.

/// Helper module for Duration serialization as seconds
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a Duration as seconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    /// Deserialize a Duration from seconds (u64)
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Helper module for Duration serialization as milliseconds
pub mod duration_millis {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Optional Duration as seconds; `0` reads back as `None`
pub mod option_duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.map(|d| d.as_secs()).unwrap_or(0))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok((secs > 0).then(|| Duration::from_secs(secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        #[serde(with = "duration_secs")]
        timeout: Duration,
        #[serde(with = "duration_millis")]
        delay: Duration,
        #[serde(with = "option_duration_secs")]
        deadline: Option<Duration>,
    }

    #[test]
    fn test_durations_serialize_as_integers() {
        let config = TestConfig {
            timeout: Duration::from_secs(30),
            delay: Duration::from_millis(1500),
            deadline: None,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"timeout":30,"delay":1500,"deadline":0}"#);
    }

    #[test]
    fn test_durations_deserialize() {
        let json = r#"{"timeout":60,"delay":20,"deadline":90}"#;
        let config: TestConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.delay, Duration::from_millis(20));
        assert_eq!(config.deadline, Some(Duration::from_secs(90)));
    }
}
