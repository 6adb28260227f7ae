//! Configuration for the directory store.

use std::time::Duration;

use mds_types::status_code::StatusCode;
use mds_types::{make_error_msg, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirStoreConfig {
    /// Upper bound on a single directory object read or write.
    #[serde(with = "duration_secs")]
    pub io_timeout: Duration,

    /// Largest directory object that will be encoded or decoded.
    pub max_object_size: usize,

    /// Run the cache maintenance hook after each successful population.
    pub trim_after_fetch: bool,
}

impl Default for DirStoreConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(30),
            max_object_size: 64 * 1024 * 1024,
            trim_after_fetch: true,
        }
    }
}

impl DirStoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.io_timeout.is_zero() {
            return make_error_msg(StatusCode::INVALID_CONFIG, "io_timeout must be positive");
        }
        // Room for at least the entry count.
        if self.max_object_size < 4 {
            return make_error_msg(
                StatusCode::INVALID_CONFIG,
                format!("max_object_size {} is below 4 bytes", self.max_object_size),
            );
        }
        Ok(())
    }
}

/// Durations as fractional seconds, so `io_timeout = 2.5` works in TOML.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
