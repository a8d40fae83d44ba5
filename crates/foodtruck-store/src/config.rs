//! Connection settings for the document database.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DATABASE: &str = "foodtruckapi";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5984;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Where the database lives and how to authenticate against it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub database_name: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upper bound for a single store call.
    #[serde(with = "secs")]
    pub request_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_name: DEFAULT_DATABASE.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl DatabaseConfig {
    /// TLS is used whenever the host is anything but the local default.
    pub fn secured(&self) -> bool {
        self.host != DEFAULT_HOST
    }

    pub fn scheme(&self) -> &'static str {
        if self.secured() { "https" } else { "http" }
    }

    /// Server root, e.g. `http://localhost:5984/`.
    pub fn server_url(&self) -> String {
        format!("{}://{}:{}/", self.scheme(), self.host, self.port)
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_couch() {
        let config = DatabaseConfig::default();
        assert_eq!(config.database_name, "foodtruckapi");
        assert_eq!(config.server_url(), "http://localhost:5984/");
        assert!(config.username.is_none());
        assert!(!config.secured());
    }

    #[test]
    fn remote_host_is_secured() {
        let config = DatabaseConfig {
            host: "db.example.com".to_string(),
            port: 443,
            ..Default::default()
        };
        assert!(config.secured());
        assert_eq!(config.server_url(), "https://db.example.com:443/");
    }

    #[test]
    fn loopback_address_still_counts_as_remote() {
        // Only the literal default host disables TLS.
        let config = DatabaseConfig {
            host: "127.0.0.1".to_string(),
            ..Default::default()
        };
        assert!(config.secured());
    }

    #[test]
    fn timeout_serializes_as_seconds() {
        let json = serde_json::to_value(DatabaseConfig::default()).unwrap();
        assert_eq!(json["request_timeout"], 10);
    }
}
