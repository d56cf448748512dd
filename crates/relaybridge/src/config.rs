use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_ECHO_TTL_MS: u64 = 30_000;
pub const DEFAULT_DELETED_WINDOW_MS: u64 = 120_000;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 8_000_000;
pub const DEFAULT_EDIT_PREFIX: &str = "**EDIT:** ";

/// Tunables for the dedup and send-lock machinery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// How long a send may hold a conversation before the next sender takes over.
    pub lock_timeout_ms: u64,
    /// How long a registered outgoing fingerprint waits for its echo.
    pub echo_ttl_ms: u64,
    /// How long a remote delete issued by us is remembered.
    pub deleted_window_ms: u64,
    /// Files at or above this size are sent as links instead of attachments.
    pub max_upload_bytes: u64,
    /// Prepended to relayed edits that cannot replace the original message.
    pub edit_prefix: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            echo_ttl_ms: DEFAULT_ECHO_TTL_MS,
            deleted_window_ms: DEFAULT_DELETED_WINDOW_MS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            edit_prefix: DEFAULT_EDIT_PREFIX.to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn echo_ttl(&self) -> Duration {
        Duration::from_millis(self.echo_ttl_ms)
    }

    pub fn deleted_window(&self) -> Duration {
        Duration::from_millis(self.deleted_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: BridgeConfig = serde_json::from_str(r#"{"lockTimeoutMs": 500}"#).unwrap();
        assert_eq!(config.lock_timeout(), Duration::from_millis(500));
        assert_eq!(config.echo_ttl_ms, DEFAULT_ECHO_TTL_MS);
        assert_eq!(config.edit_prefix, DEFAULT_EDIT_PREFIX);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(BridgeConfig::default()).unwrap();
        assert_eq!(json["deletedWindowMs"], 120_000);
        assert_eq!(json["maxUploadBytes"], 8_000_000);
    }
}
