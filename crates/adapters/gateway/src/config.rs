//! Gateway connection configuration.

use std::time::Duration;

use serde::Deserialize;

/// Where the gateway lives and how to authenticate with it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the gateway, e.g. `http://gateway.local`.
    pub host: String,
    /// Bearer token issued by the gateway.
    pub auth_token: String,
    /// Per-request timeout of discovery calls.
    pub seconds_for_timeout: u64,
}

impl GatewayConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.seconds_for_timeout)
    }

    /// URL listing every Thing.
    #[must_use]
    pub fn things_url(&self) -> String {
        format!("{}/things", self.host.trim_end_matches('/'))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "http://gateway.local".to_string(),
            auth_token: String::new(),
            seconds_for_timeout: 10,
        }
    }
}
