//! Server configuration.

use journal_auth::OAuthConfig;
use serde::{Deserialize, Serialize};

/// Configuration for the journal HTTP server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `4321`, `0` picks a free one).
    pub port: u16,
    /// Requests running longer than this are answered with 408.
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight requests.
    pub shutdown_timeout_secs: u64,
    pub oauth: OAuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: journal_auth::config::DEFAULT_DEV_PORT,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 10,
            oauth: OAuthConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
