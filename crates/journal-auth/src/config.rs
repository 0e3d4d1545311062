//! OAuth client settings: client id, redirect URI and where identities are
//! looked up.

use serde::{Deserialize, Serialize};

/// The only scope requested.
pub const OAUTH_SCOPE: &str = "atproto";

pub const CALLBACK_PATH: &str = "/auth/callback";
pub const CLIENT_METADATA_PATH: &str = "/client-metadata.json";

pub const DEFAULT_DEV_PORT: u16 = 4321;
pub const DEFAULT_PLC_DIRECTORY: &str = "https://plc.directory";
pub const DEFAULT_DOH_ENDPOINT: &str = "https://dns.google/resolve";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Loopback client (no published metadata) when true.
    pub dev: bool,
    /// Public origin in production, e.g. `https://journal.example`.
    pub origin: String,
    /// Port the loopback redirect points at in dev.
    pub dev_port: u16,
    /// Directory serving `did:plc` documents. The authorization server is
    /// found from the account's PDS, never configured.
    pub plc_directory: String,
    /// DNS-over-HTTPS JSON endpoint used to resolve handles.
    pub doh_endpoint: String,
    pub client_name: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            dev: true,
            origin: format!("http://127.0.0.1:{DEFAULT_DEV_PORT}"),
            dev_port: DEFAULT_DEV_PORT,
            plc_directory: DEFAULT_PLC_DIRECTORY.into(),
            doh_endpoint: DEFAULT_DOH_ENDPOINT.into(),
            client_name: "a7journal".into(),
        }
    }
}

impl OAuthConfig {
    pub fn redirect_uri(&self) -> String {
        if self.dev {
            format!("http://127.0.0.1:{}{CALLBACK_PATH}", self.dev_port)
        } else {
            format!("{}{CALLBACK_PATH}", self.origin.trim_end_matches('/'))
        }
    }

    /// Loopback clients encode their redirect and scope into the id itself;
    /// published clients point at their metadata document.
    pub fn client_id(&self) -> String {
        if self.dev {
            format!(
                "http://localhost?redirect_uri={}&scope={}",
                urlencoding::encode(&self.redirect_uri()),
                urlencoding::encode(OAUTH_SCOPE)
            )
        } else {
            format!("{}{CLIENT_METADATA_PATH}", self.origin.trim_end_matches('/'))
        }
    }

    /// Document served at `/client-metadata.json`.
    pub fn client_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "client_id": self.client_id(),
            "client_name": self.client_name,
            "client_uri": self.origin.trim_end_matches('/'),
            "redirect_uris": [self.redirect_uri()],
            "scope": OAUTH_SCOPE,
            "grant_types": ["authorization_code", "refresh_token"],
            "response_types": ["code"],
            "response_mode": "query",
            "token_endpoint_auth_method": "none",
            "application_type": "web",
            "dpop_bound_access_tokens": true,
        })
    }
}
