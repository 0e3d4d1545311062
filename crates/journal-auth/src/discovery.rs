//! Finding an account's authorization server: DID document → PDS →
//! protected-resource metadata → authorization server metadata.

use journal_core::AccountDid;
use serde::Deserialize;

use crate::error::AuthError;

pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";
pub const AUTH_SERVER_METADATA_PATH: &str = "/.well-known/oauth-authorization-server";

const PDS_SERVICE_SUFFIX: &str = "#atproto_pds";

#[derive(Debug, Deserialize)]
pub struct DidDocument {
    pub id: String,
    #[serde(default)]
    pub service: Vec<DidService>,
}

#[derive(Debug, Deserialize)]
pub struct DidService {
    pub id: String,
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ProtectedResourceMetadata {
    #[serde(default)]
    pub authorization_servers: Vec<String>,
}

/// RFC 8414 authorization server metadata, the fields used here.
#[derive(Clone, Debug, Deserialize)]
pub struct AuthServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
    #[serde(default)]
    pub pushed_authorization_request_endpoint: Option<String>,
    #[serde(default)]
    pub require_pushed_authorization_requests: bool,
}

/// Where the DID document lives. `did:plc` goes to the directory;
/// `did:web` is only supported at the host level, as AT Protocol requires.
pub fn did_document_url(did: &AccountDid, plc_directory: &str) -> Result<String, AuthError> {
    let raw = did.as_str();
    if raw.starts_with("did:plc:") {
        return Ok(format!("{}/{raw}", plc_directory.trim_end_matches('/')));
    }
    if let Some(host) = raw.strip_prefix("did:web:") {
        if host.is_empty() || host.contains(':') || host.contains('/') {
            return Err(AuthError::Discovery(format!("unsupported did:web form: {raw}")));
        }
        let host = host.replace("%3A", ":").replace("%3a", ":");
        return Ok(format!("https://{host}/.well-known/did.json"));
    }
    Err(AuthError::Discovery(format!("unsupported DID method: {raw}")))
}

/// PDS endpoint from a DID document that describes `did`.
pub fn pds_endpoint(doc: &DidDocument, did: &AccountDid) -> Result<String, AuthError> {
    if doc.id != did.as_str() {
        return Err(AuthError::Discovery(format!(
            "DID document is for {}, not {did}",
            doc.id
        )));
    }
    doc.service
        .iter()
        .filter(|s| s.id.ends_with(PDS_SERVICE_SUFFIX))
        .find_map(|s| s.service_endpoint.as_str())
        .filter(|url| url.starts_with("https://") || url.starts_with("http://"))
        .map(|url| url.trim_end_matches('/').to_owned())
        .ok_or_else(|| AuthError::Discovery(format!("no PDS in DID document for {did}")))
}

pub fn authorization_server(meta: &ProtectedResourceMetadata) -> Result<String, AuthError> {
    meta.authorization_servers
        .first()
        .map(|s| s.trim_end_matches('/').to_owned())
        .ok_or_else(|| AuthError::Discovery("PDS names no authorization server".into()))
}

/// The metadata must describe the issuer it was fetched for.
pub fn check_metadata_issuer(meta: &AuthServerMetadata, issuer: &str) -> Result<(), AuthError> {
    if meta.issuer.trim_end_matches('/') == issuer.trim_end_matches('/') {
        Ok(())
    } else {
        Err(AuthError::IssuerMismatch {
            expected: issuer.to_owned(),
            actual: meta.issuer.clone(),
        })
    }
}
