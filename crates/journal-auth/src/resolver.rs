//! Handle → DID resolution. The `_atproto` DNS TXT record is queried over
//! DNS-over-HTTPS first; when it yields nothing the handle's own
//! `https://<handle>/.well-known/atproto-did` document is read instead.

use async_trait::async_trait;
use journal_core::AccountDid;
use serde::Deserialize;
use tracing::debug;

use crate::error::AuthError;

#[async_trait]
pub trait HandleResolver: Send + Sync {
    async fn resolve(&self, handle: &str) -> Result<AccountDid, AuthError>;
}

/// Normalize user input: trim, drop a leading `@`, lowercase.
pub fn normalize_handle(input: &str) -> Result<String, AuthError> {
    let handle = input.trim().trim_start_matches('@').to_ascii_lowercase();
    let valid = handle.contains('.')
        && !handle.starts_with('.')
        && !handle.ends_with('.')
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if valid {
        Ok(handle)
    } else {
        Err(AuthError::InvalidHandle(input.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

const TXT_RECORD: u16 = 16;

/// Input that is already a DID skips DNS entirely.
fn did_passthrough(input: &str) -> Option<AccountDid> {
    let input = input.trim();
    input.starts_with("did:").then(|| AccountDid::from_raw(input))
}

/// Pick the DID out of a DoH JSON answer. Exactly one distinct `did=`
/// TXT value is required; several conflicting ones resolve to nothing.
fn did_from_answer(body: &DohResponse) -> Option<AccountDid> {
    if body.status != 0 {
        return None;
    }
    let mut dids: Vec<&str> = body
        .answer
        .iter()
        .filter(|a| a.record_type == TXT_RECORD)
        .filter_map(|a| a.data.trim_matches('"').strip_prefix("did="))
        .collect();
    dids.sort_unstable();
    dids.dedup();
    match dids.as_slice() {
        [did] if did.starts_with("did:") => Some(AccountDid::from_raw(*did)),
        _ => None,
    }
}

/// Body of `/.well-known/atproto-did`: the DID as plain text.
fn did_from_well_known(body: &str) -> Option<AccountDid> {
    let did = body.trim();
    let valid = did.starts_with("did:") && !did.contains(char::is_whitespace);
    valid.then(|| AccountDid::from_raw(did))
}

pub struct DohHandleResolver {
    http: reqwest::Client,
    endpoint: String,
}

impl DohHandleResolver {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

impl DohHandleResolver {
    async fn lookup_dns(&self, handle: &str) -> Result<Option<AccountDid>, AuthError> {
        let name = format!("_atproto.{handle}");
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("name", name.as_str()), ("type", "TXT")])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await?;
        if !resp.status().is_success() {
            debug!(handle, status = %resp.status(), "DoH lookup failed");
            return Ok(None);
        }
        let body: DohResponse = resp.json().await?;
        Ok(did_from_answer(&body))
    }

    async fn lookup_well_known(&self, handle: &str) -> Result<Option<AccountDid>, AuthError> {
        let url = format!("https://{handle}/.well-known/atproto-did");
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            debug!(handle, status = %resp.status(), "atproto-did lookup failed");
            return Ok(None);
        }
        Ok(did_from_well_known(&resp.text().await?))
    }
}

#[async_trait]
impl HandleResolver for DohHandleResolver {
    async fn resolve(&self, handle: &str) -> Result<AccountDid, AuthError> {
        if let Some(did) = did_passthrough(handle) {
            return Ok(did);
        }
        let handle = normalize_handle(handle)?;

        let dns = self.lookup_dns(&handle).await.unwrap_or_else(|e| {
            debug!(handle = %handle, error = %e, "DoH lookup errored");
            None
        });
        let did = match dns {
            Some(did) => Some(did),
            None => self.lookup_well_known(&handle).await.unwrap_or_else(|e| {
                debug!(handle = %handle, error = %e, "atproto-did lookup errored");
                None
            }),
        };

        match did {
            Some(did) => {
                debug!(handle = %handle, did = %did, "handle resolved");
                Ok(did)
            }
            None => Err(AuthError::HandleResolution {
                handle,
                reason: "no did= TXT record and no /.well-known/atproto-did".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Option<AccountDid> {
        did_from_answer(&serde_json::from_str(json).unwrap())
    }

    #[test]
    fn normalize_strips_at_and_case() {
        assert_eq!(normalize_handle("  @Alice.BSKY.social ").unwrap(), "alice.bsky.social");
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(normalize_handle("").is_err());
        assert!(normalize_handle("alice").is_err());
        assert!(normalize_handle(".alice.com").is_err());
        assert!(normalize_handle("alice.com.").is_err());
        assert!(normalize_handle("al ice.com").is_err());
    }

    #[test]
    fn did_input_passes_through() {
        assert_eq!(did_passthrough(" did:plc:abc ").unwrap().as_str(), "did:plc:abc");
        assert!(did_passthrough("alice.com").is_none());
    }

    #[test]
    fn answer_with_single_did() {
        let did = parse(
            r#"{"Status":0,"Answer":[
                {"name":"_atproto.alice.com.","type":16,"TTL":300,"data":"\"did=did:plc:abc123\""}
            ]}"#,
        );
        assert_eq!(did.unwrap().as_str(), "did:plc:abc123");
    }

    #[test]
    fn answer_ignores_non_did_txt() {
        let did = parse(
            r#"{"Status":0,"Answer":[
                {"name":"_atproto.alice.com.","type":16,"data":"\"v=spf1 -all\""},
                {"name":"_atproto.alice.com.","type":16,"data":"\"did=did:plc:abc123\""}
            ]}"#,
        );
        assert_eq!(did.unwrap().as_str(), "did:plc:abc123");
    }

    #[test]
    fn conflicting_dids_resolve_to_none() {
        let did = parse(
            r#"{"Status":0,"Answer":[
                {"type":16,"data":"\"did=did:plc:one\""},
                {"type":16,"data":"\"did=did:plc:two\""}
            ]}"#,
        );
        assert!(did.is_none());
    }

    #[test]
    fn well_known_body_is_trimmed_did() {
        assert_eq!(
            did_from_well_known("did:plc:abc123\n").unwrap().as_str(),
            "did:plc:abc123"
        );
        assert_eq!(
            did_from_well_known("  did:web:alice.com ").unwrap().as_str(),
            "did:web:alice.com"
        );
    }

    #[test]
    fn well_known_rejects_html_and_empty_bodies() {
        assert!(did_from_well_known("").is_none());
        assert!(did_from_well_known("<!doctype html><title>404</title>").is_none());
        assert!(did_from_well_known("did:plc:abc did:plc:def").is_none());
    }

    #[tokio::test]
    async fn unreachable_dns_and_host_is_a_resolution_error() {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap();
        let resolver = DohHandleResolver::new(http, "http://127.0.0.1:9/dns-query");
        let err = resolver.resolve("alice.invalid").await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::HandleResolution { ref handle, .. } if handle == "alice.invalid"
        ));
    }

    #[test]
    fn nxdomain_resolves_to_none() {
        assert!(parse(r#"{"Status":3}"#).is_none());
        assert!(parse(r#"{"Status":0,"Answer":[]}"#).is_none());
    }
}
