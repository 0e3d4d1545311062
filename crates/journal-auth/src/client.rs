//! Authorization-code + PKCE client for an AT Protocol authorization server.
//!
//! [`OAuthClient`] is the seam the identity layer talks to. [`HttpOAuthClient`]
//! is the real implementation: it finds each account's authorization server
//! from its DID document, sends every token-endpoint request with a DPoP
//! proof, keeps pending PKCE verifiers keyed by `state`, and holds live
//! token sets keyed by account DID.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use journal_core::AccountDid;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::{OAuthConfig, OAUTH_SCOPE};
use crate::discovery::{
    authorization_server, check_metadata_issuer, did_document_url, pds_endpoint,
    AuthServerMetadata, DidDocument, ProtectedResourceMetadata, AUTH_SERVER_METADATA_PATH,
    PROTECTED_RESOURCE_PATH,
};
use crate::dpop::{is_use_dpop_nonce, nonce_origin, DpopKey, DPOP_HEADER, DPOP_NONCE_HEADER};
use crate::error::AuthError;
use crate::pkce::{generate_pkce, generate_state};
use crate::resolver::HandleResolver;

/// How long a started sign-in may take before its `state` is forgotten.
const PENDING_TTL_SECS: i64 = 600;

#[derive(Clone, Debug)]
pub struct AuthorizeOptions {
    pub scope: String,
    pub redirect_uri: String,
}

impl AuthorizeOptions {
    pub fn from_config(config: &OAuthConfig) -> Self {
        Self {
            scope: OAUTH_SCOPE.into(),
            redirect_uri: config.redirect_uri(),
        }
    }
}

/// Query parameters the authorization server appends to the redirect URI.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub iss: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// True when the request carries nothing from an authorization redirect.
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.state.is_none() && self.error.is_none()
    }
}

/// The signed-in account, as seen by the rest of the app.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSession {
    pub did: AccountDid,
    pub scope: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Start a sign-in for `handle` and return the URL to send the browser to.
    async fn authorize(
        &self,
        handle: &str,
        options: &AuthorizeOptions,
    ) -> Result<String, AuthError>;

    /// Finish a sign-in from the redirect's query parameters.
    async fn callback(&self, params: &CallbackParams) -> Result<AccountSession, AuthError>;

    /// Forget the account's tokens, revoking them upstream where supported.
    async fn revoke(&self, did: &AccountDid) -> Result<(), AuthError>;
}

struct PendingAuthorization {
    verifier: SecretString,
    redirect_uri: String,
    expected_did: AccountDid,
    issuer: String,
    created_at: DateTime<Utc>,
}

struct TokenSet {
    issuer: String,
    access_token: SecretString,
    refresh_token: Option<SecretString>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    sub: String,
}

#[derive(Deserialize)]
struct ParResponse {
    request_uri: String,
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

pub struct HttpOAuthClient {
    http: reqwest::Client,
    config: OAuthConfig,
    resolver: Arc<dyn HandleResolver>,
    dpop_key: DpopKey,
    /// Latest `DPoP-Nonce` per server origin.
    dpop_nonces: DashMap<String, String>,
    /// Authorization server metadata per issuer.
    metadata: DashMap<String, Arc<AuthServerMetadata>>,
    pending: DashMap<String, PendingAuthorization>,
    sessions: DashMap<AccountDid, TokenSet>,
}

impl HttpOAuthClient {
    /// Generates the DPoP key the client's tokens will be bound to.
    pub fn new(
        http: reqwest::Client,
        config: OAuthConfig,
        resolver: Arc<dyn HandleResolver>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            http,
            config,
            resolver,
            dpop_key: DpopKey::generate()?,
            dpop_nonces: DashMap::new(),
            metadata: DashMap::new(),
            pending: DashMap::new(),
            sessions: DashMap::new(),
        })
    }

    /// Number of sign-ins started but not yet completed.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_session(&self, did: &AccountDid) -> bool {
        self.sessions.contains_key(did)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AuthError> {
        let resp = self.http.get(url).send().await?;
        Ok(ensure_success(resp).await?.json().await?)
    }

    /// DID → DID document → PDS → the PDS's authorization server.
    #[instrument(skip(self), fields(did = %did))]
    async fn discover_issuer(&self, did: &AccountDid) -> Result<String, AuthError> {
        let doc_url = did_document_url(did, &self.config.plc_directory)?;
        let doc: DidDocument = self.get_json(&doc_url).await?;
        let pds = pds_endpoint(&doc, did)?;

        let resource: ProtectedResourceMetadata =
            self.get_json(&format!("{pds}{PROTECTED_RESOURCE_PATH}")).await?;
        let issuer = authorization_server(&resource)?;
        debug!(pds = %pds, issuer = %issuer, "authorization server discovered");
        Ok(issuer)
    }

    async fn metadata(&self, issuer: &str) -> Result<Arc<AuthServerMetadata>, AuthError> {
        let cached = self.metadata.get(issuer).map(|m| Arc::clone(m.value()));
        if let Some(meta) = cached {
            return Ok(meta);
        }
        let meta: AuthServerMetadata = self
            .get_json(&format!("{issuer}{AUTH_SERVER_METADATA_PATH}"))
            .await?;
        check_metadata_issuer(&meta, issuer)?;
        debug!(issuer = %meta.issuer, "fetched authorization server metadata");
        let meta = Arc::new(meta);
        self.metadata.insert(issuer.to_owned(), meta.clone());
        Ok(meta)
    }

    fn prune_expired(&self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(PENDING_TTL_SECS);
        self.pending.retain(|_, p| p.created_at > cutoff);
    }

    /// Form POST with a DPoP proof. A `use_dpop_nonce` rejection is retried
    /// once with the nonce the server sent back.
    async fn dpop_post(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response, AuthError> {
        let origin = nonce_origin(url)?;
        let mut retried = false;
        loop {
            let nonce = self.dpop_nonces.get(&origin).map(|n| n.value().clone());
            let proof = self.dpop_key.proof("POST", url, nonce.as_deref())?;
            let resp = self
                .http
                .post(url)
                .header(DPOP_HEADER, proof)
                .form(form)
                .send()
                .await?;

            let fresh_nonce = resp
                .headers()
                .get(DPOP_NONCE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            if let Some(n) = &fresh_nonce {
                self.dpop_nonces.insert(origin.clone(), n.clone());
            }

            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }
            let text = resp.text().await.unwrap_or_default();
            if status == StatusCode::BAD_REQUEST
                && !retried
                && fresh_nonce.is_some()
                && is_use_dpop_nonce(&text)
            {
                debug!(origin = %origin, "retrying with server DPoP nonce");
                retried = true;
                continue;
            }
            return Err(oauth_error(status, text));
        }
    }

    async fn push_authorization_request(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, AuthError> {
        let resp = self.dpop_post(endpoint, params).await?;
        let par: ParResponse = resp.json().await?;
        Ok(par.request_uri)
    }
}

#[async_trait]
impl OAuthClient for HttpOAuthClient {
    #[instrument(skip(self, options))]
    async fn authorize(
        &self,
        handle: &str,
        options: &AuthorizeOptions,
    ) -> Result<String, AuthError> {
        let did = self.resolver.resolve(handle).await?;
        let issuer = self.discover_issuer(&did).await?;
        let meta = self.metadata(&issuer).await?;

        let pkce = generate_pkce();
        let state = generate_state();
        let client_id = self.config.client_id();
        let params = [
            ("response_type", "code"),
            ("client_id", client_id.as_str()),
            ("redirect_uri", options.redirect_uri.as_str()),
            ("scope", options.scope.as_str()),
            ("state", state.as_str()),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", "S256"),
            ("response_mode", "query"),
            ("login_hint", handle.trim()),
        ];

        let url = match &meta.pushed_authorization_request_endpoint {
            Some(par) => {
                let request_uri = self.push_authorization_request(par, &params).await?;
                build_url(
                    &meta.authorization_endpoint,
                    &[
                        ("client_id", client_id.as_str()),
                        ("request_uri", request_uri.as_str()),
                    ],
                )
            }
            None if meta.require_pushed_authorization_requests => {
                return Err(AuthError::Discovery(format!(
                    "{issuer} requires PAR but advertises no endpoint"
                )));
            }
            None => build_url(&meta.authorization_endpoint, &params),
        };

        let now = Utc::now();
        self.prune_expired(now);
        self.pending.insert(
            state,
            PendingAuthorization {
                verifier: SecretString::from(pkce.verifier),
                redirect_uri: options.redirect_uri.clone(),
                expected_did: did.clone(),
                issuer,
                created_at: now,
            },
        );
        info!(did = %did, "authorization started");
        Ok(url)
    }

    #[instrument(skip_all)]
    async fn callback(&self, params: &CallbackParams) -> Result<AccountSession, AuthError> {
        if let Some(error) = &params.error {
            return Err(AuthError::OAuth {
                status: 0,
                message: params
                    .error_description
                    .clone()
                    .unwrap_or_else(|| error.clone()),
            });
        }
        let state = params.state.as_deref().ok_or(AuthError::UnknownState)?;
        let (_, pending) = self.pending.remove(state).ok_or(AuthError::UnknownState)?;
        if pending.created_at <= Utc::now() - Duration::seconds(PENDING_TTL_SECS) {
            return Err(AuthError::UnknownState);
        }
        let code = params.code.as_deref().ok_or_else(|| AuthError::OAuth {
            status: 0,
            message: "callback is missing the authorization code".into(),
        })?;

        let meta = self.metadata(&pending.issuer).await?;
        check_issuer(&meta.issuer, params.iss.as_deref())?;

        let client_id = self.config.client_id();
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", pending.redirect_uri.as_str()),
            ("client_id", client_id.as_str()),
            ("code_verifier", pending.verifier.expose_secret()),
        ];
        let resp = self.dpop_post(&meta.token_endpoint, &form).await?;
        let tokens: TokenResponse = resp.json().await?;

        let session = session_from_tokens(&tokens, &pending.expected_did, Utc::now())?;
        self.sessions.insert(
            session.did.clone(),
            TokenSet {
                issuer: pending.issuer,
                access_token: SecretString::from(tokens.access_token),
                refresh_token: tokens.refresh_token.map(SecretString::from),
            },
        );
        info!(did = %session.did, "account signed in");
        Ok(session)
    }

    #[instrument(skip(self), fields(did = %did))]
    async fn revoke(&self, did: &AccountDid) -> Result<(), AuthError> {
        let Some((_, tokens)) = self.sessions.remove(did) else {
            debug!("no live tokens to revoke");
            return Ok(());
        };
        let meta = self.metadata(&tokens.issuer).await?;
        let Some(endpoint) = &meta.revocation_endpoint else {
            return Ok(());
        };

        let client_id = self.config.client_id();
        let mut to_revoke = vec![tokens.access_token];
        to_revoke.extend(tokens.refresh_token);
        for token in &to_revoke {
            let form = [
                ("token", token.expose_secret()),
                ("client_id", client_id.as_str()),
            ];
            if let Err(e) = self.dpop_post(endpoint, &form).await {
                warn!(error = %e, "token revocation rejected");
                return Err(e);
            }
        }
        Ok(())
    }
}

fn build_url(endpoint: &str, params: &[(&str, &str)]) -> String {
    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let sep = if endpoint.contains('?') { '&' } else { '?' };
    format!("{endpoint}{sep}{query}")
}

/// RFC 9207: when the server names itself in the redirect, it must be the
/// issuer we started with.
fn check_issuer(expected: &str, actual: Option<&str>) -> Result<(), AuthError> {
    match actual {
        Some(iss) if iss != expected => Err(AuthError::IssuerMismatch {
            expected: expected.to_string(),
            actual: iss.to_string(),
        }),
        _ => Ok(()),
    }
}

fn session_from_tokens(
    tokens: &TokenResponse,
    expected: &AccountDid,
    now: DateTime<Utc>,
) -> Result<AccountSession, AuthError> {
    if !tokens.token_type.eq_ignore_ascii_case("DPoP") {
        return Err(AuthError::OAuth {
            status: 0,
            message: format!("expected a DPoP-bound token, got {:?}", tokens.token_type),
        });
    }
    if tokens.sub != expected.as_str() {
        return Err(AuthError::AccountMismatch {
            expected: expected.to_string(),
            actual: tokens.sub.clone(),
        });
    }
    Ok(AccountSession {
        did: expected.clone(),
        scope: tokens.scope.clone().unwrap_or_else(|| OAUTH_SCOPE.into()),
        expires_at: tokens.expires_in.map(|secs| now + Duration::seconds(secs)),
    })
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, AuthError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(oauth_error(status, text))
}

fn oauth_error(status: StatusCode, text: String) -> AuthError {
    let message = match serde_json::from_str::<OAuthErrorBody>(&text) {
        Ok(body) => match body.error_description {
            Some(desc) => format!("{}: {desc}", body.error),
            None => body.error,
        },
        Err(_) => text,
    };
    AuthError::OAuth {
        status: status.as_u16(),
        message,
    }
}
