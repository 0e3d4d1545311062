use std::sync::Arc;

use journal_core::AccountDid;
use tracing::{info, instrument, warn};

use crate::client::{AccountSession, AuthorizeOptions, CallbackParams, OAuthClient};
use crate::config::OAuthConfig;
use crate::cookie::clear_account_cookie;
use crate::error::AuthError;

/// Sign-in, session initialisation and sign-out over an [`OAuthClient`].
///
/// Produces the account DID the entry store uses as its session id; the DID
/// travels between requests in the account cookie.
#[derive(Clone)]
pub struct IdentityService {
    client: Arc<dyn OAuthClient>,
    config: OAuthConfig,
}

impl IdentityService {
    pub fn new(client: Arc<dyn OAuthClient>, config: OAuthConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Begin sign-in for `handle`, returning the authorization URL.
    #[instrument(skip(self))]
    pub async fn sign_in(&self, handle: &str) -> Result<String, AuthError> {
        if handle.trim().is_empty() {
            return Err(AuthError::InvalidHandle(handle.to_string()));
        }
        let options = AuthorizeOptions::from_config(&self.config);
        self.client.authorize(handle, &options).await
    }

    /// Complete a sign-in from callback parameters.
    /// `None` when the request is not an authorization redirect at all.
    #[instrument(skip_all)]
    pub async fn init_session(
        &self,
        params: &CallbackParams,
    ) -> Result<Option<AccountSession>, AuthError> {
        if params.is_empty() {
            return Ok(None);
        }
        let session = self.client.callback(params).await?;
        info!(did = %session.did, "session initialised");
        Ok(Some(session))
    }

    /// Sign out `did` and return the `Set-Cookie` value that clears the
    /// account cookie. The cookie is cleared even when revocation fails.
    #[instrument(skip(self))]
    pub async fn logout(&self, did: &str) -> String {
        if !did.is_empty() {
            if let Err(e) = self.client.revoke(&AccountDid::from_raw(did)).await {
                warn!(error = %e, "token revocation failed during logout");
            }
        }
        clear_account_cookie()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct MockClient {
        revoked: Mutex<Vec<String>>,
        fail_revoke: bool,
    }

    #[async_trait]
    impl OAuthClient for MockClient {
        async fn authorize(
            &self,
            handle: &str,
            options: &AuthorizeOptions,
        ) -> Result<String, AuthError> {
            Ok(format!(
                "https://auth.example/authorize?login_hint={handle}&redirect_uri={}&scope={}",
                options.redirect_uri, options.scope
            ))
        }

        async fn callback(&self, params: &CallbackParams) -> Result<AccountSession, AuthError> {
            match params.code.as_deref() {
                Some("good") => Ok(AccountSession {
                    did: AccountDid::from_raw("did:plc:abc123"),
                    scope: "atproto".into(),
                    expires_at: None,
                }),
                _ => Err(AuthError::UnknownState),
            }
        }

        async fn revoke(&self, did: &AccountDid) -> Result<(), AuthError> {
            self.revoked.lock().push(did.to_string());
            if self.fail_revoke {
                return Err(AuthError::OAuth {
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            Ok(())
        }
    }

    fn service(client: Arc<MockClient>) -> IdentityService {
        IdentityService::new(client, OAuthConfig::default())
    }

    #[tokio::test]
    async fn sign_in_passes_redirect_and_scope() {
        let url = service(Arc::new(MockClient::default()))
            .sign_in("alice.bsky.social")
            .await
            .unwrap();
        assert!(url.contains("login_hint=alice.bsky.social"));
        assert!(url.contains("redirect_uri=http://127.0.0.1:4321/auth/callback"));
        assert!(url.ends_with("scope=atproto"));
    }

    #[tokio::test]
    async fn sign_in_rejects_blank_handle() {
        let err = service(Arc::new(MockClient::default()))
            .sign_in("   ")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidHandle(_)));
    }

    #[tokio::test]
    async fn init_session_without_params_is_none() {
        let session = service(Arc::new(MockClient::default()))
            .init_session(&CallbackParams::default())
            .await
            .unwrap();
        assert!(session.is_none());
    }

    #[tokio::test]
    async fn init_session_completes_callback() {
        let params = CallbackParams {
            code: Some("good".into()),
            state: Some("s".into()),
            ..Default::default()
        };
        let session = service(Arc::new(MockClient::default()))
            .init_session(&params)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.did.as_str(), "did:plc:abc123");
    }

    #[tokio::test]
    async fn init_session_propagates_callback_failure() {
        let params = CallbackParams {
            code: Some("bad".into()),
            state: Some("s".into()),
            ..Default::default()
        };
        assert!(service(Arc::new(MockClient::default()))
            .init_session(&params)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn logout_revokes_and_clears() {
        let client = Arc::new(MockClient::default());
        let header = service(client.clone()).logout("did:plc:abc123").await;
        assert_eq!(header, clear_account_cookie());
        assert_eq!(*client.revoked.lock(), vec!["did:plc:abc123".to_string()]);
    }

    #[tokio::test]
    async fn logout_clears_even_when_revoke_fails() {
        let client = Arc::new(MockClient {
            fail_revoke: true,
            ..Default::default()
        });
        let header = service(client.clone()).logout("did:plc:abc123").await;
        assert_eq!(header, clear_account_cookie());
        assert_eq!(client.revoked.lock().len(), 1);
    }

    #[tokio::test]
    async fn logout_without_did_skips_revoke() {
        let client = Arc::new(MockClient::default());
        let header = service(client.clone()).logout("").await;
        assert_eq!(header, clear_account_cookie());
        assert!(client.revoked.lock().is_empty());
    }
}
