//! Request extractor for the signed-in account.

use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use journal_auth::get_account_cookie;
use journal_core::AccountDid;

use crate::error::ApiError;

/// The account DID from the `a7_account` cookie. The entry store uses it
/// as the session id. Rejects with 401 when the cookie is missing or empty.
///
/// The cookie is the bare DID, neither signed nor checked against the
/// client's live tokens. Any client that sets `a7_account=<did>` is treated
/// as that account and can read and write its entries.
#[derive(Clone, Debug)]
pub struct CurrentAccount(pub AccountDid);

impl CurrentAccount {
    pub fn session_id(&self) -> &str {
        self.0.as_str()
    }
}

/// Account DID carried by the request's `Cookie` headers, `""` when absent.
pub fn account_from_headers(headers: &HeaderMap) -> String {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(get_account_cookie)
        .find(|did| !did.is_empty())
        .unwrap_or_default()
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentAccount {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let did = account_from_headers(&parts.headers);
        if did.is_empty() {
            return Err(ApiError::Unauthorized);
        }
        Ok(Self(AccountDid::from_raw(did)))
    }
}
