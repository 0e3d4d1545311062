//! HTTP handlers for the journal API and the sign-in flow.

use axum::extract::{Path, Query, State};
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use journal_auth::{set_account_cookie, CallbackParams};
use journal_core::PublicId;
use journal_store::{Entry, EntryNeighbors, EntryRow};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::server::AppState;
use crate::session::{account_from_headers, CurrentAccount};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub handle: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    pub body: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryListResponse {
    pub entries: Vec<EntryRow>,
    pub count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDetailResponse {
    pub entry: Entry,
    #[serde(flatten)]
    pub neighbors: EntryNeighbors,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.db.ping() {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "healthy" }))),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy" })),
            )
        }
    }
}

/// GET /client-metadata.json
pub async fn client_metadata(State(state): State<AppState>) -> Json<Value> {
    Json(state.identity.config().client_metadata())
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let url = state.identity.sign_in(&req.handle).await?;
    Ok(Json(json!({ "authorizationUrl": url })))
}

/// GET /auth/callback
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    let Some(session) = state.identity.init_session(&params).await? else {
        return Ok(Redirect::to("/").into_response());
    };
    let mut headers = HeaderMap::new();
    if let Some(cookie) = set_account_cookie(session.did.as_str()) {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.insert(SET_COOKIE, value);
        }
    }
    Ok((headers, Redirect::to("/")).into_response())
}

/// POST /auth/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let did = account_from_headers(&headers);
    let cookie = state.identity.logout(&did).await;
    (StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)])
}

/// GET /api/entries
pub async fn list_entries(
    State(state): State<AppState>,
    account: CurrentAccount,
) -> Result<Json<EntryListResponse>, ApiError> {
    let entries = state.entries.list_entries(account.session_id())?;
    let count = state.entries.count_entries(account.session_id())?;
    Ok(Json(EntryListResponse { entries, count }))
}

/// POST /api/entries
pub async fn create_entry(
    State(state): State<AppState>,
    account: CurrentAccount,
    Json(req): Json<CreateEntryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.body.trim().is_empty() {
        return Err(ApiError::BadRequest("entry body must not be empty".into()));
    }
    let public_id = state.entries.create_entry(account.session_id(), &req.body)?;
    tracing::info!(public_id = %public_id, "entry created");
    Ok((
        StatusCode::CREATED,
        [(LOCATION, format!("/api/entries/{public_id}"))],
        Json(json!({ "publicId": public_id })),
    ))
}

/// GET /api/entries/{public_id}
pub async fn get_entry(
    State(state): State<AppState>,
    account: CurrentAccount,
    Path(public_id): Path<String>,
) -> Result<Json<EntryDetailResponse>, ApiError> {
    let public_id = PublicId::from_raw(public_id);
    if !public_id.is_well_formed() {
        return Err(ApiError::NotFound);
    }
    let entry = state
        .entries
        .get_entry(account.session_id(), &public_id)?
        .ok_or(ApiError::NotFound)?;
    let neighbors = state
        .entries
        .get_entry_neighbors(account.session_id(), &public_id)?;
    Ok(Json(EntryDetailResponse { entry, neighbors }))
}
