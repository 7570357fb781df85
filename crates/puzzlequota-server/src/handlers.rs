use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use puzzlequota_auth::BearerAuth;
use puzzlequota_auth::middleware::TEXT_PLAIN_UTF8;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::quota::{QuotaError, QuotaStore};

pub const WELCOME_MESSAGE: &str =
    "Welcome! This is the root path. Quota endpoints are under /quota.";
pub const NOT_FOUND_MESSAGE: &str = "Not found. The requested resource does not exist.";

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

fn plain_text(status: StatusCode, body: String) -> impl IntoResponse {
    (status, [(header::CONTENT_TYPE, TEXT_PLAIN_UTF8)], body)
}

pub async fn root() -> impl IntoResponse {
    plain_text(StatusCode::OK, WELCOME_MESSAGE.to_string())
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn not_found() -> impl IntoResponse {
    plain_text(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE.to_string())
}

/// `GET /me`: claims of the authenticated principal.
pub async fn me(BearerAuth(principal): BearerAuth) -> Json<Map<String, Value>> {
    Json(principal.raw_claims().clone())
}

/// `GET /quota`
pub async fn get_quota(
    State(quota): State<Arc<QuotaStore>>,
    BearerAuth(principal): BearerAuth,
) -> Result<impl IntoResponse, QuotaError> {
    let count = quota.read(principal.subject_id()).await?;
    Ok(plain_text(StatusCode::OK, count.to_string()))
}

/// `POST /quota/use`
pub async fn use_quota(
    State(quota): State<Arc<QuotaStore>>,
    BearerAuth(principal): BearerAuth,
) -> Result<impl IntoResponse, QuotaError> {
    let count = quota.try_decrement(principal.subject_id()).await?;
    Ok(plain_text(StatusCode::OK, count.to_string()))
}

#[derive(Debug, Deserialize)]
struct AddRequest {
    #[serde(rename = "addNum", default)]
    add_num: Option<serde_json::Number>,
}

/// `POST /quota/add`, optional body `{"addNum": n}`.
pub async fn add_quota(
    State(quota): State<Arc<QuotaStore>>,
    BearerAuth(principal): BearerAuth,
    body: Bytes,
) -> Result<impl IntoResponse, QuotaError> {
    let delta = add_delta(&body);
    let count = quota.increment(principal.subject_id(), delta).await?;
    Ok(plain_text(StatusCode::OK, count.to_string()))
}

/// Amount to add for a `/quota/add` body. Anything unusable means 1.
fn add_delta(body: &[u8]) -> i64 {
    serde_json::from_slice::<AddRequest>(body)
        .ok()
        .and_then(|req| req.add_num)
        .and_then(|n| {
            n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        })
        .filter(|delta| *delta > 0)
        .unwrap_or(1)
}
