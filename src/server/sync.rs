//! Sync trigger surface: webhook, manual trigger, status.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{require_api_key, ApiError, AppState};
use crate::source::{changed_content_paths, PushEvent};
use crate::storage::latest_build;

type HmacSha256 = Hmac<Sha256>;

/// POST /api/internal/sync/webhook
///
/// Validated by `X-Hub-Signature-256` over the raw body; branch and
/// change-set filters acknowledge with 200 so the sender does not retry.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing signature header"))?;

    if !verify_signature(&state.config.webhook_secret, &body, signature) {
        return Err(ApiError::unauthorized("Invalid signature"));
    }

    let event: PushEvent = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("Invalid webhook payload"))?;

    if !event.is_branch(&state.engine.config().main_branch) {
        return Ok(Json(json!({
            "message": "Push ignored: not the main branch",
        })));
    }

    let paths = changed_content_paths(&event);
    if paths.is_empty() {
        return Ok(Json(json!({
            "message": "No content files changed",
        })));
    }

    let count = paths.len();
    let report = state.engine.run_partial(paths, "webhook").await?;

    Ok(Json(json!({
        "message": "Sync triggered by push",
        "filesProcessed": count,
        "result": report,
    })))
}

#[derive(Debug, Deserialize, Default)]
pub struct ManualSyncRequest {
    #[serde(default)]
    full_sync: bool,
    #[serde(default)]
    files: Vec<String>,
}

/// POST /api/internal/sync
///
/// A run with item-level errors is still HTTP 200; callers inspect
/// `result.success`.
pub async fn manual_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ManualSyncRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let report = if request.full_sync {
        state.engine.run_full("manual").await?
    } else if !request.files.is_empty() {
        state.engine.run_partial(request.files, "manual").await?
    } else {
        return Err(ApiError::bad_request(
            "Request must set full_sync or a non-empty files list",
        ));
    };

    let message = if report.success {
        "Sync completed"
    } else {
        "Sync completed with errors"
    };

    Ok(Json(json!({
        "message": message,
        "filesProcessed": report.total_processed,
        "result": report,
    })))
}

/// GET /api/internal/sync/status
pub async fn sync_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let mut buckets = serde_json::Map::new();
    for (bucket, objects) in state.engine.bucket_status().await? {
        buckets.insert(
            bucket.to_string(),
            json!({
                "count": objects.len(),
                "objects": objects,
            }),
        );
    }

    let last_build = state.storage.with_connection(latest_build)?;

    Ok(Json(json!({
        "status": "ok",
        "buckets": buckets,
        "lastBuild": last_build,
    })))
}

/// Constant-time check of a `sha256=<hex>` signature header
fn verify_signature(secret: &str, body: &[u8], provided: &str) -> bool {
    let Some(provided_hex) = provided.strip_prefix("sha256=") else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    expected
        .as_bytes()
        .ct_eq(provided_hex.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"ref":"refs/heads/main"}"#;
        let signature = sign("hook-secret", body);
        assert!(verify_signature("hook-secret", body, &signature));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = br#"{"ref":"refs/heads/main"}"#;
        let signature = sign("other-secret", body);
        assert!(!verify_signature("hook-secret", body, &signature));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signature = sign("hook-secret", b"original");
        assert!(!verify_signature("hook-secret", b"tampered", &signature));
    }

    #[test]
    fn test_unprefixed_signature_rejected() {
        assert!(!verify_signature("hook-secret", b"x", "deadbeef"));
    }
}
