//! Reader-facing verification endpoints.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, AppState};
use crate::access::{
    log_access, verify_password, CredentialType, RuleStore, SessionManager,
};
use crate::bucket::BucketKind;
use crate::routing;
use crate::types::AccessMode;

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(rename = "type")]
    content_type: String,
    slug: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// POST /auth/verify
pub async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rule = state
        .storage
        .with_connection(|conn| RuleStore::new(conn).get_rule(&request.content_type, &request.slug))?;

    let decision = routing::decide(rule.as_ref(), state.engine.config().default_access);

    if !decision.is_protected {
        state.storage.with_connection(|conn| {
            log_access(
                conn,
                &request.content_type,
                &request.slug,
                CredentialType::Open,
                true,
                None,
                None,
            )
        })?;
        return Ok(Json(json!({
            "accessGranted": true,
            "accessMode": AccessMode::Open,
        })));
    }

    let rule = rule.ok_or_else(|| {
        // Default mode was overridden to a gated one but no rule holds
        // credentials; nothing can satisfy the check.
        ApiError::unauthorized("No credentials configured for this content")
    })?;

    let (credential, granted) = match rule.access_mode {
        AccessMode::Password => {
            let password = request.password.as_deref().ok_or_else(|| {
                ApiError::bad_request("Password is required for this content")
            })?;
            let ok = rule
                .password_hash
                .as_deref()
                .map(|hash| verify_password(password, hash))
                .unwrap_or(false);
            (CredentialType::Password, ok)
        }
        AccessMode::EmailList => {
            let email = request
                .email
                .as_deref()
                .ok_or_else(|| ApiError::bad_request("Email is required for this content"))?;
            let ok = state
                .storage
                .with_connection(|conn| RuleStore::new(conn).is_email_allowed(rule.id, email))?;
            (CredentialType::Email, ok)
        }
        AccessMode::Open => unreachable!("open rules are not protected"),
    };

    state.storage.with_connection(|conn| {
        log_access(
            conn,
            &request.content_type,
            &request.slug,
            credential,
            granted,
            request.email.as_deref(),
            None,
        )
    })?;

    if !granted {
        return Err(ApiError {
            status: StatusCode::UNAUTHORIZED,
            message: match credential {
                CredentialType::Password => "Invalid password".to_string(),
                _ => "Email not on the allowlist".to_string(),
            },
        });
    }

    let token = state.storage.with_connection(|conn| {
        SessionManager::new(conn).issue_token(
            &request.content_type,
            &request.slug,
            state.engine.config().session_ttl_hours,
        )
    })?;

    Ok(Json(json!({
        "accessGranted": true,
        "accessMode": rule.access_mode,
        "token": token,
    })))
}

/// GET /auth/access/:type/:slug
pub async fn check_access(
    State(state): State<AppState>,
    Path((content_type, slug)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rule = state
        .storage
        .with_connection(|conn| RuleStore::new(conn).get_rule(&content_type, &slug))?;
    let decision = routing::decide(rule.as_ref(), state.engine.config().default_access);

    Ok(Json(json!({
        "type": content_type,
        "slug": slug,
        "accessMode": decision.access_mode,
        "isProtected": decision.is_protected,
    })))
}

/// GET /auth/content/:type/:slug (Bearer session token)
pub async fn protected_content(
    State(state): State<AppState>,
    Path((content_type, slug)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("");

    if token.is_empty() {
        return Err(ApiError::unauthorized("Missing bearer token"));
    }

    let valid = state
        .storage
        .with_connection(|conn| SessionManager::new(conn).validate_token(token, &content_type, &slug))?;

    state.storage.with_connection(|conn| {
        log_access(
            conn,
            &content_type,
            &slug,
            CredentialType::Token,
            valid,
            None,
            None,
        )
    })?;

    if !valid {
        return Err(ApiError::unauthorized("Invalid or expired token"));
    }

    let key = format!("{}/{}.html", content_type, slug);
    let content = state
        .engine
        .gateway()
        .get(BucketKind::Protected, &key)
        .await?
        .ok_or_else(|| ApiError::not_found("Content not found"))?;

    Ok(Json(json!({
        "type": content_type,
        "slug": slug,
        "html": String::from_utf8_lossy(&content),
    })))
}
