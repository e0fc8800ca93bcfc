//! Admin surface: access rules, logs, stats, content management, catalog.
//!
//! Every route here is guarded by the `X-API-Key` header.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{require_api_key, ApiError, AppState};
use crate::access::{access_stats, query_access_log, AccessLogFilter, RulePatch, RuleStore, UpsertRule};
use crate::error::PressroomError;
use crate::types::{AccessMode, CONTENT_EXTENSION, CONTENT_ROOT};

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    #[serde(rename = "type")]
    content_type: String,
    slug: String,
    #[serde(rename = "accessMode")]
    access_mode: Option<AccessMode>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default, rename = "allowedEmails")]
    allowed_emails: Vec<String>,
    #[serde(default)]
    description: Option<String>,
}

/// POST /api/internal/access-rules
pub async fn create_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    require_api_key(&state, &headers)?;

    if request.content_type.is_empty() || request.slug.is_empty() {
        return Err(ApiError::bad_request("Missing required fields: type, slug"));
    }

    let input = UpsertRule {
        access_mode: request.access_mode.unwrap_or_default(),
        description: request.description.clone(),
        password: request.password.clone(),
        allowed_emails: request.allowed_emails.clone(),
    };

    let rule = state
        .storage
        .with_transaction(|conn| RuleStore::new(conn).upsert_rule(&request.content_type, &request.slug, &input))?;

    Ok((StatusCode::CREATED, Json(serde_json::to_value(rule)?)))
}

/// GET /api/internal/access-rules?type=&mode=
pub async fn list_rules(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let content_type = params.get("type").map(String::as_str);
    let mode = match params.get("mode") {
        Some(raw) => Some(
            raw.parse::<AccessMode>()
                .map_err(|e| ApiError::bad_request(e))?,
        ),
        None => None,
    };

    let rules = state
        .storage
        .with_connection(|conn| RuleStore::new(conn).list_rules(content_type, mode))?;

    let count = rules.len();
    Ok(Json(json!({ "rules": rules, "count": count })))
}

/// GET /api/internal/access-rules/:type/:slug
pub async fn get_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((content_type, slug)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let rule = state
        .storage
        .with_connection(|conn| RuleStore::new(conn).get_rule(&content_type, &slug))?
        .ok_or_else(|| ApiError::not_found("Access rule not found"))?;

    Ok(Json(serde_json::to_value(rule)?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    #[serde(rename = "accessMode")]
    access_mode: Option<AccessMode>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default, rename = "allowedEmails")]
    allowed_emails: Option<Vec<String>>,
}

/// PUT /api/internal/access-rules/:type/:slug
pub async fn update_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((content_type, slug)): Path<(String, String)>,
    Json(request): Json<UpdateRuleRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let patch = RulePatch {
        access_mode: request.access_mode,
        description: request.description,
        password: request.password,
        allowed_emails: request.allowed_emails,
    };

    let rule = state
        .storage
        .with_transaction(|conn| RuleStore::new(conn).update_rule(&content_type, &slug, &patch))?
        .ok_or_else(|| ApiError::not_found("Access rule not found"))?;

    Ok(Json(serde_json::to_value(rule)?))
}

/// DELETE /api/internal/access-rules/:type/:slug
pub async fn delete_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((content_type, slug)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let deleted = state
        .storage
        .with_connection(|conn| RuleStore::new(conn).delete_rule(&content_type, &slug))?;
    if !deleted {
        return Err(ApiError::not_found("Access rule not found"));
    }

    Ok(Json(json!({ "message": "Access rule deleted" })))
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    email: String,
}

/// POST /api/internal/access-rules/:type/:slug/emails
pub async fn add_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((content_type, slug)): Path<(String, String)>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let emails = state.storage.with_transaction(|conn| {
        let store = RuleStore::new(conn);
        let rule = store
            .get_rule(&content_type, &slug)?
            .ok_or_else(|| PressroomError::NotFound("access rule".to_string()))?;
        store.add_email(rule.id, &request.email)?;
        store.list_emails(rule.id)
    })?;

    Ok(Json(json!({ "allowedEmails": emails })))
}

/// DELETE /api/internal/access-rules/:type/:slug/emails/:email
pub async fn remove_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((content_type, slug, email)): Path<(String, String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let emails = state.storage.with_transaction(|conn| {
        let store = RuleStore::new(conn);
        let rule = store
            .get_rule(&content_type, &slug)?
            .ok_or_else(|| PressroomError::NotFound("access rule".to_string()))?;
        store.remove_email(rule.id, &email)?;
        store.list_emails(rule.id)
    })?;

    Ok(Json(json!({ "allowedEmails": emails })))
}

/// GET /api/internal/logs?limit=&failed=&type=&slug=
pub async fn get_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let filter = AccessLogFilter {
        content_type: params.get("type").cloned(),
        slug: params.get("slug").cloned(),
        failed_only: params.get("failed").map(|v| v == "true").unwrap_or(false),
        limit: params.get("limit").and_then(|v| v.parse().ok()).or(Some(100)),
    };

    let logs = state
        .storage
        .with_connection(|conn| query_access_log(conn, &filter))?;

    let count = logs.len();
    Ok(Json(json!({ "logs": logs, "count": count })))
}

/// GET /api/internal/stats?start=&end=
pub async fn get_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let start = parse_range_bound(params.get("start"))?;
    let end = parse_range_bound(params.get("end"))?;

    let stats = state
        .storage
        .with_connection(|conn| access_stats(conn, start, end))?;

    let rules_count: usize = state
        .storage
        .with_connection(|conn| RuleStore::new(conn).list_rules(None, None))?
        .len();

    let mut body = serde_json::to_value(stats)?;
    body["rulesCount"] = json!(rules_count);
    Ok(Json(body))
}

fn parse_range_bound(raw: Option<&String>) -> Result<Option<DateTime<Utc>>, ApiError> {
    let Some(raw) = raw else { return Ok(None) };
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()))
                .map_err(|_| ApiError::bad_request(format!("invalid date: {}", raw)))
        })
}

/// GET /api/internal/content/types
pub async fn content_types(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let types: Vec<serde_json::Value> = state
        .engine
        .config()
        .content_types
        .iter()
        .map(|name| {
            json!({
                "name": name,
                "path": format!("{}/{}", CONTENT_ROOT, name),
            })
        })
        .collect();

    Ok(Json(json!({ "types": types })))
}

/// GET /api/internal/content/:type
pub async fn list_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(content_type): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let files = state
        .engine
        .source()
        .list_content_files(&content_type)
        .await?;

    Ok(Json(json!({
        "type": content_type,
        "count": files.len(),
        "files": files,
    })))
}

/// GET /api/internal/content/:type/:slug
pub async fn get_content_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((content_type, slug)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let path = format!("{}/{}/{}{}", CONTENT_ROOT, content_type, slug, CONTENT_EXTENSION);
    let markdown = state
        .engine
        .source()
        .get_file_content(&path)
        .await?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    Ok(Json(json!({
        "type": content_type,
        "slug": slug,
        "path": path,
        "markdown": markdown,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateContentRequest {
    #[serde(rename = "type", default)]
    content_type: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    markdown: String,
}

/// POST /api/internal/content
pub async fn create_content_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateContentRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    require_api_key(&state, &headers)?;

    if request.content_type.is_empty() || request.slug.is_empty() || request.markdown.is_empty() {
        return Err(ApiError::bad_request(
            "Missing required fields: type, slug, markdown",
        ));
    }

    let path = format!(
        "{}/{}/{}{}",
        CONTENT_ROOT, request.content_type, request.slug, CONTENT_EXTENSION
    );
    let message = format!("Add {}/{}", request.content_type, request.slug);
    state
        .engine
        .source()
        .create_file(&path, &request.markdown, &message)
        .await?;

    // Publish immediately rather than waiting for the next push webhook
    let synced = match state.engine.run_partial(vec![path.clone()], "admin").await {
        Ok(report) => report.success,
        Err(e) => {
            tracing::warn!("post-create sync of {} failed: {}", path, e);
            false
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Content file created",
            "path": path,
            "slug": request.slug,
            "synced": synced,
        })),
    ))
}

/// GET /api/content-catalog
pub async fn catalog(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let catalog = state.engine.load_catalog().await?;
    Ok(Json(serde_json::to_value(catalog)?))
}

/// GET /api/content-catalog/:type
pub async fn catalog_by_type(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(content_type): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_api_key(&state, &headers)?;

    let catalog = state.engine.load_catalog().await?;
    let entries = catalog.get(&content_type).cloned().unwrap_or_default();
    Ok(Json(json!({
        "type": content_type,
        "count": entries.len(),
        "items": entries,
    })))
}
