//! API route handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use tracing::debug;

use larkmd_core::{DomainSource, OpOutcome};

use crate::error::{ApiError, Result};
use crate::models::{AddDomainRequest, CheckQuery, CheckResponse, DomainsResponse};
use crate::state::AppState;

/// GET /api/domains - Built-in and custom domains.
pub async fn list_domains(State(state): State<AppState>) -> Json<DomainsResponse> {
    let mut builtin: Vec<String> = Vec::new();
    let mut custom: Vec<String> = Vec::new();
    for entry in state.registry.entries().await {
        match entry.source {
            DomainSource::Builtin => builtin.push(entry.domain.into()),
            DomainSource::Custom => custom.push(entry.domain.into()),
        }
    }

    Json(DomainsResponse { builtin, custom })
}

/// POST /api/domains - Add a custom domain.
pub async fn add_domain(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AddDomainRequest>, JsonRejection>,
) -> Result<Json<OpOutcome>> {
    let Json(req) = payload?;
    debug!(domain = %req.domain, "Add domain requested");

    let result = state.registry.add_custom_domain(&req.domain).await;
    Ok(Json(OpOutcome::from(result)))
}

/// DELETE /api/domains/{domain} - Remove a custom domain.
pub async fn remove_domain(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Json<OpOutcome> {
    debug!(%domain, "Remove domain requested");

    let result = state.registry.remove_custom_domain(&domain).await;
    Json(OpOutcome::from(result))
}

/// GET /api/patterns - Match patterns for every supported domain.
pub async fn get_patterns(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.all_url_patterns().await)
}

/// GET /api/check - Whether the extension acts on a URL.
pub async fn check_url(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>> {
    let url = query.url.trim();
    if url.is_empty() {
        return Err(ApiError::BadRequest("url must not be empty".to_string()));
    }

    let supported = state.registry.is_supported_url(url).await;
    let custom = state.registry.is_custom_domain_url(url).await;

    Ok(Json(CheckResponse {
        url: url.to_string(),
        supported,
        custom,
    }))
}
