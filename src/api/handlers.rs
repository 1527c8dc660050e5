// SPDX-License-Identifier: GPL-3.0-only
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::store::{PostStore, StoredPost};
use crate::sync::{CollectionKey, FleetRefreshCoordinator, RefreshKind, RefreshOutcome};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(data: T, message: String) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(message),
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Wire form of a `RefreshOutcome`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeView {
    pub key: String,
    pub kind: RefreshKind,
    pub had_existing_data: bool,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl From<&RefreshOutcome> for OutcomeView {
    fn from(outcome: &RefreshOutcome) -> Self {
        Self {
            key: outcome.key.to_string(),
            kind: outcome.kind,
            had_existing_data: outcome.had_existing_data,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            error: outcome.error.as_ref().map(|e| e.to_string()),
        }
    }
}

pub type ApiError = (StatusCode, Json<ApiResponse<()>>);
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ApiResponse::<()>::error(message.into())))
}

fn parse_key(raw: &str) -> Result<CollectionKey, ApiError> {
    CollectionKey::parse(raw).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))
}

pub struct ApiHandlers {
    fleet: FleetRefreshCoordinator,
    blogs: Vec<CollectionKey>,
    wait_for_data_timeout: Duration,
}

impl ApiHandlers {
    pub fn new(fleet: FleetRefreshCoordinator, blogs: Vec<CollectionKey>, wait_for_data_timeout: Duration) -> Self {
        Self {
            fleet,
            blogs,
            wait_for_data_timeout,
        }
    }

    fn store(&self) -> &dyn PostStore {
        self.fleet.orchestrator().store().as_ref()
    }

    /// Only configured blogs are served or refreshed
    fn configured_key(&self, raw: &str) -> Result<CollectionKey, ApiError> {
        let key = parse_key(raw)?;
        if !self.blogs.contains(&key) {
            return Err(api_error(StatusCode::NOT_FOUND, format!("blog '{}' is not configured", key)));
        }
        Ok(key)
    }
}

impl ApiHandlers {
    pub async fn health() -> Json<ApiResponse<&'static str>> {
        Json(ApiResponse::success("ok"))
    }

    /// Refresh the blog if needed, then serve its stored posts
    pub async fn list_posts(&self, raw_key: &str) -> ApiResult<Vec<StoredPost>> {
        let key = self.configured_key(raw_key)?;
        let orchestrator = self.fleet.orchestrator();

        let outcome = orchestrator.refresh_one(&key, false).await;
        if !outcome.had_existing_data && !orchestrator.wait_until_any_data(&key, self.wait_for_data_timeout).await {
            warn!(blog = %key, kind = %outcome.kind, "No posts available after waiting");
        }

        let posts = self.store().list_posts(&key).await.map_err(|e| {
            error!(blog = %key, error = %e, "Failed to list posts");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to list posts")
        })?;

        if posts.is_empty() && outcome.kind == RefreshKind::Failed {
            let message = outcome
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("refresh of '{}' failed", key));
            return Err(api_error(StatusCode::BAD_GATEWAY, message));
        }

        Ok(Json(ApiResponse::success(posts)))
    }

    pub async fn get_post(&self, raw_key: &str, source_id: &str) -> ApiResult<StoredPost> {
        let key = self.configured_key(raw_key)?;
        match self.store().get_post(&key, source_id).await {
            Ok(Some(post)) => Ok(Json(ApiResponse::success(post))),
            Ok(None) => Err(api_error(
                StatusCode::NOT_FOUND,
                format!("post '{}' not found in '{}'", source_id, key),
            )),
            Err(e) => {
                error!(blog = %key, source_id = %source_id, error = %e, "Failed to get post");
                Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to get post"))
            }
        }
    }

    pub async fn refresh_blog(&self, raw_key: &str, force: bool) -> ApiResult<OutcomeView> {
        let key = self.configured_key(raw_key)?;
        info!(blog = %key, force, "Refresh requested");
        let outcome = self.fleet.orchestrator().refresh_one(&key, force).await;
        Ok(Json(ApiResponse::success(OutcomeView::from(&outcome))))
    }

    /// Refresh every configured blog; 502 carries only the critical outcomes
    pub async fn refresh_all(&self, force: bool) -> (StatusCode, Json<ApiResponse<Vec<OutcomeView>>>) {
        info!(blogs = self.blogs.len(), force, "Fleet refresh requested");
        match self.fleet.refresh_all(&self.blogs, force).await {
            Ok(outcomes) => (
                StatusCode::OK,
                Json(ApiResponse::success(outcomes.iter().map(OutcomeView::from).collect())),
            ),
            Err(e) => (
                StatusCode::BAD_GATEWAY,
                Json(ApiResponse::failure(
                    e.critical.iter().map(OutcomeView::from).collect(),
                    e.to_string(),
                )),
            ),
        }
    }
}
