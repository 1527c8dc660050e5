// SPDX-License-Identifier: GPL-3.0-only
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use crate::api::handlers::{ApiHandlers, ApiResponse, ApiResult, OutcomeView, RefreshQuery};
use crate::store::StoredPost;

pub struct HttpServer {
    handlers: ApiHandlers,
    addr: SocketAddr,
}

impl HttpServer {
    pub fn new(handlers: ApiHandlers, addr: SocketAddr) -> Self {
        Self { handlers, addr }
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        let app = router(Arc::new(self.handlers));

        info!(addr = %self.addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

pub fn router(handlers: Arc<ApiHandlers>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/blogs/:key/posts", get(list_posts_handler))
        .route("/api/blogs/:key/posts/:source_id", get(get_post_handler))
        .route("/api/blogs/:key/refresh", post(refresh_blog_handler))
        .route("/api/refresh", post(refresh_all_handler))
        .with_state(handlers)
}

async fn health_handler() -> Json<ApiResponse<&'static str>> {
    ApiHandlers::health().await
}

async fn list_posts_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Path(key): Path<String>,
) -> ApiResult<Vec<StoredPost>> {
    handlers.list_posts(&key).await
}

async fn get_post_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Path((key, source_id)): Path<(String, String)>,
) -> ApiResult<StoredPost> {
    handlers.get_post(&key, &source_id).await
}

async fn refresh_blog_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Path(key): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<OutcomeView> {
    handlers.refresh_blog(&key, query.force).await
}

async fn refresh_all_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Query(query): Query<RefreshQuery>,
) -> (StatusCode, Json<ApiResponse<Vec<OutcomeView>>>) {
    handlers.refresh_all(query.force).await
}
