use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use super::error::ApiError;
use super::extract::JsonBody;
use crate::client_ip::extract_client_ip;
use crate::config::ClientIpConfig;
use crate::counter::CounterService;
use crate::models::{
    ApplyLikeRequest, LikeOutcome, Post, PostStats, RecordViewRequest, ViewOutcome,
};

pub struct AppState {
    pub counter: Arc<CounterService>,
    pub client_ip: ClientIpConfig,
}

impl AppState {
    /// Address fed into identity derivation for this request
    fn requester_address(&self, headers: &HeaderMap, peer: SocketAddr) -> String {
        extract_client_ip(headers, peer.ip(), &self.client_ip).to_string()
    }
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct PostListResponse {
    pub posts: Vec<Post>,
    pub next_cursor: Option<String>,
}

/// Record a view of a post
pub async fn record_view(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<RecordViewRequest>,
) -> Result<Json<ViewOutcome>, ApiError> {
    let address = state.requester_address(&headers, peer);
    let outcome = state.counter.record_view(&payload.slug, &address).await?;

    Ok(Json(outcome))
}

/// Like or unlike a post
pub async fn apply_like(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<ApplyLikeRequest>,
) -> Result<Json<LikeOutcome>, ApiError> {
    let address = state.requester_address(&headers, peer);
    let outcome = state
        .counter
        .apply_like(&payload.slug, &address, payload.delta)
        .await?;

    Ok(Json(outcome))
}

/// Counters for one post as seen by the requester
pub async fn get_post_stats(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Result<Json<PostStats>, ApiError> {
    let address = state.requester_address(&headers, peer);
    let stats = state.counter.post_stats(&slug, &address).await?;

    Ok(Json(stats))
}

/// List posts newest first
pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PostListResponse>, ApiError> {
    let page = state
        .counter
        .list_posts(query.limit, query.cursor.as_deref())
        .await?;

    Ok(Json(PostListResponse {
        posts: page.posts,
        next_cursor: page.next_cursor,
    }))
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}
