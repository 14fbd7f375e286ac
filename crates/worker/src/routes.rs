use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skintrack_core::ChannelRegistration;

use crate::{
    error::{ApiResult, AppError},
    state::AppState,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/status", get(status))
        .route("/v1/channels", post(open_channel))
        .route("/v1/channels/{channel_id}", delete(close_channel))
        .route(
            "/v1/channels/{channel_id}/listings",
            post(track).get(list_listings),
        )
        .route(
            "/v1/channels/{channel_id}/listings/{sale_id}",
            delete(untrack),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    tracked_listings: usize,
    channels: usize,
    presence: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenChannelRequest {
    community_id: String,
    channel_id: String,
    user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenChannelResponse {
    channel_id: String,
    created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    replaced: Option<String>,
}

#[derive(Debug, Serialize)]
struct RemovedResponse {
    removed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackRequest {
    sale_id: i64,
    item_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackResponse {
    added: bool,
    sale_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListingItem {
    sale_id: i64,
    item_name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ListingListResponse {
    items: Vec<ListingItem>,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        tracked_listings: state.status.tracked(),
        channels: state.status.channels(),
        presence: state.status.presence_text(),
    })
}

async fn open_channel(
    State(state): State<AppState>,
    Json(req): Json<OpenChannelRequest>,
) -> ApiResult<(StatusCode, Json<OpenChannelResponse>)> {
    if req.community_id.is_empty() || req.channel_id.is_empty() || req.user_id.is_empty() {
        return Err(AppError::BadRequest(
            "communityId, channelId and userId are required".to_string(),
        ));
    }

    let registration = state
        .tracker
        .open_channel(&req.community_id, &req.channel_id, &req.user_id)?;
    let created = registration.is_new();
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let replaced = match registration {
        ChannelRegistration::Replaced { previous } => Some(previous),
        _ => None,
    };

    Ok((
        status,
        Json(OpenChannelResponse {
            channel_id: req.channel_id,
            created,
            replaced,
        }),
    ))
}

async fn close_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> ApiResult<Json<RemovedResponse>> {
    let removed = state.tracker.close_channel(&channel_id)?;
    Ok(Json(RemovedResponse { removed }))
}

async fn track(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(req): Json<TrackRequest>,
) -> ApiResult<(StatusCode, Json<TrackResponse>)> {
    if state.tracker.channel(&channel_id).is_none() {
        return Err(AppError::NotFound(format!("channel {}", channel_id)));
    }

    if !state
        .tracker
        .track(&channel_id, req.sale_id, req.item_name.as_deref())?
    {
        return Err(AppError::Conflict(
            "You're already tracking this listing.".to_string(),
        ));
    }

    Ok((
        StatusCode::CREATED,
        Json(TrackResponse {
            added: true,
            sale_id: req.sale_id,
        }),
    ))
}

async fn untrack(
    State(state): State<AppState>,
    Path((channel_id, sale_id)): Path<(String, i64)>,
) -> ApiResult<Json<RemovedResponse>> {
    if !state.tracker.untrack(&channel_id, sale_id)? {
        return Err(AppError::NotFound(
            "You weren't tracking that listing.".to_string(),
        ));
    }
    Ok(Json(RemovedResponse { removed: true }))
}

async fn list_listings(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Json<ListingListResponse> {
    let items = state
        .tracker
        .list(&channel_id)
        .into_iter()
        .map(|l| ListingItem {
            sale_id: l.sale_id,
            item_name: l.item_name,
            created_at: l.created_at,
        })
        .collect();
    Json(ListingListResponse { items })
}
