//! Xtream-Codes-compatible playback endpoints
//!
//! These are the routes IPTV players hit directly. Status codes, payload
//! fields and headers mirror the Xtream wire contract, so existing players
//! keep working unchanged.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::LedgerError;
use crate::metrics::PLAYBACK_AUTH_TOTAL;
use crate::services::m3u::render_playlist;
use crate::AppState;

const XMLTV_EMPTY: &str =
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE tv SYSTEM \"xmltv.dtd\">\n<tv></tv>";

// ============================================================================
// Query Parameters
// ============================================================================

#[derive(Deserialize)]
pub struct PlaybackQuery {
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

// ============================================================================
// Helpers
// ============================================================================

fn auth_error(message: &str) -> serde_json::Value {
    serde_json::json!({
        "user_info": { "auth": 0 },
        "message": message,
        "status": "error"
    })
}

fn category_id(group: &str) -> &'static str {
    if group == "Outros" {
        "2"
    } else {
        "1"
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET /get.php - the full M3U playlist for an authorized client
pub async fn get_playlist(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PlaybackQuery>,
) -> Response {
    let (Some(username), Some(password)) = (query.username, query.password) else {
        return (StatusCode::BAD_REQUEST, "Parâmetros inválidos!").into_response();
    };

    match state.ledger.authorize_playback(&username, &password).await {
        Err(LedgerError::Expired) => {
            PLAYBACK_AUTH_TOTAL.with_label_values(&["expired"]).inc();
            (StatusCode::FORBIDDEN, "Acesso expirado!").into_response()
        }
        Err(_) => {
            PLAYBACK_AUTH_TOTAL.with_label_values(&["denied"]).inc();
            tracing::warn!(%username, "playlist denied");
            (
                StatusCode::FORBIDDEN,
                "Credenciais inválidas ou cliente bloqueado!",
            )
                .into_response()
        }
        Ok(_) => {
            PLAYBACK_AUTH_TOTAL.with_label_values(&["ok"]).inc();
            let channels = state.m3u.channels().await;
            if channels.is_empty() {
                tracing::error!(%username, "no channels available for playlist");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Erro ao carregar a playlist!")
                    .into_response();
            }

            tracing::info!(%username, channels = channels.len(), "playlist served");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/x-mpegURL"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=playlist.m3u",
                    ),
                    (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
                    (header::PRAGMA, "no-cache"),
                    (header::EXPIRES, "0"),
                ],
                render_playlist(&channels),
            )
                .into_response()
        }
    }
}

/// GET /player_api.php - Xtream player API (user info, categories, streams)
pub async fn player_api(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PlaybackQuery>,
) -> Response {
    let (Some(username), Some(password)) = (query.username, query.password) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(auth_error("Credenciais ausentes")),
        )
            .into_response();
    };

    let client = match state.ledger.authorize_playback(&username, &password).await {
        Ok(client) => {
            PLAYBACK_AUTH_TOTAL.with_label_values(&["ok"]).inc();
            client
        }
        Err(LedgerError::Expired) => {
            PLAYBACK_AUTH_TOTAL.with_label_values(&["expired"]).inc();
            return (
                StatusCode::UNAUTHORIZED,
                Json(auth_error("Acesso expirado")),
            )
                .into_response();
        }
        Err(_) => {
            PLAYBACK_AUTH_TOTAL.with_label_values(&["denied"]).inc();
            return (
                StatusCode::UNAUTHORIZED,
                Json(auth_error("Credenciais inválidas")),
            )
                .into_response();
        }
    };

    match query.action.as_deref() {
        Some("get_live_categories") => Json(serde_json::json!([
            { "category_id": "1", "category_name": "Live TV", "parent_id": 0 },
            { "category_id": "2", "category_name": "Outros", "parent_id": 0 }
        ]))
        .into_response(),

        Some("get_live_streams") => {
            let channels = state.m3u.channels().await;
            if channels.is_empty() {
                tracing::error!(%username, "no channels available for live streams");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({
                        "message": "Erro ao carregar canais",
                        "status": "error"
                    })),
                )
                    .into_response();
            }

            let added = Utc::now().timestamp().to_string();
            let streams: Vec<serde_json::Value> = channels
                .iter()
                .map(|channel| {
                    serde_json::json!({
                        "stream_id": channel.tvg_id,
                        "name": channel.name,
                        "logo": channel.logo,
                        "epg_channel_id": channel.tvg_id,
                        "category_id": category_id(&channel.group),
                        "stream_type": "live",
                        "stream_url": channel.url,
                        "added": added,
                        "is_adult": 0
                    })
                })
                .collect();

            tracing::info!(%username, streams = streams.len(), "live streams served");
            Json(streams).into_response()
        }

        // get_user_info, the legacy user_info, a missing action and any
        // unknown action all fall back to the user-info payload.
        _ => {
            let now = Utc::now();
            Json(serde_json::json!({
                "user_info": {
                    "username": username,
                    "password": password,
                    "message": "Login successful",
                    "auth": 1,
                    "status": "Active",
                    "exp_date": client.expiry_timestamp(),
                    "is_trial": 0,
                    "active_cons": 0,
                    "created_at": now.timestamp(),
                    "max_connections": client.connections,
                    "allowed_output_formats": ["ts", "m3u8"]
                },
                "server_info": {
                    "url": state.config.public_url,
                    "port": "80",
                    "rtmp_port": "0",
                    "timezone": "America/Sao_Paulo",
                    "time_now": now.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }))
            .into_response()
        }
    }
}

/// GET /xmltv.php - minimal static EPG document after a credential check
pub async fn xmltv(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PlaybackQuery>,
) -> Response {
    let (Some(username), Some(password)) = (query.username, query.password) else {
        return (StatusCode::UNAUTHORIZED, "Credenciais inválidas").into_response();
    };

    if state
        .ledger
        .lookup_playback(&username, &password)
        .await
        .is_err()
    {
        tracing::warn!(%username, "xmltv denied");
        return (StatusCode::UNAUTHORIZED, "Credenciais inválidas").into_response();
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/xml"),
            (header::CONTENT_DISPOSITION, "attachment; filename=epg.xml"),
        ],
        XMLTV_EMPTY,
    )
        .into_response()
}
