//! JSON panel API
//!
//! The management surface for admins and resellers. Session handling lives
//! outside this server: every request carries the acting identity in the
//! `X-Panel-User` / `X-Panel-Pass` headers and is re-authenticated through
//! the ledger.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::LedgerError;
use crate::models::{Client, ClientStatus, PanelSettings, Role};
use crate::services::ledger::Session;
use crate::AppState;

const USER_HEADER: &str = "x-panel-user";
const PASS_HEADER: &str = "x-panel-pass";

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub username: String,
    pub role: String,
    pub credits: String,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            username: session.username,
            role: session.role.to_string(),
            credits: session.credits.display(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub clients_count: usize,
    pub resellers_count: usize,
    pub credits: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    pub name: String,
    pub password: String,
    pub connections: u32,
    pub months: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientResponse {
    pub client_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    pub id: String,
    pub name: String,
    pub password: String,
    pub connections: u32,
    pub expiry_date: chrono::NaiveDate,
    pub status: ClientStatus,
    pub owner: String,
}

fn client_summary(id: String, client: Client) -> ClientSummary {
    ClientSummary {
        id,
        name: client.name,
        password: client.password,
        connections: client.connections,
        expiry_date: client.expiry_date,
        status: client.status,
        owner: client.owner,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleBlockResponse {
    pub status: ClientStatus,
}

#[derive(Serialize)]
pub struct ClientInfoResponse {
    pub info: String,
}

fn default_role() -> Role {
    Role::Simple
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResellerRequest {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub credits: u32,
    #[serde(default = "default_role")]
    pub role: Role,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResellerSummary {
    pub name: String,
    pub role: String,
    pub credits: String,
    pub created_by: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub username: String,
    pub role: String,
    pub credits: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

// Field names match PanelSettings, which is also the response shape.
#[derive(Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub client_info_template: Option<String>,
    #[serde(default)]
    pub public_url2: Option<String>,
    #[serde(default)]
    pub public_url3: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceResponse {
    pub maintenance_mode: bool,
}

// ============================================================================
// Helpers
// ============================================================================

async fn actor_session(state: &AppState, headers: &HeaderMap) -> Result<Session, LedgerError> {
    let user = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(LedgerError::InvalidCredentials)?;
    let pass = headers
        .get(PASS_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(LedgerError::InvalidCredentials)?;
    state.ledger.authenticate(user, pass).await
}

/// Fill the client-info template a reseller copies to the customer.
fn render_client_info(
    settings: &PanelSettings,
    client: &Client,
    public_url: &str,
) -> String {
    let access_url = format!(
        "{public_url}/get.php?username={}&password={}&type=m3u_plus&output=ts",
        client.name, client.password
    );
    settings
        .client_info_template
        .replace("#user_iptv#", &client.name)
        .replace("#pass_iptv#", &client.password)
        .replace("#url_m3u#", &access_url)
        .replace("#dns_iptv#", public_url)
        .replace("#dns_iptv2#", &settings.public_url2)
        .replace("#dns_iptv3#", &settings.public_url3)
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST /api/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, LedgerError> {
    let session = state
        .ledger
        .authenticate(&payload.username, &payload.password)
        .await?;
    Ok(Json(session.into()))
}

/// GET /api/dashboard
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DashboardResponse>, LedgerError> {
    let session = actor_session(&state, &headers).await?;
    let counts = state.ledger.counts(&session.username).await?;
    Ok(Json(DashboardResponse {
        clients_count: counts.clients,
        resellers_count: counts.resellers,
        credits: counts.credits.display(),
    }))
}

/// GET /api/clients
pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ClientSummary>>, LedgerError> {
    let session = actor_session(&state, &headers).await?;
    let clients = state.ledger.list_clients(&session.username).await?;
    Ok(Json(
        clients
            .into_iter()
            .map(|(id, client)| client_summary(id, client))
            .collect(),
    ))
}

/// POST /api/clients
pub async fn create_client(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateClientRequest>,
) -> Result<Json<CreateClientResponse>, LedgerError> {
    let session = actor_session(&state, &headers).await?;
    let client_id = state
        .ledger
        .create_client(
            &session.username,
            &payload.name,
            &payload.password,
            payload.connections,
            payload.months,
        )
        .await?;
    Ok(Json(CreateClientResponse { client_id }))
}

/// DELETE /api/clients/:id
pub async fn delete_client(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(client_id): Path<String>,
) -> Result<Json<serde_json::Value>, LedgerError> {
    let session = actor_session(&state, &headers).await?;
    state
        .ledger
        .delete_client(&session.username, &client_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// POST /api/clients/:id/block
pub async fn toggle_block(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(client_id): Path<String>,
) -> Result<Json<ToggleBlockResponse>, LedgerError> {
    let session = actor_session(&state, &headers).await?;
    let status = state
        .ledger
        .toggle_block(&session.username, &client_id)
        .await?;
    Ok(Json(ToggleBlockResponse { status }))
}

/// GET /api/clients/:id/info
pub async fn client_info(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(client_id): Path<String>,
) -> Result<Json<ClientInfoResponse>, LedgerError> {
    let session = actor_session(&state, &headers).await?;
    let client = state
        .ledger
        .client_for_actor(&session.username, &client_id)
        .await?;
    let settings = state.ledger.settings().await;
    Ok(Json(ClientInfoResponse {
        info: render_client_info(&settings, &client, &state.config.public_url),
    }))
}

/// GET /api/resellers
pub async fn list_resellers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ResellerSummary>>, LedgerError> {
    let session = actor_session(&state, &headers).await?;
    let resellers = state.ledger.list_resellers(&session.username).await?;
    Ok(Json(
        resellers
            .into_iter()
            .map(|(name, account)| ResellerSummary {
                name,
                role: account.role.to_string(),
                credits: account.credits.display(),
                created_by: account.created_by,
            })
            .collect(),
    ))
}

/// POST /api/resellers
pub async fn create_reseller(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateResellerRequest>,
) -> Result<Json<serde_json::Value>, LedgerError> {
    let session = actor_session(&state, &headers).await?;
    state
        .ledger
        .create_reseller(
            &session.username,
            &payload.name,
            &payload.password,
            payload.credits,
            payload.role,
        )
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// DELETE /api/resellers/:name
pub async fn delete_reseller(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, LedgerError> {
    let session = actor_session(&state, &headers).await?;
    state
        .ledger
        .delete_reseller(&session.username, &name)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /api/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ProfileResponse>, LedgerError> {
    let session = actor_session(&state, &headers).await?;
    let (email, session) = state.ledger.profile(&session.username).await?;
    Ok(Json(ProfileResponse {
        username: session.username,
        role: session.role.to_string(),
        credits: session.credits.display(),
        email,
    }))
}

/// PUT /api/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<serde_json::Value>, LedgerError> {
    let session = actor_session(&state, &headers).await?;
    let email = payload.email.as_deref().filter(|e| !e.is_empty());
    let password = payload.password.as_deref().filter(|p| !p.is_empty());
    state
        .ledger
        .update_profile(&session.username, email, password)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /api/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<PanelSettings>, LedgerError> {
    let session = actor_session(&state, &headers).await?;
    if session.role != Role::Admin {
        return Err(LedgerError::Forbidden);
    }
    Ok(Json(state.ledger.settings().await))
}

/// PUT /api/settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<UpdateSettingsRequest>,
) -> Result<Json<PanelSettings>, LedgerError> {
    let session = actor_session(&state, &headers).await?;
    let settings = state
        .ledger
        .update_settings(
            &session.username,
            payload.client_info_template,
            payload.public_url2,
            payload.public_url3,
        )
        .await?;
    Ok(Json(settings))
}

/// POST /api/settings/maintenance
pub async fn toggle_maintenance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MaintenanceResponse>, LedgerError> {
    let session = actor_session(&state, &headers).await?;
    let maintenance_mode = state.ledger.toggle_maintenance(&session.username).await?;
    Ok(Json(MaintenanceResponse { maintenance_mode }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn client_info_template_substitutes_placeholders() {
        let settings = PanelSettings {
            public_url2: "http://dns2".to_string(),
            public_url3: "http://dns3".to_string(),
            ..PanelSettings::default()
        };
        let client = Client {
            name: "bob".to_string(),
            password: "s3cret".to_string(),
            connections: 2,
            expiry_date: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
            status: ClientStatus::Active,
            owner: "admin".to_string(),
        };

        let info = render_client_info(&settings, &client, "http://painel.example");

        assert!(info.contains("Usuário: bob"));
        assert!(info.contains("Senha: s3cret"));
        assert!(info.contains(
            "http://painel.example/get.php?username=bob&password=s3cret&type=m3u_plus&output=ts"
        ));
        assert!(info.contains("DNS2: http://dns2"));
        assert!(info.contains("DNS3: http://dns3"));
    }
}
