use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Error taxonomy for the account/credit ledger. Every variant is recovered
/// at the route layer and surfaced as an HTTP status plus a JSON envelope;
/// none are fatal to the process.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Créditos insuficientes")]
    InsufficientCredit,

    #[error("Acesso negado")]
    Forbidden,

    #[error("Registro não encontrado")]
    NotFound,

    #[error("Identificador já existe")]
    DuplicateIdentifier,

    #[error("Entrada inválida: {0}")]
    InvalidInput(String),

    #[error("Acesso expirado")]
    Expired,

    #[error("Servidor em manutenção")]
    Maintenance,

    #[error("Falha ao gravar dados")]
    Storage(anyhow::Error),
}

impl LedgerError {
    pub fn status(&self) -> StatusCode {
        match self {
            LedgerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            LedgerError::InsufficientCredit => StatusCode::PAYMENT_REQUIRED,
            LedgerError::Forbidden | LedgerError::Expired | LedgerError::Maintenance => {
                StatusCode::FORBIDDEN
            }
            LedgerError::NotFound => StatusCode::NOT_FOUND,
            LedgerError::DuplicateIdentifier => StatusCode::CONFLICT,
            LedgerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        if let LedgerError::Storage(ref source) = self {
            tracing::error!("storage failure: {source:#}");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
