use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::middleware::i18n::Locale;

// Nosso tipo de erro, agora com `thiserror` para melhor ergonomia.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Sessão ausente")]
    Unauthenticated,

    #[error("Token inválido")]
    InvalidToken,

    #[error("Nenhuma integração ativa")]
    NoActiveIntegration,

    #[error("Integração não encontrada")]
    IntegrationNotFound,

    #[error("Sincronização de produtos desativada")]
    SyncDisabled,

    #[error("Já existe uma sincronização em andamento")]
    ConcurrentRunConflict,

    // Token recusado pelo ERP na validação do cadastro
    #[error("Token do ERP inválido")]
    InvalidErpToken,

    // Erro de negócio reportado pelo ERP durante a sincronização
    #[error("Credencial recusada pelo ERP: {0}")]
    InvalidCredential(String),

    // Rede, timeout ou resposta ilegível
    #[error("Falha de comunicação com o ERP: {0}")]
    ErpTransport(String),

    #[error("Sincronização cancelada")]
    SyncCancelled,

    #[error("Limite de {0} páginas atingido")]
    SyncPageLimit(u32),

    #[error("Execução {0} já foi encerrada")]
    SyncRunAlreadyClosed(Uuid),

    // Variante para erros de banco de dados (exemplo com sqlx)
    #[error("Erro de banco de dados: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),
}

/// Erro já pronto para a resposta HTTP (status + mensagem no idioma do cliente).
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated | AppError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::NoActiveIntegration | AppError::IntegrationNotFound => StatusCode::NOT_FOUND,
            AppError::ConcurrentRunConflict | AppError::SyncDisabled => StatusCode::CONFLICT,
            AppError::InvalidErpToken | AppError::InvalidCredential(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::ErpTransport(_) | AppError::SyncPageLimit(_) => StatusCode::BAD_GATEWAY,
            AppError::SyncCancelled => StatusCode::SERVICE_UNAVAILABLE,
            AppError::SyncRunAlreadyClosed(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converte o erro de domínio na resposta da API, no idioma pedido.
    pub fn to_api_error(self, locale: &Locale) -> ApiError {
        let status = self.status();
        let pt = locale.is_portuguese();

        let error = match &self {
            // Retorna todos os detalhes da validação.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let message = if pt {
                    "Um ou mais campos são inválidos."
                } else {
                    "One or more fields are invalid."
                };
                return ApiError {
                    status,
                    error: message.to_string(),
                    details: Some(json!(details)),
                };
            }
            AppError::Unauthenticated | AppError::InvalidToken => pick(
                pt,
                "Token de autenticação inválido ou ausente.",
                "Missing or invalid authentication token.",
            ),
            AppError::NoActiveIntegration => pick(
                pt,
                "Nenhuma integração ativa com o ERP.",
                "No active ERP integration.",
            ),
            AppError::IntegrationNotFound => pick(
                pt,
                "Integração com o ERP não encontrada.",
                "ERP integration not found.",
            ),
            AppError::SyncDisabled => pick(
                pt,
                "A sincronização de produtos está desativada nas configurações.",
                "Product sync is disabled in the integration settings.",
            ),
            AppError::ConcurrentRunConflict => pick(
                pt,
                "Já existe uma sincronização em andamento para esta integração.",
                "A sync is already running for this integration.",
            ),
            AppError::InvalidErpToken => pick(pt, "Token do ERP inválido.", "Invalid ERP token."),
            AppError::InvalidCredential(detail) => {
                if pt {
                    format!("O ERP recusou a credencial: {}", detail)
                } else {
                    format!("The ERP rejected the credential: {}", detail)
                }
            }
            AppError::ErpTransport(detail) => {
                if pt {
                    format!("Falha de comunicação com o ERP: {}", detail)
                } else {
                    format!("Could not reach the ERP: {}", detail)
                }
            }
            AppError::SyncPageLimit(pages) => {
                if pt {
                    format!("A sincronização passou do limite de {} páginas.", pages)
                } else {
                    format!("The sync exceeded the {} page limit.", pages)
                }
            }
            AppError::SyncCancelled => pick(
                pt,
                "A sincronização foi cancelada.",
                "The sync was cancelled.",
            ),

            // Todos os outros erros viram 500.
            // O `tracing` loga a mensagem detalhada que `thiserror` nos deu.
            e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                pick(pt, "Ocorreu um erro inesperado.", "An unexpected error occurred.")
            }
        };

        ApiError { status, error, details: None }
    }
}

fn pick(pt: bool, portuguese: &str, english: &str) -> String {
    if pt { portuguese } else { english }.to_string()
}

// Usado pelos middlewares, que não têm o idioma em mãos.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_api_error(&Locale::default()).into_response()
    }
}
