// src/models/auth.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Estrutura de dados ("claims") dentro do JWT emitido pelo provedor de sessão
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,  // Subject (ID do usuário = ID do tenant)
    pub exp: usize, // Expiration time (quando o token expira)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}
