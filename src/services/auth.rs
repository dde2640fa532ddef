// src/services/auth.rs

use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::{
    common::error::AppError,
    models::{auth::Claims, tenancy::Principal},
};

/// Valida os JWTs do provedor de sessão. Não emite tokens: login e cadastro
/// ficam fora deste serviço.
#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
    audience: Option<String>,
}

impl AuthService {
    pub fn new(jwt_secret: String, audience: Option<String>) -> Self {
        Self { jwt_secret, audience }
    }

    pub fn validate_token(&self, token: &str) -> Result<Principal, AppError> {
        let mut validation = Validation::default();
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "JWT recusado");
            AppError::InvalidToken
        })?;

        Ok(Principal::from_session(token_data.claims.sub))
    }
}
