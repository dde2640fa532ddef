// src/models/tenancy.rs

use std::fmt;
use uuid::Uuid;

use crate::common::error::AppError;

// ---
// 1. Principal (O "Dono da Sessão")
// ---
// O sujeito autenticado. Só é criado pelo middleware de auth (a partir do JWT)
// ou pelo agendador, em nome do dono de uma integração.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    id: Uuid,
}

impl Principal {
    pub(crate) fn from_session(subject: Uuid) -> Self {
        Self { id: subject }
    }

    /// Execuções agendadas agem em nome do tenant dono da integração.
    pub(crate) fn for_scheduled_run(owner_id: Uuid) -> Self {
        Self { id: owner_id }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

// ---
// 2. TenantPartition (O "Espaço Isolado" do tenant)
// ---
// Os campos são privados: a única forma de obter uma partição é via `resolve_partition`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantPartition {
    tenant_id: Uuid,
    schema: String,
}

const SCHEMA_PREFIX: &str = "client_";

/// Resolve a partição de dados do principal autenticado.
/// Determinística (mesmo principal => mesmo schema) e sem colisões (1:1 com o UUID).
pub fn resolve_partition(principal: Option<&Principal>) -> Result<TenantPartition, AppError> {
    let principal = principal.ok_or(AppError::Unauthenticated)?;

    // `simple()` = 32 dígitos hexadecimais minúsculos, sem hífens.
    let schema = format!("{}{}", SCHEMA_PREFIX, principal.id.simple());

    Ok(TenantPartition {
        tenant_id: principal.id,
        schema,
    })
}

impl TenantPartition {
    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    /// Nome do schema Postgres. Contém apenas `[a-z0-9_]`, seguro para DDL.
    pub fn schema_name(&self) -> &str {
        &self.schema
    }
}

impl fmt::Display for TenantPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.schema)
    }
}
