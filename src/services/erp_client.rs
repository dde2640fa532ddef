// src/services/erp_client.rs

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::{
    common::error::AppError,
    models::catalog::{ItemRejection, NormalizedItem},
};

// ---
// Contrato neutro do adaptador de ERP
// ---

/// Uma página da listagem, já normalizada item a item.
/// `items.len()` é o número bruto de itens que o ERP devolveu (inclusive os rejeitados).
#[derive(Debug, Clone, Default)]
pub struct ErpPage {
    pub items: Vec<Result<NormalizedItem, ItemRejection>>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErpError {
    // Erro de negócio (token inválido, conta bloqueada...): aborta a execução inteira.
    #[error("ERP recusou a requisição: {0}")]
    Rejected(String),

    // Rede, timeout, HTTP != 2xx ou corpo ilegível.
    #[error("falha de transporte: {0}")]
    Transport(String),
}

impl From<ErpError> for AppError {
    fn from(err: ErpError) -> Self {
        match err {
            ErpError::Rejected(detail) => AppError::InvalidCredential(detail),
            ErpError::Transport(detail) => AppError::ErpTransport(detail),
        }
    }
}

#[async_trait]
pub trait ErpClient: Send + Sync {
    /// Tamanho de página fixado pelo protocolo do ERP. Página menor = fim do catálogo.
    fn page_size(&self) -> usize;

    /// Busca a página `page` (começa em 1).
    async fn fetch_page(&self, credential: &str, page: u32) -> Result<ErpPage, ErpError>;
}

// ---
// Implementação: Tiny ERP (API v2, produtos.pesquisa)
// ---

pub const TINY_PAGE_SIZE: usize = 100;

// "A consulta não retornou registros": para nós é só uma página vazia.
const TINY_NO_RECORDS: &str = "20";

#[derive(Debug, Serialize)]
struct TinySearchRequest<'a> {
    token: &'a str,
    formato: &'a str,
    pesquisa: &'a str,
    pagina: u32,
}

#[derive(Debug, Deserialize)]
struct TinyEnvelope {
    retorno: TinyReturn,
}

#[derive(Debug, Deserialize)]
struct TinyReturn {
    status: String,
    #[serde(default)]
    codigo_erro: Option<Value>,
    #[serde(default)]
    erros: Vec<TinyErrorEntry>,
    // Cada produto é decodificado separadamente: um item ruim não derruba a página.
    #[serde(default)]
    produtos: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TinyErrorEntry {
    erro: String,
}

#[derive(Debug, Deserialize)]
struct TinyProduct {
    id: Value,
    nome: String,
    #[serde(default)]
    descricao: Option<String>,
    preco: Value,
    #[serde(default)]
    preco_promocional: Option<Value>,
    situacao: String,
}

#[derive(Clone)]
pub struct TinyClient {
    http: reqwest::Client,
    url: String,
}

impl TinyClient {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Falha ao criar o cliente HTTP do Tiny: {}", e))?;

        Ok(Self { http, url: url.into() })
    }
}

#[async_trait]
impl ErpClient for TinyClient {
    fn page_size(&self) -> usize {
        TINY_PAGE_SIZE
    }

    async fn fetch_page(&self, credential: &str, page: u32) -> Result<ErpPage, ErpError> {
        let request = TinySearchRequest {
            token: credential,
            formato: "json",
            pesquisa: "",
            pagina: page,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ErpError::Transport(format!("HTTP {}", status)));
        }

        let envelope: TinyEnvelope = response.json().await.map_err(transport_error)?;
        let retorno = envelope.retorno;

        if retorno.status.eq_ignore_ascii_case("erro") {
            if error_code(&retorno.codigo_erro).as_deref() == Some(TINY_NO_RECORDS) {
                return Ok(ErpPage::default());
            }
            let detail = retorno
                .erros
                .iter()
                .map(|e| e.erro.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            let detail = if detail.is_empty() { "erro sem descrição".to_string() } else { detail };
            return Err(ErpError::Rejected(detail));
        }

        let items = retorno
            .produtos
            .into_iter()
            .map(normalize_entry)
            .collect();

        Ok(ErpPage { items })
    }
}

fn transport_error(e: reqwest::Error) -> ErpError {
    if e.is_timeout() {
        ErpError::Transport("timeout".to_string())
    } else {
        ErpError::Transport(e.to_string())
    }
}

fn error_code(raw: &Option<Value>) -> Option<String> {
    match raw {
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

// Cada entrada da lista vem embrulhada em `{ "produto": {...} }`.
fn normalize_entry(mut entry: Value) -> Result<NormalizedItem, ItemRejection> {
    match entry.get_mut("produto").map(Value::take) {
        Some(raw) if raw.is_object() => normalize_product(raw),
        _ => Err(ItemRejection {
            erp_id: None,
            reason: "entrada sem produto".to_string(),
        }),
    }
}

/// Converte o produto cru do Tiny no formato neutro e já valida.
fn normalize_product(raw: Value) -> Result<NormalizedItem, ItemRejection> {
    let raw_id = raw.get("id").and_then(id_to_string);

    let product: TinyProduct = serde_json::from_value(raw).map_err(|e| ItemRejection {
        erp_id: raw_id.clone(),
        reason: format!("formato inesperado: {}", e),
    })?;

    let reject = |reason: String| ItemRejection {
        erp_id: raw_id.clone(),
        reason,
    };

    let erp_id = id_to_string(&product.id).ok_or_else(|| reject("id ausente".into()))?;
    let sale_price = parse_price(&product.preco)
        .ok_or_else(|| reject(format!("preço inválido: {}", product.preco)))?;

    // Promocional zerado ou vazio = sem promoção
    let promotional_price = match &product.preco_promocional {
        None | Some(Value::Null) => None,
        Some(raw_promo) => {
            let promo = parse_price(raw_promo)
                .ok_or_else(|| reject(format!("preço promocional inválido: {}", raw_promo)))?;
            (!promo.is_zero()).then_some(promo)
        }
    };

    let item = NormalizedItem {
        erp_id,
        title: product.nome.trim().to_string(),
        description: product.descricao.filter(|d| !d.trim().is_empty()),
        sale_price,
        promotional_price,
        is_active: product.situacao == "A",
    };

    item.check()?;
    Ok(item)
}

fn id_to_string(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_price(raw: &Value) -> Option<Decimal> {
    let text = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) if s.trim().is_empty() => return Some(Decimal::ZERO),
        Value::String(s) => s.trim().replace(',', "."),
        _ => return None,
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
