//! Request and response shapes of the vendor API.
//!
//! Field names on the wire are Portuguese; Rust names describe the meaning.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Every response wraps its payload in `resposta`; paging hints live in `acoes`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub resposta: T,
    #[serde(default)]
    pub acoes: Option<Value>,
}

impl<T> Envelope<T> {
    /// Whether `acoes` advertises a `proximaPagina` action.
    pub fn has_action(&self, name: &str) -> bool {
        match &self.acoes {
            Some(Value::Object(map)) => map.contains_key(name),
            Some(Value::Array(items)) => items.iter().any(|item| match item {
                Value::String(s) => s == name,
                Value::Object(map) => map.contains_key(name),
                _ => false,
            }),
            _ => false,
        }
    }
}

/// Ids arrive as strings or numbers depending on the endpoint.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = string_or_number(deserializer)?;
    Ok(Some(value).filter(|v| !v.is_empty()))
}

/// Requirement flags: `null` and missing mean "not required".
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "s" | "sim" | "1"
        ),
        _ => false,
    })
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// A municipality supported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct City {
    #[serde(rename = "nome", default)]
    pub name: String,
    #[serde(rename = "codigoIbge", deserialize_with = "string_or_number", default)]
    pub ibge_code: String,
    #[serde(rename = "padrao", default)]
    pub standard: Option<String>,
    #[serde(rename = "certificado", deserialize_with = "flag", default)]
    pub requires_certificate: bool,
    #[serde(rename = "login", deserialize_with = "flag", default)]
    pub requires_login: bool,
    #[serde(rename = "senha", deserialize_with = "flag", default)]
    pub requires_password: bool,
    #[serde(rename = "prestadorObrigatorioTomadas", deserialize_with = "flag", default)]
    pub requires_issuer: bool,
    #[serde(rename = "tipoComunicacao", default)]
    pub communication: Option<String>,
}

/// A certificate registered with the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisteredCertificate {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "nome", default)]
    pub name: Option<String>,
    #[serde(rename = "vencimento", default)]
    pub expiry: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedCertificate {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authentication {
    pub login: String,
    #[serde(rename = "senha")]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Party {
    #[serde(rename = "cpfCnpj")]
    pub tax_id: String,
    #[serde(rename = "inscricaoMunicipal", skip_serializing_if = "Option::is_none")]
    pub municipal_registration: Option<String>,
    #[serde(rename = "autenticacao", skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,
}

impl Party {
    pub fn new(tax_id: impl Into<String>) -> Self {
        Self {
            tax_id: tax_id.into(),
            municipal_registration: None,
            authentication: None,
        }
    }
}

/// Issue-date window, serialized as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    #[serde(rename = "inicial")]
    pub start: NaiveDate,
    #[serde(rename = "final")]
    pub end: NaiveDate,
}

impl Period {
    pub fn last_days(days: u32, today: NaiveDate) -> Self {
        let start = today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }
}

/// A received-documents query (`POST /tomadas`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRequest {
    #[serde(rename = "codigoCidade")]
    pub city_code: String,
    #[serde(rename = "destinatario")]
    pub recipient: Party,
    #[serde(rename = "periodo")]
    pub period: Period,
    /// The party that issued the documents; some cities require it.
    #[serde(rename = "prestador", skip_serializing_if = "Option::is_none")]
    pub issuer: Option<Party>,
}

impl QueryRequest {
    pub fn new(city_code: impl Into<String>, recipient_tax_id: impl Into<String>, period: Period) -> Self {
        Self {
            city_code: city_code.into(),
            recipient: Party::new(recipient_tax_id),
            period,
            issuer: None,
        }
    }

    pub fn with_recipient_registration(mut self, registration: Option<String>) -> Self {
        self.recipient.municipal_registration = registration;
        self
    }

    /// City portal login; only sent when both parts are present.
    pub fn with_authentication(mut self, login: Option<String>, password: Option<String>) -> Self {
        self.recipient.authentication = match (login, password) {
            (Some(login), Some(password)) => Some(Authentication { login, password }),
            _ => None,
        };
        self
    }

    pub fn with_issuer(mut self, tax_id: Option<String>, registration: Option<String>) -> Self {
        self.issuer = tax_id.map(|tax_id| Party {
            tax_id,
            municipal_registration: registration,
            authentication: None,
        });
        self
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedQuery {
    #[serde(rename = "protocolo", deserialize_with = "string_or_number")]
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryStatus {
    #[serde(rename = "situacao", default)]
    pub situation: String,
    #[serde(rename = "totalDeNotas", deserialize_with = "lenient_count", default)]
    pub total: u64,
}

impl QueryStatus {
    pub fn is_completed(&self) -> bool {
        self.situation.eq_ignore_ascii_case("CONCLUIDO")
    }

    pub fn is_failed(&self) -> bool {
        self.situation.eq_ignore_ascii_case("ERRO")
    }

    pub fn is_terminal(&self) -> bool {
        self.is_completed() || self.is_failed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NoteRef {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "numero", deserialize_with = "optional_string_or_number", default)]
    pub number: Option<String>,
}

impl NoteRef {
    /// `nota_{numero}_{id}.xml`; the id stands in for a missing number.
    pub fn file_name(&self) -> String {
        let number = self.number.as_deref().unwrap_or(&self.id);
        format!("nota_{}_{}.xml", sanitize(number), sanitize(&self.id))
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NotesBody {
    #[serde(rename = "notas", default)]
    pub notes: Vec<NoteRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotesPage {
    pub notes: Vec<NoteRef>,
    pub has_next: bool,
}
