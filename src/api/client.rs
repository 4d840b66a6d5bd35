//! HTTP client for the TecnoSpeed received-NFSe API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::error::ApiError;
use super::types::{
    City, CreatedCertificate, CreatedQuery, Envelope, NotesBody, NotesPage, QueryRequest,
    QueryStatus, RegisteredCertificate,
};
use super::workflow::{poll_until_terminal, ProtocolNotes};
use crate::config::ApiSettings;

/// Account identity sent as headers on every call.
#[derive(Clone)]
pub struct ApiCredentials {
    pub token: String,
    pub software_house_cnpj: String,
    pub recipient_cnpj: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("token", &"***")
            .field("software_house_cnpj", &self.software_house_cnpj)
            .field("recipient_cnpj", &self.recipient_cnpj)
            .finish()
    }
}

impl ApiCredentials {
    pub fn from_settings(settings: &ApiSettings) -> Result<Self, ApiError> {
        let require = |value: &Option<String>, env: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ApiError::MissingRequirement(format!("{} is not set", env)))
        };
        Ok(Self {
            token: require(&settings.token, "TECNOSPEED_TOKEN")?,
            software_house_cnpj: require(&settings.software_house_cnpj, "TECNOSPEED_CNPJ_SH")?,
            recipient_cnpj: require(&settings.recipient_cnpj, "TECNOSPEED_CNPJ_TOMADOR")?,
        })
    }
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    recipient_cnpj: String,
}

impl ApiClient {
    pub fn new(base_url: &str, credentials: &ApiCredentials) -> Result<Self, ApiError> {
        let header = |value: &str| {
            HeaderValue::from_str(value)
                .map_err(|e| ApiError::MissingRequirement(format!("invalid header value: {}", e)))
        };
        let mut headers = HeaderMap::new();
        headers.insert("token_sh", header(&credentials.token)?);
        headers.insert(
            "cpfCnpjSoftwareHouse",
            header(&credentials.software_house_cnpj)?,
        );
        headers.insert("cpfCnpjTomador", header(&credentials.recipient_cnpj)?);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            recipient_cnpj: credentials.recipient_cnpj.clone(),
        })
    }

    pub fn from_settings(settings: &ApiSettings) -> Result<Self, ApiError> {
        Self::new(&settings.base_url, &ApiCredentials::from_settings(settings)?)
    }

    /// The tenant CNPJ this client queries for.
    pub fn recipient_cnpj(&self) -> &str {
        &self.recipient_cnpj
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn checked(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }

    async fn envelope<T: DeserializeOwned>(response: Response) -> Result<Envelope<T>, ApiError> {
        let response = Self::checked(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Envelope(e.to_string()))
    }

    /// Supported cities, optionally filtered by a case-insensitive name fragment.
    pub async fn list_cities(&self, filter: Option<&str>) -> Result<Vec<City>, ApiError> {
        let response = self.client.get(self.url("/cidades")).send().await?;
        let cities = Self::envelope::<Vec<City>>(response).await?.resposta;

        Ok(match filter.map(str::to_uppercase) {
            Some(needle) => cities
                .into_iter()
                .filter(|c| c.name.to_uppercase().contains(&needle))
                .collect(),
            None => cities,
        })
    }

    pub async fn register_certificate(
        &self,
        path: &Path,
        password: &str,
    ) -> Result<String, ApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "certificado.pfx".to_string());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/x-pkcs12")?;
        let form = Form::new()
            .part("arquivo", part)
            .text("senha", password.to_string());

        let response = self
            .client
            .post(self.url("/certificados"))
            .multipart(form)
            .send()
            .await?;
        let created = Self::envelope::<CreatedCertificate>(response).await?.resposta;
        info!("Certificate registered: {}", created.id);
        Ok(created.id)
    }

    pub async fn list_certificates(&self) -> Result<Vec<RegisteredCertificate>, ApiError> {
        let response = self.client.get(self.url("/certificados")).send().await?;
        Ok(Self::envelope(response).await?.resposta)
    }

    /// Submit a query. Returns its protocol.
    pub async fn create_query(&self, request: &QueryRequest) -> Result<String, ApiError> {
        let response = self
            .client
            .post(self.url("/tomadas"))
            .json(request)
            .send()
            .await?;
        let created = Self::envelope::<CreatedQuery>(response).await?.resposta;
        info!("Query created, protocol {}", created.protocol);
        Ok(created.protocol)
    }

    pub async fn query_status(&self, protocol: &str) -> Result<QueryStatus, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/tomadas/{}", protocol)))
            .send()
            .await?;
        Ok(Self::envelope(response).await?.resposta)
    }

    /// Poll the protocol until it completes or fails.
    pub async fn wait_for_completion(
        &self,
        protocol: &str,
        interval: Duration,
        max_attempts: u32,
    ) -> Result<QueryStatus, ApiError> {
        poll_until_terminal(protocol, interval, max_attempts, || {
            self.query_status(protocol)
        })
        .await
    }
}

#[async_trait]
impl ProtocolNotes for ApiClient {
    async fn list_notes(&self, protocol: &str, page: u32) -> Result<NotesPage, ApiError> {
        let mut request = self
            .client
            .get(self.url(&format!("/tomadas/{}/notas", protocol)));
        if page > 1 {
            request = request.query(&[("pagina", page)]);
        }
        let envelope = Self::envelope::<NotesBody>(request.send().await?).await?;
        let has_next = envelope.has_action("proximaPagina");
        debug!(
            "Protocol {} page {}: {} notes",
            protocol,
            page,
            envelope.resposta.notes.len()
        );
        Ok(NotesPage {
            notes: envelope.resposta.notes,
            has_next,
        })
    }

    async fn download_note_xml(&self, protocol: &str, note_id: &str) -> Result<Vec<u8>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/tomadas/{}/notas/{}/xml", protocol, note_id)))
            .send()
            .await?;
        let response = Self::checked(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
