//! Direct document downloads replaying the browser session's cookies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use super::error::TransportError;
use super::session::SessionCookie;
use crate::models::{DocumentKey, FileType};

/// User agent matching the automated browser.
pub const PORTAL_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Authentication state captured from the browser at call time.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Portal application root, e.g. `https://host/EmissorNacional`.
    pub base_url: String,
    pub cookies: Vec<SessionCookie>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(Vec<u8>),
    /// The document has no file of this type.
    NotFound,
}

/// Fetches one file for one document.
#[async_trait]
pub trait DocumentTransport: Send + Sync {
    async fn fetch(
        &self,
        snapshot: &SessionSnapshot,
        key: &DocumentKey,
        file_type: FileType,
    ) -> Result<FetchOutcome, TransportError>;
}

/// Application root derived from whatever page the session is on.
pub fn portal_base_url(current_url: &str) -> String {
    let base = current_url
        .split("/Notas")
        .next()
        .unwrap_or(current_url)
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    base.trim_end_matches('/').to_string()
}

/// Download endpoint for a key and file type.
pub fn download_url(base_url: &str, key: &DocumentKey, file_type: FileType) -> String {
    format!(
        "{}/Notas/Download/{}/{}",
        base_url.trim_end_matches('/'),
        file_type.download_segment(),
        key
    )
}

/// reqwest-backed transport. Builds a fresh cookie jar for every call.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    timeout: Duration,
    user_agent: String,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            user_agent: PORTAL_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn client_for(&self, snapshot: &SessionSnapshot, url: &Url) -> Result<Client, TransportError> {
        let jar = Jar::default();
        for cookie in &snapshot.cookies {
            let mut cookie_str = format!("{}={}", cookie.name, cookie.value);
            if !cookie.domain.is_empty() {
                cookie_str.push_str(&format!("; Domain={}", cookie.domain));
            }
            if !cookie.path.is_empty() {
                cookie_str.push_str(&format!("; Path={}", cookie.path));
            }
            jar.add_cookie_str(&cookie_str, url);
        }

        Ok(Client::builder()
            .cookie_provider(Arc::new(jar))
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .gzip(true)
            .brotli(true)
            .build()?)
    }
}

#[async_trait]
impl DocumentTransport for HttpTransport {
    async fn fetch(
        &self,
        snapshot: &SessionSnapshot,
        key: &DocumentKey,
        file_type: FileType,
    ) -> Result<FetchOutcome, TransportError> {
        let url_str = download_url(&snapshot.base_url, key, file_type);
        let url = Url::parse(&url_str)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url_str, e)))?;

        let client = self.client_for(snapshot, &url)?;
        debug!("Fetching {} for {}", file_type, key);
        let response = client.get(url).send().await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await?;
                if body.is_empty() {
                    return Err(TransportError::EmptyBody { url: url_str });
                }
                Ok(FetchOutcome::Fetched(body.to_vec()))
            }
            StatusCode::NOT_FOUND => Ok(FetchOutcome::NotFound),
            status => Err(TransportError::Status {
                status: status.as_u16(),
                url: url_str,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer one request with `response`; the handle yields the raw request.
    async fn serve_once(response: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{}/EmissorNacional", addr), handle)
    }

    fn snapshot_for(base_url: String) -> SessionSnapshot {
        SessionSnapshot {
            base_url,
            cookies: vec![SessionCookie {
                name: "ASP.NET_SessionId".to_string(),
                value: "abc123".to_string(),
                domain: String::new(),
                path: "/".to_string(),
                secure: false,
                http_only: true,
            }],
        }
    }

    fn sample_key() -> DocumentKey {
        DocumentKey::parse(&"3".repeat(50)).unwrap()
    }

    #[tokio::test]
    async fn test_ok_body_is_fetched_with_session_cookie() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 6\r\nConnection: close\r\n\r\n<NFSe>",
        )
        .await;
        let transport = HttpTransport::new(Duration::from_secs(5));
        let key = sample_key();

        let outcome = transport
            .fetch(&snapshot_for(base), &key, FileType::Structured)
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Fetched(b"<NFSe>".to_vec()));

        let request = server.await.unwrap().to_lowercase();
        assert!(
            request.starts_with(&format!("get /emissornacional/notas/download/nfse/{key} ")),
            "{request}"
        );
        assert!(request.contains("cookie: asp.net_sessionid=abc123"), "{request}");
    }

    #[tokio::test]
    async fn test_empty_ok_body_is_an_error() {
        let (base, server) =
            serve_once("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        let transport = HttpTransport::new(Duration::from_secs(5));

        let err = transport
            .fetch(&snapshot_for(base), &sample_key(), FileType::Rendered)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::EmptyBody { .. }), "{err}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_not_found_is_absence() {
        let (base, server) = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let transport = HttpTransport::new(Duration::from_secs(5));

        let outcome = transport
            .fetch(&snapshot_for(base), &sample_key(), FileType::Rendered)
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::NotFound);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_other_status_is_an_error() {
        let (base, server) = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\nfail",
        )
        .await;
        let transport = HttpTransport::new(Duration::from_secs(5));

        let err = transport
            .fetch(&snapshot_for(base), &sample_key(), FileType::Structured)
            .await
            .unwrap_err();
        match err {
            TransportError::Status { status, url } => {
                assert_eq!(status, 500);
                assert!(url.ends_with(&format!("/Notas/Download/NFSe/{}", sample_key())));
            }
            other => panic!("expected status error, got {other}"),
        }
        server.await.unwrap();
    }

    #[test]
    fn test_base_url_from_listing_page() {
        assert_eq!(
            portal_base_url("https://www.nfse.gov.br/EmissorNacional/Notas/Recebidas?pg=2"),
            "https://www.nfse.gov.br/EmissorNacional"
        );
        assert_eq!(
            portal_base_url("https://www.nfse.gov.br/EmissorNacional/"),
            "https://www.nfse.gov.br/EmissorNacional"
        );
    }

    #[test]
    fn test_download_url_templates() {
        let key = DocumentKey::parse(&"1".repeat(50)).unwrap();
        let base = "https://www.nfse.gov.br/EmissorNacional";
        assert_eq!(
            download_url(base, &key, FileType::Structured),
            format!("{base}/Notas/Download/NFSe/{key}")
        );
        assert_eq!(
            download_url(base, &key, FileType::Rendered),
            format!("{base}/Notas/Download/DANFSe/{key}")
        );
    }

    #[tokio::test]
    async fn test_invalid_base_url_is_reported() {
        let transport = HttpTransport::new(Duration::from_secs(1));
        let snapshot = SessionSnapshot {
            base_url: "not a url".to_string(),
            cookies: Vec::new(),
        };
        let key = DocumentKey::parse(&"2".repeat(44)).unwrap();
        let err = transport
            .fetch(&snapshot, &key, FileType::Structured)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }
}
