//! HTTP client for the studio content API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use super::{ContentService, MutationTransport, ServerContent};
use crate::error::{Error, Result};
use crate::models::{MutationKind, QueuedMutation};
use crate::util::{excerpt, is_http_url, normalize_text_option};

const HTTP_TIMEOUT_SECS: u64 = 15;
const ERROR_EXCERPT_CHARS: usize = 180;

/// `reqwest`-backed [`ContentService`] and [`MutationTransport`]
#[derive(Clone)]
pub struct HttpContentService {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpContentService {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpContentService")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SaveResponse {
    version: i64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl HttpContentService {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            base_url,
            token: normalize_text_option(token),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chapter_url(&self, project_id: &str, chapter_id: &str) -> String {
        format!(
            "{}/projects/{}/chapters/{}",
            self.base_url,
            urlencoding::encode(project_id),
            urlencoding::encode(chapter_id)
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Remote {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        })
    }
}

#[async_trait]
impl ContentService for HttpContentService {
    async fn get_chapter_content(
        &self,
        project_id: &str,
        chapter_id: &str,
    ) -> Result<ServerContent> {
        let url = format!("{}/content", self.chapter_url(project_id, chapter_id));
        let response = self.execute(self.request(Method::GET, &url)).await?;
        Ok(response.json::<ServerContent>().await?)
    }

    async fn save_chapter_content(
        &self,
        project_id: &str,
        chapter_id: &str,
        content: &str,
    ) -> Result<i64> {
        let url = format!("{}/content", self.chapter_url(project_id, chapter_id));
        let body = serde_json::json!({ "content": content });
        let response = self
            .execute(self.request(Method::PUT, &url).json(&body))
            .await?;
        Ok(response.json::<SaveResponse>().await?.version)
    }

    async fn create_chapter(
        &self,
        project_id: &str,
        chapter_id: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let url = format!(
            "{}/projects/{}/chapters",
            self.base_url,
            urlencoding::encode(project_id)
        );
        let mut body = payload.clone();
        if let Some(object) = body.as_object_mut() {
            object
                .entry("id")
                .or_insert_with(|| serde_json::Value::String(chapter_id.to_string()));
        }
        self.execute(self.request(Method::POST, &url).json(&body))
            .await?;
        Ok(())
    }

    async fn update_chapter(
        &self,
        project_id: &str,
        chapter_id: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let url = self.chapter_url(project_id, chapter_id);
        self.execute(self.request(Method::PATCH, &url).json(payload))
            .await?;
        Ok(())
    }

    async fn delete_chapter(&self, project_id: &str, chapter_id: &str) -> Result<()> {
        let url = self.chapter_url(project_id, chapter_id);
        self.execute(self.request(Method::DELETE, &url)).await?;
        Ok(())
    }
}

#[async_trait]
impl MutationTransport for HttpContentService {
    async fn send(&self, mutation: &QueuedMutation) -> Result<()> {
        let url = mutation_url(&self.base_url, &mutation.endpoint);
        let builder = match mutation.kind {
            MutationKind::Create => self.request(Method::POST, &url).json(&mutation.payload),
            MutationKind::Update => self.request(Method::PATCH, &url).json(&mutation.payload),
            MutationKind::Delete => self.request(Method::DELETE, &url),
        };
        self.execute(builder).await?;
        Ok(())
    }
}

fn mutation_url(base_url: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if is_http_url(endpoint) {
        endpoint.to_string()
    } else {
        format!("{base_url}/{}", endpoint.trim_start_matches('/'))
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let base_url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("API base URL must not be empty".to_string()))?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "API base URL must include http:// or https://".to_string(),
        ))
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return excerpt(&message, ERROR_EXCERPT_CHARS);
        }
    }

    let trimmed = excerpt(body, ERROR_EXCERPT_CHARS);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_requires_http_scheme() {
        assert!(HttpContentService::new("  ", None).is_err());
        assert!(HttpContentService::new("api.example.com", None).is_err());

        let service = HttpContentService::new("https://api.example.com/", None).unwrap();
        assert_eq!(service.base_url(), "https://api.example.com");
    }

    #[test]
    fn chapter_url_encodes_segments() {
        let service = HttpContentService::new("https://api.example.com", None).unwrap();
        assert_eq!(
            service.chapter_url("p 1", "c/2"),
            "https://api.example.com/projects/p%201/chapters/c%2F2"
        );
    }

    #[test]
    fn mutation_url_joins_relative_endpoints() {
        assert_eq!(
            mutation_url("https://api.example.com", "/projects/p1/volumes"),
            "https://api.example.com/projects/p1/volumes"
        );
        assert_eq!(
            mutation_url("https://api.example.com", "https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        assert_eq!(
            parse_api_error(StatusCode::CONFLICT, r#"{"message":"stale version"}"#),
            "stale version"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn debug_redacts_token() {
        let service =
            HttpContentService::new("https://api.example.com", Some("secret".into())).unwrap();
        let debug = format!("{service:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
