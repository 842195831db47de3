//! HTTP transport for the gateway REST API

use super::{ApiRequest, HttpResponse, HttpTransport, Method};
use crate::error::TransportError;
use anyhow::Context;
use reqwest::Client;
use std::time::Duration;
use tracing::trace;

/// Header carrying the API key on every request
pub const API_KEY_HEADER: &str = "x-api-key";

/// reqwest-backed [`HttpTransport`]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ReqwestTransport {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_client(client, base_url, api_key))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<HttpResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.into(), &url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        if let Some(api_key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, api_key);
        }

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(format!("Failed to read response: {}", e)))?;

        trace!(status, bytes = body.len(), url = %url, "HTTP response received");

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let transport = ReqwestTransport::with_client(
            Client::new(),
            "https://api.example.test/v1/",
            None,
        );
        assert_eq!(transport.base_url(), "https://api.example.test/v1");
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(reqwest::Method::from(Method::Get), reqwest::Method::GET);
        assert_eq!(reqwest::Method::from(Method::Patch), reqwest::Method::PATCH);
    }
}
