//! Production HTTP invoker backed by reqwest.

use async_trait::async_trait;
use weft_runner::{HttpInvoker, HttpRequest, HttpResponse, RunnerError};

/// [`HttpInvoker`] implementation over a shared reqwest client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestInvoker {
    client: reqwest::Client,
}

impl ReqwestInvoker {
    /// Create an invoker with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an invoker over an existing client (shared pools, proxies).
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpInvoker for ReqwestInvoker {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, RunnerError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| {
                RunnerError::invalid_configuration(format!(
                    "invalid HTTP method {:?}",
                    request.method
                ))
            })?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                RunnerError::Timeout(request.timeout)
            } else {
                RunnerError::ProviderError {
                    provider: "http".to_owned(),
                    status: 0,
                    message: err.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or_default().to_owned(),
                )
            })
            .collect();
        let text = response.text().await.map_err(|err| RunnerError::ProviderError {
            provider: "http".to_owned(),
            status,
            message: err.to_string(),
        })?;
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn invalid_method_is_configuration_error() {
        let invoker = ReqwestInvoker::new();
        let err = invoker
            .request(HttpRequest {
                method: "NOT A METHOD".into(),
                url: "http://127.0.0.1:9".into(),
                headers: vec![],
                body: None,
                timeout: Duration::from_secs(1),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_configuration");
    }

    #[tokio::test]
    async fn connection_failure_is_provider_error() {
        let invoker = ReqwestInvoker::new();
        // Port 9 (discard) is almost certainly closed.
        let err = invoker
            .request(HttpRequest {
                method: "GET".into(),
                url: "http://127.0.0.1:9/".into(),
                headers: vec![],
                body: None,
                timeout: Duration::from_secs(1),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunnerError::ProviderError { .. } | RunnerError::Timeout(_)
        ));
    }
}
