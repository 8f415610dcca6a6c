//! HTTP transport for the RPC endpoint
//!
//! Posts encoded messages to the server and hands back the raw response
//! text. Retrying is the messenger's business, not the transport's.

use async_trait::async_trait;
use reqwest::{header, Client, Response};

use crate::error::{AppError, AppResult};
use crate::settings::Settings;

/// Carries one encoded message to the server and returns the response text
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, payload: &str) -> AppResult<String>;
}

/// reqwest-backed transport posting URL-encoded forms
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(settings: &Settings) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: settings.rpc_endpoint(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check status and read the body as text
    async fn handle_response(&self, response: Response) -> AppResult<String> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Transport(format!(
                "server error ({}): {}",
                status, error_text
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &str) -> AppResult<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Transport(format!("timed out: {}", e))
                } else {
                    AppError::Transport(e.to_string())
                }
            })?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_settings() {
        let settings = Settings {
            dev_server_address: "http://127.0.0.1:9000/".to_string(),
            ..Settings::default()
        };
        let transport = HttpTransport::new(&settings).unwrap();
        assert_eq!(transport.endpoint(), "http://127.0.0.1:9000/ajax/");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // port 9 (discard) is not listening on test machines
        let settings = Settings {
            dev_server_address: "http://127.0.0.1:9".to_string(),
            ..Settings::default()
        };
        let transport = HttpTransport::new(&settings).unwrap();
        let err = transport.send("action=get_app_config").await.unwrap_err();
        assert!(err.is_transport());
    }
}
