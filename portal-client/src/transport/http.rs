//! reqwest implementation of [`RelayApi`].

use async_trait::async_trait;
use clipportal_types::{PublicKeyBytes, SendEnvelope, UserCreateRequest, UserCreateResponse, UserId};
use reqwest::multipart::{Form, Part};
use std::time::Duration;

use super::{RelayApi, RelayError};

/// HTTP client for the relay.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRelay {
    /// Create a client for the relay at `base_url`.
    ///
    /// Every request is bounded by `request_timeout`.
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| RelayError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send and turn any non-2xx status into a typed error.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, RelayError> {
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            tracing::debug!("relay returned {}", status);
            Err(RelayError::from_status(status.as_u16()))
        }
    }
}

fn network_error(e: reqwest::Error) -> RelayError {
    if e.is_decode() {
        RelayError::BrokenResponse(e.to_string())
    } else {
        RelayError::Network(e.to_string())
    }
}

#[async_trait]
impl RelayApi for HttpRelay {
    async fn register(&self, public_key: &PublicKeyBytes) -> Result<UserId, RelayError> {
        let body = UserCreateRequest {
            public_key: *public_key,
        };
        let response = self
            .execute(self.client.post(self.url("users")).json(&body))
            .await?;
        let created: UserCreateResponse = response
            .json()
            .await
            .map_err(|e| RelayError::BrokenResponse(e.to_string()))?;
        tracing::info!("registered as user {}", created.id);
        Ok(created.id)
    }

    async fn fetch_public_key(&self, id: &UserId) -> Result<PublicKeyBytes, RelayError> {
        let response = self
            .execute(self.client.get(self.url(&format!("{}.publickey", id))))
            .await?;
        let body = response.text().await.map_err(network_error)?;
        PublicKeyBytes::from_base64(&body).map_err(|e| RelayError::BrokenResponse(e.to_string()))
    }

    async fn upload(
        &self,
        receiver: &UserId,
        envelope: &SendEnvelope,
        blob: Vec<u8>,
    ) -> Result<(), RelayError> {
        let meta = envelope
            .to_json()
            .map_err(|e| RelayError::Request(e.to_string()))?;
        let size = blob.len();
        let file = Part::bytes(blob)
            .file_name("blob")
            .mime_str("application/octet-stream")
            .map_err(|e| RelayError::Request(e.to_string()))?;
        let form = Form::new().text("meta", meta).part("file", file);

        self.execute(
            self.client
                .post(self.url(&format!("send/{}", receiver)))
                .multipart(form),
        )
        .await?;
        tracing::debug!("uploaded {} bytes for {}", size, receiver);
        Ok(())
    }

    async fn download(&self, id: &UserId) -> Result<Vec<u8>, RelayError> {
        let response = self.execute(self.client.get(self.url(id.as_str()))).await?;
        let bytes = response.bytes().await.map_err(network_error)?;
        tracing::debug!("downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}
