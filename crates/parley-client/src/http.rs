//! reqwest implementation of `ConversationService`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use parley_core::config::ServiceConfig;
use parley_core::types::{Identity, SessionId};

use crate::error::ServiceError;
use crate::service::ConversationService;
use crate::wire::{ChatPayload, ErrorBody, SendMessageRequest};

/// HTTP client for the `/api/chat` endpoints.
pub struct HttpConversationClient {
    base_url: Url,
    http: Client,
}

impl HttpConversationClient {
    /// Build a client for `base_url`. `timeout` of `None` leaves requests
    /// unbounded on the client side.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ServiceError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ServiceError::InvalidRequest(format!("bad base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::InvalidRequest(format!(
                "base URL {} cannot carry a path",
                base_url
            )));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self { base_url, http })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let timeout = match config.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self::new(&config.base_url, timeout)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::InvalidRequest("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Decode a 2xx body, or turn a non-2xx response into `ServiceError::Status`.
    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message);
            warn!(status = status.as_u16(), "Conversation service rejected request");
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ConversationService for HttpConversationClient {
    async fn latest_for_user(&self, identity: &Identity) -> Result<ChatPayload, ServiceError> {
        let url = self.endpoint(&["api", "chat", "user", identity.as_str(), "latest"])?;
        debug!(url = %url, "Fetching latest chat");
        let response = self.http.get(url).send().await?;
        Self::read(response).await
    }

    async fn fetch_chat(&self, chat_id: &SessionId) -> Result<ChatPayload, ServiceError> {
        let url = self.endpoint(&["api", "chat", chat_id.as_str()])?;
        debug!(url = %url, "Fetching chat");
        let response = self.http.get(url).send().await?;
        Self::read(response).await
    }

    async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<ChatPayload, ServiceError> {
        let url = self.endpoint(&["api", "chat"])?;
        debug!(url = %url, new_chat = request.chat_id.is_none(), "Sending message");
        let response = self.http.post(url).json(request).send().await?;
        Self::read(response).await
    }
}
