//! Delivery through an external connection management API.
//!
//! Each push is `POST {endpoint}/@connections/{id}` with the payload as the
//! request body. `410 Gone` is the only response treated as authoritative
//! for eviction; everything else that is not 2xx is transient.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode, Url};
use tokio::time::{timeout_at, Instant};

use crate::connection::ConnectionId;
use crate::fanout::Payload;

use super::channel::{DeliveryChannel, DeliveryError};
use super::DeliverySetupError;

pub struct HttpDeliveryChannel {
    client: Client,
    endpoint: Url,
}

impl HttpDeliveryChannel {
    pub fn new(endpoint: &str) -> Result<Self, DeliverySetupError> {
        Self::with_client(Client::builder().build()?, endpoint)
    }

    pub fn with_client(client: Client, endpoint: &str) -> Result<Self, DeliverySetupError> {
        let invalid = |reason: String| DeliverySetupError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };

        let endpoint_url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
        if endpoint_url.cannot_be_a_base() {
            return Err(invalid("endpoint cannot be used as a base URL".to_string()));
        }

        Ok(Self {
            client,
            endpoint: endpoint_url,
        })
    }

    fn connection_url(&self, id: &ConnectionId) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("@connections").push(id.as_str());
        }
        url
    }
}

#[async_trait]
impl DeliveryChannel for HttpDeliveryChannel {
    async fn send(
        &self,
        id: &ConnectionId,
        payload: &Payload,
        deadline: Instant,
    ) -> Result<(), DeliveryError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(DeliveryError::Timeout);
        }

        let request = self
            .client
            .post(self.connection_url(id))
            .header(header::CONTENT_TYPE, payload.content_type())
            .timeout(remaining)
            .body(payload.bytes())
            .send();

        let response = match timeout_at(deadline, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => return Err(DeliveryError::Timeout),
            Ok(Err(e)) => return Err(DeliveryError::Transient(e.to_string())),
            Err(_) => return Err(DeliveryError::Timeout),
        };

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::GONE {
            Err(DeliveryError::Gone)
        } else {
            tracing::debug!(
                connection_id = %id,
                status = status.as_u16(),
                "Management API rejected push"
            );
            Err(DeliveryError::Transient(format!("status {}", status.as_u16())))
        }
    }

    fn channel_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url() {
        let channel = HttpDeliveryChannel::new("https://abc123.example.com/prod").unwrap();
        let url = channel.connection_url(&ConnectionId::from("Yx9fAcd1oAMCIdQ="));
        assert_eq!(
            url.as_str(),
            "https://abc123.example.com/prod/@connections/Yx9fAcd1oAMCIdQ="
        );
    }

    #[test]
    fn test_connection_url_trailing_slash_and_escaping() {
        let channel = HttpDeliveryChannel::new("http://localhost:9000/").unwrap();
        let url = channel.connection_url(&ConnectionId::from("a/b c"));
        assert_eq!(url.as_str(), "http://localhost:9000/@connections/a%2Fb%20c");
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(
            HttpDeliveryChannel::new("not a url"),
            Err(DeliverySetupError::InvalidEndpoint { .. })
        ));
        assert!(HttpDeliveryChannel::new("mailto:ops@example.com").is_err());
    }
}
