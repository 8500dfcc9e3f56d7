//! Transport seam between the session controller and the network.
//!
//! [`HttpTransport`] is the production implementation over reqwest; tests
//! substitute scripted transports that yield canned chunk sequences.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{Result, StreamError};
use crate::request::Endpoint;

/// User-Agent sent with every request.
pub const USER_AGENT: &str = concat!("careerpath-client/", env!("CARGO_PKG_VERSION"));

/// Raw response body chunks, in arrival order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Opens requests against the guidance server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to a streaming endpoint and return the body chunks.
    ///
    /// Fails before yielding anything if the server answers with a
    /// non-success status.
    async fn open_stream(&self, endpoint: Endpoint, body: &Value) -> Result<ByteStream>;

    /// POST `body` to a one-shot endpoint and return its `reply` text.
    async fn fetch_reply(&self, endpoint: Endpoint, body: &Value) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ReplyBody {
    reply: String,
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .read_timeout(config.read_timeout())
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// Send the request and map a non-success status to an error.
    async fn post(&self, endpoint: Endpoint, body: &Value) -> Result<reqwest::Response> {
        let url = self.url(endpoint);
        tracing::debug!(url = %url, "Sending request");

        let resp = self.client.post(&url).json(body).send().await.map_err(|e| {
            tracing::error!(error = %e, url = %url, "Failed to send request");
            StreamError::from(e)
        })?;

        tracing::debug!(status = %resp.status(), "Response received");

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                url = %url,
                body = %crate::interpret::preview(&body),
                "Request rejected"
            );
            return Err(StreamError::status(status.as_u16(), endpoint.path()));
        }

        Ok(resp)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open_stream(&self, endpoint: Endpoint, body: &Value) -> Result<ByteStream> {
        let resp = self.post(endpoint, body).await?;
        let stream = resp.bytes_stream().map(|chunk| chunk.map_err(StreamError::from));
        Ok(Box::pin(stream))
    }

    async fn fetch_reply(&self, endpoint: Endpoint, body: &Value) -> Result<String> {
        let resp = self.post(endpoint, body).await?;
        let reply: ReplyBody = resp.json().await?;
        Ok(reply.reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport_for(server: &MockServer) -> HttpTransport {
        let config = ClientConfig {
            base_url: format!("{}/", server.uri()),
            ..ClientConfig::default()
        };
        HttpTransport::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_open_stream_yields_body_chunks() {
        let server = MockServer::start().await;
        let body = "data: {\"type\":\"token\",\"content\":\"Hi\"}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/api/chat/stream"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let transport = transport_for(&server);
        assert!(!transport.base_url().ends_with('/'));

        let mut stream = transport
            .open_stream(Endpoint::ChatStream, &json!({"message": "hi"}))
            .await
            .unwrap();
        let mut received = Vec::new();
        while let Some(chunk) = stream.next().await {
            received.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(String::from_utf8(received).unwrap(), body);
    }

    #[tokio::test]
    async fn test_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chatbot/stream"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = match transport_for(&server)
            .open_stream(Endpoint::ChatbotStream, &json!({}))
            .await
        {
            Ok(_) => panic!("expected a status error"),
            Err(e) => e,
        };
        assert_eq!(err.status_code(), Some(503));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_fetch_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/career-quiz"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"reply": "Try UX research."})),
            )
            .mount(&server)
            .await;

        let reply = transport_for(&server)
            .fetch_reply(Endpoint::CareerQuiz, &json!({"answers": []}))
            .await
            .unwrap();
        assert_eq!(reply, "Try UX research.");
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let config = ClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            connect_timeout_secs: 1,
            ..ClientConfig::default()
        };
        let err = HttpTransport::new(&config)
            .unwrap()
            .fetch_reply(Endpoint::Chat, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Network(_)));
    }
}
