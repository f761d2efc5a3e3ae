//! 📡 The HTTP transport: one authenticated POST per batch, and an honest verdict.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, trace};

use super::Transport;
use super::payload::build_payload;
use crate::common::DestinationKey;
use crate::error::TransportError;
use crate::queue::Batch;

/// 🔒 How the write key travels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// `Authorization: Bearer <write_key>`
    #[default]
    Bearer,
    /// HTTP basic with the write key as user name and an empty password.
    Basic,
}

/// 🔧 Everything the HTTP transport needs to know, already resolved from config.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// 📡 Base URL for the fixed event kinds (`/v1/batch` is appended).
    pub host: String,
    /// 🗃️ Base URL for generic collections (`/v1/set` is appended).
    pub objects_host: String,
    pub write_key: String,
    pub auth_scheme: AuthScheme,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

/// 🚚 Turns a [`Batch`] into a POST request. Does not retry. Wrap it in
/// [`super::Retrying`] for that.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
}

/// 💀 The shape error bodies come in when the remote bothers to explain itself.
#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpTransport {
    /// 🚀 Builds the reqwest client. No connectivity ping: the first batch is the ping.
    pub fn new(config: HttpTransportConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()
            .context("💀 The HTTP client refused to be born. Probably the TLS stack. Probably not your fault.")?;
        Ok(Self { client, config })
    }

    /// 🧭 Which endpoint a destination lands on.
    pub fn endpoint(&self, destination: &DestinationKey) -> String {
        match destination.collection_name() {
            Some(_) => format!("{}/v1/set", self.config.objects_host.trim_end_matches('/')),
            None => format!("{}/v1/batch", self.config.host.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &Batch) -> Result<(), TransportError> {
        let body = build_payload(batch.destination(), batch.records(), Utc::now())?;
        let body = serde_json::to_vec(&body).map_err(|e| TransportError::Encode(e.to_string()))?;
        let url = self.endpoint(batch.destination());
        debug!(
            destination = %batch.destination(),
            batch_size = batch.len(),
            bytes = body.len(),
            url = %url,
            "📡 posting batch"
        );

        let request = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        let request = match self.config.auth_scheme {
            AuthScheme::Bearer => request.bearer_auth(&self.config.write_key),
            AuthScheme::Basic => request.basic_auth(&self.config.write_key, Some("")),
        };

        let response = request.send().await.map_err(|e| TransportError::Unavailable {
            status: None,
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            trace!(destination = %batch.destination(), status = status.as_u16(), "✅ batch accepted");
            return Ok(());
        }

        // -- 🔍 a body we cannot read still leaves us the status line to complain about
        let text = response.text().await.unwrap_or_default();
        let message = error_message(status, &text);
        if status.is_server_error() {
            Err(TransportError::Unavailable {
                status: Some(status.as_u16()),
                message,
            })
        } else {
            Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// `error.message` from a JSON body when present, otherwise `"<status> <body>"`.
fn error_message(status: StatusCode, text: &str) -> String {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => body.error.message,
        Err(_) => format!("{} {}", status.as_u16(), text.trim()).trim_end().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> anyhow::Result<HttpTransport> {
        HttpTransport::new(HttpTransportConfig {
            host: "https://events.example.com/".into(),
            objects_host: "https://objects.example.com".into(),
            write_key: "wk".into(),
            auth_scheme: AuthScheme::Bearer,
            connect_timeout: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
        })
    }

    #[test]
    fn the_one_where_collections_and_events_take_different_roads() -> anyhow::Result<()> {
        let http = transport()?;
        assert_eq!(
            http.endpoint(&DestinationKey::fixed("track")),
            "https://events.example.com/v1/batch"
        );
        assert_eq!(
            http.endpoint(&DestinationKey::collection("accounts")),
            "https://objects.example.com/v1/set"
        );
        Ok(())
    }

    #[test]
    fn the_one_where_the_remote_explains_itself_or_does_not() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"error":{"message":"collection is required"}}"#),
            "collection is required"
        );
        assert_eq!(
            error_message(StatusCode::UNAUTHORIZED, "Unauthorized\n"),
            "401 Unauthorized"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "502");
    }
}
