//! HTTP webhook notifier.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use super::{Alert, Notifier, TransportError};
use crate::BoxFuture;

/// POSTs each alert as a JSON document to a fixed URL.
///
/// The body is the serialized [`Alert`]:
///
/// ```text
/// {"entityId": 3, "zoneId": "camp", "zoneLabel": "Camp", "kind": "exit",
///  "message": "ALERT: Elephant 3 left Camp", "at": 1718000000000}
/// ```
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Creates a notifier for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Notifier for WebhookNotifier {
    fn notify<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            let body = serde_json::to_vec(alert)?;
            let response = self
                .client
                .post(&self.url)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .map_err(|e| TransportError::Http(format!("Request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(TransportError::Status {
                    status: response.status().as_u16(),
                    url: self.url.clone(),
                });
            }
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &self.url)
            .finish()
    }
}
