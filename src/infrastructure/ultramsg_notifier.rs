// UltraMsg notifier - uploads the report as a WhatsApp document
use crate::application::notifier::{RenderedReport, ReportNotifier};
use crate::domain::error::ReportError;
use crate::infrastructure::config::NotifierSettings;
use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct UltraMsgNotifier {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    max_retries: u32,
    backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct UltraMsgResponse {
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl UltraMsgNotifier {
    pub fn new(settings: &NotifierSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds.max(1)))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}/messages/document",
                settings.base_url.trim_end_matches('/'),
                settings.instance_id
            ),
            token: settings.token.clone(),
            max_retries: settings.max_retries,
            backoff: Duration::from_millis(settings.retry_backoff_ms),
        })
    }

    async fn post_once(&self, form: &[(&str, &str)]) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(form)
            .send()
            .await
            .context("Failed to send request to UltraMsg")?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("UltraMsg returned status {}: {}", status, body);
        }

        // UltraMsg reports API-level failures with a 200 and an "error" field.
        if let Ok(parsed) = serde_json::from_str::<UltraMsgResponse>(&body) {
            if let Some(error) = parsed.error {
                anyhow::bail!("UltraMsg rejected the document: {}", error);
            }
        }

        tracing::debug!(status = %status, "UltraMsg response: {}", body);
        Ok(())
    }
}

#[async_trait]
impl ReportNotifier for UltraMsgNotifier {
    async fn send(
        &self,
        report: &RenderedReport,
        destination: &str,
        caption: &str,
    ) -> Result<(), ReportError> {
        let document = STANDARD.encode(&report.content);
        let form = [
            ("token", self.token.as_str()),
            ("to", destination),
            ("filename", report.file_name.as_str()),
            ("document", document.as_str()),
            ("caption", caption),
        ];

        let attempts = self.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.post_once(&form).await {
                Ok(()) => {
                    tracing::info!(
                        destination = %destination,
                        file = %report.file_name,
                        content_type = report.content_type,
                        attempt,
                        "Document uploaded to UltraMsg"
                    );
                    return Ok(());
                }
                Err(e) => {
                    last_error = format!("{:#}", e);
                    tracing::warn!(
                        destination = %destination,
                        attempt,
                        attempts,
                        "UltraMsg delivery attempt failed: {}",
                        last_error
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                }
            }
        }

        Err(ReportError::outbound(destination, last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Form, State};
    use axum::routing::post;
    use axum::{Json, Router};
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeApi {
        calls: AtomicUsize,
        fail_first: usize,
        received: Mutex<Vec<HashMap<String, String>>>,
    }

    async fn document_handler(
        State(api): State<Arc<FakeApi>>,
        Form(form): Form<HashMap<String, String>>,
    ) -> (axum::http::StatusCode, Json<serde_json::Value>) {
        let call = api.calls.fetch_add(1, Ordering::SeqCst);
        if call < api.fail_first {
            return (
                axum::http::StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": "upstream"})),
            );
        }
        api.received.lock().unwrap().push(form);
        (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({"sent": "true", "message": "ok"})),
        )
    }

    async fn spawn_fake(api: Arc<FakeApi>) -> String {
        let router = Router::new()
            .route("/instance1/messages/document", post(document_handler))
            .with_state(api);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn settings(base_url: String, max_retries: u32) -> NotifierSettings {
        NotifierSettings {
            base_url,
            instance_id: "instance1".to_string(),
            token: "secret".to_string(),
            timeout_seconds: 5,
            max_retries,
            retry_backoff_ms: 1,
        }
    }

    fn report() -> RenderedReport {
        RenderedReport {
            file_name: "Report.html".to_string(),
            content_type: "text/html",
            content: Bytes::from_static(b"<html></html>"),
        }
    }

    #[tokio::test]
    async fn test_document_form_is_posted() {
        let api = Arc::new(FakeApi::default());
        let base_url = spawn_fake(api.clone()).await;
        let notifier = UltraMsgNotifier::new(&settings(base_url, 0)).unwrap();

        notifier.send(&report(), "+5584999999999", "Temperature Report - Fazenda Jk").await.unwrap();

        let received = api.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let form = &received[0];
        assert_eq!(form["token"], "secret");
        assert_eq!(form["to"], "+5584999999999");
        assert_eq!(form["filename"], "Report.html");
        assert_eq!(form["caption"], "Temperature Report - Fazenda Jk");
        assert_eq!(STANDARD.decode(&form["document"]).unwrap(), b"<html></html>");
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let api = Arc::new(FakeApi {
            fail_first: 2,
            ..FakeApi::default()
        });
        let base_url = spawn_fake(api.clone()).await;
        let notifier = UltraMsgNotifier::new(&settings(base_url, 3)).unwrap();

        notifier.send(&report(), "ops", "caption").await.unwrap();
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let api = Arc::new(FakeApi {
            fail_first: usize::MAX,
            ..FakeApi::default()
        });
        let base_url = spawn_fake(api.clone()).await;
        let notifier = UltraMsgNotifier::new(&settings(base_url, 2)).unwrap();

        let result = notifier.send(&report(), "ops", "caption").await;
        assert!(matches!(result, Err(ReportError::Outbound { .. })));
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }
}
