// Outbound notification port
use crate::domain::error::ReportError;
use async_trait::async_trait;
use bytes::Bytes;

/// A finished, transport-ready report artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedReport {
    pub file_name: String,
    pub content_type: &'static str,
    pub content: Bytes,
}

#[async_trait]
pub trait ReportNotifier: Send + Sync {
    /// Deliver one report to one destination. Implementations bound their own
    /// timeouts and retries; the caller only sees the final outcome.
    async fn send(
        &self,
        report: &RenderedReport,
        destination: &str,
        caption: &str,
    ) -> Result<(), ReportError>;
}
