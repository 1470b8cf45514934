// File-based notifier - drops each report into a per-destination folder
use crate::application::notifier::{RenderedReport, ReportNotifier};
use crate::domain::error::ReportError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FileNotifier {
    root: PathBuf,
}

impl FileNotifier {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder_for(&self, destination: &str) -> PathBuf {
        let folder: String = destination
            .chars()
            .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '+') { c } else { '_' })
            .collect();
        let folder = if folder.is_empty() { "_".to_string() } else { folder };
        self.root.join(folder)
    }
}

#[async_trait]
impl ReportNotifier for FileNotifier {
    async fn send(
        &self,
        report: &RenderedReport,
        destination: &str,
        caption: &str,
    ) -> Result<(), ReportError> {
        let folder = self.folder_for(destination);
        tokio::fs::create_dir_all(&folder)
            .await
            .map_err(|e| ReportError::outbound(destination, format!("cannot create {}: {}", folder.display(), e)))?;

        let path = folder.join(&report.file_name);
        tokio::fs::write(&path, &report.content)
            .await
            .map_err(|e| ReportError::outbound(destination, format!("cannot write {}: {}", path.display(), e)))?;

        tracing::info!(
            destination = %destination,
            path = %path.display(),
            content_type = report.content_type,
            caption = %caption,
            "Report written"
        );
        Ok(())
    }
}
