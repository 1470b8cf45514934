// Rendering port - Document to a shippable artifact
use crate::application::notifier::RenderedReport;
use crate::domain::document::Document;
use crate::domain::error::ReportError;

pub trait DocumentRenderer: Send + Sync {
    fn render(&self, document: &Document) -> Result<RenderedReport, ReportError>;
}
