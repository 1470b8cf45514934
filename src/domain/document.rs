// Consolidated site report model
use crate::domain::layout::PlannedPage;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct UnitPage {
    pub unit_id: String,
    pub description: String,
    /// The reading's own timestamp, or the generation time when it had none.
    pub timestamp: DateTime<Utc>,
    pub arcs_declared: bool,
    pub layout: PlannedPage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentPage {
    Unit(UnitPage),
    Separator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub site_id: String,
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub pages: Vec<DocumentPage>,
}

impl Document {
    pub fn unit_pages(&self) -> impl Iterator<Item = &UnitPage> {
        self.pages.iter().filter_map(|page| match page {
            DocumentPage::Unit(unit) => Some(unit),
            DocumentPage::Separator => None,
        })
    }

    /// Unit ids in the order their pages appear, without repeats.
    pub fn unit_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for page in self.unit_pages() {
            if ids.last() != Some(&page.unit_id.as_str()) {
                ids.push(&page.unit_id);
            }
        }
        ids
    }
}
