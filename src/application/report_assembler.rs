// Report assembler - Use case for turning a site's readings into one document
use crate::domain::document::{Document, DocumentPage, UnitPage};
use crate::domain::error::ReportError;
use crate::domain::layout::LayoutPlanner;
use crate::domain::reading::Reading;
use crate::domain::site::Site;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ReportAssembler {
    planner: LayoutPlanner,
}

impl ReportAssembler {
    pub fn new(planner: LayoutPlanner) -> Self {
        Self { planner }
    }

    /// Lay out every declared unit that reported, in declaration order, with
    /// a blank separator page after each unit.
    pub fn build(
        &self,
        site: &Site,
        readings: &HashMap<String, Reading>,
        generated_at: DateTime<Utc>,
    ) -> Result<Document, ReportError> {
        for unit_id in readings.keys() {
            if site.unit(unit_id).is_none() {
                tracing::warn!(site = %site.id, unit = %unit_id, "Ignoring reading for undeclared unit");
            }
        }

        let mut pages = Vec::new();
        let mut reported_units = 0;

        for unit in &site.units {
            let Some(reading) = readings.get(&unit.id) else {
                tracing::info!(site = %site.id, unit = %unit.id, "No reading for unit, skipping");
                continue;
            };
            reported_units += 1;

            let plan = match self.planner.plan(&unit.id, &unit.geometry, reading.values()) {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::warn!(site = %site.id, unit = %unit.id, "Skipping unit pages: {}", e);
                    continue;
                }
            };

            let timestamp = reading.observed_at().unwrap_or(generated_at);
            let arcs_declared = unit.geometry.has_declared_arcs();

            tracing::debug!(
                site = %site.id,
                unit = %unit.id,
                pages = plan.pages.len(),
                "Planned unit layout"
            );

            pages.extend(plan.pages.into_iter().map(|layout| {
                DocumentPage::Unit(UnitPage {
                    unit_id: unit.id.clone(),
                    description: unit.description.clone(),
                    timestamp,
                    arcs_declared,
                    layout,
                })
            }));
            pages.push(DocumentPage::Separator);
        }

        if reported_units == 0 || pages.is_empty() {
            return Err(ReportError::EmptySite(site.id.clone()));
        }

        Ok(Document {
            site_id: site.id.clone(),
            title: site.name.clone(),
            generated_at,
            pages,
        })
    }
}
