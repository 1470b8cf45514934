use crate::application::timeout_monitor::MonitorSettings;
use crate::domain::color::ColorScale;
use crate::domain::geometry::UnitGeometry;
use crate::domain::layout::PageConstraints;
use crate::domain::site::{Site, SiteRegistry, UnitSpec};
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/sites";
const ENV_PREFIX: &str = "SILO_REPORTS";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub report: ReportSettings,
    #[serde(default)]
    pub notifier: NotifierSettings,
    #[serde(default)]
    pub layout: PageConstraints,
    #[serde(default)]
    pub color_scale: ColorScale,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReportSettings {
    pub timeout_seconds: u64,
    pub poll_interval_seconds: u64,
    pub reports_dir: PathBuf,
    pub caption_prefix: String,
    /// PNG, JPEG or SVG drawn in each page header.
    pub logo_path: Option<PathBuf>,
    pub author: Option<String>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 180,
            poll_interval_seconds: 30,
            reports_dir: PathBuf::from("data/reports"),
            caption_prefix: "Temperature Report".to_string(),
            logo_path: None,
            author: None,
        }
    }
}

impl ReportSettings {
    pub fn monitor_settings(&self) -> anyhow::Result<MonitorSettings> {
        let timeout = i64::try_from(self.timeout_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .with_context(|| format!("report.timeout_seconds {} is out of range", self.timeout_seconds))?;

        Ok(MonitorSettings {
            timeout,
            poll_interval: Duration::from_secs(self.poll_interval_seconds.max(1)),
            caption_prefix: self.caption_prefix.clone(),
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotifierSettings {
    pub base_url: String,
    pub instance_id: String,
    pub token: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.ultramsg.com".to_string(),
            instance_id: String::new(),
            token: String::new(),
            timeout_seconds: 60,
            max_retries: 3,
            retry_backoff_ms: 2000,
        }
    }
}

impl NotifierSettings {
    pub fn has_credentials(&self) -> bool {
        !self.instance_id.trim().is_empty() && !self.token.trim().is_empty()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub destinations: Vec<String>,
    #[serde(default)]
    pub units: Vec<UnitConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UnitConfig {
    pub id: String,
    pub description: Option<String>,
    #[serde(default)]
    pub cables: Vec<usize>,
    pub arcs: Option<Vec<usize>>,
}

impl AppConfig {
    /// Reject overrides that would silently produce wrong colors.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_color_scale(&self.color_scale)?;
        self.report.monitor_settings()?;
        Ok(())
    }

    /// Build the site registry, rejecting duplicate site or unit ids.
    pub fn site_registry(&self) -> anyhow::Result<SiteRegistry> {
        let mut seen_sites = HashSet::new();
        let mut sites = Vec::with_capacity(self.sites.len());

        for site in &self.sites {
            if !seen_sites.insert(site.id.as_str()) {
                anyhow::bail!("site {} is declared more than once", site.id);
            }

            let mut seen_units = HashSet::new();
            let mut units = Vec::with_capacity(site.units.len());
            for unit in &site.units {
                if !seen_units.insert(unit.id.as_str()) {
                    anyhow::bail!("unit {} is declared more than once in site {}", unit.id, site.id);
                }
                if unit.cables.is_empty() {
                    tracing::warn!(site = %site.id, unit = %unit.id, "Unit declares no cables; it will never render");
                }
                units.push(UnitSpec {
                    id: unit.id.clone(),
                    description: unit.description.clone().unwrap_or_else(|| unit.id.clone()),
                    geometry: UnitGeometry::new(unit.cables.clone(), unit.arcs.clone()),
                });
            }

            sites.push(Site::new(
                site.id.clone(),
                site.name.clone(),
                site.destinations.clone(),
                units,
            ));
        }

        Ok(SiteRegistry::new(sites))
    }
}

/// Load `config/sites` (or the path in `SILO_REPORTS_CONFIG`), then apply
/// `SILO_REPORTS__SECTION__KEY` environment overrides.
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let path = std::env::var(format!("{}_CONFIG", ENV_PREFIX))
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let settings = config::Config::builder()
        .add_source(config::File::with_name(&path))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path))?;
    Ok(config)
}

fn validate_color_scale(scale: &ColorScale) -> anyhow::Result<()> {
    if scale.control_points.is_empty() {
        anyhow::bail!("color_scale.control_points must not be empty");
    }
    if let Some(point) = scale.control_points.iter().find(|p| !p.temperature.is_finite()) {
        anyhow::bail!("color_scale control point {} is not a finite temperature", point.temperature);
    }
    if let Some(pair) = scale
        .control_points
        .windows(2)
        .find(|pair| pair[1].temperature <= pair[0].temperature)
    {
        anyhow::bail!(
            "color_scale.control_points must be strictly increasing, found {} after {}",
            pair[1].temperature,
            pair[0].temperature
        );
    }
    if scale.negative_band_start > scale.negative_band_end {
        anyhow::bail!(
            "color_scale negative band {}..={} is empty",
            scale.negative_band_start,
            scale.negative_band_end
        );
    }
    Ok(())
}
