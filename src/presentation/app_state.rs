// Application state for HTTP handlers
use crate::application::aggregator::Aggregator;
use crate::application::ingest_service::IngestService;
use crate::application::timeout_monitor::{MonitorCommand, TimeoutMonitor};
use crate::domain::site::SiteRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct AppState {
    pub ingest_service: IngestService,
    pub aggregator: Arc<Aggregator>,
    pub monitor: Arc<TimeoutMonitor>,
    pub sites: Arc<SiteRegistry>,
    pub commands: mpsc::Sender<MonitorCommand>,
}
