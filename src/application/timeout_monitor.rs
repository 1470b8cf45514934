// Timeout monitor - flushes sites once they have gone quiet
use crate::application::aggregator::Aggregator;
use crate::application::notifier::ReportNotifier;
use crate::application::report_assembler::ReportAssembler;
use crate::application::report_renderer::DocumentRenderer;
use crate::domain::error::ReportError;
use crate::domain::site::SiteRegistry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Idle,
    Scanning,
}

/// Control messages relayed from the command endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorCommand {
    /// Flush a site now, whether or not it is due.
    FlushNow(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The site had no state, usually because another flush got there first.
    NothingToDo,
    Delivered {
        pages: usize,
        destinations: usize,
        failed: usize,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub due: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub timeout: chrono::Duration,
    pub poll_interval: Duration,
    pub caption_prefix: String,
}

pub struct TimeoutMonitor {
    aggregator: Arc<Aggregator>,
    sites: Arc<SiteRegistry>,
    assembler: ReportAssembler,
    renderer: Arc<dyn DocumentRenderer>,
    notifier: Arc<dyn ReportNotifier>,
    settings: MonitorSettings,
    state: Mutex<MonitorState>,
}

impl TimeoutMonitor {
    pub fn new(
        aggregator: Arc<Aggregator>,
        sites: Arc<SiteRegistry>,
        assembler: ReportAssembler,
        renderer: Arc<dyn DocumentRenderer>,
        notifier: Arc<dyn ReportNotifier>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            aggregator,
            sites,
            assembler,
            renderer,
            notifier,
            settings,
            state: Mutex::new(MonitorState::Idle),
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: MonitorState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Poll until `shutdown` flips to true or its sender goes away. A scan in
    /// progress always runs to completion before the loop exits.
    pub async fn run(
        self: Arc<Self>,
        mut commands: mpsc::Receiver<MonitorCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = self.settings.poll_interval.max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            timeout_secs = self.settings.timeout.num_seconds(),
            poll_secs = period.as_secs(),
            "Timeout monitor started"
        );

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.scan(Utc::now()).await;
                }
                Some(command) = commands.recv() => {
                    self.handle_command(command).await;
                }
            }
        }

        tracing::info!(
            pending = self.aggregator.pending_sites().len(),
            "Timeout monitor stopped"
        );
    }

    async fn handle_command(&self, command: MonitorCommand) {
        match command {
            MonitorCommand::FlushNow(site_id) => {
                tracing::info!(site = %site_id, "Flush requested");
                if let Err(e) = self.flush_site(&site_id, Utc::now()).await {
                    tracing::error!(site = %site_id, "Requested flush failed: {}", e);
                }
            }
        }
    }

    /// One Idle -> Scanning -> Idle pass over every due site.
    pub async fn scan(&self, now: DateTime<Utc>) -> ScanSummary {
        self.set_state(MonitorState::Scanning);

        let due = self.aggregator.due_sites(now, self.settings.timeout);
        let mut summary = ScanSummary {
            due: due.len(),
            ..ScanSummary::default()
        };

        for site_id in due {
            tracing::info!(site = %site_id, "Timeout reached, generating report");
            match self.flush_site(&site_id, now).await {
                Ok(FlushOutcome::NothingToDo) => summary.skipped += 1,
                Ok(FlushOutcome::Delivered { failed: 0, .. }) => summary.delivered += 1,
                Ok(FlushOutcome::Delivered { .. }) => summary.failed += 1,
                Err(e) => {
                    tracing::error!(site = %site_id, "Report flush failed: {}", e);
                    summary.failed += 1;
                }
            }
        }

        if summary.due > 0 {
            tracing::debug!(?summary, "Scan finished");
        }

        self.set_state(MonitorState::Idle);
        summary
    }

    /// Take the site's readings out of the aggregator and ship the report.
    pub async fn flush_site(
        &self,
        site_id: &str,
        now: DateTime<Utc>,
    ) -> Result<FlushOutcome, ReportError> {
        let readings = self.aggregator.snapshot_and_clear(site_id);
        if readings.is_empty() {
            return Ok(FlushOutcome::NothingToDo);
        }

        let Some(site) = self.sites.get(site_id) else {
            tracing::warn!(site = %site_id, "Dropping readings for unconfigured site");
            return Ok(FlushOutcome::NothingToDo);
        };

        let document = self.assembler.build(site, &readings, now)?;
        let report = self.renderer.render(&document)?;
        let caption = format!("{} - {}", self.settings.caption_prefix, site.name);

        tracing::info!(
            site = %site_id,
            pages = document.pages.len(),
            units = ?document.unit_ids(),
            file = %report.file_name,
            "Report generated"
        );

        if site.destinations.is_empty() {
            tracing::warn!(site = %site_id, "Site has no destinations, report not sent");
        }

        let mut failed = 0;
        for destination in &site.destinations {
            match self.notifier.send(&report, destination, &caption).await {
                Ok(()) => {
                    tracing::info!(site = %site_id, destination = %destination, "Report delivered");
                }
                Err(e) => {
                    tracing::error!(site = %site_id, destination = %destination, "{}", e);
                    failed += 1;
                }
            }
        }

        Ok(FlushOutcome::Delivered {
            pages: document.pages.len(),
            destinations: site.destinations.len(),
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::notifier::RenderedReport;
    use crate::domain::color::ColorScale;
    use crate::domain::document::Document;
    use crate::domain::geometry::UnitGeometry;
    use crate::domain::layout::{LayoutPlanner, PageConstraints};
    use crate::domain::reading::Reading;
    use crate::domain::site::{Site, UnitSpec};
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::TimeZone;

    struct PageCountRenderer;

    impl DocumentRenderer for PageCountRenderer {
        fn render(&self, document: &Document) -> Result<RenderedReport, ReportError> {
            Ok(RenderedReport {
                file_name: format!("{}.txt", document.site_id),
                content_type: "text/plain",
                content: Bytes::from(format!("{} {:?}", document.pages.len(), document.unit_ids())),
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String, String)>>,
        reject: Vec<String>,
        delay: Duration,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(String, String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReportNotifier for RecordingNotifier {
        async fn send(
            &self,
            report: &RenderedReport,
            destination: &str,
            caption: &str,
        ) -> Result<(), ReportError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.reject.iter().any(|d| d == destination) {
                return Err(ReportError::outbound(destination, "rejected"));
            }
            let body = String::from_utf8(report.content.to_vec()).unwrap();
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), caption.to_string(), body));
            Ok(())
        }
    }

    fn unit(id: &str, cables: Vec<usize>) -> UnitSpec {
        UnitSpec {
            id: id.to_string(),
            description: id.to_string(),
            geometry: UnitGeometry::new(cables, None),
        }
    }

    fn sites() -> Arc<SiteRegistry> {
        Arc::new(SiteRegistry::new(vec![
            Site::new(
                "north-field".to_string(),
                Some("North Field".to_string()),
                vec!["ops".to_string(), "owner".to_string()],
                vec![unit("u1", vec![5, 5]), unit("u2", vec![3])],
            ),
            Site::new(
                "south-field".to_string(),
                None,
                vec!["ops".to_string()],
                vec![unit("s1", vec![2])],
            ),
        ]))
    }

    fn monitor(
        notifier: Arc<RecordingNotifier>,
        poll_interval: Duration,
    ) -> (Arc<TimeoutMonitor>, Arc<Aggregator>) {
        let aggregator = Arc::new(Aggregator::new());
        let monitor = TimeoutMonitor::new(
            aggregator.clone(),
            sites(),
            ReportAssembler::new(LayoutPlanner::new(
                PageConstraints::default(),
                ColorScale::default(),
            )),
            Arc::new(PageCountRenderer),
            notifier,
            MonitorSettings {
                timeout: chrono::Duration::seconds(180),
                poll_interval,
                caption_prefix: "Temperature Report".to_string(),
            },
        );
        (Arc::new(monitor), aggregator)
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_quiet_site_is_flushed_with_reported_units_only() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (monitor, aggregator) = monitor(notifier.clone(), Duration::from_secs(30));

        let reading =
            Reading::new("north-field", "u1", vec![1, 1, 1, 1, 1, 5, 5, 5, 5, 5], None).unwrap();
        aggregator.record_at(reading, fixed_now());

        let early = monitor.scan(fixed_now() + chrono::Duration::seconds(60)).await;
        assert_eq!(early, ScanSummary::default());
        assert!(notifier.sent().is_empty());

        let summary = monitor.scan(fixed_now() + chrono::Duration::seconds(180)).await;
        assert_eq!(summary.due, 1);
        assert_eq!(summary.delivered, 1);
        assert_eq!(monitor.state(), MonitorState::Idle);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "ops");
        assert_eq!(sent[1].0, "owner");
        assert_eq!(sent[0].1, "Temperature Report - North Field");
        assert_eq!(sent[0].2, r#"2 ["u1"]"#);

        assert!(aggregator.pending_sites().is_empty());
        assert!(aggregator.snapshot_and_clear("north-field").is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_scoped_per_destination_and_site() {
        let notifier = Arc::new(RecordingNotifier {
            reject: vec!["ops".to_string()],
            ..RecordingNotifier::default()
        });
        let (monitor, aggregator) = monitor(notifier.clone(), Duration::from_secs(30));

        aggregator.record_at(
            Reading::new("north-field", "u1", vec![20; 10], None).unwrap(),
            fixed_now(),
        );
        aggregator.record_at(
            Reading::new("south-field", "s1", vec![20, 21], None).unwrap(),
            fixed_now(),
        );

        let summary = monitor.scan(fixed_now() + chrono::Duration::seconds(300)).await;
        assert_eq!(summary.due, 2);
        assert_eq!(summary.failed, 2);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "owner");
        assert!(aggregator.pending_sites().is_empty());
    }

    #[tokio::test]
    async fn test_build_error_does_not_abort_scan() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (monitor, aggregator) = monitor(notifier.clone(), Duration::from_secs(30));

        // Only an undeclared unit reported for north-field: EmptySite.
        aggregator.record_at(
            Reading::new("north-field", "ghost", vec![1], None).unwrap(),
            fixed_now(),
        );
        aggregator.record_at(
            Reading::new("south-field", "s1", vec![3, 4], None).unwrap(),
            fixed_now(),
        );

        let summary = monitor.scan(fixed_now() + chrono::Duration::seconds(300)).await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.delivered, 1);
        assert_eq!(notifier.sent().len(), 1);
        assert!(aggregator.pending_sites().is_empty());
    }

    #[tokio::test]
    async fn test_second_flush_of_same_site_is_nothing_to_do() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (monitor, aggregator) = monitor(notifier.clone(), Duration::from_secs(30));
        aggregator.record_at(
            Reading::new("south-field", "s1", vec![3, 4], None).unwrap(),
            fixed_now(),
        );

        let first = monitor.flush_site("south-field", fixed_now()).await.unwrap();
        assert!(matches!(first, FlushOutcome::Delivered { pages: 2, destinations: 1, failed: 0 }));
        let second = monitor.flush_site("south-field", fixed_now()).await.unwrap();
        assert_eq!(second, FlushOutcome::NothingToDo);
    }

    #[tokio::test]
    async fn test_flush_command_and_graceful_shutdown() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (monitor, aggregator) = monitor(notifier.clone(), Duration::from_secs(3600));
        let (command_tx, command_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        aggregator.record(Reading::new("south-field", "s1", vec![3, 4], None).unwrap());
        aggregator.record(Reading::new("north-field", "u2", vec![7, 8, 9], None).unwrap());

        let handle = tokio::spawn(monitor.clone().run(command_rx, shutdown_rx));
        command_tx
            .send(MonitorCommand::FlushNow("south-field".to_string()))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while notifier.sent().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("flush command should deliver the report");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("monitor should stop")
            .unwrap();

        // Not-yet-due state survives the stop.
        let pending = aggregator.pending_sites();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].site_id, "north-field");
    }

    #[tokio::test]
    async fn test_shutdown_during_scan_finishes_every_due_site() {
        let notifier = Arc::new(RecordingNotifier {
            delay: Duration::from_millis(300),
            ..RecordingNotifier::default()
        });
        let (monitor, aggregator) = monitor(notifier.clone(), Duration::from_millis(50));
        let (_command_tx, command_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let long_ago = Utc::now() - chrono::Duration::seconds(600);
        aggregator.record_at(Reading::new("north-field", "u1", vec![20; 10], None).unwrap(), long_ago);
        aggregator.record_at(Reading::new("south-field", "s1", vec![3, 4], None).unwrap(), long_ago);

        let handle = tokio::spawn(monitor.clone().run(command_rx, shutdown_rx));

        tokio::time::timeout(Duration::from_secs(5), async {
            while monitor.state() != MonitorState::Scanning {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("monitor should start scanning");
        assert!(notifier.sent().len() < 3);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("monitor should stop once the scan is done")
            .unwrap();

        // north-field has two destinations, south-field one.
        let sent = notifier.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert!(aggregator.pending_sites().is_empty());
    }
}
