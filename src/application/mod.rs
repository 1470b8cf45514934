// Application layer - Use cases and the ports they drive
pub mod aggregator;
pub mod ingest_service;
pub mod notifier;
pub mod report_assembler;
pub mod report_renderer;
pub mod timeout_monitor;
