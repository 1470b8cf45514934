// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod file_notifier;
pub mod html_renderer;
pub mod ultramsg_notifier;
