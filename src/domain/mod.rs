// Domain layer - report model and pure layout logic
pub mod color;
pub mod document;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod reading;
pub mod site;
