// Failure taxonomy for the report pipeline
use thiserror::Error;

/// Every variant is scoped to one reading, one unit, one site or one
/// destination. None of them is fatal to the process.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReportError {
    #[error("malformed reading: {0}")]
    TransientInput(String),

    #[error("unit {unit} cannot be laid out: {reason}")]
    Geometry { unit: String, reason: String },

    #[error("site {0} has no recorded readings")]
    EmptySite(String),

    #[error("delivery to {destination} failed: {reason}")]
    Outbound { destination: String, reason: String },

    #[error("report rendering failed: {0}")]
    Render(String),
}

impl ReportError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::TransientInput(reason.into())
    }

    pub fn geometry(unit: &str, reason: impl Into<String>) -> Self {
        Self::Geometry {
            unit: unit.to_string(),
            reason: reason.into(),
        }
    }

    pub fn outbound(destination: &str, reason: impl Into<String>) -> Self {
        Self::Outbound {
            destination: destination.to_string(),
            reason: reason.into(),
        }
    }
}
