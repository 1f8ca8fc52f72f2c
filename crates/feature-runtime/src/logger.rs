//! Feature-scoped logging: every record carries a `feature` field.

use plexus_telemetry::{feature_span, log_event};
use tracing::Span;

/// Logger handed to a feature through its `FeatureContext`.
#[derive(Debug, Clone)]
pub struct FeatureLogger {
    feature: String,
}

impl FeatureLogger {
    #[must_use]
    pub fn new(feature: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
        }
    }

    #[must_use]
    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn debug(&self, message: &str) {
        log_event!(debug, self.feature, "{}", message);
    }

    pub fn info(&self, message: &str) {
        log_event!(info, self.feature, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        log_event!(warn, self.feature, "{}", message);
    }

    pub fn error(&self, message: &str) {
        log_event!(error, self.feature, "{}", message);
    }

    /// Span covering a unit of feature work, e.g. an install hook.
    #[must_use]
    pub fn span(&self, operation: &'static str) -> Span {
        feature_span!("feature", feature = %self.feature, operation)
    }
}
