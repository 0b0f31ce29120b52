use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

/// Counts admission reviews by resource kind and outcome.
#[derive(Clone, Debug, Default)]
pub struct AdmissionMetrics {
    reviews: Family<ReviewLabels, Counter>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReviewResult {
    Allowed,
    Denied,
    Error,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReviewLabels {
    kind: String,
    result: &'static str,
}

// === impl ReviewResult ===

impl ReviewResult {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
            Self::Error => "error",
        }
    }
}

// === impl AdmissionMetrics ===

impl AdmissionMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();
        reg.register(
            "admission_reviews",
            "Total number of admission reviews handled, by resource kind and result",
            metrics.reviews.clone(),
        );
        metrics
    }

    pub fn observe(&self, kind: &str, result: ReviewResult) {
        self.reviews
            .get_or_create(&ReviewLabels {
                kind: kind.to_string(),
                result: result.as_str(),
            })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn count(&self, kind: &str, result: ReviewResult) -> u64 {
        self.reviews
            .get_or_create(&ReviewLabels {
                kind: kind.to_string(),
                result: result.as_str(),
            })
            .get()
    }
}
