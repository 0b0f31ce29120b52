use std::fmt;

/// The outcome of a completed admission check.
///
/// A rejection is a value, not an error: it means the object was inspected and
/// found unacceptable. Failures to complete a check are carried separately by
/// callers as `Err`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(String),
}

// === impl Verdict ===

impl Verdict {
    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Reject(reason.into())
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Accept)
    }

    /// Returns the rejection reason, or an empty string when accepted.
    pub fn reason(&self) -> &str {
        match self {
            Self::Accept => "",
            Self::Reject(reason) => reason,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => "accepted".fmt(f),
            Self::Reject(reason) => write!(f, "rejected: {reason}"),
        }
    }
}
