use std::fmt;
use thiserror::Error;

/// Indicates whether a controller should be installed.
///
/// `Auto` defers the decision to a detection predicate evaluated against the
/// live cluster when the controller is registered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum EnablementStatus {
    #[default]
    Enabled,
    Disabled,
    Auto,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid enablement status: {0:?} (expected one of enabled, disabled, auto)")]
pub struct InvalidEnablementStatus(String);

// === impl EnablementStatus ===

impl std::str::FromStr for EnablementStatus {
    type Err = InvalidEnablementStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            "auto" => Ok(Self::Auto),
            s => Err(InvalidEnablementStatus(s.to_string())),
        }
    }
}

impl fmt::Display for EnablementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => "enabled".fmt(f),
            Self::Disabled => "disabled".fmt(f),
            Self::Auto => "auto".fmt(f),
        }
    }
}
