use thiserror::Error;

/// Broad category of a [`HazardError`], used by batch callers to decide
/// whether a failure skips one case or aborts the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Range,
    DataSufficiency,
    Invariant,
    Io,
}

#[derive(Error, Debug)]
pub enum HazardError {
    #[error("IM {im} is not supported by {context}")]
    UnsupportedIM { im: String, context: String },

    #[error("Station {station} is not available in {context}")]
    UnsupportedStation { station: String, context: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid IM weights: {0}")]
    InvalidWeights(String),

    #[error("Unknown ground motion dataset: {0}")]
    UnknownDataset(String),

    #[error("Unknown data source: {0}")]
    UnknownSource(String),

    #[error(
        "{im} at station {station}: exceedance {exceedance:?} / IM value {im_value:?} \
         is outside the computed hazard range{}",
        branch.as_ref().map(|b| format!(" of branch {}", b)).unwrap_or_default()
    )]
    ExceedanceOutOfRange {
        station: String,
        im: String,
        exceedance: Option<f64>,
        im_value: Option<f64>,
        branch: Option<String>,
    },

    #[error("Insufficient data for {context}: {available} available, {required} required")]
    InsufficientData { context: String, available: usize, required: usize },

    #[error("Logic tree invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl HazardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HazardError::UnsupportedIM { .. }
            | HazardError::UnsupportedStation { .. }
            | HazardError::InvalidConfig(_)
            | HazardError::InvalidWeights(_)
            | HazardError::UnknownDataset(_)
            | HazardError::UnknownSource(_) => ErrorKind::Configuration,
            HazardError::ExceedanceOutOfRange { .. } => ErrorKind::Range,
            HazardError::InsufficientData { .. } => ErrorKind::DataSufficiency,
            HazardError::InvariantViolation(_) | HazardError::Numerical(_) => ErrorKind::Invariant,
            HazardError::Io(_) | HazardError::Json(_) | HazardError::Toml(_) => ErrorKind::Io,
        }
    }

    /// Range errors only skip the affected case in a batch run
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Range
    }

    /// Attach a branch name to a range error raised while processing that branch
    pub fn with_branch(self, branch_name: &str) -> Self {
        match self {
            HazardError::ExceedanceOutOfRange { station, im, exceedance, im_value, branch: None } => {
                HazardError::ExceedanceOutOfRange {
                    station,
                    im,
                    exceedance,
                    im_value,
                    branch: Some(branch_name.to_string()),
                }
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, HazardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_error_is_recoverable() {
        let err = HazardError::ExceedanceOutOfRange {
            station: "CCCC".into(),
            im: "PGA".into(),
            exceedance: Some(1e-20),
            im_value: None,
            branch: None,
        };
        assert!(err.is_recoverable());
        let msg = err.with_branch("br_a").to_string();
        assert!(msg.contains("branch br_a"));
        assert!(msg.contains("CCCC"));
    }

    #[test]
    fn test_invariant_is_not_recoverable() {
        let err = HazardError::InvariantViolation("mixed leaf".into());
        assert_eq!(err.kind(), ErrorKind::Invariant);
        assert!(!err.is_recoverable());
    }
}
