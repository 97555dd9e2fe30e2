use thiserror::Error;

#[derive(Debug, Error)]
pub enum StemforgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown {kind} '{key}' in reference data")]
    UnknownReference { kind: &'static str, key: String },

    #[error("Invalid distribution parameters: {0}")]
    Distribution(String),

    #[error("Failed to converge: {0}")]
    Convergence(String),

    #[error("Vessel allocation failed: {0}")]
    Allocation(String),
}

impl StemforgeError {
    pub(crate) fn unknown(kind: &'static str, key: impl ToString) -> Self {
        StemforgeError::UnknownReference {
            kind,
            key: key.to_string(),
        }
    }

    /// Whether the error comes from invalid inputs rather than from the model itself.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StemforgeError::Configuration(_) | StemforgeError::UnknownReference { .. }
        )
    }
}
