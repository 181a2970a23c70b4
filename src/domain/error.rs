//! Domain error types.

/// Top-level error type for indexwatch.
#[derive(Debug, thiserror::Error)]
pub enum IndexwatchError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("validation error: {reason}")]
    Validation { reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{filename}: no index is linked to this file (select an index or configure its filename)")]
    UnmatchedFile { filename: String },

    #[error("{filename}: invalid file type, expected one of: {expected}")]
    InvalidFileType { filename: String, expected: String },

    #[error("could not read {source_name}: {reason}")]
    Decode { source_name: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IndexwatchError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// True for conditions the operator can fix by re-uploading or
    /// re-configuring, as opposed to faults in the store itself.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnmatchedFile { .. }
                | Self::InvalidFileType { .. }
                | Self::Decode { .. }
                | Self::Validation { .. }
        )
    }
}

impl From<&IndexwatchError> for std::process::ExitCode {
    fn from(err: &IndexwatchError) -> Self {
        let code: u8 = match err {
            IndexwatchError::Io(_) => 1,
            IndexwatchError::ConfigParse { .. }
            | IndexwatchError::ConfigMissing { .. }
            | IndexwatchError::ConfigInvalid { .. } => 2,
            IndexwatchError::Database { .. } | IndexwatchError::DatabaseQuery { .. } => 3,
            IndexwatchError::Validation { .. }
            | IndexwatchError::UnmatchedFile { .. }
            | IndexwatchError::InvalidFileType { .. }
            | IndexwatchError::Decode { .. } => 4,
            IndexwatchError::NotFound { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_file_message_names_the_file() {
        let err = IndexwatchError::UnmatchedFile {
            filename: "mystery.csv".into(),
        };
        assert!(err.to_string().starts_with("mystery.csv:"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn store_faults_are_not_recoverable() {
        let err = IndexwatchError::Database {
            reason: "disk full".into(),
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn not_found_display() {
        let err = IndexwatchError::NotFound {
            entity: "index",
            id: 42,
        };
        assert_eq!(err.to_string(), "index 42 not found");
    }
}
