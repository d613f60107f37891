use std::fmt;

use crate::dialect::Dialect;

/// Machine-readable error codes for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidConfig,
    MissingAttribute,
    UnsupportedDialectFeature,
    DialectMismatch,
    CycleDetected,
    StorageFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidConfig => "E1001",
            Self::MissingAttribute => "E2001",
            Self::CycleDetected => "E2002",
            Self::UnsupportedDialectFeature => "E3001",
            Self::DialectMismatch => "E3002",
            Self::StorageFailure => "E5001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidConfig => "Invalid hierarchy configuration",
            Self::MissingAttribute => "Record is missing a hierarchy attribute",
            Self::CycleDetected => "Parent cycle in materialized rows",
            Self::UnsupportedDialectFeature => "Unsupported dialect feature",
            Self::DialectMismatch => "Query dialect does not match executor",
            Self::StorageFailure => "Storage engine error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::InvalidConfig => {
                Some("Check column names, separator and custom paths in the hierarchy config.")
            }
            Self::MissingAttribute => {
                Some("Select the key, parent key, depth and path columns for this record.")
            }
            Self::CycleDetected => Some("Repair the parent pointers so every chain ends at a root."),
            Self::UnsupportedDialectFeature => {
                Some("Use the text path encoding or a dialect that supports this encoding.")
            }
            Self::DialectMismatch => Some("Build the hierarchy with the executor's dialect."),
            Self::StorageFailure => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised while building, executing or materializing a traversal.
///
/// Build-time variants are raised before any SQL reaches the storage
/// engine. [`HierarchyError::Storage`] wraps whatever the engine reported,
/// including its own recursion-limit failures on cyclic data.
#[derive(Debug, thiserror::Error)]
pub enum HierarchyError {
    #[error("invalid hierarchy config: {0}")]
    InvalidConfig(String),

    #[error("record is missing attribute '{0}'")]
    MissingAttribute(String),

    #[error("{dialect} does not support {feature}")]
    UnsupportedDialectFeature {
        dialect: Dialect,
        feature: &'static str,
    },

    #[error("query was rendered for {query} but the executor speaks {executor}")]
    DialectMismatch { query: Dialect, executor: Dialect },

    #[error("parent cycle through key '{0}' in materialized rows")]
    CycleDetected(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl HierarchyError {
    /// The machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::MissingAttribute(_) => ErrorCode::MissingAttribute,
            Self::UnsupportedDialectFeature { .. } => ErrorCode::UnsupportedDialectFeature,
            Self::DialectMismatch { .. } => ErrorCode::DialectMismatch,
            Self::CycleDetected(_) => ErrorCode::CycleDetected,
            Self::Storage(_) => ErrorCode::StorageFailure,
        }
    }
}

pub type Result<T, E = HierarchyError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::{ErrorCode, HierarchyError};
    use crate::dialect::Dialect;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::InvalidConfig,
            ErrorCode::MissingAttribute,
            ErrorCode::UnsupportedDialectFeature,
            ErrorCode::DialectMismatch,
            ErrorCode::CycleDetected,
            ErrorCode::StorageFailure,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::UnsupportedDialectFeature.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn unsupported_feature_names_dialect() {
        let err = HierarchyError::UnsupportedDialectFeature {
            dialect: Dialect::MySql,
            feature: "array path encoding",
        };
        assert_eq!(err.to_string(), "mysql does not support array path encoding");
        assert_eq!(err.code(), ErrorCode::UnsupportedDialectFeature);
    }
}
