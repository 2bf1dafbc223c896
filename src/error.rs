use thiserror::Error;

/// Convenience result type for hierarchy ingestion.
pub type HierarchyResult<T> = Result<T, HierarchyError>;

/// Error type returned by the ingestion pipeline.
///
/// A single enum covers header resolution, record validation, stream failures and
/// cancellation. Use [`HierarchyError::class`] to tell caller mistakes apart from
/// internal failures.
#[derive(Debug, Error)]
pub enum HierarchyError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The input stream could not be read as CSV.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The header row does not describe a valid hierarchy.
    #[error("invalid header: {0}")]
    Schema(#[from] SchemaError),

    /// A data record failed validation.
    #[error("invalid record at line {line}: {source}")]
    Record {
        /// 1-based line of the record in the input.
        line: u64,
        #[source]
        source: RecordError,
    },

    /// The caller cancelled the parse.
    #[error("parse cancelled")]
    Cancelled,

    /// The caller-supplied deadline passed before the parse completed.
    #[error("parse deadline exceeded")]
    DeadlineExceeded,

    /// Unexpected failure inside the pipeline (worker panic, thread pool setup).
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Header (schema) validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The input ended before a header row was read.
    #[error("missing header row")]
    MissingHeader,

    /// A header name is neither `item_id` nor `level_<n>`.
    #[error("unknown column type in header: '{name}'")]
    UnknownColumn { name: String },

    /// A `level_` column whose depth is not a positive integer.
    #[error("invalid level column '{name}'")]
    InvalidLevelColumn { name: String },

    /// The same role appears twice in the header.
    #[error("duplicate column {name} found")]
    DuplicateColumn { name: String },

    /// `item_id` or `level_1` is absent.
    #[error("missing required column {name}")]
    MissingRequiredColumn { name: String },

    /// A level depth is present without its parent depth.
    #[error("column {column} requires column {missing} to be present")]
    NonContiguousLevels { column: String, missing: String },
}

/// Per-record validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The record is too short for a configured column, or a required value is empty.
    #[error("missing required value for {column}")]
    MissingRequiredValue { column: String },

    /// A populated level follows an empty ancestor level.
    #[error("missing required parent element for {column} ({parent} is empty)")]
    MissingParentElement { column: String, parent: String },

    /// An item identifier and a category segment share a key at the same tree level.
    #[error("item id and category collide on key '{key}'")]
    LeafCollision { key: String },
}

/// Coarse classification used by boundary layers to pick a response class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The input is at fault (schema or record validation).
    Validation,
    /// The caller cancelled or the deadline passed.
    Cancelled,
    /// Anything else: I/O, malformed stream, internal failure.
    Internal,
}

impl HierarchyError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Schema(_) | Self::Record { .. } => ErrorClass::Validation,
            Self::Cancelled | Self::DeadlineExceeded => ErrorClass::Cancelled,
            Self::Io(_) | Self::Csv(_) | Self::Internal { .. } => ErrorClass::Internal,
        }
    }

    /// True for errors caused by the input itself.
    pub fn is_validation(&self) -> bool {
        self.class() == ErrorClass::Validation
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_classified_as_client_faults() {
        let schema = HierarchyError::from(SchemaError::MissingRequiredColumn {
            name: "level_1".to_string(),
        });
        assert_eq!(schema.class(), ErrorClass::Validation);
        assert!(schema.is_validation());

        let record = HierarchyError::Record {
            line: 3,
            source: RecordError::MissingRequiredValue {
                column: "item_id".to_string(),
            },
        };
        assert!(record.is_validation());
        assert_eq!(
            record.to_string(),
            "invalid record at line 3: missing required value for item_id"
        );
    }

    #[test]
    fn cancellation_is_its_own_class() {
        assert_eq!(HierarchyError::Cancelled.class(), ErrorClass::Cancelled);
        assert_eq!(HierarchyError::DeadlineExceeded.class(), ErrorClass::Cancelled);
        assert!(!HierarchyError::Cancelled.is_validation());
    }

    #[test]
    fn io_and_internal_errors_are_server_faults() {
        let io = HierarchyError::from(std::io::Error::other("disk on fire"));
        assert_eq!(io.class(), ErrorClass::Internal);
        assert_eq!(HierarchyError::internal("boom").class(), ErrorClass::Internal);
    }
}
