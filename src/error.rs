use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DbUtilsError>;

/// Errors raised at the point of misuse or reported by a queryable backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DbUtilsError {
    /// The queryable already carries an offset or ordering that key-range scanning cannot honor.
    #[error("invalid queryable for range scanning: {0}")]
    InvalidQueryable(&'static str),
    /// A single-iteration cursor was iterated a second time without being buffered.
    #[error(
        "cursor has already been iterated once; call to_list() if you need to reuse the rows"
    )]
    DoubleIteration,
    /// The requested operation is not valid in the cursor's current state.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    /// A multi-relation attach mixed relations pointing at different models.
    #[error("cannot attach relations that target different models ({expected} != {found})")]
    IncompatibleRelation {
        /// Related model of the first relation.
        expected: String,
        /// Related model of the offending relation.
        found: String,
    },
    /// Model metadata could not be resolved.
    #[error("unknown model '{0}'")]
    UnknownModel(String),
    /// Relation name is not defined on the model.
    #[error("model '{model}' has no relation named '{relation}'")]
    UnknownRelation {
        /// Model the lookup was performed on.
        model: String,
        /// Requested relation name.
        relation: String,
    },
    /// Database alias is not known to the query source.
    #[error("unknown database alias '{0}'")]
    UnknownDatabase(String),
    /// Failure reported by the backing store.
    #[error("backend error: {0}")]
    Backend(String),
}

impl DbUtilsError {
    pub(crate) fn unknown_relation(model: impl Into<String>, relation: impl Into<String>) -> Self {
        DbUtilsError::UnknownRelation {
            model: model.into(),
            relation: relation.into(),
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            DbUtilsError::InvalidQueryable(_) => "InvalidQueryable",
            DbUtilsError::DoubleIteration => "DoubleIteration",
            DbUtilsError::UnsupportedOperation(_) => "UnsupportedOperation",
            DbUtilsError::IncompatibleRelation { .. } => "IncompatibleRelation",
            DbUtilsError::UnknownModel(_) => "UnknownModel",
            DbUtilsError::UnknownRelation { .. } => "UnknownRelation",
            DbUtilsError::UnknownDatabase(_) => "UnknownDatabase",
            DbUtilsError::Backend(_) => "Backend",
        }
    }
}
