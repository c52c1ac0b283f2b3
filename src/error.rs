use miette::Diagnostic;
use thiserror::Error;

use crate::run::RunState;

#[derive(Debug, Error, Diagnostic)]
pub enum ScoError {
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("missing reference in resource links: {0}")]
    MissingReference(String),

    #[error("invalid file suffix: {0}")]
    InvalidFileSuffix(String),

    #[error("invalid file: {0}")]
    InvalidFile(String),

    #[error("invalid option set")]
    InvalidOptionSet,

    #[error("invalid property set")]
    InvalidPropertySet,

    #[error("unexpected file type: {0}")]
    UnexpectedFileType(String),

    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    #[error("not a valid subject directory")]
    InvalidSubjectDirectory,

    #[error("invalid run state transition: run is {current}")]
    InvalidStateTransition { current: RunState, attempted: RunState },

    #[error("error message list must not be empty")]
    EmptyErrorList,

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
