//! Error types for reference resolution, bundling and dereferencing.

use thiserror::Error;

/// Error type returned by resolver and parser plugins.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Convenience alias used throughout the crate.
pub type Result<T, E = RefError> = std::result::Result<T, E>;

/// Coarse classification of a [`RefError`], mostly useful in tests and for
/// reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Resolver,
    UnmatchedResolver,
    Parser,
    UnmatchedParser,
    MissingPointer,
    InvalidPointer,
    Circular,
    NotRegistered,
    DepthExceeded,
    InvalidOption,
    InvalidInput,
    CyclicValue,
    Aggregate,
}

/// Errors raised while resolving `$ref` pointers.
#[derive(Debug, Error)]
pub enum RefError {
    // IO errors (exit code 3)
    #[error("error reading {locator}: {source}")]
    Resolver {
        locator: String,
        #[source]
        source: BoxError,
    },

    #[error("no resolver could read {locator}")]
    UnmatchedResolver { locator: String },

    // Parse errors (exit code 2)
    #[error("error parsing {locator}: {source}")]
    Parser {
        locator: String,
        #[source]
        source: BoxError,
    },

    #[error("no parser could decode {locator}")]
    UnmatchedParser { locator: String },

    // Pointer errors (exit code 2)
    #[error("missing $ref pointer \"{pointer}\": token \"{token}\" does not exist")]
    MissingPointer { token: String, pointer: String },

    #[error("invalid $ref pointer \"{pointer}\": pointers must begin with \"#/\"")]
    InvalidPointer { pointer: String },

    #[error("circular $ref pointer found at {path}")]
    Circular { path: String },

    #[error("error resolving $ref pointer \"{pointer}\": \"{locator}\" is not registered")]
    NotRegistered { pointer: String, locator: String },

    #[error("maximum depth of {limit} exceeded at {path}")]
    DepthExceeded { limit: usize, path: String },

    // Misuse
    #[error("invalid option: {message}")]
    InvalidOption { message: String },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("document is cyclic at {path} and cannot be converted to a tree")]
    CyclicValue { path: String },

    #[error("{} error(s) occurred while processing {root}", errors.len())]
    Aggregate { root: String, errors: Vec<RefError> },
}

impl RefError {
    pub(crate) fn parser(locator: impl Into<String>, message: impl Into<String>) -> Self {
        let message: String = message.into();
        RefError::Parser {
            locator: locator.into(),
            source: message.into(),
        }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RefError::Resolver { .. } => ErrorKind::Resolver,
            RefError::UnmatchedResolver { .. } => ErrorKind::UnmatchedResolver,
            RefError::Parser { .. } => ErrorKind::Parser,
            RefError::UnmatchedParser { .. } => ErrorKind::UnmatchedParser,
            RefError::MissingPointer { .. } => ErrorKind::MissingPointer,
            RefError::InvalidPointer { .. } => ErrorKind::InvalidPointer,
            RefError::Circular { .. } => ErrorKind::Circular,
            RefError::NotRegistered { .. } => ErrorKind::NotRegistered,
            RefError::DepthExceeded { .. } => ErrorKind::DepthExceeded,
            RefError::InvalidOption { .. } => ErrorKind::InvalidOption,
            RefError::InvalidInput { .. } => ErrorKind::InvalidInput,
            RefError::CyclicValue { .. } => ErrorKind::CyclicValue,
            RefError::Aggregate { .. } => ErrorKind::Aggregate,
        }
    }

    /// Whether `continue_on_error` may absorb this error into a file record.
    ///
    /// Invariant violations, policy failures and misuse always propagate.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Resolver
                | ErrorKind::UnmatchedResolver
                | ErrorKind::Parser
                | ErrorKind::UnmatchedParser
                | ErrorKind::MissingPointer
                | ErrorKind::InvalidPointer
        )
    }

    /// Returns the process exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            RefError::Resolver { .. } | RefError::UnmatchedResolver { .. } => 3,
            RefError::Aggregate { errors, .. } => {
                errors.iter().map(RefError::exit_code).max().unwrap_or(2)
            }
            _ => 2,
        }
    }

    /// Flattens an aggregate into its members; any other error yields itself.
    pub fn errors(&self) -> Vec<&RefError> {
        match self {
            RefError::Aggregate { errors, .. } => errors.iter().collect(),
            other => vec![other],
        }
    }
}
