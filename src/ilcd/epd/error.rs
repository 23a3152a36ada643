use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, IlcdError>;

/// Coarse classification of failures, used to decide whether an error is
/// recoverable, retryable or fatal for a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A dataset or attachment does not exist in the medium.
    NotFound,
    /// The underlying storage or network failed.
    Transport,
    /// XML is present but cannot be interpreted.
    MalformedDocument,
    /// A unit string could not be mapped onto the canonical unit set.
    UnitMapping,
    /// The caller asked for something the tool does not support.
    Usage,
}

/// A unit that has no entry in the canonical unit table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown unit '{unit}' for {field}")]
pub struct UnitMappingError {
    /// Dotted path of the output field the unit belongs to.
    pub field: String,
    /// The offending unit string, verbatim.
    pub unit: String,
}

/// Error type covering the different failure cases that can occur when the
/// tool locates, parses, or maps ILCD datasets.
#[derive(Debug, Error)]
pub enum IlcdError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the zip reader implementation.
    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Errors bubbled up from the HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Raised when a configuration file cannot be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Raised when a dataset or attachment does not exist in the medium.
    #[error("not found: {0}")]
    NotFound(String),

    /// Raised when storage or a remote endpoint is unreachable or corrupt.
    #[error("transport error: {0}")]
    Transport(String),

    /// Raised when a remote endpoint answers with an unexpected status.
    #[error("unexpected HTTP status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Raised when XML is present but structurally unusable.
    #[error("malformed document {document}: {reason}")]
    MalformedDocument { document: String, reason: String },

    /// Raised when a unit cannot be mapped onto the canonical unit set.
    #[error(transparent)]
    UnitMapping(#[from] UnitMappingError),

    /// Raised when an input is not a valid ILCD archive or directory.
    #[error("invalid ILCD container: {0}")]
    InvalidContainer(String),

    /// Raised when a URL cannot be interpreted as a soda4LCA endpoint.
    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),

    /// Raised when a dialect name is not registered.
    #[error("unknown dialect '{0}'")]
    UnknownDialect(String),

    /// Raised when a dialect overrides a field with a rule of the wrong kind.
    #[error("dialect '{dialect}' overrides {field} with an incompatible rule")]
    InvalidOverride { dialect: String, field: String },

    /// Raised when the CLI receives an unsupported conversion request.
    #[error("unsupported conversion from {from:?} to {to:?}")]
    UnsupportedConversion { from: String, to: String },

    /// Raised when the requested language is not present in the document.
    #[error("language '{requested}' is not available, document offers: {available:?}")]
    UnsupportedLanguage {
        requested: String,
        available: Vec<String>,
    },

    /// Raised when a configuration file has invalid values.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl IlcdError {
    /// Shorthand for a [`IlcdError::MalformedDocument`].
    pub fn malformed(document: impl Into<String>, reason: impl Into<String>) -> Self {
        IlcdError::MalformedDocument {
            document: document.into(),
            reason: reason.into(),
        }
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IlcdError::NotFound(_) => ErrorKind::NotFound,
            IlcdError::HttpStatus { status: 404, .. } => ErrorKind::NotFound,
            IlcdError::Zip(zip::result::ZipError::FileNotFound) => ErrorKind::NotFound,
            IlcdError::Io(_)
            | IlcdError::Zip(_)
            | IlcdError::Http(_)
            | IlcdError::Transport(_)
            | IlcdError::HttpStatus { .. } => ErrorKind::Transport,
            IlcdError::MalformedDocument { .. } | IlcdError::InvalidContainer(_) => {
                ErrorKind::MalformedDocument
            }
            IlcdError::UnitMapping(_) => ErrorKind::UnitMapping,
            IlcdError::Json(_)
            | IlcdError::ConfigParse(_)
            | IlcdError::InvalidEndpoint(_)
            | IlcdError::UnknownDialect(_)
            | IlcdError::InvalidOverride { .. }
            | IlcdError::UnsupportedConversion { .. }
            | IlcdError::UnsupportedLanguage { .. }
            | IlcdError::Config(_)
            | IlcdError::MissingInput(_)
            | IlcdError::Logging(_) => ErrorKind::Usage,
        }
    }

    /// Returns `true` when the failure is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            IlcdError::HttpStatus { status, .. } => {
                matches!(status, 413 | 429 | 500 | 502 | 503 | 504)
            }
            IlcdError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            IlcdError::Transport(_) => true,
            _ => false,
        }
    }

    /// Returns `true` when the error means "absent" rather than "broken".
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Process exit code used by the command line front-end.
    pub fn exit_code(&self) -> i32 {
        match self {
            IlcdError::UnsupportedConversion { .. } => 1,
            IlcdError::MissingInput(_) | IlcdError::InvalidEndpoint(_) => 2,
            IlcdError::UnknownDialect(_) => 3,
            IlcdError::UnsupportedLanguage { .. } => 4,
            _ => match self.kind() {
                ErrorKind::NotFound => 6,
                ErrorKind::Transport => 7,
                ErrorKind::MalformedDocument => 8,
                ErrorKind::UnitMapping => 9,
                ErrorKind::Usage => 10,
            },
        }
    }
}
