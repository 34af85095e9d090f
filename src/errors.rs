/*!
 * Error types for the transflow application.
 *
 * Each stage of the pipeline owns its error type. Fatal errors abort a path
 * before anything is written; per-asset failures are downgraded to manifest
 * entries by the bundler and never surface here as hard errors.
 */

use thiserror::Error;

/// Errors raised while turning raw text into a document tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Input bytes are not valid UTF-8
    #[error("Input is not valid UTF-8 (at byte {offset})")]
    InvalidUtf8 {
        /// Byte offset of the first invalid sequence
        offset: usize,
    },
}

/// Errors raised when translated text cannot be merged back into a document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyError {
    /// A segment produced by the segmenter has no translation
    #[error("Missing translation for segment {0}")]
    MissingSegment(usize),

    /// A translation was supplied for an id the segmenter never produced
    #[error("Unexpected translation for unknown segment {0}")]
    UnknownSegment(usize),

    /// Translated text does not carry every protected placeholder exactly once
    #[error("Segment {id} lost or duplicated protected span placeholders")]
    PlaceholderMismatch {
        /// Offending segment id
        id: usize,
    },

    /// Segment path no longer points at the expected nodes
    #[error("Segment {id} points outside its parent node")]
    InvalidPath {
        /// Offending segment id
        id: usize,
    },
}

/// Per-asset download failure, recorded in the bundle manifest
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetFetchError {
    /// The asset URL could not be parsed
    #[error("Invalid asset URL: {0}")]
    InvalidUrl(String),

    /// Remote answered with a non-success status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Transport level failure (DNS, TLS, timeout, reset)
    #[error("Request failed: {0}")]
    Transport(String),

    /// Fetched bytes could not be stored
    #[error("Failed to write asset: {0}")]
    Write(String),

    /// Fetch was never attempted because the run was interrupted
    #[error("Cancelled before completion")]
    Cancelled,
}

impl AssetFetchError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status(code) => *code == 408 || *code == 429 || *code >= 500,
            Self::InvalidUrl(_) | Self::Write(_) | Self::Cancelled => false,
        }
    }
}

/// Invalid configuration or naming input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds an unusable value
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Configuration field name
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// A required credential is empty
    #[error("Missing API key for {0} (set it in the config file or the environment)")]
    MissingApiKey(String),

    /// Folder naming pattern uses a token outside the supported vocabulary
    #[error("Unknown naming token '{{{0}}}'")]
    UnknownToken(String),

    /// Folder naming pattern resolves to a path escaping the output root
    #[error("Naming pattern resolves to an unsafe path: {0}")]
    UnsafePath(String),
}

impl ConfigError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur when working with collaborator APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Translation service returned a different number of texts than it was sent
    #[error("Expected {expected} translated texts, received {actual}")]
    CountMismatch {
        /// Number of texts submitted
        expected: usize,
        /// Number of texts returned
        actual: usize,
    },
}

/// Errors that can occur during translation of a document
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Translated segments could not be merged back
    #[error("Reassembly error: {0}")]
    Reassembly(#[from] ReassemblyError),

    /// Interrupted before every batch was translated
    #[error("Translation cancelled")]
    Cancelled,
}

/// Errors that abort a bundle as a whole
#[derive(Error, Debug)]
pub enum BundleError {
    /// Naming pattern or options were invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem failure while staging or publishing the bundle
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest could not be built or serialized
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// The download client could not be constructed
    #[error("HTTP client error: {0}")]
    Client(String),

    /// Interrupted before anything was staged
    #[error("Bundle cancelled")]
    Cancelled,
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Malformed input document
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Error from bundling
    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    /// Process exit code: 2 for bad input or configuration, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Parse(_) | Self::Config(_) => 2,
            Self::Bundle(BundleError::Config(_)) => 2,
            _ => 1,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
