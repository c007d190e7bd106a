use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
///
/// Load-time variants are terminal for that load attempt. Out-of-vocabulary words are never
/// reported here: they are scored with [`crate::language_model::OOV_SCORE`] instead.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs.
#[derive(Debug, Error)]
pub enum Error {
    /// The scorer file could not be opened for reading.
    #[error("scorer file is not readable: {}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The leading bytes are not a recognized language-model binary.
    #[error("{} is not a recognized language model binary: {reason}", path.display())]
    InvalidFormat { path: PathBuf, reason: String },

    /// The file ends where the language model ends; no vocabulary package follows it.
    #[error(
        "scorer file {} has no vocabulary package (size {size} bytes, language model ends at {offset})",
        path.display()
    )]
    MissingPackage {
        path: PathBuf,
        size: u64,
        offset: u64,
    },

    /// The package magic did not match.
    #[error("can't parse scorer file, invalid header (magic {magic:#010x}). Try updating your scorer file.")]
    CorruptPackageHeader { magic: i32 },

    /// The package was written by a different format version.
    #[error("{}", version_mismatch_message(*found, *expected))]
    VersionMismatch { found: i32, expected: i32 },

    /// The automaton region of the package could not be decoded.
    #[error("invalid vocabulary automaton: {0}")]
    InvalidDictionary(String),

    /// The alphabet configuration could not be read or is malformed.
    #[error("invalid alphabet: {0}")]
    InvalidAlphabet(String),

    /// The acoustic model's class count does not match the alphabet (plus the CTC blank).
    #[error("alphabet has {alphabet} labels but the acoustic model emits {classes} classes (expected {})", alphabet + 1)]
    InvalidAlphabetSize { alphabet: usize, classes: usize },

    /// Malformed ARPA language model text.
    #[error("malformed ARPA input at line {line}: {message}")]
    InvalidArpa { line: usize, message: String },

    /// Scoring was requested before a language model was loaded.
    #[error("no language model loaded")]
    NoLanguageModel,

    /// An automaton operation was requested before one was built or loaded.
    #[error("no vocabulary automaton loaded")]
    NoDictionary,

    /// A state that valid inputs can never produce.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// Writing the vocabulary package failed.
    #[error("failed to persist vocabulary package to {}", path.display())]
    PersistFailure {
        path: PathBuf,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub(crate) fn persist(path: impl Into<PathBuf>, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::PersistFailure {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Stable integer code for callers that surface errors across an FFI or process boundary.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidAlphabet(_) => 0x2000,
            Self::InvalidAlphabetSize { .. } => 0x2001,
            Self::NoLanguageModel | Self::NoDictionary => 0x2004,
            Self::FileUnreadable { .. } => 0x2005,
            Self::InvalidFormat { .. } | Self::InvalidArpa { .. } => 0x2006,
            Self::MissingPackage { .. } => 0x2007,
            Self::CorruptPackageHeader { .. } | Self::InvalidDictionary(_) => 0x2008,
            Self::VersionMismatch { .. } => 0x2009,
            Self::PersistFailure { .. } => 0x3005,
            Self::InternalInconsistency(_) => 0x3006,
            Self::Message(_) | Self::Other(_) => 0x3000,
        }
    }
}

fn version_mismatch_message(found: i32, expected: i32) -> String {
    let advice = if found < expected {
        "Update your scorer file."
    } else {
        "Downgrade your scorer file or update your version of ctc-scorer."
    };
    format!("scorer file version mismatch ({found} instead of expected {expected}). {advice}")
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}
