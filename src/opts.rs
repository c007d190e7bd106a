use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Language-model fusion weights carried in every scorer package.
///
/// The decoder blends scores as `acoustic + alpha * lm + beta * word_count`; both weights
/// originate here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScorerParams {
    /// Language-model weight.
    pub alpha: f64,

    /// Word-insertion weight.
    pub beta: f64,
}

impl Default for ScorerParams {
    fn default() -> Self {
        Self {
            alpha: 0.931_289_039_105_002,
            beta: 1.183_413_758_151_028_4,
        }
    }
}

/// Where the language model for a new package comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LmSource {
    /// ARPA text, converted to the binary form while packaging.
    Arpa(PathBuf),

    /// An existing binary model (a bare model or a previous package; only the model region is kept).
    Binary(PathBuf),
}

/// Which alphabet a package is built against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlphabetSource {
    /// An alphabet config file; the package scores whole words.
    Config(PathBuf),

    /// The byte alphabet; the package scores UTF-8 codepoints.
    Bytes,
}

/// Options that control how a scorer package is generated.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The CLI is responsible for mapping user input into this type so that other frontends
/// (build scripts, tests) can construct options programmatically.
#[derive(Debug, Clone)]
pub struct PackageOpts {
    pub lm: LmSource,

    /// Whitespace-separated vocabulary. When `None`, the language model's own vocabulary is used.
    pub vocab_path: Option<PathBuf>,

    pub alphabet: AlphabetSource,

    /// Output file. Overwritten if it exists.
    pub package_path: PathBuf,

    /// Default weights stored in the package header.
    pub params: ScorerParams,
}
