//! Scorer package generation.

use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

use crate::alphabet::Alphabet;
use crate::error::{Error, Result};
use crate::language_model::LanguageModel;
use crate::ngram::NgramModel;
use crate::opts::{AlphabetSource, LmSource, PackageOpts};
use crate::scorer::Scorer;

/// What [`generate_package`] wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageSummary {
    pub package_path: PathBuf,
    pub utf8_mode: bool,
    pub alpha: f64,
    pub beta: f64,
    pub order: usize,

    /// Size of the language-model region at the start of the package.
    pub lm_bytes: u64,

    pub vocab_words: usize,
    pub skipped_words: usize,
    pub automaton_states: usize,
}

/// Build a scorer package: the binary language model followed by the vocabulary package.
///
/// The vocabulary comes from `opts.vocab_path` when set and from the language model otherwise.
pub fn generate_package(opts: &PackageOpts) -> Result<PackageSummary> {
    let alphabet = match &opts.alphabet {
        AlphabetSource::Config(path) => Alphabet::from_config_file(path)?,
        AlphabetSource::Bytes => Alphabet::utf8(),
    };

    let model = match &opts.lm {
        LmSource::Arpa(path) => NgramModel::from_arpa_file(path)?,
        LmSource::Binary(path) => NgramModel::load(path)?,
    };
    let lm_bytes = write_model(&model, &opts.package_path)?;
    info!(
        path = %opts.package_path.display(),
        order = model.order(),
        lm_bytes,
        "wrote language model"
    );

    let mut scorer = Scorer::new(alphabet);
    match scorer.load_lm(&opts.package_path) {
        Err(Error::MissingPackage { .. }) => {}
        Err(err) => return Err(err),
        Ok(()) => {
            return Err(Error::InternalInconsistency(format!(
                "{} already carries a vocabulary package",
                opts.package_path.display()
            )));
        }
    }
    scorer.reset_params(opts.params.alpha, opts.params.beta);

    let words = match &opts.vocab_path {
        Some(path) => read_vocabulary(path)?,
        None => model.vocabulary().map(str::to_owned).collect(),
    };
    let stats = scorer.fill_dictionary(&words)?;
    if stats.words == 0 {
        return Err(Error::msg("no vocabulary word can be spelled with the alphabet"));
    }

    scorer.save_dictionary(&opts.package_path, true)?;

    let summary = PackageSummary {
        package_path: opts.package_path.clone(),
        utf8_mode: scorer.is_utf8_mode(),
        alpha: scorer.alpha(),
        beta: scorer.beta(),
        order: scorer.max_order(),
        lm_bytes,
        vocab_words: stats.words,
        skipped_words: stats.skipped,
        automaton_states: stats.states,
    };
    info!(
        path = %summary.package_path.display(),
        words = summary.vocab_words,
        states = summary.automaton_states,
        "generated scorer package"
    );
    Ok(summary)
}

/// Whitespace-separated words, first occurrence kept.
fn read_vocabulary(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).map_err(|source| Error::FileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let mut seen = HashSet::new();
    Ok(text
        .split_whitespace()
        .filter(|word| seen.insert(*word))
        .map(str::to_owned)
        .collect())
}

fn write_model(model: &NgramModel, path: &Path) -> Result<u64> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = NamedTempFile::new_in(parent).map_err(|err| Error::persist(path, err))?;

    let mut writer = BufWriter::new(temp.as_file());
    let written = model.write_binary(&mut writer)?;
    writer.flush().map_err(|err| Error::persist(path, err))?;
    drop(writer);

    temp.persist(path).map_err(|err| Error::persist(path, err))?;
    Ok(written)
}
