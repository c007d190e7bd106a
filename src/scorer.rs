//! Language-model scoring for CTC beam search.
//!
//! A [`Scorer`] owns one language model, one vocabulary automaton, the alphabet the acoustic
//! model emits and the fusion weights. It is loaded once and then shared read-only by every
//! decoding stream of that model:
//!
//! - [`Scorer::is_scoring_boundary`] tells the decoder when a word (word mode) or codepoint
//!   (UTF-8 mode) has just been completed.
//! - [`Scorer::make_ngram`] rebuilds the trailing n-gram of a hypothesis from its path-trie node.
//! - [`Scorer::get_log_cond_prob`] scores that n-gram.
//!
//! Packages are a language-model binary with a vocabulary package appended; see
//! [`crate::package`] for the header layout.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::alphabet::{Alphabet, CharMap};
use crate::dictionary::{DictionaryBuilder, FstDictionary, VocabularyAutomaton};
use crate::error::{Error, Result};
use crate::language_model::{LanguageModel, NUM_FLT_LOGE, OOV_SCORE, is_reserved_token};
use crate::ngram::{self, NgramModel};
use crate::opts::ScorerParams;
use crate::package::{HEADER_LEN, PackageHeader};
use crate::path_trie::{NodeId, PathTrie};
use crate::text::{split_into_codepoints, split_words, utf8_sequence_len};

/// Outcome of [`Scorer::fill_dictionary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryStats {
    /// Words inserted into the automaton.
    pub words: usize,
    /// Words dropped because the alphabet cannot spell them.
    pub skipped: usize,
    /// States of the minimized automaton.
    pub states: usize,
}

#[derive(Debug)]
pub struct Scorer {
    alphabet: Alphabet,
    char_map: CharMap,
    language_model: Option<Box<dyn LanguageModel>>,
    dictionary: Option<Box<dyn VocabularyAutomaton>>,
    utf8_mode: bool,
    params: ScorerParams,
}

impl Scorer {
    /// A scorer with no language model or automaton yet. UTF-8 mode follows the alphabet.
    pub fn new(alphabet: Alphabet) -> Self {
        let char_map = CharMap::new(&alphabet);
        Self {
            utf8_mode: alphabet.is_utf8(),
            alphabet,
            char_map,
            language_model: None,
            dictionary: None,
            params: ScorerParams::default(),
        }
    }

    /// Load a scorer package for `alphabet`.
    pub fn init(model_path: impl AsRef<Path>, alphabet: Alphabet) -> Result<Self> {
        let mut scorer = Self::new(alphabet);
        scorer.load_lm(model_path)?;
        Ok(scorer)
    }

    /// Load a scorer package, reading the alphabet from a config file first.
    pub fn init_with_alphabet_config(
        model_path: impl AsRef<Path>,
        alphabet_config_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let alphabet = Alphabet::from_config_file(alphabet_config_path)?;
        Self::init(model_path, alphabet)
    }

    /// Replace the alphabet and rebuild the character map. UTF-8 mode follows the alphabet.
    pub fn set_alphabet(&mut self, alphabet: Alphabet) {
        self.char_map = CharMap::new(&alphabet);
        self.utf8_mode = alphabet.is_utf8();
        self.alphabet = alphabet;
    }

    /// Use a custom language-model backend.
    pub fn set_language_model(&mut self, language_model: Box<dyn LanguageModel>) {
        self.language_model = Some(language_model);
    }

    /// Use a custom vocabulary automaton.
    pub fn set_dictionary(&mut self, dictionary: Box<dyn VocabularyAutomaton>) {
        self.dictionary = Some(dictionary);
    }

    /// Load the language model at `path`, then the vocabulary package appended to it.
    ///
    /// Nothing changes unless the whole file is accepted. The one exception is
    /// [`Error::MissingPackage`]: the language model is installed and any previous automaton is
    /// dropped, which is what package generation relies on.
    pub fn load_lm(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let unreadable = |source| Error::FileUnreadable {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(unreadable)?;
        let size = file.metadata().map_err(unreadable)?.len();
        if size == 0 {
            return Err(Error::InvalidFormat {
                path: path.to_path_buf(),
                reason: "file is empty".into(),
            });
        }

        // SAFETY: the map is read-only and dropped before this call returns; scorer files are
        // not expected to be modified while they are being loaded.
        let mmap = unsafe { Mmap::map(&file) }.map_err(unreadable)?;

        if !ngram::recognize_binary(&mmap) {
            return Err(Error::InvalidFormat {
                path: path.to_path_buf(),
                reason: "unrecognized language model signature".into(),
            });
        }

        let model = NgramModel::from_bytes(&mmap, path)?;
        let offset = model.end_of_model_offset();
        info!(
            path = %path.display(),
            order = model.order(),
            offset,
            size,
            "decoded language model"
        );

        if size <= offset {
            self.language_model = Some(Box::new(model));
            self.dictionary = None;
            return Err(Error::MissingPackage {
                path: path.to_path_buf(),
                size,
                offset,
            });
        }

        let (header, dictionary) = self.decode_package(&mmap[offset as usize..], path)?;
        self.language_model = Some(Box::new(model));
        self.commit_package(header, dictionary);
        Ok(())
    }

    /// Read the package header and vocabulary automaton from `bytes`.
    ///
    /// The package's mode must match the alphabet: a UTF-8 package needs the byte alphabet and
    /// a word package a configured one. On any error the scorer is left untouched. `path` only
    /// labels diagnostics.
    pub fn load_trie(&mut self, bytes: &[u8], path: &Path) -> Result<()> {
        let (header, dictionary) = self.decode_package(bytes, path)?;
        self.commit_package(header, dictionary);
        Ok(())
    }

    fn decode_package(&self, bytes: &[u8], path: &Path) -> Result<(PackageHeader, FstDictionary)> {
        let mut reader = bytes;
        let header = PackageHeader::read_from(&mut reader).inspect_err(|err| {
            error!(path = %path.display(), error = %err, "rejected scorer package header");
        })?;

        if header.utf8_mode != self.alphabet.is_utf8() {
            error!(
                path = %path.display(),
                package_utf8 = header.utf8_mode,
                alphabet_utf8 = self.alphabet.is_utf8(),
                "scorer package mode does not match the alphabet"
            );
            return Err(mode_mismatch(header.utf8_mode));
        }

        let dictionary = FstDictionary::load(&bytes[HEADER_LEN..])?;
        info!(
            path = %path.display(),
            utf8_mode = header.utf8_mode,
            alpha = header.params.alpha,
            beta = header.params.beta,
            states = dictionary.num_states(),
            "loaded vocabulary package"
        );
        Ok((header, dictionary))
    }

    fn commit_package(&mut self, header: PackageHeader, dictionary: FstDictionary) {
        self.utf8_mode = header.utf8_mode;
        self.params = header.params;
        self.dictionary = Some(Box::new(dictionary));
    }

    /// Write the package header and automaton to `path`.
    ///
    /// With `append`, the package is added to the end of an existing file (normally a bare
    /// language model); otherwise `path` is replaced atomically.
    pub fn save_dictionary(&self, path: impl AsRef<Path>, append: bool) -> Result<()> {
        let path = path.as_ref();
        let dictionary = self.dictionary.as_deref().ok_or(Error::NoDictionary)?;
        let header = PackageHeader::new(self.utf8_mode, self.params);

        let write_package = |w: &mut dyn Write| -> Result<()> {
            header.write_to(w)?;
            dictionary.store(w)?;
            w.flush()?;
            Ok(())
        };

        if append {
            let file = OpenOptions::new()
                .append(true)
                .open(path)
                .map_err(|err| Error::persist(path, err))?;
            write_package(&mut BufWriter::new(file)).map_err(|err| Error::persist(path, err))?;
        } else {
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let temp = NamedTempFile::new_in(parent).map_err(|err| Error::persist(path, err))?;
            write_package(&mut BufWriter::new(temp.as_file())).map_err(|err| Error::persist(path, err))?;
            temp.persist(path).map_err(|err| Error::persist(path, err))?;
        }

        debug!(path = %path.display(), append, "saved vocabulary package");
        Ok(())
    }

    /// Whether extending `node` with `new_label` completes a scoring unit.
    ///
    /// Word mode: `new_label` is the space label. UTF-8 mode: `node` ends a complete codepoint,
    /// i.e. as many bytes as its lead byte announces have been decoded.
    pub fn is_scoring_boundary(&self, trie: &PathTrie, node: NodeId, new_label: u32) -> Result<bool> {
        if !self.utf8_mode {
            return Ok(Some(new_label) == self.alphabet.space_label());
        }
        if trie.node(node).is_root() {
            return Ok(false);
        }

        let (distance, lead) = trie.distance_to_codepoint_boundary(node, &self.alphabet)?;
        let needed = utf8_sequence_len(lead).ok_or_else(|| {
            Error::InternalInconsistency(format!("invalid UTF-8 lead byte {lead:#04x}"))
        })?;
        Ok(distance == needed)
    }

    /// Natural-log probability of the last unit given the ones before it.
    ///
    /// Starts from `<s>` when `bos`, from an empty context otherwise, and scores `</s>` after the
    /// last unit when `eos`. Any unit unknown to the language model short-circuits to
    /// [`OOV_SCORE`].
    pub fn get_log_cond_prob<S: AsRef<str>>(&self, units: &[S], bos: bool, eos: bool) -> Result<f64> {
        let lm = self.lm()?;
        let mut state = if bos {
            lm.begin_sentence_state()
        } else {
            lm.null_context_state()
        };

        let mut cond_prob = 0.0f32;
        for unit in units {
            let Some(word) = lm.index(unit.as_ref()) else {
                return Ok(OOV_SCORE);
            };
            let (score, next) = lm.base_score(&state, word);
            cond_prob = score;
            state = next;
        }

        if eos {
            cond_prob = lm.base_score(&state, lm.end_sentence()).0;
        }

        Ok(f64::from(cond_prob) / NUM_FLT_LOGE)
    }

    /// Language-model score of a whole sentence.
    ///
    /// Sums [`Scorer::get_log_cond_prob`] over windows that grow from one unit up to the model
    /// order (conditioned on `<s>` while shorter than the order) and then slide one unit at a
    /// time. The last window also scores `</s>`. For order 3 and `a b c d`:
    ///
    /// ```text
    /// <s> a | <s> a b | a b c | b c d | c d </s>
    /// ```
    ///
    /// An empty sentence scores 0.
    pub fn get_sent_log_prob<S: AsRef<str>>(&self, units: &[S]) -> Result<f64> {
        let max_order = self.lm()?.order();
        let sent_len = units.len();
        if sent_len == 0 {
            return Ok(0.0);
        }

        let mut score = 0.0;
        let mut win_start = 0;
        for win_end in 1..=sent_len + 1 {
            let win_size = win_end - win_start;
            let bos = win_size < max_order;
            let eos = win_end == sent_len + 1;
            // The EOS window reaches one past the units; `</s>` fills that slot.
            let end = if eos { win_end - 1 } else { win_end };

            score += self.get_log_cond_prob(&units[win_start..end], bos, eos)?;

            if win_size == max_order {
                win_start += 1;
            }
        }

        Ok(score)
    }

    /// Replace the fusion weights.
    ///
    /// Takes `&mut self`: a scorer shared across decoding threads must not be updated while
    /// any of them is scoring.
    pub fn reset_params(&mut self, alpha: f64, beta: f64) {
        self.params = ScorerParams { alpha, beta };
    }

    /// Convert decoded labels into scoring units: codepoints in UTF-8 mode, words otherwise.
    pub fn split_labels_into_scored_units(&self, labels: &[u32]) -> Vec<String> {
        if labels.is_empty() {
            return Vec::new();
        }

        if self.utf8_mode {
            split_into_codepoints(&self.alphabet.labels_to_bytes(labels))
        } else {
            split_words(&self.alphabet.decode(labels))
        }
    }

    /// The trailing n-gram (at most `max_order` units, oldest first) of the path ending at `node`.
    pub fn make_ngram(&self, trie: &PathTrie, node: NodeId) -> Vec<String> {
        let max_order = self.max_order();
        let mut ngram = Vec::with_capacity(max_order);
        let mut current = Some(node);

        for _ in 0..max_order {
            let Some(id) = current.filter(|&id| !trie.node(id).is_root()) else {
                break;
            };

            let unit = if self.utf8_mode {
                trie.prev_grapheme(id, &self.alphabet)
            } else {
                trie.prev_word(id, self.alphabet.space_label())
            };
            current = trie.parent(unit.stop);
            ngram.push(self.alphabet.decode(&unit.labels));
        }

        ngram.reverse();
        ngram
    }

    /// Build the vocabulary automaton from `vocabulary`.
    ///
    /// `<s>`, `<unk>` and `</s>` are skipped, as are words the alphabet cannot spell. In word
    /// mode every word is followed by the space symbol so the decoder can return to the start
    /// state at a word boundary.
    pub fn fill_dictionary<I, S>(&mut self, vocabulary: I) -> Result<DictionaryStats>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let space_symbol = if self.utf8_mode {
            None
        } else {
            let space = self.alphabet.space_label().ok_or_else(|| {
                Error::InvalidAlphabet("word mode requires a space label".into())
            })?;
            Some(space + 1)
        };

        let mut builder = DictionaryBuilder::new();
        let mut skipped = 0;
        for word in vocabulary {
            let word = word.as_ref();
            if word.is_empty() || is_reserved_token(word) {
                continue;
            }
            let Some(mut symbols) = self.char_map.word_symbols(word, self.utf8_mode) else {
                skipped += 1;
                continue;
            };
            symbols.extend(space_symbol);
            builder.add_word(&symbols)?;
        }

        if skipped > 0 {
            warn!(skipped, "skipped vocabulary words the alphabet cannot encode");
        }

        let words = builder.len();
        let dictionary = builder.build()?;
        let stats = DictionaryStats {
            words,
            skipped,
            states: dictionary.num_states(),
        };
        self.dictionary = Some(Box::new(dictionary));
        Ok(stats)
    }

    /// Whether the vocabulary automaton accepts `word` (followed by a space in word mode).
    pub fn accepts_word(&self, word: &str) -> bool {
        let Some(dictionary) = self.dictionary.as_deref() else {
            return false;
        };
        let Some(mut symbols) = self.char_map.word_symbols(word, self.utf8_mode) else {
            return false;
        };
        if !self.utf8_mode {
            match self.alphabet.space_label() {
                Some(space) => symbols.push(space + 1),
                None => return false,
            }
        }
        dictionary.accepts(&symbols)
    }

    /// Switch between word and UTF-8 scoring. The alphabet is never swapped, so the mode must
    /// agree with it.
    pub fn set_utf8_mode(&mut self, utf8_mode: bool) -> Result<()> {
        if utf8_mode != self.alphabet.is_utf8() {
            return Err(mode_mismatch(utf8_mode));
        }
        self.utf8_mode = utf8_mode;
        Ok(())
    }

    pub fn is_utf8_mode(&self) -> bool {
        self.utf8_mode
    }

    pub fn alpha(&self) -> f64 {
        self.params.alpha
    }

    pub fn beta(&self) -> f64 {
        self.params.beta
    }

    pub fn params(&self) -> ScorerParams {
        self.params
    }

    /// The language model's order, or 0 when none is loaded.
    pub fn max_order(&self) -> usize {
        self.language_model.as_ref().map_or(0, |lm| lm.order())
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn char_map(&self) -> &CharMap {
        &self.char_map
    }

    pub fn language_model(&self) -> Option<&dyn LanguageModel> {
        self.language_model.as_deref()
    }

    pub fn dictionary(&self) -> Option<&dyn VocabularyAutomaton> {
        self.dictionary.as_deref()
    }

    fn lm(&self) -> Result<&dyn LanguageModel> {
        self.language_model.as_deref().ok_or(Error::NoLanguageModel)
    }
}

fn mode_mismatch(utf8_mode: bool) -> Error {
    let reason = if utf8_mode {
        "UTF-8 mode needs the byte alphabet, got a configured alphabet"
    } else {
        "word mode needs a configured alphabet, got the byte alphabet"
    };
    Error::InvalidAlphabet(reason.into())
}
