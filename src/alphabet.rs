//! Label alphabets and the label → automaton symbol map.
//!
//! Two flavours exist:
//! - a configured alphabet, one label per line of a config file, scored in word mode
//! - the byte alphabet used in UTF-8 mode, where label `i` stands for byte `i + 1`
//!
//! Labels are stored as bytes rather than `String`s because byte-alphabet labels are
//! individual (possibly non-UTF-8) bytes.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Number of labels in the byte alphabet (bytes `1..=255`; NUL is never emitted).
pub const UTF8_ALPHABET_SIZE: usize = 255;

/// Bidirectional mapping between acoustic-model label ids and their text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    labels: Vec<Vec<u8>>,
    label_of: HashMap<Vec<u8>, u32>,
    space_label: Option<u32>,
    utf8: bool,
}

impl Alphabet {
    /// Read an alphabet config file.
    ///
    /// Format: one label per line. Lines starting with `#` are comments, a line holding just
    /// `\#` is a literal `#` label, empty lines are skipped, and a line holding a single space is
    /// the word-boundary label.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = std::fs::read_to_string(path).map_err(|err| {
            Error::InvalidAlphabet(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_config_str(&config)
    }

    /// Parse alphabet config text. See [`Alphabet::from_config_file`] for the format.
    pub fn from_config_str(config: &str) -> Result<Self> {
        let labels = config.lines().filter_map(|line| match line {
            "\\#" => Some("#"),
            l if l.starts_with('#') || l.is_empty() => None,
            l => Some(l),
        });
        Self::from_labels(labels)
    }

    /// Build an alphabet from labels in id order. A `" "` label becomes the space label.
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut alphabet = Self {
            labels: Vec::new(),
            label_of: HashMap::new(),
            space_label: None,
            utf8: false,
        };

        for label in labels {
            let label = label.as_ref();
            let id = alphabet.labels.len() as u32;
            if alphabet.label_of.insert(label.as_bytes().to_vec(), id).is_some() {
                return Err(Error::InvalidAlphabet(format!("duplicate label {label:?}")));
            }
            if label == " " {
                alphabet.space_label = Some(id);
            }
            alphabet.labels.push(label.as_bytes().to_vec());
        }

        if alphabet.labels.is_empty() {
            return Err(Error::InvalidAlphabet("alphabet has no labels".into()));
        }

        Ok(alphabet)
    }

    /// The byte alphabet used in UTF-8 mode.
    pub fn utf8() -> Self {
        let labels: Vec<Vec<u8>> = (1..=u8::MAX).map(|byte| vec![byte]).collect();
        let label_of = labels
            .iter()
            .enumerate()
            .map(|(id, bytes)| (bytes.clone(), id as u32))
            .collect();

        Self {
            labels,
            label_of,
            space_label: Some(u32::from(b' ') - 1),
            utf8: true,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Whether this is the byte alphabet.
    pub fn is_utf8(&self) -> bool {
        self.utf8
    }

    /// The word-boundary label, if the alphabet has one.
    pub fn space_label(&self) -> Option<u32> {
        self.space_label
    }

    /// Raw bytes of a label.
    pub fn label_bytes(&self, label: u32) -> Option<&[u8]> {
        self.labels.get(label as usize).map(Vec::as_slice)
    }

    /// Label id for a unit of text.
    pub fn label_of(&self, unit: &[u8]) -> Option<u32> {
        self.label_of.get(unit).copied()
    }

    /// Iterate `(label, bytes)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> + '_ {
        self.labels
            .iter()
            .enumerate()
            .map(|(id, bytes)| (id as u32, bytes.as_slice()))
    }

    /// Concatenate the bytes of `labels`. Unknown labels are skipped.
    pub fn labels_to_bytes(&self, labels: &[u32]) -> Vec<u8> {
        labels
            .iter()
            .filter_map(|&label| self.label_bytes(label))
            .flatten()
            .copied()
            .collect()
    }

    /// Decode labels into text, replacing invalid UTF-8 (possible mid-codepoint in byte mode).
    pub fn decode(&self, labels: &[u32]) -> String {
        String::from_utf8_lossy(&self.labels_to_bytes(labels)).into_owned()
    }

    /// Encode text into labels, or `None` if some unit has no label.
    pub fn encode(&self, text: &str) -> Option<Vec<u32>> {
        units_of(text, self.utf8)
            .map(|unit| self.label_of(unit))
            .collect()
    }

    pub fn can_encode(&self, text: &str) -> bool {
        self.encode(text).is_some()
    }
}

/// Split a word into the units labels are defined over: bytes in UTF-8 mode, codepoints otherwise.
pub fn units_of(word: &str, utf8: bool) -> Box<dyn Iterator<Item = &[u8]> + '_> {
    if utf8 {
        Box::new(word.as_bytes().chunks(1))
    } else {
        Box::new(
            word.char_indices()
                .map(move |(i, c)| &word.as_bytes()[i..i + c.len_utf8()]),
        )
    }
}

/// Maps label text to automaton input symbols.
///
/// Symbol = label id + 1: the automaton start state is 0 and symbol 0 is epsilon, so label 0
/// must not collide with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharMap {
    symbols: HashMap<Vec<u8>, u32>,
}

impl CharMap {
    pub fn new(alphabet: &Alphabet) -> Self {
        let symbols = alphabet
            .iter()
            .map(|(label, bytes)| (bytes.to_vec(), label + 1))
            .collect();
        Self { symbols }
    }

    pub fn symbol(&self, unit: &[u8]) -> Option<u32> {
        self.symbols.get(unit).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Map every unit of `word` to its symbol, or `None` if any unit is unknown.
    pub fn word_symbols(&self, word: &str, utf8: bool) -> Option<Vec<u32>> {
        units_of(word, utf8).map(|unit| self.symbol(unit)).collect()
    }
}
