//! Backoff n-gram language model.
//!
//! Models are estimated elsewhere and arrive as ARPA text. [`NgramModel::from_arpa`] parses
//! that text and [`NgramModel::write_binary`] stores it in the compact binary form a scorer
//! package starts with:
//!
//! | offset | field          | type                         |
//! |--------|----------------|------------------------------|
//! | 0      | signature      | 8 bytes, `b"ctcngram"`       |
//! | 8      | blob version   | `u32` LE                     |
//! | 12     | payload length | `u64` LE                     |
//! | 20     | payload        | `bincode`-encoded tables     |
//!
//! The model ends at `20 + payload length`; anything after that belongs to the caller.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::language_model::{END_TOKEN, LanguageModel, LmState, START_TOKEN, UNK_TOKEN, WordIndex};

/// Leading bytes of every binary n-gram model.
pub const SIGNATURE: &[u8; 8] = b"ctcngram";

/// Version of the binary layout written by [`NgramModel::write_binary`].
pub const BLOB_VERSION: u32 = 1;

const HEADER_LEN: u64 = 8 + 4 + 8;

/// Log10 probability given to `<unk>` when the ARPA file does not list it.
const DEFAULT_UNK_LOG_PROB: f32 = -100.0;

const UNK_INDEX: WordIndex = 0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct NgramWeights {
    log_prob: f32,
    backoff: f32,
}

#[derive(Serialize, Deserialize)]
struct NgramTables {
    order: u32,
    vocab: Vec<String>,
    entries: Vec<(Vec<WordIndex>, NgramWeights)>,
}

/// An ARPA-style backoff language model held in hash tables.
#[derive(Debug, Clone)]
pub struct NgramModel {
    order: usize,
    vocab: Vec<String>,
    index: HashMap<String, WordIndex>,
    ngrams: HashMap<Vec<WordIndex>, NgramWeights>,
    begin_sentence: WordIndex,
    end_sentence: WordIndex,
    end_offset: u64,
}

/// Whether `bytes` start with the binary model signature.
pub fn recognize_binary(bytes: &[u8]) -> bool {
    bytes.starts_with(SIGNATURE)
}

impl NgramModel {
    /// Parse an ARPA file from disk.
    pub fn from_arpa_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::FileUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_arpa(BufReader::new(file))
    }

    /// Parse ARPA text.
    pub fn from_arpa<R: BufRead>(reader: R) -> Result<Self> {
        let mut builder = ArpaBuilder::default();
        for (i, line) in reader.lines().enumerate() {
            builder.push_line(i + 1, line?.trim())?;
        }
        builder.finish()
    }

    /// Decode a binary model from the start of `bytes`. `source` only labels errors.
    pub fn from_bytes(bytes: &[u8], source: &Path) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidFormat {
            path: source.to_path_buf(),
            reason,
        };

        if !recognize_binary(bytes) {
            return Err(invalid("missing n-gram model signature".into()));
        }

        let mut header = &bytes[SIGNATURE.len()..];
        let version = header
            .read_u32::<LittleEndian>()
            .map_err(|err| invalid(format!("truncated header: {err}")))?;
        if version != BLOB_VERSION {
            return Err(invalid(format!(
                "unsupported n-gram blob version {version} (expected {BLOB_VERSION})"
            )));
        }
        let payload_len = header
            .read_u64::<LittleEndian>()
            .map_err(|err| invalid(format!("truncated header: {err}")))?;

        let end_offset = HEADER_LEN
            .checked_add(payload_len)
            .filter(|&end| end <= bytes.len() as u64)
            .ok_or_else(|| invalid(format!("payload of {payload_len} bytes exceeds file")))?;

        let tables: NgramTables = bincode::deserialize(&bytes[HEADER_LEN as usize..end_offset as usize])
            .map_err(|err| invalid(format!("corrupt n-gram tables: {err}")))?;

        let mut model = Self::from_tables(tables).map_err(|err| invalid(err.to_string()))?;
        model.end_offset = end_offset;
        Ok(model)
    }

    /// Read a binary model file through a memory map. Only the model region is touched, so a
    /// trailing vocabulary package costs nothing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let unreadable = |source| Error::FileUnreadable {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(unreadable)?;
        // SAFETY: the map is read-only and dropped before this call returns; model files are
        // not expected to be modified while they are being loaded.
        let mmap = unsafe { Mmap::map(&file) }.map_err(unreadable)?;
        Self::from_bytes(&mmap, path)
    }

    /// Write the binary form and return the number of bytes written (the model's end offset).
    pub fn write_binary<W: Write>(&self, mut w: W) -> Result<u64> {
        let mut entries: Vec<(Vec<WordIndex>, NgramWeights)> = self
            .ngrams
            .iter()
            .map(|(key, weights)| (key.clone(), *weights))
            .collect();
        // Hash iteration order is random; sort so equal models serialize identically.
        entries.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));

        let tables = NgramTables {
            order: self.order as u32,
            vocab: self.vocab.clone(),
            entries,
        };
        let payload = bincode::serialize(&tables).map_err(|err| Error::Other(err))?;

        w.write_all(SIGNATURE)?;
        w.write_u32::<LittleEndian>(BLOB_VERSION)?;
        w.write_u64::<LittleEndian>(payload.len() as u64)?;
        w.write_all(&payload)?;
        Ok(HEADER_LEN + payload.len() as u64)
    }

    /// Number of stored n-grams of length `n`.
    pub fn ngram_count(&self, n: usize) -> usize {
        self.ngrams.keys().filter(|key| key.len() == n).count()
    }

    fn from_tables(tables: NgramTables) -> Result<Self> {
        let order = tables.order as usize;
        if order == 0 {
            return Err(Error::msg("n-gram order must be at least 1"));
        }
        if tables.vocab.first().map(String::as_str) != Some(UNK_TOKEN) {
            return Err(Error::msg("vocabulary must start with <unk>"));
        }

        let index: HashMap<String, WordIndex> = tables
            .vocab
            .iter()
            .enumerate()
            .map(|(i, word)| (word.clone(), i as WordIndex))
            .collect();
        let lookup = |token: &str| {
            index
                .get(token)
                .copied()
                .ok_or_else(|| Error::msg(format!("vocabulary is missing {token}")))
        };
        let begin_sentence = lookup(START_TOKEN)?;
        let end_sentence = lookup(END_TOKEN)?;

        let vocab_len = tables.vocab.len();
        let mut ngrams = HashMap::with_capacity(tables.entries.len());
        for (key, weights) in tables.entries {
            if key.is_empty() || key.len() > order || key.iter().any(|&w| w as usize >= vocab_len) {
                return Err(Error::msg(format!("invalid n-gram key {key:?}")));
            }
            ngrams.insert(key, weights);
        }

        Ok(Self {
            order,
            vocab: tables.vocab,
            index,
            ngrams,
            begin_sentence,
            end_sentence,
            end_offset: 0,
        })
    }
}

impl LanguageModel for NgramModel {
    fn order(&self) -> usize {
        self.order
    }

    fn end_of_model_offset(&self) -> u64 {
        self.end_offset
    }

    fn index(&self, word: &str) -> Option<WordIndex> {
        self.index.get(word).copied().filter(|&i| i != UNK_INDEX)
    }

    fn end_sentence(&self) -> WordIndex {
        self.end_sentence
    }

    fn begin_sentence_state(&self) -> LmState {
        LmState::new(vec![self.begin_sentence])
    }

    fn null_context_state(&self) -> LmState {
        LmState::default()
    }

    fn base_score(&self, state: &LmState, word: WordIndex) -> (f32, LmState) {
        let context = state.context();
        let mut key = Vec::with_capacity(context.len() + 1);
        let mut backoff = 0.0;
        let mut log_prob = None;

        // Longest history first; every miss charges that history's backoff weight.
        for start in 0..=context.len() {
            let history = &context[start..];
            key.clear();
            key.extend_from_slice(history);
            key.push(word);
            if let Some(weights) = self.ngrams.get(&key) {
                log_prob = Some(weights.log_prob + backoff);
                break;
            }
            if let Some(weights) = self.ngrams.get(history) {
                backoff += weights.backoff;
            }
        }

        let log_prob = log_prob.unwrap_or_else(|| {
            let unk = self.ngrams.get(&[UNK_INDEX][..]).map_or(DEFAULT_UNK_LOG_PROB, |w| w.log_prob);
            unk + backoff
        });

        (log_prob, state.advance(word, self.order - 1))
    }

    fn vocabulary(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.vocab.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Data,
    Ngrams(usize),
    End,
}

struct ArpaBuilder {
    section: Section,
    declared: Vec<(usize, usize)>,
    vocab: Vec<String>,
    index: HashMap<String, WordIndex>,
    ngrams: HashMap<Vec<WordIndex>, NgramWeights>,
    seen: HashMap<usize, usize>,
}

impl Default for ArpaBuilder {
    fn default() -> Self {
        Self {
            section: Section::Preamble,
            declared: Vec::new(),
            vocab: vec![UNK_TOKEN.to_owned()],
            index: HashMap::from([(UNK_TOKEN.to_owned(), UNK_INDEX)]),
            ngrams: HashMap::new(),
            seen: HashMap::new(),
        }
    }
}

impl ArpaBuilder {
    fn push_line(&mut self, line_no: usize, line: &str) -> Result<()> {
        let bad = |message: String| Error::InvalidArpa {
            line: line_no,
            message,
        };

        if line.is_empty() || self.section == Section::End {
            return Ok(());
        }
        if line == "\\data\\" {
            self.section = Section::Data;
            return Ok(());
        }
        if line == "\\end\\" {
            self.section = Section::End;
            return Ok(());
        }
        if let Some(n) = line.strip_prefix('\\').and_then(|l| l.strip_suffix("-grams:")) {
            let n: usize = n.parse().map_err(|_| bad(format!("bad section header {line:?}")))?;
            if !self.declared.iter().any(|&(order, _)| order == n) {
                return Err(bad(format!("section for undeclared order {n}")));
            }
            self.section = Section::Ngrams(n);
            return Ok(());
        }

        match self.section {
            Section::Preamble | Section::End => Ok(()),
            Section::Data => {
                let (n, count): (usize, usize) = line
                    .strip_prefix("ngram ")
                    .and_then(|l| l.split_once('='))
                    .and_then(|(n, count)| Some((n.trim().parse().ok()?, count.trim().parse().ok()?)))
                    .ok_or_else(|| bad(format!("expected `ngram N=count`, got {line:?}")))?;
                if n == 0 {
                    return Err(bad("n-gram order 0".into()));
                }
                self.declared.push((n, count));
                Ok(())
            }
            Section::Ngrams(n) => {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() != n + 1 && fields.len() != n + 2 {
                    return Err(bad(format!("expected {n} words, got {}", fields.len().saturating_sub(1))));
                }
                let log_prob: f32 = fields[0]
                    .parse()
                    .map_err(|_| bad(format!("bad probability {:?}", fields[0])))?;
                let backoff: f32 = match fields.get(n + 1) {
                    Some(b) => b.parse().map_err(|_| bad(format!("bad backoff {b:?}")))?,
                    None => 0.0,
                };
                let key: Vec<WordIndex> = fields[1..=n].iter().map(|w| self.intern(w)).collect();
                self.ngrams.insert(key, NgramWeights { log_prob, backoff });
                *self.seen.entry(n).or_default() += 1;
                Ok(())
            }
        }
    }

    fn intern(&mut self, word: &str) -> WordIndex {
        if let Some(&i) = self.index.get(word) {
            return i;
        }
        let i = self.vocab.len() as WordIndex;
        self.vocab.push(word.to_owned());
        self.index.insert(word.to_owned(), i);
        i
    }

    fn finish(mut self) -> Result<NgramModel> {
        let bad = |message: String| Error::InvalidArpa { line: 0, message };

        if self.section != Section::End {
            return Err(bad("missing \\end\\ marker".into()));
        }
        for &(n, count) in &self.declared {
            let seen = self.seen.get(&n).copied().unwrap_or(0);
            if seen != count {
                return Err(bad(format!("declared {count} {n}-grams but found {seen}")));
            }
        }
        let order = self.declared.iter().map(|&(n, _)| n).max().unwrap_or(0);

        // KenLM convention: a model without an explicit <unk> still scores it.
        self.ngrams.entry(vec![UNK_INDEX]).or_insert(NgramWeights {
            log_prob: DEFAULT_UNK_LOG_PROB,
            backoff: 0.0,
        });

        let tables = NgramTables {
            order: order as u32,
            vocab: self.vocab,
            entries: self.ngrams.into_iter().collect(),
        };
        NgramModel::from_tables(tables).map_err(|err| bad(err.to_string()))
    }
}

/// Label for errors raised while decoding in-memory buffers.
#[cfg(test)]
pub(crate) fn in_memory_path() -> std::path::PathBuf {
    std::path::PathBuf::from("<memory>")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Small bigram model over a toy vocabulary.
    pub(crate) const BIGRAM_ARPA: &str = "\
\\data\\
ngram 1=6
ngram 2=4

\\1-grams:
-1.0\t<s>\t-0.5
-1.2\t</s>
-0.8\tthe\t-0.3
-1.5\tcat\t-0.2
-1.7\tsat\t-0.1
-2.0\t<unk>

\\2-grams:
-0.2\t<s> the
-0.4\tthe cat
-0.6\tcat sat
-0.3\tsat </s>

\\end\\
";

    pub(crate) fn bigram_model() -> NgramModel {
        NgramModel::from_arpa(BIGRAM_ARPA.as_bytes()).unwrap()
    }

    #[test]
    fn parses_declared_counts() {
        let model = bigram_model();
        assert_eq!(model.order(), 2);
        assert_eq!(model.ngram_count(1), 6);
        assert_eq!(model.ngram_count(2), 4);
        assert_eq!(model.index("<unk>"), None);
        assert_eq!(model.index("dog"), None);
        assert!(model.index("cat").is_some());
    }

    #[test]
    fn scores_seen_bigram_directly() {
        let model = bigram_model();
        let the = model.index("the").unwrap();
        let (score, state) = model.base_score(&model.begin_sentence_state(), the);
        assert!((score - -0.2).abs() < 1e-6);
        assert_eq!(state.context(), &[the]);
    }

    #[test]
    fn backs_off_to_unigram() {
        let model = bigram_model();
        let the = model.index("the").unwrap();
        let sat = model.index("sat").unwrap();
        // "the sat" is unseen: backoff(the) + p(sat).
        let (score, _) = model.base_score(&LmState::new(vec![the]), sat);
        assert!((score - (-0.3 + -1.7)).abs() < 1e-6);
    }

    #[test]
    fn binary_round_trip_reports_end_offset() {
        let model = bigram_model();
        let mut bytes = Vec::new();
        let written = model.write_binary(&mut bytes).unwrap();
        assert_eq!(written, bytes.len() as u64);

        bytes.extend_from_slice(b"trailing package");
        let loaded = NgramModel::from_bytes(&bytes, &in_memory_path()).unwrap();
        assert_eq!(loaded.end_of_model_offset(), written);
        assert_eq!(loaded.order(), 2);
        assert_eq!(loaded.ngram_count(2), 4);
    }

    #[test]
    fn load_reads_only_the_model_region() {
        let model = bigram_model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("with-package.scorer");

        let mut bytes = Vec::new();
        let written = model.write_binary(&mut bytes).unwrap();
        bytes.extend_from_slice(b"TRIE and an automaton after it");
        std::fs::write(&path, &bytes).unwrap();

        let loaded = NgramModel::load(&path).unwrap();
        assert_eq!(loaded.end_of_model_offset(), written);
        assert_eq!(loaded.ngram_count(1), model.ngram_count(1));

        let missing = NgramModel::load(dir.path().join("missing.lm")).unwrap_err();
        assert!(matches!(missing, Error::FileUnreadable { .. }));
    }

    #[test]
    fn rejects_count_mismatch() {
        let arpa = "\\data\\\nngram 1=2\n\n\\1-grams:\n-1.0\t<s>\n\\end\\\n";
        assert!(matches!(
            NgramModel::from_arpa(arpa.as_bytes()),
            Err(Error::InvalidArpa { .. })
        ));
    }

    #[test]
    fn rejects_foreign_bytes() {
        let err = NgramModel::from_bytes(b"not a model", &in_memory_path()).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat { .. }));
    }
}
