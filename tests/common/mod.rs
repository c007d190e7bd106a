#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use ctc_scorer::opts::{AlphabetSource, LmSource, PackageOpts, ScorerParams};

/// Trigram model over a toy vocabulary.
pub const TRIGRAM_ARPA: &str = "\
\\data\\
ngram 1=8
ngram 2=5
ngram 3=2

\\1-grams:
-1.0\t<s>\t-0.5
-1.2\t</s>
-2.0\t<unk>
-0.8\tthe\t-0.3
-1.5\tcat\t-0.2
-1.6\tcats\t-0.2
-1.4\tdog\t-0.2
-1.7\tsat\t-0.1

\\2-grams:
-0.2\t<s> the\t-0.1
-0.4\tthe cat\t-0.1
-0.9\tthe dog
-0.6\tcat sat
-0.3\tsat </s>

\\3-grams:
-0.1\t<s> the cat
-0.2\tthe cat sat

\\end\\
";

/// Space first, then every letter the toy vocabulary uses.
pub const ALPHABET: &str = "\
# word-mode alphabet
 
a
c
d
e
g
h
o
s
t
";

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub arpa: PathBuf,
    pub alphabet: PathBuf,
    pub vocab: PathBuf,
}

impl Fixture {
    pub fn new() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let arpa = write(dir.path(), "lm.arpa", TRIGRAM_ARPA)?;
        let alphabet = write(dir.path(), "alphabet.txt", ALPHABET)?;
        let vocab = write(dir.path(), "vocab.txt", "cat cats\ndog\n")?;
        Ok(Self {
            dir,
            arpa,
            alphabet,
            vocab,
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Word-mode package options writing to `name`.
    pub fn word_opts(&self, name: &str) -> PackageOpts {
        PackageOpts {
            lm: LmSource::Arpa(self.arpa.clone()),
            vocab_path: Some(self.vocab.clone()),
            alphabet: AlphabetSource::Config(self.alphabet.clone()),
            package_path: self.path(name),
            params: ScorerParams {
                alpha: 0.75,
                beta: 1.85,
            },
        }
    }
}

fn write(dir: &Path, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents)?;
    Ok(path)
}
