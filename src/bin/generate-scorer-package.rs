// Builds a scorer package from a language model, a vocabulary and an alphabet, then prints a
// JSON summary of what was written.

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use std::io::{self, Write};
use std::path::PathBuf;

use ctc_scorer::generate::generate_package;
use ctc_scorer::logging;
use ctc_scorer::opts::{AlphabetSource, LmSource, PackageOpts, ScorerParams};

#[derive(Parser, Debug)]
#[command(name = "generate-scorer-package")]
#[command(about = "Package an n-gram language model and vocabulary into a scorer file", long_about = None)]
#[command(group(ArgGroup::new("model").required(true).args(["arpa", "lm"])))]
#[command(group(ArgGroup::new("labels").required(true).args(["alphabet", "force_bytes_output_mode"])))]
struct Params {
    /// ARPA language model to convert.
    #[arg(long)]
    arpa: Option<PathBuf>,

    /// Existing binary language model (or scorer package) to reuse.
    #[arg(long)]
    lm: Option<PathBuf>,

    /// Whitespace-separated vocabulary. Defaults to the language model's own vocabulary.
    #[arg(long)]
    vocab: Option<PathBuf>,

    /// Alphabet config file; the package scores whole words.
    #[arg(long)]
    alphabet: Option<PathBuf>,

    /// Score UTF-8 codepoints over the byte alphabet instead of words.
    #[arg(long, default_value_t = false)]
    force_bytes_output_mode: bool,

    /// Output path. Overwritten if it exists.
    #[arg(long)]
    package: PathBuf,

    /// Language-model weight stored in the package.
    #[arg(long, default_value_t = ScorerParams::default().alpha)]
    default_alpha: f64,

    /// Word-insertion weight stored in the package.
    #[arg(long, default_value_t = ScorerParams::default().beta)]
    default_beta: f64,
}

impl Params {
    fn into_opts(self) -> Result<PackageOpts> {
        let lm = match (self.arpa, self.lm) {
            (Some(path), None) => LmSource::Arpa(path),
            (None, Some(path)) => LmSource::Binary(path),
            _ => anyhow::bail!("pass exactly one of --arpa or --lm"),
        };
        let alphabet = match (self.alphabet, self.force_bytes_output_mode) {
            (Some(path), false) => AlphabetSource::Config(path),
            (None, true) => AlphabetSource::Bytes,
            _ => anyhow::bail!("pass exactly one of --alphabet or --force-bytes-output-mode"),
        };

        Ok(PackageOpts {
            lm,
            vocab_path: self.vocab,
            alphabet,
            package_path: self.package,
            params: ScorerParams {
                alpha: self.default_alpha,
                beta: self.default_beta,
            },
        })
    }
}

fn main() -> Result<()> {
    logging::init();
    let opts = Params::parse().into_opts()?;

    let summary = generate_package(&opts)
        .with_context(|| format!("failed to generate {}", opts.package_path.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &summary)?;
    writeln!(out)?;
    Ok(())
}
