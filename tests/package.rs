mod common;

use std::fs;

use common::Fixture;
use ctc_scorer::Error;
use ctc_scorer::alphabet::Alphabet;
use ctc_scorer::generate::generate_package;
use ctc_scorer::ngram::NgramModel;
use ctc_scorer::opts::{AlphabetSource, LmSource};
use ctc_scorer::package::{FILE_VERSION, HEADER_LEN, MAGIC};
use ctc_scorer::scorer::Scorer;

#[test]
fn generated_package_loads_with_its_parameters() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let opts = fx.word_opts("words.scorer");
    let summary = generate_package(&opts)?;

    assert_eq!(summary.order, 3);
    assert_eq!(summary.vocab_words, 3);
    assert_eq!(summary.skipped_words, 0);
    assert!(!summary.utf8_mode);

    let scorer = Scorer::init_with_alphabet_config(&opts.package_path, &fx.alphabet)?;
    assert_eq!(scorer.alpha(), 0.75);
    assert_eq!(scorer.beta(), 1.85);
    assert!(!scorer.is_utf8_mode());
    assert_eq!(scorer.max_order(), 3);

    for word in ["cat", "cats", "dog"] {
        assert!(scorer.accepts_word(word), "{word} should be accepted");
    }
    for word in ["ca", "dogs", "the", ""] {
        assert!(!scorer.accepts_word(word), "{word} should be rejected");
    }
    Ok(())
}

#[test]
fn header_sits_right_after_the_model() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let summary = generate_package(&fx.word_opts("words.scorer"))?;
    let bytes = fs::read(&summary.package_path)?;

    let at = summary.lm_bytes as usize;
    assert!(bytes.len() > at + HEADER_LEN);
    assert_eq!(&bytes[at..at + 4], &MAGIC.to_le_bytes());
    assert_eq!(&bytes[at + 4..at + 8], &FILE_VERSION.to_le_bytes());
    assert_eq!(bytes[at + 8], 0);
    assert_eq!(&bytes[at + 9..at + 17], &0.75f64.to_le_bytes());
    Ok(())
}

#[test]
fn language_model_vocabulary_is_the_default() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let mut opts = fx.word_opts("lm-vocab.scorer");
    opts.vocab_path = None;
    let summary = generate_package(&opts)?;

    // Everything but <s>, </s> and <unk>.
    assert_eq!(summary.vocab_words, 5);

    let scorer = Scorer::init_with_alphabet_config(&opts.package_path, &fx.alphabet)?;
    assert!(scorer.accepts_word("the"));
    assert!(scorer.accepts_word("sat"));
    assert!(!scorer.accepts_word("<s>"));
    Ok(())
}

#[test]
fn bytes_mode_package_needs_the_byte_alphabet() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let mut opts = fx.word_opts("bytes.scorer");
    opts.alphabet = AlphabetSource::Bytes;
    let summary = generate_package(&opts)?;
    assert!(summary.utf8_mode);

    // A configured alphabet is never swapped for the byte alphabet.
    let err = Scorer::init_with_alphabet_config(&opts.package_path, &fx.alphabet).unwrap_err();
    assert!(matches!(err, Error::InvalidAlphabet(_)));

    let scorer = Scorer::init(&opts.package_path, Alphabet::utf8())?;
    assert!(scorer.is_utf8_mode());
    assert!(scorer.accepts_word("cats"));
    assert!(!scorer.accepts_word("cat "));
    Ok(())
}

#[test]
fn word_package_needs_a_configured_alphabet() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let summary = generate_package(&fx.word_opts("words.scorer"))?;
    let err = Scorer::init(&summary.package_path, Alphabet::utf8()).unwrap_err();
    assert!(matches!(err, Error::InvalidAlphabet(_)));
    Ok(())
}

#[test]
fn failed_reload_keeps_the_loaded_package() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let good = generate_package(&fx.word_opts("words.scorer"))?;

    let mut opts = fx.word_opts("other.scorer");
    opts.params.alpha = 3.0;
    let bad = generate_package(&opts)?;
    let mut bytes = fs::read(&bad.package_path)?;
    let at = bad.lm_bytes as usize + 4;
    bytes[at..at + 4].copy_from_slice(&(FILE_VERSION - 1).to_le_bytes());
    fs::write(&bad.package_path, &bytes)?;

    let mut scorer = Scorer::init_with_alphabet_config(&good.package_path, &fx.alphabet)?;
    let err = scorer.load_lm(&bad.package_path).unwrap_err();
    assert!(matches!(err, Error::VersionMismatch { found: 5, .. }));
    assert!(err.to_string().contains("Update your scorer file"));

    assert_eq!(scorer.alpha(), 0.75);
    assert!(scorer.accepts_word("cats"));
    Ok(())
}

#[test]
fn binary_model_can_be_repackaged() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let first = generate_package(&fx.word_opts("first.scorer"))?;

    let mut opts = fx.word_opts("second.scorer");
    opts.lm = LmSource::Binary(first.package_path.clone());
    let second = generate_package(&opts)?;

    assert_eq!(first.lm_bytes, second.lm_bytes);
    assert_eq!(fs::read(&first.package_path)?, fs::read(&second.package_path)?);
    Ok(())
}

#[test]
fn wrong_magic_is_a_corrupt_header() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let summary = generate_package(&fx.word_opts("words.scorer"))?;
    let mut bytes = fs::read(&summary.package_path)?;
    let at = summary.lm_bytes as usize;
    bytes[at..at + 4].copy_from_slice(&0x0BAD_F00Di32.to_le_bytes());
    fs::write(&summary.package_path, &bytes)?;

    let err = Scorer::init_with_alphabet_config(&summary.package_path, &fx.alphabet).unwrap_err();
    assert!(matches!(err, Error::CorruptPackageHeader { magic: 0x0BAD_F00D }));
    assert!(err.to_string().contains("Try updating your scorer file"));
    Ok(())
}

#[test]
fn newer_version_is_a_mismatch() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let summary = generate_package(&fx.word_opts("words.scorer"))?;
    let mut bytes = fs::read(&summary.package_path)?;
    let at = summary.lm_bytes as usize + 4;
    bytes[at..at + 4].copy_from_slice(&(FILE_VERSION + 1).to_le_bytes());
    fs::write(&summary.package_path, &bytes)?;

    let err = Scorer::init_with_alphabet_config(&summary.package_path, &fx.alphabet).unwrap_err();
    assert!(matches!(
        err,
        Error::VersionMismatch {
            found: 7,
            expected: 6
        }
    ));
    Ok(())
}

#[test]
fn bare_model_is_missing_its_package() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let model = NgramModel::from_arpa_file(&fx.arpa)?;
    let path = fx.path("bare.lm");
    let mut file = fs::File::create(&path)?;
    let written = model.write_binary(&mut file)?;
    drop(file);

    let mut scorer = Scorer::new(Alphabet::from_config_file(&fx.alphabet)?);
    let err = scorer.load_lm(&path).unwrap_err();
    assert!(matches!(
        err,
        Error::MissingPackage { size, offset, .. } if size == written && offset == written
    ));

    // The model stays usable for scoring.
    assert_eq!(scorer.max_order(), 3);
    assert!(scorer.dictionary().is_none());
    assert!(scorer.get_log_cond_prob(&["the"], true, false)? < 0.0);
    Ok(())
}

#[test]
fn bare_model_drops_a_previous_automaton() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let summary = generate_package(&fx.word_opts("words.scorer"))?;
    let bare = fx.path("bare.lm");
    NgramModel::from_arpa_file(&fx.arpa)?.write_binary(fs::File::create(&bare)?)?;

    let mut scorer = Scorer::init_with_alphabet_config(&summary.package_path, &fx.alphabet)?;
    assert!(scorer.dictionary().is_some());
    assert!(matches!(scorer.load_lm(&bare), Err(Error::MissingPackage { .. })));
    assert!(scorer.dictionary().is_none());
    assert!(!scorer.accepts_word("cat"));
    Ok(())
}

#[test]
fn unreadable_and_foreign_files_are_rejected() -> anyhow::Result<()> {
    let fx = Fixture::new()?;

    let missing = Scorer::init(fx.path("nope.scorer"), Alphabet::utf8()).unwrap_err();
    assert!(matches!(missing, Error::FileUnreadable { .. }));

    let empty = fx.path("empty.scorer");
    fs::write(&empty, b"")?;
    assert!(matches!(
        Scorer::init(&empty, Alphabet::utf8()),
        Err(Error::InvalidFormat { .. })
    ));

    assert!(matches!(
        Scorer::init(&fx.arpa, Alphabet::utf8()),
        Err(Error::InvalidFormat { .. })
    ));
    Ok(())
}

#[test]
fn saved_dictionary_reloads_from_bytes() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let mut scorer = Scorer::new(Alphabet::from_config_file(&fx.alphabet)?);
    scorer.set_language_model(Box::new(NgramModel::from_arpa_file(&fx.arpa)?));
    scorer.reset_params(0.5, 2.5);
    scorer.fill_dictionary(["dog", "dogs"])?;

    let path = fx.path("trie.bin");
    scorer.save_dictionary(&path, false)?;
    let bytes = fs::read(&path)?;

    let mut other = Scorer::new(Alphabet::from_config_file(&fx.alphabet)?);
    other.load_trie(&bytes, &path)?;
    assert_eq!(other.alpha(), 0.5);
    assert_eq!(other.beta(), 2.5);
    assert!(other.accepts_word("dogs"));
    assert!(!other.accepts_word("cat"));
    Ok(())
}

#[test]
fn saving_without_a_dictionary_fails() -> anyhow::Result<()> {
    let fx = Fixture::new()?;
    let scorer = Scorer::new(Alphabet::utf8());
    assert!(matches!(
        scorer.save_dictionary(fx.path("none.bin"), false),
        Err(Error::NoDictionary)
    ));
    Ok(())
}
