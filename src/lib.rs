//! `ctc-scorer`: language-model scoring for CTC beam-search speech decoding.
//!
//! This crate provides:
//! - Scorer packages: a binary n-gram model with a vocabulary automaton appended
//! - A path trie that beam-search hypotheses share their prefixes through
//! - Word- and codepoint-level n-gram scoring of those hypotheses
//! - Package generation from ARPA models and vocabulary lists
//!
//! A loaded [`scorer::Scorer`] is immutable while decoding, so one instance can serve any number
//! of concurrent streams.

// High-level API (most consumers should start here).
pub mod opts;
pub mod scorer;

// Label sets and text segmentation.
pub mod alphabet;
pub mod text;

// Language models and the vocabulary automaton.
pub mod dictionary;
pub mod language_model;
pub mod ngram;

// Package format and generation.
pub mod generate;
pub mod package;

// Beam-search state.
pub mod path_trie;

// Acoustic model interface.
pub mod acoustic;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

mod error;

pub use error::{Error, Result};
