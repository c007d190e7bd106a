//! Language-model capability used by the scorer.
//!
//! The scorer only needs conditional log10 probabilities walked word by word from either a
//! begin-of-sentence or an empty context. Any backend that can answer that can be plugged in.

/// Index of a word in a language model's vocabulary.
pub type WordIndex = u32;

/// Score returned for a sequence containing a word the language model does not know.
pub const OOV_SCORE: f64 = -1000.0;

/// `log10(e)`: dividing a log10 score by this converts it to a natural-log score.
pub const NUM_FLT_LOGE: f64 = 0.434_294_481_9;

pub const START_TOKEN: &str = "<s>";
pub const UNK_TOKEN: &str = "<unk>";
pub const END_TOKEN: &str = "</s>";

/// Returns `true` for the pseudo-tokens that never belong in a vocabulary automaton.
pub fn is_reserved_token(word: &str) -> bool {
    matches!(word, START_TOKEN | UNK_TOKEN | END_TOKEN)
}

/// Context carried between successive [`LanguageModel::base_score`] calls.
///
/// Holds at most `order - 1` words, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LmState {
    context: Vec<WordIndex>,
}

impl LmState {
    pub fn new(context: Vec<WordIndex>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &[WordIndex] {
        &self.context
    }

    /// The state after `word`, keeping the newest `max_len` words.
    pub fn advance(&self, word: WordIndex, max_len: usize) -> Self {
        let mut context = Vec::with_capacity(max_len);
        let keep = max_len.saturating_sub(1).min(self.context.len());
        if max_len > 0 {
            context.extend_from_slice(&self.context[self.context.len() - keep..]);
            context.push(word);
        }
        Self { context }
    }
}

/// A backoff n-gram language model as seen by the scorer.
pub trait LanguageModel: Send + Sync + std::fmt::Debug {
    /// Maximum n-gram length.
    fn order(&self) -> usize;

    /// Byte offset at which the model's serialized form ends inside the file it was loaded from.
    fn end_of_model_offset(&self) -> u64;

    /// Vocabulary index for `word`, or `None` if the word is unknown (including `<unk>` itself).
    fn index(&self, word: &str) -> Option<WordIndex>;

    /// Index of `</s>`.
    fn end_sentence(&self) -> WordIndex;

    /// State conditioned on `<s>`.
    fn begin_sentence_state(&self) -> LmState;

    /// State with no conditioning context.
    fn null_context_state(&self) -> LmState;

    /// Log10 probability of `word` following `state`, and the state after it.
    fn base_score(&self, state: &LmState, word: WordIndex) -> (f32, LmState);

    /// Every word in the vocabulary, reserved tokens included.
    fn vocabulary(&self) -> Box<dyn Iterator<Item = &str> + '_>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_keeps_newest_words() {
        let state = LmState::new(vec![1, 2]);
        assert_eq!(state.advance(3, 2).context(), &[2, 3]);
        assert_eq!(state.advance(3, 3).context(), &[1, 2, 3]);
        assert_eq!(state.advance(3, 1).context(), &[3]);
        assert!(state.advance(3, 0).context().is_empty());
    }

    #[test]
    fn recognizes_reserved_tokens() {
        assert!(is_reserved_token("<s>"));
        assert!(is_reserved_token("<unk>"));
        assert!(is_reserved_token("</s>"));
        assert!(!is_reserved_token("cat"));
    }
}
