//! Interface to the acoustic model that feeds the decoder.
//!
//! Inference itself happens elsewhere; this crate only needs the shape of its output and a way
//! to check that the model and the alphabet agree on the label set.

use tracing::error;

use crate::alphabet::Alphabet;
use crate::error::{Error, Result};

/// Recurrent cell state carried from one inference call to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecurrentState {
    pub c: Vec<f32>,
    pub h: Vec<f32>,
}

impl RecurrentState {
    /// All-zero state for the start of a stream.
    pub fn zeroed(size: usize) -> Self {
        Self {
            c: vec![0.0; size],
            h: vec![0.0; size],
        }
    }
}

/// Per-frame class scores for one inference call, flattened as `frames x classes`.
#[derive(Debug, Clone, PartialEq)]
pub struct AcousticOutput {
    pub log_probs: Vec<f32>,
    pub frames: usize,
    pub classes: usize,
    pub state: RecurrentState,
}

impl AcousticOutput {
    /// Class scores of frame `t`.
    pub fn frame(&self, t: usize) -> Option<&[f32]> {
        if t >= self.frames {
            return None;
        }
        let start = t * self.classes;
        self.log_probs.get(start..start + self.classes)
    }

    pub fn frames(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.log_probs.chunks_exact(self.classes.max(1)).take(self.frames)
    }
}

/// A streaming acoustic model.
pub trait AcousticModel {
    /// Output classes per frame: every alphabet label plus the CTC blank.
    fn num_classes(&self) -> usize;

    /// Run one batch of `n_frames` feature frames from `state`.
    fn infer(&self, features: &[f32], n_frames: usize, state: &RecurrentState) -> Result<AcousticOutput>;
}

/// Check that `model` emits one class per alphabet label plus the blank.
pub fn validate_alphabet(model: &dyn AcousticModel, alphabet: &Alphabet) -> Result<()> {
    let classes = model.num_classes();
    if classes == alphabet.len() + 1 {
        return Ok(());
    }

    error!(
        alphabet = alphabet.len(),
        classes,
        "alphabet size does not match the acoustic model; pass the alphabet used for training"
    );
    Err(Error::InvalidAlphabetSize {
        alphabet: alphabet.len(),
        classes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedModel {
        classes: usize,
    }

    impl AcousticModel for FixedModel {
        fn num_classes(&self) -> usize {
            self.classes
        }

        fn infer(&self, _features: &[f32], n_frames: usize, state: &RecurrentState) -> Result<AcousticOutput> {
            let log_probs = (0..n_frames * self.classes).map(|i| -(i as f32)).collect();
            Ok(AcousticOutput {
                log_probs,
                frames: n_frames,
                classes: self.classes,
                state: state.clone(),
            })
        }
    }

    #[test]
    fn accepts_alphabet_plus_blank() {
        let alphabet = Alphabet::from_labels([" ", "a", "b"]).unwrap();
        assert!(validate_alphabet(&FixedModel { classes: 4 }, &alphabet).is_ok());

        let err = validate_alphabet(&FixedModel { classes: 3 }, &alphabet).unwrap_err();
        assert!(matches!(err, Error::InvalidAlphabetSize { alphabet: 3, classes: 3 }));
    }

    #[test]
    fn slices_output_by_frame() {
        let model = FixedModel { classes: 3 };
        let out = model.infer(&[], 2, &RecurrentState::zeroed(4)).unwrap();
        assert_eq!(out.frame(1), Some(&[-3.0, -4.0, -5.0][..]));
        assert_eq!(out.frame(2), None);
        assert_eq!(out.frames().count(), 2);
        assert_eq!(out.state.c.len(), 4);
    }
}
