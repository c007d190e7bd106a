//! Vocabulary automaton: a deterministic acceptor over [`crate::alphabet::CharMap`] symbols.
//!
//! Words are inserted as linear chains into a mutable `VectorFst`, then the automaton is
//! epsilon-removed, determinized and minimized before being frozen into a `ConstFst`. The
//! decoder walks it one symbol per step and relies on there being at most one transition per
//! symbol out of every state. Transitions are sorted by input label so a step is a binary
//! search.

use std::fmt;
use std::io::Write;

use rustfst::algorithms::determinize::determinize;
use rustfst::algorithms::minimize;
use rustfst::algorithms::rm_epsilon::rm_epsilon;
use rustfst::algorithms::tr_compares::ILabelCompare;
use rustfst::algorithms::tr_sort;
use rustfst::prelude::*;

use crate::error::{Error, Result};

/// State id within a vocabulary automaton.
pub type AutomatonState = u32;

/// Read-only symbol-sequence acceptor used to constrain beam extensions.
pub trait VocabularyAutomaton: Send + Sync + fmt::Debug {
    fn start(&self) -> Option<AutomatonState>;

    /// The state reached from `state` on `symbol`, if that transition exists.
    fn next(&self, state: AutomatonState, symbol: u32) -> Option<AutomatonState>;

    fn is_final(&self, state: AutomatonState) -> bool;

    fn num_states(&self) -> usize;

    /// Serialize in the form [`crate::scorer::Scorer::load_trie`] reads back.
    fn store(&self, w: &mut dyn Write) -> Result<()>;

    fn accepts(&self, symbols: &[u32]) -> bool {
        let Some(mut state) = self.start() else {
            return false;
        };
        for &symbol in symbols {
            match self.next(state, symbol) {
                Some(next) => state = next,
                None => return false,
            }
        }
        self.is_final(state)
    }
}

/// Accumulates words into a mutable automaton.
pub struct DictionaryBuilder {
    fst: VectorFst<TropicalWeight>,
    start: StateId,
    words: usize,
}

impl DictionaryBuilder {
    pub fn new() -> Self {
        let mut fst = VectorFst::<TropicalWeight>::new();
        let start = fst.add_state();
        // A freshly added state always exists, so this cannot fail.
        let _ = fst.set_start(start);
        Self {
            fst,
            start,
            words: 0,
        }
    }

    /// Insert one word as a chain of symbols from the start state to a new final state.
    pub fn add_word(&mut self, symbols: &[u32]) -> Result<()> {
        let mut src = self.start;
        for &symbol in symbols {
            let dst = self.fst.add_state();
            self.fst.add_tr(
                src,
                Tr::new(symbol as Label, symbol as Label, TropicalWeight::one(), dst),
            )?;
            src = dst;
        }
        self.fst.set_final(src, TropicalWeight::one())?;
        self.words += 1;
        Ok(())
    }

    /// Number of words inserted so far.
    pub fn len(&self) -> usize {
        self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words == 0
    }

    /// Remove epsilons, determinize, minimize and freeze.
    pub fn build(mut self) -> Result<FstDictionary> {
        let chain_states = self.fst.num_states();

        rm_epsilon(&mut self.fst)?;
        let mut det: VectorFst<TropicalWeight> = determinize(&self.fst)?;
        minimize(&mut det)?;
        tr_sort(&mut det, ILabelCompare {});

        tracing::debug!(
            words = self.words,
            chain_states,
            states = det.num_states(),
            "built vocabulary automaton"
        );

        Ok(FstDictionary::new(ConstFst::from(det)))
    }
}

impl Default for DictionaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable vocabulary automaton backed by a `rustfst` `ConstFst`.
pub struct FstDictionary {
    fst: ConstFst<TropicalWeight>,
    ilabel_sorted: bool,
}

impl FstDictionary {
    fn new(fst: ConstFst<TropicalWeight>) -> Self {
        let ilabel_sorted = (0..fst.num_states()).all(|state| {
            fst.get_trs(state as StateId)
                .map(|trs| trs.trs().windows(2).all(|pair| pair[0].ilabel <= pair[1].ilabel))
                .unwrap_or(false)
        });
        Self { fst, ilabel_sorted }
    }

    /// Decode an automaton previously written by [`VocabularyAutomaton::store`].
    ///
    /// Automata written by other tools may not be label-sorted; those fall back to a linear
    /// scan per step.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let fst = ConstFst::<TropicalWeight>::load(bytes)
            .map_err(|err| Error::InvalidDictionary(format!("{err:#}")))?;
        Ok(Self::new(fst))
    }

    /// Whether every state's transitions are sorted by input label.
    pub fn is_ilabel_sorted(&self) -> bool {
        self.ilabel_sorted
    }

    pub fn fst(&self) -> &ConstFst<TropicalWeight> {
        &self.fst
    }
}

impl fmt::Debug for FstDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FstDictionary")
            .field("states", &self.fst.num_states())
            .finish()
    }
}

impl VocabularyAutomaton for FstDictionary {
    fn start(&self) -> Option<AutomatonState> {
        self.fst.start().map(|s| s as AutomatonState)
    }

    fn next(&self, state: AutomatonState, symbol: u32) -> Option<AutomatonState> {
        let trs = self.fst.get_trs(state as StateId).ok()?;
        let trs = trs.trs();
        let label = symbol as Label;
        let tr = if self.ilabel_sorted {
            trs.binary_search_by_key(&label, |tr| tr.ilabel)
                .ok()
                .map(|i| &trs[i])
        } else {
            trs.iter().find(|tr| tr.ilabel == label)
        };
        tr.map(|tr| tr.nextstate as AutomatonState)
    }

    fn is_final(&self, state: AutomatonState) -> bool {
        self.fst.is_final(state as StateId).unwrap_or(false)
    }

    fn num_states(&self) -> usize {
        self.fst.num_states()
    }

    fn store(&self, w: &mut dyn Write) -> Result<()> {
        self.fst.store(w)?;
        Ok(())
    }
}
