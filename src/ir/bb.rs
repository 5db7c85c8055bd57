use slotmap::new_key_type;

use crate::ice;

use super::instr::{Instr, Term};

new_key_type! {
    pub struct Block;
}

/// An ordered instruction sequence ending in exactly one terminator.
///
/// Owned exclusively by one procedure; jumps, branches and phi choices
/// reference blocks by key, never by copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
    pub label: String,
    pub instrs: Vec<Instr>,
    term: Option<Term>,
}

impl BlockData {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instrs: vec![],
            term: None,
        }
    }

    /// Appends an instruction. Nothing may follow a terminator in the same
    /// block, so pushing into a terminated block is a compiler bug.
    pub fn push(&mut self, instr: Instr) {
        if self.term.is_some() {
            ice!("appending an instruction to the terminated block {}", self.label);
        }

        self.instrs.push(instr);
    }

    pub fn terminate(&mut self, term: Term) {
        if self.term.is_some() {
            ice!("block {} is terminated twice", self.label);
        }

        self.term = Some(term);
    }

    pub fn term(&self) -> Option<&Term> {
        self.term.as_ref()
    }

    pub fn term_mut(&mut self) -> Option<&mut Term> {
        self.term.as_mut()
    }

    pub fn unwrap_term(&self) -> &Term {
        match &self.term {
            Some(term) => term,
            None => ice!("block {} has no terminator", self.label),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.term.is_some()
    }
}
