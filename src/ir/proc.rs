use std::collections::HashSet;

use slotmap::{SecondaryMap, SlotMap};

use crate::ice;

use super::bb::{Block, BlockData};
use super::ty::Ty;
use super::value::{Var, VarData};

/// A handle to a procedure in the program's ordered procedure list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcId(pub(crate) usize);

/// A procedure: name, return type, parameters and an ordered block list.
///
/// Blocks and variables live in per-procedure arenas and never move to
/// another procedure. A block can exist in the arena without being
/// *scheduled* (listed in `block_order`); lowering uses such blocks to
/// absorb unreachable instructions after a `return`.
#[derive(Debug)]
pub struct Proc {
    pub name: String,
    pub ret_ty: Ty,
    params: Vec<Var>,
    pub vars: SlotMap<Var, VarData>,
    pub blocks: SlotMap<Block, BlockData>,
    block_order: Vec<Block>,
}

impl Proc {
    pub fn new(name: impl Into<String>, ret_ty: Ty) -> Self {
        Self {
            name: name.into(),
            ret_ty,
            params: vec![],
            vars: SlotMap::with_key(),
            blocks: SlotMap::with_key(),
            block_order: vec![],
        }
    }

    /// Appends a parameter. Parameter 0 of a method procedure is always the
    /// implicit receiver.
    pub fn add_param(&mut self, name: impl Into<String>, ty: Ty) -> Var {
        let var = self.fresh_var(name, ty);
        self.params.push(var);

        var
    }

    pub fn params(&self) -> &[Var] {
        &self.params
    }

    pub fn fresh_var(&mut self, name: impl Into<String>, ty: Ty) -> Var {
        self.vars.insert(VarData {
            name: name.into(),
            ty,
        })
    }

    pub fn var_ty(&self, var: Var) -> &Ty {
        match self.vars.get(var) {
            Some(data) => &data.ty,
            None => ice!("unknown variable in procedure {}", self.name),
        }
    }

    pub fn var_name(&self, var: Var) -> &str {
        match self.vars.get(var) {
            Some(data) => &data.name,
            None => ice!("unknown variable in procedure {}", self.name),
        }
    }

    /// Creates a block without scheduling it.
    pub fn new_block(&mut self, label: impl Into<String>) -> Block {
        self.blocks.insert(BlockData::new(label))
    }

    /// Schedules a block at the end of the procedure's block order.
    pub fn append_block(&mut self, bb: Block) {
        debug_assert!(!self.block_order.contains(&bb));
        self.block_order.push(bb);
    }

    pub fn block_order(&self) -> &[Block] {
        &self.block_order
    }

    pub fn entry(&self) -> Block {
        match self.block_order.first() {
            Some(&bb) => bb,
            None => ice!("procedure {} has no entry block", self.name),
        }
    }

    /// Atomically replaces the block order with `order` and drops every
    /// block not listed in it (the SSA pass builds a parallel body and
    /// swaps it in, discarding the old one). The variable arena is shared
    /// between the old and the new body.
    pub fn replace_body(&mut self, order: Vec<Block>) {
        let keep: HashSet<Block> = order.iter().copied().collect();
        let stale: Vec<Block> = self.blocks.keys().filter(|bb| !keep.contains(bb)).collect();

        for bb in stale {
            self.blocks.remove(bb);
        }

        self.block_order = order;
    }

    /// Predecessors of every scheduled block, in block order.
    pub fn predecessors(&self) -> SecondaryMap<Block, Vec<Block>> {
        predecessors(&self.block_order, &self.blocks)
    }
}

/// Builds the predecessor map of a block list. Unterminated blocks are
/// treated as having no successors; the external verifier rejects them.
pub fn predecessors(
    order: &[Block],
    blocks: &SlotMap<Block, BlockData>,
) -> SecondaryMap<Block, Vec<Block>> {
    let mut preds: SecondaryMap<Block, Vec<Block>> = SecondaryMap::new();

    for &bb in order {
        preds.insert(bb, vec![]);
    }

    for &bb in order {
        let successors = match blocks[bb].term() {
            Some(term) => term.successors(),
            None => continue,
        };

        for succ in successors {
            match preds.get_mut(succ) {
                Some(list) => list.push(bb),
                None => ice!(
                    "block {} jumps to a block outside the procedure",
                    blocks[bb].label
                ),
            }
        }
    }

    preds
}
