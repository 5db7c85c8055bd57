//! SSA construction and phi pruning.
//!
//! A lowered procedure keeps every local in a stack slot (`Alloca` +
//! `Load`/`Store`). This pass rewrites each procedure into a parallel body
//! in which every *promotable* slot — an entry-block alloca whose address
//! is used only as the address of loads and stores — becomes pure value
//! flow, inserting phi nodes at join points.
//!
//! The construction is a single forward pass over the blocks in their
//! existing order, with no dominator-tree precomputation. Each block keeps
//! a value-number table mapping a variable to its current defining operand.
//! Reading a variable that has no local definition consults the
//! predecessors; a join block gets a phi whose choices are filled eagerly
//! for already-processed predecessors and *deferred* for the rest: a
//! pending-choice record is queued on the predecessor and fired once it
//! finishes. That is what makes loop back-edges work — the predecessor at
//! the bottom of a loop is processed after the header that needs its value.
//!
//! A final pruning pass removes phis whose choices all agree (or only refer
//! back to the phi itself) and runs to a fixed point, so pruning an
//! already-pruned procedure changes nothing.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use slotmap::SecondaryMap;
use tracing::{debug, trace};

use crate::ice;
use crate::ir::bb::Block;
use crate::ir::instr::{Instr, PhiChoice, Term};
use crate::ir::proc::{predecessors, Proc};
use crate::ir::prog::Program;
use crate::ir::ty::Ty;
use crate::ir::value::{Const, Operand, Var};
use crate::try_match;

/// Converts every procedure of the program to pruned SSA form.
pub fn transform_program(prog: &mut Program) {
    for proc in prog.procs_mut() {
        transform_proc(proc);
        prune_redundant_phis(proc);
    }
}

/// Rewrites one procedure into SSA form, replacing its body.
pub fn transform_proc(proc: &mut Proc) {
    debug!(proc = %proc.name, "converting to SSA form");
    SsaBuilder::new(proc).run();
}

/// A deferred phi choice: once `pred` finishes processing, resolve `source`
/// in it and append the choice to the phi defining `phi_var`.
struct Pending {
    phi_bb: Block,
    phi_var: Var,
    pred: Block,
    source: Operand,
}

struct SsaBuilder<'p> {
    proc: &'p mut Proc,
    old_order: Vec<Block>,
    /// Predecessors of the old blocks.
    preds: SecondaryMap<Block, Vec<Block>>,
    /// Entry-block allocas whose address never escapes a load or store.
    promotable: HashSet<Var>,
    /// Old block -> its replacement.
    block_map: SecondaryMap<Block, Block>,
    /// Per old block: the current defining operand of each variable.
    value_numbers: SecondaryMap<Block, HashMap<Var, Operand>>,
    /// Old blocks that have been fully processed.
    ready: HashSet<Block>,
    on_complete: SecondaryMap<Block, Vec<Pending>>,
}

impl<'p> SsaBuilder<'p> {
    fn new(proc: &'p mut Proc) -> Self {
        let old_order = proc.block_order().to_vec();
        let preds = predecessors(&old_order, &proc.blocks);
        let promotable = promotable_vars(proc, &old_order);

        let mut block_map = SecondaryMap::new();
        let mut value_numbers = SecondaryMap::new();
        let mut on_complete = SecondaryMap::new();

        for &bb in &old_order {
            let label = proc.blocks[bb].label.clone();
            let new_bb = proc.new_block(label);
            block_map.insert(bb, new_bb);

            // every block starts out knowing the parameters
            let initial = proc
                .params()
                .iter()
                .map(|&param| (param, Operand::Var(param)))
                .collect();
            value_numbers.insert(bb, initial);
            on_complete.insert(bb, vec![]);
        }

        Self {
            proc,
            old_order,
            preds,
            promotable,
            block_map,
            value_numbers,
            ready: HashSet::new(),
            on_complete,
        }
    }

    fn run(mut self) {
        for i in 0..self.old_order.len() {
            let bb = self.old_order[i];
            self.process_block(bb);
        }

        let new_order = self
            .old_order
            .iter()
            .map(|&bb| self.block_map[bb])
            .collect();
        self.proc.replace_body(new_order);
    }

    fn process_block(&mut self, bb: Block) {
        let instrs = self.proc.blocks[bb].instrs.clone();
        let term = self.proc.blocks[bb].term().cloned();

        for instr in instrs {
            self.rewrite_instr(bb, instr);
        }

        if let Some(term) = term {
            let new_term = self.rewrite_term(bb, term);
            let new_bb = self.block_map[bb];
            self.proc.blocks[new_bb].terminate(new_term);
        }

        // fire the deferred choices waiting on this block; firing may queue
        // more onto this very block (a loop over a single block), so drain
        while let Some(pending) = self.pop_pending(bb) {
            self.fire(pending);
        }

        self.ready.insert(bb);
    }

    fn rewrite_instr(&mut self, bb: Block, instr: Instr) {
        match instr {
            Instr::Alloca { var, ty } => {
                if self.promotable.contains(&var) {
                    trace!(slot = %self.proc.var_name(var), "promoting stack slot");
                    return;
                }

                let new_var = self.copy_var(var);
                self.push_new(bb, Instr::Alloca { var: new_var, ty });
                self.set_vn(bb, var, Operand::Var(new_var));
            }

            Instr::Load { var, addr } => {
                if let Some(slot) = promoted_slot(&self.promotable, &addr) {
                    let value = self.read_var(bb, slot);
                    self.set_vn(bb, var, value);
                    return;
                }

                let new_var = self.copy_var(var);
                let addr = self.resolve_operand(bb, &addr);
                self.push_new(bb, Instr::Load { var: new_var, addr });
                self.set_vn(bb, var, Operand::Var(new_var));
            }

            Instr::Store { addr, value } => {
                let value = self.resolve_operand(bb, &value);

                if let Some(slot) = promoted_slot(&self.promotable, &addr) {
                    // the store becomes the slot's new value number
                    self.set_vn(bb, slot, value);
                    return;
                }

                let addr = self.resolve_operand(bb, &addr);
                self.push_new(bb, Instr::Store { addr, value });
            }

            Instr::BinaryOp { var, lhs, op, rhs } => {
                let new_var = self.copy_var(var);
                let lhs = self.resolve_operand(bb, &lhs);
                let rhs = self.resolve_operand(bb, &rhs);
                self.push_new(bb, Instr::BinaryOp { var: new_var, lhs, op, rhs });
                self.set_vn(bb, var, Operand::Var(new_var));
            }

            Instr::GetElementPtr { var, base, indices } => {
                let new_var = self.copy_var(var);
                let base = self.resolve_operand(bb, &base);
                let indices = indices
                    .iter()
                    .map(|index| self.resolve_operand(bb, index))
                    .collect();
                self.push_new(bb, Instr::GetElementPtr { var: new_var, base, indices });
                self.set_vn(bb, var, Operand::Var(new_var));
            }

            Instr::Bitcast { var, ty, value } => {
                let new_var = self.copy_var(var);
                let value = self.resolve_operand(bb, &value);
                self.push_new(bb, Instr::Bitcast { var: new_var, ty, value });
                self.set_vn(bb, var, Operand::Var(new_var));
            }

            Instr::Alloc { var, size } => {
                let new_var = self.copy_var(var);
                let size = self.resolve_operand(bb, &size);
                self.push_new(bb, Instr::Alloc { var: new_var, size });
                self.set_vn(bb, var, Operand::Var(new_var));
            }

            Instr::Call { var, callee, args } => {
                let new_var = self.copy_var(var);
                let callee = self.resolve_operand(bb, &callee);
                let args = args
                    .iter()
                    .map(|arg| self.resolve_operand(bb, arg))
                    .collect();
                self.push_new(bb, Instr::Call { var: new_var, callee, args });
                self.set_vn(bb, var, Operand::Var(new_var));
            }

            Instr::Print { value } => {
                let value = self.resolve_operand(bb, &value);
                self.push_new(bb, Instr::Print { value });
            }

            Instr::Comment(text) => {
                self.push_new(bb, Instr::Comment(text));
            }

            // an input phi (the pass re-run on its own output): copy it,
            // deferring every choice to its predecessor
            Instr::Phi { var, ty, choices } => {
                let new_var = self.copy_var(var);
                self.push_new(
                    bb,
                    Instr::Phi {
                        var: new_var,
                        ty,
                        choices: vec![],
                    },
                );
                self.set_vn(bb, var, Operand::Var(new_var));

                let phi_bb = self.block_map[bb];
                for choice in choices {
                    self.when_ready(Pending {
                        phi_bb,
                        phi_var: new_var,
                        pred: choice.pred,
                        source: choice.value,
                    });
                }
            }
        }
    }

    fn rewrite_term(&mut self, bb: Block, term: Term) -> Term {
        match term {
            Term::Jump(target) => Term::Jump(self.block_map[target]),

            Term::Branch { cond, on_true, on_false } => Term::Branch {
                cond: self.resolve_operand(bb, &cond),
                on_true: self.block_map[on_true],
                on_false: self.block_map[on_false],
            },

            Term::Return(value) => Term::Return(self.resolve_operand(bb, &value)),
            Term::ReturnVoid => Term::ReturnVoid,
            Term::Halt(message) => Term::Halt(message),
        }
    }

    /// The current value of `var` as seen at the end of (old) block `bb`.
    fn read_var(&mut self, bb: Block, var: Var) -> Operand {
        if let Some(value) = self.value_numbers[bb].get(&var) {
            return value.clone();
        }

        let preds = self.preds[bb].clone();

        match preds.len() {
            // an (infeasible) path on which the variable is never written;
            // the value can never be observed, any placeholder will do
            0 => Operand::Const(Const::zero_of(&self.transfer_ty(var))),

            1 => self.read_var(preds[0], var),

            _ => {
                let ty = self.transfer_ty(var);
                let name = self.proc.var_name(var).to_owned();
                let phi_var = self.proc.fresh_var(name, ty.clone());

                let phi_bb = self.block_map[bb];
                self.proc.blocks[phi_bb].instrs.insert(
                    0,
                    Instr::Phi {
                        var: phi_var,
                        ty,
                        choices: vec![],
                    },
                );
                trace!(
                    var = %self.proc.var_name(var),
                    block = %self.proc.blocks[phi_bb].label,
                    "inserting phi"
                );

                // record the phi before visiting the predecessors, so a
                // loop back-edge resolves to the phi instead of recursing
                // forever
                self.set_vn(bb, var, Operand::Var(phi_var));

                for pred in preds {
                    self.when_ready(Pending {
                        phi_bb,
                        phi_var,
                        pred,
                        source: Operand::Var(var),
                    });
                }

                Operand::Var(phi_var)
            }
        }
    }

    fn resolve_operand(&mut self, bb: Block, operand: &Operand) -> Operand {
        match operand {
            Operand::Var(var) => self.read_var(bb, *var),
            Operand::Const(_) => operand.clone(),
        }
    }

    fn when_ready(&mut self, pending: Pending) {
        if self.ready.contains(&pending.pred) {
            self.fire(pending);
        } else {
            self.on_complete[pending.pred].push(pending);
        }
    }

    fn fire(&mut self, pending: Pending) {
        let value = self.resolve_operand(pending.pred, &pending.source);
        let choice = PhiChoice {
            pred: self.block_map[pending.pred],
            value,
        };

        self.push_phi_choice(pending.phi_bb, pending.phi_var, choice);
    }

    fn push_phi_choice(&mut self, phi_bb: Block, phi_var: Var, choice: PhiChoice) {
        for instr in &mut self.proc.blocks[phi_bb].instrs {
            if let Instr::Phi { var, choices, .. } = instr {
                if *var == phi_var {
                    choices.push(choice);
                    return;
                }
            }
        }

        ice!(
            "phi for {} disappeared from block {}",
            self.proc.var_name(phi_var),
            self.proc.blocks[phi_bb].label
        );
    }

    fn pop_pending(&mut self, bb: Block) -> Option<Pending> {
        self.on_complete[bb].pop()
    }

    /// The type a variable's value has after promotion: promoted slots drop
    /// their address-of-pointer type.
    fn transfer_ty(&self, var: Var) -> Ty {
        let ty = self.proc.var_ty(var);

        if self.promotable.contains(&var) {
            ty.pointee().clone()
        } else {
            ty.clone()
        }
    }

    fn copy_var(&mut self, var: Var) -> Var {
        let name = self.proc.var_name(var).to_owned();
        let ty = self.proc.var_ty(var).clone();

        self.proc.fresh_var(name, ty)
    }

    fn push_new(&mut self, bb: Block, instr: Instr) {
        let new_bb = self.block_map[bb];
        self.proc.blocks[new_bb].push(instr);
    }

    fn set_vn(&mut self, bb: Block, var: Var, value: Operand) {
        self.value_numbers[bb].insert(var, value);
    }
}

/// The promotable set: allocas of the entry block whose variable is used
/// only as the address of a `Load` or a `Store`. An address that is stored
/// as a value, indexed, compared, passed to a call, branched on or returned
/// escapes, and its slot stays a real stack allocation.
fn promotable_vars(proc: &Proc, order: &[Block]) -> HashSet<Var> {
    let mut vars: HashSet<Var> = proc.blocks[proc.entry()]
        .instrs
        .iter()
        .filter_map(|instr| try_match!(instr, Instr::Alloca { var, .. } => *var))
        .collect();

    let escape = |vars: &mut HashSet<Var>, operand: &Operand| {
        if let Operand::Var(var) = operand {
            vars.remove(var);
        }
    };

    for &bb in order {
        let block = &proc.blocks[bb];

        for instr in &block.instrs {
            match instr {
                Instr::Load { .. } => {}

                Instr::Store { value, .. } => escape(&mut vars, value),

                other => {
                    for operand in other.operands() {
                        escape(&mut vars, operand);
                    }
                }
            }
        }

        if let Some(term) = block.term() {
            for operand in term.operands() {
                escape(&mut vars, operand);
            }
        }
    }

    vars
}

/// When `addr` is a promotable stack slot, returns its variable.
fn promoted_slot(promotable: &HashSet<Var>, addr: &Operand) -> Option<Var> {
    addr.as_var().filter(|var| promotable.contains(var))
}

/// Removes redundant phi nodes: a phi whose choices are all structurally
/// equal (ignoring choices that refer back to the phi itself, which only a
/// cycle can produce) is replaced by the single distinct value. Runs to a
/// fixed point, chasing replacement chains, so a second run is a no-op.
pub fn prune_redundant_phis(proc: &mut Proc) {
    let order = proc.block_order().to_vec();

    loop {
        let mut replacements: HashMap<Var, Operand> = HashMap::new();

        for &bb in &order {
            for instr in &proc.blocks[bb].instrs {
                let Instr::Phi { var, ty, choices } = instr else { continue };

                let this = Operand::Var(*var);
                let mut distinct = choices
                    .iter()
                    .map(|choice| &choice.value)
                    .filter(|value| **value != this)
                    .unique();

                let first = distinct.next().cloned();
                if distinct.next().is_some() {
                    continue;
                }

                // all self-referential: only possible through a cycle, the
                // value is never observable
                let replacement =
                    first.unwrap_or_else(|| Operand::Const(Const::zero_of(ty)));
                replacements.insert(*var, replacement);
            }
        }

        if replacements.is_empty() {
            break;
        }

        trace!(proc = %proc.name, count = replacements.len(), "pruning redundant phis");

        for &bb in &order {
            let block = &mut proc.blocks[bb];

            block.instrs.retain(
                |instr| !matches!(instr, Instr::Phi { var, .. } if replacements.contains_key(var)),
            );

            for instr in &mut block.instrs {
                for operand in instr.operands_mut() {
                    resolve_through(&replacements, operand);
                }
            }

            if let Some(term) = block.term_mut() {
                for operand in term.operands_mut() {
                    resolve_through(&replacements, operand);
                }
            }
        }
    }
}

/// Chases a replacement chain (a pruned phi may be replaced by another
/// pruned phi), guarding against cycles.
fn resolve_through(replacements: &HashMap<Var, Operand>, operand: &mut Operand) {
    let mut seen = HashSet::new();

    while let Operand::Var(var) = *operand {
        if !seen.insert(var) {
            break;
        }

        match replacements.get(&var) {
            Some(next) => *operand = next.clone(),
            None => break,
        }
    }
}
