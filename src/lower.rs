//! AST-to-IR lowering.
//!
//! The pipeline runs in two phases. First every class *shape* is built:
//! instance struct types, vtable struct types, vtable constants, method
//! procedure shells and constructor shells ([`layout`]), plus the int-array
//! runtime ([`array_gen`]). Only then are bodies lowered ([`func`], [`stmt`],
//! [`expr`]) — a body may mention any class, including classes declared
//! later in the source, so the shapes must all exist up front. Finally every
//! procedure is rewritten into pruned SSA form ([`ssa`]).

use std::collections::HashMap;

use tracing::debug;

use crate::ast::{self, ClassId, VarTarget};
use crate::ice;
use crate::ir::bb::Block;
use crate::ir::instr::{BinOp, Instr, Term};
use crate::ir::proc::{Proc, ProcId};
use crate::ir::prog::Program;
use crate::ir::ty::Ty;
use crate::ir::value::{Operand, Var};

use self::array_gen::ArrayRuntime;
use self::layout::ClassTable;

pub mod array_gen;
pub mod expr;
pub mod func;
pub mod layout;
pub mod ssa;
pub mod stmt;

#[derive(Debug, Clone)]
pub struct LowerConfig {
    /// Emit a comment instruction in front of every lowered statement,
    /// recording its source line and kind.
    pub emit_statement_comments: bool,
}

impl Default for LowerConfig {
    fn default() -> Self {
        Self {
            emit_statement_comments: true,
        }
    }
}

/// Lowers a type-checked program to IR and converts every procedure to
/// pruned SSA form. Cannot fail on input that passed the front end; any
/// inconsistency in the resolved AST is an internal error.
pub fn lower_program(ast: &ast::Program, config: LowerConfig) -> Program {
    let mut gctx = GlobalCtx::new(ast, config);

    array_gen::generate_new_int_array(&mut gctx);
    layout::generate_constructors(&mut gctx);
    func::lower_main(&mut gctx);
    func::lower_methods(&mut gctx);

    let mut prog = gctx.finish();
    ssa::transform_program(&mut prog);

    debug!(
        structs = prog.structs.len(),
        procs = prog.procs().count(),
        "lowering finished"
    );

    prog
}

/// State shared by every lowering stage: the input AST, the program being
/// built, and the read-only layout tables. Built once, then only the
/// program part is mutated (append-only).
pub struct GlobalCtx<'ast> {
    pub ast: &'ast ast::Program,
    pub config: LowerConfig,
    pub prog: Program,
    pub array: ArrayRuntime,
    pub layout: ClassTable,
}

impl<'ast> GlobalCtx<'ast> {
    pub fn new(ast: &'ast ast::Program, config: LowerConfig) -> Self {
        let mut prog = Program::new();
        let array = ArrayRuntime::declare(&mut prog);
        let layout = ClassTable::build(ast, &mut prog, &array);

        Self {
            ast,
            config,
            prog,
            array,
            layout,
        }
    }

    pub fn finish(self) -> Program {
        self.prog
    }
}

/// The cursor threaded through body lowering: the procedure under
/// construction, the current basic block, and the stack slots of the
/// procedure's parameters and locals.
pub struct LowerCtx<'g, 'ast> {
    pub gctx: &'g mut GlobalCtx<'ast>,
    proc: ProcId,
    current: Block,
    slots: HashMap<VarTarget, Var>,
    class: Option<ClassId>,
}

impl<'g, 'ast> LowerCtx<'g, 'ast> {
    /// Opens a fresh lowering cursor positioned in a new entry block.
    pub fn new(gctx: &'g mut GlobalCtx<'ast>, proc: ProcId, class: Option<ClassId>) -> Self {
        let entry = {
            let proc = &mut gctx.prog[proc];
            let entry = proc.new_block("init");
            proc.append_block(entry);

            entry
        };

        Self {
            gctx,
            proc,
            current: entry,
            slots: HashMap::new(),
            class,
        }
    }

    /// The AST reference outlives the cursor, so callers can hold AST nodes
    /// across mutating calls.
    pub fn ast(&self) -> &'ast ast::Program {
        self.gctx.ast
    }

    pub fn proc_id(&self) -> ProcId {
        self.proc
    }

    pub fn proc(&self) -> &Proc {
        &self.gctx.prog[self.proc]
    }

    fn proc_mut(&mut self) -> &mut Proc {
        &mut self.gctx.prog[self.proc]
    }

    pub fn class(&self) -> Option<ClassId> {
        self.class
    }

    pub fn current_bb(&self) -> Block {
        self.current
    }

    /// Appends an instruction to the current block.
    pub fn emit(&mut self, instr: Instr) {
        let bb = self.current;
        self.proc_mut().blocks[bb].push(instr);
    }

    pub fn comment(&mut self, text: String) {
        if self.gctx.config.emit_statement_comments {
            self.emit(Instr::Comment(text));
        }
    }

    /// Creates a block without scheduling it.
    pub fn new_bb(&mut self, label: &str) -> Block {
        self.proc_mut().new_block(label)
    }

    /// Schedules a block and moves the cursor into it.
    pub fn enter_bb(&mut self, bb: Block) {
        self.proc_mut().append_block(bb);
        self.current = bb;
    }

    /// Terminates the current block. The cursor stays on the terminated
    /// block; callers follow up with [`enter_bb`](Self::enter_bb) or
    /// [`divert_to_unreachable`](Self::divert_to_unreachable).
    pub fn terminate(&mut self, term: Term) {
        let bb = self.current;
        self.proc_mut().blocks[bb].terminate(term);
    }

    /// Schedules a pre-created block and terminates it with a halt, without
    /// moving the cursor.
    pub fn seal_halt(&mut self, bb: Block, message: String) {
        self.proc_mut().append_block(bb);
        self.proc_mut().blocks[bb].terminate(Term::Halt(message));
    }

    /// Moves the cursor to an unscheduled block. Used after a `return`:
    /// trailing instructions of the statement walk land there and are
    /// discarded with the block, so nothing ever follows a terminator.
    pub fn divert_to_unreachable(&mut self) {
        self.current = self.proc_mut().new_block("unreachable");
    }

    pub fn temp(&mut self, name: &str, ty: Ty) -> Var {
        self.proc_mut().fresh_var(name, ty)
    }

    /// Reserves a stack slot in the current block; the returned variable
    /// holds its address.
    pub fn alloca(&mut self, name: &str, ty: Ty) -> Var {
        let var = self.temp(name, Ty::ptr(ty.clone()));
        self.emit(Instr::Alloca { var, ty });

        var
    }

    pub fn load(&mut self, name: &str, addr: Operand) -> Operand {
        let ty = self.operand_ty(&addr).pointee().clone();
        let var = self.temp(name, ty);
        self.emit(Instr::Load { var, addr });

        var.into()
    }

    pub fn store(&mut self, addr: Operand, value: Operand) {
        self.emit(Instr::Store { addr, value });
    }

    pub fn binop(&mut self, name: &str, lhs: Operand, op: BinOp, rhs: Operand) -> Operand {
        let var = self.temp(name, op.result_ty());
        self.emit(Instr::BinaryOp { var, lhs, op, rhs });

        var.into()
    }

    pub fn gep(&mut self, name: &str, base: Operand, indices: Vec<Operand>) -> Operand {
        let base_ty = self.operand_ty(&base);
        let ty = self.gctx.prog.gep_result_ty(&base_ty, &indices);
        let var = self.temp(name, ty);
        self.emit(Instr::GetElementPtr { var, base, indices });

        var.into()
    }

    pub fn bitcast(&mut self, name: &str, ty: Ty, value: Operand) -> Operand {
        let var = self.temp(name, ty.clone());
        self.emit(Instr::Bitcast { var, ty, value });

        var.into()
    }

    /// Heap-allocates `size` bytes; the result is a byte pointer.
    pub fn alloc(&mut self, name: &str, size: Operand) -> Operand {
        let var = self.temp(name, Ty::ptr(Ty::Byte));
        self.emit(Instr::Alloc { var, size });

        var.into()
    }

    pub fn call(&mut self, name: &str, callee: Operand, args: Vec<Operand>) -> Operand {
        let callee_ty = self.operand_ty(&callee);
        let (params, ret_ty) = match callee_ty.pointee() {
            Ty::Proc { params, ret } => (params, (**ret).clone()),
            other => ice!("call through a non-procedure operand of type {:?}", other),
        };

        if params.len() != args.len() {
            ice!(
                "call arity mismatch: callee takes {} arguments, {} supplied",
                params.len(),
                args.len()
            );
        }

        let var = self.temp(name, ret_ty);
        self.emit(Instr::Call { var, callee, args });

        var.into()
    }

    pub fn operand_ty(&self, operand: &Operand) -> Ty {
        self.gctx.prog.operand_ty(self.proc(), operand)
    }

    pub fn lower_ty(&self, ty: ast::SrcTy) -> Ty {
        self.gctx.layout.lower_ty(ty)
    }

    /// The implicit receiver of the current method procedure.
    pub fn this_param(&self) -> Var {
        match self.proc().params().first() {
            Some(&param) => param,
            None => ice!("procedure {} has no receiver parameter", self.proc().name),
        }
    }

    pub fn bind_slot(&mut self, target: VarTarget, slot: Var) {
        self.slots.insert(target, slot);
    }

    /// The stack slot of a parameter or local.
    pub fn slot(&self, target: VarTarget) -> Var {
        match self.slots.get(&target) {
            Some(&slot) => slot,
            None => ice!("no stack slot for {:?} in procedure {}", target, self.proc().name),
        }
    }

    /// Inserts a bitcast if the value's static type differs from the
    /// expected type (covariant class assignment, typed null).
    pub fn cast_if_necessary(&mut self, value: Operand, expected: &Ty) -> Operand {
        if &self.operand_ty(&value) == expected {
            value
        } else {
            self.bitcast("cast_value", expected.clone(), value)
        }
    }

    /// Emits a branch-to-halt sequence triggered when `addr` is null, and
    /// leaves the cursor in the non-null continuation block.
    pub fn null_check(&mut self, addr: &Operand, message: String) {
        let addr_ty = self.operand_ty(addr);
        let is_null = self.binop("is_null", addr.clone(), BinOp::Eq, Operand::null(addr_ty));

        let when_null = self.new_bb("when_null");
        let not_null = self.new_bb("not_null");
        self.terminate(Term::branch(is_null, when_null, not_null));

        self.seal_halt(when_null, message);
        self.enter_bb(not_null);
    }

    /// Loads the length word of an int array.
    pub fn array_len(&mut self, array: &Operand) -> Operand {
        let addr = self.gep(
            "length_addr",
            array.clone(),
            vec![Operand::int(0), Operand::int(0)],
        );

        self.load("len", addr)
    }
}

/// Lowers the hoisted locals of a body: one entry-block alloca per local,
/// bound in the cursor's slot map.
fn alloca_locals(ctx: &mut LowerCtx<'_, '_>, locals: &[ast::VarDecl]) {
    for (index, local) in locals.iter().enumerate() {
        let ty = ctx.lower_ty(local.ty);
        let slot = ctx.alloca(&local.name, ty);
        ctx.bind_slot(VarTarget::Local(ast::LocalId(index)), slot);
    }
}
