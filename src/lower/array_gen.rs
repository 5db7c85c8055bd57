//! The int-array runtime: the `intArray` struct type and the shared
//! `newIntArray` procedure every `new int[e]` site calls.
//!
//! An array is laid out as `{ length: int, data: [int x 0] }`: one length
//! word followed by the elements, `4 * (size + 1)` bytes in total.

use tracing::debug;

use crate::ir::instr::{BinOp, Term};
use crate::ir::proc::{Proc, ProcId};
use crate::ir::prog::Program;
use crate::ir::ty::{StructField, StructId, Ty};
use crate::ir::value::Operand;

use super::{GlobalCtx, LowerCtx};

pub struct ArrayRuntime {
    pub struct_id: StructId,
    pub new_int_array: ProcId,
}

impl ArrayRuntime {
    /// Declares the array struct and the `newIntArray` shell. The body is
    /// generated once the global context is assembled.
    pub fn declare(prog: &mut Program) -> Self {
        let struct_id = prog.structs.declare("intArray");
        prog.structs.define(
            struct_id,
            vec![
                StructField::new("length", Ty::Int),
                StructField::new("data", Ty::array(Ty::Int, 0)),
            ],
        );

        let mut proc = Proc::new("newIntArray", Ty::ptr(Ty::Struct(struct_id)));
        proc.add_param("size", Ty::Int);
        let new_int_array = prog.add_proc(proc);

        Self {
            struct_id,
            new_int_array,
        }
    }

    pub fn ptr_ty(&self) -> Ty {
        Ty::ptr(Ty::Struct(self.struct_id))
    }
}

/// Emits the `newIntArray` body: validate the size, allocate, store the
/// length word, zero-fill every element, return the array pointer.
pub fn generate_new_int_array(gctx: &mut GlobalCtx<'_>) {
    debug!("generating the array runtime");

    let proc_id = gctx.array.new_int_array;
    let array_ty = gctx.array.ptr_ty();

    let mut ctx = LowerCtx::new(gctx, proc_id, None);
    let size: Operand = ctx.proc().params()[0].into();

    // a negative size halts before anything is allocated
    let below_zero = ctx.binop("size_below_zero", size.clone(), BinOp::Slt, Operand::int(0));
    let negative_size = ctx.new_bb("negative_size");
    let good_size = ctx.new_bb("good_size");
    ctx.terminate(Term::branch(below_zero, negative_size, good_size));

    ctx.seal_halt(negative_size, "Array Size must be positive".to_owned());
    ctx.enter_bb(good_size);

    // one extra word for the length
    let size_with_len = ctx.binop("size_with_len", size.clone(), BinOp::Add, Operand::int(1));
    let size_in_bytes = ctx.binop("size_in_bytes", size_with_len, BinOp::Mul, Operand::int(4));
    let raw = ctx.alloc("alloc_res", size_in_bytes);
    let array = ctx.bitcast("new_array", array_ty, raw);

    let size_addr = ctx.gep(
        "size_addr",
        array.clone(),
        vec![Operand::int(0), Operand::int(0)],
    );
    ctx.store(size_addr, size.clone());

    // zero-initialize the elements
    let loop_start = ctx.new_bb("loop_start");
    let loop_body = ctx.new_bb("loop_body");
    let loop_end = ctx.new_bb("loop_end");

    let counter = ctx.alloca("i_var", Ty::Int);
    ctx.store(counter.into(), Operand::int(0));
    ctx.terminate(Term::Jump(loop_start));

    ctx.enter_bb(loop_start);
    let index = ctx.load("i", counter.into());
    let in_range = ctx.binop("below_size", index.clone(), BinOp::Slt, size);
    ctx.terminate(Term::branch(in_range, loop_body, loop_end));

    ctx.enter_bb(loop_body);
    let elem_addr = ctx.gep(
        "elem_addr",
        array.clone(),
        vec![Operand::int(0), Operand::int(1), index.clone()],
    );
    ctx.store(elem_addr, Operand::int(0));
    let next = ctx.binop("next_i", index, BinOp::Add, Operand::int(1));
    ctx.store(counter.into(), next);
    ctx.terminate(Term::Jump(loop_start));

    ctx.enter_bb(loop_end);
    ctx.terminate(Term::Return(array));
}
