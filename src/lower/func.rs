//! Per-procedure body lowering: methods and the program entry point.

use tracing::debug;

use crate::ast::{ClassId, MethodRef, ParamId, VarTarget};
use crate::ir::instr::Term;
use crate::ir::proc::Proc;
use crate::ir::ty::Ty;
use crate::ir::value::Operand;

use super::stmt::lower_stmt;
use super::{alloca_locals, GlobalCtx, LowerCtx};

pub fn lower_methods(gctx: &mut GlobalCtx<'_>) {
    for class_index in 0..gctx.ast.classes.len() {
        let class = ClassId(class_index);

        for method_index in 0..gctx.ast[class].methods.len() {
            lower_method(
                gctx,
                MethodRef {
                    class,
                    method: method_index,
                },
            );
        }
    }
}

fn lower_method(gctx: &mut GlobalCtx<'_>, method: MethodRef) {
    let ast = gctx.ast;
    let decl = ast.method(method);
    let proc_id = gctx.layout.method_proc(method);
    debug!(class = %ast[method.class].name, method = %decl.name, "lowering method body");

    let mut ctx = LowerCtx::new(gctx, proc_id, Some(method.class));

    // store copies of the parameters in stack slots, for uniform read/write
    // access; the receiver is read directly and never written
    for (index, param) in decl.params.iter().enumerate() {
        let ty = ctx.lower_ty(param.ty);
        let slot = ctx.alloca(&param.name, ty);
        let incoming = ctx.proc().params()[index + 1];
        ctx.store(slot.into(), incoming.into());
        ctx.bind_slot(VarTarget::Param(ParamId(index)), slot);
    }

    alloca_locals(&mut ctx, &decl.locals);

    for stmt in &decl.body {
        lower_stmt(&mut ctx, stmt);
    }

    // the front end guarantees every method body ends in a return, so the
    // cursor now rests on the unreachable continuation block
}

/// Lowers the program entry point into a parameterless `main` procedure
/// returning 0 on normal completion.
pub fn lower_main(gctx: &mut GlobalCtx<'_>) {
    debug!("lowering the entry point");

    let proc_id = gctx.prog.add_proc(Proc::new("main", Ty::Int));
    let ast = gctx.ast;

    let mut ctx = LowerCtx::new(gctx, proc_id, None);
    alloca_locals(&mut ctx, &ast.main.locals);

    for stmt in &ast.main.body {
        lower_stmt(&mut ctx, stmt);
    }

    ctx.terminate(Term::Return(Operand::int(0)));
}
