//! Statement lowering.

use crate::ast::{Stmt, StmtKind};
use crate::ir::instr::{Instr, Term};

use super::expr::{lower_lvalue, lower_rvalue};
use super::LowerCtx;

pub fn lower_stmt(ctx: &mut LowerCtx<'_, '_>, stmt: &Stmt) {
    ctx.comment(format!("line {}: {}", stmt.pos.line, stmt.kind_name()));

    match &stmt.kind {
        StmtKind::Block(stmts) => {
            for stmt in stmts {
                lower_stmt(ctx, stmt);
            }
        }

        // storage was allocated in the procedure entry
        StmtKind::VarDecl(_) => {}

        StmtKind::Assign { target, value } => {
            let addr = lower_lvalue(ctx, target);
            let value = lower_rvalue(ctx, value);

            let pointee = ctx.operand_ty(&addr).pointee().clone();
            let value = ctx.cast_if_necessary(value, &pointee);

            ctx.store(addr, value);
        }

        StmtKind::If {
            cond,
            then_body,
            else_body,
        } => {
            let on_true = ctx.new_bb("if_true");
            let on_false = ctx.new_bb("if_false");
            let end_if = ctx.new_bb("end_if");

            let cond = lower_rvalue(ctx, cond);
            ctx.terminate(Term::branch(cond, on_true, on_false));

            ctx.enter_bb(on_true);
            lower_stmt(ctx, then_body);
            ctx.terminate(Term::Jump(end_if));

            ctx.enter_bb(on_false);
            lower_stmt(ctx, else_body);
            ctx.terminate(Term::Jump(end_if));

            ctx.enter_bb(end_if);
        }

        StmtKind::While { cond, body } => {
            let while_start = ctx.new_bb("while_start");
            let loop_body = ctx.new_bb("loop_body");
            let end_loop = ctx.new_bb("end_loop");

            // the loop header is re-entered from both the preheader and the
            // end of the body
            ctx.terminate(Term::Jump(while_start));

            ctx.enter_bb(while_start);
            let cond = lower_rvalue(ctx, cond);
            ctx.terminate(Term::branch(cond, loop_body, end_loop));

            ctx.enter_bb(loop_body);
            lower_stmt(ctx, body);
            ctx.terminate(Term::Jump(while_start));

            ctx.enter_bb(end_loop);
        }

        StmtKind::Print(expr) => {
            let value = lower_rvalue(ctx, expr);
            ctx.emit(Instr::Print { value });
        }

        StmtKind::Return(expr) => {
            let value = lower_rvalue(ctx, expr);
            let ret_ty = ctx.proc().ret_ty.clone();
            let value = ctx.cast_if_necessary(value, &ret_ty);

            ctx.terminate(Term::Return(value));
            // anything lowered after a return lands in a discarded block
            ctx.divert_to_unreachable();
        }

        StmtKind::Expr(expr) => {
            lower_rvalue(ctx, expr);
        }
    }
}
