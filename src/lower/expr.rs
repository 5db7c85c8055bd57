//! Expression lowering.
//!
//! Two modes: [`lower_lvalue`] produces an *address* operand (the target of
//! an assignment or the base of a load), [`lower_rvalue`] produces a value.
//! Every dynamically unsafe operation — dereferencing a possibly-null
//! pointer, indexing an array, dividing — is guarded here with a
//! branch-to-halt sequence; the generated program fails at run time, the
//! compiler never does.

use crate::ast::{BinaryOp, Expr, ExprKind, MethodRef, UnaryOp, VarTarget};
use crate::ice;
use crate::ir::instr::{BinOp, Term};
use crate::ir::ty::Ty;
use crate::ir::value::{Const, Operand};
use crate::try_match;

use super::LowerCtx;

pub fn lower_rvalue(ctx: &mut LowerCtx<'_, '_>, expr: &Expr) -> Operand {
    match &expr.kind {
        ExprKind::IntLit(value) => Operand::int(*value),
        ExprKind::BoolLit(value) => Operand::bool(*value),
        ExprKind::Null(ty) => Operand::null(ctx.lower_ty(*ty)),
        ExprKind::This => ctx.this_param().into(),

        ExprKind::Var(target) => {
            let name = format!("read_{}", var_source_name(ctx, *target));
            let addr = lower_lvalue(ctx, expr);

            ctx.load(&name, addr)
        }

        ExprKind::FieldAccess { field, .. } => {
            let name = format!("read_{}", ctx.ast().field(*field).name);
            let addr = lower_lvalue(ctx, expr);

            ctx.load(&name, addr)
        }

        ExprKind::ArrayIndex { .. } => {
            let addr = lower_lvalue(ctx, expr);

            ctx.load("array_lookup_res", addr)
        }

        ExprKind::ArrayLength(array) => {
            let array = lower_rvalue(ctx, array);
            ctx.null_check(
                &array,
                format!(
                    "Nullpointer exception when reading array length in line {}",
                    expr.pos.line
                ),
            );

            ctx.array_len(&array)
        }

        ExprKind::Unary { op, expr } => {
            let value = lower_rvalue(ctx, expr);

            match op {
                UnaryOp::Neg => ctx.binop("minus_res", Operand::int(0), BinOp::Sub, value),
                UnaryOp::Not => ctx.binop("not_res", Operand::bool(false), BinOp::Eq, value),
            }
        }

        ExprKind::Binary { lhs, op, rhs } => lower_binary(ctx, expr, lhs, *op, rhs),

        ExprKind::MethodCall { recv, method, args } => {
            lower_method_call(ctx, expr, recv, *method, args)
        }

        ExprKind::NewObject(class) => {
            let constructor = ctx.gctx.layout.constructor(*class);
            let name = format!("new_{}", ctx.ast()[*class].name);

            ctx.call(&name, Const::ProcRef(constructor).into(), vec![])
        }

        ExprKind::NewIntArray(size) => {
            let size = lower_rvalue(ctx, size);
            let new_int_array = ctx.gctx.array.new_int_array;

            ctx.call("new_array", Const::ProcRef(new_int_array).into(), vec![size])
        }
    }
}

pub fn lower_lvalue(ctx: &mut LowerCtx<'_, '_>, expr: &Expr) -> Operand {
    match &expr.kind {
        ExprKind::Var(target) => match *target {
            // locals and parameters live in stack slots
            VarTarget::Local(_) | VarTarget::Param(_) => ctx.slot(*target).into(),

            // a bare field name addresses through the implicit receiver,
            // which is never null inside a method
            VarTarget::Field(field) => {
                let this = ctx.this_param().into();

                ctx.field_addr(this, field)
            }
        },

        ExprKind::FieldAccess { recv, field } => {
            let recv = lower_rvalue(ctx, recv);
            ctx.null_check(
                &recv,
                format!("Nullpointer exception in line {}", expr.pos.line),
            );

            ctx.field_addr(recv, *field)
        }

        ExprKind::ArrayIndex { array, index } => lower_array_index(ctx, expr, array, index),

        other => ice!("expression has no l-value: {:?}", other),
    }
}

/// The address of `array[index]`, guarded by a null check on the array and
/// a bounds check on the index.
fn lower_array_index(
    ctx: &mut LowerCtx<'_, '_>,
    expr: &Expr,
    array: &Expr,
    index: &Expr,
) -> Operand {
    let array = lower_rvalue(ctx, array);
    ctx.null_check(
        &array,
        format!("Nullpointer exception in line {}", expr.pos.line),
    );

    let index = lower_rvalue(ctx, index);
    let len = ctx.array_len(&array);

    // out of bounds iff index < 0 || len - 1 < index
    let below_zero = ctx.binop("below_zero", index.clone(), BinOp::Slt, Operand::int(0));
    let len_minus_one = ctx.binop("len_minus_one", len, BinOp::Sub, Operand::int(1));
    let past_end = ctx.binop("past_end", len_minus_one, BinOp::Slt, index.clone());
    let out_of_bounds = ctx.binop("out_of_bounds", below_zero, BinOp::Or, past_end);

    let when_out_of_bounds = ctx.new_bb("out_of_bounds");
    let in_range = ctx.new_bb("index_in_range");
    ctx.terminate(Term::branch(out_of_bounds, when_out_of_bounds, in_range));

    ctx.seal_halt(
        when_out_of_bounds,
        format!("Index out of bounds error in line {}", expr.pos.line),
    );
    ctx.enter_bb(in_range);

    ctx.gep(
        "index_addr",
        array,
        vec![Operand::int(0), Operand::int(1), index],
    )
}

fn lower_binary(
    ctx: &mut LowerCtx<'_, '_>,
    expr: &Expr,
    lhs: &Expr,
    op: BinaryOp,
    rhs: &Expr,
) -> Operand {
    let left = lower_rvalue(ctx, lhs);

    match op {
        BinaryOp::And => lower_and(ctx, left, rhs),
        BinaryOp::Div => lower_div(ctx, expr, left, rhs),

        BinaryOp::Eq => {
            let right = lower_rvalue(ctx, rhs);
            // a subclass pointer compared against a superclass pointer (or
            // a typed null) is cast to the left operand's type first
            let left_ty = ctx.operand_ty(&left);
            let right = ctx.cast_if_necessary(right, &left_ty);

            ctx.binop("res_eq", left, BinOp::Eq, right)
        }

        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Lt => {
            let op = match op {
                BinaryOp::Add => BinOp::Add,
                BinaryOp::Sub => BinOp::Sub,
                BinaryOp::Mul => BinOp::Mul,
                BinaryOp::Lt => BinOp::Slt,
                _ => unreachable!(),
            };
            let right = lower_rvalue(ctx, rhs);
            let name = format!("res_{:?}", op).to_lowercase();

            ctx.binop(&name, left, op, right)
        }
    }
}

/// Short-circuiting `&&` via a stack slot: the left value is stored, the
/// right operand is only evaluated (and stored) when the left was true.
fn lower_and(ctx: &mut LowerCtx<'_, '_>, left: Operand, rhs: &Expr) -> Operand {
    let and_rhs = ctx.new_bb("and_first_true");
    let and_end = ctx.new_bb("and_end");

    let result_slot = ctx.alloca("and_res_var", Ty::Bool);
    ctx.store(result_slot.into(), left.clone());
    ctx.terminate(Term::branch(left, and_rhs, and_end));

    ctx.enter_bb(and_rhs);
    let right = lower_rvalue(ctx, rhs);
    ctx.store(result_slot.into(), right);
    ctx.terminate(Term::Jump(and_end));

    ctx.enter_bb(and_end);
    ctx.load("and_res", result_slot.into())
}

/// Guarded integer division.
///
/// The generated code halts on a zero divisor and short-circuits
/// `i32::MIN / -1` to `i32::MIN` without executing the divide (the one
/// overflowing case). When the operands are constants that prove both
/// hazards impossible, the guards are dropped and the division lowers to
/// the bare instruction.
fn lower_div(ctx: &mut LowerCtx<'_, '_>, expr: &Expr, left: Operand, rhs: &Expr) -> Operand {
    let right = lower_rvalue(ctx, rhs);

    let left_const = try_match!(&left, Operand::Const(Const::Int(value)) => *value);
    let right_const = try_match!(&right, Operand::Const(Const::Int(value)) => *value);

    let zero_safe = matches!(right_const, Some(divisor) if divisor != 0);
    let overflow_safe = matches!(right_const, Some(divisor) if divisor != -1)
        || matches!(left_const, Some(dividend) if dividend != i32::MIN);

    if zero_safe && overflow_safe {
        return ctx.binop("res_sdiv", left, BinOp::Sdiv, right);
    }

    let result_slot = ctx.alloca("div_res_var", Ty::Int);

    let is_zero = ctx.binop("is_zero", right.clone(), BinOp::Eq, Operand::int(0));
    let when_zero = ctx.new_bb("div_by_zero");
    let not_zero = ctx.new_bb("div_not_zero");
    ctx.terminate(Term::branch(is_zero, when_zero, not_zero));

    ctx.seal_halt(
        when_zero,
        format!("Division by zero in line {}", expr.pos.line),
    );
    ctx.enter_bb(not_zero);

    let div_end = ctx.new_bb("div_end");
    let no_overflow = ctx.new_bb("div_no_overflow");

    let is_minus_one = ctx.binop("is_minus_one", right.clone(), BinOp::Eq, Operand::int(-1));
    let is_min_int = ctx.binop("is_min_int", left.clone(), BinOp::Eq, Operand::int(i32::MIN));
    let is_overflow = ctx.binop("is_overflow", is_min_int, BinOp::And, is_minus_one);
    ctx.store(result_slot.into(), Operand::int(i32::MIN));
    ctx.terminate(Term::branch(is_overflow, div_end, no_overflow));

    ctx.enter_bb(no_overflow);
    let quotient = ctx.binop("div_result", left, BinOp::Sdiv, right);
    ctx.store(result_slot.into(), quotient);
    ctx.terminate(Term::Jump(div_end));

    ctx.enter_bb(div_end);
    ctx.load("div_res", result_slot.into())
}

fn lower_method_call(
    ctx: &mut LowerCtx<'_, '_>,
    expr: &Expr,
    recv: &Expr,
    method: MethodRef,
    args: &[Expr],
) -> Operand {
    let ast = ctx.ast();
    let decl = ast.method(method);

    let recv = lower_rvalue(ctx, recv);
    ctx.null_check(
        &recv,
        format!(
            "Nullpointer exception in line {} when calling {}",
            expr.pos.line, decl.name
        ),
    );

    // upcast the receiver to the declaring class of the resolved method
    let declaring_ty = ctx.gctx.layout.instance_ptr_ty(method.class);
    let recv = ctx.cast_if_necessary(recv, &declaring_ty);

    let mut call_args = vec![recv.clone()];

    for (arg, formal) in args.iter().zip(&decl.params) {
        let value = lower_rvalue(ctx, arg);
        let formal_ty = ctx.lower_ty(formal.ty);
        call_args.push(ctx.cast_if_necessary(value, &formal_ty));
    }

    let callee = ctx.vtable_proc(recv, method);

    ctx.call(&format!("{}_result", decl.name), callee, call_args)
}

fn var_source_name(ctx: &LowerCtx<'_, '_>, target: VarTarget) -> String {
    match target {
        VarTarget::Local(_) | VarTarget::Param(_) => {
            ctx.proc().var_name(ctx.slot(target)).to_owned()
        }

        VarTarget::Field(field) => ctx.ast().field(field).name.clone(),
    }
}
