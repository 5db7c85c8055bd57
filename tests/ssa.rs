//! SSA construction and pruning.

mod common;

use pretty_assertions::assert_eq;

use mjc::ast::{BinaryOp, Expr, SrcTy, Stmt};
use mjc::ir::instr::{BinOp, Instr, Term};
use mjc::ir::proc::Proc;
use mjc::ir::prog::Program as IrProgram;
use mjc::ir::ty::Ty;
use mjc::ir::value::{Operand, Var};
use mjc::lower::ssa;

use common::*;

fn assert_no_stack_traffic(proc: &Proc) {
    assert_eq!(
        count_instrs(proc, |instr| matches!(
            instr,
            Instr::Alloca { .. } | Instr::Load { .. } | Instr::Store { .. }
        )),
        0,
        "stack traffic survived SSA construction in {}",
        proc.name
    );
}

/// Every phi carries exactly one choice per predecessor of its block.
fn assert_phi_complete(proc: &Proc) {
    let preds = proc.predecessors();

    for (bb, instr) in phis(proc) {
        let Instr::Phi { choices, .. } = instr else {
            unreachable!();
        };

        assert!(!choices.is_empty(), "pruning left an empty phi");

        let mut choice_preds: Vec<_> = choices.iter().map(|choice| choice.pred).collect();
        let mut block_preds = preds[bb].clone();
        choice_preds.sort();
        block_preds.sort();

        assert_eq!(
            choice_preds, block_preds,
            "phi in {} disagrees with the predecessors of its block",
            label(proc, bb)
        );
    }
}

#[test]
fn straightline_method_reduces_to_its_computation() {
    // int x; x = 10 / 2; return x;
    let ast = program(
        vec![class(
            "A",
            None,
            vec![],
            vec![method(
                "compute",
                vec![],
                SrcTy::Int,
                vec![decl("x", SrcTy::Int)],
                vec![
                    Stmt::var_decl(0),
                    Stmt::assign(
                        Expr::local(0),
                        Expr::binary(Expr::int(10), BinaryOp::Div, Expr::int(2)),
                    ),
                    Stmt::ret(Expr::local(0)),
                ],
            )],
        )],
        vec![],
        vec![],
    );

    let prog = lower(&ast);
    let proc = find_proc(&prog, "A_compute");

    assert_eq!(proc.block_order().len(), 1);
    assert_no_stack_traffic(proc);

    let instrs = non_comment_instrs(proc);
    assert_eq!(instrs.len(), 1, "expected a single division, got {instrs:?}");
    let Instr::BinaryOp { var, lhs, op: BinOp::Sdiv, rhs } = instrs[0] else {
        panic!("expected a division, got {:?}", instrs[0]);
    };
    assert_eq!((lhs, rhs), (&Operand::int(10), &Operand::int(2)));

    // the quotient flows straight into the return
    assert_eq!(
        proc.blocks[proc.entry()].unwrap_term(),
        &Term::Return(Operand::Var(*var))
    );
}

/// `int x; x = 5; while (0 < x) { x = x - 1; } return x;` as `A::count`.
fn loop_program() -> mjc::ast::Program {
    program(
        vec![class(
            "A",
            None,
            vec![],
            vec![method(
                "count",
                vec![],
                SrcTy::Int,
                vec![decl("x", SrcTy::Int)],
                vec![
                    Stmt::assign(Expr::local(0), Expr::int(5)),
                    Stmt::while_loop(
                        Expr::binary(Expr::int(0), BinaryOp::Lt, Expr::local(0)),
                        Stmt::assign(
                            Expr::local(0),
                            Expr::binary(Expr::local(0), BinaryOp::Sub, Expr::int(1)),
                        ),
                    ),
                    Stmt::ret(Expr::local(0)),
                ],
            )],
        )],
        vec![],
        vec![],
    )
}

#[test]
fn loop_variable_gets_exactly_one_phi_at_the_header() {
    let prog = lower(&loop_program());
    let proc = find_proc(&prog, "A_count");
    assert_no_stack_traffic(proc);
    assert_phi_complete(proc);

    let all_phis = phis(proc);
    assert_eq!(all_phis.len(), 1, "expected one phi for x at the loop header");

    let (bb, Instr::Phi { choices, .. }) = all_phis[0] else {
        unreachable!();
    };
    assert_eq!(label(proc, bb), "while_start");
    assert_eq!(choices.len(), 2);

    let choice_from = |block_label: &str| {
        choices
            .iter()
            .find(|choice| label(proc, choice.pred) == block_label)
            .unwrap_or_else(|| panic!("no choice from {block_label}"))
    };

    // the initial value arrives from the preheader, the decremented value
    // from the bottom of the loop body
    assert_eq!(choice_from("init").value, Operand::int(5));
    let decremented = choice_from("loop_body");
    assert!(matches!(decremented.value, Operand::Var(_)));

    let dec_var = decremented.value.as_var().unwrap();
    let body = block_by_label(proc, "loop_body");
    assert!(proc.blocks[body].instrs.iter().any(|instr| matches!(
        instr,
        Instr::BinaryOp { var, op: BinOp::Sub, .. } if *var == dec_var
    )));
}

#[test]
fn parameters_promote_without_phis() {
    // int add(int a, int b) { return a + b; }
    let ast = program(
        vec![class(
            "A",
            None,
            vec![],
            vec![method(
                "add",
                vec![decl("a", SrcTy::Int), decl("b", SrcTy::Int)],
                SrcTy::Int,
                vec![],
                vec![Stmt::ret(Expr::binary(
                    Expr::param(0),
                    BinaryOp::Add,
                    Expr::param(1),
                ))],
            )],
        )],
        vec![],
        vec![],
    );

    let prog = lower(&ast);
    let proc = find_proc(&prog, "A_add");
    assert_no_stack_traffic(proc);
    assert!(phis(proc).is_empty());

    // the addition reads the incoming parameters directly
    let instrs = non_comment_instrs(proc);
    assert_eq!(instrs.len(), 1, "expected a single addition, got {instrs:?}");
    let Instr::BinaryOp { lhs, op: BinOp::Add, rhs, .. } = instrs[0] else {
        panic!("expected an addition, got {:?}", instrs[0]);
    };
    assert_eq!(lhs, &Operand::Var(proc.params()[1]));
    assert_eq!(rhs, &Operand::Var(proc.params()[2]));
}

#[test]
fn branch_join_gets_a_complete_phi() {
    // bool b; int x; b = true; if (b) x = 1; else x = 2; println(x);
    let ast = program(
        vec![],
        vec![decl("b", SrcTy::Bool), decl("x", SrcTy::Int)],
        vec![
            Stmt::assign(Expr::local(0), Expr::bool_lit(true)),
            Stmt::if_else(
                Expr::local(0),
                Stmt::assign(Expr::local(1), Expr::int(1)),
                Stmt::assign(Expr::local(1), Expr::int(2)),
            ),
            Stmt::print(Expr::local(1)),
        ],
    );

    let prog = lower(&ast);
    let main = find_proc(&prog, "main");
    assert_no_stack_traffic(main);
    assert_phi_complete(main);

    let all_phis = phis(main);
    assert_eq!(all_phis.len(), 1);

    let (bb, Instr::Phi { choices, .. }) = all_phis[0] else {
        unreachable!();
    };
    assert_eq!(label(main, bb), "end_if");

    let mut values: Vec<_> = choices.iter().map(|choice| choice.value.clone()).collect();
    values.sort_by_key(|value| format!("{value:?}"));
    assert_eq!(values, [Operand::int(1), Operand::int(2)]);
}

#[test]
fn same_value_phi_is_pruned() {
    // both arms store the same constant, so no phi survives
    let ast = program(
        vec![],
        vec![decl("b", SrcTy::Bool), decl("x", SrcTy::Int)],
        vec![
            Stmt::assign(Expr::local(0), Expr::bool_lit(true)),
            Stmt::if_else(
                Expr::local(0),
                Stmt::assign(Expr::local(1), Expr::int(7)),
                Stmt::assign(Expr::local(1), Expr::int(7)),
            ),
            Stmt::print(Expr::local(1)),
        ],
    );

    let prog = lower(&ast);
    let main = find_proc(&prog, "main");

    assert!(phis(main).is_empty());

    // the use was rewritten to the single distinct value
    let prints: Vec<_> = instrs_in_order(main)
        .into_iter()
        .filter_map(|instr| match instr {
            Instr::Print { value } => Some(value.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(prints, [Operand::int(7)]);
}

#[test]
fn pruning_is_idempotent() {
    let ast = shapes();
    let mut prog = lower(&ast);

    let snapshot = |prog: &IrProgram| {
        prog.procs()
            .map(|(_, proc)| {
                proc.block_order()
                    .iter()
                    .map(|&bb| proc.blocks[bb].clone())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
    };

    let before = snapshot(&prog);

    for proc in prog.procs_mut() {
        ssa::prune_redundant_phis(proc);
    }

    assert_eq!(before, snapshot(&prog));
}

#[test]
fn escaping_alloca_is_not_promoted() {
    // hand-built: the slot address is passed to a call, so the slot must
    // survive as a real stack allocation
    let mut prog = IrProgram::new();

    let mut observe = Proc::new("observe", Ty::Int);
    observe.add_param("addr", Ty::ptr(Ty::Int));
    let entry = observe.new_block("init");
    observe.append_block(entry);
    observe.blocks[entry].terminate(Term::Return(Operand::int(0)));
    let observe_id = prog.add_proc(observe);

    let mut subject = Proc::new("subject", Ty::Int);
    let entry = subject.new_block("init");
    subject.append_block(entry);

    let slot = subject.fresh_var("slot", Ty::ptr(Ty::Int));
    let result = subject.fresh_var("observe_result", Ty::Int);
    let loaded = subject.fresh_var("loaded", Ty::Int);

    subject.blocks[entry].push(Instr::Alloca {
        var: slot,
        ty: Ty::Int,
    });
    subject.blocks[entry].push(Instr::Store {
        addr: slot.into(),
        value: Operand::int(1),
    });
    subject.blocks[entry].push(Instr::Call {
        var: result,
        callee: mjc::ir::value::Const::ProcRef(observe_id).into(),
        args: vec![slot.into()],
    });
    subject.blocks[entry].push(Instr::Load {
        var: loaded,
        addr: slot.into(),
    });
    subject.blocks[entry].terminate(Term::Return(loaded.into()));
    let subject_id = prog.add_proc(subject);

    ssa::transform_program(&mut prog);

    let subject = &prog[subject_id];
    let count = |pred: fn(&Instr) -> bool| count_instrs(subject, pred);

    assert_eq!(count(|instr| matches!(instr, Instr::Alloca { .. })), 1);
    assert_eq!(count(|instr| matches!(instr, Instr::Store { .. })), 1);
    assert_eq!(count(|instr| matches!(instr, Instr::Load { .. })), 1);
}

#[test]
fn transforming_an_already_transformed_procedure_is_stable() {
    let mut prog = lower(&loop_program());

    for proc in prog.procs_mut() {
        ssa::transform_proc(proc);
        ssa::prune_redundant_phis(proc);
    }

    for (_, proc) in prog.procs() {
        assert_phi_complete(proc);
    }

    // the loop phi is carried over, not duplicated or dropped
    let proc = find_proc(&prog, "A_count");
    assert_no_stack_traffic(proc);
    assert_eq!(phis(proc).len(), 1);
    assert_no_stack_traffic(find_proc(&prog, "construct_A"));
}

#[test]
fn whole_program_has_no_promotable_stack_traffic_left() {
    let ast = shapes();
    let prog = lower(&ast);

    for name in ["A_f", "B_f", "B_g", "C_h", "main"] {
        let proc = find_proc(&prog, name);
        assert_phi_complete(proc);

        // every load/store that survives addresses memory through a
        // computed pointer, never a promotable slot variable
        for instr in instrs_in_order(proc) {
            match instr {
                Instr::Load { addr, .. } | Instr::Store { addr, .. } => {
                    let var = addr.as_var().expect("load/store through a constant");
                    assert!(defined_by_instr(proc, var), "stack slot access survived");
                }
                _ => {}
            }
        }
    }
}

/// True when `var` is defined by a non-alloca instruction (a computed
/// address), false for surviving alloca slots.
fn defined_by_instr(proc: &Proc, var: Var) -> bool {
    instrs_in_order(proc).into_iter().any(|instr| {
        instr.def() == Some(var) && !matches!(instr, Instr::Alloca { .. })
    })
}
