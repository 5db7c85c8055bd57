//! Shared AST builders and IR query helpers for the integration tests.

#![allow(dead_code)]

use mjc::ast::{
    ClassDecl, ClassId, Expr, FieldRef, MainDecl, MethodDecl, MethodRef, Program, SrcTy, Stmt,
    VarDecl,
};
use mjc::ir::bb::Block;
use mjc::ir::instr::{Instr, Term};
use mjc::ir::proc::Proc;
use mjc::ir::prog::Program as IrProgram;
use mjc::ir::value::Const;
use mjc::lower::{lower_program, LowerConfig};

pub fn decl(name: &str, ty: SrcTy) -> VarDecl {
    VarDecl {
        name: name.to_owned(),
        ty,
    }
}

pub fn method(
    name: &str,
    params: Vec<VarDecl>,
    ret_ty: SrcTy,
    locals: Vec<VarDecl>,
    body: Vec<Stmt>,
) -> MethodDecl {
    MethodDecl {
        name: name.to_owned(),
        params,
        ret_ty,
        locals,
        body,
    }
}

pub fn class(
    name: &str,
    superclass: Option<ClassId>,
    fields: Vec<VarDecl>,
    methods: Vec<MethodDecl>,
) -> ClassDecl {
    ClassDecl {
        name: name.to_owned(),
        superclass,
        fields,
        methods,
    }
}

pub fn program(classes: Vec<ClassDecl>, main_locals: Vec<VarDecl>, main_body: Vec<Stmt>) -> Program {
    Program {
        classes,
        main: MainDecl {
            locals: main_locals,
            body: main_body,
        },
    }
}

/// Lowers with statement comments disabled, which most structural asserts
/// want.
pub fn lower(ast: &Program) -> IrProgram {
    lower_program(
        ast,
        LowerConfig {
            emit_statement_comments: false,
        },
    )
}

pub fn lower_default(ast: &Program) -> IrProgram {
    lower_program(ast, LowerConfig::default())
}

pub const CLASS_A: ClassId = ClassId(0);
pub const CLASS_B: ClassId = ClassId(1);
pub const CLASS_C: ClassId = ClassId(2);

pub const FIELD_A_X: FieldRef = FieldRef {
    class: CLASS_A,
    field: 0,
};
pub const FIELD_B_Y: FieldRef = FieldRef {
    class: CLASS_B,
    field: 0,
};
pub const FIELD_C_FLAG: FieldRef = FieldRef {
    class: CLASS_C,
    field: 0,
};

pub const METHOD_A_F: MethodRef = MethodRef {
    class: CLASS_A,
    method: 0,
};
pub const METHOD_B_F: MethodRef = MethodRef {
    class: CLASS_B,
    method: 0,
};
pub const METHOD_B_G: MethodRef = MethodRef {
    class: CLASS_B,
    method: 1,
};
pub const METHOD_C_H: MethodRef = MethodRef {
    class: CLASS_C,
    method: 0,
};

/// A three-level hierarchy:
///
/// ```text
/// class A           { int x;     int f(int d) { return x + d; } }
/// class B extends A { int y;     int f(int d) { return y - d; }
///                                int g()      { return 0; } }
/// class C extends B { bool flag; int h()      { return 1; } }
/// ```
///
/// with the entry point
///
/// ```text
/// A a; int r;
/// a = new B();
/// r = a.f(5);
/// println(r);
/// ```
pub fn shapes() -> Program {
    use mjc::ast::BinaryOp;

    let class_a = class(
        "A",
        None,
        vec![decl("x", SrcTy::Int)],
        vec![method(
            "f",
            vec![decl("d", SrcTy::Int)],
            SrcTy::Int,
            vec![],
            vec![Stmt::ret(Expr::binary(
                Expr::field_var(FIELD_A_X),
                BinaryOp::Add,
                Expr::param(0),
            ))],
        )],
    );

    let class_b = class(
        "B",
        Some(CLASS_A),
        vec![decl("y", SrcTy::Int)],
        vec![
            method(
                "f",
                vec![decl("d", SrcTy::Int)],
                SrcTy::Int,
                vec![],
                vec![Stmt::ret(Expr::binary(
                    Expr::field_var(FIELD_B_Y),
                    BinaryOp::Sub,
                    Expr::param(0),
                ))],
            ),
            method("g", vec![], SrcTy::Int, vec![], vec![Stmt::ret(Expr::int(0))]),
        ],
    );

    let class_c = class(
        "C",
        Some(CLASS_B),
        vec![decl("flag", SrcTy::Bool)],
        vec![method(
            "h",
            vec![],
            SrcTy::Int,
            vec![],
            vec![Stmt::ret(Expr::int(1))],
        )],
    );

    program(
        vec![class_a, class_b, class_c],
        vec![decl("a", SrcTy::Class(CLASS_A)), decl("r", SrcTy::Int)],
        vec![
            Stmt::assign(Expr::local(0), Expr::new_object(CLASS_B)),
            Stmt::assign(
                Expr::local(1),
                Expr::call(Expr::local(0), METHOD_A_F, vec![Expr::int(5)]),
            ),
            Stmt::print(Expr::local(1)),
        ],
    )
}

pub fn find_proc<'a>(prog: &'a IrProgram, name: &str) -> &'a Proc {
    match prog.get_proc_by_name(name) {
        Some((_, proc)) => proc,
        None => panic!("no procedure named {name}"),
    }
}

pub fn label<'a>(proc: &'a Proc, bb: Block) -> &'a str {
    &proc.blocks[bb].label
}

pub fn block_by_label(proc: &Proc, label: &str) -> Block {
    let mut found = proc
        .block_order()
        .iter()
        .copied()
        .filter(|&bb| proc.blocks[bb].label == label);

    match (found.next(), found.next()) {
        (Some(bb), None) => bb,
        (None, _) => panic!("no block labeled {label} in {}", proc.name),
        (Some(_), Some(_)) => panic!("several blocks labeled {label} in {}", proc.name),
    }
}

/// All instructions of the scheduled blocks, in block order.
pub fn instrs_in_order<'a>(proc: &'a Proc) -> Vec<&'a Instr> {
    proc.block_order()
        .iter()
        .flat_map(|&bb| proc.blocks[bb].instrs.iter())
        .collect()
}

pub fn non_comment_instrs<'a>(proc: &'a Proc) -> Vec<&'a Instr> {
    instrs_in_order(proc)
        .into_iter()
        .filter(|instr| !matches!(instr, Instr::Comment(_)))
        .collect()
}

pub fn count_instrs(proc: &Proc, pred: impl Fn(&Instr) -> bool) -> usize {
    instrs_in_order(proc)
        .into_iter()
        .filter(|instr| pred(instr))
        .count()
}

/// The messages of all halt terminators, in block order.
pub fn halt_messages(proc: &Proc) -> Vec<String> {
    proc.block_order()
        .iter()
        .filter_map(|&bb| match proc.blocks[bb].term() {
            Some(Term::Halt(message)) => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// Every phi instruction with its containing block.
pub fn phis<'a>(proc: &'a Proc) -> Vec<(Block, &'a Instr)> {
    proc.block_order()
        .iter()
        .flat_map(|&bb| {
            proc.blocks[bb]
                .instrs
                .iter()
                .filter(|instr| matches!(instr, Instr::Phi { .. }))
                .map(move |instr| (bb, instr))
        })
        .collect()
}

/// The name of the procedure a vtable entry points at.
pub fn entry_proc_name<'a>(prog: &'a IrProgram, entry: &Const) -> &'a str {
    match entry {
        Const::ProcRef(id) => &prog[*id].name,
        other => panic!("vtable entry is not a procedure reference: {other:?}"),
    }
}

/// The vtable constant entries of a class.
pub fn vtable_entries<'a>(prog: &'a IrProgram, class_name: &str) -> &'a [Const] {
    let name = format!("vtable_{class_name}");
    let global = prog
        .globals()
        .map(|(_, global)| global)
        .find(|global| global.name == name)
        .unwrap_or_else(|| panic!("no global named {name}"));

    match &global.init {
        Const::Struct(_, entries) => entries,
        other => panic!("vtable initializer is not a struct constant: {other:?}"),
    }
}
