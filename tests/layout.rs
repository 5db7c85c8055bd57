//! Class layout: field indices, vtable slots, vtable constants and
//! constructors.

mod common;

use pretty_assertions::assert_eq;

use mjc::ir::instr::{Instr, Term};
use mjc::ir::ty::Ty;
use mjc::ir::value::{Const, Operand};
use mjc::lower::{GlobalCtx, LowerConfig};

use common::*;

#[test]
fn field_indices_are_prefix_compatible() {
    let ast = shapes();
    let gctx = GlobalCtx::new(&ast, LowerConfig::default());

    // field 0 is the vtable pointer, user fields start at 1
    assert_eq!(gctx.layout.field_index(FIELD_A_X), 1);
    assert_eq!(gctx.layout.field_index(FIELD_B_Y), 2);
    assert_eq!(gctx.layout.field_index(FIELD_C_FLAG), 3);
}

#[test]
fn subclass_struct_extends_superclass_struct() {
    let ast = shapes();
    let gctx = GlobalCtx::new(&ast, LowerConfig::default());

    let (_, a) = gctx.prog.structs.get_by_name("A").unwrap();
    let (_, b) = gctx.prog.structs.get_by_name("B").unwrap();
    let (_, c) = gctx.prog.structs.get_by_name("C").unwrap();

    let names = |def: &mjc::ir::ty::StructDef| {
        def.fields()
            .iter()
            .map(|field| field.name.clone())
            .collect::<Vec<_>>()
    };

    assert_eq!(names(a), ["vtable", "A_x"]);
    assert_eq!(names(b), ["vtable", "A_x", "B_y"]);
    assert_eq!(names(c), ["vtable", "A_x", "B_y", "C_flag"]);

    // inherited fields keep their type, field for field
    assert_eq!(a.fields()[1], b.fields()[1]);
    assert_eq!(b.fields()[1..3], c.fields()[1..3]);
}

#[test]
fn overridden_method_reuses_its_slot() {
    let ast = shapes();
    let gctx = GlobalCtx::new(&ast, LowerConfig::default());

    assert_eq!(gctx.layout.method_slot(METHOD_A_F), 0);
    assert_eq!(gctx.layout.method_slot(METHOD_B_F), 0);
    assert_eq!(gctx.layout.method_slot(METHOD_B_G), 1);
    assert_eq!(gctx.layout.method_slot(METHOD_C_H), 2);
}

#[test]
fn vtable_structs_grow_by_suffix() {
    let ast = shapes();
    let gctx = GlobalCtx::new(&ast, LowerConfig::default());

    let slot_names = |class: &str| {
        let (_, def) = gctx
            .prog
            .structs
            .get_by_name(&format!("{class}_vtable"))
            .unwrap();

        def.fields()
            .iter()
            .map(|field| field.name.clone())
            .collect::<Vec<_>>()
    };

    assert_eq!(slot_names("A"), ["f"]);
    assert_eq!(slot_names("B"), ["f", "g"]);
    assert_eq!(slot_names("C"), ["f", "g", "h"]);
}

#[test]
fn override_narrows_the_slot_receiver_type() {
    let ast = shapes();
    let gctx = GlobalCtx::new(&ast, LowerConfig::default());

    let (_, b_vtable) = gctx.prog.structs.get_by_name("B_vtable").unwrap();
    let slot_ty = &b_vtable.fields()[0].ty;

    let Ty::Proc { params, .. } = slot_ty.pointee() else {
        panic!("vtable slot is not a procedure pointer: {slot_ty:?}");
    };

    assert_eq!(params[0], gctx.layout.instance_ptr_ty(CLASS_B));
}

#[test]
fn vtable_constant_dispatches_to_the_override() {
    let ast = shapes();
    let gctx = GlobalCtx::new(&ast, LowerConfig::default());
    let prog = &gctx.prog;

    let slot_f = gctx.layout.method_slot(METHOD_A_F);

    assert_eq!(entry_proc_name(prog, &vtable_entries(prog, "A")[slot_f]), "A_f");

    // B both overrides f and inherits nothing else from A, so its constant
    // must carry B_f at A's slot for f
    let b = vtable_entries(prog, "B");
    assert_eq!(entry_proc_name(prog, &b[slot_f]), "B_f");
    assert_eq!(entry_proc_name(prog, &b[1]), "B_g");

    // C inherits both f and g
    let c = vtable_entries(prog, "C");
    assert_eq!(entry_proc_name(prog, &c[slot_f]), "B_f");
    assert_eq!(entry_proc_name(prog, &c[1]), "B_g");
    assert_eq!(entry_proc_name(prog, &c[2]), "C_h");
}

#[test]
fn constructor_allocates_initializes_and_returns() {
    let ast = shapes();
    let prog = lower(&ast);
    let ctor = find_proc(&prog, "construct_B");

    assert_eq!(ctor.block_order().len(), 1);
    let entry = &ctor.blocks[ctor.entry()];

    // vtable pointer (8) + A_x (4) + B_y (4)
    let Instr::Alloc { size, .. } = &entry.instrs[0] else {
        panic!("constructor does not start with a heap allocation");
    };
    assert_eq!(*size, Operand::int(16));

    assert!(matches!(&entry.instrs[1], Instr::Bitcast { .. }));

    // two zero-initializing field stores plus the vtable store
    let stores: Vec<_> = entry
        .instrs
        .iter()
        .filter_map(|instr| match instr {
            Instr::Store { value, .. } => Some(value),
            _ => None,
        })
        .collect();

    assert_eq!(
        stores,
        [
            &Operand::int(0),
            &Operand::int(0),
            &Operand::Const(Const::GlobalRef(vtable_global_id(&prog, "vtable_B"))),
        ]
    );

    assert!(matches!(entry.unwrap_term(), Term::Return(_)));
}

#[test]
fn method_procs_take_the_receiver_first() {
    let ast = shapes();
    let prog = lower(&ast);
    let proc = find_proc(&prog, "B_f");

    assert_eq!(proc.params().len(), 2);

    let this_ty = proc.var_ty(proc.params()[0]);
    let Ty::Ptr(pointee) = this_ty else {
        panic!("receiver is not a pointer: {this_ty:?}");
    };
    assert!(matches!(**pointee, Ty::Struct(_)));
    assert_eq!(proc.var_ty(proc.params()[1]), &Ty::Int);
}

fn vtable_global_id(prog: &mjc::ir::prog::Program, name: &str) -> mjc::ir::prog::GlobalId {
    prog.globals()
        .find(|(_, global)| global.name == name)
        .map(|(id, _)| id)
        .unwrap_or_else(|| panic!("no global named {name}"))
}
