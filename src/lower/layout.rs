//! Class layout: instance structs, vtables and constructors.
//!
//! Layout runs in three passes over the class list before any body is
//! lowered. Pass 1 declares a struct handle per class (instance struct and
//! vtable struct), so the types of any two classes may reference each other
//! regardless of declaration order. Pass 2 creates one procedure shell per
//! declared method. Pass 3 computes vtable slots and instance field
//! indices, emits the vtable constants, and creates the constructor shells.
//!
//! Slots and field indices are assigned by a recursive superclass-first
//! walk, which makes a subclass layout a prefix extension of its superclass
//! layout: an inherited field keeps its index, an overridden method keeps
//! its slot. That prefix property is what lets a supertyped pointer invoke
//! an overridden implementation through a fixed-offset vtable load.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::debug;

use crate::ast::{self, ClassId, FieldRef, MethodRef, SrcTy};
use crate::ice;
use crate::ir::instr::Term;
use crate::ir::proc::{Proc, ProcId};
use crate::ir::prog::{Global, GlobalId, Program};
use crate::ir::ty::{StructField, StructId, Ty};
use crate::ir::value::{Const, Operand};

use super::array_gen::ArrayRuntime;
use super::{GlobalCtx, LowerCtx};

/// The read-only layout tables consulted by body lowering.
pub struct ClassTable {
    array_struct: StructId,
    instance_structs: Vec<StructId>,
    vtable_structs: Vec<StructId>,
    vtable_globals: Vec<GlobalId>,
    constructors: Vec<ProcId>,
    field_index: HashMap<FieldRef, usize>,
    method_slot: HashMap<MethodRef, usize>,
    method_proc: HashMap<MethodRef, ProcId>,
}

impl ClassTable {
    /// Builds every class shape. Bodies are lowered later, against the
    /// finished table.
    pub fn build(ast: &ast::Program, prog: &mut Program, array: &ArrayRuntime) -> ClassTable {
        let mut table = ClassTable {
            array_struct: array.struct_id,
            instance_structs: vec![],
            vtable_structs: vec![],
            vtable_globals: vec![],
            constructors: vec![],
            field_index: HashMap::new(),
            method_slot: HashMap::new(),
            method_proc: HashMap::new(),
        };

        // pass 1: struct handles
        for class in &ast.classes {
            table
                .instance_structs
                .push(prog.structs.declare(class.name.clone()));
            table
                .vtable_structs
                .push(prog.structs.declare(format!("{}_vtable", class.name)));
        }

        // pass 2: method procedure shells
        for (index, class) in ast.classes.iter().enumerate() {
            let class_id = ClassId(index);

            for (method_index, method) in class.methods.iter().enumerate() {
                let mut proc = Proc::new(
                    format!("{}_{}", class.name, method.name),
                    table.lower_ty(method.ret_ty),
                );
                proc.add_param("this", table.instance_ptr_ty(class_id));

                for param in &method.params {
                    proc.add_param(param.name.clone(), table.lower_ty(param.ty));
                }

                let proc_id = prog.add_proc(proc);
                table.method_proc.insert(
                    MethodRef {
                        class: class_id,
                        method: method_index,
                    },
                    proc_id,
                );
            }
        }

        // pass 3: vtable slots and constants, field indices, constructor
        // shells
        for (index, class) in ast.classes.iter().enumerate() {
            let class_id = ClassId(index);
            debug!(class = %class.name, "lowering class shape");

            table.define_vtable(ast, prog, class_id);
            table.emit_vtable_constant(ast, prog, class_id);
            table.define_instance_struct(ast, prog, class_id);

            let constructor = Proc::new(
                format!("construct_{}", class.name),
                table.instance_ptr_ty(class_id),
            );
            table.constructors.push(prog.add_proc(constructor));
        }

        table
    }

    fn define_vtable(&mut self, ast: &ast::Program, prog: &mut Program, class: ClassId) {
        let mut fields = vec![];
        let mut slots = IndexMap::new();
        self.add_vtable_slots(ast, prog, class, &mut fields, &mut slots);

        prog.structs.define(self.vtable_struct(class), fields);
    }

    /// Fills in the vtable field list for `walk` and all its ancestors,
    /// ancestors first. An override replaces the inherited slot in place
    /// (narrowing the receiver type to the overriding class); a newly
    /// introduced method takes the next free slot.
    fn add_vtable_slots(
        &mut self,
        ast: &ast::Program,
        prog: &Program,
        walk: ClassId,
        fields: &mut Vec<StructField>,
        slots: &mut IndexMap<String, usize>,
    ) {
        if let Some(superclass) = ast[walk].superclass {
            self.add_vtable_slots(ast, prog, superclass, fields, slots);
        }

        for (index, method) in ast[walk].methods.iter().enumerate() {
            let method_ref = MethodRef {
                class: walk,
                method: index,
            };
            let proc_id = self.method_proc(method_ref);
            let field = StructField::new(method.name.clone(), prog.proc_ptr_ty(proc_id));

            let slot = match slots.get(&method.name) {
                Some(&slot) => {
                    fields[slot] = field;
                    slot
                }

                None => {
                    let slot = fields.len();
                    slots.insert(method.name.clone(), slot);
                    fields.push(field);
                    slot
                }
            };

            self.method_slot.insert(method_ref, slot);
        }
    }

    fn emit_vtable_constant(&mut self, ast: &ast::Program, prog: &mut Program, class: ClassId) {
        let mut entries = vec![];
        self.add_vtable_entries(ast, class, &mut entries);

        let vtable_struct = self.vtable_struct(class);
        let global_id = prog.add_global(Global {
            name: format!("vtable_{}", ast[class].name),
            ty: Ty::Struct(vtable_struct),
            constant: true,
            init: Const::Struct(vtable_struct, entries),
        });
        self.vtable_globals.push(global_id);
    }

    /// Fills the vtable constant superclass-first, overwriting overridden
    /// slots with the subclass procedure.
    fn add_vtable_entries(&self, ast: &ast::Program, walk: ClassId, entries: &mut Vec<Const>) {
        if let Some(superclass) = ast[walk].superclass {
            self.add_vtable_entries(ast, superclass, entries);
        }

        for index in 0..ast[walk].methods.len() {
            let method_ref = MethodRef {
                class: walk,
                method: index,
            };
            let slot = self.method_slot(method_ref);
            let entry = Const::ProcRef(self.method_proc(method_ref));

            if slot < entries.len() {
                entries[slot] = entry;
            } else {
                debug_assert_eq!(slot, entries.len());
                entries.push(entry);
            }
        }
    }

    fn define_instance_struct(&mut self, ast: &ast::Program, prog: &mut Program, class: ClassId) {
        // field 0 is always the vtable pointer
        let mut fields = vec![StructField::new(
            "vtable",
            Ty::ptr(Ty::Struct(self.vtable_struct(class))),
        )];
        self.add_instance_fields(ast, class, &mut fields);

        prog.structs.define(self.instance_struct(class), fields);
    }

    fn add_instance_fields(
        &mut self,
        ast: &ast::Program,
        walk: ClassId,
        fields: &mut Vec<StructField>,
    ) {
        if let Some(superclass) = ast[walk].superclass {
            self.add_instance_fields(ast, superclass, fields);
        }

        for (index, field) in ast[walk].fields.iter().enumerate() {
            let field_ref = FieldRef {
                class: walk,
                field: index,
            };
            self.field_index.insert(field_ref, fields.len());
            fields.push(StructField::new(
                format!("{}_{}", ast[walk].name, field.name),
                self.lower_ty(field.ty),
            ));
        }
    }

    pub fn lower_ty(&self, ty: SrcTy) -> Ty {
        match ty {
            SrcTy::Int => Ty::Int,
            SrcTy::Bool => Ty::Bool,
            SrcTy::IntArray => Ty::ptr(Ty::Struct(self.array_struct)),
            SrcTy::Class(class) => self.instance_ptr_ty(class),
        }
    }

    pub fn instance_struct(&self, class: ClassId) -> StructId {
        match self.instance_structs.get(class.0) {
            Some(&id) => id,
            None => ice!("no instance struct for class {:?}", class),
        }
    }

    pub fn instance_ptr_ty(&self, class: ClassId) -> Ty {
        Ty::ptr(Ty::Struct(self.instance_struct(class)))
    }

    pub fn vtable_struct(&self, class: ClassId) -> StructId {
        match self.vtable_structs.get(class.0) {
            Some(&id) => id,
            None => ice!("no vtable struct for class {:?}", class),
        }
    }

    pub fn vtable_global(&self, class: ClassId) -> GlobalId {
        match self.vtable_globals.get(class.0) {
            Some(&id) => id,
            None => ice!("no vtable constant for class {:?}", class),
        }
    }

    pub fn constructor(&self, class: ClassId) -> ProcId {
        match self.constructors.get(class.0) {
            Some(&id) => id,
            None => ice!("no constructor for class {:?}", class),
        }
    }

    pub fn field_index(&self, field: FieldRef) -> usize {
        match self.field_index.get(&field) {
            Some(&index) => index,
            None => ice!("no field index for {:?}", field),
        }
    }

    pub fn method_slot(&self, method: MethodRef) -> usize {
        match self.method_slot.get(&method) {
            Some(&slot) => slot,
            None => ice!("no vtable slot for {:?}", method),
        }
    }

    pub fn method_proc(&self, method: MethodRef) -> ProcId {
        match self.method_proc.get(&method) {
            Some(&id) => id,
            None => ice!("no procedure for {:?}", method),
        }
    }
}

/// Emits the body of every constructor: heap-allocate the instance,
/// default-initialize every field, install the vtable pointer, return.
pub fn generate_constructors(gctx: &mut GlobalCtx<'_>) {
    for index in 0..gctx.ast.classes.len() {
        generate_constructor(gctx, ClassId(index));
    }
}

fn generate_constructor(gctx: &mut GlobalCtx<'_>, class: ClassId) {
    let ast = gctx.ast;
    debug!(class = %ast[class].name, "generating constructor");

    let proc_id = gctx.layout.constructor(class);
    let size = Ty::Struct(gctx.layout.instance_struct(class)).size_in_bytes(&gctx.prog.structs);
    let instance_ty = gctx.layout.instance_ptr_ty(class);

    let mut ctx = LowerCtx::new(gctx, proc_id, Some(class));
    let raw = ctx.alloc("alloc_res", Operand::int(size as i32));
    let result = ctx.bitcast("res", instance_ty, raw);

    for field in collect_fields(ast, class) {
        let addr = ctx.field_addr(result.clone(), field);
        let field_ty = ctx.lower_ty(ast.field(field).ty);
        ctx.store(addr, Const::zero_of(&field_ty).into());
    }

    let vtable_addr = ctx.gep(
        "vtable_addr",
        result.clone(),
        vec![Operand::int(0), Operand::int(0)],
    );
    let vtable = ctx.gctx.layout.vtable_global(class);
    ctx.store(vtable_addr, Const::GlobalRef(vtable).into());

    ctx.terminate(Term::Return(result));
}

/// All fields of a class, inherited first, in declaration order.
fn collect_fields(ast: &ast::Program, class: ClassId) -> Vec<FieldRef> {
    fn walk(ast: &ast::Program, class: ClassId, out: &mut Vec<FieldRef>) {
        if let Some(superclass) = ast[class].superclass {
            walk(ast, superclass, out);
        }

        for index in 0..ast[class].fields.len() {
            out.push(FieldRef {
                class,
                field: index,
            });
        }
    }

    let mut out = vec![];
    walk(ast, class, &mut out);

    out
}

impl LowerCtx<'_, '_> {
    /// The address of `field` relative to an object pointer.
    pub fn field_addr(&mut self, obj: Operand, field: FieldRef) -> Operand {
        let index = self.gctx.layout.field_index(field);
        let name = format!("addr_{}", self.ast().field(field).name);

        self.gep(
            &name,
            obj,
            vec![Operand::int(0), Operand::int(index as i32)],
        )
    }

    /// Loads the procedure pointer for `method` from the receiver's vtable
    /// at the method's fixed slot index.
    pub fn vtable_proc(&mut self, recv: Operand, method: MethodRef) -> Operand {
        let vtable_addr = self.gep(
            "vtable_addr",
            recv,
            vec![Operand::int(0), Operand::int(0)],
        );
        let vtable = self.load("vtable", vtable_addr);

        let slot = self.gctx.layout.method_slot(method);
        let slot_addr = self.gep(
            "proc_addr_ptr",
            vtable,
            vec![Operand::int(0), Operand::int(slot as i32)],
        );

        self.load("proc_addr", slot_addr)
    }
}
