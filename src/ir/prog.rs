use std::ops::{Index, IndexMut};

use crate::ice;

use super::proc::{Proc, ProcId};
use super::ty::{Structs, Ty};
use super::value::{Const, Operand};

/// A handle to a global in the program's ordered global list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub(crate) usize);

/// A global constant (vtable data, in practice).
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub ty: Ty,
    pub constant: bool,
    pub init: Const,
}

/// The finished compilation unit: ordered struct types, ordered globals,
/// ordered procedures. All three lists are append-only during lowering.
#[derive(Debug, Default)]
pub struct Program {
    pub structs: Structs,
    globals: Vec<Global>,
    procs: Vec<Proc>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_global(&mut self, global: Global) -> GlobalId {
        let id = GlobalId(self.globals.len());
        self.globals.push(global);

        id
    }

    pub fn add_proc(&mut self, proc: Proc) -> ProcId {
        let id = ProcId(self.procs.len());
        self.procs.push(proc);

        id
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &Global)> {
        self.globals
            .iter()
            .enumerate()
            .map(|(index, global)| (GlobalId(index), global))
    }

    pub fn procs(&self) -> impl Iterator<Item = (ProcId, &Proc)> {
        self.procs
            .iter()
            .enumerate()
            .map(|(index, proc)| (ProcId(index), proc))
    }

    pub fn procs_mut(&mut self) -> impl Iterator<Item = &mut Proc> {
        self.procs.iter_mut()
    }

    pub fn get_proc_by_name(&self, name: &str) -> Option<(ProcId, &Proc)> {
        self.procs()
            .find(|(_, proc)| proc.name == name)
    }

    /// The type of a procedure value: a pointer to the procedure type built
    /// from the parameter and return types. This is what a vtable slot
    /// holds and what a `Call` callee must have.
    pub fn proc_ptr_ty(&self, id: ProcId) -> Ty {
        let proc = &self[id];
        let params = proc
            .params()
            .iter()
            .map(|&param| proc.var_ty(param).clone())
            .collect();

        Ty::ptr(Ty::proc(params, proc.ret_ty.clone()))
    }

    /// The static type of an operand in the context of `proc`.
    pub fn operand_ty(&self, proc: &Proc, operand: &Operand) -> Ty {
        match operand {
            Operand::Var(var) => proc.var_ty(*var).clone(),
            Operand::Const(constant) => self.const_ty(constant),
        }
    }

    pub fn const_ty(&self, constant: &Const) -> Ty {
        match constant {
            Const::Int(_) => Ty::Int,
            Const::Bool(_) => Ty::Bool,
            Const::Null(ptr_ty) => ptr_ty.clone(),
            Const::ProcRef(id) => self.proc_ptr_ty(*id),
            Const::GlobalRef(id) => Ty::ptr(self[*id].ty.clone()),
            Const::Struct(id, _) => Ty::Struct(*id),
        }
    }

    /// The result type of a `GetElementPtr` over `base_ty` with the given
    /// indices. The first index steps over the base pointer itself; the
    /// remaining indices descend into struct fields (constant indices only)
    /// and array elements.
    pub fn gep_result_ty(&self, base_ty: &Ty, indices: &[Operand]) -> Ty {
        if indices.is_empty() {
            ice!("GetElementPtr requires at least one index");
        }

        let mut current = base_ty.pointee().clone();

        for index in &indices[1..] {
            current = match current {
                Ty::Struct(id) => {
                    let Some(field_index) = index.as_const_int() else {
                        ice!(
                            "GetElementPtr into struct {} with a non-constant index",
                            self.structs.name(id)
                        );
                    };

                    match self.structs.fields(id).get(field_index as usize) {
                        Some(field) => field.ty.clone(),
                        None => ice!(
                            "GetElementPtr index {} out of range for struct {}",
                            field_index,
                            self.structs.name(id)
                        ),
                    }
                }

                Ty::Array(elem, _) => *elem,

                other => ice!("GetElementPtr cannot descend into {:?}", other),
            };
        }

        Ty::ptr(current)
    }
}

impl Index<ProcId> for Program {
    type Output = Proc;

    fn index(&self, id: ProcId) -> &Self::Output {
        match self.procs.get(id.0) {
            Some(proc) => proc,
            None => ice!("unknown procedure id {:?}", id),
        }
    }
}

impl IndexMut<ProcId> for Program {
    fn index_mut(&mut self, id: ProcId) -> &mut Self::Output {
        match self.procs.get_mut(id.0) {
            Some(proc) => proc,
            None => ice!("unknown procedure id {:?}", id),
        }
    }
}

impl Index<GlobalId> for Program {
    type Output = Global;

    fn index(&self, id: GlobalId) -> &Self::Output {
        match self.globals.get(id.0) {
            Some(global) => global,
            None => ice!("unknown global id {:?}", id),
        }
    }
}
