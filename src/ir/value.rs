use slotmap::new_key_type;

use crate::ice;

use super::proc::ProcId;
use super::prog::GlobalId;
use super::ty::{StructId, Ty};

new_key_type! {
    /// A variable in a procedure's variable arena: a temporary or a
    /// parameter. Globals are referenced through [`Const::GlobalRef`].
    pub struct Var;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarData {
    pub name: String,
    pub ty: Ty,
}

/// A compile-time constant. The aggregate variants only ever appear as
/// global initializers (vtable constants).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Const {
    Int(i32),
    Bool(bool),
    /// A typed null pointer; the type is the full pointer type.
    Null(Ty),
    ProcRef(ProcId),
    GlobalRef(GlobalId),
    Struct(StructId, Vec<Const>),
}

impl Const {
    /// The all-zeros value of a type: 0, false, or a typed null. Used both
    /// as the default for freshly constructed object fields and as the
    /// placeholder for values that can never be observed at run time
    /// (reads on unreachable paths, fully self-referential phis).
    pub fn zero_of(ty: &Ty) -> Const {
        match ty {
            Ty::Int => Const::Int(0),
            Ty::Bool => Const::Bool(false),
            Ty::Ptr(_) => Const::Null(ty.clone()),
            _ => ice!("no zero value for type {:?}", ty),
        }
    }
}

/// An instruction operand. Operands are plain values: cloning one never
/// aliases mutable state, and the same logical value inserted into two
/// instructions is two independent operands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Const(Const),
    Var(Var),
}

impl Operand {
    pub fn int(value: i32) -> Operand {
        Operand::Const(Const::Int(value))
    }

    pub fn bool(value: bool) -> Operand {
        Operand::Const(Const::Bool(value))
    }

    pub fn null(ptr_ty: Ty) -> Operand {
        Operand::Const(Const::Null(ptr_ty))
    }

    pub fn as_var(&self) -> Option<Var> {
        match *self {
            Operand::Var(var) => Some(var),
            Operand::Const(_) => None,
        }
    }

    pub fn as_const_int(&self) -> Option<i32> {
        match *self {
            Operand::Const(Const::Int(value)) => Some(value),
            _ => None,
        }
    }
}

impl From<Const> for Operand {
    fn from(value: Const) -> Self {
        Operand::Const(value)
    }
}

impl From<Var> for Operand {
    fn from(var: Var) -> Self {
        Operand::Var(var)
    }
}
