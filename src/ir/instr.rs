use super::bb::Block;
use super::ty::Ty;
use super::value::{Operand, Var};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Signed division. The division-by-zero and overflow guards are the
    /// lowering's responsibility; the instruction itself is unguarded.
    Sdiv,
    /// Signed less-than.
    Slt,
    Eq,
    And,
    Or,
}

impl BinOp {
    pub fn result_ty(&self) -> Ty {
        match self {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Sdiv => Ty::Int,
            BinOp::Slt | BinOp::Eq | BinOp::And | BinOp::Or => Ty::Bool,
        }
    }
}

/// One phi input: the value the phi takes when control arrives from `pred`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiChoice {
    pub pred: Block,
    pub value: Operand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    /// Reserves a stack slot for `ty`; `var` holds its address.
    Alloca { var: Var, ty: Ty },
    Load { var: Var, addr: Operand },
    Store { addr: Operand, value: Operand },
    BinaryOp { var: Var, lhs: Operand, op: BinOp, rhs: Operand },
    GetElementPtr { var: Var, base: Operand, indices: Vec<Operand> },
    Bitcast { var: Var, ty: Ty, value: Operand },
    /// Heap allocation of `size` bytes; `var` is a byte pointer. The
    /// generated program never frees.
    Alloc { var: Var, size: Operand },
    Call { var: Var, callee: Operand, args: Vec<Operand> },
    Print { value: Operand },
    Comment(String),
    /// Only valid after SSA construction. Carries one choice per
    /// predecessor of its containing block.
    Phi { var: Var, ty: Ty, choices: Vec<PhiChoice> },
}

impl Instr {
    /// The variable this instruction defines, if any.
    pub fn def(&self) -> Option<Var> {
        match *self {
            Instr::Alloca { var, .. }
            | Instr::Load { var, .. }
            | Instr::BinaryOp { var, .. }
            | Instr::GetElementPtr { var, .. }
            | Instr::Bitcast { var, .. }
            | Instr::Alloc { var, .. }
            | Instr::Call { var, .. }
            | Instr::Phi { var, .. } => Some(var),

            Instr::Store { .. } | Instr::Print { .. } | Instr::Comment(_) => None,
        }
    }

    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Instr::Alloca { .. } | Instr::Comment(_) => vec![],
            Instr::Load { addr, .. } => vec![addr],
            Instr::Store { addr, value } => vec![addr, value],
            Instr::BinaryOp { lhs, rhs, .. } => vec![lhs, rhs],
            Instr::GetElementPtr { base, indices, .. } => {
                let mut operands = vec![base];
                operands.extend(indices);
                operands
            }
            Instr::Bitcast { value, .. } => vec![value],
            Instr::Alloc { size, .. } => vec![size],
            Instr::Call { callee, args, .. } => {
                let mut operands = vec![callee];
                operands.extend(args);
                operands
            }
            Instr::Print { value } => vec![value],
            Instr::Phi { choices, .. } => choices.iter().map(|choice| &choice.value).collect(),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Instr::Alloca { .. } | Instr::Comment(_) => vec![],
            Instr::Load { addr, .. } => vec![addr],
            Instr::Store { addr, value } => vec![addr, value],
            Instr::BinaryOp { lhs, rhs, .. } => vec![lhs, rhs],
            Instr::GetElementPtr { base, indices, .. } => {
                let mut operands = vec![base];
                operands.extend(indices);
                operands
            }
            Instr::Bitcast { value, .. } => vec![value],
            Instr::Alloc { size, .. } => vec![size],
            Instr::Call { callee, args, .. } => {
                let mut operands = vec![callee];
                operands.extend(args);
                operands
            }
            Instr::Print { value } => vec![value],
            Instr::Phi { choices, .. } => {
                choices.iter_mut().map(|choice| &mut choice.value).collect()
            }
        }
    }
}

/// A block terminator. Exactly one per scheduled block, always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Jump(Block),
    Branch { cond: Operand, on_true: Block, on_false: Block },
    Return(Operand),
    ReturnVoid,
    /// Abnormal termination of the generated program. A reached `Halt`
    /// prints the message to stderr and exits with status 1, which
    /// downstream harnesses use to tell expected failures apart from a
    /// normal return out of `main`.
    Halt(String),
}

impl Term {
    pub fn branch(cond: impl Into<Operand>, on_true: Block, on_false: Block) -> Term {
        Term::Branch {
            cond: cond.into(),
            on_true,
            on_false,
        }
    }

    pub fn successors(&self) -> Vec<Block> {
        match *self {
            Term::Jump(target) => vec![target],
            Term::Branch { on_true, on_false, .. } => vec![on_true, on_false],
            Term::Return(_) | Term::ReturnVoid | Term::Halt(_) => vec![],
        }
    }

    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Term::Branch { cond, .. } => vec![cond],
            Term::Return(value) => vec![value],
            Term::Jump(_) | Term::ReturnVoid | Term::Halt(_) => vec![],
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Term::Branch { cond, .. } => vec![cond],
            Term::Return(value) => vec![value],
            Term::Jump(_) | Term::ReturnVoid | Term::Halt(_) => vec![],
        }
    }
}
