//! The type-checked AST handed to the lowering pipeline.
//!
//! This is the interface to the front end: every variable use, field access
//! and method call already carries a resolved declaration reference, and
//! `null` literals carry their checker-assigned static type. The core
//! performs no name or type resolution of its own and trusts these bindings.

use std::ops::Index;

use crate::ice;
use crate::position::Pos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub usize);

/// A field reference resolved to its *declaring* class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: ClassId,
    pub field: usize,
}

/// A method reference resolved to its *declaring* class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: ClassId,
    pub method: usize,
}

/// Source-level types, fully resolved by the checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SrcTy {
    Int,
    Bool,
    IntArray,
    Class(ClassId),
}

#[derive(Debug, Clone)]
pub struct Program {
    pub classes: Vec<ClassDecl>,
    pub main: MainDecl,
}

/// The program entry point: a statement block with its own locals.
#[derive(Debug, Clone)]
pub struct MainDecl {
    pub locals: Vec<VarDecl>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: String,
    pub superclass: Option<ClassId>,
    pub fields: Vec<VarDecl>,
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: SrcTy,
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<VarDecl>,
    pub ret_ty: SrcTy,
    /// All locals of the body, hoisted by the front end; `LocalId` indexes
    /// into this list regardless of block nesting.
    pub locals: Vec<VarDecl>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Block(Vec<Stmt>),
    /// Declares a local. Emits no code on its own; storage is allocated in
    /// the procedure entry before statement translation begins.
    VarDecl(LocalId),
    Assign { target: Expr, value: Expr },
    If { cond: Expr, then_body: Box<Stmt>, else_body: Box<Stmt> },
    While { cond: Expr, body: Box<Stmt> },
    Print(Expr),
    Return(Expr),
    /// An expression evaluated for its effect (a method call, usually).
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarTarget {
    Local(LocalId),
    Param(ParamId),
    /// A bare field name inside a method body; the receiver is `this`.
    Field(FieldRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Eq,
    And,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit(i32),
    BoolLit(bool),
    /// `null`, carrying the static type the checker assigned to it.
    Null(SrcTy),
    This,
    Var(VarTarget),
    FieldAccess { recv: Box<Expr>, field: FieldRef },
    ArrayIndex { array: Box<Expr>, index: Box<Expr> },
    ArrayLength(Box<Expr>),
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { lhs: Box<Expr>, op: BinaryOp, rhs: Box<Expr> },
    MethodCall { recv: Box<Expr>, method: MethodRef, args: Vec<Expr> },
    NewObject(ClassId),
    NewIntArray(Box<Expr>),
}

impl Program {
    pub fn class(&self, id: ClassId) -> &ClassDecl {
        self.classes
            .get(id.0)
            .unwrap_or_else(|| ice!("unresolved class id {:?}", id))
    }

    pub fn field(&self, field: FieldRef) -> &VarDecl {
        self.class(field.class)
            .fields
            .get(field.field)
            .unwrap_or_else(|| ice!("unresolved field reference {:?}", field))
    }

    pub fn method(&self, method: MethodRef) -> &MethodDecl {
        self.class(method.class)
            .methods
            .get(method.method)
            .unwrap_or_else(|| ice!("unresolved method reference {:?}", method))
    }
}

impl Index<ClassId> for Program {
    type Output = ClassDecl;

    fn index(&self, id: ClassId) -> &Self::Output {
        self.class(id)
    }
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self {
            kind,
            pos: Pos::UNKNOWN,
        }
    }

    pub fn at(mut self, line: u32) -> Self {
        self.pos = Pos::line(line);
        self
    }

    /// A short statement-kind label for comment markers.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            StmtKind::Block(_) => "block",
            StmtKind::VarDecl(_) => "var decl",
            StmtKind::Assign { .. } => "assign",
            StmtKind::If { .. } => "if",
            StmtKind::While { .. } => "while",
            StmtKind::Print(_) => "print",
            StmtKind::Return(_) => "return",
            StmtKind::Expr(_) => "expr",
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            pos: Pos::UNKNOWN,
        }
    }

    pub fn at(mut self, line: u32) -> Self {
        self.pos = Pos::line(line);
        self
    }

    pub fn int(value: i32) -> Self {
        Self::new(ExprKind::IntLit(value))
    }

    pub fn bool_lit(value: bool) -> Self {
        Self::new(ExprKind::BoolLit(value))
    }

    pub fn null(ty: SrcTy) -> Self {
        Self::new(ExprKind::Null(ty))
    }

    pub fn this() -> Self {
        Self::new(ExprKind::This)
    }

    pub fn local(index: usize) -> Self {
        Self::new(ExprKind::Var(VarTarget::Local(LocalId(index))))
    }

    pub fn param(index: usize) -> Self {
        Self::new(ExprKind::Var(VarTarget::Param(ParamId(index))))
    }

    pub fn field_var(field: FieldRef) -> Self {
        Self::new(ExprKind::Var(VarTarget::Field(field)))
    }

    pub fn field_access(recv: Expr, field: FieldRef) -> Self {
        Self::new(ExprKind::FieldAccess {
            recv: Box::new(recv),
            field,
        })
    }

    pub fn array_index(array: Expr, index: Expr) -> Self {
        Self::new(ExprKind::ArrayIndex {
            array: Box::new(array),
            index: Box::new(index),
        })
    }

    pub fn array_length(array: Expr) -> Self {
        Self::new(ExprKind::ArrayLength(Box::new(array)))
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Self::new(ExprKind::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    pub fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Self {
        Self::new(ExprKind::Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        })
    }

    pub fn call(recv: Expr, method: MethodRef, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::MethodCall {
            recv: Box::new(recv),
            method,
            args,
        })
    }

    pub fn new_object(class: ClassId) -> Self {
        Self::new(ExprKind::NewObject(class))
    }

    pub fn new_int_array(size: Expr) -> Self {
        Self::new(ExprKind::NewIntArray(Box::new(size)))
    }
}

impl Stmt {
    pub fn block(stmts: Vec<Stmt>) -> Self {
        Self::new(StmtKind::Block(stmts))
    }

    pub fn var_decl(index: usize) -> Self {
        Self::new(StmtKind::VarDecl(LocalId(index)))
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Self::new(StmtKind::Assign { target, value })
    }

    pub fn if_else(cond: Expr, then_body: Stmt, else_body: Stmt) -> Self {
        Self::new(StmtKind::If {
            cond,
            then_body: Box::new(then_body),
            else_body: Box::new(else_body),
        })
    }

    pub fn while_loop(cond: Expr, body: Stmt) -> Self {
        Self::new(StmtKind::While {
            cond,
            body: Box::new(body),
        })
    }

    pub fn print(expr: Expr) -> Self {
        Self::new(StmtKind::Print(expr))
    }

    pub fn ret(expr: Expr) -> Self {
        Self::new(StmtKind::Return(expr))
    }

    pub fn expr(expr: Expr) -> Self {
        Self::new(StmtKind::Expr(expr))
    }
}
