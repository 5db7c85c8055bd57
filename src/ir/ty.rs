use std::ops::Index;

use indexmap::IndexMap;

use crate::ice;

/// A handle to a struct type in the program's [`Structs`] registry.
///
/// Every struct type is registered exactly once per declared name, so key
/// equality coincides with the declared-name-plus-field-list equality that
/// governs type compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Int,
    Bool,
    Byte,
    Ptr(Box<Ty>),
    /// A fixed-length inline array. Length 0 marks a trailing
    /// flexible-array member (the int-array data field).
    Array(Box<Ty>, usize),
    Struct(StructId),
    Proc { params: Vec<Ty>, ret: Box<Ty> },
}

impl Ty {
    pub fn ptr(pointee: Ty) -> Ty {
        Ty::Ptr(Box::new(pointee))
    }

    pub fn array(elem: Ty, len: usize) -> Ty {
        Ty::Array(Box::new(elem), len)
    }

    pub fn proc(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Proc {
            params,
            ret: Box::new(ret),
        }
    }

    pub fn pointee(&self) -> &Ty {
        match self {
            Ty::Ptr(inner) => inner,
            _ => ice!("expected a pointer type, got {:?}", self),
        }
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Ty::Ptr(_))
    }

    /// Alignment under the natural-alignment layout rules.
    pub fn align_in_bytes(&self, structs: &Structs) -> usize {
        match self {
            Ty::Int => 4,
            Ty::Bool | Ty::Byte => 1,
            Ty::Ptr(_) => 8,
            Ty::Array(elem, _) => elem.align_in_bytes(structs),
            Ty::Struct(id) => structs
                .fields(*id)
                .iter()
                .map(|field| field.ty.align_in_bytes(structs))
                .max()
                .unwrap_or(1),
            Ty::Proc { .. } => ice!("procedure types are unsized"),
        }
    }

    /// Size in bytes under the natural-alignment layout rules. Structs are
    /// padded between fields and up to their own alignment, the way a C
    /// compiler would lay them out.
    pub fn size_in_bytes(&self, structs: &Structs) -> usize {
        match self {
            Ty::Int => 4,
            Ty::Bool | Ty::Byte => 1,
            Ty::Ptr(_) => 8,
            Ty::Array(elem, len) => elem.size_in_bytes(structs) * len,
            Ty::Struct(id) => {
                let mut offset = 0;
                for field in structs.fields(*id) {
                    let align = field.ty.align_in_bytes(structs);
                    offset = round_up(offset, align);
                    offset += field.ty.size_in_bytes(structs);
                }

                round_up(offset, self.align_in_bytes(structs))
            }
            Ty::Proc { .. } => ice!("procedure types are unsized"),
        }
    }
}

fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    pub ty: Ty,
}

impl StructField {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug)]
pub struct StructDef {
    pub name: String,
    fields: Option<Vec<StructField>>,
}

impl StructDef {
    /// The complete field list. Panics if only the handle has been declared
    /// so far: lowering a body before every shape exists is a compiler bug.
    pub fn fields(&self) -> &[StructField] {
        match &self.fields {
            Some(fields) => fields,
            None => ice!("struct {} is declared but its shape is not computed yet", self.name),
        }
    }

    pub fn is_defined(&self) -> bool {
        self.fields.is_some()
    }
}

/// The ordered, append-only struct type registry.
///
/// Struct types are built in two phases: [`declare`](Structs::declare)
/// publishes a handle that other types may reference (a class field may
/// point to a class declared later in the source), and
/// [`define`](Structs::define) installs the full field list exactly once.
#[derive(Debug, Default)]
pub struct Structs {
    defs: IndexMap<String, StructDef>,
}

impl Structs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>) -> StructId {
        let name = name.into();

        if self.defs.contains_key(&name) {
            ice!("struct type {} is declared twice", name);
        }

        let id = StructId(self.defs.len());
        self.defs.insert(name.clone(), StructDef { name, fields: None });

        id
    }

    pub fn define(&mut self, id: StructId, fields: Vec<StructField>) {
        let def = self.def_mut(id);

        if def.fields.is_some() {
            ice!("struct {} is defined twice", def.name);
        }

        def.fields = Some(fields);
    }

    pub fn fields(&self, id: StructId) -> &[StructField] {
        self[id].fields()
    }

    pub fn name(&self, id: StructId) -> &str {
        &self[id].name
    }

    pub fn get_by_name(&self, name: &str) -> Option<(StructId, &StructDef)> {
        self.defs
            .get_full(name)
            .map(|(index, _, def)| (StructId(index), def))
    }

    pub fn iter(&self) -> impl Iterator<Item = (StructId, &StructDef)> {
        self.defs
            .values()
            .enumerate()
            .map(|(index, def)| (StructId(index), def))
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    fn def_mut(&mut self, id: StructId) -> &mut StructDef {
        match self.defs.get_index_mut(id.0) {
            Some((_, def)) => def,
            None => ice!("unknown struct id {:?}", id),
        }
    }
}

impl Index<StructId> for Structs {
    type Output = StructDef;

    fn index(&self, id: StructId) -> &Self::Output {
        match self.defs.get_index(id.0) {
            Some((_, def)) => def,
            None => ice!("unknown struct id {:?}", id),
        }
    }
}
