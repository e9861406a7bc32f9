// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Type symbols, layouts and the interning table.
//!
//! Every type used by a [`Program`](crate::program::Program) is interned into a [`TypeTable`] and
//! referred to by a [`TypeId`]. Two `TypeId`s are equal iff they denote the same type:
//! non-structured types intern structurally, structured types intern by declaration (one id per
//! declared name).
//!
//! Interning is eager: when a type is interned, the table also records its verification type,
//! its stack type and (for non-reference types) the id of a reference to it. The verifier and the
//! code generator therefore only ever read the table.

use core::fmt;

use hashbrown::HashMap;

use crate::diagnostics::{Diagnostic, DiagnosticCategory};

/// An interned type handle (index into a [`TypeTable`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u32);

impl TypeId {
    /// `void`.
    pub const VOID: Self = Self(0);
    /// `bool`.
    pub const BOOL: Self = Self(1);
    /// `int8`.
    pub const I8: Self = Self(2);
    /// `int16`.
    pub const I16: Self = Self(3);
    /// `int32`.
    pub const I32: Self = Self(4);
    /// `int64`.
    pub const I64: Self = Self(5);
    /// `uint8`.
    pub const U8: Self = Self(6);
    /// `uint16`.
    pub const U16: Self = Self(7);
    /// `uint32`.
    pub const U32: Self = Self(8);
    /// `uint64`.
    pub const U64: Self = Self(9);
    /// `float32`.
    pub const F32: Self = Self(10);
    /// `float64`.
    pub const F64: Self = Self(11);
    /// The type of the `null` literal.
    pub const NULL: Self = Self(12);
}

const PRIMITIVES: [TypeKind; 13] = [
    TypeKind::Void,
    TypeKind::Bool,
    TypeKind::I8,
    TypeKind::I16,
    TypeKind::I32,
    TypeKind::I64,
    TypeKind::U8,
    TypeKind::U16,
    TypeKind::U32,
    TypeKind::U64,
    TypeKind::F32,
    TypeKind::F64,
    TypeKind::Null,
];

/// The shape of an interned type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// No value.
    Void,
    /// Boolean (one byte).
    Bool,
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
    /// IEEE 754 single precision.
    F32,
    /// IEEE 754 double precision.
    F64,
    /// The type of `null`; assignable to any reference.
    Null,
    /// A pointer-like reference to a value of the given type.
    Reference(TypeId),
    /// A fixed-length array.
    Array {
        /// Element type.
        element: TypeId,
        /// Number of elements.
        len: u32,
    },
    /// An unbounded view (pointer + length) over elements of the given type.
    Span(TypeId),
    /// A function signature.
    Function {
        /// Parameter types in declaration order.
        params: Vec<TypeId>,
        /// Return type ([`TypeId::VOID`] for none).
        ret: TypeId,
    },
    /// A declared structured type (index into the table's struct declarations).
    Struct(u32),
}

/// Size and alignment of a type, in bytes.
///
/// Invariants: `align` is a power of two and `size` is a multiple of `align`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeLayout {
    /// Size in bytes.
    pub size: u32,
    /// Alignment in bytes.
    pub align: u32,
}

impl TypeLayout {
    const fn new(size: u32, align: u32) -> Self {
        Self { size, align }
    }

    /// Number of 32-bit slots a value of this layout occupies (`ceil(size / 4)`).
    #[must_use]
    pub const fn slots(self) -> u32 {
        self.size.div_ceil(4)
    }
}

/// A declared structured type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructDef {
    /// Declared name (unique per table).
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldDef>,
}

/// A field of a [`StructDef`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Declared field type.
    pub ty: TypeId,
    /// Byte offset from the start of the struct.
    pub offset: u32,
}

/// A type-table construction error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeError {
    /// A structured type name was declared twice.
    DuplicateStruct {
        /// The duplicated name.
        name: String,
    },
    /// A type id does not belong to this table.
    UnknownType {
        /// The offending id.
        ty: TypeId,
    },
    /// `void` (or `null`) was used where a value type is required.
    InvalidElement {
        /// The offending element type.
        ty: TypeId,
    },
    /// A computed size does not fit in 32 bits.
    LayoutOverflow,
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateStruct { name } => write!(f, "struct `{name}` declared twice"),
            Self::UnknownType { ty } => write!(f, "unknown type id {}", ty.0),
            Self::InvalidElement { ty } => {
                write!(f, "type id {} cannot be used as a value type", ty.0)
            }
            Self::LayoutOverflow => write!(f, "type layout overflows 32 bits"),
        }
    }
}

impl core::error::Error for TypeError {}

impl TypeError {
    /// Converts this error into a diagnostic.
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            Self::DuplicateStruct { .. } => 5001,
            Self::UnknownType { .. } => 5002,
            Self::InvalidElement { .. } => 5003,
            Self::LayoutOverflow => 5004,
        };
        Diagnostic::error(DiagnosticCategory::Types, code, self.to_string())
    }
}

#[derive(Clone, Debug)]
struct TypeEntry {
    kind: TypeKind,
    layout: TypeLayout,
    verification: TypeId,
    stack: TypeId,
    reference: Option<TypeId>,
}

/// The interning table for all types of a compilation.
#[derive(Clone, Debug)]
pub struct TypeTable {
    entries: Vec<TypeEntry>,
    index: HashMap<TypeKind, TypeId>,
    structs: Vec<StructDef>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    /// Creates a table holding only the primitive types, at their fixed [`TypeId`] constants.
    #[must_use]
    pub fn new() -> Self {
        let mut table = Self {
            entries: Vec::new(),
            index: HashMap::new(),
            structs: Vec::new(),
        };
        for kind in PRIMITIVES {
            let layout = primitive_layout(&kind);
            let id = TypeId(table.entries.len() as u32);
            table.entries.push(TypeEntry {
                kind: kind.clone(),
                layout,
                verification: id,
                stack: id,
                reference: None,
            });
            table.index.insert(kind, id);
        }
        for (i, kind) in PRIMITIVES.iter().enumerate() {
            let id = TypeId(i as u32);
            let verification = match kind {
                TypeKind::Bool | TypeKind::I8 | TypeKind::U8 => TypeId::I8,
                TypeKind::I16 | TypeKind::U16 => TypeId::I16,
                TypeKind::I32 | TypeKind::U32 => TypeId::I32,
                TypeKind::I64 | TypeKind::U64 => TypeId::I64,
                _ => id,
            };
            let entry = &mut table.entries[i];
            entry.verification = verification;
            entry.stack = widen(verification);
        }
        for i in 0..PRIMITIVES.len() {
            let id = TypeId(i as u32);
            if id != TypeId::VOID && id != TypeId::NULL {
                // Primitive layouts cannot overflow, so interning the reference cannot fail.
                if let Ok(r) = table.intern(TypeKind::Reference(id)) {
                    table.entries[i].reference = Some(r);
                }
            }
        }
        table
    }

    /// Returns the number of interned types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table holds no types (never the case for [`TypeTable::new`]).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `ty` belongs to this table.
    #[must_use]
    pub fn contains(&self, ty: TypeId) -> bool {
        (ty.0 as usize) < self.entries.len()
    }

    /// Interns `ref<target>`.
    pub fn reference(&mut self, target: TypeId) -> Result<TypeId, TypeError> {
        self.check(target)?;
        self.intern(TypeKind::Reference(target))
    }

    /// Interns `element[len]`.
    pub fn array(&mut self, element: TypeId, len: u32) -> Result<TypeId, TypeError> {
        self.check_value(element)?;
        self.intern(TypeKind::Array { element, len })
    }

    /// Interns `span<element>`.
    pub fn span(&mut self, element: TypeId) -> Result<TypeId, TypeError> {
        self.check_value(element)?;
        self.intern(TypeKind::Span(element))
    }

    /// Interns the function type `fn(params) -> ret`.
    pub fn function(&mut self, params: &[TypeId], ret: TypeId) -> Result<TypeId, TypeError> {
        for &p in params {
            self.check_value(p)?;
        }
        self.check(ret)?;
        self.intern(TypeKind::Function {
            params: params.to_vec(),
            ret,
        })
    }

    /// Declares a structured type with the given fields and returns its unique id.
    ///
    /// Field offsets are assigned in declaration order with natural alignment; the struct size is
    /// rounded up to its alignment.
    pub fn declare_struct(
        &mut self,
        name: &str,
        fields: &[(&str, TypeId)],
    ) -> Result<TypeId, TypeError> {
        if self.structs.iter().any(|s| s.name == name) {
            return Err(TypeError::DuplicateStruct { name: name.into() });
        }
        let mut defs = Vec::with_capacity(fields.len());
        let mut offset: u32 = 0;
        for &(field_name, ty) in fields {
            self.check_value(ty)?;
            let layout = self.layout(ty);
            offset = align_up(offset, layout.align).ok_or(TypeError::LayoutOverflow)?;
            defs.push(FieldDef {
                name: field_name.into(),
                ty,
                offset,
            });
            offset = offset
                .checked_add(layout.size)
                .ok_or(TypeError::LayoutOverflow)?;
        }
        let struct_index = self.structs.len() as u32;
        self.structs.push(StructDef {
            name: name.into(),
            fields: defs,
        });
        self.intern(TypeKind::Struct(struct_index))
    }

    /// Returns the shape of `ty`.
    ///
    /// # Panics
    ///
    /// Panics if `ty` does not belong to this table.
    #[must_use]
    pub fn kind(&self, ty: TypeId) -> &TypeKind {
        &self.entries[ty.0 as usize].kind
    }

    /// Returns the layout of `ty`.
    ///
    /// # Panics
    ///
    /// Panics if `ty` does not belong to this table.
    #[must_use]
    pub fn layout(&self, ty: TypeId) -> TypeLayout {
        self.entries[ty.0 as usize].layout
    }

    /// Returns the number of 32-bit slots a value of `ty` occupies.
    #[must_use]
    pub fn slots(&self, ty: TypeId) -> u32 {
        self.layout(ty).slots()
    }

    /// Returns the verification type of `ty` (integers collapsed to their width class,
    /// compound types normalized recursively, structured types unchanged).
    #[must_use]
    pub fn verification_type(&self, ty: TypeId) -> TypeId {
        self.entries[ty.0 as usize].verification
    }

    /// Returns the type a value of `ty` has once pushed on the operand stack: the verification
    /// type, with the 8- and 16-bit classes widened to `int32`.
    #[must_use]
    pub fn stack_type(&self, ty: TypeId) -> TypeId {
        self.entries[ty.0 as usize].stack
    }

    /// Returns the id of `ref<ty>` if `ty` is addressable (not a reference, `void` or `null`).
    #[must_use]
    pub fn reference_to(&self, ty: TypeId) -> Option<TypeId> {
        self.entries.get(ty.0 as usize)?.reference
    }

    /// If `ty` is `ref<T>`, returns `T`.
    #[must_use]
    pub fn referent(&self, ty: TypeId) -> Option<TypeId> {
        match self.kind(ty) {
            TypeKind::Reference(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns the declaration of a structured type.
    #[must_use]
    pub fn struct_def(&self, ty: TypeId) -> Option<&StructDef> {
        match self.entries.get(ty.0 as usize)?.kind {
            TypeKind::Struct(i) => self.structs.get(i as usize),
            _ => None,
        }
    }

    /// Returns field `index` of the structured type `owner`.
    #[must_use]
    pub fn field(&self, owner: TypeId, index: u16) -> Option<&FieldDef> {
        self.struct_def(owner)?.fields.get(usize::from(index))
    }

    /// Returns `true` if `ty` is `ref<T>`.
    #[must_use]
    pub fn is_reference(&self, ty: TypeId) -> bool {
        matches!(self.kind(ty), TypeKind::Reference(_))
    }

    /// Returns `true` if values of `ty` carry an address (references and spans).
    #[must_use]
    pub fn carries_address(&self, ty: TypeId) -> bool {
        matches!(self.kind(ty), TypeKind::Reference(_) | TypeKind::Span(_))
    }

    /// Returns a human-readable name for `ty`.
    #[must_use]
    pub fn name(&self, ty: TypeId) -> String {
        let mut s = String::new();
        self.write_name(&mut s, ty);
        s
    }

    fn write_name(&self, out: &mut String, ty: TypeId) {
        use core::fmt::Write as _;

        let Some(entry) = self.entries.get(ty.0 as usize) else {
            let _ = write!(out, "<type {}>", ty.0);
            return;
        };
        match &entry.kind {
            TypeKind::Void => out.push_str("void"),
            TypeKind::Bool => out.push_str("bool"),
            TypeKind::I8 => out.push_str("int8"),
            TypeKind::I16 => out.push_str("int16"),
            TypeKind::I32 => out.push_str("int32"),
            TypeKind::I64 => out.push_str("int64"),
            TypeKind::U8 => out.push_str("uint8"),
            TypeKind::U16 => out.push_str("uint16"),
            TypeKind::U32 => out.push_str("uint32"),
            TypeKind::U64 => out.push_str("uint64"),
            TypeKind::F32 => out.push_str("float32"),
            TypeKind::F64 => out.push_str("float64"),
            TypeKind::Null => out.push_str("null"),
            TypeKind::Reference(t) => {
                out.push_str("ref<");
                self.write_name(out, *t);
                out.push('>');
            }
            TypeKind::Array { element, len } => {
                self.write_name(out, *element);
                let _ = write!(out, "[{len}]");
            }
            TypeKind::Span(t) => {
                out.push_str("span<");
                self.write_name(out, *t);
                out.push('>');
            }
            TypeKind::Function { params, ret } => {
                out.push_str("fn(");
                for (i, p) in params.iter().enumerate() {
                    if i != 0 {
                        out.push_str(", ");
                    }
                    self.write_name(out, *p);
                }
                out.push_str(") -> ");
                self.write_name(out, *ret);
            }
            TypeKind::Struct(i) => match self.structs.get(*i as usize) {
                Some(s) => out.push_str(&s.name),
                None => out.push_str("<struct>"),
            },
        }
    }

    fn check(&self, ty: TypeId) -> Result<(), TypeError> {
        if self.contains(ty) {
            Ok(())
        } else {
            Err(TypeError::UnknownType { ty })
        }
    }

    fn check_value(&self, ty: TypeId) -> Result<(), TypeError> {
        self.check(ty)?;
        if ty == TypeId::VOID || ty == TypeId::NULL {
            return Err(TypeError::InvalidElement { ty });
        }
        Ok(())
    }

    fn intern(&mut self, kind: TypeKind) -> Result<TypeId, TypeError> {
        if let Some(&id) = self.index.get(&kind) {
            return Ok(id);
        }
        let layout = self.compute_layout(&kind)?;
        let id = TypeId(u32::try_from(self.entries.len()).map_err(|_| TypeError::LayoutOverflow)?);
        self.entries.push(TypeEntry {
            kind: kind.clone(),
            layout,
            verification: id,
            stack: id,
            reference: None,
        });
        self.index.insert(kind.clone(), id);

        let normalized = match &kind {
            TypeKind::Reference(t) => Some(TypeKind::Reference(self.verification_type(*t))),
            TypeKind::Array { element, len } => Some(TypeKind::Array {
                element: self.verification_type(*element),
                len: *len,
            }),
            TypeKind::Span(t) => Some(TypeKind::Span(self.verification_type(*t))),
            TypeKind::Function { params, ret } => Some(TypeKind::Function {
                params: params.iter().map(|&p| self.verification_type(p)).collect(),
                ret: self.verification_type(*ret),
            }),
            _ => None,
        };
        if let Some(normalized) = normalized
            && normalized != kind
        {
            let v = self.intern(normalized)?;
            self.entries[id.0 as usize].verification = v;
            self.entries[id.0 as usize].stack = v;
        }

        if !matches!(kind, TypeKind::Reference(_)) {
            let r = self.intern(TypeKind::Reference(id))?;
            self.entries[id.0 as usize].reference = Some(r);
        }
        Ok(id)
    }

    fn compute_layout(&self, kind: &TypeKind) -> Result<TypeLayout, TypeError> {
        Ok(match kind {
            TypeKind::Reference(_) | TypeKind::Function { .. } => TypeLayout::new(4, 4),
            TypeKind::Span(_) => TypeLayout::new(8, 4),
            TypeKind::Array { element, len } => {
                let e = self.layout(*element);
                let size = e.size.checked_mul(*len).ok_or(TypeError::LayoutOverflow)?;
                TypeLayout::new(size, e.align)
            }
            TypeKind::Struct(i) => {
                let def = &self.structs[*i as usize];
                let mut align = 1;
                let mut end = 0_u32;
                for field in &def.fields {
                    let l = self.layout(field.ty);
                    align = align.max(l.align);
                    end = field
                        .offset
                        .checked_add(l.size)
                        .ok_or(TypeError::LayoutOverflow)?;
                }
                let size = align_up(end, align).ok_or(TypeError::LayoutOverflow)?;
                TypeLayout::new(size, align)
            }
            other => primitive_layout(other),
        })
    }
}

fn primitive_layout(kind: &TypeKind) -> TypeLayout {
    match kind {
        TypeKind::Void => TypeLayout::new(0, 1),
        TypeKind::Bool | TypeKind::I8 | TypeKind::U8 => TypeLayout::new(1, 1),
        TypeKind::I16 | TypeKind::U16 => TypeLayout::new(2, 2),
        TypeKind::I64 | TypeKind::U64 | TypeKind::F64 => TypeLayout::new(8, 8),
        _ => TypeLayout::new(4, 4),
    }
}

fn widen(verification: TypeId) -> TypeId {
    if verification == TypeId::I8 || verification == TypeId::I16 {
        TypeId::I32
    } else {
        verification
    }
}

fn align_up(value: u32, align: u32) -> Option<u32> {
    let mask = align - 1;
    Some(value.checked_add(mask)? & !mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_have_fixed_ids_and_layouts() {
        let t = TypeTable::new();
        assert_eq!(t.kind(TypeId::I32), &TypeKind::I32);
        assert_eq!(t.kind(TypeId::NULL), &TypeKind::Null);
        assert_eq!(t.layout(TypeId::I64), TypeLayout { size: 8, align: 8 });
        assert_eq!(t.layout(TypeId::BOOL), TypeLayout { size: 1, align: 1 });
        assert_eq!(t.layout(TypeId::VOID).slots(), 0);
    }

    #[test]
    fn integer_classes_normalize_and_widen() {
        let t = TypeTable::new();
        assert_eq!(t.verification_type(TypeId::BOOL), TypeId::I8);
        assert_eq!(t.verification_type(TypeId::U8), TypeId::I8);
        assert_eq!(t.verification_type(TypeId::U16), TypeId::I16);
        assert_eq!(t.verification_type(TypeId::U32), TypeId::I32);
        assert_eq!(t.verification_type(TypeId::U64), TypeId::I64);
        assert_eq!(t.verification_type(TypeId::F32), TypeId::F32);
        assert_eq!(t.stack_type(TypeId::U8), TypeId::I32);
        assert_eq!(t.stack_type(TypeId::I16), TypeId::I32);
        assert_eq!(t.stack_type(TypeId::U64), TypeId::I64);
    }

    #[test]
    fn compound_types_normalize_recursively() {
        let mut t = TypeTable::new();
        let r_u32 = t.reference(TypeId::U32).unwrap();
        let r_i32 = t.reference(TypeId::I32).unwrap();
        assert_ne!(r_u32, r_i32);
        assert_eq!(t.verification_type(r_u32), r_i32);

        let a = t.array(TypeId::U8, 4).unwrap();
        let b = t.array(TypeId::I8, 4).unwrap();
        assert_eq!(t.verification_type(a), b);

        let f = t.function(&[TypeId::U16], TypeId::BOOL).unwrap();
        let g = t.function(&[TypeId::I16], TypeId::I8).unwrap();
        assert_eq!(t.verification_type(f), g);
        // References to 8-bit values stay 8-bit: only stack values widen.
        assert_eq!(t.stack_type(r_u32), r_i32);
    }

    #[test]
    fn interning_is_canonical() {
        let mut t = TypeTable::new();
        let a = t.span(TypeId::I64).unwrap();
        let b = t.span(TypeId::I64).unwrap();
        assert_eq!(a, b);
        let s = t.declare_struct("Point", &[("x", TypeId::I32)]).unwrap();
        assert_eq!(
            t.declare_struct("Point", &[("x", TypeId::I32)]),
            Err(TypeError::DuplicateStruct {
                name: "Point".into()
            })
        );
        assert_eq!(t.verification_type(s), s);
        assert_eq!(t.name(s), "Point");
    }

    #[test]
    fn struct_fields_are_aligned() {
        let mut t = TypeTable::new();
        let s = t
            .declare_struct(
                "Mixed",
                &[("a", TypeId::U8), ("b", TypeId::I32), ("c", TypeId::I16)],
            )
            .unwrap();
        let def = t.struct_def(s).unwrap();
        let offsets: Vec<u32> = def.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!(t.layout(s), TypeLayout { size: 12, align: 4 });
    }

    #[test]
    fn five_byte_struct_occupies_two_slots() {
        let mut t = TypeTable::new();
        let s = t
            .declare_struct(
                "Five",
                &[
                    ("a", TypeId::U8),
                    ("b", TypeId::U8),
                    ("c", TypeId::U8),
                    ("d", TypeId::U8),
                    ("e", TypeId::U8),
                ],
            )
            .unwrap();
        assert_eq!(t.layout(s).size, 5);
        assert_eq!(t.slots(s), 2);
    }

    #[test]
    fn layouts_keep_alignment_invariants() {
        let mut t = TypeTable::new();
        let s = t
            .declare_struct("S", &[("a", TypeId::I64), ("b", TypeId::U8)])
            .unwrap();
        let arr = t.array(s, 3).unwrap();
        for ty in [s, arr, TypeId::BOOL, TypeId::F64] {
            let l = t.layout(ty);
            assert!(l.align.is_power_of_two());
            assert_eq!(l.size % l.align, 0);
        }
        assert_eq!(t.layout(arr).size, 48);
    }

    #[test]
    fn every_value_type_is_addressable() {
        let mut t = TypeTable::new();
        let s = t.declare_struct("S", &[("a", TypeId::I32)]).unwrap();
        let r = t.reference_to(s).unwrap();
        assert_eq!(t.referent(r), Some(s));
        assert!(t.reference_to(r).is_none());
        assert!(t.reference_to(TypeId::VOID).is_none());
        assert!(t.reference_to(TypeId::U16).is_some());
    }

    #[test]
    fn rejects_void_elements_and_overflow() {
        let mut t = TypeTable::new();
        assert_eq!(
            t.array(TypeId::VOID, 2),
            Err(TypeError::InvalidElement { ty: TypeId::VOID })
        );
        assert_eq!(t.array(TypeId::I64, u32::MAX), Err(TypeError::LayoutOverflow));
    }

    #[test]
    fn type_names_are_readable() {
        let mut t = TypeTable::new();
        let r = t.reference(TypeId::U8).unwrap();
        let f = t.function(&[TypeId::I32, r], TypeId::VOID).unwrap();
        assert_eq!(t.name(f), "fn(int32, ref<uint8>) -> void");
    }
}
