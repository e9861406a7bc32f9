// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bound program model.
//!
//! A [`Program`] is the name-resolved input to the back end: a shared [`TypeTable`] plus a list of
//! modules, each holding functions with their signatures, label tables and instruction bodies.
//! Symbol references are plain indices; [`Program::bind`] checks that every one of them resolves
//! before anything else looks at the program.

use core::fmt;

use crate::diagnostics::{Diagnostic, DiagnosticCategory};
use crate::instr::{Instr, Label};
use crate::types::{TypeId, TypeKind, TypeTable};

/// Index of a module within a [`Program`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

/// A function symbol: module plus declaration index within that module.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef {
    /// Declaring module.
    pub module: ModuleId,
    /// Declaration index within the module.
    pub index: u32,
}

impl fmt::Display for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}.f{}", self.module.0, self.index)
    }
}

/// A named, typed parameter or local.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    /// Source name (diagnostics only).
    pub name: String,
    /// Declared type.
    pub ty: TypeId,
}

impl Variable {
    /// Creates a variable.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// How a function is implemented.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    /// A verified instruction body.
    Bytecode,
    /// An extern function forwarded to the VM's system call `id`.
    Syscall(u16),
}

/// A bound function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionDef {
    /// Source name.
    pub name: String,
    /// Ordered parameters.
    pub params: Vec<Variable>,
    /// Ordered locals.
    pub locals: Vec<Variable>,
    /// Return type ([`TypeId::VOID`] for none).
    pub ret: TypeId,
    /// Interned function type of this signature (pushed by `ldftn`).
    pub signature: TypeId,
    /// Label table: `labels[l]` is the instruction index label `l` is attached to.
    pub labels: Vec<u32>,
    /// Instruction body (empty for syscalls).
    pub body: Vec<Instr>,
    /// Implementation kind.
    pub kind: FunctionKind,
    /// Whether the VM must zero locals on entry.
    pub zero_init_locals: bool,
}

impl FunctionDef {
    /// Resolves `label` to its instruction index.
    #[must_use]
    pub fn label_target(&self, label: Label) -> Option<usize> {
        self.labels.get(label.0 as usize).map(|&i| i as usize)
    }

    /// Returns the declared parameter types.
    pub fn param_types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.params.iter().map(|p| p.ty)
    }
}

/// A bound module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleDef {
    /// Source name. Never part of the image: modules are named by fingerprint.
    pub name: String,
    /// Imported modules, in import-table order.
    pub imports: Vec<ModuleId>,
    /// Functions in declaration order.
    pub functions: Vec<FunctionDef>,
    /// Optional entry point (index into `functions`).
    pub entry: Option<u32>,
}

impl ModuleDef {
    /// Returns the import-table index of `module`, if imported.
    #[must_use]
    pub fn import_index(&self, module: ModuleId) -> Option<usize> {
        self.imports.iter().position(|&m| m == module)
    }
}

/// A whole bound program.
#[derive(Clone, Debug)]
pub struct Program {
    /// The interned type table shared by every module.
    pub types: TypeTable,
    /// Modules, indexed by [`ModuleId`].
    pub modules: Vec<ModuleDef>,
}

/// A reference that failed to resolve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindError {
    /// A module id does not exist.
    UnknownModule {
        /// The unresolved module.
        module: ModuleId,
    },
    /// A function reference does not exist.
    UnknownFunction {
        /// Referring function.
        at: FuncRef,
        /// Instruction index.
        index: usize,
        /// The unresolved callee.
        func: FuncRef,
    },
    /// A function refers to a module its own module does not import.
    NotImported {
        /// Referring function.
        at: FuncRef,
        /// Instruction index.
        index: usize,
        /// The module that is not in the import list.
        module: ModuleId,
    },
    /// An argument index is out of range.
    UnknownArgument {
        /// Referring function.
        at: FuncRef,
        /// Instruction index.
        index: usize,
        /// The argument index.
        arg: u16,
    },
    /// A local index is out of range.
    UnknownLocal {
        /// Referring function.
        at: FuncRef,
        /// Instruction index.
        index: usize,
        /// The local index.
        local: u16,
    },
    /// A field reference does not name a field of a structured type.
    UnknownField {
        /// Referring function.
        at: FuncRef,
        /// Instruction index.
        index: usize,
        /// Owning type.
        owner: TypeId,
        /// Field index.
        field: u16,
    },
    /// A branch names a label that does not exist.
    UnknownLabel {
        /// Referring function.
        at: FuncRef,
        /// Instruction index.
        index: usize,
        /// The label.
        label: Label,
    },
    /// A label is attached past the last instruction.
    LabelPastEnd {
        /// Owning function.
        at: FuncRef,
        /// The label.
        label: Label,
    },
    /// A type id is not in the program's type table.
    UnknownType {
        /// Referring function.
        at: FuncRef,
        /// The type id.
        ty: TypeId,
    },
    /// A parameter or local is declared `void`.
    VoidVariable {
        /// Owning function.
        at: FuncRef,
        /// Variable name.
        name: String,
    },
    /// The recorded signature type does not match the declared parameters and return type.
    SignatureMismatch {
        /// Owning function.
        at: FuncRef,
    },
    /// A bytecode function has no instructions.
    EmptyBody {
        /// Owning function.
        at: FuncRef,
    },
    /// A syscall function has instructions.
    SyscallWithBody {
        /// Owning function.
        at: FuncRef,
    },
    /// The entry point does not exist or takes parameters.
    BadEntry {
        /// Owning module.
        module: ModuleId,
        /// Entry index.
        func: u32,
    },
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownModule { module } => write!(f, "unknown module m{}", module.0),
            Self::UnknownFunction { at, index, func } => {
                write!(f, "{at}@{index}: unresolved function {func}")
            }
            Self::NotImported { at, index, module } => {
                write!(f, "{at}@{index}: module m{} is not imported", module.0)
            }
            Self::UnknownArgument { at, index, arg } => {
                write!(f, "{at}@{index}: unresolved argument {arg}")
            }
            Self::UnknownLocal { at, index, local } => {
                write!(f, "{at}@{index}: unresolved local {local}")
            }
            Self::UnknownField {
                at,
                index,
                owner,
                field,
            } => write!(f, "{at}@{index}: unresolved field t{}.{field}", owner.0),
            Self::UnknownLabel { at, index, label } => {
                write!(f, "{at}@{index}: unresolved label L{}", label.0)
            }
            Self::LabelPastEnd { at, label } => {
                write!(f, "{at}: label L{} is not attached to an instruction", label.0)
            }
            Self::UnknownType { at, ty } => write!(f, "{at}: unknown type t{}", ty.0),
            Self::VoidVariable { at, name } => write!(f, "{at}: variable `{name}` is void"),
            Self::SignatureMismatch { at } => write!(f, "{at}: signature type mismatch"),
            Self::EmptyBody { at } => write!(f, "{at}: empty function body"),
            Self::SyscallWithBody { at } => write!(f, "{at}: syscall function has a body"),
            Self::BadEntry { module, func } => {
                write!(f, "m{}: invalid entry point f{func}", module.0)
            }
        }
    }
}

impl core::error::Error for BindError {}

impl BindError {
    /// Converts this error into a diagnostic.
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            Self::UnknownModule { .. } => 1001,
            Self::UnknownFunction { .. } => 1002,
            Self::NotImported { .. } => 1003,
            Self::UnknownArgument { .. } => 1004,
            Self::UnknownLocal { .. } => 1005,
            Self::UnknownField { .. } => 1006,
            Self::UnknownLabel { .. } => 1007,
            Self::LabelPastEnd { .. } => 1008,
            Self::UnknownType { .. } => 1009,
            Self::VoidVariable { .. } => 1010,
            Self::SignatureMismatch { .. } => 1011,
            Self::EmptyBody { .. } => 1012,
            Self::SyscallWithBody { .. } => 1013,
            Self::BadEntry { .. } => 1014,
        };
        Diagnostic::error(DiagnosticCategory::Binding, code, self.to_string())
    }
}

impl Program {
    /// Returns module `id`.
    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<&ModuleDef> {
        self.modules.get(id.0 as usize)
    }

    /// Returns the function named by `func`.
    #[must_use]
    pub fn function(&self, func: FuncRef) -> Option<&FunctionDef> {
        self.module(func.module)?.functions.get(func.index as usize)
    }

    /// Returns `module::function` for diagnostics.
    #[must_use]
    pub fn qualified_name(&self, func: FuncRef) -> String {
        match (self.module(func.module), self.function(func)) {
            (Some(m), Some(f)) => format!("{}::{}", m.name, f.name),
            _ => func.to_string(),
        }
    }

    /// Iterates every function with its reference.
    pub fn functions(&self) -> impl Iterator<Item = (FuncRef, &FunctionDef)> + '_ {
        self.modules.iter().enumerate().flat_map(|(m, module)| {
            let module_id = ModuleId(u32::try_from(m).unwrap_or(u32::MAX));
            module.functions.iter().enumerate().map(move |(i, f)| {
                (
                    FuncRef {
                        module: module_id,
                        index: u32::try_from(i).unwrap_or(u32::MAX),
                    },
                    f,
                )
            })
        })
    }

    /// Checks that every symbol reference in the program resolves.
    pub fn bind(&self) -> Result<(), BindError> {
        for (m, module) in self.modules.iter().enumerate() {
            let module_id = ModuleId(u32::try_from(m).unwrap_or(u32::MAX));
            for &import in &module.imports {
                if self.module(import).is_none() {
                    return Err(BindError::UnknownModule { module: import });
                }
            }
            if let Some(entry) = module.entry {
                let ok = module
                    .functions
                    .get(entry as usize)
                    .is_some_and(|f| f.params.is_empty());
                if !ok {
                    return Err(BindError::BadEntry {
                        module: module_id,
                        func: entry,
                    });
                }
            }
        }
        for (at, func) in self.functions() {
            self.bind_signature(at, func)?;
            self.bind_body(at, func)?;
        }
        Ok(())
    }

    fn bind_signature(&self, at: FuncRef, func: &FunctionDef) -> Result<(), BindError> {
        let types = &self.types;
        for v in func.params.iter().chain(&func.locals) {
            if !types.contains(v.ty) {
                return Err(BindError::UnknownType { at, ty: v.ty });
            }
            if v.ty == TypeId::VOID {
                return Err(BindError::VoidVariable {
                    at,
                    name: v.name.clone(),
                });
            }
        }
        if !types.contains(func.ret) {
            return Err(BindError::UnknownType { at, ty: func.ret });
        }
        if !types.contains(func.signature) {
            return Err(BindError::UnknownType {
                at,
                ty: func.signature,
            });
        }
        let TypeKind::Function { params, ret } = types.kind(func.signature) else {
            return Err(BindError::SignatureMismatch { at });
        };
        if *ret != func.ret || !params.iter().copied().eq(func.param_types()) {
            return Err(BindError::SignatureMismatch { at });
        }
        Ok(())
    }

    fn bind_body(&self, at: FuncRef, func: &FunctionDef) -> Result<(), BindError> {
        match func.kind {
            FunctionKind::Syscall(_) if !func.body.is_empty() || !func.labels.is_empty() => {
                return Err(BindError::SyscallWithBody { at });
            }
            FunctionKind::Syscall(_) => return Ok(()),
            FunctionKind::Bytecode if func.body.is_empty() => {
                return Err(BindError::EmptyBody { at });
            }
            FunctionKind::Bytecode => {}
        }
        for (l, &target) in func.labels.iter().enumerate() {
            if target as usize >= func.body.len() {
                return Err(BindError::LabelPastEnd {
                    at,
                    label: Label(u32::try_from(l).unwrap_or(u32::MAX)),
                });
            }
        }

        let Some(module) = self.module(at.module) else {
            return Err(BindError::UnknownModule { module: at.module });
        };
        for (index, instr) in func.body.iter().enumerate() {
            match *instr {
                Instr::None(_) | Instr::Constant(_) => {}
                Instr::Argument { index: arg, .. } => {
                    if arg as usize >= func.params.len() {
                        return Err(BindError::UnknownArgument { at, index, arg });
                    }
                }
                Instr::Local { index: local, .. } => {
                    if local as usize >= func.locals.len() {
                        return Err(BindError::UnknownLocal { at, index, local });
                    }
                }
                Instr::Field { field, .. } => {
                    let resolved = self.types.contains(field.owner)
                        && self.types.field(field.owner, field.index).is_some();
                    if !resolved {
                        return Err(BindError::UnknownField {
                            at,
                            index,
                            owner: field.owner,
                            field: field.index,
                        });
                    }
                }
                Instr::Function { func: callee, .. } => {
                    if callee.module != at.module && module.import_index(callee.module).is_none() {
                        return Err(BindError::NotImported {
                            at,
                            index,
                            module: callee.module,
                        });
                    }
                    if self.function(callee).is_none() {
                        return Err(BindError::UnknownFunction {
                            at,
                            index,
                            func: callee,
                        });
                    }
                }
                Instr::Type { ty, .. } => {
                    if !self.types.contains(ty) {
                        return Err(BindError::UnknownType { at, ty });
                    }
                }
                Instr::Branch { target, .. } => {
                    if func.label_target(target).is_none() {
                        return Err(BindError::UnknownLabel {
                            at,
                            index,
                            label: target,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{AccessOp, FuncOp, NoneOp};

    fn program_with(func: FunctionDef) -> Program {
        Program {
            types: TypeTable::new(),
            modules: vec![ModuleDef {
                name: "m".into(),
                imports: vec![],
                functions: vec![func],
                entry: None,
            }],
        }
    }

    fn void_fn(types: &mut TypeTable, body: Vec<Instr>) -> FunctionDef {
        FunctionDef {
            name: "f".into(),
            params: vec![],
            locals: vec![],
            ret: TypeId::VOID,
            signature: types.function(&[], TypeId::VOID).unwrap(),
            labels: vec![],
            body,
            kind: FunctionKind::Bytecode,
            zero_init_locals: false,
        }
    }

    const AT: FuncRef = FuncRef {
        module: ModuleId(0),
        index: 0,
    };

    #[test]
    fn binds_minimal_function() {
        let mut types = TypeTable::new();
        let mut p = program_with(void_fn(&mut types, vec![Instr::None(NoneOp::Ret)]));
        p.types = types;
        assert_eq!(p.bind(), Ok(()));
    }

    #[test]
    fn rejects_unresolved_references() {
        let mut types = TypeTable::new();
        let mut f = void_fn(
            &mut types,
            vec![
                Instr::Local {
                    op: AccessOp::Load,
                    index: 0,
                },
                Instr::None(NoneOp::Ret),
            ],
        );
        let mut p = program_with(f.clone());
        p.types = types.clone();
        assert_eq!(
            p.bind(),
            Err(BindError::UnknownLocal {
                at: AT,
                index: 0,
                local: 0
            })
        );

        f.body = vec![Instr::Branch {
            op: crate::instr::BranchOp::Br,
            target: Label(3),
        }];
        let mut p = program_with(f.clone());
        p.types = types.clone();
        assert_eq!(
            p.bind(),
            Err(BindError::UnknownLabel {
                at: AT,
                index: 0,
                label: Label(3)
            })
        );

        f.body = vec![Instr::None(NoneOp::Ret)];
        f.labels = vec![1];
        let mut p = program_with(f);
        p.types = types;
        assert_eq!(
            p.bind(),
            Err(BindError::LabelPastEnd {
                at: AT,
                label: Label(0)
            })
        );
    }

    #[test]
    fn cross_module_call_requires_import() {
        let mut types = TypeTable::new();
        let callee = FuncRef {
            module: ModuleId(1),
            index: 0,
        };
        let caller = void_fn(
            &mut types,
            vec![
                Instr::Function {
                    op: FuncOp::Call,
                    func: callee,
                },
                Instr::None(NoneOp::Ret),
            ],
        );
        let target = void_fn(&mut types, vec![Instr::None(NoneOp::Ret)]);
        let mut p = Program {
            types,
            modules: vec![
                ModuleDef {
                    name: "a".into(),
                    imports: vec![],
                    functions: vec![caller],
                    entry: None,
                },
                ModuleDef {
                    name: "b".into(),
                    imports: vec![],
                    functions: vec![target],
                    entry: None,
                },
            ],
        };
        assert_eq!(
            p.bind(),
            Err(BindError::NotImported {
                at: AT,
                index: 0,
                module: ModuleId(1)
            })
        );
        p.modules[0].imports.push(ModuleId(1));
        assert_eq!(p.bind(), Ok(()));
        assert_eq!(p.qualified_name(callee), "b::f");
    }

    #[test]
    fn empty_bodies_and_syscall_bodies_are_rejected() {
        let mut types = TypeTable::new();
        let f = void_fn(&mut types, vec![]);
        let mut p = program_with(f.clone());
        p.types = types.clone();
        assert_eq!(p.bind(), Err(BindError::EmptyBody { at: AT }));

        let mut sys = void_fn(&mut types, vec![Instr::None(NoneOp::Ret)]);
        sys.kind = FunctionKind::Syscall(7);
        let mut p = program_with(sys);
        p.types = types;
        assert_eq!(p.bind(), Err(BindError::SyscallWithBody { at: AT }));
    }
}
