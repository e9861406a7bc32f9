// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Program builder ("assembler") for `stack_forge`.
//!
//! This is a small, public helper for constructing bound [`Program`]s without hand-assembling label
//! tables and signature types. It stands in for the front end and binder in tests, benches and
//! prototypes.
//!
//! ## Example
//!
//! ```
//! use stack_forge::asm::{FunctionSig, ProgramBuilder};
//! use stack_forge::types::TypeId;
//!
//! let mut pb = ProgramBuilder::new();
//! let m = pb.module("math");
//! let sig = FunctionSig::new("add", TypeId::I32)
//!     .param("a", TypeId::I32)
//!     .param("b", TypeId::I32);
//! let mut f = pb.function(m, sig)?;
//! f.ldarg(0).ldarg(1).add().ret();
//! pb.define(f)?;
//! let _program = pb.build()?;
//! # Ok::<(), stack_forge::asm::BuildError>(())
//! ```

use core::fmt;

use crate::instr::{
    AccessOp, BranchOp, Constant, FieldRef, FuncOp, Instr, Label, NoneOp, TypeOp,
};
use crate::program::{
    BindError, FuncRef, FunctionDef, FunctionKind, ModuleDef, ModuleId, Program, Variable,
};
use crate::types::{TypeError, TypeId, TypeTable};

/// A [`ProgramBuilder`] error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildError {
    /// Interning a signature type failed.
    Type(TypeError),
    /// A module id was out of range for the builder.
    BadModule {
        /// The invalid module.
        module: ModuleId,
    },
    /// A function reference was out of range for the builder.
    BadFuncRef {
        /// The invalid function.
        func: FuncRef,
    },
    /// A function body was defined twice.
    AlreadyDefined {
        /// The function.
        func: FuncRef,
    },
    /// A function was declared but never defined.
    MissingFunctionBody {
        /// The function.
        func: FuncRef,
    },
    /// A label was referenced but never placed.
    UnresolvedLabel {
        /// The function.
        func: FuncRef,
        /// The label.
        label: Label,
    },
    /// A label was placed twice or does not belong to the function.
    BadLabel {
        /// The function.
        func: FuncRef,
        /// The label.
        label: Label,
    },
    /// The built program failed binding.
    Bind(BindError),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(e) => write!(f, "type error: {e}"),
            Self::BadModule { module } => write!(f, "invalid module id {}", module.0),
            Self::BadFuncRef { func } => write!(f, "invalid function {func}"),
            Self::AlreadyDefined { func } => write!(f, "function {func} is already defined"),
            Self::MissingFunctionBody { func } => write!(f, "missing function body for {func}"),
            Self::UnresolvedLabel { func, label } => {
                write!(f, "{func}: label L{} was never placed", label.0)
            }
            Self::BadLabel { func, label } => write!(f, "{func}: cannot place label L{}", label.0),
            Self::Bind(e) => write!(f, "binding failed: {e}"),
        }
    }
}

impl core::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Type(e) => Some(e),
            Self::Bind(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TypeError> for BuildError {
    fn from(e: TypeError) -> Self {
        Self::Type(e)
    }
}

impl From<BindError> for BuildError {
    fn from(e: BindError) -> Self {
        Self::Bind(e)
    }
}

/// Function signature metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionSig {
    /// Function name.
    pub name: String,
    /// Parameters, in order.
    pub params: Vec<Variable>,
    /// Locals, in order.
    pub locals: Vec<Variable>,
    /// Return type.
    pub ret: TypeId,
    /// Whether locals are zeroed on entry.
    pub zero_init_locals: bool,
}

impl FunctionSig {
    /// Creates a signature with no parameters or locals.
    #[must_use]
    pub fn new(name: impl Into<String>, ret: TypeId) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            locals: Vec::new(),
            ret,
            zero_init_locals: false,
        }
    }

    /// Appends a parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, ty: TypeId) -> Self {
        self.params.push(Variable::new(name, ty));
        self
    }

    /// Appends a local.
    #[must_use]
    pub fn local(mut self, name: impl Into<String>, ty: TypeId) -> Self {
        self.locals.push(Variable::new(name, ty));
        self
    }

    /// Sets whether locals are zeroed on entry.
    #[must_use]
    pub fn zero_init(mut self, zero: bool) -> Self {
        self.zero_init_locals = zero;
        self
    }
}

/// Convenience builder for constructing bound [`Program`]s.
///
/// Functions are declared first (so they can be referenced before their bodies exist) and
/// defined later from a [`FunctionBuilder`].
#[derive(Clone, Debug, Default)]
pub struct ProgramBuilder {
    types: TypeTable,
    modules: Vec<ModuleDef>,
    defined: Vec<Vec<bool>>,
}

impl ProgramBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the type table.
    #[must_use]
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Returns a mutable reference to the type table.
    pub fn types_mut(&mut self) -> &mut TypeTable {
        &mut self.types
    }

    /// Adds an empty module and returns its id.
    pub fn module(&mut self, name: &str) -> ModuleId {
        let id = ModuleId(u32::try_from(self.modules.len()).unwrap_or(u32::MAX));
        self.modules.push(ModuleDef {
            name: name.into(),
            imports: Vec::new(),
            functions: Vec::new(),
            entry: None,
        });
        self.defined.push(Vec::new());
        id
    }

    /// Makes `module` import `dependency` (once).
    pub fn import(&mut self, module: ModuleId, dependency: ModuleId) -> Result<(), BuildError> {
        if (dependency.0 as usize) >= self.modules.len() {
            return Err(BuildError::BadModule { module: dependency });
        }
        let m = self.module_mut(module)?;
        if !m.imports.contains(&dependency) {
            m.imports.push(dependency);
        }
        Ok(())
    }

    /// Declares a bytecode function and returns its reference.
    ///
    /// This is useful when assembling mutually recursive or out-of-order functions: declare all
    /// functions up front, then define each with [`ProgramBuilder::body`] and
    /// [`ProgramBuilder::define`].
    pub fn declare(&mut self, module: ModuleId, sig: FunctionSig) -> Result<FuncRef, BuildError> {
        self.push(module, sig, FunctionKind::Bytecode)
    }

    /// Declares a bytecode function and returns an empty body builder for it.
    pub fn function(
        &mut self,
        module: ModuleId,
        sig: FunctionSig,
    ) -> Result<FunctionBuilder, BuildError> {
        let func = self.declare(module, sig)?;
        Ok(FunctionBuilder::new(func))
    }

    /// Declares an extern function forwarded to VM system call `id`.
    pub fn syscall(
        &mut self,
        module: ModuleId,
        sig: FunctionSig,
        id: u16,
    ) -> Result<FuncRef, BuildError> {
        let func = self.push(module, sig, FunctionKind::Syscall(id))?;
        self.defined[func.module.0 as usize][func.index as usize] = true;
        Ok(func)
    }

    /// Returns an empty body builder for a declared function.
    #[must_use]
    pub fn body(&self, func: FuncRef) -> FunctionBuilder {
        FunctionBuilder::new(func)
    }

    /// Defines the body of a previously declared function.
    pub fn define(&mut self, f: FunctionBuilder) -> Result<(), BuildError> {
        let func = f.func;
        let (body, labels) = f.finish()?;
        let Some(defined) = self
            .defined
            .get_mut(func.module.0 as usize)
            .and_then(|m| m.get_mut(func.index as usize))
        else {
            return Err(BuildError::BadFuncRef { func });
        };
        if *defined {
            return Err(BuildError::AlreadyDefined { func });
        }
        *defined = true;
        let slot = &mut self.modules[func.module.0 as usize].functions[func.index as usize];
        slot.body = body;
        slot.labels = labels;
        Ok(())
    }

    /// Sets the entry point of the function's module.
    pub fn set_entry(&mut self, func: FuncRef) -> Result<(), BuildError> {
        let m = self.module_mut(func.module)?;
        if (func.index as usize) >= m.functions.len() {
            return Err(BuildError::BadFuncRef { func });
        }
        m.entry = Some(func.index);
        Ok(())
    }

    /// Builds and binds the [`Program`].
    pub fn build(self) -> Result<Program, BuildError> {
        for (m, defined) in self.defined.iter().enumerate() {
            if let Some(i) = defined.iter().position(|d| !d) {
                return Err(BuildError::MissingFunctionBody {
                    func: FuncRef {
                        module: ModuleId(u32::try_from(m).unwrap_or(u32::MAX)),
                        index: u32::try_from(i).unwrap_or(u32::MAX),
                    },
                });
            }
        }
        let program = Program {
            types: self.types,
            modules: self.modules,
        };
        program.bind()?;
        Ok(program)
    }

    fn module_mut(&mut self, module: ModuleId) -> Result<&mut ModuleDef, BuildError> {
        self.modules
            .get_mut(module.0 as usize)
            .ok_or(BuildError::BadModule { module })
    }

    fn push(
        &mut self,
        module: ModuleId,
        sig: FunctionSig,
        kind: FunctionKind,
    ) -> Result<FuncRef, BuildError> {
        let param_types: Vec<TypeId> = sig.params.iter().map(|p| p.ty).collect();
        let signature = self.types.function(&param_types, sig.ret)?;
        let m = self.module_mut(module)?;
        let func = FuncRef {
            module,
            index: u32::try_from(m.functions.len()).unwrap_or(u32::MAX),
        };
        m.functions.push(FunctionDef {
            name: sig.name,
            params: sig.params,
            locals: sig.locals,
            ret: sig.ret,
            signature,
            labels: Vec::new(),
            body: Vec::new(),
            kind,
            zero_init_locals: sig.zero_init_locals,
        });
        self.defined[module.0 as usize].push(false);
        Ok(func)
    }
}

/// Instruction-stream builder for one function body.
#[derive(Clone, Debug)]
pub struct FunctionBuilder {
    func: FuncRef,
    body: Vec<Instr>,
    labels: Vec<Option<u32>>,
}

macro_rules! none_ops {
    ($($(#[$doc:meta])* $name:ident => $op:ident,)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self) -> &mut Self {
                self.push(Instr::None(NoneOp::$op))
            }
        )*
    };
}

macro_rules! branch_ops {
    ($($(#[$doc:meta])* $name:ident => $op:ident,)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self, target: Label) -> &mut Self {
                self.push(Instr::Branch {
                    op: BranchOp::$op,
                    target,
                })
            }
        )*
    };
}

macro_rules! type_ops {
    ($($(#[$doc:meta])* $name:ident => $op:ident,)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self, ty: TypeId) -> &mut Self {
                self.push(Instr::Type { op: TypeOp::$op, ty })
            }
        )*
    };
}

impl FunctionBuilder {
    fn new(func: FuncRef) -> Self {
        Self {
            func,
            body: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// The function being built.
    #[must_use]
    pub fn func(&self) -> FuncRef {
        self.func
    }

    /// Index the next instruction will get.
    #[must_use]
    pub fn pc(&self) -> u32 {
        u32::try_from(self.body.len()).unwrap_or(u32::MAX)
    }

    /// Allocates a new label.
    #[must_use]
    pub fn label(&mut self) -> Label {
        let id = Label(u32::try_from(self.labels.len()).unwrap_or(u32::MAX));
        self.labels.push(None);
        id
    }

    /// Attaches `label` to the next instruction.
    pub fn place(&mut self, label: Label) -> Result<(), BuildError> {
        let pc = self.pc();
        match self.labels.get_mut(label.0 as usize) {
            Some(slot) if slot.is_none() => {
                *slot = Some(pc);
                Ok(())
            }
            _ => Err(BuildError::BadLabel {
                func: self.func,
                label,
            }),
        }
    }

    /// Appends an arbitrary instruction.
    pub fn push(&mut self, instr: Instr) -> &mut Self {
        self.body.push(instr);
        self
    }

    fn finish(self) -> Result<(Vec<Instr>, Vec<u32>), BuildError> {
        let mut labels = Vec::with_capacity(self.labels.len());
        for (i, slot) in self.labels.iter().enumerate() {
            let Some(pc) = *slot else {
                return Err(BuildError::UnresolvedLabel {
                    func: self.func,
                    label: Label(u32::try_from(i).unwrap_or(u32::MAX)),
                });
            };
            labels.push(pc);
        }
        Ok((self.body, labels))
    }

    none_ops! {
        /// `nop`.
        nop => Nop,
        /// `add`.
        add => Add,
        /// `sub`.
        sub => Sub,
        /// `mul`.
        mul => Mul,
        /// `div`.
        div => Div,
        /// `div.un`.
        div_un => DivUn,
        /// `rem`.
        rem => Rem,
        /// `rem.un`.
        rem_un => RemUn,
        /// `and`.
        and => And,
        /// `or`.
        or => Or,
        /// `xor`.
        xor => Xor,
        /// `shl`.
        shl => Shl,
        /// `shr`.
        shr => Shr,
        /// `shr.un`.
        shr_un => ShrUn,
        /// `neg`.
        neg => Neg,
        /// `not`.
        not => Not,
        /// `ceq`.
        ceq => Ceq,
        /// `cgt`.
        cgt => Cgt,
        /// `cgt.un`.
        cgt_un => CgtUn,
        /// `clt`.
        clt => Clt,
        /// `clt.un`.
        clt_un => CltUn,
        /// `dup`.
        dup => Dup,
        /// `pop`.
        pop => Pop,
        /// `ret`.
        ret => Ret,
        /// `ldnull`.
        ldnull => LdNull,
    }

    branch_ops! {
        /// `br`.
        br => Br,
        /// `brtrue`.
        brtrue => BrTrue,
        /// `brfalse`.
        brfalse => BrFalse,
        /// `beq`.
        beq => Beq,
        /// `bne`.
        bne => Bne,
        /// `bge`.
        bge => Bge,
        /// `bge.un`.
        bge_un => BgeUn,
        /// `bgt`.
        bgt => Bgt,
        /// `bgt.un`.
        bgt_un => BgtUn,
        /// `ble`.
        ble => Ble,
        /// `ble.un`.
        ble_un => BleUn,
        /// `blt`.
        blt => Blt,
        /// `blt.un`.
        blt_un => BltUn,
    }

    type_ops! {
        /// `conv.T`.
        conv => Conv,
        /// `ldind.T`.
        ldind => LdInd,
        /// `stind.T`.
        stind => StInd,
        /// `ldelem.T`.
        ldelem => LdElem,
        /// `stelem.T`.
        stelem => StElem,
        /// `ldelema.T`.
        ldelema => LdElemA,
        /// `calli` through a value of function type `ty`.
        calli => CallI,
    }

    /// `ldc.i4`.
    pub fn ldc_i32(&mut self, v: i32) -> &mut Self {
        self.push(Instr::Constant(Constant::I32(v)))
    }

    /// `ldc.i8`.
    pub fn ldc_i64(&mut self, v: i64) -> &mut Self {
        self.push(Instr::Constant(Constant::I64(v)))
    }

    /// `ldc.r4`.
    pub fn ldc_f32(&mut self, v: f32) -> &mut Self {
        self.push(Instr::Constant(Constant::F32(v.to_bits())))
    }

    /// `ldc.r8`.
    pub fn ldc_f64(&mut self, v: f64) -> &mut Self {
        self.push(Instr::Constant(Constant::F64(v.to_bits())))
    }

    /// `ldarg`.
    pub fn ldarg(&mut self, index: u16) -> &mut Self {
        self.push(Instr::Argument {
            op: AccessOp::Load,
            index,
        })
    }

    /// `starg`.
    pub fn starg(&mut self, index: u16) -> &mut Self {
        self.push(Instr::Argument {
            op: AccessOp::Store,
            index,
        })
    }

    /// `ldarga`.
    pub fn ldarga(&mut self, index: u16) -> &mut Self {
        self.push(Instr::Argument {
            op: AccessOp::Address,
            index,
        })
    }

    /// `ldloc`.
    pub fn ldloc(&mut self, index: u16) -> &mut Self {
        self.push(Instr::Local {
            op: AccessOp::Load,
            index,
        })
    }

    /// `stloc`.
    pub fn stloc(&mut self, index: u16) -> &mut Self {
        self.push(Instr::Local {
            op: AccessOp::Store,
            index,
        })
    }

    /// `ldloca`.
    pub fn ldloca(&mut self, index: u16) -> &mut Self {
        self.push(Instr::Local {
            op: AccessOp::Address,
            index,
        })
    }

    /// `ldfld`.
    pub fn ldfld(&mut self, owner: TypeId, index: u16) -> &mut Self {
        self.field(AccessOp::Load, owner, index)
    }

    /// `stfld`.
    pub fn stfld(&mut self, owner: TypeId, index: u16) -> &mut Self {
        self.field(AccessOp::Store, owner, index)
    }

    /// `ldflda`.
    pub fn ldflda(&mut self, owner: TypeId, index: u16) -> &mut Self {
        self.field(AccessOp::Address, owner, index)
    }

    fn field(&mut self, op: AccessOp, owner: TypeId, index: u16) -> &mut Self {
        self.push(Instr::Field {
            op,
            field: FieldRef { owner, index },
        })
    }

    /// `call`.
    pub fn call(&mut self, func: FuncRef) -> &mut Self {
        self.push(Instr::Function {
            op: FuncOp::Call,
            func,
        })
    }

    /// `newobj`.
    pub fn newobj(&mut self, ctor: FuncRef) -> &mut Self {
        self.push(Instr::Function {
            op: FuncOp::NewObj,
            func: ctor,
        })
    }

    /// `ldftn`.
    pub fn ldftn(&mut self, func: FuncRef) -> &mut Self {
        self.push(Instr::Function {
            op: FuncOp::LdFtn,
            func,
        })
    }
}
