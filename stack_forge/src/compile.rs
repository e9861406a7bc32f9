// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The whole back end in one call: bind, verify, generate, link.

use core::fmt;

use log::debug;

use crate::codegen::{CodegenConfig, EncodeError, generate_program};
use crate::diagnostics::Diagnostic;
use crate::link::{LinkError, LinkedModule, Linker};
use crate::program::{BindError, Program};
use crate::types::TypeError;
use crate::verifier::{VerifyConfig, VerifyError, verify_program};

/// Settings for every stage of [`compile_program`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CompileConfig {
    /// Verifier limits.
    pub verify: VerifyConfig,
    /// Code generator limits.
    pub codegen: CodegenConfig,
}

/// Any failure of the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileError {
    /// A type could not be interned.
    Type(TypeError),
    /// A symbol did not resolve.
    Bind(BindError),
    /// A function failed verification.
    Verify(VerifyError),
    /// A module could not be encoded.
    Encode(EncodeError),
    /// Modules could not be linked.
    Link(LinkError),
}

impl CompileError {
    /// Converts this error into a diagnostic.
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Type(e) => e.to_diagnostic(),
            Self::Bind(e) => e.to_diagnostic(),
            Self::Verify(e) => e.to_diagnostic(),
            Self::Encode(e) => e.to_diagnostic(),
            Self::Link(e) => e.to_diagnostic(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(e) => write!(f, "type error: {e}"),
            Self::Bind(e) => write!(f, "binding failed: {e}"),
            Self::Verify(e) => write!(f, "verification failed: {e}"),
            Self::Encode(e) => write!(f, "encoding failed: {e}"),
            Self::Link(e) => write!(f, "linking failed: {e}"),
        }
    }
}

impl core::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Type(e) => Some(e),
            Self::Bind(e) => Some(e),
            Self::Verify(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Link(e) => Some(e),
        }
    }
}

impl From<TypeError> for CompileError {
    fn from(e: TypeError) -> Self {
        Self::Type(e)
    }
}

impl From<BindError> for CompileError {
    fn from(e: BindError) -> Self {
        Self::Bind(e)
    }
}

impl From<VerifyError> for CompileError {
    fn from(e: VerifyError) -> Self {
        Self::Verify(e)
    }
}

impl From<EncodeError> for CompileError {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e)
    }
}

impl From<LinkError> for CompileError {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

/// Compiles every module of `program` into a linked image, in module order.
pub fn compile_program(
    program: &Program,
    cfg: &CompileConfig,
) -> Result<Vec<LinkedModule>, CompileError> {
    program.bind()?;
    let verified = verify_program(program, &cfg.verify)?;
    let compiled = generate_program(program, &verified, &cfg.codegen)?;
    let linked = Linker::new(compiled).link_all()?;
    debug!("compiled {} modules", linked.len());
    Ok(linked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{FunctionSig, ProgramBuilder};
    use crate::diagnostics::DiagnosticCategory;
    use crate::types::TypeId;

    #[test]
    fn compiles_and_links() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("main");
        let mut f = pb.function(m, FunctionSig::new("main", TypeId::I32)).unwrap();
        let main = f.func();
        f.ldc_i32(0).ret();
        pb.define(f).unwrap();
        pb.set_entry(main).unwrap();
        let program = pb.build().unwrap();

        let linked = compile_program(&program, &CompileConfig::default()).unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].name, "main");
        assert_eq!(linked[0].module_count, 1);
        assert_eq!(&linked[0].image[4..8], &[0x0D, 0xFF, 8, 0]);
    }

    #[test]
    fn stage_errors_become_diagnostics() {
        let mut pb = ProgramBuilder::new();
        let m = pb.module("main");
        let mut f = pb.function(m, FunctionSig::new("f", TypeId::I32)).unwrap();
        f.add().ret();
        pb.define(f).unwrap();
        let program = pb.build().unwrap();

        let err = compile_program(&program, &CompileConfig::default()).unwrap_err();
        assert!(matches!(err, CompileError::Verify(VerifyError::StackUnderflow { .. })));
        let d = err.to_diagnostic();
        assert!(d.is_error());
        assert_eq!(d.category, DiagnosticCategory::Verification);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_round_trips_through_json() {
        let cfg = CompileConfig {
            verify: VerifyConfig {
                max_instructions: 100,
                report_unreachable: false,
            },
            codegen: CodegenConfig {
                max_image_len: 4096,
            },
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(serde_json::from_str::<CompileConfig>(&json).unwrap(), cfg);
        let partial: CompileConfig = serde_json::from_str(r#"{"codegen":{}}"#).unwrap();
        assert_eq!(partial, CompileConfig::default());
    }
}
