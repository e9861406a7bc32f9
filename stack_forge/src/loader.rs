// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handing linked modules to a VM, and writing them to disk.
//!
//! The VM itself lives elsewhere; [`VmAbi`] is the narrow interface this crate calls. A VM
//! accepts modules by fingerprint and resolves import slots against the modules it already
//! holds, so [`deploy`] imports dependencies before their dependents.

use core::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hashbrown::HashSet;
use log::debug;

use crate::format::Fingerprint;
use crate::link::LinkedModule;
use crate::opcode::Features;
use crate::program::ModuleId;

/// The VM-side calls used to load and start a program.
///
/// The VM provides:
/// - an instance handle per initialized machine
/// - the set of opcode capabilities it implements
///
/// The loader provides:
/// - every module the entry module needs, each exactly once, dependencies first
pub trait VmAbi {
    /// An initialized VM instance.
    type Handle: Copy;
    /// Error reported when the VM rejects a module.
    type Error;

    /// Creates an instance with the given heap and stack sizes in bytes.
    fn initialize(&mut self, heap_size: u32, stack_size: u32) -> Self::Handle;

    /// Loads a module image under its fingerprint.
    fn import_module(
        &mut self,
        handle: Self::Handle,
        fingerprint: Fingerprint,
        image: &[u8],
    ) -> Result<(), Self::Error>;

    /// Runs the entry point of the last imported module and returns its exit code.
    fn run(&mut self, handle: Self::Handle) -> i32;

    /// Opcode capabilities this VM implements.
    fn capabilities(&self) -> Features;
}

/// A [`deploy`] error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeployError<E> {
    /// A module (or one of its imports) is not among the deployed modules.
    UnknownModule {
        /// The missing module.
        module: ModuleId,
    },
    /// A module uses opcodes the VM does not implement.
    Unsupported {
        /// The module.
        module: ModuleId,
        /// Capabilities the VM lacks.
        missing: Features,
    },
    /// The VM rejected a module.
    Import {
        /// The module.
        module: ModuleId,
        /// The VM's error.
        error: E,
    },
}

impl<E: fmt::Display> fmt::Display for DeployError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownModule { module } => write!(f, "module {} was not linked", module.0),
            Self::Unsupported { module, missing } => {
                write!(f, "module {} needs unsupported features {missing}", module.0)
            }
            Self::Import { module, error } => {
                write!(f, "VM rejected module {}: {error}", module.0)
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> core::error::Error for DeployError<E> {}

/// Imports `root` and everything it transitively imports into `vm`, dependencies first.
///
/// Modules with equal fingerprints are imported once. Returns the fingerprints in import order;
/// the last one is `root`'s.
pub fn deploy<V: VmAbi>(
    vm: &mut V,
    handle: V::Handle,
    modules: &[LinkedModule],
    root: ModuleId,
) -> Result<Vec<Fingerprint>, DeployError<V::Error>> {
    let capabilities = vm.capabilities();
    let mut order = Vec::new();
    post_order::<V::Error>(modules, root, &mut HashSet::new(), &mut order)?;

    let mut imported = Vec::with_capacity(order.len());
    for m in order {
        if !m.features.is_subset_of(capabilities) {
            return Err(DeployError::Unsupported {
                module: m.module,
                missing: Features::from_bits(m.features.bits() & !capabilities.bits()),
            });
        }
        debug!("importing module {} as {}", m.name, m.fingerprint);
        vm.import_module(handle, m.fingerprint, &m.image)
            .map_err(|error| DeployError::Import {
                module: m.module,
                error,
            })?;
        imported.push(m.fingerprint);
    }
    Ok(imported)
}

fn post_order<'a, E>(
    modules: &'a [LinkedModule],
    module: ModuleId,
    seen: &mut HashSet<Fingerprint>,
    out: &mut Vec<&'a LinkedModule>,
) -> Result<(), DeployError<E>> {
    let m = modules
        .iter()
        .find(|m| m.module == module)
        .ok_or(DeployError::UnknownModule { module })?;
    if seen.contains(&m.fingerprint) {
        return Ok(());
    }
    // Linked modules are acyclic, so marking on the way out is enough.
    for &dep in &m.imports {
        post_order(modules, dep, seen, out)?;
    }
    if seen.insert(m.fingerprint) {
        out.push(m);
    }
    Ok(())
}

/// File output settings.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OutputConfig {
    /// Extension of written module files, without the dot.
    pub extension: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            extension: "sfm".into(),
        }
    }
}

/// The file name `module` is stored under: its hex fingerprint plus the configured extension.
#[must_use]
pub fn module_file_name(module: &LinkedModule, cfg: &OutputConfig) -> String {
    format!("{}.{}", module.fingerprint.to_hex(), cfg.extension)
}

/// Writes `module` into `dir` and returns the path written.
pub fn write_module(dir: &Path, module: &LinkedModule, cfg: &OutputConfig) -> io::Result<PathBuf> {
    let path = dir.join(module_file_name(module, cfg));
    fs::write(&path, &module.image)?;
    debug!("wrote {} ({} bytes)", path.display(), module.image.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{FunctionSig, ProgramBuilder};
    use crate::codegen::{CodegenConfig, generate_program};
    use crate::link::Linker;
    use crate::types::TypeId;
    use crate::verifier::{VerifyConfig, verify_program};

    #[derive(Default)]
    struct RecordingVm {
        capabilities: Features,
        imported: Vec<Fingerprint>,
        reject: Option<Fingerprint>,
    }

    impl VmAbi for RecordingVm {
        type Handle = u32;
        type Error = &'static str;

        fn initialize(&mut self, _heap_size: u32, _stack_size: u32) -> u32 {
            7
        }

        fn import_module(
            &mut self,
            handle: u32,
            fingerprint: Fingerprint,
            _image: &[u8],
        ) -> Result<(), &'static str> {
            assert_eq!(handle, 7);
            if self.reject == Some(fingerprint) {
                return Err("rejected");
            }
            self.imported.push(fingerprint);
            Ok(())
        }

        fn run(&mut self, _handle: u32) -> i32 {
            0
        }

        fn capabilities(&self) -> Features {
            self.capabilities
        }
    }

    /// `app` imports `left` and `right`, which both import `base`.
    fn diamond() -> Vec<LinkedModule> {
        let mut pb = ProgramBuilder::new();
        let base = pb.module("base");
        let left = pb.module("left");
        let right = pb.module("right");
        let app = pb.module("app");
        for (m, deps) in [
            (base, vec![]),
            (left, vec![base]),
            (right, vec![base]),
            (app, vec![left, right]),
        ] {
            for dep in deps {
                pb.import(m, dep).unwrap();
            }
        }
        let mut b = pb.function(base, FunctionSig::new("wide", TypeId::I64)).unwrap();
        b.ldc_i64(1).ret();
        pb.define(b).unwrap();
        for (m, value) in [(left, 1), (right, 2), (app, 3)] {
            let mut f = pb.function(m, FunctionSig::new("f", TypeId::I32)).unwrap();
            f.ldc_i32(value).ret();
            pb.define(f).unwrap();
        }
        let program = pb.build().unwrap();
        let verified = verify_program(&program, &VerifyConfig::default()).unwrap();
        let compiled = generate_program(&program, &verified, &CodegenConfig::default()).unwrap();
        Linker::new(compiled).link_all().unwrap()
    }

    #[test]
    fn deploys_dependencies_first_and_once() {
        let modules = diamond();
        let mut vm = RecordingVm {
            capabilities: Features::INT64,
            ..RecordingVm::default()
        };
        let handle = vm.initialize(1 << 16, 1 << 12);
        let order = deploy(&mut vm, handle, &modules, ModuleId(3)).unwrap();
        let fp = |i: usize| modules[i].fingerprint;
        assert_eq!(order, vec![fp(0), fp(1), fp(2), fp(3)]);
        assert_eq!(vm.imported, order);
        assert_eq!(vm.run(handle), 0);
    }

    #[test]
    fn missing_capabilities_are_reported() {
        let modules = diamond();
        let mut vm = RecordingVm::default();
        assert_eq!(
            deploy(&mut vm, 7, &modules, ModuleId(1)),
            Err(DeployError::Unsupported {
                module: ModuleId(0),
                missing: Features::INT64,
            })
        );
        assert!(vm.imported.is_empty());
    }

    #[test]
    fn vm_rejection_stops_deployment() {
        let modules = diamond();
        let mut vm = RecordingVm {
            capabilities: Features::INT64,
            reject: Some(modules[1].fingerprint),
            ..RecordingVm::default()
        };
        assert_eq!(
            deploy(&mut vm, 7, &modules, ModuleId(3)),
            Err(DeployError::Import {
                module: ModuleId(1),
                error: "rejected",
            })
        );
        assert_eq!(vm.imported, vec![modules[0].fingerprint]);
        assert_eq!(
            deploy(&mut vm, 7, &modules, ModuleId(9)),
            Err(DeployError::UnknownModule {
                module: ModuleId(9)
            })
        );
    }

    #[test]
    fn writes_fingerprint_named_files() {
        let modules = diamond();
        let dir = std::env::temp_dir().join(format!("stack_forge_out_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let cfg = OutputConfig::default();
        let path = write_module(&dir, &modules[3], &cfg).unwrap();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some(format!("{}.sfm", modules[3].fingerprint.to_hex()).as_str())
        );
        assert_eq!(fs::read(&path).unwrap(), modules[3].image);
        fs::remove_dir_all(&dir).unwrap();
    }
}
