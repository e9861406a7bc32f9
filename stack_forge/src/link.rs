// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Content-addressed module linking.
//!
//! A module is named by its [`Fingerprint`]: the first 12 bytes of the SHA-256 of its final
//! image. Since that image embeds the fingerprints of its imports, a module can only be linked
//! after all of its imports are. [`Linker::link`] recurses through imports depth first,
//! memoizes finished modules and rejects import cycles.

use core::fmt;

use hashbrown::{HashMap, HashSet};
use log::{debug, trace};

use crate::codegen::CompiledModule;
use crate::diagnostics::{Diagnostic, DiagnosticCategory};
use crate::format::{Fingerprint, HEADER_LEN, IMPORT_SLOT_LEN, MODULE_COUNT_OFFSET, Token};
use crate::opcode::Features;
use crate::program::ModuleId;

/// A linking error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkError {
    /// A module (transitively) imports itself.
    CircularImport {
        /// The module being linked when the cycle was found.
        module: ModuleId,
        /// The import chain that closes the cycle, starting and ending with the same module.
        cycle: Vec<ModuleId>,
    },
    /// No compiled module has this id.
    UnknownModule {
        /// The module.
        module: ModuleId,
    },
    /// The import closure has more modules than the header can count.
    ModuleCountOverflow {
        /// The module.
        module: ModuleId,
        /// Size of its import closure.
        count: usize,
    },
    /// A cross-module token could not be patched.
    BadFixup {
        /// The module.
        module: ModuleId,
        /// Offset of the token.
        at: usize,
    },
}

impl LinkError {
    /// Converts this error into a diagnostic.
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            Self::CircularImport { .. } => 4001,
            Self::UnknownModule { .. } => 4002,
            Self::ModuleCountOverflow { .. } => 4003,
            Self::BadFixup { .. } => 4004,
        };
        Diagnostic::error(DiagnosticCategory::Linking, code, self.to_string())
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircularImport { module, cycle } => {
                write!(f, "circular import while linking module {}: ", module.0)?;
                for (i, m) in cycle.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" -> ")?;
                    }
                    write!(f, "{}", m.0)?;
                }
                Ok(())
            }
            Self::UnknownModule { module } => write!(f, "unknown module {}", module.0),
            Self::ModuleCountOverflow { module, count } => write!(
                f,
                "module {}: import closure of {count} modules exceeds 255",
                module.0
            ),
            Self::BadFixup { module, at } => {
                write!(f, "module {}: cannot patch import token at {at}", module.0)
            }
        }
    }
}

impl core::error::Error for LinkError {}

/// A linked, immutable module image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkedModule {
    /// The source module.
    pub module: ModuleId,
    /// The source module's name.
    pub name: String,
    /// Content address of [`LinkedModule::image`].
    pub fingerprint: Fingerprint,
    /// The final image, import slots and cross-module tokens patched.
    pub image: Vec<u8>,
    /// Capabilities the module's code needs.
    pub features: Features,
    /// Size of the import closure, this module included.
    pub module_count: u8,
    /// Direct imports, in import-table order.
    pub imports: Vec<ModuleId>,
    /// Fingerprints written to the import table.
    pub import_fingerprints: Vec<Fingerprint>,
    /// Offset of each function's descriptor.
    pub function_offsets: Vec<u32>,
    /// Per function, offset of each instruction.
    pub instruction_offsets: Vec<Vec<u32>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Links a set of compiled modules.
#[derive(Debug)]
pub struct Linker {
    compiled: Vec<CompiledModule>,
    slots: HashMap<ModuleId, usize>,
    marks: Vec<Mark>,
    linked: Vec<Option<LinkedModule>>,
    closures: Vec<HashSet<ModuleId>>,
    path: Vec<ModuleId>,
}

impl Linker {
    /// Creates a linker over `modules`. A later module with the same id replaces an earlier one.
    #[must_use]
    pub fn new(modules: Vec<CompiledModule>) -> Self {
        let slots = modules
            .iter()
            .enumerate()
            .map(|(i, m)| (m.module, i))
            .collect();
        let len = modules.len();
        Self {
            compiled: modules,
            slots,
            marks: vec![Mark::Unvisited; len],
            linked: vec![None; len],
            closures: vec![HashSet::new(); len],
            path: Vec::new(),
        }
    }

    fn slot(&self, module: ModuleId) -> Result<usize, LinkError> {
        self.slots
            .get(&module)
            .copied()
            .ok_or(LinkError::UnknownModule { module })
    }

    /// Links `module` and, first, everything it imports. Returns its fingerprint.
    ///
    /// On failure, modules left half-linked return to unvisited, so linking any of them again
    /// reports the same error.
    pub fn link(&mut self, module: ModuleId) -> Result<Fingerprint, LinkError> {
        let result = self.visit(module);
        if result.is_err() {
            for mark in &mut self.marks {
                if *mark == Mark::InProgress {
                    *mark = Mark::Unvisited;
                }
            }
            self.path.clear();
        }
        result
    }

    fn visit(&mut self, module: ModuleId) -> Result<Fingerprint, LinkError> {
        let slot = self.slot(module)?;
        match self.marks[slot] {
            Mark::Done => {
                if let Some(linked) = &self.linked[slot] {
                    return Ok(linked.fingerprint);
                }
            }
            Mark::InProgress => {
                let start = self.path.iter().position(|&m| m == module).unwrap_or(0);
                let mut cycle = self.path[start..].to_vec();
                cycle.push(module);
                return Err(LinkError::CircularImport {
                    module: self.path.last().copied().unwrap_or(module),
                    cycle,
                });
            }
            Mark::Unvisited => {}
        }

        self.marks[slot] = Mark::InProgress;
        self.path.push(module);
        trace!("linking module {}", self.compiled[slot].name);

        let imports = self.compiled[slot].imports.clone();
        let mut import_fingerprints = Vec::with_capacity(imports.len());
        let mut closure = HashSet::new();
        closure.insert(module);
        for &dep in &imports {
            import_fingerprints.push(self.visit(dep)?);
            let dep_slot = self.slot(dep)?;
            closure.extend(self.closures[dep_slot].iter().copied());
        }
        let module_count = u8::try_from(closure.len()).map_err(|_| LinkError::ModuleCountOverflow {
            module,
            count: closure.len(),
        })?;

        let linked = self.patch(slot, import_fingerprints, module_count)?;
        debug!(
            "linked module {} as {} ({} bytes, {} modules)",
            linked.name,
            linked.fingerprint,
            linked.image.len(),
            module_count
        );
        let fingerprint = linked.fingerprint;
        self.linked[slot] = Some(linked);
        self.closures[slot] = closure;
        self.marks[slot] = Mark::Done;
        self.path.pop();
        Ok(fingerprint)
    }

    /// Writes the import table, module count and cross-module tokens, then fingerprints.
    fn patch(
        &self,
        slot: usize,
        import_fingerprints: Vec<Fingerprint>,
        module_count: u8,
    ) -> Result<LinkedModule, LinkError> {
        let compiled = &self.compiled[slot];
        let module = compiled.module;
        let mut image = compiled.image.clone();

        for (i, fp) in import_fingerprints.iter().enumerate() {
            let start = HEADER_LEN + i * IMPORT_SLOT_LEN;
            let at = image
                .get_mut(start..start + IMPORT_SLOT_LEN)
                .ok_or(LinkError::BadFixup { module, at: start })?;
            at.copy_from_slice(fp.as_bytes());
        }
        let count = image
            .get_mut(MODULE_COUNT_OFFSET)
            .ok_or(LinkError::BadFixup {
                module,
                at: MODULE_COUNT_OFFSET,
            })?;
        *count = module_count;

        for fixup in &compiled.fixups {
            let bad = LinkError::BadFixup {
                module,
                at: fixup.at,
            };
            let offset = compiled
                .imports
                .get(usize::from(fixup.import))
                .and_then(|dep| self.slots.get(dep))
                .and_then(|&dep_slot| self.linked[dep_slot].as_ref())
                .and_then(|dep| dep.function_offsets.get(fixup.target.index as usize))
                .and_then(|&o| u16::try_from(o).ok())
                .ok_or_else(|| bad.clone())?;
            Token {
                module: fixup.import,
                offset,
            }
            .patch(&mut image, fixup.at)
            .map_err(|_| bad)?;
        }

        Ok(LinkedModule {
            module,
            name: compiled.name.clone(),
            fingerprint: Fingerprint::of(&image),
            image,
            features: compiled.features,
            module_count,
            imports: compiled.imports.clone(),
            import_fingerprints,
            function_offsets: compiled.function_offsets.clone(),
            instruction_offsets: compiled.instruction_offsets.clone(),
        })
    }

    /// The linked form of `module`, once [`Linker::link`] has succeeded for it.
    #[must_use]
    pub fn linked(&self, module: ModuleId) -> Option<&LinkedModule> {
        self.linked[*self.slots.get(&module)?].as_ref()
    }

    /// Links every module and returns them in input order.
    pub fn link_all(mut self) -> Result<Vec<LinkedModule>, LinkError> {
        let ids: Vec<ModuleId> = self.compiled.iter().map(|m| m.module).collect();
        for &id in &ids {
            self.link(id)?;
        }
        ids.into_iter()
            .map(|id| {
                let slot = self.slot(id)?;
                self.linked[slot]
                    .take()
                    .ok_or(LinkError::UnknownModule { module: id })
            })
            .collect()
    }
}
