// This module implements the translation of a single unit. A Job names the unit, the
// directory its output goes to and, for archive members, the archive it came from (used
// only to label messages). TranslationUnitJob runs a job against a CodegenBackend: the unit
// is probed through the backend loader, native objects are copied through unchanged, and
// bitcode modules get an effective triple (override, embedded, or backend default), an
// effective CPU (explicit or derived from the triple), a PIC/PIE model subject to the
// Windows no-op policy, and their definitional symbols as the must-preserve set. The
// generated code comes back as a temp file for standalone units or as a buffer for archive
// members and is handed to the output placer.

//! Translation of one unit.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::output::{copy_file, place, resolve_output_path, write_buffer};
use crate::core::target::{position_policy, CompilationTarget, PositionPolicy, Triple};
use crate::core::{EmitMode, Error, InputUnit, OutputArtifact, Result};
use crate::llvm::{CodegenBackend, CodegenPlan, LoadError, PreservedSymbolSet};

/// A unit of work: one input and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub unit: InputUnit,
    pub out_dir: PathBuf,
    /// Archive the unit was extracted from.
    pub archive: Option<PathBuf>,
}

impl Job {
    pub fn new(unit: InputUnit, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            unit,
            out_dir: out_dir.into(),
            archive: None,
        }
    }

    pub fn with_archive(mut self, archive: impl Into<PathBuf>) -> Self {
        self.archive = Some(archive.into());
        self
    }

    /// Name used in operator messages, `lib.a(member.o)` for archive members.
    pub fn label(&self) -> String {
        match &self.archive {
            Some(archive) => format!("{}({})", archive.display(), self.unit.name()),
            None => self.unit.name().into_owned(),
        }
    }

    pub fn output_path(&self) -> Result<PathBuf> {
        resolve_output_path(&self.unit.name(), &self.out_dir)
    }
}

/// Runs jobs against a code generator.
pub struct TranslationUnitJob<'a, B: CodegenBackend> {
    backend: &'a B,
    target: &'a CompilationTarget,
}

impl<'a, B: CodegenBackend> TranslationUnitJob<'a, B> {
    pub fn new(backend: &'a B, target: &'a CompilationTarget) -> Self {
        Self { backend, target }
    }

    /// Translate `job`, returning the path of the placed output.
    pub fn run(&self, job: &Job) -> Result<PathBuf> {
        let label = job.label();
        let output = job.output_path()?;
        let bytes = job.unit.contents()?;

        log::info!("codegen'ing {label} to {}", output.display());
        let module = match self.backend.load(&job.unit.name(), &bytes) {
            Ok(module) => module,
            Err(LoadError::NotBitcode) => {
                log::debug!("{label}: native object file, copying");
                let copied = match &job.unit {
                    InputUnit::File { path } => copy_file(path, &output),
                    InputUnit::Member { bytes, .. } => write_buffer(bytes, &output),
                };
                copied.map_err(|e| Error::output(&label, e))?;
                return Ok(output);
            }
            Err(LoadError::Invalid(message)) => {
                return Err(Error::Load {
                    path: label,
                    message,
                })
            }
        };

        let plan = self.plan(&module, &label);
        let backend_error = |message| Error::Backend {
            path: label.clone(),
            message,
        };

        let artifact = match job.unit.emit_mode() {
            EmitMode::File => OutputArtifact::TempFile(
                self.backend
                    .compile_to_file(&module, &plan)
                    .map_err(backend_error)?,
            ),
            EmitMode::Memory => OutputArtifact::Buffer(
                self.backend
                    .compile_to_memory(&module, &plan)
                    .map_err(backend_error)?,
            ),
        };
        let temp = match &artifact {
            OutputArtifact::TempFile(path) => Some(path.clone()),
            OutputArtifact::Buffer(_) => None,
        };
        place(artifact, &output).map_err(|e| {
            if let Some(temp) = &temp {
                discard_temp(temp);
            }
            Error::output(&label, e)
        })?;
        Ok(output)
    }

    /// Resolve triple, CPU, PIC model and preserved symbols for `module`.
    pub fn plan(&self, module: &B::Module<'_>, label: &str) -> CodegenPlan {
        let embedded = self.backend.embedded_triple(module);
        let mut triple = self.target.effective_triple(&embedded);
        if triple.is_empty() {
            triple = self.backend.default_triple();
        }
        if triple != embedded {
            self.backend.set_triple(module, &triple);
        }

        let parsed = Triple::parse(&triple);
        let pic = match position_policy(self.target, &parsed) {
            PositionPolicy::Unset => None,
            PositionPolicy::Ignored => {
                log::warn!("{label}: -pic/-pie has no effect on {triple}, ignoring");
                None
            }
            PositionPolicy::Apply(model) => Some(model),
        };

        CodegenPlan {
            cpu: self.target.effective_cpu(&parsed),
            features: self.target.attrs.clone(),
            pic,
            debug_info: self.target.debug_info,
            opt: self.target.opt,
            preserved: PreservedSymbolSet::from_symbols(&self.backend.symbols(module)),
            triple,
        }
    }
}

fn discard_temp(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        log::debug!("{}: cannot remove temp file: {err}", path.display());
    }
}
