// This module is the seam between the orchestrator and the code generator. CodegenBackend
// is the collaborator interface a translation job talks to: load a unit's bytes into a
// module (reporting NotBitcode structurally), read and override the module triple, list
// the module's symbols, and compile the module either to a temp file or to memory under a
// CodegenPlan (preserved symbols, triple, CPU, features, PIC model, debug info and
// optimisation toggles). LlvmBackend implements it with inkwell: targets are initialised
// once per process, raw `--llvm` options go through LLVM's command-line parser, the module
// is retargeted, its definitions are pinned in llvm.compiler.used, debug info is stripped
// unless requested, the new-pass-manager pipeline `default<On>` runs with vectorisation
// switches, and the TargetMachine emits the object file.

//! Code generation backend.

use std::ffi::{c_char, c_int, CString};
use std::fs;
use std::path::PathBuf;
use std::sync::Once;

use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::context::Context;
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::Module;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine, TargetTriple,
};
use inkwell::OptimizationLevel;

use super::probe::{bitcode_slice, LoadError};
use super::symbols::{collect_symbols, mark_preserved, ModuleSymbol, PreservedSymbolSet};
use crate::core::target::{CompilationTarget, OptimizationSettings, PicModel};

/// Everything the code generator needs for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenPlan {
    pub triple: String,
    /// Empty lets the backend pick.
    pub cpu: String,
    pub features: String,
    pub pic: Option<PicModel>,
    pub debug_info: bool,
    pub opt: OptimizationSettings,
    pub preserved: PreservedSymbolSet,
}

/// Bitcode loading and native code generation.
pub trait CodegenBackend {
    type Module<'a>
    where
        Self: 'a;

    /// Parse `bytes` as a module; native objects yield [`LoadError::NotBitcode`].
    fn load<'a>(&'a self, name: &str, bytes: &[u8]) -> Result<Self::Module<'a>, LoadError>;

    /// Triple recorded in the module, possibly empty.
    fn embedded_triple(&self, module: &Self::Module<'_>) -> String;

    /// Triple used when neither the caller nor the module names one.
    fn default_triple(&self) -> String;

    fn set_triple(&self, module: &Self::Module<'_>, triple: &str);

    fn symbols(&self, module: &Self::Module<'_>) -> Vec<ModuleSymbol>;

    /// Generate code into a backend-owned temp file and return its path.
    fn compile_to_file(&self, module: &Self::Module<'_>, plan: &CodegenPlan)
        -> Result<PathBuf, String>;

    fn compile_to_memory(&self, module: &Self::Module<'_>, plan: &CodegenPlan)
        -> Result<Vec<u8>, String>;
}

static INIT_TARGETS: Once = Once::new();
static INIT_OPTIONS: Once = Once::new();

/// LLVM code generator.
pub struct LlvmBackend {
    context: Context,
}

impl LlvmBackend {
    /// Create a backend configured for `target`'s raw backend options.
    ///
    /// LLVM options are process-global; only the first backend created in a
    /// process applies them.
    pub fn new(target: &CompilationTarget) -> Self {
        INIT_TARGETS.call_once(|| Target::initialize_all(&InitializationConfig::default()));

        INIT_OPTIONS.call_once(|| parse_backend_options(&backend_options(target)));

        Self {
            context: Context::create(),
        }
    }

    fn target_machine(plan: &CodegenPlan) -> Result<TargetMachine, String> {
        let triple = TargetTriple::create(&plan.triple);
        let target = Target::from_triple(&triple).map_err(|e| e.to_string())?;
        let reloc = match plan.pic {
            Some(PicModel::Dynamic) => RelocMode::PIC,
            Some(PicModel::Static) => RelocMode::Static,
            None => RelocMode::Default,
        };
        target
            .create_target_machine(
                &triple,
                &plan.cpu,
                &plan.features,
                codegen_level(&plan.opt),
                reloc,
                CodeModel::Default,
            )
            .ok_or_else(|| {
                format!(
                    "cannot create target machine for '{}' (cpu '{}', attrs '{}')",
                    plan.triple, plan.cpu, plan.features
                )
            })
    }

    /// Retarget, pin and optimise `module` for `plan`.
    fn prepare(&self, module: &Module<'_>, plan: &CodegenPlan) -> Result<TargetMachine, String> {
        let machine = Self::target_machine(plan)?;
        module.set_triple(&machine.get_triple());
        module.set_data_layout(&machine.get_target_data().get_data_layout());

        mark_preserved(module, &plan.preserved);

        if !plan.debug_info {
            module.strip_debug_info();
        }
        if plan.opt.disable_inline {
            disable_inlining(module);
        }
        optimize(module, &machine, &plan.opt)?;
        Ok(machine)
    }
}

impl CodegenBackend for LlvmBackend {
    type Module<'a> = Module<'a>;

    fn load<'a>(&'a self, name: &str, bytes: &[u8]) -> Result<Module<'a>, LoadError> {
        let bitcode = bitcode_slice(bytes)?;
        let buffer = MemoryBuffer::create_from_memory_range_copy(bitcode, name);
        Module::parse_bitcode_from_buffer(&buffer, &self.context)
            .map_err(|e| LoadError::Invalid(e.to_string()))
    }

    fn embedded_triple(&self, module: &Module<'_>) -> String {
        module.get_triple().as_str().to_string_lossy().into_owned()
    }

    fn default_triple(&self) -> String {
        TargetMachine::get_default_triple()
            .as_str()
            .to_string_lossy()
            .into_owned()
    }

    fn set_triple(&self, module: &Module<'_>, triple: &str) {
        module.set_triple(&TargetTriple::create(triple));
    }

    fn symbols(&self, module: &Module<'_>) -> Vec<ModuleSymbol> {
        collect_symbols(module)
    }

    fn compile_to_file(&self, module: &Module<'_>, plan: &CodegenPlan) -> Result<PathBuf, String> {
        let machine = self.prepare(module, plan)?;
        let path = tempfile::Builder::new()
            .prefix("bc2obj-")
            .suffix(".o")
            .tempfile()
            .and_then(|file| file.into_temp_path().keep().map_err(|e| e.error))
            .map_err(|e| format!("cannot create temporary file: {e}"))?;

        if let Err(err) = machine.write_to_file(module, FileType::Object, &path) {
            if let Err(rm) = fs::remove_file(&path) {
                log::debug!("{}: cannot remove temp file: {rm}", path.display());
            }
            return Err(err.to_string());
        }
        Ok(path)
    }

    fn compile_to_memory(&self, module: &Module<'_>, plan: &CodegenPlan) -> Result<Vec<u8>, String> {
        let machine = self.prepare(module, plan)?;
        machine
            .write_to_memory_buffer(module, FileType::Object)
            .map(|buffer| buffer.as_slice().to_vec())
            .map_err(|e| e.to_string())
    }
}

/// Mark every defined function `noinline`, leaving `alwaysinline` ones alone.
fn disable_inlining(module: &Module<'_>) {
    let noinline = Attribute::get_named_enum_kind_id("noinline");
    let alwaysinline = Attribute::get_named_enum_kind_id("alwaysinline");
    let attribute = module.get_context().create_enum_attribute(noinline, 0);
    for function in module.get_functions() {
        if function.count_basic_blocks() == 0
            || function
                .get_enum_attribute(AttributeLoc::Function, alwaysinline)
                .is_some()
        {
            continue;
        }
        function.add_attribute(AttributeLoc::Function, attribute);
    }
}

fn codegen_level(opt: &OptimizationSettings) -> OptimizationLevel {
    if opt.disable_all {
        return OptimizationLevel::None;
    }
    match opt.level {
        0 => OptimizationLevel::None,
        1 => OptimizationLevel::Less,
        2 => OptimizationLevel::Default,
        _ => OptimizationLevel::Aggressive,
    }
}

fn optimize(module: &Module<'_>, machine: &TargetMachine, opt: &OptimizationSettings) -> Result<(), String> {
    if opt.disable_all {
        return Ok(());
    }
    let options = PassBuilderOptions::create();
    options.set_loop_vectorization(!opt.disable_vectorization);
    options.set_loop_slp_vectorization(!opt.disable_vectorization);

    let pipeline = format!("default<O{}>", opt.level.min(3));
    module
        .run_passes(&pipeline, machine, options)
        .map_err(|e| format!("{pipeline}: {e}"))
}

/// Raw LLVM options for `target`: the `--llvm` list plus what the toggles imply.
fn backend_options(target: &CompilationTarget) -> Vec<String> {
    let mut options = target.backend_options.clone();
    if target.opt.disable_gvn {
        options.push("-enable-load-pre=false".to_string());
    }
    options
}

/// argv for LLVM's option parser; arguments with interior NULs are dropped.
fn command_line(options: &[String]) -> Vec<CString> {
    std::iter::once("bc2obj")
        .chain(options.iter().map(String::as_str))
        .filter_map(|arg| CString::new(arg).ok())
        .collect()
}

fn parse_backend_options(options: &[String]) {
    if options.is_empty() {
        return;
    }
    log::debug!("backend options: {}", options.join(" "));

    let args = command_line(options);
    let argv: Vec<*const c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
    let argc = c_int::try_from(argv.len()).unwrap_or(c_int::MAX);
    let overview = c"bc2obj backend options";

    // SAFETY: `argv` points into `args`, which outlives the call.
    unsafe {
        llvm_sys::support::LLVMParseCommandLineOptions(argc, argv.as_ptr(), overview.as_ptr());
    }
}
