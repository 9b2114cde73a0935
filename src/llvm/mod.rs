//! LLVM code generation collaborator.
//!
//! Everything that touches LLVM lives here: recognising bitcode inside a
//! unit, building the must-preserve symbol set and driving the target
//! machine. The orchestrator only sees the [`CodegenBackend`] trait.
//!
//! # Example
//! ```ignore
//! use bc2obj::llvm::{CodegenBackend, LlvmBackend};
//! use bc2obj::core::CompilationTarget;
//!
//! let backend = LlvmBackend::new(&CompilationTarget::default());
//! let module = backend.load("foo.bc", &bytes)?;
//! println!("{}", backend.embedded_triple(&module));
//! ```

pub mod backend;
pub mod probe;
pub mod symbols;

pub use backend::{CodegenBackend, CodegenPlan, LlvmBackend};
pub use probe::LoadError;
pub use symbols::{ModuleSymbol, PreservedSymbolSet, SymbolKind};
