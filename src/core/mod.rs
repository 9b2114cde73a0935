// This module gathers the backend-independent building blocks of bc2obj: the error
// taxonomy, the InputUnit/OutputArtifact data model, the CompilationTarget with its
// triple-derived default policies, and the output placement helpers. Nothing in here
// touches LLVM or spawns processes, so every piece is unit-testable on its own.

//! Core bc2obj infrastructure.
//!
//! - [`error`] - error taxonomy shared by every layer
//! - [`unit`] - translation units and produced artifacts
//! - [`target`] - codegen settings, triple parsing, default CPU and PIC policy
//! - [`output`] - output path resolution and atomic placement

pub mod error;
pub mod output;
pub mod target;
pub mod unit;

pub use error::{Error, Result};
pub use output::{place, resolve_output_path};
pub use target::{
    default_cpu, position_policy, CompilationTarget, OptimizationSettings, PicModel,
    PositionPolicy, Triple,
};
pub use unit::{EmitMode, InputUnit, OutputArtifact};
