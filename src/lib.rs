//! bc2obj - parallel bitcode to native object translation.
//!
//! bc2obj turns bitcode files, and the members of static archives holding
//! bitcode, into native object files. Each unit is translated in its own
//! worker process; archives are decomposed, translated member by member and
//! repacked with an external archiver.
//!
//! # Primary Usage
//!
//! ```ignore
//! use bc2obj::core::CompilationTarget;
//! use bc2obj::driver::{Config, Driver};
//!
//! let config = Config {
//!     inputs: vec!["foo.bc".into(), "libbar.a".into()],
//!     out_dir: "native".into(),
//!     jobs: 8,
//!     archiver: "llvm-ar".to_string(),
//!     target: CompilationTarget::default(),
//! };
//! let ok = Driver::new(config, std::env::current_exe()?).run()?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - errors, units, target settings and output placement
//! - [`llvm`] - bitcode probing, preserved symbols and code generation
//! - [`job`] - translation of a single unit
//! - [`scheduler`] - bounded worker-process scheduling
//! - [`archive`] - archive decomposition and repacking
//! - [`worker`] - coordinator/worker hand-off
//! - [`driver`] - whole-run orchestration
//! - [`cli`] - command-line parsing

pub mod archive;
pub mod cli;
pub mod core;
pub mod driver;
pub mod job;
pub mod llvm;
pub mod scheduler;
pub mod worker;

pub use crate::core::{CompilationTarget, Error, InputUnit, Result};
pub use driver::{Config, Driver};
pub use job::{Job, TranslationUnitJob};
pub use scheduler::{JobScheduler, WorkerTask, WorkerVerdict};
