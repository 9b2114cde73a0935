// This module defines the command line with clap derive. The same parser serves both the
// coordinator and its re-executed workers: hidden `--worker`, `--member` and `--archive`
// flags switch to worker mode, and everything else describes the CompilationTarget, which
// the coordinator serialises back into flags for each worker. Cli::into_invocation checks the
// cross-argument rules clap cannot express (at least one input, exactly one input or one
// member per worker) and produces either a run Config or a WorkerRequest.

//! Command-line interface.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;

use clap::Parser;

use crate::core::{CompilationTarget, Error, OptimizationSettings, Result};
use crate::driver::Config;
use crate::worker::{WorkerInput, WorkerRequest};

#[derive(Parser, Debug)]
#[command(name = "bc2obj")]
#[command(version)]
#[command(about = "Translate bitcode files and archives into native object files", long_about = None)]
pub struct Cli {
    /// Bitcode or object files and static archives (`.a`)
    #[arg(value_name = "FILE")]
    pub inputs: Vec<PathBuf>,

    /// Directory the translated objects and archives are written to
    #[arg(long, value_name = "DIR", default_value = "native")]
    pub out_dir: PathBuf,

    /// Number of parallel workers [default: number of CPUs]
    #[arg(short = 'j', long = "jobs", value_name = "N", allow_negative_numbers = true)]
    pub jobs: Option<i64>,

    /// Target triple, overriding the one recorded in each module
    #[arg(long, value_name = "TRIPLE")]
    pub target: Option<String>,

    /// Target CPU [default: derived from the target triple]
    #[arg(long, value_name = "CPU")]
    pub cpu: Option<String>,

    /// Target features, e.g. `+sse4.2,-avx`
    #[arg(long, value_name = "FEATURES")]
    pub attrs: Option<String>,

    /// Generate position-independent code
    #[arg(long, conflicts_with = "pie")]
    pub pic: bool,

    /// Generate code for a position-independent executable
    #[arg(long)]
    pub pie: bool,

    /// Keep debug information in the generated code
    #[arg(long)]
    pub generate_debug_symbols: bool,

    /// Skip the optimisation pipeline entirely
    #[arg(long)]
    pub disable_optimizations: bool,

    /// Prevent inlining of defined functions
    #[arg(long)]
    pub disable_inline_pass: bool,

    /// Disable GVN load PRE
    #[arg(long)]
    pub disable_gvn_pass: bool,

    /// Disable loop and SLP vectorisation
    #[arg(long)]
    pub disable_vectorization_pass: bool,

    /// Optimisation level
    #[arg(short = 'O', value_name = "N", default_value_t = 2,
          value_parser = clap::value_parser!(u8).range(0..=3))]
    pub opt_level: u8,

    /// Raw LLVM options, comma separated
    #[arg(long = "llvm", value_name = "OPT", value_delimiter = ',', allow_hyphen_values = true)]
    pub llvm: Vec<String>,

    /// Archiver used to pack translated archive members
    #[arg(long, value_name = "PROGRAM", default_value = "llvm-ar")]
    pub ar: String,

    #[arg(long, hide = true)]
    pub worker: bool,

    #[arg(long, hide = true, value_name = "NAME", requires = "worker")]
    pub member: Option<String>,

    #[arg(long, hide = true, value_name = "ARCHIVE", requires = "worker")]
    pub archive: Option<PathBuf>,
}

/// What the process was asked to do.
#[derive(Debug)]
pub enum Invocation {
    Run(Config),
    Worker(WorkerRequest, CompilationTarget),
}

impl Cli {
    pub fn target(&self) -> CompilationTarget {
        CompilationTarget {
            triple: self.target.clone().unwrap_or_default(),
            cpu: self.cpu.clone().unwrap_or_default(),
            attrs: self.attrs.clone().unwrap_or_default(),
            pic: self.pic,
            pie: self.pie,
            debug_info: self.generate_debug_symbols,
            opt: OptimizationSettings {
                level: self.opt_level,
                disable_all: self.disable_optimizations,
                disable_inline: self.disable_inline_pass,
                disable_gvn: self.disable_gvn_pass,
                disable_vectorization: self.disable_vectorization_pass,
            },
            backend_options: self.llvm.iter().filter(|opt| !opt.is_empty()).cloned().collect(),
        }
    }

    pub fn into_invocation(self) -> Result<Invocation> {
        let target = self.target();

        if self.worker {
            let input = match (self.member, <[PathBuf; 1]>::try_from(self.inputs)) {
                (Some(name), Err(inputs)) if inputs.is_empty() => WorkerInput::Member(name),
                (None, Ok([path])) => WorkerInput::File(path),
                _ => {
                    return Err(Error::Usage(
                        "a worker takes exactly one input file or one --member".to_string(),
                    ))
                }
            };
            let request = WorkerRequest {
                input,
                out_dir: self.out_dir,
                archive: self.archive,
            };
            return Ok(Invocation::Worker(request, target));
        }

        if self.inputs.is_empty() {
            return Err(Error::Usage("no input files given".to_string()));
        }
        Ok(Invocation::Run(Config {
            inputs: self.inputs,
            out_dir: self.out_dir,
            jobs: self.jobs.unwrap_or_else(default_jobs),
            archiver: self.ar,
            target,
        }))
    }
}

fn default_jobs() -> i64 {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .ok()
        .and_then(|count| i64::try_from(count).ok())
        .unwrap_or(1)
}
