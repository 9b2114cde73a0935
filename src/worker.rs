// This module is both ends of the coordinator/worker hand-off. worker_task turns a Job into
// a WorkerTask that re-executes the current binary with hidden worker flags: the target is
// re-serialised through CompilationTarget::to_args, a standalone unit is passed by path and
// an archive member by name with its bytes piped to stdin. On the other side, run_worker
// rebuilds the Job from the WorkerRequest clap produced, creates the LLVM backend (which
// applies raw backend options once for this process) and runs the translation.

//! Worker processes.

use std::ffi::{OsStr, OsString};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::{CompilationTarget, Error, InputUnit, Result};
use crate::job::{Job, TranslationUnitJob};
use crate::llvm::LlvmBackend;
use crate::scheduler::WorkerTask;

/// The unit a worker was started for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerInput {
    File(PathBuf),
    /// Archive member; its bytes arrive on stdin.
    Member(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRequest {
    pub input: WorkerInput,
    pub out_dir: PathBuf,
    pub archive: Option<PathBuf>,
}

impl WorkerRequest {
    /// Rebuild the job, reading member bytes from `stdin`.
    pub fn into_job(self, mut stdin: impl Read) -> Result<Job> {
        let unit = match self.input {
            WorkerInput::File(path) => InputUnit::file(path),
            WorkerInput::Member(name) => {
                let mut bytes = Vec::new();
                stdin
                    .read_to_end(&mut bytes)
                    .map_err(|e| Error::fs("read", format!("{name} from stdin"), e))?;
                InputUnit::member(name, bytes)
            }
        };

        let job = Job::new(unit, self.out_dir);
        Ok(match self.archive {
            Some(archive) => job.with_archive(archive),
            None => job,
        })
    }
}

/// Worker-mode entry point.
pub fn run_worker(request: WorkerRequest, target: &CompilationTarget) -> Result<PathBuf> {
    let job = request.into_job(io::stdin().lock())?;
    let backend = LlvmBackend::new(target);
    TranslationUnitJob::new(&backend, target).run(&job)
}

/// Command line that runs `job` in a copy of `exe`.
pub fn worker_task(exe: &Path, target: &CompilationTarget, job: Job) -> WorkerTask {
    let label = job.label();
    let mut command = Command::new(exe);
    command
        .arg("--worker")
        .args(target.to_args())
        .arg(flag("--out-dir", &job.out_dir));
    if let Some(archive) = &job.archive {
        command.arg(flag("--archive", archive));
    }

    match job.unit {
        InputUnit::File { path } => {
            command.arg("--").arg(path);
            WorkerTask::new(label, command)
        }
        InputUnit::Member { name, bytes } => {
            command.arg(flag("--member", &name));
            WorkerTask::new(label, command).with_stdin(bytes)
        }
    }
}

/// `--name=value`, safe for values starting with `-`.
fn flag(name: &str, value: impl AsRef<OsStr>) -> OsString {
    let mut arg = OsString::from(name);
    arg.push("=");
    arg.push(value);
    arg
}
