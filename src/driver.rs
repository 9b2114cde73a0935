// This module owns a whole run. Driver::run first checks that every input exists and is a
// regular file and creates the output directory; either failing aborts the run before any
// worker starts. It then walks the inputs in order: `.a` archives go through the
// ArchivePipeline (which waits for its own members), anything else is admitted as a single
// standalone job. The run succeeds only if every archive succeeded and the final drain of
// the scheduler reports that every job succeeded.

//! Run orchestration.

use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::{is_archive, ArchivePipeline};
use crate::core::{CompilationTarget, Error, InputUnit, Result};
use crate::job::Job;
use crate::scheduler::JobScheduler;
use crate::worker::worker_task;

/// Settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub inputs: Vec<PathBuf>,
    pub out_dir: PathBuf,
    /// Worker limit before clamping.
    pub jobs: i64,
    /// Archiver program, looked up through `PATH`.
    pub archiver: String,
    pub target: CompilationTarget,
}

pub struct Driver {
    config: Config,
    exe: PathBuf,
}

impl Driver {
    /// `exe` is re-executed in worker mode for every job.
    pub fn new(config: Config, exe: impl Into<PathBuf>) -> Self {
        Self {
            config,
            exe: exe.into(),
        }
    }

    /// Translate every input; `Ok(false)` if any unit or archive failed.
    pub fn run(&self) -> Result<bool> {
        let Config {
            inputs,
            out_dir,
            jobs,
            archiver,
            target,
        } = &self.config;

        check_inputs(inputs)?;
        fs::create_dir_all(out_dir).map_err(|e| Error::fs("create output directory", out_dir, e))?;

        let mut scheduler = JobScheduler::new(*jobs);
        log::info!("using {} job(s)", scheduler.limit());

        let pipeline = ArchivePipeline::new(&self.exe, target, archiver);
        let standalone = scheduler.group();
        let mut archives_ok = true;
        for input in inputs {
            if is_archive(input) {
                archives_ok &= pipeline.process_archive(&mut scheduler, input, out_dir);
            } else {
                let job = Job::new(InputUnit::file(input), out_dir);
                scheduler.admit(standalone, worker_task(&self.exe, target, job));
            }
        }

        let jobs_ok = scheduler.drain_all();
        Ok(archives_ok && jobs_ok)
    }
}

/// Every input must exist and be a regular file.
pub fn check_inputs(inputs: &[PathBuf]) -> Result<()> {
    if inputs.is_empty() {
        return Err(Error::Usage("no input files given".to_string()));
    }
    inputs.iter().try_for_each(|input| check_input(input))
}

fn check_input(input: &Path) -> Result<()> {
    let meta = fs::metadata(input).map_err(|e| Error::fs("access", input, e))?;
    if !meta.is_file() {
        return Err(Error::NotAFile {
            path: input.to_path_buf(),
        });
    }
    Ok(())
}
