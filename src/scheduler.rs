// This module implements the bounded-concurrency job scheduler. Every job runs in its own
// worker process; the scheduler only sees a WorkerTask (a label, a ready-to-spawn Command and
// the optional bytes to feed the worker's stdin). Each spawned child gets a small waiter
// thread that writes the stdin payload, waits for the child and sends the exit status back
// over a channel, so the channel doubles as the counting semaphore: admission blocks on
// `recv` while the limit is reached, reaping exactly one worker per iteration. Jobs are
// admitted into groups so an archive can wait for its own members only, while every group
// shares the same limit. Reaped workers are classified into a WorkerVerdict (success,
// non-zero exit, or killed by a signal) and folded into their group's result and the
// run-wide aggregate. A worker that cannot be spawned counts as a failed job.

//! Process-isolated job scheduling.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use crate::core::Error;

/// A job ready to run in a worker process.
#[derive(Debug)]
pub struct WorkerTask {
    /// Name used in messages.
    pub label: String,
    pub command: Command,
    /// Bytes written to the worker's stdin, which is closed afterwards.
    pub stdin: Option<Vec<u8>>,
}

impl WorkerTask {
    pub fn new(label: impl Into<String>, command: Command) -> Self {
        Self {
            label: label.into(),
            command,
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }
}

/// How a worker terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerVerdict {
    Succeeded,
    /// Non-zero exit, or the worker could not be run at all.
    Failed(Option<i32>),
    /// Killed by the given signal.
    Fatal(i32),
}

impl WorkerVerdict {
    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            return Self::Succeeded;
        }
        match termination_signal(status) {
            Some(signal) => Self::Fatal(signal),
            None => Self::Failed(status.code()),
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

#[cfg(unix)]
fn termination_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: ExitStatus) -> Option<i32> {
    None
}

/// Handle for a set of jobs that can be drained together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(usize);

/// Outcome of one finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub label: String,
    pub group: GroupId,
    pub verdict: WorkerVerdict,
}

struct Running {
    label: String,
    group: GroupId,
}

type Completion = (u64, io::Result<ExitStatus>);

/// Runs worker processes, at most `limit` at a time.
pub struct JobScheduler {
    limit: usize,
    active: usize,
    peak: usize,
    next_id: u64,
    next_group: usize,
    running: HashMap<u64, Running>,
    failed_groups: HashSet<GroupId>,
    reports: Vec<JobReport>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl JobScheduler {
    /// Create a scheduler; a limit of zero or less is clamped to one.
    pub fn new(limit: i64) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            limit: usize::try_from(limit).unwrap_or(1).max(1),
            active: 0,
            peak: 0,
            next_id: 0,
            next_group: 0,
            running: HashMap::new(),
            failed_groups: HashSet::new(),
            reports: Vec::new(),
            tx,
            rx,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of workers currently running.
    pub fn active(&self) -> usize {
        self.active
    }

    /// Highest number of workers that ran at the same time.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Every job reaped so far, in completion order.
    pub fn reports(&self) -> &[JobReport] {
        &self.reports
    }

    /// Open a new group of jobs.
    pub fn group(&mut self) -> GroupId {
        let id = GroupId(self.next_group);
        self.next_group += 1;
        id
    }

    /// Start `task` in `group`, first waiting for a free slot.
    pub fn admit(&mut self, group: GroupId, task: WorkerTask) {
        while self.active >= self.limit {
            if !self.reap_one() {
                break;
            }
        }
        self.spawn(group, task);
    }

    /// Wait for every job of `group`; true if all of them succeeded.
    pub fn drain(&mut self, group: GroupId) -> bool {
        while self.running.values().any(|job| job.group == group) {
            if !self.reap_one() {
                break;
            }
        }
        !self.failed_groups.contains(&group)
    }

    /// Wait for every running job; true if every job ever admitted succeeded.
    pub fn drain_all(&mut self) -> bool {
        while !self.running.is_empty() {
            if !self.reap_one() {
                break;
            }
        }
        self.active = 0;
        self.reports.iter().all(|report| report.verdict.is_success())
    }

    fn spawn(&mut self, group: GroupId, task: WorkerTask) {
        let WorkerTask {
            label,
            mut command,
            stdin,
        } = task;
        command.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                log::error!("{label}: cannot start worker: {err}");
                self.record(label, group, WorkerVerdict::Failed(None));
                return;
            }
        };

        let id = self.next_id;
        self.next_id += 1;
        let pipe = child.stdin.take();
        let tx = self.tx.clone();
        let feed_label = label.clone();
        thread::spawn(move || {
            if let (Some(mut pipe), Some(bytes)) = (pipe, stdin) {
                if let Err(err) = pipe.write_all(&bytes) {
                    log::debug!("{feed_label}: cannot write worker input: {err}");
                }
            }
            // The receiver lives as long as the scheduler.
            let _ = tx.send((id, child.wait()));
        });

        self.running.insert(id, Running { label, group });
        self.active += 1;
        self.peak = self.peak.max(self.active);
        log::trace!("admitted worker {id}, {} running", self.active);
    }

    /// Block until one worker terminates and record its verdict.
    fn reap_one(&mut self) -> bool {
        if self.running.is_empty() {
            return false;
        }
        let Ok((id, status)) = self.rx.recv() else {
            return false;
        };
        let Some(Running { label, group }) = self.running.remove(&id) else {
            return true;
        };
        self.active = self.active.saturating_sub(1);

        let verdict = match status {
            Ok(status) => WorkerVerdict::from_status(status),
            Err(err) => {
                log::error!("{label}: cannot wait for worker: {err}");
                WorkerVerdict::Failed(None)
            }
        };
        match verdict {
            WorkerVerdict::Succeeded => log::trace!("worker {id} done"),
            WorkerVerdict::Failed(code) => log::debug!("{label}: worker exited with {code:?}"),
            WorkerVerdict::Fatal(signal) => {
                log::error!("{}", Error::WorkerFatal { label: label.clone(), signal });
            }
        }
        self.record(label, group, verdict);
        true
    }

    fn record(&mut self, label: String, group: GroupId, verdict: WorkerVerdict) {
        if !verdict.is_success() {
            self.failed_groups.insert(group);
        }
        self.reports.push(JobReport {
            label,
            group,
            verdict,
        });
    }
}
