//! Per-job state kept by the operating system.

use crate::cpu::{RegisterFile, TrapLine};
use crate::isa::{Instruction, TrapCode};
use crate::jdl::ProgramSource;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootStatus {
    NotBooted,
    Booted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifeStatus {
    Runnable,
    WaitingOnIo,
    Finished,
}

/// How the most recent segment of a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// `TRAP halt` with the status read from the named register.
    Halted(i32),
    /// FATAL interrupt with its data word.
    Fatal(i32),
    /// Ran off the end of its image.
    Completed,
    /// Could not be booted.
    BootFailed,
}

/// An I/O request waiting to be handed to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoRequest {
    pub device: usize,
    pub code: TrapCode,
    /// Word to write, for output requests.
    pub data: i32,
}

/// One job slot.
pub struct Job {
    pub index: usize,
    /// Name from the most recent `$JOB` line.
    pub name: String,
    /// Where the job came from, for messages.
    pub origin: String,
    path: Option<PathBuf>,
    /// The job's program source. Devices refer to it by job index.
    pub(crate) source: Option<Box<dyn ProgramSource>>,
    /// Saved registers, valid while the job is not live on the CPU.
    pub registers: RegisterFile,
    /// Saved CPU trap line.
    pub trap: TrapLine,
    /// Register receiving the pending input word.
    pub reg_to_update: Option<i32>,
    pub image: Vec<Instruction>,
    /// Number of segments loaded so far.
    pub sub_job: u32,
    pub boot: BootStatus,
    pub life: LifeStatus,
    pub pending_io: Option<IoRequest>,
    pub outcome: Option<JobOutcome>,
}

impl Job {
    fn blank(index: usize, origin: String) -> Self {
        Self {
            index,
            name: String::new(),
            origin,
            path: None,
            source: None,
            registers: RegisterFile::new(),
            trap: TrapLine::idle(),
            reg_to_update: None,
            image: Vec::new(),
            sub_job: 0,
            boot: BootStatus::NotBooted,
            life: LifeStatus::Runnable,
            pending_io: None,
            outcome: None,
        }
    }

    /// A job read from an object file when it is first scheduled.
    pub fn from_path(index: usize, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut job = Self::blank(index, path.display().to_string());
        job.path = Some(path);
        job
    }

    /// A job over an already open source.
    pub fn from_source(index: usize, origin: impl Into<String>, source: Box<dyn ProgramSource>) -> Self {
        let mut job = Self::blank(index, origin.into());
        job.source = Some(source);
        job
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn is_schedulable(&self) -> bool {
        self.life == LifeStatus::Runnable
    }

    pub fn is_finished(&self) -> bool {
        self.life == LifeStatus::Finished
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            index: self.index,
            name: self.name.clone(),
            origin: self.origin.clone(),
            sub_jobs: self.sub_job,
            life: self.life,
            outcome: self.outcome,
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("registers", &self.registers)
            .field("trap", &self.trap)
            .field("image_len", &self.image.len())
            .field("sub_job", &self.sub_job)
            .field("boot", &self.boot)
            .field("life", &self.life)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Job state as reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub index: usize,
    pub name: String,
    pub origin: String,
    pub sub_jobs: u32,
    pub life: LifeStatus,
    pub outcome: Option<JobOutcome>,
}
