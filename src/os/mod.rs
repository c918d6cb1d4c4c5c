//! A minimal multiprogramming operating system.
//!
//! The OS owns no CPU time of its own. The simulator calls into it whenever
//! the CPU trap line is set, and it reacts by loading, switching, idling or
//! retiring jobs. One job's registers are live in the CPU at a time; every
//! other job is kept as a snapshot in the job table.
//!
//! - `handlers` - the six interrupt handlers
//! - `scheduler` - job selection, activation, boot and sub-job loading

mod job;
mod handlers;
mod scheduler;

pub use job::{BootStatus, IoRequest, Job, JobOutcome, JobSummary, LifeStatus};

use crate::hw::{Hardware, HardwareError, SourceTable};
use crate::jdl::{ProgramSource, SourceError};
use std::path::PathBuf;
use thiserror::Error;

/// What the machine does after an OS call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Running,
    /// Stop the simulation with this exit status.
    Exited(i32),
}

/// The job table and scheduler state.
#[derive(Debug)]
pub struct Os {
    jobs: Vec<Job>,
    /// Index of the job owning the CPU, or the last one that did.
    current: usize,
    /// True while no job's registers are live in the CPU.
    idle: bool,
    /// Job charged with the next FATAL, when raised for a device.
    fault_origin: Option<usize>,
    output_dir: PathBuf,
    context_switches: u64,
}

impl Os {
    pub fn new(jobs: Vec<Job>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs,
            current: 0,
            idle: true,
            fault_origin: None,
            output_dir: output_dir.into(),
            context_switches: 0,
        }
    }

    /// Boot and activate the first job that boots.
    pub fn start(&mut self, hw: &mut Hardware) -> Result<(), OsError> {
        if self.jobs.is_empty() {
            return Err(OsError::NoJobs);
        }
        for job in 0..self.jobs.len() {
            match self.execute_job_change(hw, job) {
                Ok(()) => return Ok(()),
                Err(e) => self.boot_failed(hw, job, &e),
            }
        }
        Err(OsError::NothingBootable)
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, index: usize) -> Option<&Job> {
        self.jobs.get(index)
    }

    /// The job whose registers are live, `None` while the CPU idles.
    pub fn current(&self) -> Option<usize> {
        (!self.idle).then_some(self.current)
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Number of snapshot restores performed.
    pub fn context_switches(&self) -> u64 {
        self.context_switches
    }

    pub fn summaries(&self) -> Vec<JobSummary> {
        self.jobs.iter().map(Job::summary).collect()
    }

    fn output_path(&self, job: usize, sub_job: u32) -> PathBuf {
        self.output_dir.join(format!("job{}-sub{}.out", job, sub_job))
    }

    fn is_live(&self, job: usize) -> bool {
        !self.idle && self.current == job
    }

    fn any_waiting(&self) -> bool {
        self.jobs.iter().any(|j| j.life == LifeStatus::WaitingOnIo)
    }
}

impl SourceTable for Os {
    fn source_mut(&mut self, job: usize) -> Option<&mut (dyn ProgramSource + 'static)> {
        self.jobs.get_mut(job)?.source.as_deref_mut()
    }
}

/// Reasons a job cannot be booted or reloaded.
#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("could not open object file {0}")]
    Unreadable(String),

    #[error("object file {0} appears to be empty")]
    Empty(String),

    #[error("could not find $JOB control line in {0}")]
    NoJobLine(String),

    #[error("image exceeds {max} instructions")]
    ImageTooLarge { max: usize },

    #[error("cannot create output file {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

/// Errors that stop the OS from running at all.
#[derive(Debug, Error)]
pub enum OsError {
    #[error("no jobs given")]
    NoJobs,

    #[error("no job could be booted")]
    NothingBootable,
}
