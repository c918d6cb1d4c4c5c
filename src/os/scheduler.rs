//! Job selection, activation, boot and sub-job loading.

use super::{BootError, BootStatus, Flow, JobOutcome, LifeStatus, Os};
use crate::cpu::{IDLE_PC, INSTRUCTION_MEMORY_SIZE, CPU_DEVICE};
use crate::hw::{input_device, output_device, Binding, Hardware};
use crate::jdl::ObjectReader;
use std::fs::File;
use std::io::BufWriter;

impl Os {
    /// Next schedulable job in round-robin order after the current one.
    /// The current job itself is considered last.
    pub fn next_candidate(&self) -> Option<usize> {
        let n = self.jobs.len();
        (1..=n)
            .map(|k| (self.current + k) % n)
            .find(|&j| self.jobs[j].is_schedulable())
    }

    /// Switch to another schedulable job. Jobs that fail to boot are
    /// dropped and the scan continues. Returns false if none is left.
    pub fn switch_program(&mut self, hw: &mut Hardware) -> bool {
        while let Some(next) = self.next_candidate() {
            match self.execute_job_change(hw, next) {
                Ok(()) => return true,
                Err(e) => self.boot_failed(hw, next, &e),
            }
        }
        false
    }

    /// Make `next` the live job, booting it first if needed.
    pub fn execute_job_change(&mut self, hw: &mut Hardware, next: usize) -> Result<(), BootError> {
        if next == self.current && !self.idle {
            tracing::debug!(dev = CPU_DEVICE, "job {} already running", next);
            return Ok(());
        }
        if self.jobs[next].boot == BootStatus::NotBooted {
            self.boot(hw, next)?;
        }
        if !self.idle {
            self.save_live(hw);
        }

        let job = &self.jobs[next];
        hw.cpu
            .load_image(&job.image)
            .map_err(|_| BootError::ImageTooLarge { max: INSTRUCTION_MEMORY_SIZE })?;
        hw.cpu.regs = job.registers;
        hw.cpu.trap = job.trap;
        tracing::info!(
            dev = CPU_DEVICE,
            "switching from job {} to job {} ({}) at pc {}",
            self.current,
            next,
            job.name,
            job.registers.pc()
        );

        self.current = next;
        self.idle = false;
        self.context_switches += 1;
        Ok(())
    }

    /// Copy the live CPU state into the current job's snapshot.
    fn save_live(&mut self, hw: &Hardware) {
        let job = &mut self.jobs[self.current];
        job.registers = hw.cpu.regs;
        job.trap = hw.cpu.trap;
    }

    /// Save the live job and let the CPU idle.
    pub(crate) fn go_idle(&mut self, hw: &mut Hardware) {
        if !self.idle {
            self.save_live(hw);
            self.idle = true;
        }
        hw.cpu.regs.set_pc(IDLE_PC);
        tracing::debug!(dev = CPU_DEVICE, "no runnable job, CPU idles");
    }

    /// Find another job for the CPU after the current one stopped, idle if
    /// only I/O waiters remain, else exit with `status`.
    pub(crate) fn reschedule(&mut self, hw: &mut Hardware, status: i32) -> Flow {
        if self.switch_program(hw) {
            Flow::Running
        } else if self.any_waiting() {
            self.go_idle(hw);
            Flow::Running
        } else {
            tracing::info!(dev = CPU_DEVICE, "no job left, exiting with status {}", status);
            Flow::Exited(status)
        }
    }

    /// A job's segment ended: load its next segment, or finish the job.
    /// Returns true if the job continues.
    pub(crate) fn continue_or_finish(&mut self, hw: &mut Hardware, job: usize) -> bool {
        match self.load_segment(hw, job) {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(dev = CPU_DEVICE, "job {}: cannot load next segment: {}", job, e);
            }
        }
        self.finish_job(hw, job);
        false
    }

    /// Mark a job finished and release its devices. Never revived.
    pub(crate) fn finish_job(&mut self, hw: &mut Hardware, job: usize) {
        let entry = &mut self.jobs[job];
        entry.life = LifeStatus::Finished;
        entry.pending_io = None;
        entry.reg_to_update = None;
        entry.source = None;
        hw.release(input_device(job));
        hw.release(output_device(job));
        tracing::info!(dev = CPU_DEVICE, "job {} finished: {:?}", job, entry.outcome);
    }

    pub(crate) fn boot_failed(&mut self, hw: &mut Hardware, job: usize, err: &BootError) {
        tracing::error!(dev = CPU_DEVICE, "BOOT LOAD FAILED - {}: {}", self.jobs[job].origin, err);
        self.jobs[job].outcome = Some(JobOutcome::BootFailed);
        self.finish_job(hw, job);
    }

    /// Open the job's source, load its first segment and bind its devices.
    fn boot(&mut self, hw: &mut Hardware, job: usize) -> Result<(), BootError> {
        let entry = &mut self.jobs[job];
        if entry.source.is_none() {
            if let Some(path) = entry.path() {
                let reader = ObjectReader::open(path)
                    .map_err(|_| BootError::Unreadable(entry.origin.clone()))?;
                entry.source = Some(Box::new(reader));
            }
        }

        let source = entry
            .source
            .as_deref()
            .ok_or_else(|| BootError::Unreadable(entry.origin.clone()))?;
        if !source.is_healthy() {
            return Err(BootError::Unreadable(entry.origin.clone()));
        }
        if source.is_at_end() {
            return Err(BootError::Empty(entry.origin.clone()));
        }

        if !self.load_segment(hw, job)? {
            return Err(BootError::NoJobLine(self.jobs[job].origin.clone()));
        }
        self.jobs[job].boot = BootStatus::Booted;
        tracing::info!(dev = CPU_DEVICE, "booted job {} from {}", job, self.jobs[job].origin);
        Ok(())
    }

    /// Load the job's next segment from its source, replacing its image.
    ///
    /// Returns `Ok(false)` when the source holds no further segment. On
    /// success the PC is 0, the trap line clear, and the device pair is
    /// bound to the source and a fresh output file. Other registers keep
    /// their values.
    pub(crate) fn load_segment(&mut self, hw: &mut Hardware, job: usize) -> Result<bool, BootError> {
        let output_path = self.output_path(job, self.jobs[job].sub_job + 1);
        let live = self.is_live(job);
        let entry = &mut self.jobs[job];
        let Some(source) = entry.source.as_deref_mut() else {
            return Ok(false);
        };

        if !source.advance_to_code_section()? {
            return Ok(false);
        }
        let mut image = Vec::new();
        while let Some(instr) = source.next_instruction()? {
            if image.len() == INSTRUCTION_MEMORY_SIZE {
                return Err(BootError::ImageTooLarge { max: INSTRUCTION_MEMORY_SIZE });
            }
            image.push(instr);
        }

        let file = File::create(&output_path).map_err(|source| BootError::Output {
            path: output_path.clone(),
            source,
        })?;
        hw.bind(output_device(job), Binding::Sink(Box::new(BufWriter::new(file))))?;
        hw.bind(input_device(job), Binding::Source { job, source: &*source })?;

        entry.name = source.job_name().to_owned();
        entry.sub_job += 1;
        entry.registers.set_pc(0);
        entry.trap.clear();
        entry.reg_to_update = None;
        entry.pending_io = None;
        entry.life = LifeStatus::Runnable;
        tracing::info!(
            dev = CPU_DEVICE,
            "job {} loaded segment {} ({}), {} instructions, output {}",
            job,
            entry.sub_job,
            entry.name,
            image.len(),
            output_path.display()
        );
        entry.image = image;

        if live {
            hw.cpu
                .load_image(&entry.image)
                .map_err(|_| BootError::ImageTooLarge { max: INSTRUCTION_MEMORY_SIZE })?;
            hw.cpu.regs.set_pc(0);
            hw.cpu.trap.clear();
        }
        Ok(true)
    }
}
