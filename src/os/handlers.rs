//! Interrupt handlers.
//!
//! I/O is two-phased: a job requests a transfer (GETW/PUTW), the OS hands
//! the request to the job's device and runs something else, and the device
//! later signals completion (GETW_READY/PUTW_READY).

use super::{Flow, IoRequest, JobOutcome, LifeStatus, Os};
use crate::cpu::{TrapLine, CPU_DEVICE};
use crate::hw::{input_device, job_for_device, output_device, Component, Device, Hardware};
use crate::isa::TrapCode;

impl Os {
    /// Dispatch the interrupt pending on the CPU trap line.
    pub fn handle_interrupt(&mut self, hw: &mut Hardware) -> Flow {
        let trap = hw.cpu.trap;
        tracing::debug!(
            dev = CPU_DEVICE,
            "interrupt handler - number {}, data {}, status {}",
            trap.number,
            trap.data,
            trap.status
        );

        match trap.code() {
            Some(TrapCode::Halt) => self.handle_halt(hw, trap),
            Some(TrapCode::Fatal) => self.handle_fatal(hw, trap),
            Some(TrapCode::Getw) => self.handle_request(hw, trap, TrapCode::Getw),
            Some(TrapCode::Putw) => self.handle_request(hw, trap, TrapCode::Putw),
            Some(TrapCode::GetwReady) | Some(TrapCode::PutwReady) => self.handle_ready(hw, trap),
            None => {
                tracing::warn!(dev = CPU_DEVICE, "unknown interrupt number {}", trap.number);
                hw.cpu.trap.raise(TrapCode::Fatal, 0);
                Flow::Running
            }
        }
    }

    /// The live job ran off the end of its image: retire it with status 0.
    pub fn handle_end_of_image(&mut self, hw: &mut Hardware) -> Flow {
        let job = self.current;
        tracing::debug!(dev = CPU_DEVICE, "job {} reached the end of its image", job);
        self.jobs[job].outcome = Some(JobOutcome::Completed);
        self.retire_live(hw, job, 0)
    }

    fn handle_halt(&mut self, hw: &mut Hardware, trap: TrapLine) -> Flow {
        let job = self.current;
        let status = hw.cpu.regs.get(trap.data).unwrap_or(0);
        hw.cpu.trap.clear();
        tracing::info!(dev = CPU_DEVICE, "job {} halted, status = {}", job, status);
        self.jobs[job].outcome = Some(JobOutcome::Halted(status));
        self.retire_live(hw, job, status)
    }

    /// Next segment, else another job, else idle for I/O waiters, else exit.
    fn retire_live(&mut self, hw: &mut Hardware, job: usize, status: i32) -> Flow {
        if self.continue_or_finish(hw, job) {
            return Flow::Running;
        }
        self.reschedule(hw, status)
    }

    fn handle_fatal(&mut self, hw: &mut Hardware, trap: TrapLine) -> Flow {
        let job = self.fault_origin.take().unwrap_or(self.current);
        let was_live = self.is_live(job);
        hw.cpu.trap.clear();
        tracing::warn!(dev = CPU_DEVICE, "FATAL interrupt in job {}, data = {}", job, trap.data);
        self.jobs[job].outcome = Some(JobOutcome::Fatal(trap.data));

        if self.continue_or_finish(hw, job) {
            // A reloaded job that is not live waits for the CPU like any other.
            if self.idle {
                return self.activate_or_exit(hw, job, trap.data);
            }
            return Flow::Running;
        }
        if was_live || self.idle {
            return self.reschedule(hw, trap.data);
        }
        Flow::Running
    }

    fn activate_or_exit(&mut self, hw: &mut Hardware, job: usize, status: i32) -> Flow {
        match self.execute_job_change(hw, job) {
            Ok(()) => Flow::Running,
            Err(e) => {
                self.boot_failed(hw, job, &e);
                self.reschedule(hw, status)
            }
        }
    }

    /// GETW/PUTW: record the request, hand it to the device when free, and
    /// give the CPU to another job.
    fn handle_request(&mut self, hw: &mut Hardware, trap: TrapLine, code: TrapCode) -> Flow {
        let job = self.current;
        hw.cpu.trap.clear();

        let Some(value) = hw.cpu.regs.get(trap.data) else {
            tracing::warn!(dev = CPU_DEVICE, "job {}: {} names bad register {}", job, code, trap.data);
            hw.cpu.trap.raise(TrapCode::Fatal, 0);
            return Flow::Running;
        };

        let request = if code == TrapCode::Getw {
            self.jobs[job].reg_to_update = Some(trap.data);
            IoRequest { device: input_device(job), code, data: 0 }
        } else {
            IoRequest { device: output_device(job), code, data: value }
        };
        tracing::debug!(dev = CPU_DEVICE, "job {} waits for {:?}", job, request);
        self.jobs[job].life = LifeStatus::WaitingOnIo;
        self.jobs[job].pending_io = Some(request);
        self.forward_request(hw, job);

        if !self.switch_program(hw) {
            self.go_idle(hw);
        }
        Flow::Running
    }

    /// Hand a job's pending request to its device if the device is idle.
    fn forward_request(&mut self, hw: &mut Hardware, job: usize) {
        let Some(request) = self.jobs[job].pending_io else {
            return;
        };
        let Some(device) = hw.device_mut(request.device) else {
            return;
        };
        if device.is_idle() {
            device.trap_line_mut().raise(request.code, request.data);
            self.jobs[job].pending_io = None;
            tracing::debug!(dev = CPU_DEVICE, "signaled {} on device {}", request.code, request.device);
        } else {
            tracing::debug!(dev = CPU_DEVICE, "device {} busy, request held", request.device);
        }
    }

    /// Retry every request whose device was busy.
    pub fn retry_pending_io(&mut self, hw: &mut Hardware) {
        for job in 0..self.jobs.len() {
            if self.jobs[job].pending_io.is_some() {
                self.forward_request(hw, job);
            }
        }
    }

    /// GETW_READY/PUTW_READY: deliver the result to the owning job.
    fn handle_ready(&mut self, hw: &mut Hardware, trap: TrapLine) -> Flow {
        let dev = usize::try_from(trap.data).unwrap_or(CPU_DEVICE);
        let owner = job_for_device(dev).filter(|&job| job < self.jobs.len());
        let (Some(job), Some(device)) = (owner, hw.device_mut(dev)) else {
            tracing::warn!(dev = CPU_DEVICE, "completion from unknown device {}", trap.data);
            hw.cpu.trap.clear();
            return Flow::Running;
        };
        let input = match device {
            Device::Input(input) => Some(input.value()),
            Device::Output(_) => None,
        };
        device.trap_line_mut().clear();

        if trap.status != 0 {
            tracing::warn!(dev = CPU_DEVICE, "I/O failure on device {}, job {}", dev, job);
            hw.cpu.trap = TrapLine::new(TrapCode::Fatal, trap.data, 0);
            self.fault_origin = Some(job);
            return Flow::Running;
        }

        if let (Some(value), Some(reg)) = (input, self.jobs[job].reg_to_update.take()) {
            let registers = if self.is_live(job) {
                &mut hw.cpu.regs
            } else {
                &mut self.jobs[job].registers
            };
            registers.set(reg, value);
            tracing::debug!(dev = CPU_DEVICE, "job {}: r{} = {}", job, reg, value);
        }
        hw.cpu.trap.clear();
        if self.jobs[job].life == LifeStatus::WaitingOnIo {
            self.jobs[job].life = LifeStatus::Runnable;
        }

        if self.idle && self.jobs[job].is_schedulable() {
            return self.activate_or_exit(hw, job, 0);
        }
        Flow::Running
    }
}
