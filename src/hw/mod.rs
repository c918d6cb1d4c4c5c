//! Hardware model: the CPU plus one input/output device pair per job.
//!
//! Components are numbered: the CPU is device 0, job `j` owns input device
//! `2j+1` and output device `2j+2`. Every component ticks in ascending
//! device number, so the CPU always goes first.

mod device;

pub use device::{Device, InputDevice, OutputDevice, SourceTable};

use crate::cpu::{Cpu, TrapLine, CPU_DEVICE};
use crate::jdl::ProgramSource;
use std::io::Write;
use thiserror::Error;

/// Input device number of a job.
pub const fn input_device(job: usize) -> usize {
    2 * job + 1
}

/// Output device number of a job.
pub const fn output_device(job: usize) -> usize {
    2 * job + 2
}

/// Job owning a device, `None` for the CPU.
pub const fn job_for_device(dev: usize) -> Option<usize> {
    if dev == CPU_DEVICE {
        None
    } else {
        Some((dev - 1) / 2)
    }
}

/// An external resource attached to a component.
pub enum Binding<'a> {
    /// Input devices read from a job's source. Only the job index is kept.
    Source { job: usize, source: &'a dyn ProgramSource },
    /// Output devices own their sink.
    Sink(Box<dyn Write>),
}

impl Binding<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Binding::Source { .. } => "program source",
            Binding::Sink(_) => "output sink",
        }
    }
}

/// What the rest of the machine lends a component for one tick.
pub struct TickContext<'a> {
    /// The CPU trap line, where devices signal completion. `None` while the
    /// CPU itself ticks.
    pub cpu_trap: Option<&'a mut TrapLine>,
    pub sources: &'a mut dyn SourceTable,
    /// True while a job's registers are loaded in the CPU.
    pub job_live: bool,
}

/// Work a tick leaves for the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEvent {
    Quiet,
    /// The CPU trap line is set and must be dispatched.
    Interrupt,
    /// The live job's PC is one past its last instruction.
    EndOfImage,
}

/// Capabilities shared by every hardware component.
pub trait Component {
    fn device_number(&self) -> usize;

    fn trap_line(&self) -> &TrapLine;

    fn trap_line_mut(&mut self) -> &mut TrapLine;

    /// Advance one clock unit.
    fn tick(&mut self, ctx: &mut TickContext<'_>) -> TickEvent;

    /// Attach an external resource, failing if it is not ready.
    fn bind(&mut self, binding: Binding<'_>) -> Result<(), HardwareError>;
}

impl Component for Cpu {
    fn device_number(&self) -> usize {
        CPU_DEVICE
    }

    fn trap_line(&self) -> &TrapLine {
        &self.trap
    }

    fn trap_line_mut(&mut self) -> &mut TrapLine {
        &mut self.trap
    }

    /// Dispatch a pending interrupt, idle, or execute one instruction.
    /// A negative PC idles only while no job is loaded; otherwise the fetch
    /// faults like any other.
    fn tick(&mut self, ctx: &mut TickContext<'_>) -> TickEvent {
        if !self.trap.is_idle() {
            return TickEvent::Interrupt;
        }
        if !ctx.job_live && self.regs.is_idle() {
            self.idle();
            return TickEvent::Quiet;
        }
        if self.at_end_of_image() {
            return TickEvent::EndOfImage;
        }
        // Faults are already on the trap line for the next tick.
        let _ = self.step();
        TickEvent::Quiet
    }

    fn bind(&mut self, _binding: Binding<'_>) -> Result<(), HardwareError> {
        Err(HardwareError::CpuNotBindable)
    }
}

/// Errors from configuring hardware.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    #[error("the CPU cannot be bound to a resource")]
    CpuNotBindable,

    #[error("device {0} does not exist")]
    NoSuchDevice(usize),

    #[error("device {device} cannot take a {binding}")]
    WrongBinding { device: usize, binding: &'static str },

    #[error("device {device} resource not ready: {reason}")]
    NotReady { device: usize, reason: String },
}

/// The hardware registry.
#[derive(Debug)]
pub struct Hardware {
    pub cpu: Cpu,
    devices: Vec<Device>,
}

impl Hardware {
    /// Build the CPU and a device pair for each of `jobs` jobs.
    pub fn new(jobs: usize, device_delay: u32) -> Self {
        let devices = (0..jobs)
            .flat_map(|job| {
                [
                    Device::Input(InputDevice::new(input_device(job), device_delay)),
                    Device::Output(OutputDevice::new(output_device(job), device_delay)),
                ]
            })
            .collect();
        Self { cpu: Cpu::new(), devices }
    }

    /// Number of components, CPU included.
    pub fn component_count(&self) -> usize {
        self.devices.len() + 1
    }

    pub fn device(&self, dev: usize) -> Option<&Device> {
        self.devices.get(dev.checked_sub(1)?)
    }

    pub fn device_mut(&mut self, dev: usize) -> Option<&mut Device> {
        self.devices.get_mut(dev.checked_sub(1)?)
    }

    /// Any component by device number.
    pub fn component_mut(&mut self, dev: usize) -> Option<&mut dyn Component> {
        if dev == CPU_DEVICE {
            Some(&mut self.cpu)
        } else {
            self.device_mut(dev).map(|d| d as &mut dyn Component)
        }
    }

    pub fn bind(&mut self, dev: usize, binding: Binding<'_>) -> Result<(), HardwareError> {
        self.component_mut(dev)
            .ok_or(HardwareError::NoSuchDevice(dev))?
            .bind(binding)
    }

    /// Drop a device's binding.
    pub fn release(&mut self, dev: usize) {
        if let Some(device) = self.device_mut(dev) {
            device.release();
            tracing::debug!(dev, "released");
        }
    }

    /// Tick one component.
    pub fn tick_component(
        &mut self,
        dev: usize,
        sources: &mut dyn SourceTable,
        job_live: bool,
    ) -> TickEvent {
        if dev == CPU_DEVICE {
            let mut ctx = TickContext { cpu_trap: None, sources, job_live };
            return self.cpu.tick(&mut ctx);
        }
        let Some(device) = self.devices.get_mut(dev - 1) else {
            return TickEvent::Quiet;
        };
        let mut ctx = TickContext {
            cpu_trap: Some(&mut self.cpu.trap),
            sources,
            job_live,
        };
        device.tick(&mut ctx)
    }

    /// Tick every device (not the CPU) in ascending device number.
    pub fn tick_devices(&mut self, sources: &mut dyn SourceTable) {
        for dev in 1..self.component_count() {
            self.tick_component(dev, sources, false);
        }
    }
}
