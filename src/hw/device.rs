//! Interrupt-driven I/O devices.
//!
//! Both devices follow the same two-phase protocol. The OS writes a request
//! (GETW or PUTW) into the device's trap line; the device captures it, clears
//! its line and counts down a fixed delay. When the timer expires it performs
//! the transfer and raises a completion trap on the CPU, or waits one more
//! tick if the CPU trap line is busy.

use crate::cpu::TrapLine;
use crate::hw::{Binding, Component, HardwareError, TickContext, TickEvent};
use crate::isa::TrapCode;
use crate::jdl::ProgramSource;
use std::io::Write;

/// Access to the program sources owned by the job table.
///
/// Input devices only remember which job they serve; the source itself is
/// looked up here at transfer time.
pub trait SourceTable {
    fn source_mut(&mut self, job: usize) -> Option<&mut (dyn ProgramSource + 'static)>;
}

/// Reads integers from the input section of a job's program source.
#[derive(Debug, Clone)]
pub struct InputDevice {
    number: usize,
    trap: TrapLine,
    timer: u32,
    delay: u32,
    job: Option<usize>,
}

impl InputDevice {
    pub fn new(number: usize, delay: u32) -> Self {
        Self {
            number,
            trap: TrapLine::idle(),
            timer: 0,
            delay,
            job: None,
        }
    }

    /// The job whose source this device reads, if bound.
    pub fn bound_job(&self) -> Option<usize> {
        self.job
    }

    /// The last word read, held in the device's trap data until collected.
    pub fn value(&self) -> i32 {
        self.trap.data
    }

    fn tick(&mut self, cpu_trap: &mut TrapLine, sources: &mut dyn SourceTable) {
        let dev = self.number;
        if self.trap.code() == Some(TrapCode::Getw) {
            self.timer = self.delay.max(1);
            self.trap.clear();
            tracing::debug!(dev, "starting delay");
        } else if self.timer > 0 {
            self.timer -= 1;
            tracing::debug!(dev, "delay down to {}", self.timer);
            if self.timer == 0 {
                if !cpu_trap.is_idle() {
                    self.timer = 1;
                    tracing::debug!(dev, "CPU busy, holding completion");
                    return;
                }

                let failed = match self.read_next(sources) {
                    Some(value) => {
                        self.trap.data = value;
                        false
                    }
                    None => true,
                };
                *cpu_trap = TrapLine {
                    number: TrapCode::GetwReady.to_i32(),
                    data: dev as i32,
                    status: i32::from(failed),
                };
                tracing::debug!(
                    dev,
                    "signaled trap {}, data = {}, status = {}",
                    cpu_trap.number,
                    cpu_trap.data,
                    cpu_trap.status
                );
            }
        } else {
            tracing::debug!(dev, "idle");
        }
    }

    fn read_next(&mut self, sources: &mut dyn SourceTable) -> Option<i32> {
        let job = self.job?;
        let source = sources.source_mut(job)?;
        match source.next_input_value() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(dev = self.number, "input transfer failed: {}", e);
                None
            }
        }
    }
}

/// Writes one decimal word per line to a byte sink.
pub struct OutputDevice {
    number: usize,
    trap: TrapLine,
    timer: u32,
    delay: u32,
    buffer: i32,
    sink: Option<Box<dyn Write>>,
}

impl OutputDevice {
    pub fn new(number: usize, delay: u32) -> Self {
        Self {
            number,
            trap: TrapLine::idle(),
            timer: 0,
            delay,
            buffer: 0,
            sink: None,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.sink.is_some()
    }

    fn tick(&mut self, cpu_trap: &mut TrapLine) {
        let dev = self.number;
        if self.trap.code() == Some(TrapCode::Putw) {
            self.buffer = self.trap.data;
            self.timer = self.delay.max(1);
            self.trap.clear();
            tracing::debug!(dev, "starting delay, buffered {}", self.buffer);
        } else if self.timer > 0 {
            self.timer -= 1;
            tracing::debug!(dev, "delay down to {}", self.timer);
            if self.timer == 0 {
                if !cpu_trap.is_idle() {
                    self.timer = 1;
                    tracing::debug!(dev, "CPU busy, holding completion");
                    return;
                }

                let failed = !self.write_buffer();
                *cpu_trap = TrapLine {
                    number: TrapCode::PutwReady.to_i32(),
                    data: dev as i32,
                    status: i32::from(failed),
                };
                tracing::debug!(
                    dev,
                    "signaled trap {}, data = {}, status = {}",
                    cpu_trap.number,
                    cpu_trap.data,
                    cpu_trap.status
                );
            }
        } else {
            tracing::debug!(dev, "idle");
        }
    }

    fn write_buffer(&mut self) -> bool {
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };
        let result = writeln!(sink, "{}", self.buffer).and_then(|()| sink.flush());
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(dev = self.number, "output transfer failed: {}", e);
                false
            }
        }
    }
}

impl std::fmt::Debug for OutputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputDevice")
            .field("number", &self.number)
            .field("trap", &self.trap)
            .field("timer", &self.timer)
            .field("buffer", &self.buffer)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// The closed set of I/O device variants.
#[derive(Debug)]
pub enum Device {
    Input(InputDevice),
    Output(OutputDevice),
}

impl Device {
    /// No request captured and no countdown running.
    pub fn is_idle(&self) -> bool {
        let (trap, timer) = match self {
            Device::Input(dev) => (&dev.trap, dev.timer),
            Device::Output(dev) => (&dev.trap, dev.timer),
        };
        trap.is_idle() && timer == 0
    }

    /// Drop the device's binding. An output sink is flushed and closed.
    pub fn release(&mut self) {
        match self {
            Device::Input(dev) => dev.job = None,
            Device::Output(dev) => {
                if let Some(mut sink) = dev.sink.take() {
                    if let Err(e) = sink.flush() {
                        tracing::warn!(dev = dev.number, "closing output failed: {}", e);
                    }
                }
            }
        }
    }

    pub fn as_input(&self) -> Option<&InputDevice> {
        match self {
            Device::Input(dev) => Some(dev),
            Device::Output(_) => None,
        }
    }

    pub fn as_output(&self) -> Option<&OutputDevice> {
        match self {
            Device::Output(dev) => Some(dev),
            Device::Input(_) => None,
        }
    }
}

impl Component for Device {
    fn device_number(&self) -> usize {
        match self {
            Device::Input(dev) => dev.number,
            Device::Output(dev) => dev.number,
        }
    }

    fn trap_line(&self) -> &TrapLine {
        match self {
            Device::Input(dev) => &dev.trap,
            Device::Output(dev) => &dev.trap,
        }
    }

    fn trap_line_mut(&mut self) -> &mut TrapLine {
        match self {
            Device::Input(dev) => &mut dev.trap,
            Device::Output(dev) => &mut dev.trap,
        }
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) -> TickEvent {
        let Some(cpu_trap) = ctx.cpu_trap.as_deref_mut() else {
            return TickEvent::Quiet;
        };
        match self {
            Device::Input(dev) => dev.tick(cpu_trap, &mut *ctx.sources),
            Device::Output(dev) => dev.tick(cpu_trap),
        }
        TickEvent::Quiet
    }

    fn bind(&mut self, binding: Binding<'_>) -> Result<(), HardwareError> {
        match (self, binding) {
            (Device::Input(dev), Binding::Source { job, source }) => {
                if !source.is_healthy() {
                    return Err(HardwareError::NotReady {
                        device: dev.number,
                        reason: "program source is not readable".into(),
                    });
                }
                dev.job = Some(job);
                tracing::debug!(dev = dev.number, "bound to job {}", job);
                Ok(())
            }
            (Device::Output(dev), Binding::Sink(mut sink)) => {
                sink.flush().map_err(|e| HardwareError::NotReady {
                    device: dev.number,
                    reason: e.to_string(),
                })?;
                // Rebinding closes the previous sink.
                if let Some(mut old) = dev.sink.replace(sink) {
                    if let Err(e) = old.flush() {
                        tracing::warn!(dev = dev.number, "closing previous output failed: {}", e);
                    }
                }
                tracing::debug!(dev = dev.number, "bound to output sink");
                Ok(())
            }
            (device, binding) => Err(HardwareError::WrongBinding {
                device: device.device_number(),
                binding: binding.kind(),
            }),
        }
    }
}
