//! The simulator: one explicit state object driving the global clock.
//!
//! Each tick runs every component in ascending device number: the CPU
//! (interrupt dispatch, idle, or one instruction) and then the devices.

use crate::config::SimConfig;
use crate::cpu::CPU_DEVICE;
use crate::hw::{input_device, output_device, Hardware, TickEvent};
use crate::os::{Flow, Job, JobSummary, Os, OsError};
use serde::Serialize;
use std::path::PathBuf;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Process exit status.
    pub status: i32,
    pub ticks: u64,
    /// True if the tick budget ran out before the jobs did.
    pub budget_exhausted: bool,
    pub instructions: u64,
    pub idle_ticks: u64,
    pub context_switches: u64,
    pub jobs: Vec<JobSummary>,
}

/// The complete machine state.
#[derive(Debug)]
pub struct Simulator {
    clock: u64,
    pub hw: Hardware,
    pub os: Os,
    config: SimConfig,
}

impl Simulator {
    /// One job slot per object file, slot 0 first.
    pub fn from_paths(paths: &[PathBuf], config: SimConfig) -> Self {
        let jobs = paths
            .iter()
            .enumerate()
            .map(|(index, path)| Job::from_path(index, path))
            .collect();
        Self::new(jobs, config)
    }

    pub fn new(jobs: Vec<Job>, config: SimConfig) -> Self {
        let hw = Hardware::new(jobs.len(), config.device_delay);
        let os = Os::new(jobs, config.output_dir.clone());
        Self {
            clock: 0,
            hw,
            os,
            config,
        }
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Boot the first bootable job.
    pub fn start(&mut self) -> Result<(), OsError> {
        self.os.start(&mut self.hw)
    }

    /// Advance the machine by one clock unit.
    ///
    /// Held I/O requests are retried first, then every component ticks in
    /// ascending device number. Work the CPU leaves for the OS is handled
    /// before the devices tick; nothing ticks after an exit.
    pub fn tick(&mut self) -> Flow {
        self.clock += 1;
        let span = tracing::debug_span!("tick", clock = self.clock);
        let _enter = span.enter();

        self.os.retry_pending_io(&mut self.hw);
        for dev in 0..self.hw.component_count() {
            let job_live = !self.os.is_idle();
            let flow = match self.hw.tick_component(dev, &mut self.os, job_live) {
                TickEvent::Quiet => Flow::Running,
                TickEvent::Interrupt => self.os.handle_interrupt(&mut self.hw),
                TickEvent::EndOfImage => self.os.handle_end_of_image(&mut self.hw),
            };
            if flow != Flow::Running {
                return flow;
            }
        }
        Flow::Running
    }

    /// Tick until the OS exits or the budget runs out.
    pub fn run(&mut self) -> RunReport {
        let mut status = None;
        while self.clock < self.config.max_ticks {
            if let Flow::Exited(code) = self.tick() {
                status = Some(code);
                break;
            }
        }

        let budget_exhausted = status.is_none();
        if budget_exhausted {
            tracing::warn!(dev = CPU_DEVICE, "tick budget of {} exhausted", self.config.max_ticks);
        }
        self.shutdown();

        RunReport {
            status: status.unwrap_or(0),
            ticks: self.clock,
            budget_exhausted,
            instructions: self.hw.cpu.cycles,
            idle_ticks: self.hw.cpu.idle_ticks,
            context_switches: self.os.context_switches(),
            jobs: self.os.summaries(),
        }
    }

    /// Close every output sink.
    fn shutdown(&mut self) {
        for job in 0..self.os.jobs().len() {
            self.hw.release(input_device(job));
            self.hw.release(output_device(job));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::TrapLine;
    use crate::isa::{Instruction, Opcode, TrapCode};
    use crate::jdl::{assemble, assemble_segments, ObjectReader};
    use crate::os::{JobOutcome, LifeStatus};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> SimConfig {
        SimConfig {
            output_dir: dir.path().to_path_buf(),
            ..SimConfig::default()
        }
    }

    fn sim_from_asm(sources: &[&str]) -> (TempDir, Simulator) {
        let dir = tempfile::tempdir().unwrap();
        let jobs = sources
            .iter()
            .enumerate()
            .map(|(i, asm)| {
                let object = assemble(asm).unwrap();
                Job::from_source(i, format!("asm{}", i), Box::new(ObjectReader::from_text("mem", &object)))
            })
            .collect();
        let mut sim = Simulator::new(jobs, config(&dir));
        sim.start().unwrap();
        (dir, sim)
    }

    fn output(dir: &TempDir, job: usize, sub: u32) -> String {
        std::fs::read_to_string(dir.path().join(format!("job{}-sub{}.out", job, sub))).unwrap()
    }

    #[test]
    fn test_halt_exit_status() {
        let (_dir, mut sim) = sim_from_asm(&["$JOB h\nMOVI 3 17\nTRAP halt 3\n"]);
        let report = sim.run();
        assert_eq!(report.status, 17);
        assert!(!report.budget_exhausted);
        assert_eq!(report.jobs[0].outcome, Some(JobOutcome::Halted(17)));
        assert!(report.ticks < sim.config.max_ticks);
    }

    #[test]
    fn test_division_by_zero_drops_job() {
        let (_dir, mut sim) = sim_from_asm(&["$JOB d\nMOVI 1 5\nDIVI 1 1 0\nTRAP halt 1\n"]);
        let report = sim.run();
        assert_eq!(report.status, 0);
        assert_eq!(report.jobs[0].outcome, Some(JobOutcome::Fatal(0)));
        assert_eq!(report.instructions, 2);
    }

    #[test]
    fn test_single_job_getw_idles_for_device_delay() {
        let (dir, mut sim) = sim_from_asm(&[
            "$JOB echo\nTRAP getw 5\nTRAP putw 5\nTRAP halt 6\n$RUN\n42\n$END\n",
        ]);

        // Tick 1 executes the TRAP, tick 2 dispatches it.
        sim.tick();
        sim.tick();
        assert!(sim.os.is_idle());
        assert_eq!(sim.hw.cpu.idle_ticks, 0);

        let mut idle = 0;
        while sim.os.is_idle() {
            assert_eq!(sim.tick(), Flow::Running);
            idle += 1;
            assert!(idle <= 20);
        }
        // Ten idle ticks, then the tick dispatching GETW_READY.
        assert_eq!(sim.hw.cpu.idle_ticks, 10);
        assert_eq!(idle, 11);
        assert_eq!(sim.hw.cpu.regs.get(5), Some(42));
        assert_eq!(sim.hw.cpu.regs.pc(), 1);

        let report = sim.run();
        assert_eq!(report.status, 0);
        assert_eq!(output(&dir, 0, 1), "42\n");
    }

    #[test]
    fn test_getw_switches_to_runnable_job_in_same_tick() {
        let (_dir, mut sim) = sim_from_asm(&[
            "$JOB a\nTRAP getw 1\nTRAP halt 1\n$RUN\n7\n$END\n",
            "$JOB b\nMOVI 2 1\nMOVI 2 2\nMOVI 2 3\nTRAP halt 2\n",
        ]);

        sim.tick(); // job a executes TRAP getw
        assert_eq!(sim.os.current(), Some(0));
        sim.tick(); // dispatch: job b takes over
        assert_eq!(sim.os.current(), Some(1));
        assert!(!sim.os.is_idle());
        assert_eq!(sim.os.job(0).unwrap().life, LifeStatus::WaitingOnIo);
        assert_eq!(sim.hw.cpu.idle_ticks, 0);

        sim.tick();
        assert_eq!(sim.hw.cpu.regs.get(2), Some(1));
    }

    #[test]
    fn test_two_jobs_interleave_and_finish() {
        let (dir, mut sim) = sim_from_asm(&[
            "$JOB a\nTRAP getw 1\nADDI 1 1 1\nTRAP putw 1\nTRAP halt 1\n$RUN\n9\n$END\n",
            "$JOB b\nMOVI 1 -4\nTRAP putw 1\nTRAP halt 1\n",
        ]);
        let report = sim.run();

        assert!(!report.budget_exhausted);
        assert_eq!(report.jobs[0].outcome, Some(JobOutcome::Halted(10)));
        assert_eq!(report.jobs[1].outcome, Some(JobOutcome::Halted(-4)));
        assert!(report.jobs.iter().all(|j| j.life == LifeStatus::Finished));
        assert_eq!(output(&dir, 0, 1), "10\n");
        assert_eq!(output(&dir, 1, 1), "-4\n");
        assert!(report.context_switches >= 3);
    }

    #[test]
    fn test_exits_with_last_halting_status() {
        let (_dir, mut sim) = sim_from_asm(&[
            "$JOB a\nMOVI 1 3\nTRAP halt 1\n",
            "$JOB b\nMOVI 1 8\nTRAP halt 1\n",
        ]);
        let report = sim.run();
        assert_eq!(report.status, 8);
        assert!(!report.budget_exhausted);
    }

    #[test]
    fn test_sub_job_reload_at_end_of_image() {
        let (dir, mut sim) = sim_from_asm(&[
            "$JOB first\nMOVI 7 1\nMOVI 1 5\nTRAP putw 1\nNOP\n$RUN\n$END\n\
             $JOB second\nMOVI 1 6\nTRAP putw 7\n",
        ]);

        while sim.hw.cpu.program().len() == 4 {
            sim.tick();
        }
        let job = sim.os.job(0).unwrap();
        assert_eq!(job.index, 0);
        assert_eq!(job.sub_job, 2);
        assert_eq!(job.name, "second");
        assert_eq!(sim.hw.cpu.regs.pc(), 0);
        assert_eq!(sim.hw.cpu.regs.get(7), Some(1));

        let report = sim.run();
        assert_eq!(report.status, 0);
        assert_eq!(report.jobs[0].outcome, Some(JobOutcome::Completed));
        assert_eq!(report.jobs[0].sub_jobs, 2);
        assert_eq!(output(&dir, 0, 1), "5\n");
        assert_eq!(output(&dir, 0, 2), "1\n");
    }

    #[test]
    fn test_exhausted_input_drops_only_owner() {
        let (dir, mut sim) = sim_from_asm(&[
            "$JOB reader\nTRAP getw 1\nTRAP halt 1\n$RUN\n$END\n",
            "$JOB counter\nMOVI 1 50\nloop SUBI 1 1 1\nBNEZ 1 loop\nMOVI 2 99\nTRAP putw 2\nTRAP halt 2\n",
        ]);
        let report = sim.run();

        assert_eq!(report.jobs[0].outcome, Some(JobOutcome::Fatal(1)));
        assert_eq!(report.jobs[1].outcome, Some(JobOutcome::Halted(99)));
        assert_eq!(report.status, 99);
        assert_eq!(output(&dir, 1, 1), "99\n");
    }

    #[test]
    fn test_negative_pc_drops_only_that_job() {
        let (_dir, mut sim) = sim_from_asm(&[
            "$JOB a\nJMP -5\nTRAP halt 0\n",
            "$JOB b\nMOVI 1 3\nTRAP halt 1\n",
        ]);
        let report = sim.run();

        assert!(!report.budget_exhausted);
        assert_eq!(report.status, 3);
        assert_eq!(report.jobs[0].outcome, Some(JobOutcome::Fatal(0)));
        assert_eq!(report.jobs[1].outcome, Some(JobOutcome::Halted(3)));
        assert_eq!(report.idle_ticks, 0);
    }

    #[test]
    fn test_finished_job_releases_its_devices() {
        let (_dir, mut sim) = sim_from_asm(&[
            "$JOB a\nMOVI 1 3\nTRAP halt 1\n",
            "$JOB b\nMOVI 1 1\nMOVI 1 2\nMOVI 1 3\nMOVI 1 4\nTRAP halt 1\n",
        ]);
        let input = |sim: &Simulator, job| {
            sim.hw.device(input_device(job)).and_then(|d| d.as_input()).unwrap().bound_job()
        };
        let output_bound = |sim: &Simulator, job| {
            sim.hw.device(output_device(job)).and_then(|d| d.as_output()).unwrap().is_bound()
        };
        assert_eq!(input(&sim, 0), Some(0));
        assert!(output_bound(&sim, 0));

        while !sim.os.job(0).unwrap().is_finished() {
            assert_eq!(sim.tick(), Flow::Running);
        }
        assert_eq!(sim.os.current(), Some(1));
        assert_eq!(input(&sim, 0), None);
        assert!(!output_bound(&sim, 0));
        assert_eq!(input(&sim, 1), Some(1));
        assert!(output_bound(&sim, 1));
    }

    #[test]
    fn test_unknown_trap_is_fatal() {
        let (_dir, mut sim) = sim_from_asm(&["$JOB u\nTRAP 9 0\nTRAP halt 0\n"]);
        let report = sim.run();
        assert_eq!(report.jobs[0].outcome, Some(JobOutcome::Fatal(0)));
        assert_eq!(report.instructions, 1);
    }

    #[test]
    fn test_device_waits_while_cpu_trap_busy() {
        let (_dir, mut sim) = sim_from_asm(&["$JOB w\nTRAP getw 1\nTRAP halt 1\n$RUN\n3\n$END\n"]);
        sim.tick();
        sim.tick();
        for _ in 0..9 {
            sim.tick();
        }
        // The completion is due on this tick; occupy the CPU trap line first.
        sim.hw.cpu.trap = TrapLine { number: 99, data: 0, status: 0 };
        sim.hw.tick_devices(&mut sim.os);
        assert_eq!(sim.hw.cpu.trap.number, 99);
        sim.hw.cpu.trap.clear();
        sim.hw.tick_devices(&mut sim.os);
        assert_eq!(sim.hw.cpu.trap, TrapLine::new(TrapCode::GetwReady, 1, 0));
    }

    #[test]
    fn test_budget_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let object = assemble("$JOB spin\nJMP 0\nJMP -2\n").unwrap();
        let job = Job::from_source(0, "spin", Box::new(ObjectReader::from_text("mem", &object)));
        let mut sim = Simulator::new(vec![job], SimConfig { max_ticks: 100, ..config(&dir) });
        sim.start().unwrap();

        let report = sim.run();
        assert!(report.budget_exhausted);
        assert_eq!(report.status, 0);
        assert_eq!(report.ticks, 100);
    }

    #[test]
    fn test_unbootable_jobs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.obj");
        std::fs::write(&good, assemble("$JOB g\nMOVI 1 4\nTRAP halt 1\n").unwrap()).unwrap();
        let empty = dir.path().join("empty.obj");
        std::fs::write(&empty, "").unwrap();
        let paths = vec![dir.path().join("missing.obj"), empty, good];

        let mut sim = Simulator::from_paths(&paths, config(&dir));
        sim.start().unwrap();
        assert_eq!(sim.os.current(), Some(2));
        let report = sim.run();
        assert_eq!(report.status, 4);
        assert_eq!(report.jobs[0].outcome, Some(JobOutcome::BootFailed));
        assert_eq!(report.jobs[1].outcome, Some(JobOutcome::BootFailed));
    }

    #[test]
    fn test_nothing_bootable() {
        let dir = tempfile::tempdir().unwrap();
        let mut sim = Simulator::from_paths(&[dir.path().join("nope.obj")], config(&dir));
        assert!(matches!(sim.start(), Err(OsError::NothingBootable)));
    }

    /// Register writes observed while running a program to completion.
    fn register_trace(program: Vec<Instruction>) -> Vec<[i32; 32]> {
        let mut cpu = crate::cpu::Cpu::new();
        cpu.load_image(&program).unwrap();
        let mut trace = Vec::new();
        while !cpu.at_end_of_image() && cpu.trap.is_idle() {
            cpu.step().unwrap();
            trace.push(*cpu.regs.as_array());
        }
        trace
    }

    #[test]
    fn test_assembled_program_matches_hand_built() {
        let source = "\
$JOB sum
        MOVI 1 4
        MOVI 2 0
again   ADD 2 2 1
        SUBI 1 1 1
        BNEZ 1 again
        STWI 2 10
        LDWI 3 10
        MULI 3 3 -2
";
        fn ins(op: Opcode, operands: &[i32]) -> Instruction {
            Instruction::new(op, operands).unwrap()
        }
        let by_hand = vec![
            ins(Opcode::Movi, &[1, 4]),
            ins(Opcode::Movi, &[2, 0]),
            ins(Opcode::Add, &[2, 2, 1]),
            ins(Opcode::Subi, &[1, 1, 1]),
            ins(Opcode::Bnezi, &[1, -3]),
            ins(Opcode::Stwi, &[2, 10]),
            ins(Opcode::Ldwi, &[3, 10]),
            ins(Opcode::Muli, &[3, 3, -2]),
        ];

        let object = assemble(source).unwrap();
        let mut reader = ObjectReader::from_text("mem", &object);
        let decoded = crate::jdl::read_segments(&mut reader).unwrap().remove(0).code;
        assert_eq!(decoded, assemble_segments(source).unwrap().remove(0).code);

        let trace = register_trace(decoded);
        assert_eq!(trace, register_trace(by_hand));
        assert_eq!(trace.last().unwrap()[3], -20);
    }
}
