//! Execution tracing.
//!
//! A trait-based tracing system for the executor with zero-cost abstraction:
//! every hook has a default no-op body, and with [`NoopTracer`] the calls
//! monomorphize away entirely. [`StderrTracer`] gives a human-readable
//! execution log; [`RecordingTracer`] captures events for tests and
//! post-mortem inspection.

use crate::bytecode::Opcode;

/// An event observed during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// An opcode was dispatched at the given instruction pointer.
    Instruction { ip: usize, opcode: Opcode },
    /// A sentence resolved to the named command and is about to execute.
    Sentence { command: String },
    /// A deferred body pushed a process frame.
    FramePush { depth: usize },
    /// A process frame completed and popped.
    FramePop { depth: usize },
    /// A command yielded; the process is suspending.
    Yield,
    /// A suspended command is being resumed.
    Resume,
}

/// Hook points for executor tracing. All methods default to no-ops.
pub trait VmTracer {
    fn on_instruction(&mut self, ip: usize, opcode: Opcode) {
        let _ = (ip, opcode);
    }

    fn on_sentence(&mut self, command: &str) {
        let _ = command;
    }

    fn on_frame_push(&mut self, depth: usize) {
        let _ = depth;
    }

    fn on_frame_pop(&mut self, depth: usize) {
        let _ = depth;
    }

    fn on_yield(&mut self) {}

    fn on_resume(&mut self) {}
}

/// Zero-cost tracer: compiles to nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Logs execution to stderr, one line per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrTracer;

impl VmTracer for StderrTracer {
    fn on_instruction(&mut self, ip: usize, opcode: Opcode) {
        eprintln!("{ip:>4} {opcode:?}");
    }

    fn on_sentence(&mut self, command: &str) {
        eprintln!("     => {command}");
    }

    fn on_frame_push(&mut self, depth: usize) {
        eprintln!("     push frame (depth {depth})");
    }

    fn on_frame_pop(&mut self, depth: usize) {
        eprintln!("     pop frame (depth {depth})");
    }

    fn on_yield(&mut self) {
        eprintln!("     yield");
    }

    fn on_resume(&mut self) {
        eprintln!("     resume");
    }
}

/// Records every event for later inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Consumes the recorded events.
    #[must_use]
    pub fn take_events(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.events)
    }
}

impl VmTracer for RecordingTracer {
    fn on_instruction(&mut self, ip: usize, opcode: Opcode) {
        self.events.push(TraceEvent::Instruction { ip, opcode });
    }

    fn on_sentence(&mut self, command: &str) {
        self.events.push(TraceEvent::Sentence {
            command: command.to_string(),
        });
    }

    fn on_frame_push(&mut self, depth: usize) {
        self.events.push(TraceEvent::FramePush { depth });
    }

    fn on_frame_pop(&mut self, depth: usize) {
        self.events.push(TraceEvent::FramePop { depth });
    }

    fn on_yield(&mut self) {
        self.events.push(TraceEvent::Yield);
    }

    fn on_resume(&mut self) {
        self.events.push(TraceEvent::Resume);
    }
}
