//! Processes: resumable executions of compiled programs.
//!
//! A process is a stack of (scope, program, state) frames; the top frame is
//! the active execution. Commands that run a user body return a deferred
//! body, which pushes a child frame; when the child completes, its frame's
//! translation matrix decides what the parent observes. The matrix is the
//! single source of truth for "unexpected X" errors — the root frame
//! carries the process-boundary matrix that turns stray control-flow codes
//! into errors.
//!
//! YIELD is never translated: it propagates through every frame, suspending
//! the whole process until the host injects a value with `yield_back` and
//! calls `run()` again.

use std::rc::Rc;

use crate::{
    bytecode::{Compiler, FrameOutcome, Program, ProgramState, execute},
    limits::Limits,
    parse::{ParseError, Script},
    result::{EvalResult, ExecResult, ResultCode},
    scope::Scope,
    tracer::{NoopTracer, VmTracer},
    value::Value,
};

/// What a deferred-body frame does to one incoming result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translate {
    /// Pass the result through unchanged (it keeps unwinding).
    Propagate,
    /// Surface the result as OK with the same value.
    SurfaceOk,
    /// Turn the result into the canonical `unexpected <code>` error.
    Unexpected,
}

/// Per-code translation matrix for a deferred body.
///
/// OK and ERROR always pass through; YIELD always suspends. The four
/// remaining control-flow codes are translated per this matrix when the body
/// completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyTranslation {
    pub on_return: Translate,
    pub on_break: Translate,
    pub on_continue: Translate,
    pub on_pass: Translate,
}

impl Default for BodyTranslation {
    fn default() -> Self {
        Self::propagate()
    }
}

impl BodyTranslation {
    /// Every code passes through unchanged.
    #[must_use]
    pub fn propagate() -> Self {
        Self {
            on_return: Translate::Propagate,
            on_break: Translate::Propagate,
            on_continue: Translate::Propagate,
            on_pass: Translate::Propagate,
        }
    }

    /// Every stray code becomes an `unexpected <code>` error. This is the
    /// process-boundary matrix.
    #[must_use]
    pub fn boundary() -> Self {
        Self {
            on_return: Translate::Unexpected,
            on_break: Translate::Unexpected,
            on_continue: Translate::Unexpected,
            on_pass: Translate::Unexpected,
        }
    }

    /// RETURN surfaces as OK with the returned value; everything else is
    /// unexpected. The shape used by namespace-style bodies.
    #[must_use]
    pub fn return_as_ok() -> Self {
        Self {
            on_return: Translate::SurfaceOk,
            on_break: Translate::Unexpected,
            on_continue: Translate::Unexpected,
            on_pass: Translate::Unexpected,
        }
    }

    fn apply(&self, result: EvalResult) -> EvalResult {
        let translate = match result.code {
            ResultCode::Return => self.on_return,
            ResultCode::Break => self.on_break,
            ResultCode::Continue => self.on_continue,
            ResultCode::Pass => self.on_pass,
            _ => return result,
        };
        match translate {
            Translate::Propagate => result,
            Translate::SurfaceOk => EvalResult::ok(result.value),
            Translate::Unexpected => EvalResult::unexpected(result.code),
        }
    }
}

/// A body value that must execute in a given scope as a child frame of the
/// current process before the initiating sentence completes.
#[derive(Debug)]
pub struct DeferredBody {
    /// The scope the body runs in.
    pub scope: Rc<Scope>,
    /// A Script or Tuple value.
    pub body: Value,
    /// Translation applied to the body's completion result.
    pub translation: BodyTranslation,
}

impl DeferredBody {
    #[must_use]
    pub fn new(scope: Rc<Scope>, body: Value, translation: BodyTranslation) -> Self {
        Self {
            scope,
            body,
            translation,
        }
    }
}

struct ProcessFrame {
    scope: Rc<Scope>,
    program: Rc<Program>,
    state: ProgramState,
    translation: BodyTranslation,
}

impl ProcessFrame {
    fn new(scope: Rc<Scope>, program: Rc<Program>, translation: BodyTranslation) -> Self {
        Self {
            scope,
            program,
            state: ProgramState::new(),
            translation,
        }
    }
}

/// A resumable execution of a compiled program within a scope.
pub struct Process<Tr: VmTracer = NoopTracer> {
    frames: Vec<ProcessFrame>,
    limits: Limits,
    tracer: Tr,
    completed: Option<EvalResult>,
}

impl Process {
    /// Creates a process over `program`, rooted at `scope`.
    #[must_use]
    pub fn new(scope: Rc<Scope>, program: Program) -> Self {
        Self::with_tracer(scope, program, NoopTracer)
    }
}

impl<Tr: VmTracer> Process<Tr> {
    /// Creates a process with an explicit tracer.
    #[must_use]
    pub fn with_tracer(scope: Rc<Scope>, program: Program, tracer: Tr) -> Self {
        Self {
            frames: vec![ProcessFrame::new(scope, Rc::new(program), BodyTranslation::boundary())],
            limits: Limits::default(),
            tracer,
            completed: None,
        }
    }

    /// Replaces the process limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Number of stacked frames (1 when no deferred body is active).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The source position of the active frame's last `SetSource`, i.e.
    /// where the process currently is (or was suspended).
    #[must_use]
    pub fn current_position(&self) -> Option<crate::tokenize::SourcePosition> {
        self.frames.last().and_then(|frame| frame.state.position)
    }

    /// True while the process is frozen at a yield.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.completed.is_none() && self.frames.last().is_some_and(|frame| frame.state.pending.is_some())
    }

    /// True once the process has produced its final result.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed.is_some()
    }

    /// The final result, once complete.
    #[must_use]
    pub fn result(&self) -> Option<&EvalResult> {
        self.completed.as_ref()
    }

    #[must_use]
    pub fn tracer(&self) -> &Tr {
        &self.tracer
    }

    pub fn tracer_mut(&mut self) -> &mut Tr {
        &mut self.tracer
    }

    /// Installs `value` as the yielded-back value of the suspended command,
    /// so the next `run()` resumes it with that value.
    pub fn yield_back(&mut self, value: Value) -> ExecResult<()> {
        if self.completed.is_some() {
            return Err(EvalResult::error("process is not suspended"));
        }
        let Some(frame) = self.frames.last_mut() else {
            return Err(EvalResult::error("process is not suspended"));
        };
        if frame.state.pending.is_none() {
            return Err(EvalResult::error("process is not suspended"));
        }
        frame.state.last_result.value = value;
        Ok(())
    }

    /// Runs the process until it completes or suspends. Calling `run()` on a
    /// completed process returns the final result again.
    pub fn run(&mut self) -> EvalResult {
        if let Some(done) = &self.completed {
            return done.clone();
        }
        loop {
            let frame = self.frames.last_mut().expect("a process always has a root frame");
            let program = frame.program.clone();
            let outcome = execute(&program, &mut frame.state, &frame.scope, &mut self.tracer);
            match outcome {
                FrameOutcome::Suspend(result) => return result,
                FrameOutcome::Defer(deferred) => {
                    let prepared = self
                        .limits
                        .check_frame_depth(self.frames.len())
                        .and_then(|()| compile_body(&deferred.body));
                    match prepared {
                        Ok(program) => {
                            self.frames.push(ProcessFrame::new(
                                deferred.scope.clone(),
                                Rc::new(program),
                                deferred.translation,
                            ));
                            self.tracer.on_frame_push(self.frames.len());
                        }
                        Err(err) => {
                            if let Some(done) = self.unwind(err) {
                                return done;
                            }
                        }
                    }
                }
                FrameOutcome::Complete(result) => {
                    if let Some(done) = self.unwind(result) {
                        return done;
                    }
                }
            }
        }
    }

    /// Pops completed frames, applying each frame's translation. An OK
    /// result re-enters the parent frame (its value is the initiating
    /// sentence's result); anything else keeps unwinding. Returns the final
    /// result when the root frame pops.
    fn unwind(&mut self, mut result: EvalResult) -> Option<EvalResult> {
        loop {
            let frame = self.frames.pop().expect("unwind with no frames");
            self.tracer.on_frame_pop(self.frames.len());
            result = frame.translation.apply(result);
            if self.frames.is_empty() {
                self.completed = Some(result.clone());
                return Some(result);
            }
            if result.code == ResultCode::Ok {
                let parent = self.frames.last_mut().expect("parent frame exists");
                parent.state.stack.push(result.value);
                return None;
            }
        }
    }
}

/// Compiles a deferred body value to a program: a script by its tree, a
/// tuple as one pre-evaluated sentence.
fn compile_body(body: &Value) -> ExecResult<Program> {
    match body {
        Value::Script(script) => Compiler::compile_script(&script.script).map_err(|e| EvalResult::error(e.message)),
        Value::Tuple(items) => Ok(Compiler::compile_tuple_body(items)),
        _ => Err(EvalResult::body_must_be_script_or_tuple()),
    }
}

impl Scope {
    /// Compiles `script` and returns a process ready to run in `scope`.
    pub fn prepare_script(scope: &Rc<Self>, script: &Script) -> Result<Process, ParseError> {
        let program = Compiler::compile_script(script)?;
        Ok(Process::new(scope.clone(), program))
    }

    /// Prepares a process from a body value (a Script or Tuple).
    pub fn prepare_body(scope: &Rc<Self>, body: &Value) -> ExecResult<Process> {
        let program = compile_body(body)?;
        Ok(Process::new(scope.clone(), program))
    }

    /// Compiles and runs `script` to completion, blocking. A process that
    /// yields has no host to resume it here, so YIELD surfaces as the
    /// canonical `unexpected yield` error.
    pub fn execute_script(scope: &Rc<Self>, script: &Script) -> EvalResult {
        let mut process = match Self::prepare_script(scope, script) {
            Ok(process) => process,
            Err(err) => return EvalResult::error(err.message),
        };
        let result = process.run();
        if result.code == ResultCode::Yield {
            return EvalResult::unexpected(ResultCode::Yield);
        }
        result
    }
}
