//! The stack-based executor.
//!
//! Runs one compiled program against a scope. The executor owns an operand
//! stack, open-frame markers, an instruction pointer, and the program's last
//! result; freezing at a yield is nothing more than retaining this state
//! (plus the pending command) until the process is resumed. Opcodes other
//! than `EvaluateSentence` are atomic — suspension can only happen at a
//! sentence whose command yields.

use std::rc::Rc;

use smallvec::SmallVec;

use super::{code::Program, op::Opcode};
use crate::{
    command::Command,
    display::display_value,
    process::DeferredBody,
    result::{EvalResult, ExecResult, ResultCode, ResultData},
    scope::Scope,
    selector::Selector,
    tokenize::SourcePosition,
    tracer::VmTracer,
    value::{Value, is_numeric_literal},
};

/// How a single frame run ended.
pub(crate) enum FrameOutcome {
    /// The program finished or aborted; the result propagates outward.
    Complete(EvalResult),
    /// A command yielded; the state is frozen for resumption.
    Suspend(EvalResult),
    /// A command requested a deferred body; the process pushes a child
    /// frame and re-enters this one when it completes.
    Defer(Rc<DeferredBody>),
}

/// Everything needed to freeze and resume one program's execution.
pub(crate) struct ProgramState {
    pub(crate) ip: usize,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: SmallVec<[usize; 4]>,
    pub(crate) last_result: EvalResult,
    /// The command frozen at a yield, re-entered through `resume`.
    pub(crate) pending: Option<Rc<dyn Command>>,
    pub(crate) position: Option<SourcePosition>,
}

impl ProgramState {
    pub(crate) fn new() -> Self {
        Self {
            ip: 0,
            stack: Vec::new(),
            frames: SmallVec::new(),
            last_result: EvalResult::ok_nil(),
            pending: None,
            position: None,
        }
    }
}

impl std::fmt::Debug for ProgramState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramState")
            .field("ip", &self.ip)
            .field("stack_depth", &self.stack.len())
            .field("pending", &self.pending.is_some())
            .finish_non_exhaustive()
    }
}

/// Result of dispatching a command result into the running frame.
enum Dispatch {
    Continue,
    Outcome(FrameOutcome),
}

/// Runs `program` from the state's instruction pointer until it completes,
/// suspends, or defers. Re-entry after a yield goes through the pending
/// command's `resume` before opcode dispatch continues.
pub(crate) fn execute<Tr: VmTracer>(
    program: &Program,
    state: &mut ProgramState,
    scope: &Rc<Scope>,
    tracer: &mut Tr,
) -> FrameOutcome {
    macro_rules! vm_try {
        ($expr:expr) => {
            match $expr {
                Ok(value) => value,
                Err(err) => return FrameOutcome::Complete(err),
            }
        };
    }

    if let Some(command) = state.pending.take() {
        tracer.on_resume();
        let result = command.resume(state.last_result.clone(), scope);
        match dispatch(state, tracer, command, result) {
            Dispatch::Continue => {}
            Dispatch::Outcome(outcome) => return outcome,
        }
    }

    loop {
        let Some(op) = program.ops.get(state.ip).copied() else {
            return FrameOutcome::Complete(state.last_result.clone());
        };
        tracer.on_instruction(state.ip, op);
        state.ip += 1;
        match op {
            Opcode::PushNil => state.stack.push(Value::Nil),
            Opcode::PushConstant(k) | Opcode::PushLiteral(k) => {
                state.stack.push(program.constant(k).clone());
            }
            Opcode::OpenFrame => state.frames.push(state.stack.len()),
            Opcode::CloseFrameAsTuple => {
                let start = state.frames.pop().expect("unbalanced frame close");
                let items = state.stack.split_off(start);
                state.stack.push(Value::tuple(items));
            }
            Opcode::CloseFrameAsList => {
                let start = state.frames.pop().expect("unbalanced frame close");
                let items = state.stack.split_off(start);
                state.stack.push(Value::list(items));
            }
            Opcode::ResolveValue => {
                let value = state.stack.pop().expect("resolve on empty stack");
                let resolved = vm_try!(scope.resolve_source(&value));
                state.stack.push(resolved);
            }
            Opcode::ExpandValue => {
                let value = state.stack.pop().expect("expand on empty stack");
                let Value::Tuple(items) = value else {
                    return FrameOutcome::Complete(EvalResult::error("cannot expand value"));
                };
                state.stack.extend(items.iter().cloned());
            }
            Opcode::SetSource(k) => state.position = Some(program.position(k)),
            Opcode::SelectIndex => {
                let index = state.stack.pop().expect("select on empty stack");
                let target = state.stack.pop().expect("select on empty stack");
                let selector = vm_try!(Selector::indexed(index));
                state.stack.push(vm_try!(selector.apply(&target)));
            }
            Opcode::SelectKeys => {
                let keys = state.stack.pop().expect("select on empty stack");
                let target = state.stack.pop().expect("select on empty stack");
                let keys = vm_try!(keys.to_tuple());
                let selector = vm_try!(Selector::keyed(keys.iter().cloned()));
                state.stack.push(vm_try!(selector.apply(&target)));
            }
            Opcode::SelectRules => {
                let rules = state.stack.pop().expect("select on empty stack");
                let target = state.stack.pop().expect("select on empty stack");
                let rules = vm_try!(rules.to_list());
                let selector = vm_try!(Selector::generic(rules.to_vec()));
                state.stack.push(vm_try!(selector.apply(&target)));
            }
            Opcode::EvaluateSentence => {
                let frame = state.stack.pop().expect("evaluate on empty stack");
                let items = vm_try!(frame.to_tuple());
                if items.is_empty() {
                    state.stack.push(Value::Nil);
                    continue;
                }
                let mut args = items.to_vec();
                let command = vm_try!(resolve_sentence_command(&mut args, scope));
                match &args[0] {
                    Value::String(name) => tracer.on_sentence(name),
                    head => tracer.on_sentence(head.kind_name()),
                }
                let result = command.execute(args, scope);
                match dispatch(state, tracer, command, result) {
                    Dispatch::Continue => {}
                    Dispatch::Outcome(outcome) => return outcome,
                }
            }
            Opcode::PushResult => {
                let value = state.stack.pop().expect("publish on empty stack");
                state.last_result = EvalResult::ok(value);
            }
            Opcode::JoinStrings(n) => {
                let start = state.stack.len() - n as usize;
                let parts = state.stack.split_off(start);
                let mut joined = String::new();
                for part in parts {
                    joined.push_str(&vm_try!(part.as_string()));
                }
                state.stack.push(Value::string(joined));
            }
        }
    }
}

/// Routes a command result into the running frame per the call protocol:
/// OK pushes the value (or defers when the result carries a body), YIELD
/// freezes the frame, everything else aborts the program and propagates.
fn dispatch<Tr: VmTracer>(
    state: &mut ProgramState,
    tracer: &mut Tr,
    command: Rc<dyn Command>,
    result: EvalResult,
) -> Dispatch {
    match result.code {
        ResultCode::Ok => {
            if let Some(ResultData::Deferred(deferred)) = &result.data {
                return Dispatch::Outcome(FrameOutcome::Defer(deferred.clone()));
            }
            state.stack.push(result.value);
            Dispatch::Continue
        }
        ResultCode::Yield => {
            tracer.on_yield();
            state.pending = Some(command);
            state.last_result = result.clone();
            Dispatch::Outcome(FrameOutcome::Suspend(result))
        }
        _ => Dispatch::Outcome(FrameOutcome::Complete(result)),
    }
}

/// Resolves a sentence head to a command.
///
/// A command-bearing head unwraps to its carried command. A tuple head
/// splices its elements in front of the remaining arguments and re-resolves.
/// Otherwise the head's string form is looked up through the scope chain,
/// with numeric heads falling back to the implicit `number` command.
fn resolve_sentence_command(args: &mut Vec<Value>, scope: &Rc<Scope>) -> ExecResult<Rc<dyn Command>> {
    loop {
        let head = args[0].clone();
        match head {
            Value::Command(command) => return Ok(command.command),
            Value::Tuple(items) => {
                let mut expanded: Vec<Value> = items.to_vec();
                expanded.extend(args.drain(1..));
                *args = expanded;
                if args.is_empty() {
                    return Err(EvalResult::invalid_command_name("()"));
                }
            }
            head => {
                let name = head
                    .as_string()
                    .map_err(|_| EvalResult::invalid_command_name(&display_value(&head)))?;
                if let Some(command) = scope.resolve_command(&name) {
                    return Ok(command);
                }
                if is_numeric_literal(&name)
                    && let Some(command) = scope.resolve_command("number")
                {
                    return Ok(command);
                }
                return Err(EvalResult::cannot_resolve_command(&name));
            }
        }
    }
}
