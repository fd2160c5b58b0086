//! Shared fixtures: a miniature command set built on the public ABI.
//!
//! The real builtin library lives outside the core; these commands exist to
//! drive the engine end-to-end the way a host would — variable access,
//! control-flow codes, cooperative yield chains, and deferred bodies.
#![allow(dead_code, reason = "each test binary uses a subset of the fixtures")]

use std::{any::Any, cell::RefCell, rc::Rc};

use cantrip::{
    BodyTranslation, Command, DeferredBody, Dictionary, EvalResult, Process, ResultCode, ResultData, Scope, Value,
    check_arity, parse,
};

/// Parses and runs `source` in `scope`, blocking.
pub fn eval(scope: &Rc<Scope>, source: &str) -> EvalResult {
    let script = parse(source).expect("test source parses");
    Scope::execute_script(scope, &script)
}

/// Parses `source` and prepares a resumable process in `scope`.
pub fn prepare(scope: &Rc<Scope>, source: &str) -> Process {
    let script = parse(source).expect("test source parses");
    Scope::prepare_script(scope, &script).expect("test source compiles")
}

/// A root scope with every fixture command registered.
pub fn test_scope() -> Rc<Scope> {
    let scope = Scope::root();
    scope.register_command("idem", Rc::new(Idem));
    scope.register_command("argv", Rc::new(Argv));
    scope.register_command("set", Rc::new(SetCmd));
    scope.register_command("get", Rc::new(GetCmd));
    scope.register_command("let", Rc::new(LetCmd));
    scope.register_command("number", Rc::new(NumberCmd));
    scope.register_command("list", Rc::new(ListCmd));
    scope.register_command("dict", Rc::new(DictCmd));
    scope.register_command("yield", Rc::new(YieldCmd));
    scope.register_command("return", Rc::new(ReturnCmd));
    scope.register_command("break", Rc::new(BreakCmd));
    scope.register_command("continue", Rc::new(ContinueCmd));
    scope.register_command("pass", Rc::new(PassCmd));
    scope.register_command("error", Rc::new(ErrorCmd));
    scope.register_command("&&", Rc::new(AndCmd));
    scope.register_command("scope", Rc::new(ScopeCmd));
    scope.register_command("recurse", Rc::new(RecurseCmd));
    scope
}

fn done(result: Result<EvalResult, EvalResult>) -> EvalResult {
    result.unwrap_or_else(|err| err)
}

/// `idem value` — returns its argument unchanged.
pub struct Idem;

impl Command for Idem {
    fn execute(&self, args: Vec<Value>, _scope: &Rc<Scope>) -> EvalResult {
        done((|| {
            check_arity(&args, "idem value", 2, Some(2))?;
            Ok(EvalResult::ok(args[1].clone()))
        })())
    }
}

/// `argv ?arg ...?` — returns its arguments (after the name) as a tuple.
pub struct Argv;

impl Command for Argv {
    fn execute(&self, args: Vec<Value>, _scope: &Rc<Scope>) -> EvalResult {
        EvalResult::ok(Value::tuple(args[1..].to_vec()))
    }
}

/// `set varname value` — sets a variable in the calling scope.
pub struct SetCmd;

impl Command for SetCmd {
    fn execute(&self, args: Vec<Value>, scope: &Rc<Scope>) -> EvalResult {
        done((|| {
            check_arity(&args, "set varname value", 3, Some(3))?;
            let name = args[1].as_string()?;
            scope.set_variable(&name, args[2].clone())?;
            Ok(EvalResult::ok(args[2].clone()))
        })())
    }
}

/// `get varname` — reads a variable, with the get-specific error message.
pub struct GetCmd;

impl Command for GetCmd {
    fn execute(&self, args: Vec<Value>, scope: &Rc<Scope>) -> EvalResult {
        done((|| {
            check_arity(&args, "get varname", 2, Some(2))?;
            let name = args[1].as_string()?;
            match scope.lookup(&name) {
                Some(value) => Ok(EvalResult::ok(value)),
                None => Ok(EvalResult::cannot_get_variable(&name)),
            }
        })())
    }
}

/// `let constname value` — defines a constant.
pub struct LetCmd;

impl Command for LetCmd {
    fn execute(&self, args: Vec<Value>, scope: &Rc<Scope>) -> EvalResult {
        done((|| {
            check_arity(&args, "let constname value", 3, Some(3))?;
            let name = args[1].as_string()?;
            scope.define_constant(&name, args[2].clone())?;
            Ok(EvalResult::ok(args[2].clone()))
        })())
    }
}

/// The implicit `number` command: a numeric head evaluates to itself.
pub struct NumberCmd;

impl Command for NumberCmd {
    fn execute(&self, args: Vec<Value>, _scope: &Rc<Scope>) -> EvalResult {
        done((|| {
            let head = &args[0];
            if let Value::Integer(_) | Value::Real(_) = head {
                return Ok(EvalResult::ok(head.clone()));
            }
            let text = head.as_string()?;
            if let Ok(i) = text.parse::<i64>() {
                return Ok(EvalResult::ok(Value::integer(i)));
            }
            match cantrip::parse_real(&text) {
                Some(r) => Ok(EvalResult::ok(Value::real(r))),
                None => Ok(EvalResult::invalid_number(&text)),
            }
        })())
    }
}

/// `list (items…) subcommand ?arg?` — a minimal list ensemble.
pub struct ListCmd;

impl Command for ListCmd {
    fn execute(&self, args: Vec<Value>, _scope: &Rc<Scope>) -> EvalResult {
        done((|| {
            check_arity(&args, "list value subcommand ?arg ...?", 3, None)?;
            let items = args[1].to_list()?;
            let subcommand = args[2].as_string().map_err(|_| EvalResult::invalid_subcommand_name())?;
            match &*subcommand {
                "length" => {
                    check_arity(&args, "list value length", 3, Some(3))?;
                    Ok(EvalResult::ok(Value::integer(items.len() as i64)))
                }
                "at" => {
                    check_arity(&args, "list value at index", 4, Some(4))?;
                    Ok(EvalResult::ok(Value::list(items.to_vec()).select_index(&args[3])?))
                }
                _ => Ok(EvalResult::unknown_subcommand(&subcommand)),
            }
        })())
    }
}

/// `dict (k v …) get key ?default?` — a minimal dictionary ensemble.
pub struct DictCmd;

impl Command for DictCmd {
    fn execute(&self, args: Vec<Value>, _scope: &Rc<Scope>) -> EvalResult {
        done((|| {
            check_arity(&args, "dict value subcommand ?arg ...?", 3, None)?;
            let entries = args[1].to_list()?;
            if entries.len() % 2 != 0 {
                return Ok(EvalResult::error("invalid key-value list"));
            }
            let mut map = Dictionary::default();
            for pair in entries.chunks(2) {
                map.insert(pair[0].as_string()?, pair[1].clone());
            }
            let subcommand = args[2].as_string().map_err(|_| EvalResult::invalid_subcommand_name())?;
            match &*subcommand {
                "get" => {
                    check_arity(&args, "dict value get key ?default?", 4, Some(5))?;
                    let key = args[3].as_string()?;
                    match map.get(&*key) {
                        Some(value) => Ok(EvalResult::ok(value.clone())),
                        None => match args.get(4) {
                            Some(default) => Ok(EvalResult::ok(default.clone())),
                            None => Ok(EvalResult::error(format!("unknown key \"{key}\""))),
                        },
                    }
                }
                "size" => {
                    check_arity(&args, "dict value size", 3, Some(3))?;
                    Ok(EvalResult::ok(Value::integer(map.len() as i64)))
                }
                _ => Ok(EvalResult::unknown_subcommand(&subcommand)),
            }
        })())
    }
}

/// `yield ?value?` — suspends; resumes to the yielded-back value.
pub struct YieldCmd;

impl Command for YieldCmd {
    fn execute(&self, args: Vec<Value>, _scope: &Rc<Scope>) -> EvalResult {
        EvalResult::yield_value(args.get(1).cloned().unwrap_or(Value::Nil))
    }

    fn resume(&self, result: EvalResult, _scope: &Rc<Scope>) -> EvalResult {
        EvalResult::ok(result.value)
    }
}

/// `return ?value?`
pub struct ReturnCmd;

impl Command for ReturnCmd {
    fn execute(&self, args: Vec<Value>, _scope: &Rc<Scope>) -> EvalResult {
        EvalResult::return_value(args.get(1).cloned().unwrap_or(Value::Nil))
    }
}

/// `break`
pub struct BreakCmd;

impl Command for BreakCmd {
    fn execute(&self, _args: Vec<Value>, _scope: &Rc<Scope>) -> EvalResult {
        EvalResult::break_loop()
    }
}

/// `continue`
pub struct ContinueCmd;

impl Command for ContinueCmd {
    fn execute(&self, _args: Vec<Value>, _scope: &Rc<Scope>) -> EvalResult {
        EvalResult::continue_loop()
    }
}

/// `pass ?value?`
pub struct PassCmd;

impl Command for PassCmd {
    fn execute(&self, args: Vec<Value>, _scope: &Rc<Scope>) -> EvalResult {
        EvalResult::pass(args.get(1).cloned().unwrap_or(Value::Nil))
    }
}

/// `error message`
pub struct ErrorCmd;

impl Command for ErrorCmd {
    fn execute(&self, args: Vec<Value>, _scope: &Rc<Scope>) -> EvalResult {
        done((|| {
            check_arity(&args, "error message", 2, Some(2))?;
            let message = args[1].as_string()?;
            Ok(EvalResult::error(message.to_string()))
        })())
    }
}

/// Suspended `&&` state: the inner process plus where to pick back up.
struct AndSuspended {
    process: RefCell<Process>,
    next: usize,
    args: Vec<Value>,
}

/// `&& arg ?arg ...?` — short-circuit conjunction. Script arguments run as
/// child processes; a yield inside one suspends the whole chain, with the
/// resumption state carried as opaque result data.
pub struct AndCmd;

impl AndCmd {
    fn advance(args: &[Value], mut index: usize, scope: &Rc<Scope>) -> EvalResult {
        while index < args.len() {
            let arg = &args[index];
            let result = if matches!(arg, Value::Script(_)) {
                let mut process = match Scope::prepare_body(scope, arg) {
                    Ok(process) => process,
                    Err(err) => return err,
                };
                let result = process.run();
                if result.code == ResultCode::Yield {
                    return EvalResult::yield_with(
                        result.value,
                        Rc::new(AndSuspended {
                            process: RefCell::new(process),
                            next: index + 1,
                            args: args.to_vec(),
                        }),
                    );
                }
                result
            } else {
                EvalResult::ok(arg.clone())
            };
            match result.code {
                ResultCode::Ok => match result.value.to_boolean() {
                    Ok(true) => index += 1,
                    Ok(false) => return EvalResult::ok(Value::boolean(false)),
                    Err(err) => return err,
                },
                _ => return result,
            }
        }
        EvalResult::ok(Value::boolean(true))
    }
}

impl Command for AndCmd {
    fn execute(&self, args: Vec<Value>, scope: &Rc<Scope>) -> EvalResult {
        if args.len() < 2 {
            return EvalResult::wrong_args("&& arg ?arg ...?");
        }
        Self::advance(&args, 1, scope)
    }

    fn resume(&self, result: EvalResult, scope: &Rc<Scope>) -> EvalResult {
        let Some(ResultData::Opaque(data)) = &result.data else {
            return EvalResult::error("missing resumption state");
        };
        let data: Rc<dyn Any> = data.clone();
        let Some(state) = data.downcast_ref::<AndSuspended>() else {
            return EvalResult::error("missing resumption state");
        };
        let inner = {
            let mut process = state.process.borrow_mut();
            if let Err(err) = process.yield_back(result.value) {
                return err;
            }
            process.run()
        };
        match inner.code {
            ResultCode::Yield => EvalResult::yield_with(inner.value, data.clone()),
            ResultCode::Ok => match inner.value.to_boolean() {
                Ok(true) => Self::advance(&state.args, state.next, scope),
                Ok(false) => EvalResult::ok(Value::boolean(false)),
                Err(err) => err,
            },
            _ => inner,
        }
    }
}

/// `scope body` — runs the body in a fresh child scope as a deferred body;
/// RETURN from the body surfaces as OK.
pub struct ScopeCmd;

impl Command for ScopeCmd {
    fn execute(&self, args: Vec<Value>, scope: &Rc<Scope>) -> EvalResult {
        done((|| {
            check_arity(&args, "scope body", 2, Some(2))?;
            let body = &args[1];
            if !matches!(body, Value::Script(_)) {
                return Ok(EvalResult::body_must_be_script());
            }
            let child = Scope::child(scope);
            Ok(EvalResult::defer(DeferredBody::new(
                child,
                body.clone(),
                BodyTranslation::return_as_ok(),
            )))
        })())
    }
}

/// `recurse` — defers a body that calls `recurse` again, forever. Exists to
/// exercise the frame-depth limit.
pub struct RecurseCmd;

impl Command for RecurseCmd {
    fn execute(&self, _args: Vec<Value>, scope: &Rc<Scope>) -> EvalResult {
        let script = parse("recurse").expect("fixture source parses");
        let body = Value::script(script, Some("recurse".into()));
        EvalResult::defer(DeferredBody::new(scope.clone(), body, BodyTranslation::propagate()))
    }
}
