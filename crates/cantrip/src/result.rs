//! Result and error model.
//!
//! Every command invocation and every program run produces an [`EvalResult`]:
//! a result code, a value, and optional opaque data. The result code is the
//! sole control-flow signalling mechanism — there is no in-band exception.
//! Errors are plain String values carrying a human-readable message; the
//! canonical message texts live here so they stay exact and testable.

use std::{any::Any, rc::Rc};

use strum::{Display, IntoStaticStr};

use crate::{process::DeferredBody, value::Value};

/// Result codes, in the continuation-style control-flow protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ResultCode {
    /// Normal completion; the value is the produced value.
    Ok,
    /// Early return from the enclosing callable.
    Return,
    /// Cooperative suspension; the value is the yielded value.
    Yield,
    /// Failure; the value is a String message.
    Error,
    /// Loop break.
    Break,
    /// Loop continue.
    Continue,
    /// Hand-off to the enclosing dispatch layer.
    Pass,
}

/// Payload attached to a result beyond its code and value.
#[derive(Clone)]
pub enum ResultData {
    /// A body to execute as a child frame before the sentence completes.
    Deferred(Rc<DeferredBody>),
    /// Command-private resumption state, carried through yield/resume.
    Opaque(Rc<dyn Any>),
}

impl std::fmt::Debug for ResultData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

/// The outcome of evaluating a sentence, program, or process step.
#[derive(Debug, Clone)]
pub struct EvalResult {
    pub code: ResultCode,
    pub value: Value,
    pub data: Option<ResultData>,
}

/// Internal result alias: `Err` carries a ready-to-propagate ERROR (or other
/// aborting) result, so `?` unwinds the executor the way the result protocol
/// demands.
pub type ExecResult<T> = Result<T, EvalResult>;

impl EvalResult {
    #[must_use]
    pub fn ok(value: Value) -> Self {
        Self {
            code: ResultCode::Ok,
            value,
            data: None,
        }
    }

    #[must_use]
    pub fn ok_nil() -> Self {
        Self::ok(Value::Nil)
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: ResultCode::Error,
            value: Value::string(message.into()),
            data: None,
        }
    }

    /// RETURN with the given value.
    #[must_use]
    pub fn return_value(value: Value) -> Self {
        Self {
            code: ResultCode::Return,
            value,
            data: None,
        }
    }

    /// YIELD with the given value and no resumption state.
    #[must_use]
    pub fn yield_value(value: Value) -> Self {
        Self {
            code: ResultCode::Yield,
            value,
            data: None,
        }
    }

    /// YIELD carrying command-private resumption state.
    #[must_use]
    pub fn yield_with(value: Value, data: Rc<dyn Any>) -> Self {
        Self {
            code: ResultCode::Yield,
            value,
            data: Some(ResultData::Opaque(data)),
        }
    }

    #[must_use]
    pub fn break_loop() -> Self {
        Self {
            code: ResultCode::Break,
            value: Value::Nil,
            data: None,
        }
    }

    #[must_use]
    pub fn continue_loop() -> Self {
        Self {
            code: ResultCode::Continue,
            value: Value::Nil,
            data: None,
        }
    }

    #[must_use]
    pub fn pass(value: Value) -> Self {
        Self {
            code: ResultCode::Pass,
            value,
            data: None,
        }
    }

    /// OK result instructing the executor to run `body` as a child frame
    /// before completing the current sentence.
    #[must_use]
    pub fn defer(body: DeferredBody) -> Self {
        Self {
            code: ResultCode::Ok,
            value: Value::Nil,
            data: Some(ResultData::Deferred(Rc::new(body))),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == ResultCode::Ok
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.code == ResultCode::Error
    }

    /// The error message when this is an ERROR with a String value.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match (&self.code, &self.value) {
            (ResultCode::Error, Value::String(s)) => Some(s),
            _ => None,
        }
    }

    // --- canonical messages (exact text matters for testability) ---

    #[must_use]
    pub fn wrong_args(usage: &str) -> Self {
        Self::error(format!("wrong # args: should be \"{usage}\""))
    }

    #[must_use]
    pub fn wrong_operands(usage: &str) -> Self {
        Self::error(format!("wrong # operands: should be \"{usage}\""))
    }

    #[must_use]
    pub fn unknown_subcommand(name: &str) -> Self {
        Self::error(format!("unknown subcommand \"{name}\""))
    }

    #[must_use]
    pub fn invalid_subcommand_name() -> Self {
        Self::error("invalid subcommand name")
    }

    #[must_use]
    pub fn invalid_command_name(name: &str) -> Self {
        Self::error(format!("invalid command name \"{name}\""))
    }

    #[must_use]
    pub fn invalid_method_name(name: &str) -> Self {
        Self::error(format!("invalid method name \"{name}\""))
    }

    #[must_use]
    pub fn cannot_resolve_variable(name: &str) -> Self {
        Self::error(format!("cannot resolve variable \"{name}\""))
    }

    #[must_use]
    pub fn cannot_get_variable(name: &str) -> Self {
        Self::error(format!("cannot get \"{name}\": no such variable"))
    }

    #[must_use]
    pub fn cannot_redefine_constant(name: &str) -> Self {
        Self::error(format!("cannot redefine constant \"{name}\""))
    }

    #[must_use]
    pub fn cannot_define_constant(name: &str) -> Self {
        Self::error(format!("cannot define constant \"{name}\": variable already exists"))
    }

    #[must_use]
    pub fn cannot_redefine_local(name: &str) -> Self {
        Self::error(format!("cannot redefine local \"{name}\""))
    }

    #[must_use]
    pub fn cannot_resolve_command(name: &str) -> Self {
        Self::error(format!("cannot resolve command \"{name}\""))
    }

    #[must_use]
    pub fn body_must_be_script() -> Self {
        Self::error("body must be a script")
    }

    #[must_use]
    pub fn body_must_be_script_or_tuple() -> Self {
        Self::error("body must be a script or tuple")
    }

    #[must_use]
    pub fn invalid_boolean(text: &str) -> Self {
        Self::error(format!("invalid boolean \"{text}\""))
    }

    #[must_use]
    pub fn invalid_integer(text: &str) -> Self {
        Self::error(format!("invalid integer \"{text}\""))
    }

    #[must_use]
    pub fn invalid_number(text: &str) -> Self {
        Self::error(format!("invalid number \"{text}\""))
    }

    #[must_use]
    pub fn index_out_of_range(index: impl std::fmt::Display) -> Self {
        Self::error(format!("index out of range \"{index}\""))
    }

    #[must_use]
    pub fn empty_selector() -> Self {
        Self::error("empty selector")
    }

    #[must_use]
    pub fn invalid_index() -> Self {
        Self::error("invalid index")
    }

    #[must_use]
    pub fn no_string_representation() -> Self {
        Self::error("value has no string representation")
    }

    /// `unexpected return|yield|break|continue|pass` — produced when a
    /// control-flow code escapes to a context that cannot honor it.
    #[must_use]
    pub fn unexpected(code: ResultCode) -> Self {
        Self::error(format!("unexpected {code}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_messages() {
        assert_eq!(
            EvalResult::wrong_args("set varname value").message(),
            Some("wrong # args: should be \"set varname value\"")
        );
        assert_eq!(
            EvalResult::cannot_get_variable("var").message(),
            Some("cannot get \"var\": no such variable")
        );
        assert_eq!(EvalResult::unexpected(ResultCode::Break).message(), Some("unexpected break"));
        assert_eq!(EvalResult::unexpected(ResultCode::Yield).message(), Some("unexpected yield"));
    }

    #[test]
    fn ok_carries_value() {
        let result = EvalResult::ok(Value::integer(3));
        assert!(result.is_ok());
        assert_eq!(result.value, Value::integer(3));
    }
}
