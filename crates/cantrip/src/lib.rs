#![doc = include_str!("../../../README.md")]

mod bytecode;
mod command;
mod display;
mod limits;
mod parse;
mod process;
mod result;
mod scope;
mod selector;
mod syntax;
mod tokenize;
mod tracer;
mod value;

pub use crate::{
    bytecode::{Compiler, Opcode, Program},
    command::{Command, HelpOptions, check_arity},
    display::display_value,
    limits::{DEFAULT_MAX_FRAME_DEPTH, Limits},
    parse::{
        BlockMorpheme, CommentMorpheme, HereStringMorpheme, Morpheme, ParseError, Script, Sentence,
        SubstituteNextMorpheme, TaggedStringMorpheme, Word, parse,
    },
    process::{BodyTranslation, DeferredBody, Process, Translate},
    result::{EvalResult, ExecResult, ResultCode, ResultData},
    scope::Scope,
    selector::{GenericSelector, IndexedSelector, KeyedSelector, Selector},
    syntax::{WordKind, classify_word},
    tokenize::{SourcePosition, Token, TokenKind, tokenize},
    tracer::{NoopTracer, RecordingTracer, StderrTracer, TraceEvent, VmTracer},
    value::{CommandValue, Dictionary, QualifiedValue, ScriptValue, Value, format_real, is_numeric_literal, parse_real},
};
