//! Tracer integration: the recording tracer observes instruction dispatch,
//! sentence evaluation, frame traffic, and yield/resume.

mod common;

use cantrip::{Compiler, Opcode, Process, RecordingTracer, ResultCode, TraceEvent, Value, parse};
use common::test_scope;
use pretty_assertions::assert_eq;

fn traced(source: &str) -> Process<RecordingTracer> {
    let scope = test_scope();
    let program = Compiler::compile_script(&parse(source).unwrap()).unwrap();
    Process::with_tracer(scope, program, RecordingTracer::new())
}

/// Sentence evaluation reports the resolved head name.
#[test]
fn sentences_are_reported() {
    let mut process = traced("idem a; set x b");
    process.run();
    let sentences: Vec<_> = process
        .tracer()
        .events()
        .iter()
        .filter_map(|event| match event {
            TraceEvent::Sentence { command } => Some(command.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(sentences, vec!["idem", "set"]);
}

/// Every executed opcode shows up in dispatch order.
#[test]
fn instructions_are_recorded_in_order() {
    let mut process = traced("idem a");
    process.run();
    let opcodes: Vec<Opcode> = process
        .tracer()
        .events()
        .iter()
        .filter_map(|event| match event {
            TraceEvent::Instruction { opcode, .. } => Some(*opcode),
            _ => None,
        })
        .collect();
    assert_eq!(
        opcodes,
        vec![
            Opcode::SetSource(0),
            Opcode::OpenFrame,
            Opcode::PushLiteral(0),
            Opcode::PushLiteral(1),
            Opcode::CloseFrameAsTuple,
            Opcode::EvaluateSentence,
            Opcode::PushResult,
        ]
    );
}

/// Yield and resume hooks fire around a suspension.
#[test]
fn yield_and_resume_are_observed() {
    let mut process = traced("yield v");
    assert_eq!(process.run().code, ResultCode::Yield);
    process.yield_back(Value::string("x")).unwrap();
    process.run();

    let events = process.tracer().events();
    assert!(events.contains(&TraceEvent::Yield));
    assert!(events.contains(&TraceEvent::Resume));
}

/// Deferred bodies report frame pushes and pops.
#[test]
fn frames_are_observed() {
    let mut process = traced("scope {idem x}");
    process.run();
    let events = process.tracer().events();
    assert!(events.contains(&TraceEvent::FramePush { depth: 2 }));
    assert!(events.contains(&TraceEvent::FramePop { depth: 1 }));
}
