use super::evaluator::{aggregate_lines, LineGroup};
use super::*;
use crate::environment::{CompilationData, CompilationEnvironment};
use crate::parser::parse;
use crate::resolver::{resolve_script, IdentifierResolver};
use crate::vm::{Instruction, StackMachine};
use pretty_assertions::assert_eq;

fn reduce_with(src: &str, environment: &CompilationEnvironment) -> ReductionTrace {
    let data = CompilationData::new();
    let script = parse(src).unwrap();
    let resolver = IdentifierResolver::new(None, &data, environment, &[]);
    let resolved = resolve_script(&script, &|identifier: &str| resolver.resolve(identifier));
    reduce_script(
        &resolved,
        environment.vm.as_deref(),
        environment.create_state.as_ref(),
    )
}

fn reduce(src: &str) -> ReductionTrace {
    reduce_with(src, &CompilationEnvironment::new().with_stack_machine())
}

fn messages(trace: &ReductionTrace) -> Vec<String> {
    trace.errors.iter().map(|error| error.message.clone()).collect()
}

#[test]
fn test_literals_concatenate() {
    let trace = reduce("<1> 'a' // comment\n  0x02 /* block */ <'bc'>");
    assert_eq!(trace.errors, vec![]);
    assert_eq!(trace.bytecode, vec![0x51, b'a', 0x02, 0x02, b'b', b'c']);
}

#[test]
fn test_push_uses_minimal_encoding() {
    assert_eq!(reduce("<0>").bytecode, vec![0x00]);
    assert_eq!(reduce("<-1>").bytecode, vec![0x4f]);
    assert_eq!(reduce("<17>").bytecode, vec![0x01, 0x11]);
    assert_eq!(reduce("<<1>>").bytecode, vec![0x01, 0x51]);
}

#[test]
fn test_evaluation_result_is_raw_bytes() {
    let trace = reduce("$(<1> <2> OP_ADD) \"abc\"");
    assert_eq!(trace.errors, vec![]);
    assert_eq!(trace.bytecode, vec![0x03, b'a', b'b', b'c']);
}

#[test]
fn test_empty_evaluation() {
    let trace = reduce("$()");
    assert_eq!(trace.errors, vec![]);
    assert_eq!(trace.bytecode, Vec::<u8>::new());
}

#[test]
fn test_root_range_is_union_of_children() {
    let trace = reduce("  OP_1\n<2>  OP_3");
    assert_eq!(trace.range, Range::new(1, 3, 2, 10));
    let TraceKind::Script(source) = &trace.kind else {
        panic!("expected a script, found {:?}", trace.kind);
    };
    assert_eq!(source.len(), 3);
}

#[test]
fn test_evaluation_requires_vm() {
    let trace = reduce_with("<1> $(<1>)", &CompilationEnvironment::new());
    assert_eq!(messages(&trace), vec![MISSING_VM.to_string()]);
    assert_eq!(trace.errors[0].range, Range::new(1, 5, 1, 11));
    assert_eq!(trace.bytecode, vec![0x51]);
}

#[test]
fn test_evaluation_with_errors_is_not_run() {
    let trace = reduce("$(<1> missing OP_DUP)");
    let TraceKind::Script(source) = &trace.kind else {
        panic!("expected a script");
    };
    assert!(source[0].samples().is_empty());
    assert_eq!(
        messages(&trace),
        vec!["Unknown identifier \"missing\".".to_string()]
    );
}

#[test]
fn test_failed_evaluation() {
    let trace = reduce("$(OP_ADD) OP_1");
    assert_eq!(
        messages(&trace),
        vec!["Failed to reduce evaluation: Tried to read from an empty stack.".to_string()]
    );
    assert_eq!(trace.bytecode, vec![0x51]);
}

#[test]
fn test_errors_in_document_order() {
    let trace = reduce("first <second $(third)>\n$(OP_1 OP_VERIFY OP_VERIFY) fourth");
    assert_eq!(
        messages(&trace),
        vec![
            "Unknown identifier \"first\".".to_string(),
            "Unknown identifier \"second\".".to_string(),
            "Unknown identifier \"third\".".to_string(),
            "Failed to reduce evaluation: Tried to read from an empty stack.".to_string(),
            "Unknown identifier \"fourth\".".to_string(),
        ]
    );
}

#[test]
fn test_samples_per_line() {
    let trace = reduce("$(\n  <1>\n  <2>\n  OP_ADD\n)");
    let TraceKind::Script(source) = &trace.kind else {
        panic!("expected a script");
    };
    let samples = source[0].samples();
    assert_eq!(samples.len(), 3);
    assert_eq!(samples[0].range, Range::new(2, 3, 2, 6));
    assert_eq!(samples[0].state.stack, vec![vec![1]]);
    assert_eq!(samples[1].state.stack, vec![vec![1], vec![2]]);
    assert_eq!(samples[2].range, Range::new(4, 3, 4, 9));
    assert_eq!(samples[2].state.stack, vec![vec![3]]);
    assert_eq!(trace.bytecode, vec![0x03]);
}

#[test]
fn test_failed_evaluation_keeps_earlier_samples() {
    let trace = reduce("$(\n  <1>\n  OP_ADD\n  <2>\n)");
    let TraceKind::Script(source) = &trace.kind else {
        panic!("expected a script");
    };
    let samples = source[0].samples();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].state.error, None);
    assert_eq!(samples[1].range.start_line, 3);
    assert_eq!(
        samples[1].state.error.as_deref(),
        Some("Tried to read from an empty stack.")
    );
    assert_eq!(trace.errors.len(), 1);
}

#[test]
fn test_push_continued_on_next_line() {
    let trace = reduce("$(\n  OP_PUSHBYTES_2\n  0x0102\n)");
    assert_eq!(trace.errors, vec![]);
    assert_eq!(trace.bytecode, vec![0x01, 0x02]);

    let TraceKind::Script(root) = &trace.kind else {
        panic!("expected a script");
    };
    let TraceKind::Evaluation { source, samples } = &root[0].kind else {
        panic!("expected an evaluation");
    };
    assert_eq!(
        aggregate_lines(source),
        vec![LineGroup {
            instructions: vec![Instruction::Push {
                opcode: 0x02,
                data: vec![0x01, 0x02]
            }],
            range: Range::new(2, 3, 3, 9),
        }]
    );
    assert_eq!(samples.len(), 1);
}

#[test]
fn test_incomplete_push_is_the_final_group() {
    let trace = reduce("$(\n  <1>\n  OP_PUSHBYTES_2 0x01\n)");
    assert_eq!(
        messages(&trace),
        vec![
            "Failed to reduce evaluation: Encountered a malformed push: [OP_PUSHBYTES_2 0x01]"
                .to_string()
        ]
    );
}

#[test]
fn test_sample_script() {
    let environment = CompilationEnvironment::new().with_stack_machine();
    let trace = reduce_with("<1>\n<2> OP_ADD", &environment);
    let samples = sample_script(
        &trace,
        &StackMachine::new(),
        &StackMachine::state_factory(),
    );
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].range, Range::new(1, 1, 1, 4));
    assert_eq!(samples[1].range, Range::new(2, 1, 2, 11));
    assert_eq!(samples[1].state.stack, vec![vec![3]]);
}
