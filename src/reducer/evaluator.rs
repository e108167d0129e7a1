use super::{TraceNode, TraceSample};
use crate::ast::Range;
use crate::vm::{parse_bytecode, Instruction, ProgramState, StateFactory, VirtualMachine};

/// Instructions ending on one source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineGroup {
    pub instructions: Vec<Instruction>,
    pub range: Range,
}

/// Group the bytecode of `source` by the line each node ends on.
///
/// A push whose data continues on a later line is carried forward and joined
/// with that line's bytes. Whatever is still incomplete at the end becomes the
/// final group.
pub fn aggregate_lines(source: &[TraceNode]) -> Vec<LineGroup> {
    let mut groups = Vec::new();
    let mut carry: Option<(Vec<u8>, Range)> = None;

    let chunks = source.iter().filter(|node| !node.bytecode.is_empty());
    let mut lines: Vec<(usize, Vec<u8>, Range)> = Vec::new();
    for node in chunks {
        match lines.last_mut() {
            Some((line, bytes, range)) if *line == node.range.end_line => {
                bytes.extend(&node.bytecode);
                *range = range.merge(&node.range);
            }
            _ => lines.push((node.range.end_line, node.bytecode.clone(), node.range)),
        }
    }

    for (_, bytes, range) in lines {
        let (bytes, range) = match carry.take() {
            Some((mut carried, carried_range)) => {
                carried.extend(bytes);
                (carried, carried_range.merge(&range))
            }
            None => (bytes, range),
        };
        let mut instructions = parse_bytecode(&bytes);
        if instructions.last().is_some_and(Instruction::is_malformed) {
            carry = instructions
                .pop()
                .map(|incomplete| (incomplete.to_bytecode(), range));
        }
        if !instructions.is_empty() {
            groups.push(LineGroup {
                instructions,
                range,
            });
        }
    }

    if let Some((bytes, range)) = carry {
        groups.push(LineGroup {
            instructions: parse_bytecode(&bytes),
            range,
        });
    }
    groups
}

/// Samples taken while debugging one evaluation, and its result.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub samples: Vec<TraceSample>,
    pub outcome: Result<Vec<u8>, String>,
}

/// Debug the bytecode of `source` once and sample the state after each line.
pub fn evaluate_source(
    source: &[TraceNode],
    vm: &dyn VirtualMachine,
    create_state: &StateFactory,
) -> Evaluation {
    let groups = aggregate_lines(source);
    let instructions = groups
        .iter()
        .flat_map(|group| group.instructions.iter().cloned())
        .collect::<Vec<_>>();
    tracing::trace!(
        lines = groups.len(),
        instructions = instructions.len(),
        "debugging evaluation"
    );
    let states = vm.debug(create_state(instructions));

    let mut samples = Vec::with_capacity(groups.len());
    let mut stopped_early = false;
    let mut executed = 0;
    for group in &groups {
        executed += group.instructions.len();
        // The VM stops after the first error, later lines have no state of their own.
        let state = match states.get(executed) {
            Some(state) => state,
            None => {
                stopped_early = true;
                match states.last() {
                    Some(last) => last,
                    None => break,
                }
            }
        };
        samples.push(TraceSample {
            state: state.clone(),
            range: group.range,
        });
        if stopped_early || state.error.is_some() {
            break;
        }
    }

    let outcome = match states.last() {
        Some(ProgramState {
            error: Some(error), ..
        }) => Err(error.clone()),
        Some(last) if !stopped_early => Ok(last.top().map(<[u8]>::to_vec).unwrap_or_default()),
        _ => Err("no valid program states".to_string()),
    };
    Evaluation { samples, outcome }
}
