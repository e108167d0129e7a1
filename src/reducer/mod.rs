pub mod evaluator;
#[cfg(test)]
mod test;

use crate::ast::Range;
use crate::error::CompilationError;
use crate::resolver::ResolvedSegment;
use crate::vm::{encode_data_push, ProgramState, StateFactory, VirtualMachine};
use evaluator::evaluate_source;

pub const MISSING_VM: &str =
    "Both a VM and a state constructor are required to reduce evaluations.";

#[derive(Debug, Clone, PartialEq)]
pub struct TraceSample {
    pub state: ProgramState,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraceKind {
    Script(Vec<TraceNode>),
    Push(Vec<TraceNode>),
    Evaluation {
        source: Vec<TraceNode>,
        samples: Vec<TraceSample>,
    },
    Bytecode,
    Comment,
    Error,
}

/// One reduced node, mirroring a [`ResolvedSegment`].
///
/// `errors` holds the node's own errors followed by those of its descendants in
/// document order.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceNode {
    pub bytecode: Vec<u8>,
    pub range: Range,
    pub errors: Vec<CompilationError>,
    pub kind: TraceKind,
}

pub type ReductionTrace = TraceNode;

impl TraceNode {
    fn leaf(bytecode: Vec<u8>, range: Range, kind: TraceKind) -> Self {
        Self {
            bytecode,
            range,
            errors: Vec::new(),
            kind,
        }
    }

    pub fn source(&self) -> Option<&[TraceNode]> {
        match &self.kind {
            TraceKind::Script(source)
            | TraceKind::Push(source)
            | TraceKind::Evaluation { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn samples(&self) -> &[TraceSample] {
        match &self.kind {
            TraceKind::Evaluation { samples, .. } => samples,
            _ => &[],
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

fn concat_bytecode(source: &[TraceNode]) -> Vec<u8> {
    source
        .iter()
        .flat_map(|node| node.bytecode.iter().copied())
        .collect()
}

fn collect_errors(source: &[TraceNode]) -> Vec<CompilationError> {
    source
        .iter()
        .flat_map(|node| node.errors.iter().cloned())
        .collect()
}

/// Reduce a resolved script to bytecode, running every evaluation on `vm`.
pub fn reduce_script(
    script: &[ResolvedSegment],
    vm: Option<&dyn VirtualMachine>,
    create_state: Option<&StateFactory>,
) -> ReductionTrace {
    let source = reduce_segments(script, vm, create_state);
    TraceNode {
        bytecode: concat_bytecode(&source),
        range: Range::union(source.iter().map(|node| &node.range)).unwrap_or_default(),
        errors: collect_errors(&source),
        kind: TraceKind::Script(source),
    }
}

fn reduce_segments(
    script: &[ResolvedSegment],
    vm: Option<&dyn VirtualMachine>,
    create_state: Option<&StateFactory>,
) -> Vec<TraceNode> {
    script
        .iter()
        .map(|segment| reduce_segment(segment, vm, create_state))
        .collect()
}

fn reduce_segment(
    segment: &ResolvedSegment,
    vm: Option<&dyn VirtualMachine>,
    create_state: Option<&StateFactory>,
) -> TraceNode {
    match segment {
        ResolvedSegment::Bytecode { value, range, .. } => {
            TraceNode::leaf(value.clone(), *range, TraceKind::Bytecode)
        }
        ResolvedSegment::Comment { range, .. } => {
            TraceNode::leaf(Vec::new(), *range, TraceKind::Comment)
        }
        ResolvedSegment::Error { message, range } => TraceNode {
            errors: vec![CompilationError::new(message.clone(), *range)],
            ..TraceNode::leaf(Vec::new(), *range, TraceKind::Error)
        },
        ResolvedSegment::Push { value, range } => {
            let source = reduce_segments(value, vm, create_state);
            TraceNode {
                bytecode: encode_data_push(&concat_bytecode(&source)),
                range: *range,
                errors: collect_errors(&source),
                kind: TraceKind::Push(source),
            }
        }
        ResolvedSegment::Evaluation { value, range } => {
            reduce_evaluation(value, *range, vm, create_state)
        }
    }
}

fn reduce_evaluation(
    script: &[ResolvedSegment],
    range: Range,
    vm: Option<&dyn VirtualMachine>,
    create_state: Option<&StateFactory>,
) -> TraceNode {
    let source = reduce_segments(script, vm, create_state);
    let child_errors = collect_errors(&source);
    let node = |bytecode: Vec<u8>, errors: Vec<CompilationError>, samples: Vec<TraceSample>| TraceNode {
        bytecode,
        range,
        errors,
        kind: TraceKind::Evaluation {
            source: source.clone(),
            samples,
        },
    };

    if !child_errors.is_empty() {
        return node(Vec::new(), child_errors, Vec::new());
    }
    let (Some(vm), Some(create_state)) = (vm, create_state) else {
        return node(
            Vec::new(),
            vec![CompilationError::new(MISSING_VM, range)],
            Vec::new(),
        );
    };

    let evaluation = evaluate_source(&source, vm, create_state);
    match evaluation.outcome {
        Ok(bytecode) => node(bytecode, Vec::new(), evaluation.samples),
        Err(message) => {
            tracing::debug!(%range, %message, "evaluation failed");
            node(
                Vec::new(),
                vec![CompilationError::new(
                    format!("Failed to reduce evaluation: {message}"),
                    range,
                )],
                evaluation.samples,
            )
        }
    }
}

/// Samples of the outermost script, debugged as a whole.
pub fn sample_script(
    trace: &ReductionTrace,
    vm: &dyn VirtualMachine,
    create_state: &StateFactory,
) -> Vec<TraceSample> {
    match trace.source() {
        Some(source) => evaluate_source(source, vm, create_state).samples,
        None => Vec::new(),
    }
}
