
use crate::ast::Range;
use crate::environment::CompilationEnvironment;
use crate::reducer::{sample_script, ReductionTrace, TraceKind, TraceNode, TraceSample};
use crate::vm::ProgramState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spacer {
    Evaluation,
    ExecutedConditional,
    SkippedConditional,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSample {
    pub state: Option<ProgramState>,
    pub range: Range,
    /// Number of evaluations enclosing the sample, `0` for the script body.
    pub depth: usize,
}

impl EvaluationSample {
    fn from_trace_sample(sample: &TraceSample, depth: usize) -> Self {
        Self {
            state: Some(sample.state.clone()),
            range: sample.range,
            depth,
        }
    }
}

/// What to show next to one line of source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewerLine {
    pub state: Option<ProgramState>,
    pub spacers: Option<Vec<Spacer>>,
}

impl ViewerLine {
    pub fn is_error(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| state.error.is_some())
    }
}

/// Samples of every evaluation below `node`, evaluations directly below it at `depth`.
pub fn extract_evaluation_samples(node: &TraceNode, depth: usize) -> Vec<EvaluationSample> {
    let mut samples = Vec::new();
    for child in node.source().unwrap_or_default() {
        match &child.kind {
            TraceKind::Evaluation { samples: own, .. } => {
                samples.extend(
                    own.iter()
                        .map(|sample| EvaluationSample::from_trace_sample(sample, depth)),
                );
                samples.extend(extract_evaluation_samples(child, depth + 1));
            }
            TraceKind::Push(_) => samples.extend(extract_evaluation_samples(child, depth)),
            _ => {}
        }
    }
    samples
}

fn conditional_spacers(state: &ProgramState) -> impl Iterator<Item = Spacer> + '_ {
    state.execution_stack.iter().map(|executing| match executing {
        true => Spacer::ExecutedConditional,
        false => Spacer::SkippedConditional,
    })
}

/// Spacers for each sample, in the order given.
///
/// Samples must already be sorted by start position.
pub fn assign_spacers(samples: &[EvaluationSample]) -> Vec<Vec<Spacer>> {
    let mut cache: Vec<Vec<Spacer>> = vec![Vec::new()];
    samples
        .iter()
        .map(|sample| {
            if sample.depth > cache.len() {
                tracing::debug!(
                    from = cache.len() - 1,
                    to = sample.depth,
                    "evaluation depth skipped a level"
                );
            }
            while cache.len() <= sample.depth {
                let mut entered = cache.last().cloned().unwrap_or_default();
                entered.push(Spacer::Evaluation);
                cache.push(entered);
            }
            cache.truncate(sample.depth + 1);

            let mut spacers = cache[sample.depth].clone();
            if let Some(state) = &sample.state {
                spacers.extend(conditional_spacers(state));
            }
            if let Some(skipped) = spacers
                .iter()
                .position(|spacer| *spacer == Spacer::SkippedConditional)
            {
                spacers.truncate(skipped + 1);
            }
            spacers
        })
        .collect()
}

/// One viewer line per source line, from the reduction trace and the samples
/// of the outermost script.
pub fn reconstruct_trace(
    line_count: usize,
    trace: &ReductionTrace,
    top_level: &[TraceSample],
) -> Vec<ViewerLine> {
    let mut samples = top_level
        .iter()
        .map(|sample| EvaluationSample::from_trace_sample(sample, 0))
        .chain(extract_evaluation_samples(trace, 1))
        .collect::<Vec<_>>();
    samples.sort_by_key(|sample| sample.range.start());
    let spacers = assign_spacers(&samples);

    let mut selected: Vec<Option<usize>> = vec![None; line_count];
    for (index, sample) in samples.iter().enumerate() {
        if sample.state.is_none() {
            continue;
        }
        let Some(slot) = sample
            .range
            .end_line
            .checked_sub(1)
            .and_then(|line| selected.get_mut(line))
        else {
            continue;
        };
        match slot {
            Some(current) if samples[*current].range.end_column > sample.range.end_column => {}
            _ => *slot = Some(index),
        }
    }

    let mut previous: Option<Vec<Spacer>> = None;
    selected
        .into_iter()
        .map(|selection| match selection {
            Some(index) => {
                previous = Some(spacers[index].clone());
                ViewerLine {
                    state: samples[index].state.clone(),
                    spacers: previous.clone(),
                }
            }
            None => ViewerLine {
                state: None,
                spacers: previous.clone(),
            },
        })
        .collect()
}

/// Reconstruct the trace of a compiled script, debugging its outermost bytecode
/// when the environment carries a virtual machine.
pub fn trace_script(
    script: &str,
    trace: &ReductionTrace,
    environment: &CompilationEnvironment,
) -> Vec<ViewerLine> {
    let top_level = match (&environment.vm, &environment.create_state) {
        (Some(vm), Some(create_state)) => sample_script(trace, vm.as_ref(), create_state),
        _ => Vec::new(),
    };
    reconstruct_trace(script.split('\n').count(), trace, &top_level)
}
