use crate::trace::{Spacer, ViewerLine};
use crate::vm::ProgramState;
use crossterm::style::Stylize;

const SEPARATOR: &str = " | ";

fn spacer_symbol(spacer: Spacer) -> &'static str {
    match spacer {
        Spacer::Evaluation => "$ ",
        Spacer::ExecutedConditional => "+ ",
        Spacer::SkippedConditional => "- ",
    }
}

fn format_stack(stack: &[Vec<u8>]) -> String {
    if stack.is_empty() {
        return "[]".to_string();
    }
    stack
        .iter()
        .map(|item| format!("0x{}", hex::encode(item)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_state(state: &ProgramState, color: bool) -> String {
    match &state.error {
        Some(error) if color => format!("{}", format!("error: {error}").red()),
        Some(error) => format!("error: {error}"),
        None => {
            let mut text = format_stack(&state.stack);
            if !state.alternate_stack.is_empty() {
                text.push_str(&format!(" (alt: {})", format_stack(&state.alternate_stack)));
            }
            text
        }
    }
}

/// Render each source line followed by its spacers and program state.
///
/// `lines` must hold one entry per line of `script`.
pub fn render_trace(script: &str, lines: &[ViewerLine], color: bool) -> String {
    let source = script.split('\n').collect::<Vec<_>>();
    let width = source
        .iter()
        .map(|line| line.chars().count())
        .max()
        .unwrap_or_default();
    let number_width = source.len().to_string().len();

    let mut output = String::new();
    for (index, text) in source.iter().enumerate() {
        let line = lines.get(index).cloned().unwrap_or_default();
        let spacers = line
            .spacers
            .unwrap_or_default()
            .into_iter()
            .map(spacer_symbol)
            .collect::<String>();
        let state = line
            .state
            .as_ref()
            .map(|state| format_state(state, color))
            .unwrap_or_default();
        let number = format!("{:>number_width$}", index + 1);
        let number = match color {
            true => format!("{}", number.dark_grey()),
            false => number,
        };
        let row = match spacers.is_empty() && state.is_empty() {
            true => format!("{number} {text}"),
            false => format!("{number} {text:<width$}{SEPARATOR}{spacers}{state}"),
        };
        output.push_str(row.trim_end());
        output.push('\n');
    }
    output
}
