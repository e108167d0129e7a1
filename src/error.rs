use super::ast::{LineIndex, Range, SourcePosition, Span};
use anyhow::Result;
use ariadne::{Color, Label, Report, ReportKind, Source};

/// Which group was left open when the parser ran out of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    UnclosedPush,
    UnclosedEvaluation,
    UnclosedComment,
}

impl ErrorType {
    fn expected(&self) -> &'static str {
        match self {
            Self::UnclosedPush => "'>' to close the push",
            Self::UnclosedEvaluation => "')' to close the evaluation",
            Self::UnclosedComment => "'*/' to close the comment",
        }
    }
}

/// Error type threaded through the chumsky parser.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxError {
    /// Descriptions of what could have come next, and the character found.
    ExpectedFound(Span, Vec<String>, Option<char>),
    Unclosed(Span, ErrorType, Option<char>),
    Custom(Span, String),
}

impl SyntaxError {
    pub fn custom(span: Span, message: impl Into<String>) -> Self {
        Self::Custom(span, message.into())
    }

    pub fn span(&self) -> &Span {
        match self {
            Self::ExpectedFound(span, ..) => span,
            Self::Unclosed(span, ..) => span,
            Self::Custom(span, _) => span,
        }
    }

    pub fn found(&self) -> Option<char> {
        match self {
            Self::ExpectedFound(_, _, found) | Self::Unclosed(_, _, found) => *found,
            Self::Custom(..) => None,
        }
    }

    pub fn expected_tokens(&self) -> Vec<String> {
        match self {
            Self::ExpectedFound(_, expected, _) => {
                let mut tokens = expected.clone();
                tokens.sort();
                tokens.dedup();
                tokens
            }
            Self::Unclosed(_, label, _) => vec![label.expected().to_string()],
            Self::Custom(_, message) => vec![message.clone()],
        }
    }

    /// Name something the failed parser would have accepted.
    ///
    /// Character filters report no expectations of their own.
    pub fn expecting(self, description: &str) -> Self {
        match self {
            Self::ExpectedFound(span, mut expected, found) => {
                expected.push(description.to_string());
                Self::ExpectedFound(span, expected, found)
            }
            other => other,
        }
    }
}

fn describe_token(token: Option<char>) -> String {
    match token {
        Some(c) => format!("{c:?}"),
        None => "end of input".to_string(),
    }
}

impl chumsky::Error<char> for SyntaxError {
    type Span = Span;
    type Label = ErrorType;

    fn expected_input_found<It: IntoIterator<Item = Option<char>>>(
        span: Self::Span,
        expected: It,
        found: Option<char>,
    ) -> Self {
        Self::ExpectedFound(span, expected.into_iter().map(describe_token).collect(), found)
    }

    fn with_label(self, label: Self::Label) -> Self {
        let Self::ExpectedFound(span, _, found) = self else {
            return self;
        };
        Self::Unclosed(span, label, found)
    }

    fn merge(mut self, mut other: Self) -> Self {
        match (&mut self, &mut other) {
            (Self::ExpectedFound(_, expected, _), Self::ExpectedFound(_, expected_other, _)) => {
                expected.append(expected_other);
                self
            }
            (Self::ExpectedFound(..), _) => other,
            _ => self,
        }
    }
}

/// The single error reported when a script cannot be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub expected_tokens: Vec<String>,
    pub found: Option<char>,
    pub position: SourcePosition,
}

impl ParseError {
    pub const EMPTY_SCRIPT: &'static str = "Tried to compile an empty string as a script.";

    pub fn empty() -> Self {
        Self {
            expected_tokens: Vec::new(),
            found: None,
            position: SourcePosition {
                offset: 0,
                line: 1,
                column: 1,
            },
        }
    }

    pub fn from_syntax_error(error: &SyntaxError, index: &LineIndex) -> Self {
        Self {
            expected_tokens: error.expected_tokens(),
            found: error.found(),
            position: index.position(error.span().start),
        }
    }

    pub fn message(&self) -> String {
        if self.expected_tokens.is_empty() {
            return Self::EMPTY_SCRIPT.to_string();
        }
        let found = match self.found {
            Some(c) => format!("{c:?}"),
            None => "end of input".to_string(),
        };
        format!(
            "Encountered unexpected input while parsing script. Expected {} but found {}.",
            self.expected_tokens.join(", "),
            found
        )
    }

    pub fn into_compilation_error(self) -> CompilationError {
        CompilationError {
            message: self.message(),
            range: Range::at(self.position),
        }
    }

    pub fn report(&self, filename: &str, src: &str) -> Result<()> {
        self.clone().into_compilation_error().report(filename, src)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message(), self.position)
    }
}

impl std::error::Error for ParseError {}

/// A positioned error collected while resolving or reducing a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationError {
    pub message: String,
    pub range: Range,
}

impl CompilationError {
    pub fn new(message: impl Into<String>, range: Range) -> Self {
        Self {
            message: message.into(),
            range,
        }
    }

    pub fn report(&self, filename: &str, src: &str) -> Result<()> {
        let src = if src.is_empty() {
            " ".to_string()
        } else {
            src.to_string()
        };
        let index = LineIndex::new(&src);
        let start = index.offset(self.range.start_line, self.range.start_column);
        let end = index
            .offset(self.range.end_line, self.range.end_column)
            .max(start + 1);
        let span = start..end;
        Report::build(ReportKind::Error, (filename, span.clone()))
            .with_message(&self.message)
            .with_label(
                Label::new((filename, span))
                    .with_message(&self.message)
                    .with_color(Color::Red),
            )
            .finish()
            .eprint((filename, Source::from(src.as_str())))?;
        Ok(())
    }
}

impl std::fmt::Display for CompilationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.range, self.message)
    }
}

/// Why a single identifier could not be turned into bytecode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("Unknown identifier \"{0}\".")]
    UnknownIdentifier(String),

    #[error("A circular dependency was encountered: {}.", .cycle.join(" → "))]
    CircularDependency { cycle: Vec<String> },

    #[error("Compilation error in resolved script \"{script_id}\": {}", .errors.join(" "))]
    ScriptCompilation {
        script_id: String,
        errors: Vec<String>,
    },

    #[error("Identifier \"{identifier}\" requires a Secp256k1 implementation, but none was provided in the compilation environment.")]
    MissingSecp256k1 { identifier: String },

    #[error("Identifier \"{identifier}\" requires a Sha256 implementation, but none was provided in the compilation environment.")]
    MissingSha256 { identifier: String },

    #[error("Identifier \"{identifier}\" requires a signing serialization, but no transaction context was provided in the compilation data.")]
    MissingTransactionContext { identifier: String },

    #[error("Identifier \"{identifier}\" refers to a key, but no private key was provided in the compilation data.")]
    MissingPrivateKey { identifier: String },

    #[error("Identifier \"{identifier}\" refers to a public key, but no public or private key was provided in the compilation data.")]
    MissingPublicKey { identifier: String },

    #[error("Identifier \"{identifier}\" requires {field}, but it was not provided in the compilation data.")]
    MissingCompilationData {
        identifier: String,
        field: &'static str,
    },

    #[error("Identifier \"{identifier}\" refers to {kind} \"{variable_id}\", but no value was provided in the compilation data.")]
    MissingVariableData {
        identifier: String,
        kind: &'static str,
        variable_id: String,
    },

    #[error("Identifier \"{identifier}\" refers to a Key, but does not specify an operation, e.g. \"{identifier}.public_key\".")]
    MissingKeyOperation { identifier: String },

    #[error("Unknown variable operation \"{operation}\" in identifier \"{identifier}\".")]
    UnknownOperation {
        identifier: String,
        operation: String,
    },

    #[error("Unknown signing serialization algorithm \"{algorithm}\" in identifier \"{identifier}\".")]
    UnknownSigningAlgorithm {
        identifier: String,
        algorithm: String,
    },

    #[error("Current block time {time} is not a valid locktime timestamp; it must be at least 500000000.")]
    InvalidBlockTime { time: u32 },

    #[error("Identifier \"{identifier}\" could not be resolved: {message}")]
    Crypto { identifier: String, message: String },
}
