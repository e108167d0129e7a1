use num_bigint::BigInt;

/// Character offsets into the source, as produced by the parser.
pub type Span = std::ops::Range<usize>;
pub type Script = Vec<Spanned>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourcePosition {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Line and column numbers are 1-based, `end_column` points one past the last character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Default for Range {
    fn default() -> Self {
        Self {
            start_line: 1,
            start_column: 1,
            end_line: 1,
            end_column: 1,
        }
    }
}

impl Range {
    pub fn new(start_line: usize, start_column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    pub fn at(position: SourcePosition) -> Self {
        Self::new(position.line, position.column, position.line, position.column)
    }

    pub fn start(&self) -> (usize, usize) {
        (self.start_line, self.start_column)
    }

    pub fn end(&self) -> (usize, usize) {
        (self.end_line, self.end_column)
    }

    pub fn contains(&self, other: &Range) -> bool {
        self.start() <= other.start() && other.end() <= self.end()
    }

    /// Smallest range covering both.
    pub fn merge(&self, other: &Range) -> Range {
        let (start_line, start_column) = self.start().min(other.start());
        let (end_line, end_column) = self.end().max(other.end());
        Range::new(start_line, start_column, end_line, end_column)
    }

    /// Union of all ranges, `None` when the iterator is empty.
    pub fn union<'a>(ranges: impl IntoIterator<Item = &'a Range>) -> Option<Range> {
        ranges
            .into_iter()
            .fold(None, |acc: Option<Range>, range| match acc {
                Some(acc) => Some(acc.merge(range)),
                None => Some(*range),
            })
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start_line, self.start_column, self.end_line, self.end_column
        )
    }
}

/// Maps character offsets to line/column positions.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    length: usize,
}

impl LineIndex {
    pub fn new(src: &str) -> Self {
        let mut line_starts = vec![0];
        let mut length = 0;
        for (offset, c) in src.chars().enumerate() {
            if c == '\n' {
                line_starts.push(offset + 1);
            }
            length = offset + 1;
        }
        Self {
            line_starts,
            length,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn position(&self, offset: usize) -> SourcePosition {
        let offset = offset.min(self.length);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        SourcePosition {
            offset,
            line: line + 1,
            column: offset - self.line_starts[line] + 1,
        }
    }

    pub fn offset(&self, line: usize, column: usize) -> usize {
        let line = line.clamp(1, self.line_starts.len());
        (self.line_starts[line - 1] + column.saturating_sub(1)).min(self.length)
    }

    pub fn range(&self, span: &Span) -> Range {
        let start = self.position(span.start);
        let end = self.position(span.end);
        Range::new(start.line, start.column, end.line, end.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub expr: Expr,
    pub range: Range,
}

impl Spanned {
    pub fn new(expr: Expr, range: Range) -> Self {
        Self { expr, range }
    }
}

impl From<(Expr, Range)> for Spanned {
    fn from((expr, range): (Expr, Range)) -> Self {
        Self { expr, range }
    }
}

impl std::fmt::Display for Spanned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expr)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Comment(String),
    Identifier(String),
    Utf8Literal(String),
    HexLiteral(String),
    BigIntLiteral(BigInt),
    Push(Script),
    Evaluation(Script),
}

impl Expr {
    pub fn children(&self) -> Option<&[Spanned]> {
        match self {
            Self::Push(script) | Self::Evaluation(script) => Some(script),
            _ => None,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Comment(_) => "Comment",
            Self::Identifier(_) => "Identifier",
            Self::Utf8Literal(_) => "UTF8Literal",
            Self::HexLiteral(_) => "HexLiteral",
            Self::BigIntLiteral(_) => "BigIntLiteral",
            Self::Push(_) => "Push",
            Self::Evaluation(_) => "Evaluation",
        }
    }
}

fn write_script(f: &mut std::fmt::Formatter<'_>, script: &[Spanned]) -> std::fmt::Result {
    for (i, item) in script.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Comment(text) => write!(f, "/*{text}*/"),
            Self::Identifier(name) => write!(f, "{name}"),
            Self::Utf8Literal(text) => write!(f, "'{text}'"),
            Self::HexLiteral(digits) => write!(f, "0x{digits}"),
            Self::BigIntLiteral(value) => write!(f, "{value}"),
            Self::Push(script) => {
                write!(f, "<")?;
                write_script(f, script)?;
                write!(f, ">")
            }
            Self::Evaluation(script) => {
                write!(f, "$(")?;
                write_script(f, script)?;
                write!(f, ")")
            }
        }
    }
}

fn pretty_print(spanned: &Spanned, indent: usize) {
    let pad = "  ".repeat(indent);
    match &spanned.expr {
        Expr::Push(script) | Expr::Evaluation(script) => {
            println!("{}{} @ {}", pad, spanned.expr.type_of(), spanned.range);
            for item in script {
                pretty_print(item, indent + 1);
            }
        }
        expr => println!("{}{}({}) @ {}", pad, expr.type_of(), expr, spanned.range),
    }
}

pub fn print_script(script: &[Spanned]) {
    for spanned in script.iter() {
        pretty_print(spanned, 0);
    }
}
