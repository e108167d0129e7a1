
use crate::ast::{Expr, LineIndex, Script, Span, Spanned};
use crate::error::{ErrorType, ParseError, SyntaxError};
use chumsky::prelude::*;
use num_bigint::BigInt;
use std::rc::Rc;

/// Parse a template script into a positioned syntax tree.
///
/// Parsing stops at the first unexpected token; exactly one error is reported.
pub fn parse(src: &str) -> Result<Script, ParseError> {
    if src.is_empty() {
        return Err(ParseError::empty());
    }
    let index = Rc::new(LineIndex::new(src));
    parser(index.clone()).parse(src).map_err(|errors| {
        let Some(error) = errors.first() else {
            return ParseError {
                expected_tokens: vec!["a valid script".to_string()],
                found: None,
                position: index.position(0),
            };
        };
        tracing::debug!(?error, "parse failed");
        ParseError::from_syntax_error(error, &index)
    })
}

fn unclosed(label: ErrorType) -> impl Fn(SyntaxError) -> SyntaxError + Clone {
    move |error| chumsky::Error::<char>::with_label(error, label)
}

fn expecting(description: &'static str) -> impl Fn(SyntaxError) -> SyntaxError + Clone {
    move |error| error.expecting(description)
}

/// A literal must not run into the next token.
fn token_end() -> impl Parser<char, (), Error = SyntaxError> + Clone {
    filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_')
        .not()
        .rewind()
        .ignored()
        .or(end())
        .map_err(expecting("whitespace or a delimiter"))
}

fn comment() -> impl Parser<char, Expr, Error = SyntaxError> + Clone {
    let line = just("//")
        .ignore_then(filter(|c: &char| *c != '\n').repeated().collect::<String>());
    let block = just("/*").ignore_then(
        take_until(just("*/"))
            .map(|(text, _)| text.into_iter().collect::<String>())
            .map_err(unclosed(ErrorType::UnclosedComment)),
    );
    line.or(block).map(Expr::Comment)
}

fn identifier() -> impl Parser<char, Expr, Error = SyntaxError> + Clone {
    filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .chain(
            filter(|c: &char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
                .repeated(),
        )
        .collect::<String>()
        .map(Expr::Identifier)
        .map_err(expecting("an identifier"))
}

fn hex_literal() -> impl Parser<char, Expr, Error = SyntaxError> + Clone {
    just("0x")
        .ignore_then(
            filter(|c: &char| c.is_ascii_hexdigit())
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(token_end())
        .map(Expr::HexLiteral)
}

fn binary_literal() -> impl Parser<char, Expr, Error = SyntaxError> + Clone {
    just("0b")
        .ignore_then(
            filter(|c: &char| matches!(c, '0' | '1' | '_'))
                .repeated()
                .at_least(1)
                .collect::<String>(),
        )
        .then_ignore(token_end())
        .try_map(|digits: String, span: Span| {
            let digits = digits.replace('_', "");
            BigInt::parse_bytes(digits.as_bytes(), 2)
                .map(Expr::BigIntLiteral)
                .ok_or_else(|| SyntaxError::custom(span, "at least one binary digit"))
        })
}

fn big_int_literal() -> impl Parser<char, Expr, Error = SyntaxError> + Clone {
    just('-')
        .or_not()
        .chain::<char, _, _>(filter(|c: &char| c.is_ascii_digit()))
        .chain::<char, _, _>(filter(|c: &char| c.is_ascii_digit() || *c == '_').repeated())
        .map_err(expecting("a number"))
        .collect::<String>()
        .then_ignore(token_end())
        .try_map(|digits: String, span: Span| {
            let digits = digits.replace('_', "");
            BigInt::parse_bytes(digits.as_bytes(), 10)
                .map(Expr::BigIntLiteral)
                .ok_or_else(|| SyntaxError::custom(span, "a decimal integer"))
        })
}

fn utf8_literal() -> impl Parser<char, Expr, Error = SyntaxError> + Clone {
    let double = just('"')
        .ignore_then(none_of('"').repeated().collect::<String>())
        .then_ignore(just('"'));
    let single = just('\'')
        .ignore_then(none_of('\'').repeated().collect::<String>())
        .then_ignore(just('\''));
    double.or(single).map(Expr::Utf8Literal)
}

fn parser(index: Rc<LineIndex>) -> impl Parser<char, Script, Error = SyntaxError> {
    let script = recursive(move |script| {
        let push = script
            .clone()
            .delimited_by(just('<'), just('>').map_err(unclosed(ErrorType::UnclosedPush)))
            .map(Expr::Push);

        let evaluation = script
            .delimited_by(
                just("$("),
                just(')').map_err(unclosed(ErrorType::UnclosedEvaluation)),
            )
            .map(Expr::Evaluation);

        choice((
            comment(),
            push,
            evaluation,
            hex_literal(),
            binary_literal(),
            big_int_literal(),
            utf8_literal(),
            identifier(),
        ))
        .map_with_span(move |expr, span: Span| Spanned::new(expr, index.range(&span)))
        .padded()
        .repeated()
    });

    text::whitespace().ignore_then(script).then_ignore(end())
}
