
use crate::ast::Script;
use crate::environment::{CompilationData, CompilationEnvironment};
use crate::error::CompilationError;
use crate::parser::parse;
use crate::reducer::{reduce_script, ReductionTrace};
use crate::resolver::{resolution_errors, resolve_script, IdentifierResolver, ResolvedScript};

/// The stage a failed compilation stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationErrorType {
    Parse,
    Resolve,
    Reduce,
}

impl std::fmt::Display for CompilationErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse => write!(f, "parse"),
            Self::Resolve => write!(f, "resolve"),
            Self::Reduce => write!(f, "reduce"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompilationSuccess {
    pub bytecode: Vec<u8>,
    pub parse: Script,
    pub resolve: ResolvedScript,
    pub reduce: ReductionTrace,
}

/// A failed compilation along with whatever stages completed.
///
/// Resolution errors still produce a best-effort reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationFailure {
    pub error_type: CompilationErrorType,
    pub errors: Vec<CompilationError>,
    pub parse: Option<Script>,
    pub resolve: Option<ResolvedScript>,
    pub reduce: Option<ReductionTrace>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompilationResult {
    Success(CompilationSuccess),
    Failure(CompilationFailure),
}

impl CompilationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn bytecode(&self) -> Option<&[u8]> {
        match self {
            Self::Success(success) => Some(&success.bytecode),
            Self::Failure(_) => None,
        }
    }

    pub fn errors(&self) -> &[CompilationError] {
        match self {
            Self::Success(_) => &[],
            Self::Failure(failure) => &failure.errors,
        }
    }

    pub fn reduce(&self) -> Option<&ReductionTrace> {
        match self {
            Self::Success(success) => Some(&success.reduce),
            Self::Failure(failure) => failure.reduce.as_ref(),
        }
    }
}

/// Compile a template script against the given environment and data.
pub fn compile(
    script: &str,
    data: &CompilationData,
    environment: &CompilationEnvironment,
) -> CompilationResult {
    compile_with_ids(
        None,
        script,
        data,
        environment,
        &environment.source_script_ids,
    )
}

/// Compile the environment's script with the given id, `None` if there is no such script.
pub fn compile_script(
    script_id: &str,
    data: &CompilationData,
    environment: &CompilationEnvironment,
) -> Option<CompilationResult> {
    let script = environment.scripts.get(script_id)?;
    Some(compile_with_ids(
        Some(script_id),
        script,
        data,
        environment,
        &environment.source_script_ids,
    ))
}

pub(crate) fn compile_nested(
    script_id: &str,
    script: &str,
    data: &CompilationData,
    environment: &CompilationEnvironment,
    source_script_ids: &[String],
) -> CompilationResult {
    compile_with_ids(Some(script_id), script, data, environment, source_script_ids)
}

fn compile_with_ids(
    script_id: Option<&str>,
    script: &str,
    data: &CompilationData,
    environment: &CompilationEnvironment,
    source_script_ids: &[String],
) -> CompilationResult {
    let _span = tracing::debug_span!("compile", script = script_id.unwrap_or("<inline>")).entered();

    let parse = match parse(script) {
        Ok(parse) => parse,
        Err(error) => {
            tracing::debug!(%error, "parse failed");
            return CompilationResult::Failure(CompilationFailure {
                error_type: CompilationErrorType::Parse,
                errors: vec![error.into_compilation_error()],
                parse: None,
                resolve: None,
                reduce: None,
            });
        }
    };

    let resolver = IdentifierResolver::new(script_id, data, environment, source_script_ids);
    let resolve = resolve_script(&parse, &|identifier: &str| resolver.resolve(identifier));
    let resolve_errors = resolution_errors(&resolve);
    let reduce = reduce_script(
        &resolve,
        environment.vm.as_deref(),
        environment.create_state.as_ref(),
    );

    let (error_type, errors) = match (resolve_errors.is_empty(), reduce.has_errors()) {
        (false, _) => (CompilationErrorType::Resolve, resolve_errors),
        (true, true) => (CompilationErrorType::Reduce, reduce.errors.clone()),
        (true, false) => {
            tracing::debug!(bytes = reduce.bytecode.len(), "compiled");
            return CompilationResult::Success(CompilationSuccess {
                bytecode: reduce.bytecode.clone(),
                parse,
                resolve,
                reduce,
            });
        }
    };
    tracing::debug!(%error_type, errors = errors.len(), "compilation failed");
    CompilationResult::Failure(CompilationFailure {
        error_type,
        errors,
        parse: Some(parse),
        resolve: Some(resolve),
        reduce: Some(reduce),
    })
}
