pub mod ast;
pub mod cli;
pub mod compiler;
pub mod debugger;
pub mod environment;
pub mod error;
pub mod parser;
pub mod reducer;
pub mod resolver;
pub mod trace;
pub mod vm;

pub use compiler::{
    compile, compile_script, CompilationErrorType, CompilationFailure, CompilationResult,
    CompilationSuccess,
};
pub use environment::{
    CompilationData, CompilationEnvironment, Secp256k1, Sha256, TransactionContext, Variable,
};
pub use error::{CompilationError, ParseError, ResolutionError};
