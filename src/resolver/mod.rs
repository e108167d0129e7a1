pub mod signing;
#[cfg(test)]
mod test;

use crate::ast::{Expr, Range, Spanned};
use crate::compiler::{compile_nested, CompilationResult};
use crate::environment::{CompilationData, CompilationEnvironment, Variable};
use crate::error::{CompilationError, ResolutionError};
use crate::vm::number::{encode_big_int, encode_number};
use signing::{signing_serialization_digest, SigningAlgorithm};

/// Minimum value distinguishing a timestamp locktime from a block height.
pub const LOCKTIME_TIMESTAMP_MINIMUM: u32 = 500_000_000;

/// Where the bytes of a [`ResolvedSegment::Bytecode`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    Literal,
    Opcode,
    Variable(String),
    Script(String),
}

pub type ResolvedScript = Vec<ResolvedSegment>;

/// One segment per syntax node, at the node's range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSegment {
    Push {
        value: ResolvedScript,
        range: Range,
    },
    Evaluation {
        value: ResolvedScript,
        range: Range,
    },
    Bytecode {
        value: Vec<u8>,
        range: Range,
        provenance: Provenance,
    },
    Comment {
        value: String,
        range: Range,
    },
    Error {
        message: String,
        range: Range,
    },
}

impl ResolvedSegment {
    pub fn range(&self) -> Range {
        match self {
            Self::Push { range, .. }
            | Self::Evaluation { range, .. }
            | Self::Bytecode { range, .. }
            | Self::Comment { range, .. }
            | Self::Error { range, .. } => *range,
        }
    }

    pub fn children(&self) -> Option<&[ResolvedSegment]> {
        match self {
            Self::Push { value, .. } | Self::Evaluation { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Every error message in the script, in document order.
pub fn resolution_errors(script: &[ResolvedSegment]) -> Vec<CompilationError> {
    let mut errors = Vec::new();
    for segment in script {
        match segment {
            ResolvedSegment::Error { message, range } => {
                errors.push(CompilationError::new(message.clone(), *range))
            }
            ResolvedSegment::Push { value, .. } | ResolvedSegment::Evaluation { value, .. } => {
                errors.extend(resolution_errors(value))
            }
            _ => {}
        }
    }
    errors
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentifier {
    pub bytecode: Vec<u8>,
    pub provenance: Provenance,
}

impl ResolvedIdentifier {
    pub fn new(bytecode: Vec<u8>, provenance: Provenance) -> Self {
        Self {
            bytecode,
            provenance,
        }
    }
}

pub fn resolve_script<F>(script: &[Spanned], resolve_identifier: &F) -> ResolvedScript
where
    F: Fn(&str) -> Result<ResolvedIdentifier, ResolutionError>,
{
    script
        .iter()
        .map(|spanned| resolve_node(spanned, resolve_identifier))
        .collect()
}

fn resolve_node<F>(spanned: &Spanned, resolve_identifier: &F) -> ResolvedSegment
where
    F: Fn(&str) -> Result<ResolvedIdentifier, ResolutionError>,
{
    let range = spanned.range;
    let literal = |value: Vec<u8>| ResolvedSegment::Bytecode {
        value,
        range,
        provenance: Provenance::Literal,
    };
    match &spanned.expr {
        Expr::Push(script) => ResolvedSegment::Push {
            value: resolve_script(script, resolve_identifier),
            range,
        },
        Expr::Evaluation(script) => ResolvedSegment::Evaluation {
            value: resolve_script(script, resolve_identifier),
            range,
        },
        Expr::Identifier(identifier) => match resolve_identifier(identifier) {
            Ok(resolved) => ResolvedSegment::Bytecode {
                value: resolved.bytecode,
                range,
                provenance: resolved.provenance,
            },
            Err(error) => ResolvedSegment::Error {
                message: error.to_string(),
                range,
            },
        },
        Expr::HexLiteral(digits) if digits.len() % 2 != 0 => ResolvedSegment::Error {
            message: format!(
                "Improperly formed HexLiteral. HexLiteral must have a length divisible by 2, but this HexLiteral has a length of {}.",
                digits.len()
            ),
            range,
        },
        Expr::HexLiteral(digits) => match hex::decode(digits) {
            Ok(bytes) => literal(bytes),
            Err(error) => ResolvedSegment::Error {
                message: format!("Improperly formed HexLiteral: {error}."),
                range,
            },
        },
        Expr::BigIntLiteral(value) => literal(encode_big_int(value)),
        Expr::Utf8Literal(text) => literal(text.as_bytes().to_vec()),
        Expr::Comment(text) => ResolvedSegment::Comment {
            value: text.clone(),
            range,
        },
    }
}

/// Resolves identifiers against the environment and compilation data of one script.
pub struct IdentifierResolver<'a> {
    script_id: Option<String>,
    data: &'a CompilationData,
    environment: &'a CompilationEnvironment,
    source_script_ids: Vec<String>,
    cycle: Option<Vec<String>>,
}

impl<'a> IdentifierResolver<'a> {
    pub fn new(
        script_id: Option<&str>,
        data: &'a CompilationData,
        environment: &'a CompilationEnvironment,
        source_script_ids: &[String],
    ) -> Self {
        let cycle = script_id.and_then(|id| {
            let start = source_script_ids.iter().position(|source| source == id)?;
            let mut cycle = source_script_ids[start..].to_vec();
            cycle.push(id.to_string());
            Some(cycle)
        });
        if let Some(cycle) = &cycle {
            tracing::debug!(?cycle, "circular dependency");
        }
        Self {
            script_id: script_id.map(str::to_string),
            data,
            environment,
            source_script_ids: source_script_ids.to_vec(),
            cycle,
        }
    }

    pub fn resolve(&self, identifier: &str) -> Result<ResolvedIdentifier, ResolutionError> {
        if let Some(cycle) = &self.cycle {
            return Err(ResolutionError::CircularDependency {
                cycle: cycle.clone(),
            });
        }

        if let Some(bytecode) = self.environment.opcodes.get(identifier) {
            return Ok(ResolvedIdentifier::new(bytecode.clone(), Provenance::Opcode));
        }

        let (variable_id, operation) = match identifier.split_once('.') {
            Some((variable_id, operation)) => (variable_id, Some(operation)),
            None => (identifier, None),
        };
        if let Some(variable) = self.environment.variables.get(variable_id) {
            let bytecode = self.resolve_variable(identifier, variable_id, operation, *variable)?;
            return Ok(ResolvedIdentifier::new(
                bytecode,
                Provenance::Variable(variable_id.to_string()),
            ));
        }

        if let Some(source) = self.environment.scripts.get(identifier) {
            let bytecode = self.resolve_script_reference(identifier, source)?;
            return Ok(ResolvedIdentifier::new(
                bytecode,
                Provenance::Script(identifier.to_string()),
            ));
        }

        Err(ResolutionError::UnknownIdentifier(identifier.to_string()))
    }

    fn resolve_variable(
        &self,
        identifier: &str,
        variable_id: &str,
        operation: Option<&str>,
        variable: Variable,
    ) -> Result<Vec<u8>, ResolutionError> {
        let unknown_operation = |operation: &str| ResolutionError::UnknownOperation {
            identifier: identifier.to_string(),
            operation: operation.to_string(),
        };
        if let (Some(operation), false) = (operation, variable == Variable::Key) {
            return Err(unknown_operation(operation));
        }

        match variable {
            Variable::Key => {
                let operation = operation.ok_or_else(|| ResolutionError::MissingKeyOperation {
                    identifier: identifier.to_string(),
                })?;
                match operation.split_once('.') {
                    None if operation == "public_key" => self.public_key(identifier, variable_id),
                    Some(("signature", algorithm)) => {
                        self.signature(identifier, variable_id, algorithm, false)
                    }
                    Some(("schnorr_signature", algorithm)) => {
                        self.signature(identifier, variable_id, algorithm, true)
                    }
                    _ => Err(unknown_operation(operation)),
                }
            }
            Variable::WalletData | Variable::AddressData => {
                let values = match variable {
                    Variable::WalletData => &self.data.wallet_data,
                    _ => &self.data.address_data,
                };
                values
                    .get(variable_id)
                    .cloned()
                    .ok_or_else(|| ResolutionError::MissingVariableData {
                        identifier: identifier.to_string(),
                        kind: variable.kind(),
                        variable_id: variable_id.to_string(),
                    })
            }
            Variable::CurrentBlockHeight => self
                .data
                .current_block_height
                .map(|height| encode_number(i64::from(height)))
                .ok_or_else(|| ResolutionError::MissingCompilationData {
                    identifier: identifier.to_string(),
                    field: "current_block_height",
                }),
            Variable::CurrentBlockTime => {
                let time = self.data.current_block_time.ok_or_else(|| {
                    ResolutionError::MissingCompilationData {
                        identifier: identifier.to_string(),
                        field: "current_block_time",
                    }
                })?;
                if time < LOCKTIME_TIMESTAMP_MINIMUM {
                    return Err(ResolutionError::InvalidBlockTime { time });
                }
                Ok(time.to_le_bytes().to_vec())
            }
        }
    }

    fn public_key(&self, identifier: &str, variable_id: &str) -> Result<Vec<u8>, ResolutionError> {
        if let Some(public_key) = self.data.keys.public_keys.get(variable_id) {
            return Ok(public_key.clone());
        }
        let private_key = self
            .data
            .keys
            .private_keys
            .get(variable_id)
            .ok_or_else(|| ResolutionError::MissingPublicKey {
                identifier: identifier.to_string(),
            })?;
        let secp256k1 =
            self.environment
                .secp256k1
                .as_ref()
                .ok_or_else(|| ResolutionError::MissingSecp256k1 {
                    identifier: identifier.to_string(),
                })?;
        secp256k1
            .derive_public_key_compressed(private_key)
            .map_err(|message| ResolutionError::Crypto {
                identifier: identifier.to_string(),
                message,
            })
    }

    fn signature(
        &self,
        identifier: &str,
        variable_id: &str,
        algorithm: &str,
        schnorr: bool,
    ) -> Result<Vec<u8>, ResolutionError> {
        if let Some(signature) = self.data.keys.signatures.get(identifier) {
            return Ok(signature.clone());
        }
        let algorithm = algorithm.parse::<SigningAlgorithm>().map_err(|_| {
            ResolutionError::UnknownSigningAlgorithm {
                identifier: identifier.to_string(),
                algorithm: algorithm.to_string(),
            }
        })?;
        let context = self.data.transaction_context.as_ref().ok_or_else(|| {
            ResolutionError::MissingTransactionContext {
                identifier: identifier.to_string(),
            }
        })?;
        let private_key = self
            .data
            .keys
            .private_keys
            .get(variable_id)
            .ok_or_else(|| ResolutionError::MissingPrivateKey {
                identifier: identifier.to_string(),
            })?;
        let sha256 =
            self.environment
                .sha256
                .as_ref()
                .ok_or_else(|| ResolutionError::MissingSha256 {
                    identifier: identifier.to_string(),
                })?;
        let secp256k1 =
            self.environment
                .secp256k1
                .as_ref()
                .ok_or_else(|| ResolutionError::MissingSecp256k1 {
                    identifier: identifier.to_string(),
                })?;

        let digest = signing_serialization_digest(context, algorithm, sha256.as_ref());
        let signed = match schnorr {
            true => secp256k1.sign_message_hash_schnorr(private_key, &digest),
            false => secp256k1.sign_message_hash_der(private_key, &digest),
        };
        let mut signature = signed.map_err(|message| ResolutionError::Crypto {
            identifier: identifier.to_string(),
            message,
        })?;
        signature.push(algorithm.sighash_type());
        Ok(signature)
    }

    fn resolve_script_reference(
        &self,
        identifier: &str,
        source: &str,
    ) -> Result<Vec<u8>, ResolutionError> {
        let mut source_script_ids = self.source_script_ids.clone();
        source_script_ids.extend(self.script_id.clone());
        tracing::debug!(script = identifier, ?source_script_ids, "compiling nested script");

        match compile_nested(
            identifier,
            source,
            self.data,
            self.environment,
            &source_script_ids,
        ) {
            CompilationResult::Success(success) => Ok(success.bytecode),
            CompilationResult::Failure(failure) => Err(ResolutionError::ScriptCompilation {
                script_id: identifier.to_string(),
                errors: failure.errors.iter().map(ToString::to_string).collect(),
            }),
        }
    }
}
