use crate::environment::{Sha256, TransactionContext};
use std::str::FromStr;
use thiserror::Error;

/// Fork id appended to every sighash type.
const FORK_ID: [u8; 3] = [0x00, 0x00, 0x00];

const SIGHASH_ALL: u8 = 0x01;
const SIGHASH_NONE: u8 = 0x02;
const SIGHASH_SINGLE: u8 = 0x03;
const SIGHASH_FORKID: u8 = 0x40;
const SIGHASH_ANYONECANPAY: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error("unknown signing serialization algorithm \"{0}\"")]
    UnknownAlgorithm(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    AllOutputs,
    AllOutputsSingleInput,
    CorrespondingOutput,
    CorrespondingOutputSingleInput,
    NoOutputs,
    NoOutputsSingleInput,
}

impl FromStr for SigningAlgorithm {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all_outputs" => Ok(Self::AllOutputs),
            "all_outputs_single_input" => Ok(Self::AllOutputsSingleInput),
            "corresponding_output" => Ok(Self::CorrespondingOutput),
            "corresponding_output_single_input" => Ok(Self::CorrespondingOutputSingleInput),
            "no_outputs" => Ok(Self::NoOutputs),
            "no_outputs_single_input" => Ok(Self::NoOutputsSingleInput),
            _ => Err(SigningError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl SigningAlgorithm {
    pub fn sighash_type(self) -> u8 {
        let base = match self {
            Self::AllOutputs | Self::AllOutputsSingleInput => SIGHASH_ALL,
            Self::CorrespondingOutput | Self::CorrespondingOutputSingleInput => SIGHASH_SINGLE,
            Self::NoOutputs | Self::NoOutputsSingleInput => SIGHASH_NONE,
        };
        match self.single_input() {
            true => base | SIGHASH_FORKID | SIGHASH_ANYONECANPAY,
            false => base | SIGHASH_FORKID,
        }
    }

    fn single_input(self) -> bool {
        matches!(
            self,
            Self::AllOutputsSingleInput
                | Self::CorrespondingOutputSingleInput
                | Self::NoOutputsSingleInput
        )
    }

    fn covers_all_outputs(self) -> bool {
        matches!(self, Self::AllOutputs | Self::AllOutputsSingleInput)
    }

    fn covers_corresponding_output(self) -> bool {
        matches!(
            self,
            Self::CorrespondingOutput | Self::CorrespondingOutputSingleInput
        )
    }
}

fn hash256(sha256: &dyn Sha256, input: &[u8]) -> [u8; 32] {
    sha256.hash(&sha256.hash(input))
}

/// Bitcoin's compact-size length prefix.
pub fn compact_size(length: usize) -> Vec<u8> {
    match length {
        0..=0xfc => vec![length as u8],
        0xfd..=0xffff => {
            let mut bytes = vec![0xfd];
            bytes.extend((length as u16).to_le_bytes());
            bytes
        }
        0x10000..=0xffff_ffff => {
            let mut bytes = vec![0xfe];
            bytes.extend((length as u32).to_le_bytes());
            bytes
        }
        _ => {
            let mut bytes = vec![0xff];
            bytes.extend((length as u64).to_le_bytes());
            bytes
        }
    }
}

pub fn generate_signing_serialization(
    context: &TransactionContext,
    algorithm: SigningAlgorithm,
    sha256: &dyn Sha256,
) -> Vec<u8> {
    let empty = [0u8; 32];
    let hash_prevouts = match algorithm.single_input() {
        true => empty,
        false => hash256(sha256, &context.transaction_outpoints),
    };
    let hash_sequence = match algorithm {
        SigningAlgorithm::AllOutputs => hash256(sha256, &context.transaction_sequence_numbers),
        _ => empty,
    };
    let hash_outputs = match &context.corresponding_output {
        _ if algorithm.covers_all_outputs() => hash256(sha256, &context.transaction_outputs),
        Some(output) if algorithm.covers_corresponding_output() => hash256(sha256, output),
        _ => empty,
    };

    let mut serialization = Vec::with_capacity(160 + context.covered_bytecode.len());
    serialization.extend(context.version.to_le_bytes());
    serialization.extend(hash_prevouts);
    serialization.extend(hash_sequence);
    serialization.extend(context.outpoint_transaction_hash);
    serialization.extend(context.outpoint_index.to_le_bytes());
    serialization.extend(compact_size(context.covered_bytecode.len()));
    serialization.extend(&context.covered_bytecode);
    serialization.extend(context.output_value.to_le_bytes());
    serialization.extend(context.sequence_number.to_le_bytes());
    serialization.extend(hash_outputs);
    serialization.extend(context.locktime.to_le_bytes());
    serialization.push(algorithm.sighash_type());
    serialization.extend(FORK_ID);
    serialization
}

/// Double SHA-256 of the signing serialization, the message a signature commits to.
pub fn signing_serialization_digest(
    context: &TransactionContext,
    algorithm: SigningAlgorithm,
    sha256: &dyn Sha256,
) -> [u8; 32] {
    hash256(
        sha256,
        &generate_signing_serialization(context, algorithm, sha256),
    )
}
