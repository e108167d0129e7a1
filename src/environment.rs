use crate::vm::{default_opcodes, StackMachine, StateFactory, VirtualMachine};
use std::collections::HashMap;
use std::sync::Arc;

pub trait Sha256: Send + Sync {
    fn hash(&self, input: &[u8]) -> [u8; 32];
}

/// Elliptic curve operations used to resolve key variables.
///
/// Failures are reported as plain messages and surface as resolution errors.
pub trait Secp256k1: Send + Sync {
    fn derive_public_key_compressed(&self, private_key: &[u8]) -> Result<Vec<u8>, String>;
    fn sign_message_hash_der(
        &self,
        private_key: &[u8],
        message_hash: &[u8; 32],
    ) -> Result<Vec<u8>, String>;
    fn sign_message_hash_schnorr(
        &self,
        private_key: &[u8],
        message_hash: &[u8; 32],
    ) -> Result<Vec<u8>, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    Key,
    AddressData,
    WalletData,
    CurrentBlockHeight,
    CurrentBlockTime,
}

impl Variable {
    pub fn kind(self) -> &'static str {
        match self {
            Self::Key => "Key",
            Self::AddressData => "AddressData",
            Self::WalletData => "WalletData",
            Self::CurrentBlockHeight => "CurrentBlockHeight",
            Self::CurrentBlockTime => "CurrentBlockTime",
        }
    }
}

/// Transaction fields covered by a signing serialization.
///
/// `transaction_outpoints`, `transaction_sequence_numbers` and `transaction_outputs`
/// hold the serialized concatenation for every input or output of the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionContext {
    pub version: u32,
    pub transaction_outpoints: Vec<u8>,
    pub transaction_sequence_numbers: Vec<u8>,
    pub outpoint_transaction_hash: [u8; 32],
    pub outpoint_index: u32,
    pub covered_bytecode: Vec<u8>,
    pub output_value: u64,
    pub sequence_number: u32,
    pub corresponding_output: Option<Vec<u8>>,
    pub transaction_outputs: Vec<u8>,
    pub locktime: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyData {
    pub private_keys: HashMap<String, Vec<u8>>,
    pub public_keys: HashMap<String, Vec<u8>>,
    /// Keyed by the full identifier, e.g. `owner.signature.all_outputs`.
    pub signatures: HashMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompilationData {
    pub keys: KeyData,
    pub wallet_data: HashMap<String, Vec<u8>>,
    pub address_data: HashMap<String, Vec<u8>>,
    pub current_block_height: Option<u32>,
    pub current_block_time: Option<u32>,
    pub transaction_context: Option<TransactionContext>,
}

impl CompilationData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_private_key(mut self, id: impl Into<String>, key: Vec<u8>) -> Self {
        self.keys.private_keys.insert(id.into(), key);
        self
    }

    pub fn with_public_key(mut self, id: impl Into<String>, key: Vec<u8>) -> Self {
        self.keys.public_keys.insert(id.into(), key);
        self
    }

    pub fn with_signature(mut self, identifier: impl Into<String>, signature: Vec<u8>) -> Self {
        self.keys.signatures.insert(identifier.into(), signature);
        self
    }

    pub fn with_wallet_data(mut self, id: impl Into<String>, value: Vec<u8>) -> Self {
        self.wallet_data.insert(id.into(), value);
        self
    }

    pub fn with_address_data(mut self, id: impl Into<String>, value: Vec<u8>) -> Self {
        self.address_data.insert(id.into(), value);
        self
    }

    pub fn with_block_height(mut self, height: u32) -> Self {
        self.current_block_height = Some(height);
        self
    }

    pub fn with_block_time(mut self, time: u32) -> Self {
        self.current_block_time = Some(time);
        self
    }

    pub fn with_transaction_context(mut self, context: TransactionContext) -> Self {
        self.transaction_context = Some(context);
        self
    }
}

/// Everything a compile call may consult besides the script itself.
#[derive(Clone, Default)]
pub struct CompilationEnvironment {
    pub opcodes: HashMap<String, Vec<u8>>,
    pub variables: HashMap<String, Variable>,
    pub scripts: HashMap<String, String>,
    /// Ids of the scripts currently being resolved, outermost first.
    pub source_script_ids: Vec<String>,
    pub sha256: Option<Arc<dyn Sha256>>,
    pub secp256k1: Option<Arc<dyn Secp256k1>>,
    pub vm: Option<Arc<dyn VirtualMachine>>,
    pub create_state: Option<StateFactory>,
}

impl CompilationEnvironment {
    /// An environment knowing every opcode name and nothing else.
    pub fn new() -> Self {
        Self {
            opcodes: default_opcodes(),
            ..Self::default()
        }
    }

    pub fn with_opcodes(mut self, opcodes: HashMap<String, Vec<u8>>) -> Self {
        self.opcodes = opcodes;
        self
    }

    pub fn with_vm(mut self, vm: Arc<dyn VirtualMachine>, create_state: StateFactory) -> Self {
        self.vm = Some(vm);
        self.create_state = Some(create_state);
        self
    }

    pub fn with_stack_machine(self) -> Self {
        self.with_vm(Arc::new(StackMachine::new()), StackMachine::state_factory())
    }

    pub fn with_script(mut self, id: impl Into<String>, source: impl Into<String>) -> Self {
        self.scripts.insert(id.into(), source.into());
        self
    }

    pub fn with_variable(mut self, id: impl Into<String>, variable: Variable) -> Self {
        self.variables.insert(id.into(), variable);
        self
    }

    pub fn with_sha256(mut self, sha256: Arc<dyn Sha256>) -> Self {
        self.sha256 = Some(sha256);
        self
    }

    pub fn with_secp256k1(mut self, secp256k1: Arc<dyn Secp256k1>) -> Self {
        self.secp256k1 = Some(secp256k1);
        self
    }

    pub fn with_source_script_ids(mut self, ids: Vec<String>) -> Self {
        self.source_script_ids = ids;
        self
    }
}

impl std::fmt::Debug for CompilationEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut scripts = self.scripts.keys().collect::<Vec<_>>();
        scripts.sort();
        f.debug_struct("CompilationEnvironment")
            .field("opcodes", &self.opcodes.len())
            .field("variables", &self.variables)
            .field("scripts", &scripts)
            .field("source_script_ids", &self.source_script_ids)
            .field("sha256", &self.sha256.is_some())
            .field("secp256k1", &self.secp256k1.is_some())
            .field("vm", &self.vm.is_some())
            .finish()
    }
}
