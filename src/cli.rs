use crate::environment::{CompilationData, CompilationEnvironment, Variable};
use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Variable id bound to `--block-height`.
pub const BLOCK_HEIGHT_ID: &str = "current_block_height";
/// Variable id bound to `--block-time`.
pub const BLOCK_TIME_ID: &str = "current_block_time";

#[derive(Debug, Parser)]
#[command(name = "btl", about = "Compile and trace template scripts", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Compile a script and print its bytecode
    Compile(CompileArgs),
    /// Print every source line next to the program state it produces
    Trace(CompileArgs),
    /// Print the instructions encoded in hex bytecode
    Disassemble { bytecode: String },
    /// Print the syntax tree of a script
    Ast { file: String },
}

#[derive(Debug, Args, Clone)]
pub struct CompileArgs {
    pub file: String,
    /// Script the compiled file may reference, as `id=path`
    #[arg(long = "script", value_parser = parse_key_value)]
    pub scripts: Vec<(String, String)>,
    /// Wallet data variable, as `id=hex`
    #[arg(long = "wallet-data", value_parser = parse_hex_value)]
    pub wallet_data: Vec<(String, Vec<u8>)>,
    /// Address data variable, as `id=hex`
    #[arg(long = "address-data", value_parser = parse_hex_value)]
    pub address_data: Vec<(String, Vec<u8>)>,
    #[arg(long)]
    pub block_height: Option<u32>,
    #[arg(long)]
    pub block_time: Option<u32>,
    #[arg(short, long, default_value_t = OutputFormat::Hex)]
    pub format: OutputFormat,
    #[arg(long, default_value_t = false)]
    pub no_color: bool,
}

#[derive(Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Hex,
    Asm,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hex => write!(f, "hex"),
            Self::Asm => write!(f, "asm"),
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected `id=value`, found `{s}`"))?;
    if key.is_empty() {
        return Err(format!("missing id in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_hex_value(s: &str) -> Result<(String, Vec<u8>), String> {
    let (key, value) = parse_key_value(s)?;
    let value = value.strip_prefix("0x").unwrap_or(&value);
    let bytes = hex::decode(value).map_err(|error| format!("invalid hex for `{key}`: {error}"))?;
    Ok((key, bytes))
}

impl CompileArgs {
    /// Build the environment and data described by the flags, reading referenced scripts.
    pub fn configure(&self) -> anyhow::Result<(CompilationEnvironment, CompilationData)> {
        let mut environment = CompilationEnvironment::new()
            .with_stack_machine()
            .with_variable(BLOCK_HEIGHT_ID, Variable::CurrentBlockHeight)
            .with_variable(BLOCK_TIME_ID, Variable::CurrentBlockTime);
        let mut data = CompilationData::new();

        for (id, path) in &self.scripts {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read script `{id}` from {path}"))?;
            environment = environment.with_script(id.clone(), source);
        }
        for (id, value) in &self.wallet_data {
            environment = environment.with_variable(id.clone(), Variable::WalletData);
            data = data.with_wallet_data(id.clone(), value.clone());
        }
        for (id, value) in &self.address_data {
            environment = environment.with_variable(id.clone(), Variable::AddressData);
            data = data.with_address_data(id.clone(), value.clone());
        }
        if let Some(height) = self.block_height {
            data = data.with_block_height(height);
        }
        if let Some(time) = self.block_time {
            data = data.with_block_time(time);
        }
        Ok((environment, data))
    }
}
