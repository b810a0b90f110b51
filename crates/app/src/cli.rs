//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use courier_infrastructure::CodeLanguage;

/// Run API collection requests from the command line.
#[derive(Debug, Parser)]
#[command(name = "courier", version, about)]
pub struct Cli {
    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one request and print the result.
    Run(RunArgs),
    /// Send every request of a folder, or of the whole collection.
    Folder(FolderArgs),
    /// Print a code snippet for a request without sending it.
    Codegen(CodegenArgs),
}

/// Where the collection and its companions come from.
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Collection file (JSON or YAML).
    #[arg(short, long)]
    pub collection: PathBuf,
    /// Environment file.
    #[arg(short, long)]
    pub env: Option<PathBuf>,
    /// Global variables file: an object of name to value.
    #[arg(long)]
    pub globals: Option<PathBuf>,
    /// Preferences file.
    #[arg(long)]
    pub preferences: Option<PathBuf>,
    /// Directory response bodies are written to.
    #[arg(long, env = "COURIER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

/// `courier run`
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Collection sources.
    #[command(flatten)]
    pub source: SourceArgs,
    /// Request uid or name.
    #[arg(short, long)]
    pub request: String,
    /// Wait this many milliseconds before sending.
    #[arg(long, default_value_t = 0)]
    pub delay: u64,
    /// Print a JSON report instead of text.
    #[arg(long)]
    pub json: bool,
}

/// `courier folder`
#[derive(Debug, Args)]
pub struct FolderArgs {
    /// Collection sources.
    #[command(flatten)]
    pub source: SourceArgs,
    /// Folder uid; the whole collection when omitted.
    #[arg(short, long)]
    pub folder: Option<String>,
    /// Milliseconds to wait between requests.
    #[arg(long, default_value_t = 0)]
    pub delay: u64,
    /// Print a JSON report instead of text.
    #[arg(long)]
    pub json: bool,
}

/// `courier codegen`
#[derive(Debug, Args)]
pub struct CodegenArgs {
    /// Collection sources.
    #[command(flatten)]
    pub source: SourceArgs,
    /// Request uid or name.
    #[arg(short, long)]
    pub request: String,
    /// curl, python, javascript or rust.
    #[arg(short, long, default_value = "curl")]
    pub language: CodeLanguage,
}
