pub mod config_cmd;
pub mod generate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kb_llm::{Mode, Style};

#[derive(Parser)]
#[command(
    name = "kb-llm",
    version,
    about = "Run the keyboard's on-device text generation from the command line"
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a model, generate one completion, unload.
    Generate(GenerateArgs),

    /// View / edit configuration.
    Config(ConfigArgs),
}

#[derive(Debug, clap::Args, Clone)]
pub struct GenerateArgs {
    /// Raw prompt. Mutually exclusive with --text.
    #[arg(conflicts_with = "text")]
    pub prompt: Option<String>,

    /// User text to wrap in the keyboard's instruction prompt.
    #[arg(long)]
    pub text: Option<String>,

    /// Instruction used with --text.
    #[arg(long, default_value = "enhance", requires = "text")]
    pub mode: Mode,

    /// Tone used with --text.
    #[arg(long, default_value = "friendly", requires = "text")]
    pub style: Style,

    /// Path to a GGUF model file (overrides config).
    #[arg(long, env = "KB_LLM_MODEL")]
    pub model: Option<PathBuf>,

    /// Context size (0 = model default).
    #[arg(long)]
    pub ctx_size: Option<u32>,

    /// Compute threads.
    #[arg(long, env = "KB_LLM_THREADS")]
    pub threads: Option<i32>,

    /// Token budget (default: config, or the mode's budget with --text).
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Temperature (<= 0 is greedy).
    #[arg(long)]
    pub temp: Option<f32>,

    /// Top-k filter (0 = disabled).
    #[arg(long)]
    pub top_k: Option<i32>,

    /// Top-p filter (1.0 = disabled).
    #[arg(long)]
    pub top_p: Option<f32>,
}

#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Display the current configuration.
    Show,
    /// Set a configuration value.
    Set { key: String, value: String },
    /// Print the configuration file location.
    Path,
}
