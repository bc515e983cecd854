mod cli;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    //  Logging
    let default_filter = match args.verbose {
        0 => "warn,kb_llm=info",
        1 => "info,kb_llm=debug,llama_core=debug",
        _ => "debug,kb_llm=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(kb_llm::logging::LOG_ENV)
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        cli::Commands::Generate(generate_args) => cli::generate::execute(generate_args),
        cli::Commands::Config(c) => cli::config_cmd::execute(c),
    }
}
