use std::io::{self, Write};

use kb_llm::{
    DefaultBackend, GenerateRequest, LoadParams, SamplingParams, Session, build_prompt,
    default_threads,
};
use tracing::info;

use crate::cli::GenerateArgs;
use crate::config::CliConfig;

pub fn execute(args: GenerateArgs) -> anyhow::Result<()> {
    let cfg = CliConfig::load_or_default()?;
    let plan = resolve(&args, &cfg)?;

    let mut session = Session::new(DefaultBackend::default());
    session
        .initialize(&plan.model, &plan.load)
        .map_err(|e| anyhow::anyhow!("Failed to initialize {}: {e}", plan.model.display()))?;

    info!(
        model = %plan.model.display(),
        max_tokens = plan.request.max_tokens,
        "Generating…"
    );
    let generation = session.generate(&plan.request);
    session.unload();
    let generation = generation?;

    let mut stdout = io::stdout();
    writeln!(stdout, "{}", generation.text)?;
    stdout.flush()?;
    eprintln!(
        "  [{} | prompt: {} tok, gen: {} tok]",
        generation.finish_reason, generation.prompt_tokens, generation.completion_tokens
    );
    Ok(())
}

/// Everything one run needs, after merging flags over the config file.
#[derive(Debug, PartialEq)]
struct RunPlan {
    model: std::path::PathBuf,
    load: LoadParams,
    request: GenerateRequest,
}

fn resolve(args: &GenerateArgs, cfg: &CliConfig) -> anyhow::Result<RunPlan> {
    let Some(model) = args.model.clone().or_else(|| cfg.model_path.clone()) else {
        anyhow::bail!("No model given; pass --model or run `kb-llm config set model_path <path>`");
    };

    let (prompt, mode_budget) = match (&args.prompt, &args.text) {
        (Some(prompt), _) => (prompt.clone(), None),
        (None, Some(text)) => (
            build_prompt(text.trim(), args.mode, args.style),
            Some(args.mode.default_max_tokens()),
        ),
        (None, None) => anyhow::bail!("Nothing to generate from; pass a PROMPT or --text"),
    };

    let threads = args.threads.or(cfg.threads).unwrap_or_else(default_threads);
    let ctx_size = args.ctx_size.unwrap_or(cfg.ctx_size);
    let load = LoadParams::new(i32::try_from(ctx_size)?, threads);

    let sampling = SamplingParams {
        temperature: args.temp.unwrap_or(cfg.sampling.temperature),
        top_k: args.top_k.unwrap_or(cfg.sampling.top_k),
        top_p: args.top_p.unwrap_or(cfg.sampling.top_p),
    };
    let max_tokens = args
        .max_tokens
        .or(mode_budget)
        .unwrap_or(cfg.max_tokens);

    Ok(RunPlan {
        model,
        load,
        request: GenerateRequest::new(prompt, max_tokens, sampling),
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Commands};

    fn parse(argv: &[&str]) -> GenerateArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Generate(args) => args,
            _ => panic!("expected generate"),
        }
    }

    fn config_with_model() -> CliConfig {
        CliConfig {
            model_path: Some(PathBuf::from("/models/default.gguf")),
            ..Default::default()
        }
    }

    #[test]
    fn flags_override_config() {
        let args = parse(&[
            "kb-llm", "generate", "Hello", "--model", "other.gguf", "--temp", "0", "--top-k",
            "0", "--max-tokens", "16", "--threads", "3",
        ]);
        let plan = resolve(&args, &config_with_model()).unwrap();

        assert_eq!(plan.model, PathBuf::from("other.gguf"));
        assert_eq!(plan.request.prompt, "Hello");
        assert_eq!(plan.request.max_tokens, 16);
        assert!(plan.request.sampling.is_greedy());
        assert_eq!(plan.request.sampling.top_k, 0);
        assert_eq!(plan.load.threads, 3);
        assert_eq!(plan.load.context_size, 512);
    }

    #[test]
    fn text_uses_prompt_builder_and_mode_budget() {
        let args = parse(&[
            "kb-llm", "generate", "--text", " see u tmrw ", "--mode", "reply", "--style",
            "concise",
        ]);
        let plan = resolve(&args, &config_with_model()).unwrap();

        assert!(plan.request.prompt.contains("MESSAGE: <<<see u tmrw>>>"));
        assert!(plan.request.prompt.ends_with("{STYLE}: concise"));
        assert_eq!(plan.request.max_tokens, 160);
        assert_eq!(plan.model, PathBuf::from("/models/default.gguf"));
    }

    #[test]
    fn missing_model_is_an_error() {
        let args = parse(&["kb-llm", "generate", "Hello"]);
        assert!(resolve(&args, &CliConfig::default()).is_err());
    }

    #[test]
    fn missing_prompt_is_an_error() {
        let args = parse(&["kb-llm", "generate"]);
        assert!(resolve(&args, &config_with_model()).is_err());
    }
}
