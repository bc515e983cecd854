//! stderr diagnostics for embedders that do not install a subscriber.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "KB_LLM_LOG";

const DEFAULT_FILTER: &str = "warn,kb_llm=info";

static INIT: Once = Once::new();

/// Install a stderr `fmt` subscriber once per process. If the host already
/// set a global subscriber, that one is kept.
pub fn init_logging() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}
