use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cfg = beatscape::config::Config::parse();
    init_tracing(&cfg)?;
    tracing::info!(mode = %cfg.mode, gpu = ?cfg.gpu, "starting beatscape");
    beatscape::app::run(cfg)
}

/// Logs never go to the terminal being drawn on: they land in `--log-file` or nowhere.
fn init_tracing(cfg: &beatscape::config::Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_ansi(false);
    let _ = match &cfg.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("create log file {}", path.display()))?;
            builder.with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(std::io::sink).try_init(),
    };
    Ok(())
}
