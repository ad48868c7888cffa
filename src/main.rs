// src/main.rs
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

/// Directory-watching subtitle pipeline: speech recognition plus LLM
/// translation for every video that appears under the watched roots.
#[derive(Parser)]
#[command(name = "subwatch", version, about)]
struct Cli {
    /// Configuration file (TOML). Without it, `subwatch.toml` in the
    /// working directory and SUBWATCH_* environment variables apply.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Additional watch directory; may be given multiple times.
    #[arg(short, long = "watch-dir")]
    watch_dirs: Vec<PathBuf>,

    /// Run a single scan pass, drain the queue and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match subwatch::config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    };
    config.watcher.watch_dirs.extend(cli.watch_dirs);

    if let Err(e) = config.validate() {
        eprintln!("{}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }
    if log::log_enabled!(log::Level::Debug) {
        match toml::to_string_pretty(&config) {
            Ok(dump) => log::debug!("effective configuration:\n{}", dump),
            Err(e) => log::debug!("configuration not dumpable: {}", e),
        }
    }
    if config.asr.api_key.is_empty() {
        log::error!("asr.api_key is not set");
    }

    let app = match subwatch::app::App::build(config) {
        Ok(app) => Arc::new(app),
        Err(e) => {
            eprintln!("{}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    };

    match app.run(cli.once).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("{}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    }
}
