use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

use staycal::cli::Args;
use staycal::config;
use staycal::runner;

fn main() -> Result<()> {
    // Parse command-line arguments first (needed for log setup)
    let args = Args::parse();

    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());

    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, &path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("ureq", log::LevelFilter::Warn)
            .filter_module("rustls", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging, RUST_LOG wins if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("ureq", log::LevelFilter::Warn)
            .filter_module("rustls", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .init();
    }

    info!("staycal {} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Config dir override: {:?}", path_config.config_dir);

    runner::run(args, &path_config)
}
