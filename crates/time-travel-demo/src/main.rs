//! Demo binary for the time-travel harness.
//!
//! Runs two small networking programs against virtual timelines and
//! prints a JSON transcript of what each one observed. The whole run takes
//! well over an hour of virtual time and completes instantly.
//!
//! # Usage
//!
//! ```text
//! time-travel-demo [config.yaml]
//! ```
//!
//! # Startup Sequence
//!
//! 1. Load configuration from the given path, or defaults
//! 2. Initialize structured logging (tracing)
//! 3. Run the "wait and respond" scenario
//! 4. Run the "chat server" scenario
//! 5. Print the transcript to stdout

mod scenarios;
mod transcript;

use std::path::Path;

use time_travel::TimeTravelConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::transcript::Transcript;

fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config_path = std::env::args().nth(1);
    let config = load_config(config_path.as_deref())?;

    // 2. Initialize structured logging. `RUST_LOG` wins over the config.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(
        config = config_path.as_deref().unwrap_or("<defaults>"),
        start_time = config.clock.start_time,
        default_interest = ?config.poll.default_interest,
        "time-travel-demo starting"
    );

    // 3-4. Run the scenarios.
    let mut transcript = Transcript::default();
    scenarios::wait_and_respond(&config, &mut transcript)?;
    scenarios::chat_server(&config, &mut transcript)?;

    // 5. Print the transcript.
    println!("{}", serde_json::to_string_pretty(&transcript)?);

    info!(
        entries = transcript.entry_count(),
        "time-travel-demo finished"
    );
    Ok(())
}

/// Load configuration from `path`, or fall back to defaults.
///
/// Defaults still honor the environment override for the start time.
fn load_config(path: Option<&str>) -> anyhow::Result<TimeTravelConfig> {
    if let Some(path) = path {
        return Ok(TimeTravelConfig::from_file(Path::new(path))?);
    }
    let mut config = TimeTravelConfig::default();
    config.clock.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}
