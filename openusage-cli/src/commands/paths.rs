//! Paths command - where settings, provider state and logs live.

use anyhow::Result;
use openusage_store::{SettingsStore, default_log_dir, log_path};

use crate::output::JsonFormatter;
use crate::{Cli, ExitCode, OutputFormat, app};

/// Runs the paths command.
pub fn run(cli: &Cli, settings: &SettingsStore) -> Result<ExitCode> {
    let config_dir = app::config_dir(cli);
    let data_dir = app::data_dir(cli);
    let log_file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| log_path(&default_log_dir()));

    match cli.format {
        OutputFormat::Text => {
            println!("Config dir:    {}", config_dir.display());
            println!("Settings file: {}", settings.path().display());
            println!("Data dir:      {}", data_dir.display());
            println!("Log file:      {}", log_file.display());
        }
        OutputFormat::Json => {
            let paths = serde_json::json!({
                "configDir": config_dir.display().to_string(),
                "settingsFile": settings.path().display().to_string(),
                "dataDir": data_dir.display().to_string(),
                "logFile": log_file.display().to_string(),
            });
            println!("{}", JsonFormatter::new(cli.pretty).format(&paths)?);
        }
    }

    Ok(ExitCode::Success)
}
