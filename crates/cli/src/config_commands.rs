use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use spamgate_config::validate::{self, Severity};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (file, env overrides, defaults) as TOML.
    Show,
    /// Validate the configuration and report errors/warnings.
    Check,
}

pub fn handle_config(action: ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => show(path),
        ConfigAction::Check => check(path),
    }
}

fn show(path: Option<&Path>) -> Result<()> {
    let config = spamgate_config::load_or_discover(path)?;
    print!("{}", spamgate_config::to_toml(&config)?);
    Ok(())
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(path: Option<&Path>) -> Result<()> {
    // Print which file we're checking
    match path.map(Path::to_path_buf).or_else(spamgate_config::find_config_file) {
        Some(path) => eprintln!("Checking {}\n", path.display()),
        None => eprintln!("No config file found; checking defaults.\n"),
    }

    let config = spamgate_config::load_or_discover(path)?;
    let result = validate::validate(&config);

    for d in &result.diagnostics {
        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
        };
        eprintln!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message);
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if !result.diagnostics.is_empty() {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}
