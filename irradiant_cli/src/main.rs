#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `irradiant` binary: print jobs, manual moves, constant output, self-check.

mod cli;
mod error_fmt;
mod hw;
mod logging;
mod manual;
mod print;

use std::path::Path;

use clap::Parser;
use eyre::WrapErr;
use irradiant_core::error::{PrintError, Result};

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn load_config(path: &Path) -> Result<irradiant_config::Config> {
    let text = std::fs::read_to_string(path).wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = irradiant_config::load_toml(&text)
        .map_err(|e| eyre::eyre!("parse config {}: {e}", path.display()))?;
    cfg.validate()
        .map_err(|e| eyre::Report::new(PrintError::Validation(format!("invalid configuration: {e}"))))?;
    Ok(cfg)
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli.config)?;
    logging::init(cli.json, cli.log_level.as_deref(), &cfg.logging);
    tracing::debug!(config = %cli.config.display(), backend = cfg.stage.backend.as_str(), "config loaded");

    // Relative paths in the config (LUT CSV) are anchored at its directory.
    let base_dir = cli
        .config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    match &cli.cmd {
        Commands::Print(args) => print::run_print(&cfg, base_dir, args, cli.json),
        Commands::Move { to, by, settle } => manual::run_move(&cfg, *to, *by, *settle, cli.json),
        Commands::Laser {
            channel,
            volts,
            for_ms,
        } => manual::run_laser(&cfg, *channel, *volts, *for_ms),
        Commands::SelfCheck => manual::run_self_check(&cfg, base_dir, cli.json),
    }
}

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        tracing::error!(error = %format!("{e:#}"), "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}
