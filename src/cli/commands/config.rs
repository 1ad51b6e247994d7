use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a configuration file with default values")]
    Init {
        #[arg(
            long,
            short = 'g',
            help = "Create global config instead of project config"
        )]
        global: bool,
        #[arg(long, help = "Overwrite an existing config")]
        force: bool,
    },
    #[command(about = "Show the effective configuration")]
    Show,
    #[command(about = "Show configuration file paths")]
    Path,
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { global, force } => handle_init(global, force, formatter.as_ref()),
        ConfigCommand::Show => handle_show(format),
        ConfigCommand::Path => handle_path(),
    }
}

fn handle_init(global: bool, force: bool, formatter: &dyn Formatter) -> Result<()> {
    let path = if global {
        Config::global_path()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?
    } else {
        Config::project_path()
            .ok_or_else(|| anyhow::anyhow!("could not determine project directory"))?
    };

    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default()
        .save_to(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    print!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

fn handle_show(format: OutputFormat) -> Result<()> {
    let resolved = Config::load()?;
    let mut config = resolved.config;
    if config.vector_store.api_key.is_some() {
        config.vector_store.api_key = Some("********".to_string());
    }

    if format == OutputFormat::Json {
        let output = serde_json::json!({
            "config": config,
            "project_path": resolved.project_path,
            "global_path": resolved.global_path,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match (&resolved.project_path, &resolved.global_path) {
        (Some(path), _) => println!("# Project config: {}", path.display()),
        (None, Some(path)) => println!("# Global config: {}", path.display()),
        (None, None) => println!("# Defaults (no config file found)"),
    }
    println!("# Environment overrides applied\n");
    print!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

fn handle_path() -> Result<()> {
    println!("Configuration paths:");
    println!();

    if let Some(path) = Config::project_path() {
        let state = if path.exists() { "active" } else { "would be" };
        println!("Project config ({state}): {}", path.display());
    }
    if let Some(path) = Config::global_path() {
        let state = if path.exists() { "active" } else { "would be" };
        println!("Global config ({state}): {}", path.display());
    }
    if let Ok(cwd) = std::env::current_dir() {
        let path = cwd.join(".env");
        let state = if path.exists() { "active" } else { "would be" };
        println!(".env file ({state}): {}", path.display());
    }
    if let Some(dir) = Config::models_dir() {
        println!("Models directory: {}", dir.display());
    }

    Ok(())
}
