#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::{Config, ConfigError, GenerationConfig, GenerationProvider, OllamaConfig};

#[inline]
pub fn run_interactive_config(base_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Log RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(base_dir)?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure the Ollama instance that serves the embedding model.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama)? {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but log entries will not be searchable until it is running.");
    }

    eprintln!();
    eprintln!("{}", style("Answer Generation").bold().yellow());
    configure_generation(&mut config.generation)?;

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(base_dir: &Path) -> Result<()> {
    let config = Config::load(base_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Protocol: {}", style(&config.ollama.protocol).cyan());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());

    match config.ollama.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Index Settings:").bold().yellow());
    eprintln!("  Index File: {}", style(config.index_path().display()).cyan());
    eprintln!("  Id Map File: {}", style(config.id_map_path().display()).cyan());
    eprintln!(
        "  Ingestion Batch Size: {}",
        style(config.ingestion.batch_size).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!("  Search K: {}", style(config.retrieval.search_k).cyan());
    eprintln!(
        "  Context Limit: {}",
        style(config.retrieval.context_limit).cyan()
    );
    eprintln!(
        "  Display Limit: {}",
        style(config.retrieval.display_limit).cyan()
    );
    match config.retrieval.min_score {
        Some(min_score) => eprintln!("  Minimum Score: {}", style(min_score).cyan()),
        None => eprintln!("  Minimum Score: {}", style("none").dim()),
    }

    eprintln!();
    eprintln!("{}", style("Generation Settings:").bold().yellow());
    match config.generation.provider {
        GenerationProvider::Gemini => {
            eprintln!("  Provider: {}", style("gemini").cyan());
            eprintln!("  API URL: {}", style(&config.generation.api_url).cyan());
            eprintln!("  Model: {}", style(&config.generation.model).cyan());
            let key_state = if config.generation.resolved_api_key().is_some() {
                style("configured").green()
            } else {
                style("missing (heuristic answers only)").red()
            };
            eprintln!("  API Key: {}", key_state);
        }
        GenerationProvider::None => {
            eprintln!("  Provider: {}", style("none (heuristic answers)").cyan());
        }
    }

    eprintln!();
    eprintln!("Config file: {}", style(config.config_file_path().display()).dim());

    Ok(())
}

fn load_existing_config(base_dir: &Path) -> Result<Config> {
    Config::load(base_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: base_dir.to_path_buf(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()?;
            Ok(())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_generation(generation: &mut GenerationConfig) -> Result<()> {
    let providers = &["gemini", "none"];
    let default_index = match generation.provider {
        GenerationProvider::Gemini => 0,
        GenerationProvider::None => 1,
    };

    let provider_index = Select::new()
        .with_prompt("Answer provider")
        .default(default_index)
        .items(providers)
        .interact()?;

    if provider_index == 1 {
        generation.provider = GenerationProvider::None;
        return Ok(());
    }
    generation.provider = GenerationProvider::Gemini;

    let model: String = Input::new()
        .with_prompt("Gemini model")
        .default(generation.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    generation.model = model;

    let api_key: String = Input::new()
        .with_prompt(format!(
            "Gemini API key (leave empty to read {} at runtime)",
            super::GEMINI_API_KEY_ENV
        ))
        .allow_empty(true)
        .interact_text()?;
    generation.api_key = Some(api_key.trim().to_string()).filter(|key| !key.is_empty());

    generation.validate()?;
    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> Result<bool> {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => Ok(true),
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => Ok(true),
        Err(_) => Ok(false),
    }
}
