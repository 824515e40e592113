//! Show effective configuration.

use anyhow::{Context, Result};
use colored::Colorize;
use strata_core::RequestType;
use strata_core::cache::{DEFAULT_CACHE_TTL_MS, ttl_ms, ttl_ms_for_name};

use crate::config::Config;

pub fn execute(ttl: Option<&str>, config: &Config) -> Result<()> {
    if let Some(name) = ttl {
        let ms = ttl_ms_for_name(name);
        let note = if name.parse::<RequestType>().is_err() {
            " (unknown request type, default TTL)".yellow().to_string()
        } else {
            String::new()
        };
        println!("{}: {}ms{}", name, ms, note);
        return Ok(());
    }

    let path = Config::config_path();
    println!("{}", "strata Configuration".cyan().bold());
    println!("{}", "─".repeat(50));
    if path.exists() {
        println!("  Config file: {}", path.display());
    } else {
        println!("  Config file: {} {}", path.display(), "(not found, using defaults)".yellow());
    }
    println!();

    let rendered = toml::to_string_pretty(config).context("Failed to serialize config")?;
    println!("{}", rendered);

    println!("{}", "Cache TTLs".cyan().bold());
    for request_type in RequestType::ALL {
        println!("  {:<20} {:>9}ms", request_type.to_string(), ttl_ms(request_type));
    }
    println!("  {:<20} {:>9}ms", "(other)", DEFAULT_CACHE_TTL_MS);

    Ok(())
}
