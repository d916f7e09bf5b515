//! field-cache CLI: check settings and read resources through the cache.
//!
//! Usage:
//!   field-cache-cli validate [--config <path>]          Validate the settings file
//!   field-cache-cli list [--config <path>]              List configured resources
//!   field-cache-cli get <resource> [--force]            Read a resource through the cache
//!   field-cache-cli refresh <resource>                  Force-refresh a resource

use anyhow::{bail, Context};
use field_cache::airtable::AirtableClient;
use field_cache::cache::MemoryCache;
use field_cache::config::CONFIG_PATH_ENV;
use field_cache::{telemetry, FieldCache, FieldCacheSettings, ResourceRegistry};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let outcome = match args[1].as_str() {
        "validate" => cmd_validate(&args[2..]),
        "list" => cmd_list(&args[2..]),
        "get" => cmd_get(&args[2..], has_flag(&args[2..], "--force")).await,
        "refresh" => cmd_get(&args[2..], true).await,
        "version" | "--version" | "-V" => {
            cmd_version();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = outcome {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"field-cache-cli — read-through field cache tool

USAGE:
    field-cache-cli <COMMAND> [OPTIONS]

COMMANDS:
    validate [--config <path>]      Validate the settings file
    list [--config <path>]          List configured resources and their store keys
    get <resource> [--force]        Read a resource (prints JSON records)
    refresh <resource>              Force-refresh a resource from Airtable
    version                         Show version information
    help                            Show this help message

ENVIRONMENT:
    FIELD_CACHE_CONFIG              Settings file path
    AIRTABLE_API_KEY                Airtable personal access token
    RUST_LOG                        Log filter (default: field_cache=info)"#
    );
}

fn cmd_version() {
    println!("field-cache-cli {}", env!("CARGO_PKG_VERSION"));
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn load_settings(args: &[String]) -> anyhow::Result<FieldCacheSettings> {
    let path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok());

    let mut settings = match path {
        Some(ref p) => FieldCacheSettings::load(p).with_context(|| format!("loading {p}"))?,
        None => bail!("no settings file: pass --config <path> or set {CONFIG_PATH_ENV}"),
    };
    settings.apply_env_overrides();
    settings.validate()?;
    Ok(settings)
}

fn cmd_validate(args: &[String]) -> anyhow::Result<()> {
    let settings = load_settings(args)?;
    println!("Settings OK: {} resource(s)", settings.resources.len());
    if settings.airtable.base_id.is_empty() {
        println!("WARN: airtable.base_id is empty");
    }
    Ok(())
}

fn cmd_list(args: &[String]) -> anyhow::Result<()> {
    let settings = load_settings(args)?;
    println!("{:<24} {:>8}  {:<28} STORE KEY", "RESOURCE", "TTL(s)", "TABLE");
    for resource in &settings.resources {
        println!(
            "{:<24} {:>8}  {:<28} {}",
            resource.key,
            resource.ttl_seconds,
            resource.table,
            field_cache::registry::store_key(resource)
        );
    }
    Ok(())
}

async fn cmd_get(args: &[String], force: bool) -> anyhow::Result<()> {
    let Some(name) = args.first().filter(|a| !a.starts_with("--")) else {
        bail!("missing <resource> argument");
    };
    let settings = load_settings(args)?;
    let client = AirtableClient::new(&settings.airtable)?;
    if !client.has_api_key() {
        bail!("no Airtable token: set {}", settings.airtable.api_key_env);
    }
    let registry = ResourceRegistry::from_settings(&settings, Arc::new(client))?;
    let Some(resource) = registry.get(name) else {
        bail!("unknown resource `{name}` (known: {})", registry.names().collect::<Vec<_>>().join(", "));
    };

    let cache = FieldCache::new(settings.cache_config(), Arc::new(MemoryCache::default()));
    let read = cache.get_field_cache(resource, force).await?;
    eprintln!("{} record(s), {:?}, cached_at_ms={}", read.records.len(), read.status, read.cached_at_ms);
    println!("{}", serde_json::to_string_pretty(&read.records)?);
    Ok(())
}
