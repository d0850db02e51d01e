//! filterdb CLI
//!
//! CLI tool for loading filter lists and querying the rules that apply to a domain.

mod logging;

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use fdb_core::{CacheConfig, FilterList, Partition, GLOBAL_DOMAIN};
use fdb_parser::{new_collection, AbpFilterCollection, UrlFilter};

#[derive(Parser)]
#[command(name = "fdb-cli")]
#[command(about = "filterdb rule loader and domain query tool")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load filter lists and report per-list statistics
    Load {
        /// Input filter list files; each file gets its index as category id
        #[arg(short, long, required = true)]
        input: Vec<String>,
    },

    /// Print the rules that apply to a domain
    Query {
        /// Input filter list files; each file gets its index as category id
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Domain to query
        #[arg(short, long, default_value = GLOBAL_DOMAIN)]
        domain: String,

        /// Query exception rules instead of blocking rules
        #[arg(short, long)]
        whitelist: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// JSON file with cache options
        #[arg(long)]
        cache_config: Option<String>,

        /// Override the cache expiry sweep interval, in seconds
        #[arg(long)]
        scan_interval_secs: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Load { input } => cmd_load(&input),
        Commands::Query {
            input,
            domain,
            whitelist,
            json,
            cache_config,
            scan_interval_secs,
        } => load_cache_config(cache_config.as_deref(), scan_interval_secs).and_then(|config| {
            let partition = Partition::from_exception(whitelist);
            cmd_query(&input, &domain, partition, json, config)
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_cache_config(path: Option<&str>, scan_interval_secs: Option<u64>) -> Result<CacheConfig, String> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
            serde_json::from_str(&text)
                .map_err(|e| format!("Invalid cache config '{}': {}", path, e))?
        }
        None => CacheConfig::default(),
    };

    if let Some(secs) = scan_interval_secs {
        config = config.with_expiration_scan_interval(Duration::from_secs(secs));
    }

    Ok(config)
}

/// Ingest every input file, one category per file, and seal the collection.
fn load_lists(inputs: &[String], config: CacheConfig, verbose: bool) -> Result<AbpFilterCollection, String> {
    if inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let mut collection = new_collection(config);

    for (index, path) in inputs.iter().enumerate() {
        let category_id = i16::try_from(index)
            .map_err(|_| format!("Too many input files (category id {} out of range)", index))?;

        let file = File::open(path).map_err(|e| format!("Failed to open '{}': {}", path, e))?;
        let stats = collection
            .ingest_reader(BufReader::new(file), category_id)
            .map_err(|e| format!("Failed to load '{}': {}", path, e))?;

        if verbose {
            println!(
                "  [{}] {} - {} lines, {} rules, {} rejected",
                category_id,
                Path::new(path).file_name().unwrap_or_default().to_string_lossy(),
                stats.total(),
                stats.loaded,
                stats.failed
            );
        }
    }

    collection.finalize_for_read();
    Ok(collection)
}

fn cmd_load(inputs: &[String]) -> Result<(), String> {
    let start = Instant::now();
    let collection = load_lists(inputs, CacheConfig::default(), true)?;
    let store = collection.store();

    println!("Loaded {} filter lists", inputs.len());
    println!("  Entries:     {}", store.len());
    println!("  Block keys:  {}", store.domain_count(Partition::Blacklist));
    println!("  Allow keys:  {}", store.domain_count(Partition::Whitelist));
    println!("  Time:        {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);

    Ok(())
}

fn cmd_query(
    inputs: &[String],
    domain: &str,
    partition: Partition,
    json: bool,
    config: CacheConfig,
) -> Result<(), String> {
    let collection = load_lists(inputs, config, false)?;
    let filters = collection.query(domain, partition);

    if json {
        let output = serde_json::to_string_pretty(&filters_to_json(&filters))
            .map_err(|e| format!("Failed to encode results: {}", e))?;
        println!("{output}");
        return Ok(());
    }

    println!("{} {} rules for '{}'", filters.len(), partition, domain);
    for filter in &filters {
        println!("  [{}] {}", filter.category_id, filter.original_rule);
    }

    Ok(())
}

fn filters_to_json(filters: &FilterList<UrlFilter>) -> serde_json::Value {
    filters
        .iter()
        .map(|filter| {
            serde_json::json!({
                "rule": filter.original_rule,
                "category": filter.category_id,
                "exception": filter.is_exception,
                "host": filter.host,
                "pattern": filter.pattern,
                "domains": filter.applicable_domains,
                "excludedDomains": filter.excluded_domains,
                "redirect": filter.redirect,
            })
        })
        .collect()
}
