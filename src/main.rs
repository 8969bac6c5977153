use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use serde::Deserialize;

use subcompiler::error::ErrorPayload;
use subcompiler::settings::update_settings_from_file;
use subcompiler::store::{AirportUsage, MemoryNodeStore, MemoryUsageStore};
use subcompiler::utils::http::CancelFlag;
use subcompiler::utils::{file_exists, url::is_link};
use subcompiler::{
    ChainRule, CompileTarget, Node, PreviewRequest, PreviewService, Settings, Subscription,
    SubscriptionCompiler,
};

/// Compile a stored node collection into a client subscription document
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML or JSON list of nodes
    #[arg(long, value_name = "FILE")]
    nodes: String,

    /// YAML or JSON subscription, optionally with `chain_rules` and `usage`
    #[arg(long, value_name = "FILE")]
    subscription: String,

    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Output format: clash, surge or list
    #[arg(short, long, default_value = "clash")]
    target: String,

    /// Only run filter, dedup and rename and print the resulting names
    #[arg(long)]
    preview: bool,

    /// Write the result to this file instead of stdout
    #[arg(short, long, value_name = "OUTPUT_FILE")]
    output: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionFile {
    #[serde(flatten)]
    subscription: Subscription,
    #[serde(default)]
    chain_rules: Vec<ChainRule>,
    /// Airport usage keyed by airport (source) id
    #[serde(default)]
    usage: HashMap<u64, AirportUsage>,
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &str) -> anyhow::Result<T> {
    let content = fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
    serde_yaml::from_str(&content).with_context(|| format!("failed to parse {}", path))
}

fn write_output(output: Option<&str>, content: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content).with_context(|| format!("failed to write {}", path))?;
            info!("Wrote {} bytes to {}", content.len(), path);
        }
        None => println!("{}", content),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Initialize the logger
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let args = Args::parse();

    if let Some(config) = args.config.as_deref() {
        if !file_exists(config) && !is_link(config) {
            bail!("configuration file {} does not exist", config);
        }
        update_settings_from_file(config)?;
    }
    let settings = Settings::current();
    if let Some(level) = settings.log_level_filter() {
        log::set_max_level(level);
    }

    let target: CompileTarget = args.target.parse().map_err(anyhow::Error::msg)?;
    let nodes: Vec<Node> = read_yaml(&args.nodes)?;
    let file: SubscriptionFile = read_yaml(&args.subscription)?;
    info!(
        "Loaded {} node(s) and subscription '{}' with {} chain rule(s)",
        nodes.len(),
        file.subscription.name,
        file.chain_rules.len()
    );
    let store = Arc::new(MemoryNodeStore::with_nodes(nodes));

    if args.preview {
        let service = PreviewService::new(store);
        let result = service.preview(&PreviewRequest::from(&file.subscription))?;
        let json = serde_json::to_string_pretty(&result.entries())?;
        return write_output(args.output.as_deref(), &json);
    }

    let usage = MemoryUsageStore::new();
    for (airport_id, value) in file.usage {
        usage.set(airport_id, value);
    }
    let compiler = SubscriptionCompiler::from_settings(store, Arc::clone(&settings))?
        .with_usage_store(Arc::new(usage));

    match compiler.compile(&file.subscription, &file.chain_rules, target, &CancelFlag::new()) {
        Ok(result) => {
            for (key, value) in &result.headers {
                info!("{}: {}", key, value);
            }
            if !result.diagnostics.warnings.is_empty() {
                warn!(
                    "Compiled with {} warning(s)",
                    result.diagnostics.warnings.len()
                );
            }
            write_output(args.output.as_deref(), &result.content)
        }
        Err(err) => {
            eprintln!("{}", serde_json::to_string(&ErrorPayload::from(&err))?);
            Err(err.into())
        }
    }
}
