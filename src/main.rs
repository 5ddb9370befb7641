use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde_json::json;

use nestql::config::CompilerConfig;
use nestql::entity_catalog::MetadataRegistry;
use nestql::query_compiler::{build_query_and_bindings_for, QueryInput};
use nestql::query_manager::{QueryRequest, SelectionSource};

/// nestql - compile a nested selection into one PostgreSQL statement
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML file with entity definitions
    #[arg(long)]
    metadata: PathBuf,

    /// JSON request file: {"entity", "fields", "filter", "pagination"}
    #[arg(long)]
    request: PathBuf,

    /// Emit $1..$n placeholders and an ordered value list instead of named bindings
    #[arg(long)]
    positional: bool,

    /// YAML compiler configuration (defaults to NESTQL_* environment variables)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // Defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CompilerConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CompilerConfig::from_env().context("reading NESTQL_* environment")?,
    };
    let registry = MetadataRegistry::from_yaml_file(&cli.metadata)
        .with_context(|| format!("loading metadata {}", cli.metadata.display()))?;

    let request_text = std::fs::read_to_string(&cli.request)
        .with_context(|| format!("reading request {}", cli.request.display()))?;
    let request = QueryRequest::from_json_str(&request_text).context("parsing request")?;

    let entity = request
        .entity_name()
        .context("request does not name an entity")?;
    let selection = request.selection()?;
    let mut input = QueryInput::new(entity, &selection);
    input.filter = request.filter();
    input.pagination = request.pagination();

    let query = build_query_and_bindings_for(&registry, &config, &input)?;
    log::info!("Compiled query with {} binding(s)", query.bindings.len());

    let output = if cli.positional {
        let positional = query.to_positional()?;
        json!({ "sql": positional.sql, "values": positional.values })
    } else {
        json!({ "sql": query.sql, "bindings": query.bindings })
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
