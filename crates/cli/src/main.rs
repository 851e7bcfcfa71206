//! sieve: declarative static-analysis rule runner.
//!
//! Loads YAML rule sets, evaluates them against a source tree through the
//! builtin provider, and writes violation reports as YAML or JSON.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use sieve_engine::engine::{
    DEFAULT_CONCURRENCY, DEFAULT_INCIDENT_LIMIT, DEFAULT_SNIPPET_LIMIT,
};
use sieve_engine::snippet::FsSnippetSource;
use sieve_engine::{output, EngineConfig, LabelSelector, RuleEngine, RuleLoader};
use sieve_provider::builtin::{BuiltinProvider, PROVIDER_NAME};
use sieve_provider::{CancelToken, Provider, ProviderConfig, ProviderRegistry};

// ── CLI ─────────────────────────────────────────────────────────────

/// Evaluate declarative migration rules against a source tree.
#[derive(Parser, Debug)]
#[command(name = "sieve", version, about)]
struct Cli {
    /// Rule files or directories. Repeatable.
    #[arg(long = "rules", env = "SIEVE_RULES", required = true, num_args = 1..)]
    rules: Vec<PathBuf>,

    /// Root of the source tree to analyze.
    #[arg(long, env = "SIEVE_SOURCE", default_value = ".")]
    source: PathBuf,

    /// Label expression selecting which rules run.
    #[arg(long)]
    label_selector: Option<String>,

    /// Label expression excluding dependencies from results.
    #[arg(long)]
    dep_label_selector: Option<String>,

    /// Maximum incidents kept per rule (0 = unlimited).
    #[arg(long, default_value_t = DEFAULT_INCIDENT_LIMIT)]
    incident_limit: usize,

    /// Maximum incidents that get a code snippet (0 = unlimited).
    #[arg(long, default_value_t = DEFAULT_SNIPPET_LIMIT)]
    snippet_limit: usize,

    /// Context lines around each code snippet.
    #[arg(long, default_value_t = 10)]
    context_lines: usize,

    /// Worker pool size.
    #[arg(long, env = "SIEVE_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Skip rules whose only conditions are dependency checks.
    #[arg(long)]
    no_dependency_rules: bool,

    /// Write output here instead of stdout.
    #[arg(long)]
    output_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    output_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Selectors compile before anything runs, so a bad expression fails fast.
    let selector = cli
        .label_selector
        .as_deref()
        .map(LabelSelector::new)
        .transpose()
        .context("invalid --label-selector")?;
    let dep_selector = cli
        .dep_label_selector
        .as_deref()
        .map(LabelSelector::new)
        .transpose()
        .context("invalid --dep-label-selector")?;

    let source = cli
        .source
        .canonicalize()
        .with_context(|| format!("source directory {}", cli.source.display()))?;

    let client = BuiltinProvider
        .init(ProviderConfig {
            location: source.clone(),
        })
        .await
        .context("initialize builtin provider")?;
    let mut registry = ProviderRegistry::new();
    registry.insert(PROVIDER_NAME, client);
    let registry = Arc::new(registry);

    let rule_sets = RuleLoader::new(&registry)
        .load_paths(&cli.rules)
        .context("load rules")?;
    info!(
        rule_sets = rule_sets.len(),
        rules = rule_sets.iter().map(|s| s.rules.len()).sum::<usize>(),
        source = %source.display(),
        "starting analysis"
    );

    let config = EngineConfig {
        concurrency: cli.concurrency,
        incident_limit: cli.incident_limit,
        snippet_limit: cli.snippet_limit,
        no_dependency_rules: cli.no_dependency_rules,
    };
    let mut engine = RuleEngine::new(Arc::clone(&registry), config)
        .with_snippets(Arc::new(FsSnippetSource::new(cli.context_lines)));
    if let Some(dep_selector) = dep_selector {
        engine = engine.with_dependency_selector(dep_selector);
    }

    // First interrupt cancels cooperatively; in-flight rules finish or
    // report a cancellation error.
    let cancel = CancelToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, returning partial results");
            interrupt.cancel();
        }
    });

    let results = engine.run(&rule_sets, selector.as_ref(), &cancel).await;
    registry.stop_all().await;

    let rendered = match cli.output_format {
        OutputFormat::Yaml => output::to_yaml(&results)?,
        OutputFormat::Json => output::to_json(&results)?,
    };
    match &cli.output_file {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("write output to {}", path.display()))?;
            info!(path = %path.display(), "wrote results");
        }
        None => print!("{rendered}"),
    }

    Ok(())
}
