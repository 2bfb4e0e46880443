//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use datapipe_core::{
    AllowExpensive, ContinueOnFailure, Hooks, NodeRef, PipelineRegistry, TimingRecorder,
    TracingListener, nodes_from_config,
};
use datapipe_shared::{
    AppConfig, DefaultsConfig, Payload, Value, init_config, load_config, load_config_from,
};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// datapipe: node-based data enrichment.
#[derive(Parser)]
#[command(
    name = "datapipe",
    version,
    about = "Enrich JSON records through a pipeline of collectors and transformers.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.datapipe/datapipe.toml).
    #[arg(long, global = true, env = "DATAPIPE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Show the resolved execution order of the configured nodes.
    Inspect {
        /// Only list collectors.
        #[arg(long, conflicts_with = "transformers")]
        collectors: bool,

        /// Only list transformers.
        #[arg(long)]
        transformers: bool,
    },

    /// Run records through the pipeline and print the enriched JSON.
    Run {
        /// JSON file holding an object or an array of objects; `-` reads stdin.
        #[arg(default_value = "-")]
        input: String,

        /// Skip collectors costing more than this.
        #[arg(long)]
        max_cost: Option<u32>,

        /// Continue past failing nodes.
        #[arg(long, overrides_with = "no_keep_going")]
        keep_going: bool,

        /// Abort on the first failing node, even if the config says otherwise.
        #[arg(long, overrides_with = "keep_going")]
        no_keep_going: bool,

        /// Run collectors above the cost ceiling anyway.
        #[arg(long, overrides_with = "no_allow_expensive")]
        allow_expensive: bool,

        /// Honour the cost ceiling, even if the config says otherwise.
        #[arg(long, overrides_with = "allow_expensive")]
        no_allow_expensive: bool,

        /// Print per-node timings to stderr after the run.
        #[arg(long)]
        timings: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout stays
/// clean for JSON output.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "datapipe=info",
        1 => "datapipe=debug",
        _ => "datapipe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Inspect {
            collectors,
            transformers,
        } => cmd_inspect(config_path, collectors, transformers),
        Command::Run {
            input,
            max_cost,
            keep_going,
            no_keep_going,
            allow_expensive,
            no_allow_expensive,
            timings,
        } => cmd_run(
            config_path,
            &input,
            RunOptions {
                max_cost,
                keep_going: switch(keep_going, no_keep_going),
                allow_expensive: switch(allow_expensive, no_allow_expensive),
                timings,
            },
        ),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn registry_from_config(config: &AppConfig, hooks: Hooks) -> Result<PipelineRegistry> {
    let mut registry = PipelineRegistry::with_hooks(hooks);
    let nodes: Vec<NodeRef> = nodes_from_config(config)?;
    registry.add_nodes(nodes);
    Ok(registry)
}

fn cmd_inspect(config_path: Option<&Path>, collectors: bool, transformers: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let registry = registry_from_config(&config, Hooks::new())?;
    let order = registry.resolve_pipeline()?;

    if order.is_empty() {
        println!("No nodes configured.");
        return Ok(());
    }

    println!(
        "  {:>3}  {:<20} {:<12} {:>5}  {:<24} {}",
        "#", "NODE", "KIND", "COST", "PROVIDES", "DEPENDS ON"
    );
    for (position, node) in order.iter().enumerate() {
        let kind = node.kind();
        if (collectors && !kind.is_collector()) || (transformers && kind.is_collector()) {
            continue;
        }

        let depends_on: Vec<&str> = node.dependencies().iter().map(|d| d.as_str()).collect();
        println!(
            "  {:>3}  {:<20} {:<12} {:>5}  {:<24} {}",
            position + 1,
            node.name(),
            kind.label(),
            kind.cost(),
            dash_if_empty(&kind.provides().join(", ")),
            dash_if_empty(&depends_on.join(", ")),
        );
    }

    Ok(())
}

fn dash_if_empty(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}

/// Flags for `datapipe run`. `None` leaves the config value in place.
struct RunOptions {
    max_cost: Option<u32>,
    keep_going: Option<bool>,
    allow_expensive: Option<bool>,
    timings: bool,
}

/// Run settings after flags have been laid over `[defaults]`.
#[derive(Debug, PartialEq, Eq)]
struct RunSettings {
    maximum_cost: Option<u32>,
    keep_going: bool,
    allow_expensive: bool,
}

impl RunOptions {
    fn settings(&self, defaults: &DefaultsConfig) -> RunSettings {
        RunSettings {
            maximum_cost: self.max_cost.or(defaults.maximum_cost),
            keep_going: self.keep_going.unwrap_or(defaults.keep_going),
            allow_expensive: self.allow_expensive.unwrap_or(defaults.allow_expensive),
        }
    }
}

/// Collapse an `--x` / `--no-x` flag pair.
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn cmd_run(config_path: Option<&Path>, input: &str, options: RunOptions) -> Result<()> {
    let config = resolve_config(config_path)?;

    let RunSettings {
        maximum_cost,
        keep_going,
        allow_expensive,
    } = options.settings(&config.defaults);

    let recorder = Arc::new(TimingRecorder::new());
    let mut hooks = Hooks::new().with(TracingListener);
    if keep_going {
        hooks = hooks.with(ContinueOnFailure);
    }
    if allow_expensive {
        hooks = hooks.with(AllowExpensive);
    }
    if options.timings {
        hooks.register(recorder.clone());
    }

    let registry = registry_from_config(&config, hooks)?;
    if registry.nodes().is_empty() {
        warn!("no nodes configured; records pass through unchanged");
    }
    let pipeline = registry.build_pipeline()?;

    let raw = read_input(input)?;
    let (payloads, batch) = parse_payloads(&raw)?;
    info!(records = payloads.len(), ?maximum_cost, "processing input");

    let results = pipeline.process_all(payloads, maximum_cost)?;

    let output = if batch {
        Value::Array(results.into_iter().map(|p| Value::Object(p.into_attributes())).collect())
    } else {
        results
            .into_iter()
            .next()
            .map(|p| Value::Object(p.into_attributes()))
            .ok_or_else(|| eyre!("pipeline produced no output"))?
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    if options.timings {
        eprintln!("{}", serde_json::to_string_pretty(&recorder.timings())?);
    }

    Ok(())
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .wrap_err("failed to read stdin")?;
        return Ok(raw);
    }

    std::fs::read_to_string(input).wrap_err_with(|| format!("failed to read {input}"))
}

/// Parse a JSON object or an array of objects. The flag tells whether the
/// input was an array.
fn parse_payloads(raw: &str) -> Result<(Vec<Payload>, bool)> {
    let value: Value = serde_json::from_str(raw).wrap_err("input is not valid JSON")?;

    match value {
        Value::Array(items) => {
            let payloads = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    Payload::from_json(item).wrap_err_with(|| format!("record {i} is not an object"))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((payloads, true))
        }
        other => Ok((vec![Payload::from_json(other)?], false)),
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
