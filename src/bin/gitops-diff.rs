//! gitops-diff - diagnostic CLI for the diff and normalization engine.
//!
//! Reads live and target manifests from YAML/JSON files, optionally with the
//! cluster settings ConfigMap, and reports whether the live object is in sync.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use gitops_diff::diff::{self, DiffConfig, DiffConfigBuilder, DEFAULT_MANAGER};
use gitops_diff::normalizers::{NormalizeAsNormalizer, Normalizer};
use gitops_diff::settings::DiffSettings;
use gitops_diff::Unstructured;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Diff live Kubernetes objects against their desired state
#[derive(Parser)]
#[command(name = "gitops-diff")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Output location. Use '-' for stdout
    #[arg(short, long, global = true, default_value = "-")]
    output: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Diff a live object against its target; exits 1 when out of sync
    Compare(PairArgs),

    /// Print both objects as the engine normalizes them before diffing
    Normalize(NormalizeArgs),
}

#[derive(Args)]
struct PairArgs {
    /// Live object; omit when the resource does not exist yet
    #[arg(long)]
    live: Option<PathBuf>,

    /// Target object; omit when the resource is to be pruned
    #[arg(long)]
    target: Option<PathBuf>,

    /// ConfigMap in the argocd-cm layout carrying resource customizations
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Predict live through a server-side apply instead of a merge patch
    #[arg(long)]
    structured_merge_diff: bool,

    /// Field manager the server-side apply prediction applies as
    #[arg(long, default_value = DEFAULT_MANAGER)]
    manager: String,
}

#[derive(Args)]
struct NormalizeArgs {
    #[command(flatten)]
    pair: PairArgs,

    /// Annotate objects whose kind has a normalizeAs alias
    #[arg(long)]
    tag_aliases: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigMap {
    data: BTreeMap<String, String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> CliResult<bool> {
    let mut output: Box<dyn Write> = if cli.output == "-" {
        Box::new(io::stdout())
    } else {
        Box::new(
            fs::File::create(&cli.output)
                .map_err(|e| format!("Failed to create output file {:?}: {}", cli.output, e))?,
        )
    };

    match cli.command {
        Command::Compare(args) => compare(&args, &mut output),
        Command::Normalize(args) => {
            normalize(&args, &mut output)?;
            Ok(true)
        }
    }
}

fn read_object(path: Option<&Path>) -> CliResult<Option<Unstructured>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read file {:?}: {}", path, e))?;
    let un = Unstructured::from_yaml_str(&content).map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;
    Ok(Some(un))
}

fn load_settings(path: Option<&Path>) -> CliResult<DiffSettings> {
    let Some(path) = path else {
        return Ok(DiffSettings::default());
    };
    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read settings {:?}: {}", path, e))?;
    let config_map: ConfigMap = serde_yaml::from_str(&content)?;
    Ok(DiffSettings::from_config_map_data(&config_map.data)?)
}

fn build_config(settings: DiffSettings, args: &PairArgs) -> CliResult<DiffConfig> {
    Ok(DiffConfigBuilder::new()
        .with_settings(settings)
        .with_no_cache()
        .with_structured_merge_diff(args.structured_merge_diff)
        .with_manager(args.manager.as_str())
        .build()?)
}

fn compare(args: &PairArgs, output: &mut dyn Write) -> CliResult<bool> {
    let live = read_object(args.live.as_deref())?;
    let target = read_object(args.target.as_deref())?;
    let config = build_config(load_settings(args.settings.as_deref())?, args)?;

    let result = diff::state_diff(live.as_ref(), target.as_ref(), &config)?;
    if result.modified {
        writeln!(output, "Resource is out of sync")?;
    } else {
        writeln!(output, "Resource is in sync")?;
    }
    writeln!(output, "\nNormalized live state:")?;
    write_json(output, &result.normalized_live)?;
    writeln!(output, "\nPredicted live state:")?;
    write_json(output, &result.predicted_live)?;
    Ok(!result.modified)
}

fn write_json(output: &mut dyn Write, data: &[u8]) -> CliResult<()> {
    let json: serde_json::Value = serde_json::from_slice(data)?;
    writeln!(output, "{}", serde_json::to_string_pretty(&json)?)?;
    Ok(())
}

fn normalize(args: &NormalizeArgs, output: &mut dyn Write) -> CliResult<()> {
    let live = read_object(args.pair.live.as_deref())?;
    let target = read_object(args.pair.target.as_deref())?;
    let settings = load_settings(args.pair.settings.as_deref())?;
    let aliases = NormalizeAsNormalizer::new(&settings.overrides);
    let config = build_config(settings, &args.pair)?;

    let mut result = diff::normalize(&[live], &[target], &config)?;
    if args.tag_aliases {
        for un in result.lives.iter_mut().chain(result.targets.iter_mut()).flatten() {
            aliases.normalize(un)?;
        }
    }

    for (title, objects) in [("live", &result.lives), ("target", &result.targets)] {
        writeln!(output, "# {}", title)?;
        match objects.first().and_then(Option::as_ref) {
            Some(un) => write!(output, "{}", serde_yaml::to_string(&un.to_json())?)?,
            None => writeln!(output, "null")?,
        }
    }
    Ok(())
}
