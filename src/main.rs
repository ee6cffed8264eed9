//! layerstack CLI
//!
//! Entry point for the `layerstack` command-line tool.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use layerstack::export::{export_document, Destination};
use layerstack::settings::SETTINGS_FILE;
use layerstack::{DocumentKind, EffectiveSettings, ExitCode, Pipeline, PipelineError, Settings};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Parser)]
#[command(name = "layerstack")]
#[command(about = "Layered overlay merge for conversational-assistant projects", version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge the layer stack and perform the configured exports
    Merge {
        #[command(flatten)]
        layers: LayerArgs,

        #[command(flatten)]
        outputs: OutputArgs,
    },

    /// Show the resolved layers and selected files without merging
    Info {
        #[command(flatten)]
        layers: LayerArgs,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Also write the summary to this file
        #[arg(long)]
        info_file: Option<PathBuf>,
    },

    /// Print one merged document to stdout
    Dump {
        /// Document to print
        kind: DumpKind,

        #[command(flatten)]
        layers: LayerArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DumpKind {
    Domain,
    Nlu,
    Stories,
    Rules,
}

impl From<DumpKind> for DocumentKind {
    fn from(kind: DumpKind) -> Self {
        match kind {
            DumpKind::Domain => DocumentKind::Domain,
            DumpKind::Nlu => DocumentKind::Nlu,
            DumpKind::Stories => DocumentKind::Stories,
            DumpKind::Rules => DocumentKind::Rules,
        }
    }
}

#[derive(Args)]
struct LayerArgs {
    /// Settings file (default: ./layerstack.toml when present)
    #[arg(long, short = 's')]
    settings: Option<PathBuf>,

    /// Base layer directory
    #[arg(long)]
    base: Option<PathBuf>,

    /// Overlay layer directories, lowest precedence first (comma-separated)
    #[arg(long, value_delimiter = ',')]
    overlay: Vec<PathBuf>,

    /// Directories contributing NLU data only (comma-separated)
    #[arg(long, value_delimiter = ',')]
    overlay_nlu: Vec<PathBuf>,

    /// Directories contributing stories and rules only (comma-separated)
    #[arg(long, value_delimiter = ',')]
    overlay_stories: Vec<PathBuf>,

    /// Pipeline config used when no layer provides one
    #[arg(long)]
    default_config: Option<PathBuf>,
}

#[derive(Args)]
struct OutputArgs {
    /// Dump the merged domain (1/true/yes/stdout/- for stdout, else a path)
    #[arg(long)]
    dump_domain: Option<String>,

    /// Dump the merged NLU data (1/true/yes/stdout/- for stdout, else a path)
    #[arg(long)]
    dump_nlu: Option<String>,

    /// Write the merged project into this directory
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Write the project info summary to this file
    #[arg(long)]
    info_file: Option<PathBuf>,
}

fn insert_path(map: &mut Map<String, Value>, key: &str, path: &Option<PathBuf>) {
    if let Some(path) = path {
        map.insert(key.to_string(), Value::String(path.to_string_lossy().to_string()));
    }
}

fn insert_paths(map: &mut Map<String, Value>, key: &str, paths: &[PathBuf]) {
    if !paths.is_empty() {
        let list = paths
            .iter()
            .map(|p| Value::String(p.to_string_lossy().to_string()))
            .collect();
        map.insert(key.to_string(), Value::Array(list));
    }
}

impl LayerArgs {
    fn overrides(&self) -> Map<String, Value> {
        let mut map = Map::new();
        insert_path(&mut map, "base_domain", &self.base);
        insert_paths(&mut map, "overlay_domain", &self.overlay);
        insert_paths(&mut map, "overlay_nlu", &self.overlay_nlu);
        insert_paths(&mut map, "overlay_stories", &self.overlay_stories);
        insert_path(&mut map, "default_config", &self.default_config);
        map
    }
}

impl OutputArgs {
    fn extend(&self, map: &mut Map<String, Value>) {
        for (key, selector) in [("dump_domain", &self.dump_domain), ("dump_nlu", &self.dump_nlu)] {
            if let Some(selector) = selector {
                map.insert(key.to_string(), Value::String(selector.clone()));
            }
        }
        insert_path(map, "export_dir", &self.export_dir);
        insert_path(map, "info_file", &self.info_file);
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let code = match run(cli.command) {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    process::exit(code.as_i32());
}

fn run(command: Commands) -> Result<(), PipelineError> {
    match command {
        Commands::Merge { layers, outputs } => {
            let mut overrides = layers.overrides();
            outputs.extend(&mut overrides);
            let settings = load_settings(&layers, overrides)?;
            run_merge(settings)
        }
        Commands::Info {
            layers,
            json,
            info_file,
        } => {
            let mut overrides = layers.overrides();
            insert_path(&mut overrides, "info_file", &info_file);
            let settings = load_settings(&layers, overrides)?;
            run_info(settings, json)
        }
        Commands::Dump { kind, layers } => {
            let settings = load_settings(&layers, layers.overrides())?;
            run_dump(settings, kind.into())
        }
    }
}

/// Resolve settings from defaults, the settings file, `OVERLAY_*` variables and flags.
fn load_settings(args: &LayerArgs, overrides: Map<String, Value>) -> Result<Settings, PipelineError> {
    let default_file = Path::new(SETTINGS_FILE);
    let file = match &args.settings {
        Some(path) => Some(path.as_path()),
        None if default_file.is_file() => Some(default_file),
        None => None,
    };

    let env: BTreeMap<String, String> = std::env::vars()
        .filter(|(key, _)| key.starts_with("OVERLAY_"))
        .collect();

    let cli = (!overrides.is_empty()).then(|| Value::Object(overrides));
    let effective = EffectiveSettings::build(file, &env, cli)?;
    debug!(sources = ?effective.sources, "effective settings");
    Ok(effective.settings)
}

fn run_merge(settings: Settings) -> Result<(), PipelineError> {
    let pipeline = Pipeline::new(settings)?;
    let result = pipeline.run()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    result.export(pipeline.settings(), &mut out)?;

    if let Some(path) = &pipeline.settings().info_file {
        result
            .info()?
            .write_to_file(path)
            .map_err(PipelineError::Report)?;
    }
    Ok(())
}

fn run_info(settings: Settings, json: bool) -> Result<(), PipelineError> {
    let pipeline = Pipeline::new(settings)?;
    let info = pipeline.inspect()?;

    let text = if json { info.to_json()? } else { info.to_human() };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", text.trim_end()).map_err(PipelineError::Report)?;

    if let Some(path) = &pipeline.settings().info_file {
        info.write_to_file(path).map_err(PipelineError::Report)?;
    }
    Ok(())
}

fn run_dump(settings: Settings, kind: DocumentKind) -> Result<(), PipelineError> {
    let pipeline = Pipeline::new(settings)?;
    let result = pipeline.run()?;

    if let Some(value) = result.document(kind) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        export_document(kind, value, &Destination::Stdout, &mut out)?;
    }
    Ok(())
}
