mod document;
mod error;
mod pipeline;
mod report;
mod settings;
mod source;
mod tiles;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use pipeline::{ConvertReport, PipelineContext};
use settings::Settings;
use tiles::ProcessExecutor;

#[derive(Parser)]
#[command(
    name = "property_tiles",
    about = "Property sales table -> validated GeoJSON -> vector tiles"
)]
struct Cli {
    /// Settings file (TOML/JSON/YAML); defaults to ./property_tiles.* when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Overrides {
    /// Source table (.parquet, or a CSV export)
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,
    /// GeoJSON document to write
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
    /// MBTiles archive to produce
    #[arg(long, global = true)]
    tiles_output: Option<PathBuf>,
    /// tippecanoe binary
    #[arg(long, global = true)]
    tippecanoe: Option<String>,
    /// Kill tippecanoe after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
}

impl Overrides {
    fn apply(self, settings: &mut Settings) {
        if let Some(p) = self.input {
            settings.input = p;
        }
        if let Some(p) = self.output {
            settings.output = p;
        }
        if let Some(p) = self.tiles_output {
            settings.tiling.output = p;
        }
        if let Some(b) = self.tippecanoe {
            settings.tiling.binary = b;
        }
        if self.timeout_secs.is_some() {
            settings.tiling.timeout_secs = self.timeout_secs;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert, audit, then generate tiles
    Run,
    /// Convert and audit without tiling
    Convert,
    /// Print the validation summary only
    Summary,
    /// Audit an existing GeoJSON document
    Audit {
        /// Document to audit (default: configured output)
        path: Option<PathBuf>,
    },
    /// Generate tiles from an existing GeoJSON document
    Tiles {
        /// Document to tile (default: configured output)
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    cli.overrides.apply(&mut settings);
    tracing::debug!(?settings, "settings loaded");

    let executor = Arc::new(ProcessExecutor::new(settings.tile_timeout()));
    let ctx = PipelineContext::new(settings, executor);

    let result = match cli.command {
        Commands::Summary => {
            let summary = ctx.summarize()?;
            println!("{}", report::render_summary(&summary));
            Ok(())
        }
        Commands::Convert => {
            let r = convert(&ctx)?;
            print_convert(&ctx, &r);
            Ok(())
        }
        Commands::Run => {
            let r = convert(&ctx)?;
            print_convert(&ctx, &r);
            run_tiles(&ctx, &r.written.path).await
        }
        Commands::Audit { path } => {
            let path = path.unwrap_or_else(|| ctx.settings.output.clone());
            let audit = ctx
                .audit_document(&path)
                .with_context(|| format!("Failed to audit {}", path.display()))?;
            println!("{}", report::render_audit(&audit, ctx.settings.audit.max_listed));
            Ok(())
        }
        Commands::Tiles { path } => {
            let path = path.unwrap_or_else(|| ctx.settings.output.clone());
            run_tiles(&ctx, &path).await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn convert(ctx: &PipelineContext) -> anyhow::Result<ConvertReport> {
    ctx.convert().with_context(|| {
        format!(
            "Conversion of {} into {} failed",
            ctx.settings.input.display(),
            ctx.settings.output.display()
        )
    })
}

fn print_convert(ctx: &PipelineContext, r: &ConvertReport) {
    println!("{}", report::render_summary(&r.summary));
    println!("{}", report::render_written(&r.written));
    println!("{}", report::render_audit(&r.audit, ctx.settings.audit.max_listed));
    if r.collection.is_empty() {
        println!("No features passed validation; the document is empty.");
    }
    if let Some(sample) = report::render_sample(&r.collection) {
        println!("{}", sample);
    }
}

async fn run_tiles(ctx: &PipelineContext, input: &std::path::Path) -> anyhow::Result<()> {
    println!("Generating MBTiles file...");
    println!("Running command: {}", ctx.settings.tiling.command_line(input));
    let output = ctx
        .generate_tiles(input)
        .await
        .context("Error running tippecanoe")?;
    print!("{}", report::render_tiles(&output));
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
