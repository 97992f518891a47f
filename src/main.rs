use std::{
    fs,
    path::{Path, PathBuf},
    process,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use glbrig::rig::{self, RigAdvisor, RigPipeline};
use glbrig::settings::{RigSettings, load_settings};
use glbrig::tier::TierCache;

#[derive(Parser)]
#[command(name = "glbrig", version, about = "Embed a tier-bounded rig into a GLB avatar")]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// JSON tier table (overrides the settings file)
    #[arg(long, global = true)]
    tiers: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed a rig and write the new GLB
    Embed {
        input: PathBuf,
        output: PathBuf,

        /// Subscription plan identifier
        #[arg(long, default_value = "free")]
        plan: String,

        /// Seed for morph delta generation
        #[arg(long)]
        seed: Option<u64>,

        /// Abandon the request after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Also write a JSON report next to the output
        #[arg(long)]
        report: bool,
    },
    /// Show the bone/morph counts a plan would get, without writing anything
    Plan {
        input: PathBuf,

        #[arg(long, default_value = "free")]
        plan: String,
    },
    /// Summarize a GLB container
    Inspect { input: PathBuf },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = match &cli.settings {
        Some(path) => load_settings(path)?,
        None => RigSettings::default(),
    };
    if let Some(tiers) = cli.tiers {
        settings.tiers_path = Some(tiers);
    }

    if let Some(threads) = settings.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure worker threads")?;
    }

    match cli.command {
        Command::Embed {
            input,
            output,
            plan,
            seed,
            timeout_ms,
            report,
        } => {
            if let Some(seed) = seed {
                settings.seed = seed;
            }
            if timeout_ms.is_some() {
                settings.timeout_ms = timeout_ms;
            }
            embed(&settings, &input, &output, &plan, report)
        }
        Command::Plan { input, plan } => estimate(&settings, &input, &plan),
        Command::Inspect { input } => {
            let bytes = read_input(&input)?;
            let summary = rig::inspect(&bytes, &settings.extension_name)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read input GLB: {}", path.display()))
}

fn embed(
    settings: &RigSettings,
    input: &Path,
    output: &Path,
    plan_id: &str,
    write_report: bool,
) -> Result<()> {
    let bytes = read_input(input)?;
    let resolver = TierCache::new(settings.tier_source()?);
    let advisor = settings.advisor();

    let mut pipeline = RigPipeline::new(&resolver, settings.rig_options());
    if let Some(advisor) = &advisor {
        pipeline = pipeline.with_advisor(advisor as &dyn RigAdvisor);
    }
    let result = pipeline.run(&bytes, plan_id)?;

    fs::write(output, &result.glb)
        .with_context(|| format!("failed to write output GLB: {}", output.display()))?;

    let report = &result.report;
    println!("Tier: {}", report.plan_id);
    println!("Vertices: {}", report.vertex_count);
    println!("Bones: {}, Morph targets: {}", report.bone_count, report.morph_count);
    println!(
        "Size: {} bytes (projected {}, limit {})",
        report.output_size_bytes, report.projected_size_bytes, report.max_file_size_bytes
    );
    if report.quality_degraded {
        println!("Quality degraded: the tier budget cannot hold a minimal rig");
    }

    if write_report {
        let report_path = output.with_extension("rig.json");
        let content = serde_json::to_string_pretty(report).context("failed to encode rig report")?;
        fs::write(&report_path, content)
            .with_context(|| format!("failed to write rig report: {}", report_path.display()))?;
        println!("Report: {}", report_path.display());
    }
    Ok(())
}

fn estimate(settings: &RigSettings, input: &Path, plan_id: &str) -> Result<()> {
    let bytes = read_input(input)?;
    let resolver = TierCache::new(settings.tier_source()?);
    let advisor = settings.advisor();

    let mut pipeline = RigPipeline::new(&resolver, settings.rig_options());
    if let Some(advisor) = &advisor {
        pipeline = pipeline.with_advisor(advisor as &dyn RigAdvisor);
    }
    let estimate = pipeline.plan_only(&bytes, plan_id)?;
    println!("{}", serde_json::to_string_pretty(&estimate)?);
    Ok(())
}
