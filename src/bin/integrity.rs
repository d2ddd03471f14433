//! Check every slide's derived images and metadata, optionally repairing
//! the ones that are incomplete.
//!
//! ```text
//! slidehub-integrity --config config.yml [--repair]
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slidehub::{app, config::Config, models::IntegrityStatus};

#[derive(Debug, Parser)]
#[command(version, about = "Check (and repair) slide pyramids and metadata")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "SLIDEHUB_CONFIG", default_value = "config.yml")]
    config: PathBuf,

    /// Repair every slide that needs it
    #[arg(long)]
    repair: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slidehub=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::load_with_env(&args.config)?;
    let state = app::build_state(&config).await?;
    let slides = &state.slide_service;

    let problems = slides.integrity_all().await?;
    if problems.is_empty() {
        println!("All slides are complete.");
        return Ok(());
    }

    println!("{} slide(s) need repair:", problems.len());
    for report in &problems {
        println!("  [{}] {}: {}", report.id, report.name, describe(&report.status));
    }

    if !args.repair {
        return Ok(());
    }

    let mut failed = 0;
    for report in problems {
        let slide = slides.get(report.id).await?;
        match slides.repair_slide(&slide).await {
            Ok(status) if !status.needs_repair => println!("  [{}] repaired", slide.id),
            Ok(status) => {
                failed += 1;
                println!("  [{}] still incomplete: {}", slide.id, describe(&status));
            }
            Err(e) => {
                failed += 1;
                println!("  [{}] {}", slide.id, e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} slide(s) could not be repaired", failed);
    }
    Ok(())
}

/// Comma-separated list of the failed checks
fn describe(status: &IntegrityStatus) -> String {
    let checks = [
        ("file", status.file_exists),
        ("dzi", status.dzi_exists),
        ("tiles", status.tiles_complete),
        ("thumbnail", status.thumbnail_exists),
        ("associated image", status.associated_image_exists),
        ("metadata", status.metadata_valid),
    ];
    let missing: Vec<&str> = checks
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| *name)
        .collect();
    format!("missing {}", missing.join(", "))
}
