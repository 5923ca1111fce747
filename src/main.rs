//! dae-export - CryEngine COLLADA export tool
//!
//! Serializes a scene snapshot (JSON) to a .dae document laid out for the
//! CryEngine resource compiler.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use xmltree::EmitterConfig;

use dae_export::{verify_cross_references, DaeExporter, ExportConfig, ExportError, SceneSnapshot};

#[derive(Parser)]
#[command(name = "dae-export")]
#[command(about = "CryEngine COLLADA export tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a scene snapshot to a .dae document
    Export {
        /// Input scene snapshot (JSON)
        input: PathBuf,

        /// Output .dae file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Replace flat-face normals with near-coplanar averages
        #[arg(long)]
        average_planar: bool,

        /// Emit the DoNotMerge directive on every export node
        #[arg(long)]
        do_not_merge: bool,

        /// Mark export nodes for Lumberyard instead of CryEngine
        #[arg(long)]
        lumberyard: bool,

        /// Text for the asset `created` stamp
        #[arg(long)]
        created: Option<String>,

        /// Asset compiler executable, verified before any work starts
        #[arg(long)]
        compiler: Option<PathBuf>,
    },

    /// Export in memory and verify document cross-references
    Check {
        /// Input scene snapshot (JSON)
        input: PathBuf,
    },
}

fn load_snapshot(input: &PathBuf) -> Result<SceneSnapshot> {
    let file = File::open(input).with_context(|| format!("opening snapshot {:?}", input))?;
    let snapshot: SceneSnapshot = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing snapshot {:?}", input))?;
    Ok(snapshot)
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            input,
            output,
            average_planar,
            do_not_merge,
            lumberyard,
            created,
            compiler,
        } => {
            if let Some(compiler) = &compiler {
                if !compiler.exists() {
                    return Err(ExportError::CompilerNotFound {
                        path: compiler.display().to_string(),
                    }
                    .into());
                }
            }

            let output = output.unwrap_or_else(|| input.with_extension("dae"));
            tracing::info!("Exporting {:?} -> {:?}", input, output);

            let snapshot = load_snapshot(&input)?;
            let config = ExportConfig {
                average_planar,
                do_not_merge,
                export_for_lumberyard: lumberyard,
                created,
            };
            let document = DaeExporter::new(snapshot, config).export()?;

            let file = File::create(&output)
                .with_context(|| format!("creating output {:?}", output))?;
            document
                .write_with_config(file, EmitterConfig::new().perform_indent(true))
                .with_context(|| format!("writing document {:?}", output))?;
            tracing::info!("Done!");
        }

        Commands::Check { input } => {
            tracing::info!("Checking snapshot {:?}", input);
            let snapshot = load_snapshot(&input)?;
            let document = DaeExporter::new(snapshot, ExportConfig::default()).export()?;
            match verify_cross_references(&document) {
                Ok(()) => tracing::info!("Document is closed over its references!"),
                Err(unresolved) => {
                    for reference in &unresolved {
                        tracing::error!("unresolved reference {}", reference);
                    }
                    anyhow::bail!("{} unresolved reference(s)", unresolved.len());
                }
            }
        }
    }

    Ok(())
}
