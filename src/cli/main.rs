/*!
viz-export command line interface

Saves a visualization's viz.json and the GeoJSON data of each of its sublayers
into a local directory.
*/

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use viz_export::{DocumentSource, ExportConfig, ExportError, ExportReport, ExportService};

#[derive(Parser, Debug)]
#[command(name = "viz-export")]
#[command(about = "Export a visualization and the data behind each of its sublayers")]
#[command(version)]
struct Cli {
    /// Visualization URL (viz.json or public map page) or path to a local viz.json
    source: String,

    /// Output directory
    #[arg(short = 'd', long = "dir", default_value = ".")]
    dir: PathBuf,

    /// Also write a style.json for every sublayer
    #[arg(long)]
    styles: bool,

    /// Maximum number of concurrent downloads (0 for no limit)
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Seconds a download may stall before it fails
    #[arg(long)]
    timeout: Option<u64>,

    /// Log debug output, including download progress
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> ExportConfig {
        let mut config = ExportConfig::from_env();
        config.export_styles = self.styles;
        if let Some(max_concurrency) = self.max_concurrency {
            config.max_concurrency = max_concurrency;
        }
        if let Some(timeout) = self.timeout {
            config.read_timeout = Duration::from_secs(timeout);
        }
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    viz_export::observability::init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(report) => {
            println!(
                "Exported {} files to {}",
                report.written.len(),
                report.dest_root.display()
            );
            if !report.skipped.is_empty() {
                println!("Skipped {} files with nothing to write", report.skipped.len());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(report) = e.downcast_ref::<ExportError>().and_then(ExportError::report) {
                for failure in &report.failures {
                    eprintln!("  {}", failure);
                }
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<ExportReport> {
    let config = cli.config();
    let source = DocumentSource::parse(&cli.source).context("Invalid source")?;

    println!("Saving visualization in {}", cli.dir.display());
    let service = ExportService::new(&config)?;
    let report = service.export_visualization(source, &cli.dir).await?;
    Ok(report)
}
